//! Raw row extraction
//!
//! Turns CSV-shaped tabular input into [`FlowRecord`]s. Identity columns
//! become the flow key, the label column (if present) is normalized, and
//! every remaining column is a numeric feature in header order.
//!
//! Rows that cannot yield an identity are collected as [`RowError`]s next to
//! the successful records; the whole call fails only when every row fails.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, RowError};
use crate::features::record::{FlowKey, FlowLabel, FlowRecord};

/// Finite feature values are clamped to this magnitude before modeling.
const VALUE_CLAMP: f64 = 1e10;

// ============================================================================
// RAW INPUT
// ============================================================================

/// Header + rows, the shape a CSV upload or an export API hands over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Parse plain comma-separated text. First line is the header. This is a
    /// deliberately simple splitter for exports without quoted fields; a
    /// richer upload path can construct [`RawTable`] directly.
    pub fn from_csv(text: &str) -> Self {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let headers = match lines.next() {
            Some(line) => split_csv_line(line),
            None => Vec::new(),
        };
        let rows = lines.map(split_csv_line).collect();
        Self { headers, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

fn split_csv_line(line: &str) -> Vec<String> {
    line.split(',').map(|cell| cell.trim().to_string()).collect()
}

// ============================================================================
// OPTIONS
// ============================================================================

/// Column names the extractor looks for. Matching is case-insensitive with
/// surrounding whitespace ignored, so `Label` also finds ` label `.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractOptions {
    pub src_addr_column: String,
    pub dst_addr_column: String,
    pub src_port_column: String,
    pub dst_port_column: String,
    pub protocol_column: String,
    pub label_column: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            src_addr_column: "src_ip".to_string(),
            dst_addr_column: "dst_ip".to_string(),
            src_port_column: "src_port".to_string(),
            dst_port_column: "dst_port".to_string(),
            protocol_column: "protocol".to_string(),
            label_column: "Label".to_string(),
        }
    }
}

fn column_index(headers: &[String], wanted: &str) -> Option<usize> {
    let wanted = wanted.trim().to_lowercase();
    headers
        .iter()
        .position(|h| h.trim().to_lowercase() == wanted)
}

// ============================================================================
// EXTRACTION
// ============================================================================

/// Convert a raw table into flow records.
///
/// Returns the parsed records plus the row-level errors for rows whose
/// identity could not be read. Fails outright only when an identity column
/// is missing from the header or every row is malformed.
pub fn extract(
    table: &RawTable,
    options: &ExtractOptions,
) -> CoreResult<(Vec<FlowRecord>, Vec<RowError>)> {
    if table.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let identity = IdentityColumns::locate(&table.headers, options)?;
    let label_idx = column_index(&table.headers, &options.label_column);

    let feature_columns: Vec<(usize, &str)> = table
        .headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| !identity.contains(*idx) && Some(*idx) != label_idx)
        .map(|(idx, name)| (idx, name.trim()))
        .collect();

    let mut records = Vec::with_capacity(table.rows.len());
    let mut errors = Vec::new();
    let mut collapsed_total = 0;

    for (row_idx, row) in table.rows.iter().enumerate() {
        if row.len() != table.headers.len() {
            errors.push(RowError::malformed(
                row_idx,
                format!("expected {} cells, got {}", table.headers.len(), row.len()),
            ));
            continue;
        }

        let key = match identity.read(row) {
            Ok(key) => key,
            Err(reason) => {
                errors.push(RowError::malformed(row_idx, reason));
                continue;
            }
        };

        let pairs = feature_columns
            .iter()
            .map(|(idx, name)| (name.to_string(), coerce_numeric(&row[*idx])));
        let (mut record, collapsed) = FlowRecord::from_pairs(key, pairs);
        collapsed_total += collapsed;

        if let Some(idx) = label_idx {
            let cell = row[idx].trim();
            if !cell.is_empty() {
                record.label = Some(FlowLabel::parse(cell));
            }
        }

        records.push(record);
    }

    if collapsed_total > 0 {
        log::warn!(
            "input header has duplicate feature columns; {} values collapsed (last write wins)",
            collapsed_total
        );
    }

    if records.is_empty() {
        return Err(CoreError::AllRowsMalformed {
            rows: table.rows.len(),
        });
    }
    if !errors.is_empty() {
        log::warn!(
            "extracted {} records, {} malformed rows skipped",
            records.len(),
            errors.len()
        );
    }

    Ok((records, errors))
}

struct IdentityColumns {
    src_addr: usize,
    dst_addr: usize,
    src_port: usize,
    dst_port: usize,
    protocol: usize,
}

impl IdentityColumns {
    fn locate(headers: &[String], options: &ExtractOptions) -> CoreResult<Self> {
        let find = |column: &str| {
            column_index(headers, column).ok_or_else(|| CoreError::MissingColumn {
                column: column.to_string(),
            })
        };
        Ok(Self {
            src_addr: find(&options.src_addr_column)?,
            dst_addr: find(&options.dst_addr_column)?,
            src_port: find(&options.src_port_column)?,
            dst_port: find(&options.dst_port_column)?,
            protocol: find(&options.protocol_column)?,
        })
    }

    fn contains(&self, idx: usize) -> bool {
        idx == self.src_addr
            || idx == self.dst_addr
            || idx == self.src_port
            || idx == self.dst_port
            || idx == self.protocol
    }

    fn read(&self, row: &[String]) -> Result<FlowKey, String> {
        let src_addr = row[self.src_addr].trim();
        if src_addr.is_empty() {
            return Err("missing source address".to_string());
        }
        let dst_addr = row[self.dst_addr].trim();
        if dst_addr.is_empty() {
            return Err("missing destination address".to_string());
        }
        let src_port = parse_port(&row[self.src_port], "source port")?;
        let dst_port = parse_port(&row[self.dst_port], "destination port")?;
        let protocol = parse_protocol(&row[self.protocol])?;
        Ok(FlowKey::new(src_addr, dst_addr, src_port, dst_port, protocol))
    }
}

fn parse_port(cell: &str, what: &str) -> Result<u16, String> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Err(format!("missing {}", what));
    }
    // Some exports write ports as floats ("443.0").
    cell.parse::<u16>()
        .ok()
        .or_else(|| {
            cell.parse::<f64>()
                .ok()
                .filter(|v| v.fract() == 0.0 && (0.0..=u16::MAX as f64).contains(v))
                .map(|v| v as u16)
        })
        .ok_or_else(|| format!("bad {}: '{}'", what, cell))
}

fn parse_protocol(cell: &str) -> Result<u8, String> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Err("missing protocol".to_string());
    }
    match cell.to_lowercase().as_str() {
        "tcp" => return Ok(6),
        "udp" => return Ok(17),
        "icmp" => return Ok(1),
        _ => {}
    }
    cell.parse::<u8>()
        .ok()
        .or_else(|| {
            cell.parse::<f64>()
                .ok()
                .filter(|v| v.fract() == 0.0 && (0.0..=u8::MAX as f64).contains(v))
                .map(|v| v as u8)
        })
        .ok_or_else(|| format!("bad protocol: '{}'", cell))
}

/// Coerce a feature cell to a finite clamped f64, or the absent marker.
fn coerce_numeric(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v.clamp(-VALUE_CLAMP, VALUE_CLAMP)),
        // inf/NaN from upstream arithmetic are "not computed", same as blank.
        Ok(_) => None,
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&str]) -> RawTable {
        let mut text = String::from("src_ip,dst_ip,src_port,dst_port,protocol,flow_duration,fwd_packets,Label\n");
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        RawTable::from_csv(&text)
    }

    #[test]
    fn test_extract_happy_path() {
        let table = table(&["10.0.0.1,10.0.0.2,443,51234,6,12.5,100,BENIGN"]);
        let (records, errors) = extract(&table, &ExtractOptions::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert!(errors.is_empty());

        let record = &records[0];
        assert_eq!(record.key.src_addr, "10.0.0.1");
        assert_eq!(record.key.dst_port, 51234);
        assert_eq!(record.feature("flow_duration"), Some(Some(12.5)));
        assert_eq!(record.feature("fwd_packets"), Some(Some(100.0)));
        assert_eq!(record.label, Some(FlowLabel::Benign));
        // Identity and label columns are not features.
        assert_eq!(record.feature_count(), 2);
    }

    #[test]
    fn test_extract_collects_row_errors() {
        let table = table(&[
            "10.0.0.1,10.0.0.2,443,51234,6,12.5,100,BENIGN",
            ",10.0.0.2,443,51234,6,1.0,1,DDoS",
            "10.0.0.1,10.0.0.2,not_a_port,51234,6,1.0,1,DDoS",
        ]);
        let (records, errors) = extract(&table, &ExtractOptions::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].to_string().contains("source address"));
        assert!(errors[1].to_string().contains("source port"));
    }

    #[test]
    fn test_extract_all_rows_malformed_is_fatal() {
        let table = table(&[",10.0.0.2,443,51234,6,1.0,1,DDoS"]);
        let err = extract(&table, &ExtractOptions::default()).unwrap_err();
        assert!(matches!(err, CoreError::AllRowsMalformed { rows: 1 }));
    }

    #[test]
    fn test_extract_missing_identity_column_is_fatal() {
        let table = RawTable::from_csv("dst_ip,src_port,dst_port,protocol,f\n10.0.0.2,1,2,6,0.5\n");
        let err = extract(&table, &ExtractOptions::default()).unwrap_err();
        assert!(matches!(err, CoreError::MissingColumn { ref column } if column == "src_ip"));
    }

    #[test]
    fn test_extract_empty_table_is_ok() {
        let table = RawTable::from_csv("");
        let (records, errors) = extract(&table, &ExtractOptions::default()).unwrap();
        assert!(records.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_coerce_clamps_and_marks_absent() {
        assert_eq!(coerce_numeric("1.5"), Some(1.5));
        assert_eq!(coerce_numeric(""), None);
        assert_eq!(coerce_numeric("garbage"), None);
        assert_eq!(coerce_numeric("inf"), None);
        assert_eq!(coerce_numeric("NaN"), None);
        assert_eq!(coerce_numeric("1e300"), Some(VALUE_CLAMP));
        assert_eq!(coerce_numeric("-1e300"), Some(-VALUE_CLAMP));
    }

    #[test]
    fn test_protocol_names_and_float_ports() {
        let table = table(&["10.0.0.1,10.0.0.2,443.0,51234,TCP,1.0,1,"]);
        let (records, _) = extract(&table, &ExtractOptions::default()).unwrap();
        assert_eq!(records[0].key.protocol, 6);
        assert_eq!(records[0].key.src_port, 443);
        // Empty label cell means unlabeled, not benign.
        assert_eq!(records[0].label, None);
    }

    #[test]
    fn test_label_column_case_insensitive() {
        let text = "src_ip,dst_ip,src_port,dst_port,protocol,f, label \n10.0.0.1,10.0.0.2,1,2,6,0.5,DDoS\n";
        let table = RawTable::from_csv(&text);
        let (records, _) = extract(&table, &ExtractOptions::default()).unwrap();
        assert_eq!(records[0].label, Some(FlowLabel::Attack("DDoS".to_string())));
        assert_eq!(records[0].feature_count(), 1);
    }
}
