//! Flow-log normalisation.
//!
//! Pipe-delimited connection logs arrive with source-specific column names and noisy
//! values. Normalising is a fixed sequence of rule tables; a rule whose input column is
//! absent is skipped, never an error.
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::containers::{DurationCategory, PortCategory};
use super::error::InputError;
use super::select::{select_features, FLOW_FEATURES};
use super::table::{Table, Value};
use super::utils::{derived_path, value_counts};

/// Delimiter of the textual flow-log format.
pub const FLOW_LOG_DELIMITER: u8 = b'|';

lazy_static! {
    /// Source column name to canonical name.
    static ref COLUMN_RENAMES: HashMap<&'static str, &'static str> = [
        ("ts", "timestamp"),
        ("uid", "connection_id"),
        ("id.orig_h", "src_ip"),
        ("id.orig_p", "src_port"),
        ("id.resp_h", "dst_ip"),
        ("id.resp_p", "dst_port"),
        ("proto", "protocol"),
        ("service", "service"),
        ("duration", "duration"),
        ("orig_bytes", "bytes_sent"),
        ("resp_bytes", "bytes_received"),
        ("conn_state", "connection_state"),
        ("local_orig", "local_origin"),
        ("local_resp", "local_response"),
        ("missed_bytes", "missed_bytes"),
        ("history", "history"),
        ("orig_pkts", "packets_sent"),
        ("orig_ip_bytes", "ip_bytes_sent"),
        ("resp_pkts", "packets_received"),
        ("resp_ip_bytes", "ip_bytes_received"),
        ("tunnel_parents", "tunnel_parents"),
        ("label", "label"),
        ("detailed-label", "detailed_label"),
    ]
    .into_iter()
    .collect();
}

#[derive(Clone, Copy, Debug)]
enum Fill {
    /// Coerce to a number, anything unparseable becomes 0.
    Numeric,
    /// Missing becomes the given text.
    Text(&'static str),
    /// Missing becomes false.
    Boolean,
}

const FILL_RULES: &[(&str, Fill)] = &[
    ("src_port", Fill::Numeric),
    ("dst_port", Fill::Numeric),
    ("duration", Fill::Numeric),
    ("bytes_sent", Fill::Numeric),
    ("bytes_received", Fill::Numeric),
    ("missed_bytes", Fill::Numeric),
    ("packets_sent", Fill::Numeric),
    ("ip_bytes_sent", Fill::Numeric),
    ("packets_received", Fill::Numeric),
    ("ip_bytes_received", Fill::Numeric),
    ("protocol", Fill::Text("unknown")),
    ("service", Fill::Text("unknown")),
    ("connection_state", Fill::Text("unknown")),
    ("history", Fill::Text("unknown")),
    ("local_origin", Fill::Boolean),
    ("local_response", Fill::Boolean),
    ("label", Fill::Text("normal")),
    ("detailed_label", Fill::Text("Benign")),
];

impl Fill {
    fn apply(self, value: &Value) -> Value {
        match (self, value) {
            (Fill::Numeric, value) => value.to_numeric(),
            (Fill::Text(default), Value::Missing) => Value::from(default),
            (Fill::Boolean, Value::Missing) => Value::Bool(false),
            (_, value) => value.clone(),
        }
    }
}

struct Derivation {
    column: &'static str,
    inputs: &'static [&'static str],
    derive: fn(&[&Value]) -> Value,
}

/// Evaluated in order, so later rules may read columns derived by earlier ones.
const DERIVATIONS: &[Derivation] = &[
    Derivation { column: "total_bytes", inputs: &["bytes_sent", "bytes_received"], derive: sum },
    Derivation { column: "total_packets", inputs: &["packets_sent", "packets_received"], derive: sum },
    Derivation { column: "bytes_per_packet", inputs: &["total_bytes", "total_packets"], derive: ratio },
    Derivation { column: "duration_category", inputs: &["duration"], derive: duration_category },
    Derivation { column: "port_category", inputs: &["dst_port"], derive: port_category },
    Derivation { column: "has_syn", inputs: &["history"], derive: has_syn },
    Derivation { column: "has_ack", inputs: &["history"], derive: has_ack },
    Derivation { column: "has_fin", inputs: &["history"], derive: has_fin },
    Derivation { column: "has_rst", inputs: &["history"], derive: has_rst },
];

fn sum(values: &[&Value]) -> Value {
    values[0].add(values[1])
}

fn ratio(values: &[&Value]) -> Value {
    let total = values[0].as_f64().unwrap_or(0.0);
    let count = values[1].as_f64().unwrap_or(0.0);
    if count > 0.0 {
        Value::Float(total / count)
    } else {
        Value::Float(0.0)
    }
}

fn duration_category(values: &[&Value]) -> Value {
    let seconds = values[0].as_f64().unwrap_or(0.0);
    Value::from(DurationCategory::from_seconds(seconds).label())
}

fn port_category(values: &[&Value]) -> Value {
    let port = values[0].as_f64().map(|port| port as i64).unwrap_or(0);
    Value::from(PortCategory::from_port(port).label())
}

fn has_syn(values: &[&Value]) -> Value {
    history_flag(values[0], 'S')
}

fn has_ack(values: &[&Value]) -> Value {
    history_flag(values[0], 'A')
}

fn has_fin(values: &[&Value]) -> Value {
    history_flag(values[0], 'F')
}

fn has_rst(values: &[&Value]) -> Value {
    history_flag(values[0], 'R')
}

/// Plain substring test on the history code; order and position are ignored.
fn history_flag(history: &Value, code: char) -> Value {
    let present = match history {
        Value::Missing => false,
        Value::Text(text) => text.contains(code),
        other => other.to_string().contains(code),
    };
    Value::Bool(present)
}

/// Observability numbers reported alongside a normalisation. Nothing here feeds back
/// into the transformation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowSummary {
    pub rows: usize,
    pub columns: usize,
    pub labels: Vec<(String, usize)>,
    /// Ten most frequent detailed labels.
    pub detailed_labels: Vec<(String, usize)>,
    pub protocols: Vec<(String, usize)>,
    /// Columns that still hold missing cells, with their count.
    pub missing: Vec<(String, usize)>,
    pub duplicate_rows: usize,
}

pub struct NormalizedFlows {
    pub full: Table,
    pub features: Table,
    pub summary: FlowSummary,
}

/// Normalises a flow table and projects the ML features out of it.
pub fn normalize_flows(table: Table) -> NormalizedFlows {
    let full = normalize(table);
    let features = select_features(&full, FLOW_FEATURES);
    let summary = summarize(&full);
    NormalizedFlows { full, features, summary }
}

/// Renames, coerces, fills and derives. Running it on its own output changes nothing.
pub fn normalize(mut table: Table) -> Table {
    log::info!("Normalising {} flow rows with {} columns", table.len(), table.width());

    table.trim_column_names();

    let originals: Vec<String> = table.columns().to_vec();
    for column in originals {
        if let Some(&canonical) = COLUMN_RENAMES.get(column.as_str()) {
            if canonical != column {
                log::debug!("Renaming {column} -> {canonical}");
                table.rename_column(&column, canonical);
            }
        }
    }

    for &(column, fill) in FILL_RULES {
        table.map_column(column, |value| fill.apply(value));
    }

    for rule in DERIVATIONS {
        let Some(indexes) = rule
            .inputs
            .iter()
            .map(|input| table.column_index(input))
            .collect::<Option<Vec<usize>>>()
        else {
            log::debug!("Skipping {}: missing input column", rule.column);
            continue;
        };

        let values: Vec<Value> = table
            .rows()
            .iter()
            .map(|row| {
                let inputs: Vec<&Value> = indexes.iter().map(|&i| &row[i]).collect();
                (rule.derive)(&inputs)
            })
            .collect();
        table.set_column(rule.column, values);
    }

    table
}

/// Hashable view of a cell for duplicate detection. Integers and floats compare by
/// numeric value, so `1` and `1.0` are the same cell.
#[derive(PartialEq, Eq, Hash)]
enum CellKey<'a> {
    Missing,
    Bool(bool),
    Number(u64),
    Text(&'a str),
}

impl<'a> From<&'a Value> for CellKey<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Missing => CellKey::Missing,
            Value::Bool(flag) => CellKey::Bool(*flag),
            Value::Int(int) => CellKey::Number(number_bits(*int as f64)),
            Value::Float(float) => CellKey::Number(number_bits(*float)),
            Value::Text(text) => CellKey::Text(text),
        }
    }
}

fn number_bits(number: f64) -> u64 {
    // -0.0 and 0.0 are equal
    if number == 0.0 {
        0.0f64.to_bits()
    } else {
        number.to_bits()
    }
}

/// Counts, distributions and data quality of a normalised table.
pub fn summarize(table: &Table) -> FlowSummary {
    let distribution = |name: &str| -> Vec<(String, usize)> {
        table
            .column(name)
            .map(|cells| {
                value_counts(
                    cells
                        .into_iter()
                        .filter(|cell| !cell.is_missing())
                        .map(|cell| cell.to_string()),
                )
            })
            .unwrap_or_default()
    };

    let mut detailed_labels = distribution("detailed_label");
    detailed_labels.truncate(10);

    let missing = table
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(index, column)| {
            let count = table.rows().iter().filter(|row| row[index].is_missing()).count();
            (count > 0).then(|| (column.clone(), count))
        })
        .collect();

    let mut seen = HashSet::new();
    let duplicate_rows = table
        .rows()
        .iter()
        .filter(|row| !seen.insert(row.iter().map(CellKey::from).collect::<Vec<_>>()))
        .count();

    FlowSummary {
        rows: table.len(),
        columns: table.width(),
        labels: distribution("label"),
        detailed_labels,
        protocols: distribution("protocol"),
        missing,
        duplicate_rows,
    }
}

/// Where a reorganised flow log was written.
pub struct ReorganizedFiles {
    pub flows: NormalizedFlows,
    pub full_path: PathBuf,
    pub features_path: PathBuf,
}

/// Reads a pipe-delimited flow log, normalises it and writes the cleaned and ML-ready
/// tables.
///
/// Without `output`, files go next to the input as `<stem>_cleaned.csv` and
/// `<stem>_ml_ready.csv`. With `output`, the full table goes there and the ML table
/// beside it as `<output stem>_ml_ready.csv`.
pub fn reorganize_file(input: &Path, output: Option<&Path>) -> Result<ReorganizedFiles, InputError> {
    let table = Table::read_delimited(input, FLOW_LOG_DELIMITER)?;
    log::info!("Loaded {} rows with {} columns", table.len(), table.width());

    let flows = normalize_flows(table);

    let (full_path, features_path) = match output {
        Some(output) => (output.to_path_buf(), derived_path(output, "_ml_ready", "csv")),
        None => (
            derived_path(input, "_cleaned", "csv"),
            derived_path(input, "_ml_ready", "csv"),
        ),
    };

    flows.full.write_csv(&full_path)?;
    flows.features.write_csv(&features_path)?;

    Ok(ReorganizedFiles {
        flows,
        full_path,
        features_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ZEEK_SAMPLE: &str = "ts|id.orig_h|id.orig_p|id.resp_h|id.resp_p|proto|duration|orig_bytes|resp_bytes|orig_pkts|resp_pkts|label\n\
                               1000.0|10.0.0.1|5000|10.0.0.2|80|tcp|2.5|1000|2000|5|5|normal\n";

    fn parse(raw: &str) -> Table {
        Table::from_reader(raw.as_bytes(), FLOW_LOG_DELIMITER).unwrap()
    }

    #[test]
    fn test_end_to_end_flow_row() {
        let flows = normalize_flows(parse(ZEEK_SAMPLE));
        let full = &flows.full;

        assert_eq!(full.cell(0, "timestamp"), Some(&Value::Float(1000.0)));
        assert_eq!(full.cell(0, "src_ip"), Some(&Value::from("10.0.0.1")));
        assert_eq!(full.cell(0, "src_port"), Some(&Value::Int(5000)));
        assert_eq!(full.cell(0, "dst_ip"), Some(&Value::from("10.0.0.2")));
        assert_eq!(full.cell(0, "dst_port"), Some(&Value::Int(80)));
        assert_eq!(full.cell(0, "protocol"), Some(&Value::from("tcp")));
        assert_eq!(full.cell(0, "duration"), Some(&Value::Float(2.5)));
        assert_eq!(full.cell(0, "bytes_sent"), Some(&Value::Int(1000)));
        assert_eq!(full.cell(0, "bytes_received"), Some(&Value::Int(2000)));
        assert_eq!(full.cell(0, "total_bytes"), Some(&Value::Int(3000)));
        assert_eq!(full.cell(0, "packets_sent"), Some(&Value::Int(5)));
        assert_eq!(full.cell(0, "packets_received"), Some(&Value::Int(5)));
        assert_eq!(full.cell(0, "total_packets"), Some(&Value::Int(10)));
        assert_eq!(full.cell(0, "bytes_per_packet"), Some(&Value::Float(300.0)));
        assert_eq!(full.cell(0, "duration_category"), Some(&Value::from("medium")));
        assert_eq!(full.cell(0, "port_category"), Some(&Value::from("well_known")));
        assert_eq!(full.cell(0, "label"), Some(&Value::from("normal")));

        assert_eq!(
            flows.features.columns(),
            &[
                "src_port",
                "dst_port",
                "protocol",
                "duration",
                "bytes_sent",
                "bytes_received",
                "total_bytes",
                "packets_sent",
                "packets_received",
                "total_packets",
                "bytes_per_packet",
                "port_category",
                "label",
            ]
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let raw = " ts |uid|id.resp_p|proto|orig_bytes|resp_bytes|orig_pkts|resp_pkts|history|duration|label|detailed-label\n\
                   1.0|C1|443|tcp|-|20|0|0|ShADadF|0.05||\n\
                   2.0|C2|x||10|abc|1|1||12|Malicious|PartOfAHorizontalPortScan\n";
        let once = normalize(parse(raw));
        let twice = normalize(once.clone());

        assert_eq!(once, twice);
    }

    #[test]
    fn test_coercion_and_fill_policy() {
        let raw = "id.resp_p|proto|service|orig_bytes|resp_bytes|local_orig|label|detailed-label\n\
                   abc||dns|-|7|||\n";
        let full = normalize(parse(raw));

        assert_eq!(full.cell(0, "dst_port"), Some(&Value::Int(0)));
        assert_eq!(full.cell(0, "bytes_sent"), Some(&Value::Int(0)));
        assert_eq!(full.cell(0, "total_bytes"), Some(&Value::Int(7)));
        assert_eq!(full.cell(0, "protocol"), Some(&Value::from("unknown")));
        assert_eq!(full.cell(0, "service"), Some(&Value::from("dns")));
        assert_eq!(full.cell(0, "local_origin"), Some(&Value::Bool(false)));
        assert_eq!(full.cell(0, "label"), Some(&Value::from("normal")));
        assert_eq!(full.cell(0, "detailed_label"), Some(&Value::from("Benign")));
        assert_eq!(full.cell(0, "port_category"), Some(&Value::from("unknown")));
    }

    #[test]
    fn test_history_flags() {
        let raw = "history|id.resp_p\nShAdDaFr|22\n|22\nsr|22\n";
        let full = normalize(parse(raw));

        assert_eq!(full.cell(0, "has_syn"), Some(&Value::Bool(true)));
        assert_eq!(full.cell(0, "has_ack"), Some(&Value::Bool(true)));
        assert_eq!(full.cell(0, "has_fin"), Some(&Value::Bool(true)));
        assert_eq!(full.cell(0, "has_rst"), Some(&Value::Bool(false)));

        // Missing history is filled with "unknown", which carries none of the codes.
        for flag in ["has_syn", "has_ack", "has_fin", "has_rst"] {
            assert_eq!(full.cell(1, flag), Some(&Value::Bool(false)));
            // Lowercase codes are a different direction and do not count.
            assert_eq!(full.cell(2, flag), Some(&Value::Bool(false)));
        }
    }

    #[test]
    fn test_flow_flags_differ_from_capture_flags() {
        // The flow path derives four flags from history; the capture path derives five
        // from the bitmask (PSH included). Neither carries URG.
        let full = normalize(parse("history\nShADaPU\n"));

        assert!(full.has_column("has_rst"));
        assert!(!full.has_column("has_psh"));
        assert!(!full.has_column("has_urg"));
    }

    #[test]
    fn test_absent_sources_are_skipped() {
        let full = normalize(parse("id.orig_h|note\n10.0.0.1|hello\n"));

        assert_eq!(full.columns(), &["src_ip", "note"]);
        for derived in ["total_bytes", "bytes_per_packet", "duration_category", "has_syn", "label"] {
            assert!(!full.has_column(derived), "{derived} should not exist");
        }
    }

    #[test]
    fn test_zero_packets_gives_zero_ratio() {
        let full = normalize(parse("orig_bytes|resp_bytes|orig_pkts|resp_pkts\n10|10|0|0\n"));
        assert_eq!(full.cell(0, "bytes_per_packet"), Some(&Value::Float(0.0)));
    }

    #[test]
    fn test_summary() {
        let raw = "proto|label|detailed-label|uid\n\
                   tcp|Malicious|C&C|\n\
                   udp|normal||\n\
                   tcp|Malicious|C&C|\n\
                   tcp|normal||C9\n";
        let summary = normalize_flows(parse(raw)).summary;

        assert_eq!(summary.rows, 4);
        assert_eq!(summary.columns, 4);
        assert_eq!(summary.labels, vec![("Malicious".to_string(), 2), ("normal".to_string(), 2)]);
        assert_eq!(summary.detailed_labels, vec![("C&C".to_string(), 2), ("Benign".to_string(), 2)]);
        assert_eq!(summary.protocols, vec![("tcp".to_string(), 3), ("udp".to_string(), 1)]);
        assert_eq!(summary.missing, vec![("connection_id".to_string(), 3)]);
        assert_eq!(summary.duplicate_rows, 1);
    }

    #[test]
    fn test_duplicates_compare_numbers_by_value() {
        let table = Table::from_rows(
            vec!["proto".to_string(), "duration".to_string(), "orig_bytes".to_string()],
            vec![
                vec![Value::Text("tcp".to_string()), Value::Int(1), Value::Float(0.0)],
                vec![Value::Text("tcp".to_string()), Value::Float(1.0), Value::Float(-0.0)],
                vec![Value::Text("tcp".to_string()), Value::Float(1.5), Value::Missing],
                vec![Value::Text("udp".to_string()), Value::Int(1), Value::Int(0)],
            ],
        );

        assert_eq!(summarize(&table).duplicate_rows, 1);
    }

    #[test]
    fn test_reorganize_writes_both_tables() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("capture.log");
        std::fs::write(&input, ZEEK_SAMPLE).unwrap();

        let files = reorganize_file(&input, None).unwrap();

        assert_eq!(files.full_path, temp.path().join("capture_cleaned.csv"));
        assert_eq!(files.features_path, temp.path().join("capture_ml_ready.csv"));
        let ml = Table::read_delimited(&files.features_path, b',').unwrap();
        assert_eq!(ml, files.flows.features);

        let custom = temp.path().join("out.csv");
        let files = reorganize_file(&input, Some(&custom)).unwrap();
        assert_eq!(files.features_path, temp.path().join("out_ml_ready.csv"));
        assert!(custom.exists());
    }
}
