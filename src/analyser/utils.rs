//! Helpers shared by the capture and flow paths: input routing, output naming and
//! frequency counting.
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use super::capture::is_capture_file;
use super::error::InputError;
use super::flow::FLOW_LOG_DELIMITER;
use super::table::Table;

/// How a file on disk should enter the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    /// Raw packets, goes through extraction and aggregation.
    Capture,
    /// Pipe-delimited flow log, goes through the flow normaliser.
    FlowLog,
    /// Already-built comma-delimited table.
    Csv,
    /// Already-built JSON array of rows.
    Json,
}

/// Classifies an input path by extension, sniffing the header line of delimited text
/// to tell flow logs from ordinary CSV.
pub fn detect_input_kind(path: &Path) -> Result<InputKind, InputError> {
    if is_capture_file(path) {
        return Ok(InputKind::Capture);
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "json" => Ok(InputKind::Json),
        "csv" | "log" | "txt" | "labeled" => {
            let header = first_line(path)?;
            if header.contains(FLOW_LOG_DELIMITER as char) && !header.contains(',') {
                Ok(InputKind::FlowLog)
            } else {
                Ok(InputKind::Csv)
            }
        }
        _ => Err(InputError::Unsupported {
            path: path.to_path_buf(),
            expected: "CSV, JSON, pipe-delimited flow log or pcap/pcapng/cap",
        }),
    }
}

fn first_line(path: &Path) -> Result<String, InputError> {
    if !path.exists() {
        return Err(InputError::NotFound(path.to_path_buf()));
    }
    let read_error = |source| InputError::Read {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(read_error)?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).map_err(read_error)?;
    Ok(line)
}

/// Loads a pre-built table (CSV or JSON) as-is.
pub fn load_table(path: &Path) -> Result<Table, InputError> {
    match detect_input_kind(path)? {
        InputKind::Json => Table::read_json(path),
        InputKind::Csv => Table::read_delimited(path, b','),
        InputKind::FlowLog => Table::read_delimited(path, FLOW_LOG_DELIMITER),
        InputKind::Capture => Err(InputError::Unsupported {
            path: path.to_path_buf(),
            expected: "a table, not a packet capture",
        }),
    }
}

/// `<dir>/<stem><suffix>.<extension>`, next to `input`.
pub fn derived_path(input: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}{suffix}.{extension}"))
}

/// Occurrences of each value, most frequent first. Ties keep first-seen order.
pub fn value_counts<I>(values: I) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = String>,
{
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for value in values {
        let count = counts.entry(value.clone()).or_insert(0);
        if *count == 0 {
            order.push(value);
        }
        *count += 1;
    }

    let mut ranked: Vec<(String, usize)> = order
        .into_iter()
        .map(|value| {
            let count = counts[&value];
            (value, count)
        })
        .collect();
    // Stable, so equal counts stay in first-seen order.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_derived_path() {
        assert_eq!(
            derived_path(Path::new("/data/trace.pcap"), "_converted", "csv"),
            PathBuf::from("/data/trace_converted.csv")
        );
        assert_eq!(
            derived_path(Path::new("flows.csv"), "_results", "json"),
            PathBuf::from("flows_results.json")
        );
    }

    #[test]
    fn test_value_counts_ties_keep_first_seen() {
        let values = ["b", "a", "a", "c", "b", "c", "d"].map(String::from);
        assert_eq!(
            value_counts(values),
            vec![
                ("b".to_string(), 2),
                ("a".to_string(), 2),
                ("c".to_string(), 2),
                ("d".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_detect_input_kind() {
        let temp = TempDir::new().unwrap();
        let flow_log = temp.path().join("conn.log.labeled");
        let csv = temp.path().join("flows.csv");
        let piped_csv = temp.path().join("piped.csv");
        std::fs::write(&flow_log, "ts|uid|proto\n").unwrap();
        std::fs::write(&csv, "src_port,dst_port\n").unwrap();
        std::fs::write(&piped_csv, "ts|uid\n").unwrap();

        assert_eq!(detect_input_kind(&flow_log).unwrap(), InputKind::FlowLog);
        assert_eq!(detect_input_kind(&csv).unwrap(), InputKind::Csv);
        assert_eq!(detect_input_kind(&piped_csv).unwrap(), InputKind::FlowLog);
        assert_eq!(detect_input_kind(Path::new("x.pcapng")).unwrap(), InputKind::Capture);
        assert_eq!(detect_input_kind(Path::new("x.json")).unwrap(), InputKind::Json);
        assert!(matches!(
            detect_input_kind(Path::new("x.xlsx")),
            Err(InputError::Unsupported { .. })
        ));
        assert!(matches!(
            detect_input_kind(&temp.path().join("gone.csv")),
            Err(InputError::NotFound(_))
        ));
    }
}
