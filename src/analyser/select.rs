//! Projection of a table onto the columns the classifier understands.
use super::table::Table;

/// Features kept from a normalised flow log.
pub const FLOW_FEATURES: &[&str] = &[
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
    "connection_state",
    "has_syn",
    "has_ack",
    "has_fin",
    "has_rst",
    "port_category",
    "label",
];

/// Features kept from a converted packet capture.
pub const CAPTURE_FEATURES: &[&str] = &[
    "src_port",
    "dst_port",
    "protocol",
    "packet_size",
    "payload_size",
    "ttl",
    "has_syn",
    "has_ack",
    "has_fin",
    "has_rst",
    "has_psh",
    "window_size",
    "duration",
    "packet_count",
    "packets_per_second",
    "bytes_per_second",
    "port_category",
];

/// Keeps, in allow-list order, only the allow-listed columns the table actually has.
///
/// Absent columns are skipped silently. The row count never changes.
pub fn select_features(table: &Table, allow_list: &[&str]) -> Table {
    let indexes: Vec<usize> = allow_list
        .iter()
        .filter_map(|name| table.column_index(name))
        .collect();

    if indexes.len() < allow_list.len() {
        log::debug!(
            "Selected {} of {} feature columns",
            indexes.len(),
            allow_list.len()
        );
    }
    table.project(&indexes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::table::Value;

    fn sample() -> Table {
        Table::from_rows(
            vec!["label".into(), "extra".into(), "src_port".into()],
            vec![
                vec![Value::from("normal"), Value::Int(1), Value::Int(5000)],
                vec![Value::from("ddos"), Value::Int(2), Value::Int(6000)],
            ],
        )
    }

    #[test]
    fn test_selection_follows_allow_list_order() {
        let selected = select_features(&sample(), FLOW_FEATURES);

        assert_eq!(selected.columns(), &["src_port", "label"]);
        assert_eq!(selected.rows()[1], vec![Value::Int(6000), Value::from("ddos")]);
    }

    #[test]
    fn test_selection_is_idempotent() {
        let once = select_features(&sample(), FLOW_FEATURES);
        let twice = select_features(&once, FLOW_FEATURES);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_disjoint_allow_list_keeps_row_count() {
        let selected = select_features(&sample(), &["ttl", "window_size"]);

        assert_eq!(selected.width(), 0);
        assert_eq!(selected.len(), 2);
    }
}
