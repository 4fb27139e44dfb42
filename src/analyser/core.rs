//! Capture path: decoded packets to per-packet records, then per-connection statistics
//! broadcast back onto every packet.
use std::collections::HashMap;
use std::path::Path;

use super::capture::{DecodedPacket, PacketDecoder};
use super::containers::{
    AggregatedPacket, ConnectionKey, ConnectionStats, PacketRecord, PortCategory, Protocol, TcpFlags,
    RATE_EPSILON,
};
use super::error::CaptureError;
use super::select::{select_features, CAPTURE_FEATURES};
use super::table::{Table, Value};

/// Result of converting a capture file.
pub struct CaptureConversion {
    pub packets: Vec<AggregatedPacket>,
    /// Every extracted column, connection identity included.
    pub full: Table,
    /// The capture feature allow-list projected out of `full`.
    pub features: Table,
}

impl CaptureConversion {
    pub fn unique_connections(&self) -> usize {
        let mut keys: Vec<&ConnectionKey> = self.packets.iter().map(|p| &p.connection_id).collect();
        keys.sort();
        keys.dedup();
        keys.len()
    }

    /// Packet counts per protocol label, most frequent first.
    pub fn protocol_distribution(&self) -> Vec<(String, usize)> {
        super::utils::value_counts(self.packets.iter().map(|p| p.record.protocol.label().to_string()))
    }
}

/// Decodes, extracts and aggregates a capture file in one go.
///
/// `decoder` is `None` when no capture decoder was found at startup; that is reported as
/// [CaptureError::DecoderUnavailable] rather than attempted.
pub fn convert_capture(decoder: Option<&dyn PacketDecoder>, path: &Path) -> Result<CaptureConversion, CaptureError> {
    let decoder = decoder.ok_or(CaptureError::DecoderUnavailable)?;
    let decoded = decoder.decode(path)?;

    let records = extract_features(&decoded);
    log::info!("Extracted {} IP packets out of {}", records.len(), decoded.len());

    let packets = aggregate_connections(&records);
    let full = packets_to_table(&packets);
    let features = select_features(&full, CAPTURE_FEATURES);

    Ok(CaptureConversion { packets, full, features })
}

/// Turns decoded packets into flat records, dropping anything without an IP layer.
pub fn extract_features(packets: &[DecodedPacket]) -> Vec<PacketRecord> {
    packets.iter().filter_map(extract_packet).collect()
}

fn extract_packet(packet: &DecodedPacket) -> Option<PacketRecord> {
    let ip = packet.ip.as_ref()?;

    let payload = i64::from(packet.length) - i64::from(ip.length);
    if payload < 0 {
        log::warn!(
            "Packet at {} is shorter than its IP layer ({} < {}), payload clamped to 0",
            packet.timestamp, packet.length, ip.length
        );
    }

    let mut record = PacketRecord {
        timestamp: packet.timestamp,
        src_ip: ip.src,
        dst_ip: ip.dst,
        protocol: Protocol::Other,
        ip_proto: ip.proto,
        packet_size: packet.length,
        ttl: ip.ttl,
        src_port: 0,
        dst_port: 0,
        tcp_flags: 0,
        flags: TcpFlags::default(),
        window_size: 0,
        seq_num: 0,
        ack_num: 0,
        payload_size: payload.max(0) as u32,
    };

    // TCP > UDP > ICMP > OTHER
    if let Some(tcp) = &packet.tcp {
        record.protocol = Protocol::Tcp;
        record.src_port = tcp.sport;
        record.dst_port = tcp.dport;
        record.tcp_flags = tcp.flags;
        record.flags = TcpFlags::from_bits(tcp.flags);
        record.window_size = tcp.window;
        record.seq_num = tcp.seq;
        record.ack_num = tcp.ack;
    } else if let Some(udp) = &packet.udp {
        record.protocol = Protocol::Udp;
        record.src_port = udp.sport;
        record.dst_port = udp.dport;
    } else if packet.icmp {
        record.protocol = Protocol::Icmp;
    }

    Some(record)
}

/// Groups records by [ConnectionKey] and reduces each group.
pub fn connection_stats(records: &[PacketRecord]) -> HashMap<ConnectionKey, ConnectionStats> {
    struct Running {
        start: f64,
        end: f64,
        count: u64,
        bytes: u64,
        payload: u64,
    }

    let mut groups: HashMap<ConnectionKey, Running> = HashMap::new();
    for record in records {
        let entry = groups.entry(record.connection_key()).or_insert(Running {
            start: record.timestamp,
            end: record.timestamp,
            count: 0,
            bytes: 0,
            payload: 0,
        });
        entry.start = entry.start.min(record.timestamp);
        entry.end = entry.end.max(record.timestamp);
        entry.count += 1;
        entry.bytes += u64::from(record.packet_size);
        entry.payload += u64::from(record.payload_size);
    }

    groups
        .into_iter()
        .map(|(key, running)| {
            let duration = running.end - running.start;
            let count = running.count as f64;
            let stats = ConnectionStats {
                start_time: running.start,
                end_time: running.end,
                packet_count: running.count,
                total_bytes: running.bytes,
                avg_packet_size: running.bytes as f64 / count,
                total_payload: running.payload,
                avg_payload: running.payload as f64 / count,
                duration,
                packets_per_second: count / (duration + RATE_EPSILON),
                bytes_per_second: running.bytes as f64 / (duration + RATE_EPSILON),
            };
            (key, stats)
        })
        .collect()
}

/// Joins each record's connection statistics back onto it, keeping input order.
pub fn aggregate_connections(records: &[PacketRecord]) -> Vec<AggregatedPacket> {
    if records.is_empty() {
        return Vec::new();
    }

    let stats = connection_stats(records);
    log::info!("Aggregated {} packets into {} connections", records.len(), stats.len());

    records
        .iter()
        .map(|record| {
            let key = record.connection_key();
            // Every key was inserted by the grouping pass above.
            let connection = &stats[&key];
            AggregatedPacket {
                record: record.clone(),
                duration: connection.duration,
                packet_count: connection.packet_count,
                packets_per_second: connection.packets_per_second,
                bytes_per_second: connection.bytes_per_second,
                port_category: PortCategory::from_port(i64::from(record.dst_port)),
                connection_id: key,
            }
        })
        .collect()
}

const CAPTURE_COLUMNS: &[&str] = &[
    "timestamp",
    "src_ip",
    "dst_ip",
    "protocol",
    "ip_proto",
    "packet_size",
    "ttl",
    "src_port",
    "dst_port",
    "tcp_flags",
    "has_syn",
    "has_ack",
    "has_fin",
    "has_rst",
    "has_psh",
    "window_size",
    "seq_num",
    "ack_num",
    "payload_size",
    "connection_id",
    "duration",
    "packet_count",
    "packets_per_second",
    "bytes_per_second",
    "port_category",
];

/// Lays the aggregated packets out as a table, one row per packet.
pub fn packets_to_table(packets: &[AggregatedPacket]) -> Table {
    let columns = CAPTURE_COLUMNS.iter().map(|c| c.to_string()).collect();
    let rows = packets
        .iter()
        .map(|packet| {
            let record = &packet.record;
            vec![
                Value::Float(record.timestamp),
                Value::Text(record.src_ip.to_string()),
                Value::Text(record.dst_ip.to_string()),
                Value::from(record.protocol.label()),
                Value::Int(i64::from(record.ip_proto)),
                Value::Int(i64::from(record.packet_size)),
                Value::Int(i64::from(record.ttl)),
                Value::Int(i64::from(record.src_port)),
                Value::Int(i64::from(record.dst_port)),
                Value::Int(i64::from(record.tcp_flags)),
                Value::Bool(record.flags.syn),
                Value::Bool(record.flags.ack),
                Value::Bool(record.flags.fin),
                Value::Bool(record.flags.rst),
                Value::Bool(record.flags.psh),
                Value::Int(i64::from(record.window_size)),
                Value::Int(record.seq_num as i64),
                Value::Int(record.ack_num as i64),
                Value::Int(i64::from(record.payload_size)),
                Value::Text(packet.connection_id.to_string()),
                Value::Float(packet.duration),
                Value::Int(packet.packet_count as i64),
                Value::Float(packet.packets_per_second),
                Value::Float(packet.bytes_per_second),
                Value::from(packet.port_category.label()),
            ]
        })
        .collect();
    Table::from_rows(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::capture::{IpHeader, TcpHeader, UdpHeader};
    use std::net::Ipv4Addr;

    fn ip(src: [u8; 4], dst: [u8; 4], proto: u8) -> IpHeader {
        IpHeader {
            src: Ipv4Addr::from(src),
            dst: Ipv4Addr::from(dst),
            proto,
            ttl: 64,
            length: 60,
        }
    }

    fn tcp_packet(timestamp: f64, sport: u16, dport: u16, flags: u16) -> DecodedPacket {
        DecodedPacket {
            timestamp,
            length: 74,
            ip: Some(ip([10, 0, 0, 1], [10, 0, 0, 2], 6)),
            tcp: Some(TcpHeader {
                sport,
                dport,
                flags,
                window: 1024,
                seq: 1,
                ack: 0,
            }),
            ..Default::default()
        }
    }

    struct FixedDecoder(Vec<DecodedPacket>);

    impl PacketDecoder for FixedDecoder {
        fn decode(&self, _path: &Path) -> Result<Vec<DecodedPacket>, CaptureError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_non_ip_packets_are_dropped() {
        let packets = vec![
            tcp_packet(1.0, 5000, 80, 0x02),
            DecodedPacket { timestamp: 1.5, length: 42, ..Default::default() },
            tcp_packet(2.0, 5000, 80, 0x10),
        ];
        let records = extract_features(&packets);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp, 1.0);
        assert_eq!(records[1].timestamp, 2.0);
    }

    #[test]
    fn test_tcp_takes_priority_over_udp() {
        let mut packet = tcp_packet(1.0, 1234, 443, 0x18);
        packet.udp = Some(UdpHeader { sport: 9, dport: 9 });
        packet.icmp = true;

        let record = &extract_features(&[packet])[0];
        assert_eq!(record.protocol, Protocol::Tcp);
        assert_eq!(record.dst_port, 443);
        assert!(record.flags.psh && record.flags.ack);
        assert_eq!(record.payload_size, 14);
    }

    #[test]
    fn test_other_protocol_has_zero_transport_fields() {
        let packet = DecodedPacket {
            timestamp: 3.0,
            length: 100,
            ip: Some(ip([1, 1, 1, 1], [2, 2, 2, 2], 47)),
            ..Default::default()
        };
        let record = &extract_features(&[packet])[0];

        assert_eq!(record.protocol, Protocol::Other);
        assert_eq!(record.ip_proto, 47);
        assert_eq!((record.src_port, record.dst_port, record.tcp_flags), (0, 0, 0));
        assert_eq!((record.window_size, record.seq_num, record.ack_num), (0, 0, 0));
        assert_eq!(record.flags, TcpFlags::default());
    }

    #[test]
    fn test_icmp_and_udp_classification() {
        let icmp = DecodedPacket {
            timestamp: 1.0,
            length: 98,
            ip: Some(ip([1, 1, 1, 1], [2, 2, 2, 2], 1)),
            icmp: true,
            ..Default::default()
        };
        let udp = DecodedPacket {
            timestamp: 1.0,
            length: 80,
            ip: Some(ip([1, 1, 1, 1], [8, 8, 8, 8], 17)),
            udp: Some(UdpHeader { sport: 5353, dport: 53 }),
            ..Default::default()
        };
        let records = extract_features(&[icmp, udp]);

        assert_eq!(records[0].protocol, Protocol::Icmp);
        assert_eq!(records[0].dst_port, 0);
        assert_eq!(records[1].protocol, Protocol::Udp);
        assert_eq!(records[1].dst_port, 53);
    }

    #[test]
    fn test_negative_payload_is_clamped() {
        let mut packet = tcp_packet(1.0, 1, 2, 0);
        packet.length = 40;
        assert_eq!(extract_features(&[packet])[0].payload_size, 0);
    }

    #[test]
    fn test_broadcast_join_keeps_length_and_order() {
        let packets = vec![
            tcp_packet(1.0, 5000, 80, 0x02),
            tcp_packet(1.2, 6000, 443, 0x02),
            tcp_packet(3.0, 5000, 80, 0x10),
            tcp_packet(1.5, 6000, 443, 0x11),
        ];
        let records = extract_features(&packets);
        let aggregated = aggregate_connections(&records);

        assert_eq!(aggregated.len(), records.len());
        for (packet, record) in aggregated.iter().zip(&records) {
            assert_eq!(&packet.record, record);
        }

        assert_eq!(aggregated[0].packet_count, 2);
        assert!((aggregated[0].duration - 2.0).abs() < 1e-9);
        assert!((aggregated[2].duration - 2.0).abs() < 1e-9);
        assert!((aggregated[1].duration - 0.3).abs() < 1e-9);
        assert_eq!(aggregated[1].port_category, PortCategory::WellKnown);
    }

    #[test]
    fn test_single_packet_rate_is_epsilon_guarded() {
        let records = extract_features(&[tcp_packet(10.0, 5000, 8080, 0x02)]);
        let aggregated = aggregate_connections(&records);

        assert_eq!(aggregated[0].duration, 0.0);
        assert!((aggregated[0].packets_per_second - 1000.0).abs() < 1e-6);
        assert!((aggregated[0].bytes_per_second - 74_000.0).abs() < 1e-6);
        assert_eq!(aggregated[0].port_category, PortCategory::Registered);
    }

    #[test]
    fn test_connection_keys_are_unidirectional() {
        let mut reply = tcp_packet(2.0, 80, 5000, 0x12);
        if let Some(ip) = reply.ip.as_mut() {
            std::mem::swap(&mut ip.src, &mut ip.dst);
        }
        let records = extract_features(&[tcp_packet(1.0, 5000, 80, 0x02), reply]);

        assert_eq!(connection_stats(&records).len(), 2);
    }

    #[test]
    fn test_connection_stats_averages() {
        let mut big = tcp_packet(2.0, 5000, 80, 0x10);
        big.length = 160;
        let records = extract_features(&[tcp_packet(1.0, 5000, 80, 0x02), big]);
        let stats = connection_stats(&records);
        let stats = &stats[&records[0].connection_key()];

        assert_eq!(stats.total_bytes, 234);
        assert_eq!(stats.avg_packet_size, 117.0);
        assert_eq!(stats.total_payload, 14 + 100);
        assert_eq!(stats.avg_payload, 57.0);
        assert_eq!((stats.start_time, stats.end_time), (1.0, 2.0));
    }

    #[test]
    fn test_empty_input_aggregates_to_nothing() {
        assert!(aggregate_connections(&[]).is_empty());
    }

    #[test]
    fn test_convert_requires_decoder() {
        let result = convert_capture(None, Path::new("trace.pcap"));
        assert!(matches!(result, Err(CaptureError::DecoderUnavailable)));
    }

    #[test]
    fn test_convert_projects_capture_features() {
        let decoder = FixedDecoder(vec![tcp_packet(1.0, 5000, 80, 0x02), tcp_packet(1.5, 5000, 80, 0x10)]);
        let conversion = convert_capture(Some(&decoder), Path::new("trace.pcap")).unwrap();

        assert_eq!(conversion.features.columns(), CAPTURE_FEATURES);
        assert_eq!(conversion.features.len(), 2);
        assert_eq!(conversion.unique_connections(), 1);
        assert_eq!(conversion.protocol_distribution(), vec![("TCP".to_string(), 2)]);
        assert_eq!(conversion.features.cell(0, "port_category"), Some(&Value::from("well_known")));
        assert!(conversion.full.has_column("connection_id"));
        assert!(!conversion.features.has_column("connection_id"));
    }
}
