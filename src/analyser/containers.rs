use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;

/// Additive guard used in per-connection rate calculations.
pub const RATE_EPSILON: f64 = 0.001;

/// Transport classification of a packet, in extraction priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Other,
}

impl Protocol {
    pub fn label(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
            Protocol::Other => "OTHER",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Flags derived from the raw TCP flag bitmask. URG is not extracted on the capture path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
}

impl TcpFlags {
    pub const FIN: u16 = 0x01;
    pub const SYN: u16 = 0x02;
    pub const RST: u16 = 0x04;
    pub const PSH: u16 = 0x08;
    pub const ACK: u16 = 0x10;

    pub fn from_bits(bits: u16) -> Self {
        Self {
            syn: bits & Self::SYN != 0,
            ack: bits & Self::ACK != 0,
            fin: bits & Self::FIN != 0,
            rst: bits & Self::RST != 0,
            psh: bits & Self::PSH != 0,
        }
    }
}

/// One decoded IP packet, flattened.
///
/// Transport fields are zero unless `protocol` says otherwise; for anything that is not
/// TCP the flag, window and sequence fields are all zero.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PacketRecord {
    pub timestamp: f64,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub protocol: Protocol,
    /// Raw IP protocol number, kept so OTHER packets are still identifiable.
    pub ip_proto: u8,
    pub packet_size: u32,
    pub ttl: u8,
    pub src_port: u16,
    pub dst_port: u16,
    pub tcp_flags: u16,
    pub flags: TcpFlags,
    pub window_size: u32,
    pub seq_num: u64,
    pub ack_num: u64,
    pub payload_size: u32,
}

impl PacketRecord {
    pub fn connection_key(&self) -> ConnectionKey {
        ConnectionKey::new(self.src_ip, self.src_port, self.dst_ip, self.dst_port)
    }
}

/// Unidirectional connection identity, `src_ip:src_port-dst_ip:dst_port`.
///
/// A request and its reply are two different keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionKey(String);

impl ConnectionKey {
    pub fn new(src_ip: Ipv4Addr, src_port: u16, dst_ip: Ipv4Addr, dst_port: u16) -> Self {
        Self(format!("{src_ip}:{src_port}-{dst_ip}:{dst_port}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Aggregate over every packet sharing a [ConnectionKey].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConnectionStats {
    pub start_time: f64,
    pub end_time: f64,
    pub packet_count: u64,
    pub total_bytes: u64,
    pub avg_packet_size: f64,
    pub total_payload: u64,
    pub avg_payload: f64,
    pub duration: f64,
    pub packets_per_second: f64,
    pub bytes_per_second: f64,
}

/// A packet with its connection's statistics joined back on.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AggregatedPacket {
    pub record: PacketRecord,
    pub connection_id: ConnectionKey,
    pub duration: f64,
    pub packet_count: u64,
    pub packets_per_second: f64,
    pub bytes_per_second: f64,
    pub port_category: PortCategory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PortCategory {
    Unknown,
    WellKnown,
    Registered,
    Dynamic,
}

impl PortCategory {
    /// Buckets a port number. Zero and anything negative is `unknown`.
    pub fn from_port(port: i64) -> Self {
        match port {
            i64::MIN..=0 => PortCategory::Unknown,
            1..=1023 => PortCategory::WellKnown,
            1024..=49151 => PortCategory::Registered,
            _ => PortCategory::Dynamic,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PortCategory::Unknown => "unknown",
            PortCategory::WellKnown => "well_known",
            PortCategory::Registered => "registered",
            PortCategory::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for PortCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Flow duration buckets with right-inclusive edges at 0.1 s, 1 s and 10 s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DurationCategory {
    VeryShort,
    Short,
    Medium,
    Long,
}

impl DurationCategory {
    pub fn from_seconds(seconds: f64) -> Self {
        if seconds <= 0.1 {
            DurationCategory::VeryShort
        } else if seconds <= 1.0 {
            DurationCategory::Short
        } else if seconds <= 10.0 {
            DurationCategory::Medium
        } else {
            DurationCategory::Long
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DurationCategory::VeryShort => "very_short",
            DurationCategory::Short => "short",
            DurationCategory::Medium => "medium",
            DurationCategory::Long => "long",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_category_boundaries() {
        assert_eq!(PortCategory::from_port(0), PortCategory::Unknown);
        assert_eq!(PortCategory::from_port(-5), PortCategory::Unknown);
        assert_eq!(PortCategory::from_port(1), PortCategory::WellKnown);
        assert_eq!(PortCategory::from_port(80), PortCategory::WellKnown);
        assert_eq!(PortCategory::from_port(1023), PortCategory::WellKnown);
        assert_eq!(PortCategory::from_port(1024), PortCategory::Registered);
        assert_eq!(PortCategory::from_port(8080), PortCategory::Registered);
        assert_eq!(PortCategory::from_port(49151), PortCategory::Registered);
        assert_eq!(PortCategory::from_port(49152), PortCategory::Dynamic);
        assert_eq!(PortCategory::from_port(50000).label(), "dynamic");
    }

    #[test]
    fn test_duration_category_edges_are_inclusive() {
        assert_eq!(DurationCategory::from_seconds(0.1), DurationCategory::VeryShort);
        assert_eq!(DurationCategory::from_seconds(0.5), DurationCategory::Short);
        assert_eq!(DurationCategory::from_seconds(1.0), DurationCategory::Short);
        assert_eq!(DurationCategory::from_seconds(2.5).label(), "medium");
        assert_eq!(DurationCategory::from_seconds(10.0), DurationCategory::Medium);
        assert_eq!(DurationCategory::from_seconds(10.01), DurationCategory::Long);
    }

    #[test]
    fn test_flag_masks() {
        let syn_ack = TcpFlags::from_bits(0x12);
        assert!(syn_ack.syn && syn_ack.ack);
        assert!(!syn_ack.fin && !syn_ack.rst && !syn_ack.psh);

        // URG (0x20) has no field on the capture path.
        assert_eq!(TcpFlags::from_bits(0x20), TcpFlags::default());
    }

    #[test]
    fn test_connection_key_format() {
        let key = ConnectionKey::new(
            Ipv4Addr::new(10, 0, 0, 1),
            5000,
            Ipv4Addr::new(10, 0, 0, 2),
            80,
        );
        assert_eq!(key.as_str(), "10.0.0.1:5000-10.0.0.2:80");
    }
}
