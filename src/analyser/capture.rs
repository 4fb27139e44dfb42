//! Capture decoding boundary.
//!
//! Link-layer parsing is not done here. A [PacketDecoder] hands back packets with the IP
//! and transport header fields already pulled out; [TsharkDecoder] does that by driving
//! `tshark` through rtshark.
use rtshark::{Layer, Packet};
use std::net::Ipv4Addr;
use std::path::Path;
use std::process::{Command, Stdio};
use std::str::FromStr;

use super::error::CaptureError;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedPacket {
    /// Epoch seconds.
    pub timestamp: f64,
    /// Total bytes on the wire.
    pub length: u32,
    pub ip: Option<IpHeader>,
    pub tcp: Option<TcpHeader>,
    pub udp: Option<UdpHeader>,
    pub icmp: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IpHeader {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub proto: u8,
    pub ttl: u8,
    /// Length of the IP layer, header included.
    pub length: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TcpHeader {
    pub sport: u16,
    pub dport: u16,
    pub flags: u16,
    pub window: u32,
    pub seq: u64,
    pub ack: u64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UdpHeader {
    pub sport: u16,
    pub dport: u16,
}

/// Anything that can turn a capture file into an ordered list of packets.
pub trait PacketDecoder {
    fn decode(&self, path: &Path) -> Result<Vec<DecodedPacket>, CaptureError>;
}

/// Optional collaborators, resolved once at startup and handed to whoever needs them.
pub struct Capabilities {
    pub decoder: Option<Box<dyn PacketDecoder>>,
}

impl Capabilities {
    /// Looks for a usable `tshark` on PATH.
    pub fn detect() -> Self {
        let decoder: Option<Box<dyn PacketDecoder>> = if TsharkDecoder::available() {
            log::info!("tshark found, capture conversion enabled");
            Some(Box::new(TsharkDecoder))
        } else {
            log::warn!("tshark not found, capture conversion disabled");
            None
        };
        Self { decoder }
    }

    pub fn decoder(&self) -> Option<&dyn PacketDecoder> {
        self.decoder.as_deref()
    }
}

pub struct TsharkDecoder;

impl TsharkDecoder {
    pub fn available() -> bool {
        Command::new("tshark")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl PacketDecoder for TsharkDecoder {
    fn decode(&self, path: &Path) -> Result<Vec<DecodedPacket>, CaptureError> {
        log::info!("Loading capture file.");
        let filepath = path.to_string_lossy();

        let builder = rtshark::RTSharkBuilder::builder().input_path(&filepath);

        let mut rtshark = builder.spawn().map_err(|source| CaptureError::Spawn {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Reading from {}", filepath);

        let mut packets = Vec::new();
        loop {
            match rtshark.read() {
                Ok(Some(packet)) => packets.push(decode_packet(&packet)),
                Ok(None) => break,
                Err(source) => {
                    rtshark.kill();
                    return Err(CaptureError::Read {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }
        }
        rtshark.kill();

        log::info!("Loaded {} packets", packets.len());
        Ok(packets)
    }
}

/// Pulls the header fields we care about out of an rtshark packet.
fn decode_packet(packet: &Packet) -> DecodedPacket {
    let timestamp = packet
        .timestamp_micros()
        .map(|micros| micros as f64 / 1_000_000.0)
        .unwrap_or(0.0);

    let ip = packet.layer_name("ip").and_then(|layer| {
        let header = IpHeader {
            src: field(layer, "ip.src")?,
            dst: field(layer, "ip.dst")?,
            proto: field(layer, "ip.proto").unwrap_or(0),
            ttl: field(layer, "ip.ttl").unwrap_or(0),
            length: field(layer, "ip.len").unwrap_or(0),
        };
        Some(header)
    });

    let length = packet
        .layer_name("frame")
        .and_then(|layer| field(layer, "frame.len"))
        .or_else(|| ip.as_ref().map(|ip| ip.length))
        .unwrap_or(0);

    let tcp = packet.layer_name("tcp").map(|layer| TcpHeader {
        sport: field(layer, "tcp.srcport").unwrap_or(0),
        dport: field(layer, "tcp.dstport").unwrap_or(0),
        flags: layer
            .metadata("tcp.flags")
            .and_then(|flags| parse_flags(flags.value()))
            .unwrap_or(0),
        window: field(layer, "tcp.window_size_value").unwrap_or(0),
        seq: absolute_number(|name| field(layer, name), "tcp.seq"),
        ack: absolute_number(|name| field(layer, name), "tcp.ack"),
    });

    let udp = packet.layer_name("udp").map(|layer| UdpHeader {
        sport: field(layer, "udp.srcport").unwrap_or(0),
        dport: field(layer, "udp.dstport").unwrap_or(0),
    });

    DecodedPacket {
        timestamp,
        length,
        ip,
        tcp,
        udp,
        icmp: packet.layer_name("icmp").is_some(),
    }
}

fn field<T: FromStr>(layer: &Layer, name: &str) -> Option<T> {
    let value = layer.metadata(name)?.value();
    match value.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::debug!("Could not parse {name}={value}");
            None
        }
    }
}

/// tshark's `tcp.seq`/`tcp.ack` are relative to the stream start; the wire value lives
/// in the `_raw` field. Older tshark builds only have the relative one.
fn absolute_number(lookup: impl Fn(&str) -> Option<u64>, name: &str) -> u64 {
    lookup(&format!("{name}_raw")).or_else(|| lookup(name)).unwrap_or(0)
}

/// tshark reports `tcp.flags` as hex (`0x0012`); accept plain decimal as well.
pub fn parse_flags(raw: &str) -> Option<u16> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

pub fn is_capture_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "pcap" | "pcapng" | "cap"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        assert_eq!(parse_flags("0x0012"), Some(0x12));
        assert_eq!(parse_flags("0X02"), Some(0x02));
        assert_eq!(parse_flags("24"), Some(24));
        assert_eq!(parse_flags("syn"), None);
    }

    #[test]
    fn test_sequence_numbers_prefer_raw_field() {
        let fields = [("tcp.seq", 1u64), ("tcp.seq_raw", 3_735_928_559), ("tcp.ack", 1)];
        let lookup = |name: &str| fields.iter().find(|(key, _)| *key == name).map(|(_, value)| *value);

        assert_eq!(absolute_number(lookup, "tcp.seq"), 3_735_928_559);
        assert_eq!(absolute_number(lookup, "tcp.ack"), 1);
        assert_eq!(absolute_number(|_| None, "tcp.seq"), 0);
    }

    #[test]
    fn test_capture_extensions() {
        assert!(is_capture_file(Path::new("trace.pcap")));
        assert!(is_capture_file(Path::new("dir/trace.PCAPNG")));
        assert!(is_capture_file(Path::new("trace.cap")));
        assert!(!is_capture_file(Path::new("flows.csv")));
        assert!(!is_capture_file(Path::new("pcap")));
    }
}
