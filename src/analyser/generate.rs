//! Synthetic labelled traffic, for trying the service without a real capture.
//!
//! Every class has its own shape (ports, sizes, flag patterns); attack classes reuse a
//! handful of attacker and target addresses the way a real campaign would.
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use super::error::InputError;
use super::sample::sample_rows;
use super::table::{Table, Value};
use super::utils::derived_path;

pub const DEFAULT_SEED: u64 = 42;

pub const GENERATED_COLUMNS: &[&str] = &[
    "src_ip",
    "dst_ip",
    "src_port",
    "dst_port",
    "protocol",
    "packet_size",
    "duration",
    "packets_sent",
    "packets_received",
    "bytes_sent",
    "bytes_received",
    "syn_flag",
    "ack_flag",
    "fin_flag",
    "rst_flag",
    "psh_flag",
    "urg_flag",
    "label",
];

const COMMON_PORTS: &[u16] = &[80, 443, 53, 22, 21, 25, 110, 143, 3306, 5432];
const WEB_PORTS: &[u16] = &[80, 443, 8080];
const LOGIN_PORTS: &[u16] = &[22, 23, 21, 3389];
const ANY_PROTOCOL: &[&str] = &["TCP", "UDP", "ICMP"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrafficClass {
    Normal,
    PortScan,
    Ddos,
    SqlInjection,
    BruteForce,
}

impl TrafficClass {
    pub const ALL: [TrafficClass; 5] = [
        TrafficClass::Normal,
        TrafficClass::PortScan,
        TrafficClass::Ddos,
        TrafficClass::SqlInjection,
        TrafficClass::BruteForce,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TrafficClass::Normal => "normal",
            TrafficClass::PortScan => "port_scan",
            TrafficClass::Ddos => "ddos",
            TrafficClass::SqlInjection => "sql_injection",
            TrafficClass::BruteForce => "brute_force",
        }
    }
}

/// Rows to generate per class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassCounts {
    pub normal: usize,
    pub port_scan: usize,
    pub ddos: usize,
    pub sql_injection: usize,
    pub brute_force: usize,
}

impl Default for ClassCounts {
    fn default() -> Self {
        Self {
            normal: 5000,
            port_scan: 800,
            ddos: 1000,
            sql_injection: 500,
            brute_force: 700,
        }
    }
}

impl ClassCounts {
    pub fn count(&self, class: TrafficClass) -> usize {
        match class {
            TrafficClass::Normal => self.normal,
            TrafficClass::PortScan => self.port_scan,
            TrafficClass::Ddos => self.ddos,
            TrafficClass::SqlInjection => self.sql_injection,
            TrafficClass::BruteForce => self.brute_force,
        }
    }

    pub fn total(&self) -> usize {
        TrafficClass::ALL.iter().map(|class| self.count(*class)).sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

#[derive(Clone, Copy, Default)]
struct Flags {
    syn: bool,
    ack: bool,
    fin: bool,
    rst: bool,
    psh: bool,
}

struct SyntheticFlow {
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    protocol: &'static str,
    packet_size: u32,
    duration: f64,
    packets_sent: u32,
    packets_received: u32,
    bytes_sent: u32,
    bytes_received: u32,
    flags: Flags,
    class: TrafficClass,
}

impl SyntheticFlow {
    fn into_row(self) -> Vec<Value> {
        let bit = |flag: bool| Value::Int(i64::from(flag));
        vec![
            Value::Text(self.src_ip.to_string()),
            Value::Text(self.dst_ip.to_string()),
            Value::Int(i64::from(self.src_port)),
            Value::Int(i64::from(self.dst_port)),
            Value::from(self.protocol),
            Value::Int(i64::from(self.packet_size)),
            Value::Float(self.duration),
            Value::Int(i64::from(self.packets_sent)),
            Value::Int(i64::from(self.packets_received)),
            Value::Int(i64::from(self.bytes_sent)),
            Value::Int(i64::from(self.bytes_received)),
            bit(self.flags.syn),
            bit(self.flags.ack),
            bit(self.flags.fin),
            bit(self.flags.rst),
            bit(self.flags.psh),
            // URG is never set in generated traffic.
            Value::Int(0),
            Value::from(self.class.label()),
        ]
    }
}

fn pick<T: Copy>(rng: &mut StdRng, items: &[T]) -> T {
    items[rng.random_range(0..items.len())]
}

fn random_ip(rng: &mut StdRng) -> Ipv4Addr {
    Ipv4Addr::new(
        rng.random_range(1..=255),
        rng.random_range(0..=255),
        rng.random_range(0..=255),
        rng.random_range(1..=254),
    )
}

/// Uniform seconds in `[low, high]`, to the millisecond.
fn random_duration(rng: &mut StdRng, low: f64, high: f64) -> f64 {
    (rng.random_range(low..=high) * 1000.0).round() / 1000.0
}

fn normal(rng: &mut StdRng, n: usize) -> Vec<SyntheticFlow> {
    (0..n)
        .map(|_| SyntheticFlow {
            src_ip: random_ip(rng),
            dst_ip: random_ip(rng),
            src_port: rng.random_range(1024..=65535),
            dst_port: pick(rng, COMMON_PORTS),
            protocol: pick(rng, ANY_PROTOCOL),
            packet_size: rng.random_range(64..=1500),
            duration: random_duration(rng, 0.001, 10.0),
            packets_sent: rng.random_range(1..=200),
            packets_received: rng.random_range(1..=200),
            bytes_sent: rng.random_range(100..=50_000),
            bytes_received: rng.random_range(100..=50_000),
            flags: Flags {
                syn: rng.random_bool(0.5),
                ack: rng.random_bool(0.5),
                fin: rng.random_bool(0.5),
                rst: false,
                psh: rng.random_bool(0.5),
            },
            class: TrafficClass::Normal,
        })
        .collect()
}

fn port_scan(rng: &mut StdRng, n: usize) -> Vec<SyntheticFlow> {
    let attackers: Vec<Ipv4Addr> = (0..rng.random_range(1..=5)).map(|_| random_ip(rng)).collect();
    let target = random_ip(rng);
    (0..n)
        .map(|_| SyntheticFlow {
            src_ip: pick(rng, &attackers),
            dst_ip: target,
            src_port: rng.random_range(40_000..=50_000),
            dst_port: rng.random_range(1..=65535),
            protocol: "TCP",
            packet_size: 60,
            duration: random_duration(rng, 0.001, 0.01),
            packets_sent: 1,
            packets_received: pick(rng, &[0, 1]),
            bytes_sent: 60,
            bytes_received: pick(rng, &[0, 40]),
            flags: Flags {
                syn: true,
                rst: rng.random_bool(0.5),
                ..Flags::default()
            },
            class: TrafficClass::PortScan,
        })
        .collect()
}

fn ddos(rng: &mut StdRng, n: usize) -> Vec<SyntheticFlow> {
    let target = random_ip(rng);
    let target_port = pick(rng, WEB_PORTS);
    (0..n)
        .map(|_| SyntheticFlow {
            src_ip: random_ip(rng),
            dst_ip: target,
            src_port: rng.random_range(1024..=65535),
            dst_port: target_port,
            protocol: pick(rng, ANY_PROTOCOL),
            packet_size: rng.random_range(500..=1500),
            duration: random_duration(rng, 0.001, 0.1),
            packets_sent: rng.random_range(100..=2000),
            packets_received: pick(rng, &[0, 1, 2]),
            bytes_sent: rng.random_range(50_000..=1_000_000),
            bytes_received: pick(rng, &[0, 100]),
            flags: Flags {
                syn: rng.random_bool(0.5),
                psh: rng.random_bool(0.5),
                ..Flags::default()
            },
            class: TrafficClass::Ddos,
        })
        .collect()
}

fn sql_injection(rng: &mut StdRng, n: usize) -> Vec<SyntheticFlow> {
    let attacker = random_ip(rng);
    let target = random_ip(rng);
    (0..n)
        .map(|_| SyntheticFlow {
            src_ip: attacker,
            dst_ip: target,
            src_port: rng.random_range(40_000..=60_000),
            dst_port: pick(rng, WEB_PORTS),
            protocol: "TCP",
            packet_size: rng.random_range(200..=1000),
            duration: random_duration(rng, 0.1, 2.0),
            packets_sent: rng.random_range(5..=20),
            packets_received: rng.random_range(1..=10),
            bytes_sent: rng.random_range(500..=5000),
            bytes_received: rng.random_range(100..=2000),
            flags: Flags {
                ack: true,
                psh: true,
                ..Flags::default()
            },
            class: TrafficClass::SqlInjection,
        })
        .collect()
}

fn brute_force(rng: &mut StdRng, n: usize) -> Vec<SyntheticFlow> {
    let attacker = random_ip(rng);
    let target = random_ip(rng);
    (0..n)
        .map(|_| SyntheticFlow {
            src_ip: attacker,
            dst_ip: target,
            src_port: rng.random_range(40_000..=60_000),
            dst_port: pick(rng, LOGIN_PORTS),
            protocol: "TCP",
            packet_size: rng.random_range(100..=300),
            duration: random_duration(rng, 0.1, 1.0),
            packets_sent: rng.random_range(5..=15),
            packets_received: rng.random_range(3..=10),
            bytes_sent: rng.random_range(200..=1500),
            bytes_received: rng.random_range(100..=1000),
            flags: Flags {
                ack: true,
                rst: rng.random_bool(0.5),
                psh: true,
                ..Flags::default()
            },
            class: TrafficClass::BruteForce,
        })
        .collect()
}

/// Generates every class, then shuffles the rows. The same seed gives the same table.
pub fn generate_traffic(counts: &ClassCounts, seed: u64) -> Table {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(counts.total());
    for class in TrafficClass::ALL {
        let n = counts.count(class);
        let flows = match class {
            TrafficClass::Normal => normal(&mut rng, n),
            TrafficClass::PortScan => port_scan(&mut rng, n),
            TrafficClass::Ddos => ddos(&mut rng, n),
            TrafficClass::SqlInjection => sql_injection(&mut rng, n),
            TrafficClass::BruteForce => brute_force(&mut rng, n),
        };
        log::debug!("Generated {} {} rows", flows.len(), class.label());
        rows.extend(flows.into_iter().map(SyntheticFlow::into_row));
    }
    rows.shuffle(&mut rng);

    let columns = GENERATED_COLUMNS.iter().map(|c| c.to_string()).collect();
    Table::from_rows(columns, rows)
}

pub struct GeneratedFiles {
    pub table: Table,
    pub path: PathBuf,
    pub test_path: PathBuf,
    pub test_rows: usize,
}

fn write_table(table: &Table, path: &Path, format: OutputFormat) -> Result<(), InputError> {
    match format {
        OutputFormat::Csv => table.write_csv(path),
        OutputFormat::Json => table.write_json(path),
    }
}

/// Writes the generated table to `output` and a 10% test split beside it as
/// `<stem>_test.<ext>`.
pub fn generate_files(
    counts: &ClassCounts,
    seed: u64,
    output: &Path,
    format: OutputFormat,
) -> Result<GeneratedFiles, InputError> {
    let table = generate_traffic(counts, seed);
    write_table(&table, output, format)?;

    let test = sample_rows(&table, table.len() / 10, &mut StdRng::seed_from_u64(seed));
    let test_path = derived_path(output, "_test", format.extension());
    write_table(&test, &test_path, format)?;

    Ok(GeneratedFiles {
        test_rows: test.len(),
        table,
        path: output.to_path_buf(),
        test_path,
    })
}
