mod actions;
mod analyser;
mod client;
mod config;
mod ui;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::io;
use std::path::PathBuf;

use actions::{report_failure, ActionError, AnalyzeOptions, Session, DEFAULT_LLM_MODEL, DEFAULT_THRESHOLD};
use analyser::capture::Capabilities;
use analyser::generate::{ClassCounts, OutputFormat, DEFAULT_SEED};
use ui::interactive::{self, Prompter};
use ui::output;

/// Client for the network threat detection service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API URL (overrides the config file and NTD_API_URL)
    #[arg(long, global = true, value_parser)]
    api_url: Option<String>,

    /// API key (overrides the config file and NTD_API_KEY)
    #[arg(long, global = true, value_parser)]
    api_key: Option<String>,

    /// Run the configuration wizard
    #[arg(long, action = ArgAction::SetTrue)]
    configure: bool,

    /// More log output, repeat for debug
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check API connection
    Check,

    /// List available LLM models
    Models,

    /// Analyze network traffic (CSV, JSON, pipe-delimited flow log or packet capture)
    Analyze {
        file: PathBuf,

        /// Disable LLM analysis
        #[arg(long, action = ArgAction::SetTrue)]
        no_llm: bool,

        /// LLM model to use
        #[arg(long, default_value = DEFAULT_LLM_MODEL)]
        llm_model: String,

        /// Confidence threshold
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,

        /// Don't save results
        #[arg(long, action = ArgAction::SetTrue)]
        no_save: bool,
    },

    /// Convert a packet capture into an ML-ready CSV
    Convert {
        file: PathBuf,

        /// Output CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Reorganize a pipe-delimited flow log into cleaned and ML-ready CSVs
    Reorganize {
        file: PathBuf,

        /// Output CSV file for the cleaned table
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write sample datasets next to the input
        #[arg(long, action = ArgAction::SetTrue)]
        samples: bool,
    },

    /// Generate synthetic labelled traffic for testing
    Generate {
        /// Output filename
        #[arg(short, long, default_value = "network_traffic_sample.csv")]
        output: PathBuf,

        /// Number of normal traffic records
        #[arg(long, default_value_t = 5000)]
        normal: usize,

        /// Number of port scan records
        #[arg(long, default_value_t = 800)]
        port_scan: usize,

        /// Number of DDoS records
        #[arg(long, default_value_t = 1000)]
        ddos: usize,

        /// Number of SQL injection records
        #[arg(long, default_value_t = 500)]
        sql_injection: usize,

        /// Number of brute force records
        #[arg(long, default_value_t = 700)]
        brute_force: usize,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,

        /// Random seed, the same seed gives the same data
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
    },

    /// Interactive mode
    Interactive,
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    if let Err(err) = SimpleLogger::new().with_level(level).env().init() {
        eprintln!("Failed to initialise logging: {err}");
    }
}

fn finish(result: Result<(), ActionError>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            report_failure(&err);
            false
        }
    }
}

fn run(args: Args) -> anyhow::Result<bool> {
    if args.configure {
        let path = config::config_path().context("Cannot locate home directory for the config file")?;
        let mut prompter = Prompter::new(io::stdin().lock());
        return interactive::configure(&mut prompter, &path);
    }

    if let Some(Command::Generate {
        output,
        normal,
        port_scan,
        ddos,
        sql_injection,
        brute_force,
        format,
        seed,
    }) = &args.command
    {
        let counts = ClassCounts {
            normal: *normal,
            port_scan: *port_scan,
            ddos: *ddos,
            sql_injection: *sql_injection,
            brute_force: *brute_force,
        };
        return Ok(finish(actions::generate(&counts, *seed, output, *format)));
    }

    let credentials = config::resolve_from_env(args.api_url.as_deref(), args.api_key.as_deref())?;
    if credentials.is_none() {
        log::warn!("No API credentials found");
    }
    let session = Session::new(credentials, Capabilities::detect())?;

    let ok = match args.command {
        None | Some(Command::Interactive) => {
            if session.client().is_none() {
                output::warning("API URL and API key not configured; only local conversions are available.");
                println!("  Run `ntd-client --configure`, or set NTD_API_URL and NTD_API_KEY.");
            }
            let mut prompter = Prompter::new(io::stdin().lock());
            interactive::run(&session, &mut prompter);
            true
        }
        Some(Command::Check) => {
            output::print_banner();
            finish(session.check_connection())
        }
        Some(Command::Models) => finish(session.list_models()),
        Some(Command::Analyze {
            file,
            no_llm,
            llm_model,
            threshold,
            no_save,
        }) => {
            output::print_banner();
            let options = AnalyzeOptions {
                use_llm: !no_llm,
                llm_model,
                threshold,
                save: !no_save,
            };
            finish(session.analyze(&file, &options))
        }
        Some(Command::Convert { file, output }) => finish(session.convert(&file, output.as_deref()).map(|_| ())),
        Some(Command::Reorganize { file, output, samples }) => finish(session.reorganize(&file, output.as_deref(), samples)),
        Some(Command::Generate { .. }) => true,
    };
    Ok(ok)
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose);

    let code = match run(args) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            output::error(&format!("{err:#}"));
            1
        }
    };
    std::process::exit(code);
}
