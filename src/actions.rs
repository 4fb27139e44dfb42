//! The things a user can ask for, shared by the subcommands and the interactive menu.
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::analyser::capture::Capabilities;
use crate::analyser::core::convert_capture;
use crate::analyser::error::{CaptureError, InputError};
use crate::analyser::flow::{normalize_flows, reorganize_file, FLOW_LOG_DELIMITER};
use crate::analyser::generate::{generate_files, ClassCounts, OutputFormat};
use crate::analyser::sample::create_sample_datasets;
use crate::analyser::table::Table;
use crate::analyser::utils::{derived_path, detect_input_kind, load_table, InputKind};
use crate::client::{AnalyzeRequest, ClientError, ThreatClient};
use crate::config::Credentials;
use crate::ui::output;
use crate::ui::report::{self, ReportError};

pub const DEFAULT_LLM_MODEL: &str = "llama3.2:1b";
pub const DEFAULT_THRESHOLD: f64 = 0.7;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Could not read input: {0}")]
    Input(InputError),

    #[error("Could not write output {path}: {reason}")]
    Output { path: PathBuf, reason: String },

    #[error("Could not read input: {0}")]
    Capture(#[from] CaptureError),

    #[error("Service error: {0}")]
    Service(#[from] ClientError),

    #[error("Service returned an inconsistent result: {0}")]
    Report(ReportError),

    #[error("No records to analyse in {0}")]
    Empty(PathBuf),

    #[error("API URL and API key required")]
    MissingCredentials,
}

impl From<InputError> for ActionError {
    fn from(err: InputError) -> Self {
        match err {
            InputError::Write { path, reason } => ActionError::Output { path, reason },
            other => ActionError::Input(other),
        }
    }
}

impl From<ReportError> for ActionError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::Save { path, reason } => ActionError::Output { path, reason },
            misaligned => ActionError::Report(misaligned),
        }
    }
}

impl ActionError {
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ActionError::Service(err) => Some(err.hint()),
            ActionError::Capture(CaptureError::DecoderUnavailable) => {
                Some("Install tshark (part of Wireshark) to convert packet captures.")
            }
            ActionError::MissingCredentials => {
                Some("Run `ntd-client --configure`, or set NTD_API_URL and NTD_API_KEY.")
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnalyzeOptions {
    pub use_llm: bool,
    pub llm_model: String,
    pub threshold: f64,
    pub save: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            use_llm: true,
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            threshold: DEFAULT_THRESHOLD,
            save: true,
        }
    }
}

/// Startup state: the service client (if credentials were found) and the local
/// capabilities detected once.
pub struct Session {
    client: Option<ThreatClient>,
    capabilities: Capabilities,
}

impl Session {
    pub fn new(credentials: Option<Credentials>, capabilities: Capabilities) -> Result<Self, ActionError> {
        let client = match credentials {
            Some(creds) => Some(ThreatClient::new(&creds.api_url, &creds.api_key, creds.timeouts)?),
            None => None,
        };
        Ok(Self { client, capabilities })
    }

    pub fn client(&self) -> Option<&ThreatClient> {
        self.client.as_ref()
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn require_client(&self) -> Result<&ThreatClient, ActionError> {
        self.client.as_ref().ok_or(ActionError::MissingCredentials)
    }

    pub fn check_connection(&self) -> Result<(), ActionError> {
        let health = self.require_client()?.health()?;
        output::success("Connected to API");
        println!("  Status: {}", health.status);
        println!("  ML Model: {}", if health.ml_model { "\u{2713} Ready" } else { "\u{2717} Not trained" });
        Ok(())
    }

    pub fn list_models(&self) -> Result<(), ActionError> {
        let list = self.require_client()?.models()?;
        output::info("Available LLM models:");
        for model in &list.models {
            let marker = if *model == list.recommended { "\u{2713} " } else { "  " };
            println!("  {marker}{model}");
        }
        println!("\n  Recommended: {}", ansi_term::Colour::Green.paint(&list.recommended));
        Ok(())
    }

    /// Loads any supported input as a feature table. Captures and flow logs go through
    /// their pipelines; CSV and JSON tables are sent as they are.
    pub fn prepare_table(&self, path: &Path) -> Result<Table, ActionError> {
        let table = match detect_input_kind(path)? {
            InputKind::Capture => {
                output::info("Converting packet capture");
                convert_capture(self.capabilities.decoder(), path)?.features
            }
            InputKind::FlowLog => {
                output::info("Normalising pipe-delimited flow log");
                normalize_flows(Table::read_delimited(path, FLOW_LOG_DELIMITER)?).features
            }
            InputKind::Csv | InputKind::Json => load_table(path)?,
        };
        Ok(table)
    }

    pub fn analyze(&self, path: &Path, options: &AnalyzeOptions) -> Result<(), ActionError> {
        let client = self.require_client()?;

        output::info(&format!("Loading data from: {}", path.display()));
        let table = self.prepare_table(path)?;
        if table.is_empty() {
            return Err(ActionError::Empty(path.to_path_buf()));
        }
        output::success(&format!("Loaded {} records", table.len()));

        let request = AnalyzeRequest {
            network_data: table.records(),
            use_llm: options.use_llm,
            llm_model: options.llm_model.clone(),
            confidence_threshold: options.threshold,
        };

        output::info("Analyzing with ML model...");
        if options.use_llm {
            output::info(&format!("Using LLM: {}", options.llm_model));
        }
        let response = client.analyze(&request)?;
        output::print_results(&response.result)?;

        if options.save {
            let target = derived_path(path, "_results", "json");
            report::save_result(&response.raw, &target)?;
            output::success(&format!("Results saved to: {}", target.display()));
        }
        Ok(())
    }

    pub fn convert(&self, input: &Path, output_path: Option<&Path>) -> Result<PathBuf, ActionError> {
        output::info(&format!("Reading capture: {}", input.display()));
        let conversion = convert_capture(self.capabilities.decoder(), input)?;

        let target = output_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| derived_path(input, "_converted", "csv"));
        conversion.features.write_csv(&target)?;

        output::success(&format!("Converted {} packets to CSV", conversion.features.len()));
        output::success(&format!("Saved to: {}", target.display()));
        output::print_conversion(&conversion);
        Ok(target)
    }

    pub fn reorganize(&self, input: &Path, output_path: Option<&Path>, samples: bool) -> Result<(), ActionError> {
        output::heading("FLOW LOG REORGANIZER");
        if !input.exists() {
            return Err(InputError::NotFound(input.to_path_buf()).into());
        }

        output::info(&format!("Reorganizing: {}", input.display()));
        let files = reorganize_file(input, output_path)?;
        output::print_reorganized(&files);
        output::success("Reorganization complete!");

        if samples {
            let dir = input.parent().unwrap_or_else(|| Path::new("."));
            output::heading("SAMPLE DATASETS");
            for (path, rows) in create_sample_datasets(&files.flows.features, dir)? {
                output::success(&format!("{} ({rows} rows)", path.display()));
            }
        }
        Ok(())
    }
}

/// Writes a synthetic labelled dataset plus its test split. Needs no service.
pub fn generate(counts: &ClassCounts, seed: u64, output_path: &Path, format: OutputFormat) -> Result<(), ActionError> {
    output::info("Generating sample network traffic data...");
    println!("  Normal traffic: {}", counts.normal);
    println!("  Port scans: {}", counts.port_scan);
    println!("  DDoS attacks: {}", counts.ddos);
    println!("  SQL injections: {}", counts.sql_injection);
    println!("  Brute force: {}", counts.brute_force);

    let files = generate_files(counts, seed, output_path, format)?;
    output::print_generated(&files);
    Ok(())
}

/// Prints a failure with its remediation hint.
pub fn report_failure(err: &ActionError) {
    log::debug!("Action failed: {err:?}");
    output::error(&err.to_string());
    if let Some(hint) = err.hint() {
        println!("  {hint}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn offline() -> Session {
        Session::new(None, Capabilities { decoder: None }).unwrap()
    }

    #[test]
    fn test_remote_actions_need_credentials() {
        let session = offline();

        assert!(matches!(session.check_connection(), Err(ActionError::MissingCredentials)));
        assert!(matches!(
            session.analyze(Path::new("flows.csv"), &AnalyzeOptions::default()),
            Err(ActionError::MissingCredentials)
        ));
    }

    #[test]
    fn test_convert_without_decoder() {
        let err = offline().convert(Path::new("trace.pcap"), None).unwrap_err();

        assert!(matches!(err, ActionError::Capture(CaptureError::DecoderUnavailable)));
        assert!(err.to_string().starts_with("Could not read input"));
        assert!(err.hint().is_some());
    }

    #[test]
    fn test_prepare_flow_log_selects_features() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("conn.log.labeled");
        std::fs::write(
            &path,
            "ts|id.orig_h|id.orig_p|id.resp_h|id.resp_p|proto|history|label\n\
             1.0|10.0.0.1|5000|10.0.0.2|80|tcp|ShAF|Malicious\n",
        )
        .unwrap();

        let table = offline().prepare_table(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.has_column("has_syn"));
        assert!(!table.has_column("src_ip"));
    }

    #[test]
    fn test_reorganize_with_samples() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("flows.csv");
        std::fs::write(
            &path,
            "ts|id.orig_p|id.resp_p|proto|label\n1.0|5000|80|tcp|Benign\n2.0|5001|443|tcp|Malicious\n",
        )
        .unwrap();

        offline().reorganize(&path, None, true).unwrap();

        assert!(temp.path().join("flows_cleaned.csv").exists());
        assert!(temp.path().join("flows_ml_ready.csv").exists());
        assert!(temp.path().join("sample_small_100.csv").exists());
        assert!(temp.path().join("sample_balanced.csv").exists());
    }

    #[test]
    fn test_failed_save_is_a_local_error() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("missing").join("x_results.json");
        let err = ActionError::from(report::save_result(&serde_json::json!({}), &target).unwrap_err());

        assert!(matches!(err, ActionError::Output { .. }));
        assert!(err.to_string().starts_with("Could not write output"));
        assert!(!err.to_string().contains("Service"));
    }

    #[test]
    fn test_misaligned_report_is_a_service_error() {
        let err = ActionError::from(ReportError::Misaligned {
            record_id: 3,
            predictions: 1,
        });

        assert!(err.to_string().starts_with("Service returned"));
    }

    #[test]
    fn test_failed_table_write_is_not_a_read_error() {
        let err = ActionError::from(InputError::Write {
            path: PathBuf::from("/readonly/out.csv"),
            reason: "permission denied".to_string(),
        });

        assert_eq!(err.to_string(), "Could not write output /readonly/out.csv: permission denied");
    }

    #[test]
    fn test_generate_writes_dataset_and_split() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("traffic.csv");
        let counts = ClassCounts {
            normal: 20,
            port_scan: 5,
            ddos: 5,
            sql_injection: 5,
            brute_force: 5,
        };

        generate(&counts, 42, &output, OutputFormat::Csv).unwrap();

        assert_eq!(Table::read_delimited(&output, b',').unwrap().len(), 40);
        assert_eq!(Table::read_delimited(&temp.path().join("traffic_test.csv"), b',').unwrap().len(), 4);
    }

    #[test]
    fn test_generate_into_missing_directory_is_a_write_error() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("missing").join("traffic.csv");

        let err = generate(&ClassCounts::default(), 42, &output, OutputFormat::Csv).unwrap_err();
        assert!(matches!(err, ActionError::Output { .. }));
    }

    #[test]
    fn test_missing_input_is_local_error() {
        let err = offline().reorganize(Path::new("/nonexistent/flows.csv"), None, false).unwrap_err();

        assert!(matches!(err, ActionError::Input(InputError::NotFound(_))));
    }
}
