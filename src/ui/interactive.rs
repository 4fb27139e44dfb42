use ansi_term::Colour;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::actions::{report_failure, AnalyzeOptions, Session, DEFAULT_LLM_MODEL, DEFAULT_THRESHOLD};
use crate::client::{ThreatClient, Timeouts};
use crate::config::{mask_key, Config, KEY_PREFIX};
use crate::ui::output;

/// Line-oriented prompts over any reader. `None` means the input is exhausted.
pub struct Prompter<R> {
    input: R,
}

impl<R: BufRead> Prompter<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    pub fn ask(&mut self, question: &str) -> Option<String> {
        print!("{question} ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }

    /// Yes/no with a default for an empty answer.
    pub fn confirm(&mut self, question: &str, default: bool) -> Option<bool> {
        let answer = self.ask(question)?.to_ascii_lowercase();
        Some(match answer.as_str() {
            "" => default,
            "y" | "yes" => true,
            _ => false,
        })
    }

    pub fn ask_path(&mut self, question: &str) -> Option<Option<PathBuf>> {
        let answer = self.ask(question)?;
        if answer.is_empty() {
            output::error("File path required");
            return Some(None);
        }
        Some(Some(PathBuf::from(answer)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuChoice {
    Check,
    Models,
    Analyze,
    QuickAnalyze,
    Reorganize,
    Convert,
    ViewConfig,
    Exit,
}

impl MenuChoice {
    const ALL: [(MenuChoice, &'static str); 8] = [
        (MenuChoice::Check, "Check Connection"),
        (MenuChoice::Models, "List Available Models"),
        (MenuChoice::Analyze, "Analyze Network Traffic"),
        (MenuChoice::QuickAnalyze, "Quick Analysis (No LLM)"),
        (MenuChoice::Reorganize, "Reorganize Flow Log"),
        (MenuChoice::Convert, "Convert Packet Capture"),
        (MenuChoice::ViewConfig, "View Configuration"),
        (MenuChoice::Exit, "Exit"),
    ];

    pub fn parse(raw: &str) -> Option<MenuChoice> {
        let index: usize = raw.trim().parse().ok()?;
        Self::ALL.get(index.checked_sub(1)?).map(|(choice, _)| *choice)
    }
}

fn print_menu() {
    println!("\n{}", Colour::Fixed(51).paint("Client Menu:"));
    for (i, (_, label)) in MenuChoice::ALL.iter().enumerate() {
        println!("  [{}] {label}", i + 1);
    }
}

/// Reads a threshold in `[0, 1]`, falling back to the default on anything else.
pub fn parse_threshold(raw: &str) -> f64 {
    if raw.is_empty() {
        return DEFAULT_THRESHOLD;
    }
    match raw.parse::<f64>() {
        Ok(value) if (0.0..=1.0).contains(&value) => value,
        _ => {
            output::warning(&format!("Invalid threshold '{raw}', using {DEFAULT_THRESHOLD}"));
            DEFAULT_THRESHOLD
        }
    }
}

fn analyze_options<R: BufRead>(prompter: &mut Prompter<R>) -> Option<AnalyzeOptions> {
    let use_llm = prompter.confirm("Use LLM for detailed analysis? (y/n) [y]:", true)?;
    let mut options = AnalyzeOptions {
        use_llm,
        ..AnalyzeOptions::default()
    };
    if use_llm {
        println!("\nAvailable models: {DEFAULT_LLM_MODEL} (fast), phi3:mini, gemma:2b");
        let model = prompter.ask(&format!("Select LLM model [{DEFAULT_LLM_MODEL}]:"))?;
        if !model.is_empty() {
            options.llm_model = model;
        }
        let threshold = prompter.ask(&format!("Confidence threshold (0.0-1.0) [{DEFAULT_THRESHOLD}]:"))?;
        options.threshold = parse_threshold(&threshold);
    }
    options.save = prompter.confirm("Save results to file? (y/n) [y]:", true)?;
    Some(options)
}

fn optional_path(answer: String) -> Option<PathBuf> {
    (!answer.is_empty()).then(|| PathBuf::from(answer))
}

fn view_config(session: &Session) {
    output::info("Current Configuration:");
    let cyan = Colour::Fixed(51);
    match session.client() {
        Some(client) => {
            println!("  API URL: {}", cyan.paint(client.api_url()));
            println!("  API Key: {}", cyan.paint(mask_key(client.api_key())));
        }
        None => println!("  API: {}", Colour::Fixed(196).paint("not configured")),
    }
    let capture = if session.capabilities().decoder().is_some() {
        Colour::Green.paint("Available")
    } else {
        Colour::Fixed(196).paint("Not Available (tshark not found)")
    };
    println!("  Capture conversion: {capture}");
}

/// Runs the menu until the user exits or stdin closes.
pub fn run<R: BufRead>(session: &Session, prompter: &mut Prompter<R>) {
    output::print_banner();
    loop {
        print_menu();
        let Some(answer) = prompter.ask(&format!("\n{}", Colour::Fixed(231).paint("Select option:"))) else {
            break;
        };
        let Some(choice) = MenuChoice::parse(&answer) else {
            output::error("Invalid option");
            println!("  Please select 1-{}", MenuChoice::ALL.len());
            continue;
        };
        println!();

        let outcome = match choice {
            MenuChoice::Check => session.check_connection(),
            MenuChoice::Models => session.list_models(),
            MenuChoice::Analyze => {
                let Some(path) = prompter.ask_path("Path to network data file (CSV/JSON/flow log/pcap):") else {
                    break;
                };
                let Some(path) = path else { continue };
                let Some(options) = analyze_options(prompter) else {
                    break;
                };
                println!();
                session.analyze(&path, &options)
            }
            MenuChoice::QuickAnalyze => {
                let Some(path) = prompter.ask_path("Path to network data file (CSV/JSON/flow log/pcap):") else {
                    break;
                };
                let Some(path) = path else { continue };
                output::info("Running quick analysis (ML only, no LLM)");
                let options = AnalyzeOptions {
                    use_llm: false,
                    ..AnalyzeOptions::default()
                };
                session.analyze(&path, &options)
            }
            MenuChoice::Reorganize => {
                let Some(path) = prompter.ask_path("Path to pipe-delimited flow log:") else {
                    break;
                };
                let Some(path) = path else { continue };
                let Some(output_path) = prompter.ask("Output file path (optional, press Enter for auto):") else {
                    break;
                };
                let Some(samples) = prompter.confirm("Create sample datasets for testing? (y/n) [n]:", false) else {
                    break;
                };
                println!();
                session.reorganize(&path, optional_path(output_path).as_deref(), samples)
            }
            MenuChoice::Convert => {
                let Some(path) = prompter.ask_path("Path to packet capture (pcap/pcapng/cap):") else {
                    break;
                };
                let Some(path) = path else { continue };
                let Some(output_path) = prompter.ask("Output CSV path (optional, press Enter for auto):") else {
                    break;
                };
                session.convert(&path, optional_path(output_path).as_deref()).map(|_| ())
            }
            MenuChoice::ViewConfig => {
                view_config(session);
                Ok(())
            }
            MenuChoice::Exit => break,
        };

        if let Err(err) = outcome {
            report_failure(&err);
        }
    }
    println!("\n{}\n", Colour::Green.paint("Goodbye!"));
}

/// Prompts for URL and key, checks `/health` and writes the config file. Returns
/// whether anything was saved.
pub fn configure<R: BufRead>(prompter: &mut Prompter<R>, path: &Path) -> anyhow::Result<bool> {
    println!("{}\n", Colour::Fixed(51).paint("Network Threat Detector - Configuration"));
    println!("Enter your API details (provided by your admin):\n");

    let Some(api_url) = prompter.ask("API URL (e.g., threat-detector.example.com):") else {
        return Ok(false);
    };
    let Some(api_key) = prompter.ask(&format!("API Key (starts with '{KEY_PREFIX}'):")) else {
        return Ok(false);
    };

    if !api_key.starts_with(KEY_PREFIX) {
        output::warning(&format!("API key should start with '{KEY_PREFIX}'"));
        if prompter.confirm("Continue anyway? (y/n):", false) != Some(true) {
            println!("Configuration cancelled.");
            return Ok(false);
        }
    }

    output::info("Testing connection...");
    let client = ThreatClient::new(&api_url, &api_key, Timeouts::default())?;
    match client.health() {
        Ok(_) => output::success("API is reachable"),
        Err(err) => {
            output::error(&format!("Cannot reach API: {err}"));
            if prompter.confirm("Save configuration anyway? (y/n):", false) != Some(true) {
                println!("Configuration cancelled.");
                return Ok(false);
            }
        }
    }

    let mut config = Config::load(path)?;
    config.api_url = Some(client.api_url().to_string());
    config.api_key = Some(api_key);
    config.save(path)?;

    output::success(&format!("Configuration saved to {}", path.display()));
    println!("  API URL: {}", client.api_url());
    println!("  API Key: {}", mask_key(client.api_key()));
    println!("\nTest your connection with: {}", Colour::Fixed(51).paint("ntd-client check"));
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::capture::Capabilities;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn prompter(input: &str) -> Prompter<Cursor<Vec<u8>>> {
        Prompter::new(Cursor::new(input.as_bytes().to_vec()))
    }

    #[test]
    fn test_menu_parse() {
        assert_eq!(MenuChoice::parse("1"), Some(MenuChoice::Check));
        assert_eq!(MenuChoice::parse(" 8 "), Some(MenuChoice::Exit));
        assert_eq!(MenuChoice::parse("0"), None);
        assert_eq!(MenuChoice::parse("9"), None);
        assert_eq!(MenuChoice::parse("check"), None);
    }

    #[test]
    fn test_parse_threshold() {
        assert_eq!(parse_threshold(""), DEFAULT_THRESHOLD);
        assert_eq!(parse_threshold("0.25"), 0.25);
        assert_eq!(parse_threshold("1.5"), DEFAULT_THRESHOLD);
        assert_eq!(parse_threshold("high"), DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_analyze_options_defaults() {
        let mut p = prompter("\n\n\n\n");
        let options = analyze_options(&mut p).unwrap();

        assert_eq!(options, AnalyzeOptions::default());
    }

    #[test]
    fn test_analyze_options_without_llm() {
        let mut p = prompter("n\nn\n");
        let options = analyze_options(&mut p).unwrap();

        assert!(!options.use_llm);
        assert!(!options.save);
        assert_eq!(options.llm_model, DEFAULT_LLM_MODEL);
    }

    #[test]
    fn test_prompt_eof() {
        let mut p = prompter("");

        assert_eq!(p.ask("?"), None);
    }

    #[test]
    fn test_menu_runs_reorganize_then_exits() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("flows.csv");
        std::fs::write(&input, "ts|proto|label\n1.0|tcp|Benign\n").unwrap();
        let session = Session::new(None, Capabilities { decoder: None }).unwrap();

        let script = format!("x\n5\n{}\n\nn\n8\n", input.display());
        run(&session, &mut prompter(&script));

        assert!(temp.path().join("flows_ml_ready.csv").exists());
    }

    #[test]
    fn test_configure_cancelled_on_bad_prefix() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");

        let saved = configure(&mut prompter("api.example.com\nbadkey\nn\n"), &path).unwrap();
        assert!(!saved);
        assert!(!path.exists());
    }
}
