//! Summaries of a classification result: label histogram, ranked threats, and LLM
//! findings paired with their predictions.
use ansi_term::Colour;
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::analyser::utils::value_counts;
use crate::client::{ClassificationResult, LlmAnalysis, Prediction};

/// How many threats the ranked list shows.
pub const TOP_THREATS: usize = 10;

#[derive(Debug, Error)]
pub enum ReportError {
    /// `llm_analysis` points at a prediction index that does not exist.
    #[error("llm_analysis references record {record_id} but only {predictions} predictions were returned")]
    Misaligned { record_id: usize, predictions: usize },

    #[error("could not save results to {path}: {reason}")]
    Save { path: PathBuf, reason: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ThreatCount {
    pub label: String,
    pub count: usize,
    /// Fraction of `total_records`, 0 when the result is empty.
    pub share: f64,
}

/// Predictions grouped by label, most frequent first; ties keep first-seen order.
pub fn threat_distribution(result: &ClassificationResult) -> Vec<ThreatCount> {
    value_counts(result.predictions.iter().map(|p| p.prediction.clone()))
        .into_iter()
        .map(|(label, count)| ThreatCount {
            share: if result.total_records > 0 {
                count as f64 / result.total_records as f64
            } else {
                0.0
            },
            label,
            count,
        })
        .collect()
}

/// Threat predictions by confidence, highest first; equal confidence falls back to
/// ascending record id.
pub fn top_threats(result: &ClassificationResult, limit: usize) -> Vec<&Prediction> {
    let mut threats: Vec<&Prediction> = result.predictions.iter().filter(|p| p.is_threat).collect();
    threats.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then(a.record_id.cmp(&b.record_id))
    });
    threats.truncate(limit);
    threats
}

/// Pairs each LLM analysis with `predictions[record_id]`.
pub fn llm_findings(result: &ClassificationResult) -> Result<Vec<(&LlmAnalysis, &Prediction)>, ReportError> {
    let Some(analyses) = &result.llm_analysis else {
        return Ok(Vec::new());
    };

    analyses
        .iter()
        .map(|analysis| {
            result
                .predictions
                .get(analysis.record_id)
                .map(|prediction| (analysis, prediction))
                .ok_or(ReportError::Misaligned {
                    record_id: analysis.record_id,
                    predictions: result.predictions.len(),
                })
        })
        .collect()
}

fn rule(colour: Colour, glyph: &str) -> String {
    colour.paint(glyph.repeat(70)).to_string()
}

/// Renders the whole report. Fails without printing anything if the LLM section is
/// misaligned with the predictions.
pub fn render(result: &ClassificationResult) -> Result<String, ReportError> {
    let findings = llm_findings(result)?;
    let cyan = Colour::Fixed(51);
    let white = Colour::Fixed(231);
    let red = Colour::Fixed(196);
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "\n{}", rule(cyan, "="));
    let _ = writeln!(out, "{}", white.paint("ANALYSIS RESULTS"));
    let _ = writeln!(out, "{}\n", rule(cyan, "="));

    let _ = writeln!(out, "Total Records:    {}", result.total_records);
    let _ = writeln!(out, "Threats Detected: {}", red.paint(result.threats_detected.to_string()));
    let _ = writeln!(out, "Avg Confidence:   {:.2}%", result.average_confidence * 100.0);

    let _ = writeln!(out, "\n{}", cyan.paint("Threat Distribution:"));
    for entry in threat_distribution(result) {
        let colour = if entry.label == "normal" { Colour::Green } else { red };
        let _ = writeln!(
            out,
            "  {} {:5} ({:.1}%)",
            colour.paint(format!("{:15}", entry.label)),
            entry.count,
            entry.share * 100.0
        );
    }

    let threats = top_threats(result, TOP_THREATS);
    if !threats.is_empty() {
        let _ = writeln!(out, "\n{}\n", cyan.paint("Top 10 Threats (by confidence):"));
        let _ = writeln!(out, "{:<10} {:<20} {:<12}", "Record", "Threat Type", "Confidence");
        let _ = writeln!(out, "{}", "=".repeat(45));
        for prediction in threats {
            let _ = writeln!(
                out,
                "{:<10} {:<20} {:>10.2}%",
                prediction.record_id,
                prediction.prediction,
                prediction.confidence * 100.0
            );
        }
    }

    if !findings.is_empty() {
        let yellow = Colour::Fixed(226);
        let _ = writeln!(out, "\n{}", rule(cyan, "="));
        let _ = writeln!(out, "{}", white.paint("DETAILED LLM ANALYSIS"));
        let _ = writeln!(out, "{}\n", rule(cyan, "="));
        for (analysis, prediction) in findings {
            let _ = writeln!(out, "{}", rule(yellow, "\u{2500}"));
            let _ = writeln!(
                out,
                "{} - {} ({:.2}%)",
                white.paint(format!("Record #{}", analysis.record_id)),
                red.paint(&prediction.prediction),
                prediction.confidence * 100.0
            );
            let _ = writeln!(out, "{}", rule(yellow, "\u{2500}"));
            let _ = writeln!(out, "{}\n", analysis.analysis);
        }
    }

    Ok(out)
}

/// Writes the service response as pretty JSON, exactly as it was received.
pub fn save_result(raw: &serde_json::Value, path: &Path) -> Result<(), ReportError> {
    let save_error = |reason: String| ReportError::Save {
        path: path.to_path_buf(),
        reason,
    };
    let json = serde_json::to_string_pretty(raw).map_err(|e| save_error(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| save_error(e.to_string()))?;
    log::info!("Saved results to {}", path.display());
    Ok(())
}
