use ansi_term::Colour;
use chrono::{DateTime, Utc};

use crate::analyser::core::CaptureConversion;
use crate::analyser::flow::{FlowSummary, ReorganizedFiles};
use crate::analyser::generate::GeneratedFiles;
use crate::analyser::table::Table;
use crate::analyser::utils::value_counts;
use crate::client::ClassificationResult;
use crate::ui::report::{self, ReportError};

pub fn success(msg: &str) {
    println!("{}", Colour::Green.paint(format!("\u{2713} {msg}")));
}

pub fn error(msg: &str) {
    println!("{}", Colour::Fixed(196).paint(format!("\u{2717} {msg}")));
}

pub fn info(msg: &str) {
    println!("{}", Colour::Blue.paint(format!("\u{2139} {msg}")));
}

pub fn warning(msg: &str) {
    println!("{}", Colour::Fixed(226).paint(format!("\u{26A0} {msg}")));
}

pub fn heading(title: &str) {
    let rule = Colour::Fixed(51).paint("=".repeat(70));
    println!("\n{rule}");
    println!("{}", Colour::Fixed(231).paint(title));
    println!("{rule}\n");
}

/// Prints the classification report, or nothing if the result is malformed.
pub fn print_results(result: &ClassificationResult) -> Result<(), ReportError> {
    let text = report::render(result)?;
    print!("{text}");
    Ok(())
}

fn print_counts(title: &str, counts: &[(String, usize)], total: usize) {
    if counts.is_empty() {
        return;
    }
    println!("\n{}", Colour::Fixed(51).paint(title));
    for (value, count) in counts {
        let share = if total > 0 { *count as f64 / total as f64 * 100.0 } else { 0.0 };
        println!("  {value}: {count} ({share:.2}%)");
    }
}

pub fn print_flow_summary(summary: &FlowSummary) {
    heading("DATA STATISTICS");
    println!("Total records: {}", summary.rows);
    println!("Total columns: {}", summary.columns);
    print_counts("Label distribution:", &summary.labels, summary.rows);
    print_counts("Detailed label distribution (top 10):", &summary.detailed_labels, summary.rows);
    print_counts("Protocol distribution:", &summary.protocols, summary.rows);

    heading("DATA QUALITY");
    if summary.missing.is_empty() {
        success("No missing values!");
    } else {
        print_counts("Columns with missing values:", &summary.missing, summary.rows);
    }
    if summary.duplicate_rows > 0 {
        warning(&format!("Found {} duplicate rows", summary.duplicate_rows));
    } else {
        success("No duplicate rows");
    }
}

pub fn print_reorganized(files: &ReorganizedFiles) {
    print_flow_summary(&files.flows.summary);

    heading("SAVED FILES");
    success(&format!("Full dataset saved to: {}", files.full_path.display()));
    println!("  Rows: {}  Columns: {}", files.flows.full.len(), files.flows.full.width());
    success(&format!("ML-ready dataset saved to: {}", files.features_path.display()));
    println!("  Rows: {}  Columns: {}", files.flows.features.len(), files.flows.features.width());

    heading("SAMPLE DATA (first 5 rows)");
    print_head(&files.flows.features, 5);
}

pub fn print_conversion(conversion: &CaptureConversion) {
    println!("\nStatistics:");
    println!("  Total packets: {}", conversion.features.len());
    println!("  Unique connections: {}", conversion.unique_connections());

    let first = conversion.packets.iter().map(|p| p.record.timestamp).reduce(f64::min);
    let last = conversion.packets.iter().map(|p| p.record.timestamp).reduce(f64::max);
    if let (Some(first), Some(last)) = (first, last) {
        println!("  Time span: {} .. {}", format_epoch(first), format_epoch(last));
    }

    println!("  Protocol distribution:");
    for (protocol, count) in conversion.protocol_distribution() {
        println!("    {protocol}: {count}");
    }
}

fn format_epoch(seconds: f64) -> String {
    let micros = (seconds * 1_000_000.0) as i64;
    DateTime::<Utc>::from_timestamp_micros(micros)
        .map(|time| time.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| format!("{seconds}"))
}

pub fn print_generated(files: &GeneratedFiles) {
    success(&format!("Generated {} records", files.table.len()));
    success(&format!("Saved to: {}", files.path.display()));

    let labels = files
        .table
        .column("label")
        .map(|cells| value_counts(cells.into_iter().map(|cell| cell.to_string())))
        .unwrap_or_default();
    print_counts("Label distribution:", &labels, files.table.len());

    println!("\n{}", Colour::Fixed(51).paint("Sample statistics:"));
    println!("  {:<18} {:>12} {:>12} {:>12}", "column", "mean", "min", "max");
    for column in files.table.columns() {
        let Some(cells) = files.table.column(column) else { continue };
        let numbers: Vec<f64> = cells.iter().filter_map(|cell| cell.as_f64()).collect();
        if numbers.is_empty() || numbers.len() != cells.len() {
            continue;
        }
        let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
        let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
        let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        println!("  {column:<18} {mean:>12.3} {min:>12.3} {max:>12.3}");
    }

    success(&format!(
        "Test file created: {} ({} records)",
        files.test_path.display(),
        files.test_rows
    ));
}

/// Plain column-aligned dump of the first `rows` rows.
pub fn print_head(table: &Table, rows: usize) {
    let widths: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .map(|(i, column)| {
            table
                .rows()
                .iter()
                .take(rows)
                .map(|row| row[i].to_string().len())
                .chain(std::iter::once(column.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header: Vec<String> = table
        .columns()
        .iter()
        .zip(&widths)
        .map(|(column, &width)| format!("{column:>width$}"))
        .collect();
    println!("{}", header.join(" "));

    for row in table.rows().iter().take(rows) {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(value, &width)| format!("{:>width$}", value.to_string()))
            .collect();
        println!("{}", cells.join(" "));
    }
}

pub fn print_banner() {
    let lines = [
        (196, r" ███╗   ██╗ ████████╗ ██████╗ "),
        (196, r" ████╗  ██║ ╚══██╔══╝ ██╔══██╗"),
        (203, r" ██╔██╗ ██║    ██║    ██║  ██║"),
        (210, r" ██║╚██╗██║    ██║    ██║  ██║"),
        (217, r" ██║ ╚████║    ██║    ██████╔╝"),
        (231, r" ╚═╝  ╚═══╝    ╚═╝    ╚═════╝ "),
    ];
    println!("\n");
    for (colour, line) in lines {
        println!("        {}", Colour::Fixed(colour).paint(line));
    }
    println!();
    println!("              {}", Colour::Fixed(51).paint("network threat detector"));
    println!("\n");
}
