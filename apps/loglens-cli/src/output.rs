//! Output formatting utilities

use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

use loglens_infra::UploadSummary;
use loglens_ingestion::{FileOutcome, FileReport, FinalizeStatus, RunSummary};

/// Output format types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

/// Print a key-value pair
pub fn key_value(key: &str, value: &str) {
    println!("{}: {}", key.bold(), value);
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.bold().underline());
}

/// Format duration in human-readable format
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) / 1000;
        format!("{}m {}s", minutes, seconds)
    }
}

/// Truncate a string to a maximum number of characters
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Tabled)]
struct FileRow {
    #[tabled(rename = "File")]
    name: String,
    #[tabled(rename = "Server")]
    server: String,
    #[tabled(rename = "Encoding")]
    encoding: String,
    #[tabled(rename = "Records")]
    records: usize,
    #[tabled(rename = "Batches")]
    batches: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&FileReport> for FileRow {
    fn from(report: &FileReport) -> Self {
        let status = match &report.outcome {
            FileOutcome::WithData => "ingested".to_string(),
            FileOutcome::NoMatchingLines => "no errors".to_string(),
            FileOutcome::Failed { stage, error } => format!("{} failed: {}", stage, truncate(error, 40)),
        };
        let encoding = match (&report.encoding, report.decode_fallback_used) {
            (Some(name), true) => format!("{} (fallback)", name),
            (Some(name), false) => name.clone(),
            (None, _) => "-".to_string(),
        };

        Self {
            name: truncate(&report.name, 48),
            server: report.server.clone(),
            encoding,
            records: report.records_extracted,
            batches: format!("{}/{}", report.batches.batches_flushed, report.batches.batches_flushed + report.batches.batches_failed),
            time: format_duration(report.processing_time_ms),
            status,
        }
    }
}

/// Render the result of `loglens ingest`
pub fn print_run_summary(summary: &RunSummary, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(summary);
    }

    section("Ingestion run");
    key_value("Run", &summary.run_id.to_string());
    key_value("Principal", &summary.principal);
    let elapsed = (summary.finished_at - summary.started_at).num_milliseconds().max(0) as u64;
    key_value("Duration", &format_duration(elapsed));

    if summary.files.is_empty() {
        println!("{}", "No log files found.".dimmed());
        return Ok(());
    }

    let mut files: Vec<&FileReport> = summary.files.iter().collect();
    files.sort_by(|a, b| a.name.cmp(&b.name));
    let rows: Vec<FileRow> = files.into_iter().map(FileRow::from).collect();
    println!("{}", Table::new(rows));

    section("Totals");
    key_value("Files", &summary.total_files().to_string());
    key_value("With errors", &summary.files_with_data.to_string());
    key_value("Without errors", &summary.files_without_matches.to_string());
    key_value("Failed", &summary.files_failed.to_string());
    key_value("Records persisted", &summary.records_persisted.to_string());
    if summary.batches_failed > 0 {
        warning(&format!("{} batch(es) could not be written", summary.batches_failed));
    }

    match &summary.finalize {
        FinalizeStatus::Completed => success("Finalize procedure completed"),
        FinalizeStatus::Failed(e) => error(&format!("Finalize procedure failed: {}", e)),
        FinalizeStatus::Skipped => warning("Finalize procedure skipped"),
    }

    Ok(())
}

#[derive(Tabled)]
struct UploadRow {
    #[tabled(rename = "File")]
    name: String,
    #[tabled(rename = "Result")]
    result: String,
}

/// Render the result of `loglens upload`
pub fn print_upload_summary(summary: &UploadSummary, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(summary);
    }

    if summary.total() == 0 {
        println!("{}", "No files to upload.".dimmed());
        return Ok(());
    }

    let rows: Vec<UploadRow> = summary
        .uploaded
        .iter()
        .map(|f| UploadRow {
            name: f.name.clone(),
            result: format!("{} bytes", f.size_bytes),
        })
        .chain(summary.failed.iter().map(|f| UploadRow {
            name: f.name.clone(),
            result: format!("failed: {}", truncate(&f.error, 60)),
        }))
        .collect();
    println!("{}", Table::new(rows));

    if summary.failed.is_empty() {
        success(&format!("Uploaded {} file(s)", summary.uploaded.len()));
    } else {
        error(&format!(
            "{} of {} file(s) failed to upload",
            summary.failed.len(),
            summary.total()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(250), "250ms");
        assert_eq!(format_duration(1500), "1.5s");
        assert_eq!(format_duration(125_000), "2m 5s");
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ÉÉÉÉÉÉÉÉÉÉ", 6), "ÉÉÉ...");
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("plain".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
