//! Error Line Extraction
//!
//! Turns decoded log text into [`LogRecord`]s in two passes: a cheap
//! substring filter applied to every line, then a strict regex and timestamp
//! parse applied only to the lines that survive it.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use loglens_core::{FileId, LogRecord, MessageType};

/// Substrings a candidate line must contain
pub const ERROR_MARKER: &str = "Error:";
pub const SEVERITY_MARKER: &str = "Severity:";

/// Leading timestamp layout, e.g. `2024-01-01 10:00:00.123456` or the
/// centisecond `2024-01-01 10:00:00.12` SQL Server writes
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

static ERROR_SEVERITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Error:\s*(\d+),\s*Severity:\s*(\d+)").expect("error/severity pattern is valid")
});

static TIMESTAMP_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2}\.[0-9]{1,6}$")
        .expect("timestamp pattern is valid")
});

static LINE_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\r\n|[\n\r\x0B\x0C\x1C-\x1E\x{85}\x{2028}\x{2029}]").expect("line break pattern is valid")
});

/// Split `text` at every line boundary: `\r\n`, bare `\n` or `\r`, the
/// vertical tab and form feed, the file/group/record separators, NEL and the
/// Unicode line and paragraph separators. A final boundary does not start an
/// extra empty line.
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let lines = if text.is_empty() { 0 } else { usize::MAX };
    LINE_BREAK.split(strip_final_break(text)).take(lines)
}

fn strip_final_break(text: &str) -> &str {
    if let Some(body) = text.strip_suffix("\r\n") {
        return body;
    }
    text.strip_suffix(is_line_break).unwrap_or(text)
}

fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\x0B' | '\x0C' | '\x1C'..='\x1E' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

/// Extracts structured error records from log lines
#[derive(Debug, Clone, Copy, Default)]
pub struct LineExtractor;

impl LineExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Keep the lines that contain both `Error:` and `Severity:`, in order
    pub fn filter_candidate_lines<'a, I>(&self, lines: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        lines.into_iter().filter(|line| is_candidate(line)).collect()
    }

    /// Parse one line into a record. Lines that do not have the expected
    /// shape yield `None`.
    pub fn parse_line(&self, file_id: FileId, line: &str) -> Option<LogRecord> {
        if line.trim().is_empty() {
            return None;
        }

        let captures = ERROR_SEVERITY.captures(line)?;
        let error_code = captures[1].parse::<i32>().ok()?;
        let severity = captures[2].parse::<i32>().ok()?;

        let mut parts = line.splitn(3, ' ');
        let (date, time) = (parts.next()?, parts.next()?);
        parts.next()?;

        let stamp = format!("{} {}", date, time);
        let Some(logged_at) = parse_timestamp(&stamp) else {
            debug!(file_id = %file_id, line = %line, "Skipping line with invalid timestamp");
            return None;
        };

        Some(LogRecord {
            file_id,
            logged_at,
            message_type: MessageType::Error,
            error_code,
            severity,
        })
    }

    /// Filter then parse every line of `text`, preserving line order
    pub fn extract(&self, file_id: FileId, text: &str) -> Vec<LogRecord> {
        self.filter_candidate_lines(split_lines(text))
            .into_iter()
            .filter_map(|line| self.parse_line(file_id, line))
            .collect()
    }
}

fn is_candidate(line: &str) -> bool {
    line.contains(ERROR_MARKER) && line.contains(SEVERITY_MARKER)
}

/// Strict `YYYY-MM-DD HH:MM:SS.f`, with one to six fractional digits
pub fn parse_timestamp(stamp: &str) -> Option<NaiveDateTime> {
    if !TIMESTAMP_SHAPE.is_match(stamp) {
        return None;
    }
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}
