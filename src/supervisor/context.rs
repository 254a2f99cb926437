//! Log classification and error-context extraction
//!
//! Pure functions over the fetched log tail; the probe decides when to call
//! them.

use crate::config::DetectionMode;

/// Header line that opens a runtime traceback
pub const TRACEBACK_HEADER: &str = "Traceback (most recent call last)";

/// Case-insensitive markers of an anomalous log line
pub const ERROR_MARKERS: &[&str] = &["error", "exception", "failed", "traceback", "critical"];

/// Substrings of the final line of a traceback
const TRACEBACK_END_MARKERS: &[&str] = &["Error:", "Exception:"];

/// Lines kept before and after each marker line
const MARKER_WINDOW: usize = 3;

/// Whether a single line carries an error marker
pub fn line_has_marker(line: &str) -> bool {
    let lower = line.to_lowercase();
    ERROR_MARKERS.iter().any(|m| lower.contains(m))
}

pub fn has_traceback(log: &str) -> bool {
    log.contains(TRACEBACK_HEADER)
}

/// Classify a log tail under the given detection mode
pub fn detect(log: &str, mode: DetectionMode) -> bool {
    match mode {
        DetectionMode::Keywords => {
            let lower = log.to_lowercase();
            ERROR_MARKERS.iter().any(|m| lower.contains(m))
        }
        DetectionMode::Traceback => has_traceback(log),
    }
}

/// Collect traceback blocks: every line from a header up to and including
/// the first unindented line that names the error. Only the last
/// `max_lines` lines are kept.
pub fn extract_traceback(log: &str, max_lines: usize) -> String {
    let mut collected = Vec::new();
    let mut in_traceback = false;

    for line in log.lines() {
        if line.contains(TRACEBACK_HEADER) {
            in_traceback = true;
        }

        if in_traceback {
            collected.push(line);
            let unindented = !line.starts_with(' ') && !line.starts_with('\t');
            if unindented
                && !line.trim().is_empty()
                && TRACEBACK_END_MARKERS.iter().any(|m| line.contains(m))
            {
                in_traceback = false;
            }
        }
    }

    tail_lines(&collected, max_lines)
}

/// Concatenate a 3-before/3-after window around every marker line, then
/// keep the last `max_lines` lines. Overlapping windows repeat lines.
pub fn extract_marker_windows(log: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = log.lines().collect();
    let mut collected = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if line_has_marker(line) {
            let start = i.saturating_sub(MARKER_WINDOW);
            let end = (i + MARKER_WINDOW + 1).min(lines.len());
            collected.extend_from_slice(&lines[start..end]);
        }
    }

    tail_lines(&collected, max_lines)
}

fn tail_lines(lines: &[&str], max_lines: usize) -> String {
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

/// Last `max_chars` characters of `text`, cut on a char boundary
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    match text.char_indices().nth(total - max_chars) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}
