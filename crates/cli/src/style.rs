//! Terminal styling for run output: marked lines, log records, status cells.

use comfy_table::{Cell, Color};
use console::Style;

use multimerge_core::events::LogLevel;
use multimerge_core::models::RepoStatus;

fn marked(mark: &str, style: Style, msg: &str) -> String {
    format!("{} {}", style.apply_to(mark), msg)
}

pub fn success(msg: &str) -> String {
    marked("✓", Style::new().green(), msg)
}

pub fn error(msg: &str) -> String {
    marked("✗", Style::new().red(), msg)
}

pub fn warn(msg: &str) -> String {
    marked("⚠", Style::new().yellow(), msg)
}

/// Bold, for section titles and repository headers.
pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// A log line prefixed with its repository.
pub fn log_line(level: LogLevel, repo: Option<&str>, message: &str) -> String {
    let text = match repo {
        Some(repo) => format!(
            "{} {}",
            Style::new().cyan().apply_to(format!("[{}]", repo)),
            message
        ),
        None => message.to_string(),
    };
    match level {
        LogLevel::Debug => dim(&text),
        LogLevel::Info => format!("  {}", text),
        LogLevel::Success => success(&text),
        LogLevel::Warn => warn(&text),
        LogLevel::Error => error(&text),
    }
}

/// Table cell for a repository status.
pub fn status_cell(status: RepoStatus) -> Cell {
    match status {
        RepoStatus::Merged => Cell::new("✓ merged").fg(Color::Green),
        RepoStatus::ResolvedByAi => Cell::new("✓ resolved by AI").fg(Color::Green),
        RepoStatus::ConflictsRemaining => Cell::new("⚠ conflicts").fg(Color::Yellow),
        RepoStatus::Skipped => Cell::new("↷ skipped").fg(Color::Yellow),
        RepoStatus::Aborted => Cell::new("✗ aborted").fg(Color::Red),
        RepoStatus::Pending => Cell::new("· not processed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_line_keeps_repo_and_message() {
        console::set_colors_enabled(false);
        assert_eq!(log_line(LogLevel::Info, Some("svc"), "fetching"), "  [svc] fetching");
        assert_eq!(log_line(LogLevel::Error, None, "boom"), "✗ boom");
    }
}
