//! Terminal output: status lines, spinners and result tables.

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use std::time::Duration;

use crate::models::{DownloadRecord, DownloadStatus, ResultItem, SourceStatus};
use crate::utils::HistoryEntry;

/// Check if stdout is a terminal.
pub fn is_terminal() -> bool {
    std::io::stdout().is_terminal()
}

/// Icon for a source id
pub fn source_icon(source: &str) -> &'static str {
    match source {
        "arxiv" => "📝",
        "scholar" => "🧠",
        "duckduckgo" => "🔎",
        "zhihu" => "💬",
        _ => "📄",
    }
}

/// Status types for colored output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
    Warning,
    Info,
    Download,
    Search,
}

pub fn status_icon(status: Status) -> &'static str {
    match status {
        Status::Success => "✓",
        Status::Error => "✗",
        Status::Warning => "⚠",
        Status::Info => "ℹ",
        Status::Download => "↓",
        Status::Search => "🔍",
    }
}

/// Print a styled status message.
pub fn print_status(status: Status, message: &str) {
    let icon = status_icon(status);
    match status {
        Status::Success => println!("{} {}", icon.green().bold(), message),
        Status::Error => eprintln!("{} {}", icon.red().bold(), message),
        Status::Warning => println!("{} {}", icon.yellow().bold(), message),
        Status::Info => println!("{} {}", icon.cyan().bold(), message),
        Status::Download => println!("{} {}", icon.magenta(), message),
        Status::Search => println!("{} {}", icon.yellow(), message),
    }
}

/// Print a section header.
pub fn print_section(title: &str) {
    println!();
    println!("{}", format!("━━━ {} ━━━", title).bold().cyan());
}

/// Print search results header.
pub fn print_search_header(query: &str, count: usize, duration: Duration) {
    println!();
    println!(
        "{} Search results for: \"{}\"",
        status_icon(Status::Search).yellow().bold(),
        query.cyan().bold()
    );
    println!(
        "{} Found {} results in {:.2}s",
        "─".repeat(30).dimmed(),
        count.to_string().green().bold(),
        duration.as_secs_f64()
    );
    println!();
}

/// One line per source with its fan-out status
pub fn print_source_statuses<'a>(
    statuses: impl IntoIterator<Item = (&'a String, &'a SourceStatus)>,
) {
    for (source, status) in statuses {
        let label = match status {
            SourceStatus::Success => status.as_str().green().to_string(),
            SourceStatus::Failed => status.as_str().red().to_string(),
            SourceStatus::Timeout => status.as_str().yellow().to_string(),
            SourceStatus::Skipped => status.as_str().dimmed().to_string(),
        };
        println!("  {} {:<12} {}", source_icon(source), source, label);
    }
}

/// Truncate to `max_chars` characters, marking the cut with "..."
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return "...".to_string();
    }
    let kept: String = text.chars().take(max_chars - 3).collect();
    format!("{}...", kept)
}

/// Get a human-readable file size.
pub fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// Search results as a table
pub fn results_table(results: &[ResultItem]) -> Table {
    let mut table = new_table(vec!["#", "Title", "Source", "Category", "Score", "URL"]);
    for (i, item) in results.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(truncate_with_ellipsis(&item.title, 60)).add_attribute(Attribute::Bold),
            Cell::new(&item.source),
            Cell::new(item.category.as_str()),
            Cell::new(
                item.relevance_score
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(truncate_with_ellipsis(&item.url, 60)),
        ]);
    }
    table
}

fn download_status_cell(status: DownloadStatus) -> Cell {
    let color = match status {
        DownloadStatus::Completed => Color::Green,
        DownloadStatus::Failed => Color::Red,
        DownloadStatus::Downloading => Color::Cyan,
        DownloadStatus::Pending => Color::Yellow,
    };
    Cell::new(status.as_str()).fg(color)
}

/// Download records as a table
pub fn downloads_table(records: &[DownloadRecord]) -> Table {
    let mut table = new_table(vec!["ID", "Artifact", "Title", "Status", "Progress", "Size", "Created"]);
    for record in records {
        table.add_row(vec![
            Cell::new(record.id),
            Cell::new(&record.artifact_id),
            Cell::new(truncate_with_ellipsis(&record.title, 40)),
            download_status_cell(record.status),
            Cell::new(format!("{}%", record.progress)),
            Cell::new(format_file_size(record.file_size)),
            Cell::new(record.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }
    table
}

/// Search history as a table
pub fn history_table(entries: &[HistoryEntry]) -> Table {
    let mut table = new_table(vec!["ID", "Query", "Results", "Time range", "When"]);
    for entry in entries {
        table.add_row(vec![
            Cell::new(entry.id),
            Cell::new(truncate_with_ellipsis(&entry.query, 50)),
            Cell::new(entry.result_count),
            Cell::new(entry.filters.time_range.as_deref().unwrap_or("-")),
            Cell::new(entry.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }
    table
}

/// Spinner for long operations; draws nothing when stdout is not a terminal
pub struct Spinner {
    pb: indicatif::ProgressBar,
}

impl Spinner {
    pub fn new(msg: &str) -> Self {
        let pb = if is_terminal() {
            indicatif::ProgressBar::new_spinner()
        } else {
            indicatif::ProgressBar::hidden()
        };
        if let Ok(style) = indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "));
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    pub fn set_message(&self, msg: &str) {
        self.pb.set_message(msg.to_string());
    }

    pub fn finish_with_success(&self, msg: &str) {
        self.pb
            .finish_with_message(format!("{} {}", status_icon(Status::Success).green(), msg));
    }

    pub fn finish_with_error(&self, msg: &str) {
        self.pb
            .finish_with_message(format!("{} {}", status_icon(Status::Error).red(), msg));
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}
