//! Terminal rendering of a run: live event log, progress bar, final table.

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;

use multimerge_core::events::{LogLevel, MergeEvent};
use multimerge_core::models::{RepoOutcome, RepoStatus, RunReport};

use crate::style;

/// Drain `rx` until every sender is gone, printing above a progress bar.
pub async fn render_events(mut rx: UnboundedReceiver<MergeEvent>, total: usize, verbose: bool) {
    let bar = ProgressBar::new(total as u64);
    if let Ok(bar_style) =
        ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {msg}")
    {
        bar.set_style(bar_style.progress_chars("=> "));
    }

    while let Some(event) = rx.recv().await {
        match event {
            MergeEvent::RepoStarted { name, .. } => {
                bar.set_message(name.clone());
                bar.println(style::header(&format!("▶ {}", name)));
            }
            MergeEvent::Log(record) => {
                if record.level == LogLevel::Debug && !verbose {
                    continue;
                }
                bar.println(style::log_line(
                    record.level,
                    record.repo.as_deref(),
                    &record.message,
                ));
            }
            MergeEvent::Notification { title, message } => {
                bar.println(style::error(&format!("{}: {}", title, message)));
            }
            MergeEvent::RepoFinished(_) => bar.inc(1),
        }
    }

    bar.finish_and_clear();
}

/// Print the per-repository summary table and the run's summary line.
pub fn print_report(report: &RunReport) {
    println!();
    println!("{}", style::header("Merge Summary"));
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Repository",
        "Status",
        "Ref",
        "AI resolved",
        "Conflicts",
        "Stash",
        "Pushed",
    ]);

    for outcome in &report.outcomes {
        table.add_row(vec![
            Cell::new(&outcome.repo),
            style::status_cell(outcome.status),
            Cell::new(outcome.merge_ref.as_deref().unwrap_or("—")),
            Cell::new(outcome.ai_resolved.len()),
            Cell::new(outcome.remaining_conflicts.len()),
            Cell::new(stash_label(outcome)),
            Cell::new(if outcome.pushed { "yes" } else { "—" }),
        ]);
    }
    println!("{}", table);

    let problems: Vec<&RepoOutcome> = report
        .outcomes
        .iter()
        .filter(|o| !o.errors.is_empty() || o.stash_left_in_place())
        .collect();
    if !problems.is_empty() {
        println!();
        for outcome in problems {
            for err in &outcome.errors {
                println!("{}", style::error(&format!("{}: {}", outcome.repo, err)));
            }
            for path in &outcome.remaining_conflicts {
                println!("    {}", style::dim(path));
            }
            if outcome.stash_left_in_place() {
                println!(
                    "{}",
                    style::warn(&format!(
                        "{}: stashed changes are still on the stash stack (git stash list)",
                        outcome.repo
                    ))
                );
            }
        }
    }

    println!();
    let elapsed = report
        .completed_at
        .map(|done| (done - report.started_at).num_seconds())
        .unwrap_or(0);
    let line = format!(
        "{} ({} merged, {} resolved by AI, {} with conflicts, {} skipped; {}s)",
        report.summary,
        report.count(RepoStatus::Merged),
        report.count(RepoStatus::ResolvedByAi),
        report.count(RepoStatus::ConflictsRemaining),
        report.count(RepoStatus::Skipped),
        elapsed,
    );
    if report.is_success() {
        println!("{}", style::success(&line));
    } else {
        println!("{}", style::warn(&line));
    }
}

fn stash_label(outcome: &RepoOutcome) -> &'static str {
    match (outcome.stashed, outcome.stash_popped) {
        (false, _) => "—",
        (true, true) => "restored",
        (true, false) => "LEFT IN PLACE",
    }
}
