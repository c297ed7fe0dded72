//! CLI output formatting

use crate::{
    cache::CacheEntry,
    core::{state::RunStatus, Pipeline, Run},
    execution::ExecutionEvent,
    persistence::RunSummary,
};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static MAIL: Emoji<'_, '_> = Emoji("📨 ", "@ ");

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Pending => style("PENDING").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Success => style("SUCCESS").green().to_string(),
        RunStatus::Failure => style("FAILURE").red().to_string(),
        RunStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

fn status_icon(status: RunStatus) -> Emoji<'static, 'static> {
    match status {
        RunStatus::Success => CHECK,
        RunStatus::Failure => CROSS,
        RunStatus::Running => SPINNER,
        RunStatus::Cancelled => WARN,
        RunStatus::Pending => INFO,
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            run_id,
            pipeline_name,
        } => format!(
            "{} Starting {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(short_id(run_id)).dim()
        ),
        ExecutionEvent::StageStarted { stage_name, .. } => {
            format!("{} stage {}", INFO, style(stage_name).bold())
        }
        ExecutionEvent::StageSkipped {
            stage_name, reason, ..
        } => format!(
            "{} stage {} skipped: {}",
            SKIP,
            style(stage_name).dim(),
            style(reason).dim()
        ),
        ExecutionEvent::StageCompleted {
            stage_name, status, ..
        } => format!("{} stage {} {:?}", INFO, style(stage_name).bold(), status),
        ExecutionEvent::TaskStarted { task_name } => {
            format!("  {} {}", SPINNER, style(task_name).cyan())
        }
        ExecutionEvent::TaskRetrying {
            task_name,
            attempt,
            max_attempts,
            error,
        } => format!(
            "  {} {} (attempt {}/{}): {}",
            WARN,
            style(task_name).yellow(),
            attempt,
            max_attempts,
            style(error).dim()
        ),
        ExecutionEvent::TaskCompleted {
            task_name,
            cache_hit,
            ..
        } => {
            if *cache_hit {
                format!("  {} {} {}", CHECK, style(task_name).green(), style("(cached)").dim())
            } else {
                format!("  {} {}", CHECK, style(task_name).green())
            }
        }
        ExecutionEvent::TaskFailed { task_name, error } => {
            format!("  {} {}: {}", CROSS, style(task_name).red(), style(error).dim())
        }
        ExecutionEvent::TaskSkipped { task_name, reason } => {
            format!("  {} {}: {}", SKIP, style(task_name).dim(), style(reason).dim())
        }
        ExecutionEvent::NotificationSent { channel, .. } => {
            format!("{} Report delivered via {}", MAIL, style(channel).cyan())
        }
        ExecutionEvent::NotificationFailed { channel, error, .. } => format!(
            "{} Report delivery via {} failed: {}",
            WARN,
            style(channel).yellow(),
            style(error).dim()
        ),
        ExecutionEvent::RunCompleted {
            run_id,
            pipeline_name,
            status,
        } => format!(
            "{} {} ({}) {}",
            status_icon(*status),
            style(pipeline_name).bold(),
            style(short_id(run_id)).dim(),
            format_status(*status)
        ),
    }
}

/// One line per finished run
pub fn format_run(run: &Run) -> String {
    format!(
        "{} {} - {} - {}",
        status_icon(run.overall_status),
        style(short_id(&run.id)).dim(),
        style(&run.pipeline_name).bold(),
        format_status(run.overall_status)
    )
}

/// Format a history entry for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let duration = summary
        .duration_secs()
        .and_then(|secs| u64::try_from(secs).ok())
        .map(|secs| format_duration(std::time::Duration::from_secs(secs)))
        .unwrap_or_else(|| "-".to_string());

    let mut line = format!(
        "{} {} - {} - {} - {} {} - {}",
        status_icon(summary.status),
        style(short_id(&summary.run_id)).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.trigger_kind,
        style(crate::core::event::short_sha(&summary.commit_sha)).cyan(),
        style(duration).dim()
    );
    if summary.notified == Some(false) {
        line.push_str(&format!(" {} report not delivered", WARN));
    }
    line
}

/// Describe a configured pipeline
pub fn format_pipeline(pipeline: &Pipeline) -> String {
    let stages: Vec<String> = pipeline
        .stages()
        .iter()
        .map(|stage| {
            if stage.blocking {
                format!("{}!", stage.name)
            } else {
                stage.name.clone()
            }
        })
        .collect();

    format!(
        "  {} on {}\n    stages: {}",
        style(&pipeline.name).bold(),
        style(pipeline.trigger.describe()).cyan(),
        stages.join(" -> ")
    )
}

/// Format a cache entry for display
pub fn format_cache_entry(entry: &CacheEntry) -> String {
    format!(
        "  {} {} {}",
        style(&entry.key).cyan(),
        style(&entry.task_name).bold(),
        style(entry.stored_at.to_rfc3339()).dim()
    )
}

pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
