use actiongraph::{ActionState, RunSummary};
use colored::Colorize;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print the final state of every action followed by the totals
pub fn summary(summary: &RunSummary) {
    header("Summary");
    for report in &summary.actions {
        let marker = match report.state {
            ActionState::Succeeded => "✓".green(),
            ActionState::Failed => "✗".red(),
            ActionState::Pending | ActionState::Dispatched => "-".dimmed(),
        };
        println!("  {marker} {}", report.name);
        if let Some(error) = &report.error {
            println!("      {}", error.dimmed());
        }
    }
    println!();
    println!("{}", totals(summary));
}

/// One-line totals, e.g. "3 succeeded, 1 failed, 2 skipped"
pub fn totals(summary: &RunSummary) -> String {
    let mut parts = vec![format!("{} succeeded", summary.succeeded)];
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed));
    }
    if summary.skipped > 0 {
        parts.push(format!("{} skipped", summary.skipped));
    }
    parts.join(", ")
}

/// "1 action", "2 actions"
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}
