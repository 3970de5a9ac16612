use crate::Outcome;
use colored::*;
use sse::message::{StatusEvent, StatusKind};

pub fn print_status(event: &StatusEvent) {
    let label = match &event.kind {
        StatusKind::Completed { .. } => event.kind.as_str().bright_green().bold(),
        StatusKind::Error { .. } | StatusKind::NotFound => event.kind.as_str().bright_red().bold(),
        StatusKind::Aborted => event.kind.as_str().yellow().bold(),
        _ => event.kind.as_str().cyan(),
    };

    let mut line = format!("{} {}", "•".blue(), label);
    if let Some(progress) = &event.progress {
        line.push_str(&format!(" {}", progress.dimmed()));
    }
    if let Some(runtime) = event.runtime_seconds {
        line.push_str(&format!(" ({runtime:.1}s)"));
    }
    match &event.kind {
        StatusKind::Error {
            message: Some(message),
        } => line.push_str(&format!(": {}", message.red())),
        StatusKind::Completed {
            results: Some(results),
        } => line.push_str(&format!("\n  {}", results.to_string().dimmed())),
        _ => {}
    }
    println!("{line}");
}

pub fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Terminal(status) => println!(
            "\n{}",
            format!("Test finished: {status} ✓").bright_green().bold()
        ),
        Outcome::ErrorEvent(message) => println!(
            "\n{}",
            format!("Relay error: {message} ✗").bright_red().bold()
        ),
        Outcome::StreamEnded => println!(
            "\n{}",
            "Stream ended before a terminal status ✗".bright_red().bold()
        ),
        Outcome::TimedOut => println!(
            "\n{}",
            "Timed out waiting for a terminal status ✗".bright_red().bold()
        ),
    }
}
