use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::time::Duration;

mod output;
mod publisher;
mod sse_client;

use output::{print_outcome, print_status};
use publisher::StatusArgs;
use sse_client::{Connection, Received};

#[derive(Parser)]
#[command(name = "relay-test-client")]
#[command(about = "Exercise the status relay end to end")]
struct Cli {
    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish one status update to a test's status channel
    Publish {
        /// Redis URL the relay subscribes to
        #[arg(long, default_value = "redis://127.0.0.1:6379")]
        redis_url: String,

        #[arg(long)]
        test_id: String,

        #[command(flatten)]
        status: StatusArgs,
    },
    /// Follow a test's status stream until it reaches a terminal status
    Follow {
        /// Base URL of the relay (e.g., http://localhost:4000)
        #[arg(long)]
        base_url: String,

        #[arg(long)]
        test_id: String,

        /// Session token sent as a bearer token
        #[arg(long, env = "SESSION_TOKEN")]
        token: Option<String>,

        /// Give up after this many seconds without reaching a terminal status
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,

        /// Print the current status snapshot from the compute proxy before streaming
        #[arg(long)]
        resync: bool,
    },
}

/// How a `follow` session ended.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    Terminal(String),
    ErrorEvent(String),
    StreamEnded,
    TimedOut,
}

impl Outcome {
    fn exit_code(&self) -> i32 {
        match self {
            Outcome::Terminal(_) => 0,
            Outcome::ErrorEvent(_) => 1,
            Outcome::StreamEnded => 2,
            Outcome::TimedOut => 3,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    match cli.command {
        Command::Publish {
            redis_url,
            test_id,
            status,
        } => {
            let event = status.into_event()?;
            let receivers = publisher::publish(&redis_url, &test_id, &event).await?;
            println!(
                "{} Published {} for {} ({} subscriber(s))",
                "✓".green(),
                event.kind.as_str().bold(),
                test_id,
                receivers
            );
            Ok(())
        }
        Command::Follow {
            base_url,
            test_id,
            token,
            timeout_secs,
            resync,
        } => {
            if resync {
                let snapshot =
                    sse_client::fetch_status(&base_url, &test_id, token.as_deref()).await?;
                println!("{} Current status: {}", "→".blue(), snapshot);
            }

            let mut connection = Connection::establish(&base_url, &test_id, token.as_deref())?;
            println!("{} Following {}", "→".blue(), test_id);

            let outcome = follow(&mut connection, Duration::from_secs(timeout_secs)).await;
            print_outcome(&outcome);
            std::process::exit(outcome.exit_code());
        }
    }
}

async fn follow(connection: &mut Connection, timeout: Duration) -> Outcome {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let next = tokio::time::timeout_at(deadline, connection.next()).await;
        match next {
            Err(_) => return Outcome::TimedOut,
            Ok(Received::Status(event)) => {
                print_status(&event);
                if event.is_terminal() {
                    return Outcome::Terminal(event.kind.as_str().to_string());
                }
            }
            Ok(Received::Unparsed(body)) => {
                println!("{} {}", "?".yellow(), body.dimmed());
            }
            Ok(Received::Error(message)) => return Outcome::ErrorEvent(message),
            Ok(Received::Closed) => return Outcome::StreamEnded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sse::message::{StatusEvent, StatusKind};
    use tokio::sync::mpsc;

    fn connection(received: Vec<Received>) -> (Connection, mpsc::UnboundedSender<Received>) {
        let (tx, rx) = mpsc::unbounded_channel();
        for item in received {
            tx.send(item).unwrap();
        }
        (Connection::from_channel(rx), tx)
    }

    #[tokio::test]
    async fn follow_stops_at_terminal_status() {
        let (mut connection, _tx) = connection(vec![
            Received::Status(StatusEvent::new(StatusKind::Queued)),
            Received::Status(StatusEvent::new(StatusKind::Running).with_progress("1/2")),
            Received::Status(StatusEvent::new(StatusKind::Aborted)),
            Received::Status(StatusEvent::new(StatusKind::Running)),
        ]);

        let outcome = follow(&mut connection, Duration::from_secs(5)).await;
        assert_eq!(outcome, Outcome::Terminal("aborted".to_string()));
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn follow_reports_error_event() {
        let (mut connection, _tx) = connection(vec![
            Received::Unparsed("not json".to_string()),
            Received::Error("status subscription was lost".to_string()),
        ]);

        let outcome = follow(&mut connection, Duration::from_secs(5)).await;
        assert_eq!(
            outcome,
            Outcome::ErrorEvent("status subscription was lost".to_string())
        );
        assert_ne!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn follow_reports_stream_end() {
        let (mut connection, tx) = connection(vec![Received::Status(StatusEvent::new(
            StatusKind::Running,
        ))]);
        drop(tx);

        let outcome = follow(&mut connection, Duration::from_secs(5)).await;
        assert_eq!(outcome, Outcome::StreamEnded);
    }

    #[tokio::test(start_paused = true)]
    async fn follow_times_out_without_terminal_status() {
        let (mut connection, _tx) = connection(vec![]);

        let outcome = follow(&mut connection, Duration::from_secs(30)).await;
        assert_eq!(outcome, Outcome::TimedOut);
        assert_ne!(outcome.exit_code(), 0);
    }
}
