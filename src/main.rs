use std::time::Instant;

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast::{self, error::TryRecvError};

use livesync::config::Config;
use livesync::engine::{EngineEvent, Notice, ResetOutcome, SyncEngine, SyncReport, WriteOutcome};
use livesync::filter::{self, RangeSelector};
use livesync::record::Person;
use livesync::report::{self, PersonSync, Report, ReportMetadata};

#[derive(Parser)]
#[command(
    name = "livesync",
    version,
    about = "Track live sessions, synced with a remote sheet store"
)]
struct Cli {
    /// Print a JSON report instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replace both local collections with the remote lists.
    Sync,
    /// Record one live session.
    Add(AddArgs),
    /// Clear every record, locally and remotely.
    Reset {
        /// Confirm the reset. Nothing is touched without it.
        #[arg(long)]
        yes: bool,
    },
    /// One person's sessions and totals.
    Show {
        person: Person,
        #[command(flatten)]
        period: PeriodArgs,
        /// Use the local cache without syncing first.
        #[arg(long)]
        offline: bool,
    },
    /// Totals for each visible person.
    Dashboard {
        #[command(flatten)]
        period: PeriodArgs,
        /// Leave this person out. Repeatable.
        #[arg(long)]
        hide: Vec<Person>,
        #[arg(long)]
        offline: bool,
    },
    /// Check that the remote store answers.
    Ping,
}

#[derive(Args)]
struct AddArgs {
    person: Person,
    /// YYYY-MM-DD, defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,
    /// HH:MM
    #[arg(long, default_value = "")]
    time: String,
    #[arg(long, default_value_t = 0.0)]
    viewers: f64,
    #[arg(long, default_value_t = 0.0)]
    likes: f64,
    /// Minutes.
    #[arg(long, default_value_t = 0.0)]
    duration: f64,
    #[arg(long, default_value_t = 0.0)]
    comments: f64,
    #[arg(long, default_value_t = 0.0)]
    revenue: f64,
}

#[derive(Args)]
struct PeriodArgs {
    /// day, week, month, year or custom. Defaults to month.
    #[arg(long, conflicts_with_all = ["start", "end"])]
    range: Option<RangeSelector>,
    /// First day of a custom range.
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Last day of a custom range.
    #[arg(long)]
    end: Option<NaiveDate>,
}

impl PeriodArgs {
    /// Explicit bounds select a custom range; a missing bound takes the
    /// default custom bound.
    fn resolve(&self, today: NaiveDate) -> filter::DateRange {
        let selector = match self.range {
            Some(selector) => selector,
            None if self.start.is_some() || self.end.is_some() => RangeSelector::Custom,
            None => RangeSelector::default(),
        };
        let (default_start, default_end) = filter::default_custom_bounds(today);
        filter::range_for(
            selector,
            Some(self.start.unwrap_or(default_start)),
            Some(self.end.unwrap_or(default_end)),
            today,
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    // .env next to the binary, then the project root of a dev build, then CWD.
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|d| d.to_path_buf()));
    match exe_dir {
        Some(dir) if dir.join(".env").exists() => {
            dotenvy::from_path(dir.join(".env")).ok();
        }
        Some(dir) if dir.join("../../.env").exists() => {
            dotenvy::from_path(dir.join("../../.env")).ok();
        }
        _ => {
            dotenvy::dotenv().ok();
        }
    }

    let cli = Cli::parse();
    let started = Instant::now();

    let config = Config::load();
    let engine = SyncEngine::from_config(&config)?;
    let mut events = engine.subscribe();
    engine.bootstrap();
    tracing::info!(remote = engine.is_remote_enabled(), "livesync starting");

    let today = Local::now().date_naive();
    let (command, status, data, text) = match cli.command {
        Command::Sync => {
            let outcome = engine.sync_all().await;
            let text = render_sync(&engine, &outcome);
            let status = if outcome.failed.is_empty() {
                "success"
            } else {
                "error"
            };
            let data = json!({
                "synced": outcome.synced,
                "failed": outcome.failed,
                "superseded": outcome.superseded,
                "skipped": outcome.skipped,
            });
            ("sync", status, data, text)
        }
        Command::Add(args) => {
            let date = args.date.unwrap_or(today);
            let raw = json!({
                "date": date.format("%Y-%m-%d").to_string(),
                "time": args.time,
                "viewers": args.viewers,
                "likes": args.likes,
                "duration": args.duration,
                "comments": args.comments,
                "revenue": args.revenue,
            });
            let outcome = engine.record_live(args.person, &raw).await;
            let (status, text) = match &outcome {
                WriteOutcome::Confirmed => ("success", "recorded and sent".to_string()),
                WriteOutcome::LocalOnly { error: None } => {
                    ("success", "recorded locally".to_string())
                }
                WriteOutcome::LocalOnly { error: Some(kind) } => {
                    ("error", format!("recorded locally only ({})", kind.as_str()))
                }
            };
            let data = json!({
                "person": args.person,
                "confirmed": outcome == WriteOutcome::Confirmed,
            });
            ("add", status, data, text)
        }
        Command::Reset { yes } => {
            if !yes {
                anyhow::bail!("reset clears every record; pass --yes to confirm");
            }
            let outcome = engine.reset_all().await;
            let (status, failed) = match outcome {
                ResetOutcome::Confirmed => ("success", Vec::new()),
                ResetOutcome::LocalOnly { failed } => {
                    let status = if failed.is_empty() { "success" } else { "error" };
                    (status, failed)
                }
            };
            let text = if failed.is_empty() {
                "all records cleared".to_string()
            } else {
                "cleared locally; remote reset failed".to_string()
            };
            ("reset", status, json!({ "failed": failed }), text)
        }
        Command::Show {
            person,
            period,
            offline,
        } => {
            if !offline {
                engine.sync_all().await;
            }
            let range = period.resolve(today);
            let view = filter::person_view(&engine.snapshot(), person, range);
            let text = report::render_person(&view);
            ("show", "success", to_value(&view)?, text)
        }
        Command::Dashboard {
            period,
            hide,
            offline,
        } => {
            if !offline {
                engine.sync_all().await;
            }
            let visible: Vec<Person> = Person::ALL
                .into_iter()
                .filter(|p| !hide.contains(p))
                .collect();
            let view = filter::dashboard(&engine.snapshot(), period.resolve(today), &visible);
            let text = report::render_dashboard(&view);
            ("dashboard", "success", to_value(&view)?, text)
        }
        Command::Ping => match engine.ping().await {
            Ok(diagnostics) => {
                let text = format!("pong {diagnostics}");
                ("ping", "success", diagnostics, text)
            }
            Err(e) => (
                "ping",
                "error",
                json!(e.user_message()),
                format!("ping failed: {e}"),
            ),
        },
    };

    let notices = drain_notices(&mut events);
    if cli.json {
        let metadata = ReportMetadata {
            command: command.to_string(),
            transport: engine.transport_name(),
            sync: Person::ALL
                .into_iter()
                .map(|person| PersonSync {
                    person,
                    state: engine.state(person),
                })
                .collect(),
            notices,
            duration_seconds: started.elapsed().as_secs_f64(),
        };
        let report = if status == "success" {
            Report::success(data, metadata)
        } else {
            Report::error(data, metadata)
        };
        println!("{}", report.to_json());
    } else {
        for notice in &notices {
            let marker = if notice.kind.is_failure() { "!" } else { "-" };
            eprintln!("[{marker}] {}", notice.message);
        }
        print!("{text}");
        if !text.ends_with('\n') {
            println!();
        }
    }

    if status != "success" && command == "ping" {
        anyhow::bail!("remote store unreachable");
    }
    Ok(())
}

fn to_value<T: Serialize>(value: &T) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

fn render_sync(engine: &SyncEngine, outcome: &SyncReport) -> String {
    if outcome.skipped {
        return "remote sync disabled".to_string();
    }
    Person::ALL
        .into_iter()
        .map(|person| {
            format!(
                "{}: {} ({} records)",
                person.display_name(),
                engine.state(person).as_str(),
                engine.collection(person).len()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Notices emitted so far. Lagged events are skipped.
fn drain_notices(events: &mut broadcast::Receiver<EngineEvent>) -> Vec<Notice> {
    let mut notices = Vec::new();
    loop {
        match events.try_recv() {
            Ok(EngineEvent::Notice(notice)) => notices.push(notice),
            Ok(EngineEvent::Changed(_)) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break notices,
        }
    }
}
