// ABOUTME: Post-mortem CLI over persisted debug sessions.
// ABOUTME: Analyze, replay, export, snapshot, and compare recorded runs.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rustyline::DefaultEditor;

use warden::prelude::*;

#[derive(Parser)]
#[command(name = "session-inspect", about = "Analyze recorded coordination sessions")]
struct Cli {
    /// Directory containing session directories.
    #[arg(long, default_value = ".warden/sessions")]
    session_root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List persisted sessions, oldest first.
    List,

    /// Print a summarized report for a session.
    Analyze {
        session: String,

        /// Only consider operations whose path matches this regex.
        #[arg(long)]
        filter: Option<String>,
    },

    /// Step through a session's operation log interactively.
    Replay { session: String },

    /// Export a session's operation log.
    Export {
        session: String,

        /// Output format: json or csv.
        #[arg(long, default_value = "json")]
        format: String,

        /// Output file. Defaults to export.<format> inside the session directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Save a labeled snapshot of the session file.
    Snapshot {
        session: String,

        #[arg(long)]
        label: String,
    },

    /// Compare a session against an expected-outcome JSON file.
    Compare {
        session: String,

        #[arg(long)]
        expected: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::List => {
            for id in SessionTracker::list_sessions(&cli.session_root)? {
                println!("{}", id);
            }
            Ok(())
        }
        Command::Analyze { session, filter } => {
            let session = load(&cli.session_root, &session)?;
            let filter = filter
                .map(|f| regex::Regex::new(&f))
                .transpose()
                .context("invalid --filter regex")?;
            print_report(&analyze(&session, filter.as_ref()));
            Ok(())
        }
        Command::Replay { session } => replay(&load(&cli.session_root, &session)?),
        Command::Export {
            session,
            format,
            out,
        } => {
            let id = session;
            let session = load(&cli.session_root, &id)?;
            let format: ExportFormat = format.parse()?;
            let out = out.unwrap_or_else(|| {
                let ext = match format {
                    ExportFormat::Json => "json",
                    ExportFormat::Csv => "csv",
                };
                cli.session_root.join(&id).join(format!("export.{}", ext))
            });
            let written = export(&session, format, out, None)?;
            println!("wrote {}", written.display());
            Ok(())
        }
        Command::Snapshot { session, label } => {
            let id = session;
            let session = load(&cli.session_root, &id)?;
            let written = save_snapshot(&session, cli.session_root.join(&id), &label)?;
            println!("wrote {}", written.display());
            Ok(())
        }
        Command::Compare { session, expected } => {
            let session = load(&cli.session_root, &session)?;
            let expected = ExpectedOutcome::load(&expected)
                .with_context(|| format!("failed to load {}", expected.display()))?;
            let report = compare(&session, &expected);

            if report.matches {
                println!("OK: session matches expected outcome");
                return Ok(());
            }
            for m in &report.agent_mismatches {
                match m.actual {
                    Some(actual) => println!(
                        "agent {}: expected {}, got {}",
                        m.agent_id, m.expected, actual
                    ),
                    None => println!("agent {}: expected {}, never ran", m.agent_id, m.expected),
                }
            }
            for m in &report.file_mismatches {
                println!(
                    "file {}: expected hash {}, got {}",
                    m.path,
                    m.expected_hash,
                    m.actual_hash.as_deref().unwrap_or("<missing>")
                );
            }
            std::process::exit(1);
        }
    }
}

fn load(session_root: &PathBuf, session_id: &str) -> Result<DebugSession> {
    match SessionTracker::load(session_root, session_id)? {
        Some(session) => Ok(session),
        None => bail!(
            "session '{}' not found under {}",
            session_id,
            session_root.display()
        ),
    }
}

fn print_report(report: &SessionReport) {
    println!("Session {}", report.session_id);
    if let Some(ms) = report.duration_ms {
        println!("Duration: {}ms", ms);
    }
    println!(
        "Tokens: {} total across {} agent(s)",
        report.token_usage.total,
        report.token_usage.by_agent.len()
    );

    println!("\nAgents:");
    for agent in &report.agents {
        let error = agent
            .error
            .as_deref()
            .map(|e| format!("  ({})", e))
            .unwrap_or_default();
        println!(
            "  {:>4}  {:<8}  tokens={:<8}  files={}{}",
            agent.agent_id, agent.state.to_string(), agent.tokens_used, agent.files_modified, error
        );
    }

    println!(
        "\nOperations: {} reads, {} writes, {} locks, {} unlocks, {} failures",
        report.operations.reads,
        report.operations.writes,
        report.operations.locks,
        report.operations.unlocks,
        report.operations.failures
    );

    if !report.contention.is_empty() {
        println!("\nContention (by lock time):");
        for entry in report.contention.iter().take(10) {
            println!(
                "  {:<40}  {} lock(s), {}ms total",
                entry.path, entry.lock_count, entry.total_lock_ms
            );
        }
    }

    if !report.findings.is_empty() {
        println!("\nFindings:");
        for finding in &report.findings {
            match finding {
                Finding::AgentBottleneck {
                    agent_id,
                    total_lock_ms,
                } => println!(
                    "  agent {} spent {}ms in lock acquisition (majority of the run)",
                    agent_id, total_lock_ms
                ),
                Finding::HotPath {
                    path,
                    total_lock_ms,
                } => println!(
                    "  path {} accounts for {}ms of lock time (majority of the run)",
                    path, total_lock_ms
                ),
                Finding::FailedAgent { agent_id, error } => println!(
                    "  agent {} failed{}",
                    agent_id,
                    error
                        .as_deref()
                        .map(|e| format!(": {}", e))
                        .unwrap_or_default()
                ),
            }
        }
    }
}

fn replay(session: &DebugSession) -> Result<()> {
    let mut cursor = ReplayCursor::new(session);
    if cursor.is_empty() {
        println!("session has no recorded operations");
        return Ok(());
    }

    println!(
        "Replaying {} operation(s). Enter to step, q to quit.",
        cursor.len()
    );
    let mut rl = DefaultEditor::new()?;

    while let Some(op) = cursor.step() {
        let outcome = if op.success { "ok" } else { "FAILED" };
        println!(
            "[{:>4}/{}] {} agent={} {} {} ({}ms) {}",
            cursor.position(),
            cursor.len(),
            op.timestamp.format("%H:%M:%S%.3f"),
            op.agent_id,
            op.operation,
            op.path,
            op.duration_ms,
            outcome
        );

        match rl.readline("") {
            Ok(line) if line.trim() == "q" => break,
            Ok(_) => {}
            Err(rustyline::error::ReadlineError::Interrupted) => break,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    println!("\nReplayed {} operation(s):", cursor.position());
    let mut tally: Vec<(u32, usize)> = cursor.tally().iter().map(|(&k, &v)| (k, v)).collect();
    tally.sort_unstable();
    for (agent_id, count) in tally {
        println!("  agent {}: {} operation(s)", agent_id, count);
    }
    Ok(())
}
