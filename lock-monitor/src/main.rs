// ABOUTME: Operator dashboard over live lock and session state.
// ABOUTME: Interactive single-key commands plus a non-interactive stress mode.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rustyline::DefaultEditor;

use warden::prelude::*;

#[derive(Parser)]
#[command(name = "lock-monitor", about = "Live monitor for multi-agent file locks")]
struct Cli {
    /// Root directory holding locks/ and sessions/.
    #[arg(long, default_value = ".warden")]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the contention stress test and print a report.
    Stress {
        /// Number of concurrent agents.
        #[arg(long, default_value_t = 10)]
        agents: u32,

        /// Lock-guarded increments per agent.
        #[arg(long, default_value_t = 5)]
        ops: u32,

        /// Per-acquire timeout in milliseconds.
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,

        /// Hold time inside each critical section, in milliseconds.
        #[arg(long, default_value_t = 10)]
        hold_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = CoordinationConfig::rooted_at(&cli.root);

    match cli.command {
        Some(Command::Stress {
            agents,
            ops,
            timeout_ms,
            hold_ms,
        }) => run_stress_mode(config, agents, ops, timeout_ms, hold_ms).await,
        None => run_dashboard(config).await,
    }
}

async fn run_stress_mode(
    config: CoordinationConfig,
    agents: u32,
    ops: u32,
    timeout_ms: u64,
    hold_ms: u64,
) -> Result<()> {
    let counter_file = config.lock_dir.parent().map_or_else(
        || PathBuf::from("stress-counter.txt"),
        |root| root.join("stress-counter.txt"),
    );

    let ctx = CoordinationContext::new(config)?;
    let stress = StressConfig {
        agents,
        ops_per_agent: ops,
        timeout: Duration::from_millis(timeout_ms),
        hold: Duration::from_millis(hold_ms),
        counter_file,
    };

    println!(
        "Running stress: {} agents x {} ops, timeout {}ms, hold {}ms",
        agents, ops, timeout_ms, hold_ms
    );
    let report = run_stress(&ctx, &stress).await?;

    println!();
    println!("attempted:          {}", report.attempted);
    println!("succeeded:          {}", report.succeeded);
    println!("timed out:          {}", report.timed_out);
    println!("final counter:      {}", report.final_counter);
    println!("deadlock detected:  {}", report.deadlock_detected);
    println!("elapsed:            {}ms", report.elapsed_ms);
    println!("throughput:         {:.1} ops/s", report.ops_per_sec);
    println!("session:            {}", ctx.tracker().session_id());

    if !report.is_success() {
        println!("\nRESULT: FAILED (lost operations or unexpected deadlock)");
        std::process::exit(1);
    }
    println!("\nRESULT: OK");
    Ok(())
}

async fn run_dashboard(config: CoordinationConfig) -> Result<()> {
    let ctx = CoordinationContext::new(config)?;
    let monitor = Monitor::new(ctx.clone());

    // Self-healing sweep and the markdown dashboard run regardless of
    // operator interaction.
    let sweeper = spawn_sweeper(
        ctx.lock_manager().clone(),
        ctx.config().sweep_interval(),
        ctx.config().sweep_threshold(),
    );
    let dashboard = spawn_dashboard_writer(monitor.clone(), Duration::from_secs(2));

    println!("Session: {}", ctx.tracker().session_id());
    println!("Commands: [c]lean stale, [f]orce clear all, [r]efresh, [q]uit\n");

    let mut rl = DefaultEditor::new()?;
    loop {
        match monitor.poll().await {
            Ok(snapshot) => print!("{}", monitor.render(&snapshot)),
            Err(e) => eprintln!("poll failed: {}", e),
        }

        let line = match rl.readline("\n> ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted) => break,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        match line.trim() {
            "c" => match monitor.clean_stale().await {
                Ok(removed) => println!("removed {} stale lock(s)", removed),
                Err(e) => eprintln!("clean failed: {}", e),
            },
            "f" => {
                // Destructive: every lock goes, stale or not.
                let confirm = rl.readline("Force-clear ALL locks. Type 'yes' to confirm: ")?;
                if confirm.trim() == "yes" {
                    match monitor.force_clear_all().await {
                        Ok(removed) => println!("cleared {} lock(s)", removed),
                        Err(e) => eprintln!("force clear failed: {}", e),
                    }
                } else {
                    println!("aborted");
                }
            }
            "q" => break,
            "r" | "" => {}
            other => println!("unknown command: {:?}", other),
        }
    }

    sweeper.abort();
    dashboard.abort();
    Ok(())
}
