// ABOUTME: Markdown dashboard rendering and the periodic dashboard.md writer.
// ABOUTME: Best-effort: rendering failures are logged, never propagated.

use std::path::PathBuf;
use std::time::Duration;

use chrono::SecondsFormat;
use tokio::task::JoinHandle;
use tracing::warn;

use super::monitor::{Monitor, MonitorSnapshot};

/// Render a snapshot as the session's `dashboard.md`.
pub fn render_markdown(snapshot: &MonitorSnapshot) -> String {
    let mut out = String::new();
    out.push_str("# Coordination dashboard\n\n");
    out.push_str(&format!(
        "Updated: {}\n\n",
        snapshot.taken_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));

    out.push_str(&format!("## Active locks ({})\n\n", snapshot.locks.len()));
    if snapshot.locks.is_empty() {
        out.push_str("_none_\n");
    } else {
        out.push_str("| Path | Agent | Mode | Age (s) | Stale |\n");
        out.push_str("|------|-------|------|---------|-------|\n");
        for view in &snapshot.locks {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                view.record.filepath,
                view.record.agent_id,
                view.record.operation,
                view.age.as_secs(),
                if view.stale { "yes" } else { "" }
            ));
        }
    }

    out.push_str("\n## Waiting agents\n\n");
    if snapshot.waiting.is_empty() {
        out.push_str("_none_\n");
    } else {
        for (path, agents) in &snapshot.waiting {
            let ids: Vec<String> = agents.iter().map(|id| id.to_string()).collect();
            out.push_str(&format!("- `{}` ← agents {}\n", path, ids.join(", ")));
        }
    }

    out.push_str("\n## Deadlock\n\n");
    if snapshot.deadlock.has_cycle {
        let ids: Vec<String> = snapshot.deadlock.cycle.iter().map(|id| id.to_string()).collect();
        out.push_str(&format!("**DEADLOCK**: {} → {}\n", ids.join(" → "), ids[0]));
    } else {
        out.push_str("none\n");
    }

    if !snapshot.agents.is_empty() {
        out.push_str("\n## Agents\n\n");
        out.push_str("| Id | State | Tokens | Files modified | Current operation |\n");
        out.push_str("|----|-------|--------|----------------|-------------------|\n");
        for agent in &snapshot.agents {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                agent.id,
                agent.state,
                agent.tokens_used,
                agent.files_modified.len(),
                agent.current_operation.as_deref().unwrap_or("")
            ));
        }
    }

    out
}

/// Detached task rewriting `dashboard.md` in the session directory at a
/// fixed interval. Failures are warned and the loop continues; the live
/// view must never take down a run.
pub fn spawn_dashboard_writer(monitor: Monitor, interval: Duration) -> JoinHandle<()> {
    let path: PathBuf = monitor.context().tracker().session_dir().join("dashboard.md");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match monitor.poll().await {
                Ok(snapshot) => {
                    let markdown = render_markdown(&snapshot);
                    if let Err(e) = std::fs::write(&path, markdown) {
                        warn!(error = %e, "failed to write dashboard.md");
                    }
                }
                Err(e) => warn!(error = %e, "dashboard poll failed"),
            }
        }
    })
}
