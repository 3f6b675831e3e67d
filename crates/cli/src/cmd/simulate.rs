//! Simulate a burst of row changes
//!
//! Runs the full path (in-memory transport, channel, debounce coordinator,
//! refresh) in real time and reports when refreshes happened.

use crate::{system_config, ScopeArg, SimulateArgs};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use ripple_core::{DebouncePolicy, EventKind, MetricsRecord, RowChange};
use ripple_realtime::{MemoryTransport, Realtime, RefreshFn, ScopeKind, ScopeOptions};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::info;

#[derive(Serialize)]
struct Report {
    channel: Option<String>,
    events: usize,
    interval_ms: u64,
    /// Elapsed milliseconds at each refresh
    refreshes: Vec<u64>,
    metrics: Vec<MetricsRecord>,
}

fn scope_kind(args: &SimulateArgs) -> ScopeKind {
    match args.scope {
        ScopeArg::Workspace => ScopeKind::Workspace,
        ScopeArg::Entity => ScopeKind::entity(args.foreign_key.clone()),
        ScopeArg::Global => ScopeKind::Global,
    }
}

fn scope_options(args: &SimulateArgs) -> ScopeOptions {
    let mut options = ScopeOptions::new(args.prefix.clone(), args.tables.iter().cloned())
        .scope(args.scope_id.clone())
        .leading(args.leading)
        .trailing(!args.no_trailing);
    if let Some(ms) = args.debounce_ms {
        options = options.debounce_ms(ms);
    }
    if let Some(ms) = args.max_wait_ms {
        options = options.max_wait(ms);
    }
    options
}

/// The row emitted for event `n`, cycling through the tables
fn synthetic_row(args: &SimulateArgs, kind: &ScopeKind, n: usize) -> RowChange {
    let table = &args.tables[n % args.tables.len()];
    let mut record = Map::new();
    record.insert("id".to_string(), json!(n));
    match kind {
        ScopeKind::Workspace => {
            record.insert("workspace_id".to_string(), json!(args.scope_id));
        }
        ScopeKind::Entity { foreign_key } => {
            record.insert(foreign_key.clone(), json!(args.scope_id));
        }
        ScopeKind::Global => {}
    }
    let kind = if n == 0 { EventKind::Insert } else { EventKind::Update };
    RowChange::new(table.as_str(), kind, Value::Object(record))
}

/// Time to wait after the last event for every timer to drain
fn settle_time(policy: Option<&DebouncePolicy>) -> Duration {
    let margin = Duration::from_millis(100);
    match policy {
        Some(policy) => policy.debounce.max(policy.max_wait.unwrap_or_default()) + margin,
        None => margin,
    }
}

pub async fn run(config_path: &Path, args: SimulateArgs) -> Result<()> {
    let json = args.json;
    let (report, policy) = simulate(config_path, args).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, policy.as_ref());
    }
    Ok(())
}

/// Drive the burst and collect the report, plus the resolved policy
async fn simulate(config_path: &Path, args: SimulateArgs) -> Result<(Report, Option<DebouncePolicy>)> {
    if args.tables.is_empty() {
        anyhow::bail!("At least one table is required (--tables)");
    }

    let config = system_config::load(config_path)?;
    let transport = Arc::new(MemoryTransport::new());
    let realtime = Realtime::new(transport.clone(), config);

    let start = Instant::now();
    let refreshes = Arc::new(Mutex::new(Vec::new()));
    let sink = refreshes.clone();
    let refresh = RefreshFn::new(move || sink.lock().push(start.elapsed()));

    let kind = scope_kind(&args);
    let mut handle = realtime
        .configure(kind.clone(), scope_options(&args), refresh)
        .context("Failed to bind simulated scope")?;
    let channel = handle.channel_name().map(str::to_string);

    info!(channel = ?channel, events = args.events, interval_ms = args.interval_ms, "simulation started");

    for n in 0..args.events {
        transport.emit(&synthetic_row(&args, &kind, n));
        if n + 1 < args.events {
            sleep(Duration::from_millis(args.interval_ms)).await;
        }
    }
    sleep(settle_time(handle.policy())).await;
    let policy = handle.policy().copied();
    realtime.teardown(&mut handle);

    let report = Report {
        channel,
        events: args.events,
        interval_ms: args.interval_ms,
        refreshes: refreshes.lock().iter().map(|d| d.as_millis() as u64).collect(),
        metrics: realtime.get_metrics(),
    };
    Ok((report, policy))
}

fn print_report(report: &Report, policy: Option<&DebouncePolicy>) {
    println!("{}", "Simulation".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let Some(channel) = &report.channel else {
        println!("{}", "Scope inactive: no channel was opened.".yellow());
        return;
    };

    println!("Channel:   {}", channel.cyan());
    if let Some(policy) = policy {
        let max_wait = policy
            .max_wait
            .map(|d| format!("{}ms", d.as_millis()))
            .unwrap_or_else(|| "none".to_string());
        println!(
            "Policy:    debounce {}ms, max wait {}, leading {}, trailing {}",
            policy.debounce.as_millis(),
            max_wait,
            on_off(policy.leading),
            on_off(policy.trailing)
        );
    }
    println!("Events:    {} every {}ms", report.events, report.interval_ms);
    println!();

    println!("{} ({})", "Refreshes".bold(), report.refreshes.len());
    for (i, ms) in report.refreshes.iter().enumerate() {
        println!("  #{:<3} {}", i + 1, format!("+{}ms", ms).green());
    }
    println!();

    println!("{}", "Metrics".bold());
    for record in &report.metrics {
        println!("  {}", record.channel_name.cyan());
        println!("    Subscriptions: {}", record.subscription_count);
        println!("    Updates:       {}", record.update_count);
        println!("    Avg delay:     {:.1}ms", record.average_debounce_delay_ms);
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SimulateArgs {
        SimulateArgs {
            scope: ScopeArg::Entity,
            scope_id: "doc-1".to_string(),
            foreign_key: "document_id".to_string(),
            tables: vec!["comments".to_string(), "reactions".to_string()],
            prefix: "sim".to_string(),
            events: 3,
            interval_ms: 10,
            debounce_ms: Some(200),
            max_wait_ms: None,
            leading: false,
            no_trailing: false,
            json: true,
        }
    }

    #[test]
    fn test_rows_match_scope_filter() {
        let args = args();
        let kind = scope_kind(&args);

        let first = synthetic_row(&args, &kind, 0);
        let second = synthetic_row(&args, &kind, 1);
        assert_eq!(first.table, "comments");
        assert_eq!(first.kind, EventKind::Insert);
        assert_eq!(second.table, "reactions");
        assert_eq!(second.record["document_id"], "doc-1");
    }

    #[test]
    fn test_settle_covers_longest_timer() {
        let policy = DebouncePolicy::trailing(Duration::from_millis(200))
            .with_max_wait(Some(Duration::from_millis(900)));
        assert_eq!(settle_time(Some(&policy)), Duration::from_millis(1000));
        assert_eq!(settle_time(None), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_coalesces_burst() {
        let dir = tempfile::TempDir::new().unwrap();
        let (report, policy) = simulate(&dir.path().join("config.toml"), args()).await.unwrap();

        // Events at 0, 10, 20 collapse into one refresh 200ms after the last
        assert_eq!(report.channel.as_deref(), Some("sim-doc-1"));
        assert_eq!(report.refreshes.len(), 1);
        assert!((220..=221).contains(&report.refreshes[0]), "refresh at {:?}", report.refreshes);
        assert_eq!(policy.unwrap().debounce, Duration::from_millis(200));

        assert_eq!(report.metrics.len(), 1);
        let record = &report.metrics[0];
        assert_eq!(record.channel_name, "sim-doc-1");
        assert_eq!(record.update_count, 1);
        assert_eq!(record.subscription_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_requires_tables() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut args = args();
        args.tables.clear();
        assert!(simulate(&dir.path().join("config.toml"), args).await.is_err());
    }
}
