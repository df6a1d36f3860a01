//! seatable-monitor daemon entrypoint.
//!
//! A small, single-writer service: once per poll interval it collects task
//! state from local sources (tmux panes, Claude Code todo/task/transcript
//! files) and reconciles the remote table against it. One failed record
//! never fails the cycle; one failed cycle never kills the daemon.

use std::collections::{HashMap, HashSet};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use monitor_core::collectors::claude::{collect_sessions, collect_tasks, collect_todos};
use monitor_core::collectors::tmux::{collect_by_prefixes, CommandTmuxAdapter};
use monitor_core::config::expand_tilde;
use monitor_core::{load_config, MonitorConfig, TaskRecord, TaskSource};

mod reconcile;
mod remote;
mod seatable;

use reconcile::Reconciler;
use remote::TableApi;
use seatable::SeaTableBase;

// Signal handlers cannot capture; the flag they set is necessarily static.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_shutdown(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Cancellation token for the poll loop. Signals request exit at the next
/// cycle boundary; in-flight work and sleeps run to completion.
struct ShutdownFlag;

impl ShutdownFlag {
    fn install() -> Self {
        let handler: extern "C" fn(libc::c_int) = handle_shutdown;
        unsafe {
            libc::signal(libc::SIGINT, handler as libc::sighandler_t);
            libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
        }
        Self
    }

    fn is_set(&self) -> bool {
        SHUTDOWN.load(Ordering::SeqCst)
    }
}

fn main() {
    init_logging();

    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let machine = detect_machine(&config);
    let api = SeaTableBase::new(&config.seatable.server_url, &config.seatable.api_token);
    let mut reconciler = Reconciler::new(api, config.seatable.table_name.clone());
    if let Err(err) = reconciler.init() {
        error!(error = %err, "Failed to reach the remote table");
        std::process::exit(1);
    }

    let shutdown = ShutdownFlag::install();
    info!(
        machine = %machine,
        table = %config.seatable.table_name,
        interval_secs = config.monitor.poll_interval_secs,
        "seatable-monitor started"
    );

    run_poll_loop(&config, &mut reconciler, &machine, &shutdown);
    info!("seatable-monitor stopped");
}

fn run_poll_loop<T: TableApi>(
    config: &MonitorConfig,
    reconciler: &mut Reconciler<T>,
    machine: &str,
    shutdown: &ShutdownFlag,
) {
    let interval = Duration::from_secs(config.monitor.poll_interval_secs.max(1));
    while !shutdown.is_set() {
        run_cycle(config, reconciler, machine);

        if let Err(err) = reconciler.refresh_auth_if_needed() {
            warn!(error = %err, "Token refresh failed; retrying next cycle");
        }
        thread::sleep(interval);
    }
}

/// One poll cycle. Collection is infallible (collectors skip what they
/// cannot read); each remote write is attempted independently.
fn run_cycle<T: TableApi>(config: &MonitorConfig, reconciler: &mut Reconciler<T>, machine: &str) {
    if !config.tmux.session_prefixes.is_empty() {
        let records = collect_by_prefixes(&CommandTmuxAdapter, &config.tmux.session_prefixes, machine);
        push_tmux_records(reconciler, machine, &records);
    }

    if config.claude.enabled {
        let lookback = config.claude.lookback_hours;
        let mut records = collect_todos(&expand_tilde(&config.claude.todos_dir), machine, lookback);
        records.extend(collect_tasks(
            &expand_tilde(&config.claude.tasks_dir),
            machine,
            lookback,
        ));
        records.extend(collect_sessions(
            &expand_tilde(&config.claude.projects_dir),
            machine,
            lookback,
            config.claude.tail_lines,
        ));
        push_records(reconciler, &records);
    }
}

fn push_records<T: TableApi>(reconciler: &Reconciler<T>, records: &[TaskRecord]) {
    for record in records {
        if let Err(err) = reconciler.upsert(record) {
            warn!(name = %record.name, error = %err, "Failed to upsert record");
        }
    }
}

/// Pushes pane records, then prunes rows for sessions whose panes are gone.
/// Stale-row pruning applies to the tmux source only.
fn push_tmux_records<T: TableApi>(
    reconciler: &Reconciler<T>,
    machine: &str,
    records: &[TaskRecord],
) {
    push_records(reconciler, records);

    let mut active: HashMap<&str, HashSet<String>> = HashMap::new();
    for record in records {
        active
            .entry(record.session_id.as_str())
            .or_default()
            .insert(record.name.clone());
    }
    for (session_id, names) in &active {
        if let Err(err) = reconciler.remove_stale(TaskSource::Tmux, session_id, machine, names) {
            warn!(session = %session_id, error = %err, "Failed to prune stale rows");
        }
    }
}

fn detect_machine(config: &MonitorConfig) -> String {
    let configured = config.monitor.hostname.trim();
    if !configured.is_empty() {
        return configured.to_string();
    }
    sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string())
}

fn init_logging() {
    let debug_enabled = env::var("MONITOR_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
