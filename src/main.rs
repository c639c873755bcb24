//! Molt Runtime
//!
//! The entry point for the skill evolution manager. Handles CLI args,
//! config loading, and dispatching to the one-shot commands or the
//! 24-hour cycle daemon.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tokio::signal;
use tokio::sync::Mutex;
use tracing::Level;

use molt::config::{load_config, resolve_path, save_config};
use molt::daemon::{create_cycle_daemon, CycleDaemonOptions};
use molt::evolution::{EvolutionOrchestrator, NoopOptimizer};
use molt::ledger::Ledger;
use molt::registry;
use molt::scheduler::{EvolutionScheduler, FixedForeground};
use molt::types::{default_config, LogLevel, MoltConfig};

const VERSION: &str = "0.1.0";

/// Molt -- Skill Evolution Manager
#[derive(Parser, Debug)]
#[command(
    name = "molt",
    version = VERSION,
    about = "Molt -- Skill Evolution Manager",
    long_about = "Audited, reversible upgrades for on-disk skills, \
                  scheduled around whatever the host is already doing."
)]
struct Cli {
    /// Run a single evolution cycle and exit
    #[arg(long)]
    run_cycle: bool,

    /// Run the 24-hour cycle daemon
    #[arg(long)]
    daemon: bool,

    /// Show scheduler status and execution statistics
    #[arg(long)]
    status: bool,

    /// List discovered skills grouped by category
    #[arg(long)]
    discover: bool,

    /// Audit a single skill by name and print the verdict
    #[arg(long)]
    audit: Option<String>,

    /// Pause all running evolution tasks
    #[arg(long)]
    pause: bool,

    /// Resume all paused evolution tasks
    #[arg(long)]
    resume: bool,

    /// Show recent evolution history entries
    #[arg(long)]
    history: bool,

    /// Foreground priority gating upgrade execution (0-10)
    #[arg(long, default_value_t = 0)]
    foreground_priority: u8,
}

fn init_tracing(level: LogLevel) {
    let level = match level {
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

/// Load the config, writing defaults on first run.
fn load_or_init_config() -> Result<MoltConfig> {
    match load_config() {
        Some(config) => Ok(config),
        None => {
            let config = default_config();
            save_config(&config).context("Failed to write default config")?;
            Ok(config)
        }
    }
}

fn open_scheduler(config: &MoltConfig) -> Result<EvolutionScheduler> {
    let path = resolve_path(&config.scheduler_state_path);
    EvolutionScheduler::open(std::path::Path::new(&path))
}

// ---- Status Command ---------------------------------------------------------

fn show_status(config: &MoltConfig) -> Result<()> {
    let scheduler = open_scheduler(config)?;
    let stats = scheduler.stats();

    println!();
    println!("  {}", "MOLT STATUS".bold());
    println!("  cycle:      {}", stats.current_cycle.cyan());
    println!("  tasks:      {}", stats.total_tasks);
    println!(
        "  pending:    {}  running: {}  paused: {}",
        stats.pending, stats.running, stats.paused
    );
    println!(
        "  completed:  {}  failed: {}",
        stats.completed.to_string().green(),
        stats.failed.to_string().red()
    );
    println!("  success:    {:.0}%", stats.success_rate * 100.0);
    println!();
    Ok(())
}

// ---- Discover Command -------------------------------------------------------

fn show_discovered(config: &MoltConfig) {
    let roots: Vec<String> = config.skill_roots.iter().map(|r| resolve_path(r)).collect();
    let skills = registry::discover(&roots);

    if skills.is_empty() {
        println!("No skills found under the configured roots.");
        return;
    }

    // Group by category, preserving name order within each group.
    let mut categories: Vec<&str> = skills.values().map(|s| s.category.as_str()).collect();
    categories.sort();
    categories.dedup();

    for category in categories {
        let members: Vec<_> = skills
            .values()
            .filter(|s| s.category == category)
            .collect();
        println!();
        println!("  {} ({})", category.bold(), members.len());
        for skill in members {
            println!(
                "    {} [{}] {:?}/{:?} - {}",
                skill.name.cyan(),
                skill.subcategory,
                skill.complexity,
                skill.risk,
                skill.description.dimmed()
            );
        }
    }
    println!();
}

// ---- Audit Command ----------------------------------------------------------

fn show_audit(config: &MoltConfig, name: &str) -> Result<()> {
    use molt::audit::{AuditPolicy, SkillAuditor};

    let roots: Vec<String> = config.skill_roots.iter().map(|r| resolve_path(r)).collect();
    let skills = registry::discover(&roots);
    let skill = skills
        .get(name)
        .with_context(|| format!("No skill named '{}' under the configured roots", name))?;

    let auditor = SkillAuditor::new(AuditPolicy::from_config(config));
    let verdict = auditor.audit(skill);

    println!();
    println!("  {} {}", "AUDIT".bold(), verdict.skill_name.cyan());
    println!(
        "  security: {}  logic: {}  safe to upgrade: {}",
        verdict.security_score,
        verdict.logic_score,
        if verdict.safe_to_upgrade {
            "yes".green()
        } else {
            "no".red()
        }
    );

    for issue in &verdict.issues {
        let severity = format!("{:?}", issue.severity).to_lowercase();
        let location = issue
            .location
            .as_deref()
            .map(|l| format!(" ({})", l))
            .unwrap_or_default();
        println!("    [{}] {}{}", severity.yellow(), issue.message, location);
    }
    for rec in &verdict.recommendations {
        println!("    {} {}", "->".cyan(), rec);
    }
    println!();
    Ok(())
}

// ---- History Command --------------------------------------------------------

fn show_history(config: &MoltConfig) -> Result<()> {
    let ledger = Ledger::open(&resolve_path(&config.ledger_db_path))?;
    let entries = ledger.recent_history(20)?;

    if entries.is_empty() {
        println!("No evolution history recorded yet.");
        return Ok(());
    }

    println!();
    for entry in entries {
        println!(
            "  [{}] {} {} -> {}",
            entry.timestamp.dimmed(),
            entry.skill_name.cyan(),
            &entry.fingerprint_before[..12.min(entry.fingerprint_before.len())],
            &entry.fingerprint_after[..12.min(entry.fingerprint_after.len())]
        );
        for rec in &entry.applied_recommendations {
            println!("      {}", rec.dimmed());
        }
    }
    println!();
    Ok(())
}

// ---- Cycle / Daemon ---------------------------------------------------------

async fn run_single_cycle(config: MoltConfig, foreground_priority: u8) -> Result<()> {
    let mut orchestrator =
        EvolutionOrchestrator::new(config, Arc::new(NoopOptimizer))?;
    let report = orchestrator
        .run_cycle(&FixedForeground(foreground_priority))
        .await?;

    println!();
    println!("  {} {}", "CYCLE".bold(), report.cycle.cyan());
    println!("  discovered: {}", report.skills_discovered);
    println!("  audited:    {}", report.audits_run);
    println!(
        "  upgrades:   {} attempted, {} succeeded, {} failed",
        report.upgrades_attempted,
        report.upgrades_succeeded.to_string().green(),
        report.upgrades_failed.to_string().red()
    );
    println!("  success:    {:.0}%", report.success_rate * 100.0);
    println!();
    Ok(())
}

async fn run_daemon(config: MoltConfig, foreground_priority: u8) -> Result<()> {
    let tick = config.daemon_tick_secs;
    let orchestrator = EvolutionOrchestrator::new(config, Arc::new(NoopOptimizer))?;

    let mut daemon = create_cycle_daemon(
        Arc::new(Mutex::new(orchestrator)),
        Arc::new(FixedForeground(foreground_priority)),
        CycleDaemonOptions {
            tick_interval_secs: tick,
        },
    );
    daemon.start();

    // Handle graceful shutdown
    let ctrl_c = signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to register SIGTERM handler")?;

        tokio::select! {
            _ = ctrl_c => {
                println!("\nReceived SIGINT, shutting down...");
            }
            _ = sigterm.recv() => {
                println!("\nReceived SIGTERM, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.context("Failed to register Ctrl+C handler")?;
        println!("\nReceived shutdown signal...");
    }

    daemon.stop();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_or_init_config()?;
    init_tracing(config.log_level);

    if cli.status {
        return show_status(&config);
    }

    if cli.discover {
        show_discovered(&config);
        return Ok(());
    }

    if let Some(ref name) = cli.audit {
        return show_audit(&config, name);
    }

    if cli.pause {
        let paused = open_scheduler(&config)?.pause_all()?;
        println!("Paused {} task(s).", paused);
        return Ok(());
    }

    if cli.resume {
        let resumed = open_scheduler(&config)?.resume_all()?;
        println!("Resumed {} task(s).", resumed);
        return Ok(());
    }

    if cli.history {
        return show_history(&config);
    }

    if cli.run_cycle {
        return run_single_cycle(config, cli.foreground_priority).await;
    }

    if cli.daemon {
        return run_daemon(config, cli.foreground_priority).await;
    }

    // No command given: print status as the default action.
    show_status(&config)
}
