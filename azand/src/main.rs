//! Azand - Azan scheduler for Sonos
//!
//! CLI entry point for the scheduler daemon and its control surfaces.

use std::fs;
use std::io::{BufRead, BufReader};
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use azanstore::OverrideStore;

use azand::cli::{Cli, Command, OutputFormat, get_log_path};
use azand::config::Config;
use azand::daemon::DaemonManager;
use azand::prayer::AladhanClient;
use azand::schedule::Scheduler;
use azand::sink::{PlaybackSink, SonosSink};
use azand::web;

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!(
        "Azand loaded config: location={}, {} (method {})",
        config.location.city, config.location.country, config.location.method
    );

    match cli.command {
        Command::Start { foreground } => cmd_start(&config, foreground).await,
        Command::Stop => cmd_stop().await,
        Command::Status { format } => cmd_status(&config, format).await,
        Command::Pause { minutes } => cmd_pause(&config, minutes).await,
        Command::Resume => cmd_resume(&config).await,
        Command::StopPlayback => cmd_stop_playback(&config).await,
        Command::Times { format } => cmd_times(&config, format).await,
        Command::Web { host, port } => cmd_web(config, host, port).await,
        Command::Logs { follow, lines } => cmd_logs(follow, lines).await,
        Command::RunDaemon => cmd_run_daemon(&config).await,
    }
}

/// Start the daemon
async fn cmd_start(config: &Config, foreground: bool) -> Result<()> {
    let daemon = DaemonManager::new();

    if daemon.is_running() {
        println!("Azand is already running (PID: {})", daemon.running_pid().unwrap());
        return Ok(());
    }

    if foreground {
        println!("Starting azand in foreground mode...");
        run_daemon(config).await
    } else {
        let pid = daemon.start()?;
        println!("Azand started (PID: {})", pid);
        Ok(())
    }
}

/// Stop the daemon
async fn cmd_stop() -> Result<()> {
    let daemon = DaemonManager::new();

    if !daemon.is_running() {
        println!("Azand is not running");
        return Ok(());
    }

    let pid = daemon.running_pid().unwrap();
    daemon.stop()?;
    println!("Azand stopped (was PID: {})", pid);
    Ok(())
}

/// Show daemon and pause status
async fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    let daemon = DaemonManager::new();
    let status = daemon.status();

    let store = OverrideStore::open(&config.storage.state_file)?;
    let record = store.read()?;
    let now = Local::now();

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "running": status.running,
                "pid": status.pid,
                "paused": record.paused,
                "pause_until": record.pause_until.map(|t| t.to_rfc3339()),
                "pause_expired": record.expired(now),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("Azand Status");
            println!("------------");
            if status.running {
                println!("Daemon: running (PID {})", status.pid.unwrap());
            } else {
                println!("Daemon: stopped");
            }

            if record.paused {
                match record.pause_until {
                    Some(until) if record.expired(now) => {
                        println!("Azan:   PAUSED (expired {}, awaiting auto-resume)", until.format("%I:%M %p"));
                    }
                    Some(until) => println!("Azan:   PAUSED until {}", until.format("%I:%M %p")),
                    None => println!("Azan:   PAUSED indefinitely"),
                }
            } else {
                println!("Azan:   RUNNING");
            }
            println!("State file: {}", store.path().display());
        }
    }

    Ok(())
}

/// Pause azan playback, optionally for a bounded window
async fn cmd_pause(config: &Config, minutes: Option<i64>) -> Result<()> {
    let store = OverrideStore::open(&config.storage.state_file)?;
    let state = store.pause(Local::now(), minutes).context("Failed to write pause state")?;

    match state.pause_until {
        Some(until) => println!("{} Azan paused until {}", "✓".green(), until.format("%I:%M %p")),
        None => println!("{} Azan paused indefinitely", "✓".green()),
    }
    Ok(())
}

/// Resume azan playback
async fn cmd_resume(config: &Config) -> Result<()> {
    let store = OverrideStore::open(&config.storage.state_file)?;
    store.resume().context("Failed to write resume state")?;

    println!("{} Azan resumed", "✓".green());
    Ok(())
}

/// Stop whatever the speaker is playing right now
async fn cmd_stop_playback(config: &Config) -> Result<()> {
    let sink = SonosSink::connect(&config.speaker)
        .await
        .context("Failed to reach the speaker")?;
    match sink.stop().await {
        Ok(()) => {
            println!("{} Stopped playback on {}", "✓".green(), sink.name());
            Ok(())
        }
        Err(e) => {
            println!("{} Error stopping playback: {}", "✗".red(), e);
            Err(e.into())
        }
    }
}

/// Show today's prayer times
async fn cmd_times(config: &Config, format: OutputFormat) -> Result<()> {
    let client = AladhanClient::new(&config.location)?;
    let today = Local::now().date_naive();
    let times = client.fetch(today).await.context("Failed to fetch prayer times")?;

    match format {
        OutputFormat::Json => {
            let mut map = serde_json::Map::new();
            for (prayer, at) in times.iter() {
                map.insert(prayer.to_string(), serde_json::json!(at.format("%H:%M").to_string()));
            }
            if let Some(sunrise) = times.sunrise {
                map.insert("Sunrise".to_string(), serde_json::json!(sunrise.format("%H:%M").to_string()));
            }
            let json = serde_json::json!({
                "date": times.date.to_string(),
                "timings": map,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!(
                "Prayer times for {}, {} on {}",
                config.location.city, config.location.country, times.date
            );
            println!("----------------------------------------");
            for (prayer, at) in times.iter() {
                println!("{:<8} {}", format!("{}:", prayer), at.format("%H:%M"));
                if prayer == azand::prayer::Prayer::Fajr {
                    if let Some(sunrise) = times.sunrise {
                        println!("{:<8} {}", "Sunrise:", sunrise.format("%H:%M"));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Serve the web control page
async fn cmd_web(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.web.host = host;
    }
    if let Some(port) = port {
        config.web.port = port;
    }

    let store = OverrideStore::open(&config.storage.state_file)?;

    println!("Azan web control: http://{}:{}", config.web.host, config.web.port);
    web::serve(config, store).await
}

/// Show logs
async fn cmd_logs(follow: bool, lines: usize) -> Result<()> {
    let log_path = get_log_path();

    if !log_path.exists() {
        println!("No log file found at: {}", log_path.display());
        println!("The daemon may not have been started yet.");
        return Ok(());
    }

    if follow {
        println!("Following log file: {} (Ctrl+C to stop)", log_path.display());
        println!();

        // Use tail -f for following
        let mut child = std::process::Command::new("tail")
            .args(["-f", "-n", &lines.to_string()])
            .arg(&log_path)
            .spawn()
            .context("Failed to run tail -f")?;

        child.wait()?;
    } else {
        // Read last N lines
        let file = fs::File::open(&log_path).context("Failed to open log file")?;
        let reader = BufReader::new(file);
        let all_lines: Vec<String> = reader.lines().map_while(Result::ok).collect();

        let start = all_lines.len().saturating_sub(lines);
        for line in &all_lines[start..] {
            println!("{}", line);
        }
    }

    Ok(())
}

/// Run as the daemon process (internal command)
async fn cmd_run_daemon(config: &Config) -> Result<()> {
    let daemon = DaemonManager::new();
    daemon.register_self()?;

    run_daemon(config).await
}

/// Run the daemon main loop
async fn run_daemon(config: &Config) -> Result<()> {
    info!("Daemon starting...");

    // ============================================================
    // EARLY VALIDATION - Fail fast with clear error messages
    // ============================================================

    config.validate()?;

    let store = OverrideStore::open(&config.storage.state_file).context("Cannot open override store")?;

    // A speaker we cannot reach at startup is fatal; a speaker that drops off
    // the network later is a per-fire error.
    let sink: Arc<dyn PlaybackSink> = Arc::new(
        SonosSink::connect(&config.speaker)
            .await
            .context("Cannot start without a speaker connection")?,
    );

    let source = AladhanClient::new(&config.location)?;

    info!("Startup validation passed");

    // ============================================================
    // INITIALIZATION
    // ============================================================

    let now = Local::now();
    let mut scheduler = Scheduler::new(config.clone(), source, sink, store, now);
    scheduler.init(now).await?;
    info!("Scheduler initialized");

    // Create shutdown channel for the scheduler task
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.run(shutdown_rx).await {
            tracing::error!(error = %e, "Scheduler error");
        }
    });

    info!("Daemon running. Press Ctrl+C to stop.");

    // Set up signal handlers
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("SIGINT received");
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received");
            }
        }
        let _ = shutdown_tx.send(()).await;
    }

    #[cfg(not(unix))]
    {
        // On non-Unix, just wait for Ctrl+C
        tokio::signal::ctrl_c().await?;
        let _ = shutdown_tx.send(()).await;
    }

    info!("Daemon shutting down...");

    let _ = scheduler_handle.await;

    Ok(())
}
