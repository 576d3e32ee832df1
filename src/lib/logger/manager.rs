use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::{metadata::LevelFilter, *};
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer};

use crate::cli;

use super::history::{BroadcastWriter, History};

#[derive(Default)]
struct Manager {
    process: Option<tokio::task::JoinHandle<()>>,
    // Flushes the file appender when dropped
    file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

lazy_static! {
    static ref MANAGER: Arc<Mutex<Manager>> = Default::default();
    pub static ref HISTORY: Arc<Mutex<History>> = Default::default();
}

// Start logger, should be done inside main, within the tokio runtime
pub fn init() -> Result<()> {
    // Redirect all logs from libs using "Log"
    LogTracer::init_with_filter(tracing::log::LevelFilter::Trace)
        .context("Failed to set logger")?;

    // Configure the console log
    let console_env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli::manager::is_verbose() {
            EnvFilter::new(LevelFilter::DEBUG.to_string())
        } else {
            EnvFilter::new(LevelFilter::INFO.to_string())
        }
    });

    // Report goes to stdout, keep it clean
    let console_layer = fmt::Layer::new()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(fmt::format::FmtSpan::NONE)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_filter(console_env_filter);

    // Configure the file log
    let dir = cli::manager::log_path();
    let file_appender = tracing_appender::rolling::hourly(dir, "rtc-diagnostics.log");
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::Layer::new()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(fmt::format::FmtSpan::NONE)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_filter(EnvFilter::new(LevelFilter::DEBUG.to_string()));

    // Configure the history log
    let (tx, mut rx) = tokio::sync::broadcast::channel(100);
    let history_layer = fmt::Layer::new()
        .with_writer(BroadcastWriter::new(tx))
        .with_ansi(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(fmt::format::FmtSpan::NONE)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_filter(EnvFilter::new(LevelFilter::DEBUG.to_string()));

    let history = HISTORY.clone();
    let process = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(message) => {
                    history.lock().unwrap().push(message);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    history
                        .lock()
                        .unwrap()
                        .push(format!("... {skipped} log line(s) dropped\n"));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    {
        let mut manager = MANAGER.lock().unwrap();
        manager.process = Some(process);
        manager.file_guard = Some(file_guard);
    }

    // Configure the default subscriber
    let subscriber = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(history_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("Unable to set a global subscriber")?;

    info!(
        "{}, version: {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    );
    info!(
        "Starting at {}",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
    );
    debug!("Command line call: {}", cli::manager::command_line_string());
    debug!(
        "Command line input struct call: {}",
        cli::manager::command_line()
    );

    Ok(())
}

/// Every line captured so far, oldest first.
pub fn history() -> Vec<String> {
    HISTORY.lock().unwrap().lines()
}

/// Stops collecting history and flushes the log file.
pub fn shutdown() {
    let mut manager = MANAGER.lock().unwrap();
    if let Some(process) = manager.process.take() {
        process.abort();
    }
    manager.file_guard.take();
}
