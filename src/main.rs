use anyhow::{Context, Result};
use tracing::*;

use diag_api::v1::report::RunSummary;
use rtc_diagnostics::{capabilities::IceTransportPolicy, cli, diagnostics, logger, settings};

/**
 * Start our managers
 */
fn let_there_be_light() -> Result<()> {
    cli::manager::init();
    logger::manager::init()?;
    settings::manager::init(
        Some(&cli::manager::settings_file()),
        cli::manager::is_reset(),
    );
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let_there_be_light()?;

    let ice_servers = cli::manager::ice_servers();
    if !ice_servers.is_empty() {
        settings::manager::set_ice_servers(&ice_servers);
    }

    let header = settings::manager::header();
    info!(
        "Using {} settings v{} from {:?}, {} ICE server(s)",
        header.name,
        header.version,
        settings::manager::file_name().unwrap_or_default(),
        settings::manager::ice_servers().len()
    );
    debug!("Settings: {:#?}", settings::manager::settings());

    let mut config = settings::manager::diagnostics_config();
    if cli::manager::stop_on_failure() {
        config.stop_on_failure = true;
    }
    if cli::manager::relay_only() {
        config.ice_transport_policy = IceTransportPolicy::Relay;
    }

    let profile = cli::manager::profile();
    let tests = cli::manager::tests();
    info!("Running {} test(s) against the {profile} host", tests.len());

    let mut suite =
        diagnostics::build_suite("Diagnostics", &tests, &config, &profile.capabilities());

    let stop = suite.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping tests");
            stop.stop();
        }
    });

    let run_id = uuid::Uuid::new_v4().to_string();
    let started_at = chrono::Utc::now().to_rfc3339();
    let outcome = suite.start().await;
    let finished_at = chrono::Utc::now().to_rfc3339();

    let (passed, report) = match outcome {
        Ok(report) => (true, report),
        Err(error) => {
            error!("Diagnostics failed: {error}");
            (false, error.report().cloned().unwrap_or_default())
        }
    };

    let logs = if cli::manager::include_logs() {
        // Let the history collector drain what was just logged
        tokio::task::yield_now().await;
        Some(logger::manager::history())
    } else {
        None
    };

    let summary = RunSummary {
        run_id,
        started_at,
        finished_at,
        passed,
        report,
        logs,
    };
    let output = serde_json::to_string_pretty(&summary)?;

    match cli::manager::output() {
        Some(path) => {
            std::fs::write(&path, output)
                .with_context(|| format!("Failed to write report to {path:?}"))?;
            info!("Report written to {path:?}");
        }
        None => println!("{output}"),
    }

    logger::manager::shutdown();

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}
