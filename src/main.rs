//! PINGPONG: randomized two-asset ping-pong swap bot.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! optionally serves the dashboard, and runs the swap loop with graceful
//! shutdown on Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use pingpong::config;
use pingpong::dashboard::{self, routes::DashboardState};
use pingpong::engine::RunController;
use pingpong::types::RunEnd;

const BANNER: &str = r#"
 ___ ___ _  _  ___ ___  ___  _  _  ___
| _ \_ _| \| |/ __| _ \/ _ \| \| |/ __|
|  _/| || .` | (_ |  _/ (_) | .` | (_ |
|_| |___|_|\_|\___|_|  \___/|_|\_|\___|

  Randomized two-asset swap loop for Jupiter
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".into());
    let cfg = config::AppConfig::load(&path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %path,
        input_mint = %cfg.run.input_mint,
        output_mint = %cfg.run.output_mint,
        trade_count = cfg.run.trade_count,
        "PINGPONG starting up"
    );

    let run_config = Arc::new(cfg.run_config()?);
    let controller = Arc::new(RunController::default());

    // -- Dashboard -------------------------------------------------------

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(
            controller.clone(),
            Some(run_config.clone()),
        ));
        dashboard::spawn_dashboard(state, cfg.dashboard.port).await?;
    }

    // Echo run events to stdout
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{event}"),
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "Event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // -- Run -------------------------------------------------------------

    if cfg.dashboard.enabled && !cfg.dashboard.autostart {
        info!("Waiting for a start request from the dashboard. Press Ctrl+C to exit.");
        tokio::signal::ctrl_c().await?;
        controller.cancel_run().await;
        if let Some(end) = controller.wait().await {
            log_run_end(&end);
        }
        return Ok(());
    }

    controller.start_run(run_config).await?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let end = tokio::select! {
        end = controller.wait() => end,
        _ = &mut shutdown => {
            info!("Shutdown signal received. Finishing the current leg...");
            controller.cancel_run().await;
            controller.wait().await
        }
    };

    if let Some(end) = end {
        log_run_end(&end);
    }

    if cfg.dashboard.enabled {
        info!("Run over. Dashboard still serving; press Ctrl+C to exit.");
        tokio::signal::ctrl_c().await?;
        controller.cancel_run().await;
        controller.wait().await;
    }

    Ok(())
}

fn log_run_end(end: &RunEnd) {
    match end {
        RunEnd::Fatal(_) => warn!(reason = %end, "PINGPONG stopped"),
        _ => info!(reason = %end, "PINGPONG shut down cleanly."),
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pingpong=info"));

    let json_logging = std::env::var("PINGPONG_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
