use snow_calendar::config::Config;
use snow_calendar::scheduler::Scheduler;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,snow_calendar=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Snow calendar service starting...");

    let config_path =
        std::env::var("SNOW_CALENDAR_CONFIG").unwrap_or_else(|_| "config/config.yaml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration: {}\n\n\
             Make sure:\n\
             1. {} exists\n\
             2. All required environment variables are set (check .env.example)\n\
             3. Create a .env file if needed",
            e,
            config_path
        )
    })?;
    info!(
        "Configuration loaded for station {} ({}), writing to {}",
        config.station.id,
        config.station.name.as_deref().unwrap_or("unnamed"),
        config.output.data_dir.display()
    );

    let run_once = config.scheduler.run_once;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut scheduler = Scheduler::new(config, shutdown_rx)
        .map_err(|e| anyhow::anyhow!("Failed to create scheduler: {}", e))?;

    if let Err(e) = scheduler.run().await {
        error!("Scheduler error: {}", e);
        if run_once {
            return Err(e.into());
        }
    }

    info!("Snow calendar service shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
