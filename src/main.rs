use color_eyre::{eyre::eyre, Result};
use gesturekeys::actuation::{KeyInjector, LoggingInjector};
use gesturekeys::config::EngineConfig;
use gesturekeys::engine::KeyEngine;
use gesturekeys::gesture::{
    GesturePolicy, GestureState, IdleSource, PoseError, PoseSource, Sample, ScriptedPoseSource,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const IDLE_FRAME_WIDTH: u32 = 640;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = load_config().await;
    let policy = GesturePolicy::from(&config);
    let mut source = build_source(&config).await;

    let injector: Arc<dyn KeyInjector> = Arc::new(LoggingInjector);
    let mut engine = KeyEngine::create(&config, injector)
        .start()
        .map_err(|e| eyre!("Failed to start key engine: {}", e))?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, stopping"),
            Err(e) => error!("Unable to listen for Ctrl-C: {}", e),
        }
        ctrl_c.cancel();
    });

    let mut interval = tokio::time::interval(config.tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_state = GestureState::default();

    info!("Tick loop running every {}ms", config.tick_interval_ms);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = interval.tick() => {
                let sample = match source.sample() {
                    Ok(sample) => sample,
                    Err(PoseError::Exhausted) => {
                        info!("Pose source exhausted");
                        break;
                    }
                    Err(e) => {
                        // Kein Frame = keine Hand, gehaltene Tasten werden losgelassen
                        warn!("Pose sampling failed: {}", e);
                        Sample::default()
                    }
                };

                let input = policy.evaluate(&sample);
                if input.state != last_state {
                    info!("Gesture changed: {:?}", input.state);
                    last_state = input.state;
                }

                match engine.tick_input(&input, Instant::now()) {
                    Ok(commands) if !commands.is_empty() => debug!("Enqueued {:?}", commands),
                    Ok(_) => {}
                    Err(e) => {
                        error!("Actuation unavailable: {}", e);
                        break;
                    }
                }
            }
        }
    }

    let report = tokio::task::spawn_blocking(move || engine.shutdown().into_report())
        .await
        .map_err(|e| eyre!("Shutdown task failed: {}", e))?;

    if report.drained {
        info!("Shutdown complete");
    } else {
        warn!(
            "Worker did not drain in time, forced release of {:?}",
            report.forced_release
        );
    }
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| Level::from_str(&value).ok())
        .unwrap_or(Level::INFO);

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

/// Config from the first CLI argument, or the per-user default file
async fn load_config() -> EngineConfig {
    let path = match std::env::args().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => match EngineConfig::default_path() {
            Ok(path) => {
                if let Err(e) = EngineConfig::ensure_default(&path).await {
                    warn!("Unable to write default config: {}", e);
                }
                path
            }
            Err(e) => {
                warn!("{}, using built-in defaults", e);
                return EngineConfig::default();
            }
        },
    };

    match EngineConfig::load(&path).await {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Unable to load {}: {}, using defaults", path.display(), e);
            EngineConfig::default()
        }
    }
}

async fn build_source(config: &EngineConfig) -> Box<dyn PoseSource> {
    if let Some(path) = &config.replay_path {
        match ScriptedPoseSource::load(path).await {
            Ok(source) => return Box::new(source),
            Err(e) => warn!("Unable to load replay {}: {}", path.display(), e),
        }
    }
    info!("No pose replay configured, running with idle source");
    Box::new(IdleSource {
        frame_width: IDLE_FRAME_WIDTH,
    })
}
