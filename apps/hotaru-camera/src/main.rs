//! Hotaru Camera: live MJPEG stream, motion alarm and control API
//!
//! ## Usage
//!
//! ```bash
//! # Serve generated frames on port 80
//! hotaru-camera --test-source
//!
//! # Replay recorded JPEGs on a custom port
//! HOTARU_SOURCE_DIR=/srv/frames HOTARU_WEB_PORT=8080 hotaru-camera
//!
//! # Wire the alarm to sysfs GPIO pins
//! HOTARU_LED_GPIO=/sys/class/gpio/gpio4/value \
//! HOTARU_BUZZER_GPIO=/sys/class/gpio/gpio12/value hotaru-camera
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use hotaru::alarm::{spawn_pulse_loop, Actuator, ActuatorBank, AlarmController, LogActuator, SysfsGpio};
use hotaru::capture::{available_memory_bytes, ReplaySource, SyntheticConfig, SyntheticSource};
use hotaru::config::{Config, SourceKind};
use hotaru::motion::MotionDetector;
use hotaru::telemetry::SharedTelemetry;
use hotaru::{FrameSource, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let config = Config::from_env()?;

    info!("Hotaru Camera starting");
    info!("  Web port: {}", config.web_port);
    info!("  Source: {:?} @ {}fps", config.source, config.fps);
    info!(
        "  Motion: stride {}, delta {}, threshold {}",
        config.motion.stride, config.motion.pixel_delta, config.motion.trigger_fraction
    );
    info!(
        "  Detection: {}, alarm on motion: {}",
        config.detection_enabled, config.alarm.trigger_on_motion
    );

    // Decided once; never re-probed while running
    let profile = config.capture_profile(available_memory_bytes());

    let source: Arc<dyn FrameSource> = match config.source {
        SourceKind::Synthetic => Arc::new(SyntheticSource::new(SyntheticConfig {
            acquire_timeout: config.acquire_timeout,
            ..SyntheticConfig::for_profile(&profile, config.fps)
        })),
        SourceKind::Replay(ref dir) => Arc::new(
            ReplaySource::from_dir(dir)?
                .with_buffers(profile.frame_buffers)
                .with_fps(config.fps)
                .with_acquire_timeout(config.acquire_timeout),
        ),
    };

    let telemetry = SharedTelemetry::new(config.detection_enabled);
    let alarm = AlarmController::new(config.alarm.clone(), build_actuator(&config), telemetry.clone());

    // Graceful shutdown
    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();

    let pipeline = Pipeline::new(
        source,
        MotionDetector::shared(config.motion),
        alarm.clone(),
        telemetry.clone(),
        cancel.clone(),
    );

    let pulse = spawn_pulse_loop(alarm, cancel.clone());
    tracker.spawn(async move {
        if let Err(e) = pulse.await {
            error!("Alarm pulse task failed: {}", e);
        }
    });

    let bind = SocketAddr::from(([0, 0, 0, 0], config.web_port));
    let web_cancel = cancel.clone();
    tracker.spawn(async move {
        if let Err(e) = hotaru::web::start(pipeline, bind).await {
            error!("Web server failed: {:#}", e);
            web_cancel.cancel();
        }
    });
    tracker.close();

    run(telemetry, cancel, tracker).await
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("hotaru=info".parse()?),
        )
        .init();
    Ok(())
}

/// LED and buzzer on sysfs GPIO when configured, otherwise log-only.
fn build_actuator(config: &Config) -> Arc<dyn Actuator> {
    let mut outputs: Vec<Box<dyn Actuator>> = Vec::new();
    if let Some(ref path) = config.led_gpio {
        info!("  LED: {:?}", path);
        outputs.push(Box::new(SysfsGpio::new("led", path)));
    }
    if let Some(ref path) = config.buzzer_gpio {
        info!("  Buzzer: {:?}", path);
        outputs.push(Box::new(SysfsGpio::new("buzzer", path)));
    }

    if outputs.is_empty() {
        info!("  Alarm outputs: log only (set HOTARU_LED_GPIO / HOTARU_BUZZER_GPIO)");
        return Arc::new(LogActuator::new("alarm"));
    }
    Arc::new(ActuatorBank::new(outputs))
}

/// Log resources periodically, shut down on Ctrl-C
async fn run(telemetry: SharedTelemetry, cancel: CancellationToken, tracker: TaskTracker) -> Result<()> {
    let mut stats_interval = interval(Duration::from_secs(10));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                cancel.cancel();
                break;
            }
            _ = cancel.cancelled() => break,
            _ = stats_interval.tick() => {
                let t = telemetry.read();
                let free_mb = available_memory_bytes().map(|b| b / (1024 * 1024));
                info!(
                    "Stats: {} streams, {} motion events, {} alerts, {} capture failures, free memory {:?} MB",
                    t.active_streams, t.motion_count, t.total_alerts, t.capture_failures, free_mb
                );
            }
        }
    }

    if tokio::time::timeout(Duration::from_secs(5), tracker.wait()).await.is_err() {
        warn!("Shutdown timed out after 5s");
    }
    Ok(())
}
