// src/main.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{debug, error, info, warn};

use snapsoak::config::{self, Config, DeviceBackend};
use snapsoak::testing::MockDevice;
use snapsoak::{DeviceClient, Orchestrator};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // ------------------------------------------------------------
    // Config
    // ------------------------------------------------------------
    let cfg_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "snapsoak.toml".into());

    let cfg: Config = config::load(&cfg_path).with_context(|| format!("loading {}", cfg_path))?;
    let settings = cfg.run_settings().context("invalid configuration")?;
    info!(
        "[snapsoak] loaded {} → {}:{} for {:.1}s",
        cfg_path,
        settings.address,
        settings.port,
        settings.duration.as_secs_f64()
    );

    let orchestrator = Orchestrator::new(device_client(&cfg), settings).on_worker_event(|event| {
        debug!("[snapsoak] channel {} -> {:?}", event.channel, event.state);
    });

    // ------------------------------------------------------------
    // Graceful shutdown
    // ------------------------------------------------------------
    {
        let stop = orchestrator.stop_signal();
        ctrlc::set_handler(move || {
            info!("[snapsoak] shutdown requested");
            stop.raise();
        })?;
    }

    // ------------------------------------------------------------
    // Run
    // ------------------------------------------------------------
    let report = match orchestrator.run() {
        Ok(report) => report,
        Err(e) => {
            error!("[snapsoak] run aborted: {}", e);
            return Err(e).context("capture run aborted");
        }
    };

    for worker in &report.workers {
        if let Some(reason) = &worker.persist_failure {
            warn!("[snapsoak] channel {} ended early: {}", worker.channel, reason);
        }
        info!(
            "[snapsoak] channel {}: {} captures, {} failed, state {:?}",
            worker.channel, worker.captures, worker.capture_failures, worker.state
        );
    }
    info!(
        "[snapsoak] done: {} captures in {:.1}s, workers joined {:.3}s after stop",
        report.total_captures(),
        report.elapsed_secs,
        report.stop_latency_secs
    );

    Ok(())
}

fn device_client(cfg: &Config) -> Arc<dyn DeviceClient> {
    match cfg.device.backend {
        DeviceBackend::Simulated => {
            let sim = &cfg.device.simulated;
            info!(
                "[snapsoak] simulated device, channels {}..{}",
                sim.start_channel,
                u32::from(sim.start_channel) + u32::from(sim.channel_count)
            );
            Arc::new(
                MockDevice::with_channels(sim.start_channel, sim.channel_count)
                    .with_capture_delay(Duration::from_millis(sim.capture_delay_ms)),
            )
        }
    }
}
