//! aris_controller - workcell controller daemon
//!
//! This daemon:
//! 1. Loads configuration (file named by ARIS_CONFIG, then ARIS_* overrides)
//! 2. Fits the pixel → world calibration once
//! 3. Runs the perception loop on its own thread
//! 4. Serves the command channel for the ordering client
//! 5. Drives the arm through the task state machine until stopped or faulted

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use aris_controller::detect::ScriptedDetector;
use aris_controller::ingest::open_source;
use aris_controller::task::TaskExit;
use aris_controller::{
    Arm, CommandChannel, ControllerConfig, PerceptionEngine, SharedState, SimulatedArm,
    TaskStateMachine,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Aris workcell controller")]
struct Args {
    /// JSON or TOML configuration file.
    #[arg(long, env = "ARIS_CONFIG")]
    config: Option<PathBuf>,

    /// Command channel bind address (overrides the config file).
    #[arg(long)]
    channel_addr: Option<String>,

    /// Camera source URL (overrides the config file).
    #[arg(long)]
    camera_url: Option<String>,

    /// Delay applied to every blocking motion of the simulated arm.
    #[arg(long, default_value_t = 0)]
    motion_delay_ms: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Some(path) = &args.config {
        std::env::set_var("ARIS_CONFIG", path);
    }
    let mut cfg = ControllerConfig::load()?;
    if let Some(addr) = args.channel_addr {
        cfg.channel.addr = addr;
    }
    if let Some(url) = args.camera_url {
        cfg.camera.url = url;
    }

    let mapper = Arc::new(
        cfg.calibration
            .fit()
            .map_err(|e| anyhow!("calibration failed: {}", e))?,
    );
    log::info!(
        "calibration fitted from {} point pairs",
        cfg.calibration.pixel.len()
    );

    let state = SharedState::new(cfg.build_zones(), cfg.seal_latch());
    let shutdown = Arc::new(AtomicBool::new(false));

    {
        let shutdown = shutdown.clone();
        let state = state.clone();
        ctrlc::set_handler(move || {
            log::warn!("interrupt received, stopping controller");
            shutdown.store(true, Ordering::SeqCst);
            state.mark_dead("shutdown");
        })
        .map_err(|e| anyhow!("failed to install signal handler: {}", e))?;
    }

    // Only the simulated driver ships with this crate.
    let sim = SimulatedArm::new().with_motion_delay(Duration::from_millis(args.motion_delay_ms));
    let arm = Arm::new(Box::new(sim), state.clone());
    log::warn!("driving the simulated arm");

    let mut channel = CommandChannel::new(cfg.channel.clone(), arm.telemetry())
        .spawn(shutdown.clone())?;
    let inbound = channel
        .take_inbound()
        .ok_or_else(|| anyhow!("command queue already taken"))?;
    let notifier = Arc::new(channel.notifier());

    let engine = PerceptionEngine::new(
        mapper,
        state.clone(),
        cfg.trash_region,
        cfg.trash_tracker(),
        cfg.proximity_guard(),
        cfg.confidence,
    );
    let perception = {
        let shutdown = shutdown.clone();
        let camera = cfg.camera.clone();
        thread::Builder::new()
            .name("perception".to_string())
            .spawn(move || -> Result<()> {
                let mut source = open_source(camera)?;
                let mut detector = ScriptedDetector::default();
                aris_controller::perception::run_perception_loop(
                    source.as_mut(),
                    &mut detector,
                    &engine,
                    &shutdown,
                )
            })
            .map_err(|e| anyhow!("failed to spawn perception thread: {}", e))?
    };

    let mut machine = TaskStateMachine::new(arm, inbound, notifier, cfg.task.clone());
    let exit = machine.run();
    match exit {
        TaskExit::Stopped => log::info!("task loop stopped by client"),
        TaskExit::Faulted(code) => log::error!("task loop ended on arm fault {}", code),
        TaskExit::Halted => log::info!("task loop halted"),
    }

    shutdown.store(true, Ordering::SeqCst);
    channel.stop()?;
    match perception.join() {
        Ok(Ok(())) => {}
        Ok(Err(err)) => log::error!("perception loop failed: {}", err),
        Err(_) => return Err(anyhow!("perception thread panicked")),
    }

    if let TaskExit::Faulted(code) = exit {
        return Err(anyhow!("arm fault {}", code));
    }
    Ok(())
}
