//! Runs the configured dartboard until Ctrl+C or until every pipeline ended.

use std::{
    sync::{
        Arc, Once,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use dart_vision::{
    Blackboard, ConsensusResult, MemoryBlackboard, Registries, TaskId, TaskManager, TaskState,
};
use tracing::{debug, info, warn};

use crate::{config::RunConfig, telemetry};

const SUPERVISOR_POLL: Duration = Duration::from_millis(200);

pub fn run(config: RunConfig) -> Result<()> {
    static CTRL_HANDLER: Once = Once::new();

    let _telemetry_guard = telemetry::enter_runtime(&config.telemetry);
    let metrics_handle = telemetry::init_metrics_recorder(config.telemetry.metrics_addr)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler(move || {
            handler_shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    let setup = config.setup;
    let dartboard_id = setup.dartboard.id.clone();
    let span = tracing::info_span!("dartcount", dartboard = %dartboard_id);
    let _span_guard = span.enter();

    let board: Arc<dyn Blackboard> = Arc::new(MemoryBlackboard::new());
    let mut manager = TaskManager::new(board, Registries::default());

    let mut pipelines = Vec::new();
    for camera in setup.dartboard_cameras() {
        let id = manager
            .start_pipeline(camera.clone(), &setup.procedure)
            .with_context(|| format!("failed to start pipeline for camera {}", camera.id))?;
        pipelines.push(id);
    }
    manager
        .start_collector(setup.dartboard.clone(), setup.collector)
        .context("failed to start collector")?;
    info!(cameras = pipelines.len(), "dartboard running, press Ctrl+C to stop");

    let mut last: Option<ConsensusResult> = None;
    let mut reported_failures = Vec::new();
    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(SUPERVISOR_POLL);

        match manager.latest_result(&dartboard_id) {
            Ok(Some(result)) if last.as_ref() != Some(&result) => {
                report(&result);
                last = Some(result);
            }
            Ok(_) => {}
            Err(err) => warn!("failed to read dartboard result: {err}"),
        }

        for id in &pipelines {
            if let Some(TaskState::Failed(reason)) = manager.status(id) {
                if !reported_failures.contains(id) {
                    warn!(task = %id, "pipeline stopped: {reason}");
                    reported_failures.push(id.clone());
                }
            }
        }
        if pipelines.iter().all(|id| !is_running(&manager, id)) {
            info!("no pipeline left running");
            break;
        }
    }

    manager.shutdown();
    for (task, state) in manager.statuses() {
        debug!(task = %task, ?state, "final task state");
    }
    if let Some(handle) = metrics_handle {
        debug!("final metrics:\n{}", handle.render());
    }
    Ok(())
}

fn is_running(manager: &TaskManager, id: &TaskId) -> bool {
    manager.status(id) == Some(TaskState::Running)
}

fn report(result: &ConsensusResult) {
    match &result.content {
        Some(throw) => info!(
            score = %throw.score,
            value = throw.value,
            confidence = throw.confidence,
            "dart"
        ),
        None => info!(class = ?result.class, "board state"),
    }
}
