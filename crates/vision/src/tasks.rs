//! Thread-per-task runner for pipelines and collectors.
//!
//! Each camera pipeline and each dartboard collector runs on its own named OS
//! thread until its [`AbortHandle`] is set or it fails. The manager owns the
//! handles, tracks task state, validates configuration pushed to running
//! pipelines and keeps a watchdog on every task.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
};

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::{
    blackboard::{self, Blackboard, dartboard_result_key, get_json},
    collector::{Collector, CollectorSettings},
    config::{ConfigRecord, ConfigSet},
    descriptors::{CameraDescriptor, DartboardDescriptor},
    error::{BlackboardError, ConfigError, PipelineError},
    messages::ConsensusResult,
    procedure::{ConfigSchema, Registries, RunContext},
    telemetry,
    watchdog::{Heartbeat, Watchdog, spawn_watchdog},
};

/// Cooperative cancellation flag shared between a task and its owner.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskId {
    Pipeline(String),
    Collector(String),
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::Pipeline(camera) => write!(f, "cam_{camera}"),
            TaskId::Collector(dartboard) => write!(f, "dartboard_{dartboard}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum TaskState {
    Running,
    /// The loop returned without being aborted.
    Finished,
    Aborted,
    Failed(String),
}

struct Task {
    abort: AbortHandle,
    state: Arc<Mutex<TaskState>>,
    handle: Option<JoinHandle<()>>,
    /// Operator schema of a pipeline, used to validate pushed configuration.
    schema: Option<ConfigSchema>,
}

impl Task {
    fn state(&self) -> TaskState {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_else(|_| TaskState::Failed("task state poisoned".into()))
    }
}

pub struct TaskManager {
    board: Arc<dyn Blackboard>,
    registries: Arc<Registries>,
    tasks: BTreeMap<TaskId, Task>,
    watchdog: Arc<Watchdog>,
    shutdown: Arc<AtomicBool>,
    watchdog_thread: Option<JoinHandle<()>>,
}

impl TaskManager {
    pub fn new(board: Arc<dyn Blackboard>, registries: Registries) -> Self {
        let watchdog = Arc::new(Watchdog::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let watchdog_thread = spawn_watchdog(Arc::clone(&watchdog), Arc::clone(&shutdown))
            .map_err(|err| warn!("watchdog unavailable: {err}"))
            .ok();
        Self {
            board,
            registries: Arc::new(registries),
            tasks: BTreeMap::new(),
            watchdog,
            shutdown,
            watchdog_thread,
        }
    }

    pub fn board(&self) -> &Arc<dyn Blackboard> {
        &self.board
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    /// Start the pipeline of `camera` running `procedure` (`{"type": tag, ...}`).
    ///
    /// A pipeline already running for the camera is kept as is.
    pub fn start_pipeline(
        &mut self,
        camera: CameraDescriptor,
        procedure: &Value,
    ) -> Result<TaskId, PipelineError> {
        let id = TaskId::Pipeline(camera.id.clone());
        if self.is_running(&id) {
            info!(task = %id, "pipeline already running");
            return Ok(id);
        }

        let mut procedure = self.registries.procedures.build_value(procedure)?;
        let schema = procedure.get_config(&self.registries)?;
        let board = Arc::clone(&self.board);
        let registries = Arc::clone(&self.registries);

        self.spawn(id.clone(), Some(schema), move |abort, heartbeat| {
            procedure.run(RunContext {
                camera: &camera,
                board,
                registries: &registries,
                abort,
                heartbeat,
            })
        })?;
        Ok(id)
    }

    /// Start the collector of `dartboard`. A running collector is kept as is.
    pub fn start_collector(
        &mut self,
        dartboard: DartboardDescriptor,
        settings: CollectorSettings,
    ) -> Result<TaskId, PipelineError> {
        let id = TaskId::Collector(dartboard.id.clone());
        if self.is_running(&id) {
            info!(task = %id, "collector already running");
            return Ok(id);
        }

        let mut collector = Collector::new(dartboard, Arc::clone(&self.board), settings);
        self.spawn(id.clone(), None, move |abort, heartbeat| {
            collector.run(&abort, &heartbeat)
        })?;
        Ok(id)
    }

    fn spawn<F>(
        &mut self,
        id: TaskId,
        schema: Option<ConfigSchema>,
        body: F,
    ) -> Result<(), PipelineError>
    where
        F: FnOnce(AbortHandle, Heartbeat) -> Result<(), PipelineError> + Send + 'static,
    {
        let name = id.to_string();
        let abort = AbortHandle::new();
        let state = Arc::new(Mutex::new(TaskState::Running));
        let heartbeat = self.watchdog.register(&name);

        let handle = {
            let abort = abort.clone();
            let state = Arc::clone(&state);
            let watchdog = Arc::clone(&self.watchdog);
            let name = name.clone();
            telemetry::spawn_thread(name.clone(), move || {
                let outcome = match body(abort.clone(), heartbeat) {
                    Ok(()) if abort.is_aborted() => TaskState::Aborted,
                    Ok(()) => TaskState::Finished,
                    Err(err) => {
                        error!(task = %name, "task failed: {err}");
                        TaskState::Failed(err.to_string())
                    }
                };
                if let Ok(mut guard) = state.lock() {
                    *guard = outcome;
                }
                watchdog.unregister(&name);
            })?
        };

        info!(task = %name, "task started");
        self.tasks.insert(
            id,
            Task {
                abort,
                state,
                handle: Some(handle),
                schema,
            },
        );
        Ok(())
    }

    /// Request cancellation. Returns `false` for unknown tasks.
    pub fn abort(&self, id: &TaskId) -> bool {
        match self.tasks.get(id) {
            Some(task) => {
                task.abort.abort();
                info!(task = %id, "abort requested");
                true
            }
            None => false,
        }
    }

    pub fn status(&self, id: &TaskId) -> Option<TaskState> {
        self.tasks.get(id).map(Task::state)
    }

    pub fn statuses(&self) -> BTreeMap<String, TaskState> {
        self.tasks
            .iter()
            .map(|(id, task)| (id.to_string(), task.state()))
            .collect()
    }

    fn is_running(&self, id: &TaskId) -> bool {
        self.status(id) == Some(TaskState::Running)
    }

    pub fn is_camera_active(&self, camera: &str) -> bool {
        self.is_running(&TaskId::Pipeline(camera.to_string()))
    }

    pub fn is_stalled(&self, id: &TaskId) -> bool {
        self.watchdog.is_stalled(&id.to_string())
    }

    /// Parameters of every operator `procedure` runs, including the frame grabber.
    pub fn config_schema(&self, procedure: &Value) -> Result<ConfigSchema, ConfigError> {
        self.registries
            .procedures
            .build_value(procedure)?
            .get_config(&self.registries)
    }

    /// Validate `records` against the camera's pipeline and queue them for its next frame.
    pub fn push_config(
        &self,
        camera: &str,
        operator: &str,
        records: Vec<ConfigRecord>,
    ) -> Result<(), PipelineError> {
        let id = TaskId::Pipeline(camera.to_string());
        let schema = self
            .tasks
            .get(&id)
            .and_then(|task| task.schema.as_ref())
            .ok_or_else(|| ConfigError::invalid(format!("no pipeline known for camera {camera}")))?;
        let params = schema.get(operator).ok_or_else(|| {
            ConfigError::invalid(format!("camera {camera} runs no operator named {operator}"))
        })?;

        ConfigSet::new(operator, params.clone()).configure(&records)?;
        blackboard::push_config(self.board.as_ref(), camera, operator, records)?;
        Ok(())
    }

    pub fn latest_result(&self, dartboard: &str) -> Result<Option<ConsensusResult>, BlackboardError> {
        get_json(self.board.as_ref(), &dartboard_result_key(dartboard))
    }

    /// Block until the task's thread exits and return its final state.
    pub fn wait(&mut self, id: &TaskId) -> Option<TaskState> {
        let task = self.tasks.get_mut(id)?;
        if let Some(handle) = task.handle.take() {
            if handle.join().is_err() {
                error!(task = %id, "task thread panicked");
                if let Ok(mut state) = task.state.lock() {
                    *state = TaskState::Failed("task thread panicked".into());
                }
            }
        }
        Some(task.state())
    }

    /// Abort every task, wait for all of them and stop the watchdog.
    pub fn shutdown(&mut self) {
        for task in self.tasks.values() {
            task.abort.abort();
        }
        let ids: Vec<TaskId> = self.tasks.keys().cloned().collect();
        for id in ids {
            if let Some(state) = self.wait(&id) {
                info!(task = %id, ?state, "task joined");
            }
        }
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.watchdog_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
