//! Watchdog flagging pipelines and collectors that stopped making progress.
//!
//! Every task loop beats its [`Heartbeat`] once per iteration. A pipeline
//! blocked on a dead camera stops beating; the watchdog reports it once per
//! stall and counts it in `dartvision_watchdog_stalls_total`. Tasks are never
//! killed from here: cancellation stays cooperative.

use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tracing::{error, info};

use crate::telemetry;

/// Sleep interval between watchdog health checks.
pub const WATCHDOG_POLL_INTERVAL_MS: u64 = 500;
/// Time without a heartbeat before a task is considered stalled.
pub const WATCHDOG_STALE_THRESHOLD_MS: u64 = 5_000;
/// Grace period allowing a freshly started task to open its source.
pub const WATCHDOG_STARTUP_GRACE_MS: u64 = 5_000;

/// Per-task progress marker.
#[derive(Clone, Debug)]
pub struct Heartbeat {
    last: Arc<AtomicU64>,
}

impl Heartbeat {
    fn new(now: u64) -> Self {
        Self {
            last: Arc::new(AtomicU64::new(now.saturating_add(WATCHDOG_STARTUP_GRACE_MS))),
        }
    }

    /// A heartbeat nobody watches, for running procedures outside a task manager.
    pub fn detached() -> Self {
        Self::new(current_millis())
    }

    pub fn beat(&self) {
        self.last.store(current_millis(), Ordering::Relaxed);
    }

    fn last(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}

struct Watched {
    heartbeat: Heartbeat,
    stalled: bool,
}

#[derive(Default)]
pub struct Watchdog {
    tasks: Mutex<BTreeMap<String, Watched>>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching `task`, replacing a previous registration under the same name.
    pub fn register(&self, task: &str) -> Heartbeat {
        let heartbeat = Heartbeat::new(current_millis());
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.insert(
                task.to_string(),
                Watched {
                    heartbeat: heartbeat.clone(),
                    stalled: false,
                },
            );
        }
        heartbeat
    }

    pub fn unregister(&self, task: &str) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.remove(task);
        }
    }

    pub fn is_stalled(&self, task: &str) -> bool {
        self.tasks
            .lock()
            .map(|tasks| tasks.get(task).is_some_and(|w| w.stalled))
            .unwrap_or(false)
    }

    /// Update stall flags at `now` (ms since epoch) and return tasks that newly stalled.
    pub fn check(&self, now: u64) -> Vec<String> {
        let Ok(mut tasks) = self.tasks.lock() else {
            return Vec::new();
        };
        let mut newly_stalled = Vec::new();
        for (name, watched) in tasks.iter_mut() {
            let stale = now.saturating_sub(watched.heartbeat.last()) > WATCHDOG_STALE_THRESHOLD_MS;
            if stale && !watched.stalled {
                newly_stalled.push(name.clone());
            } else if !stale && watched.stalled {
                info!(task = %name, "task resumed after stall");
            }
            watched.stalled = stale;
        }
        newly_stalled
    }
}

/// Spawn the thread polling task health until `shutdown` is set.
pub fn spawn_watchdog(
    watchdog: Arc<Watchdog>,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<thread::JoinHandle<()>> {
    telemetry::spawn_thread("dartvision-watchdog", move || {
        while !shutdown.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(WATCHDOG_POLL_INTERVAL_MS));
            for task in watchdog.check(current_millis()) {
                error!(task = %task, "watchdog detected a stalled task");
                metrics::counter!("dartvision_watchdog_stalls_total", "task" => task).increment(1);
            }
        }
    })
}

pub fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stalls_are_reported_once_and_cleared_by_a_beat() {
        let watchdog = Watchdog::new();
        let heartbeat = watchdog.register("cam_1");
        let now = current_millis();

        assert!(watchdog.check(now).is_empty());
        let late = now + WATCHDOG_STARTUP_GRACE_MS + WATCHDOG_STALE_THRESHOLD_MS + 1_000;
        assert_eq!(watchdog.check(late), vec!["cam_1".to_string()]);
        assert!(watchdog.is_stalled("cam_1"));
        assert!(watchdog.check(late).is_empty());

        heartbeat.beat();
        assert!(watchdog.check(current_millis()).is_empty());
        assert!(!watchdog.is_stalled("cam_1"));

        watchdog.unregister("cam_1");
        assert!(watchdog.check(late + 60_000).is_empty());
    }
}
