//! Fuses the per-camera verdicts of one dartboard into a single result.
//!
//! Each tick reads `cam_{id}_ResultPublisher` for every camera. A round
//! settles once every camera delivered a fresh verdict, or once `timeout`
//! passed since the last verdict arrived, and is then published to
//! `dartboard_{id}_result`.

use std::{
    collections::HashMap,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::{
    blackboard::{Blackboard, dartboard_result_key, get_json, operator_key, set_json},
    descriptors::DartboardDescriptor,
    error::PipelineError,
    messages::{Class, ClassificationResult, ConsensusResult, DartThrow},
    operator::Schema,
    operators::ResultPublisher,
    tasks::AbortHandle,
    watchdog::Heartbeat,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    pub poll_ms: u64,
    pub timeout_ms: u64,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            poll_ms: 100,
            timeout_ms: 1_000,
        }
    }
}

impl CollectorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Round bookkeeping, independent of the blackboard and of wall-clock sleeps.
#[derive(Debug)]
pub struct ConsensusTracker {
    latest: Vec<Option<ClassificationResult>>,
    fresh: Vec<bool>,
    last_receive: Option<Instant>,
    timeout: Duration,
}

impl ConsensusTracker {
    pub fn new(cameras: usize, timeout: Duration) -> Self {
        Self {
            latest: vec![None; cameras],
            fresh: vec![false; cameras],
            last_receive: None,
            timeout,
        }
    }

    pub fn latest(&self) -> &[Option<ClassificationResult>] {
        &self.latest
    }

    /// Record what camera `index` shows right now. Only changes count as news.
    pub fn observe(&mut self, index: usize, report: Option<ClassificationResult>, now: Instant) {
        let Some(report) = report else {
            return;
        };
        if self.latest[index].as_ref() == Some(&report) {
            return;
        }
        self.latest[index] = Some(report);
        self.fresh[index] = true;
        self.last_receive = Some(now);
    }

    pub fn is_settled(&self, now: Instant) -> bool {
        let all_fresh = !self.fresh.is_empty() && self.fresh.iter().all(|fresh| *fresh);
        let timed_out = self
            .last_receive
            .is_some_and(|received| now.saturating_duration_since(received) >= self.timeout);
        all_fresh || timed_out
    }

    /// Feed one tick of reports, in camera order. Returns the verdict when the round settles.
    pub fn tick(
        &mut self,
        reports: Vec<Option<ClassificationResult>>,
        now: Instant,
    ) -> Option<ConsensusResult> {
        for (index, report) in reports.into_iter().enumerate().take(self.latest.len()) {
            self.observe(index, report, now);
        }
        if !self.is_settled(now) {
            return None;
        }
        let verdict = fuse(&self.latest)?;
        self.fresh.iter_mut().for_each(|fresh| *fresh = false);
        self.last_receive = None;
        Some(verdict)
    }
}

/// First item reaching the highest count, in input order.
fn plurality<T: PartialEq + Copy>(items: &[T]) -> Option<(T, usize)> {
    let mut best: Option<(T, usize)> = None;
    for item in items {
        let count = items.iter().filter(|other| *other == item).count();
        if best.is_none_or(|(_, max)| count > max) {
            best = Some((*item, count));
        }
    }
    best
}

/// Fuse the latest verdict of every camera; `None` while no camera reported.
pub fn fuse(latest: &[Option<ClassificationResult>]) -> Option<ConsensusResult> {
    let classes: Vec<Class> = latest.iter().flatten().map(|result| result.class).collect();
    let (class, _) = plurality(&classes)?;

    let verdict = match class {
        Class::Dart => {
            let voters: Vec<&ClassificationResult> = latest
                .iter()
                .flatten()
                .filter(|result| result.class == Class::Dart)
                .collect();
            let darts: Vec<&DartThrow> =
                voters.iter().filter_map(|result| result.content.as_ref()).collect();
            match pick_dart(&darts, voters.len()) {
                Some(throw) => ClassificationResult::dart(throw.clone()),
                None => ClassificationResult::bare(Class::Dart),
            }
        }
        other => ClassificationResult::bare(other),
    };
    Some(verdict)
}

/// Strict score majority among the `voters` dart cameras, else the most
/// confident scored dart. Dart cameras without a score still count as voters.
fn pick_dart<'a>(darts: &[&'a DartThrow], voters: usize) -> Option<&'a DartThrow> {
    let labels: Vec<&str> = darts.iter().map(|throw| throw.score.as_str()).collect();
    let (label, count) = plurality(&labels)?;
    if count * 2 > voters {
        return darts.iter().copied().find(|throw| throw.score == label);
    }
    darts.iter().copied().fold(None, |best: Option<&DartThrow>, throw| match best {
        Some(best) if best.confidence >= throw.confidence => Some(best),
        _ => Some(throw),
    })
}

pub struct Collector {
    dartboard: DartboardDescriptor,
    board: Arc<dyn Blackboard>,
    settings: CollectorSettings,
}

impl Collector {
    pub fn new(
        dartboard: DartboardDescriptor,
        board: Arc<dyn Blackboard>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            dartboard,
            board,
            settings,
        }
    }

    fn camera_keys(&self) -> Vec<String> {
        self.dartboard
            .cams
            .iter()
            .map(|cam| operator_key(cam, ResultPublisher::NAME))
            .collect()
    }

    fn read(&self, key: &str) -> Option<ClassificationResult> {
        match get_json(self.board.as_ref(), key) {
            Ok(report) => report,
            Err(err) => {
                warn!(key, "ignoring unreadable camera verdict: {err}");
                None
            }
        }
    }

    /// Poll until `abort` is set. Aborting never publishes a half-collected round.
    pub fn run(&mut self, abort: &AbortHandle, heartbeat: &Heartbeat) -> Result<(), PipelineError> {
        let span = info_span!("collector", dartboard = %self.dartboard.id);
        let _entered = span.enter();

        let keys = self.camera_keys();
        for key in &keys {
            self.board.delete(key)?;
        }
        let result_key = dartboard_result_key(&self.dartboard.id);
        let mut tracker = ConsensusTracker::new(keys.len(), self.settings.timeout());
        let mut published: HashMap<Class, u64> = HashMap::new();
        info!(cameras = keys.len(), "collector running");

        while !abort.is_aborted() {
            let reports = keys.iter().map(|key| self.read(key)).collect();
            if let Some(verdict) = tracker.tick(reports, Instant::now()) {
                set_json(self.board.as_ref(), &result_key, &verdict)?;
                *published.entry(verdict.class).or_default() += 1;
                metrics::counter!(
                    "dartvision_consensus_total",
                    "dartboard" => self.dartboard.id.clone(),
                    "class" => class_label(verdict.class)
                )
                .increment(1);
                match &verdict.content {
                    Some(throw) => info!(score = %throw.score, confidence = throw.confidence, "dart settled"),
                    None => debug!(class = class_label(verdict.class), "round settled"),
                }
            }
            heartbeat.beat();
            thread::sleep(self.settings.poll_interval());
        }

        info!(?published, "collector stopped");
        Ok(())
    }
}

fn class_label(class: Class) -> &'static str {
    match class {
        Class::None => "none",
        Class::Hand => "hand",
        Class::Dart => "dart",
    }
}
