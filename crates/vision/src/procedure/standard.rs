use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use serde::Deserialize;
use tracing::{debug, error, info, info_span, warn};
use video_ingest::Frame;

use super::{
    ConfigSchema, Procedure, Registries, RunContext, configure_initial, dispatch_config,
    schema_entry,
};
use crate::{
    blackboard::{Blackboard, PendingConfig, operator_key, take_config},
    config::{ConfigParameter, ConfigSet},
    descriptors::CameraDescriptor,
    error::{ConfigError, PipelineError},
    messages::{Class, DartThrow},
    operator::{Operator, Schema, Stage},
    operators::{
        BBoxDetector, ChangeDetector, CustomChangeDetector, DartTipCalculator, FpsCalculator,
        FrameGrabber, HomographyWarper, HoughLineDetector, LineInput, MotionDetector,
        ResultPublisher, ScoreCalculator, SizeClassifier, TipInput,
    },
    registry::{Kwargs, parse_kwargs},
};

const HAND_COOLDOWN: &str = "hand_cooldown";
const HEARTBEAT_EVERY: u64 = 30;

#[derive(Deserialize)]
struct StandardArgs {
    #[serde(default = "default_detector")]
    detector: String,
    #[serde(default = "default_segmentor")]
    segmentor: String,
}

fn default_detector() -> String {
    MotionDetector::NAME.to_string()
}

fn default_segmentor() -> String {
    CustomChangeDetector::NAME.to_string()
}

/// Motion gating, size classification and, for darts, line/tip localisation and scoring.
pub struct StandardProcedure {
    params: ConfigSet,
    detector: String,
    segmentor: String,
}

impl Schema for StandardProcedure {
    const NAME: &'static str = "StandardProcedure";

    fn schema() -> Vec<ConfigParameter> {
        vec![ConfigParameter::float(HAND_COOLDOWN, 2.0, 0.0, 30.0)
            .describe("seconds after a hand during which detections keep rebasing")]
    }
}

impl Default for StandardProcedure {
    fn default() -> Self {
        Self {
            params: Self::config_set(),
            detector: default_detector(),
            segmentor: default_segmentor(),
        }
    }
}

/// Every stage of one run, in execution order.
struct Stages {
    grabber: Stage<FrameGrabber>,
    warper: Option<Stage<HomographyWarper>>,
    detector: Stage<Box<dyn ChangeDetector>>,
    segmentor: Stage<Box<dyn ChangeDetector>>,
    bbox: Stage<BBoxDetector>,
    classifier: Stage<SizeClassifier>,
    lines: Stage<HoughLineDetector>,
    tips: Stage<DartTipCalculator>,
    scorer: Stage<ScoreCalculator>,
    fps: Stage<FpsCalculator>,
    publisher: Stage<ResultPublisher>,
}

impl Stages {
    fn configure_initial(&mut self, camera: &CameraDescriptor) -> Result<(), ConfigError> {
        configure_initial(&mut self.grabber, camera)?;
        if let Some(warper) = self.warper.as_mut() {
            configure_initial(warper, camera)?;
        }
        configure_initial(&mut self.detector, camera)?;
        configure_initial(&mut self.segmentor, camera)?;
        configure_initial(&mut self.bbox, camera)?;
        configure_initial(&mut self.classifier, camera)?;
        configure_initial(&mut self.lines, camera)?;
        configure_initial(&mut self.tips, camera)?;
        configure_initial(&mut self.scorer, camera)?;
        configure_initial(&mut self.fps, camera)?;
        configure_initial(&mut self.publisher, camera)
    }

    fn dispatch(&mut self, pending: &mut PendingConfig) {
        dispatch_config(&mut self.grabber, pending);
        if let Some(warper) = self.warper.as_mut() {
            dispatch_config(warper, pending);
        }
        dispatch_config(&mut self.detector, pending);
        dispatch_config(&mut self.segmentor, pending);
        dispatch_config(&mut self.bbox, pending);
        dispatch_config(&mut self.classifier, pending);
        dispatch_config(&mut self.lines, pending);
        dispatch_config(&mut self.tips, pending);
        dispatch_config(&mut self.scorer, pending);
        dispatch_config(&mut self.fps, pending);
        dispatch_config(&mut self.publisher, pending);
    }

    /// Make the current frame the new reference of both change detectors.
    fn rebase(&mut self, frame: &Frame) {
        self.detector.reset(frame);
        self.segmentor.reset(frame);
    }

    fn teardown(&mut self) {
        self.grabber.teardown();
        if let Some(warper) = self.warper.as_mut() {
            warper.teardown();
        }
        self.detector.teardown();
        self.segmentor.teardown();
        self.bbox.teardown();
        self.classifier.teardown();
        self.lines.teardown();
        self.tips.teardown();
        self.scorer.teardown();
        self.fps.teardown();
        self.publisher.teardown();
    }
}

impl StandardProcedure {
    pub fn from_kwargs(kwargs: Kwargs) -> Result<Self, ConfigError> {
        let args: StandardArgs = parse_kwargs(Self::NAME, kwargs)?;
        Ok(Self {
            params: Self::config_set(),
            detector: args.detector,
            segmentor: args.segmentor,
        })
    }

    fn hand_cooldown(&self) -> Duration {
        let seconds = self.params.float(HAND_COOLDOWN).unwrap_or(2.0);
        Duration::from_secs_f64(seconds.max(0.0))
    }

    fn build_stages(&self, ctx: &RunContext<'_>) -> Result<Stages, PipelineError> {
        let camera = ctx.camera;
        let id = camera.id.as_str();
        let board = &ctx.board;
        let stage = |op| Stage::new(op, id, Arc::clone(board));

        let source = ctx.registries.sources.build_value(&camera.source)?;
        let warper = if camera.calibration_points.is_empty() {
            None
        } else {
            Some(Stage::new(
                HomographyWarper::new(&camera.calibration_points)?,
                id,
                Arc::clone(board),
            ))
        };

        Ok(Stages {
            grabber: Stage::new(FrameGrabber::new(source), id, Arc::clone(board)),
            warper,
            detector: stage(ctx.registries.detector(&self.detector)?),
            segmentor: stage(ctx.registries.detector(&self.segmentor)?),
            bbox: Stage::new(BBoxDetector::default(), id, Arc::clone(board)),
            classifier: Stage::new(SizeClassifier::default(), id, Arc::clone(board)),
            lines: Stage::new(HoughLineDetector::default(), id, Arc::clone(board)),
            tips: Stage::new(DartTipCalculator::default(), id, Arc::clone(board)),
            scorer: Stage::new(ScoreCalculator::default(), id, Arc::clone(board)),
            fps: Stage::new(FpsCalculator::default(), id, Arc::clone(board)),
            publisher: Stage::new(ResultPublisher::new(), id, Arc::clone(board)),
        })
    }

    fn run_loop(&mut self, stages: &mut Stages, ctx: &RunContext<'_>) -> Result<(), PipelineError> {
        let camera = ctx.camera.id.as_str();
        // A verdict left over from a previous run must not reach the collector.
        ctx.board.delete(&operator_key(camera, ResultPublisher::NAME))?;
        stages.grabber.op_mut().start()?;
        info!("pipeline running");

        let mut rebased = false;
        let mut cooldown_until: Option<Instant> = None;
        let mut frames: u64 = 0;

        while !ctx.abort.is_aborted() {
            self.apply_pending(stages, ctx.board.as_ref(), camera)?;

            let frame = stages.grabber.call(())??;
            frames += 1;
            let _frame = info_span!("frame", index = frames).entered();
            metrics::counter!("dartvision_frames_total", "camera" => camera.to_string())
                .increment(1);

            if !rebased {
                stages.rebase(&frame);
                rebased = true;
            }
            if let Some(warper) = stages.warper.as_mut() {
                warper.call(&frame)?;
            }

            let mask = stages.detector.call(&frame)?;
            let motion = stages.bbox.call(&mask)?;
            let class = stages.classifier.call(motion.ratio)?;
            let now = Instant::now();
            let cooling_down = cooldown_until.is_some_and(|until| now < until);

            match class {
                Class::Hand => {
                    debug!(ratio = motion.ratio, "hand in front of the board");
                    stages.publisher.call((Class::Hand, None))?;
                    stages.rebase(&frame);
                    cooldown_until = Some(now + self.hand_cooldown());
                }
                // The board is still settling after a hand left it: report the
                // class without locating anything.
                _ if cooling_down => {
                    stages.publisher.call((class, None))?;
                    stages.rebase(&frame);
                }
                Class::Dart => {
                    match locate_dart(stages, &frame)? {
                        Some(throw) => {
                            info!(score = %throw.score, confidence = throw.confidence, "dart detected");
                            stages.publisher.call((Class::Dart, Some(throw)))?;
                        }
                        None => debug!("dart-sized change without a usable tip"),
                    }
                    stages.rebase(&frame);
                }
                Class::None => {}
            }

            let fps = stages.fps.call(())?;
            metrics::gauge!("dartvision_pipeline_fps", "camera" => camera.to_string()).set(fps);
            ctx.heartbeat.beat();
            if frames % HEARTBEAT_EVERY == 0 {
                debug!(frames, fps, "pipeline alive");
            }
        }

        info!(frames, "abort requested, leaving pipeline loop");
        Ok(())
    }

    /// Drain `cam_{id}_config` and route records to their stages.
    fn apply_pending(
        &mut self,
        stages: &mut Stages,
        board: &dyn Blackboard,
        camera: &str,
    ) -> Result<(), PipelineError> {
        let mut pending = take_config(board, camera)?;
        if pending.is_empty() {
            return Ok(());
        }
        if let Some(records) = pending.remove(Self::NAME) {
            if let Err(err) = self.params.configure(&records) {
                error!("rejected configuration update for {}: {err}", Self::NAME);
            }
        }
        stages.dispatch(&mut pending);
        for operator in pending.keys() {
            warn!(operator = %operator, "configuration for an operator this pipeline does not run");
        }
        Ok(())
    }
}

/// Segment the full frame, find the dart line and score its tip.
fn locate_dart(stages: &mut Stages, frame: &Frame) -> Result<Option<DartThrow>, PipelineError> {
    let segmented = stages.segmentor.call(frame)?;
    let region = stages.bbox.call(&segmented)?;
    let line = stages.lines.call(LineInput {
        mask: &segmented,
        roi: region.bbox,
    })?;
    let tip = stages.tips.call(TipInput {
        line,
        roi: region.bbox,
        width: frame.width,
        height: frame.height,
    })?;

    let (Some(tip), Some(warper)) = (tip, stages.warper.as_ref()) else {
        return Ok(None);
    };
    let warper = warper.op();
    let (Some(point), Some(neighbour)) = (
        warper.warp_point_to_model(tip),
        warper.warp_point_to_model([tip[0] + 1.0, tip[1] + 1.0]),
    ) else {
        return Ok(None);
    };

    let scored = stages.scorer.call((point, neighbour))?;
    Ok(Some(DartThrow {
        score: scored.score.label(),
        value: scored.score.value(),
        confidence: scored.confidence,
        point,
    }))
}

impl Procedure for StandardProcedure {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn get_config(&self, registries: &Registries) -> Result<ConfigSchema, ConfigError> {
        let mut schema = ConfigSchema::new();
        schema_entry::<Self>(&mut schema);
        schema_entry::<FrameGrabber>(&mut schema);
        schema_entry::<HomographyWarper>(&mut schema);
        for tag in [&self.detector, &self.segmentor] {
            let detector = registries.detector(tag)?;
            schema.insert(detector.name().to_string(), detector.get_config());
        }
        schema_entry::<BBoxDetector>(&mut schema);
        schema_entry::<SizeClassifier>(&mut schema);
        schema_entry::<HoughLineDetector>(&mut schema);
        schema_entry::<DartTipCalculator>(&mut schema);
        schema_entry::<ScoreCalculator>(&mut schema);
        schema_entry::<FpsCalculator>(&mut schema);
        schema_entry::<ResultPublisher>(&mut schema);
        Ok(schema)
    }

    fn run(&mut self, ctx: RunContext<'_>) -> Result<(), PipelineError> {
        let span = info_span!("pipeline", camera = %ctx.camera.id, procedure = Self::NAME);
        let _entered = span.enter();

        if let Some(records) = ctx.camera.op_configs.get(Self::NAME) {
            self.params.configure(records)?;
        }
        let mut stages = self.build_stages(&ctx)?;
        let result = match stages.configure_initial(ctx.camera) {
            Ok(()) => self.run_loop(&mut stages, &ctx),
            Err(err) => Err(err.into()),
        };
        stages.teardown();

        match &result {
            Ok(()) => info!("pipeline torn down"),
            Err(err) => error!("pipeline failed: {err}"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_lists_every_stage() {
        let registries = Registries::default();
        let schema = StandardProcedure::default().get_config(&registries).unwrap();
        for name in [
            "StandardProcedure",
            "FrameGrabber",
            "HomographyWarper",
            "MotionDetector",
            "CustomChangeDetector",
            "BBoxDetector",
            "SizeClassifier",
            "HoughLineDetector",
            "DartTipCalculator",
            "ScoreCalculator",
            "FpsCalculator",
            "ResultPublisher",
        ] {
            assert!(schema.contains_key(name), "missing {name}");
        }
        assert_eq!(schema["StandardProcedure"][0].name, "hand_cooldown");
    }

    #[test]
    fn unknown_detector_tags_fail_at_schema_time() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("detector".into(), "Optical".into());
        let procedure = StandardProcedure::from_kwargs(kwargs).unwrap();
        assert!(matches!(
            procedure.get_config(&Registries::default()),
            Err(ConfigError::UnknownType { .. })
        ));
    }
}
