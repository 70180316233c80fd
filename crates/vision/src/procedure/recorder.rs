use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;
use tracing::{error, info, info_span, warn};

use super::{
    ConfigSchema, Procedure, Registries, RunContext, configure_initial, dispatch_config,
    schema_entry,
};
use crate::{
    blackboard::take_config,
    error::{ConfigError, PipelineError},
    operator::Stage,
    operators::{FpsCalculator, FrameGrabber, FrameRecorder},
    registry::{Kwargs, parse_kwargs},
};

#[derive(Deserialize)]
struct RecorderArgs {
    #[serde(default = "default_dir")]
    dir: PathBuf,
}

fn default_dir() -> PathBuf {
    PathBuf::from("recordings")
}

/// Records a camera to `dir/cam_{id}` so sessions can be replayed offline.
pub struct DebugRecorder {
    dir: PathBuf,
}

impl DebugRecorder {
    pub const NAME: &'static str = "DebugRecorder";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_kwargs(kwargs: Kwargs) -> Result<Self, ConfigError> {
        let args: RecorderArgs = parse_kwargs(Self::NAME, kwargs)?;
        Ok(Self::new(args.dir))
    }
}

impl Procedure for DebugRecorder {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn get_config(&self, _registries: &Registries) -> Result<ConfigSchema, ConfigError> {
        let mut schema = ConfigSchema::new();
        schema_entry::<FrameGrabber>(&mut schema);
        schema_entry::<FrameRecorder>(&mut schema);
        schema_entry::<FpsCalculator>(&mut schema);
        Ok(schema)
    }

    fn run(&mut self, ctx: RunContext<'_>) -> Result<(), PipelineError> {
        let camera = ctx.camera;
        let id = camera.id.as_str();
        let span = info_span!("pipeline", camera = %id, procedure = Self::NAME);
        let _entered = span.enter();

        let source = ctx.registries.sources.build_value(&camera.source)?;
        let mut grabber = Stage::new(FrameGrabber::new(source), id, Arc::clone(&ctx.board));
        let mut recorder = Stage::new(
            FrameRecorder::new(self.dir.join(format!("cam_{id}"))),
            id,
            Arc::clone(&ctx.board),
        );
        let mut fps = Stage::new(FpsCalculator::default(), id, Arc::clone(&ctx.board));

        let result = (|| -> Result<(), PipelineError> {
            configure_initial(&mut grabber, camera)?;
            configure_initial(&mut recorder, camera)?;
            configure_initial(&mut fps, camera)?;
            grabber.op_mut().start()?;
            info!(dir = %recorder.op().dir().display(), "recording");

            while !ctx.abort.is_aborted() {
                let mut pending = take_config(ctx.board.as_ref(), id)?;
                dispatch_config(&mut grabber, &mut pending);
                dispatch_config(&mut recorder, &mut pending);
                dispatch_config(&mut fps, &mut pending);
                for operator in pending.keys() {
                    warn!(operator = %operator, "configuration for an operator this pipeline does not run");
                }

                let frame = grabber.call(())??;
                recorder.call(&frame)??;
                fps.call(())?;
                ctx.heartbeat.beat();
            }
            Ok(())
        })();

        grabber.teardown();
        recorder.teardown();
        fps.teardown();
        match &result {
            Ok(()) => info!(frames = recorder.op().written(), "recording stopped"),
            Err(err) => error!("recording failed: {err}"),
        }
        result
    }
}
