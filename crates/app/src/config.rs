//! Setup file parsing for the `run` subcommand.
//!
//! The setup file names the dartboard, its cameras (source, calibration and
//! initial operator configuration), the procedure every camera runs and the
//! collector timing. CLI flags only add telemetry knobs on top.

use std::{collections::BTreeSet, net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result, bail};
use dart_vision::{CameraDescriptor, CollectorSettings, DartboardDescriptor};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::cli::RunArgs;

#[derive(Clone, Debug, Deserialize)]
pub struct SetupFile {
    pub dartboard: DartboardDescriptor,
    pub cameras: Vec<CameraDescriptor>,
    /// `{"type": tag, ...kwargs}` run by every camera.
    #[serde(default = "default_procedure")]
    pub procedure: Value,
    #[serde(default)]
    pub collector: CollectorSettings,
}

fn default_procedure() -> Value {
    json!({"type": "StandardProcedure"})
}

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs for tracing and metrics export.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing pipeline spans.
    pub chrome_trace_path: Option<PathBuf>,
    /// Serve Prometheus metrics over HTTP.
    pub metrics_addr: Option<SocketAddr>,
}

#[derive(Clone, Debug)]
pub struct RunConfig {
    pub setup: SetupFile,
    pub telemetry: TelemetryOptions,
}

impl SetupFile {
    pub fn parse(text: &str) -> Result<Self> {
        let setup: SetupFile = serde_json::from_str(text).context("malformed setup file")?;
        setup.validate()?;
        Ok(setup)
    }

    fn validate(&self) -> Result<()> {
        if self.dartboard.cams.is_empty() {
            bail!("dartboard {} lists no cameras", self.dartboard.id);
        }
        let mut known = BTreeSet::new();
        for camera in &self.cameras {
            if !known.insert(camera.id.as_str()) {
                bail!("camera {} is defined twice", camera.id);
            }
        }
        for cam in &self.dartboard.cams {
            if !known.contains(cam.as_str()) {
                bail!("dartboard {} uses undefined camera {cam}", self.dartboard.id);
            }
        }
        if self.collector.poll_ms == 0 {
            bail!("collector.poll_ms must be at least 1");
        }
        Ok(())
    }

    /// Cameras attached to the dartboard, in fusion order.
    pub fn dartboard_cameras(&self) -> impl Iterator<Item = &CameraDescriptor> {
        self.dartboard
            .cams
            .iter()
            .filter_map(|id| self.cameras.iter().find(|camera| &camera.id == id))
    }
}

impl TryFrom<RunArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: RunArgs) -> Result<Self> {
        let text = std::fs::read_to_string(&args.setup)
            .with_context(|| format!("failed to read setup file {}", args.setup.display()))?;
        let mut setup = SetupFile::parse(&text)
            .with_context(|| format!("invalid setup file {}", args.setup.display()))?;
        if let Some(tag) = args.procedure {
            setup.procedure = json!({"type": tag});
        }
        Ok(Self {
            setup,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
                metrics_addr: args.metrics_addr,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = include_str!("../../../config/setup.example.json");

    #[test]
    fn example_setup_parses() {
        let setup = SetupFile::parse(EXAMPLE).unwrap();
        assert_eq!(setup.dartboard.cams.len(), setup.cameras.len());
        assert_eq!(setup.dartboard_cameras().count(), setup.cameras.len());
        assert_eq!(setup.procedure["type"], "StandardProcedure");
    }

    #[test]
    fn undefined_cameras_are_rejected() {
        let err = SetupFile::parse(
            r#"{"dartboard": {"id": 1, "cams": [1, 2]},
                "cameras": [{"id": 1, "source": {"type": "UsbCam"}}]}"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("undefined camera 2"));
    }

    #[test]
    fn defaults_fill_procedure_and_collector() {
        let setup = SetupFile::parse(
            r#"{"dartboard": {"id": "home", "cams": ["a"]},
                "cameras": [{"id": "a", "source": {"type": "ImageSequence", "dir": "frames"}}]}"#,
        )
        .unwrap();
        assert_eq!(setup.procedure, default_procedure());
        assert_eq!(setup.collector, CollectorSettings::default());
    }
}
