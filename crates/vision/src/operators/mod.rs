//! Concrete pipeline operators.

/// Boilerplate accessors shared by every operator holding a `params: ConfigSet`.
macro_rules! config_accessors {
    () => {
        fn name(&self) -> &'static str {
            <Self as $crate::operator::Schema>::NAME
        }

        fn params(&self) -> &$crate::config::ConfigSet {
            &self.params
        }

        fn params_mut(&mut self) -> &mut $crate::config::ConfigSet {
            &mut self.params
        }
    };
}

mod bbox;
mod change;
mod fps;
mod grabber;
mod lines;
mod motion;
mod publisher;
mod recorder;
mod score;
mod size;
mod tip;
mod warper;

pub use bbox::{BBoxDetector, BBoxOutput};
pub use change::{ChangeDetector, CustomChangeDetector};
pub use fps::FpsCalculator;
pub use grabber::FrameGrabber;
pub use lines::{HoughLineDetector, LineInput};
pub use motion::MotionDetector;
pub use publisher::ResultPublisher;
pub use recorder::FrameRecorder;
pub use score::{ScoreCalculator, ScoreOutput};
pub use size::SizeClassifier;
pub use tip::{DartTipCalculator, TipInput};
pub use warper::{CalibrationPoint, HomographyWarper};
