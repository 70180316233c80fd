use std::time::Instant;

use crate::{
    config::{ConfigParameter, ConfigSet},
    operator::{Call, Operator, Schema},
};

const SMOOTHING: &str = "smoothing";

/// Frame rate of the calling loop, exponentially smoothed.
pub struct FpsCalculator {
    params: ConfigSet,
    previous: Option<Instant>,
    fps: Option<f64>,
}

impl Schema for FpsCalculator {
    const NAME: &'static str = "FpsCalculator";

    fn schema() -> Vec<ConfigParameter> {
        vec![ConfigParameter::float(SMOOTHING, 0.05, 0.001, 1.0)
            .describe("weight of the newest frame interval")]
    }
}

impl Default for FpsCalculator {
    fn default() -> Self {
        Self {
            params: Self::config_set(),
            previous: None,
            fps: None,
        }
    }
}

impl FpsCalculator {
    /// Register a frame seen at `now`. Returns 0 until two frames were seen.
    pub fn update(&mut self, now: Instant) -> f64 {
        let Some(previous) = self.previous.replace(now) else {
            return 0.0;
        };
        let elapsed = now.saturating_duration_since(previous).as_secs_f64();
        if elapsed <= 0.0 {
            return self.fps.unwrap_or(0.0);
        }
        let current = 1.0 / elapsed;
        let k = self.params.float(SMOOTHING).unwrap_or(0.05);
        let smoothed = match self.fps {
            Some(fps) => k * current + (1.0 - k) * fps,
            None => current,
        };
        self.fps = Some(smoothed);
        smoothed
    }
}

impl Operator for FpsCalculator {
    config_accessors!();
}

impl Call<()> for FpsCalculator {
    type Output = f64;

    fn call(&mut self, _: ()) -> f64 {
        self.update(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn smooths_towards_the_current_rate() {
        let mut fps = FpsCalculator::default();
        let start = Instant::now();
        assert_eq!(fps.update(start), 0.0);
        assert_relative_eq!(fps.update(start + Duration::from_millis(100)), 10.0, epsilon = 1e-9);
        // 20 fps interval moves the estimate by 5 % of the difference.
        assert_relative_eq!(
            fps.update(start + Duration::from_millis(150)),
            10.5,
            epsilon = 1e-9
        );
    }

    #[test]
    fn duplicate_timestamps_keep_the_estimate() {
        let mut fps = FpsCalculator::default();
        let start = Instant::now();
        fps.update(start);
        fps.update(start + Duration::from_millis(50));
        assert_relative_eq!(fps.update(start + Duration::from_millis(50)), 20.0, epsilon = 1e-9);
    }
}
