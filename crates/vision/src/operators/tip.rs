use crate::{
    blackboard::Payload,
    config::{ConfigParameter, ConfigSet},
    geometry::{BBox, Line},
    operator::{Call, Operator, Publish, Schema},
};

/// Line found inside `roi`, with the full image size both are relative to.
pub struct TipInput {
    pub line: Option<Line>,
    pub roi: BBox,
    pub width: u32,
    pub height: u32,
}

impl Publish for [f64; 2] {
    fn payload(&self) -> Option<Payload> {
        Some(Payload::Json(serde_json::json!(self)))
    }
}

/// Picks the line endpoint nearer the image bottom as the tip, in full-image pixels.
///
/// Assumes the camera looks at the board from above the flight; cameras mounted
/// below the board need a different heuristic.
pub struct DartTipCalculator {
    params: ConfigSet,
}

impl Schema for DartTipCalculator {
    const NAME: &'static str = "DartTipCalculator";

    fn schema() -> Vec<ConfigParameter> {
        Vec::new()
    }
}

impl Default for DartTipCalculator {
    fn default() -> Self {
        Self {
            params: Self::config_set(),
        }
    }
}

impl Operator for DartTipCalculator {
    config_accessors!();
}

impl Call<TipInput> for DartTipCalculator {
    type Output = Option<[f64; 2]>;

    fn call(&mut self, input: TipInput) -> Option<[f64; 2]> {
        let line = input.line?;
        let roi = input.roi.to_pixel(input.width, input.height);
        let pixel = line.to_pixel(roi.w, roi.h);
        let (x, y) = if pixel.y1 >= pixel.y2 {
            (pixel.x1, pixel.y1)
        } else {
            (pixel.x2, pixel.y2)
        };
        Some([x + roi.x as f64, y + roi.y as f64])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_endpoint_is_the_tip() {
        let mut calculator = DartTipCalculator::default();
        let roi = BBox { x: 0.25, y: 0.5, w: 0.5, h: 0.25 };
        let line = Line { x1: 0.0, y1: 1.0, x2: 1.0, y2: 0.0 };
        let tip = calculator.call(TipInput {
            line: Some(line),
            roi,
            width: 400,
            height: 200,
        });
        assert_eq!(tip, Some([100.0, 150.0]));

        let flipped = Line { x1: 1.0, y1: 0.0, x2: 0.0, y2: 1.0 };
        let tip = calculator.call(TipInput {
            line: Some(flipped),
            roi,
            width: 400,
            height: 200,
        });
        assert_eq!(tip, Some([100.0, 150.0]));
    }

    #[test]
    fn no_line_no_tip() {
        let mut calculator = DartTipCalculator::default();
        let tip = calculator.call(TipInput {
            line: None,
            roi: BBox::default(),
            width: 10,
            height: 10,
        });
        assert_eq!(tip, None);
    }
}
