use image::GrayImage;
use serde::Serialize;

use crate::{
    blackboard::Payload,
    config::{ConfigParameter, ConfigSet},
    geometry::BBox,
    imgproc::bounding_rect,
    operator::{Call, Operator, Publish, Schema},
};

/// Normalized bounding box of a mask and the share of the image it covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct BBoxOutput {
    pub bbox: BBox,
    pub ratio: f64,
}

impl Publish for BBoxOutput {
    fn payload(&self) -> Option<Payload> {
        if self.bbox.is_empty() {
            return None;
        }
        serde_json::to_value(self).ok().map(Payload::Json)
    }
}

pub struct BBoxDetector {
    params: ConfigSet,
}

impl Schema for BBoxDetector {
    const NAME: &'static str = "BBoxDetector";

    fn schema() -> Vec<ConfigParameter> {
        Vec::new()
    }
}

impl Default for BBoxDetector {
    fn default() -> Self {
        Self {
            params: Self::config_set(),
        }
    }
}

impl Operator for BBoxDetector {
    config_accessors!();
}

impl<'a> Call<&'a GrayImage> for BBoxDetector {
    type Output = BBoxOutput;

    fn call(&mut self, mask: &'a GrayImage) -> BBoxOutput {
        let (w, h) = mask.dimensions();
        let bbox = BBox::from_pixel(bounding_rect(mask), w, h);
        BBoxOutput {
            bbox,
            ratio: bbox.area(),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::operators::testing::mask;

    #[test]
    fn ratio_is_box_area_over_image_area() {
        let mut detector = BBoxDetector::default();
        let out = detector.call(&mask(100, 50, |x, y| (20..40).contains(&x) && (10..35).contains(&y)));
        assert_relative_eq!(out.bbox.x, 0.2);
        assert_relative_eq!(out.bbox.h, 0.5);
        assert_relative_eq!(out.ratio, 0.1);
    }

    #[test]
    fn empty_mask_gives_zero_ratio() {
        let mut detector = BBoxDetector::default();
        let out = detector.call(&GrayImage::new(10, 10));
        assert_eq!(out, BBoxOutput::default());
        assert!(out.payload().is_none());
    }
}
