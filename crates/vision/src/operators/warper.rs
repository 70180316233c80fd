use image::{Rgb, RgbImage};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use video_ingest::Frame;

use crate::{
    config::{ConfigParameter, ConfigSet},
    dartboard::{DartboardModel, OUTER_DOUBLE_RING},
    error::CalibrationError,
    homography::{estimate_homography, project},
    operator::{Call, Operator, Schema},
};

const MARGIN: &str = "margin";
const USE_REMAP: &str = "use_remap";

/// A clicked calibration mark: normalized image position of the outer crossing `label`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub x: f64,
    pub y: f64,
    pub label: String,
}

/// Maps image pixels onto the dartboard model plane.
///
/// The homography is fitted once against normalized image coordinates and
/// rescaled whenever the frame size changes.
pub struct HomographyWarper {
    params: ConfigSet,
    /// Model plane → normalized image coordinates.
    h_normalized: Matrix3<f64>,
    shape: Option<(u32, u32)>,
    /// Model plane → image pixels for the current shape.
    h: Matrix3<f64>,
    h_inv: Option<Matrix3<f64>>,
    lut: Option<Vec<Option<usize>>>,
}

impl Schema for HomographyWarper {
    const NAME: &'static str = "HomographyWarper";

    fn schema() -> Vec<ConfigParameter> {
        vec![
            ConfigParameter::int(MARGIN, 55, 0, 200)
                .describe("border around the outer double ring in the warped image, in mm"),
            ConfigParameter::boolean(USE_REMAP, false)
                .describe("cache the pixel lookup table between frames"),
        ]
    }
}

impl HomographyWarper {
    pub fn new(points: &[CalibrationPoint]) -> Result<Self, CalibrationError> {
        let model = DartboardModel;
        let mut model_points = Vec::with_capacity(points.len());
        let mut image_points = Vec::with_capacity(points.len());
        for point in points {
            model_points.push(model.get_outer_point(&point.label)?);
            image_points.push([point.x, point.y]);
        }
        let h_normalized = estimate_homography(&model_points, &image_points)?;
        Ok(Self {
            params: Self::config_set(),
            h_normalized,
            shape: None,
            h: h_normalized,
            h_inv: None,
            lut: None,
        })
    }

    /// Rescale the homography for frames of `width` × `height` pixels.
    pub fn set_image_size(&mut self, width: u32, height: u32) {
        if self.shape == Some((width, height)) {
            return;
        }
        let scale = Matrix3::new(
            width as f64, 0.0, 0.0,
            0.0, height as f64, 0.0,
            0.0, 0.0, 1.0,
        );
        self.h = scale * self.h_normalized;
        self.h_inv = self.h.try_inverse();
        self.shape = Some((width, height));
        self.lut = None;
    }

    /// Image pixel → model plane, without the visualization translation.
    /// `None` until an image size is known.
    pub fn warp_point_to_model(&self, point: [f64; 2]) -> Option<[f64; 2]> {
        project(self.h_inv.as_ref()?, point[0], point[1])
    }

    /// Side length of the warped image.
    pub fn output_size(&self) -> u32 {
        let margin = self.params.int(MARGIN).unwrap_or(55) as f64;
        ((OUTER_DOUBLE_RING + margin) * 2.0) as u32
    }

    /// Source pixel index for every output pixel; the output is flipped vertically so
    /// the 20 segment points up.
    fn build_lut(&self, width: u32, height: u32) -> Vec<Option<usize>> {
        let size = self.output_size();
        let half = size as f64 / 2.0;
        let mut lut = Vec::with_capacity((size * size) as usize);
        for v in 0..size {
            let row = (size - 1 - v) as f64;
            for u in 0..size {
                let source = project(&self.h, u as f64 - half, row - half).and_then(|[x, y]| {
                    let (x, y) = (x.round(), y.round());
                    if x < 0.0 || y < 0.0 || x >= width as f64 || y >= height as f64 {
                        None
                    } else {
                        Some(y as usize * width as usize + x as usize)
                    }
                });
                lut.push(source);
            }
        }
        lut
    }
}

impl Operator for HomographyWarper {
    config_accessors!();

    fn on_configured(&mut self) {
        self.lut = None;
    }
}

impl<'a> Call<&'a Frame> for HomographyWarper {
    type Output = RgbImage;

    fn call(&mut self, frame: &'a Frame) -> RgbImage {
        self.set_image_size(frame.width, frame.height);
        let lut = match self.lut.take() {
            Some(lut) => lut,
            None => self.build_lut(frame.width, frame.height),
        };

        let rgb = frame.to_rgb();
        let pixels = rgb.as_raw();
        let size = self.output_size();
        let out = RgbImage::from_fn(size, size, |u, v| match lut[(v * size + u) as usize] {
            Some(i) => Rgb([pixels[3 * i], pixels[3 * i + 1], pixels[3 * i + 2]]),
            None => Rgb([0, 0, 0]),
        });

        if self.params.boolean(USE_REMAP).unwrap_or(false) {
            self.lut = Some(lut);
        }
        out
    }
}
