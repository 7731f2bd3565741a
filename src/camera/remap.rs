//! Pixel remap table and bicubic resampling.
//!
//! The table stores, for every rectified output pixel, the fractional raw
//! pixel it samples. It is built once per [`CalibrationModel`] and reused for
//! every frame, so rectifying a frame is only a resampling pass.

use crate::camera::CalibrationModel;
use crate::error::OverlayError;
use image::{Rgb, RgbImage};
use log::debug;
use nalgebra::Point2;
use rayon::prelude::*;
use std::time::Instant;

/// Keys cubic convolution parameter (the value OpenCV uses).
const CUBIC_A: f64 = -0.75;

/// Value read for taps that fall outside the source frame.
const BORDER: Rgb<u8> = Rgb([0, 0, 0]);

/// Lookup table from rectified pixel to raw pixel.
///
/// Layout: `map[y * width + x]` is the raw location sampled by output pixel
/// `(x, y)`. Rays that never reach the image plane are stored as `NaN` and
/// resample to the border value.
#[derive(Debug, Clone)]
pub struct RemapTable {
    width: u32,
    height: u32,
    map: Vec<Point2<f64>>,
}

impl RemapTable {
    /// Builds the table for `model` at its calibrated resolution.
    pub fn compute(model: &CalibrationModel) -> Self {
        let start = Instant::now();
        let (width, height) = model.resolution().dimensions();
        let mut map = vec![Point2::new(f64::NAN, f64::NAN); width as usize * height as usize];

        map.par_chunks_mut(width as usize)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, entry) in row.iter_mut().enumerate() {
                    if let Some(source) = model.source_pixel(x as f64, y as f64) {
                        *entry = source;
                    }
                }
            });

        debug!(
            "Computed {}x{} remap table in {:.2} ms",
            width,
            height,
            start.elapsed().as_secs_f64() * 1000.0
        );

        RemapTable { width, height, map }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The raw pixel sampled by output pixel `(x, y)`, or `None` if `(x, y)`
    /// is outside the table.
    pub fn source(&self, x: u32, y: u32) -> Option<Point2<f64>> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.map
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Resamples `frame` through the table with bicubic interpolation.
    ///
    /// `frame` must have the table's dimensions.
    fn apply(&self, frame: &RgbImage) -> RgbImage {
        let width = self.width as usize;
        let mut output = RgbImage::new(self.width, self.height);
        let buffer: &mut [u8] = &mut output;

        buffer
            .par_chunks_mut(width * 3)
            .zip(self.map.par_chunks(width))
            .for_each(|(row, sources)| {
                for (pixel, source) in row.chunks_exact_mut(3).zip(sources) {
                    let value = sample_bicubic(frame, source.x, source.y);
                    pixel.copy_from_slice(&value.0);
                }
            });

        output
    }
}

/// Applies a [`CalibrationModel`]'s remap table to raw frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameRectifier<'a> {
    model: &'a CalibrationModel,
}

impl<'a> FrameRectifier<'a> {
    pub fn new(model: &'a CalibrationModel) -> Self {
        FrameRectifier { model }
    }

    /// Returns the undistorted version of `frame`.
    ///
    /// # Errors
    ///
    /// [`OverlayError::DimensionMismatch`] if `frame` does not match the
    /// calibrated resolution. The remap table is not touched in that case.
    pub fn rectify(&self, frame: &RgbImage) -> Result<RgbImage, OverlayError> {
        let expected = self.model.resolution().dimensions();
        if frame.dimensions() != expected {
            return Err(OverlayError::DimensionMismatch {
                expected,
                actual: frame.dimensions(),
            });
        }

        Ok(self.model.remap_table().apply(frame))
    }
}

/// Cubic convolution weights for the taps at offsets -1, 0, 1, 2 from
/// `floor(x)`, where `t = x - floor(x)`.
fn cubic_weights(t: f64) -> [f64; 4] {
    let w0 = ((CUBIC_A * (t + 1.0) - 5.0 * CUBIC_A) * (t + 1.0) + 8.0 * CUBIC_A) * (t + 1.0)
        - 4.0 * CUBIC_A;
    let w1 = ((CUBIC_A + 2.0) * t - (CUBIC_A + 3.0)) * t * t + 1.0;
    let s = 1.0 - t;
    let w2 = ((CUBIC_A + 2.0) * s - (CUBIC_A + 3.0)) * s * s + 1.0;
    [w0, w1, w2, 1.0 - w0 - w1 - w2]
}

/// Bicubic sample of `frame` at fractional location `(x, y)`.
///
/// Pixel centres sit on integer coordinates. Taps outside the frame read
/// [`BORDER`], so locations two or more pixels outside come back black.
fn sample_bicubic(frame: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let (width, height) = frame.dimensions();
    // also rejects NaN
    if !(x > -2.0 && x < width as f64 + 1.0 && y > -2.0 && y < height as f64 + 1.0) {
        return BORDER;
    }

    let x0 = x.floor();
    let y0 = y.floor();
    let wx = cubic_weights(x - x0);
    let wy = cubic_weights(y - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let mut sum = [0.0f64; 3];
    for (j, wy) in wy.iter().enumerate() {
        let sy = y0 - 1 + j as i64;
        if sy < 0 || sy >= height as i64 {
            // border taps contribute zero
            continue;
        }
        for (i, wx) in wx.iter().enumerate() {
            let sx = x0 - 1 + i as i64;
            if sx < 0 || sx >= width as i64 {
                continue;
            }
            let pixel = frame.get_pixel(sx as u32, sy as u32);
            let weight = wx * wy;
            for c in 0..3 {
                sum[c] += weight * pixel[c] as f64;
            }
        }
    }

    Rgb(sum.map(|v| v.round().clamp(0.0, 255.0) as u8))
}
