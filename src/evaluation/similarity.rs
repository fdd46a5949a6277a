//! Structural similarity over grayscale frames.
//!
//! Mean SSIM with an 11x11 Gaussian window (sigma 1.5) and the usual
//! stability constants from Wang et al. 2004. Frames smaller than the window
//! are scored with a single global window instead.

use std::path::Path;

use image::GrayImage;
use rayon::prelude::*;

use crate::error::EvaluationError;

const K1: f64 = 0.01;
const K2: f64 = 0.03;
const L: f64 = 255.0;
const C1: f64 = (K1 * L) * (K1 * L);
const C2: f64 = (K2 * L) * (K2 * L);

const WINDOW_SIZE: usize = 11;
const SIGMA: f64 = 1.5;

type Window = [[f64; WINDOW_SIZE]; WINDOW_SIZE];

/// Scores how similar two stored frames are.
#[cfg_attr(test, mockall::automock)]
pub trait SimilarityMetric: Send + Sync {
    /// Short metric name used in summaries.
    fn name(&self) -> &'static str;

    /// Similarity of `encoded` to `source`, 1.0 meaning identical.
    fn score(&self, source: &Path, encoded: &Path) -> Result<f64, EvaluationError>;
}

/// Gaussian-windowed SSIM on the luma of both frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ssim;

impl SimilarityMetric for Ssim {
    fn name(&self) -> &'static str {
        "SSIM"
    }

    fn score(&self, source: &Path, encoded: &Path) -> Result<f64, EvaluationError> {
        let source = load_gray(source)?;
        let encoded = load_gray(encoded)?;
        ssim(&source, &encoded)
    }
}

fn load_gray(path: &Path) -> Result<GrayImage, EvaluationError> {
    image::open(path)
        .map(|img| img.to_luma8())
        .map_err(|e| EvaluationError::ImageLoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn gaussian_window() -> Window {
    let mut window = [[0.0f64; WINDOW_SIZE]; WINDOW_SIZE];
    let center = (WINDOW_SIZE / 2) as f64;
    let mut sum = 0.0;

    for (i, row) in window.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            let x = i as f64 - center;
            let y = j as f64 - center;
            let g = (-((x * x + y * y) / (2.0 * SIGMA * SIGMA))).exp();
            *cell = g;
            sum += g;
        }
    }
    for row in &mut window {
        for cell in row.iter_mut() {
            *cell /= sum;
        }
    }
    window
}

/// Mean SSIM of two equally sized grayscale frames.
pub fn ssim(left: &GrayImage, right: &GrayImage) -> Result<f64, EvaluationError> {
    if left.dimensions() != right.dimensions() {
        return Err(EvaluationError::DimensionMismatch {
            left_width: left.width(),
            left_height: left.height(),
            right_width: right.width(),
            right_height: right.height(),
        });
    }

    let width = left.width() as usize;
    let height = left.height() as usize;

    if width == 0 || height == 0 {
        return Err(EvaluationError::DimensionMismatch {
            left_width: left.width(),
            left_height: left.height(),
            right_width: right.width(),
            right_height: right.height(),
        });
    }

    if width < WINDOW_SIZE || height < WINDOW_SIZE {
        return Ok(global_ssim(left.as_raw(), right.as_raw()));
    }

    let window = gaussian_window();
    let left = left.as_raw();
    let right = right.as_raw();
    let valid_width = width - WINDOW_SIZE + 1;
    let valid_height = height - WINDOW_SIZE + 1;

    let total: f64 = (0..valid_height)
        .into_par_iter()
        .map(|y| {
            (0..valid_width)
                .map(|x| window_ssim(left, right, width, x, y, &window))
                .sum::<f64>()
        })
        .sum();

    Ok(total / (valid_width * valid_height) as f64)
}

fn window_ssim(left: &[u8], right: &[u8], stride: usize, x: usize, y: usize, window: &Window) -> f64 {
    let mut mean_x = 0.0;
    let mut mean_y = 0.0;
    for (i, row) in window.iter().enumerate() {
        let offset = (y + i) * stride + x;
        for (j, &w) in row.iter().enumerate() {
            mean_x += w * f64::from(left[offset + j]);
            mean_y += w * f64::from(right[offset + j]);
        }
    }

    let mut var_x = 0.0;
    let mut var_y = 0.0;
    let mut cov_xy = 0.0;
    for (i, row) in window.iter().enumerate() {
        let offset = (y + i) * stride + x;
        for (j, &w) in row.iter().enumerate() {
            let dx = f64::from(left[offset + j]) - mean_x;
            let dy = f64::from(right[offset + j]) - mean_y;
            var_x += w * dx * dx;
            var_y += w * dy * dy;
            cov_xy += w * dx * dy;
        }
    }

    let numerator = (2.0 * mean_x * mean_y + C1) * (2.0 * cov_xy + C2);
    let denominator = (mean_x * mean_x + mean_y * mean_y + C1) * (var_x + var_y + C2);
    numerator / denominator
}

fn global_ssim(left: &[u8], right: &[u8]) -> f64 {
    let n = left.len() as f64;
    let mean_x = left.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let mean_y = right.iter().map(|&v| f64::from(v)).sum::<f64>() / n;

    let (mut var_x, mut var_y, mut cov_xy) = (0.0, 0.0, 0.0);
    for (&a, &b) in left.iter().zip(right) {
        let dx = f64::from(a) - mean_x;
        let dy = f64::from(b) - mean_y;
        var_x += dx * dx;
        var_y += dy * dy;
        cov_xy += dx * dy;
    }
    var_x /= n;
    var_y /= n;
    cov_xy /= n;

    ((2.0 * mean_x * mean_y + C1) * (2.0 * cov_xy + C2))
        / ((mean_x * mean_x + mean_y * mean_y + C1) * (var_x + var_y + C2))
}
