use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::{ReportError, draw_error, ensure_parent_dir};

const TILE_SCALE: u32 = 4;
const CAPTION_FONT: u32 = 14;
const CAPTION_AREA: u32 = 24;
const MIN_CAPTION_WIDTH: u32 = 120;
const PAD: u32 = 8;
const FRAME: i32 = 2;
const CORRECT: RGBColor = RGBColor(0, 128, 0);
const WRONG: RGBColor = RGBColor(200, 0, 0);

/// One test image and its labels.
#[derive(Debug, Clone, Copy)]
pub struct GridSample<'a> {
    pub pixels: &'a [f32],
    pub truth: i64,
    pub predicted: i64,
}

impl GridSample<'_> {
    pub fn caption(&self) -> String {
        format!("True: {} Pred: {}", self.truth, self.predicted)
    }

    /// Green when the prediction is right, red otherwise.
    pub fn caption_color(&self) -> RGBColor {
        if self.truth == self.predicted {
            CORRECT
        } else {
            WRONG
        }
    }
}

/// Pick up to `count` distinct indices below `total`, reproducibly for `seed`.
pub fn select_samples(total: usize, count: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    rand::seq::index::sample(&mut rng, total, count.min(total)).into_vec()
}

/// Pixel size of a `grid_size` square of `height` x `width` tiles.
pub fn canvas_size(height: usize, width: usize, grid_size: usize) -> (u32, u32) {
    let cell_w = (width as u32 * TILE_SCALE).max(MIN_CAPTION_WIDTH) + 2 * PAD;
    let cell_h = CAPTION_AREA + height as u32 * TILE_SCALE + 2 * PAD;
    (grid_size as u32 * cell_w, grid_size as u32 * cell_h)
}

/// Lay out `samples` row by row in a `grid_size` square, captioned with
/// true and predicted labels, and save the PNG at `path`. Samples beyond
/// the grid are ignored.
pub fn render_sample_grid(
    samples: &[GridSample<'_>],
    height: usize,
    width: usize,
    grid_size: usize,
    path: &Path,
) -> Result<(), ReportError> {
    let shown = &samples[..samples.len().min(grid_size * grid_size)];
    let expected = height * width;
    if let Some((index, short)) = shown
        .iter()
        .enumerate()
        .find(|(_, s)| s.pixels.len() < expected)
    {
        return Err(ReportError::TileSize {
            index,
            expected,
            actual: short.pixels.len(),
        });
    }

    ensure_parent_dir(path)?;
    let root = BitMapBackend::new(path, canvas_size(height, width, grid_size)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| draw_error(path, e))?;
    let areas = root.split_evenly((grid_size, grid_size));
    for (sample, area) in shown.iter().zip(&areas) {
        draw_tile(area, sample, height, width).map_err(|e| draw_error(path, e))?;
    }
    root.present().map_err(|e| draw_error(path, e))
}

fn draw_tile<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    sample: &GridSample<'_>,
    height: usize,
    width: usize,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let color = sample.caption_color();
    let body = area.titled(
        &sample.caption(),
        ("sans-serif", CAPTION_FONT).into_font().color(&color),
    )?;
    let scale = TILE_SCALE as i32;
    let (tile_w, tile_h) = (width as i32 * scale, height as i32 * scale);
    let (w, h) = body.dim_in_pixel();
    let x0 = (w as i32 - tile_w) / 2;
    let y0 = (h as i32 - tile_h) / 2;

    body.draw(&Rectangle::new(
        [(x0 - FRAME, y0 - FRAME), (x0 + tile_w + FRAME - 1, y0 + tile_h + FRAME - 1)],
        color.filled(),
    ))?;
    let tile = min_max_normalize(&sample.pixels[..height * width]);
    for (idx, value) in tile.iter().enumerate() {
        let x = x0 + (idx % width) as i32 * scale;
        let y = y0 + (idx / width) as i32 * scale;
        let level = (value * 255.0).round() as u8;
        body.draw(&Rectangle::new(
            [(x, y), (x + scale - 1, y + scale - 1)],
            RGBColor(level, level, level).filled(),
        ))?;
    }
    Ok(())
}

/// Stretch values to `[0, 1]`; flat tiles become black.
fn min_max_normalize(values: &[f32]) -> Vec<f32> {
    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        return vec![0.0; values.len()];
    }
    values
        .iter()
        .map(|v| if v.is_finite() { (v - min) / range } else { 0.0 })
        .collect()
}
