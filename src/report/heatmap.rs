use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use super::{ReportError, draw_error, ensure_parent_dir};
use crate::ml::metrics::ConfusionMatrix;

const CELL: u32 = 48;
const MARGIN: u32 = 12;
const CAPTION_AREA: u32 = 48;
const LABEL_AREA: u32 = 64;
const BAR_AREA: u32 = 96;
const BAR_STEPS: usize = 100;
const TEXT_DARK: RGBColor = RGBColor(33, 33, 33);

/// Light-to-dark blue ramp, sampled at 0, 0.5 and 1.
const BLUES: [(f64, RGBColor); 3] = [
    (0.0, RGBColor(247, 251, 255)),
    (0.5, RGBColor(107, 174, 214)),
    (1.0, RGBColor(8, 48, 107)),
];

/// Map `t` in `[0, 1]` onto the blue ramp.
pub fn blues(t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    for pair in BLUES.windows(2) {
        let (start, lo) = pair[0];
        let (end, hi) = pair[1];
        if t <= end {
            let f = (t - start) / (end - start);
            let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * f).round() as u8;
            return RGBColor(mix(lo.0, hi.0), mix(lo.1, hi.1), mix(lo.2, hi.2));
        }
    }
    BLUES[BLUES.len() - 1].1
}

fn intensity(count: u32, max: u32) -> f64 {
    if max == 0 {
        0.0
    } else {
        count as f64 / max as f64
    }
}

/// Fill of a cell holding `count` when the busiest cell holds `max`.
pub fn cell_color(count: u32, max: u32) -> RGBColor {
    blues(intensity(count, max))
}

/// Pixel size of the heatmap for `n_classes` rows and columns.
pub fn canvas_size(n_classes: usize) -> (u32, u32) {
    let side = n_classes.max(1) as u32 * CELL;
    (
        2 * MARGIN + LABEL_AREA + side + BAR_AREA,
        2 * MARGIN + CAPTION_AREA + side + LABEL_AREA,
    )
}

/// Render the annotated heatmap for `cm` and save it as PNG at `path`.
/// Rows are true classes, columns predictions.
pub fn render_confusion_matrix(cm: &ConfusionMatrix, path: &Path) -> Result<(), ReportError> {
    ensure_parent_dir(path)?;
    let size = canvas_size(cm.n_classes());
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(|e| draw_error(path, e))?;

    let (matrix_area, bar_area) = root.split_horizontally(size.0 - BAR_AREA);
    draw_matrix(&matrix_area, cm).map_err(|e| draw_error(path, e))?;
    draw_colorbar(&bar_area, cm.max_count()).map_err(|e| draw_error(path, e))?;
    root.present().map_err(|e| draw_error(path, e))
}

fn cells(k: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..k).flat_map(move |truth| (0..k).map(move |predicted| (truth, predicted)))
}

fn draw_matrix<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    cm: &ConfusionMatrix,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let k = cm.n_classes();
    let edge = k.max(1) as f64 - 0.5;
    // y runs top-down so row 0 sits at the top.
    let mut chart = ChartBuilder::on(area)
        .margin(MARGIN)
        .caption("Confusion Matrix", ("sans-serif", 24))
        .x_label_area_size(LABEL_AREA)
        .y_label_area_size(LABEL_AREA)
        .build_cartesian_2d(-0.5..edge, edge..-0.5)?;

    let labels: Vec<String> = cm.class_labels.iter().map(ToString::to_string).collect();
    let label_of = |v: &f64| {
        let idx = v.round();
        if (v - idx).abs() > 1e-6 || idx < 0.0 {
            return String::new();
        }
        labels.get(idx as usize).cloned().unwrap_or_default()
    };
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(k)
        .y_labels(k)
        .x_label_formatter(&label_of)
        .y_label_formatter(&label_of)
        .x_desc("Predicted")
        .y_desc("True")
        .label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()?;

    let max = cm.max_count();
    chart.draw_series(cells(k).map(|(truth, predicted)| {
        let (x, y) = (predicted as f64, truth as f64);
        Rectangle::new(
            [(x - 0.5, y - 0.5), (x + 0.5, y + 0.5)],
            cell_color(cm.get(truth, predicted), max).filled(),
        )
    }))?;
    chart.draw_series(cells(k).map(|(truth, predicted)| {
        let count = cm.get(truth, predicted);
        let color = if intensity(count, max) > 0.5 {
            WHITE
        } else {
            TEXT_DARK
        };
        let style = ("sans-serif", 16)
            .into_font()
            .color(&color)
            .pos(Pos::new(HPos::Center, VPos::Center));
        Text::new(count.to_string(), (predicted as f64, truth as f64), style)
    }))?;
    Ok(())
}

fn draw_colorbar<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    max: u32,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let top = max.max(1) as f64;
    let mut chart = ChartBuilder::on(area)
        .margin(MARGIN)
        .margin_top(MARGIN + CAPTION_AREA)
        .margin_bottom(MARGIN + LABEL_AREA)
        .right_y_label_area_size(48)
        .build_cartesian_2d(0.0..1.0, 0.0..top)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .y_labels(5)
        .label_style(("sans-serif", 14))
        .draw()?;

    let step = top / BAR_STEPS as f64;
    // Sample each band at its midpoint; the exact endpoints stay unique to cells.
    chart.draw_series((0..BAR_STEPS).map(|band| {
        let lo = band as f64 * step;
        let t = (band as f64 + 0.5) / BAR_STEPS as f64;
        Rectangle::new([(0.0, lo), (1.0, lo + step)], blues(t).filled())
    }))?;
    Ok(())
}
