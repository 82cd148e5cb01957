use crate::ops::Limits;
use anyhow::Context;
use ndarray::prelude::*;
use ndarray_npy::WriteNpyExt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;



/// Axis values at the edges of a region: `(x_min, x_max, y_min, y_max)`, where
/// the max values belong to the last index inside the half-open limits.
pub fn region_bounds(lims: &Limits, xs: ArrayView1<f64>, ys: ArrayView1<f64>) -> [f64; 4] {
    if lims.is_empty() {
        return [f64::NAN; 4];
    }

    [xs[lims.col_min], xs[lims.col_max-1], ys[lims.row_min], ys[lims.row_max-1]]
}

pub fn crop(values: ArrayView2<f64>, lims: &Limits) -> Array2<f64> {
    values.slice(s![lims.row_min..lims.row_max, lims.col_min..lims.col_max]).to_owned()
}

// Fixed width with a blank where a minus sign would go, so columns line up
fn fmt_cell(v: f64) -> String {
    if v.is_sign_negative() { format!("{v:.5}") } else { format!(" {v:.5}") }
}

/// Two header lines with the x and y bounds, then the values, one row per line.
pub fn write_text_dump<W: Write>(mut out: W, values: ArrayView2<f64>, bounds: [f64; 4]) -> std::io::Result<()> {
    let [x_min, x_max, y_min, y_max] = bounds;

    writeln!(out, "{}\t{}", fmt_cell(x_min), fmt_cell(x_max))?;
    writeln!(out, "{}\t{}", fmt_cell(y_min), fmt_cell(y_max))?;

    for row in values.rows() {
        let cells: Vec<String> = row.iter().map(|&v| fmt_cell(v)).collect();
        writeln!(out, "{}", cells.join("\t"))?;
    }

    out.flush()
}

pub fn save_text(path: &Path, values: ArrayView2<f64>, bounds: [f64; 4]) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;

    write_text_dump(BufWriter::new(file), values, bounds)
        .with_context(|| format!("writing {}", path.display()))
}

pub fn save_npy(path: &Path, values: ArrayView2<f64>) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;

    values.write_npy(BufWriter::new(file))
        .with_context(|| format!("writing {}", path.display()))
}

/// 8-bit grayscale picture of `values`, stretched over their own range.
pub fn to_gray_image(values: ArrayView2<f64>) -> image::GrayImage {
    let (h, w) = values.dim();
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max-min;

    image::GrayImage::from_fn(w as u32, h as u32, |x, y| {
        let v = values[[y as usize, x as usize]];
        let level = if range > 0. { 255.*(v-min)/range } else { 0. };

        image::Luma([level.round() as u8])
    })
}

pub fn save_png(path: &Path, values: ArrayView2<f64>) -> anyhow::Result<()> {
    to_gray_image(values)
        .save(path)
        .with_context(|| format!("writing {}", path.display()))
}



/// One line of the result file: shape index, then the task columns.
pub fn result_line(index: usize, columns: &[f64]) -> String {
    let mut line = index.to_string();

    for c in columns {
        line.push('\t');
        line.push_str(&format!("{c:.8e}"));
    }

    line
}
