//! Chart data and vector drawing.
//!
//! Charts are computed from table columns as plain data ([`Chart`]) and only
//! touch printpdf when the document is laid out, so the binning and ranking
//! rules can be tested without rendering a PDF.

use crate::error::ListParseError;
use crate::report::document::{fill_rect, rgb, stroke_line, text_width_mm, Fonts, PT_TO_MM};
use crate::table::{parse_list_literal, Cell, Column};
use printpdf::*;
use rand::Rng;
use std::collections::HashMap;

/// Span above which a numeric histogram shows only occupied bins.
pub const MAX_HISTOGRAM_BINS: i64 = 120;
/// Longest list entry kept in a ranked bar chart, in characters.
pub const MAX_LABEL_CHARS: usize = 25;
/// Bars kept in a ranked bar chart.
pub const MAX_RANKED_BARS: usize = 80;

/// Nominal histogram size, in inches.
pub const HISTOGRAM_SIZE_IN: (f32, f32) = (7.5, 3.5);
/// Nominal ranked bar chart size, in inches.
pub const RANKED_BAR_SIZE_IN: (f32, f32) = (7.5, 10.0);

const HISTOGRAM_FILL: (f32, f32, f32) = (0.3, 0.3, 1.0);
const GRID: (f32, f32, f32) = (0.88, 0.88, 0.88);
const AXIS: (f32, f32, f32) = (0.25, 0.25, 0.25);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bin {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bar {
    pub label: String,
    pub count: usize,
    pub color: (u8, u8, u8),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartKind {
    /// Vertical bars, one per bin, in bin order.
    Histogram { bins: Vec<Bin> },
    /// Horizontal bars, most frequent at the top.
    RankedBar { bars: Vec<Bar> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub kind: ChartKind,
    pub width_in: f32,
    pub height_in: f32,
}

impl Chart {
    pub fn histogram(column: &Column) -> Self {
        Self {
            title: format!("{} Distribution", column.name),
            x_label: column.name.clone(),
            y_label: "Number of Responses".to_string(),
            kind: ChartKind::Histogram {
                bins: histogram_bins(column),
            },
            width_in: HISTOGRAM_SIZE_IN.0,
            height_in: HISTOGRAM_SIZE_IN.1,
        }
    }

    /// Ranked bar chart of list entries, one random color per bar.
    pub fn ranked_bar<R: Rng + ?Sized>(column: &Column, rng: &mut R) -> Result<Self, ListParseError> {
        let bars = rank_list_entries(column)?
            .into_iter()
            .map(|(label, count)| Bar {
                label,
                count,
                color: (
                    rng.gen_range(50..=200),
                    rng.gen_range(50..=200),
                    rng.gen_range(50..=200),
                ),
            })
            .collect();
        Ok(Self {
            title: format!("{} Distribution", column.name),
            x_label: "Number of Responses".to_string(),
            y_label: column.name.clone(),
            kind: ChartKind::RankedBar { bars },
            width_in: RANKED_BAR_SIZE_IN.0,
            height_in: RANKED_BAR_SIZE_IN.1,
        })
    }
}

// ── Data ─────────────────────────────────────────────────────────────────

/// Frequency bins with a width of one unit.
///
/// Integer columns get one bin per integer between min and max, empty ones
/// included, unless that would exceed [`MAX_HISTOGRAM_BINS`]; then only
/// occupied bins are kept, in ascending order. Other columns get one bin per
/// distinct value, in order of first appearance.
pub fn histogram_bins(column: &Column) -> Vec<Bin> {
    if column.is_numeric() {
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for n in column.cells.iter().filter_map(Cell::as_integer) {
            *counts.entry(n).or_default() += 1;
        }
        let (Some(&min), Some(&max)) = (counts.keys().min(), counts.keys().max()) else {
            return Vec::new();
        };

        if max.saturating_sub(min) < MAX_HISTOGRAM_BINS {
            return (min..=max)
                .map(|n| Bin {
                    label: n.to_string(),
                    count: counts.get(&n).copied().unwrap_or(0),
                })
                .collect();
        }

        let mut occupied: Vec<(i64, usize)> = counts.into_iter().collect();
        occupied.sort_unstable_by_key(|(n, _)| *n);
        return occupied
            .into_iter()
            .map(|(n, count)| Bin {
                label: n.to_string(),
                count,
            })
            .collect();
    }

    tally(column.cells.iter().map(Cell::to_field))
        .into_iter()
        .map(|(label, count)| Bin { label, count })
        .collect()
}

/// Count list entries across every row of a list column.
///
/// Entries longer than [`MAX_LABEL_CHARS`] are cut to that length before
/// counting. The result is sorted by count, most frequent first, with ties
/// kept in order of first appearance, and holds at most [`MAX_RANKED_BARS`]
/// entries.
pub fn rank_list_entries(column: &Column) -> Result<Vec<(String, usize)>, ListParseError> {
    let mut entries = Vec::new();
    for (row, cell) in column.cells.iter().enumerate() {
        match cell {
            Cell::List(items) => entries.extend(items.iter().cloned()),
            Cell::Text(text) => {
                let items = parse_list_literal(text).ok_or_else(|| ListParseError::NotAList {
                    row,
                    text: truncate_chars(text, 40),
                })?;
                entries.extend(items);
            }
            Cell::Integer(value) => {
                return Err(ListParseError::Numeric { row, value: *value });
            }
        }
    }

    let mut ranked = tally(entries.iter().map(|e| truncate_chars(e, MAX_LABEL_CHARS)));
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(MAX_RANKED_BARS);
    Ok(ranked)
}

/// Count values, keeping first-appearance order.
fn tally(values: impl Iterator<Item = String>) -> Vec<(String, usize)> {
    let mut order: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for v in values {
        match index.get(&v) {
            Some(&i) => order[i].1 += 1,
            None => {
                index.insert(v.clone(), order.len());
                order.push((v, 1));
            }
        }
    }
    order
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Tick spacing for a count axis: 1, 2 or 5 times a power of ten.
pub(crate) fn count_step(max: usize, target_ticks: usize) -> usize {
    let raw = (max as f32 / target_ticks.max(1) as f32).ceil().max(1.0) as usize;
    let magnitude = 10usize.pow((raw as f32).log10().floor() as u32);
    [1, 2, 5, 10]
        .into_iter()
        .map(|m| m * magnitude)
        .find(|&s| s >= raw)
        .unwrap_or(10 * magnitude)
}

// ── Drawing ──────────────────────────────────────────────────────────────

/// Draw area, in millimetres from the bottom-left page corner.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Chart {
    pub(crate) fn draw(&self, layer: &PdfLayerReference, fonts: &Fonts, frame: Frame) {
        let title_w = text_width_mm(&self.title, 10.0);
        layer.set_fill_color(rgb(0.0, 0.0, 0.0));
        layer.use_text(
            &self.title,
            10.0,
            Mm(frame.x + (frame.w - title_w) / 2.0),
            Mm(frame.y + frame.h - 5.0),
            &fonts.bold,
        );

        match &self.kind {
            ChartKind::Histogram { bins } => self.draw_histogram(layer, fonts, frame, bins),
            ChartKind::RankedBar { bars } => self.draw_ranked(layer, fonts, frame, bars),
        }
    }

    fn draw_histogram(&self, layer: &PdfLayerReference, fonts: &Fonts, f: Frame, bins: &[Bin]) {
        const TICK_PT: f32 = 6.0;
        let rotate = bins.iter().any(|b| b.label.chars().count() > 4);
        let longest = bins
            .iter()
            .map(|b| text_width_mm(&b.label, TICK_PT))
            .fold(0.0f32, f32::max);
        let label_h = if rotate {
            (longest * std::f32::consts::FRAC_1_SQRT_2 + 2.0).min(f.h * 0.35)
        } else {
            4.0
        };

        let px = f.x + 14.0;
        let py = f.y + 7.0 + label_h;
        let pw = f.w - 14.0 - 3.0;
        let ph = (f.y + f.h - 9.0 - py).max(5.0);

        axis_labels(layer, fonts, f, &self.x_label, &self.y_label, py, ph);

        let max = bins.iter().map(|b| b.count).max().unwrap_or(0);
        if bins.is_empty() || max == 0 {
            draw_axes(layer, px, py, pw, ph);
            layer.use_text("No responses", 9.0, Mm(px + pw / 2.0 - 10.0), Mm(py + ph / 2.0), &fonts.regular);
            return;
        }

        let step = count_step(max, 5);
        let top = max.div_ceil(step) * step;
        for k in 0..=top / step {
            let v = k * step;
            let y = py + ph * v as f32 / top as f32;
            stroke_line(layer, px, y, px + pw, y, GRID, 0.4);
            let label = v.to_string();
            layer.set_fill_color(rgb(0.0, 0.0, 0.0));
            layer.use_text(&label, TICK_PT, Mm(px - 1.5 - text_width_mm(&label, TICK_PT)), Mm(y - 0.8), &fonts.regular);
        }

        let slot = pw / bins.len() as f32;
        let stride = bins.len().div_ceil(40).max(1);
        for (i, bin) in bins.iter().enumerate() {
            let bx = px + slot * i as f32;
            let bh = ph * bin.count as f32 / top as f32;
            if bh > 0.0 {
                fill_rect(layer, bx + slot * 0.1, py, slot * 0.8, bh, HISTOGRAM_FILL);
            }
            if i % stride != 0 {
                continue;
            }
            let cx = bx + slot / 2.0;
            layer.set_fill_color(rgb(0.0, 0.0, 0.0));
            if rotate {
                rotated_text(layer, &fonts.regular, &bin.label, TICK_PT, cx, py - 2.0, -45.0);
            } else {
                let w = text_width_mm(&bin.label, TICK_PT);
                layer.use_text(&bin.label, TICK_PT, Mm(cx - w / 2.0), Mm(py - 3.0), &fonts.regular);
            }
        }

        draw_axes(layer, px, py, pw, ph);
    }

    fn draw_ranked(&self, layer: &PdfLayerReference, fonts: &Fonts, f: Frame, bars: &[Bar]) {
        let py = f.y + 12.0;
        let ph = (f.h - 10.0 - 12.0).max(5.0);
        let row = ph / bars.len().max(1) as f32;
        let label_pt = (row / PT_TO_MM * 0.75).clamp(4.0, 8.0);
        let label_w = bars
            .iter()
            .map(|b| text_width_mm(&b.label, label_pt))
            .fold(0.0f32, f32::max)
            .min(f.w * 0.35);
        let px = f.x + 7.0 + label_w + 2.0;
        let pw = (f.x + f.w - 4.0 - px).max(5.0);

        axis_labels(layer, fonts, f, &self.x_label, &self.y_label, py, ph);

        let max = bars.iter().map(|b| b.count).max().unwrap_or(0);
        if bars.is_empty() || max == 0 {
            draw_axes(layer, px, py, pw, ph);
            layer.use_text("No responses", 9.0, Mm(px + pw / 2.0 - 10.0), Mm(py + ph / 2.0), &fonts.regular);
            return;
        }

        let step = count_step(max, 8);
        let right = max.div_ceil(step) * step;
        for k in 0..=right / step {
            let v = k * step;
            let x = px + pw * v as f32 / right as f32;
            stroke_line(layer, x, py, x, py + ph, GRID, 0.4);
            let label = v.to_string();
            let w = text_width_mm(&label, 6.0);
            layer.set_fill_color(rgb(0.0, 0.0, 0.0));
            layer.use_text(&label, 6.0, Mm(x - w / 2.0), Mm(py - 3.5), &fonts.regular);
        }

        for (i, bar) in bars.iter().enumerate() {
            let cy = py + ph - row * (i as f32 + 0.5);
            let bh = row * 0.45;
            let bw = pw * bar.count as f32 / right as f32;
            let (r, g, b) = bar.color;
            fill_rect(
                layer,
                px,
                cy - bh / 2.0,
                bw,
                bh,
                (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0),
            );
            let w = text_width_mm(&bar.label, label_pt);
            layer.set_fill_color(rgb(0.0, 0.0, 0.0));
            layer.use_text(
                &bar.label,
                label_pt,
                Mm(px - 1.5 - w),
                Mm(cy - label_pt * PT_TO_MM * 0.35),
                &fonts.regular,
            );
        }

        draw_axes(layer, px, py, pw, ph);
    }
}

fn draw_axes(layer: &PdfLayerReference, px: f32, py: f32, pw: f32, ph: f32) {
    stroke_line(layer, px, py, px + pw, py, AXIS, 0.6);
    stroke_line(layer, px, py, px, py + ph, AXIS, 0.6);
}

fn axis_labels(
    layer: &PdfLayerReference,
    fonts: &Fonts,
    f: Frame,
    x_label: &str,
    y_label: &str,
    py: f32,
    ph: f32,
) {
    layer.set_fill_color(rgb(0.0, 0.0, 0.0));
    let xw = text_width_mm(x_label, 8.0);
    layer.use_text(x_label, 8.0, Mm(f.x + (f.w - xw) / 2.0), Mm(f.y + 1.5), &fonts.regular);
    let yw = text_width_mm(y_label, 8.0);
    rotated_text(layer, &fonts.regular, y_label, 8.0, f.x + 4.0, py + (ph - yw) / 2.0, 90.0);
}

fn rotated_text(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    text: &str,
    size_pt: f32,
    x: f32,
    y: f32,
    degrees: f32,
) {
    layer.begin_text_section();
    layer.set_font(font, size_pt);
    layer.set_text_matrix(TextMatrix::TranslateRotate(Mm(x).into(), Mm(y).into(), degrees));
    layer.write_text(text, font);
    layer.end_text_section();
}
