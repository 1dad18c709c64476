//! A small flowing-layout PDF document on top of printpdf.
//!
//! Elements are appended in order and laid out once, top to bottom, on A4
//! pages with 30 pt margins. An element that does not fit in the space left
//! on the current page moves to a new page. Charts larger than the text
//! frame are scaled down, keeping their aspect ratio.

use crate::report::charts::{truncate_chars, Chart, Frame};
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::*;
use std::io::BufWriter;

pub(crate) const PT_TO_MM: f32 = 25.4 / 72.0;
const INCH_MM: f32 = 25.4;

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 30.0 * PT_TO_MM;
const FRAME_W: f32 = PAGE_W - 2.0 * MARGIN;
const FRAME_TOP: f32 = PAGE_H - MARGIN;
const FRAME_BOTTOM: f32 = MARGIN;

// Font sizes and spacing, in points.
const TITLE_PT: f32 = 24.0;
const HEADING_PT: f32 = 20.0;
const TEXT_PT: f32 = 11.0;
const TEXT_LEADING_PT: f32 = 14.0;
const CAPTION_PT: f32 = 9.0;
const COVER_TITLE_PT: f32 = 36.0;
const COVER_SUBTITLE_PT: f32 = 18.0;
const TABLE_PT: f32 = 8.0;

/// One block of report content.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// Document title, largest text after the cover.
    Title(String),
    Heading(String),
    Paragraph(String),
    /// Small centered text under a chart.
    Caption(String),
    Chart(Chart),
    Table(TableBlock),
    /// Vertical space, in inches.
    Spacer(f32),
    PageBreak,
}

/// A simple grid table with a bold header row.
#[derive(Debug, Clone, PartialEq)]
pub struct TableBlock {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Cover page content.
#[derive(Debug, Clone, PartialEq)]
pub struct Cover {
    pub title: String,
    pub subtitle: Option<String>,
}

/// Report content in append order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportDocument {
    title: String,
    cover: Option<Cover>,
    elements: Vec<Element>,
}

pub(crate) struct Fonts {
    pub regular: IndirectFontRef,
    pub bold: IndirectFontRef,
}

impl ReportDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            cover: None,
            elements: Vec::new(),
        }
    }

    pub fn set_cover(&mut self, cover: Cover) {
        self.cover = Some(cover);
    }

    pub fn cover(&self) -> Option<&Cover> {
        self.cover.as_ref()
    }

    pub fn push(&mut self, element: Element) {
        self.elements.push(element);
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Lay out the cover (if any) and every element, and return PDF bytes.
    pub fn render(&self) -> Result<Vec<u8>, String> {
        let (doc, page, layer) = PdfDocument::new(&self.title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        let fonts = load_fonts(&doc)?;
        {
            let mut cursor = Cursor {
                doc: &doc,
                layer: doc.get_page(page).get_layer(layer),
                y: FRAME_TOP,
            };

            if let Some(cover) = &self.cover {
                draw_cover(&cursor.layer, &fonts, cover);
                cursor.new_page();
            }

            for element in &self.elements {
                layout(&mut cursor, &fonts, element);
            }
        }
        save(doc)
    }

    /// Render only the cover page.
    pub fn render_cover(&self) -> Result<Vec<u8>, String> {
        let cover = self
            .cover
            .as_ref()
            .ok_or_else(|| "document has no cover".to_string())?;
        let (doc, page, layer) = PdfDocument::new(&cover.title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        let fonts = load_fonts(&doc)?;
        draw_cover(&doc.get_page(page).get_layer(layer), &fonts, cover);
        save(doc)
    }
}

fn load_fonts(doc: &PdfDocumentReference) -> Result<Fonts, String> {
    Ok(Fonts {
        regular: doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| format!("Font error: {e}"))?,
        bold: doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| format!("Font error: {e}"))?,
    })
}

fn save(doc: PdfDocumentReference) -> Result<Vec<u8>, String> {
    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(|e| format!("PDF save error: {e}"))?;
    buf.into_inner()
        .map_err(|e| format!("PDF buffer error: {e}"))
}

// ── Layout ───────────────────────────────────────────────────────────────

struct Cursor<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    /// Top of the free space on the current page, in mm from the bottom.
    y: f32,
}

impl Cursor<'_> {
    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = FRAME_TOP;
    }

    fn at_top(&self) -> bool {
        self.y >= FRAME_TOP
    }

    fn remaining(&self) -> f32 {
        self.y - FRAME_BOTTOM
    }

    /// Start a new page unless `height` fits below the cursor.
    fn reserve(&mut self, height: f32) {
        if height > self.remaining() && !self.at_top() {
            self.new_page();
        }
    }
}

fn layout(cursor: &mut Cursor<'_>, fonts: &Fonts, element: &Element) {
    match element {
        Element::Title(text) => {
            text_block(cursor, &fonts.bold, text, TITLE_PT, TITLE_PT * 1.2, 0.0, 16.0, false)
        }
        Element::Heading(text) => {
            text_block(cursor, &fonts.bold, text, HEADING_PT, HEADING_PT * 1.2, 24.0, 12.0, false)
        }
        Element::Paragraph(text) => {
            text_block(cursor, &fonts.regular, text, TEXT_PT, TEXT_LEADING_PT, 0.0, 12.0, false)
        }
        Element::Caption(text) => {
            text_block(cursor, &fonts.regular, text, CAPTION_PT, CAPTION_PT * 1.2, 0.0, 6.0, true)
        }
        Element::Spacer(inches) => {
            cursor.y -= inches * INCH_MM;
            if cursor.y < FRAME_BOTTOM {
                cursor.new_page();
            }
        }
        Element::PageBreak => {
            if !cursor.at_top() {
                cursor.new_page();
            }
        }
        Element::Chart(chart) => layout_chart(cursor, fonts, chart),
        Element::Table(table) => layout_table(cursor, fonts, table),
    }
}

#[allow(clippy::too_many_arguments)]
fn text_block(
    cursor: &mut Cursor<'_>,
    font: &IndirectFontRef,
    text: &str,
    size_pt: f32,
    leading_pt: f32,
    space_before_pt: f32,
    space_after_pt: f32,
    centered: bool,
) {
    let lines = wrap_text(text, chars_per_line(size_pt, FRAME_W));
    let leading = leading_pt * PT_TO_MM;
    let before = if cursor.at_top() { 0.0 } else { space_before_pt * PT_TO_MM };

    // Keep at least the first two lines together with the space above them.
    cursor.reserve(before + leading * lines.len().min(2) as f32);
    if !cursor.at_top() {
        cursor.y -= before;
    }

    cursor.layer.set_fill_color(rgb(0.0, 0.0, 0.0));
    for line in &lines {
        if cursor.remaining() < leading {
            cursor.new_page();
        }
        cursor.y -= leading;
        let x = if centered {
            MARGIN + (FRAME_W - text_width_mm(line, size_pt)).max(0.0) / 2.0
        } else {
            MARGIN
        };
        cursor
            .layer
            .use_text(line, size_pt, Mm(x), Mm(cursor.y + leading * 0.2), font);
    }
    cursor.y -= space_after_pt * PT_TO_MM;
}

fn layout_chart(cursor: &mut Cursor<'_>, fonts: &Fonts, chart: &Chart) {
    let w = chart.width_in * INCH_MM;
    let h = chart.height_in * INCH_MM;
    let scale = (FRAME_W / w).min((FRAME_TOP - FRAME_BOTTOM) / h).min(1.0);
    let (w, h) = (w * scale, h * scale);

    cursor.reserve(h);
    let frame = Frame {
        x: MARGIN + (FRAME_W - w) / 2.0,
        y: cursor.y - h,
        w,
        h,
    };
    chart.draw(&cursor.layer, fonts, frame);
    cursor.y -= h + 2.0;
}

fn layout_table(cursor: &mut Cursor<'_>, fonts: &Fonts, table: &TableBlock) {
    let cols = table.headers.len().max(1);
    let col_w = FRAME_W / cols as f32;
    let row_h = 6.0;
    let max_chars = chars_per_line(TABLE_PT, col_w - 2.0);

    let draw_row = |cursor: &mut Cursor<'_>, cells: &[String], header: bool| {
        let top = cursor.y;
        if header {
            fill_rect(&cursor.layer, MARGIN, top - row_h, FRAME_W, row_h, (0.83, 0.83, 0.83));
        }
        let font = if header { &fonts.bold } else { &fonts.regular };
        cursor.layer.set_fill_color(rgb(0.0, 0.0, 0.0));
        for (i, cell) in cells.iter().enumerate() {
            let x = MARGIN + col_w * i as f32;
            let text = fit_to_width(cell, max_chars);
            cursor
                .layer
                .use_text(&text, TABLE_PT, Mm(x + 1.0), Mm(top - row_h + 2.0), font);
        }
        stroke_line(&cursor.layer, MARGIN, top - row_h, MARGIN + FRAME_W, top - row_h, GRID_LINE, 0.5);
        for i in 0..=cols {
            let x = MARGIN + col_w * i as f32;
            stroke_line(&cursor.layer, x, top, x, top - row_h, GRID_LINE, 0.5);
        }
        cursor.y -= row_h;
    };

    let start_table = |cursor: &mut Cursor<'_>| {
        stroke_line(&cursor.layer, MARGIN, cursor.y, MARGIN + FRAME_W, cursor.y, GRID_LINE, 0.5);
        draw_row(cursor, table.headers.as_slice(), true);
    };

    cursor.reserve(row_h * 2.0);
    start_table(cursor);
    for row in &table.rows {
        if cursor.remaining() < row_h {
            cursor.new_page();
            start_table(cursor);
        }
        draw_row(cursor, row.as_slice(), false);
    }
    cursor.y -= 4.0;
}

const GRID_LINE: (f32, f32, f32) = (0.83, 0.83, 0.83);

fn draw_cover(layer: &PdfLayerReference, fonts: &Fonts, cover: &Cover) {
    let mut y = FRAME_TOP - 2.0 * INCH_MM;
    layer.set_fill_color(rgb(0.0, 0.0, 0.0));

    for line in wrap_text(&cover.title, chars_per_line(COVER_TITLE_PT, FRAME_W)) {
        y -= COVER_TITLE_PT * 1.2 * PT_TO_MM;
        let w = text_width_mm(&line, COVER_TITLE_PT);
        layer.use_text(&line, COVER_TITLE_PT, Mm(MARGIN + (FRAME_W - w).max(0.0) / 2.0), Mm(y), &fonts.bold);
    }

    if let Some(subtitle) = &cover.subtitle {
        y -= 0.5 * INCH_MM;
        for line in wrap_text(subtitle, chars_per_line(COVER_SUBTITLE_PT, FRAME_W)) {
            y -= COVER_SUBTITLE_PT * 1.2 * PT_TO_MM;
            let w = text_width_mm(&line, COVER_SUBTITLE_PT);
            layer.use_text(&line, COVER_SUBTITLE_PT, Mm(MARGIN + (FRAME_W - w).max(0.0) / 2.0), Mm(y), &fonts.bold);
        }
    }
}

// ── Primitives ───────────────────────────────────────────────────────────

pub(crate) fn rgb(r: f32, g: f32, b: f32) -> Color {
    Color::Rgb(Rgb::new(r, g, b, None))
}

/// Approximate Helvetica width: half an em per character.
pub(crate) fn text_width_mm(text: &str, size_pt: f32) -> f32 {
    text.chars().count() as f32 * size_pt * 0.5 * PT_TO_MM
}

fn chars_per_line(size_pt: f32, width_mm: f32) -> usize {
    ((width_mm / (size_pt * 0.5 * PT_TO_MM)) as usize).max(1)
}

/// Shorten `text` to at most `max_chars`, marking the cut with `...`.
///
/// Builtin fonts only cover WinAnsi, so the marker is plain ASCII.
fn fit_to_width(text: &str, max_chars: usize) -> String {
    const MARKER: &str = "...";
    if text.chars().count() <= max_chars {
        text.to_string()
    } else if max_chars <= MARKER.len() {
        truncate_chars(text, max_chars)
    } else {
        format!("{}{MARKER}", truncate_chars(text, max_chars - MARKER.len()))
    }
}

pub(crate) fn fill_rect(layer: &PdfLayerReference, x: f32, y: f32, w: f32, h: f32, color: (f32, f32, f32)) {
    layer.set_fill_color(rgb(color.0, color.1, color.2));
    let ring = vec![
        (Point::new(Mm(x), Mm(y)), false),
        (Point::new(Mm(x + w), Mm(y)), false),
        (Point::new(Mm(x + w), Mm(y + h)), false),
        (Point::new(Mm(x), Mm(y + h)), false),
    ];
    layer.add_polygon(Polygon {
        rings: vec![ring],
        mode: PaintMode::Fill,
        winding_order: WindingOrder::NonZero,
    });
}

pub(crate) fn stroke_line(
    layer: &PdfLayerReference,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    color: (f32, f32, f32),
    thickness_pt: f32,
) {
    layer.set_outline_color(rgb(color.0, color.1, color.2));
    layer.set_outline_thickness(thickness_pt);
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(x1), Mm(y1)), false),
            (Point::new(Mm(x2), Mm(y2)), false),
        ],
        is_closed: false,
    });
}

/// Greedy word wrap at `max_chars` characters per line.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.chars().count() + word.chars().count() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
