//! Block flow → paginated PDF.
//!
//! Lines are word-wrapped with the standard-font metrics from [`super::fonts`]
//! and placed top-down; a new page starts whenever the next line would cross
//! the bottom margin. Every text line is its own `BT … ET` object, so text
//! extraction yields one line per rendered line.
//!
//! The output is deterministic: no timestamps, no document IDs, objects in a
//! fixed order. The same blocks and page setup always produce the same bytes.

use super::fonts::{self, base_font, resource_name, text_width, ALL_STYLES};
use super::layout::{Block, FontStyle, Run, TableRow};
use crate::config::PageSetup;
use crate::error::Qvs2PdfError;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use tracing::debug;

const LEADING: f32 = 1.35;
const ASCENT: f32 = 0.78;
const INDENT_STEP: f32 = 18.0;
const CELL_PAD: f32 = 4.0;
const MIN_FOOTER_MARGIN: f32 = 20.0;

/// Heading sizes at an 11 pt body; scaled for other body sizes.
fn heading_size(level: u8) -> f32 {
    match level {
        1 => 20.0,
        2 => 16.0,
        3 => 13.5,
        4 => 12.0,
        _ => 11.0,
    }
}

/// A laid-out PDF.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

/// Lay out `blocks` and serialise the result.
pub fn render_pdf(
    blocks: &[Block],
    title: &str,
    setup: &PageSetup,
) -> Result<PdfDocument, Qvs2PdfError> {
    let mut pager = Paginator::new(*setup);
    for block in blocks {
        pager.block(block);
    }
    let pages = pager.finish();
    let page_count = pages.len();
    debug!("Laid out {} blocks on {} pages", blocks.len(), page_count);
    let bytes = assemble(pages, title, setup)?;
    Ok(PdfDocument { bytes, page_count })
}

// ── Line wrapping ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct Fragment {
    text: String,
    style: FontStyle,
    /// Offset from the line start, in points.
    x: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Line {
    fragments: Vec<Fragment>,
    width: f32,
}

impl Line {
    fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    #[cfg(test)]
    fn text(&self) -> String {
        self.fragments.iter().map(|f| f.text.as_str()).collect()
    }
}

struct Wrapper {
    max_width: f32,
    size: f32,
    lines: Vec<Line>,
    line: Line,
}

impl Wrapper {
    fn new(max_width: f32, size: f32) -> Self {
        Self {
            max_width: max_width.max(1.0),
            size,
            lines: Vec::new(),
            line: Line::default(),
        }
    }

    fn break_line(&mut self) {
        self.lines.push(std::mem::take(&mut self.line));
    }

    fn place(&mut self, word: &str, style: FontStyle, space_before: bool) {
        if word.is_empty() {
            return;
        }
        let width = text_width(word, style, self.size);
        let mut space = space_before && !self.line.is_empty();
        let space_width = text_width(" ", style, self.size);
        let extra = if space { space_width } else { 0.0 };

        if !self.line.is_empty() && self.line.width + extra + width > self.max_width {
            self.break_line();
            space = false;
        }

        if self.line.is_empty() && width > self.max_width {
            self.place_long(word, style);
            return;
        }
        self.append(word, style, space);
    }

    /// Hard-split a word wider than the whole line.
    fn place_long(&mut self, word: &str, style: FontStyle) {
        let mut chunk = String::new();
        let mut chunk_width = 0.0;
        for c in word.chars() {
            let w = f32::from(fonts::char_width(c, style)) * self.size / 1000.0;
            if !chunk.is_empty() && chunk_width + w > self.max_width {
                self.append(&chunk, style, false);
                self.break_line();
                chunk.clear();
                chunk_width = 0.0;
            }
            chunk.push(c);
            chunk_width += w;
        }
        if !chunk.is_empty() {
            self.append(&chunk, style, false);
        }
    }

    fn append(&mut self, word: &str, style: FontStyle, space: bool) {
        let mut text = String::with_capacity(word.len() + 1);
        if space {
            text.push(' ');
        }
        text.push_str(word);
        let width = text_width(&text, style, self.size);
        match self.line.fragments.last_mut() {
            Some(last) if last.style == style => last.text.push_str(&text),
            _ => self.line.fragments.push(Fragment {
                text,
                style,
                x: self.line.width,
            }),
        }
        self.line.width += width;
    }

    fn finish(mut self) -> Vec<Line> {
        if !self.line.is_empty() {
            self.break_line();
        }
        self.lines
    }
}

/// Greedy word wrap of styled runs. `"\n"` runs force a break.
fn wrap_runs(runs: &[Run], max_width: f32, size: f32, embolden: bool) -> Vec<Line> {
    let mut wrapper = Wrapper::new(max_width, size);
    let mut word = String::new();
    let mut word_style = FontStyle::Regular;
    let mut space_before = false;

    for run in runs {
        let style = if embolden {
            run.style.emboldened()
        } else {
            run.style
        };
        if run.is_break() {
            wrapper.place(&word, word_style, space_before);
            word.clear();
            space_before = false;
            wrapper.break_line();
            continue;
        }
        for c in fonts::sanitize(&run.text).chars() {
            if c.is_whitespace() {
                if !word.is_empty() {
                    wrapper.place(&word, word_style, space_before);
                    word.clear();
                }
                space_before = true;
                continue;
            }
            if !word.is_empty() && word_style != style {
                wrapper.place(&word, word_style, space_before);
                word.clear();
                space_before = false;
            }
            word.push(c);
            word_style = style;
        }
    }
    wrapper.place(&word, word_style, space_before);
    wrapper.finish()
}

// ── Pagination ───────────────────────────────────────────────────────────

struct Paginator {
    body: f32,
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
    y: f32,
    pages: Vec<Vec<Operation>>,
    ops: Vec<Operation>,
}

impl Paginator {
    fn new(setup: PageSetup) -> Self {
        let (width, height) = setup.size.dimensions_pt();
        let margin = setup.margin_pt;
        Self {
            body: setup.font_size,
            left: margin,
            right: width - margin,
            top: height - margin,
            bottom: margin,
            y: height - margin,
            pages: Vec::new(),
            ops: Vec::new(),
        }
    }

    fn at_top(&self) -> bool {
        (self.y - self.top).abs() < 0.01
    }

    fn new_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.ops));
        self.y = self.top;
    }

    /// Start a new page unless `needed` points still fit.
    fn ensure(&mut self, needed: f32) {
        if self.y - needed < self.bottom && !self.at_top() {
            self.new_page();
        }
    }

    fn gap(&mut self, h: f32) {
        if !self.at_top() {
            self.y -= h;
        }
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.ops.is_empty() || self.pages.is_empty() {
            self.new_page();
        }
        let total = self.pages.len();
        if self.bottom >= MIN_FOOTER_MARGIN {
            let center = (self.left + self.right) / 2.0;
            let baseline = self.bottom / 2.0;
            for (i, ops) in self.pages.iter_mut().enumerate() {
                let label = format!("{} / {}", i + 1, total);
                let x = center - text_width(&label, FontStyle::Regular, 8.0) / 2.0;
                ops.push(Operation::new("g", vec![0.45.into()]));
                push_text(ops, &label, FontStyle::Regular, 8.0, x, baseline);
                ops.push(Operation::new("g", vec![0.into()]));
            }
        }
        self.pages
    }

    fn block(&mut self, block: &Block) {
        match block {
            Block::Heading { level, runs } => self.heading(*level, runs),
            Block::Paragraph {
                runs,
                indent,
                marker,
                quoted,
            } => self.paragraph(runs, *indent, marker.as_deref(), *quoted),
            Block::Code { text, indent } => self.code(text, *indent),
            Block::Rule => self.rule(),
            Block::Table { rows } => self.table(rows),
        }
    }

    fn draw_line(&mut self, line: &Line, x: f32, size: f32) {
        let lh = size * LEADING;
        self.ensure(lh);
        let baseline = self.y - size * ASCENT - (lh - size) / 2.0;
        push_line(&mut self.ops, line, x, baseline, size);
        self.y -= lh;
    }

    fn heading(&mut self, level: u8, runs: &[Run]) {
        let size = heading_size(level) * self.body / 11.0;
        let lines = wrap_runs(runs, self.right - self.left, size, true);
        self.gap(size * 0.8);
        // Keep the heading with at least two lines of what follows.
        self.ensure(lines.len() as f32 * size * LEADING + 2.0 * self.body * LEADING);
        for line in &lines {
            self.draw_line(line, self.left, size);
        }
        if level <= 2 {
            let y = self.y - 2.0;
            self.ops.push(Operation::new("G", vec![0.75.into()]));
            self.ops.push(Operation::new("w", vec![0.5.into()]));
            self.ops.push(Operation::new("m", vec![self.left.into(), y.into()]));
            self.ops.push(Operation::new("l", vec![self.right.into(), y.into()]));
            self.ops.push(Operation::new("S", vec![]));
            self.ops.push(Operation::new("G", vec![0.into()]));
            self.y -= 4.0;
        }
        self.y -= size * 0.3;
    }

    fn paragraph(&mut self, runs: &[Run], indent: u8, marker: Option<&str>, quoted: bool) {
        let size = self.body;
        let lh = size * LEADING;
        let x = self.left + f32::from(indent) * INDENT_STEP;
        let mut lines = wrap_runs(runs, self.right - x, size, false);
        if lines.is_empty() {
            if marker.is_none() {
                return;
            }
            lines.push(Line::default());
        }

        for (i, line) in lines.iter().enumerate() {
            self.ensure(lh);
            if quoted {
                let bar_x = x - 9.0;
                self.ops.push(Operation::new("G", vec![0.7.into()]));
                self.ops.push(Operation::new("w", vec![1.5.into()]));
                self.ops.push(Operation::new("m", vec![bar_x.into(), self.y.into()]));
                self.ops
                    .push(Operation::new("l", vec![bar_x.into(), (self.y - lh).into()]));
                self.ops.push(Operation::new("S", vec![]));
                self.ops.push(Operation::new("G", vec![0.into()]));
            }
            if i == 0 {
                if let Some(marker) = marker {
                    let w = text_width(marker, FontStyle::Regular, size);
                    let baseline = self.y - size * ASCENT - (lh - size) / 2.0;
                    push_text(
                        &mut self.ops,
                        marker,
                        FontStyle::Regular,
                        size,
                        x - 5.0 - w,
                        baseline,
                    );
                }
            }
            self.draw_line(line, x, size);
        }

        let tight = marker.is_some() || (indent > 0 && !quoted);
        self.y -= size * if tight { 0.25 } else { 0.6 };
    }

    fn code(&mut self, text: &str, indent: u8) {
        let size = self.body * 0.86;
        let lh = size * 1.3;
        let x = self.left + f32::from(indent) * INDENT_STEP;
        let avail = self.right - x - 2.0 * CELL_PAD;
        let max_chars = ((avail / (0.6 * size)).floor() as usize).max(1);

        self.gap(2.0);
        for raw in text.split('\n') {
            let expanded = raw.replace('\t', "    ");
            let clean = fonts::sanitize(&expanded);
            let chars: Vec<char> = clean.chars().collect();
            let chunks: Vec<String> = if chars.is_empty() {
                vec![String::new()]
            } else {
                chars.chunks(max_chars).map(|c| c.iter().collect()).collect()
            };
            for chunk in chunks {
                self.ensure(lh);
                self.ops.push(Operation::new("g", vec![0.95.into()]));
                self.ops.push(Operation::new(
                    "re",
                    vec![
                        x.into(),
                        (self.y - lh).into(),
                        (self.right - x).into(),
                        lh.into(),
                    ],
                ));
                self.ops.push(Operation::new("f", vec![]));
                self.ops.push(Operation::new("g", vec![0.into()]));
                if !chunk.is_empty() {
                    let baseline = self.y - size * ASCENT - (lh - size) / 2.0;
                    push_text(
                        &mut self.ops,
                        &chunk,
                        FontStyle::Mono,
                        size,
                        x + CELL_PAD,
                        baseline,
                    );
                }
                self.y -= lh;
            }
        }
        self.y -= self.body * 0.6;
    }

    fn rule(&mut self) {
        self.gap(self.body * 0.4);
        self.ensure(self.body);
        let y = self.y - self.body * 0.5;
        self.ops.push(Operation::new("G", vec![0.6.into()]));
        self.ops.push(Operation::new("w", vec![0.75.into()]));
        self.ops.push(Operation::new("m", vec![self.left.into(), y.into()]));
        self.ops.push(Operation::new("l", vec![self.right.into(), y.into()]));
        self.ops.push(Operation::new("S", vec![]));
        self.ops.push(Operation::new("G", vec![0.into()]));
        self.y -= self.body;
    }

    fn table(&mut self, rows: &[TableRow]) {
        let columns = rows.iter().map(|r| r.cells.len()).max().unwrap_or(0);
        if columns == 0 {
            return;
        }
        let size = self.body * 0.9;
        let lh = size * LEADING;
        let col_w = (self.right - self.left) / columns as f32;
        let full_page_lines = ((self.top - self.bottom - 2.0 * CELL_PAD) / lh).floor() as usize;

        self.gap(self.body * 0.2);
        for row in rows {
            let cells: Vec<Vec<Line>> = (0..columns)
                .map(|i| {
                    row.cells
                        .get(i)
                        .map(|runs| wrap_runs(runs, col_w - 2.0 * CELL_PAD, size, row.header))
                        .unwrap_or_default()
                })
                .collect();
            let row_lines = cells.iter().map(Vec::len).max().unwrap_or(0).max(1);

            let mut start = 0;
            while start < row_lines {
                let remaining = row_lines - start;
                let fit = ((self.y - self.bottom - 2.0 * CELL_PAD) / lh).floor().max(0.0) as usize;
                if fit < remaining && !self.at_top() && (fit == 0 || remaining <= full_page_lines)
                {
                    self.new_page();
                    continue;
                }
                let take = remaining.min(fit.max(1));
                let row_h = take as f32 * lh + 2.0 * CELL_PAD;
                let row_bottom = self.y - row_h;

                if row.header {
                    self.ops.push(Operation::new("g", vec![0.92.into()]));
                    self.ops.push(Operation::new(
                        "re",
                        vec![
                            self.left.into(),
                            row_bottom.into(),
                            (self.right - self.left).into(),
                            row_h.into(),
                        ],
                    ));
                    self.ops.push(Operation::new("f", vec![]));
                    self.ops.push(Operation::new("g", vec![0.into()]));
                }
                self.ops.push(Operation::new("G", vec![0.6.into()]));
                self.ops.push(Operation::new("w", vec![0.5.into()]));
                for col in 0..columns {
                    let cx = self.left + col as f32 * col_w;
                    self.ops.push(Operation::new(
                        "re",
                        vec![cx.into(), row_bottom.into(), col_w.into(), row_h.into()],
                    ));
                }
                self.ops.push(Operation::new("S", vec![]));
                self.ops.push(Operation::new("G", vec![0.into()]));

                for (col, lines) in cells.iter().enumerate() {
                    let cx = self.left + col as f32 * col_w + CELL_PAD;
                    for (j, line) in lines.iter().skip(start).take(take).enumerate() {
                        let baseline = self.y
                            - CELL_PAD
                            - j as f32 * lh
                            - size * ASCENT
                            - (lh - size) / 2.0;
                        push_line(&mut self.ops, line, cx, baseline, size);
                    }
                }
                self.y = row_bottom;
                start += take;
            }
        }
        self.y -= self.body * 0.6;
    }
}

fn push_text(ops: &mut Vec<Operation>, text: &str, style: FontStyle, size: f32, x: f32, y: f32) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec![resource_name(style).into(), size.into()],
    ));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new(
        "Tj",
        vec![Object::string_literal(fonts::encode(&fonts::sanitize(text)))],
    ));
    ops.push(Operation::new("ET", vec![]));
}

fn push_line(ops: &mut Vec<Operation>, line: &Line, x: f32, baseline: f32, size: f32) {
    if line.is_empty() {
        return;
    }
    ops.push(Operation::new("BT", vec![]));
    let mut prev_x = 0.0;
    for (i, frag) in line.fragments.iter().enumerate() {
        ops.push(Operation::new(
            "Tf",
            vec![resource_name(frag.style).into(), size.into()],
        ));
        // Td is relative to the start of the previous fragment.
        let (dx, dy) = if i == 0 {
            (x + frag.x, baseline)
        } else {
            (frag.x - prev_x, 0.0)
        };
        ops.push(Operation::new("Td", vec![dx.into(), dy.into()]));
        ops.push(Operation::new(
            "Tj",
            vec![Object::string_literal(fonts::encode(&frag.text))],
        ));
        prev_x = frag.x;
    }
    ops.push(Operation::new("ET", vec![]));
}

// ── Serialisation ────────────────────────────────────────────────────────

fn assemble(
    pages: Vec<Vec<Operation>>,
    title: &str,
    setup: &PageSetup,
) -> Result<Vec<u8>, Qvs2PdfError> {
    let (width, height) = setup.size.dimensions_pt();
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut fonts = Dictionary::new();
    for style in ALL_STYLES {
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base_font(style),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(resource_name(style), font_id);
    }
    let resources_id = doc.add_object(dictionary! { "Font" => fonts });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations }
            .encode()
            .map_err(|e| Qvs2PdfError::RenderFailed(format!("Content encoding failed: {e}")))?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => text_string(title),
        "Producer" => Object::string_literal(concat!("qvs2pdf ", env!("CARGO_PKG_VERSION"))),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| Qvs2PdfError::RenderFailed(format!("PDF serialisation failed: {e}")))?;
    Ok(out)
}

/// PDF text string: plain literal for ASCII, UTF-16BE with BOM otherwise.
fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::string_literal(s);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::string_literal(bytes)
}
