//! HTML → block flow.
//!
//! The HTML fragment produced by [`super::html`] (plus any raw HTML the model
//! embedded) is parsed with `scraper` and flattened into a list of typed
//! [`Block`]s that the PDF paginator can lay out line by line. Unknown
//! elements are transparent: their text is kept, their tag is ignored.

use scraper::{ElementRef, Html, Node};
use tracing::debug;

/// Typeface variant for a run of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontStyle {
    #[default]
    Regular,
    Bold,
    Italic,
    BoldItalic,
    Mono,
}

impl FontStyle {
    /// The bold counterpart, used for headings and table headers.
    pub fn emboldened(self) -> Self {
        match self {
            FontStyle::Regular | FontStyle::Bold => FontStyle::Bold,
            FontStyle::Italic | FontStyle::BoldItalic => FontStyle::BoldItalic,
            FontStyle::Mono => FontStyle::Mono,
        }
    }
}

/// Text with a single style. A run whose text is `"\n"` is a forced line break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub text: String,
    pub style: FontStyle,
}

impl Run {
    pub fn new(text: impl Into<String>, style: FontStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    pub fn is_break(&self) -> bool {
        self.text == "\n"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub header: bool,
    pub cells: Vec<Vec<Run>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading {
        level: u8,
        runs: Vec<Run>,
    },
    /// Body text. List items carry their marker (`•`, `3.`) and nesting depth.
    Paragraph {
        runs: Vec<Run>,
        indent: u8,
        marker: Option<String>,
        quoted: bool,
    },
    Code {
        text: String,
        indent: u8,
    },
    Rule,
    Table {
        rows: Vec<TableRow>,
    },
}

/// Concatenate the text of a run list, turning breaks into spaces.
pub fn plain_text(runs: &[Run]) -> String {
    runs.iter()
        .map(|r| if r.is_break() { " " } else { r.text.as_str() })
        .collect()
}

/// Parse an HTML fragment into blocks.
pub fn html_to_blocks(html: &str) -> Vec<Block> {
    let fragment = Html::parse_fragment(html);
    if !fragment.errors.is_empty() {
        debug!("HTML parser recovered from {} errors", fragment.errors.len());
    }
    let mut flow = FlowBuilder::default();
    flow.visit_children(fragment.root_element());
    flow.flush();
    flow.blocks
}

const MAX_INDENT: u8 = 8;

struct ListFrame {
    ordered: bool,
    next: u64,
}

#[derive(Default)]
struct FlowBuilder {
    blocks: Vec<Block>,
    runs: Vec<Run>,
    bold: u32,
    italic: u32,
    mono: u32,
    lists: Vec<ListFrame>,
    quote_depth: u8,
    marker: Option<String>,
}

impl FlowBuilder {
    fn style(&self) -> FontStyle {
        if self.mono > 0 {
            return FontStyle::Mono;
        }
        match (self.bold > 0, self.italic > 0) {
            (false, false) => FontStyle::Regular,
            (true, false) => FontStyle::Bold,
            (false, true) => FontStyle::Italic,
            (true, true) => FontStyle::BoldItalic,
        }
    }

    fn indent(&self) -> u8 {
        (self.lists.len() as u8)
            .saturating_add(self.quote_depth)
            .min(MAX_INDENT)
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let text = text.replace(['\n', '\r', '\t'], " ");
        let style = self.style();
        if let Some(last) = self.runs.last_mut() {
            if last.style == style && !last.is_break() {
                last.text.push_str(&text);
                return;
            }
        }
        self.runs.push(Run::new(text, style));
    }

    /// Emit pending inline text as a paragraph. Whitespace-only text is
    /// dropped, and a pending list marker waits for real content.
    fn flush(&mut self) {
        let runs = std::mem::take(&mut self.runs);
        if runs.iter().all(|r| r.text.trim().is_empty()) {
            return;
        }
        self.blocks.push(Block::Paragraph {
            runs,
            indent: self.indent(),
            marker: self.marker.take(),
            quoted: self.quote_depth > 0,
        });
    }

    fn take_inline(&mut self) -> Vec<Run> {
        let runs = std::mem::take(&mut self.runs);
        if runs.iter().all(|r| r.text.trim().is_empty()) {
            Vec::new()
        } else {
            runs
        }
    }

    /// Emit a pending list marker on a line of its own, ahead of a block
    /// that cannot carry it.
    fn lead_marker(&mut self) {
        if let Some(marker) = self.marker.take() {
            self.blocks.push(Block::Paragraph {
                runs: Vec::new(),
                indent: self.indent(),
                marker: Some(marker),
                quoted: self.quote_depth > 0,
            });
        }
    }

    fn next_marker(&mut self) -> String {
        let depth = self.lists.len();
        match self.lists.last_mut() {
            Some(frame) if frame.ordered => {
                let n = frame.next;
                frame.next += 1;
                format!("{n}.")
            }
            _ => match depth {
                0 | 1 => "•".to_string(),
                2 => "–".to_string(),
                _ => "·".to_string(),
            },
        }
    }

    fn visit_children(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => self.push_text(text),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.visit_element(child_el);
                    }
                }
                _ => {}
            }
        }
    }

    fn visit_element(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush();
                self.visit_children(el);
                let mut runs = self.take_inline();
                if !runs.is_empty() {
                    if let Some(marker) = self.marker.take() {
                        runs.insert(0, Run::new(format!("{marker} "), FontStyle::Regular));
                    }
                    let level = name[1..].parse::<u8>().unwrap_or(6);
                    self.blocks.push(Block::Heading { level, runs });
                }
            }
            "p" | "div" | "section" | "article" | "header" | "footer" | "dl" | "dt" | "dd"
            | "details" | "summary" | "figure" | "figcaption" => {
                self.flush();
                self.visit_children(el);
                self.flush();
            }
            "ul" | "ol" => {
                self.flush();
                self.lead_marker();
                let start = el
                    .value()
                    .attr("start")
                    .and_then(|s| s.trim().parse::<u64>().ok())
                    .unwrap_or(1);
                self.lists.push(ListFrame {
                    ordered: name == "ol",
                    next: start,
                });
                self.visit_children(el);
                self.flush();
                self.lists.pop();
            }
            "li" => {
                self.flush();
                self.marker = Some(self.next_marker());
                self.visit_children(el);
                self.flush();
                self.lead_marker();
            }
            "pre" => {
                self.flush();
                self.lead_marker();
                let text: String = el.text().collect();
                self.blocks.push(Block::Code {
                    text: text.trim_end_matches('\n').to_string(),
                    indent: self.indent(),
                });
            }
            "blockquote" => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_add(1);
                self.visit_children(el);
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            "hr" => {
                self.flush();
                self.blocks.push(Block::Rule);
            }
            "br" => {
                let style = self.style();
                self.runs.push(Run::new("\n", style));
            }
            "table" => {
                self.flush();
                self.lead_marker();
                let rows = collect_table(el);
                if !rows.is_empty() {
                    self.blocks.push(Block::Table { rows });
                }
            }
            "strong" | "b" => {
                self.bold += 1;
                self.visit_children(el);
                self.bold -= 1;
            }
            "em" | "i" => {
                self.italic += 1;
                self.visit_children(el);
                self.italic -= 1;
            }
            "code" | "kbd" | "samp" | "tt" => {
                self.mono += 1;
                self.visit_children(el);
                self.mono -= 1;
            }
            "img" => {
                if let Some(alt) = el.value().attr("alt").filter(|a| !a.trim().is_empty()) {
                    self.italic += 1;
                    self.push_text(alt);
                    self.italic -= 1;
                }
            }
            "input" => {
                if el.value().attr("type") == Some("checkbox") {
                    let mark = if el.value().attr("checked").is_some() {
                        "[x] "
                    } else {
                        "[ ] "
                    };
                    self.push_text(mark);
                }
            }
            "script" | "style" | "head" | "title" => {}
            _ => self.visit_children(el),
        }
    }
}

fn collect_table(table: ElementRef<'_>) -> Vec<TableRow> {
    let mut rows = Vec::new();
    for node in table.descendants() {
        let Some(tr) = ElementRef::wrap(node) else {
            continue;
        };
        if tr.value().name() != "tr" {
            continue;
        }
        let in_thead = tr
            .parent()
            .and_then(ElementRef::wrap)
            .map(|p| p.value().name() == "thead")
            .unwrap_or(false);

        let mut cells = Vec::new();
        let mut all_th = true;
        for child in tr.children() {
            let Some(cell) = ElementRef::wrap(child) else {
                continue;
            };
            let cell_name = cell.value().name();
            if cell_name != "td" && cell_name != "th" {
                continue;
            }
            all_th &= cell_name == "th";
            cells.push(cell_runs(cell));
        }
        if !cells.is_empty() {
            rows.push(TableRow {
                header: in_thead || all_th,
                cells,
            });
        }
    }
    rows
}

/// Inline content of a table cell; nested blocks are joined with spaces.
fn cell_runs(cell: ElementRef<'_>) -> Vec<Run> {
    let mut flow = FlowBuilder::default();
    flow.visit_children(cell);
    let mut runs = Vec::new();
    for block in flow.blocks.drain(..) {
        let block_runs = match block {
            Block::Heading { runs, .. } | Block::Paragraph { runs, .. } => runs,
            Block::Code { text, .. } => vec![Run::new(text.replace('\n', " "), FontStyle::Mono)],
            Block::Rule | Block::Table { .. } => continue,
        };
        if !runs.is_empty() {
            runs.push(Run::new(" ", FontStyle::Regular));
        }
        runs.extend(block_runs);
    }
    runs.extend(flow.take_inline());
    runs
}
