//! Standard-14 font metrics and WinAnsi text encoding.
//!
//! The PDF uses only built-in Type1 fonts (Helvetica family plus Courier),
//! so nothing is embedded and every viewer renders the same glyphs. Widths
//! come from the Adobe AFM files, in 1/1000 em units. Oblique faces share
//! the upright widths.

use super::layout::FontStyle;
use encoding_rs::WINDOWS_1252;
use std::borrow::Cow;

/// Helvetica widths for ASCII 32..=126.
#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// Helvetica-Bold widths for ASCII 32..=126.
#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

const COURIER_WIDTH: u16 = 600;

/// Fallback for glyphs outside ASCII; close to the average Latin-1 letter.
const WIDE_DEFAULT: u16 = 556;

/// Resource name used in page content streams.
pub fn resource_name(style: FontStyle) -> &'static str {
    match style {
        FontStyle::Regular => "F1",
        FontStyle::Bold => "F2",
        FontStyle::Italic => "F3",
        FontStyle::BoldItalic => "F4",
        FontStyle::Mono => "F5",
    }
}

/// PostScript name of the standard font.
pub fn base_font(style: FontStyle) -> &'static str {
    match style {
        FontStyle::Regular => "Helvetica",
        FontStyle::Bold => "Helvetica-Bold",
        FontStyle::Italic => "Helvetica-Oblique",
        FontStyle::BoldItalic => "Helvetica-BoldOblique",
        FontStyle::Mono => "Courier",
    }
}

pub const ALL_STYLES: [FontStyle; 5] = [
    FontStyle::Regular,
    FontStyle::Bold,
    FontStyle::Italic,
    FontStyle::BoldItalic,
    FontStyle::Mono,
];

/// Advance width of one character, in 1/1000 em.
pub fn char_width(c: char, style: FontStyle) -> u16 {
    if style == FontStyle::Mono {
        return COURIER_WIDTH;
    }
    let table = match style {
        FontStyle::Bold | FontStyle::BoldItalic => &HELVETICA_BOLD,
        _ => &HELVETICA,
    };
    match c {
        ' '..='~' => table[c as usize - 32],
        '•' => 350,
        '·' => 278,
        '–' => 556,
        '—' | '…' | '‰' => 1000,
        '‘' | '’' => 222,
        '“' | '”' => 333,
        '\u{a0}' => 278,
        _ => WIDE_DEFAULT,
    }
}

/// Rendered width of `text` at `size` points.
pub fn text_width(text: &str, style: FontStyle, size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| u32::from(char_width(c, style))).sum();
    units as f32 * size / 1000.0
}

/// Replace characters the standard fonts cannot show.
///
/// A few symbols get an ASCII spelling; other letters and digits become `?`
/// so the word stays visible; remaining symbols (emoji, pictographs) are
/// dropped. Control characters other than newline are removed.
pub fn sanitize(text: &str) -> Cow<'_, str> {
    if text.chars().all(|c| c == '\n' || is_encodable(c)) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\n' || is_encodable(c) {
            out.push(c);
            continue;
        }
        match c {
            '\t' => out.push(' '),
            '\u{2000}'..='\u{200a}' | '\u{202f}' | '\u{205f}' | '\u{3000}' => out.push(' '),
            '→' | '⇒' | '➡' => out.push_str("->"),
            '←' | '⇐' => out.push_str("<-"),
            '↔' => out.push_str("<->"),
            '≥' => out.push_str(">="),
            '≤' => out.push_str("<="),
            '≠' => out.push_str("!="),
            '✓' | '✔' | '✅' => out.push_str("[x]"),
            '‐' | '‑' | '‒' | '−' => out.push('-'),
            c if c.is_control() => {}
            c if c.is_alphanumeric() => out.push('?'),
            _ => {}
        }
    }
    Cow::Owned(out)
}

fn is_encodable(c: char) -> bool {
    match c {
        ' '..='~' => true,
        c if c.is_control() => false,
        c => encode_char(c).is_some(),
    }
}

fn encode_char(c: char) -> Option<u8> {
    if c.is_ascii() {
        return Some(c as u8);
    }
    let mut buf = [0u8; 4];
    let (bytes, _, unmappable) = WINDOWS_1252.encode(c.encode_utf8(&mut buf));
    match (unmappable, bytes.as_ref()) {
        (false, [b]) => Some(*b),
        _ => None,
    }
}

/// Encode sanitized text as WinAnsi bytes for a PDF string literal.
pub fn encode(text: &str) -> Vec<u8> {
    text.chars()
        .filter(|c| *c != '\n')
        .map(|c| encode_char(c).unwrap_or(b'?'))
        .collect()
}
