//! Post-processing: deterministic cleanup of model-generated markdown.
//!
//! Hosted models often wrap the whole answer in a ```` ```markdown ```` fence,
//! mix line endings, or emit zero-width characters. Each rule below is a
//! pure `&str → String` pass that fixes one such quirk without touching the
//! wording of the explanation.
//!
//! Order matters: the outer fence is stripped first so that later passes see
//! the real document, and the final-newline pass runs last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw explanation.
///
/// 1. Strip an outer markdown fence wrapping the entire reply
/// 2. Normalise line endings (CRLF / CR → LF)
/// 3. Trim trailing whitespace per line, keeping hard breaks (two spaces)
/// 4. Remove invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 5. Collapse 3+ consecutive blank lines down to 2
/// 6. Ensure the text ends with exactly one newline
///
/// Rules 3 and 5 leave the inside of fenced code blocks alone.
pub fn clean_markdown(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = remove_invisible_chars(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: outer fence ──────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\A```[ \t]*(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n```[ \t]*\z")
        .expect("outer fence pattern is valid")
});

fn strip_outer_fence(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCE.captures(trimmed) {
        // A reply that is one code sample in a language-less fence is content,
        // not a wrapper, unless it contains markdown structure.
        Some(caps) if trimmed.starts_with("```m") || looks_like_markdown(&caps[1]) => {
            caps[1].to_string()
        }
        _ => input.to_string(),
    }
}

fn looks_like_markdown(body: &str) -> bool {
    body.lines().any(|l| {
        let l = l.trim_start();
        l.starts_with('#') || l.starts_with("- ") || l.starts_with("* ")
    })
}

// ── Rule 2: line endings ─────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: trailing whitespace ──────────────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    let lines: Vec<&str> = input.split('\n').collect();
    let in_code = fenced_lines(&lines);
    lines
        .iter()
        .zip(in_code)
        .map(|(line, code)| {
            if code {
                return line.to_string();
            }
            let trimmed = line.trim_end();
            // Two trailing spaces after text are a markdown hard break.
            if !trimmed.is_empty() && line.ends_with("  ") && !line.ends_with('\t') {
                format!("{trimmed}  ")
            } else {
                trimmed.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Marks the lines strictly between an opening and a closing code fence.
/// An unclosed fence runs to the end of the text.
fn fenced_lines(lines: &[&str]) -> Vec<bool> {
    let mut open: Option<(char, usize)> = None;
    lines
        .iter()
        .map(|line| {
            let fence = fence_marker(line);
            match (open, fence) {
                (None, Some(f)) => {
                    open = Some(f);
                    false
                }
                (Some((ch, len)), Some((c, n))) if c == ch && n >= len && is_bare_fence(line) => {
                    open = None;
                    false
                }
                (Some(_), _) => true,
                (None, None) => false,
            }
        })
        .collect()
}

fn fence_marker(line: &str) -> Option<(char, usize)> {
    let body = line.trim_start_matches(' ');
    if line.len() - body.len() > 3 {
        return None;
    }
    let ch = body.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let n = body.chars().take_while(|c| *c == ch).count();
    // A backtick fence's info string cannot itself contain backticks.
    if n < 3 || (ch == '`' && body[n..].contains('`')) {
        return None;
    }
    Some((ch, n))
}

fn is_bare_fence(line: &str) -> bool {
    line.trim().chars().all(|c| c == '`' || c == '~')
}

// ── Rule 4: invisible characters ─────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 5: blank lines ──────────────────────────────────────────────────

const MAX_BLANK_RUN: usize = 2;

fn collapse_blank_lines(input: &str) -> String {
    let lines: Vec<&str> = input.split('\n').collect();
    let in_code = fenced_lines(&lines);
    let mut kept = Vec::with_capacity(lines.len());
    let mut blanks = 0;
    for (line, code) in lines.iter().zip(in_code) {
        if !code && line.is_empty() {
            blanks += 1;
            if blanks > MAX_BLANK_RUN {
                continue;
            }
        } else {
            blanks = 0;
        }
        kept.push(*line);
    }
    kept.join("\n")
}

// ── Rule 6: final newline ────────────────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{trimmed}\n")
    }
}
