//! Markdown → HTML.
//!
//! Uses the common CommonMark set plus GFM tables, strikethrough and task
//! lists. The parser is tolerant: any input string produces some HTML.

use pulldown_cmark::{html, Options, Parser};

/// Stylesheet embedded in [`html_document`]. Mirrors the PDF defaults.
pub const DEFAULT_STYLESHEET: &str = r#"body { font-family: Helvetica, Arial, sans-serif; font-size: 11pt; line-height: 1.4; margin: 20mm; color: #111; }
h1, h2, h3, h4, h5, h6 { font-weight: bold; margin: 1.2em 0 0.4em; }
h1 { font-size: 20pt; } h2 { font-size: 16pt; } h3 { font-size: 13.5pt; } h4 { font-size: 12pt; }
code, pre { font-family: Courier, monospace; font-size: 9.5pt; }
pre { background: #f4f4f4; padding: 6pt; white-space: pre-wrap; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 0.5pt solid #999; padding: 3pt 5pt; text-align: left; vertical-align: top; }
blockquote { margin-left: 0; padding-left: 10pt; border-left: 2pt solid #ccc; color: #444; }
"#;

fn options() -> Options {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TASKLISTS);
    opts
}

/// Convert markdown to an HTML fragment (no `<html>`/`<body>` wrapper).
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, options());
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Wrap an HTML fragment in a standalone page with the default stylesheet.
pub fn html_document(fragment: &str, title: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>\n{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_text(title),
        DEFAULT_STYLESHEET,
        fragment
    )
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_constructs() {
        let html = markdown_to_html("# Summary\n\n- Loads *table*.qvd\n- Uses `RESIDENT`\n");
        assert!(html.contains("<h1>Summary</h1>"));
        assert!(html.contains("<ul>"));
        assert!(html.contains("<em>table</em>"));
        assert!(html.contains("<code>RESIDENT</code>"));
    }

    #[test]
    fn tables_enabled() {
        let html = markdown_to_html("| A | B |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<th>A</th>"));
        assert!(html.contains("<td>2</td>"));
    }

    #[test]
    fn malformed_markdown_is_tolerated() {
        let html = markdown_to_html("**unclosed *emphasis\n\n| broken | table\n```\nno close");
        assert!(html.contains("unclosed"));
        assert!(html.contains("no close"));
    }

    #[test]
    fn document_wrapper_escapes_title() {
        let page = html_document("<p>x</p>\n", "a < b");
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<title>a &lt; b</title>"));
        assert!(page.contains("<p>x</p>"));
    }
}
