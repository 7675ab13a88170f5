//! Normalizes completion output into file content.
//!
//! Models wrap answers in markdown fences and sprinkle zero-width characters
//! despite being told not to. The cleaned text must also follow the line
//! ending and BOM convention of the "ours" side so the merge does not show up
//! as a whole-file rewrite.

use std::sync::OnceLock;

use regex_lite::Regex;

const BOM: char = '\u{FEFF}';

fn whole_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^```[A-Za-z0-9+_.#-]*[ \t]*\r?\n(.*?\r?\n)?```[ \t]*$")
            .expect("valid fence regex")
    })
}

fn fence_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9+_.#-]*[ \t\r]*(?:\n|$)")
            .expect("valid fence-line regex")
    })
}

/// Zero-width, bidi-control and BOM code points.
fn is_invisible(c: char) -> bool {
    matches!(c,
        '\u{200B}'..='\u{200F}'
        | '\u{202A}'..='\u{202E}'
        | '\u{2060}'
        | '\u{FEFF}')
}

/// Clean `raw` engine output using `exemplar` (the "ours" blob) for the
/// BOM, final-newline and line-ending conventions.
pub fn sanitize_merged_text(raw: &str, exemplar: &str) -> String {
    let trimmed = raw.trim();

    let unfenced = match whole_fence().captures(trimmed) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string(),
        None => trimmed.to_string(),
    };

    let without_fences = fence_line().replace_all(&unfenced, "");

    let mut text: String = without_fences.chars().filter(|c| !is_invisible(*c)).collect();

    // Invisible-character removal already dropped any BOM.
    if exemplar.starts_with(BOM) {
        text.insert(0, BOM);
    }

    if exemplar.ends_with('\n') && !text.ends_with('\n') {
        text.push('\n');
    }

    let text = text.replace("\r\n", "\n");
    if exemplar.contains("\r\n") {
        text.replace('\n', "\r\n")
    } else {
        text
    }
}
