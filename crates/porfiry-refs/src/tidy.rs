//! Markdown clean-up helpers applied around resolution
//!
//! - [`tidy_linebreaks`] repairs the stray single newlines streamed models
//!   leave inside sentences
//! - [`strip_embedded_images`] drops inline `data:image` screenshots, e.g.
//!   before feeding several finished reports back to a model

use crate::scan::{scan_links, ReferenceKind};

const JOIN_WITHOUT_SPACE: &[char] = &[',', '.', ':', ';', '!', '?'];

/// Merge single line breaks inside paragraphs
///
/// A line is glued onto the previous one when both are non-blank and the
/// line does not start a block: list item, numbered item, heading, quote,
/// table row or image. Headings, table rows, hard breaks and fenced code
/// are never merged into. Horizontal whitespace before punctuation is then
/// removed.
#[must_use]
pub fn tidy_linebreaks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_fence = false;
    let mut prev_accepts_join = false;

    for (idx, line) in text.split('\n').enumerate() {
        let trimmed = line.trim_start();
        let is_fence = trimmed.starts_with("```") || trimmed.starts_with("~~~");

        let join = prev_accepts_join
            && !in_fence
            && !is_fence
            && !trimmed.is_empty()
            && !starts_block(trimmed);

        if join {
            if !trimmed.starts_with(JOIN_WITHOUT_SPACE) {
                out.push(' ');
            }
            out.push_str(&collapse_space_before_punctuation(trimmed));
        } else {
            if idx > 0 {
                out.push('\n');
            }
            if in_fence || is_fence {
                out.push_str(line);
            } else {
                out.push_str(&collapse_space_before_punctuation(line));
            }
        }

        if is_fence {
            in_fence = !in_fence;
        }
        prev_accepts_join = !in_fence && !is_fence && accepts_join(line);
    }

    out
}

/// Remove `![..](data:image/..)` images
#[must_use]
pub fn strip_embedded_images(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut cursor = 0;
    for reference in scan_links(markdown) {
        if let ReferenceKind::InlineLink { target, .. } = reference.kind {
            if target.starts_with("data:image/") {
                out.push_str(&markdown[cursor..reference.span.start]);
                cursor = reference.span.end;
            }
        }
    }
    out.push_str(&markdown[cursor..]);
    out
}

fn starts_block(trimmed: &str) -> bool {
    if trimmed.starts_with(['-', '*', '+', '#', '>', '|', '!']) {
        return true;
    }
    let digits = trimmed.bytes().take_while(u8::is_ascii_digit).count();
    digits > 0 && trimmed[digits..].starts_with('.')
}

/// Whether text may continue on this line after a soft break
fn accepts_join(line: &str) -> bool {
    let trimmed = line.trim_start();
    !trimmed.is_empty()
        && !trimmed.starts_with(['#', '|'])
        && !line.ends_with("  ")
        && !line.ends_with('\\')
}

/// Drop spaces and tabs sitting between a word and punctuation
///
/// Leading indentation and the `!` of an image (`![`) are kept.
fn collapse_space_before_punctuation(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut pending = String::new();
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == ' ' || ch == '\t' {
            pending.push(ch);
            continue;
        }
        let is_punct = JOIN_WITHOUT_SPACE.contains(&ch) && !(ch == '!' && chars.peek() == Some(&'['));
        if !(is_punct && !out.is_empty()) {
            out.push_str(&pending);
        }
        pending.clear();
        out.push(ch);
    }
    out.push_str(&pending);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn merges_broken_sentences() {
        let text = "The attacker sends a\ncrafted request\n, which succeeds .";
        assert_eq!(tidy_linebreaks(text), "The attacker sends a crafted request, which succeeds.");
    }

    #[test]
    fn keeps_block_starts() {
        let text = "Steps:\n- first\n- second\n1. numbered\n> quote\n| a | b |\n![x](screenshot1.png)";
        assert_eq!(tidy_linebreaks(text), text);
    }

    #[test]
    fn keeps_paragraph_breaks_and_headings() {
        let text = "## Description\nText here\n\nNext paragraph";
        assert_eq!(tidy_linebreaks(text), text);
    }

    #[test]
    fn leaves_fenced_code_alone() {
        let text = "Run:\n```\ncurl -X POST \\\n  http://h/api , x\n```\nDone";
        assert_eq!(tidy_linebreaks(text), text);
    }

    #[test]
    fn respects_hard_breaks() {
        let text = "line one  \nline two";
        assert_eq!(tidy_linebreaks(text), text);
    }

    #[test]
    fn list_item_continuation_merges() {
        assert_eq!(tidy_linebreaks("- item that\ncontinues"), "- item that continues");
    }

    #[test]
    fn strips_only_data_images() {
        let md = "A ![s](data:image/png;base64,AAAA) B ![badge](https://img.shields.io/x) C";
        assert_eq!(strip_embedded_images(md), "A  B ![badge](https://img.shields.io/x) C");
    }
}
