//! Reference tokenizer
//!
//! Turns Markdown into a list of [`Reference`]s with byte spans. Link
//! syntaxes are scanned first; numbered mentions overlapping a link are
//! dropped, so the spans returned never overlap and a rewrite of one
//! reference can never be re-read as another.

use crate::error::ResolveError;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::ops::Range;

/// Default trigger phrase for numbered mentions
pub const DEFAULT_MENTION_PHRASE: &str = "Screenshot";

/// Parsed reference kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind<'a> {
    /// `![alt](target)`
    InlineLink {
        /// Alt text, verbatim
        alt: &'a str,
        /// Link target, verbatim
        target: &'a str,
    },
    /// `![[target]]`
    WikiLink {
        /// Link target, verbatim
        target: &'a str,
    },
    /// `<phrase> <number>: <caption>` up to the end of the line
    NumberedMention {
        /// 1-based screenshot number as written
        number: usize,
        /// Caption text, trimmed
        caption: &'a str,
    },
}

/// One reference found in a text body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference<'a> {
    /// What was matched
    pub kind: ReferenceKind<'a>,
    /// Byte span of the whole match
    pub span: Range<usize>,
}

/// Numbered-mention trigger configuration
///
/// The trigger phrase is locale-specific free text, so it is configured
/// rather than fixed.
#[derive(Debug, Clone)]
pub struct MentionSyntax {
    phrase: String,
    pattern: Regex,
}

impl MentionSyntax {
    /// Build a case-sensitive syntax for `phrase`
    ///
    /// # Errors
    /// - `ResolveError::EmptyMentionPhrase` for a blank phrase
    pub fn new(phrase: &str) -> Result<Self, ResolveError> {
        Self::build(phrase, false)
    }

    /// Build a syntax that matches `phrase` in any letter case
    ///
    /// # Errors
    /// - `ResolveError::EmptyMentionPhrase` for a blank phrase
    pub fn case_insensitive(phrase: &str) -> Result<Self, ResolveError> {
        Self::build(phrase, true)
    }

    fn build(phrase: &str, ignore_case: bool) -> Result<Self, ResolveError> {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return Err(ResolveError::EmptyMentionPhrase);
        }
        // A phrase starting with a word character must start a word.
        let boundary = if phrase.starts_with(|c: char| c.is_alphanumeric() || c == '_') {
            r"\b"
        } else {
            ""
        };
        let pattern = RegexBuilder::new(&format!(
            r"{boundary}{}[ \t]+(\d+):[ \t]*([^\r\n]+)",
            regex::escape(phrase)
        ))
        .case_insensitive(ignore_case)
        .build()?;
        Ok(Self {
            phrase: phrase.to_string(),
            pattern,
        })
    }

    /// Trigger phrase
    #[inline]
    #[must_use]
    pub fn phrase(&self) -> &str {
        &self.phrase
    }
}

static DEFAULT_MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bScreenshot[ \t]+(\d+):[ \t]*([^\r\n]+)").expect("default mention pattern is valid")
});

impl Default for MentionSyntax {
    fn default() -> Self {
        Self {
            phrase: DEFAULT_MENTION_PHRASE.to_string(),
            pattern: DEFAULT_MENTION.clone(),
        }
    }
}

/// Scan `text` for references, ordered by position
#[must_use]
pub fn scan<'a>(text: &'a str, mentions: &MentionSyntax) -> Vec<Reference<'a>> {
    let mut refs = scan_links(text);

    let mentioned = mentions.pattern.captures_iter(text).filter_map(|caps| {
        let whole = caps.get(0)?;
        let span = whole.range();
        if refs.iter().any(|r| overlaps(&r.span, &span)) {
            return None;
        }
        // Numbers too large for usize are out of range anyway.
        let number = caps.get(1)?.as_str().parse().ok()?;
        let caption = caps.get(2)?.as_str().trim();
        Some(Reference {
            kind: ReferenceKind::NumberedMention { number, caption },
            span,
        })
    });
    let mentioned: Vec<_> = mentioned.collect();

    refs.extend(mentioned);
    refs.sort_by_key(|r| r.span.start);
    refs
}

/// Scan only link syntaxes (`![alt](x)` and `![[x]]`)
#[must_use]
pub fn scan_links(text: &str) -> Vec<Reference<'_>> {
    let mut refs = Vec::new();
    let mut pos = 0;

    while let Some(rel) = text[pos..].find("![") {
        let start = pos + rel;
        let body = start + 2;

        if let Some(reference) = wiki_link_at(text, start, body).or_else(|| inline_link_at(text, start, body)) {
            pos = reference.span.end;
            refs.push(reference);
        } else {
            pos = start + 1;
        }
    }

    refs
}

/// `![[target]]`, target non-empty and free of `]`
fn wiki_link_at(text: &str, start: usize, body: usize) -> Option<Reference<'_>> {
    let inner_start = body + text[body..].strip_prefix('[').map(|_| 1)?;
    let close = inner_start + text[inner_start..].find(']')?;
    if close == inner_start || !text[close..].starts_with("]]") {
        return None;
    }
    Some(Reference {
        kind: ReferenceKind::WikiLink {
            target: &text[inner_start..close],
        },
        span: start..close + 2,
    })
}

/// `![alt](target)`, alt free of `]`, target free of `)`
fn inline_link_at(text: &str, start: usize, body: usize) -> Option<Reference<'_>> {
    let alt_end = body + text[body..].find(']')?;
    let target_start = alt_end + 1 + text[alt_end + 1..].strip_prefix('(').map(|_| 1)?;
    let target_end = target_start + text[target_start..].find(')')?;
    Some(Reference {
        kind: ReferenceKind::InlineLink {
            alt: &text[body..alt_end],
            target: &text[target_start..target_end],
        },
        span: start..target_end + 1,
    })
}

#[inline]
fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds<'a>(refs: &[Reference<'a>]) -> Vec<ReferenceKind<'a>> {
        refs.iter().map(|r| r.kind).collect()
    }

    #[test]
    fn scans_inline_link() {
        let text = "before ![login form](screenshot1.png) after";
        let refs = scan(text, &MentionSyntax::default());
        assert_eq!(
            kinds(&refs),
            vec![ReferenceKind::InlineLink {
                alt: "login form",
                target: "screenshot1.png"
            }]
        );
        assert_eq!(&text[refs[0].span.clone()], "![login form](screenshot1.png)");
    }

    #[test]
    fn scans_wiki_link() {
        let refs = scan("x ![[screenshot2.jpg]] y", &MentionSyntax::default());
        assert_eq!(
            kinds(&refs),
            vec![ReferenceKind::WikiLink {
                target: "screenshot2.jpg"
            }]
        );
    }

    #[test]
    fn empty_wiki_link_is_not_a_reference() {
        assert!(scan("![[]]", &MentionSyntax::default()).is_empty());
    }

    #[test]
    fn inline_link_with_empty_target() {
        let refs = scan("![a]()", &MentionSyntax::default());
        assert_eq!(
            kinds(&refs),
            vec![ReferenceKind::InlineLink { alt: "a", target: "" }]
        );
    }

    #[test]
    fn plain_links_and_broken_syntax_are_ignored() {
        let refs = scan("[not an image](a.png) ![unterminated(a.png) ![x] (a.png)", &MentionSyntax::default());
        assert!(refs.is_empty());
    }

    #[test]
    fn scans_numbered_mention_to_end_of_line() {
        let refs = scan("Screenshot 2:  the login page \nnext", &MentionSyntax::default());
        assert_eq!(
            kinds(&refs),
            vec![ReferenceKind::NumberedMention {
                number: 2,
                caption: "the login page"
            }]
        );
    }

    #[test]
    fn mention_phrase_must_start_a_word() {
        let syntax = MentionSyntax::default();
        assert!(scan("MyScreenshot 1: x", &syntax).is_empty());
        assert!(scan("see_Screenshot 1: x", &syntax).is_empty());
        assert_eq!(scan("(Screenshot 1: x", &syntax).len(), 1);

        let custom = MentionSyntax::new("Shot").unwrap();
        assert!(scan("Screenshot 1: x", &custom).is_empty());
        assert_eq!(scan("Shot 1: x", &custom).len(), 1);

        let symbol = MentionSyntax::new("#").unwrap();
        assert_eq!(scan("step#  2: x", &symbol).len(), 1);
    }

    #[test]
    fn mention_overlapping_link_is_dropped() {
        let refs = scan("Screenshot 1: see ![a](screenshot1.png)", &MentionSyntax::default());
        assert_eq!(refs.len(), 1);
        assert!(matches!(refs[0].kind, ReferenceKind::InlineLink { .. }));
    }

    #[test]
    fn mixed_references_come_back_in_order() {
        let text = "![[b.png]]\nScreenshot 1: caption\n![a](a.png)";
        let refs = scan(text, &MentionSyntax::default());
        assert_eq!(refs.len(), 3);
        assert!(refs.windows(2).all(|w| w[0].span.end <= w[1].span.start));
    }

    #[test]
    fn custom_phrase_is_escaped_and_configurable() {
        let syntax = MentionSyntax::new("Скриншот").unwrap();
        let refs = scan("Скриншот 3: форма входа", &syntax);
        assert_eq!(
            kinds(&refs),
            vec![ReferenceKind::NumberedMention {
                number: 3,
                caption: "форма входа"
            }]
        );

        let dotted = MentionSyntax::new("Fig.").unwrap();
        assert!(scan("Figx 1: nope", &dotted).is_empty());
        assert_eq!(scan("Fig. 1: yes", &dotted).len(), 1);
    }

    #[test]
    fn case_insensitive_phrase() {
        let syntax = MentionSyntax::case_insensitive("screenshot").unwrap();
        assert_eq!(scan("SCREENSHOT 1: upper", &syntax).len(), 1);
        assert!(scan("SCREENSHOT 1: upper", &MentionSyntax::default()).is_empty());
    }

    #[test]
    fn blank_phrase_is_rejected() {
        assert_eq!(
            MentionSyntax::new("  ").unwrap_err(),
            ResolveError::EmptyMentionPhrase
        );
    }
}
