//! Rename propagation
//!
//! After the registry renumbers, text written against the old names must be
//! rewritten. Only the parenthesized spelling `(old)` is touched, so prose
//! that happens to mention a name stays as it is.

use std::collections::HashMap;

/// Replace every `(old)` with `(new)` for each rename pair
///
/// All pairs apply simultaneously in a single scan: swapping two names
/// (`a -> b`, `b -> a`) exchanges them instead of collapsing both onto one.
#[must_use]
pub fn propagate_rename<I, K, V>(text: &str, renames: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let renames: HashMap<String, String> = renames
        .into_iter()
        .map(|(old, new)| (old.as_ref().to_string(), new.as_ref().to_string()))
        .filter(|(old, new)| old != new)
        .collect();
    if renames.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    let mut replaced = 0usize;

    while let Some(rel) = text[pos..].find('(') {
        let open = pos + rel;
        out.push_str(&text[pos..open]);

        let inner_start = open + 1;
        let stop = text[inner_start..].find([')', '(', '\n']);
        match stop {
            Some(len) if text[inner_start + len..].starts_with(')') => {
                let inner = &text[inner_start..inner_start + len];
                let close = inner_start + len + 1;
                match renames.get(inner) {
                    Some(new) => {
                        out.push('(');
                        out.push_str(new);
                        out.push(')');
                        replaced += 1;
                    }
                    None => out.push_str(&text[open..close]),
                }
                pos = close;
            }
            _ => {
                out.push('(');
                pos = inner_start;
            }
        }
    }
    out.push_str(&text[pos..]);

    tracing::debug!(renames = renames.len(), replaced, "renames propagated");
    out
}
