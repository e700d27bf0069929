//! Reference resolution
//!
//! Rewrites every reference found by [`scan`](crate::scan::scan) into its
//! final target. Resolution runs per syntax over the scanned references:
//! 1. inline links, in document order
//! 2. wiki links, in document order
//! 3. numbered mentions
//!
//! Links whose name matches nothing take the next target of a fallback
//! iterator built fresh for each call, so several broken links consume
//! successive screenshots instead of all landing on the first one.

use crate::mapping::ReferenceMapping;
use crate::scan::{scan, MentionSyntax, Reference, ReferenceKind};

/// Resolve references with the default mention syntax
#[must_use]
pub fn resolve(text: &str, mapping: &ReferenceMapping) -> String {
    resolve_with(text, mapping, &MentionSyntax::default())
}

/// Resolve references in `text` using `mapping`
///
/// Targets that are already resolved (a `data:` URI or one of the
/// mapping's own targets) are left alone, which makes the function a no-op
/// on its own output for those references.
#[must_use]
pub fn resolve_with(text: &str, mapping: &ReferenceMapping, mentions: &MentionSyntax) -> String {
    let refs = scan(text, mentions);
    if refs.is_empty() {
        return text.to_string();
    }

    let mut rewrites: Vec<Option<String>> = vec![None; refs.len()];
    let mut fallback = mapping.fallback();

    for (idx, reference) in refs.iter().enumerate() {
        if let ReferenceKind::InlineLink { alt, target } = reference.kind {
            rewrites[idx] = lookup_link(target, mapping, true)
                .or_else(|| fallback_for(target, mapping, &mut fallback))
                .map(|resolved| format!("![{alt}]({resolved})"));
        }
    }

    for (idx, reference) in refs.iter().enumerate() {
        if let ReferenceKind::WikiLink { target } = reference.kind {
            rewrites[idx] = lookup_link(target, mapping, false)
                .or_else(|| fallback_for(target, mapping, &mut fallback))
                .map(|resolved| format!("![[{resolved}]]"));
        }
    }

    for (idx, reference) in refs.iter().enumerate() {
        if let ReferenceKind::NumberedMention { number, caption } = reference.kind {
            rewrites[idx] = mapping
                .target_at(number)
                .map(|resolved| format!("![{caption}]({resolved})"));
        }
    }

    let resolved = rewrites.iter().filter(|r| r.is_some()).count();
    tracing::debug!(references = refs.len(), resolved, "references resolved");

    splice(text, &refs, rewrites)
}

/// Exact name first, then (optionally) the base filename of a URL or path
fn lookup_link<'m>(target: &str, mapping: &'m ReferenceMapping, by_basename: bool) -> Option<&'m str> {
    if let Some(found) = mapping.target(target) {
        return Some(found);
    }
    if by_basename {
        let base = basename(target);
        if base != target {
            return mapping.target(base);
        }
    }
    None
}

fn fallback_for<'m>(
    target: &str,
    mapping: &ReferenceMapping,
    fallback: &mut impl Iterator<Item = &'m str>,
) -> Option<&'m str> {
    if is_resolved(target, mapping) {
        return None;
    }
    fallback.next()
}

#[inline]
fn is_resolved(target: &str, mapping: &ReferenceMapping) -> bool {
    target.starts_with("data:") || mapping.is_target(target)
}

/// Last path segment of a URL or path, ignoring query and fragment
fn basename(target: &str) -> &str {
    let without_scheme = match target.find("://") {
        Some(idx) => {
            let rest = &target[idx + 3..];
            // Drop the authority; what remains is the path.
            rest.find('/').map_or("", |slash| &rest[slash..])
        }
        None => target,
    };
    let path = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or(without_scheme);
    path.rsplit('/').next().unwrap_or(path)
}

fn splice(text: &str, refs: &[Reference<'_>], rewrites: Vec<Option<String>>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (reference, rewrite) in refs.iter().zip(rewrites) {
        out.push_str(&text[cursor..reference.span.start]);
        match rewrite {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(&text[reference.span.clone()]),
        }
        cursor = reference.span.end;
    }
    out.push_str(&text[cursor..]);
    out
}
