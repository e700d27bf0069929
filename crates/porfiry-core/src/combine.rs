//! Combining finished reports
//!
//! Several saved or exported reports are merged into one document, from
//! which two extra chapters are derived:
//! - vulnerability statistics: `## <title>` sections grouped by the
//!   severity badge found inside them
//! - an executive summary written by the model
//!
//! Embedded screenshots are stripped before either is computed.

use crate::message::ChatMessage;
use crate::orchestrator::AssemblyRequest;
use crate::prompt::PromptVariant;
use once_cell::sync::Lazy;
use porfiry_refs::strip_embedded_images;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

/// Lead-in placed before the merged findings in a summary request
pub const SUMMARY_LEAD_IN: &str = "Below are the vulnerabilities found\n\n";

/// Heading of the rendered statistics chapter
pub const STATISTICS_HEADING: &str = "## Vulnerability Statistics\n\n";

/// Join report documents with a blank line between them
#[must_use]
pub fn merge_reports<I, S>(documents: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut merged = String::new();
    for (idx, doc) in documents.into_iter().enumerate() {
        if idx > 0 {
            merged.push_str("\n\n");
        }
        merged.push_str(doc.as_ref());
    }
    merged
}

/// Merge and drop embedded `data:image` screenshots
#[must_use]
pub fn merge_without_images<I, S>(documents: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    strip_embedded_images(&merge_reports(documents))
}

/// Model request for an executive summary of `documents`
#[must_use]
pub fn executive_summary_request<I, S>(documents: I) -> AssemblyRequest
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let findings = merge_without_images(documents);
    AssemblyRequest::new(
        PromptVariant::ExecutiveSummary,
        vec![ChatMessage::user(format!("{SUMMARY_LEAD_IN}{findings}"))],
        Vec::new(),
    )
}

/// Finding severity, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Critical
    Critical,
    /// High
    High,
    /// Medium
    Medium,
    /// Low
    Low,
}

impl Severity {
    /// All severities, highest first
    pub const ALL: [Self; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];

    /// Capitalized name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    /// Parse a badge label in any letter case
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finding titles grouped by severity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VulnerabilityStats {
    groups: BTreeMap<Severity, Vec<String>>,
}

impl VulnerabilityStats {
    /// Number of findings with `severity`
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.groups.get(&severity).map_or(0, Vec::len)
    }

    /// Titles of findings with `severity`, in document order
    #[must_use]
    pub fn titles(&self, severity: Severity) -> &[String] {
        self.groups.get(&severity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of classified findings
    #[must_use]
    pub fn total(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Count table followed by the grouped title lists
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let [c, h, m, l] = Severity::ALL.map(|s| self.count(s));
        let table = format!(
            "| Critical | High | Medium | Low |\n\
             | ------------ | ------- | ------- | ------ |\n\
             | {c} | {h} | {m} | {l} |\n"
        );

        let mut lines = Vec::new();
        for severity in Severity::ALL {
            lines.push(format!("\n**{severity} - {}**", self.count(severity)));
            lines.extend(self.titles(severity).iter().map(|title| format!("- {title}")));
        }
        format!("{table}\n{}", lines.join("\n"))
    }

    /// Full chapter with its heading
    #[must_use]
    pub fn render(&self) -> String {
        format!("{STATISTICS_HEADING}{}", self.to_markdown())
    }
}

/// `## <title>` line; the title has no surrounding blanks
static HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^##[ \t]+([^\r\n]*[^\s])[ \t\r]*$").expect("heading pattern is valid")
});

/// `![LEVEL]` badge alt text or `Severity-Level` URL segment
static SEVERITY_MARK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)!\[([A-Za-z]+)\]|severity-([A-Za-z]+)").expect("severity pattern is valid")
});

/// Group the `## ` sections of `markdown` by severity
///
/// A section runs to the next level-two heading. Its severity is the first
/// recognised `![LEVEL]` badge alt text or `Severity-Level` URL segment;
/// sections without one are not counted.
#[must_use]
pub fn parse_statistics(markdown: &str) -> VulnerabilityStats {
    let mut stats = VulnerabilityStats::default();
    let headings: Vec<_> = HEADING.captures_iter(markdown).collect();

    for (idx, caps) in headings.iter().enumerate() {
        let (Some(line), Some(title)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let body_end = headings
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map_or(markdown.len(), |next| next.start());
        match find_severity(&markdown[line.end()..body_end]) {
            Some(severity) => stats.groups.entry(severity).or_default().push(title.as_str().to_string()),
            None => tracing::debug!(title = title.as_str(), "section without severity skipped"),
        }
    }
    stats
}

fn find_severity(section: &str) -> Option<Severity> {
    SEVERITY_MARK.captures_iter(section).find_map(|caps| {
        let label = caps.get(1).or_else(|| caps.get(2))?;
        Severity::from_label(label.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use pretty_assertions::assert_eq;

    const REPORTS: [&str; 2] = [
        "## SQL injection\n### Description\n\n| **Severity** | ![CRITICAL](https://img.shields.io/badge/Severity-Critical-red) |\n\n\
         ![proof](data:image/png;base64,AAAA)\n\n## Missing headers\nSeverity-low only in a URL\n",
        "## Verbose errors\n![login](screenshot1.png)\n![Medium](badge)\n\n## Notes\nnothing rated here\n",
    ];

    #[test]
    fn merges_with_blank_line_and_strips_images() {
        assert_eq!(merge_reports(["a", "b"]), "a\n\nb");
        let merged = merge_without_images(REPORTS);
        assert!(!merged.contains("data:image"));
        assert!(merged.contains("![login](screenshot1.png)"));
    }

    #[test]
    fn groups_sections_by_first_recognised_badge() {
        let stats = parse_statistics(&merge_reports(REPORTS));

        assert_eq!(stats.titles(Severity::Critical), ["SQL injection".to_string()]);
        assert_eq!(stats.titles(Severity::Low), ["Missing headers".to_string()]);
        assert_eq!(stats.titles(Severity::Medium), ["Verbose errors".to_string()]);
        assert_eq!(stats.count(Severity::High), 0);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn deeper_headings_stay_inside_their_section() {
        let stats = parse_statistics("## Weak TLS\n### Details\nSeverity-High\n###Not a heading\n");
        assert_eq!(stats.titles(Severity::High), ["Weak TLS".to_string()]);
    }

    #[test]
    fn renders_table_and_groups() {
        let stats = parse_statistics(&merge_reports(REPORTS));
        let expected = "## Vulnerability Statistics\n\n\
            | Critical | High | Medium | Low |\n\
            | ------------ | ------- | ------- | ------ |\n\
            | 1 | 0 | 1 | 1 |\n\
            \n\
            \n**Critical - 1**\n\
            - SQL injection\n\
            \n**High - 0**\n\
            \n**Medium - 1**\n\
            - Verbose errors\n\
            \n**Low - 1**\n\
            - Missing headers";
        assert_eq!(stats.render(), expected);
    }

    #[test]
    fn summary_request_carries_findings_without_images() {
        let request = executive_summary_request(REPORTS);
        assert_eq!(request.variant, PromptVariant::ExecutiveSummary);
        assert!(request.screenshots.is_empty());
        assert_eq!(request.history.len(), 1);
        assert_eq!(request.history[0].role, Role::User);
        assert!(request.history[0].content.starts_with(SUMMARY_LEAD_IN));
        assert!(!request.history[0].content.contains("base64"));
    }

    #[test]
    fn heading_titles_are_trimmed_and_need_a_blank() {
        let stats = parse_statistics("##Glued ![High]\n##   Open redirect  \r\n![low](badge)\n## \n![Critical]\n");
        assert_eq!(stats.titles(Severity::Low), ["Open redirect".to_string()]);
        assert_eq!(stats.count(Severity::Critical), 0);
        assert_eq!(stats.count(Severity::High), 0);
    }

    #[test]
    fn severity_labels_ignore_case() {
        assert_eq!(Severity::from_label("CRITICAL"), Some(Severity::Critical));
        assert_eq!(Severity::from_label("info"), None);
    }
}
