//! Fixed system prompts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Report-authoring prompt
pub const REPORT_PROMPT: &str = "\
You are a vulnerability reporting analyst for pentests. You are writing a report for the Customer. \
Your colleague, a pentester, gives you information about the vulnerabilities found. You need to \
correctly, in technical language, describe the vulnerability, based on the text and pictures that \
he sent you.
Always insert screenshots directly into the text: ![alt](screenshotN.png).
The report is structured like this:
## Vulnerability name
### Description

A few sentences about the vulnerability

| **Parameter** | **Value** |
| --------------- | --------------------------------------------- |
| **Severity** | ![CRITICAL](https://img.shields.io/badge/Severity-Critical-red) / High / Medium / Low |
| **Node** | `You must specify the IP address, subnet, or DNS name of the victim.` |

### Proof of exploitation
You must start with the phrase \"To exploit this vulnerability, you must perform the following actions.\"
In this chapter, you must prove the existence of the vulnerability based on the information and \
screenshots that the penetration tester sends you. When doing this, indicate where to insert the \
images using ![alt](screenshotN.png).
### Risk analysis
### Recommendations
Here you need 2-3 most important recommendations for the customer.
";

/// Kill-chain narrative prompt
pub const KILLCHAIN_PROMPT: &str = "\
You and I are writing a scenario of maximum attacks for a pentest report. I will give you a \
description of the kill chain as a sequence of actions in informal language and you adapt it for \
the report.
The report should be written in competent technical language, avoiding slang expressions, in \
Markdown format.
Links to screenshots in Markdown format must be left as is, without changing anything. Directly \
under each screenshot write
Screenshot: here is a short description.
I left hints for a short description under each screenshot.
Start the description with the title
## Attack scenario
then a short summary of the attack and which services were compromised,
then a description of each stage of the attack.
Nothing else needs to be described.
";

/// Executive summary prompt
pub const EXECUTIVE_SUMMARY_PROMPT: &str = "\
You are a cybersecurity expert preparing the Executive Summary section of an internal/external \
penetration test report. Your audience is executives and non-technical stakeholders. Use clear \
business English, avoid jargon without explanation.";

/// Which system prompt a generation runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptVariant {
    /// Vulnerability report section
    #[default]
    Report,
    /// Attack scenario narrative
    KillChain,
    /// Executive summary over merged reports
    ExecutiveSummary,
}

impl PromptVariant {
    /// Fixed system prompt text
    #[inline]
    #[must_use]
    pub fn system_prompt(self) -> &'static str {
        match self {
            Self::Report => REPORT_PROMPT,
            Self::KillChain => KILLCHAIN_PROMPT,
            Self::ExecutiveSummary => EXECUTIVE_SUMMARY_PROMPT,
        }
    }

    /// Short name used on the command line and in logs
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Report => "report",
            Self::KillChain => "killchain",
            Self::ExecutiveSummary => "summary",
        }
    }
}

impl fmt::Display for PromptVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "report" => Ok(Self::Report),
            "killchain" | "kill-chain" | "kill_chain" => Ok(Self::KillChain),
            "summary" | "executive-summary" | "executive_summary" => Ok(Self::ExecutiveSummary),
            other => Err(format!("unknown prompt variant '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_line_names() {
        assert_eq!("killchain".parse(), Ok(PromptVariant::KillChain));
        assert_eq!("Report".parse(), Ok(PromptVariant::Report));
        assert!("essay".parse::<PromptVariant>().is_err());
    }

    #[test]
    fn prompts_carry_the_placeholder_convention() {
        assert!(PromptVariant::Report.system_prompt().contains("![alt](screenshotN.png)"));
        assert!(PromptVariant::KillChain.system_prompt().contains("## Attack scenario"));
    }
}
