//! Repair feedback synthesis.
//!
//! After a failed turn the pipeline sends the generation role a single,
//! bounded directive describing the most actionable line of the failure,
//! never the raw diagnostic stream. Consecutive identical failures in the
//! same category are suppressed so a stuck role is not nagged forever.

use crate::conversation::Role;
use crate::markers::{FIELD_REASON, extract_field};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Failure category, derived from the role that produced the failing turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    Compile,
    Execute,
    Validate,
}

impl FailureCategory {
    /// Maps a worker role to its failure category.
    pub fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::Build => Some(Self::Compile),
            Role::Run => Some(Self::Execute),
            Role::Validate => Some(Self::Validate),
            Role::Generate | Role::Moderator => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::Execute => "execution",
            Self::Validate => "validation",
        }
    }

    /// Keywords that mark a line as the likely root cause for this category.
    fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Compile => &["error", "warning"],
            Self::Execute => &["exception", "error", "timed out", "exit code"],
            Self::Validate => &["reason", "expected", "mismatch"],
        }
    }
}

static COMPILER_DIAGNOSTIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\berror\s+[A-Z]+\d+\b|:\s*error\b").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Synthesizes deduplicated repair directives from failure turns.
#[derive(Debug)]
pub struct RepairSynthesizer {
    /// Last normalized failure text per category, for dedup.
    last_seen: HashMap<FailureCategory, String>,
    max_len: usize,
}

impl RepairSynthesizer {
    pub fn new(max_len: usize) -> Self {
        Self {
            last_seen: HashMap::new(),
            max_len,
        }
    }

    /// Produces a directive for the generation role, or `None` when the
    /// failure is a textual repeat of the last one in its category.
    pub fn synthesize(&mut self, category: FailureCategory, failure_text: &str) -> Option<String> {
        let line = representative_line(category, failure_text)?;
        let normalized = self.normalize(&line);

        if self.last_seen.get(&category).map(String::as_str) == Some(normalized.as_str()) {
            tracing::debug!(category = category.label(), "suppressing duplicate repair directive");
            return None;
        }
        self.last_seen.insert(category, normalized.clone());

        Some(format!(
            "Fix the following {} failure and emit a corrected program: {}",
            category.label(),
            normalized
        ))
    }

    fn normalize(&self, line: &str) -> String {
        let collapsed = WHITESPACE.replace_all(line.trim(), " ").into_owned();
        if collapsed.len() > self.max_len {
            let mut cut = self.max_len;
            while !collapsed.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{}...", &collapsed[..cut])
        } else {
            collapsed
        }
    }
}

/// Picks the single most actionable line from a failure report.
///
/// Preference order: an explicitly labeled `reason:` line, a line matching
/// a compiler diagnostic pattern, a line containing a category keyword,
/// and finally the first informative line.
fn representative_line(category: FailureCategory, text: &str) -> Option<String> {
    if let Some(reason) = extract_field(text, FIELD_REASON) {
        if !reason.is_empty() {
            return Some(reason.to_string());
        }
    }

    let informative = |line: &&str| {
        let trimmed = line.trim();
        !trimmed.is_empty() && !is_marker_line(trimmed)
    };

    if category == FailureCategory::Compile {
        if let Some(line) = text
            .lines()
            .filter(informative)
            .find(|l| COMPILER_DIAGNOSTIC.is_match(l))
        {
            return Some(line.trim().to_string());
        }
    }

    let lower_keywords = category.keywords();
    if let Some(line) = text.lines().filter(informative).find(|l| {
        let lower = l.to_lowercase();
        lower_keywords.iter().any(|k| lower.contains(k))
    }) {
        return Some(line.trim().to_string());
    }

    text.lines().find(informative).map(|l| l.trim().to_string())
}

fn is_marker_line(line: &str) -> bool {
    use crate::markers as m;
    [
        m::BUILD_FAILED,
        m::BUILD_SUCCEEDED,
        m::RUN_FAILED,
        m::RUN_SUCCEEDED,
        m::VALIDATION_FAILED,
        m::VALIDATION_PASSED,
        m::CODE_READY,
    ]
    .iter()
    .any(|marker| line == *marker)
}
