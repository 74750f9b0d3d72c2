//! Console log filtering and error categorization. No I/O.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

use crate::console::{ConsoleLevel, ConsoleLogEntry, ConsoleSummary};

/// How a pattern is matched against a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    /// Case-insensitive substring
    #[default]
    Contains,
    Regex,
}

/// A pattern compiled for repeated matching
#[derive(Debug, Clone)]
pub enum Matcher {
    Exact(String),
    Contains(String),
    Regex(Regex),
}

impl Matcher {
    /// Compile `pattern`; an invalid regex falls back to substring matching
    pub fn new(pattern: &str, mode: MatchMode) -> Self {
        Self::try_new(pattern, mode).unwrap_or_else(|e| {
            warn!("Invalid regex '{}', matching as substring: {}", pattern, e);
            Matcher::Contains(pattern.to_lowercase())
        })
    }

    /// Compile `pattern`, failing on an invalid regex
    pub fn try_new(pattern: &str, mode: MatchMode) -> std::result::Result<Self, regex::Error> {
        Ok(match mode {
            MatchMode::Exact => Matcher::Exact(pattern.to_string()),
            MatchMode::Contains => Matcher::Contains(pattern.to_lowercase()),
            MatchMode::Regex => Matcher::Regex(Regex::new(pattern)?),
        })
    }

    pub fn is_match(&self, message: &str) -> bool {
        match self {
            Matcher::Exact(p) => message == p,
            Matcher::Contains(p) => message.to_lowercase().contains(p.as_str()),
            Matcher::Regex(re) => re.is_match(message),
        }
    }
}

/// Entries split by whether they matched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterResult {
    pub matches: Vec<ConsoleLogEntry>,
    pub non_matches: Vec<ConsoleLogEntry>,
    pub total: usize,
}

/// Error category, in classification priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Cors,
    Network,
    Script,
    Resource,
    Other,
}

const CORS_KEYWORDS: &[&str] = &[
    "cors",
    "cross-origin",
    "access-control-allow-origin",
    "same origin policy",
];
const NETWORK_KEYWORDS: &[&str] = &[
    "net::err",
    "network",
    "failed to fetch",
    "econnrefused",
    "connection refused",
    "timed out",
    "timeout",
    "dns",
];
const SCRIPT_KEYWORDS: &[&str] = &[
    "uncaught",
    "typeerror",
    "referenceerror",
    "syntaxerror",
    "rangeerror",
    "is not defined",
    "is not a function",
    "cannot read propert",
];
const RESOURCE_KEYWORDS: &[&str] = &[
    "failed to load resource",
    "404",
    "not found",
    "refused to load",
    "mime type",
    "could not load",
];

impl ErrorCategory {
    /// First matching category wins; CORS is checked before network.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let hit = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));
        if hit(CORS_KEYWORDS) {
            ErrorCategory::Cors
        } else if hit(NETWORK_KEYWORDS) {
            ErrorCategory::Network
        } else if hit(SCRIPT_KEYWORDS) {
            ErrorCategory::Script
        } else if hit(RESOURCE_KEYWORDS) {
            ErrorCategory::Resource
        } else {
            ErrorCategory::Other
        }
    }
}

/// Entries grouped by category; each entry appears exactly once
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategorizedErrors {
    pub network: Vec<ConsoleLogEntry>,
    pub script: Vec<ConsoleLogEntry>,
    pub resource: Vec<ConsoleLogEntry>,
    pub cors: Vec<ConsoleLogEntry>,
    pub other: Vec<ConsoleLogEntry>,
}

impl CategorizedErrors {
    pub fn counts(&self) -> CategoryCounts {
        CategoryCounts {
            network: self.network.len(),
            script: self.script.len(),
            resource: self.resource.len(),
            cors: self.cors.len(),
            other: self.other.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub network: usize,
    pub script: usize,
    pub resource: usize,
    pub cors: usize,
    pub other: usize,
}

/// Pattern and level based console filtering
pub struct ErrorFilter;

impl ErrorFilter {
    pub fn filter_by_pattern(entries: &[ConsoleLogEntry], pattern: &str, mode: MatchMode) -> FilterResult {
        Self::filter_by_patterns(entries, &[pattern], mode)
    }

    /// An entry matches when any pattern matches its message
    pub fn filter_by_patterns<S: AsRef<str>>(
        entries: &[ConsoleLogEntry],
        patterns: &[S],
        mode: MatchMode,
    ) -> FilterResult {
        let matchers: Vec<Matcher> = patterns.iter().map(|p| Matcher::new(p.as_ref(), mode)).collect();
        let (matches, non_matches): (Vec<_>, Vec<_>) = entries
            .iter()
            .cloned()
            .partition(|e| matchers.iter().any(|m| m.is_match(&e.message)));
        FilterResult {
            matches,
            non_matches,
            total: entries.len(),
        }
    }

    pub fn filter_by_level(entries: &[ConsoleLogEntry], levels: &[ConsoleLevel]) -> Vec<ConsoleLogEntry> {
        entries
            .iter()
            .filter(|e| levels.contains(&e.level))
            .cloned()
            .collect()
    }

    pub fn categorize_errors(entries: &[ConsoleLogEntry]) -> CategorizedErrors {
        let mut out = CategorizedErrors::default();
        for entry in entries {
            let bucket = match ErrorCategory::classify(&entry.message) {
                ErrorCategory::Cors => &mut out.cors,
                ErrorCategory::Network => &mut out.network,
                ErrorCategory::Script => &mut out.script,
                ErrorCategory::Resource => &mut out.resource,
                ErrorCategory::Other => &mut out.other,
            };
            bucket.push(entry.clone());
        }
        out
    }

    /// Summary over `entries`; categories cover error-level entries only
    pub fn generate_summary(entries: &[ConsoleLogEntry], include_categories: bool) -> ConsoleSummary {
        let mut by_level: BTreeMap<ConsoleLevel, usize> =
            ConsoleLevel::ALL.iter().map(|&l| (l, 0)).collect();
        for entry in entries {
            *by_level.entry(entry.level).or_default() += 1;
        }

        let errors = Self::filter_by_level(entries, &[ConsoleLevel::Error]);
        let warnings = Self::filter_by_level(entries, &[ConsoleLevel::Warn]);

        ConsoleSummary {
            total: entries.len(),
            error_count: errors.len(),
            warning_count: warnings.len(),
            unique_errors: unique_messages(&errors),
            unique_warnings: unique_messages(&warnings),
            error_categories: include_categories.then(|| Self::categorize_errors(&errors).counts()),
            by_level,
        }
    }

    /// Drop entries matching any allowed (known-noisy) pattern
    pub fn filter_allowed_patterns<S: AsRef<str>>(
        entries: &[ConsoleLogEntry],
        allowed: &[S],
        mode: MatchMode,
    ) -> Vec<ConsoleLogEntry> {
        if allowed.is_empty() {
            return entries.to_vec();
        }
        Self::filter_by_patterns(entries, allowed, mode).non_matches
    }

    /// Entries matching any forbidden pattern
    pub fn filter_forbidden_patterns<S: AsRef<str>>(
        entries: &[ConsoleLogEntry],
        forbidden: &[S],
        mode: MatchMode,
    ) -> Vec<ConsoleLogEntry> {
        Self::filter_by_patterns(entries, forbidden, mode).matches
    }
}

/// Distinct messages in first-seen order
fn unique_messages(entries: &[ConsoleLogEntry]) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| seen.insert(e.message.as_str()))
        .map(|e| e.message.clone())
        .collect()
}
