// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Trace filtering

use super::event::{ApiCategory, TraceEvent};

/// Filter rule for trace events
#[derive(Debug, Clone)]
pub enum FilterRule {
    /// Include all events
    All,
    /// Include only specific function names (exact match)
    Function(Vec<String>),
    /// Include functions matching a pattern (simple wildcard: * and ?)
    Pattern(String),
    /// Include only specific categories
    Category(Vec<ApiCategory>),
}

impl FilterRule {
    fn matches(&self, event: &TraceEvent) -> bool {
        match self {
            FilterRule::All => true,
            FilterRule::Function(names) => names.iter().any(|name| name == &event.function),
            FilterRule::Pattern(pattern) => matches_pattern(&event.function, pattern),
            FilterRule::Category(categories) => categories.contains(&event.category),
        }
    }
}

/// Trace filter configuration
#[derive(Debug, Clone)]
pub struct TraceFilter {
    rules: Vec<FilterRule>,
}

impl Default for TraceFilter {
    fn default() -> Self {
        Self {
            rules: vec![FilterRule::All],
        }
    }
}

impl TraceFilter {
    /// Create a new filter that includes all events
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter rule
    #[must_use]
    pub fn add_rule(mut self, rule: FilterRule) -> Self {
        // The first explicit rule replaces the implicit catch-all
        if self.rules.len() == 1 && matches!(self.rules[0], FilterRule::All) {
            self.rules.clear();
        }
        self.rules.push(rule);
        self
    }

    /// An event is traced if any rule matches it
    pub fn should_trace(&self, event: &TraceEvent) -> bool {
        self.rules.is_empty() || self.rules.iter().any(|rule| rule.matches(event))
    }
}

/// Wildcard match where `*` spans any run of characters and `?` exactly one.
///
/// Iterative with single-star backtracking, so it runs in O(text * pattern).
fn matches_pattern(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            // Let the last star swallow one more character
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, t));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
