//! Ordered classification rules (§4.4). The first rule that returns
//! `Some(Classification)` for a symbol wins; `None` falls through to the next
//! rule in the list, and the final entry is always a [`DefaultRule`].

use item_graph::SymbolStats;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Branch,
    Tag,
    Excluded,
}

/// A single ordered rule in the ruleset passed to [`crate::classify::classify_all`].
pub trait SymbolRule: std::fmt::Debug {
    fn classify(&self, stats: &SymbolStats) -> Option<Classification>;
}

/// Matches `regex` and, if so, always returns `classification`.
#[derive(Debug)]
pub struct RegexRule {
    pub regex: Regex,
    pub classification: Classification,
}

impl RegexRule {
    pub fn force_branch(regex: Regex) -> Self {
        Self {
            regex,
            classification: Classification::Branch,
        }
    }

    pub fn force_tag(regex: Regex) -> Self {
        Self {
            regex,
            classification: Classification::Tag,
        }
    }

    pub fn exclude(regex: Regex) -> Self {
        Self {
            regex,
            classification: Classification::Excluded,
        }
    }
}

impl SymbolRule for RegexRule {
    fn classify(&self, stats: &SymbolStats) -> Option<Classification> {
        if self.regex.is_match(&stats.symbol) {
            Some(self.classification)
        } else {
            None
        }
    }
}

/// Branch if the symbol is used as a branch in every file that mentions it,
/// tag if used as a tag everywhere; undecided (mixed usage) otherwise.
#[derive(Debug)]
pub struct UnambiguousUsageRule;

impl SymbolRule for UnambiguousUsageRule {
    fn classify(&self, stats: &SymbolStats) -> Option<Classification> {
        match (stats.branch_file_count, stats.tag_file_count) {
            (b, 0) if b > 0 => Some(Classification::Branch),
            (0, t) if t > 0 => Some(Classification::Tag),
            _ => None,
        }
    }
}

/// Branch if any file has commits on the symbol's branch number.
#[derive(Debug)]
pub struct BranchIfCommitsRule;

impl SymbolRule for BranchIfCommitsRule {
    fn classify(&self, stats: &SymbolStats) -> Option<Classification> {
        if stats.branch_commit_file_count > 0 {
            Some(Classification::Branch)
        } else {
            None
        }
    }
}

/// Branch iff a majority of files that mention the symbol use it as a branch.
#[derive(Debug)]
pub struct HeuristicRule;

impl SymbolRule for HeuristicRule {
    fn classify(&self, stats: &SymbolStats) -> Option<Classification> {
        let total = stats.branch_file_count + stats.tag_file_count;
        if total == 0 {
            return None;
        }
        if stats.branch_file_count * 2 > total {
            Some(Classification::Branch)
        } else {
            Some(Classification::Tag)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Default {
    Branch,
    Tag,
    /// Heuristic is itself sometimes used as the terminal default; kept
    /// distinct from [`HeuristicRule`] so it's always decisive.
    Heuristic,
    Strict,
}

/// The terminal rule. Returns `None` only under `Strict`, which the caller
/// turns into a fatal [`crate::Error::AmbiguousSymbol`].
#[derive(Debug)]
pub struct DefaultRule(pub Default);

impl SymbolRule for DefaultRule {
    fn classify(&self, stats: &SymbolStats) -> Option<Classification> {
        match self.0 {
            Default::Branch => Some(Classification::Branch),
            Default::Tag => Some(Classification::Tag),
            Default::Heuristic => HeuristicRule.classify(stats).or(Some(Classification::Tag)),
            Default::Strict => None,
        }
    }
}
