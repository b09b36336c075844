//! Symbol name cleaning and the user-supplied rename transform.
//!
//! The CLI surface (§6) accepts an ordered list of `P:S` rules, where `P` is a
//! regex and `S` a replacement template using the `regex` crate's
//! backreference syntax (`$1`, `${1}`). The first rule whose pattern matches
//! wins; later rules are not consulted. A name with no matching rule passes
//! through unchanged. Because only the first match applies and transforms are
//! expected to move names out of their own pattern's matching set (e.g.
//! `^RELEASE_(.*)$` -> `rel-$1`), applying the same rule list twice is a
//! no-op for any name produced by a first application — this is exercised in
//! `tests/idempotence.rs`.

use regex::Regex;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct RenameRule {
    pattern: Regex,
    replacement: String,
}

impl RenameRule {
    /// Parses a single `P:S` rule as accepted on the CLI (`--symbol-rename`
    /// in an options file list, see §10).
    pub fn parse(spec: &str) -> Result<Self> {
        let (pattern, replacement) = spec.split_once(':').ok_or_else(|| Error::BadTransform {
            pattern: spec.to_string(),
            source: regex::Error::Syntax("expected PATTERN:REPLACEMENT".into()),
        })?;

        let pattern = Regex::new(pattern).map_err(|source| Error::BadTransform {
            pattern: spec.to_string(),
            source,
        })?;

        Ok(Self {
            pattern,
            replacement: replacement.to_string(),
        })
    }

    fn apply(&self, name: &str) -> Option<String> {
        if self.pattern.is_match(name) {
            Some(self.pattern.replace(name, self.replacement.as_str()).into_owned())
        } else {
            None
        }
    }
}

/// Applies an ordered list of rename rules to a cleaned symbol name,
/// returning the first match's replacement, or the input unchanged if no
/// rule matches.
pub fn rename(name: &str, rules: &[RenameRule]) -> String {
    for rule in rules {
        if let Some(renamed) = rule.apply(name) {
            return renamed;
        }
    }
    name.to_string()
}

/// Cleans a raw CVS symbol name into something safe to use as an SVN path
/// component: CVS allows characters (e.g. `/`) that would otherwise be
/// interpreted as path separators once the symbol becomes a `branches/NAME`
/// or `tags/NAME` directory.
pub fn clean(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_path_hostile_characters() {
        assert_eq!(clean("release/1.0"), "release_1.0");
    }

    #[test]
    fn renames_with_backreference() {
        let rules = vec![RenameRule::parse("^RELEASE_(.*)$:rel-$1").unwrap()];
        assert_eq!(rename("RELEASE_1_0", &rules), "rel-1_0");
        assert_eq!(rename("UNRELATED", &rules), "UNRELATED");
    }

    #[test]
    fn rename_is_idempotent_once_out_of_pattern() {
        let rules = vec![RenameRule::parse("^RELEASE_(.*)$:rel-$1").unwrap()];
        let once = rename("RELEASE_1_0", &rules);
        let twice = rename(&once, &rules);
        assert_eq!(once, twice);
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = vec![
            RenameRule::parse("^A_(.*)$:first-$1").unwrap(),
            RenameRule::parse("^A_(.*)$:second-$1").unwrap(),
        ];
        assert_eq!(rename("A_x", &rules), "first-x");
    }
}
