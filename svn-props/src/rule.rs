//! The ordered property rules applied to every added or changed path (§4.9).
//! Each rule may set a property it owns; per the design, a later rule may
//! override an earlier one's value for a property it defines, but must not
//! clear a property it doesn't own.

use std::collections::BTreeMap;

use globset::{Glob, GlobBuilder, GlobMatcher};

use crate::sniff;

pub type Properties = BTreeMap<String, String>;

pub const PROP_EXECUTABLE: &str = "svn:executable";
pub const PROP_MIME_TYPE: &str = "svn:mime-type";
pub const PROP_EOL_STYLE: &str = "svn:eol-style";
pub const PROP_KEYWORDS: &str = "svn:keywords";

/// Everything a rule needs to decide what to set, gathered once per path by
/// the caller (the output pass already has the executable bit and a content
/// sample on hand from the revision reader).
pub struct FileContext<'a> {
    pub path: &'a [u8],
    pub executable: bool,
    /// A content sample, when the file is being added or changed; absent
    /// for paths visited only to decide whether they're already covered
    /// (e.g. during a symbol fill's directory copy).
    pub sample: Option<&'a [u8]>,
}

pub trait PropertyRule: Send + Sync {
    fn apply(&self, ctx: &FileContext, props: &mut Properties);
}

/// Sets `svn:executable` from the RCS/filesystem executable bit.
pub struct ExecutableRule;

impl PropertyRule for ExecutableRule {
    fn apply(&self, ctx: &FileContext, props: &mut Properties) {
        if ctx.executable {
            props.insert(PROP_EXECUTABLE.to_string(), "*".to_string());
        }
    }
}

/// Sets `svn:mime-type` to `application/octet-stream` when the content
/// sample looks binary and no mime type has been set yet.
pub struct BinarySniffRule;

impl PropertyRule for BinarySniffRule {
    fn apply(&self, ctx: &FileContext, props: &mut Properties) {
        if props.contains_key(PROP_MIME_TYPE) {
            return;
        }
        if let Some(sample) = ctx.sample {
            if sniff::looks_binary(sample) {
                props.insert(PROP_MIME_TYPE.to_string(), "application/octet-stream".to_string());
            }
        }
    }
}

/// Looks up `svn:mime-type` from a user-supplied `mime.types` table, tried
/// before the `mime_guess` fallback (§4.9: "mime.types lookup" precedes the
/// built-in table in the rule order).
pub struct MimeTypesTableRule {
    table: BTreeMap<String, String>,
}

impl MimeTypesTableRule {
    pub fn new(table: std::collections::HashMap<String, String>) -> Self {
        Self {
            table: table.into_iter().collect(),
        }
    }
}

impl PropertyRule for MimeTypesTableRule {
    fn apply(&self, ctx: &FileContext, props: &mut Properties) {
        if props.contains_key(PROP_MIME_TYPE) {
            return;
        }
        let path = String::from_utf8_lossy(ctx.path);
        let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
        if let Some(mime) = self.table.get(&ext) {
            props.insert(PROP_MIME_TYPE.to_string(), mime.clone());
        }
    }
}

/// Looks up `svn:mime-type` from the path's extension via `mime_guess`,
/// unless a prior rule already decided the file is binary.
pub struct MimeTypeRule;

impl PropertyRule for MimeTypeRule {
    fn apply(&self, ctx: &FileContext, props: &mut Properties) {
        if props.contains_key(PROP_MIME_TYPE) {
            return;
        }
        let path = String::from_utf8_lossy(ctx.path);
        if let Some(guess) = mime_guess::from_path(path.as_ref()).first() {
            props.insert(PROP_MIME_TYPE.to_string(), guess.essence_str().to_string());
        }
    }
}

/// One `auto-props` table entry: a glob pattern and the properties it sets
/// on a matching path.
pub struct AutoPropsEntry {
    pattern: String,
    matcher: GlobMatcher,
    props: Vec<(String, String)>,
}

impl AutoPropsEntry {
    pub fn new(pattern: &str, props: Vec<(String, String)>, case_insensitive: bool) -> crate::Result<Self> {
        let glob = if case_insensitive {
            GlobBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| crate::Error::BadPattern {
                    pattern: pattern.to_string(),
                    source,
                })?
        } else {
            Glob::new(pattern).map_err(|source| crate::Error::BadPattern {
                pattern: pattern.to_string(),
                source,
            })?
        };

        Ok(Self {
            pattern: pattern.to_string(),
            matcher: glob.compile_matcher(),
            props,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// Matches a path's basename against an ordered list of glob patterns,
/// setting whatever properties the first matching entry defines. Mirrors
/// Subversion's own `auto-props` semantics: first match wins per property.
pub struct AutoPropsRule {
    entries: Vec<AutoPropsEntry>,
}

impl AutoPropsRule {
    pub fn new(entries: Vec<AutoPropsEntry>) -> Self {
        Self { entries }
    }
}

impl PropertyRule for AutoPropsRule {
    fn apply(&self, ctx: &FileContext, props: &mut Properties) {
        let path = String::from_utf8_lossy(ctx.path);
        let basename = path.rsplit('/').next().unwrap_or(&path);
        for entry in &self.entries {
            if entry.matcher.is_match(basename) {
                for (key, value) in &entry.props {
                    props.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
        }
    }
}

/// Sets `svn:eol-style` to `native` for any path classified as a `text/*`
/// mime type (or with no mime type at all, i.e. presumed text) that isn't
/// already binary and doesn't already carry an eol-style.
pub struct EolStyleRule;

impl PropertyRule for EolStyleRule {
    fn apply(&self, _ctx: &FileContext, props: &mut Properties) {
        if props.contains_key(PROP_EOL_STYLE) {
            return;
        }
        let is_text = match props.get(PROP_MIME_TYPE) {
            Some(mime) => mime.starts_with("text/"),
            None => true,
        };
        if is_text {
            props.insert(PROP_EOL_STYLE.to_string(), "native".to_string());
        }
    }
}

/// Unconditional fallback for paths the mime-type rule left without an
/// eol-style (§4.9: "default eol-style" runs after "eol-style from
/// mime-type" in the rule order). A blank `default` leaves the property
/// unset, matching `--default-eol=""`.
pub struct DefaultEolRule {
    default: String,
}

impl DefaultEolRule {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
        }
    }
}

impl PropertyRule for DefaultEolRule {
    fn apply(&self, _ctx: &FileContext, props: &mut Properties) {
        if props.contains_key(PROP_EOL_STYLE) || self.default.is_empty() {
            return;
        }
        props.insert(PROP_EOL_STYLE.to_string(), self.default.clone());
    }
}

/// Sets `svn:keywords` to `Id` for paths matching the configured patterns,
/// unless a keywords property has already been assigned.
pub struct KeywordsRule {
    entries: Vec<AutoPropsEntry>,
}

impl KeywordsRule {
    pub fn new(entries: Vec<AutoPropsEntry>) -> Self {
        Self { entries }
    }
}

impl PropertyRule for KeywordsRule {
    fn apply(&self, ctx: &FileContext, props: &mut Properties) {
        if props.contains_key(PROP_KEYWORDS) {
            return;
        }
        let path = String::from_utf8_lossy(ctx.path);
        let basename = path.rsplit('/').next().unwrap_or(&path);
        for entry in &self.entries {
            if entry.matcher.is_match(basename) {
                props.insert(PROP_KEYWORDS.to_string(), "Id".to_string());
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(path: &'a [u8], executable: bool, sample: Option<&'a [u8]>) -> FileContext<'a> {
        FileContext { path, executable, sample }
    }

    #[test]
    fn executable_rule_sets_star() {
        let mut props = Properties::new();
        ExecutableRule.apply(&ctx(b"run.sh", true, None), &mut props);
        assert_eq!(props.get(PROP_EXECUTABLE), Some(&"*".to_string()));
    }

    #[test]
    fn non_executable_leaves_no_property() {
        let mut props = Properties::new();
        ExecutableRule.apply(&ctx(b"run.sh", false, None), &mut props);
        assert!(!props.contains_key(PROP_EXECUTABLE));
    }

    #[test]
    fn binary_sniff_sets_octet_stream_once() {
        let mut props = Properties::new();
        BinarySniffRule.apply(&ctx(b"blob.bin", false, Some(b"\0binary")), &mut props);
        assert_eq!(
            props.get(PROP_MIME_TYPE),
            Some(&"application/octet-stream".to_string())
        );
    }

    #[test]
    fn mime_type_rule_does_not_clobber_binary_sniff() {
        let mut props = Properties::new();
        props.insert(PROP_MIME_TYPE.to_string(), "application/octet-stream".to_string());
        MimeTypeRule.apply(&ctx(b"image.png", false, None), &mut props);
        assert_eq!(
            props.get(PROP_MIME_TYPE),
            Some(&"application/octet-stream".to_string())
        );
    }

    #[test]
    fn mime_type_rule_looks_up_extension() {
        let mut props = Properties::new();
        MimeTypeRule.apply(&ctx(b"image.png", false, None), &mut props);
        assert_eq!(props.get(PROP_MIME_TYPE), Some(&"image/png".to_string()));
    }

    #[test]
    fn auto_props_first_match_wins_per_property() {
        let entries = vec![
            AutoPropsEntry::new("*.txt", vec![(PROP_EOL_STYLE.into(), "LF".into())], false).unwrap(),
            AutoPropsEntry::new("*.txt", vec![(PROP_EOL_STYLE.into(), "CRLF".into())], false).unwrap(),
        ];
        let rule = AutoPropsRule::new(entries);
        let mut props = Properties::new();
        rule.apply(&ctx(b"notes.txt", false, None), &mut props);
        assert_eq!(props.get(PROP_EOL_STYLE), Some(&"LF".to_string()));
    }

    #[test]
    fn eol_style_defaults_to_native_for_presumed_text() {
        let mut props = Properties::new();
        EolStyleRule.apply(&ctx(b"README", false, None), &mut props);
        assert_eq!(props.get(PROP_EOL_STYLE), Some(&"native".to_string()));
    }

    #[test]
    fn eol_style_skips_binary_mime_types() {
        let mut props = Properties::new();
        props.insert(PROP_MIME_TYPE.to_string(), "application/octet-stream".to_string());
        EolStyleRule.apply(&ctx(b"blob.bin", false, None), &mut props);
        assert!(!props.contains_key(PROP_EOL_STYLE));
    }
}
