//! The CLI surface (§6) and the options-file mode (§10), both of which build
//! the same immutable [`Context`] — mirroring the original `cvs2svn_lib
//! .run_options` module's "build once, construct a context, run" shape, but
//! as an explicit value threaded into passes rather than a process-wide
//! singleton (§9's "Global context object" design note).

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use structopt::StructOpt;
use symbol_strategy::{
    rule::{self, DefaultRule, RegexRule, SymbolRule},
    RenameRule,
};

use crate::error::{Error, Result};
use crate::pipeline::PassRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolDefault {
    Branch,
    Tag,
    Heuristic,
    Strict,
}

impl std::str::FromStr for SymbolDefault {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "branch" => Ok(SymbolDefault::Branch),
            "tag" => Ok(SymbolDefault::Tag),
            "heuristic" => Ok(SymbolDefault::Heuristic),
            "strict" => Ok(SymbolDefault::Strict),
            other => Err(Error::Usage(format!(
                "invalid --symbol-default {:?}: expected branch, tag, heuristic, or strict",
                other
            ))),
        }
    }
}

impl SymbolDefault {
    fn as_rule_default(self) -> rule::Default {
        match self {
            SymbolDefault::Branch => rule::Default::Branch,
            SymbolDefault::Tag => rule::Default::Tag,
            SymbolDefault::Heuristic => rule::Default::Heuristic,
            SymbolDefault::Strict => rule::Default::Strict,
        }
    }
}

/// One `--auto-props` / `--enable-keywords` table entry, or the equivalent
/// options-file list entry: a glob and the properties it sets.
#[derive(Debug, Clone, Deserialize)]
pub struct AutoPropsEntrySpec {
    pub pattern: String,
    pub props: Vec<(String, String)>,
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "cvs-svn-import",
    about = "Converts a CVS repository into a Subversion repository or dumpfile."
)]
pub struct Opt {
    /// Path to the CVS module to convert (a directory of `*,v` files).
    #[structopt(parse(from_os_str))]
    pub module: PathBuf,

    /// Run only this pass, or an inclusive START:END range (by name or
    /// 1-based index): `ingest`, `graph`, `symbols`, `patchset`,
    /// `sequencer`, `output`.
    #[structopt(long)]
    pub passes: Option<String>,

    /// Directory for pass artifacts. A fresh temporary directory is used if
    /// omitted; passing one explicitly is what makes `--passes` resumption
    /// useful across invocations.
    #[structopt(long, parse(from_os_str))]
    pub tmpdir: Option<PathBuf>,

    /// Leave pass artifacts on disk after a successful run (or a failed
    /// one, which otherwise has its partial artifacts discarded).
    #[structopt(long)]
    pub skip_cleanup: bool,

    /// Parse errors are logged and the offending file is skipped instead of
    /// aborting the whole ingest pass.
    #[structopt(long)]
    pub ignore_errors: bool,

    /// Write a Subversion dumpfile here instead of (or in addition to)
    /// loading a live repository.
    #[structopt(long, parse(from_os_str))]
    pub dumpfile: Option<PathBuf>,

    /// Only ever produce a dumpfile; refuse to touch `--target` even if
    /// `svnadmin` is on PATH.
    #[structopt(long)]
    pub dump_only: bool,

    /// Create or load into this Subversion repository.
    #[structopt(long, parse(from_os_str))]
    pub target: Option<PathBuf>,

    /// `--target` already exists as a repository and should be loaded into
    /// rather than created.
    #[structopt(long)]
    pub existing_svnrepos: bool,

    /// Run every pass but skip the final commit to `--target`/`--dumpfile`;
    /// useful for checking symbol classification and commit grouping.
    #[structopt(long)]
    pub dry_run: bool,

    /// Base path for trunk in the output repository.
    #[structopt(long, default_value = "trunk")]
    pub trunk_base: String,

    /// Base path for branches in the output repository.
    #[structopt(long, default_value = "branches")]
    pub branches_base: String,

    /// Base path for tags in the output repository.
    #[structopt(long, default_value = "tags")]
    pub tags_base: String,

    /// Only convert trunk; every symbol is classified `Excluded` regardless
    /// of the usual rules.
    #[structopt(long)]
    pub trunk_only: bool,

    /// Regex: any symbol it matches is always classified as a branch.
    #[structopt(long = "force-branch")]
    pub force_branch: Vec<String>,

    /// Regex: any symbol it matches is always classified as a tag.
    #[structopt(long = "force-tag")]
    pub force_tag: Vec<String>,

    /// Regex: any symbol it matches is dropped from the conversion.
    #[structopt(long = "exclude")]
    pub exclude: Vec<String>,

    /// What to do with a symbol no other rule classified.
    #[structopt(long = "symbol-default", default_value = "strict")]
    pub symbol_default: SymbolDefault,

    /// `PATTERN:REPLACEMENT` symbol rename rule, applied in the order
    /// given; first match wins (§8 property 5, §9).
    #[structopt(long = "symbol-rename")]
    pub symbol_rename: Vec<String>,

    /// Ordered, comma-separated list of encodings to try when a commit log
    /// or author name isn't valid UTF-8; `ascii` is always appended as the
    /// final fallback if not already present.
    #[structopt(long, default_value = "utf-8")]
    pub encoding: String,

    /// Sliding-window gap (§4.5) beyond which two commits by the same
    /// author with the same message are treated as separate changesets.
    #[structopt(
        long,
        default_value = "5m",
        parse(try_from_str = parse_duration::parse::parse)
    )]
    pub commit_window: Duration,

    /// Path to an Apache-style `mime.types` file for `svn:mime-type`
    /// lookups, supplementing the built-in `mime_guess` table.
    #[structopt(long, parse(from_os_str))]
    pub mime_types_file: Option<PathBuf>,

    /// Match `--auto-props`/`--enable-keywords` glob patterns without
    /// regard to case.
    #[structopt(long)]
    pub auto_props_case_insensitive: bool,

    /// Set `svn:eol-style` from the file's detected mime type.
    #[structopt(long)]
    pub eol_from_mime_type: bool,

    /// Default `svn:eol-style` for files with no more specific rule,
    /// `""` to leave unset.
    #[structopt(long, default_value = "native")]
    pub default_eol: String,

    /// Set `svn:keywords: Id` on paths matching `--keywords-pattern`.
    #[structopt(long)]
    pub enable_keywords: bool,

    /// Glob pattern for `--enable-keywords` (may be given more than once).
    #[structopt(long = "keywords-pattern")]
    pub keywords_pattern: Vec<String>,

    /// Path to the `svnadmin` binary.
    #[structopt(long, default_value = "svnadmin")]
    pub svnadmin: OsString,

    /// Forward `--bdb-txn-nosync` to `svnadmin create`, and reverse it
    /// (by rewriting `db/DB_CONFIG`) once the run completes.
    #[structopt(long)]
    pub bdb_txn_nosync: bool,

    /// Load configuration from this TOML file instead of (or in addition
    /// to; the file wins on conflicts) the flags above. See §10.
    #[structopt(long, parse(from_os_str))]
    pub config_file: Option<PathBuf>,

    #[structopt(long, short, parse(from_occurrences))]
    pub verbose: u8,
}

/// The options-file shape (§10): every CLI flag by name, plus the two
/// naturally multi-valued/verbose lists the CLI doesn't expose directly.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub module: Option<PathBuf>,
    pub tmpdir: Option<PathBuf>,
    pub skip_cleanup: bool,
    pub ignore_errors: bool,
    pub dumpfile: Option<PathBuf>,
    pub dump_only: bool,
    pub target: Option<PathBuf>,
    pub existing_svnrepos: bool,
    pub dry_run: bool,
    pub trunk_base: Option<String>,
    pub branches_base: Option<String>,
    pub tags_base: Option<String>,
    pub trunk_only: bool,
    pub symbol_default: Option<String>,
    pub commit_window_seconds: Option<u64>,
    pub mime_types_file: Option<PathBuf>,
    pub auto_props_case_insensitive: bool,
    pub eol_from_mime_type: bool,
    pub default_eol: Option<String>,
    pub enable_keywords: bool,
    pub svnadmin: Option<String>,
    pub bdb_txn_nosync: bool,

    /// Ordered list of encodings to try for non-UTF-8 author/log bytes (§6);
    /// the comma-separated CLI flag lowers to this same shape.
    pub encoding: Vec<String>,

    /// Ordered symbol rules, evaluated before the repo-derived ones (§4.4).
    pub symbol_rules: Vec<RawSymbolRule>,
    pub symbol_rename: Vec<String>,
    pub auto_props: Vec<AutoPropsEntrySpec>,
    pub keywords_patterns: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RawSymbolRule {
    ForceBranch { pattern: String },
    ForceTag { pattern: String },
    Exclude { pattern: String },
}

/// Everything a pass needs, constructed once by either entry point and
/// read-only thereafter (§5: "established before pass 1 ... read-only
/// during execution").
pub struct Context {
    pub module: PathBuf,
    pub tmpdir: Option<PathBuf>,
    pub skip_cleanup: bool,
    pub ignore_errors: bool,
    pub passes: Option<String>,

    pub dumpfile: Option<PathBuf>,
    pub dump_only: bool,
    pub target: Option<PathBuf>,
    pub existing_svnrepos: bool,
    pub dry_run: bool,

    pub trunk_base: String,
    pub branches_base: String,
    pub tags_base: String,
    pub trunk_only: bool,

    pub symbol_rules: Vec<Box<dyn SymbolRule>>,
    pub rename_rules: Vec<RenameRule>,

    /// Ordered, non-empty list of encodings to try for non-UTF-8 author/log
    /// bytes during ingest (§6); always ends with `ascii`.
    pub encoding: Vec<String>,

    pub commit_window: Duration,

    pub property_rules: PropertyOptions,

    pub svnadmin: svnadmin_process::Opt,
}

pub struct PropertyOptions {
    pub mime_types_file: Option<PathBuf>,
    pub auto_props: Vec<AutoPropsEntrySpec>,
    pub auto_props_case_insensitive: bool,
    pub eol_from_mime_type: bool,
    pub default_eol: String,
    pub keywords_patterns: Vec<String>,
}

impl Context {
    pub fn from_opt(opt: Opt) -> Result<Self> {
        if let Some(config_path) = &opt.config_file {
            let raw = std::fs::read_to_string(config_path)?;
            let config: RawConfig = toml::from_str(&raw)?;
            return Self::from_raw(config, Some(opt));
        }
        Self::from_raw(RawConfig::default(), Some(opt))
    }

    pub fn from_config_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: RawConfig = toml::from_str(&raw)?;
        Self::from_raw(config, None)
    }

    /// Lowers a [`RawConfig`] (optionally layered over CLI flags, which fill
    /// in anything the file left unset) into a `Context`. The file always
    /// wins on a field both specify, per §10. `opt` is `None` only for a
    /// pure options-file run (`cvs-svn-import --config-file x.toml` with no
    /// other flags reaching this far), in which case every field the file
    /// doesn't set falls back to the same default the CLI would have used.
    fn from_raw(raw: RawConfig, opt: Option<Opt>) -> Result<Self> {
        let module = raw
            .module
            .or_else(|| opt.as_ref().map(|o| o.module.clone()))
            .ok_or_else(|| Error::Usage("no CVS module path given".into()))?;
        let trunk_only = raw.trunk_only || opt.as_ref().map_or(false, |o| o.trunk_only);

        let symbol_default: SymbolDefault = match raw.symbol_default {
            Some(s) => s.parse()?,
            None => match &opt {
                Some(o) => o.symbol_default,
                None => SymbolDefault::Strict,
            },
        };

        let mut symbol_rules: Vec<Box<dyn SymbolRule>> = Vec::new();
        for rule in &raw.symbol_rules {
            symbol_rules.push(build_raw_rule(rule)?);
        }
        if let Some(opt) = &opt {
            for pattern in &opt.force_branch {
                symbol_rules.push(Box::new(RegexRule::force_branch(compile_regex(pattern)?)));
            }
            for pattern in &opt.force_tag {
                symbol_rules.push(Box::new(RegexRule::force_tag(compile_regex(pattern)?)));
            }
            for pattern in &opt.exclude {
                symbol_rules.push(Box::new(RegexRule::exclude(compile_regex(pattern)?)));
            }
        }
        if trunk_only {
            // Every symbol is excluded outright; this rule comes before the
            // repo-derived ones so it always wins.
            symbol_rules.insert(
                0,
                Box::new(RegexRule::exclude(compile_regex(".*")?)) as Box<dyn SymbolRule>,
            );
        }
        symbol_rules.push(Box::new(rule::UnambiguousUsageRule));
        symbol_rules.push(Box::new(rule::BranchIfCommitsRule));
        symbol_rules.push(Box::new(DefaultRule(symbol_default.as_rule_default())));

        let mut rename_specs = raw.symbol_rename;
        if rename_specs.is_empty() {
            if let Some(opt) = &opt {
                rename_specs = opt.symbol_rename.clone();
            }
        }
        let rename_rules = rename_specs
            .iter()
            .map(|s| RenameRule::parse(s).map_err(Error::from))
            .collect::<Result<Vec<_>>>()?;

        let mut encoding = raw.encoding;
        if encoding.is_empty() {
            encoding = opt
                .as_ref()
                .map(|o| o.encoding.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default();
        }
        if encoding.is_empty() {
            encoding.push("utf-8".to_string());
        }
        if !encoding.iter().any(|e| e.eq_ignore_ascii_case("ascii")) {
            encoding.push("ascii".to_string());
        }

        let auto_props = raw.auto_props;
        let mut keywords_patterns = raw.keywords_patterns;
        if keywords_patterns.is_empty() {
            if let Some(opt) = &opt {
                if opt.enable_keywords {
                    keywords_patterns = opt.keywords_pattern.clone();
                }
            }
        }

        let target = raw.target.or_else(|| opt.as_ref().and_then(|o| o.target.clone()));
        let dumpfile = raw
            .dumpfile
            .or_else(|| opt.as_ref().and_then(|o| o.dumpfile.clone()));
        let dry_run = raw.dry_run || opt.as_ref().map_or(false, |o| o.dry_run);
        if target.is_none() && dumpfile.is_none() && !dry_run {
            return Err(Error::Usage(
                "at least one of --target or --dumpfile is required (or pass --dry-run)".into(),
            ));
        }

        Ok(Self {
            module,
            tmpdir: raw.tmpdir.or_else(|| opt.as_ref().and_then(|o| o.tmpdir.clone())),
            skip_cleanup: raw.skip_cleanup || opt.as_ref().map_or(false, |o| o.skip_cleanup),
            ignore_errors: raw.ignore_errors || opt.as_ref().map_or(false, |o| o.ignore_errors),
            passes: opt.as_ref().and_then(|o| o.passes.clone()),
            dumpfile,
            dump_only: raw.dump_only || opt.as_ref().map_or(false, |o| o.dump_only),
            target,
            existing_svnrepos: raw.existing_svnrepos
                || opt.as_ref().map_or(false, |o| o.existing_svnrepos),
            dry_run,
            trunk_base: raw
                .trunk_base
                .or_else(|| opt.as_ref().map(|o| o.trunk_base.clone()))
                .unwrap_or_else(|| "trunk".to_string()),
            branches_base: raw
                .branches_base
                .or_else(|| opt.as_ref().map(|o| o.branches_base.clone()))
                .unwrap_or_else(|| "branches".to_string()),
            tags_base: raw
                .tags_base
                .or_else(|| opt.as_ref().map(|o| o.tags_base.clone()))
                .unwrap_or_else(|| "tags".to_string()),
            trunk_only,
            symbol_rules,
            rename_rules,
            encoding,
            commit_window: raw
                .commit_window_seconds
                .map(Duration::from_secs)
                .or_else(|| opt.as_ref().map(|o| o.commit_window))
                .unwrap_or_else(|| Duration::from_secs(300)),
            property_rules: PropertyOptions {
                mime_types_file: raw
                    .mime_types_file
                    .or_else(|| opt.as_ref().and_then(|o| o.mime_types_file.clone())),
                auto_props,
                auto_props_case_insensitive: raw.auto_props_case_insensitive
                    || opt.as_ref().map_or(false, |o| o.auto_props_case_insensitive),
                eol_from_mime_type: raw.eol_from_mime_type
                    || opt.as_ref().map_or(false, |o| o.eol_from_mime_type),
                default_eol: raw
                    .default_eol
                    .or_else(|| opt.as_ref().map(|o| o.default_eol.clone()))
                    .unwrap_or_else(|| "native".to_string()),
                keywords_patterns,
            },
            svnadmin: svnadmin_process::Opt {
                svnadmin_command: raw
                    .svnadmin
                    .map(OsString::from)
                    .or_else(|| opt.as_ref().map(|o| o.svnadmin.clone()))
                    .unwrap_or_else(|| OsString::from("svnadmin")),
                bdb_txn_nosync: raw.bdb_txn_nosync
                    || opt.as_ref().map_or(false, |o| o.bdb_txn_nosync),
            },
        })
    }

    pub fn pass_range(&self) -> Result<PassRange> {
        PassRange::parse(self.passes.as_deref())
    }
}

fn compile_regex(pattern: &str) -> Result<regex::Regex> {
    regex::Regex::new(pattern).map_err(|source| {
        Error::Usage(format!("invalid regex {:?}: {}", pattern, source))
    })
}

fn build_raw_rule(raw: &RawSymbolRule) -> Result<Box<dyn SymbolRule>> {
    Ok(match raw {
        RawSymbolRule::ForceBranch { pattern } => {
            Box::new(RegexRule::force_branch(compile_regex(pattern)?))
        }
        RawSymbolRule::ForceTag { pattern } => {
            Box::new(RegexRule::force_tag(compile_regex(pattern)?))
        }
        RawSymbolRule::Exclude { pattern } => Box::new(RegexRule::exclude(compile_regex(pattern)?)),
    })
}

