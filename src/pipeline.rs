//! The pass manager (§5, §6): assembles every crate's [`artifact_store::Plan`]
//! declaration into one pipeline, opens the [`Store`], runs the requested
//! [`PassRange`] in order, and handles the tmpdir/skip-cleanup lifecycle
//! across success and failure. Single-threaded and strictly sequential across
//! passes, per §5's "Async vs. synchronous pass execution" design note: there
//! is no `tokio` runtime here, unlike the teacher's `src/main.rs`.

use std::path::PathBuf;

use artifact_store::{Plan, Store};

use crate::config::Context;
use crate::error::{Error, Result};
use crate::output;

/// Canonical pass order. Index into this array is what `--passes START:END`
/// resolves names/1-based numbers against.
pub const PASS_NAMES: &[&str] = &["ingest", "graph", "symbols", "patchset", "sequencer", "output"];

/// An inclusive, resolved `--passes` selection (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassRange {
    start: usize,
    end: usize,
}

impl PassRange {
    pub fn full() -> Self {
        Self {
            start: 0,
            end: PASS_NAMES.len() - 1,
        }
    }

    /// Parses `--passes`: `None` means every pass; a single name or 1-based
    /// index runs just that pass; `START:END` (same syntax on both sides)
    /// runs an inclusive range.
    pub fn parse(spec: Option<&str>) -> Result<Self> {
        let spec = match spec {
            Some(s) => s,
            None => return Ok(Self::full()),
        };

        match spec.split_once(':') {
            Some((start, end)) => {
                let start = parse_one(start)?;
                let end = parse_one(end)?;
                if start > end {
                    return Err(Error::Usage(format!(
                        "--passes {:?}: start pass comes after end pass",
                        spec
                    )));
                }
                Ok(Self { start, end })
            }
            None => {
                let idx = parse_one(spec)?;
                Ok(Self { start: idx, end: idx })
            }
        }
    }

    pub fn includes(&self, idx: usize) -> bool {
        idx >= self.start && idx <= self.end
    }
}

fn parse_one(s: &str) -> Result<usize> {
    let s = s.trim();
    if let Ok(n) = s.parse::<usize>() {
        if n == 0 || n > PASS_NAMES.len() {
            return Err(Error::Usage(format!(
                "--passes: {} is out of range (1..={})",
                n,
                PASS_NAMES.len()
            )));
        }
        return Ok(n - 1);
    }
    PASS_NAMES
        .iter()
        .position(|name| *name == s)
        .ok_or_else(|| Error::Usage(format!("--passes: unknown pass {:?}", s)))
}

enum StoreDir {
    /// User-specified `--tmpdir`; never auto-deleted by `tempfile`, only by
    /// us on success/failure depending on `--skip-cleanup`.
    Given(PathBuf),
    /// No `--tmpdir` given: a fresh scratch directory that `tempfile` removes
    /// on drop unless `--skip-cleanup` converts it into a `Given` path first.
    Scratch(Option<tempfile::TempDir>),
}

impl StoreDir {
    fn path(&self) -> &std::path::Path {
        match self {
            StoreDir::Given(p) => p,
            StoreDir::Scratch(Some(t)) => t.path(),
            StoreDir::Scratch(None) => unreachable!("path() called after into_kept()"),
        }
    }

    /// Leaves the directory on disk and stops `tempfile` from removing it.
    fn keep(&mut self) -> PathBuf {
        match self {
            StoreDir::Given(p) => p.clone(),
            StoreDir::Scratch(slot) => {
                let temp = slot.take().expect("keep() called twice");
                temp.into_path()
            }
        }
    }

    /// Removes the directory outright. A no-op for `Scratch` that still owns
    /// its `TempDir` (dropping it does the same thing); explicit for `Given`,
    /// which `tempfile` never touches.
    fn discard(self) {
        if let StoreDir::Given(p) = self {
            if let Err(e) = std::fs::remove_dir_all(&p) {
                log::warn!("failed to remove {}: {}", p.display(), e);
            }
        }
        // StoreDir::Scratch(Some(_)) is dropped here, removing it; StoreDir::Scratch(None) is a no-op.
    }
}

/// Builds the whole-pipeline artifact plan from every crate's `decl()`.
fn build_plan() -> Result<Plan> {
    let plan = Plan::new(vec![
        item_graph::ingest::decl(),
        item_graph::graph::decl(),
        symbol_strategy::classify::decl(),
        patchset::grouper::decl(),
        sequencer::order::decl(),
        output::decl(),
    ])?;
    Ok(plan)
}

/// Runs the pipeline end to end (or the pass range the user selected).
/// Consumes `ctx.symbol_rules`/`ctx.rename_rules` via `mem::take` when the
/// `symbols` pass runs, since `symbol_strategy::Strategy` holds trait objects
/// that can't be cloned and no other pass needs them afterward.
pub fn run(ctx: &mut Context) -> Result<()> {
    if let Some(target) = &ctx.target {
        if target.exists() && !ctx.existing_svnrepos {
            return Err(Error::TargetExists(target.clone()));
        }
    }

    let plan = build_plan()?;
    let mut dir = match &ctx.tmpdir {
        Some(p) => StoreDir::Given(p.clone()),
        None => {
            let temp = tempfile::Builder::new()
                .prefix("cvs-svn-import-")
                .tempdir()
                .map_err(Error::Io)?;
            StoreDir::Scratch(Some(temp))
        }
    };

    let result = run_inner(ctx, &plan, dir.path());

    match &result {
        Ok(()) => {
            if ctx.skip_cleanup {
                let kept = dir.keep();
                log::info!("leaving pass artifacts in {}", kept.display());
            } else {
                dir.discard();
            }
        }
        Err(e) => {
            log::error!("pipeline failed: {}", e);
            if ctx.skip_cleanup {
                let kept = dir.keep();
                log::info!("leaving partial pass artifacts in {} for inspection", kept.display());
            } else {
                dir.discard();
            }
        }
    }

    result
}

fn run_inner(ctx: &mut Context, plan: &Plan, dir: &std::path::Path) -> Result<()> {
    let mut store = Store::open(dir, plan.clone())?;
    let range = ctx.pass_range()?;

    for (idx, name) in PASS_NAMES.iter().enumerate() {
        if !range.includes(idx) {
            continue;
        }

        let started = std::time::Instant::now();
        log::info!("pass {}: starting", name);

        match *name {
            "ingest" => item_graph::ingest::run(&store, &ctx.module, ctx.ignore_errors, &ctx.encoding)?,
            "graph" => item_graph::graph::run(&store)?,
            "symbols" => {
                let strategy = symbol_strategy::classify::Strategy {
                    rules: std::mem::take(&mut ctx.symbol_rules),
                    rename_rules: std::mem::take(&mut ctx.rename_rules),
                };
                symbol_strategy::classify::run(&store, &strategy)?;
            }
            "patchset" => patchset::grouper::run(&store, ctx.commit_window)?,
            "sequencer" => sequencer::order::run(&store)?,
            "output" => output::run(&store, ctx)?,
            other => return Err(Error::UnknownPass(other.to_string())),
        }

        log::info!("pass {}: finished in {:?}", name, started.elapsed());
        store.complete_pass(name)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_none_is_full_range() {
        let range = PassRange::parse(None).unwrap();
        assert!(range.includes(0));
        assert!(range.includes(PASS_NAMES.len() - 1));
    }

    #[test]
    fn parse_single_name() {
        let range = PassRange::parse(Some("graph")).unwrap();
        assert!(!range.includes(0));
        assert!(range.includes(1));
        assert!(!range.includes(2));
    }

    #[test]
    fn parse_one_based_index() {
        let range = PassRange::parse(Some("1")).unwrap();
        assert!(range.includes(0));
        assert!(!range.includes(1));
    }

    #[test]
    fn parse_name_range() {
        let range = PassRange::parse(Some("graph:sequencer")).unwrap();
        assert!(!range.includes(0));
        assert!(range.includes(1));
        assert!(range.includes(4));
        assert!(!range.includes(5));
    }

    #[test]
    fn rejects_unknown_pass_name() {
        assert!(PassRange::parse(Some("bogus")).is_err());
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(PassRange::parse(Some("sequencer:ingest")).is_err());
    }
}
