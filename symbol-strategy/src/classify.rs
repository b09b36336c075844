//! Wires the rule list and rename transform into an artifact-store pass:
//! reads `graph`'s `symbol-usage` artifact, aggregates stats, classifies
//! every discovered symbol, and writes the `Symbol -> Classification` table
//! every downstream pass references.

use std::collections::HashMap;

use artifact_store::{ArtifactRef, Kind, PassDecl, Store, WriteDecl};
use item_graph::{graph, SymbolUsage};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    rule::{Classification, SymbolRule},
    stats,
    transform::{self, RenameRule},
};

pub const PASS_NAME: &str = "symbols";
pub const CLASSIFICATION_ARTIFACT: &str = "classification";
pub const CLASSIFICATION_SCHEMA: u32 = 1;

pub fn classification_ref() -> ArtifactRef {
    ArtifactRef::new(PASS_NAME, CLASSIFICATION_ARTIFACT)
}

pub fn decl() -> PassDecl {
    PassDecl::new(PASS_NAME)
        .reads(vec![graph::symbol_usage_ref()])
        .writes(vec![
            WriteDecl::new(CLASSIFICATION_ARTIFACT, Kind::Permanent, CLASSIFICATION_SCHEMA)
                .indexed(),
        ])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolClassification {
    /// The raw symbol name as it appears on [`item_graph::Branch`] /
    /// [`item_graph::Tag`] items.
    pub symbol: String,
    /// The cleaned, renamed name to use as the `branches/`/`tags/` path
    /// component.
    pub svn_name: String,
    pub classification: Classification,
}

pub struct Strategy {
    pub rules: Vec<Box<dyn SymbolRule>>,
    pub rename_rules: Vec<RenameRule>,
}

pub fn run(store: &Store, strategy: &Strategy) -> Result<()> {
    let usages: Vec<SymbolUsage> = store
        .reader::<SymbolUsage>(PASS_NAME, &graph::symbol_usage_ref())?
        .collect::<artifact_store::Result<_>>()?;

    let classified = classify_all(&usages, &strategy.rules)?;

    let mut writer =
        store.indexed_writer::<String, SymbolClassification>(PASS_NAME, CLASSIFICATION_ARTIFACT)?;
    let mut names: Vec<&String> = classified.keys().collect();
    names.sort();
    for symbol in names {
        let classification = classified[symbol];
        let svn_name = transform::rename(&transform::clean(symbol), &strategy.rename_rules);
        log::trace!("symbol {}: classified {:?} as {}", symbol, classification, svn_name);

        let record = SymbolClassification {
            symbol: symbol.clone(),
            svn_name,
            classification,
        };
        writer.append(symbol.clone(), &record)?;
    }
    writer.finish()?;

    Ok(())
}

/// Classifies every symbol named in `usages` by running `rules` in order and
/// taking the first decision. Returns [`Error::AmbiguousSymbol`] if a symbol
/// falls through every rule (only possible when the terminal rule is the
/// strict default).
pub fn classify_all(
    usages: &[SymbolUsage],
    rules: &[Box<dyn SymbolRule>],
) -> Result<HashMap<String, Classification>> {
    let stats_by_symbol = stats::aggregate(usages.iter().cloned());

    let mut result = HashMap::new();
    let mut symbols: Vec<&String> = stats_by_symbol.keys().collect();
    symbols.sort();

    for symbol in symbols {
        let stats = &stats_by_symbol[symbol];
        let decision = rules.iter().find_map(|rule| rule.classify(stats));

        match decision {
            Some(classification) => {
                result.insert(symbol.clone(), classification);
            }
            None => {
                let file_ids: Vec<item_graph::FileId> = usages
                    .iter()
                    .filter(|u| &u.symbol == symbol)
                    .map(|u| u.file_id)
                    .collect();
                return Err(Error::AmbiguousSymbol {
                    symbol: symbol.clone(),
                    file_ids,
                });
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{DefaultRule, UnambiguousUsageRule};

    fn usage(file_id: u32, symbol: &str, as_branch: bool, as_tag: bool) -> SymbolUsage {
        SymbolUsage {
            file_id,
            symbol: symbol.into(),
            as_branch,
            as_tag,
            has_commits: false,
        }
    }

    #[test]
    fn classifies_unambiguous_symbols() {
        let usages = vec![
            usage(1, "B", true, false),
            usage(2, "B", true, false),
            usage(1, "REL_1", false, true),
        ];
        let rules: Vec<Box<dyn SymbolRule>> = vec![
            Box::new(UnambiguousUsageRule),
            Box::new(DefaultRule(crate::rule::Default::Strict)),
        ];

        let result = classify_all(&usages, &rules).unwrap();
        assert_eq!(result["B"], Classification::Branch);
        assert_eq!(result["REL_1"], Classification::Tag);
    }

    #[test]
    fn strict_default_rejects_ambiguous_symbol() {
        let usages = vec![usage(1, "X", true, false), usage(2, "X", false, true)];
        let rules: Vec<Box<dyn SymbolRule>> = vec![
            Box::new(UnambiguousUsageRule),
            Box::new(DefaultRule(crate::rule::Default::Strict)),
        ];

        let err = classify_all(&usages, &rules).unwrap_err();
        match err {
            Error::AmbiguousSymbol { symbol, file_ids } => {
                assert_eq!(symbol, "X");
                assert_eq!(file_ids.len(), 2);
            }
            _ => panic!("expected AmbiguousSymbol"),
        }
    }
}
