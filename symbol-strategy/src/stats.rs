//! Aggregates the per-file [`item_graph::SymbolUsage`] records emitted by the
//! item graph pass into repository-wide [`item_graph::SymbolStats`].

use std::collections::HashMap;

use item_graph::{SymbolStats, SymbolUsage};

pub fn aggregate<I: IntoIterator<Item = SymbolUsage>>(usages: I) -> HashMap<String, SymbolStats> {
    let mut stats: HashMap<String, SymbolStats> = HashMap::new();

    for usage in usages {
        let entry = stats.entry(usage.symbol.clone()).or_insert_with(|| SymbolStats {
            symbol: usage.symbol.clone(),
            branch_file_count: 0,
            tag_file_count: 0,
            branch_commit_file_count: 0,
        });

        if usage.as_branch {
            entry.branch_file_count += 1;
            if usage.has_commits {
                entry.branch_commit_file_count += 1;
            }
        }
        if usage.as_tag {
            entry.tag_file_count += 1;
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_counts_across_files() {
        let usages = vec![
            SymbolUsage {
                file_id: 1,
                symbol: "B".into(),
                as_branch: true,
                as_tag: false,
                has_commits: true,
            },
            SymbolUsage {
                file_id: 2,
                symbol: "B".into(),
                as_branch: true,
                as_tag: false,
                has_commits: false,
            },
            SymbolUsage {
                file_id: 2,
                symbol: "REL_1".into(),
                as_branch: false,
                as_tag: true,
                has_commits: false,
            },
        ];

        let stats = aggregate(usages);
        assert_eq!(stats["B"].branch_file_count, 2);
        assert_eq!(stats["B"].branch_commit_file_count, 1);
        assert_eq!(stats["REL_1"].tag_file_count, 1);
    }
}
