use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "symbol {symbol} is ambiguous (used as a branch in some files and a tag in others) \
         and --symbol-default=strict leaves no decision: file ids {file_ids:?}"
    )]
    AmbiguousSymbol {
        symbol: String,
        file_ids: Vec<item_graph::FileId>,
    },

    #[error("invalid rename transform {pattern}: {source}")]
    BadTransform {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    Store(#[from] artifact_store::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
