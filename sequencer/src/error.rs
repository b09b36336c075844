use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("sequencing stalled with {0} changesets left after the split budget was exhausted")]
    UnresolvableCycle(usize),

    #[error(transparent)]
    Store(#[from] artifact_store::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
