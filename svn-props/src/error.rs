use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("auto-props pattern {pattern:?} is not a valid glob: {source}")]
    BadPattern {
        pattern: String,
        source: globset::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
