use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to spawn {0}: {1}")]
    Spawn(&'static str, #[source] std::io::Error),

    #[error("{0} exited with status code {1}")]
    ExitStatus(&'static str, i32),

    #[error("{0} was terminated by a signal")]
    ExitSignal(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Dump(#[from] svn_dump::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
