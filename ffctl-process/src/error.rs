use thiserror::Error;

use crate::process::ProcessState;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no valid binary given")]
    NoBinary,

    #[error("process spawn failed: {0}")]
    Spawn(String),

    #[error("can't change state from {from} to {to}")]
    IllegalTransition { from: ProcessState, to: ProcessState },

    #[error("failed to signal process: {0}")]
    Signal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
