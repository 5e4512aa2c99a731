use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("task not found")]
    NotFound,

    #[error("task already exists")]
    TaskExists,

    #[error("invalid config: need at least one input and one output")]
    InvalidConfig,

    #[error("invalid input address")]
    InvalidInputAddress,

    #[error("invalid output address")]
    InvalidOutputAddress,

    #[error(transparent)]
    Process(#[from] ffctl_process::Error),

    #[error(transparent)]
    Transcoder(#[from] ffctl_ffmpeg::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
