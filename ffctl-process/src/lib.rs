pub mod parser;
pub mod process;
pub mod sampler;

mod error;
mod splitter;

pub use error::{Error, Result};
pub use parser::{LineSink, LogLine, NullSink, Progress, ProgressSource};
pub use process::{
    Callback, Config, Order, Process, ProcessState, StateCallback, StateCounters, Status,
};
pub use sampler::Sampler;
