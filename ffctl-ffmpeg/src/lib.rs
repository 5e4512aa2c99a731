pub mod parse;
pub mod skills;
pub mod validator;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use thiserror::Error;
use tracing::info;

use ffctl_process::{Callback, LineSink, Process, StateCallback};

pub use parse::ProgressParser;
pub use skills::Skills;
pub use validator::Validator;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid ffmpeg binary: {0}")]
    InvalidBinary(String),

    #[error("can't parse ffmpeg version")]
    Version,

    #[error("invalid validator expression '{expression}': {source}")]
    InvalidExpression {
        expression: String,
        source: regex::Error,
    },

    #[error(transparent)]
    Process(#[from] ffctl_process::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Everything needed to materialize one supervised transcoder run.
///
/// The binary itself is owned by the facade; the spec carries only the
/// derived argument vector and the per-task policy.
pub struct ProcessSpec {
    pub command: Vec<String>,
    pub reconnect: bool,
    pub reconnect_delay: Duration,
    pub stale_timeout: Duration,
    pub limit_cpu: f64,
    pub limit_memory: u64,
    pub parser: Option<Arc<dyn LineSink>>,
    pub on_start: Option<Callback>,
    pub on_exit: Option<Callback>,
    pub on_state_change: Option<StateCallback>,
}

impl Default for ProcessSpec {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            reconnect: false,
            reconnect_delay: Duration::ZERO,
            stale_timeout: Duration::ZERO,
            limit_cpu: 0.0,
            limit_memory: 0,
            parser: None,
            on_start: None,
            on_exit: None,
            on_state_change: None,
        }
    }
}

/// Transcoder backend as seen by the task registry.
pub trait Transcoder: Send + Sync {
    fn new_process(&self, spec: ProcessSpec) -> Result<Process>;
    fn new_parser(&self) -> Arc<ProgressParser>;
    fn validate_input(&self, address: &str) -> bool;
    fn validate_output(&self, address: &str) -> bool;
}

/// Configuration for the FFmpeg facade.
#[derive(Default)]
pub struct Config {
    pub binary: PathBuf,
    pub max_log_lines: usize,
    pub validator_input: Option<Validator>,
    pub validator_output: Option<Validator>,
}

/// The concrete FFmpeg backend: one resolved binary, its detected
/// capabilities, and the input/output address policies.
pub struct FFmpeg {
    binary: PathBuf,
    log_lines: usize,
    validator_in: Validator,
    validator_out: Validator,
    skills: ArcSwap<Skills>,
}

impl FFmpeg {
    /// Probe the binary and build the facade. Fails when the binary is
    /// missing or does not identify itself as FFmpeg.
    pub async fn new(config: Config) -> Result<Self> {
        let skills = Skills::detect(&config.binary).await?;
        info!(binary = %config.binary.display(), version = %skills.ffmpeg.version, "ffmpeg probed");

        let log_lines = if config.max_log_lines == 0 {
            parse::DEFAULT_LOG_LINES
        } else {
            config.max_log_lines
        };

        Ok(Self {
            binary: config.binary,
            log_lines,
            validator_in: config.validator_input.unwrap_or_default(),
            validator_out: config.validator_output.unwrap_or_default(),
            skills: ArcSwap::from_pointee(skills),
        })
    }

    /// Current capability snapshot.
    pub fn skills(&self) -> Arc<Skills> {
        self.skills.load_full()
    }

    /// Re-probe the binary and swap the capability snapshot.
    pub async fn reload_skills(&self) -> Result<()> {
        let skills = Skills::detect(&self.binary).await?;
        self.skills.store(Arc::new(skills));
        Ok(())
    }
}

impl Transcoder for FFmpeg {
    fn new_process(&self, spec: ProcessSpec) -> Result<Process> {
        let process = Process::new(ffctl_process::Config {
            binary: self.binary.to_string_lossy().into_owned(),
            args: spec.command,
            reconnect: spec.reconnect,
            reconnect_delay: spec.reconnect_delay,
            stale_timeout: spec.stale_timeout,
            limit_cpu: spec.limit_cpu,
            limit_memory: spec.limit_memory,
            parser: spec.parser,
            on_start: spec.on_start,
            on_exit: spec.on_exit,
            on_state_change: spec.on_state_change,
        })?;
        Ok(process)
    }

    fn new_parser(&self) -> Arc<ProgressParser> {
        Arc::new(ProgressParser::new(self.log_lines))
    }

    fn validate_input(&self, address: &str) -> bool {
        self.validator_in.is_valid(address)
    }

    fn validate_output(&self, address: &str) -> bool {
        self.validator_out.is_valid(address)
    }
}
