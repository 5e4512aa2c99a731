use std::sync::Arc;

use ffctl_ffmpeg::ProgressParser;
use ffctl_process::{LineSink, LogLine, Order, Process, Progress, ProgressSource, Status};

use crate::Config;

/// One registered transcoding task: a config bound to a live supervisor
/// and its parser. Replaced wholesale on update.
#[derive(Debug)]
pub struct Task {
    pub id: String,
    pub reference: String,
    pub config: Config,
    pub created_at: i64,
    pub updated_at: i64,
    pub order: Order,

    pub(crate) process: Process,
    pub(crate) parser: Arc<ProgressParser>,
}

impl Task {
    pub async fn status(&self) -> Status {
        self.process.status().await
    }

    pub fn progress(&self) -> Progress {
        self.parser.progress()
    }

    pub fn log(&self) -> Vec<LogLine> {
        self.parser.log()
    }

    pub fn is_running(&self) -> bool {
        self.process.is_running()
    }

    pub fn command(&self) -> Vec<String> {
        self.config.command()
    }
}
