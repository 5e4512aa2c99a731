use serde::{Deserialize, Serialize};

use ffctl_process::Progress;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessConfigIo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessConfigLimits {
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub memory_mbytes: u64,
    #[serde(default)]
    pub waitfor_seconds: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessConfigRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub input: Vec<ProcessConfigIo>,
    #[serde(default)]
    pub output: Vec<ProcessConfigIo>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub reconnect: bool,
    #[serde(default)]
    pub reconnect_delay_seconds: u64,
    #[serde(default)]
    pub autostart: bool,
    #[serde(default)]
    pub stale_timeout_seconds: u64,
    #[serde(default)]
    pub limits: ProcessConfigLimits,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessConfigResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub reference: String,
    pub input: Vec<ProcessConfigIo>,
    pub output: Vec<ProcessConfigIo>,
    pub options: Vec<String>,
    pub reconnect: bool,
    pub reconnect_delay_seconds: u64,
    pub autostart: bool,
    pub stale_timeout_seconds: u64,
    pub limits: ProcessConfigLimits,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessStateResponse {
    pub order: String,
    #[serde(rename = "exec")]
    pub state: String,
    pub runtime_seconds: i64,
    pub reconnect_seconds: i64,
    pub last_logline: String,
    pub progress: Progress,
    pub memory_bytes: u64,
    pub cpu_usage: f64,
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessReportResponse {
    pub created_at: i64,
    pub prelude: Vec<String>,
    pub log: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub reference: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ProcessConfigResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<ProcessStateResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ProcessReportResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
