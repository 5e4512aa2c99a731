use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: Server,
    pub ffmpeg: FFmpeg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FFmpeg {
    pub path: PathBuf,
}

impl Default for FFmpeg {
    fn default() -> Self {
        Self {
            path: PathBuf::from("ffmpeg"),
        }
    }
}

impl Config {
    /// Load from YAML. A missing file yields the defaults; empty fields
    /// are backfilled with them.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err.into()),
        };

        let mut config: Self = serde_yaml::from_str(&raw)?;
        if config.server.bind.is_empty() {
            config.server.bind = Server::default().bind;
        }
        if config.ffmpeg.path.as_os_str().is_empty() {
            config.ffmpeg.path = FFmpeg::default().path;
        }
        Ok(config)
    }
}
