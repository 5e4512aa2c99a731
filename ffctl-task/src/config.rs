use serde::{Deserialize, Serialize};

/// One input or output of a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigIo {
    #[serde(default)]
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub options: Vec<String>,
}

/// Declarative description of a transcoding task. Immutable once
/// installed; updates replace the whole config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub reference: String,
    pub input: Vec<ConfigIo>,
    pub output: Vec<ConfigIo>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub reconnect: bool,
    #[serde(default, rename = "reconnect_delay_seconds")]
    pub reconnect_delay: u64,
    #[serde(default)]
    pub autostart: bool,
    #[serde(default, rename = "stale_timeout_seconds")]
    pub stale_timeout: u64,
    #[serde(default, rename = "limit_cpu_usage")]
    pub limit_cpu: f64,
    #[serde(default, rename = "limit_memory_bytes")]
    pub limit_memory: u64,
    #[serde(default, rename = "limit_waitfor_seconds")]
    pub limit_waitfor: u64,
}

impl Config {
    /// Derive the transcoder argument vector: global options, then each
    /// input as `[options..., -i, address]`, then each output as
    /// `[options..., address]`, in insertion order.
    pub fn command(&self) -> Vec<String> {
        let mut cmd = self.options.clone();

        for input in &self.input {
            cmd.extend(input.options.iter().cloned());
            cmd.push("-i".to_string());
            cmd.push(input.address.clone());
        }
        for output in &self.output {
            cmd.extend(output.options.iter().cloned());
            cmd.push(output.address.clone());
        }

        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io(address: &str, options: &[&str]) -> ConfigIo {
        ConfigIo {
            id: String::new(),
            address: address.to_string(),
            options: options.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn command_orders_options_inputs_outputs() {
        let config = Config {
            options: vec!["-loglevel".to_string(), "error".to_string()],
            input: vec![io("/data/in.mp4", &["-re"])],
            output: vec![io("/data/out.mp4", &["-c:v", "libx264"])],
            ..Default::default()
        };

        assert_eq!(
            config.command(),
            vec![
                "-loglevel",
                "error",
                "-re",
                "-i",
                "/data/in.mp4",
                "-c:v",
                "libx264",
                "/data/out.mp4",
            ]
        );
    }

    #[test]
    fn command_is_pure() {
        let config = Config {
            input: vec![io("a", &[])],
            output: vec![io("b", &[])],
            ..Default::default()
        };
        assert_eq!(config.command(), config.command());
    }

    #[test]
    fn one_input_flag_per_input() {
        let config = Config {
            input: vec![io("a", &[]), io("b", &[]), io("c", &[])],
            output: vec![io("out", &[])],
            ..Default::default()
        };
        let count = config.command().iter().filter(|arg| *arg == "-i").count();
        assert_eq!(count, 3);
    }
}
