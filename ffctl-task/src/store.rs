use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use ffctl_ffmpeg::{ProcessSpec, ProgressParser, Transcoder};
use ffctl_process::{LineSink, Order, Process};

use crate::{Config, Error, Result, Task};

/// Serialized lifecycle operations over the task set.
#[async_trait]
pub trait Store: Send + Sync {
    async fn add(&self, config: Config) -> Result<Arc<Task>>;
    async fn get(&self, id: &str) -> Result<Arc<Task>>;
    async fn list(&self, ids: &[String], reference: &str) -> Vec<Arc<Task>>;
    async fn update(&self, id: &str, config: Config) -> Result<Arc<Task>>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn start(&self, id: &str) -> Result<()>;
    async fn stop(&self, id: &str) -> Result<()>;
    async fn restart(&self, id: &str) -> Result<()>;
}

/// The in-memory registry. One coarse lock guards the map; supervisors
/// and parsers carry their own locking.
pub struct MemoryStore {
    transcoder: Arc<dyn Transcoder>,
    tasks: RwLock<HashMap<String, Arc<Task>>>,
}

impl MemoryStore {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            transcoder,
            tasks: RwLock::new(HashMap::new()),
        }
    }

    fn validate(&self, config: &Config) -> Result<()> {
        for input in &config.input {
            if !self.transcoder.validate_input(&input.address) {
                return Err(Error::InvalidInputAddress);
            }
        }
        for output in &config.output {
            if !self.transcoder.validate_output(&output.address) {
                return Err(Error::InvalidOutputAddress);
            }
        }
        Ok(())
    }

    fn build(&self, config: &Config) -> Result<(Process, Arc<ProgressParser>)> {
        let parser = self.transcoder.new_parser();
        let id = config.id.clone();

        let process = self.transcoder.new_process(ProcessSpec {
            command: config.command(),
            reconnect: config.reconnect,
            reconnect_delay: Duration::from_secs(config.reconnect_delay),
            stale_timeout: Duration::from_secs(config.stale_timeout),
            limit_cpu: config.limit_cpu,
            limit_memory: config.limit_memory,
            parser: Some(Arc::clone(&parser) as Arc<dyn LineSink>),
            on_state_change: Some(Arc::new(move |from, to| {
                info!(task = %id, %from, %to, "task state changed");
            })),
            ..Default::default()
        })?;

        Ok((process, parser))
    }

    fn launch(process: &Process) {
        let process = process.clone();
        tokio::spawn(async move {
            let _ = process.start().await;
        });
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn add(&self, mut config: Config) -> Result<Arc<Task>> {
        let mut tasks = self.tasks.write().await;

        if config.id.is_empty() {
            config.id = Uuid::new_v4().to_string();
        }
        if config.input.is_empty() || config.output.is_empty() {
            return Err(Error::InvalidConfig);
        }
        self.validate(&config)?;

        if tasks.contains_key(&config.id) {
            return Err(Error::TaskExists);
        }

        let (process, parser) = self.build(&config)?;

        let now = chrono::Utc::now().timestamp();
        let mut task = Task {
            id: config.id.clone(),
            reference: config.reference.clone(),
            config,
            created_at: now,
            updated_at: now,
            order: Order::Stop,
            process,
            parser,
        };

        if task.config.autostart {
            task.order = Order::Start;
            Self::launch(&task.process);
        }

        let task = Arc::new(task);
        tasks.insert(task.id.clone(), Arc::clone(&task));
        Ok(task)
    }

    async fn get(&self, id: &str) -> Result<Arc<Task>> {
        let tasks = self.tasks.read().await;
        tasks.get(id).cloned().ok_or(Error::NotFound)
    }

    async fn list(&self, ids: &[String], reference: &str) -> Vec<Arc<Task>> {
        let tasks = self.tasks.read().await;
        tasks
            .values()
            .filter(|task| reference.is_empty() || task.reference == reference)
            .filter(|task| ids.is_empty() || ids.contains(&task.id))
            .cloned()
            .collect()
    }

    async fn update(&self, id: &str, mut config: Config) -> Result<Arc<Task>> {
        let mut tasks = self.tasks.write().await;

        let old = tasks.get(id).cloned().ok_or(Error::NotFound)?;

        let was_running = old.is_running();
        if was_running {
            let _ = old.process.stop(true).await;
        }

        config.id = id.to_string();
        config.reference = old.reference.clone();
        self.validate(&config)?;

        let (process, parser) = self.build(&config)?;

        let mut task = Task {
            id: id.to_string(),
            reference: old.reference.clone(),
            config,
            created_at: old.created_at,
            updated_at: chrono::Utc::now().timestamp(),
            order: Order::Stop,
            process,
            parser,
        };

        if was_running || task.config.autostart {
            task.order = Order::Start;
            Self::launch(&task.process);
        }

        let task = Arc::new(task);
        tasks.insert(id.to_string(), Arc::clone(&task));
        Ok(task)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut tasks = self.tasks.write().await;

        let task = tasks.get(id).cloned().ok_or(Error::NotFound)?;
        let _ = task.process.stop(true).await;
        tasks.remove(id);
        Ok(())
    }

    async fn start(&self, id: &str) -> Result<()> {
        let task = self.get(id).await?;
        task.process.start().await?;
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        let task = self.get(id).await?;
        task.process.stop(true).await?;
        Ok(())
    }

    async fn restart(&self, id: &str) -> Result<()> {
        let task = self.get(id).await?;
        let _ = task.process.stop(true).await;
        task.process.start().await?;
        Ok(())
    }
}
