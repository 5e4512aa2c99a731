use std::fmt;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::parser::{LineSink, NullSink};
use crate::sampler::Sampler;
use crate::splitter::LineSplitter;
use crate::{Error, Result};

const KILL_TIMEOUT: Duration = Duration::from_secs(5);
const STALE_TICK: Duration = Duration::from_secs(1);

pub type Callback = Arc<dyn Fn() + Send + Sync>;
pub type StateCallback = Arc<dyn Fn(ProcessState, ProcessState) + Send + Sync>;

/// Observable state of a supervised child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Finished,
    Starting,
    Running,
    Finishing,
    Failed,
    Killed,
}

impl ProcessState {
    pub fn is_running(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Finishing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Finished => "finished",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Finishing => "finishing",
            Self::Failed => "failed",
            Self::Killed => "killed",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the operator last asked for, as opposed to what the child does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Start,
    Stop,
}

impl Order {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cumulative count of transitions into each state.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct StateCounters {
    pub finished: u64,
    pub starting: u64,
    pub running: u64,
    pub finishing: u64,
    pub failed: u64,
    pub killed: u64,
}

impl StateCounters {
    fn bump(&mut self, state: ProcessState) {
        match state {
            ProcessState::Finished => self.finished += 1,
            ProcessState::Starting => self.starting += 1,
            ProcessState::Running => self.running += 1,
            ProcessState::Finishing => self.finishing += 1,
            ProcessState::Failed => self.failed += 1,
            ProcessState::Killed => self.killed += 1,
        }
    }
}

/// Point-in-time view of a supervisor.
#[derive(Debug, Clone)]
pub struct Status {
    pub state: ProcessState,
    pub states: StateCounters,
    pub order: Order,
    pub duration: Duration,
    pub reconnect_in: Option<Duration>,
    pub cpu_current: f64,
    pub cpu_limit: f64,
    pub memory_current: u64,
    pub memory_limit: u64,
}

/// Configuration for one supervised child.
pub struct Config {
    pub binary: String,
    pub args: Vec<String>,
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

impl Default for Config {
    fn default() -> Self {
        Self {
            binary: String::new(),
            args: Vec::new(),
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

struct StateSlot {
    state: ProcessState,
    since: Instant,
    counters: StateCounters,
}

struct StaleSlot {
    last: Instant,
    timeout: Duration,
    cancel: Option<watch::Sender<bool>>,
}

struct ReconnectSlot {
    enable: bool,
    delay: Duration,
    timer: Option<JoinHandle<()>>,
    deadline: Option<Instant>,
}

struct Callbacks {
    on_start: Option<Callback>,
    on_exit: Option<Callback>,
    on_state_change: Option<StateCallback>,
}

/// Supervisor for one external child process.
///
/// Owns the child's lifecycle state machine, its diagnostic-stream
/// reader, the stale watchdog, and the reconnect and kill-escalation
/// timers. Cheap to clone; all clones share the same child.
#[derive(Clone)]
pub struct Process {
    inner: Arc<Inner>,
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("binary", &self.inner.binary)
            .field("args", &self.inner.args)
            .finish_non_exhaustive()
    }
}

struct Inner {
    binary: String,
    args: Vec<String>,
    parser: Arc<dyn LineSink>,
    sampler: Sampler,
    pid: AtomicU32,
    state: Mutex<StateSlot>,
    order: tokio::sync::Mutex<Order>,
    stale: Mutex<StaleSlot>,
    reconnect: Mutex<ReconnectSlot>,
    kill_timer: Mutex<Option<JoinHandle<()>>>,
    callbacks: Mutex<Callbacks>,
}

impl Process {
    pub fn new(config: Config) -> Result<Self> {
        if config.binary.is_empty() {
            return Err(Error::NoBinary);
        }

        let parser = config.parser.unwrap_or_else(|| Arc::new(NullSink));

        Ok(Self {
            inner: Arc::new(Inner {
                binary: config.binary,
                args: config.args,
                parser,
                sampler: Sampler::new(config.limit_cpu, config.limit_memory),
                pid: AtomicU32::new(0),
                state: Mutex::new(StateSlot {
                    state: ProcessState::Finished,
                    since: Instant::now(),
                    counters: StateCounters::default(),
                }),
                order: tokio::sync::Mutex::new(Order::Stop),
                stale: Mutex::new(StaleSlot {
                    last: Instant::now(),
                    timeout: config.stale_timeout,
                    cancel: None,
                }),
                reconnect: Mutex::new(ReconnectSlot {
                    enable: config.reconnect,
                    delay: config.reconnect_delay,
                    timer: None,
                    deadline: None,
                }),
                kill_timer: Mutex::new(None),
                callbacks: Mutex::new(Callbacks {
                    on_start: config.on_start,
                    on_exit: config.on_exit,
                    on_state_change: config.on_state_change,
                }),
            }),
        })
    }

    pub fn state(&self) -> ProcessState {
        self.inner.state.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub async fn status(&self) -> Status {
        let (cpu_current, memory_current) = self.inner.sampler.current();
        let (cpu_limit, memory_limit) = self.inner.sampler.limits();

        let (state, states, since) = {
            let slot = self.inner.state.lock();
            (slot.state, slot.counters, slot.since)
        };

        let order = *self.inner.order.lock().await;

        let reconnect_in = self
            .inner
            .reconnect
            .lock()
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));

        Status {
            state,
            states,
            order,
            duration: since.elapsed(),
            reconnect_in,
            cpu_current,
            cpu_limit,
            memory_current,
            memory_limit,
        }
    }

    /// Record the start order and launch the child unless already running.
    pub async fn start(&self) -> Result<()> {
        let mut order = self.inner.order.lock().await;
        if *order == Order::Start {
            return Ok(());
        }
        *order = Order::Start;
        self.start_locked()
    }

    /// Record the stop order and initiate termination. With `wait` the
    /// call returns only after the child has been reaped.
    pub async fn stop(&self, wait: bool) -> Result<()> {
        let mut order = self.inner.order.lock().await;
        if *order == Order::Stop {
            return Ok(());
        }
        *order = Order::Stop;
        self.stop_locked(wait).await
    }

    /// Forceful variant of `stop` that leaves the current order alone.
    pub async fn kill(&self, wait: bool) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        let _order = self.inner.order.lock().await;
        self.stop_locked(wait).await
    }

    fn set_state(&self, to: ProcessState) -> Result<()> {
        let on_state_change = self.inner.callbacks.lock().on_state_change.clone();

        let from = {
            let mut slot = self.inner.state.lock();
            let from = slot.state;

            let legal = matches!(
                (from, to),
                (ProcessState::Finished, ProcessState::Starting)
                    | (
                        ProcessState::Starting,
                        ProcessState::Running | ProcessState::Finishing | ProcessState::Failed,
                    )
                    | (
                        ProcessState::Running,
                        ProcessState::Finished
                            | ProcessState::Finishing
                            | ProcessState::Failed
                            | ProcessState::Killed,
                    )
                    | (
                        ProcessState::Finishing,
                        ProcessState::Finished | ProcessState::Failed | ProcessState::Killed,
                    )
                    | (
                        ProcessState::Failed | ProcessState::Killed,
                        ProcessState::Starting,
                    )
            );

            if !legal {
                return Err(Error::IllegalTransition { from, to });
            }

            slot.state = to;
            slot.since = Instant::now();
            slot.counters.bump(to);
            from
        };

        if let Some(cb) = on_state_change {
            tokio::spawn(async move { cb(from, to) });
        }

        Ok(())
    }

    /// Launch the child. Caller must hold the order lock.
    fn start_locked(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        self.unreconnect();
        self.set_state(ProcessState::Starting)?;

        let mut cmd = Command::new(&self.inner.binary);
        cmd.args(&self.inner.args)
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                let _ = self.set_state(ProcessState::Failed);
                self.inner.parser.parse(&err.to_string());
                self.schedule_reconnect();
                return Err(Error::Spawn(err.to_string()));
            }
        };

        let pid = child.id().unwrap_or_default();
        self.inner.pid.store(pid, Ordering::SeqCst);
        self.inner.sampler.start(pid);

        self.set_state(ProcessState::Running)?;

        if let Some(cb) = self.inner.callbacks.lock().on_start.clone() {
            tokio::spawn(async move { cb() });
        }

        let stderr = child.stderr.take();
        let this = self.clone();
        tokio::spawn(async move { this.reader(child, stderr).await });

        let timeout = self.inner.stale.lock().timeout;
        if !timeout.is_zero() {
            let (cancel_tx, cancel_rx) = watch::channel(false);
            self.inner.stale.lock().cancel = Some(cancel_tx);
            let this = self.clone();
            tokio::spawn(async move { this.staler(cancel_rx).await });
        }

        Ok(())
    }

    /// Terminate the child. Caller must hold the order lock, except for
    /// the staler which stops without touching the order.
    async fn stop_locked(&self, wait: bool) -> Result<()> {
        if !self.is_running() {
            self.unreconnect();
            return Ok(());
        }
        if self.state() == ProcessState::Finishing {
            return Ok(());
        }

        self.set_state(ProcessState::Finishing)?;

        let barrier = if wait {
            let barrier = Arc::new(Notify::new());
            let chained = Arc::clone(&barrier);
            let mut callbacks = self.inner.callbacks.lock();
            let prev = callbacks.on_exit.take();
            callbacks.on_exit = Some(Arc::new(move || {
                if let Some(prev) = &prev {
                    prev();
                }
                chained.notify_one();
            }));
            Some(barrier)
        } else {
            None
        };

        let pid = Pid::from_raw(self.inner.pid.load(Ordering::SeqCst) as i32);
        let signalled = match signal::kill(pid, Signal::SIGINT) {
            Ok(()) => {
                self.arm_kill_timer();
                Ok(())
            }
            Err(_) => signal::kill(pid, Signal::SIGKILL)
                .map_err(|err| Error::Signal(err.to_string())),
        };

        match signalled {
            Ok(()) => {
                if let Some(barrier) = barrier {
                    barrier.notified().await;
                }
                Ok(())
            }
            Err(err) => {
                self.inner.parser.parse(&err.to_string());
                let _ = self.set_state(ProcessState::Failed);
                Err(err)
            }
        }
    }

    fn arm_kill_timer(&self) {
        let this = self.clone();
        let mut kill_timer = self.inner.kill_timer.lock();
        if let Some(old) = kill_timer.take() {
            old.abort();
        }
        *kill_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(KILL_TIMEOUT).await;
            let pid = this.inner.pid.load(Ordering::SeqCst);
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }));
    }

    /// Consume the diagnostic stream line by line, then reap the child.
    async fn reader(self, child: Child, stderr: Option<ChildStderr>) {
        self.inner.parser.reset_stats();
        self.inner.parser.reset_log();

        if let Some(mut stderr) = stderr {
            let mut splitter = LineSplitter::new();
            let mut buf = [0u8; 4096];
            loop {
                match stderr.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        for line in splitter.feed(&buf[..n]) {
                            self.sink_line(&line);
                        }
                    }
                }
            }
            if let Some(line) = splitter.flush() {
                self.sink_line(&line);
            }
        }

        self.waiter(child).await;
    }

    fn sink_line(&self, line: &str) {
        if self.inner.parser.parse(line) != 0 {
            self.inner.stale.lock().last = Instant::now();
        }
    }

    /// Reap the child and commit the terminal state.
    async fn waiter(&self, mut child: Child) {
        let state = match child.wait().await {
            Ok(status) => match status.code() {
                // 255 is the transcoder's clean user-interrupt exit.
                Some(0) | Some(255) => ProcessState::Finished,
                Some(_) => ProcessState::Failed,
                None => ProcessState::Killed,
            },
            Err(_) => ProcessState::Killed,
        };
        let _ = self.set_state(state);

        self.inner.sampler.stop();

        if let Some(timer) = self.inner.kill_timer.lock().take() {
            timer.abort();
        }

        if let Some(cancel) = self.inner.stale.lock().cancel.take() {
            let _ = cancel.send(true);
        }

        self.inner.parser.reset_stats();

        if let Some(cb) = self.inner.callbacks.lock().on_exit.clone() {
            tokio::spawn(async move { cb() });
        }

        let order = self.inner.order.lock().await;
        if *order == Order::Start {
            self.schedule_reconnect();
        }
    }

    /// Watchdog that stops the child when no progress line arrives
    /// within the configured window.
    async fn staler(self, mut cancel: watch::Receiver<bool>) {
        self.inner.stale.lock().last = Instant::now();

        let mut ticker = tokio::time::interval(STALE_TICK);
        loop {
            tokio::select! {
                _ = cancel.changed() => return,
                _ = ticker.tick() => {
                    let (last, timeout) = {
                        let stale = self.inner.stale.lock();
                        (stale.last, stale.timeout)
                    };
                    if last.elapsed() > timeout {
                        debug!(binary = %self.inner.binary, "no progress within stale timeout, stopping");
                        let _ = self.stop_locked(false).await;
                        return;
                    }
                }
            }
        }
    }

    fn schedule_reconnect(&self) {
        if !self.inner.reconnect.lock().enable {
            return;
        }
        self.unreconnect();

        let mut reconnect = self.inner.reconnect.lock();
        let delay = reconnect.delay;
        reconnect.deadline = Some(Instant::now() + delay);

        let this = self.clone();
        reconnect.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _order = this.inner.order.lock().await;
            this.inner.reconnect.lock().deadline = None;
            if let Err(err) = this.start_locked() {
                debug!(error = %err, "reconnect failed");
            }
        }));
    }

    fn unreconnect(&self) {
        let mut reconnect = self.inner.reconnect.lock();
        if let Some(timer) = reconnect.timer.take() {
            timer.abort();
        }
        reconnect.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc() -> Process {
        Process::new(Config {
            binary: "sh".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn new_requires_binary() {
        assert!(matches!(
            Process::new(Config::default()),
            Err(Error::NoBinary)
        ));
    }

    #[test]
    fn initial_state_is_finished() {
        let p = proc();
        assert_eq!(p.state(), ProcessState::Finished);
        assert!(!p.is_running());
    }

    #[test]
    fn legal_lifecycle_transitions() {
        let p = proc();
        p.set_state(ProcessState::Starting).unwrap();
        p.set_state(ProcessState::Running).unwrap();
        p.set_state(ProcessState::Finishing).unwrap();
        p.set_state(ProcessState::Killed).unwrap();
        p.set_state(ProcessState::Starting).unwrap();
        p.set_state(ProcessState::Failed).unwrap();
        p.set_state(ProcessState::Starting).unwrap();
        p.set_state(ProcessState::Running).unwrap();
        p.set_state(ProcessState::Finished).unwrap();
    }

    #[test]
    fn illegal_transition_is_refused_and_not_applied() {
        let p = proc();
        let err = p.set_state(ProcessState::Running).unwrap_err();
        assert!(matches!(
            err,
            Error::IllegalTransition {
                from: ProcessState::Finished,
                to: ProcessState::Running,
            }
        ));
        assert_eq!(p.state(), ProcessState::Finished);
    }

    #[test]
    fn transitions_bump_destination_counters() {
        let p = proc();
        p.set_state(ProcessState::Starting).unwrap();
        p.set_state(ProcessState::Running).unwrap();
        p.set_state(ProcessState::Finished).unwrap();
        let counters = p.inner.state.lock().counters;
        assert_eq!(counters.starting, 1);
        assert_eq!(counters.running, 1);
        assert_eq!(counters.finished, 1);
        assert_eq!(counters.failed, 0);
    }

    #[test]
    fn running_covers_intermediate_states() {
        assert!(ProcessState::Starting.is_running());
        assert!(ProcessState::Running.is_running());
        assert!(ProcessState::Finishing.is_running());
        assert!(!ProcessState::Finished.is_running());
        assert!(!ProcessState::Failed.is_running());
        assert!(!ProcessState::Killed.is_running());
    }
}
