use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use ffctl_process::{Config, Error, LineSink, LogLine, Process, ProcessState};

fn shell(script: &str) -> Config {
    Config {
        binary: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        ..Default::default()
    }
}

async fn wait_for<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    cond()
}

#[tokio::test]
async fn start_reaches_running_then_stop_terminates() {
    let process = Process::new(shell("sleep 5")).unwrap();
    process.start().await.unwrap();

    assert!(wait_for(|| process.state() == ProcessState::Running, Duration::from_secs(2)).await);
    assert!(process.is_running());

    process.stop(true).await.unwrap();
    assert!(!process.is_running());
    assert!(matches!(
        process.state(),
        ProcessState::Finished | ProcessState::Killed
    ));
}

#[tokio::test]
async fn start_is_idempotent_under_same_order() {
    let process = Process::new(shell("sleep 5")).unwrap();
    process.start().await.unwrap();
    process.start().await.unwrap();

    assert_eq!(process.status().await.states.starting, 1);

    process.stop(true).await.unwrap();
}

#[tokio::test]
async fn clean_exit_is_finished() {
    let process = Process::new(shell("exit 0")).unwrap();
    process.start().await.unwrap();
    assert!(wait_for(|| process.state() == ProcessState::Finished, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn exit_255_is_finished() {
    let process = Process::new(shell("exit 255")).unwrap();
    process.start().await.unwrap();
    assert!(wait_for(|| process.state() == ProcessState::Finished, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn other_exit_codes_are_failed() {
    let process = Process::new(shell("exit 3")).unwrap();
    process.start().await.unwrap();
    assert!(wait_for(|| process.state() == ProcessState::Failed, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn interrupt_handler_exit_finishes_clean() {
    let process =
        Process::new(shell("trap 'exit 0' INT; while true; do sleep 0.1; done")).unwrap();
    process.start().await.unwrap();
    assert!(wait_for(|| process.state() == ProcessState::Running, Duration::from_secs(2)).await);

    process.stop(true).await.unwrap();
    assert!(
        wait_for(|| process.state() == ProcessState::Finished, Duration::from_secs(2)).await,
        "expected finished, got {}",
        process.state()
    );
}

#[tokio::test]
async fn stop_escalates_to_kill_and_fires_on_exit_once() {
    let exits = Arc::new(AtomicUsize::new(0));
    let on_exit = {
        let exits = Arc::clone(&exits);
        Arc::new(move || {
            exits.fetch_add(1, Ordering::SeqCst);
        }) as Arc<dyn Fn() + Send + Sync>
    };

    let process = Process::new(Config {
        on_exit: Some(on_exit),
        ..shell("trap '' INT; exec sleep 30")
    })
    .unwrap();

    process.start().await.unwrap();
    assert!(wait_for(|| process.state() == ProcessState::Running, Duration::from_secs(2)).await);

    // The child ignores the interrupt, so this returns only after the
    // kill-timer escalation.
    tokio::time::timeout(Duration::from_secs(8), process.stop(true))
        .await
        .expect("stop(wait) did not return within the escalation window")
        .unwrap();

    assert!(matches!(
        process.state(),
        ProcessState::Killed | ProcessState::Finished
    ));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(exits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn kill_terminates_without_changing_order() {
    let process = Process::new(shell("sleep 5")).unwrap();
    process.start().await.unwrap();
    assert!(wait_for(|| process.state() == ProcessState::Running, Duration::from_secs(2)).await);

    process.kill(true).await.unwrap();
    assert!(!process.is_running());
    assert_eq!(process.status().await.order.to_string(), "start");
}

#[tokio::test]
async fn spawn_failure_is_failed_and_returned() {
    let process = Process::new(Config {
        binary: "/nonexistent/transcoder-binary".to_string(),
        ..Default::default()
    })
    .unwrap();

    let err = process.start().await.unwrap_err();
    assert!(matches!(err, Error::Spawn(_)));
    assert_eq!(process.state(), ProcessState::Failed);
}

#[tokio::test]
async fn reconnect_respawns_after_crash() {
    let process = Process::new(Config {
        reconnect: true,
        reconnect_delay: Duration::from_secs(1),
        ..shell("sleep 0.2; exit 1")
    })
    .unwrap();

    process.start().await.unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let status = process.status().await;
        if status.states.starting >= 2 {
            assert!(status.states.failed >= 1);
            break;
        }
        assert!(
            Instant::now() < deadline,
            "no reconnect observed: {:?}",
            status.states
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let _ = process.stop(true).await;
}

#[tokio::test]
async fn stop_cancels_pending_reconnect() {
    let process = Process::new(Config {
        reconnect: true,
        reconnect_delay: Duration::from_secs(10),
        ..shell("exit 1")
    })
    .unwrap();

    process.start().await.unwrap();

    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if process.status().await.reconnect_in.is_some() {
            break;
        }
        assert!(Instant::now() < deadline, "reconnect was never armed");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    process.stop(false).await.unwrap();

    let status = process.status().await;
    assert_eq!(status.reconnect_in, None);
    assert_eq!(status.states.starting, 1);
}

#[tokio::test]
async fn stale_timeout_stops_a_silent_child() {
    let process = Process::new(Config {
        stale_timeout: Duration::from_secs(2),
        ..shell("sleep 30")
    })
    .unwrap();

    process.start().await.unwrap();
    assert!(wait_for(|| process.state() == ProcessState::Running, Duration::from_secs(2)).await);

    assert!(
        wait_for(|| !process.is_running(), Duration::from_secs(6)).await,
        "stale child was not stopped"
    );
    assert!(matches!(
        process.state(),
        ProcessState::Killed | ProcessState::Finished
    ));
}

#[tokio::test]
async fn sampler_reads_zero_after_exit() {
    let process = Process::new(shell("sleep 5")).unwrap();
    process.start().await.unwrap();
    assert!(wait_for(|| process.state() == ProcessState::Running, Duration::from_secs(2)).await);

    process.stop(true).await.unwrap();

    let status = process.status().await;
    assert_eq!(status.cpu_current, 0.0);
    assert_eq!(status.memory_current, 0);
}

struct RecordingSink {
    lines: Mutex<Vec<String>>,
    stat_resets: AtomicUsize,
    log_resets: AtomicUsize,
}

impl RecordingSink {
    fn new() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            stat_resets: AtomicUsize::new(0),
            log_resets: AtomicUsize::new(0),
        }
    }
}

impl LineSink for RecordingSink {
    fn parse(&self, line: &str) -> u64 {
        self.lines.lock().push(line.to_string());
        0
    }

    fn reset_stats(&self) {
        self.stat_resets.fetch_add(1, Ordering::SeqCst);
    }

    fn reset_log(&self) {
        self.log_resets.fetch_add(1, Ordering::SeqCst);
    }

    fn log(&self) -> Vec<LogLine> {
        Vec::new()
    }
}

#[tokio::test]
async fn reader_feeds_diagnostic_lines_in_order() {
    let sink = Arc::new(RecordingSink::new());

    let process = Process::new(Config {
        parser: Some(Arc::clone(&sink) as Arc<dyn LineSink>),
        ..shell("echo one >&2; echo two >&2; printf 'three\\r' >&2")
    })
    .unwrap();

    process.start().await.unwrap();
    assert!(wait_for(|| process.state() == ProcessState::Finished, Duration::from_secs(2)).await);

    let lines = sink.lines.lock().clone();
    assert_eq!(lines, vec!["one", "two", "three"]);

    // Stats are reset before the first read and again on terminal exit.
    assert_eq!(sink.stat_resets.load(Ordering::SeqCst), 2);
    assert_eq!(sink.log_resets.load(Ordering::SeqCst), 1);
}
