// Upscaler process management
// Spawns one engine process, streams its stderr lines and reports how it ended

use crate::upscale::command_builder::InvocationDescriptor;
use log::{debug, warn};
use serde::Serialize;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Notify};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessExit {
    ExitedCleanly,
    /// Non-zero exit code, or killed by a signal (no code)
    ExitedWithSignal { code: Option<i32> },
    FailedToLaunch { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    Line(String),
    Exited(ProcessExit),
}

#[derive(Debug, Default)]
struct ProcessControl {
    cancelled: AtomicBool,
    exited: AtomicBool,
    pid: AtomicU32,
    kill: Notify,
}

/// Cancellation side of a running process. Cheap to clone; every clone controls
/// the same process.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    control: Arc<ProcessControl>,
}

impl ProcessHandle {
    fn new() -> Self {
        Self {
            control: Arc::new(ProcessControl::default()),
        }
    }

    /// Request immediate termination. Idempotent, and a no-op once the process has exited.
    pub fn cancel(&self) {
        if self.control.exited.load(Ordering::SeqCst) {
            return;
        }
        if !self.control.cancelled.swap(true, Ordering::SeqCst) {
            self.control.kill.notify_one();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.cancelled.load(Ordering::SeqCst)
    }

    pub fn has_exited(&self) -> bool {
        self.control.exited.load(Ordering::SeqCst)
    }

    pub fn pid(&self) -> Option<u32> {
        match self.control.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }
}

/// Event stream of one process. Yields nothing once its handle is cancelled.
#[derive(Debug)]
pub struct ProcessEvents {
    handle: ProcessHandle,
    rx: mpsc::UnboundedReceiver<ProcessEvent>,
}

impl ProcessEvents {
    pub async fn recv(&mut self) -> Option<ProcessEvent> {
        if self.handle.is_cancelled() {
            return None;
        }
        let event = self.rx.recv().await?;
        if self.handle.is_cancelled() {
            return None;
        }
        Some(event)
    }
}

#[derive(Debug)]
pub struct RunningProcess {
    pub handle: ProcessHandle,
    pub events: ProcessEvents,
}

impl RunningProcess {
    /// Pair a handle with a hand-fed event channel, for driving controllers without a real process.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedSender<ProcessEvent>) {
        let handle = ProcessHandle::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let process = RunningProcess {
            handle: handle.clone(),
            events: ProcessEvents { handle, rx },
        };
        (process, tx)
    }
}

/// Launch the engine described by `descriptor`. Must be called inside a Tokio runtime.
///
/// Never fails synchronously: a spawn error arrives as `ProcessExit::FailedToLaunch`.
pub fn start(descriptor: &InvocationDescriptor) -> RunningProcess {
    let handle = ProcessHandle::new();
    let (tx, rx) = mpsc::unbounded_channel();

    let mut cmd = Command::new(&descriptor.program);
    cmd.args(&descriptor.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &descriptor.working_dir {
        cmd.current_dir(dir);
    }

    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);

    debug!("Spawning upscaler: {}", descriptor.command_line());
    tokio::spawn(supervise(cmd, handle.clone(), tx));

    RunningProcess {
        handle: handle.clone(),
        events: ProcessEvents { handle, rx },
    }
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill upscaler process {:?}: {}", child.id(), e);
    }
}

async fn supervise(mut cmd: Command, handle: ProcessHandle, tx: mpsc::UnboundedSender<ProcessEvent>) {
    let control = handle.control.clone();

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            control.exited.store(true, Ordering::SeqCst);
            let _ = tx.send(ProcessEvent::Exited(ProcessExit::FailedToLaunch {
                reason: e.to_string(),
            }));
            return;
        }
    };

    if let Some(pid) = child.id() {
        control.pid.store(pid, Ordering::SeqCst);
    }

    if let Some(stderr) = child.stderr.take() {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            tokio::select! {
                biased;
                _ = control.kill.notified() => {
                    terminate(&mut child).await;
                    control.exited.store(true, Ordering::SeqCst);
                    return;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let _ = tx.send(ProcessEvent::Line(line));
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read upscaler output: {}", e);
                        break;
                    }
                },
            }
        }
    }

    let status = tokio::select! {
        biased;
        _ = control.kill.notified() => {
            terminate(&mut child).await;
            control.exited.store(true, Ordering::SeqCst);
            return;
        }
        status = child.wait() => status,
    };

    control.exited.store(true, Ordering::SeqCst);
    let exit = match status {
        Ok(status) if status.success() => ProcessExit::ExitedCleanly,
        Ok(status) => ProcessExit::ExitedWithSignal {
            code: status.code(),
        },
        Err(e) => {
            warn!("Failed to wait for upscaler process: {}", e);
            ProcessExit::ExitedWithSignal { code: None }
        }
    };
    debug!("Upscaler process {:?} finished: {:?}", handle.pid(), exit);
    let _ = tx.send(ProcessEvent::Exited(exit));
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::upscale::command_builder::Executable;
    use std::path::PathBuf;
    use std::time::Duration;

    fn shell(script: &str) -> InvocationDescriptor {
        InvocationDescriptor {
            executable: Executable::Upscayl,
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: None,
            input: PathBuf::new(),
            output: PathBuf::new(),
            scale_substitution: None,
        }
    }

    async fn collect(mut process: RunningProcess) -> Vec<ProcessEvent> {
        let mut events = Vec::new();
        while let Some(event) = process.events.recv().await {
            let done = matches!(event, ProcessEvent::Exited(_));
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn test_streams_stderr_lines_then_exit() {
        let process = start(&shell("echo ignored; echo 10.00% >&2; echo 55.5% >&2"));
        let events = collect(process).await;
        assert_eq!(
            events,
            vec![
                ProcessEvent::Line("10.00%".to_string()),
                ProcessEvent::Line("55.5%".to_string()),
                ProcessEvent::Exited(ProcessExit::ExitedCleanly),
            ]
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let events = collect(start(&shell("exit 3"))).await;
        assert_eq!(
            events,
            vec![ProcessEvent::Exited(ProcessExit::ExitedWithSignal { code: Some(3) })]
        );
    }

    #[tokio::test]
    async fn test_missing_executable_reports_failed_to_launch() {
        let mut descriptor = shell("");
        descriptor.program = PathBuf::from("/nonexistent/upscayl-bin");
        descriptor.args.clear();
        let events = collect(start(&descriptor)).await;
        assert!(matches!(
            events.as_slice(),
            [ProcessEvent::Exited(ProcessExit::FailedToLaunch { .. })]
        ));
    }

    #[tokio::test]
    async fn test_cancel_stops_events_and_kills() {
        let mut process = start(&shell("echo 1% >&2; sleep 30; echo 99% >&2"));
        let first = process.events.recv().await;
        assert_eq!(first, Some(ProcessEvent::Line("1%".to_string())));

        process.handle.cancel();
        process.handle.cancel();
        assert!(process.handle.is_cancelled());
        assert_eq!(process.events.recv().await, None);

        for _ in 0..100 {
            if process.handle.has_exited() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(process.handle.has_exited());
    }

    #[tokio::test]
    async fn test_cancel_after_exit_is_noop() {
        let mut process = start(&shell("true"));
        while let Some(event) = process.events.recv().await {
            if matches!(event, ProcessEvent::Exited(_)) {
                break;
            }
        }
        assert!(process.handle.has_exited());
        process.handle.cancel();
        assert!(!process.handle.is_cancelled());
    }
}
