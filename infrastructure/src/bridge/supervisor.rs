//! Worker process supervision.
//!
//! [`ProcessSupervisor`] owns the single backend process slot. Starting a
//! worker spawns three background tasks:
//!
//! - **stdout reader**: frames lines with [`LineFramer`], publishes every
//!   line to the [`EventFanout`] and routes replies into the
//!   [`CorrelationTable`]. Undecodable or oversized lines are dropped; only
//!   an I/O error on the pipe tears the worker down.
//! - **stderr reader**: publishes each stderr line as
//!   [`BridgeEvent::BackendStderr`]; never correlated. Framed with the same
//!   length bound as stdout.
//! - **monitor**: owns the [`Child`], waits for it to exit (or kills it on
//!   shutdown), drains stdout, then rejects every pending request and frees
//!   the slot so `start()` may be called again.
//!
//! Lock order is always slot before table. The slot and table use
//! `std::sync::Mutex` and are never held across an `.await`; the worker's
//! stdin sits behind a `tokio::sync::Mutex` that is held for a whole write.
//!
//! Writes go through [`WorkerInput`]: a line is committed to a backlog in one
//! step and then written out. A writer cancelled part way leaves its line in
//! the backlog, and the next lease holder finishes it before committing its
//! own, so the worker always sees whole lines in commit order.

use crate::bridge::correlation::{CorrelationTable, ReplyReceiver, Ticket};
use crate::bridge::error::{BridgeError, Result};
use crate::bridge::fanout::{BridgeEvent, EventFanout};
use crate::bridge::framer::{FramerError, LineFramer};
use crate::bridge::protocol::{LineKind, classify_line, encode_line};
use omip_application::{TrafficEvent, TrafficLogger};
use omip_domain::{InboundMessage, ProcessState};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// How long the monitor waits for stdout to reach EOF after the worker exits.
const STDOUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) type SharedTable = Arc<Mutex<CorrelationTable>>;

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// How to launch the worker: an executable, an optional entry script, extra
/// arguments, and the directory relative paths are resolved against.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    program: PathBuf,
    script: Option<PathBuf>,
    args: Vec<OsString>,
    base_dir: Option<PathBuf>,
}

impl LaunchSpec {
    /// Launch `program` directly.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            script: None,
            args: Vec::new(),
            base_dir: None,
        }
    }

    /// Launch `interpreter` with `script` as its only argument.
    pub fn interpreter(interpreter: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self {
            script: Some(script.into()),
            ..Self::new(interpreter)
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Directory relative paths resolve against; also the worker's cwd.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Resolve the executable and script to concrete paths.
    ///
    /// A bare executable name (`python3`) is looked up on `PATH`; anything
    /// with a directory component is joined onto the base directory.
    pub fn locate(&self) -> Result<(PathBuf, Option<PathBuf>)> {
        let base = self.base_dir.as_deref().unwrap_or_else(|| Path::new("."));

        let is_bare = self.program.components().count() == 1 && !self.program.is_absolute();
        let program = if is_bare {
            which::which(&self.program).map_err(|e| {
                BridgeError::ExecutableNotFound(format!("{}: {}", self.program.display(), e))
            })?
        } else {
            let candidate = base.join(&self.program);
            if !candidate.is_file() {
                return Err(BridgeError::ExecutableNotFound(
                    candidate.display().to_string(),
                ));
            }
            candidate
        };

        let script = match &self.script {
            Some(script) => {
                let candidate = base.join(script);
                if !candidate.is_file() {
                    return Err(BridgeError::ExecutableNotFound(format!(
                        "worker script {}",
                        candidate.display()
                    )));
                }
                Some(candidate)
            }
            None => None,
        };

        Ok((program, script))
    }

    fn command(&self) -> Result<Command> {
        let (program, script) = self.locate()?;
        let mut cmd = Command::new(program);
        if let Some(script) = script {
            cmd.arg(script);
        }
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.base_dir {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }
}

impl std::fmt::Display for LaunchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        if let Some(script) = &self.script {
            write!(f, " {}", script.display())?;
        }
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// First reason recorded for tearing a worker down.
#[derive(Default)]
struct StopReason(Mutex<Option<String>>);

impl StopReason {
    fn set(&self, reason: String) {
        let mut slot = lock(&self.0);
        if slot.is_none() {
            *slot = Some(reason);
        }
    }

    fn take(&self) -> Option<String> {
        lock(&self.0).take()
    }
}

/// A worker's stdin plus whatever has been committed to it but not written.
pub struct WorkerInput<W = ChildStdin> {
    writer: W,
    backlog: BytesMut,
}

impl<W: AsyncWrite + Unpin> WorkerInput<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            backlog: BytesMut::new(),
        }
    }

    /// Queue a whole line. Never partially applied.
    pub fn commit(&mut self, line: &str) {
        self.backlog.extend_from_slice(line.as_bytes());
    }

    pub fn has_backlog(&self) -> bool {
        !self.backlog.is_empty()
    }

    /// Write out the backlog and flush.
    ///
    /// Cancel safe: bytes leave the backlog only once the pipe has taken
    /// them. On error the backlog is discarded, since the pipe is unusable.
    pub async fn drain(&mut self) -> std::io::Result<()> {
        let outcome = self.write_backlog().await;
        if outcome.is_err() {
            self.backlog.clear();
        }
        outcome
    }

    async fn write_backlog(&mut self) -> std::io::Result<()> {
        while !self.backlog.is_empty() {
            let written = self.writer.write(&self.backlog).await?;
            if written == 0 {
                return Err(std::io::ErrorKind::WriteZero.into());
            }
            self.backlog.advance(written);
        }
        self.writer.flush().await
    }
}

struct LiveProcess {
    generation: u64,
    pid: Option<u32>,
    input: Arc<tokio::sync::Mutex<WorkerInput>>,
    shutdown: CancellationToken,
    stop_reason: Arc<StopReason>,
    monitor: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct ProcessSlot {
    state: ProcessState,
    live: Option<LiveProcess>,
    next_generation: u64,
}

impl ProcessSlot {
    fn live_generation(&self) -> Option<u64> {
        self.live.as_ref().map(|l| l.generation)
    }
}

/// Exclusive write access to one worker's stdin.
///
/// Holding a lease serializes writers, so whatever is registered while the
/// lease is held reaches the wire in registration order.
pub struct InputLease {
    generation: u64,
    writer: OwnedMutexGuard<WorkerInput>,
}

/// Handles shared with the background tasks.
#[derive(Clone)]
struct TaskContext {
    slot: Arc<Mutex<ProcessSlot>>,
    table: SharedTable,
    fanout: EventFanout,
    traffic: Arc<dyn TrafficLogger>,
}

/// Owns the worker process lifecycle. At most one worker is alive at a time.
pub struct ProcessSupervisor {
    launch: LaunchSpec,
    max_line_length: usize,
    ctx: TaskContext,
}

impl ProcessSupervisor {
    pub(crate) fn new(
        launch: LaunchSpec,
        max_line_length: usize,
        table: SharedTable,
        fanout: EventFanout,
        traffic: Arc<dyn TrafficLogger>,
    ) -> Self {
        Self {
            launch,
            max_line_length,
            ctx: TaskContext {
                slot: Arc::new(Mutex::new(ProcessSlot::default())),
                table,
                fanout,
                traffic,
            },
        }
    }

    /// Spawn the worker. Only valid while `Stopped`.
    ///
    /// On failure every pending request is rejected, a
    /// [`BridgeEvent::StartFailed`] is published and the slot returns to
    /// `Stopped`. Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<Option<u32>> {
        let mut slot = lock(&self.ctx.slot);
        if !slot.state.can_start() {
            return Err(BridgeError::AlreadyRunning(slot.state));
        }
        slot.state = ProcessState::Starting;
        slot.next_generation += 1;
        let generation = slot.next_generation;

        debug!("Spawning backend: {}", self.launch);

        match self.spawn_worker(generation) {
            Ok(live) => {
                let pid = live.pid;
                slot.live = Some(live);
                slot.state = ProcessState::Running;
                Ok(pid)
            }
            Err(e) => {
                slot.state = ProcessState::Stopped;
                drop(slot);

                let reason = e.to_string();
                let rejected = lock(&self.ctx.table).reject_all(&reason);
                warn!(
                    "Backend failed to start: {} ({} pending request(s) rejected)",
                    reason, rejected
                );
                self.ctx.fanout.publish(BridgeEvent::StartFailed(reason));
                Err(e)
            }
        }
    }

    fn spawn_worker(&self, generation: u64) -> Result<LiveProcess> {
        let mut cmd = self.launch.command()?;

        // Linux: the kernel sends SIGTERM to the worker if we die without
        // running Drop (SIGKILL, OOM kill).
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(BridgeError::SpawnError)?;
        let pid = child.id();

        let (stdin, stdout, stderr) =
            match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
                (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
                (stdin, stdout, _) => {
                    let missing = if stdin.is_none() {
                        "stdin"
                    } else if stdout.is_none() {
                        "stdout"
                    } else {
                        "stderr"
                    };
                    if let Err(e) = child.start_kill() {
                        debug!("Failed to kill half-started backend: {}", e);
                    }
                    return Err(BridgeError::PipeUnavailable(missing));
                }
            };

        // Announce before the readers can publish any line.
        info!("Backend process started (pid {:?})", pid);
        self.ctx.fanout.publish(BridgeEvent::Started { pid });

        let shutdown = CancellationToken::new();
        let stop_reason = Arc::new(StopReason::default());

        let stdout_task = tokio::spawn(read_stdout(
            stdout,
            self.max_line_length,
            shutdown.clone(),
            Arc::clone(&stop_reason),
            self.ctx.clone(),
        ));
        tokio::spawn(read_stderr(
            stderr,
            self.max_line_length,
            shutdown.clone(),
            self.ctx.clone(),
        ));
        let monitor = tokio::spawn(monitor(
            child,
            generation,
            shutdown.clone(),
            Arc::clone(&stop_reason),
            stdout_task,
            self.ctx.clone(),
        ));

        Ok(LiveProcess {
            generation,
            pid,
            input: Arc::new(tokio::sync::Mutex::new(WorkerInput::new(stdin))),
            shutdown,
            stop_reason,
            monitor: Some(monitor),
        })
    }

    /// Kill the live worker and wait until its teardown has finished.
    ///
    /// Returns `false` if no worker was alive.
    pub async fn stop(&self) -> bool {
        let (monitor, shutdown) = {
            let mut slot = lock(&self.ctx.slot);
            let Some(live) = slot.live.as_mut() else {
                return false;
            };
            live.stop_reason.set("Backend process stopped".to_string());
            (live.monitor.take(), live.shutdown.clone())
        };

        info!("Stopping backend process");
        shutdown.cancel();
        if let Some(handle) = monitor
            && let Err(e) = handle.await
        {
            warn!("Backend monitor task failed: {}", e);
        }
        true
    }

    /// Take exclusive access to the live worker's stdin.
    pub async fn acquire_input(&self) -> Result<InputLease> {
        let (generation, input) = {
            let slot = lock(&self.ctx.slot);
            match &slot.live {
                Some(live) if slot.state.can_send() => (live.generation, Arc::clone(&live.input)),
                _ => return Err(BridgeError::NotRunning),
            }
        };
        let writer = input.lock_owned().await;
        Ok(InputLease { generation, writer })
    }

    /// Register a waiter for `command` on behalf of the lease holder.
    ///
    /// Fails if the leased worker has already been torn down, so nothing is
    /// ever registered after that worker's pending requests were rejected.
    pub(crate) fn register(
        &self,
        lease: &InputLease,
        command: &str,
        limit: Option<usize>,
    ) -> Result<(Ticket, ReplyReceiver)> {
        let slot = lock(&self.ctx.slot);
        if slot.live_generation() != Some(lease.generation) {
            return Err(BridgeError::ProcessClosed(
                "Backend process exited before the request was sent".to_string(),
            ));
        }
        let mut table = lock(&self.ctx.table);
        if let Some(limit) = limit
            && table.pending_for(command) >= limit
        {
            return Err(BridgeError::TooManyPending {
                command: command.to_string(),
                limit,
            });
        }
        Ok(table.enqueue(command))
    }

    /// Commit one already-encoded line (including its `\n`) to the lease.
    ///
    /// From here on the line reaches the worker unless the pipe breaks, even
    /// if the caller is cancelled before [`drain`](Self::drain) completes.
    pub fn commit_line(&self, lease: &mut InputLease, line: &str) {
        let trimmed = line.trim_end();
        trace!("Bridge sending: {}", trimmed);
        self.ctx.traffic.log(TrafficEvent::new(
            "outbound",
            serde_json::json!({ "line": trimmed }),
        ));
        lease.writer.commit(line);
    }

    /// Write out everything committed on this lease so far.
    pub async fn drain(&self, lease: &mut InputLease) -> Result<()> {
        if lease.writer.has_backlog() {
            debug!("Bridge: finishing a line left by a cancelled writer");
        }
        lease.writer.drain().await.map_err(BridgeError::SendFailed)
    }

    /// Finish any earlier backlog, then commit and write `line`.
    pub async fn write_line(&self, lease: &mut InputLease, line: &str) -> Result<()> {
        self.drain(lease).await?;
        self.commit_line(lease, line);
        lease.writer.drain().await.map_err(BridgeError::SendFailed)
    }

    /// Serialize `payload` as one JSON line and write it to the worker.
    ///
    /// Fails with [`BridgeError::NotRunning`] when no worker is alive.
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let line = encode_line(payload)?;
        let mut lease = self.acquire_input().await?;
        self.write_line(&mut lease, &line).await
    }

    pub fn state(&self) -> ProcessState {
        lock(&self.ctx.slot).state
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessState::Running
    }

    pub fn pid(&self) -> Option<u32> {
        lock(&self.ctx.slot).live.as_ref().and_then(|l| l.pid)
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        let slot = lock(&self.ctx.slot);
        if let Some(live) = &slot.live {
            debug!("ProcessSupervisor dropping, killing backend process");
            live.stop_reason.set("Backend bridge shut down".to_string());
            live.shutdown.cancel();
        }
    }
}

/// Background stdout reader: single owner of the worker's stdout.
async fn read_stdout(
    stdout: ChildStdout,
    max_line_length: usize,
    shutdown: CancellationToken,
    stop_reason: Arc<StopReason>,
    ctx: TaskContext,
) {
    let mut framer = LineFramer::with_max_length(stdout, max_line_length);

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = framer.next_line() => next,
        };

        match next {
            Some(Ok(line)) => route_line(&line, &ctx),
            Some(Err(FramerError::LineTooLong(limit))) => {
                warn!("Bridge: dropping backend line over {} bytes", limit);
                ctx.traffic.log(TrafficEvent::new(
                    "dropped",
                    serde_json::json!({ "limit": limit }),
                ));
                ctx.fanout.publish(BridgeEvent::LineDropped { limit });
            }
            Some(Err(e)) => {
                warn!("Backend stdout read failed: {}", e);
                ctx.fanout.publish(BridgeEvent::ReadFailed(e.to_string()));
                stop_reason.set(format!("Backend stdout read failed: {}", e));
                shutdown.cancel();
                break;
            }
            None => {
                debug!("Backend stdout closed");
                break;
            }
        }
    }
}

/// Fan a line out to observers and, if it is a reply, settle its waiter.
fn route_line(line: &str, ctx: &TaskContext) {
    trace!("Bridge received: {}", line);
    ctx.traffic
        .log(TrafficEvent::new("inbound", serde_json::json!({ "line": line })));

    match classify_line(line) {
        LineKind::Reply(msg) => {
            ctx.fanout.publish(BridgeEvent::Line {
                raw: line.to_string(),
                message: Some(InboundMessage::classify(&msg)),
            });
            lock(&ctx.table).fulfill_one(msg);
        }
        LineKind::Event(msg) => {
            ctx.fanout.publish(BridgeEvent::Line {
                raw: line.to_string(),
                message: Some(InboundMessage::classify(&msg)),
            });
        }
        LineKind::Malformed(e) => {
            warn!("Bridge: dropping non-JSON backend line: {} ({})", line, e);
            ctx.fanout.publish(BridgeEvent::Line {
                raw: line.to_string(),
                message: None,
            });
        }
    }
}

/// Keeps the stderr pipe drained for the worker's whole life.
async fn read_stderr(
    stderr: ChildStderr,
    max_line_length: usize,
    shutdown: CancellationToken,
    ctx: TaskContext,
) {
    let mut framer = LineFramer::with_max_length(stderr, max_line_length);

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = framer.next_line() => next,
        };

        match next {
            Some(Ok(line)) => {
                warn!("Backend stderr: {}", line);
                ctx.traffic
                    .log(TrafficEvent::new("stderr", serde_json::json!({ "line": line })));
                ctx.fanout.publish(BridgeEvent::BackendStderr(line));
            }
            Some(Err(FramerError::LineTooLong(limit))) => {
                warn!("Backend stderr: skipped a line over {} bytes", limit);
            }
            Some(Err(e)) => {
                debug!("Backend stderr read failed: {}", e);
                break;
            }
            None => break,
        }
    }
}

/// Owns the child until it exits, then tears the slot down.
async fn monitor(
    mut child: Child,
    generation: u64,
    shutdown: CancellationToken,
    stop_reason: Arc<StopReason>,
    mut stdout_task: JoinHandle<()>,
    ctx: TaskContext,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = shutdown.cancelled() => {
            if let Err(e) = child.start_kill() {
                debug!("Backend kill failed: {}", e);
            }
            child.wait().await
        }
    };

    let described = match &status {
        Ok(status) => describe_exit(*status),
        Err(e) => format!("Backend process error: {}", e),
    };
    debug!("{} (generation {})", described, generation);

    // Deliver replies printed before exit.
    if tokio::time::timeout(STDOUT_DRAIN_TIMEOUT, &mut stdout_task)
        .await
        .is_err()
    {
        debug!("Backend stdout still open after exit, closing reader");
        shutdown.cancel();
        let _ = stdout_task.await;
    }
    shutdown.cancel();

    let reason = stop_reason.take().unwrap_or(described);

    let rejected = {
        let mut slot = lock(&ctx.slot);
        if slot.live_generation() == Some(generation) {
            let rejected = lock(&ctx.table).reject_all(&reason);
            slot.live = None;
            slot.state = ProcessState::Stopped;
            Some(rejected)
        } else {
            None
        }
    };

    match rejected {
        Some(count) => {
            info!("{} ({} pending request(s) rejected)", reason, count);
            ctx.traffic.log(TrafficEvent::new(
                "exit",
                serde_json::json!({ "reason": reason, "rejected": count }),
            ));
            ctx.fanout.publish(BridgeEvent::Exited(reason));
        }
        None => debug!("Stale backend monitor (generation {}) finished", generation),
    }
}

/// Human-readable exit description: code, or signal on Unix.
pub fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("Backend process exited with code {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("Backend process terminated by signal {}", signal);
        }
    }
    format!("Backend process exited ({})", status)
}
