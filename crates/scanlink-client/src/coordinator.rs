//! Multi-sensor coordination
//!
//! Each device gets a worker thread that exclusively owns its [`ScanStream`].
//! A poll cycle sends one read request to every idle worker and collects the
//! replies until all of them answered or the cycle deadline passed:
//!
//! ```text
//!            ┌── Poll{cycle, timeout} ──▶ worker A ── stream A.next() ──┐
//! poll_all ──┼── Poll{cycle, timeout} ──▶ worker B ── stream B.next() ──┼──▶ replies
//!            └── (A still busy: skipped, NoData this cycle)             │
//!                                ◀──────────────────────────────────────┘
//! ```
//!
//! A worker that misses the deadline is not asked again until its reply
//! arrives, so a stalled device never delays the others by more than one
//! cycle deadline and never queues up requests.

use crate::thread::JoinTimeout;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use scanlink_driver::{MetricsSnapshot, ScanOutcome, ScanStream, SessionError, SessionMetrics};
use scanlink_protocol::{CaptureTime, DeviceTag, ScanBatch};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// Coordinator setup errors
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("No devices to coordinate")]
    NoDevices,

    #[error("Device tag {0} is used twice")]
    DuplicateTag(DeviceTag),

    #[error("Failed to spawn worker for {tag}: {source}")]
    Spawn {
        tag: DeviceTag,
        #[source]
        source: std::io::Error,
    },
}

/// Coordinator timing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorConfig {
    /// Read timeout handed to every device each cycle
    pub per_device_timeout: Duration,
    /// Extra wait for replies beyond the read timeout
    pub reply_grace: Duration,
    /// Consecutive cycles without a batch before a device counts as lost (0: never)
    pub loss_threshold: u32,
    /// Bound for joining each worker at shutdown
    pub join_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            per_device_timeout: Duration::from_millis(200),
            reply_grace: Duration::from_millis(20),
            loss_threshold: 10,
            join_timeout: Duration::from_secs(2),
        }
    }
}

/// One device's result for one cycle
#[derive(Debug)]
pub enum PollResult {
    Batch(ScanBatch),
    NoData,
    Error(SessionError),
}

impl PollResult {
    pub fn is_batch(&self) -> bool {
        matches!(self, PollResult::Batch(_))
    }
}

/// A device silent for `consecutive_misses` cycles
///
/// Reported once when the threshold is reached; polling continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSensorLoss {
    pub tag: DeviceTag,
    pub consecutive_misses: u32,
}

/// Everything one `poll_all` call produced
#[derive(Debug)]
pub struct PollCycle {
    pub cycle: u64,
    /// Shared by every batch of this cycle
    pub capture_time: CaptureTime,
    /// One entry per device, in registration order
    pub entries: Vec<(DeviceTag, PollResult)>,
    /// Devices that crossed the loss threshold this cycle
    pub losses: Vec<PartialSensorLoss>,
}

impl PollCycle {
    pub fn batches(&self) -> impl Iterator<Item = &ScanBatch> {
        self.entries.iter().filter_map(|(_, r)| match r {
            PollResult::Batch(b) => Some(b),
            _ => None,
        })
    }

    pub fn result_for(&self, tag: &str) -> Option<&PollResult> {
        self.entries.iter().find(|(t, _)| t.as_str() == tag).map(|(_, r)| r)
    }
}

enum Command {
    Poll { cycle: u64, timeout: Duration },
    Shutdown,
}

struct Reply {
    index: usize,
    cycle: u64,
    result: PollResult,
}

struct Worker {
    tag: DeviceTag,
    commands: Option<Sender<Command>>,
    handle: Option<JoinHandle<()>>,
    metrics: Arc<SessionMetrics>,
    /// A request is outstanding
    busy: bool,
    /// The worker thread is gone
    exited: bool,
    misses: u32,
    lost: bool,
}

/// Polls N devices without letting one stall the rest
pub struct MultiSensorCoordinator {
    workers: Vec<Worker>,
    replies: Receiver<Reply>,
    config: CoordinatorConfig,
    cycle: u64,
}

impl MultiSensorCoordinator {
    /// Spawn one worker per stream
    ///
    /// Tags must be unique. On error every stream handed in is closed.
    pub fn new(
        streams: Vec<ScanStream>,
        config: CoordinatorConfig,
    ) -> Result<Self, CoordinatorError> {
        if streams.is_empty() {
            return Err(CoordinatorError::NoDevices);
        }
        let mut seen = HashSet::new();
        for stream in &streams {
            if !seen.insert(stream.tag().clone()) {
                return Err(CoordinatorError::DuplicateTag(stream.tag().clone()));
            }
        }

        let (reply_tx, replies) = crossbeam_channel::unbounded();
        let mut coordinator = Self {
            workers: Vec::with_capacity(streams.len()),
            replies,
            config,
            cycle: 0,
        };

        for (index, stream) in streams.into_iter().enumerate() {
            let tag = stream.tag().clone();
            let metrics = stream.metrics();
            let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(1);
            let reply_tx = reply_tx.clone();

            let handle = std::thread::Builder::new()
                .name(format!("scanlink-{}", index))
                .spawn(move || worker_loop(index, stream, cmd_rx, reply_tx))
                .map_err(|source| CoordinatorError::Spawn {
                    tag: tag.clone(),
                    source,
                })?;

            debug!("Worker {} started for {}", index, tag);
            coordinator.workers.push(Worker {
                tag,
                commands: Some(cmd_tx),
                handle: Some(handle),
                metrics,
                busy: false,
                exited: false,
                misses: 0,
                lost: false,
            });
        }
        info!("Coordinating {} device(s)", coordinator.workers.len());
        Ok(coordinator)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn tags(&self) -> Vec<DeviceTag> {
        self.workers.iter().map(|w| w.tag.clone()).collect()
    }

    /// Per-device counters
    pub fn metrics(&self) -> Vec<(DeviceTag, MetricsSnapshot)> {
        self.workers.iter().map(|w| (w.tag.clone(), w.metrics.snapshot())).collect()
    }

    /// Devices currently past the loss threshold
    pub fn lost_devices(&self) -> Vec<DeviceTag> {
        self.workers.iter().filter(|w| w.lost).map(|w| w.tag.clone()).collect()
    }

    /// One poll cycle
    ///
    /// Returns after every dispatched device answered, or after
    /// `per_device_timeout + reply_grace` at the latest.
    pub fn poll_all(&mut self, per_device_timeout: Duration) -> PollCycle {
        self.cycle += 1;
        let cycle = self.cycle;
        let capture_time = CaptureTime::now();
        let mut results: Vec<Option<PollResult>> = self.workers.iter().map(|_| None).collect();

        let mut pending = 0usize;
        for worker in &mut self.workers {
            if worker.busy || worker.exited {
                continue;
            }
            let Some(commands) = &worker.commands else {
                continue;
            };
            match commands.try_send(Command::Poll {
                cycle,
                timeout: per_device_timeout,
            }) {
                Ok(()) => {
                    worker.busy = true;
                    pending += 1;
                },
                Err(TrySendError::Full(_)) => {
                    trace!("{}: request still queued", worker.tag);
                },
                Err(TrySendError::Disconnected(_)) => {
                    error!("Worker for {} exited", worker.tag);
                    worker.exited = true;
                },
            }
        }

        let deadline = Instant::now() + per_device_timeout + self.config.reply_grace;
        while pending > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.replies.recv_timeout(remaining) {
                Ok(reply) => {
                    if reply.cycle == cycle {
                        pending -= 1;
                    }
                    self.accept_reply(reply, cycle, &mut results);
                },
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        // Late replies from earlier cycles that are already waiting
        while let Ok(reply) = self.replies.try_recv() {
            self.accept_reply(reply, cycle, &mut results);
        }

        let mut entries = Vec::with_capacity(self.workers.len());
        let mut losses = Vec::new();
        for (worker, result) in self.workers.iter_mut().zip(results) {
            let result = match result {
                Some(PollResult::Batch(batch)) => {
                    PollResult::Batch(batch.with_capture_time(capture_time))
                },
                Some(other) => other,
                None => {
                    if worker.busy {
                        trace!("{}: no reply in cycle {}", worker.tag, cycle);
                    }
                    PollResult::NoData
                },
            };

            if result.is_batch() {
                if worker.lost {
                    info!("{} recovered after {} missed cycle(s)", worker.tag, worker.misses);
                }
                worker.misses = 0;
                worker.lost = false;
            } else {
                worker.misses = worker.misses.saturating_add(1);
                let threshold = self.config.loss_threshold;
                if threshold > 0 && worker.misses >= threshold && !worker.lost {
                    worker.lost = true;
                    warn!(
                        "Partial sensor loss: {} silent for {} cycle(s)",
                        worker.tag, worker.misses
                    );
                    losses.push(PartialSensorLoss {
                        tag: worker.tag.clone(),
                        consecutive_misses: worker.misses,
                    });
                }
            }
            entries.push((worker.tag.clone(), result));
        }

        PollCycle {
            cycle,
            capture_time,
            entries,
            losses,
        }
    }

    fn accept_reply(&mut self, reply: Reply, cycle: u64, results: &mut [Option<PollResult>]) {
        let Some(worker) = self.workers.get_mut(reply.index) else {
            return;
        };
        worker.busy = false;
        if reply.cycle != cycle {
            debug!(
                "{}: late reply from cycle {} delivered in cycle {}",
                worker.tag, reply.cycle, cycle
            );
        }
        if let PollResult::Error(e) = &reply.result {
            warn!("{}: {}", worker.tag, e);
        }
        results[reply.index] = Some(reply.result);
    }

    /// Stop every worker; each closes its stream before exiting
    ///
    /// Joins are bounded by `join_timeout` per worker. A worker still blocked
    /// in its driver when the bound expires is detached: it is logged at
    /// `error` level and closes its stream only once the driver call returns,
    /// so its device may still be open when this returns. Idempotent.
    pub fn shutdown(&mut self) {
        for worker in &mut self.workers {
            if let Some(commands) = worker.commands.take() {
                // A full channel means a poll is queued; dropping the sender
                // ends the worker right after it.
                let _ = commands.try_send(Command::Shutdown);
            }
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take()
                && handle.join_timeout(self.config.join_timeout).is_err()
            {
                error!(
                    "Worker for {} did not exit within {:?}; its device may still be open",
                    worker.tag, self.config.join_timeout
                );
            }
            worker.exited = true;
        }
    }
}

impl Drop for MultiSensorCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    index: usize,
    mut stream: ScanStream,
    commands: Receiver<Command>,
    replies: Sender<Reply>,
) {
    while let Ok(command) = commands.recv() {
        match command {
            Command::Poll { cycle, timeout } => {
                let result = match stream.next(timeout) {
                    Ok(ScanOutcome::Batch(batch)) => PollResult::Batch(batch),
                    Ok(ScanOutcome::NoData) => PollResult::NoData,
                    Err(e) => PollResult::Error(e),
                };
                if replies
                    .send(Reply {
                        index,
                        cycle,
                        result,
                    })
                    .is_err()
                {
                    break;
                }
            },
            Command::Shutdown => break,
        }
    }
    // Failures are logged by the session
    let _ = stream.close();
    debug!("Worker for {} closed", stream.tag());
}
