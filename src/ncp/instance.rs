//! NCP instance: the single-active-task dispatcher.
//!
//! The instance owns every submitted [`Task`] until it is retired. At most one
//! task is `Active`; the rest wait in a FIFO queue. Inbound frames are decoded
//! with the instance's [`FrameCodec`] and handed to the active task, and the
//! frames a task emits are encoded into an unbounded outbound queue that the
//! driver drains onto the transport.
//!
//! The instance never blocks and never looks at a clock on its own: the driver
//! reads [`NcpInstance::deadline`] and calls [`NcpInstance::on_timeout`] (or
//! [`NcpInstance::poll_timeout`]) when it passes.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};
use serde::Serialize;

use super::error::{NcpError, NcpResult};
use super::task::{NcpEvent, Outbox, Task, TaskId, TaskKind, TaskSignal, TaskState, TaskStatus};
use super::value::ResultValue;
use crate::logutil::{escape_log, hex_snippet};
use crate::metrics;
use crate::spinel::{prop, status, FrameCodec, SpinelCodec};

pub const DEFAULT_PROPERTY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_OUTBOUND_HIGH_WATER: usize = 64;

/// Timeouts and queue limits applied by the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceTuning {
    pub property_timeout: Duration,
    pub scan_timeout: Duration,
    /// Outbound depth above which a warning is logged. The queue itself is unbounded.
    pub outbound_high_water: usize,
}

impl Default for InstanceTuning {
    fn default() -> Self {
        Self {
            property_timeout: DEFAULT_PROPERTY_TIMEOUT,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            outbound_high_water: DEFAULT_OUTBOUND_HIGH_WATER,
        }
    }
}

impl InstanceTuning {
    pub fn timeout_for(&self, kind: &TaskKind) -> Duration {
        match kind {
            TaskKind::Scan(_) => self.scan_timeout,
            TaskKind::Property(_) => self.property_timeout,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceStats {
    pub active: Option<TaskId>,
    pub pending: usize,
    pub outbound_queued: usize,
    pub submitted: u64,
    pub succeeded: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub protocol_errors: u64,
    /// Decoded frames that arrived with no active task.
    pub frames_discarded: u64,
    pub decode_errors: u64,
    pub ncp_resets: u64,
}

pub struct NcpInstance<C: FrameCodec = SpinelCodec> {
    codec: C,
    tuning: InstanceTuning,
    active: Option<Task>,
    pending: VecDeque<Task>,
    outbound: VecDeque<Vec<u8>>,
    deadline: Option<Instant>,
    above_high_water: bool,
    stats: InstanceStats,
}

impl<C: FrameCodec> NcpInstance<C> {
    pub fn new(codec: C, tuning: InstanceTuning) -> Self {
        Self {
            codec,
            tuning,
            active: None,
            pending: VecDeque::new(),
            outbound: VecDeque::new(),
            deadline: None,
            above_high_water: false,
            stats: InstanceStats::default(),
        }
    }

    /// Queue a task; it is activated immediately when nothing else is running.
    pub fn submit(&mut self, task: Task) -> NcpResult<TaskId> {
        if task.state() != TaskState::Pending {
            return Err(NcpError::bad_argument(format!(
                "task {} cannot be submitted while {:?}",
                task.id(),
                task.state()
            )));
        }
        let id = task.id();
        debug!(
            "submit task {} ({}), {} ahead of it",
            id,
            task.kind().name(),
            self.pending.len() + usize::from(self.active.is_some())
        );
        self.pending.push_back(task);
        self.stats.submitted += 1;
        metrics::inc_tasks_submitted();
        self.activate_next()?;
        Ok(id)
    }

    /// Decode one unstuffed inbound frame and deliver it.
    pub fn dispatch_inbound(&mut self, frame: &[u8]) -> NcpResult<()> {
        trace!("rx {}", hex_snippet(frame, 64));
        match self.codec.decode(frame) {
            Ok(event) => self.deliver(event),
            Err(e) => {
                warn!("discarding undecodable frame ({}): {}", e, hex_snippet(frame, 32));
                self.stats.decode_errors += 1;
                metrics::inc_frames_discarded();
                Ok(())
            }
        }
    }

    /// Deliver an already-decoded event to the active task.
    pub fn deliver(&mut self, event: NcpEvent) -> NcpResult<()> {
        if let NcpEvent::LastStatus(code) = event {
            if status::is_reset(code) {
                warn!("NCP reported {} ({})", code, status::describe(code));
                self.stats.ncp_resets += 1;
                return self.transport_reset();
            }
        }
        if let NcpEvent::PropertyValue {
            prop: prop::STREAM_DEBUG,
            value,
        } = &event
        {
            debug!("ncp: {}", escape_log(&String::from_utf8_lossy(value)));
        }

        let Some(task) = self.active.as_mut() else {
            debug!("no active task, discarding {:?}", event);
            self.stats.frames_discarded += 1;
            metrics::inc_frames_discarded();
            return Ok(());
        };
        let mut out = Outbox::new();
        let signal = task.process_event(&event, &mut out)?;
        if signal == TaskSignal::Send {
            trace!("task {} queued {} frame(s)", task.id(), out.len());
        }
        if !self.flush(&mut out) {
            self.fail_active_encode()?;
        }
        self.settle()
    }

    /// The active task's deadline passed.
    pub fn on_timeout(&mut self) -> NcpResult<()> {
        if self.active.is_none() {
            debug!("timeout with no active task");
            self.deadline = None;
            return Ok(());
        }
        let terminated = self.terminate_active(NcpEvent::Timeout, TaskStatus::Timeout, true);
        self.activate_next()?;
        terminated
    }

    /// Fire [`on_timeout`](Self::on_timeout) if the deadline is at or before `now`.
    pub fn poll_timeout(&mut self, now: Instant) -> NcpResult<bool> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.on_timeout()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Hard transport failure or NCP reset: the active task gets a reset event,
    /// every pending task resolves `Cancelled`, and queued frames are dropped.
    pub fn transport_reset(&mut self) -> NcpResult<()> {
        let dropped_frames = self.outbound.len();
        self.outbound.clear();
        self.above_high_water = false;
        let pending: Vec<Task> = self.pending.drain(..).collect();
        info!(
            "transport reset: cancelling {} task(s), dropping {} queued frame(s)",
            pending.len() + usize::from(self.active.is_some()),
            dropped_frames
        );

        let mut result = self.terminate_active(NcpEvent::TransportReset, TaskStatus::Cancelled, false);
        for mut task in pending {
            if let Err(e) = task.finish(TaskStatus::Cancelled, ResultValue::Empty) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
            self.retire(task);
        }
        result
    }

    /// Cancel a task by id. Returns `false` when no such task is queued or running.
    pub fn cancel(&mut self, id: TaskId) -> NcpResult<bool> {
        if let Some(pos) = self.pending.iter().position(|t| t.id() == id) {
            if let Some(mut task) = self.pending.remove(pos) {
                debug!("cancelling pending task {}", id);
                let finished = task.finish(TaskStatus::Cancelled, ResultValue::Empty);
                self.retire(task);
                finished?;
            }
            return Ok(true);
        }
        if self.active_id() == Some(id) {
            debug!("cancelling active task {}", id);
            let terminated = self.terminate_active(NcpEvent::Cancel, TaskStatus::Cancelled, true);
            self.activate_next()?;
            terminated?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn pop_outbound(&mut self) -> Option<Vec<u8>> {
        let frame = self.outbound.pop_front();
        if self.outbound.is_empty() {
            self.above_high_water = false;
        }
        frame
    }

    pub fn drain_outbound(&mut self) -> Vec<Vec<u8>> {
        self.above_high_water = false;
        self.outbound.drain(..).collect()
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.pending.is_empty()
    }

    pub fn active_id(&self) -> Option<TaskId> {
        self.active.as_ref().map(Task::id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_ids(&self) -> Vec<TaskId> {
        self.pending.iter().map(Task::id).collect()
    }

    pub fn tuning(&self) -> &InstanceTuning {
        &self.tuning
    }

    pub fn stats(&self) -> InstanceStats {
        InstanceStats {
            active: self.active_id(),
            pending: self.pending.len(),
            outbound_queued: self.outbound.len(),
            ..self.stats.clone()
        }
    }

    fn activate_next(&mut self) -> NcpResult<()> {
        while self.active.is_none() {
            let Some(mut task) = self.pending.pop_front() else {
                self.deadline = None;
                return Ok(());
            };
            let mut out = Outbox::new();
            task.activate(&mut out)?;
            self.deadline = Some(Instant::now() + self.tuning.timeout_for(task.kind()));
            self.active = Some(task);
            if !self.flush(&mut out) {
                self.fail_active_encode()?;
            }
            if self.active_finished() {
                if let Some(done) = self.active.take() {
                    self.deadline = None;
                    self.retire(done);
                }
            }
        }
        Ok(())
    }

    /// Retire the active task if it has finished, then start the next one.
    fn settle(&mut self) -> NcpResult<()> {
        if self.active_finished() {
            if let Some(task) = self.active.take() {
                self.deadline = None;
                self.retire(task);
            }
            self.activate_next()?;
        }
        Ok(())
    }

    fn active_finished(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|t| t.state() == TaskState::Finished)
    }

    /// Push a terminal event into the active task and retire it. A task that
    /// does not finish on its own is finished with `fallback`.
    fn terminate_active(&mut self, event: NcpEvent, fallback: TaskStatus, send: bool) -> NcpResult<()> {
        let Some(mut task) = self.active.take() else {
            return Ok(());
        };
        self.deadline = None;
        let mut out = Outbox::new();
        let delivered = task.process_event(&event, &mut out);
        if send {
            self.flush(&mut out);
        } else if !out.is_empty() {
            debug!("task {} emitted {} frame(s) during reset, dropped", task.id(), out.len());
        }
        if task.state() != TaskState::Finished {
            warn!(
                "task {} ({}) did not finish on {:?}; resolving as {}",
                task.id(),
                task.kind().name(),
                event,
                fallback
            );
            if let Err(e) = task.finish(fallback, ResultValue::Empty) {
                self.retire(task);
                return Err(e);
            }
        }
        self.retire(task);
        delivered.map(|_| ())
    }

    /// Encode and queue the frames in `out`. Returns `false` if the codec
    /// refused one; the rest of the batch is dropped.
    fn flush(&mut self, out: &mut Outbox) -> bool {
        for frame in out.drain() {
            match self.codec.encode(frame.command, frame.property, &frame.payload) {
                Ok(bytes) => self.enqueue(bytes),
                Err(e) => {
                    warn!(
                        "cannot encode {:?} {}: {}",
                        frame.command,
                        prop::name(frame.property),
                        e
                    );
                    return false;
                }
            }
        }
        true
    }

    fn fail_active_encode(&mut self) -> NcpResult<()> {
        match self.active.as_mut() {
            Some(task) if task.state() != TaskState::Finished => task.finish(
                TaskStatus::ProtocolError(status::INTERNAL_ERROR),
                ResultValue::Empty,
            ),
            _ => Ok(()),
        }
    }

    fn enqueue(&mut self, frame: Vec<u8>) {
        self.outbound.push_back(frame);
        if self.outbound.len() > self.tuning.outbound_high_water && !self.above_high_water {
            self.above_high_water = true;
            warn!(
                "outbound queue above high water mark ({} > {})",
                self.outbound.len(),
                self.tuning.outbound_high_water
            );
        }
    }

    /// Hand a finished task's outcome to its callback and drop it.
    fn retire(&mut self, mut task: Task) {
        let id = task.id();
        match task.take_completion() {
            Some((callback, res)) => {
                match res.status {
                    TaskStatus::Success => self.stats.succeeded += 1,
                    TaskStatus::Timeout => self.stats.timed_out += 1,
                    TaskStatus::Cancelled => self.stats.cancelled += 1,
                    TaskStatus::ProtocolError(_) => self.stats.protocol_errors += 1,
                }
                metrics::record_task_outcome(res.status);
                debug!("task {} ({}) retired: {}", id, task.kind().name(), res.status);
                callback(res.status, res.result);
            }
            None => {
                metrics::inc_internal_faults();
                error!("task {} retired without an outcome", id);
            }
        }
    }
}

impl Default for NcpInstance<SpinelCodec> {
    fn default() -> Self {
        Self::new(SpinelCodec::default(), InstanceTuning::default())
    }
}
