//! Task abstraction: one in-flight logical operation against the NCP.
//!
//! A [`Task`] wraps one of a closed set of task kinds ([`TaskKind`]) together
//! with its lifecycle state and its one-shot completion callback. The owning
//! [`NcpInstance`](super::NcpInstance) feeds it [`NcpEvent`]s while it is
//! `Active`; the kind-specific state machine decides when to resolve it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, error};
use serde::Serialize;

use super::error::{NcpError, NcpResult};
use super::property::PropertyTask;
use super::scan::ScanTask;
use super::value::ResultValue;
use crate::metrics;
use crate::spinel::Command;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Handle naming a task inside the instance's table. Allocated once, never reused.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskState {
    Pending,
    Active,
    Finished,
}

/// Status delivered to the completion callback.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "status", content = "code", rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Timeout,
    Cancelled,
    /// The NCP answered with a failing Spinel status.
    ProtocolError(u32),
}

impl TaskStatus {
    pub fn is_success(self) -> bool {
        matches!(self, TaskStatus::Success)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Timeout => write!(f, "timeout"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
            TaskStatus::ProtocolError(code) => write!(
                f,
                "protocol error {} ({})",
                code,
                crate::spinel::status::describe(*code)
            ),
        }
    }
}

/// Events delivered to the active task: decoded inbound frames and
/// instance-generated signals.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NcpEvent {
    /// `VALUE_IS(LAST_STATUS)`.
    LastStatus(u32),
    PropertyValue { prop: u32, value: Vec<u8> },
    PropertyInserted { prop: u32, value: Vec<u8> },
    PropertyRemoved { prop: u32, value: Vec<u8> },
    /// The transport failed or the NCP reset underneath us.
    TransportReset,
    /// The instance-level deadline for the active task elapsed.
    Timeout,
    /// External cancellation of the active task.
    Cancel,
    /// Anything the codec does not map to a property event.
    Raw(Vec<u8>),
}

/// What the task asks of the instance after handling an event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskSignal {
    /// Still active, nothing to send.
    Continue,
    /// Still active, frames are waiting in the outbox.
    Send,
    Finished,
}

/// A frame a task wants sent, before codec encoding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutboundFrame {
    pub command: Command,
    pub property: u32,
    pub payload: Vec<u8>,
}

/// Frames emitted during one activation or event, in emission order.
#[derive(Debug, Default)]
pub struct Outbox {
    frames: Vec<OutboundFrame>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command, property: u32, payload: Vec<u8>) {
        self.frames.push(OutboundFrame {
            command,
            property,
            payload,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, OutboundFrame> {
        self.frames.drain(..)
    }
}

/// Terminal outcome chosen by a task kind.
#[derive(Debug)]
pub struct Resolution {
    pub status: TaskStatus,
    pub result: ResultValue,
}

impl Resolution {
    pub fn new(status: TaskStatus, result: ResultValue) -> Self {
        Self { status, result }
    }
}

/// Completion callback, invoked exactly once with the task's outcome.
pub type Callback = Box<dyn FnOnce(TaskStatus, ResultValue) + Send + 'static>;

/// The closed set of task kinds the engine can run.
#[derive(Debug)]
pub enum TaskKind {
    Scan(ScanTask),
    Property(PropertyTask),
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Scan(_) => "scan",
            TaskKind::Property(p) => p.op_name(),
        }
    }

    fn start(&mut self, out: &mut Outbox) {
        match self {
            TaskKind::Scan(t) => t.start(out),
            TaskKind::Property(t) => t.start(out),
        }
    }

    fn handle(&mut self, event: &NcpEvent, out: &mut Outbox) -> Option<Resolution> {
        match self {
            TaskKind::Scan(t) => t.handle(event, out),
            TaskKind::Property(t) => t.handle(event, out),
        }
    }
}

impl From<ScanTask> for TaskKind {
    fn from(t: ScanTask) -> Self {
        TaskKind::Scan(t)
    }
}

impl From<PropertyTask> for TaskKind {
    fn from(t: PropertyTask) -> Self {
        TaskKind::Property(t)
    }
}

pub struct Task {
    id: TaskId,
    state: TaskState,
    kind: TaskKind,
    callback: Option<Callback>,
    outcome: Option<Resolution>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("kind", &self.kind)
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl Task {
    pub fn new(kind: impl Into<TaskKind>, callback: Callback) -> Self {
        Task {
            id: TaskId::next(),
            state: TaskState::Pending,
            kind: kind.into(),
            callback: Some(callback),
            outcome: None,
        }
    }

    /// Convenience for closures.
    pub fn with_callback<F>(kind: impl Into<TaskKind>, callback: F) -> Self
    where
        F: FnOnce(TaskStatus, ResultValue) + Send + 'static,
    {
        Self::new(kind, Box::new(callback))
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn outcome(&self) -> Option<&Resolution> {
        self.outcome.as_ref()
    }

    /// Pending → Active; the kind queues its opening frames.
    pub(crate) fn activate(&mut self, out: &mut Outbox) -> NcpResult<TaskSignal> {
        if self.state != TaskState::Pending {
            return Err(self.fault(format!(
                "task {} activated while {:?}",
                self.id, self.state
            )));
        }
        self.state = TaskState::Active;
        debug!("task {} ({}) active", self.id, self.kind.name());
        self.kind.start(out);
        Ok(if out.is_empty() {
            TaskSignal::Continue
        } else {
            TaskSignal::Send
        })
    }

    /// Feed one event. Events for a task that is not active are ignored.
    pub fn process_event(&mut self, event: &NcpEvent, out: &mut Outbox) -> NcpResult<TaskSignal> {
        if self.state != TaskState::Active {
            debug!("task {} not active ({:?}); ignoring {:?}", self.id, self.state, event);
            return Ok(TaskSignal::Continue);
        }
        match self.kind.handle(event, out) {
            Some(res) => {
                self.finish(res.status, res.result)?;
                Ok(TaskSignal::Finished)
            }
            None if out.is_empty() => Ok(TaskSignal::Continue),
            None => Ok(TaskSignal::Send),
        }
    }

    /// Record the outcome. A second call is an internal fault.
    pub fn finish(&mut self, status: TaskStatus, result: ResultValue) -> NcpResult<()> {
        if self.state == TaskState::Finished {
            return Err(self.fault(format!(
                "task {} finished twice (second status {})",
                self.id, status
            )));
        }
        debug!("task {} ({}) finished: {}", self.id, self.kind.name(), status);
        self.state = TaskState::Finished;
        self.outcome = Some(Resolution::new(status, result));
        Ok(())
    }

    /// Hand out the callback and outcome of a finished task. Only succeeds once.
    pub(crate) fn take_completion(&mut self) -> Option<(Callback, Resolution)> {
        if self.state != TaskState::Finished {
            return None;
        }
        match (self.callback.take(), self.outcome.take()) {
            (Some(cb), Some(res)) => Some((cb, res)),
            _ => None,
        }
    }

    fn fault(&self, msg: String) -> NcpError {
        metrics::inc_internal_faults();
        error!("{}", msg);
        NcpError::InternalFault(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ncp::scan::{ChannelMask, ScanKind};
    use crate::spinel::prop;

    fn scan_task() -> Task {
        let mask = ChannelMask::from_channels([11, 15, 20]).unwrap();
        let scan = ScanTask::new(mask, 120, ScanKind::Beacon).unwrap();
        Task::with_callback(scan, |_, _| {})
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = scan_task();
        let b = scan_task();
        assert!(b.id() > a.id());
    }

    #[test]
    fn pending_task_ignores_events() {
        let mut task = scan_task();
        let mut out = Outbox::new();
        let signal = task.process_event(&NcpEvent::Timeout, &mut out).unwrap();
        assert_eq!(signal, TaskSignal::Continue);
        assert_eq!(task.state(), TaskState::Pending);
        assert!(out.is_empty());
    }

    #[test]
    fn property_answer_counts_only_once_the_task_is_active() {
        let mut task = Task::with_callback(PropertyTask::get(prop::PHY_CHAN).unwrap(), |_, _| {});
        let answer = NcpEvent::PropertyValue {
            prop: prop::PHY_CHAN,
            value: vec![15],
        };
        let mut out = Outbox::new();
        assert_eq!(task.process_event(&answer, &mut out).unwrap(), TaskSignal::Continue);
        assert_eq!(task.state(), TaskState::Pending);

        task.activate(&mut out).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(task.process_event(&answer, &mut out).unwrap(), TaskSignal::Finished);
        assert_eq!(task.outcome().unwrap().result, ResultValue::Bytes(vec![15]));
    }

    #[test]
    fn double_finish_is_internal_fault() {
        let mut task = scan_task();
        let mut out = Outbox::new();
        task.activate(&mut out).unwrap();
        task.finish(TaskStatus::Success, ResultValue::Empty).unwrap();
        let err = task
            .finish(TaskStatus::Timeout, ResultValue::Empty)
            .unwrap_err();
        assert!(matches!(err, NcpError::InternalFault(_)));
        // first outcome stands
        assert_eq!(task.outcome().map(|r| r.status), Some(TaskStatus::Success));
    }

    #[test]
    fn finished_task_cannot_be_reactivated() {
        let mut task = scan_task();
        let mut out = Outbox::new();
        task.activate(&mut out).unwrap();
        task.finish(TaskStatus::Cancelled, ResultValue::Empty).unwrap();
        assert!(task.activate(&mut Outbox::new()).is_err());
    }

    #[test]
    fn completion_is_handed_out_once() {
        let mut task = scan_task();
        assert!(task.take_completion().is_none());
        task.activate(&mut Outbox::new()).unwrap();
        task.finish(TaskStatus::Success, ResultValue::Status(0)).unwrap();
        let (cb, res) = task.take_completion().expect("completion");
        assert_eq!(res.status, TaskStatus::Success);
        cb(res.status, res.result);
        assert!(task.take_completion().is_none());
    }

    #[test]
    fn status_display_names_protocol_code() {
        assert_eq!(
            TaskStatus::ProtocolError(3).to_string(),
            "protocol error 3 (invalid argument)"
        );
        assert!(TaskStatus::Success.is_success());
    }
}
