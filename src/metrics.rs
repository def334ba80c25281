//! Process-wide engine counters.
//!
//! Cheap relaxed atomics bumped from the instance and the driver; read back
//! through [`snapshot`] for the periodic stats log and `--verbose` dumps.
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::ncp::TaskStatus;

static TASKS_SUBMITTED: AtomicU64 = AtomicU64::new(0);
static TASKS_SUCCEEDED: AtomicU64 = AtomicU64::new(0);
static TASKS_TIMED_OUT: AtomicU64 = AtomicU64::new(0);
static TASKS_CANCELLED: AtomicU64 = AtomicU64::new(0);
static TASKS_PROTOCOL_ERRORS: AtomicU64 = AtomicU64::new(0);
static INTERNAL_FAULTS: AtomicU64 = AtomicU64::new(0);
static FRAMES_SENT: AtomicU64 = AtomicU64::new(0);
static FRAMES_RECEIVED: AtomicU64 = AtomicU64::new(0);
static FRAMES_DISCARDED: AtomicU64 = AtomicU64::new(0);
static FCS_ERRORS: AtomicU64 = AtomicU64::new(0);

pub fn inc_tasks_submitted() {
    TASKS_SUBMITTED.fetch_add(1, Ordering::Relaxed);
}

/// Count a resolved task under its terminal status.
pub fn record_task_outcome(status: TaskStatus) {
    let counter = match status {
        TaskStatus::Success => &TASKS_SUCCEEDED,
        TaskStatus::Timeout => &TASKS_TIMED_OUT,
        TaskStatus::Cancelled => &TASKS_CANCELLED,
        TaskStatus::ProtocolError(_) => &TASKS_PROTOCOL_ERRORS,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_internal_faults() {
    INTERNAL_FAULTS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_frames_sent() {
    FRAMES_SENT.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_frames_received() {
    FRAMES_RECEIVED.fetch_add(1, Ordering::Relaxed);
}

/// Inbound frames that decoded fine but had nobody to deliver to, or did not decode.
pub fn inc_frames_discarded() {
    FRAMES_DISCARDED.fetch_add(1, Ordering::Relaxed);
}

pub fn add_fcs_errors(n: usize) {
    FCS_ERRORS.fetch_add(n as u64, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub tasks_submitted: u64,
    pub tasks_succeeded: u64,
    pub tasks_timed_out: u64,
    pub tasks_cancelled: u64,
    pub tasks_protocol_errors: u64,
    pub internal_faults: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub frames_discarded: u64,
    pub fcs_errors: u64,
}

impl Snapshot {
    /// Tasks that reached a terminal status.
    pub fn tasks_resolved(&self) -> u64 {
        self.tasks_succeeded + self.tasks_timed_out + self.tasks_cancelled + self.tasks_protocol_errors
    }
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        tasks_submitted: TASKS_SUBMITTED.load(Ordering::Relaxed),
        tasks_succeeded: TASKS_SUCCEEDED.load(Ordering::Relaxed),
        tasks_timed_out: TASKS_TIMED_OUT.load(Ordering::Relaxed),
        tasks_cancelled: TASKS_CANCELLED.load(Ordering::Relaxed),
        tasks_protocol_errors: TASKS_PROTOCOL_ERRORS.load(Ordering::Relaxed),
        internal_faults: INTERNAL_FAULTS.load(Ordering::Relaxed),
        frames_sent: FRAMES_SENT.load(Ordering::Relaxed),
        frames_received: FRAMES_RECEIVED.load(Ordering::Relaxed),
        frames_discarded: FRAMES_DISCARDED.load(Ordering::Relaxed),
        fcs_errors: FCS_ERRORS.load(Ordering::Relaxed),
    }
}
