//! Event loop that runs an [`NcpInstance`] against a [`Transport`].
//!
//! The driver is the only owner of the instance, the transport and the HDLC
//! decoder. Everything else talks to it through a cloneable [`NcpHandle`]:
//!
//! * `submit` / `execute` queue tasks (the latter waits for the outcome),
//! * `cancel` removes or cancels a task by id,
//! * `snapshot` returns the instance stats,
//! * `shutdown` cancels all outstanding work and stops the loop.
//!
//! One loop iteration reacts to whichever comes first: a command, a transport
//! poll tick, the active task's deadline, a reconnect tick while the link is
//! down, or the stats tick. Queued outbound frames are flushed after every
//! iteration.

use std::time::Duration;

use anyhow::Result;
use log::{debug, error, info, trace, warn};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant as TokioInstant, MissedTickBehavior};

use super::error::{NcpError, NcpResult};
use super::instance::{InstanceStats, NcpInstance};
use super::task::{Task, TaskId, TaskKind, TaskStatus};
use super::transport::Transport;
use super::value::ResultValue;
use crate::logutil::hex_snippet;
use crate::metrics;
use crate::spinel::hdlc::{hdlc_encode, HdlcDecoder};

const READ_CHUNK: usize = 512;

#[derive(Debug, Clone)]
pub struct DriverTuning {
    pub poll_interval: Duration,
    pub stats_interval: Duration,
    pub reconnect_interval: Duration,
}

impl Default for DriverTuning {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            stats_interval: Duration::from_secs(60),
            reconnect_interval: Duration::from_secs(2),
        }
    }
}

pub enum NcpCommand {
    Submit {
        task: Task,
        reply: oneshot::Sender<NcpResult<TaskId>>,
    },
    Cancel {
        id: TaskId,
        reply: oneshot::Sender<NcpResult<bool>>,
    },
    Snapshot(oneshot::Sender<InstanceStats>),
    Shutdown(oneshot::Sender<()>),
}

/// Outcome of a task run through [`NcpHandle::execute`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    pub id: TaskId,
    #[serde(flatten)]
    pub status: TaskStatus,
    pub result: ResultValue,
}

#[derive(Clone, Debug)]
pub struct NcpHandle {
    tx: mpsc::UnboundedSender<NcpCommand>,
}

impl NcpHandle {
    /// Queue a task. Its own callback reports the outcome.
    pub async fn submit(&self, task: Task) -> NcpResult<TaskId> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(NcpCommand::Submit { task, reply })
            .map_err(|_| NcpError::Disconnected)?;
        rx.await.map_err(|_| NcpError::Disconnected)?
    }

    /// Queue a task and wait until it resolves.
    pub async fn execute(&self, kind: impl Into<TaskKind>) -> NcpResult<Completion> {
        let (done, outcome) = oneshot::channel();
        let task = Task::with_callback(kind, move |status, result| {
            let _ = done.send((status, result));
        });
        let id = self.submit(task).await?;
        let (status, result) = outcome.await.map_err(|_| NcpError::Disconnected)?;
        Ok(Completion { id, status, result })
    }

    pub async fn cancel(&self, id: TaskId) -> NcpResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(NcpCommand::Cancel { id, reply })
            .map_err(|_| NcpError::Disconnected)?;
        rx.await.map_err(|_| NcpError::Disconnected)?
    }

    pub async fn snapshot(&self) -> Option<InstanceStats> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(NcpCommand::Snapshot(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(NcpCommand::Shutdown(tx));
        let _ = rx.await;
    }
}

pub struct NcpDriver<T: Transport> {
    instance: NcpInstance,
    transport: T,
    decoder: HdlcDecoder,
    rx: mpsc::UnboundedReceiver<NcpCommand>,
    tuning: DriverTuning,
    link_up: bool,
}

impl<T: Transport> NcpDriver<T> {
    pub fn new(instance: NcpInstance, transport: T, tuning: DriverTuning) -> (Self, NcpHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = Self {
            instance,
            transport,
            decoder: HdlcDecoder::new(),
            rx,
            tuning,
            link_up: true,
        };
        (driver, NcpHandle { tx })
    }

    /// Start with the link down; the driver keeps trying to reconnect.
    pub fn with_link_down(mut self) -> Self {
        self.link_up = false;
        self
    }

    pub async fn run(mut self) -> Result<()> {
        info!("NCP driver started on {}", self.transport.name());

        let mut poll = interval(self.tuning.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut reconnect = interval(self.tuning.reconnect_interval);
        reconnect.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats_tick = interval(self.tuning.stats_interval);
        stats_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        stats_tick.tick().await;

        loop {
            let deadline = self.instance.deadline();
            let wake = deadline
                .map(TokioInstant::from_std)
                .unwrap_or_else(TokioInstant::now);

            tokio::select! {
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd) {
                                break;
                            }
                        }
                        None => {
                            info!("All NCP handles dropped, stopping driver");
                            self.cancel_all();
                            break;
                        }
                    }
                }

                _ = poll.tick(), if self.link_up => {
                    self.poll_transport();
                }

                _ = sleep_until(wake), if deadline.is_some() => {
                    if let Err(e) = self.instance.poll_timeout(std::time::Instant::now()) {
                        error!("timeout handling failed: {}", e);
                    }
                }

                _ = reconnect.tick(), if !self.link_up => {
                    self.try_reconnect();
                }

                _ = stats_tick.tick() => {
                    self.log_stats();
                }
            }

            self.flush_outbound();
        }

        info!("NCP driver stopped");
        Ok(())
    }

    /// Returns `false` once the loop should stop.
    fn handle_command(&mut self, cmd: NcpCommand) -> bool {
        match cmd {
            NcpCommand::Submit { task, reply } => {
                let _ = reply.send(self.instance.submit(task));
            }
            NcpCommand::Cancel { id, reply } => {
                let _ = reply.send(self.instance.cancel(id));
            }
            NcpCommand::Snapshot(reply) => {
                let _ = reply.send(self.instance.stats());
            }
            NcpCommand::Shutdown(reply) => {
                info!("NCP driver received shutdown");
                self.cancel_all();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn poll_transport(&mut self) {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match self.transport.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    trace!("read {} bytes: {}", n, hex_snippet(&buf[..n], 64));
                    let decoded = self.decoder.push(&buf[..n]);
                    if decoded.dropped > 0 {
                        warn!("dropped {} corrupt frame(s) from {}", decoded.dropped, self.transport.name());
                        metrics::add_fcs_errors(decoded.dropped);
                    }
                    for frame in decoded.frames {
                        metrics::inc_frames_received();
                        if let Err(e) = self.instance.dispatch_inbound(&frame) {
                            error!("inbound dispatch failed: {}", e);
                        }
                    }
                    if n < buf.len() {
                        break;
                    }
                }
                Err(e) => {
                    self.link_lost(e);
                    break;
                }
            }
        }
    }

    fn flush_outbound(&mut self) {
        if !self.link_up {
            if self.instance.outbound_len() > 0 {
                warn!("link down, cancelling queued work");
                self.reset_instance();
            }
            return;
        }
        while let Some(frame) = self.instance.pop_outbound() {
            trace!("tx {}", hex_snippet(&frame, 64));
            if let Err(e) = self.transport.write_all(&hdlc_encode(&frame)) {
                self.link_lost(e);
                return;
            }
            metrics::inc_frames_sent();
        }
    }

    fn link_lost(&mut self, err: std::io::Error) {
        warn!("lost link to NCP on {}: {}", self.transport.name(), err);
        self.link_up = false;
        self.decoder = HdlcDecoder::new();
        self.reset_instance();
    }

    fn try_reconnect(&mut self) {
        match self.transport.reconnect() {
            Ok(()) => {
                info!("link to NCP on {} restored", self.transport.name());
                self.link_up = true;
                self.decoder = HdlcDecoder::new();
            }
            Err(e) => debug!("reconnect to {} failed: {}", self.transport.name(), e),
        }
    }

    fn reset_instance(&mut self) {
        if let Err(e) = self.instance.transport_reset() {
            error!("transport reset failed: {}", e);
        }
    }

    fn cancel_all(&mut self) {
        if !self.instance.is_idle() {
            info!("cancelling outstanding NCP tasks");
            self.reset_instance();
        }
    }

    fn log_stats(&self) {
        let stats = self.instance.stats();
        let totals = metrics::snapshot();
        debug!(
            "ncp stats: active={:?} pending={} outbound={} ok={} timeout={} cancelled={} proto_err={} rx={} tx={} fcs_err={}",
            stats.active.map(TaskId::get),
            stats.pending,
            stats.outbound_queued,
            stats.succeeded,
            stats.timed_out,
            stats.cancelled,
            stats.protocol_errors,
            totals.frames_received,
            totals.frames_sent,
            totals.fcs_errors
        );
    }
}

/// Spawn the driver on the current runtime.
pub fn start_driver<T: Transport + 'static>(
    instance: NcpInstance,
    transport: T,
    tuning: DriverTuning,
) -> (NcpHandle, JoinHandle<Result<()>>) {
    let (driver, handle) = NcpDriver::new(instance, transport, tuning);
    (handle, tokio::spawn(driver.run()))
}
