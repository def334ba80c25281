//! # ncpd - Task Engine for Spinel Network Co-Processors
//!
//! ncpd drives a Thread/802.15.4 network co-processor (NCP) over the Spinel
//! protocol. Every logical operation, from a multi-channel scan to a single
//! address-cache insert, is a *task*: a small state machine that emits
//! frames, consumes the NCP's answers, and resolves exactly once with a
//! status and a result value.
//!
//! ## Features
//!
//! - **One task at a time**: a single active slot plus a FIFO queue, so NCP
//!   answers can never be attributed to the wrong operation.
//! - **Guaranteed completion**: success, timeout, cancellation, NCP errors and
//!   link loss all end in exactly one callback.
//! - **Scans**: active beacon scans and energy-detect scans with partial
//!   results kept on timeout.
//! - **Property access**: get, set, insert and remove, including the Thread
//!   EID-to-RLOC address cache.
//! - **Async driver**: a Tokio event loop owning the UART link, with HDLC-lite
//!   framing and automatic reconnects.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ncpd::ncp::{start_driver, ChannelMask, DriverTuning, MockTransport, NcpInstance, ScanKind, ScanTask};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (handle, driver) = start_driver(NcpInstance::default(), MockTransport::new(), DriverTuning::default());
//!
//!     let mask = ChannelMask::from_channels([11, 15, 20])?;
//!     let done = handle.execute(ScanTask::new(mask, 120, ScanKind::Beacon)?).await?;
//!     println!("{}: {:?}", done.status, done.result);
//!
//!     handle.shutdown().await;
//!     driver.await??;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`ncp`] - tasks, the dispatching instance, transports and the driver loop
//! - [`spinel`] - Spinel vocabulary, packed encodings, frame codec and HDLC framing
//! - [`control`] - control-plane commands and replies used by the CLI
//! - [`config`] - configuration management
//! - [`validation`] - argument parsing for addresses, channels and hex data
//! - [`metrics`] / [`logutil`] - counters and log helpers

pub mod config;
pub mod control;
pub mod logutil;
pub mod metrics;
pub mod ncp;
pub mod spinel;
pub mod validation;
