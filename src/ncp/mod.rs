//! # NCP Task Engine
//!
//! Runs logical operations ("tasks") against a Spinel network co-processor,
//! strictly one at a time.
//!
//! - [`task`]: the task abstraction, its lifecycle and the events it consumes
//! - [`scan`] / [`property`]: the concrete task kinds
//! - [`value`]: result payloads handed to completion callbacks
//! - [`instance`]: the dispatcher owning the active task and the FIFO queue
//! - [`transport`] / [`driver`]: the byte link and the tokio loop gluing it all together
//!
//! ```text
//! NcpHandle ──mpsc──▶ NcpDriver ──▶ NcpInstance ──▶ active Task
//!                        │  ▲             │
//!                  HDLC  ▼  │ HDLC        ▼ outbound queue
//!                      Transport ◀────────┘
//! ```

pub mod driver;
pub mod error;
pub mod instance;
pub mod property;
pub mod scan;
pub mod task;
pub mod transport;
pub mod value;

pub use driver::{start_driver, Completion, DriverTuning, NcpDriver, NcpHandle};
pub use error::{NcpError, NcpResult};
pub use instance::{InstanceStats, InstanceTuning, NcpInstance};
pub use property::{PropertyOp, PropertyTask};
pub use scan::{ChannelMask, ScanKind, ScanTask};
pub use task::{Callback, NcpEvent, Task, TaskId, TaskKind, TaskState, TaskStatus};
#[cfg(feature = "serial")]
pub use transport::SerialTransport;
pub use transport::{MockTransport, Transport};
pub use value::{BeaconInfo, ResultValue, ScanRecord};
