//! Control-plane commands.
//!
//! A [`ControlCommand`] is what a front end (the CLI today) asks of the
//! daemon. [`execute`] turns it into a task, runs it through an
//! [`NcpHandle`] and folds the outcome into a serializable [`ControlReply`].

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::ncp::{
    ChannelMask, Completion, NcpError, NcpHandle, NcpResult, PropertyTask, ResultValue, ScanKind,
    ScanTask, TaskId, TaskKind, TaskStatus,
};
use crate::validation::{parse_eid, parse_mliid, parse_rloc16, ArgumentError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    Scan {
        channels: Vec<u8>,
        delay_ms: u32,
        #[serde(default)]
        energy: bool,
    },
    AddEidCache {
        eid: [u8; 16],
        mliid: [u8; 8],
        rloc16: u16,
    },
    GetProperty {
        prop: u32,
    },
    SetProperty {
        prop: u32,
        value: Vec<u8>,
    },
}

impl ControlCommand {
    /// Build `AddEidCache` from its three textual arguments.
    pub fn add_eid_cache(eid: &str, mliid: &str, rloc16: &str) -> Result<Self, ArgumentError> {
        Ok(ControlCommand::AddEidCache {
            eid: parse_eid(eid)?,
            mliid: parse_mliid(mliid)?,
            rloc16: parse_rloc16(rloc16)?,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControlCommand::Scan { .. } => "scan",
            ControlCommand::AddEidCache { .. } => "add-eidcache",
            ControlCommand::GetProperty { .. } => "get-prop",
            ControlCommand::SetProperty { .. } => "set-prop",
        }
    }

    /// Validate the arguments and build the task. Nothing is sent on failure.
    pub fn into_task_kind(self) -> NcpResult<TaskKind> {
        let kind = match self {
            ControlCommand::Scan {
                channels,
                delay_ms,
                energy,
            } => {
                let mask = ChannelMask::from_channels(channels)?;
                let scan_kind = if energy {
                    ScanKind::Energy
                } else {
                    ScanKind::Beacon
                };
                ScanTask::new(mask, delay_ms, scan_kind)?.into()
            }
            ControlCommand::AddEidCache { eid, mliid, rloc16 } => {
                PropertyTask::eid_cache_entry(eid, mliid, rloc16)?.into()
            }
            ControlCommand::GetProperty { prop } => PropertyTask::get(prop)?.into(),
            ControlCommand::SetProperty { prop, value } => PropertyTask::set(prop, value)?.into(),
        };
        Ok(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Success,
    BadArgument,
    Timeout,
    Cancelled,
    ProtocolError,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlReply {
    pub command: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskId>,
    pub status: ReplyStatus,
    /// Spinel status code for protocol errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub result: ResultValue,
}

impl ControlReply {
    pub fn from_completion(command: &'static str, completion: Completion) -> Self {
        let (status, code, message) = match completion.status {
            TaskStatus::Success => (ReplyStatus::Success, None, None),
            TaskStatus::Timeout => (ReplyStatus::Timeout, None, None),
            TaskStatus::Cancelled => (ReplyStatus::Cancelled, None, None),
            TaskStatus::ProtocolError(c) => (
                ReplyStatus::ProtocolError,
                Some(c),
                Some(crate::spinel::status::describe(c).to_string()),
            ),
        };
        ControlReply {
            command,
            task: Some(completion.id),
            status,
            code,
            message,
            result: completion.result,
        }
    }

    fn error(command: &'static str, status: ReplyStatus, message: String) -> Self {
        ControlReply {
            command,
            task: None,
            status,
            code: None,
            message: Some(message),
            result: ResultValue::Empty,
        }
    }

    pub fn bad_argument(command: &'static str, message: impl Into<String>) -> Self {
        Self::error(command, ReplyStatus::BadArgument, message.into())
    }

    pub fn is_success(&self) -> bool {
        self.status == ReplyStatus::Success
    }

    /// Process exit code: 0 ok, 2 bad argument, 4 timeout, 5 any other failure.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            ReplyStatus::Success => 0,
            ReplyStatus::BadArgument => 2,
            ReplyStatus::Timeout => 4,
            ReplyStatus::Cancelled | ReplyStatus::ProtocolError | ReplyStatus::Failed => 5,
        }
    }
}

/// Run one command to completion.
pub async fn execute(handle: &NcpHandle, command: ControlCommand) -> ControlReply {
    let name = command.name();
    debug!("control: {:?}", command);
    let kind = match command.into_task_kind() {
        Ok(kind) => kind,
        Err(e) => return ControlReply::bad_argument(name, e.to_string()),
    };
    match handle.execute(kind).await {
        Ok(completion) => {
            info!("{} task {} finished: {}", name, completion.id, completion.status);
            ControlReply::from_completion(name, completion)
        }
        Err(NcpError::BadArgument(msg)) => ControlReply::bad_argument(name, msg),
        Err(e) => ControlReply::error(name, ReplyStatus::Failed, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_eid_cache_parses_arguments() {
        let cmd = ControlCommand::add_eid_cache("fd00::1234", "0011223344556677", "2c01").unwrap();
        match cmd {
            ControlCommand::AddEidCache { eid, mliid, rloc16 } => {
                assert_eq!(&eid[14..], &[0x12, 0x34]);
                assert_eq!(mliid[7], 0x77);
                assert_eq!(rloc16, 0x2c01);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(ControlCommand::add_eid_cache("fd00::1", "xyz", "2c01").is_err());
    }

    #[test]
    fn invalid_commands_never_become_tasks() {
        let empty_scan = ControlCommand::Scan {
            channels: vec![],
            delay_ms: 100,
            energy: false,
        };
        assert!(matches!(
            empty_scan.into_task_kind(),
            Err(NcpError::BadArgument(_))
        ));
        let set_status = ControlCommand::SetProperty {
            prop: 0,
            value: vec![0],
        };
        assert!(set_status.into_task_kind().is_err());
    }

    #[test]
    fn exit_codes_follow_status() {
        let reply = ControlReply::from_completion(
            "scan",
            Completion {
                id: crate::ncp::Task::with_callback(PropertyTask::get(2).unwrap(), |_, _| {}).id(),
                status: TaskStatus::ProtocolError(12),
                result: ResultValue::Status(12),
            },
        );
        assert_eq!(reply.exit_code(), 5);
        assert_eq!(reply.code, Some(12));
        assert_eq!(ControlReply::bad_argument("scan", "no channels").exit_code(), 2);
    }

    #[test]
    fn commands_deserialize_from_json() {
        let cmd: ControlCommand =
            serde_json::from_str(r#"{"command":"scan","channels":[11,12],"delay_ms":50}"#).unwrap();
        assert_eq!(
            cmd,
            ControlCommand::Scan {
                channels: vec![11, 12],
                delay_ms: 50,
                energy: false
            }
        );
        let reply = ControlReply::bad_argument("scan", "empty");
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["status"], "bad_argument");
        assert_eq!(json["result"]["kind"], "empty");
        assert!(json.get("task").is_none());
    }
}
