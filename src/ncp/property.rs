//! Single-property tasks: get, set, insert and remove.
//!
//! Each one sends exactly one command and resolves on the first matching
//! answer: the `VALUE_IS` / `VALUE_INSERTED` / `VALUE_REMOVED` echo for the
//! same property, or a `LAST_STATUS`.

use log::{debug, warn};

use super::error::{NcpError, NcpResult};
use super::task::{NcpEvent, Outbox, Resolution, TaskStatus};
use super::value::ResultValue;
use crate::spinel::pack::{Writer, PACKED_UINT_MAX};
use crate::spinel::{prop, status, Command};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PropertyOp {
    Get,
    Set,
    Insert,
    Remove,
}

impl PropertyOp {
    fn command(self) -> Command {
        match self {
            PropertyOp::Get => Command::PropValueGet,
            PropertyOp::Set => Command::PropValueSet,
            PropertyOp::Insert => Command::PropValueInsert,
            PropertyOp::Remove => Command::PropValueRemove,
        }
    }
}

#[derive(Debug)]
pub struct PropertyTask {
    op: PropertyOp,
    prop: u32,
    value: Vec<u8>,
}

impl PropertyTask {
    fn build(op: PropertyOp, prop: u32, value: Vec<u8>) -> NcpResult<Self> {
        if prop > PACKED_UINT_MAX {
            return Err(NcpError::bad_argument(format!(
                "property id {} exceeds {}",
                prop, PACKED_UINT_MAX
            )));
        }
        if prop == prop::LAST_STATUS && op != PropertyOp::Get {
            return Err(NcpError::bad_argument("LAST_STATUS is read-only"));
        }
        Ok(PropertyTask { op, prop, value })
    }

    pub fn get(prop: u32) -> NcpResult<Self> {
        Self::build(PropertyOp::Get, prop, Vec::new())
    }

    pub fn set(prop: u32, value: Vec<u8>) -> NcpResult<Self> {
        Self::build(PropertyOp::Set, prop, value)
    }

    pub fn insert(prop: u32, value: Vec<u8>) -> NcpResult<Self> {
        Self::build(PropertyOp::Insert, prop, value)
    }

    pub fn remove(prop: u32, value: Vec<u8>) -> NcpResult<Self> {
        Self::build(PropertyOp::Remove, prop, value)
    }

    /// Insert one EID-to-RLOC mapping into the Thread address cache (`6ES`).
    pub fn eid_cache_entry(eid: [u8; 16], mliid: [u8; 8], rloc16: u16) -> NcpResult<Self> {
        let value = Writer::new()
            .bytes(&eid)
            .bytes(&mliid)
            .u16(rloc16)
            .finish();
        Self::insert(prop::THREAD_ADDRESS_CACHE_TABLE, value)
    }

    pub fn op(&self) -> PropertyOp {
        self.op
    }

    pub fn prop(&self) -> u32 {
        self.prop
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn op_name(&self) -> &'static str {
        match self.op {
            PropertyOp::Get => "prop-get",
            PropertyOp::Set => "prop-set",
            PropertyOp::Insert => "prop-insert",
            PropertyOp::Remove => "prop-remove",
        }
    }

    pub(crate) fn start(&mut self, out: &mut Outbox) {
        out.push(self.op.command(), self.prop, self.value.clone());
        debug!(
            "{}: {} ({} byte value)",
            self.op_name(),
            prop::name(self.prop),
            self.value.len()
        );
    }

    pub(crate) fn handle(&mut self, event: &NcpEvent, _out: &mut Outbox) -> Option<Resolution> {
        match event {
            NcpEvent::PropertyValue { prop, value } if *prop == self.prop => Some(Resolution::new(
                TaskStatus::Success,
                ResultValue::Bytes(value.clone()),
            )),
            NcpEvent::PropertyInserted { prop, value }
                if *prop == self.prop && self.op == PropertyOp::Insert =>
            {
                Some(Resolution::new(
                    TaskStatus::Success,
                    ResultValue::Bytes(value.clone()),
                ))
            }
            NcpEvent::PropertyRemoved { prop, value }
                if *prop == self.prop && self.op == PropertyOp::Remove =>
            {
                Some(Resolution::new(
                    TaskStatus::Success,
                    ResultValue::Bytes(value.clone()),
                ))
            }
            NcpEvent::LastStatus(code) if *code == status::OK => {
                if self.op == PropertyOp::Get {
                    // a get is only answered by the value itself
                    None
                } else {
                    Some(Resolution::new(TaskStatus::Success, ResultValue::Status(*code)))
                }
            }
            NcpEvent::LastStatus(code) => {
                warn!(
                    "{} {}: NCP reported {} ({})",
                    self.op_name(),
                    prop::name(self.prop),
                    code,
                    status::describe(*code)
                );
                Some(Resolution::new(
                    TaskStatus::ProtocolError(*code),
                    ResultValue::Status(*code),
                ))
            }
            NcpEvent::Timeout => Some(Resolution::new(TaskStatus::Timeout, ResultValue::Empty)),
            NcpEvent::TransportReset | NcpEvent::Cancel => {
                Some(Resolution::new(TaskStatus::Cancelled, ResultValue::Empty))
            }
            _ => None,
        }
    }
}
