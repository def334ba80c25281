//! Spinel frame codec.
//!
//! The task engine only sees [`FrameCodec`]: it asks for an outbound frame by
//! `(command, property, payload)` and receives inbound frames already mapped
//! to an [`NcpEvent`]. [`SpinelCodec`] is the production implementation.

use log::trace;

use super::pack::{decode_packed_uint, encode_packed_uint, Reader};
use super::{prop, Command, HEADER_FLAG, HEADER_FLAG_MASK, HEADER_IID_MASK, HEADER_TID_MASK};
use crate::ncp::error::{NcpError, NcpResult};
use crate::ncp::NcpEvent;

/// Encode/decode boundary between the engine and the wire.
pub trait FrameCodec: Send {
    /// Build one outbound frame (without byte stuffing).
    fn encode(&mut self, command: Command, property: u32, payload: &[u8]) -> NcpResult<Vec<u8>>;

    /// Map one inbound frame (already unstuffed) to an engine event.
    fn decode(&mut self, frame: &[u8]) -> NcpResult<NcpEvent>;
}

/// A parsed Spinel frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpinelFrame {
    pub iid: u8,
    pub tid: u8,
    pub command: Command,
    pub property: Option<u32>,
    pub payload: Vec<u8>,
}

impl SpinelFrame {
    pub fn parse(frame: &[u8]) -> NcpResult<Self> {
        let (&header, rest) = frame
            .split_first()
            .ok_or_else(|| NcpError::codec("empty frame"))?;
        if header & HEADER_FLAG_MASK != HEADER_FLAG {
            return Err(NcpError::codec(format!("bad header byte 0x{:02x}", header)));
        }
        let (command_id, used) = decode_packed_uint(rest)?;
        let command = Command::from_id(command_id);
        let rest = &rest[used..];
        let (property, payload) = if command.has_property() {
            let (p, used) = decode_packed_uint(rest)?;
            (Some(p), &rest[used..])
        } else {
            (None, rest)
        };
        Ok(SpinelFrame {
            iid: (header & HEADER_IID_MASK) >> 4,
            tid: header & HEADER_TID_MASK,
            command,
            property,
            payload: payload.to_vec(),
        })
    }

    pub fn to_bytes(&self) -> NcpResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.payload.len() + 4);
        out.push(HEADER_FLAG | ((self.iid << 4) & HEADER_IID_MASK) | (self.tid & HEADER_TID_MASK));
        encode_packed_uint(self.command.id(), &mut out)?;
        if let Some(p) = self.property {
            encode_packed_uint(p, &mut out)?;
        }
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}

/// Spinel codec for a single interface id. Host commands get transaction ids
/// 1..=15 in rotation; tid 0 is left for unsolicited NCP notifications.
#[derive(Debug)]
pub struct SpinelCodec {
    iid: u8,
    next_tid: u8,
}

impl SpinelCodec {
    pub fn new(iid: u8) -> Self {
        Self {
            iid: iid & 0x03,
            next_tid: 1,
        }
    }

    fn take_tid(&mut self) -> u8 {
        let tid = self.next_tid;
        self.next_tid = if tid >= HEADER_TID_MASK { 1 } else { tid + 1 };
        tid
    }
}

impl Default for SpinelCodec {
    fn default() -> Self {
        Self::new(0)
    }
}

impl FrameCodec for SpinelCodec {
    fn encode(&mut self, command: Command, property: u32, payload: &[u8]) -> NcpResult<Vec<u8>> {
        let frame = SpinelFrame {
            iid: self.iid,
            tid: self.take_tid(),
            command,
            property: command.has_property().then_some(property),
            payload: payload.to_vec(),
        };
        frame.to_bytes()
    }

    fn decode(&mut self, frame: &[u8]) -> NcpResult<NcpEvent> {
        let parsed = SpinelFrame::parse(frame)?;
        if parsed.iid != self.iid {
            trace!("frame for iid {} (ours {}), passing through raw", parsed.iid, self.iid);
            return Ok(NcpEvent::Raw(frame.to_vec()));
        }
        let event = match (parsed.command, parsed.property) {
            (Command::PropValueIs, Some(prop::LAST_STATUS)) => {
                let status = Reader::new(&parsed.payload).read_packed_uint()?;
                NcpEvent::LastStatus(status)
            }
            (Command::PropValueIs, Some(prop)) => NcpEvent::PropertyValue {
                prop,
                value: parsed.payload,
            },
            (Command::PropValueInserted, Some(prop)) => NcpEvent::PropertyInserted {
                prop,
                value: parsed.payload,
            },
            (Command::PropValueRemoved, Some(prop)) => NcpEvent::PropertyRemoved {
                prop,
                value: parsed.payload,
            },
            _ => NcpEvent::Raw(frame.to_vec()),
        };
        Ok(event)
    }
}
