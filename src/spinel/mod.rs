//! # Spinel Protocol Module
//!
//! Wire-level vocabulary for talking to a Spinel NCP: command and property
//! identifiers, status codes, the packed-integer encoding, the frame codec
//! consumed by the task engine, and HDLC-lite byte framing for UART links.
//!
//! ## Frame Layout
//!
//! ```text
//! +--------+-------------------+--------------------+-----------------+
//! | header | command (packed)  | property (packed)  | property value  |
//! +--------+-------------------+--------------------+-----------------+
//!   0x80 | iid << 4 | tid
//! ```
//!
//! On a UART the frame above is wrapped by [`hdlc`] with a CRC-16 FCS.
//!
//! Only the subset of the protocol needed by the task engine is modeled here;
//! general property persistence lives outside this crate.

pub mod codec;
pub mod hdlc;
pub mod pack;

pub use codec::{FrameCodec, SpinelCodec, SpinelFrame};

/// Header flag bits every Spinel frame must carry.
pub const HEADER_FLAG: u8 = 0x80;
pub const HEADER_FLAG_MASK: u8 = 0xC0;
pub const HEADER_IID_MASK: u8 = 0x30;
pub const HEADER_TID_MASK: u8 = 0x0F;

/// Spinel command identifiers (host → NCP and NCP → host).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Command {
    Noop,
    Reset,
    PropValueGet,
    PropValueSet,
    PropValueInsert,
    PropValueRemove,
    PropValueIs,
    PropValueInserted,
    PropValueRemoved,
    /// Any command this crate does not model (vendor, peek/poke, ...).
    Other(u32),
}

impl Command {
    pub fn id(self) -> u32 {
        match self {
            Command::Noop => 0,
            Command::Reset => 1,
            Command::PropValueGet => 2,
            Command::PropValueSet => 3,
            Command::PropValueInsert => 4,
            Command::PropValueRemove => 5,
            Command::PropValueIs => 6,
            Command::PropValueInserted => 7,
            Command::PropValueRemoved => 8,
            Command::Other(id) => id,
        }
    }

    pub fn from_id(id: u32) -> Self {
        match id {
            0 => Command::Noop,
            1 => Command::Reset,
            2 => Command::PropValueGet,
            3 => Command::PropValueSet,
            4 => Command::PropValueInsert,
            5 => Command::PropValueRemove,
            6 => Command::PropValueIs,
            7 => Command::PropValueInserted,
            8 => Command::PropValueRemoved,
            other => Command::Other(other),
        }
    }

    /// True for commands that carry a property key after the command id.
    pub fn has_property(self) -> bool {
        matches!(
            self,
            Command::PropValueGet
                | Command::PropValueSet
                | Command::PropValueInsert
                | Command::PropValueRemove
                | Command::PropValueIs
                | Command::PropValueInserted
                | Command::PropValueRemoved
        )
    }
}

/// Property identifiers used by the engine and the control surface.
pub mod prop {
    pub const LAST_STATUS: u32 = 0;
    pub const PROTOCOL_VERSION: u32 = 1;
    pub const NCP_VERSION: u32 = 2;
    pub const INTERFACE_TYPE: u32 = 3;
    pub const VENDOR_ID: u32 = 4;
    pub const CAPS: u32 = 5;
    pub const INTERFACE_COUNT: u32 = 6;
    pub const POWER_STATE: u32 = 7;
    pub const HWADDR: u32 = 8;

    pub const PHY_ENABLED: u32 = 0x20;
    pub const PHY_CHAN: u32 = 0x21;
    pub const PHY_CHAN_SUPPORTED: u32 = 0x22;
    pub const PHY_RSSI: u32 = 0x26;

    pub const MAC_SCAN_STATE: u32 = 0x30;
    pub const MAC_SCAN_MASK: u32 = 0x31;
    pub const MAC_SCAN_PERIOD: u32 = 0x32;
    pub const MAC_SCAN_BEACON: u32 = 0x33;
    pub const MAC_15_4_LADDR: u32 = 0x34;
    pub const MAC_15_4_SADDR: u32 = 0x35;
    pub const MAC_15_4_PANID: u32 = 0x36;
    pub const MAC_ENERGY_SCAN_RESULT: u32 = 0x39;

    pub const NET_SAVED: u32 = 0x40;
    pub const NET_IF_UP: u32 = 0x41;
    pub const NET_STACK_UP: u32 = 0x42;
    pub const NET_ROLE: u32 = 0x43;
    pub const NET_NETWORK_NAME: u32 = 0x44;
    pub const NET_XPANID: u32 = 0x45;

    pub const STREAM_DEBUG: u32 = 0x70;

    /// Start of the Thread extension range.
    pub const THREAD_EXT_BEGIN: u32 = 0x1500;
    /// EID-to-RLOC address cache table (insert `6ES`: EID, mesh-local IID, RLOC16).
    pub const THREAD_ADDRESS_CACHE_TABLE: u32 = THREAD_EXT_BEGIN + 27;

    pub fn name(prop: u32) -> &'static str {
        match prop {
            LAST_STATUS => "LAST_STATUS",
            PROTOCOL_VERSION => "PROTOCOL_VERSION",
            NCP_VERSION => "NCP_VERSION",
            INTERFACE_TYPE => "INTERFACE_TYPE",
            VENDOR_ID => "VENDOR_ID",
            CAPS => "CAPS",
            INTERFACE_COUNT => "INTERFACE_COUNT",
            POWER_STATE => "POWER_STATE",
            HWADDR => "HWADDR",
            PHY_ENABLED => "PHY_ENABLED",
            PHY_CHAN => "PHY_CHAN",
            PHY_CHAN_SUPPORTED => "PHY_CHAN_SUPPORTED",
            PHY_RSSI => "PHY_RSSI",
            MAC_SCAN_STATE => "MAC_SCAN_STATE",
            MAC_SCAN_MASK => "MAC_SCAN_MASK",
            MAC_SCAN_PERIOD => "MAC_SCAN_PERIOD",
            MAC_SCAN_BEACON => "MAC_SCAN_BEACON",
            MAC_15_4_LADDR => "MAC_15_4_LADDR",
            MAC_15_4_SADDR => "MAC_15_4_SADDR",
            MAC_15_4_PANID => "MAC_15_4_PANID",
            MAC_ENERGY_SCAN_RESULT => "MAC_ENERGY_SCAN_RESULT",
            NET_SAVED => "NET_SAVED",
            NET_IF_UP => "NET_IF_UP",
            NET_STACK_UP => "NET_STACK_UP",
            NET_ROLE => "NET_ROLE",
            NET_NETWORK_NAME => "NET_NETWORK_NAME",
            NET_XPANID => "NET_XPANID",
            STREAM_DEBUG => "STREAM_DEBUG",
            THREAD_ADDRESS_CACHE_TABLE => "THREAD_ADDRESS_CACHE_TABLE",
            _ => "UNKNOWN",
        }
    }
}

/// Values of `MAC_SCAN_STATE`.
pub mod scan_state {
    pub const IDLE: u8 = 0;
    pub const BEACON: u8 = 1;
    pub const ENERGY: u8 = 2;
}

/// Spinel status codes as reported through `LAST_STATUS`.
pub mod status {
    pub const OK: u32 = 0;
    pub const FAILURE: u32 = 1;
    pub const UNIMPLEMENTED: u32 = 2;
    pub const INVALID_ARGUMENT: u32 = 3;
    pub const INVALID_STATE: u32 = 4;
    pub const INVALID_COMMAND: u32 = 5;
    pub const INVALID_INTERFACE: u32 = 6;
    pub const INTERNAL_ERROR: u32 = 7;
    pub const SECURITY_ERROR: u32 = 8;
    pub const PARSE_ERROR: u32 = 9;
    pub const IN_PROGRESS: u32 = 10;
    pub const NOMEM: u32 = 11;
    pub const BUSY: u32 = 12;
    pub const PROP_NOT_FOUND: u32 = 13;
    pub const DROPPED: u32 = 14;
    pub const EMPTY: u32 = 15;
    pub const CMD_TOO_BIG: u32 = 16;
    pub const NO_ACK: u32 = 17;
    pub const CCA_FAILURE: u32 = 18;
    pub const ALREADY: u32 = 19;
    pub const ITEM_NOT_FOUND: u32 = 20;
    pub const INVALID_COMMAND_FOR_PROP: u32 = 21;

    pub const RESET_BEGIN: u32 = 112;
    pub const RESET_POWER_ON: u32 = 112;
    pub const RESET_EXTERNAL: u32 = 113;
    pub const RESET_SOFTWARE: u32 = 114;
    pub const RESET_FAULT: u32 = 115;
    pub const RESET_CRASH: u32 = 116;
    pub const RESET_ASSERT: u32 = 117;
    pub const RESET_OTHER: u32 = 118;
    pub const RESET_UNKNOWN: u32 = 119;
    pub const RESET_WATCHDOG: u32 = 120;
    pub const RESET_END: u32 = 128;

    /// True when the status reports that the NCP itself was reset.
    pub fn is_reset(code: u32) -> bool {
        (RESET_BEGIN..RESET_END).contains(&code)
    }

    pub fn describe(code: u32) -> &'static str {
        match code {
            OK => "ok",
            FAILURE => "failure",
            UNIMPLEMENTED => "unimplemented",
            INVALID_ARGUMENT => "invalid argument",
            INVALID_STATE => "invalid state",
            INVALID_COMMAND => "invalid command",
            INVALID_INTERFACE => "invalid interface",
            INTERNAL_ERROR => "internal error",
            SECURITY_ERROR => "security error",
            PARSE_ERROR => "parse error",
            IN_PROGRESS => "in progress",
            NOMEM => "out of memory",
            BUSY => "busy",
            PROP_NOT_FOUND => "property not found",
            DROPPED => "dropped",
            EMPTY => "empty",
            CMD_TOO_BIG => "command too big",
            NO_ACK => "no ack",
            CCA_FAILURE => "cca failure",
            ALREADY => "already",
            ITEM_NOT_FOUND => "item not found",
            INVALID_COMMAND_FOR_PROP => "invalid command for property",
            RESET_POWER_ON => "reset: power on",
            RESET_EXTERNAL => "reset: external",
            RESET_SOFTWARE => "reset: software",
            RESET_FAULT => "reset: fault",
            RESET_CRASH => "reset: crash",
            RESET_ASSERT => "reset: assert",
            RESET_WATCHDOG => "reset: watchdog",
            c if is_reset(c) => "reset: other",
            _ => "unknown",
        }
    }
}
