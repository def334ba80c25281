//! Task result values.
//!
//! The engine never needs to know which shape a task produces; it only moves a
//! [`ResultValue`] from the task into the completion callback.

use serde::Serialize;

use crate::ncp::error::NcpResult;
use crate::spinel::pack::{encode_packed_uint, Reader, Writer, PACKED_UINT_MAX};

/// Outcome payload delivered with every completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResultValue {
    #[default]
    Empty,
    /// A bare Spinel status code (e.g. the `LAST_STATUS` that answered an insert).
    Status(u32),
    List(Vec<ScanRecord>),
    Bytes(Vec<u8>),
}

impl ResultValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, ResultValue::Empty)
    }

    pub fn as_list(&self) -> Option<&[ScanRecord]> {
        match self {
            ResultValue::List(records) => Some(records),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ResultValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// One entry produced by a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanRecord {
    Beacon(BeaconInfo),
    Energy { channel: u8, max_rssi: i8 },
    /// A result the host could not parse; kept so nothing the NCP reported is lost.
    Raw { prop: u32, data: Vec<u8> },
}

/// Active-scan beacon as reported in `MAC_SCAN_BEACON` (`Cct(ESSC)t(iCUdd)`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeaconInfo {
    pub channel: u8,
    pub rssi: i8,
    pub ext_addr: [u8; 8],
    pub short_addr: u16,
    pub pan_id: u16,
    pub lqi: u8,
    pub protocol: u32,
    pub flags: u8,
    pub network_name: String,
    pub xpan_id: Vec<u8>,
    pub steering_data: Vec<u8>,
}

impl BeaconInfo {
    pub fn decode(data: &[u8]) -> NcpResult<Self> {
        let mut r = Reader::new(data);
        let channel = r.read_u8()?;
        let rssi = r.read_i8()?;

        let mut mac = r.read_struct()?;
        let ext_addr = mac.read_eui64()?;
        let short_addr = mac.read_u16()?;
        let pan_id = mac.read_u16()?;
        let lqi = mac.read_u8()?;

        let mut net = r.read_struct()?;
        let protocol = net.read_packed_uint()?;
        let flags = net.read_u8()?;
        let network_name = net.read_utf8()?;
        let xpan_id = net.read_data_with_len()?.to_vec();
        let steering_data = if net.is_empty() {
            Vec::new()
        } else {
            net.read_data_with_len()?.to_vec()
        };

        Ok(BeaconInfo {
            channel,
            rssi,
            ext_addr,
            short_addr,
            pan_id,
            lqi,
            protocol,
            flags,
            network_name,
            xpan_id,
            steering_data,
        })
    }

    /// Wire form of the beacon, as an NCP would insert it.
    pub fn encode(&self) -> Vec<u8> {
        let mac = Writer::new()
            .bytes(&self.ext_addr)
            .u16(self.short_addr)
            .u16(self.pan_id)
            .u8(self.lqi)
            .finish();
        let mut protocol = Vec::new();
        // protocol ids are tiny; anything past 21 bits is clamped
        let _ = encode_packed_uint(self.protocol.min(PACKED_UINT_MAX), &mut protocol);
        let net = Writer::new()
            .bytes(&protocol)
            .u8(self.flags)
            .bytes(self.network_name.as_bytes())
            .u8(0)
            .u16(self.xpan_id.len() as u16)
            .bytes(&self.xpan_id)
            .u16(self.steering_data.len() as u16)
            .bytes(&self.steering_data)
            .finish();
        Writer::new()
            .u8(self.channel)
            .u8(self.rssi as u8)
            .u16(mac.len() as u16)
            .bytes(&mac)
            .u16(net.len() as u16)
            .bytes(&net)
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn sample_beacon(channel: u8, name: &str) -> BeaconInfo {
    BeaconInfo {
        channel,
        rssi: -61,
        ext_addr: [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, channel],
        short_addr: 0xfffe,
        pan_id: 0x1234,
        lqi: 200,
        protocol: 3,
        flags: 0x01,
        network_name: name.to_string(),
        xpan_id: vec![0xde, 0xad, 0x00, 0xbe, 0xef, 0x00, 0xca, 0xfe],
        steering_data: Vec::new(),
    }
}
