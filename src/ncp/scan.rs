//! Channel scan task.
//!
//! A scan is a multi-frame exchange:
//!
//! 1. `SET MAC_SCAN_MASK` with the channel list,
//! 2. `SET MAC_SCAN_PERIOD` with the per-channel dwell in ms,
//! 3. `SET MAC_SCAN_STATE` = beacon or energy, which starts the scan,
//! 4. any number of `VALUE_INSERTED` results (beacons or energy readings),
//! 5. `VALUE_IS MAC_SCAN_STATE` = idle once the NCP is done.
//!
//! Results and idle reports are only taken after the NCP has echoed the
//! requested scan state. Anything earlier belongs to a previous scan that
//! was still winding down. A scan that times out or is cancelled sends
//! `SET MAC_SCAN_STATE` = idle so the NCP stops.
//!
//! Results are kept in arrival order and returned on every outcome, including
//! timeout and cancellation, since a partial scan is still useful.

use log::{debug, warn};

use super::error::{NcpError, NcpResult};
use super::task::{NcpEvent, Outbox, Resolution, TaskStatus};
use super::value::{BeaconInfo, ResultValue, ScanRecord};
use crate::spinel::pack::Reader;
use crate::spinel::{prop, scan_state, status, Command};

/// Capacity of the channel mask in bytes (channels 0..=255).
pub const CHANNEL_MASK_BYTES: usize = 32;

/// Fixed-capacity channel bitmask with an explicit encoded length.
///
/// Bit `n % 8` of byte `n / 8` marks channel `n`. Only the first
/// `encoded_len` bytes are significant, which allows short encodings for
/// masks that only touch low channels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChannelMask {
    data: [u8; CHANNEL_MASK_BYTES],
    len: u8,
}

impl ChannelMask {
    /// Build from an encoded bitmask of at most 32 bytes.
    pub fn from_bytes(encoded: &[u8]) -> NcpResult<Self> {
        if encoded.len() > CHANNEL_MASK_BYTES {
            return Err(NcpError::bad_argument(format!(
                "channel mask is {} bytes, maximum is {}",
                encoded.len(),
                CHANNEL_MASK_BYTES
            )));
        }
        let mut data = [0u8; CHANNEL_MASK_BYTES];
        data[..encoded.len()].copy_from_slice(encoded);
        let mask = ChannelMask {
            data,
            len: encoded.len() as u8,
        };
        if mask.is_empty() {
            return Err(NcpError::bad_argument("channel mask has no channels set"));
        }
        Ok(mask)
    }

    pub fn from_channels<I: IntoIterator<Item = u8>>(channels: I) -> NcpResult<Self> {
        let mut data = [0u8; CHANNEL_MASK_BYTES];
        let mut len = 0usize;
        for ch in channels {
            let byte = (ch / 8) as usize;
            data[byte] |= 1 << (ch % 8);
            len = len.max(byte + 1);
        }
        if len == 0 {
            return Err(NcpError::bad_argument("channel mask has no channels set"));
        }
        Ok(ChannelMask {
            data,
            len: len as u8,
        })
    }

    /// Channels 0..=31 from a 32-bit mask (bit n = channel n).
    pub fn from_u32(mask: u32) -> NcpResult<Self> {
        Self::from_bytes(&mask.to_le_bytes())
    }

    pub fn encoded_len(&self) -> usize {
        self.len as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.encoded_len()]
    }

    pub fn contains(&self, channel: u8) -> bool {
        let byte = (channel / 8) as usize;
        byte < self.encoded_len() && self.data[byte] & (1 << (channel % 8)) != 0
    }

    pub fn channels(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(move |&ch| self.contains(ch))
    }

    pub fn count(&self) -> usize {
        self.as_bytes().iter().map(|b| b.count_ones() as usize).sum()
    }

    fn is_empty(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }

    /// `MAC_SCAN_MASK` wire value: the channel numbers, one byte each.
    pub fn to_wire(&self) -> Vec<u8> {
        self.channels().collect()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum ScanKind {
    /// Active scan collecting 802.15.4 beacons.
    #[default]
    Beacon,
    /// Energy-detect scan reporting the peak RSSI per channel.
    Energy,
}

impl ScanKind {
    fn scan_state(self) -> u8 {
        match self {
            ScanKind::Beacon => scan_state::BEACON,
            ScanKind::Energy => scan_state::ENERGY,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ScanPhase {
    Init,
    /// Start frames sent, waiting for the NCP to echo the scan state.
    Starting,
    Scanning,
}

#[derive(Debug)]
pub struct ScanTask {
    mask: ChannelMask,
    delay_ms: u16,
    kind: ScanKind,
    phase: ScanPhase,
    results: Vec<ScanRecord>,
}

impl ScanTask {
    /// `delay_ms` is the per-channel period applied by the NCP (`MAC_SCAN_PERIOD`, u16).
    pub fn new(mask: ChannelMask, delay_ms: u32, kind: ScanKind) -> NcpResult<Self> {
        let delay_ms = u16::try_from(delay_ms).map_err(|_| {
            NcpError::bad_argument(format!(
                "scan period {}ms exceeds {}ms",
                delay_ms,
                u16::MAX
            ))
        })?;
        Ok(ScanTask {
            mask,
            delay_ms,
            kind,
            phase: ScanPhase::Init,
            results: Vec::new(),
        })
    }

    pub fn mask(&self) -> &ChannelMask {
        &self.mask
    }

    pub fn delay_ms(&self) -> u16 {
        self.delay_ms
    }

    pub fn scan_kind(&self) -> ScanKind {
        self.kind
    }

    pub fn results(&self) -> &[ScanRecord] {
        &self.results
    }

    pub(crate) fn start(&mut self, out: &mut Outbox) {
        out.push(Command::PropValueSet, prop::MAC_SCAN_MASK, self.mask.to_wire());
        out.push(
            Command::PropValueSet,
            prop::MAC_SCAN_PERIOD,
            self.delay_ms.to_le_bytes().to_vec(),
        );
        out.push(
            Command::PropValueSet,
            prop::MAC_SCAN_STATE,
            vec![self.kind.scan_state()],
        );
        self.phase = ScanPhase::Starting;
        debug!(
            "scan: {:?} on {} channel(s), period {}ms",
            self.kind,
            self.mask.count(),
            self.delay_ms
        );
    }

    pub(crate) fn handle(&mut self, event: &NcpEvent, out: &mut Outbox) -> Option<Resolution> {
        if self.phase == ScanPhase::Init {
            return None;
        }
        match event {
            NcpEvent::PropertyInserted { prop, value } => {
                if self.phase != ScanPhase::Scanning {
                    debug!("scan: dropping {} result before start echo", prop::name(*prop));
                    return None;
                }
                match *prop {
                    prop::MAC_SCAN_BEACON => self.push_beacon(value),
                    prop::MAC_ENERGY_SCAN_RESULT => self.push_energy(value),
                    _ => {}
                }
                None
            }
            NcpEvent::PropertyValue { prop, value } if *prop == prop::MAC_SCAN_STATE => {
                let state = value.first().copied();
                match (self.phase, state) {
                    (ScanPhase::Scanning, Some(scan_state::IDLE)) => {
                        Some(self.resolve(TaskStatus::Success))
                    }
                    (ScanPhase::Starting, Some(s)) if s == self.kind.scan_state() => {
                        self.phase = ScanPhase::Scanning;
                        None
                    }
                    _ => {
                        debug!("scan: state now {:?} while {:?}", state, self.phase);
                        None
                    }
                }
            }
            NcpEvent::LastStatus(code) if *code != status::OK => {
                warn!(
                    "scan: NCP reported status {} ({})",
                    code,
                    status::describe(*code)
                );
                Some(self.resolve(TaskStatus::ProtocolError(*code)))
            }
            NcpEvent::Timeout => {
                warn!("scan: timed out with {} result(s)", self.results.len());
                self.stop(out);
                Some(self.resolve(TaskStatus::Timeout))
            }
            NcpEvent::Cancel => {
                self.stop(out);
                Some(self.resolve(TaskStatus::Cancelled))
            }
            NcpEvent::TransportReset => Some(self.resolve(TaskStatus::Cancelled)),
            _ => None,
        }
    }

    fn stop(&self, out: &mut Outbox) {
        out.push(
            Command::PropValueSet,
            prop::MAC_SCAN_STATE,
            vec![scan_state::IDLE],
        );
    }

    fn push_beacon(&mut self, value: &[u8]) {
        match BeaconInfo::decode(value) {
            Ok(beacon) => {
                debug!(
                    "scan: beacon ch={} rssi={} pan=0x{:04x} name='{}'",
                    beacon.channel, beacon.rssi, beacon.pan_id, beacon.network_name
                );
                self.results.push(ScanRecord::Beacon(beacon));
            }
            Err(e) => {
                warn!("scan: undecodable beacon kept raw: {}", e);
                self.results.push(ScanRecord::Raw {
                    prop: prop::MAC_SCAN_BEACON,
                    data: value.to_vec(),
                });
            }
        }
    }

    fn push_energy(&mut self, value: &[u8]) {
        let mut r = Reader::new(value);
        match (r.read_u8(), r.read_i8()) {
            (Ok(channel), Ok(max_rssi)) => {
                self.results.push(ScanRecord::Energy { channel, max_rssi });
            }
            _ => {
                warn!("scan: short energy result kept raw");
                self.results.push(ScanRecord::Raw {
                    prop: prop::MAC_ENERGY_SCAN_RESULT,
                    data: value.to_vec(),
                });
            }
        }
    }

    fn resolve(&mut self, status: TaskStatus) -> Resolution {
        Resolution::new(status, ResultValue::List(std::mem::take(&mut self.results)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ncp::value::sample_beacon;

    fn started(channels: &[u8], delay: u32) -> (ScanTask, Outbox) {
        let mask = ChannelMask::from_channels(channels.iter().copied()).unwrap();
        let mut task = ScanTask::new(mask, delay, ScanKind::Beacon).unwrap();
        let mut out = Outbox::new();
        task.start(&mut out);
        (task, out)
    }

    fn state_event(state: u8) -> NcpEvent {
        NcpEvent::PropertyValue {
            prop: prop::MAC_SCAN_STATE,
            value: vec![state],
        }
    }

    /// Started and past the NCP's echo of the scan state.
    fn scanning(channels: &[u8], delay: u32) -> (ScanTask, Outbox) {
        let (mut task, mut out) = started(channels, delay);
        out.drain();
        assert!(task.handle(&state_event(scan_state::BEACON), &mut out).is_none());
        (task, out)
    }

    fn is_stop(out: &mut Outbox) -> bool {
        let frames: Vec<_> = out.drain().collect();
        frames.len() == 1
            && frames[0].command == Command::PropValueSet
            && frames[0].property == prop::MAC_SCAN_STATE
            && frames[0].payload == vec![scan_state::IDLE]
    }

    fn beacon_event(ch: u8) -> NcpEvent {
        NcpEvent::PropertyInserted {
            prop: prop::MAC_SCAN_BEACON,
            value: sample_beacon(ch, "net").encode(),
        }
    }

    #[test]
    fn mask_from_channels_tracks_length() {
        let mask = ChannelMask::from_channels([11, 15, 20]).unwrap();
        assert_eq!(mask.encoded_len(), 3);
        assert_eq!(mask.as_bytes(), &[0x00, 0x88, 0x10]);
        assert_eq!(mask.channels().collect::<Vec<_>>(), vec![11, 15, 20]);
        assert_eq!(mask.count(), 3);
        assert!(!mask.contains(12));
        assert!(!mask.contains(200));
    }

    #[test]
    fn mask_rejects_empty_and_oversized() {
        assert!(matches!(
            ChannelMask::from_channels([]),
            Err(NcpError::BadArgument(_))
        ));
        assert!(matches!(
            ChannelMask::from_bytes(&[0, 0, 0]),
            Err(NcpError::BadArgument(_))
        ));
        assert!(matches!(
            ChannelMask::from_bytes(&[0xff; 33]),
            Err(NcpError::BadArgument(_))
        ));
        assert!(matches!(ChannelMask::from_u32(0), Err(NcpError::BadArgument(_))));
    }

    #[test]
    fn mask_covers_full_channel_range() {
        let mask = ChannelMask::from_bytes(&[0xff; 32]).unwrap();
        assert_eq!(mask.count(), 256);
        assert!(mask.contains(255));
        let mask = ChannelMask::from_u32(1 << 26).unwrap();
        assert_eq!(mask.to_wire(), vec![26]);
    }

    #[test]
    fn scan_period_must_fit_u16() {
        let mask = ChannelMask::from_channels([11]).unwrap();
        assert!(ScanTask::new(mask, 70_000, ScanKind::Beacon).is_err());
    }

    #[test]
    fn start_emits_mask_period_state_in_order() {
        let (_task, mut out) = started(&[11, 15, 20], 120);
        let frames: Vec<_> = out.drain().collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].property, prop::MAC_SCAN_MASK);
        assert_eq!(frames[0].payload, vec![11, 15, 20]);
        assert_eq!(frames[1].property, prop::MAC_SCAN_PERIOD);
        assert_eq!(frames[1].payload, vec![120, 0]);
        assert_eq!(frames[2].property, prop::MAC_SCAN_STATE);
        assert_eq!(frames[2].payload, vec![scan_state::BEACON]);
        assert!(frames.iter().all(|f| f.command == Command::PropValueSet));
    }

    #[test]
    fn results_accumulate_until_idle() {
        let (mut task, mut out) = scanning(&[11, 15, 20], 120);
        for ch in [15, 11, 20] {
            assert!(task.handle(&beacon_event(ch), &mut out).is_none());
        }
        // a repeated echo and an OK status are chatter
        assert!(task.handle(&state_event(scan_state::BEACON), &mut out).is_none());
        assert!(task.handle(&NcpEvent::LastStatus(status::OK), &mut out).is_none());

        let res = task
            .handle(&state_event(scan_state::IDLE), &mut out)
            .expect("resolved");
        assert!(out.is_empty());
        assert_eq!(res.status, TaskStatus::Success);
        let channels: Vec<u8> = res
            .result
            .as_list()
            .unwrap()
            .iter()
            .map(|r| match r {
                ScanRecord::Beacon(b) => b.channel,
                other => panic!("unexpected record {:?}", other),
            })
            .collect();
        assert_eq!(channels, vec![15, 11, 20]);
    }

    #[test]
    fn timeout_returns_partial_results() {
        let (mut task, mut out) = scanning(&[11, 12, 13, 14, 15], 50);
        task.handle(&beacon_event(11), &mut out);
        task.handle(&beacon_event(12), &mut out);
        let res = task.handle(&NcpEvent::Timeout, &mut out).unwrap();
        assert_eq!(res.status, TaskStatus::Timeout);
        assert_eq!(res.result.as_list().unwrap().len(), 2);
        assert!(is_stop(&mut out), "timed out scan must be stopped on the NCP");
    }

    #[test]
    fn cancel_stops_the_ncp_but_reset_does_not() {
        let (mut task, mut out) = scanning(&[11], 50);
        let res = task.handle(&NcpEvent::Cancel, &mut out).unwrap();
        assert_eq!(res.status, TaskStatus::Cancelled);
        assert!(is_stop(&mut out));

        let (mut task, mut out) = scanning(&[11], 50);
        let res = task.handle(&NcpEvent::TransportReset, &mut out).unwrap();
        assert_eq!(res.status, TaskStatus::Cancelled);
        assert!(out.is_empty());
    }

    #[test]
    fn frames_before_the_start_echo_belong_to_an_older_scan() {
        let (mut task, mut out) = started(&[11, 12], 50);
        out.drain();
        // leftovers of a scan that was stopped just before this one started
        assert!(task.handle(&beacon_event(11), &mut out).is_none());
        assert!(task.handle(&state_event(scan_state::IDLE), &mut out).is_none());
        assert!(task.handle(&state_event(scan_state::ENERGY), &mut out).is_none());
        assert!(task.results().is_empty());

        assert!(task.handle(&state_event(scan_state::BEACON), &mut out).is_none());
        task.handle(&beacon_event(12), &mut out);
        let res = task.handle(&state_event(scan_state::IDLE), &mut out).unwrap();
        assert_eq!(res.status, TaskStatus::Success);
        assert_eq!(res.result.as_list().unwrap().len(), 1);
    }

    #[test]
    fn timeout_before_the_echo_still_stops_the_ncp() {
        let (mut task, mut out) = started(&[11], 50);
        out.drain();
        let res = task.handle(&NcpEvent::Timeout, &mut out).unwrap();
        assert_eq!(res.status, TaskStatus::Timeout);
        assert!(res.result.as_list().unwrap().is_empty());
        assert!(is_stop(&mut out));
    }

    #[test]
    fn failing_status_is_protocol_error_with_partials() {
        let (mut task, mut out) = scanning(&[11], 50);
        task.handle(&beacon_event(11), &mut out);
        let res = task
            .handle(&NcpEvent::LastStatus(status::INVALID_STATE), &mut out)
            .unwrap();
        assert_eq!(res.status, TaskStatus::ProtocolError(status::INVALID_STATE));
        assert_eq!(res.result.as_list().unwrap().len(), 1);
    }

    #[test]
    fn energy_and_garbled_results_are_kept() {
        let (mut task, mut out) = scanning(&[11, 12], 50);
        let energy = NcpEvent::PropertyInserted {
            prop: prop::MAC_ENERGY_SCAN_RESULT,
            value: vec![12, 0xb0],
        };
        let garbled = NcpEvent::PropertyInserted {
            prop: prop::MAC_SCAN_BEACON,
            value: vec![11],
        };
        task.handle(&energy, &mut out);
        task.handle(&garbled, &mut out);
        assert_eq!(
            task.results()[0],
            ScanRecord::Energy {
                channel: 12,
                max_rssi: -80
            }
        );
        assert!(matches!(task.results()[1], ScanRecord::Raw { .. }));
        let res = task.handle(&NcpEvent::TransportReset, &mut out).unwrap();
        assert_eq!(res.status, TaskStatus::Cancelled);
        assert_eq!(res.result.as_list().unwrap().len(), 2);
    }

    #[test]
    fn unrelated_events_are_ignored() {
        let (mut task, mut out) = started(&[11], 50);
        out.drain();
        let chatter = [
            NcpEvent::Raw(vec![0x80, 0x00]),
            NcpEvent::PropertyValue {
                prop: prop::STREAM_DEBUG,
                value: b"hello".to_vec(),
            },
            NcpEvent::PropertyInserted {
                prop: prop::THREAD_ADDRESS_CACHE_TABLE,
                value: vec![1, 2, 3],
            },
            NcpEvent::PropertyRemoved {
                prop: prop::MAC_SCAN_BEACON,
                value: vec![],
            },
        ];
        for ev in &chatter {
            assert!(task.handle(ev, &mut out).is_none());
        }
        assert!(task.results().is_empty());
        assert!(out.is_empty());
    }
}
