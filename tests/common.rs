//! Test utilities & fixtures.
//! A scripted fake NCP that answers the driver over a [`MockTransport`].
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ncpd::ncp::{BeaconInfo, DriverTuning, InstanceTuning, MockTransport, NcpInstance};
use ncpd::spinel::{prop, scan_state, status, Command, SpinelCodec, SpinelFrame};
use tokio::task::JoinHandle;

/// Driver tuning fast enough for tests.
pub fn fast_tuning() -> DriverTuning {
    DriverTuning {
        poll_interval: Duration::from_millis(2),
        stats_interval: Duration::from_secs(60),
        reconnect_interval: Duration::from_millis(20),
    }
}

pub fn instance() -> NcpInstance {
    NcpInstance::new(SpinelCodec::new(0), InstanceTuning::default())
}

pub fn instance_with_timeout(timeout: Duration) -> NcpInstance {
    let tuning = InstanceTuning {
        property_timeout: timeout,
        scan_timeout: timeout,
        ..InstanceTuning::default()
    };
    NcpInstance::new(SpinelCodec::new(0), tuning)
}

/// Fail the test instead of hanging when something never completes.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .expect("operation did not finish in time")
}

/// An unsolicited NCP frame (tid 0, iid 0).
pub fn ncp_frame(command: Command, property: u32, payload: &[u8]) -> Vec<u8> {
    SpinelFrame {
        iid: 0,
        tid: 0,
        command,
        property: Some(property),
        payload: payload.to_vec(),
    }
    .to_bytes()
    .expect("frame encodes")
}

pub fn last_status(code: u32) -> Vec<u8> {
    assert!(code < 0x80, "single-byte status only");
    ncp_frame(Command::PropValueIs, prop::LAST_STATUS, &[code as u8])
}

pub fn beacon(channel: u8, name: &str) -> BeaconInfo {
    BeaconInfo {
        channel,
        rssi: -40 - channel as i8,
        ext_addr: [0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, channel],
        short_addr: 0xfffe,
        pan_id: 0x1234,
        lqi: 200,
        protocol: 3,
        flags: 0x80,
        network_name: name.to_string(),
        xpan_id: vec![0xde, 0xad, 0x00, 0xbe, 0xef, 0x00, 0xca, 0xfe],
        steering_data: Vec::new(),
    }
}

/// Behaviour of the simulated co-processor.
#[derive(Debug, Default)]
pub struct FakeNcp {
    silent: bool,
    beacons: Vec<BeaconInfo>,
    properties: HashMap<u32, Vec<u8>>,
    mask: Vec<u8>,
}

impl FakeNcp {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert(prop::NCP_VERSION, b"FAKE-NCP/1.0\0".to_vec());
        properties.insert(prop::PHY_CHAN, vec![15]);
        Self {
            properties,
            ..Self::default()
        }
    }

    /// Never answers anything.
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    pub fn with_beacon(mut self, beacon: BeaconInfo) -> Self {
        self.beacons.push(beacon);
        self
    }

    fn reply(&mut self, frame: &SpinelFrame) -> Vec<Vec<u8>> {
        let Some(p) = frame.property else {
            return Vec::new();
        };
        if self.silent {
            return Vec::new();
        }
        match frame.command {
            Command::PropValueGet => match self.properties.get(&p) {
                Some(value) => vec![ncp_frame(Command::PropValueIs, p, value)],
                None => vec![last_status(status::PROP_NOT_FOUND)],
            },
            Command::PropValueSet if p == prop::MAC_SCAN_STATE => self.run_scan(&frame.payload),
            Command::PropValueSet => {
                if p == prop::MAC_SCAN_MASK {
                    self.mask = frame.payload.clone();
                }
                self.properties.insert(p, frame.payload.clone());
                vec![ncp_frame(Command::PropValueIs, p, &frame.payload)]
            }
            Command::PropValueInsert | Command::PropValueRemove => vec![last_status(status::OK)],
            _ => Vec::new(),
        }
    }

    fn run_scan(&self, state: &[u8]) -> Vec<Vec<u8>> {
        let mut out = vec![ncp_frame(Command::PropValueIs, prop::MAC_SCAN_STATE, state)];
        match state.first().copied() {
            Some(scan_state::BEACON) => {
                for b in self.beacons.iter().filter(|b| self.mask.contains(&b.channel)) {
                    out.push(ncp_frame(
                        Command::PropValueInserted,
                        prop::MAC_SCAN_BEACON,
                        &b.encode(),
                    ));
                }
            }
            Some(scan_state::ENERGY) => {
                for &ch in &self.mask {
                    let rssi = -60i8 - ch as i8;
                    out.push(ncp_frame(
                        Command::PropValueInserted,
                        prop::MAC_ENERGY_SCAN_RESULT,
                        &[ch, rssi as u8],
                    ));
                }
            }
            _ => return out,
        }
        out.push(ncp_frame(
            Command::PropValueIs,
            prop::MAC_SCAN_STATE,
            &[scan_state::IDLE],
        ));
        out
    }
}

/// Background task playing the NCP on the far end of a mock link.
pub struct Responder {
    seen: Arc<Mutex<Vec<SpinelFrame>>>,
    task: JoinHandle<()>,
}

impl Responder {
    pub fn spawn(link: MockTransport, mut ncp: FakeNcp) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(2)).await;
                if !link.is_connected() {
                    continue;
                }
                let Ok(frames) = link.take_parsed() else {
                    continue;
                };
                for frame in frames {
                    for reply in ncp.reply(&frame) {
                        link.push_frame(&reply);
                    }
                    log.lock().unwrap().push(frame);
                }
            }
        });
        Self { seen, task }
    }

    /// Frames received from the host so far.
    pub fn seen(&self) -> Vec<SpinelFrame> {
        self.seen.lock().unwrap().clone()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}
