//! Engine guarantees checked against a bare NcpInstance, without a driver.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::*;
use ncpd::ncp::{
    ChannelMask, NcpInstance, PropertyTask, ScanKind, ScanTask, Task, TaskId, TaskKind,
    TaskStatus,
};
use ncpd::spinel::{prop, scan_state, status, Command, SpinelFrame};

type Outcomes = Arc<Mutex<HashMap<TaskId, Vec<TaskStatus>>>>;

fn tracked(kind: impl Into<TaskKind>, outcomes: &Outcomes) -> Task {
    let outcomes = outcomes.clone();
    let slot: Arc<Mutex<Option<TaskId>>> = Arc::new(Mutex::new(None));
    let id_slot = slot.clone();
    let task = Task::with_callback(kind, move |status, _| {
        let id = id_slot.lock().unwrap().expect("id recorded before completion");
        outcomes.lock().unwrap().entry(id).or_default().push(status);
    });
    *slot.lock().unwrap() = Some(task.id());
    task
}

fn sent(instance: &mut NcpInstance) -> Vec<SpinelFrame> {
    instance
        .drain_outbound()
        .iter()
        .map(|f| SpinelFrame::parse(f).unwrap())
        .collect()
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(3600)
}

#[test]
fn every_submission_completes_exactly_once() {
    let outcomes: Outcomes = Arc::default();
    let mut ncp = instance();

    let mask = ChannelMask::from_channels([11, 12]).unwrap();
    let ids: Vec<TaskId> = vec![
        ncp.submit(tracked(PropertyTask::get(prop::NCP_VERSION).unwrap(), &outcomes)).unwrap(),
        ncp.submit(tracked(ScanTask::new(mask, 10, ScanKind::Beacon).unwrap(), &outcomes)).unwrap(),
        ncp.submit(tracked(PropertyTask::set(prop::PHY_CHAN, vec![15]).unwrap(), &outcomes)).unwrap(),
        ncp.submit(tracked(PropertyTask::get(prop::HWADDR).unwrap(), &outcomes)).unwrap(),
        ncp.submit(tracked(PropertyTask::get(prop::PHY_RSSI).unwrap(), &outcomes)).unwrap(),
    ];

    // 1: answered
    ncp.dispatch_inbound(&ncp_frame(Command::PropValueIs, prop::NCP_VERSION, b"v\0")).unwrap();
    // 2: the scan times out
    assert!(ncp.poll_timeout(far_future()).unwrap());
    // 4: cancelled while still pending
    assert!(ncp.cancel(ids[3]).unwrap());
    // 3: NCP error
    ncp.dispatch_inbound(&last_status(status::INVALID_ARGUMENT)).unwrap();
    // 5: link lost
    ncp.transport_reset().unwrap();
    // stray answers and resets after everything resolved change nothing
    ncp.dispatch_inbound(&ncp_frame(Command::PropValueIs, prop::PHY_RSSI, &[0xc0])).unwrap();
    ncp.transport_reset().unwrap();
    assert!(!ncp.poll_timeout(far_future()).unwrap());

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), ids.len());
    for id in &ids {
        assert_eq!(outcomes[id].len(), 1, "task {} completed {:?}", id, outcomes[id]);
    }
    assert_eq!(outcomes[&ids[0]], vec![TaskStatus::Success]);
    assert_eq!(outcomes[&ids[1]], vec![TaskStatus::Timeout]);
    assert_eq!(outcomes[&ids[2]], vec![TaskStatus::ProtocolError(status::INVALID_ARGUMENT)]);
    assert_eq!(outcomes[&ids[3]], vec![TaskStatus::Cancelled]);
    assert_eq!(outcomes[&ids[4]], vec![TaskStatus::Cancelled]);
    assert!(ncp.is_idle());
    assert!(ncp.deadline().is_none());
}

#[test]
fn only_the_active_task_reaches_the_wire() {
    let outcomes: Outcomes = Arc::default();
    let mut ncp = instance();
    for p in [prop::NCP_VERSION, prop::PHY_CHAN, prop::HWADDR] {
        ncp.submit(tracked(PropertyTask::get(p).unwrap(), &outcomes)).unwrap();
    }
    assert_eq!(ncp.pending_len(), 2);

    for (p, next) in [
        (prop::NCP_VERSION, Some(prop::PHY_CHAN)),
        (prop::PHY_CHAN, Some(prop::HWADDR)),
        (prop::HWADDR, None),
    ] {
        let frames = sent(&mut ncp);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, Command::PropValueGet);
        assert_eq!(frames[0].property, Some(p));
        ncp.dispatch_inbound(&ncp_frame(Command::PropValueIs, p, &[1])).unwrap();
        match next {
            Some(_) => assert!(ncp.active_id().is_some()),
            None => assert!(ncp.is_idle()),
        }
    }
    assert!(sent(&mut ncp).is_empty());
    assert!(outcomes
        .lock()
        .unwrap()
        .values()
        .all(|v| v == &vec![TaskStatus::Success]));
}

#[test]
fn scan_state_echo_does_not_end_a_scan() {
    let outcomes: Outcomes = Arc::default();
    let mut ncp = instance();
    let mask = ChannelMask::from_channels([11]).unwrap();
    let id = ncp
        .submit(tracked(ScanTask::new(mask, 10, ScanKind::Energy).unwrap(), &outcomes))
        .unwrap();
    assert_eq!(sent(&mut ncp).len(), 3);

    ncp.dispatch_inbound(&ncp_frame(Command::PropValueIs, prop::MAC_SCAN_STATE, &[scan_state::ENERGY]))
        .unwrap();
    ncp.dispatch_inbound(&last_status(status::OK)).unwrap();
    assert_eq!(ncp.active_id(), Some(id));

    ncp.dispatch_inbound(&ncp_frame(Command::PropValueIs, prop::MAC_SCAN_STATE, &[scan_state::IDLE]))
        .unwrap();
    assert!(ncp.is_idle());
    assert_eq!(outcomes.lock().unwrap()[&id], vec![TaskStatus::Success]);
}

#[test]
fn deadline_is_only_enforced_once_it_passes() {
    let outcomes: Outcomes = Arc::default();
    let mut ncp = instance_with_timeout(Duration::from_millis(500));
    let id = ncp
        .submit(tracked(PropertyTask::get(prop::PHY_CHAN).unwrap(), &outcomes))
        .unwrap();
    let deadline = ncp.deadline().expect("active task has a deadline");

    assert!(!ncp.poll_timeout(Instant::now()).unwrap());
    assert_eq!(ncp.active_id(), Some(id));
    assert!(ncp.poll_timeout(deadline).unwrap());
    assert_eq!(outcomes.lock().unwrap()[&id], vec![TaskStatus::Timeout]);
    assert!(ncp.deadline().is_none());
}
