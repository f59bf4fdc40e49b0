// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use engine::api::{self, STATUS_ERR, STATUS_OK};
use engine::{Frame, StartupConfig, WorkerState};
use l2p::{CoreId, Mode, parse_maps};
use port::SoftPorts;
use serial_test::serial;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn unprivileged() {
    api::set_config(StartupConfig {
        channel_name: "api".to_string(),
        poll_interval: Duration::from_millis(1),
        require_root: false,
        ..StartupConfig::default()
    });
}

fn wait_for(what: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !what() {
        assert!(Instant::now() < deadline, "timed out");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
#[serial]
fn argument_list_is_bounded() {
    api::shutdown();
    for n in 0..64 {
        assert_eq!(api::add_argument(&format!("-a{n}")), STATUS_OK);
    }
    assert_eq!(api::add_argument("one-too-many"), STATUS_ERR);
    // shutdown forgets the list
    api::shutdown();
    assert_eq!(api::add_argument(&"x".repeat(127)), STATUS_OK);
    assert_eq!(api::add_argument(&"x".repeat(128)), STATUS_ERR);
    api::shutdown();
}

#[test]
#[serial]
fn calls_before_startup_fail() {
    api::shutdown();
    assert!(!api::is_running());
    assert_eq!(api::send(Frame::exit()), STATUS_ERR);
    let cfg = parse_maps(&["1.0"]).unwrap();
    assert_eq!(api::l2p_config(&cfg[0]), STATUS_ERR);
    assert!(api::l2p_dump(CoreId(1)).is_none());
}

#[test]
#[serial]
fn startup_configure_exit() {
    unprivileged();
    api::set_port_subsystem(Arc::new(SoftPorts::new(4, 64)));
    let log = std::env::temp_dir().join(format!("pktgen-api-{}.log", std::process::id()));
    let _ = std::fs::remove_file(&log);

    assert_eq!(api::add_argument("pktgen"), STATUS_OK);
    assert_eq!(api::startup(Some(log.as_path())), STATUS_OK);
    assert!(api::is_running());
    assert_eq!(api::startup(None), STATUS_ERR);

    let cfg = parse_maps(&["5.2"]).unwrap();
    assert_eq!(api::l2p_config(&cfg[0]), STATUS_OK);
    let dump = api::l2p_dump(CoreId(5)).unwrap();
    assert!(dump.contains("Port ID      : 2"), "{dump}");
    let mode = api::with_engine(|engine| engine.l2p().core(CoreId(5)).map(|entry| entry.mode));
    assert_eq!(mode, Some(Some(Mode::RxTx)));

    assert_eq!(api::send(Frame::launch(false)), STATUS_OK);
    wait_for(|| {
        api::with_engine(|engine| engine.worker_state(CoreId(5))) == Some(WorkerState::Running)
    });
    assert_eq!(api::send(Frame::exit()), STATUS_OK);
    wait_for(|| api::with_engine(|engine| engine.has_exited()) == Some(true));
    let engine = api::with_engine(Clone::clone).unwrap();

    api::shutdown();
    assert!(!api::is_running());
    assert_eq!(engine.worker_state(CoreId(5)), WorkerState::Stopped);

    let text = std::fs::read_to_string(&log).unwrap();
    assert!(text.contains("data plane listening on channel api"), "{text}");
    let _ = std::fs::remove_file(&log);
}

#[test]
#[serial]
fn failed_startup_leaves_nothing_running() {
    api::shutdown();
    api::set_config(StartupConfig {
        channel_size: 0,
        require_root: false,
        ..StartupConfig::default()
    });
    api::set_port_subsystem(Arc::new(SoftPorts::new(1, 8)));
    assert_eq!(api::startup(None), STATUS_ERR);
    assert!(!api::is_running());
}

#[test]
#[serial]
fn burst_send_checks_count() {
    api::shutdown();
    let frames = [Frame::port(0, true), Frame::port(0, true)];
    assert_eq!(api::send_burst(&frames, -1), STATUS_ERR);
    assert_eq!(api::send_burst(&frames, 1), STATUS_ERR);

    unprivileged();
    api::set_port_subsystem(Arc::new(SoftPorts::new(1, 16)));
    assert_eq!(api::startup(None), STATUS_OK);
    assert_eq!(api::send_burst(&frames, -3), STATUS_ERR);
    assert_eq!(api::send_burst(&frames, 0), 0);
    assert_eq!(api::send_burst(&frames, 1), 1);
    assert_eq!(api::send_burst(&frames, 5), 2);
    api::shutdown();
    assert!(!api::is_running());
}
