//! Integration tests for the port change protocol.
//!
//! Covers the path a value takes through the runtime:
//! 1. set → validate → commit → persist → cascade
//! 2. worker buffer → tick → commit → refresh notification
//! 3. shutdown → persistence flush → restore on the next start

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use openhat_core::{ChangeSource, ConfigView, DirCaps, Error, ValueError};
use openhat_port::{
    PersistenceStore, Port, PortBehavior, PortConfigurator, PortHandle, PortState, PortValue,
    TomlFileStore, RefreshSink, Runtime,
};

// ============================================================================
// Helpers
// ============================================================================

#[derive(Default)]
struct CollectingSink {
    batches: Mutex<Vec<Vec<String>>>,
}

impl CollectingSink {
    fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

impl RefreshSink for CollectingSink {
    fn refresh(&self, port_ids: &[String]) {
        self.batches.lock().unwrap().push(port_ids.to_vec());
    }

    fn refresh_all(&self) {}
}

fn runtime_with_sink() -> (Runtime, Arc<CollectingSink>) {
    let rt = Runtime::new();
    let sink = Arc::new(CollectingSink::default());
    rt.set_refresh_sink(sink.clone());
    (rt, sink)
}

fn digital(id: &str, internal: &str, user: &str) -> Port {
    let mut port = Port::digital(id, DirCaps::Bidi, 0);
    port.set_on_change(internal, user);
    port
}

// ============================================================================
// Idempotence
// ============================================================================

#[test]
fn test_repeated_set_has_no_side_effects() {
    let (rt, sink) = runtime_with_sink();
    let source = rt.add_port(digital("Source", "Target", "")).unwrap();
    let target = rt.add_port(digital("Target", "", "")).unwrap();
    rt.prepare().unwrap();
    let start = Instant::now();

    assert!(source.set_line(&rt, 1, ChangeSource::Internal).unwrap());
    rt.do_work_all(start).unwrap();
    assert_eq!(rt.dispatch_refreshes(), 2);

    // cascade target goes back to Low; repeating the source value must not
    // drive it High again
    target.set_line(&rt, 0, ChangeSource::Internal).unwrap();
    assert!(!source.set_line(&rt, 1, ChangeSource::Internal).unwrap());
    assert_eq!(target.line().unwrap(), 0);

    rt.do_work_all(start + Duration::from_secs(5)).unwrap();
    rt.dispatch_refreshes();
    assert_eq!(
        sink.batches(),
        vec![
            vec!["Source".to_string(), "Target".to_string()],
            vec!["Target".to_string()]
        ]
    );
}

// ============================================================================
// Error gating
// ============================================================================

#[test]
fn test_error_blocks_reads_until_next_value() {
    let rt = Runtime::new();
    let dial = rt.add_port(Port::dial("Dial", 0, 100, 5).unwrap()).unwrap();
    dial.set_dial_position(&rt, 25, ChangeSource::User).unwrap();

    assert!(dial.set_error(ValueError::Expired));
    assert!(matches!(rt.get_state("Dial"), Err(Error::ValueExpired(_))));
    assert!(dial.numeric_value().is_err());

    // the same position clears the error and counts as a change
    assert!(dial.set_dial_position(&rt, 25, ChangeSource::User).unwrap());
    assert_eq!(
        rt.get_state("Dial").unwrap(),
        PortState::Dial {
            position: 25,
            min: 0,
            max: 100,
            step: 5
        }
    );
}

#[test]
fn test_rejected_value_keeps_previous_state() {
    let rt = Runtime::new();
    rt.add_port(Port::dial("Dial", 0, 100, 1).unwrap()).unwrap();
    rt.set_state("Dial", PortValue::Position(40), ChangeSource::User)
        .unwrap();
    let err = rt
        .set_state("Dial", PortValue::Position(101), ChangeSource::User)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Dial: Position must not be greater than the maximum: 100"
    );
    assert!(matches!(
        rt.get_state("Dial").unwrap(),
        PortState::Dial { position: 40, .. }
    ));
}

// ============================================================================
// Cascades
// ============================================================================

#[test]
fn test_self_reference_terminates() {
    let rt = Runtime::new();
    let port = rt.add_port(digital("Loop", "Loop", "Loop")).unwrap();
    rt.prepare().unwrap();
    assert!(port.set_line(&rt, 1, ChangeSource::User).unwrap());
    assert_eq!(port.line().unwrap(), 1);
}

#[test]
fn test_cyclic_lists_terminate() {
    let rt = Runtime::new();
    let a = rt.add_port(digital("A", "B", "")).unwrap();
    let b = rt.add_port(digital("B", "C", "")).unwrap();
    let c = rt.add_port(digital("C", "A", "")).unwrap();
    rt.prepare().unwrap();

    a.set_line(&rt, 1, ChangeSource::Internal).unwrap();
    for port in [&a, &b, &c] {
        assert_eq!(port.line().unwrap(), 1);
    }
}

#[test]
fn test_unknown_cascade_target_fails_prepare() {
    let rt = Runtime::new();
    rt.add_port(digital("A", "Missing", "")).unwrap();
    assert!(matches!(rt.prepare(), Err(Error::PortNotFound(_))));
}

// ============================================================================
// Worker buffer
// ============================================================================

#[test]
fn test_buffered_values_commit_on_tick() {
    let (rt, sink) = runtime_with_sink();
    let sensor = rt
        .add_port(Port::analog("Temperature", DirCaps::Input))
        .unwrap();
    rt.prepare().unwrap();
    let start = Instant::now();

    let worker = {
        let sensor = sensor.clone();
        std::thread::spawn(move || sensor.buffer_value(PortValue::Analog(2048)))
    };
    worker.join().unwrap();
    assert_eq!(sensor.numeric_value().unwrap(), 0.0);

    rt.do_work_all(start).unwrap();
    rt.dispatch_refreshes();
    assert!((sensor.numeric_value().unwrap() - 2048.0 / 4095.0).abs() < 1e-9);

    sensor.buffer_error(ValueError::NotAvailable);
    rt.do_work_all(start + Duration::from_millis(50)).unwrap();
    assert_eq!(sensor.error(), ValueError::NotAvailable);
    // refresh throttled to once per second
    assert_eq!(rt.dispatch_refreshes(), 0);
    rt.do_work_all(start + Duration::from_millis(1100)).unwrap();
    assert_eq!(rt.dispatch_refreshes(), 1);
    assert_eq!(sink.batches().len(), 2);
}

// ============================================================================
// Behaviors
// ============================================================================

/// Refuses every user change while `locked` is set.
struct Interlock {
    locked: bool,
    ticks: usize,
}

impl PortBehavior for Interlock {
    fn do_work(&mut self, rt: &Runtime, port: &PortHandle, now: Instant) -> openhat_core::Result<()> {
        self.ticks += 1;
        port.do_work(rt, now)
    }

    fn set_state(
        &mut self,
        rt: &Runtime,
        port: &PortHandle,
        value: PortValue,
        source: ChangeSource,
    ) -> openhat_core::Result<bool> {
        if self.locked && source == ChangeSource::User {
            return Err(Error::port_failure(port.id(), "Interlock engaged"));
        }
        port.set_value(rt, value, source)
    }
}

#[test]
fn test_behavior_routes_controller_calls() {
    let rt = Runtime::new();
    let behavior = Arc::new(Mutex::new(Interlock {
        locked: true,
        ticks: 0,
    }));
    rt.add_port_with_behavior(Port::digital("Gate", DirCaps::Output, 0), behavior.clone())
        .unwrap();
    rt.prepare().unwrap();

    assert!(rt
        .set_state("Gate", PortValue::Line(1), ChangeSource::User)
        .is_err());
    assert!(rt
        .set_state("Gate", PortValue::Line(1), ChangeSource::Internal)
        .unwrap());

    rt.do_work_all(Instant::now()).unwrap();
    assert_eq!(behavior.lock().unwrap().ticks, 1);
}

#[test]
fn test_cascade_targets_go_through_behavior() {
    let rt = Runtime::new();
    rt.add_port(digital("Panel", "Lamp", "Gate")).unwrap();
    let behavior = Arc::new(Mutex::new(Interlock {
        locked: true,
        ticks: 0,
    }));
    let gate = rt
        .add_port_with_behavior(Port::digital("Gate", DirCaps::Output, 0), behavior.clone())
        .unwrap();
    let lamp = rt.add_port(digital("Lamp", "", "")).unwrap();
    rt.prepare().unwrap();

    // a user change cascades as a user change, which the interlock refuses
    let err = rt
        .set_state("Panel", PortValue::Line(1), ChangeSource::User)
        .unwrap_err();
    assert!(err.to_string().contains("Interlock engaged"));
    assert_eq!(gate.line().unwrap(), 0);

    behavior.lock().unwrap().locked = false;
    rt.set_state("Panel", PortValue::Line(0), ChangeSource::User)
        .unwrap();
    assert_eq!(gate.line().unwrap(), 1);
    assert_eq!(lamp.line().unwrap(), 0);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.toml");
    let config = ConfigView::from_pairs(
        "Mode",
        [
            ("Labels.Off", "0"),
            ("Labels.Eco", "1"),
            ("Labels.Comfort", "2"),
            ("Persistent", "true"),
        ],
    );

    {
        let rt = Runtime::new();
        rt.set_store(Box::new(TomlFileStore::open(&path).unwrap()));
        let port = PortConfigurator::new(&rt, false)
            .select_port("Mode", &config)
            .unwrap();
        let mode = rt.add_port(port).unwrap();
        mode.set_select_position(&rt, 2, ChangeSource::User).unwrap();
        rt.shutdown_flush();
    }

    let store = TomlFileStore::open(&path).unwrap();
    assert_eq!(store.get("Mode.Position").as_deref(), Some("2"));

    let rt = Runtime::new();
    rt.set_store(Box::new(store));
    let port = PortConfigurator::new(&rt, false)
        .select_port("Mode", &config)
        .unwrap();
    assert_eq!(
        port.state().unwrap(),
        PortState::Select {
            position: 2,
            label: "Comfort".to_string()
        }
    );
}

#[test]
fn test_missing_store_does_not_fail_sets() {
    let rt = Runtime::new();
    let mut port = Port::digital("Relay", DirCaps::Output, 0);
    port.set_persistent(true);
    let relay = rt.add_port(port).unwrap();
    assert!(relay.set_line(&rt, 1, ChangeSource::User).unwrap());
    rt.shutdown_flush();
    assert!(rt.is_shutdown_requested());
}
