//! Integration tests for the worker thread and the buffered switch.
//!
//! Runs a real worker thread against a scripted handler:
//! 1. worker isolation: one failing port does not disturb the others
//! 2. end to end: payload → worker buffer → tick → committed line → refresh
//! 3. internal changes: cascade → write to the device, not a local commit

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use openhat_core::{ChangeSource, DirCaps, Error, Result, ValueError};
use openhat_port::{Port, PortHandle, PortState, PortValue, Runtime};
use openhat_worker::{
    ActionHandler, ActionQueue, ActionRequest, BufferedSwitch, SwitchSettings, Worker,
};

const POLL: Duration = Duration::from_millis(5);

/// Answers reads from a fixed table; ports missing from it fail.
struct TableHandler {
    values: HashMap<String, PortValue>,
    writes: Arc<Mutex<Vec<String>>>,
}

impl ActionHandler for TableHandler {
    fn read(&mut self, port: &PortHandle) -> Result<Option<PortValue>> {
        self.values
            .get(port.id())
            .cloned()
            .map(Some)
            .ok_or_else(|| Error::action_failed("READ", format!("no device for {}", port.id())))
    }

    fn write(&mut self, port: &PortHandle, payload: &str) -> Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push(format!("{}={}", port.id(), payload));
        Ok(())
    }
}

fn on_off() -> SwitchSettings {
    SwitchSettings {
        input_low: "OFF".to_string(),
        input_high: "ON".to_string(),
        output_low: "OFF".to_string(),
        output_high: "ON".to_string(),
        ..SwitchSettings::default()
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(POLL);
    }
}

#[test]
fn test_failing_port_does_not_stop_worker() {
    let rt = Arc::new(Runtime::new());
    let broken = rt.add_port(Port::digital("Broken", DirCaps::Input, 0)).unwrap();
    let healthy = rt.add_port(Port::digital("Healthy", DirCaps::Input, 0)).unwrap();
    rt.prepare().unwrap();

    let handler = TableHandler {
        values: HashMap::from([("Healthy".to_string(), PortValue::Line(1))]),
        writes: Arc::default(),
    };
    let writes = Arc::clone(&handler.writes);
    let queue = ActionQueue::new();
    let worker = Worker::new("Table", handler, queue.clone(), Arc::clone(&rt))
        .with_poll_interval(POLL)
        .spawn()
        .unwrap();

    queue.enqueue(ActionRequest::read(&broken));
    queue.enqueue(ActionRequest::read(&healthy));
    wait_for(|| queue.is_empty() && healthy.lock().last_update().is_some());

    rt.do_work_all(Instant::now()).unwrap();
    assert_eq!(broken.error(), ValueError::NotAvailable);
    assert_eq!(healthy.line().unwrap(), 1);

    // still serving after the failure
    queue.enqueue(ActionRequest::write(&healthy, "0"));
    wait_for(|| !writes.lock().unwrap().is_empty());
    assert_eq!(*writes.lock().unwrap(), vec!["Healthy=0".to_string()]);
    rt.request_shutdown();
    worker.join().unwrap();
}

#[test]
fn test_switch_payload_end_to_end() {
    let rt = Arc::new(Runtime::new());
    let queue = ActionQueue::new();
    let switch = rt
        .add_port_with_behavior(
            Port::digital("Switch", DirCaps::Bidi, 0),
            Arc::new(Mutex::new(BufferedSwitch::new(on_off(), queue.clone()))),
        )
        .unwrap();
    rt.prepare().unwrap();
    switch.set_error(ValueError::NotAvailable);
    rt.dispatch_refreshes();

    let handler = TableHandler {
        values: HashMap::from([("Switch".to_string(), PortValue::Text("ON".to_string()))]),
        writes: Arc::default(),
    };
    let writes = Arc::clone(&handler.writes);
    let worker = Worker::new("Switch", handler, queue.clone(), Arc::clone(&rt))
        .with_poll_interval(POLL)
        .spawn()
        .unwrap();

    queue.enqueue(ActionRequest::query(&switch));
    wait_for(|| switch.lock().last_update().is_some());

    let start = Instant::now() + Duration::from_secs(2);
    rt.do_work_all(start).unwrap();
    assert_eq!(
        rt.get_state("Switch").unwrap(),
        PortState::Digital {
            mode: openhat_core::DigitalMode::InputFloating,
            line: 1
        }
    );
    assert_eq!(rt.pending_refreshes(), vec!["Switch".to_string()]);

    // no further change: still exactly one pending refresh
    rt.do_work_all(start + Duration::from_secs(2)).unwrap();
    assert_eq!(rt.pending_refreshes(), vec!["Switch".to_string()]);
    assert_eq!(rt.dispatch_refreshes(), 1);
    assert!(rt.pending_refreshes().is_empty());

    // a user change goes to the device instead of the port
    rt.set_state("Switch", PortValue::Line(0), ChangeSource::User)
        .unwrap();
    wait_for(|| !writes.lock().unwrap().is_empty());
    assert_eq!(writes.lock().unwrap()[0], "Switch=OFF");
    assert_eq!(switch.line().unwrap(), 1);

    rt.request_shutdown();
    worker.join().unwrap();
}

#[test]
fn test_cascade_into_switch_writes_to_device() {
    let rt = Arc::new(Runtime::new());
    let queue = ActionQueue::new();
    let mut source = Port::digital("Source", DirCaps::Bidi, 0);
    source.set_on_change("Switch", "");
    let source = rt.add_port(source).unwrap();
    let switch = rt
        .add_port_with_behavior(
            Port::digital("Switch", DirCaps::Bidi, 0),
            Arc::new(Mutex::new(BufferedSwitch::new(on_off(), queue.clone()))),
        )
        .unwrap();
    rt.prepare().unwrap();

    source.set_line(&rt, 1, ChangeSource::Internal).unwrap();
    assert_eq!(switch.line().unwrap(), 0);
    match queue.dequeue_timeout(Duration::ZERO) {
        Some(ActionRequest::Write { port, payload }) => {
            assert_eq!(port.id(), "Switch");
            assert_eq!(payload, "ON");
        }
        other => panic!("expected a write, got {other:?}"),
    }
    assert!(queue.is_empty());

    // the device confirms the change
    switch.buffer_value(PortValue::Text("ON".to_string()));
    rt.do_work_all(Instant::now()).unwrap();
    assert_eq!(switch.line().unwrap(), 1);
}
