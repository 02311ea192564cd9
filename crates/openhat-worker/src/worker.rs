//! The worker thread of an I/O bound plugin.
//!
//! # Architecture
//!
//! ```text
//!   scheduler thread ──┐                       ┌─► ActionHandler (blocking I/O)
//!   (port queries)     ├─► ActionQueue ─► Worker
//!   transport events ──┘                       └─► PortHandle::buffer_value
//!                                                     │
//!   scheduler tick ◄── PortHandle::do_work commits ◄──┘
//! ```
//!
//! The worker never commits values itself. It leaves results in the port's
//! buffer, and the scheduler thread commits them through the normal set path
//! on its next tick.
//!
//! # Failure handling
//!
//! A failing handler call is logged and the target port degrades to
//! `NotAvailable`; the loop keeps running. A failed write also queues a read
//! so the port resynchronizes with the device. `Error::ConnectionLost`
//! additionally queues a reconnect.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use openhat_core::constants::ACTION_QUEUE_POLL_MS;
use openhat_core::{Error, Result, ValueError};
use openhat_port::{PortHandle, PortValue, Runtime, WeakPortHandle};
use tracing::{debug, error, info, trace, warn};

use crate::action::ActionRequest;
use crate::queue::ActionQueue;

/// Device or transport specific side of a plugin.
///
/// Every method may block. The defaults describe a handler without a
/// connection.
pub trait ActionHandler: Send {
    fn is_connected(&self) -> bool {
        true
    }

    /// Establish the connection. Called by the worker while not connected.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn disconnect(&mut self) {}

    /// Register with the transport after a connect. Follow-up actions, such
    /// as initial queries, go into `queue`.
    fn subscribe(&mut self, _queue: &ActionQueue) -> Result<()> {
        Ok(())
    }

    /// Read a value. `None` means the value arrives later through a
    /// transport callback.
    fn read(&mut self, port: &PortHandle) -> Result<Option<PortValue>>;

    fn write(&mut self, port: &PortHandle, payload: &str) -> Result<()>;

    fn query(&mut self, port: &PortHandle) -> Result<Option<PortValue>> {
        self.read(port)
    }
}

pub struct Worker<H> {
    name: String,
    handler: H,
    queue: ActionQueue,
    rt: Arc<Runtime>,
    poll: Duration,
}

impl<H: ActionHandler + 'static> Worker<H> {
    pub fn new(name: impl Into<String>, handler: H, queue: ActionQueue, rt: Arc<Runtime>) -> Self {
        Self {
            name: name.into(),
            handler,
            queue,
            rt,
            poll: Duration::from_millis(ACTION_QUEUE_POLL_MS),
        }
    }

    /// Override the bounded dequeue wait.
    #[must_use]
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Run the worker on a dedicated, named thread.
    ///
    /// # Errors
    /// Fails if the thread cannot be created.
    pub fn spawn(self) -> io::Result<JoinHandle<H>> {
        thread::Builder::new()
            .name(format!("worker-{}", self.name))
            .spawn(move || self.run())
    }

    /// Process actions until shutdown is requested. Returns the handler.
    pub fn run(mut self) -> H {
        info!("{}: Worker thread started", self.name);
        while !self.rt.is_shutdown_requested() {
            if !self.handler.is_connected() {
                match self.handler.connect() {
                    Ok(()) => {
                        info!("{}: Connection established", self.name);
                        self.queue.connected();
                    }
                    Err(err) => {
                        error!("{}: Could not connect, retrying: {}", self.name, err);
                        thread::sleep(self.poll);
                        continue;
                    }
                }
            }
            trace!("{}: Waiting for actions...", self.name);
            let Some(action) = self.queue.dequeue_timeout(self.poll) else {
                continue;
            };
            if self.rt.is_shutdown_requested() {
                break;
            }
            self.process(action);
        }
        if self.handler.is_connected() {
            self.handler.disconnect();
        }
        info!("{}: Worker thread terminated", self.name);
        self.handler
    }

    /// Handle a single action. Failures are contained here.
    pub fn process(&mut self, action: ActionRequest) {
        debug!("{}: Processing requested action: {}", self.name, action);
        match action {
            ActionRequest::Subscribe => {
                if let Err(err) = self.handler.subscribe(&self.queue) {
                    self.connection_failure("subscribe", &err);
                }
            }
            ActionRequest::Reconnect => {
                self.handler.disconnect();
            }
            ActionRequest::Read { port } => {
                let Some(port) = self.target(&port) else { return };
                let result = self.handler.read(&port);
                self.deliver(&port, "read", result);
            }
            ActionRequest::Query { port } => {
                let Some(port) = self.target(&port) else { return };
                let result = self.handler.query(&port);
                self.deliver(&port, "query", result);
            }
            ActionRequest::Write { port, payload } => {
                let Some(port) = self.target(&port) else { return };
                if let Err(err) = self.handler.write(&port, &payload) {
                    self.port_failure(&port, "write", &err);
                    self.queue.enqueue(ActionRequest::read(&port));
                }
            }
        }
    }

    fn target(&self, port: &WeakPortHandle) -> Option<PortHandle> {
        let target = port.upgrade();
        if target.is_none() {
            debug!("{}: Port {} is gone; action dropped", self.name, port.id());
        }
        target
    }

    fn deliver(&mut self, port: &PortHandle, operation: &str, result: Result<Option<PortValue>>) {
        match result {
            Ok(Some(value)) => {
                trace!("{}: {}: Buffered value: {}", self.name, port.id(), value);
                port.buffer_value(value);
            }
            Ok(None) => {}
            Err(err) => self.port_failure(port, operation, &err),
        }
    }

    fn port_failure(&mut self, port: &PortHandle, operation: &str, err: &Error) {
        warn!(
            "{}: Error during {} of port {}: {}",
            self.name,
            operation,
            port.id(),
            err
        );
        port.buffer_error(ValueError::NotAvailable);
        if matches!(err, Error::ConnectionLost(_)) {
            self.queue.connection_lost();
        }
    }

    fn connection_failure(&mut self, operation: &str, err: &Error) {
        warn!("{}: Error during {}: {}", self.name, operation, err);
        if matches!(err, Error::ConnectionLost(_)) {
            self.queue.connection_lost();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openhat_core::DirCaps;
    use openhat_port::Port;
    use std::time::Instant;

    /// Connects on the second attempt and records every call.
    #[derive(Default)]
    struct ScriptedHandler {
        connected: bool,
        connect_attempts: usize,
        calls: Vec<String>,
        fail_writes: bool,
        lose_connection_on_read: bool,
    }

    impl ActionHandler for ScriptedHandler {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn connect(&mut self) -> Result<()> {
            self.connect_attempts += 1;
            if self.connect_attempts < 2 {
                return Err(Error::ConnectionLost("refused".to_string()));
            }
            self.connected = true;
            Ok(())
        }

        fn disconnect(&mut self) {
            self.calls.push("disconnect".to_string());
            self.connected = false;
        }

        fn subscribe(&mut self, _queue: &ActionQueue) -> Result<()> {
            self.calls.push("subscribe".to_string());
            Ok(())
        }

        fn read(&mut self, port: &PortHandle) -> Result<Option<PortValue>> {
            self.calls.push(format!("read {}", port.id()));
            if self.lose_connection_on_read {
                return Err(Error::ConnectionLost("broken pipe".to_string()));
            }
            Ok(Some(PortValue::Line(1)))
        }

        fn write(&mut self, port: &PortHandle, payload: &str) -> Result<()> {
            self.calls.push(format!("write {} {}", port.id(), payload));
            if self.fail_writes {
                return Err(Error::action_failed("WRITE", "device rejected payload"));
            }
            Ok(())
        }
    }

    fn setup(handler: ScriptedHandler) -> (Arc<Runtime>, ActionQueue, PortHandle, Worker<ScriptedHandler>) {
        let rt = Arc::new(Runtime::new());
        let port = rt
            .add_port(Port::digital("Switch", DirCaps::Bidi, 0))
            .unwrap();
        let queue = ActionQueue::new();
        let worker = Worker::new("Plugin", handler, queue.clone(), Arc::clone(&rt));
        (rt, queue, port, worker)
    }

    #[test]
    fn test_read_result_is_buffered_not_committed() {
        let (rt, _, port, mut worker) = setup(ScriptedHandler::default());
        worker.process(ActionRequest::read(&port));
        assert_eq!(port.line().unwrap(), 0);
        rt.do_work_all(Instant::now()).unwrap();
        assert_eq!(port.line().unwrap(), 1);
    }

    #[test]
    fn test_failed_write_degrades_and_resyncs() {
        let (rt, queue, port, mut worker) = setup(ScriptedHandler {
            fail_writes: true,
            ..Default::default()
        });
        worker.process(ActionRequest::write(&port, "ON"));
        assert!(matches!(
            queue.dequeue_timeout(Duration::ZERO),
            Some(ActionRequest::Read { .. })
        ));
        rt.do_work_all(Instant::now()).unwrap();
        assert_eq!(port.error(), ValueError::NotAvailable);
    }

    #[test]
    fn test_connection_loss_queues_reconnect() {
        let (_, queue, port, mut worker) = setup(ScriptedHandler {
            lose_connection_on_read: true,
            ..Default::default()
        });
        worker.process(ActionRequest::read(&port));
        assert!(matches!(
            queue.dequeue_timeout(Duration::ZERO),
            Some(ActionRequest::Reconnect)
        ));
    }

    #[test]
    fn test_actions_for_dropped_ports_are_skipped() {
        let (_, _, _, mut worker) = setup(ScriptedHandler::default());
        let orphan = PortHandle::new(Port::digital("Orphan", DirCaps::Bidi, 0));
        let action = ActionRequest::read(&orphan);
        drop(orphan);
        worker.process(action);
        assert!(worker.handler().calls.is_empty());
    }

    #[test]
    fn test_run_connects_subscribes_and_stops() {
        let (rt, queue, port, worker) = setup(ScriptedHandler::default());
        let handle = worker
            .with_poll_interval(Duration::from_millis(5))
            .spawn()
            .unwrap();

        // a read queued before the connect is dropped by it, so keep asking
        let deadline = Instant::now() + Duration::from_secs(5);
        while port.lock().last_update().is_none() && Instant::now() < deadline {
            queue.enqueue(ActionRequest::read(&port));
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(port.lock().last_update().is_some());
        rt.request_shutdown();
        let handler = handle.join().unwrap();
        assert_eq!(handler.connect_attempts, 2);
        assert_eq!(handler.calls[0], "subscribe");
        assert!(handler.calls.contains(&"read Switch".to_string()));
        assert_eq!(handler.calls.last().map(String::as_str), Some("disconnect"));
    }
}
