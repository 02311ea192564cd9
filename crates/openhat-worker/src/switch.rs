//! A digital port driven by a remote switch that reports its state as text.
//!
//! The transport delivers payloads such as `ON`/`OFF` into the port's
//! buffer as [`PortValue::Text`]. On the next tick [`BufferedSwitch`] maps
//! the payload onto a line and commits it. Controller changes are not
//! committed locally; they are sent to the device as a write, and the new
//! state arrives back through the transport.

use std::time::{Duration, Instant};

use openhat_core::{ChangeSource, ConfigView, Error, Result, ValueError};
use openhat_port::digital::validate_line;
use openhat_port::port::BufferedUpdate;
use openhat_port::{PortBehavior, PortHandle, PortValue, Runtime};
use tracing::debug;

use crate::action::ActionRequest;
use crate::queue::ActionQueue;

/// Payload mapping and timing of a switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchSettings {
    pub input_low: String,
    pub input_high: String,
    pub output_low: String,
    pub output_high: String,
    /// Query the device at this interval; zero disables queries.
    pub query_interval: Duration,
    /// Without a payload for this long the port becomes `NotAvailable`;
    /// zero disables the timeout.
    pub timeout: Duration,
}

impl Default for SwitchSettings {
    fn default() -> Self {
        Self {
            input_low: "0".to_string(),
            input_high: "1".to_string(),
            output_low: "0".to_string(),
            output_high: "1".to_string(),
            query_interval: Duration::ZERO,
            timeout: Duration::ZERO,
        }
    }
}

impl SwitchSettings {
    /// Read `InputValueLow`, `InputValueHigh`, `OutputValueLow`,
    /// `OutputValueHigh`, `QueryInterval` and `Timeout` (both in seconds).
    ///
    /// # Errors
    /// Fails on negative intervals.
    pub fn from_config(config: &ConfigView) -> Result<Self> {
        let input_low = config.get_string("InputValueLow", "0", false)?;
        let input_high = config.get_string("InputValueHigh", "1", false)?;
        Ok(Self {
            output_low: config.get_string("OutputValueLow", &input_low, false)?,
            output_high: config.get_string("OutputValueHigh", &input_high, false)?,
            input_low,
            input_high,
            query_interval: seconds(config, "QueryInterval")?,
            timeout: seconds(config, "Timeout")?,
        })
    }

    /// Line for an incoming payload, if it is one of the known values.
    #[must_use]
    pub fn line_for(&self, payload: &str) -> Option<u8> {
        if payload == self.input_low {
            Some(0)
        } else if payload == self.input_high {
            Some(1)
        } else {
            None
        }
    }

    #[must_use]
    pub fn payload_for(&self, line: u8) -> &str {
        if line == 0 {
            &self.output_low
        } else {
            &self.output_high
        }
    }
}

fn seconds(config: &ConfigView, key: &str) -> Result<Duration> {
    let value = config.get_int64(key, 0, false)?;
    let secs = u64::try_from(value).map_err(|_| {
        Error::Config(format!(
            "{}: Please specify a {key} >= 0: {value}",
            config.name()
        ))
    })?;
    Ok(Duration::from_secs(secs))
}

pub struct BufferedSwitch {
    settings: SwitchSettings,
    queue: ActionQueue,
    last_query: Option<Instant>,
    watch_start: Option<Instant>,
}

impl BufferedSwitch {
    pub fn new(settings: SwitchSettings, queue: ActionQueue) -> Self {
        Self {
            settings,
            queue,
            last_query: None,
            watch_start: None,
        }
    }

    pub fn settings(&self) -> &SwitchSettings {
        &self.settings
    }

    fn commit_payload(&self, rt: &Runtime, port: &PortHandle, payload: &str) -> Result<()> {
        if payload.is_empty() {
            port.lock()
                .log_warning(format_args!("Received empty payload"));
            port.set_error(ValueError::NotAvailable);
            return Ok(());
        }
        match self.settings.line_for(payload) {
            Some(line) => {
                port.set_line(rt, line, ChangeSource::Internal)?;
            }
            None => {
                port.lock().log_warning(format_args!(
                    "Unknown payload; expected '{}' or '{}': {}",
                    self.settings.input_low, self.settings.input_high, payload
                ));
                port.set_error(ValueError::NotAvailable);
            }
        }
        Ok(())
    }

    fn check_timeout(&mut self, port: &PortHandle, now: Instant) {
        if self.settings.timeout.is_zero() {
            return;
        }
        let start = *self.watch_start.get_or_insert(now);
        let mut lock = port.lock();
        if lock.has_error() {
            return;
        }
        let last = lock.last_update().map_or(start, |update| update.max(start));
        if now.saturating_duration_since(last) > self.settings.timeout {
            lock.log_warning(format_args!(
                "No update within {} seconds",
                self.settings.timeout.as_secs()
            ));
            lock.set_error(ValueError::NotAvailable);
        }
    }
}

impl PortBehavior for BufferedSwitch {
    fn prepare(&mut self, _rt: &Runtime, port: &PortHandle) -> Result<()> {
        if !self.settings.query_interval.is_zero() {
            self.queue.enqueue(ActionRequest::query(port));
        }
        Ok(())
    }

    fn do_work(&mut self, rt: &Runtime, port: &PortHandle, now: Instant) -> Result<()> {
        if !self.settings.query_interval.is_zero()
            && self
                .last_query
                .is_none_or(|last| now.saturating_duration_since(last) > self.settings.query_interval)
        {
            self.queue.enqueue(ActionRequest::query(port));
            self.last_query = Some(now);
        }

        self.check_timeout(port, now);

        let pending = port.lock().take_pending();
        match pending {
            Some(BufferedUpdate::Value(PortValue::Text(payload))) => {
                self.commit_payload(rt, port, payload.trim())?;
            }
            Some(BufferedUpdate::Value(value)) => {
                port.set_value(rt, value, ChangeSource::Internal)?;
            }
            Some(BufferedUpdate::Error(error)) => {
                port.set_error(error);
            }
            None => {}
        }
        port.do_work(rt, now)
    }

    fn set_state(
        &mut self,
        _rt: &Runtime,
        port: &PortHandle,
        value: PortValue,
        source: ChangeSource,
    ) -> Result<bool> {
        let PortValue::Line(line) = value else {
            return Err(Error::domain(
                port.id(),
                format!("Cannot set {value} on a digital port"),
            ));
        };
        validate_line(port.id(), line)?;
        let current = port.lock().digital_state()?.line;
        let payload = self.settings.payload_for(line).to_string();
        debug!("{}: Requesting {} change to: {}", port.id(), source, payload);
        self.queue.enqueue(ActionRequest::write(port, payload));
        Ok(current != line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openhat_core::DirCaps;
    use openhat_port::Port;
    use rstest::rstest;
    use std::sync::{Arc, Mutex};

    fn settings() -> SwitchSettings {
        SwitchSettings {
            input_low: "OFF".to_string(),
            input_high: "ON".to_string(),
            output_low: "OFF".to_string(),
            output_high: "ON".to_string(),
            ..SwitchSettings::default()
        }
    }

    fn setup(settings: SwitchSettings) -> (Runtime, ActionQueue, PortHandle) {
        let rt = Runtime::new();
        let queue = ActionQueue::new();
        let behavior = Arc::new(Mutex::new(BufferedSwitch::new(settings, queue.clone())));
        let port = rt
            .add_port_with_behavior(Port::digital("Switch", DirCaps::Bidi, 0), behavior)
            .unwrap();
        rt.prepare().unwrap();
        (rt, queue, port)
    }

    #[test]
    fn test_config_defaults_and_validation() {
        let config = ConfigView::from_pairs("Switch", [("InputValueHigh", "ON"), ("Timeout", "30")]);
        let parsed = SwitchSettings::from_config(&config).unwrap();
        assert_eq!(parsed.input_low, "0");
        assert_eq!(parsed.output_high, "ON");
        assert_eq!(parsed.timeout, Duration::from_secs(30));
        assert!(parsed.query_interval.is_zero());

        let config = ConfigView::from_pairs("Switch", [("QueryInterval", "-1")]);
        assert!(SwitchSettings::from_config(&config).is_err());
    }

    #[rstest]
    #[case("ON", Some(1))]
    #[case("OFF", Some(0))]
    #[case("on", None)]
    #[case("", None)]
    fn test_payload_mapping(#[case] payload: &str, #[case] line: Option<u8>) {
        assert_eq!(settings().line_for(payload), line);
    }

    #[rstest]
    #[case("DIMMED")]
    #[case("")]
    fn test_unusable_payload_is_not_available(#[case] payload: &str) {
        let (rt, _, port) = setup(settings());
        port.buffer_value(PortValue::Text(payload.to_string()));
        rt.do_work_all(Instant::now()).unwrap();
        assert_eq!(port.error(), ValueError::NotAvailable);
    }

    #[test]
    fn test_user_change_becomes_write() {
        let (rt, queue, port) = setup(settings());
        assert!(rt
            .set_state("Switch", PortValue::Line(1), ChangeSource::User)
            .unwrap());
        // not committed until the device reports back
        assert_eq!(port.line().unwrap(), 0);
        match queue.dequeue_timeout(Duration::ZERO) {
            Some(ActionRequest::Write { payload, .. }) => assert_eq!(payload, "ON"),
            other => panic!("unexpected action: {other:?}"),
        }
        assert!(rt
            .set_state("Switch", PortValue::Line(2), ChangeSource::User)
            .is_err());
    }

    #[test]
    fn test_query_interval() {
        let (rt, queue, _) = setup(SwitchSettings {
            query_interval: Duration::from_secs(10),
            ..settings()
        });
        // prepare queries once
        assert_eq!(queue.clear(), 1);
        let start = Instant::now();
        rt.do_work_all(start).unwrap();
        rt.do_work_all(start + Duration::from_secs(5)).unwrap();
        assert_eq!(queue.clear(), 1);
        rt.do_work_all(start + Duration::from_secs(11)).unwrap();
        assert_eq!(queue.clear(), 1);
    }

    #[test]
    fn test_timeout_without_updates() {
        let (rt, _, port) = setup(SwitchSettings {
            timeout: Duration::from_secs(30),
            ..settings()
        });
        let start = Instant::now();
        port.buffer_value(PortValue::Text("ON".to_string()));
        rt.do_work_all(start).unwrap();
        assert_eq!(port.line().unwrap(), 1);

        rt.do_work_all(start + Duration::from_secs(20)).unwrap();
        assert_eq!(port.error(), ValueError::Ok);
        rt.do_work_all(start + Duration::from_secs(31)).unwrap();
        assert_eq!(port.error(), ValueError::NotAvailable);
    }
}
