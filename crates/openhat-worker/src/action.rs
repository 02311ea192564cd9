//! Action requests consumed by a plugin's worker thread.

use std::fmt;

use openhat_port::{PortHandle, WeakPortHandle};

/// Work item for a plugin worker.
///
/// Port actions hold a non-owning reference to their target; an action whose
/// port is gone is dropped by the worker. Connection level actions carry no
/// target.
#[derive(Debug, Clone)]
pub enum ActionRequest {
    /// Read the current device value of a port.
    Read { port: WeakPortHandle },
    /// Send a payload to the device behind a port.
    Write {
        port: WeakPortHandle,
        payload: String,
    },
    /// Ask the device to report its value, usually asynchronously.
    Query { port: WeakPortHandle },
    /// Register with the transport after a connect.
    Subscribe,
    /// Drop the connection so the worker connects again.
    Reconnect,
}

impl ActionRequest {
    pub fn read(port: &PortHandle) -> Self {
        Self::Read {
            port: port.downgrade(),
        }
    }

    pub fn write(port: &PortHandle, payload: impl Into<String>) -> Self {
        Self::Write {
            port: port.downgrade(),
            payload: payload.into(),
        }
    }

    pub fn query(port: &PortHandle) -> Self {
        Self::Query {
            port: port.downgrade(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Read { .. } => "READ",
            Self::Write { .. } => "WRITE",
            Self::Query { .. } => "QUERY",
            Self::Subscribe => "SUBSCRIBE",
            Self::Reconnect => "RECONNECT",
        }
    }

    /// Target port, for port actions.
    pub fn port(&self) -> Option<&WeakPortHandle> {
        match self {
            Self::Read { port } | Self::Write { port, .. } | Self::Query { port } => Some(port),
            Self::Subscribe | Self::Reconnect => None,
        }
    }
}

impl fmt::Display for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.port() {
            Some(port) => write!(f, "{} for port: {}", self.name(), port.id()),
            None => write!(f, "{}", self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openhat_core::DirCaps;
    use openhat_port::Port;

    #[test]
    fn test_display_names_target() {
        let port = PortHandle::new(Port::digital("Switch", DirCaps::Bidi, 0));
        assert_eq!(
            ActionRequest::write(&port, "ON").to_string(),
            "WRITE for port: Switch"
        );
        assert_eq!(ActionRequest::Subscribe.to_string(), "SUBSCRIBE");
        assert!(ActionRequest::Reconnect.port().is_none());
    }

    #[test]
    fn test_request_does_not_keep_port_alive() {
        let port = PortHandle::new(Port::digital("Switch", DirCaps::Bidi, 0));
        let request = ActionRequest::read(&port);
        drop(port);
        assert!(request.port().and_then(WeakPortHandle::upgrade).is_none());
    }
}
