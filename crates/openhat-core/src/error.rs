use thiserror::Error;

use crate::types::ValueError;

#[derive(Error, Debug)]
pub enum Error {
    // Port errors
    #[error("{port}: {message}")]
    Domain { port: String, message: String },

    #[error("{0}: The port value has expired")]
    ValueExpired(String),

    #[error("{0}: The port value is not available")]
    ValueUnavailable(String),

    #[error("{port}: {message}")]
    PortFailure { port: String, message: String },

    #[error("{port}: Operation requires a {expected} port")]
    WrongKind { port: String, expected: String },

    #[error("{0}: The port is readonly")]
    ReadOnly(String),

    // Registry errors
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("{origin}: Parameter {parameter}: The port {port} is not a {expected} port")]
    WrongPortReference {
        origin: String,
        parameter: String,
        port: String,
        expected: String,
    },

    #[error("Duplicate ID: {0}")]
    DuplicateId(String),

    #[error("Resource requested by {requester} is already in use by {owner}: {resource}")]
    ResourceInUse {
        resource: String,
        requester: String,
        owner: String,
    },

    // Worker errors
    #[error("Action {action} failed: {message}")]
    ActionFailed { action: String, message: String },

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    // Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),

    #[error("Invalid value for setting {key}: {value}")]
    InvalidSetting { key: String, value: String },
}

impl Error {
    /// Create a domain violation error for the given port.
    pub fn domain(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Domain {
            port: port.into(),
            message: message.into(),
        }
    }

    /// Create an error signalling that an operation hit the wrong port kind.
    pub fn wrong_kind(port: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::WrongKind {
            port: port.into(),
            expected: expected.into(),
        }
    }

    /// Create a failure error for ports whose state is unusable.
    pub fn port_failure(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PortFailure {
            port: port.into(),
            message: message.into(),
        }
    }

    /// Create an action failure error.
    pub fn action_failed(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ActionFailed {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Create an invalid setting error.
    pub fn invalid_setting(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Map a non-Ok value error of a port onto the matching error variant.
    ///
    /// Returns `None` for [`ValueError::Ok`].
    pub fn from_value_error(port: &str, error: ValueError) -> Option<Self> {
        match error {
            ValueError::Ok => None,
            ValueError::Expired => Some(Self::ValueExpired(port.to_string())),
            ValueError::NotAvailable => Some(Self::ValueUnavailable(port.to_string())),
        }
    }

    /// Returns `true` for the sticky runtime value errors.
    #[must_use]
    pub fn is_value_error(&self) -> bool {
        matches!(self, Self::ValueExpired(_) | Self::ValueUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_in_use_message() {
        let err = Error::ResourceInUse {
            resource: "GPIO17".to_string(),
            requester: "Relay2".to_string(),
            owner: "Relay1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Resource requested by Relay2 is already in use by Relay1: GPIO17"
        );
    }

    #[test]
    fn test_value_error_mapping() {
        assert!(Error::from_value_error("P", ValueError::Ok).is_none());

        let expired = Error::from_value_error("P", ValueError::Expired).unwrap();
        assert!(matches!(expired, Error::ValueExpired(ref id) if id == "P"));
        assert!(expired.is_value_error());

        let unavailable = Error::from_value_error("P", ValueError::NotAvailable).unwrap();
        assert_eq!(unavailable.to_string(), "P: The port value is not available");
    }

    #[test]
    fn test_domain_error_is_not_value_error() {
        let err = Error::domain("Dial1", "Position must not exceed the maximum: 100");
        assert!(!err.is_value_error());
        assert_eq!(err.to_string(), "Dial1: Position must not exceed the maximum: 100");
    }
}
