use serde::{Deserialize, Serialize};

/// Committed value of a custom port: an opaque string tagged with a type GUID
/// that tells the controller how to render it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomState {
    pub type_guid: String,
    pub value: String,
}

impl CustomState {
    pub fn new(type_guid: impl Into<String>) -> Self {
        Self {
            type_guid: type_guid.into(),
            value: String::new(),
        }
    }
}
