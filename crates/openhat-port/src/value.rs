//! Values exchanged with the controller.

use openhat_core::{AnalogMode, AnalogReference, DigitalMode};
use serde::{Deserialize, Serialize};

/// A value written to a port.
///
/// Each variant addresses one port kind; `Position` serves both select and
/// dial ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortValue {
    Line(u8),
    Analog(i32),
    Relative(f64),
    Position(i64),
    Text(String),
}

impl std::fmt::Display for PortValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortValue::Line(line) => write!(f, "line {line}"),
            PortValue::Analog(value) => write!(f, "value {value}"),
            PortValue::Relative(value) => write!(f, "relative value {value}"),
            PortValue::Position(position) => write!(f, "position {position}"),
            PortValue::Text(text) => write!(f, "'{text}'"),
        }
    }
}

/// Committed state of a port as reported to the controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PortState {
    Digital {
        mode: DigitalMode,
        line: u8,
    },
    Analog {
        mode: AnalogMode,
        resolution: u8,
        reference: AnalogReference,
        value: i32,
        relative: f64,
    },
    Select {
        position: u16,
        label: String,
    },
    Dial {
        position: i64,
        min: i64,
        max: i64,
        step: u64,
    },
    Custom {
        type_guid: String,
        value: String,
    },
    Streaming {
        available: usize,
    },
}

/// Controller view of one port; value errors appear as an explicit tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortSnapshot {
    pub id: String,
    pub label: String,
    pub port_type: crate::PortType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<PortState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub extended_state: String,
}
