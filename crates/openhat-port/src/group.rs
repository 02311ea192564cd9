use openhat_core::{Error, Result};
use serde::Serialize;

use crate::port::escape_key_value;

/// A labelled node in the controller's port hierarchy. Groups carry no
/// state; ports refer to them through their `group` metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortGroup {
    id: String,
    label: String,
    parent: String,
    icon: String,
    flags: u32,
}

impl PortGroup {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            parent: String::new(),
            icon: String::new(),
            flags: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    /// # Errors
    /// A parent can be replaced but not removed.
    pub fn set_parent(&mut self, parent: &str) -> Result<()> {
        if parent.is_empty() {
            return Err(Error::Config(format!(
                "{}: Parent group ID must not be empty",
                self.id
            )));
        }
        self.parent = parent.to_string();
        Ok(())
    }

    pub fn icon(&self) -> &str {
        &self.icon
    }

    pub fn set_icon(&mut self, icon: impl Into<String>) {
        self.icon = icon.into();
    }

    #[must_use]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.flags = flags;
    }

    #[must_use]
    pub fn extended_info(&self) -> String {
        if self.icon.is_empty() {
            String::new()
        } else {
            format!("icon={};", escape_key_value(&self.icon))
        }
    }
}
