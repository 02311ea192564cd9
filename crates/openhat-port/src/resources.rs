use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use openhat_core::{Error, Result};
use tracing::debug;

/// Process wide table of exclusively used resources (pins, device files,
/// bus addresses) and the node that claimed each of them.
#[derive(Debug, Default)]
pub struct ResourceLocks {
    owners: Mutex<HashMap<String, String>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `resource` for `owner`.
    ///
    /// # Errors
    /// Returns `Error::ResourceInUse` if another owner already holds it.
    /// Claiming a resource twice for the same owner is also a conflict.
    pub fn lock(&self, resource: &str, owner: &str) -> Result<()> {
        let mut owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = owners.get(resource) {
            return Err(Error::ResourceInUse {
                resource: resource.to_string(),
                requester: owner.to_string(),
                owner: current.clone(),
            });
        }
        debug!("Resource {} locked by {}", resource, owner);
        owners.insert(resource.to_string(), owner.to_string());
        Ok(())
    }

    pub fn owner(&self, resource: &str) -> Option<String> {
        self.owners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource)
            .cloned()
    }
}
