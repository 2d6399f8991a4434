//! Provider identity, capabilities and the shared record slot

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifier of a registrable entity (host/process scoped)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderIdentity {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProviderIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl std::fmt::Display for ProviderIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Something a provider offers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,

    /// Free-form profile string (version, protocol, endpoint hint)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }
}

/// Immutable snapshot of a provider and its capabilities
///
/// Never mutated in place: updates build a new record and swap it in whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub identity: ProviderIdentity,

    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

impl ProviderRecord {
    pub fn new(identity: ProviderIdentity, capabilities: Vec<Capability>) -> Self {
        Self { identity, capabilities }
    }

    /// Check whether the provider offers a capability by name
    pub fn offers(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c.name == capability)
    }
}

/// Holder for the currently active provider record
///
/// Readers get either the whole previous record or the whole new one.
/// Cloning the slot shares the same underlying cell.
#[derive(Debug, Clone, Default)]
pub struct ProviderSlot {
    inner: Arc<RwLock<Option<Arc<ProviderRecord>>>>,
}

impl ProviderSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active record
    pub fn set(&self, record: Arc<ProviderRecord>) {
        debug!(identity = %record.identity, "ProviderSlot::set: called");
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(record);
    }

    /// Clear the active record, returning the previous one
    pub fn clear(&self) -> Option<Arc<ProviderRecord>> {
        debug!("ProviderSlot::clear: called");
        self.inner.write().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Snapshot of the active record
    pub fn get(&self) -> Option<Arc<ProviderRecord>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_set(&self) -> bool {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> Arc<ProviderRecord> {
        Arc::new(ProviderRecord::new(
            ProviderIdentity::new(name),
            vec![Capability::new("inventory"), Capability::new("telemetry").with_profile("v2")],
        ))
    }

    #[test]
    fn test_slot_starts_empty() {
        let slot = ProviderSlot::new();
        assert!(!slot.is_set());
        assert!(slot.get().is_none());
    }

    #[test]
    fn test_slot_replaces_whole_record() {
        let slot = ProviderSlot::new();
        slot.set(record("first"));
        let before = slot.get().unwrap();

        slot.set(record("second"));
        let after = slot.get().unwrap();

        // The snapshot taken earlier is unaffected by the swap
        assert_eq!(before.identity.name, "first");
        assert_eq!(after.identity.name, "second");
    }

    #[test]
    fn test_cloned_slot_shares_cell() {
        let slot = ProviderSlot::new();
        let other = slot.clone();
        slot.set(record("shared"));
        assert_eq!(other.get().unwrap().identity.name, "shared");

        let cleared = other.clear();
        assert!(cleared.is_some());
        assert!(!slot.is_set());
    }

    #[test]
    fn test_offers() {
        let r = record("p");
        assert!(r.offers("inventory"));
        assert!(!r.offers("billing"));
    }

    #[test]
    fn test_identity_yaml_omits_missing_description() {
        let identity = ProviderIdentity::new("svc");
        let yaml = serde_yaml::to_string(&identity).unwrap();
        assert!(!yaml.contains("description"));

        let identity = identity.with_description("storage service");
        let yaml = serde_yaml::to_string(&identity).unwrap();
        assert!(yaml.contains("storage service"));
    }
}
