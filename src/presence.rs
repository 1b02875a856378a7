// Last-known presence per (bare address, resource)

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::address::Address;
use crate::engine::PresenceQuery;
use crate::models::Presence;

#[derive(Debug, Default)]
pub struct PresenceStore {
    // bare -> resource -> presence; the empty resource is presence sent from the bare address
    by_bare: HashMap<String, BTreeMap<String, Presence>>,
}

impl PresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a presence update. Unavailable presence removes the resource,
    /// or every resource when it comes from the bare address.
    pub fn update(&mut self, from: &Address, presence: &Presence) {
        let bare = from.bare_str();
        let resource = from.resource().unwrap_or("");

        if presence.availability.is_online() {
            self.by_bare
                .entry(bare.to_string())
                .or_default()
                .insert(resource.to_string(), presence.clone());
            return;
        }

        if from.is_bare() {
            if self.by_bare.remove(bare).is_some() {
                debug!("All resources of {} went offline", bare);
            }
        } else if let Some(resources) = self.by_bare.get_mut(bare) {
            resources.remove(resource);
            if resources.is_empty() {
                self.by_bare.remove(bare);
            }
        }
    }

    /// All online (resource, presence) pairs for a bare address, ordered by resource name.
    pub fn presences_for(&self, bare: &str) -> Vec<(String, Presence)> {
        self.by_bare
            .get(bare)
            .map(|resources| {
                resources
                    .iter()
                    .map(|(resource, presence)| (resource.clone(), presence.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, full: &Address) -> Option<&Presence> {
        self.by_bare
            .get(full.bare_str())
            .and_then(|resources| resources.get(full.resource().unwrap_or("")))
    }

    /// Forget everything; used when the connection drops.
    pub fn clear(&mut self) {
        self.by_bare.clear();
    }
}

impl PresenceQuery for PresenceStore {
    fn resources_online(&self, bare: &str) -> Vec<String> {
        self.by_bare
            .get(bare)
            .map(|resources| resources.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn is_resource_online(&self, full: &Address) -> bool {
        self.get(full).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    #[test]
    fn test_available_then_unavailable() {
        let mut store = PresenceStore::new();
        store.update(&addr("a@x.org/phone"), &Presence::available());
        store.update(&addr("a@x.org/laptop"), &Presence::available());
        assert_eq!(store.resources_online("a@x.org"), vec!["laptop", "phone"]);

        store.update(&addr("a@x.org/phone"), &Presence::unavailable());
        assert_eq!(store.resources_online("a@x.org"), vec!["laptop"]);
        assert!(!store.is_resource_online(&addr("a@x.org/phone")));
        assert!(store.is_resource_online(&addr("a@x.org/laptop")));
    }

    #[test]
    fn test_bare_unavailable_clears_all_resources() {
        let mut store = PresenceStore::new();
        store.update(&addr("a@x.org/phone"), &Presence::available());
        store.update(&addr("a@x.org/laptop"), &Presence::available());
        store.update(&addr("a@x.org"), &Presence::unavailable());
        assert!(store.resources_online("a@x.org").is_empty());
        assert!(store.presences_for("a@x.org").is_empty());
    }

    #[test]
    fn test_unknown_address_is_offline() {
        let store = PresenceStore::new();
        assert!(store.resources_online("nobody@x.org").is_empty());
        assert!(!store.is_resource_online(&addr("nobody@x.org/r")));
    }
}
