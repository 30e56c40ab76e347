//! The BEP-0010 extension protocol's name↔id mapping.

use std::collections::HashMap;

/// Extension message id `0` is reserved for the extension handshake itself
/// and can never be a valid application-extension lookup hit.
pub const HANDSHAKE_EXTENSION_ID: u8 = 0;

/// A bidirectional, de-duplicating mapping between extension names (e.g.
/// `"ut_metadata"`) and the locally/remotely negotiated 8-bit message ids
/// used to address them on the wire.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    by_name: HashMap<String, u8>,
    by_id: HashMap<u8, String>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` ↔ `id`. If either side was already bound to a
    /// different value, the previous binding(s) are dropped — the most
    /// recent `set` always wins.
    pub fn set(&mut self, name: &str, id: u8) {
        if let Some(old_id) = self.by_name.get(name).copied() {
            self.by_id.remove(&old_id);
        }
        if let Some(old_name) = self.by_id.get(&id).cloned() {
            self.by_name.remove(&old_name);
        }
        self.by_name.insert(name.to_owned(), id);
        self.by_id.insert(id, name.to_owned());
    }

    /// Returns the id registered for `name`, or `0` (the reserved handshake
    /// id) if `name` isn't registered.
    pub fn message_id(&self, name: &str) -> u8 {
        self.by_name
            .get(name)
            .copied()
            .unwrap_or(HANDSHAKE_EXTENSION_ID)
    }

    /// Returns the name registered for `id`, or an empty string if `id`
    /// isn't registered.
    pub fn name(&self, id: u8) -> &str {
        self.by_id.get(&id).map(String::as_str).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_registered_extension() {
        let mut reg = ExtensionRegistry::new();
        reg.set("ut_metadata", 2);
        assert_eq!(reg.message_id("ut_metadata"), 2);
        assert_eq!(reg.name(2), "ut_metadata");
    }

    #[test]
    fn unregistered_lookups_use_reserved_defaults() {
        let reg = ExtensionRegistry::new();
        assert_eq!(reg.message_id("unknown"), HANDSHAKE_EXTENSION_ID);
        assert_eq!(reg.name(7), "");
    }

    #[test]
    fn later_set_call_overwrites_both_directions() {
        let mut reg = ExtensionRegistry::new();
        reg.set("ut_metadata", 2);
        reg.set("ut_metadata", 3);
        assert_eq!(reg.message_id("ut_metadata"), 3);
        assert_eq!(reg.name(2), "");
        assert_eq!(reg.name(3), "ut_metadata");

        reg.set("ut_pex", 3);
        assert_eq!(reg.name(3), "ut_pex");
        assert_eq!(reg.message_id("ut_metadata"), HANDSHAKE_EXTENSION_ID);
    }
}
