//! # Key Layout
//!
//! Apex-keyed records use a one-byte prefix followed by the big-endian apex,
//! so lexicographic key order equals apex order.

use shared_types::PublicKey;

/// Key prefixes for the different record families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPrefix {
    /// `q{apex}` → quantum record with signatures.
    Quantum,
    /// `a{pubkey}` → account snapshot.
    Account,
    /// `s{apex}` → settings version effective from apex.
    Settings,
}

impl KeyPrefix {
    /// Prefix byte(s).
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            KeyPrefix::Quantum => b"q",
            KeyPrefix::Account => b"a",
            KeyPrefix::Settings => b"s",
        }
    }

    /// Prefix followed by the big-endian apex.
    pub fn apex_key(&self, apex: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(9);
        key.extend_from_slice(self.as_bytes());
        key.extend_from_slice(&apex.to_be_bytes());
        key
    }

    /// Decode the apex from a key produced by `apex_key`.
    pub fn apex_of(&self, key: &[u8]) -> Option<u64> {
        let rest = key.strip_prefix(self.as_bytes())?;
        let bytes: [u8; 8] = rest.try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }
}

/// Key of the stored quantum at `apex`.
pub fn quantum_key(apex: u64) -> Vec<u8> {
    KeyPrefix::Quantum.apex_key(apex)
}

/// Key of the settings version effective from `apex`.
pub fn settings_key(apex: u64) -> Vec<u8> {
    KeyPrefix::Settings.apex_key(apex)
}

/// Key of an account snapshot.
pub fn account_key(public_key: &PublicKey) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.extend_from_slice(KeyPrefix::Account.as_bytes());
    key.extend_from_slice(public_key);
    key
}

/// Singleton: the node's own cursor pair.
pub const CURSORS_KEY: &[u8] = b"m:cursors";

/// Singleton: quanta received or sequenced but not yet appended.
pub const PENDING_KEY: &[u8] = b"m:pending";

/// Singleton: first apex still retained after pruning.
pub const PRUNED_FLOOR_KEY: &[u8] = b"m:pruned";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apex_keys_sort_by_apex() {
        let mut keys = vec![quantum_key(256), quantum_key(1), quantum_key(255)];
        keys.sort();
        assert_eq!(keys, vec![quantum_key(1), quantum_key(255), quantum_key(256)]);
    }

    #[test]
    fn test_apex_of_roundtrip() {
        let key = settings_key(42);
        assert_eq!(KeyPrefix::Settings.apex_of(&key), Some(42));
        assert_eq!(KeyPrefix::Quantum.apex_of(&key), None);
        assert_eq!(KeyPrefix::Quantum.apex_of(b"q123"), None);
    }

    #[test]
    fn test_prefixes_do_not_collide_with_meta() {
        for prefix in [KeyPrefix::Quantum, KeyPrefix::Account, KeyPrefix::Settings] {
            assert!(!CURSORS_KEY.starts_with(prefix.as_bytes()));
            assert!(!PENDING_KEY.starts_with(prefix.as_bytes()));
            assert!(!PRUNED_FLOOR_KEY.starts_with(prefix.as_bytes()));
        }
    }
}
