//! Maps a connecting peer's long-term public key to a stable application
//! user id (spec.md §6 "Security": "maps the client's public key to a
//! configured user-id or (if unknown) derives a unique user-id from the
//! key"). A configured mapping wins when present; an unseen key is assigned
//! a freshly generated id and remembered, so the same key always resolves
//! to the same id for as long as the registry persists.

use bridgeutil::UserId;
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Serialize, Deserialize, Clone)]
pub struct UserRecord {
    pub user_id: UserId,
    pub created: DateTime<Utc>,
}

/// Keyed by the base64 encoding of a 32-byte Curve25519 public key.
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct UserRegistry {
    known: HashMap<String, UserRecord>,
}

impl UserRegistry {
    pub fn new() -> UserRegistry {
        UserRegistry { known: HashMap::new() }
    }

    /// Pre-populates a configured mapping, e.g. for long-lived bridge-node
    /// peers whose identity should never drift across restarts.
    pub fn configure(&mut self, public_key: &[u8; 32], user_id: impl Into<UserId>) {
        self.known.insert(
            base64::encode(public_key),
            UserRecord { user_id: user_id.into(), created: Utc::now() },
        );
    }

    /// Looks up the stable user id for `public_key`, deriving and
    /// remembering a new one (a random UUID) if this key has never been
    /// seen before.
    pub fn resolve(&mut self, public_key: &[u8; 32]) -> UserId {
        let key = base64::encode(public_key);

        if let Some(record) = self.known.get(&key) {
            return record.user_id.clone();
        }

        let user_id = uuid::Uuid::new_v4().to_string();
        self.known.insert(key, UserRecord { user_id: user_id.clone(), created: Utc::now() });
        user_id
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<UserRegistry, serdeconv::Error> {
        serdeconv::from_toml_file(path)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), serdeconv::Error> {
        serdeconv::to_toml_file(self, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn unknown_key_gets_a_stable_derived_id() {
        let mut registry = UserRegistry::new();
        let first = registry.resolve(&key(1));
        let second = registry.resolve(&key(1));
        assert_eq!(first, second);
    }

    #[test]
    fn distinct_keys_get_distinct_ids() {
        let mut registry = UserRegistry::new();
        let a = registry.resolve(&key(1));
        let b = registry.resolve(&key(2));
        assert_ne!(a, b);
    }

    #[test]
    fn configured_mapping_wins_over_derivation() {
        let mut registry = UserRegistry::new();
        registry.configure(&key(9), "north-node");
        assert_eq!(registry.resolve(&key(9)), "north-node");
    }

    #[test]
    fn round_trips_through_toml() {
        let mut registry = UserRegistry::new();
        registry.configure(&key(1), "north-node");
        registry.resolve(&key(2));

        let file = tempfile::NamedTempFile::new().unwrap();
        registry.save(file.path()).unwrap();
        let loaded = UserRegistry::load(file.path()).unwrap();
        assert_eq!(loaded.len(), registry.len());
    }
}
