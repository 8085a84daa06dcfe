//! Expiry-aware credential persistence over the two storage tiers.

use std::collections::HashMap;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::tiers::{FileTier, MemoryTier};
use crate::token;

/// Storage key for the short-lived access credential.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Storage key for the long-lived refresh credential.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
/// Storage key for the serialized user profile.
pub const USER_DATA_KEY: &str = "user_data";

/// One persisted record. The value is base64-obfuscated before it lands in
/// a tier - a casual-inspection defense only, explicitly not encryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    value: String,
    expires_at: i64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: i64,
}

/// Tier-aware, expiry-aware key/value store for credentials plus the user
/// profile record.
///
/// Failure semantics: the persistence backend being unavailable degrades to
/// cache-only behavior with a warning; it is never an error to the caller.
/// Malformed records and expired records read as absent and are evicted.
pub struct CredentialStore {
    namespace: String,
    ephemeral: MemoryTier,
    durable: FileTier,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl CredentialStore {
    /// Open the store and sweep both tiers for expired or corrupt records
    /// in this store's namespace.
    pub fn open(namespace: impl Into<String>, storage_dir: impl Into<PathBuf>) -> Self {
        let store = Self {
            namespace: namespace.into(),
            ephemeral: MemoryTier::default(),
            durable: FileTier::new(storage_dir.into()),
            cache: Mutex::new(HashMap::new()),
        };
        store.sweep();
        store
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}.{}", self.namespace, key)
    }

    fn obfuscate(value: &str) -> String {
        STANDARD.encode(value.as_bytes())
    }

    fn deobfuscate(raw: &str) -> Option<String> {
        let bytes = STANDARD.decode(raw).ok()?;
        String::from_utf8(bytes).ok()
    }

    /// Store a value with a time-to-live in the chosen tier.
    ///
    /// Always succeeds from the caller's perspective: if the durable tier
    /// cannot be written the value is kept in the in-process cache only,
    /// which is a documented degraded mode rather than an error.
    pub fn set_token(&self, key: &str, value: &str, ttl_secs: i64, durable: bool) {
        let ns_key = self.namespaced(key);
        let expires_at = Utc::now().timestamp() + ttl_secs;

        self.cache.lock().insert(
            ns_key.clone(),
            CacheEntry {
                value: value.to_string(),
                expires_at,
            },
        );

        let record = StoredRecord {
            value: Self::obfuscate(value),
            expires_at,
        };
        // serde_json cannot fail on this shape
        let raw = serde_json::to_string(&record).unwrap_or_default();

        if durable {
            if let Err(e) = self.durable.write(&ns_key, &raw) {
                warn!(key, error = %e, "Durable tier unavailable, keeping value in cache only");
            }
        } else {
            self.ephemeral.write(&ns_key, &raw);
        }
    }

    /// Retrieve a value, preferring the requested tier but falling back to
    /// the other tier for read compatibility. Expired and malformed records
    /// read as absent and are evicted as a side effect.
    pub fn get_token(&self, key: &str, durable: bool) -> Option<String> {
        let ns_key = self.namespaced(key);
        let now = Utc::now().timestamp();

        {
            let mut cache = self.cache.lock();
            if let Some(entry) = cache.get(&ns_key) {
                if entry.expires_at > now {
                    return Some(entry.value.clone());
                }
                cache.remove(&ns_key);
            }
        }

        let value = if durable {
            self.lookup_durable(&ns_key, now)
                .or_else(|| self.lookup_ephemeral(&ns_key, now))
        } else {
            self.lookup_ephemeral(&ns_key, now)
                .or_else(|| self.lookup_durable(&ns_key, now))
        };

        if let Some((value, expires_at)) = value {
            self.cache
                .lock()
                .insert(ns_key, CacheEntry { value: value.clone(), expires_at });
            return Some(value);
        }
        None
    }

    fn lookup_ephemeral(&self, ns_key: &str, now: i64) -> Option<(String, i64)> {
        let raw = self.ephemeral.read(ns_key)?;
        match Self::parse_record(&raw, now) {
            Some(found) => Some(found),
            None => {
                self.ephemeral.remove(ns_key);
                None
            }
        }
    }

    fn lookup_durable(&self, ns_key: &str, now: i64) -> Option<(String, i64)> {
        let raw = match self.durable.read(ns_key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = ns_key, error = %e, "Durable tier read failed");
                return None;
            }
        };
        match Self::parse_record(&raw, now) {
            Some(found) => Some(found),
            None => {
                if let Err(e) = self.durable.remove(ns_key) {
                    debug!(key = ns_key, error = %e, "Failed to evict record");
                }
                None
            }
        }
    }

    /// Decode a raw tier record, yielding the plain value while it is alive.
    fn parse_record(raw: &str, now: i64) -> Option<(String, i64)> {
        let record: StoredRecord = serde_json::from_str(raw).ok()?;
        if record.expires_at <= now {
            return None;
        }
        let value = Self::deobfuscate(&record.value)?;
        Some((value, record.expires_at))
    }

    /// Remove one key from the cache and both tiers.
    pub fn remove_token(&self, key: &str) {
        let ns_key = self.namespaced(key);
        self.cache.lock().remove(&ns_key);
        self.ephemeral.remove(&ns_key);
        if let Err(e) = self.durable.remove(&ns_key) {
            warn!(key, error = %e, "Failed to remove durable record");
        }
    }

    /// Clear the cache and both tiers. Idempotent; storage being
    /// unavailable is logged, never surfaced.
    pub fn clear_all(&self) {
        self.cache.lock().clear();
        self.ephemeral.clear();
        if let Err(e) = self.durable.clear() {
            warn!(error = %e, "Failed to clear durable tier");
        }
    }

    /// Whether the requested tier currently holds a live record for a key.
    /// Unlike `get_token` this never falls back to the other tier.
    pub fn tier_has(&self, key: &str, durable: bool) -> bool {
        let ns_key = self.namespaced(key);
        let now = Utc::now().timestamp();
        if durable {
            self.lookup_durable(&ns_key, now).is_some()
        } else {
            self.lookup_ephemeral(&ns_key, now).is_some()
        }
    }

    /// Decode-only expiry check on a token string; malformed is expired.
    pub fn is_expired(&self, token: &str) -> bool {
        token::is_expired(token)
    }

    /// Decode-only expiry claim of a token string.
    pub fn get_expiry(&self, token: &str) -> Option<DateTime<Utc>> {
        token::decode_expiry(token)
    }

    /// True iff an access token is retrievable from either tier and its
    /// claim has not expired.
    pub fn has_valid_session(&self) -> bool {
        match self.get_token(ACCESS_TOKEN_KEY, false) {
            Some(access) => !token::is_expired(&access),
            None => false,
        }
    }

    /// Read and delete a record stored under a raw, un-namespaced legacy
    /// key. The previous release stored plain values; if the payload turns
    /// out to be a current-format record, its value is unwrapped instead.
    pub fn take_legacy(&self, legacy_key: &str) -> Option<String> {
        let raw = self.ephemeral.read(legacy_key).or_else(|| {
            self.durable.read(legacy_key).unwrap_or_else(|e| {
                warn!(key = legacy_key, error = %e, "Legacy record read failed");
                None
            })
        })?;

        self.ephemeral.remove(legacy_key);
        if let Err(e) = self.durable.remove(legacy_key) {
            debug!(key = legacy_key, error = %e, "Failed to delete legacy record");
        }

        if let Ok(record) = serde_json::from_str::<StoredRecord>(&raw) {
            return Self::deobfuscate(&record.value).or(Some(raw));
        }
        Some(raw)
    }

    /// Evict every record in this store's namespace whose expiry has passed
    /// or whose payload fails to parse. Runs once at construction.
    fn sweep(&self) {
        let now = Utc::now().timestamp();
        let prefix = format!("{}.", self.namespace);

        for key in self.ephemeral.keys() {
            if key.starts_with(&prefix) && self.lookup_ephemeral(&key, now).is_none() {
                debug!(key, "Swept dead ephemeral record");
            }
        }
        for key in self.durable.keys() {
            if key.starts_with(&prefix) && self.lookup_durable(&key, now).is_none() {
                debug!(key, "Swept dead durable record");
            }
        }
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tests::token_expiring_in;

    fn store(dir: &tempfile::TempDir) -> CredentialStore {
        CredentialStore::open("keyfob", dir.path())
    }

    #[test]
    fn round_trip_within_ttl() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = store(&dir);
        s.set_token("access_token", "tok-1", 60, false);
        assert_eq!(s.get_token("access_token", false).as_deref(), Some("tok-1"));
    }

    #[test]
    fn elapsed_ttl_reads_as_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = store(&dir);
        s.set_token("access_token", "tok-1", -1, false);
        assert!(s.get_token("access_token", false).is_none());
        // The expired record was evicted, not just hidden.
        assert!(!s.tier_has("access_token", false));
    }

    #[test]
    fn lookup_falls_back_to_the_other_tier() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = store(&dir);
        s.set_token("refresh_token", "tok-d", 60, true);
        // Requested ephemeral, present only in durable.
        assert_eq!(s.get_token("refresh_token", false).as_deref(), Some("tok-d"));
    }

    #[test]
    fn writes_never_cross_tiers() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let s = store(&dir);
            s.set_token("access_token", "ephemeral-only", 60, false);
        }
        // A fresh store sees an empty ephemeral tier; the value must not
        // have leaked into the durable tier.
        let s = store(&dir);
        assert!(s.get_token("access_token", true).is_none());
    }

    #[test]
    fn durable_records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let s = store(&dir);
            s.set_token("refresh_token", "tok-d", 60, true);
        }
        let s = store(&dir);
        assert_eq!(s.get_token("refresh_token", true).as_deref(), Some("tok-d"));
    }

    #[test]
    fn stored_payload_is_obfuscated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = store(&dir);
        s.set_token("access_token", "super-secret-token", 60, true);

        let raw = std::fs::read_to_string(dir.path().join("keyfob.access_token.json"))
            .expect("record file");
        assert!(!raw.contains("super-secret-token"));
    }

    #[test]
    fn clear_all_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = store(&dir);
        s.set_token("access_token", "tok", 60, true);
        s.set_token("refresh_token", "tok", 60, false);

        s.clear_all();
        assert!(s.get_token("access_token", true).is_none());
        assert!(s.get_token("refresh_token", false).is_none());

        // Second clear is a no-op and must not panic.
        s.clear_all();
    }

    #[test]
    fn remove_token_clears_both_tiers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = store(&dir);
        s.set_token("user_data", "{}", 60, true);
        s.set_token("user_data", "{}", 60, false);
        s.remove_token("user_data");
        assert!(s.get_token("user_data", true).is_none());
        assert!(s.get_token("user_data", false).is_none());
    }

    #[test]
    fn corrupt_durable_record_is_swept_at_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("keyfob.access_token.json"), "not json at all")
            .expect("write corrupt record");

        let s = store(&dir);
        assert!(s.get_token("access_token", true).is_none());
        assert!(!dir.path().join("keyfob.access_token.json").exists());
    }

    #[test]
    fn expired_durable_record_is_swept_at_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let s = store(&dir);
            s.set_token("access_token", "old", -10, true);
        }
        let _ = store(&dir);
        assert!(!dir.path().join("keyfob.access_token.json").exists());
    }

    #[test]
    fn has_valid_session_requires_a_live_claim() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = store(&dir);
        assert!(!s.has_valid_session());

        // Record alive, claim expired: still not a valid session.
        s.set_token(ACCESS_TOKEN_KEY, &token_expiring_in(-60), 3600, false);
        assert!(!s.has_valid_session());

        s.set_token(ACCESS_TOKEN_KEY, &token_expiring_in(3600), 3600, false);
        assert!(s.has_valid_session());
    }

    #[test]
    fn malformed_token_is_expired_and_has_no_expiry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = store(&dir);
        assert!(s.is_expired("garbage"));
        assert!(s.get_expiry("garbage").is_none());
        assert!(s.get_expiry(&token_expiring_in(60)).is_some());
    }

    #[test]
    fn take_legacy_unwraps_and_deletes() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("myapp_auth_token.json"), "legacy-token")
            .expect("write legacy record");

        let s = store(&dir);
        assert_eq!(s.take_legacy("myapp_auth_token").as_deref(), Some("legacy-token"));
        // Exactly once.
        assert!(s.take_legacy("myapp_auth_token").is_none());
        assert!(!dir.path().join("myapp_auth_token.json").exists());
    }
}
