//! Context cache: memoizes the three lookups that gate every ingress
//! (organization by id, user by id, api-key hash to organization id).
//!
//! Callers never see an error from this crate — a backend that is
//! unavailable is treated as a full miss and resolved from the system of
//! record, matching the platform's fail-open cache contract.

use std::time::{Duration, Instant};

use airweave_core::{Organization, User};
use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Default time-to-live for any cache entry not explicitly invalidated.
/// 30 seconds of staleness is the design's accepted bound for attributes
/// like plan changes and feature flags.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Hash a raw API key into its cache-key form: a deterministic,
/// lowercase-hex SHA-256 digest. The raw key must never appear in a cache
/// key or a log line; this function is the only place a raw key is read.
#[must_use]
pub fn hash_api_key(raw_key: &str) -> String {
    let digest = Sha256::digest(raw_key.as_bytes());
    hex_lower(&digest)
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// The three memoized lookups on the hot ingress path, plus the
/// invalidation hooks administrative mutations use so a stale decision
/// cannot persist for more than one request.
#[async_trait]
pub trait ContextCache: Send + Sync {
    /// Cached organization lookup by id. `None` on miss; never errors.
    async fn get_organization(&self, organization_id: Uuid) -> Option<Organization>;

    /// Cached user lookup by id. `None` on miss; never errors.
    async fn get_user(&self, user_id: Uuid) -> Option<User>;

    /// Cached api-key-hash to organization-id lookup. The caller must pass
    /// an already-hashed key (see [`hash_api_key`]); this trait never
    /// receives a raw key.
    async fn get_api_key_org_id(&self, api_key_hash: &str) -> Option<Uuid>;

    /// Idempotently populate the organization cache.
    async fn set_organization(&self, organization: Organization);

    /// Idempotently populate the user cache.
    async fn set_user(&self, user: User);

    /// Idempotently populate the api-key cache.
    async fn set_api_key_org_id(&self, api_key_hash: String, organization_id: Uuid);

    /// Immediately evict a cached organization.
    async fn invalidate_organization(&self, organization_id: Uuid);

    /// Immediately evict a cached user.
    async fn invalidate_user(&self, user_id: Uuid);

    /// Immediately evict a cached api-key lookup.
    async fn invalidate_api_key(&self, api_key_hash: &str);
}

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> Entry<T> {
    fn fresh(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn value_if_fresh(&self) -> Option<T> {
        (Instant::now() < self.expires_at).then(|| self.value.clone())
    }
}

/// An in-process, `DashMap`-backed implementation of [`ContextCache`].
///
/// This is the process-wide instance a real deployment would back with
/// Redis or similar; the TTL/invalidation contract is identical either
/// way, so code written against the trait does not need to change when
/// a networked backend is substituted.
pub struct InMemoryContextCache {
    ttl: Duration,
    organizations: DashMap<Uuid, Entry<Organization>>,
    users: DashMap<Uuid, Entry<User>>,
    api_keys: DashMap<String, Entry<Uuid>>,
}

impl InMemoryContextCache {
    /// Build a cache with the default 30s TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// Build a cache with a custom TTL, for tests that want to exercise
    /// expiry without sleeping 30 real seconds.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            organizations: DashMap::new(),
            users: DashMap::new(),
            api_keys: DashMap::new(),
        }
    }
}

impl Default for InMemoryContextCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContextCache for InMemoryContextCache {
    async fn get_organization(&self, organization_id: Uuid) -> Option<Organization> {
        self.organizations
            .get(&organization_id)
            .and_then(|entry| entry.value_if_fresh())
    }

    async fn get_user(&self, user_id: Uuid) -> Option<User> {
        self.users.get(&user_id).and_then(|entry| entry.value_if_fresh())
    }

    async fn get_api_key_org_id(&self, api_key_hash: &str) -> Option<Uuid> {
        self.api_keys
            .get(api_key_hash)
            .and_then(|entry| entry.value_if_fresh())
    }

    async fn set_organization(&self, organization: Organization) {
        self.organizations
            .insert(organization.id(), Entry::fresh(organization, self.ttl));
    }

    async fn set_user(&self, user: User) {
        self.users.insert(user.id(), Entry::fresh(user, self.ttl));
    }

    async fn set_api_key_org_id(&self, api_key_hash: String, organization_id: Uuid) {
        self.api_keys
            .insert(api_key_hash, Entry::fresh(organization_id, self.ttl));
    }

    async fn invalidate_organization(&self, organization_id: Uuid) {
        self.organizations.remove(&organization_id);
    }

    async fn invalidate_user(&self, user_id: Uuid) {
        self.users.remove(&user_id);
    }

    async fn invalidate_api_key(&self, api_key_hash: &str) {
        self.api_keys.remove(api_key_hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_hash_is_deterministic_and_never_contains_raw_substrings() {
        let raw = "super-secret-api-key-12345";
        let hashed = hash_api_key(raw);
        assert_eq!(hashed.len(), 64);
        assert!(hashed.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hashed, hash_api_key(raw));
        assert!(!hashed.contains("super"));
        assert!(!hashed.contains("secret"));
        assert!(!hashed.contains("12345"));
    }

    #[tokio::test]
    async fn set_then_get_round_trips_within_ttl() {
        let cache = InMemoryContextCache::with_ttl(Duration::from_secs(30));
        let org = Organization::new(Uuid::new_v4(), "acme");
        let id = org.id();
        cache.set_organization(org).await;
        assert!(cache.get_organization(id).await.is_some());
    }

    #[tokio::test]
    async fn entry_expires_after_ttl() {
        let cache = InMemoryContextCache::with_ttl(Duration::from_millis(10));
        let org = Organization::new(Uuid::new_v4(), "acme");
        let id = org.id();
        cache.set_organization(org).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get_organization(id).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_evicts_immediately_regardless_of_ttl() {
        let cache = InMemoryContextCache::with_ttl(Duration::from_secs(300));
        let org = Organization::new(Uuid::new_v4(), "acme");
        let id = org.id();
        cache.set_organization(org).await;
        cache.invalidate_organization(id).await;
        assert!(cache.get_organization(id).await.is_none());
    }

    #[tokio::test]
    async fn api_key_lookup_round_trips_by_hash() {
        let cache = InMemoryContextCache::new();
        let hash = hash_api_key("super-secret-api-key-12345");
        let org_id = Uuid::new_v4();
        cache.set_api_key_org_id(hash.clone(), org_id).await;
        assert_eq!(cache.get_api_key_org_id(&hash).await, Some(org_id));
    }
}
