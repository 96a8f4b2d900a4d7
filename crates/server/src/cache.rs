//! In-process cache of client registry lookups.
//!
//! Both outcomes are cached: a found client for an hour, an unknown id for half a
//! minute so a client provisioned in the meantime shows up quickly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::store::RegisteredClient;

const FOUND_TTL: Duration = Duration::from_secs(3600);
const MISSING_TTL: Duration = Duration::from_secs(30);
/// Expired lookups are dropped on insert once the map holds this many ids.
const PRUNE_AT: usize = 1024;

#[derive(Clone)]
struct Lookup {
    client: Option<Arc<RegisteredClient>>,
    expires_at: Instant,
}

#[derive(Clone, Default)]
pub struct ClientCache {
    lookups: Arc<DashMap<String, Lookup>>,
}

impl ClientCache {
    /// `None` on a cache miss, `Some(None)` for an id known to be unregistered.
    pub fn get(&self, client_id: &str) -> Option<Option<Arc<RegisteredClient>>> {
        let lookup = self.lookups.get(client_id)?;
        (Instant::now() < lookup.expires_at).then(|| lookup.client.clone())
    }

    pub fn insert(&self, client_id: &str, client: Option<Arc<RegisteredClient>>) {
        let ttl = if client.is_some() {
            FOUND_TTL
        } else {
            MISSING_TTL
        };
        self.insert_with_ttl(client_id, client, ttl);
    }

    pub fn insert_with_ttl(
        &self,
        client_id: &str,
        client: Option<Arc<RegisteredClient>>,
        ttl: Duration,
    ) {
        let now = Instant::now();
        if self.lookups.len() >= PRUNE_AT {
            self.lookups.retain(|_, lookup| lookup.expires_at > now);
        }
        self.lookups.insert(
            client_id.to_string(),
            Lookup {
                client,
                expires_at: now + ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(id: &str) -> Arc<RegisteredClient> {
        Arc::new(RegisteredClient::new(id, "secret", "https://app/*").unwrap())
    }

    #[test]
    fn remembers_found_and_unknown_clients() {
        let cache = ClientCache::default();
        assert!(cache.get("c1").is_none());

        cache.insert("c1", Some(client("c1")));
        cache.insert("ghost", None);

        let found = cache.get("c1").expect("cached").expect("registered");
        assert_eq!(found.id, "c1");
        assert!(matches!(cache.get("ghost"), Some(None)));
    }

    #[test]
    fn expired_lookup_is_a_miss() {
        let cache = ClientCache::default();
        cache.insert_with_ttl("c1", Some(client("c1")), Duration::ZERO);
        assert!(cache.get("c1").is_none());
    }

    #[test]
    fn crowded_cache_drops_expired_lookups() {
        let cache = ClientCache::default();
        for i in 0..PRUNE_AT {
            cache.insert_with_ttl(&format!("gone-{i}"), None, Duration::ZERO);
        }
        cache.insert("c1", Some(client("c1")));

        assert_eq!(cache.lookups.len(), 1);
        assert!(cache.get("c1").is_some());
    }
}
