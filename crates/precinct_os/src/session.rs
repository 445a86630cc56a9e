#![forbid(unsafe_code)]

//! Cached view of `/api/auth/me`.
//!
//! Session checks never surface errors: a 401 is cached as "nobody is logged in", anything else
//! that goes wrong (network, 5xx, unreadable body) reads as not authenticated without caching,
//! so the next read tries again.
//!
//! Every decoded session also brings the cached officer profile in line with it.

use precinct_contracts::api::{ApiEndpoint, QueryKey};
use precinct_contracts::auth::{MeResponse, SessionUser};
use precinct_engines::error::decode_json_body;
use precinct_engines::{ApiRequest, ApiTransport, QueryCache};
use precinct_storage::{ClientStore, KvStore};
use tracing::{debug, warn};

use crate::profile_sync::{ProfileSync, SyncOutcome};

const STATUS_UNAUTHORIZED: u16 = 401;

pub struct SessionQuery<'a, T: ApiTransport, S: KvStore> {
    transport: &'a T,
    cache: &'a QueryCache,
    store: &'a ClientStore<S>,
    key: QueryKey,
}

impl<'a, T: ApiTransport, S: KvStore> SessionQuery<'a, T, S> {
    pub fn new(transport: &'a T, cache: &'a QueryCache, store: &'a ClientStore<S>) -> Self {
        Self {
            transport,
            cache,
            store,
            key: QueryKey::session(),
        }
    }

    /// Fresh cached session, or a fetch when there is none or it is older than the stale window.
    pub async fn current(&self) -> Option<SessionUser> {
        match self.cache.get_fresh::<Option<SessionUser>>(&self.key) {
            Some(cached) => cached,
            None => self.fetch().await,
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current().await.is_some()
    }

    pub async fn invalidate_and_refetch(&self) -> Option<SessionUser> {
        self.cache.invalidate(std::slice::from_ref(&self.key));
        self.fetch().await
    }

    pub async fn fetch(&self) -> Option<SessionUser> {
        let outcome = self
            .transport
            .send(ApiRequest::endpoint(ApiEndpoint::AuthMe))
            .await;
        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                warn!(name = %err.name, "session check failed to reach server");
                return None;
            }
        };
        if response.status == STATUS_UNAUTHORIZED {
            debug!("no active session");
            self.cache.put(&self.key, &None::<SessionUser>);
            return None;
        }
        if !response.is_success() {
            warn!(status = response.status, "session check rejected");
            return None;
        }
        match decode_json_body::<MeResponse>(&response) {
            Ok(me) => {
                let user = me.into_user();
                debug!(user_id = user.id, "session refreshed");
                self.cache.put(&self.key, &Some(user.clone()));
                self.sync_profile(&user);
                Some(user)
            }
            Err(err) => {
                warn!(error = %err, "session body unreadable");
                None
            }
        }
    }

    fn sync_profile(&self, user: &SessionUser) {
        match ProfileSync::new(self.store).sync_from_session(user) {
            Ok(SyncOutcome::Updated(profile)) => {
                debug!(badge = %profile.badge, "profile follows refreshed session");
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "profile sync after session read failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use precinct_contracts::profile::OfficerProfile;
    use precinct_engines::{QueryPolicy, ScriptedTransport};
    use precinct_storage::InMemoryKvStore;
    use serde_json::json;
    use std::time::Duration;

    fn me_body() -> serde_json::Value {
        json!({"user": {"id": 7, "username": "jdoe", "isAdmin": false, "badgeNumber": "B-12"}})
    }

    fn store() -> ClientStore<InMemoryKvStore> {
        ClientStore::new(InMemoryKvStore::new())
    }

    #[tokio::test(start_paused = true)]
    async fn at_session_01_fresh_cache_avoids_network() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, me_body());
        let cache = QueryCache::new(QueryPolicy::session_v1());
        let store = store();
        let session = SessionQuery::new(&transport, &cache, &store);

        assert!(session.is_authenticated().await);
        let user = session.current().await.unwrap();
        assert_eq!(user.username, "jdoe");
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn at_session_02_unauthorized_is_cached_as_logged_out() {
        let transport = ScriptedTransport::new();
        transport.push_json(401, json!({"message": "Not authenticated"}));
        let cache = QueryCache::new(QueryPolicy::session_v1());
        let store = store();
        let session = SessionQuery::new(&transport, &cache, &store);

        assert!(!session.is_authenticated().await);
        assert!(!session.is_authenticated().await);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn at_session_03_transport_failure_is_silent_and_not_cached() {
        let transport = ScriptedTransport::new();
        transport
            .push_transport_error("connection", "connection refused")
            .push_json(200, json!({"id": 7, "username": "jdoe", "badgeNumber": "B-12"}));
        let cache = QueryCache::new(QueryPolicy::session_v1());
        let store = store();
        let session = SessionQuery::new(&transport, &cache, &store);

        assert_eq!(session.current().await, None);
        let user = session.current().await.expect("bare body accepted");
        assert_eq!(user.badge_number, "B-12");
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn at_session_04_current_refetches_after_stale_window() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, me_body()).push_json(401, json!({}));
        let cache = QueryCache::new(QueryPolicy::session_v1());
        let store = store();
        let session = SessionQuery::new(&transport, &cache, &store);

        assert!(session.current().await.is_some());
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        assert!(session.current().await.is_some());
        assert_eq!(transport.call_count(), 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(session.current().await, None);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn at_session_05_invalidate_forces_refetch() {
        let transport = ScriptedTransport::new();
        transport.push_json(401, json!({})).push_json(200, me_body());
        let cache = QueryCache::new(QueryPolicy::session_v1());
        let store = store();
        let session = SessionQuery::new(&transport, &cache, &store);

        assert!(!session.is_authenticated().await);
        assert!(session.invalidate_and_refetch().await.is_some());
        assert!(session.is_authenticated().await);
        assert_eq!(
            transport.paths(),
            vec!["GET /api/auth/me".to_string(), "GET /api/auth/me".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn at_session_06_plain_read_brings_linked_profile_in_line() {
        let transport = ScriptedTransport::new();
        transport.push_json(
            200,
            json!({"user": {
                "id": 7, "username": "jdoe", "isAdmin": false, "badgeNumber": "B-12",
                "rank": "Sergeant", "discordId": "42", "callsign": "2-LINCOLN-7"
            }}),
        );
        let cache = QueryCache::new(QueryPolicy::session_v1());
        let store = store();
        store
            .put_officer_profile(&OfficerProfile {
                badge: "B-12".to_string(),
                name: "Jane Doe".to_string(),
                rank: "Officer".to_string(),
                discord_id: Some("42".to_string()),
                callsign: String::new(),
            })
            .unwrap();
        let session = SessionQuery::new(&transport, &cache, &store);

        let user = session.current().await.unwrap();
        assert_eq!(user.rank.as_deref(), Some("Sergeant"));
        let cached = store.officer_profile().unwrap().unwrap();
        assert_eq!(cached.rank, "Sergeant");
        assert_eq!(cached.callsign, "2-LINCOLN-7");
    }

    #[tokio::test(start_paused = true)]
    async fn at_session_07_unreadable_profile_does_not_hide_the_session() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, me_body());
        let cache = QueryCache::new(QueryPolicy::session_v1());
        let kv = InMemoryKvStore::new();
        kv.set(precinct_storage::OFFICER_PROFILE_KEY, "{not json").unwrap();
        let store = ClientStore::new(kv);
        let session = SessionQuery::new(&transport, &cache, &store);

        assert!(session.current().await.is_some());
    }
}
