#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use precinct_contracts::auth::SessionUser;
use precinct_contracts::discord::VerificationState;
use precinct_engines::discord_flow::{transition, VerificationEvent};
use precinct_engines::{
    ApiTransport, MutationPolicy, MutationRunner, Notifier, QueryCache, QueryPolicy,
    TransportConfig,
};
use precinct_storage::{ClientStore, FileKvStore, KvStore};
use tracing::info;

use crate::discord_verify::DiscordVerification;
use crate::navigator::Navigator;
use crate::profile_sync::ProfileSync;
use crate::session::SessionQuery;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub transport: TransportConfig,
    pub store_path: PathBuf,
    pub query: QueryPolicy,
    pub mutation: MutationPolicy,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self {
            transport: TransportConfig::from_env(),
            store_path: FileKvStore::default_local().path().to_path_buf(),
            query: QueryPolicy::session_v1(),
            mutation: MutationPolicy::v1(),
        }
    }
}

/// Everything one client session needs, injected: HTTP transport, query cache, durable store,
/// user notifications and navigation.
pub struct ClientApp<T, S, N, V>
where
    T: ApiTransport,
    S: KvStore,
    N: Notifier,
    V: Navigator,
{
    transport: T,
    cache: QueryCache,
    store: ClientStore<S>,
    notifier: N,
    navigator: V,
    mutation_policy: MutationPolicy,
    verification: Mutex<VerificationState>,
}

impl<T, S, N, V> ClientApp<T, S, N, V>
where
    T: ApiTransport,
    S: KvStore,
    N: Notifier,
    V: Navigator,
{
    pub fn new(transport: T, kv: S, notifier: N, navigator: V) -> Self {
        Self {
            transport,
            cache: QueryCache::new(QueryPolicy::session_v1()),
            store: ClientStore::new(kv),
            notifier,
            navigator,
            mutation_policy: MutationPolicy::v1(),
            verification: Mutex::new(VerificationState::Unverified),
        }
    }

    pub fn with_policies(mut self, query: QueryPolicy, mutation: MutationPolicy) -> Self {
        self.cache = QueryCache::new(query);
        self.mutation_policy = mutation;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn store(&self) -> &ClientStore<S> {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn navigator(&self) -> &V {
        &self.navigator
    }

    pub fn runner(&self) -> MutationRunner<'_, T, N> {
        MutationRunner::new(&self.transport, &self.cache, &self.notifier)
            .with_policy(self.mutation_policy)
    }

    /// Every session read goes through here, so the cached profile follows each fetch.
    pub fn session(&self) -> SessionQuery<'_, T, S> {
        SessionQuery::new(&self.transport, &self.cache, &self.store)
    }

    pub fn profiles(&self) -> ProfileSync<'_, S> {
        ProfileSync::new(&self.store)
    }

    pub fn discord(&self) -> DiscordVerification<'_, T, S, N, V> {
        DiscordVerification::new(self)
    }

    pub fn verification_state(&self) -> VerificationState {
        self.verification_lock().clone()
    }

    pub(crate) fn apply_verification(&self, event: VerificationEvent) -> VerificationState {
        let mut state = self.verification_lock();
        let next = transition(&state, event);
        if next != *state {
            info!(from = state.label(), to = next.label(), "verification state changed");
        }
        *state = next.clone();
        next
    }

    /// Refetches the session after a mutation.
    pub async fn refresh_session(&self) -> Option<SessionUser> {
        self.session().invalidate_and_refetch().await
    }

    fn verification_lock(&self) -> MutexGuard<'_, VerificationState> {
        self.verification
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
