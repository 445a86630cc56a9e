#![forbid(unsafe_code)]

use precinct_contracts::auth::SessionUser;
use precinct_contracts::profile::OfficerProfile;
use precinct_storage::{ClientStore, KvStore, StorageError};
use tracing::{debug, info};

use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    NoProfile,
    /// Cached profile belongs to another Discord account, or has none.
    NotLinked,
    Unchanged,
    Updated(OfficerProfile),
}

/// Officer profile persistence plus the one-way sync from the session.
pub struct ProfileSync<'a, S: KvStore> {
    store: &'a ClientStore<S>,
}

impl<'a, S: KvStore> ProfileSync<'a, S> {
    pub fn new(store: &'a ClientStore<S>) -> Self {
        Self { store }
    }

    pub fn profile(&self) -> Result<Option<OfficerProfile>, StorageError> {
        self.store.officer_profile()
    }

    pub fn saved_officers(&self) -> Result<Vec<OfficerProfile>, StorageError> {
        self.store.saved_officers()
    }

    pub fn save_profile(&self, profile: &OfficerProfile) -> Result<(), ClientError> {
        profile.field_errors().into_result()?;
        self.store.put_officer_profile(profile)?;
        info!(badge = %profile.badge, "officer profile saved");
        Ok(())
    }

    pub fn save_to_officer_list(
        &self,
        profile: &OfficerProfile,
    ) -> Result<Vec<OfficerProfile>, ClientError> {
        profile.field_errors().into_result()?;
        Ok(self.store.upsert_saved_officer(profile)?)
    }

    pub fn remove_from_officer_list(&self, badge: &str) -> Result<bool, StorageError> {
        self.store.remove_saved_officer(badge.trim())
    }

    /// Rank and callsign follow the session once both carry the same Discord id. Writes only
    /// when something changed.
    pub fn sync_from_session(&self, session: &SessionUser) -> Result<SyncOutcome, StorageError> {
        let Some(current) = self.store.officer_profile()? else {
            return Ok(SyncOutcome::NoProfile);
        };
        let Some(synced) = current.synced_from_session(session) else {
            return Ok(SyncOutcome::NotLinked);
        };
        if synced == current {
            return Ok(SyncOutcome::Unchanged);
        }
        self.store.put_officer_profile(&synced)?;
        debug!(
            badge = %synced.badge,
            rank = %synced.rank,
            callsign = %synced.callsign,
            "officer profile synced from session"
        );
        Ok(SyncOutcome::Updated(synced))
    }
}
