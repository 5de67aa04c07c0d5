//! In-memory, lazily-loaded, deduplicating view over a [`TokenStore`].
//!
//! The cache owns the normalization and equality rules; storage failures are
//! surfaced unchanged (callers map [`StoreError::KeychainLocked`] to
//! remediation guidance). Once loaded, the in-memory entry set is the source
//! of truth for the process lifetime; the store is never re-read.

use log::{debug, info};

use super::models::{CacheEntry, CacheQuery};
use super::store::TokenStore;
use crate::error::StoreError;

pub struct TokenCache<S: TokenStore> {
    store: S,
    entries: Option<Vec<CacheEntry>>,
}

impl<S: TokenStore> TokenCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            entries: None,
        }
    }

    /// Whether the backing store offers OS-level secret protection.
    pub fn is_secure(&self) -> bool {
        self.store.is_secure()
    }

    async fn entries_mut(&mut self) -> Result<&mut Vec<CacheEntry>, StoreError> {
        if self.entries.is_none() {
            let loaded = self.store.load_entries().await?;
            debug!("token cache loaded {} entries", loaded.len());
            self.entries = Some(loaded);
        }
        Ok(self.entries.as_mut().expect("entries loaded above"))
    }

    /// Return every entry matching `query` as a structural subset. Zero
    /// matches is an empty result, not a failure.
    ///
    /// `device_flow_user` is threaded through during a device-code login
    /// session: when set, it replaces the query's `user_id` filter verbatim
    /// (the final identity is not resolved yet, so no lower-casing is
    /// applied); otherwise the query's `user_id` is lower-cased before
    /// comparison.
    pub async fn find(
        &mut self,
        query: &CacheQuery,
        device_flow_user: Option<&str>,
    ) -> Result<Vec<CacheEntry>, StoreError> {
        let mut query = query.clone();
        match device_flow_user {
            Some(user) => query.user_id = Some(user.to_string()),
            None => {
                if let Some(user) = query.user_id.take() {
                    query.user_id = Some(user.to_lowercase());
                }
            }
        }
        let entries = self.entries_mut().await?;
        Ok(entries
            .iter()
            .filter(|entry| entry.matches(&query))
            .cloned()
            .collect())
    }

    /// Persist `new_entries`, deduplicating against the loaded set.
    ///
    /// An incoming entry that duplicates a cached one (all fields equal
    /// except `expires_on`) is dropped, so repeated logins never grow the
    /// store. An incoming entry that matches a cached one on identity but
    /// carries different token material is a refresh: the stale entry is
    /// removed from the store before the new one is added.
    ///
    /// With `device_flow_user` set, each entry's `user_id` is forced to that
    /// identity and `/common` authorities are retargeted to the entry's
    /// resolved tenant before storing.
    pub async fn add(
        &mut self,
        mut new_entries: Vec<CacheEntry>,
        device_flow_user: Option<&str>,
    ) -> Result<(), StoreError> {
        for entry in &mut new_entries {
            if let Some(user) = device_flow_user {
                entry.user_id = user.to_string();
            }
            entry.normalize();
            if device_flow_user.is_some() {
                entry.retarget_common_authority();
            }
        }

        let loaded = self.entries_mut().await?;
        new_entries.retain(|candidate| {
            let duplicate = loaded.iter().any(|e| e.same_except_expiry(candidate));
            if duplicate {
                debug!("dropping duplicate token entry for '{}'", candidate.user_id);
            }
            !duplicate
        });
        if new_entries.is_empty() {
            return Ok(());
        }

        let (superseded, kept): (Vec<CacheEntry>, Vec<CacheEntry>) = loaded
            .iter()
            .cloned()
            .partition(|e| new_entries.iter().any(|n| n.same_identity(e)));

        if !superseded.is_empty() {
            info!("replacing {} refreshed token entries", superseded.len());
            self.store.remove_entries(&superseded, &kept).await?;
        }
        self.store.add_entries(&new_entries, &kept).await?;

        let mut kept = kept;
        kept.extend(new_entries);
        self.entries = Some(kept);
        Ok(())
    }

    /// Remove every loaded entry matching an entry of the removal request,
    /// ignoring `expires_on` in the comparison.
    pub async fn remove(&mut self, entries: &[CacheEntry]) -> Result<(), StoreError> {
        let mut request = entries.to_vec();
        for entry in &mut request {
            entry.normalize();
        }

        let loaded = self.entries_mut().await?;
        let (to_remove, to_keep): (Vec<CacheEntry>, Vec<CacheEntry>) = loaded
            .iter()
            .cloned()
            .partition(|e| request.iter().any(|r| r.same_except_expiry(e)));

        self.store.remove_entries(&to_remove, &to_keep).await?;
        info!("removed {} token entries", to_remove.len());
        self.entries = Some(to_keep);
        Ok(())
    }

    /// Drop every persisted entry and reset the in-memory set, so later
    /// `find`/`add` calls observe the cleared state within this process.
    pub async fn clear(&mut self) -> Result<(), StoreError> {
        self.store.clear().await?;
        self.entries = Some(Vec::new());
        Ok(())
    }
}
