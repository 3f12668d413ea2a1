//! Provisioned data source cache.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::DatasourceConfig;
use crate::datasource::types::{DatasourceCache, DatasourceError, Principal, ResolvedDatasource};
use crate::observability::metrics;

/// Entry count above which a miss sweeps out every expired entry.
const SWEEP_THRESHOLD: usize = 1024;

/// A resolved data source remembered for one user.
#[derive(Debug, Clone)]
struct CacheEntry {
    datasource: Arc<ResolvedDatasource>,
    inserted_at: Instant,
}

/// A thread-safe cache in front of the provisioned data source list.
///
/// Entries are keyed by (data source id, org id, user id) so an access decision made
/// for one caller is never reused for another.
#[derive(Clone)]
pub struct ProvisionedDatasourceCache {
    records: Arc<DashMap<i64, DatasourceConfig>>,
    entries: Arc<DashMap<(i64, i64, i64), CacheEntry>>,
    ttl: Duration,
}

impl ProvisionedDatasourceCache {
    /// Create a cache over the given data sources.
    pub fn new(datasources: &[DatasourceConfig], ttl: Duration) -> Self {
        let records = DashMap::new();
        for ds in datasources {
            records.insert(ds.id, ds.clone());
        }
        tracing::info!(count = records.len(), "Provisioned data sources loaded");
        Self {
            records: Arc::new(records),
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Number of provisioned data sources.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of remembered (data source, org, user) entries, expired ones included.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
    }

    fn cached(&self, key: (i64, i64, i64)) -> Option<Arc<ResolvedDatasource>> {
        if let Some(entry) = self.entries.get(&key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.datasource.clone());
            }
        }
        // The read guard is released above; holding it here would deadlock the shard.
        self.entries
            .remove_if(&key, |_, entry| entry.inserted_at.elapsed() >= self.ttl);
        None
    }

    fn load(&self, id: i64, principal: &Principal) -> Result<Arc<ResolvedDatasource>, DatasourceError> {
        let record = self.records.get(&id).ok_or(DatasourceError::NotFound)?;

        // Other orgs' data sources are invisible, not forbidden.
        if record.org_id != principal.org_id {
            return Err(DatasourceError::NotFound);
        }
        if !record.allowed_users.is_empty() && !record.allowed_users.contains(&principal.user_id) {
            return Err(DatasourceError::AccessDenied);
        }

        Ok(Arc::new(ResolvedDatasource {
            id: record.id,
            uid: record.uid.clone(),
            name: record.name.clone(),
            type_name: record.type_name.clone(),
            org_id: record.org_id,
            json_data: record.json_data.clone(),
        }))
    }
}

#[async_trait]
impl DatasourceCache for ProvisionedDatasourceCache {
    async fn get_datasource(
        &self,
        id: i64,
        principal: &Principal,
        skip_cache: bool,
    ) -> Result<Arc<ResolvedDatasource>, DatasourceError> {
        let key = (id, principal.org_id, principal.user_id);

        if !skip_cache {
            if let Some(ds) = self.cached(key) {
                metrics::record_datasource_cache("hit");
                return Ok(ds);
            }
        }
        metrics::record_datasource_cache("miss");

        let ds = self.load(id, principal)?;
        if self.entries.len() >= SWEEP_THRESHOLD {
            self.purge_expired();
        }
        self.entries.insert(key, CacheEntry {
            datasource: ds.clone(),
            inserted_at: Instant::now(),
        });
        Ok(ds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, allowed_users: Vec<i64>) -> DatasourceConfig {
        DatasourceConfig {
            id,
            uid: format!("ds-{id}"),
            name: format!("ds {id}"),
            type_name: "testdata".to_string(),
            org_id: 1,
            allowed_users,
            json_data: serde_json::Value::Null,
        }
    }

    fn user(user_id: i64, org_id: i64) -> Principal {
        Principal {
            user_id,
            org_id,
            login: format!("user{user_id}"),
        }
    }

    #[tokio::test]
    async fn test_resolves_provisioned() {
        let cache = ProvisionedDatasourceCache::new(&[record(1, vec![])], Duration::from_secs(5));
        let ds = cache.get_datasource(1, &user(10, 1), false).await.unwrap();
        assert_eq!(ds.id, 1);
        assert_eq!(ds.type_name, "testdata");
        assert_eq!(ds.uid, "ds-1");
    }

    #[tokio::test]
    async fn test_not_found_and_other_org() {
        let cache = ProvisionedDatasourceCache::new(&[record(1, vec![])], Duration::from_secs(5));
        assert_eq!(
            cache.get_datasource(2, &user(10, 1), false).await.unwrap_err(),
            DatasourceError::NotFound
        );
        assert_eq!(
            cache.get_datasource(1, &user(10, 2), false).await.unwrap_err(),
            DatasourceError::NotFound
        );
    }

    #[tokio::test]
    async fn test_access_denied() {
        let cache = ProvisionedDatasourceCache::new(&[record(1, vec![10])], Duration::from_secs(5));
        assert!(cache.get_datasource(1, &user(10, 1), false).await.is_ok());
        assert_eq!(
            cache.get_datasource(1, &user(11, 1), false).await.unwrap_err(),
            DatasourceError::AccessDenied
        );
    }

    #[tokio::test]
    async fn test_cache_entry_reused_until_skipped() {
        let cache = ProvisionedDatasourceCache::new(&[record(1, vec![])], Duration::from_secs(60));
        let first = cache.get_datasource(1, &user(10, 1), false).await.unwrap();
        let second = cache.get_datasource(1, &user(10, 1), false).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let fresh = cache.get_datasource(1, &user(10, 1), true).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert_eq!(*first, *fresh);
    }

    #[tokio::test]
    async fn test_expired_entry_reloaded() {
        let cache = ProvisionedDatasourceCache::new(&[record(1, vec![])], Duration::ZERO);
        let first = cache.get_datasource(1, &user(10, 1), false).await.unwrap();
        let second = cache.get_datasource(1, &user(10, 1), false).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.entry_count(), 1);

        assert!(cache.cached((1, 1, 10)).is_none());
        assert_eq!(cache.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_purge_drops_expired_users() {
        let cache = ProvisionedDatasourceCache::new(&[record(1, vec![])], Duration::ZERO);
        for user_id in 0..5 {
            cache.get_datasource(1, &user(user_id, 1), false).await.unwrap();
        }
        assert_eq!(cache.entry_count(), 5);

        cache.purge_expired();
        assert_eq!(cache.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_miss_sweeps_once_past_threshold() {
        let cache = ProvisionedDatasourceCache::new(&[record(1, vec![])], Duration::ZERO);
        for user_id in 0..SWEEP_THRESHOLD as i64 {
            cache.get_datasource(1, &user(user_id, 1), false).await.unwrap();
        }
        assert_eq!(cache.entry_count(), SWEEP_THRESHOLD);

        cache.get_datasource(1, &user(-1, 1), false).await.unwrap();
        assert_eq!(cache.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_live_entries_survive_purge() {
        let cache = ProvisionedDatasourceCache::new(&[record(1, vec![])], Duration::from_secs(60));
        cache.get_datasource(1, &user(10, 1), false).await.unwrap();
        cache.purge_expired();
        assert_eq!(cache.entry_count(), 1);
    }
}
