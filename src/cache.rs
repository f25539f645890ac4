use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

/// How long a list snapshot stays servable without touching the store.
pub const CACHE_TTL_MINUTES: i64 = 5;

/// One cached collection snapshot. An empty snapshot is never treated as
/// fresh, so a workspace that was empty at first load picks up new rows
/// immediately.
#[derive(Debug, Default)]
pub struct CachedList {
    items: Vec<Value>,
    loaded_at: Option<DateTime<Utc>>,
}

impl CachedList {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        !self.items.is_empty()
            && self
                .loaded_at
                .is_some_and(|t| now - t < Duration::minutes(CACHE_TTL_MINUTES))
    }

    /// Serves the snapshot when fresh, otherwise reloads through `load`.
    /// The bool is true when the response came from cache.
    pub fn get<E, F>(&mut self, force: bool, now: DateTime<Utc>, load: F) -> Result<(Vec<Value>, bool), E>
    where
        F: FnOnce() -> Result<Vec<Value>, E>,
    {
        if !force && self.is_fresh(now) {
            return Ok((self.items.clone(), true));
        }
        self.items = load()?;
        self.loaded_at = Some(now);
        Ok((self.items.clone(), false))
    }

    pub fn invalidate(&mut self) {
        self.loaded_at = None;
    }
}

/// The one data-access layer for list views: halls, admins and exams
/// snapshots with time-boxed expiry and per-collection invalidation on
/// every mutation.
#[derive(Debug, Default)]
pub struct DataCache {
    pub halls: CachedList,
    pub admins: CachedList,
    pub exams: CachedList,
}

impl DataCache {
    pub fn clear(&mut self) {
        self.halls.invalidate();
        self.admins.invalidate();
        self.exams.invalidate();
    }
}
