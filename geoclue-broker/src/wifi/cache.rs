/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Fingerprint-keyed cache of resolved Wi-Fi locations.
//!
//! The cache is unbounded in entry count. It stays small through the periodic prune
//! sweep and the low-memory handlers: `prune` on moderate pressure, `clear` on critical.
//! Every method takes `now` explicitly so callers drive it from the runtime clock.

use crate::location::Location;
use crate::wifi::fingerprint::Fingerprint;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

struct CacheEntry {
    location: Location,
    fetched_at: Instant,
}

pub struct WifiCache {
    entries: HashMap<Fingerprint, CacheEntry>,
    max_age: Duration,
}

impl WifiCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_age,
        }
    }

    /// Returns a copy of a non-expired entry, re-stamped with the current wall-clock time.
    pub fn lookup(&self, fingerprint: &Fingerprint, now: Instant) -> Option<Location> {
        let entry = self.entries.get(fingerprint)?;
        if self.is_expired(entry, now) {
            return None;
        }
        Some(entry.location.clone().with_timestamp(SystemTime::now()))
    }

    pub fn insert(&mut self, fingerprint: Fingerprint, location: Location, now: Instant) {
        self.entries.insert(
            fingerprint,
            CacheEntry {
                location,
                fetched_at: now,
            },
        );
    }

    /// Drops entries older than the max age; returns how many were removed.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let max_age = self.max_age;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.fetched_at) < max_age);
        before - self.entries.len()
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.fetched_at) >= self.max_age
    }
}

#[cfg(test)]
mod tests {
    use super::WifiCache;
    use crate::location::Location;
    use crate::wifi::access_point::AccessPoint;
    use crate::wifi::fingerprint::Fingerprint;
    use std::time::{Duration, SystemTime};
    use tokio::time::Instant;

    const MAX_AGE: Duration = Duration::from_secs(48 * 60 * 60);

    fn fingerprint(bssids: &[&str]) -> Fingerprint {
        let aps: Vec<AccessPoint> = bssids
            .iter()
            .map(|bssid| AccessPoint::new(*bssid, -60))
            .collect();
        Fingerprint::from_access_points(&aps, 10)
    }

    #[test]
    fn hit_returns_copy_with_fresh_timestamp() {
        let mut cache = WifiCache::new(MAX_AGE);
        let now = Instant::now();
        let stale_stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(5);
        cache.insert(
            fingerprint(&["a", "b"]),
            Location::new(1.0, 2.0, 40.0).with_timestamp(stale_stamp),
            now,
        );

        let hit = cache
            .lookup(&fingerprint(&["b", "a"]), now + Duration::from_secs(60))
            .expect("entry should be cached");
        assert_eq!(hit.latitude, 1.0);
        assert!(hit.timestamp > stale_stamp);
        assert!(cache.lookup(&fingerprint(&["a"]), now).is_none());
    }

    #[test]
    fn entries_expire_at_max_age() {
        let mut cache = WifiCache::new(MAX_AGE);
        let now = Instant::now();
        cache.insert(fingerprint(&["a"]), Location::new(0.0, 0.0, 1.0), now);

        assert!(cache
            .lookup(&fingerprint(&["a"]), now + MAX_AGE - Duration::from_secs(1))
            .is_some());
        assert!(cache.lookup(&fingerprint(&["a"]), now + MAX_AGE).is_none());
    }

    #[test]
    fn prune_removes_only_expired_entries() {
        let mut cache = WifiCache::new(MAX_AGE);
        let start = Instant::now();
        cache.insert(fingerprint(&["old"]), Location::new(0.0, 0.0, 1.0), start);
        cache.insert(
            fingerprint(&["new"]),
            Location::new(0.0, 0.0, 1.0),
            start + Duration::from_secs(40 * 60 * 60),
        );

        assert_eq!(cache.prune(start + MAX_AGE), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.clear(), 1);
        assert!(cache.is_empty());
    }
}
