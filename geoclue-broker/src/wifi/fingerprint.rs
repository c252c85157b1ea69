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

//! Order-independent radio-environment signature used as the cache key.

use crate::wifi::access_point::AccessPoint;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

/// Sorted `(bssid, signal bucket)` pairs.
///
/// Bucketing the signal absorbs RSSI jitter so a stationary device keeps hitting the
/// same cache entry.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Fingerprint(Vec<(String, i32)>);

impl Fingerprint {
    pub fn from_access_points<'a, I>(access_points: I, bucket_dbm: i32) -> Self
    where
        I: IntoIterator<Item = &'a AccessPoint>,
    {
        let bucket_dbm = bucket_dbm.max(1);
        let entries: BTreeMap<String, i32> = access_points
            .into_iter()
            .map(|ap| {
                (
                    ap.bssid.to_ascii_lowercase(),
                    ap.signal_dbm.div_euclid(bucket_dbm),
                )
            })
            .collect();
        Fingerprint(entries.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        write!(f, "{:016x}/{}", hasher.finish(), self.0.len())
    }
}
