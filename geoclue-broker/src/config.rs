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

//! Tunables for the broker and the Wi-Fi source.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    /// Buffered events per session before slow receivers start lagging.
    pub session_event_capacity: usize,
    pub wifi: WifiConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            session_event_capacity: 64,
            wifi: WifiConfig::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WifiConfig {
    /// Scan interval while any consumer wants street-level accuracy or better.
    pub scan_interval_detailed_s: u64,
    /// Scan interval while consumers want city-level accuracy or coarser.
    pub scan_interval_coarse_s: u64,
    /// Quiet period after the last AP change before a refresh runs.
    pub settle_delay_ms: u64,
    pub cache_max_age_s: u64,
    /// Access points at or below this signal are left out of fingerprints and queries.
    pub noise_floor_dbm: i32,
    pub signal_bucket_dbm: i32,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            scan_interval_detailed_s: 10,
            scan_interval_coarse_s: 300,
            settle_delay_ms: 1_000,
            cache_max_age_s: 48 * 60 * 60,
            noise_floor_dbm: -90,
            signal_bucket_dbm: 10,
        }
    }
}

impl WifiConfig {
    pub fn scan_interval_detailed(&self) -> Duration {
        Duration::from_secs(self.scan_interval_detailed_s)
    }

    pub fn scan_interval_coarse(&self) -> Duration {
        Duration::from_secs(self.scan_interval_coarse_s)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_s)
    }

    /// Half the max age, so no entry outlives its nominal age by more than one sweep gap.
    pub fn prune_interval(&self) -> Duration {
        (self.cache_max_age() / 2).max(Duration::from_secs(1))
    }
}
