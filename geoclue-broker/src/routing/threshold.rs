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

//! Distance/time gating of relayed positions.

use crate::location::Location;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client-configured change-reporting thresholds. Zero disables a threshold.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    pub distance_m: u32,
    pub time_s: u32,
}

/// Everything that decides whether a new position reaches the client.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RelayThresholds {
    pub thresholds: Thresholds,
    pub min_update_interval: Duration,
}

impl RelayThresholds {
    /// `true` if `next` should be forwarded given the last forwarded value.
    ///
    /// Without a baseline the value always passes. Otherwise every configured threshold
    /// must be cleared.
    pub fn admits(&self, baseline: Option<&Location>, next: &Location) -> bool {
        let Some(last) = baseline else {
            return true;
        };
        let distance_m = self.thresholds.distance_m;
        if distance_m > 0 && last.distance_to(next) < f64::from(distance_m) {
            return false;
        }
        let elapsed = next.elapsed_since(last);
        let time_s = self.thresholds.time_s;
        if time_s > 0 && elapsed < Duration::from_secs(u64::from(time_s)) {
            return false;
        }
        if !self.min_update_interval.is_zero() && elapsed < self.min_update_interval {
            return false;
        }
        true
    }
}
