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

//! Access-point model and the scanning collaborator interface.

use async_trait::async_trait;
use std::fmt;
use std::fmt::{Display, Formatter};

/// One visible access point.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct AccessPoint {
    /// Hardware address; the identity used for fingerprints.
    pub bssid: String,
    pub ssid: Option<String>,
    pub signal_dbm: i32,
    pub frequency_mhz: Option<u32>,
}

impl AccessPoint {
    pub fn new(bssid: impl Into<String>, signal_dbm: i32) -> Self {
        Self {
            bssid: bssid.into(),
            ssid: None,
            signal_dbm,
            frequency_mhz: None,
        }
    }

    pub fn with_ssid(mut self, ssid: impl Into<String>) -> Self {
        self.ssid = Some(ssid.into());
        self
    }
}

/// Per-AP notifications the Wi-Fi backend pushes between full scans.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ApEvent {
    Added(AccessPoint),
    Removed { bssid: String },
    SignalChanged { bssid: String, signal_dbm: i32 },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScanError {
    DeviceUnavailable,
    Failed(String),
}

impl Display for ScanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::DeviceUnavailable => write!(f, "no Wi-Fi device available"),
            ScanError::Failed(reason) => write!(f, "scan failed: {}", reason),
        }
    }
}

impl std::error::Error for ScanError {}

/// External Wi-Fi backend (supplicant or network manager).
#[async_trait]
pub trait WifiScanner: Send + Sync {
    /// Performs one scan and returns every access point currently visible.
    async fn scan(&self) -> Result<Vec<AccessPoint>, ScanError>;
}
