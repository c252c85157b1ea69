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

//! Position and address payloads carried from providers to sessions.

use crate::accuracy::AccuracyLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

/// Mean Earth radius in kilometers used by the haversine distance.
const EARTH_RADIUS_KM: f64 = 6372.795;

/// A position fix. Optional fields are absent rather than sentinel-valued.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    /// Accuracy radius in meters.
    pub accuracy: f64,
    /// Meters per second.
    pub speed: Option<f64>,
    /// Degrees clockwise from true north.
    pub heading: Option<f64>,
    pub timestamp: SystemTime,
    pub description: Option<String>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            accuracy,
            speed: None,
            heading: None,
            timestamp: SystemTime::now(),
            description: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &Location) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c * 1_000.0
    }

    /// Absolute time between two fixes. Clock skew in either direction counts.
    pub fn elapsed_since(&self, earlier: &Location) -> Duration {
        match self.timestamp.duration_since(earlier.timestamp) {
            Ok(elapsed) => elapsed,
            Err(err) => err.duration(),
        }
    }

    pub fn accuracy_level(&self) -> AccuracyLevel {
        AccuracyLevel::from_radius(self.accuracy)
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && self.accuracy.is_finite()
            && self.accuracy >= 0.0
    }
}

/// A civic address estimate.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Address {
    pub timestamp: SystemTime,
    pub fields: BTreeMap<String, String>,
    /// Accuracy radius in meters.
    pub accuracy: f64,
}

impl Address {
    pub fn new(fields: BTreeMap<String, String>, accuracy: f64) -> Self {
        Self {
            timestamp: SystemTime::now(),
            fields,
            accuracy,
        }
    }
}
