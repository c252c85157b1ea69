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

//! Manually configured position.

use crate::accuracy::AccuracyLevel;
use crate::location::{Address, Location};
use crate::sources::location_source::{
    Activation, ActivationCounter, Deactivation, LocationSource, ProviderStatus, SinkSlot,
    SourceError, SourceEvent, SourceSink,
};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

/// A source that always reports one configured position (and optionally an address).
///
/// Each start re-emits the position with a fresh timestamp so newly selected sessions
/// receive a value even if they missed the initial one.
pub struct StaticSource {
    name: String,
    accuracy: AccuracyLevel,
    location: Mutex<Location>,
    address: Option<Address>,
    activation: ActivationCounter,
    sink: SinkSlot,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, location: Location, accuracy: AccuracyLevel) -> Self {
        Self {
            name: name.into(),
            accuracy,
            location: Mutex::new(location),
            address: None,
            activation: ActivationCounter::default(),
            sink: SinkSlot::default(),
        }
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    /// Replaces the configured position and pushes it to consumers when active.
    pub fn relocate(&self, location: Location) {
        *self.location.lock().unwrap_or_else(PoisonError::into_inner) = location.clone();
        if self.activation.is_active() {
            self.sink.emit(SourceEvent::LocationChanged(location));
        }
    }

    fn fresh_location(&self) -> Location {
        let mut location = self.location.lock().unwrap_or_else(PoisonError::into_inner);
        location.timestamp = SystemTime::now();
        location.clone()
    }
}

impl LocationSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&self, sink: SourceSink) {
        self.sink.attach(sink);
    }

    fn start(&self) -> Result<Activation, SourceError> {
        let activation = self.activation.acquire();
        if activation == Activation::Started {
            self.sink
                .emit(SourceEvent::LocationChanged(self.fresh_location()));
            if let Some(address) = &self.address {
                self.sink.emit(SourceEvent::AddressChanged(address.clone()));
            }
        }
        Ok(activation)
    }

    fn stop(&self) -> Result<Deactivation, SourceError> {
        self.activation.release()
    }

    fn available_accuracy(&self) -> AccuracyLevel {
        self.accuracy
    }

    fn status(&self) -> ProviderStatus {
        ProviderStatus::Available
    }

    fn current_location(&self) -> Option<Location> {
        Some(
            self.location
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        )
    }

    fn current_address(&self) -> Option<Address> {
        self.address.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::StaticSource;
    use crate::accuracy::AccuracyLevel;
    use crate::location::Location;
    use crate::sources::location_source::{
        Activation, Deactivation, LocationSource, SourceEvent, SourceSink,
    };
    use tokio::sync::mpsc;

    #[test]
    fn first_start_emits_configured_position() {
        let source = StaticSource::new(
            "manual",
            Location::new(52.52, 13.405, 50.0),
            AccuracyLevel::Street,
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        source.attach(SourceSink::from_channel(tx));

        assert_eq!(source.start(), Ok(Activation::Started));
        assert_eq!(source.start(), Ok(Activation::AlreadyActive));

        match rx.try_recv().expect("start should emit a location") {
            SourceEvent::LocationChanged(location) => assert_eq!(location.latitude, 52.52),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx.try_recv().is_err());

        assert_eq!(source.stop(), Ok(Deactivation::StillInUse));
        assert_eq!(source.stop(), Ok(Deactivation::Stopped));
    }

    #[test]
    fn relocate_only_pushes_while_active() {
        let source = StaticSource::new("manual", Location::new(0.0, 0.0, 5.0), AccuracyLevel::Exact);
        let (tx, mut rx) = mpsc::unbounded_channel();
        source.attach(SourceSink::from_channel(tx));

        source.relocate(Location::new(1.0, 1.0, 5.0));
        assert!(rx.try_recv().is_err());
        assert_eq!(
            source.current_location().map(|location| location.latitude),
            Some(1.0)
        );

        source.start().expect("start should succeed");
        let _ = rx.try_recv();
        source.relocate(Location::new(2.0, 2.0, 5.0));
        assert!(matches!(
            rx.try_recv(),
            Ok(SourceEvent::LocationChanged(location)) if location.latitude == 2.0
        ));
    }
}
