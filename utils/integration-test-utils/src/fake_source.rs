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

use geoclue_broker::sources::location_source::{
    Activation, ActivationCounter, Deactivation, LocationSource, MemoryPressure, ProviderStatus,
    SinkSlot, SourceError, SourceEvent, SourceSink,
};
use geoclue_broker::{AccuracyLevel, Address, Location};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Scriptable [`LocationSource`] that counts activations.
///
/// The last pushed location is re-emitted whenever the source actually starts, the way
/// a real source reports a fix once it is running.
pub struct FakeSource {
    name: String,
    status: Mutex<ProviderStatus>,
    accuracy: Mutex<AccuracyLevel>,
    location: Mutex<Option<Location>>,
    address: Mutex<Option<Address>>,
    required_accuracy: Mutex<AccuracyLevel>,
    memory_signals: Mutex<Vec<MemoryPressure>>,
    activation: ActivationCounter,
    starts: AtomicUsize,
    stops: AtomicUsize,
    sink: SinkSlot,
}

impl FakeSource {
    pub fn new(name: &str, accuracy: AccuracyLevel) -> Self {
        Self {
            name: name.to_string(),
            status: Mutex::new(ProviderStatus::Available),
            accuracy: Mutex::new(accuracy),
            location: Mutex::new(None),
            address: Mutex::new(None),
            required_accuracy: Mutex::new(AccuracyLevel::None),
            memory_signals: Mutex::new(Vec::new()),
            activation: ActivationCounter::default(),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            sink: SinkSlot::default(),
        }
    }

    pub fn with_status(self, status: ProviderStatus) -> Self {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
        self
    }

    pub fn with_location(self, location: Location) -> Self {
        *self.location.lock().unwrap_or_else(PoisonError::into_inner) = Some(location);
        self
    }

    pub fn set_status(&self, status: ProviderStatus) {
        debug!("{}: status -> {status}", self.name);
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
        self.sink.emit(SourceEvent::StatusChanged(status));
    }

    pub fn set_accuracy(&self, accuracy: AccuracyLevel) {
        debug!("{}: accuracy -> {accuracy}", self.name);
        *self.accuracy.lock().unwrap_or_else(PoisonError::into_inner) = accuracy;
        self.sink.emit(SourceEvent::AccuracyChanged(accuracy));
    }

    /// Stores and emits a new fix, whether or not anyone is subscribed.
    pub fn push_location(&self, location: Location) {
        *self.location.lock().unwrap_or_else(PoisonError::into_inner) = Some(location.clone());
        self.sink.emit(SourceEvent::LocationChanged(location));
    }

    pub fn push_address(&self, address: Address) {
        *self.address.lock().unwrap_or_else(PoisonError::into_inner) = Some(address.clone());
        self.sink.emit(SourceEvent::AddressChanged(address));
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.activation.is_active()
    }

    pub fn required_accuracy(&self) -> AccuracyLevel {
        *self
            .required_accuracy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn memory_signals(&self) -> Vec<MemoryPressure> {
        self.memory_signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LocationSource for FakeSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&self, sink: SourceSink) {
        self.sink.attach(sink);
    }

    fn start(&self) -> Result<Activation, SourceError> {
        let activation = self.activation.acquire();
        if activation == Activation::Started {
            self.starts.fetch_add(1, Ordering::SeqCst);
            let location = self
                .location
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(location) = location {
                self.sink.emit(SourceEvent::LocationChanged(location));
            }
            let address = self
                .address
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(address) = address {
                self.sink.emit(SourceEvent::AddressChanged(address));
            }
        }
        Ok(activation)
    }

    fn stop(&self) -> Result<Deactivation, SourceError> {
        let deactivation = self.activation.release()?;
        if deactivation == Deactivation::Stopped {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
        Ok(deactivation)
    }

    fn available_accuracy(&self) -> AccuracyLevel {
        *self.accuracy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self) -> ProviderStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_location(&self) -> Option<Location> {
        self.location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn current_address(&self) -> Option<Address> {
        self.address
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_required_accuracy(&self, level: AccuracyLevel) {
        *self
            .required_accuracy
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = level;
    }

    fn on_memory_pressure(&self, level: MemoryPressure) {
        self.memory_signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(level);
    }
}
