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

//! The capability interface every location backend implements.

use crate::accuracy::AccuracyLevel;
use crate::location::{Address, Location};
use crate::observability::events;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

const COMPONENT: &str = "location_source";

/// Live status a provider reports about itself.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    #[default]
    Unknown,
    Error,
    Unavailable,
    Acquiring,
    Available,
}

impl ProviderStatus {
    /// Only `Available` providers are candidates for selection.
    pub fn is_usable(self) -> bool {
        self == ProviderStatus::Available
    }
}

impl Display for ProviderStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderStatus::Unknown => "unknown",
            ProviderStatus::Error => "error",
            ProviderStatus::Unavailable => "unavailable",
            ProviderStatus::Acquiring => "acquiring",
            ProviderStatus::Available => "available",
        };
        f.write_str(name)
    }
}

/// Normalized change notifications a source pushes into the broker.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceEvent {
    StatusChanged(ProviderStatus),
    AccuracyChanged(AccuracyLevel),
    LocationChanged(Location),
    AddressChanged(Address),
}

/// Two-tier low-memory signal.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPressure {
    Moderate,
    Critical,
}

/// Outcome of a successful `start()`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Activation {
    /// First consumer; the source actually started.
    Started,
    /// Another consumer already holds the source active.
    AlreadyActive,
}

/// Outcome of a successful `stop()`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Deactivation {
    /// Last consumer released; the source actually stopped.
    Stopped,
    /// Other consumers still hold the source active.
    StillInUse,
}

/// Source-level failures.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SourceError {
    NotActive,
    StartFailed(String),
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::NotActive => write!(f, "source is not active"),
            SourceError::StartFailed(reason) => write!(f, "source failed to start: {}", reason),
        }
    }
}

impl std::error::Error for SourceError {}

/// Typed event sink handed to a source when it is bound to a provider record.
///
/// `emit` returns `false` once the receiving side is gone.
#[derive(Clone)]
pub struct SourceSink {
    deliver: Arc<dyn Fn(SourceEvent) -> bool + Send + Sync>,
}

impl SourceSink {
    pub fn new(deliver: impl Fn(SourceEvent) -> bool + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// A sink that forwards every event into an unbounded channel.
    pub fn from_channel(sender: UnboundedSender<SourceEvent>) -> Self {
        Self::new(move |event| sender.send(event).is_ok())
    }

    pub fn emit(&self, event: SourceEvent) -> bool {
        (self.deliver)(event)
    }

    fn same_sink(&self, other: &SourceSink) -> bool {
        Arc::ptr_eq(&self.deliver, &other.deliver)
    }

    pub fn status(&self, status: ProviderStatus) -> bool {
        self.emit(SourceEvent::StatusChanged(status))
    }

    pub fn accuracy(&self, level: AccuracyLevel) -> bool {
        self.emit(SourceEvent::AccuracyChanged(level))
    }

    pub fn location(&self, location: Location) -> bool {
        self.emit(SourceEvent::LocationChanged(location))
    }

    pub fn address(&self, address: Address) -> bool {
        self.emit(SourceEvent::AddressChanged(address))
    }
}

impl fmt::Debug for SourceSink {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("SourceSink")
    }
}

/// Fan-out of the sinks a source emits through.
///
/// A source shared through a lease may feed several provider records, so every
/// `attach` adds a sink. Events emitted before the first `attach` are dropped, and
/// sinks whose receiver is gone are pruned on the next emission.
#[derive(Debug, Default)]
pub struct SinkSlot {
    sinks: Mutex<Vec<SourceSink>>,
}

impl SinkSlot {
    pub fn attach(&self, sink: SourceSink) {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    /// Returns `true` if at least one sink accepted the event.
    pub fn emit(&self, event: SourceEvent) -> bool {
        let sinks = self
            .sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut delivered = false;
        let mut closed = Vec::new();
        for sink in sinks {
            if sink.emit(event.clone()) {
                delivered = true;
            } else {
                closed.push(sink);
            }
        }
        if !closed.is_empty() {
            debug!(
                event = events::SOURCE_SINK_CLOSED,
                component = COMPONENT,
                closed = closed.len(),
                "pruning closed source sinks"
            );
            self.sinks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|sink| !closed.iter().any(|dead| dead.same_sink(sink)));
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer refcount shared by every source implementation.
#[derive(Debug, Default)]
pub struct ActivationCounter {
    consumers: Mutex<usize>,
}

impl ActivationCounter {
    pub fn acquire(&self) -> Activation {
        let mut consumers = self.consumers.lock().unwrap_or_else(PoisonError::into_inner);
        *consumers += 1;
        if *consumers == 1 {
            Activation::Started
        } else {
            Activation::AlreadyActive
        }
    }

    pub fn release(&self) -> Result<Deactivation, SourceError> {
        let mut consumers = self.consumers.lock().unwrap_or_else(PoisonError::into_inner);
        if *consumers == 0 {
            return Err(SourceError::NotActive);
        }
        *consumers -= 1;
        if *consumers == 0 {
            Ok(Deactivation::Stopped)
        } else {
            Ok(Deactivation::StillInUse)
        }
    }

    pub fn consumers(&self) -> usize {
        *self.consumers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self) -> bool {
        self.consumers() > 0
    }
}

/// A backend that produces location estimates.
///
/// `start`/`stop` are refcounted: several consumers may share one source, and only the
/// last release really stops it. Change notifications flow through the [`SourceSink`]
/// handed over by [`LocationSource::attach`].
pub trait LocationSource: Send + Sync {
    fn name(&self) -> &str;

    fn attach(&self, sink: SourceSink);

    fn start(&self) -> Result<Activation, SourceError>;

    fn stop(&self) -> Result<Deactivation, SourceError>;

    fn available_accuracy(&self) -> AccuracyLevel;

    fn status(&self) -> ProviderStatus {
        if self.available_accuracy() > AccuracyLevel::None {
            ProviderStatus::Available
        } else {
            ProviderStatus::Unavailable
        }
    }

    fn current_location(&self) -> Option<Location>;

    fn current_address(&self) -> Option<Address> {
        None
    }

    /// Highest accuracy any current consumer asks for.
    fn set_required_accuracy(&self, _level: AccuracyLevel) {}

    fn on_memory_pressure(&self, _level: MemoryPressure) {}
}

#[cfg(test)]
mod tests {
    use super::{
        Activation, ActivationCounter, Deactivation, ProviderStatus, SinkSlot, SourceError,
        SourceSink,
    };
    use crate::accuracy::AccuracyLevel;
    use crate::sources::location_source::SourceEvent;
    use tokio::sync::mpsc;

    #[test]
    fn activation_counter_only_reports_edges() {
        let counter = ActivationCounter::default();

        assert_eq!(counter.release(), Err(SourceError::NotActive));
        assert_eq!(counter.acquire(), Activation::Started);
        assert_eq!(counter.acquire(), Activation::AlreadyActive);
        assert_eq!(counter.release(), Ok(Deactivation::StillInUse));
        assert!(counter.is_active());
        assert_eq!(counter.release(), Ok(Deactivation::Stopped));
        assert!(!counter.is_active());
    }

    #[test]
    fn sink_slot_drops_events_until_attached() {
        let slot = SinkSlot::default();
        assert!(!slot.emit(SourceEvent::AccuracyChanged(AccuracyLevel::City)));

        let (tx, mut rx) = mpsc::unbounded_channel();
        slot.attach(SourceSink::from_channel(tx));
        assert!(slot.emit(SourceEvent::AccuracyChanged(AccuracyLevel::City)));
        assert_eq!(
            rx.try_recv().expect("event should be queued"),
            SourceEvent::AccuracyChanged(AccuracyLevel::City)
        );

        drop(rx);
        assert!(!slot.emit(SourceEvent::AccuracyChanged(AccuracyLevel::Street)));
        assert!(slot.is_empty());
    }

    #[test]
    fn sink_slot_fans_out_to_every_attached_sink() {
        let slot = SinkSlot::default();
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();
        slot.attach(SourceSink::from_channel(first_tx));
        slot.attach(SourceSink::from_channel(second_tx));

        assert!(slot.emit(SourceEvent::StatusChanged(ProviderStatus::Available)));
        assert!(first_rx.try_recv().is_ok());
        assert!(second_rx.try_recv().is_ok());

        drop(first_rx);
        assert!(slot.emit(SourceEvent::StatusChanged(ProviderStatus::Error)));
        assert_eq!(slot.len(), 1);
        assert_eq!(
            second_rx.try_recv().expect("surviving sink should receive"),
            SourceEvent::StatusChanged(ProviderStatus::Error)
        );
    }
}
