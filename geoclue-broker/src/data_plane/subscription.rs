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

//! Session-to-provider subscriptions and source activation lifecycle.
//!
//! Each provider record owns a [`SubscriberSet`]. A session selecting the provider
//! receives a [`Subscription`] guard: creating it starts the bound source and raises the
//! demanded accuracy, dropping it removes the entry, stops the source once and lowers
//! the demand again. The guard only holds a weak reference, so a record torn down first
//! never keeps its subscriber set alive.

use crate::accuracy::{AccuracyLevel, Interface};
use crate::control_plane::session_manager::SessionId;
use crate::observability::{events, fields};
use crate::sources::location_source::{Activation, Deactivation, LocationSource};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, warn};

const COMPONENT: &str = "subscription";

/// One session's interest in one interface of a provider.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SubscriberKey {
    pub session: SessionId,
    pub interface: Interface,
}

/// The subscribers of one provider record plus the source they activate.
pub struct SubscriberSet {
    provider: String,
    source: Option<Arc<dyn LocationSource>>,
    entries: BTreeMap<SubscriberKey, AccuracyLevel>,
}

pub type SharedSubscribers = Arc<Mutex<SubscriberSet>>;

impl SubscriberSet {
    pub fn new(provider: impl Into<String>) -> SharedSubscribers {
        Arc::new(Mutex::new(Self {
            provider: provider.into(),
            source: None,
            entries: BTreeMap::new(),
        }))
    }

    pub fn set_source(&mut self, source: Arc<dyn LocationSource>) {
        self.source = Some(source);
    }

    pub fn keys(&self) -> Vec<SubscriberKey> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest accuracy any current subscriber asks for.
    pub fn demand(&self) -> AccuracyLevel {
        self.entries
            .values()
            .copied()
            .max()
            .unwrap_or(AccuracyLevel::None)
    }

    /// Registers `key` and activates the source; the returned guard undoes both.
    pub fn subscribe(
        set: &SharedSubscribers,
        key: SubscriberKey,
        accuracy: AccuracyLevel,
    ) -> Subscription {
        let mut subscribers = set.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.entries.insert(key, accuracy);
        let started = subscribers.start_source(key);
        subscribers.publish_demand();

        Subscription {
            key,
            started,
            subscribers: Arc::downgrade(set),
        }
    }

    fn start_source(&self, key: SubscriberKey) -> bool {
        let Some(source) = &self.source else {
            return false;
        };
        match source.start() {
            Ok(activation) => {
                debug!(
                    event = events::SOURCE_START_OK,
                    component = COMPONENT,
                    provider = %self.provider,
                    session = %key.session,
                    interface = %key.interface,
                    first_consumer = activation == Activation::Started,
                    "source activated for subscriber"
                );
                true
            }
            Err(err) => {
                warn!(
                    event = events::SOURCE_START_FAILED,
                    component = COMPONENT,
                    provider = %self.provider,
                    session = %key.session,
                    interface = %key.interface,
                    err = %err,
                    "source failed to start; subscriber will only see pushed values"
                );
                false
            }
        }
    }

    fn stop_source(&self, key: SubscriberKey) {
        let Some(source) = &self.source else {
            return;
        };
        match source.stop() {
            Ok(deactivation) => debug!(
                event = events::SOURCE_STOP_OK,
                component = COMPONENT,
                provider = %self.provider,
                session = %key.session,
                interface = %key.interface,
                last_consumer = deactivation == Deactivation::Stopped,
                "source released by subscriber"
            ),
            Err(err) => warn!(
                event = events::SOURCE_STOP_FAILED,
                component = COMPONENT,
                provider = %self.provider,
                session = %key.session,
                interface = %key.interface,
                err = %err,
                "source refused stop"
            ),
        }
    }

    fn publish_demand(&self) {
        if let Some(source) = &self.source {
            source.set_required_accuracy(self.demand());
        }
    }
}

/// RAII guard for one entry in a [`SubscriberSet`].
pub struct Subscription {
    key: SubscriberKey,
    started: bool,
    subscribers: Weak<Mutex<SubscriberSet>>,
}

impl Subscription {
    pub fn key(&self) -> SubscriberKey {
        self.key
    }

    /// Updates the accuracy this subscriber demands from the source.
    pub fn set_accuracy(&self, accuracy: AccuracyLevel) {
        let Some(set) = self.subscribers.upgrade() else {
            return;
        };
        let mut subscribers = set.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = subscribers.entries.get_mut(&self.key) {
            if *entry != accuracy {
                *entry = accuracy;
                subscribers.publish_demand();
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(set) = self.subscribers.upgrade() else {
            debug!(
                component = COMPONENT,
                session = %self.key.session,
                interface = %self.key.interface,
                reason = fields::REASON_PROVIDER_REMOVED,
                "subscriber set already gone"
            );
            return;
        };
        let mut subscribers = set.lock().unwrap_or_else(PoisonError::into_inner);
        if subscribers.entries.remove(&self.key).is_none() {
            return;
        }
        if self.started {
            subscribers.stop_source(self.key);
        }
        subscribers.publish_demand();
    }
}
