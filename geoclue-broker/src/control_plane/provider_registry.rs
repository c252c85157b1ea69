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

//! Provider record storage, live state and candidate ranking.
//!
//! Records live in an arena indexed by [`ProviderId`]; ids are handed out in registration
//! order and never reused, so comparing ids is the registration-order tie-break. The
//! ranking by max accuracy is cached and rebuilt only when a record is inserted or
//! removed, or when its max accuracy changes. Usability is filtered at query time, so a
//! status flip never reorders anything.

use crate::accuracy::{AccuracyClass, AccuracyLevel, Interface, ProvideFlags, ResourceFlags};
use crate::control_plane::descriptor::{DescriptorSource, ProviderDescriptor};
use crate::data_plane::subscription::{
    SharedSubscribers, SubscriberKey, SubscriberSet, Subscription,
};
use crate::location::{Address, Location};
use crate::observability::events;
use crate::sources::location_source::{LocationSource, ProviderStatus, SourceSink};
use crate::sources::source_registry::SourceLease;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, PoisonError};
use tracing::{debug, info, warn};

const COMPONENT: &str = "provider_registry";

/// Arena index of a provider record.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ProviderId(usize);

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "provider-{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RegistryError {
    DuplicateName(String),
    UnknownProvider(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateName(name) => {
                write!(f, "a provider named {} is already registered", name)
            }
            RegistryError::UnknownProvider(name) => write!(f, "no provider named {}", name),
        }
    }
}

impl Error for RegistryError {}

/// Requirements a session brings to a selection pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SelectionRequest {
    pub min_accuracy: AccuracyLevel,
    pub require_updates: bool,
    pub allowed_resources: ResourceFlags,
}

/// Outcome of [`ProviderRegistry::set_status`] when the status actually changed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatusTransition {
    pub previous: ProviderStatus,
    pub current: ProviderStatus,
}

impl StatusTransition {
    /// `true` when the change crossed the Available/non-Available boundary.
    pub fn crossed_usable(&self) -> bool {
        self.previous.is_usable() != self.current.is_usable()
    }
}

/// How the record holds its source: directly, or through a shared lease.
enum SourceBinding {
    Owned(Arc<dyn LocationSource>),
    Leased(SourceLease),
}

impl SourceBinding {
    fn source(&self) -> Arc<dyn LocationSource> {
        match self {
            SourceBinding::Owned(source) => source.clone(),
            SourceBinding::Leased(lease) => lease.source(),
        }
    }
}

/// The registry's model of one provider.
pub struct ProviderRecord {
    id: ProviderId,
    descriptor: ProviderDescriptor,
    status: ProviderStatus,
    max_accuracy: AccuracyLevel,
    last_position: Option<Location>,
    last_address: Option<Address>,
    retiring: bool,
    binding: Option<SourceBinding>,
    subscribers: SharedSubscribers,
}

impl ProviderRecord {
    fn new(id: ProviderId, descriptor: ProviderDescriptor) -> Self {
        Self {
            id,
            status: ProviderStatus::Unknown,
            max_accuracy: descriptor.accuracy.unwrap_or(AccuracyLevel::None),
            last_position: None,
            last_address: None,
            retiring: false,
            binding: None,
            subscribers: SubscriberSet::new(descriptor.name.clone()),
            descriptor,
        }
    }

    pub fn id(&self) -> ProviderId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    pub fn status(&self) -> ProviderStatus {
        self.status
    }

    pub fn max_accuracy(&self) -> AccuracyLevel {
        self.max_accuracy
    }

    pub fn last_position(&self) -> Option<&Location> {
        self.last_position.as_ref()
    }

    pub fn last_address(&self) -> Option<&Address> {
        self.last_address.as_ref()
    }

    pub fn source(&self) -> Option<Arc<dyn LocationSource>> {
        self.binding.as_ref().map(SourceBinding::source)
    }

    pub fn subscriber_keys(&self) -> Vec<SubscriberKey> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
    }

    pub fn is_usable(&self) -> bool {
        self.status.is_usable() && !self.retiring
    }

    /// The accuracy class this provider offers in the current pass.
    pub fn accuracy_class(&self) -> Option<AccuracyClass> {
        self.descriptor.provides.declared_class().or_else(|| {
            match self.max_accuracy {
                AccuracyLevel::None => None,
                level if level >= AccuracyLevel::Street => Some(AccuracyClass::Detailed),
                _ => Some(AccuracyClass::Fuzzy),
            }
        })
    }

    /// Whether this record is admissible for `interface` under `request`.
    pub fn admits(&self, interface: Interface, request: &SelectionRequest) -> bool {
        if !self.is_usable() || !self.descriptor.interfaces.contains(interface) {
            return false;
        }
        if !self
            .descriptor
            .requires
            .is_subset_of(request.allowed_resources)
        {
            return false;
        }
        if request.require_updates
            && !self
                .descriptor
                .provides
                .contains(ProvideFlags::PUSHES_UPDATES)
        {
            return false;
        }
        if self.max_accuracy < request.min_accuracy {
            return false;
        }
        match request.min_accuracy.required_class() {
            None => true,
            Some(required) => self
                .accuracy_class()
                .is_some_and(|offered| offered >= required),
        }
    }
}

/// Owner of every [`ProviderRecord`].
#[derive(Default)]
pub struct ProviderRegistry {
    records: Vec<Option<ProviderRecord>>,
    by_name: HashMap<String, ProviderId>,
    ranking: Vec<ProviderId>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and inserts every descriptor; malformed or duplicate entries are logged
    /// and skipped.
    pub fn load<I>(&mut self, sources: I) -> Vec<ProviderId>
    where
        I: IntoIterator<Item = DescriptorSource>,
    {
        let mut loaded = Vec::new();
        for source in sources {
            let descriptor = match ProviderDescriptor::parse(&source.text) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    warn!(
                        event = events::PROVIDER_LOAD_SKIPPED,
                        component = COMPONENT,
                        origin = %source.origin,
                        err = %err,
                        "skipping malformed provider descriptor"
                    );
                    continue;
                }
            };
            match self.insert(descriptor) {
                Ok(id) => {
                    info!(
                        event = events::PROVIDER_LOAD_OK,
                        component = COMPONENT,
                        origin = %source.origin,
                        provider = %self.name_of(id).unwrap_or_default(),
                        "provider descriptor loaded"
                    );
                    loaded.push(id);
                }
                Err(err) => warn!(
                    event = events::PROVIDER_LOAD_SKIPPED,
                    component = COMPONENT,
                    origin = %source.origin,
                    err = %err,
                    "skipping provider descriptor"
                ),
            }
        }
        loaded
    }

    pub fn insert(&mut self, descriptor: ProviderDescriptor) -> Result<ProviderId, RegistryError> {
        if self.by_name.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateName(descriptor.name));
        }
        let id = ProviderId(self.records.len());
        self.by_name.insert(descriptor.name.clone(), id);
        self.records.push(Some(ProviderRecord::new(id, descriptor)));
        self.rebuild_ranking();
        Ok(id)
    }

    /// Binds a source the record owns exclusively.
    pub fn bind(
        &mut self,
        id: ProviderId,
        source: Arc<dyn LocationSource>,
        sink: SourceSink,
    ) -> Option<StatusTransition> {
        self.bind_with(id, SourceBinding::Owned(source), sink)
    }

    /// Binds a shared source obtained from a [`SourceRegistry`](crate::sources::source_registry::SourceRegistry).
    pub fn bind_lease(
        &mut self,
        id: ProviderId,
        lease: SourceLease,
        sink: SourceSink,
    ) -> Option<StatusTransition> {
        self.bind_with(id, SourceBinding::Leased(lease), sink)
    }

    /// Attaches the sink and adopts the source's current status and accuracy.
    ///
    /// Positions are not copied here: the source pushes them once it is started.
    fn bind_with(
        &mut self,
        id: ProviderId,
        binding: SourceBinding,
        sink: SourceSink,
    ) -> Option<StatusTransition> {
        self.get(id)?;
        let source = binding.source();
        source.attach(sink);
        let status = source.status();
        let accuracy = source.available_accuracy();
        {
            let record = self.get_mut(id)?;
            record
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .set_source(source.clone());
            record.binding = Some(binding);
            info!(
                event = events::PROVIDER_BIND,
                component = COMPONENT,
                provider = %record.descriptor.name,
                source = %source.name(),
                status = %status,
                accuracy = %accuracy,
                "source bound to provider"
            );
        }
        if accuracy > AccuracyLevel::None {
            self.set_accuracy(id, accuracy);
        }
        self.set_status(id, status)
    }

    pub fn get(&self, id: ProviderId) -> Option<&ProviderRecord> {
        self.records.get(id.0).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: ProviderId) -> Option<&mut ProviderRecord> {
        self.records.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn id_of(&self, name: &str) -> Option<ProviderId> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: ProviderId) -> Option<String> {
        self.get(id).map(|record| record.name().to_string())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ProviderRecord> + '_ {
        self.records.iter().flatten()
    }

    /// Admissible providers for `interface`, best first.
    pub fn candidates(&self, interface: Interface, request: &SelectionRequest) -> Vec<ProviderId> {
        self.ranking
            .iter()
            .copied()
            .filter(|id| {
                self.get(*id)
                    .is_some_and(|record| record.admits(interface, request))
            })
            .collect()
    }

    pub fn best(&self, interface: Interface, request: &SelectionRequest) -> Option<ProviderId> {
        self.ranking.iter().copied().find(|id| {
            self.get(*id)
                .is_some_and(|record| record.admits(interface, request))
        })
    }

    pub fn set_status(&mut self, id: ProviderId, status: ProviderStatus) -> Option<StatusTransition> {
        let record = self.get_mut(id)?;
        if record.status == status {
            return None;
        }
        let transition = StatusTransition {
            previous: record.status,
            current: status,
        };
        record.status = status;
        debug!(
            event = events::PROVIDER_STATUS_CHANGED,
            component = COMPONENT,
            provider = %record.descriptor.name,
            previous = %transition.previous,
            current = %transition.current,
            crossed_usable = transition.crossed_usable(),
            "provider status changed"
        );
        Some(transition)
    }

    /// Records a new max accuracy; returns `true` if it changed.
    pub fn set_accuracy(&mut self, id: ProviderId, accuracy: AccuracyLevel) -> bool {
        let Some(record) = self.get_mut(id) else {
            return false;
        };
        if record.max_accuracy == accuracy {
            return false;
        }
        debug!(
            event = events::PROVIDER_ACCURACY_CHANGED,
            component = COMPONENT,
            provider = %record.descriptor.name,
            previous = %record.max_accuracy,
            current = %accuracy,
            "provider accuracy changed"
        );
        record.max_accuracy = accuracy;
        self.rebuild_ranking();
        true
    }

    pub fn set_position(&mut self, id: ProviderId, location: Location) -> bool {
        match self.get_mut(id) {
            Some(record) => {
                record.last_position = Some(location);
                true
            }
            None => false,
        }
    }

    pub fn set_address(&mut self, id: ProviderId, address: Address) -> bool {
        match self.get_mut(id) {
            Some(record) => {
                record.last_address = Some(address);
                true
            }
            None => false,
        }
    }

    /// Excludes the record from every candidate list ahead of its removal.
    pub fn mark_retiring(&mut self, id: ProviderId) -> bool {
        match self.get_mut(id) {
            Some(record) => {
                record.retiring = true;
                true
            }
            None => false,
        }
    }

    /// Removes and returns the record; dropping it releases its source binding.
    pub fn remove(&mut self, id: ProviderId) -> Option<ProviderRecord> {
        let record = self.records.get_mut(id.0)?.take()?;
        self.by_name.remove(record.name());
        self.rebuild_ranking();
        let remaining = record
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        if remaining > 0 {
            warn!(
                event = events::PROVIDER_REMOVE,
                component = COMPONENT,
                provider = %record.name(),
                remaining,
                "removing provider that still has subscribers"
            );
        } else {
            info!(
                event = events::PROVIDER_REMOVE,
                component = COMPONENT,
                provider = %record.name(),
                "provider removed"
            );
        }
        Some(record)
    }

    /// Subscribes `key` to the record's events, activating its source.
    pub fn subscribe(
        &self,
        id: ProviderId,
        key: SubscriberKey,
        accuracy: AccuracyLevel,
    ) -> Option<Subscription> {
        let record = self.get(id)?;
        Some(SubscriberSet::subscribe(&record.subscribers, key, accuracy))
    }

    fn rebuild_ranking(&mut self) {
        let mut ranking: Vec<(AccuracyLevel, ProviderId)> = self
            .records()
            .map(|record| (record.max_accuracy, record.id))
            .collect();
        // Ids increase with registration order, so a stable sort keeps earlier ones first.
        ranking.sort_by(|a, b| b.0.cmp(&a.0));
        self.ranking = ranking.into_iter().map(|(_, id)| id).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::{ProviderRegistry, RegistryError, SelectionRequest};
    use crate::accuracy::{AccuracyLevel, Interface, InterfaceSet, ProvideFlags, ResourceFlags};
    use crate::control_plane::descriptor::{DescriptorSource, ProviderDescriptor};
    use crate::sources::location_source::ProviderStatus;

    fn request(min_accuracy: AccuracyLevel) -> SelectionRequest {
        SelectionRequest {
            min_accuracy,
            require_updates: false,
            allowed_resources: ResourceFlags::ALL,
        }
    }

    fn available(
        registry: &mut ProviderRegistry,
        descriptor: ProviderDescriptor,
    ) -> super::ProviderId {
        let id = registry.insert(descriptor).expect("insert should succeed");
        registry.set_status(id, ProviderStatus::Available);
        id
    }

    #[test]
    fn best_prefers_accuracy_then_registration_order() {
        let mut registry = ProviderRegistry::new();
        let ip = available(
            &mut registry,
            ProviderDescriptor::new("ip").with_accuracy(AccuracyLevel::City),
        );
        let first_gps = available(
            &mut registry,
            ProviderDescriptor::new("gps-a").with_accuracy(AccuracyLevel::Exact),
        );
        let second_gps = available(
            &mut registry,
            ProviderDescriptor::new("gps-b").with_accuracy(AccuracyLevel::Exact),
        );

        assert_eq!(
            registry.candidates(Interface::Position, &request(AccuracyLevel::Country)),
            vec![first_gps, second_gps, ip]
        );
        assert_eq!(
            registry.best(Interface::Position, &request(AccuracyLevel::Country)),
            Some(first_gps)
        );
    }

    #[test]
    fn adding_a_worse_provider_keeps_the_best() {
        let mut registry = ProviderRegistry::new();
        let gps = available(
            &mut registry,
            ProviderDescriptor::new("gps").with_accuracy(AccuracyLevel::Exact),
        );
        available(
            &mut registry,
            ProviderDescriptor::new("ip").with_accuracy(AccuracyLevel::Country),
        );

        assert_eq!(
            registry.best(Interface::Position, &request(AccuracyLevel::Country)),
            Some(gps)
        );
    }

    #[test]
    fn resources_updates_and_interfaces_filter_candidates() {
        let mut registry = ProviderRegistry::new();
        let gps = available(
            &mut registry,
            ProviderDescriptor::new("gps")
                .with_requires(ResourceFlags::GPS)
                .with_provides(ProvideFlags::PUSHES_UPDATES)
                .with_accuracy(AccuracyLevel::Exact),
        );
        let geonames = available(
            &mut registry,
            ProviderDescriptor::new("geonames")
                .with_requires(ResourceFlags::NETWORK)
                .with_interfaces(InterfaceSet::from_iter([Interface::Address]))
                .with_accuracy(AccuracyLevel::Street),
        );

        let mut no_gps = request(AccuracyLevel::City);
        no_gps.allowed_resources = ResourceFlags::NETWORK;
        assert!(registry.candidates(Interface::Position, &no_gps).is_empty());
        assert_eq!(registry.best(Interface::Address, &no_gps), Some(geonames));

        let mut updates = request(AccuracyLevel::City);
        updates.require_updates = true;
        assert_eq!(registry.candidates(Interface::Position, &updates), vec![gps]);
        assert!(registry.candidates(Interface::Address, &updates).is_empty());
    }

    #[test]
    fn accuracy_class_gates_street_and_exact_requests() {
        let mut registry = ProviderRegistry::new();
        let fuzzy = available(
            &mut registry,
            ProviderDescriptor::new("fuzzy")
                .with_provides(ProvideFlags::FUZZY_ACCURACY)
                .with_accuracy(AccuracyLevel::Exact),
        );
        let both = available(
            &mut registry,
            ProviderDescriptor::new("both")
                .with_provides(ProvideFlags::FUZZY_ACCURACY | ProvideFlags::DETAILED_ACCURACY)
                .with_accuracy(AccuracyLevel::Street),
        );
        let derived = available(
            &mut registry,
            ProviderDescriptor::new("derived").with_accuracy(AccuracyLevel::Neighborhood),
        );

        assert_eq!(
            registry.candidates(Interface::Position, &request(AccuracyLevel::Street)),
            vec![both]
        );
        assert_eq!(
            registry.candidates(Interface::Position, &request(AccuracyLevel::City)),
            vec![fuzzy, both, derived]
        );
    }

    #[test]
    fn unusable_and_retiring_records_are_excluded_but_kept() {
        let mut registry = ProviderRegistry::new();
        let gps = available(
            &mut registry,
            ProviderDescriptor::new("gps").with_accuracy(AccuracyLevel::Exact),
        );
        let ip = available(
            &mut registry,
            ProviderDescriptor::new("ip").with_accuracy(AccuracyLevel::City),
        );

        let transition = registry
            .set_status(gps, ProviderStatus::Error)
            .expect("status should change");
        assert!(transition.crossed_usable());
        assert_eq!(registry.best(Interface::Position, &request(AccuracyLevel::City)), Some(ip));
        assert!(registry.get(gps).is_some());
        assert!(registry.set_status(gps, ProviderStatus::Error).is_none());

        registry.set_status(gps, ProviderStatus::Available);
        registry.mark_retiring(gps);
        assert_eq!(registry.best(Interface::Position, &request(AccuracyLevel::City)), Some(ip));
        assert!(registry.remove(gps).is_some());
        assert_eq!(registry.id_of("gps"), None);
        assert!(registry.remove(gps).is_none());
    }

    #[test]
    fn accuracy_change_reorders_ranking() {
        let mut registry = ProviderRegistry::new();
        let a = available(
            &mut registry,
            ProviderDescriptor::new("a").with_accuracy(AccuracyLevel::City),
        );
        let b = available(
            &mut registry,
            ProviderDescriptor::new("b").with_accuracy(AccuracyLevel::Street),
        );
        assert_eq!(registry.best(Interface::Position, &request(AccuracyLevel::City)), Some(b));

        assert!(registry.set_accuracy(a, AccuracyLevel::Exact));
        assert!(!registry.set_accuracy(a, AccuracyLevel::Exact));
        assert_eq!(registry.best(Interface::Position, &request(AccuracyLevel::City)), Some(a));
    }

    #[test]
    fn load_skips_bad_entries_and_duplicates() {
        let good = "[Geoclue Provider]\nName=Hostip\nService=s\nPath=/p\nInterfaces=Position\n";
        let mut registry = ProviderRegistry::new();
        let loaded = registry.load([
            DescriptorSource::new("hostip.provider", good),
            DescriptorSource::new("broken.provider", "[Geoclue Provider]\nName=Broken\n"),
            DescriptorSource::new("again.provider", good),
        ]);

        assert_eq!(loaded.len(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.insert(ProviderDescriptor::new("Hostip")),
            Err(RegistryError::DuplicateName("Hostip".into()))
        );
    }
}
