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

//! Per-session provider selection and relay of provider values to clients.

use crate::accuracy::{AccuracyLevel, Interface};
use crate::control_plane::provider_registry::{ProviderId, ProviderRegistry};
use crate::control_plane::session_manager::{ClientSession, Selection, SessionManager};
use crate::data_plane::session_events::SessionEvent;
use crate::data_plane::subscription::SubscriberKey;
use crate::location::{Address, Location};
use crate::observability::{events, fields};
use crate::routing::reselection::reselect_reason;
use crate::sources::location_source::ProviderStatus;
use tracing::{debug, info, trace};

const COMPONENT: &str = "arbitration";

pub(crate) const REASON_STARTED: &str = "started";
pub(crate) const REASON_REQUIREMENTS: &str = "requirements_changed";
pub(crate) const REASON_ACCURACY_SWEEP: &str = "accuracy_sweep";
pub(crate) const REASON_INTERFACES: &str = "interfaces_changed";

/// Runs one selection pass for `interface`. Returns `true` if the selection changed.
///
/// A session running at effective accuracy `None` never holds a provider. On a change the old subscription is released before the new one is taken, the client
/// sees `ProviderChanged`, and the new provider's last known value is delivered at once.
pub(crate) fn reselect(
    registry: &ProviderRegistry,
    session: &mut ClientSession,
    interface: Interface,
    reason: &str,
) -> bool {
    let best = if session.effective_accuracy() == AccuracyLevel::None {
        None
    } else {
        registry.best(interface, &session.selection_request())
    };
    let current = session.selected_provider(interface);
    debug!(
        event = events::SESSION_RESELECT,
        component = COMPONENT,
        session = %session.id(),
        interface = %interface,
        reason,
        current = %fields::format_optional_name(current.and_then(|id| registry.get(id)).map(|r| r.name())),
        best = %fields::format_optional_name(best.and_then(|id| registry.get(id)).map(|r| r.name())),
        "selection pass"
    );
    if best == current {
        return false;
    }

    let old = session
        .take_selection(interface)
        .map(|selection| selection.provider);
    let old_name = old.and_then(|id| registry.name_of(id));

    let new_name = best.and_then(|id| {
        let key = SubscriberKey {
            session: session.id(),
            interface,
        };
        let subscription = registry.subscribe(id, key, session.effective_accuracy())?;
        session.set_selection(
            interface,
            Selection {
                provider: id,
                subscription,
                baseline: None,
            },
        );
        registry.name_of(id)
    });

    info!(
        event = events::SESSION_PROVIDER_CHANGED,
        component = COMPONENT,
        session = %session.id(),
        interface = %interface,
        old = %fields::format_optional_name(old_name.as_deref()),
        new = %fields::format_optional_name(new_name.as_deref()),
        reason,
        "selected provider changed"
    );
    session.emit(SessionEvent::ProviderChanged {
        interface,
        old: old_name,
        new: new_name,
    });

    if let Some(id) = best {
        deliver_last_value(registry, session, interface, id);
    }
    true
}

fn deliver_last_value(
    registry: &ProviderRegistry,
    session: &mut ClientSession,
    interface: Interface,
    provider: ProviderId,
) {
    let Some(record) = registry.get(provider) else {
        return;
    };
    match interface {
        Interface::Position => {
            let Some(location) = record.last_position().cloned() else {
                return;
            };
            if let Some(selection) = session.selection_mut(interface) {
                selection.baseline = Some(location.clone());
            }
            session.emit(SessionEvent::LocationChanged(location));
        }
        Interface::Address => {
            if let Some(address) = record.last_address().cloned() {
                session.emit(SessionEvent::AddressChanged(address));
            }
        }
    }
}

/// Runs a selection pass for every enabled interface of the session.
pub(crate) fn reselect_all(registry: &ProviderRegistry, session: &mut ClientSession, reason: &str) {
    let interfaces: Vec<Interface> = session.interfaces().iter().collect();
    for interface in interfaces {
        reselect(registry, session, interface, reason);
    }
}

/// Releases every selection, telling the client each interface lost its provider.
pub(crate) fn clear_selections(registry: &ProviderRegistry, session: &mut ClientSession, reason: &str) {
    for interface in Interface::ALL {
        let Some(selection) = session.take_selection(interface) else {
            continue;
        };
        let old = registry.name_of(selection.provider);
        drop(selection);
        info!(
            event = events::SESSION_PROVIDER_CHANGED,
            component = COMPONENT,
            session = %session.id(),
            interface = %interface,
            old = %fields::format_optional_name(old.as_deref()),
            new = fields::NONE,
            reason,
            "selection cleared"
        );
        session.emit(SessionEvent::ProviderChanged {
            interface,
            old,
            new: None,
        });
    }
}

/// Releases the selection of a disabled interface without notifying the client.
pub(crate) fn drop_interface(session: &mut ClientSession, interface: Interface) {
    if let Some(selection) = session.take_selection(interface) {
        debug!(
            event = events::SESSION_RESELECT,
            component = COMPONENT,
            session = %session.id(),
            interface = %interface,
            provider = %selection.provider,
            reason = REASON_INTERFACES,
            "interface disabled, selection released"
        );
    }
}

/// Pushes a new demanded accuracy to every held subscription, then reselects.
pub(crate) fn reclamp(registry: &ProviderRegistry, session: &mut ClientSession, reason: &str) {
    let accuracy = session.effective_accuracy();
    for selection in session.selections() {
        selection.subscription.set_accuracy(accuracy);
    }
    reselect_all(registry, session, reason);
}

/// Reacts to a provider status change across every active session.
///
/// A pass runs only where the change can affect the outcome; lower-ranked providers
/// coming and going never disturb a session.
pub(crate) fn on_status_changed(
    registry: &ProviderRegistry,
    sessions: &mut SessionManager,
    provider: ProviderId,
    status: ProviderStatus,
) -> usize {
    let mut passes = 0;
    for id in sessions.active_ids() {
        let Some(session) = sessions.get_mut(id) else {
            continue;
        };
        if session.effective_accuracy() == AccuracyLevel::None {
            continue;
        }
        let interfaces: Vec<Interface> = session.interfaces().iter().collect();
        for interface in interfaces {
            let candidates = registry.candidates(interface, &session.selection_request());
            let current = session.selected_provider(interface);
            if let Some(reason) = reselect_reason(&candidates, current, provider, status) {
                reselect(registry, session, interface, reason.as_str());
                passes += 1;
            }
        }
    }
    passes
}

/// Re-evaluates every active session after a provider's max accuracy changed.
pub(crate) fn accuracy_sweep(
    registry: &ProviderRegistry,
    sessions: &mut SessionManager,
    provider: ProviderId,
) -> usize {
    let active = sessions.active_ids();
    let mut changed = 0;
    for id in &active {
        if let Some(session) = sessions.get_mut(*id) {
            let interfaces: Vec<Interface> = session.interfaces().iter().collect();
            for interface in interfaces {
                if reselect(registry, session, interface, REASON_ACCURACY_SWEEP) {
                    changed += 1;
                }
            }
        }
    }
    info!(
        event = events::ACCURACY_SWEEP,
        component = COMPONENT,
        provider = %fields::format_optional_name(registry.get(provider).map(|r| r.name())),
        sessions = active.len(),
        changed,
        "accuracy sweep finished"
    );
    changed
}

/// Forwards a position from `provider` to every session that selected it and whose
/// thresholds it clears.
pub(crate) fn relay_location(
    registry: &ProviderRegistry,
    sessions: &mut SessionManager,
    provider: ProviderId,
    location: &Location,
) -> usize {
    let Some(record) = registry.get(provider) else {
        return 0;
    };
    let mut forwarded = 0;
    for key in record.subscriber_keys() {
        if key.interface != Interface::Position {
            continue;
        }
        let Some(session) = sessions.get_mut(key.session) else {
            continue;
        };
        let gate = session.relay_thresholds();
        let admitted = match session.selection_mut(Interface::Position) {
            Some(selection) if selection.provider == provider => {
                let admitted = gate.admits(selection.baseline.as_ref(), location);
                if admitted {
                    selection.baseline = Some(location.clone());
                }
                admitted
            }
            _ => continue,
        };
        if admitted {
            trace!(
                event = events::SESSION_VALUE_FORWARDED,
                component = COMPONENT,
                session = %key.session,
                provider = %record.name(),
                location = %fields::format_location(location),
                "position forwarded"
            );
            session.emit(SessionEvent::LocationChanged(location.clone()));
            forwarded += 1;
        } else {
            trace!(
                event = events::SESSION_VALUE_SUPPRESSED,
                component = COMPONENT,
                session = %key.session,
                provider = %record.name(),
                location = %fields::format_location(location),
                "position below thresholds"
            );
        }
    }
    forwarded
}

/// Forwards an address from `provider` to every session that selected it.
pub(crate) fn relay_address(
    registry: &ProviderRegistry,
    sessions: &mut SessionManager,
    provider: ProviderId,
    address: &Address,
) -> usize {
    let Some(record) = registry.get(provider) else {
        return 0;
    };
    let mut forwarded = 0;
    for key in record.subscriber_keys() {
        if key.interface != Interface::Address {
            continue;
        }
        let Some(session) = sessions.get_mut(key.session) else {
            continue;
        };
        if session.selected_provider(Interface::Address) != Some(provider) {
            continue;
        }
        session.emit(SessionEvent::AddressChanged(address.clone()));
        forwarded += 1;
    }
    forwarded
}
