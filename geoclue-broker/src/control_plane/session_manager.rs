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

//! Client sessions, their lifecycle and the authorization gate.
//!
//! ```text
//!              start()                 grant                revoke
//!  Inactive ───────────▶ Starting ───────────▶ Active ───────────▶ Suspended
//!     ▲                     │ deny/cancel         │ stop()    grant   │
//!     └─────────────────────┴─────────────────────┴◀──────────────────┘
//!                                                   (Suspended ─▶ Active)
//! ```
//!
//! The manager owns state transitions only. Selection changes that follow a transition
//! are applied by the routing layer, which needs the provider registry.

use crate::accuracy::{AccuracyLevel, Interface, InterfaceSet, ResourceFlags};
use crate::control_plane::authorization::AuthorizationDecision;
use crate::control_plane::provider_registry::{ProviderId, SelectionRequest};
use crate::data_plane::session_events::{SessionEvent, SessionEvents};
use crate::data_plane::subscription::Subscription;
use crate::location::Location;
use crate::observability::{events, fields};
use crate::routing::threshold::{RelayThresholds, Thresholds};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const COMPONENT: &str = "session_manager";

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        SessionId(raw)
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionError {
    AccessDenied,
    AlreadyActive,
    Cancelled,
    NotFound,
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::AccessDenied => write!(f, "access denied"),
            SessionError::AlreadyActive => write!(f, "session is already active"),
            SessionError::Cancelled => write!(f, "start was cancelled"),
            SessionError::NotFound => write!(f, "no such session"),
        }
    }
}

impl Error for SessionError {}

/// What a client negotiates before starting.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionRequirements {
    pub accuracy: AccuracyLevel,
    #[serde(with = "duration_secs")]
    pub min_update_interval: Duration,
    pub require_updates: bool,
    pub allowed_resources: ResourceFlagsConfig,
}

impl Default for SessionRequirements {
    fn default() -> Self {
        Self {
            accuracy: AccuracyLevel::City,
            min_update_interval: Duration::ZERO,
            require_updates: false,
            allowed_resources: ResourceFlagsConfig::default(),
        }
    }
}

impl SessionRequirements {
    pub fn with_accuracy(mut self, accuracy: AccuracyLevel) -> Self {
        self.accuracy = accuracy;
        self
    }

    pub fn with_allowed_resources(mut self, allowed: ResourceFlags) -> Self {
        self.allowed_resources = ResourceFlagsConfig::from(allowed);
        self
    }

    pub fn with_require_updates(mut self, require_updates: bool) -> Self {
        self.require_updates = require_updates;
        self
    }

    pub fn with_min_update_interval(mut self, interval: Duration) -> Self {
        self.min_update_interval = interval;
        self
    }
}

/// Serde-friendly view of [`ResourceFlags`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceFlagsConfig {
    pub network: bool,
    pub gps: bool,
}

impl Default for ResourceFlagsConfig {
    fn default() -> Self {
        Self {
            network: true,
            gps: true,
        }
    }
}

impl From<ResourceFlags> for ResourceFlagsConfig {
    fn from(flags: ResourceFlags) -> Self {
        Self {
            network: flags.contains(ResourceFlags::NETWORK),
            gps: flags.contains(ResourceFlags::GPS),
        }
    }
}

impl From<ResourceFlagsConfig> for ResourceFlags {
    fn from(config: ResourceFlagsConfig) -> Self {
        let mut flags = ResourceFlags::empty();
        if config.network {
            flags |= ResourceFlags::NETWORK;
        }
        if config.gps {
            flags |= ResourceFlags::GPS;
        }
        flags
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[derive(Debug)]
pub enum SessionState {
    Inactive,
    Starting {
        generation: u64,
        token: CancellationToken,
    },
    Active,
    /// Stopped by an authorization revoke; a later grant restarts it.
    Suspended,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Inactive => "inactive",
            SessionState::Starting { .. } => "starting",
            SessionState::Active => "active",
            SessionState::Suspended => "suspended",
        }
    }
}

/// The provider currently serving one interface of a session.
pub struct Selection {
    pub(crate) provider: ProviderId,
    pub(crate) subscription: Subscription,
    /// Last value forwarded to the client; thresholds are measured against it.
    pub(crate) baseline: Option<Location>,
}

pub struct ClientSession {
    id: SessionId,
    peer: String,
    desktop_id: Option<String>,
    requirements: SessionRequirements,
    thresholds: Thresholds,
    interfaces: InterfaceSet,
    state: SessionState,
    generation: u64,
    granted_cap: Option<AccuracyLevel>,
    effective_accuracy: AccuracyLevel,
    selections: [Option<Selection>; 2],
    events: SessionEvents,
}

impl ClientSession {
    fn new(id: SessionId, peer: String, event_capacity: usize) -> Self {
        Self {
            id,
            peer,
            desktop_id: None,
            requirements: SessionRequirements::default(),
            thresholds: Thresholds::default(),
            interfaces: InterfaceSet::position_only(),
            state: SessionState::Inactive,
            generation: 0,
            granted_cap: None,
            effective_accuracy: AccuracyLevel::None,
            selections: [None, None],
            events: SessionEvents::new(event_capacity),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn desktop_id(&self) -> Option<&str> {
        self.desktop_id.as_deref()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active)
    }

    pub fn requirements(&self) -> SessionRequirements {
        self.requirements
    }

    pub fn interfaces(&self) -> InterfaceSet {
        self.interfaces
    }

    pub fn effective_accuracy(&self) -> AccuracyLevel {
        self.effective_accuracy
    }

    pub fn selected_provider(&self, interface: Interface) -> Option<ProviderId> {
        self.selections[interface.index()]
            .as_ref()
            .map(|selection| selection.provider)
    }

    pub(crate) fn selection_mut(&mut self, interface: Interface) -> Option<&mut Selection> {
        self.selections[interface.index()].as_mut()
    }

    pub(crate) fn take_selection(&mut self, interface: Interface) -> Option<Selection> {
        self.selections[interface.index()].take()
    }

    pub(crate) fn set_selection(&mut self, interface: Interface, selection: Selection) {
        self.selections[interface.index()] = Some(selection);
    }

    pub(crate) fn selections(&self) -> impl Iterator<Item = &Selection> + '_ {
        self.selections.iter().flatten()
    }

    pub fn selection_request(&self) -> SelectionRequest {
        SelectionRequest {
            min_accuracy: self.effective_accuracy,
            require_updates: self.requirements.require_updates,
            allowed_resources: self.requirements.allowed_resources.into(),
        }
    }

    pub fn relay_thresholds(&self) -> RelayThresholds {
        RelayThresholds {
            thresholds: self.thresholds,
            min_update_interval: self.requirements.min_update_interval,
        }
    }

    pub fn emit(&self, event: SessionEvent) -> usize {
        self.events.emit(event)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn set_desktop_id(&mut self, desktop_id: impl Into<String>) {
        self.desktop_id = Some(desktop_id.into());
    }

    pub fn set_thresholds(&mut self, thresholds: Thresholds) {
        self.thresholds = thresholds;
    }

    /// Replaces the enabled interfaces and returns the ones that were turned off.
    pub fn set_interfaces(&mut self, interfaces: InterfaceSet) -> Vec<Interface> {
        let removed = self
            .interfaces
            .iter()
            .filter(|interface| !interfaces.contains(*interface))
            .collect();
        self.interfaces = interfaces;
        removed
    }

    /// Stores new requirements; returns the new effective accuracy while active.
    pub fn set_requirements(&mut self, requirements: SessionRequirements) -> Option<AccuracyLevel> {
        self.requirements = requirements;
        if !self.is_active() {
            return None;
        }
        let cap = self.granted_cap.unwrap_or(AccuracyLevel::None);
        self.effective_accuracy = requirements.accuracy.min(cap);
        Some(self.effective_accuracy)
    }

    fn cancel_pending_start(&mut self) {
        if let SessionState::Starting { token, .. } = &self.state {
            token.cancel();
        }
    }
}

/// Handed out by [`SessionManager::begin_start`] for the asynchronous authorization step.
#[derive(Debug, Clone)]
pub struct StartTicket {
    pub session: SessionId,
    pub generation: u64,
    pub token: CancellationToken,
    pub desktop_id: String,
    pub requested: AccuracyLevel,
}

/// What an authorization push means for one session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthorizationAction {
    /// Access was revoked while active; the session is now suspended.
    ForceStop,
    /// Access was granted again while suspended; the session is active at this level.
    Restart(AccuracyLevel),
    /// The cap changed while active; the session now runs at this level.
    Reclamp(AccuracyLevel),
}

/// Owner of every [`ClientSession`], keyed by id and by peer.
pub struct SessionManager {
    sessions: BTreeMap<SessionId, ClientSession>,
    by_peer: HashMap<String, SessionId>,
    next_id: u64,
    event_capacity: usize,
}

impl SessionManager {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            by_peer: HashMap::new(),
            next_id: 1,
            event_capacity,
        }
    }

    /// Returns the peer's session, creating it on first request. `true` if created.
    pub fn get_or_create_session(&mut self, peer: &str) -> (SessionId, bool) {
        if let Some(id) = self.by_peer.get(peer) {
            debug!(
                event = events::SESSION_REUSE,
                component = COMPONENT,
                peer,
                session = %id,
                "returning existing session for peer"
            );
            return (*id, false);
        }
        let id = SessionId(self.next_id);
        self.next_id += 1;
        self.sessions.insert(
            id,
            ClientSession::new(id, peer.to_string(), self.event_capacity),
        );
        self.by_peer.insert(peer.to_string(), id);
        info!(
            event = events::SESSION_CREATE,
            component = COMPONENT,
            peer,
            session = %id,
            "session created"
        );
        (id, true)
    }

    pub fn get(&self, id: SessionId) -> Option<&ClientSession> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut ClientSession> {
        self.sessions.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn active_ids(&self) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|session| session.is_active())
            .map(ClientSession::id)
            .collect()
    }

    /// Destroys the peer's session. Dropping it revokes all its subscriptions.
    pub fn on_peer_vanished(&mut self, peer: &str) -> Option<ClientSession> {
        let id = self.by_peer.get(peer).copied()?;
        self.destroy(id, "peer_vanished")
    }

    pub fn delete(&mut self, id: SessionId) -> Result<ClientSession, SessionError> {
        self.destroy(id, "deleted").ok_or(SessionError::NotFound)
    }

    fn destroy(&mut self, id: SessionId, reason: &'static str) -> Option<ClientSession> {
        let mut session = self.sessions.remove(&id)?;
        self.by_peer.remove(&session.peer);
        session.cancel_pending_start();
        info!(
            event = events::SESSION_DESTROY,
            component = COMPONENT,
            peer = %session.peer,
            session = %id,
            reason,
            "session destroyed"
        );
        Some(session)
    }

    /// Moves an idle session to `Starting` and hands out the authorization ticket.
    pub fn begin_start(&mut self, id: SessionId) -> Result<StartTicket, SessionError> {
        let session = self.sessions.get_mut(&id).ok_or(SessionError::NotFound)?;
        match session.state {
            SessionState::Starting { .. } | SessionState::Active => {
                debug!(
                    event = events::SESSION_START_DENIED,
                    component = COMPONENT,
                    session = %id,
                    reason = fields::REASON_ALREADY_ACTIVE,
                    "start rejected"
                );
                return Err(SessionError::AlreadyActive);
            }
            SessionState::Inactive | SessionState::Suspended => {}
        }
        let Some(desktop_id) = session.desktop_id.clone() else {
            warn!(
                event = events::SESSION_START_DENIED,
                component = COMPONENT,
                session = %id,
                reason = fields::REASON_NO_DESKTOP_ID,
                "start rejected"
            );
            return Err(SessionError::AccessDenied);
        };

        session.generation += 1;
        let token = CancellationToken::new();
        session.state = SessionState::Starting {
            generation: session.generation,
            token: token.clone(),
        };
        Ok(StartTicket {
            session: id,
            generation: session.generation,
            token,
            desktop_id,
            requested: session.requirements.accuracy,
        })
    }

    /// Applies the authorization outcome of a start; `None` means the request was cancelled.
    ///
    /// Returns the effective accuracy the session now runs at.
    pub fn complete_start(
        &mut self,
        id: SessionId,
        generation: u64,
        decision: Option<AuthorizationDecision>,
    ) -> Result<AccuracyLevel, SessionError> {
        let Some(session) = self.sessions.get_mut(&id) else {
            debug!(
                event = events::SESSION_START_CANCELLED,
                component = COMPONENT,
                session = %id,
                "session vanished while authorizing"
            );
            return Err(SessionError::Cancelled);
        };
        let current = matches!(
            session.state,
            SessionState::Starting { generation: pending, .. } if pending == generation
        );
        if !current {
            debug!(
                event = events::SESSION_START_CANCELLED,
                component = COMPONENT,
                session = %id,
                reason = fields::REASON_STALE_COMPLETION,
                "discarding authorization result"
            );
            return Err(SessionError::Cancelled);
        }
        let Some(decision) = decision else {
            session.state = SessionState::Inactive;
            debug!(
                event = events::SESSION_START_CANCELLED,
                component = COMPONENT,
                session = %id,
                "authorization request cancelled"
            );
            return Err(SessionError::Cancelled);
        };

        let effective = decision
            .cap()
            .map(|cap| session.requirements.accuracy.min(cap))
            .filter(|level| *level > AccuracyLevel::None);
        let Some(effective) = effective else {
            session.state = SessionState::Inactive;
            warn!(
                event = events::SESSION_START_DENIED,
                component = COMPONENT,
                session = %id,
                desktop_id = session.desktop_id.as_deref().unwrap_or(fields::NONE),
                allowed = decision.allowed,
                max_accuracy = %decision.max_accuracy,
                "authorization refused"
            );
            return Err(SessionError::AccessDenied);
        };

        session.state = SessionState::Active;
        session.granted_cap = decision.cap();
        session.effective_accuracy = effective;
        info!(
            event = events::SESSION_START_OK,
            component = COMPONENT,
            session = %id,
            requested = %session.requirements.accuracy,
            effective = %effective,
            "session started"
        );
        Ok(effective)
    }

    /// Stops the session. Returns `true` if it was running and its selections must be
    /// cleared by the caller.
    pub fn stop(&mut self, id: SessionId) -> Result<bool, SessionError> {
        let session = self.sessions.get_mut(&id).ok_or(SessionError::NotFound)?;
        session.cancel_pending_start();
        let was_active = session.is_active();
        if !matches!(session.state, SessionState::Inactive) {
            info!(
                event = events::SESSION_STOP,
                component = COMPONENT,
                session = %id,
                previous = session.state.label(),
                "session stopped"
            );
        }
        session.state = SessionState::Inactive;
        session.granted_cap = None;
        session.effective_accuracy = AccuracyLevel::None;
        Ok(was_active)
    }

    /// Applies a pushed decision to every session of `desktop_id`.
    pub fn apply_authorization_change(
        &mut self,
        desktop_id: &str,
        decision: AuthorizationDecision,
    ) -> Vec<(SessionId, AuthorizationAction)> {
        let mut actions = Vec::new();
        for session in self.sessions.values_mut() {
            if session.desktop_id.as_deref() != Some(desktop_id) {
                continue;
            }
            let effective = decision
                .cap()
                .map(|cap| session.requirements.accuracy.min(cap))
                .filter(|level| *level > AccuracyLevel::None);
            let action = match (&session.state, effective) {
                (SessionState::Active, None) => {
                    session.state = SessionState::Suspended;
                    session.granted_cap = None;
                    session.effective_accuracy = AccuracyLevel::None;
                    warn!(
                        event = events::SESSION_FORCE_STOP,
                        component = COMPONENT,
                        session = %session.id,
                        desktop_id,
                        reason = fields::REASON_AUTHORIZATION_REVOKED,
                        "session suspended"
                    );
                    AuthorizationAction::ForceStop
                }
                (SessionState::Suspended, Some(level)) => {
                    session.state = SessionState::Active;
                    session.granted_cap = decision.cap();
                    session.effective_accuracy = level;
                    info!(
                        event = events::SESSION_RESTART,
                        component = COMPONENT,
                        session = %session.id,
                        desktop_id,
                        effective = %level,
                        "session restarted after authorization grant"
                    );
                    AuthorizationAction::Restart(level)
                }
                (SessionState::Active, Some(level)) => {
                    session.granted_cap = decision.cap();
                    if level == session.effective_accuracy {
                        continue;
                    }
                    session.effective_accuracy = level;
                    info!(
                        event = events::SESSION_RECLAMP,
                        component = COMPONENT,
                        session = %session.id,
                        desktop_id,
                        effective = %level,
                        "session accuracy re-clamped"
                    );
                    AuthorizationAction::Reclamp(level)
                }
                _ => continue,
            };
            actions.push((session.id, action));
        }
        actions
    }

    /// Removes every session, releasing all subscriptions.
    pub fn clear(&mut self) -> usize {
        let count = self.sessions.len();
        for session in self.sessions.values_mut() {
            session.cancel_pending_start();
        }
        self.sessions.clear();
        self.by_peer.clear();
        count
    }
}
