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

//! API facade: the broker loop and the handles clients drive it through.

use crate::accuracy::{AccuracyLevel, Interface, InterfaceSet};
use crate::config::BrokerConfig;
use crate::control_plane::authorization::{AuthorizationDecision, Authorizer};
use crate::control_plane::descriptor::{read_descriptor_dir, DescriptorError, DescriptorSource, ProviderDescriptor};
use crate::control_plane::provider_registry::{ProviderId, ProviderRegistry, RegistryError};
use crate::control_plane::session_manager::{
    AuthorizationAction, SessionError, SessionId, SessionManager, SessionRequirements, StartTicket,
};
use crate::data_plane::session_events::SessionEvent;
use crate::observability::{events, fields};
use crate::routing::arbitration;
use crate::routing::threshold::Thresholds;
use crate::sources::location_source::{LocationSource, MemoryPressure, SourceEvent, SourceSink};
use crate::sources::source_registry::SourceLease;
use serde::Serialize;
use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const COMPONENT: &str = "broker";

const REASON_STOPPED: &str = "stopped";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker loop is no longer running.
    Closed,
    /// The loop dropped the request without answering.
    ReplyDropped,
    Session(SessionError),
    Registry(RegistryError),
}

impl Display for BrokerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::Closed => write!(f, "broker loop is not running"),
            BrokerError::ReplyDropped => write!(f, "broker dropped the request"),
            BrokerError::Session(err) => write!(f, "session error: {err}"),
            BrokerError::Registry(err) => write!(f, "registry error: {err}"),
        }
    }
}

impl Error for BrokerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BrokerError::Session(err) => Some(err),
            BrokerError::Registry(err) => Some(err),
            BrokerError::Closed | BrokerError::ReplyDropped => None,
        }
    }
}

impl From<SessionError> for BrokerError {
    fn from(err: SessionError) -> Self {
        BrokerError::Session(err)
    }
}

impl From<RegistryError> for BrokerError {
    fn from(err: RegistryError) -> Self {
        BrokerError::Registry(err)
    }
}

/// Point-in-time view of one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub peer: String,
    pub desktop_id: Option<String>,
    pub state: &'static str,
    pub active: bool,
    pub requested_accuracy: AccuracyLevel,
    pub effective_accuracy: AccuracyLevel,
    pub position_provider: Option<String>,
    pub address_provider: Option<String>,
}

type Reply<T> = oneshot::Sender<T>;

enum Command {
    CreateSession {
        peer: String,
        reply: Reply<(SessionId, broadcast::Receiver<SessionEvent>)>,
    },
    DeleteSession {
        session: SessionId,
        reply: Reply<Result<(), SessionError>>,
    },
    PeerVanished {
        peer: String,
        reply: Reply<bool>,
    },
    Start {
        session: SessionId,
        reply: Reply<Result<(), SessionError>>,
    },
    Stop {
        session: SessionId,
        reply: Reply<Result<(), SessionError>>,
    },
    SetRequirements {
        session: SessionId,
        requirements: SessionRequirements,
        reply: Reply<Result<(), SessionError>>,
    },
    SetDesktopId {
        session: SessionId,
        desktop_id: String,
        reply: Reply<Result<(), SessionError>>,
    },
    SetThresholds {
        session: SessionId,
        thresholds: Thresholds,
        reply: Reply<Result<(), SessionError>>,
    },
    SetInterfaces {
        session: SessionId,
        interfaces: InterfaceSet,
        reply: Reply<Result<(), SessionError>>,
    },
    Snapshot {
        session: SessionId,
        reply: Reply<Result<SessionSnapshot, SessionError>>,
    },
    AuthorizationChanged {
        desktop_id: String,
        decision: AuthorizationDecision,
        reply: Reply<usize>,
    },
    MemoryPressure {
        level: MemoryPressure,
        reply: Reply<usize>,
    },
    AddProvider {
        descriptor: ProviderDescriptor,
        source: Arc<dyn LocationSource>,
        reply: Reply<Result<(), RegistryError>>,
    },
    RemoveProvider {
        name: String,
        reply: Reply<Result<(), RegistryError>>,
    },
    Sync {
        reply: Reply<()>,
    },
}

enum Inbound {
    Command(Command),
    Source {
        provider: ProviderId,
        event: SourceEvent,
    },
    Authorized {
        session: SessionId,
        generation: u64,
        decision: Option<AuthorizationDecision>,
        reply: Reply<Result<(), SessionError>>,
    },
}

fn send_reply<T>(reply: Reply<T>, value: T, command: &'static str) {
    if reply.send(value).is_err() {
        debug!(
            event = events::SESSION_REPLY_DROPPED,
            component = COMPONENT,
            command,
            "caller went away before the reply"
        );
    }
}

/// Owns the provider registry and every session; all mutation happens in [`Broker::run`].
pub struct Broker {
    config: BrokerConfig,
    registry: ProviderRegistry,
    sessions: SessionManager,
    authorizer: Arc<dyn Authorizer>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    shutdown: CancellationToken,
}

impl Broker {
    pub fn new(config: BrokerConfig, authorizer: Arc<dyn Authorizer>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            sessions: SessionManager::new(config.session_event_capacity),
            config,
            registry: ProviderRegistry::new(),
            authorizer,
            inbound_tx,
            inbound_rx,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn handle(&self) -> BrokerHandle {
        BrokerHandle {
            inbound: self.inbound_tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Loads descriptors, logging and skipping bad ones. Returns the loaded provider names.
    pub fn load_descriptors<I>(&mut self, sources: I) -> Vec<String>
    where
        I: IntoIterator<Item = DescriptorSource>,
    {
        self.registry
            .load(sources)
            .into_iter()
            .filter_map(|id| self.registry.name_of(id))
            .collect()
    }

    /// Loads every `*.provider` file in `dir`. Only an unreadable directory is an error.
    pub fn load_descriptor_dir(&mut self, dir: &Path) -> Result<Vec<String>, DescriptorError> {
        let entries = read_descriptor_dir(dir)?;
        let sources = entries.into_iter().filter_map(|entry| match entry {
            Ok(source) => Some(source),
            Err(err) => {
                warn!(
                    event = events::PROVIDER_LOAD_SKIPPED,
                    component = COMPONENT,
                    err = %err,
                    "skipping unreadable provider descriptor"
                );
                None
            }
        });
        Ok(self.load_descriptors(sources.collect::<Vec<_>>()))
    }

    /// Binds `source` to the already loaded provider `name`.
    pub fn attach_source(
        &mut self,
        name: &str,
        source: Arc<dyn LocationSource>,
    ) -> Result<(), RegistryError> {
        let id = self.provider_id(name)?;
        let sink = self.sink_for(id);
        if let Some(transition) = self.registry.bind(id, source, sink) {
            arbitration::on_status_changed(&self.registry, &mut self.sessions, id, transition.current);
        }
        Ok(())
    }

    /// Binds a shared source lease to the already loaded provider `name`.
    pub fn attach_lease(&mut self, name: &str, lease: SourceLease) -> Result<(), RegistryError> {
        let id = self.provider_id(name)?;
        let sink = self.sink_for(id);
        if let Some(transition) = self.registry.bind_lease(id, lease, sink) {
            arbitration::on_status_changed(&self.registry, &mut self.sessions, id, transition.current);
        }
        Ok(())
    }

    /// Registers a provider and binds its source in one step.
    pub fn add_provider(
        &mut self,
        descriptor: ProviderDescriptor,
        source: Arc<dyn LocationSource>,
    ) -> Result<(), RegistryError> {
        let name = descriptor.name.clone();
        let id = self.registry.insert(descriptor)?;
        info!(
            event = events::PROVIDER_LOAD_OK,
            component = COMPONENT,
            provider = %name,
            "provider registered"
        );
        let sink = self.sink_for(id);
        if let Some(transition) = self.registry.bind(id, source, sink) {
            arbitration::on_status_changed(&self.registry, &mut self.sessions, id, transition.current);
        }
        Ok(())
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.registry
            .records()
            .map(|record| record.name().to_string())
            .collect()
    }

    fn provider_id(&self, name: &str) -> Result<ProviderId, RegistryError> {
        self.registry
            .id_of(name)
            .ok_or_else(|| RegistryError::UnknownProvider(name.to_string()))
    }

    fn sink_for(&self, provider: ProviderId) -> SourceSink {
        let inbound = self.inbound_tx.clone();
        SourceSink::new(move |event| inbound.send(Inbound::Source { provider, event }).is_ok())
    }

    /// Runs the broker loop until [`BrokerHandle::shutdown`] is called.
    pub async fn run(mut self) {
        info!(
            event = events::BROKER_LOOP_START,
            component = COMPONENT,
            providers = self.registry.len(),
            "broker loop started"
        );
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                inbound = self.inbound_rx.recv() => match inbound {
                    Some(inbound) => self.dispatch(inbound),
                    None => break,
                },
            }
        }
        let sessions = self.sessions.clear();
        info!(
            event = events::BROKER_LOOP_STOP,
            component = COMPONENT,
            sessions,
            "broker loop stopped"
        );
    }

    fn dispatch(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Command(command) => self.handle_command(command),
            Inbound::Source { provider, event } => self.handle_source_event(provider, event),
            Inbound::Authorized {
                session,
                generation,
                decision,
                reply,
            } => {
                let result = self.complete_start(session, generation, decision);
                send_reply(reply, result, "start");
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::CreateSession { peer, reply } => {
                let (id, _) = self.sessions.get_or_create_session(&peer);
                match self.sessions.get(id) {
                    Some(session) => send_reply(reply, (id, session.subscribe_events()), "create_session"),
                    None => drop(reply),
                }
            }
            Command::DeleteSession { session, reply } => {
                let result = self.sessions.delete(session).map(drop);
                send_reply(reply, result, "delete_session");
            }
            Command::PeerVanished { peer, reply } => {
                let destroyed = self.sessions.on_peer_vanished(&peer).is_some();
                send_reply(reply, destroyed, "peer_vanished");
            }
            Command::Start { session, reply } => self.begin_start(session, reply),
            Command::Stop { session, reply } => {
                let result = self.stop(session);
                send_reply(reply, result, "stop");
            }
            Command::SetRequirements {
                session,
                requirements,
                reply,
            } => {
                let result = self.set_requirements(session, requirements);
                send_reply(reply, result, "set_requirements");
            }
            Command::SetDesktopId {
                session,
                desktop_id,
                reply,
            } => {
                let result = self
                    .sessions
                    .get_mut(session)
                    .map(|session| session.set_desktop_id(desktop_id))
                    .ok_or(SessionError::NotFound);
                send_reply(reply, result, "set_desktop_id");
            }
            Command::SetThresholds {
                session,
                thresholds,
                reply,
            } => {
                let result = self
                    .sessions
                    .get_mut(session)
                    .map(|session| session.set_thresholds(thresholds))
                    .ok_or(SessionError::NotFound);
                send_reply(reply, result, "set_thresholds");
            }
            Command::SetInterfaces {
                session,
                interfaces,
                reply,
            } => {
                let result = self.set_interfaces(session, interfaces);
                send_reply(reply, result, "set_interfaces");
            }
            Command::Snapshot { session, reply } => {
                let result = self.snapshot(session);
                send_reply(reply, result, "snapshot");
            }
            Command::AuthorizationChanged {
                desktop_id,
                decision,
                reply,
            } => {
                let affected = self.authorization_changed(&desktop_id, decision);
                send_reply(reply, affected, "authorization_changed");
            }
            Command::MemoryPressure { level, reply } => {
                let notified = self.memory_pressure(level);
                send_reply(reply, notified, "memory_pressure");
            }
            Command::AddProvider {
                descriptor,
                source,
                reply,
            } => {
                let result = self.add_provider(descriptor, source);
                send_reply(reply, result, "add_provider");
            }
            Command::RemoveProvider { name, reply } => {
                let result = self.remove_provider(&name);
                send_reply(reply, result, "remove_provider");
            }
            Command::Sync { reply } => send_reply(reply, (), "sync"),
        }
    }

    fn handle_source_event(&mut self, provider: ProviderId, event: SourceEvent) {
        if self.registry.get(provider).is_none() {
            debug!(
                event = events::PROVIDER_EVENT_UNKNOWN,
                component = COMPONENT,
                provider = %provider,
                "dropping event from removed provider"
            );
            return;
        }
        match event {
            SourceEvent::StatusChanged(status) => {
                if self.registry.set_status(provider, status).is_some() {
                    arbitration::on_status_changed(&self.registry, &mut self.sessions, provider, status);
                }
            }
            SourceEvent::AccuracyChanged(level) => {
                if self.registry.set_accuracy(provider, level) {
                    arbitration::accuracy_sweep(&self.registry, &mut self.sessions, provider);
                }
            }
            SourceEvent::LocationChanged(location) => {
                self.registry.set_position(provider, location.clone());
                arbitration::relay_location(&self.registry, &mut self.sessions, provider, &location);
            }
            SourceEvent::AddressChanged(address) => {
                self.registry.set_address(provider, address.clone());
                arbitration::relay_address(&self.registry, &mut self.sessions, provider, &address);
            }
        }
    }

    fn begin_start(&mut self, session: SessionId, reply: Reply<Result<(), SessionError>>) {
        let ticket = match self.sessions.begin_start(session) {
            Ok(ticket) => ticket,
            Err(err) => {
                send_reply(reply, Err(err), "start");
                return;
            }
        };
        spawn_authorization(
            self.authorizer.clone(),
            ticket,
            self.inbound_tx.clone(),
            reply,
        );
    }

    fn complete_start(
        &mut self,
        id: SessionId,
        generation: u64,
        decision: Option<AuthorizationDecision>,
    ) -> Result<(), SessionError> {
        self.sessions.complete_start(id, generation, decision)?;
        let session = self.sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        session.emit(SessionEvent::ActiveChanged(true));
        arbitration::reselect_all(&self.registry, session, arbitration::REASON_STARTED);
        Ok(())
    }

    fn stop(&mut self, id: SessionId) -> Result<(), SessionError> {
        let was_active = self.sessions.stop(id)?;
        if was_active {
            let session = self.sessions.get_mut(id).ok_or(SessionError::NotFound)?;
            arbitration::clear_selections(&self.registry, session, REASON_STOPPED);
            session.emit(SessionEvent::ActiveChanged(false));
        }
        Ok(())
    }

    fn set_requirements(
        &mut self,
        id: SessionId,
        requirements: SessionRequirements,
    ) -> Result<(), SessionError> {
        let session = self.sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        match session.set_requirements(requirements) {
            Some(AccuracyLevel::None) => {
                arbitration::clear_selections(&self.registry, session, arbitration::REASON_REQUIREMENTS)
            }
            Some(_) => arbitration::reclamp(&self.registry, session, arbitration::REASON_REQUIREMENTS),
            None => {}
        }
        Ok(())
    }

    fn set_interfaces(&mut self, id: SessionId, interfaces: InterfaceSet) -> Result<(), SessionError> {
        let session = self.sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        for interface in session.set_interfaces(interfaces) {
            arbitration::drop_interface(session, interface);
        }
        if session.is_active() {
            arbitration::reselect_all(&self.registry, session, arbitration::REASON_INTERFACES);
        }
        Ok(())
    }

    fn snapshot(&self, id: SessionId) -> Result<SessionSnapshot, SessionError> {
        let session = self.sessions.get(id).ok_or(SessionError::NotFound)?;
        let provider_name = |interface: Interface| {
            session
                .selected_provider(interface)
                .and_then(|provider| self.registry.name_of(provider))
        };
        Ok(SessionSnapshot {
            id: id.to_string(),
            peer: session.peer().to_string(),
            desktop_id: session.desktop_id().map(str::to_string),
            state: session.state().label(),
            active: session.is_active(),
            requested_accuracy: session.requirements().accuracy,
            effective_accuracy: session.effective_accuracy(),
            position_provider: provider_name(Interface::Position),
            address_provider: provider_name(Interface::Address),
        })
    }

    fn authorization_changed(&mut self, desktop_id: &str, decision: AuthorizationDecision) -> usize {
        let actions = self.sessions.apply_authorization_change(desktop_id, decision);
        for (id, action) in &actions {
            let Some(session) = self.sessions.get_mut(*id) else {
                continue;
            };
            match action {
                AuthorizationAction::ForceStop => {
                    arbitration::clear_selections(
                        &self.registry,
                        session,
                        fields::REASON_AUTHORIZATION_REVOKED,
                    );
                    session.emit(SessionEvent::ActiveChanged(false));
                }
                AuthorizationAction::Restart(_) => {
                    session.emit(SessionEvent::ActiveChanged(true));
                    arbitration::reselect_all(&self.registry, session, arbitration::REASON_STARTED);
                }
                AuthorizationAction::Reclamp(_) => {
                    arbitration::reclamp(&self.registry, session, arbitration::REASON_REQUIREMENTS)
                }
            }
        }
        actions.len()
    }

    fn memory_pressure(&self, level: MemoryPressure) -> usize {
        let mut notified = HashSet::new();
        for record in self.registry.records() {
            let Some(source) = record.source() else {
                continue;
            };
            // Shared leases bind one source to several records; notify it once.
            if notified.insert(Arc::as_ptr(&source) as *const ()) {
                source.on_memory_pressure(level);
            }
        }
        info!(
            event = events::MEMORY_PRESSURE,
            component = COMPONENT,
            level = ?level,
            sources = notified.len(),
            "memory pressure forwarded"
        );
        notified.len()
    }

    /// Hot-unplug: every session moves off the provider before its record goes away.
    fn remove_provider(&mut self, name: &str) -> Result<(), RegistryError> {
        let id = self.provider_id(name)?;
        self.registry.mark_retiring(id);
        for session_id in self.sessions.active_ids() {
            let Some(session) = self.sessions.get_mut(session_id) else {
                continue;
            };
            for interface in Interface::ALL {
                if session.selected_provider(interface) == Some(id) {
                    arbitration::reselect(
                        &self.registry,
                        session,
                        interface,
                        fields::REASON_PROVIDER_REMOVED,
                    );
                }
            }
        }
        self.registry.remove(id);
        Ok(())
    }
}

/// Runs the authorization request off the loop and posts the outcome back into it.
///
/// A cancelled ticket posts `None`, which the loop turns into [`SessionError::Cancelled`].
fn spawn_authorization(
    authorizer: Arc<dyn Authorizer>,
    ticket: StartTicket,
    inbound: mpsc::UnboundedSender<Inbound>,
    reply: Reply<Result<(), SessionError>>,
) {
    tokio::spawn(async move {
        let decision = tokio::select! {
            _ = ticket.token.cancelled() => None,
            decision = authorizer.authorize(&ticket.desktop_id, ticket.requested) => Some(decision),
        };
        let message = Inbound::Authorized {
            session: ticket.session,
            generation: ticket.generation,
            decision,
            reply,
        };
        if let Err(mpsc::error::SendError(Inbound::Authorized { reply, .. })) = inbound.send(message) {
            let _ = reply.send(Err(SessionError::Cancelled));
        }
    });
}

/// Cloneable entry point into a running [`Broker`].
#[derive(Clone)]
pub struct BrokerHandle {
    inbound: mpsc::UnboundedSender<Inbound>,
    shutdown: CancellationToken,
}

impl BrokerHandle {
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, BrokerError> {
        let (reply, response) = oneshot::channel();
        self.inbound
            .send(Inbound::Command(command(reply)))
            .map_err(|_| BrokerError::Closed)?;
        response.await.map_err(|_| BrokerError::ReplyDropped)
    }

    /// Returns the peer's session, creating it on first use.
    pub async fn create_session(&self, peer: &str) -> Result<SessionHandle, BrokerError> {
        let peer = peer.to_string();
        let (id, events) = self
            .request(|reply| Command::CreateSession { peer, reply })
            .await?;
        Ok(SessionHandle {
            id,
            broker: self.clone(),
            events,
        })
    }

    /// Destroys the peer's session, if any. Returns `true` if one was destroyed.
    pub async fn peer_vanished(&self, peer: &str) -> Result<bool, BrokerError> {
        let peer = peer.to_string();
        self.request(|reply| Command::PeerVanished { peer, reply }).await
    }

    /// Pushes a changed authorization decision. Returns the number of affected sessions.
    pub async fn authorization_changed(
        &self,
        desktop_id: &str,
        decision: AuthorizationDecision,
    ) -> Result<usize, BrokerError> {
        let desktop_id = desktop_id.to_string();
        self.request(|reply| Command::AuthorizationChanged {
            desktop_id,
            decision,
            reply,
        })
        .await
    }

    /// Forwards a low-memory signal to every bound source. Returns the number notified.
    pub async fn memory_pressure(&self, level: MemoryPressure) -> Result<usize, BrokerError> {
        self.request(|reply| Command::MemoryPressure { level, reply }).await
    }

    pub async fn add_provider(
        &self,
        descriptor: ProviderDescriptor,
        source: Arc<dyn LocationSource>,
    ) -> Result<(), BrokerError> {
        self.request(|reply| Command::AddProvider {
            descriptor,
            source,
            reply,
        })
        .await?
        .map_err(BrokerError::from)
    }

    pub async fn remove_provider(&self, name: &str) -> Result<(), BrokerError> {
        let name = name.to_string();
        self.request(|reply| Command::RemoveProvider { name, reply })
            .await?
            .map_err(BrokerError::from)
    }

    /// Resolves once every message queued before it has been handled.
    pub async fn sync(&self) -> Result<(), BrokerError> {
        self.request(|reply| Command::Sync { reply }).await
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// One client's view of its session.
pub struct SessionHandle {
    id: SessionId,
    broker: BrokerHandle,
    events: broadcast::Receiver<SessionEvent>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    async fn session_request(
        &self,
        command: impl FnOnce(Reply<Result<(), SessionError>>) -> Command,
    ) -> Result<(), BrokerError> {
        self.broker.request(command).await?.map_err(BrokerError::from)
    }

    pub async fn start(&self) -> Result<(), BrokerError> {
        let session = self.id;
        self.session_request(|reply| Command::Start { session, reply })
            .await
    }

    pub async fn stop(&self) -> Result<(), BrokerError> {
        let session = self.id;
        self.session_request(|reply| Command::Stop { session, reply })
            .await
    }

    pub async fn delete(self) -> Result<(), BrokerError> {
        let session = self.id;
        self.session_request(|reply| Command::DeleteSession { session, reply })
            .await
    }

    pub async fn set_requirements(&self, requirements: SessionRequirements) -> Result<(), BrokerError> {
        let session = self.id;
        self.session_request(|reply| Command::SetRequirements {
            session,
            requirements,
            reply,
        })
        .await
    }

    pub async fn set_desktop_id(&self, desktop_id: &str) -> Result<(), BrokerError> {
        let session = self.id;
        let desktop_id = desktop_id.to_string();
        self.session_request(|reply| Command::SetDesktopId {
            session,
            desktop_id,
            reply,
        })
        .await
    }

    pub async fn set_thresholds(&self, thresholds: Thresholds) -> Result<(), BrokerError> {
        let session = self.id;
        self.session_request(|reply| Command::SetThresholds {
            session,
            thresholds,
            reply,
        })
        .await
    }

    pub async fn set_interfaces(&self, interfaces: InterfaceSet) -> Result<(), BrokerError> {
        let session = self.id;
        self.session_request(|reply| Command::SetInterfaces {
            session,
            interfaces,
            reply,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, BrokerError> {
        let session = self.id;
        self.broker
            .request(|reply| Command::Snapshot { session, reply })
            .await?
            .map_err(BrokerError::from)
    }

    /// Waits for the next event. Events lost to lag are skipped.
    pub async fn recv_event(&mut self) -> Result<SessionEvent, BrokerError> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Ok(event),
                Err(RecvError::Lagged(skipped)) => warn!(
                    event = events::SESSION_EVENTS_LAGGED,
                    component = COMPONENT,
                    session = %self.id,
                    skipped,
                    "session event receiver lagged"
                ),
                Err(RecvError::Closed) => return Err(BrokerError::Closed),
            }
        }
    }

    /// Returns an already queued event, if any.
    pub fn try_recv_event(&mut self) -> Option<SessionEvent> {
        loop {
            match self.events.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Broker, BrokerError};
    use crate::accuracy::{AccuracyLevel, Interface};
    use crate::config::BrokerConfig;
    use crate::control_plane::authorization::AllowAll;
    use crate::control_plane::descriptor::ProviderDescriptor;
    use crate::control_plane::session_manager::SessionError;
    use crate::data_plane::session_events::SessionEvent;
    use crate::location::Location;
    use crate::sources::static_source::StaticSource;
    use std::sync::Arc;

    #[tokio::test]
    async fn start_without_desktop_id_is_denied() {
        let broker = Broker::new(BrokerConfig::default(), Arc::new(AllowAll));
        let handle = broker.handle();
        let runner = tokio::spawn(broker.run());

        let session = handle.create_session(":1.5").await.expect("session");
        assert_eq!(
            session.start().await,
            Err(BrokerError::Session(SessionError::AccessDenied))
        );
        assert_eq!(session.snapshot().await.expect("snapshot").state, "inactive");

        handle.shutdown();
        runner.await.expect("broker loop should stop");
    }

    #[tokio::test]
    async fn started_session_selects_static_provider() {
        let mut broker = Broker::new(BrokerConfig::default(), Arc::new(AllowAll));
        let here = Location::new(60.17, 24.94, 30.0);
        broker
            .add_provider(
                ProviderDescriptor::new("manual"),
                Arc::new(StaticSource::new("manual", here.clone(), AccuracyLevel::Street)),
            )
            .expect("provider should register");
        let handle = broker.handle();
        let runner = tokio::spawn(broker.run());

        let mut session = handle.create_session(":1.9").await.expect("session");
        session.set_desktop_id("org.example.Maps").await.expect("desktop id");
        session.start().await.expect("start should succeed");
        assert_eq!(
            session.start().await,
            Err(BrokerError::Session(SessionError::AlreadyActive))
        );

        assert_eq!(
            session.recv_event().await.expect("event"),
            SessionEvent::ActiveChanged(true)
        );
        assert_eq!(
            session.recv_event().await.expect("event"),
            SessionEvent::ProviderChanged {
                interface: Interface::Position,
                old: None,
                new: Some("manual".to_string()),
            }
        );
        match session.recv_event().await.expect("event") {
            SessionEvent::LocationChanged(location) => {
                assert_eq!(location.latitude, here.latitude);
            }
            other => panic!("unexpected event {other:?}"),
        }

        handle.shutdown();
        runner.await.expect("broker loop should stop");
        assert_eq!(session.recv_event().await, Err(BrokerError::Closed));
    }
}
