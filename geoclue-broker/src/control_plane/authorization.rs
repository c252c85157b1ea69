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

//! Authorization collaborator interface and a static policy implementation.

use crate::accuracy::AccuracyLevel;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// What the policy collaborator allows for one application.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    pub max_accuracy: AccuracyLevel,
}

impl AuthorizationDecision {
    pub const DENIED: AuthorizationDecision = AuthorizationDecision {
        allowed: false,
        max_accuracy: AccuracyLevel::None,
    };

    pub fn allow(max_accuracy: AccuracyLevel) -> Self {
        Self {
            allowed: true,
            max_accuracy,
        }
    }

    /// The accuracy cap, or `None` when the decision grants no access at all.
    pub fn cap(&self) -> Option<AccuracyLevel> {
        (self.allowed && self.max_accuracy > AccuracyLevel::None).then_some(self.max_accuracy)
    }
}

impl Default for AuthorizationDecision {
    fn default() -> Self {
        Self::allow(AccuracyLevel::Exact)
    }
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, desktop_id: &str, requested: AccuracyLevel) -> AuthorizationDecision;
}

/// Grants every request at the requested accuracy.
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(&self, _desktop_id: &str, requested: AccuracyLevel) -> AuthorizationDecision {
        AuthorizationDecision::allow(requested)
    }
}

/// Default decision plus per-application overrides.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthorizationPolicy {
    pub default: AuthorizationDecision,
    pub applications: HashMap<String, AuthorizationDecision>,
}

impl AuthorizationPolicy {
    pub fn decision_for(&self, desktop_id: &str) -> AuthorizationDecision {
        self.applications
            .get(desktop_id)
            .copied()
            .unwrap_or(self.default)
    }
}

struct PolicySnapshot {
    version: u64,
    policy: AuthorizationPolicy,
}

/// Table-driven [`Authorizer`] whose policy can be swapped at runtime.
///
/// Reads never block on a replacement. [`StaticAuthorizer::replace`] reports every
/// application whose effective decision changed, including applications that fell back
/// to a changed default, so the caller can push those decisions to the broker.
pub struct StaticAuthorizer {
    snapshot: ArcSwap<PolicySnapshot>,
    next_version: AtomicU64,
    seen: Mutex<BTreeSet<String>>,
}

impl StaticAuthorizer {
    pub fn new(policy: AuthorizationPolicy) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(PolicySnapshot { version: 0, policy }),
            next_version: AtomicU64::new(1),
            seen: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn decision_for(&self, desktop_id: &str) -> AuthorizationDecision {
        self.snapshot.load().policy.decision_for(desktop_id)
    }

    pub fn version(&self) -> u64 {
        self.snapshot.load().version
    }

    /// Installs `policy` and returns the applications whose decision changed.
    pub fn replace(&self, policy: AuthorizationPolicy) -> Vec<(String, AuthorizationDecision)> {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        let previous = self.snapshot.swap(Arc::new(PolicySnapshot { version, policy }));
        let current = self.snapshot.load();

        let mut affected: BTreeSet<String> = self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        affected.extend(previous.policy.applications.keys().cloned());
        affected.extend(current.policy.applications.keys().cloned());

        affected
            .into_iter()
            .filter_map(|desktop_id| {
                let before = previous.policy.decision_for(&desktop_id);
                let after = current.policy.decision_for(&desktop_id);
                (before != after).then_some((desktop_id, after))
            })
            .collect()
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn authorize(&self, desktop_id: &str, _requested: AccuracyLevel) -> AuthorizationDecision {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(desktop_id.to_string());
        self.decision_for(desktop_id)
    }
}
