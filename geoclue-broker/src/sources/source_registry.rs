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

//! Process-wide, refcounted registry of shared source instances.
//!
//! Hardware-backed sources (Wi-Fi, modem) must exist at most once per process even when
//! several providers are built on them. Instead of global statics, callers obtain a
//! [`SourceLease`] from a [`SourceRegistry`]; the instance is dropped when the last lease
//! goes away. Tests build their own registry and hand in fake factories.

use crate::observability::events;
use crate::sources::location_source::LocationSource;
use std::collections::HashMap;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

const COMPONENT: &str = "source_registry";

/// Key identifying one shared source instance.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum SourceKind {
    Wifi,
    Ip,
    Modem,
    Static(String),
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Wifi => f.write_str("wifi"),
            SourceKind::Ip => f.write_str("ip"),
            SourceKind::Modem => f.write_str("modem"),
            SourceKind::Static(name) => write!(f, "static:{}", name),
        }
    }
}

struct SourceBinding {
    ref_count: usize,
    source: Arc<dyn LocationSource>,
}

type Bindings = Arc<Mutex<HashMap<SourceKind, SourceBinding>>>;

/// Refcounted registry of source instances keyed by [`SourceKind`].
#[derive(Clone, Default)]
pub struct SourceRegistry {
    bindings: Bindings,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a lease on the instance for `kind`, creating it with `factory` on first use.
    pub fn acquire<F>(&self, kind: SourceKind, factory: F) -> SourceLease
    where
        F: FnOnce() -> Arc<dyn LocationSource>,
    {
        let mut bindings = self.bindings.lock().unwrap_or_else(PoisonError::into_inner);

        let binding = bindings.entry(kind.clone()).or_insert_with(|| {
            debug!(
                event = events::SOURCE_ACQUIRE_CREATE,
                component = COMPONENT,
                kind = %kind,
                "creating shared source instance"
            );
            SourceBinding {
                ref_count: 0,
                source: factory(),
            }
        });
        binding.ref_count += 1;
        if binding.ref_count > 1 {
            debug!(
                event = events::SOURCE_ACQUIRE_REUSE,
                component = COMPONENT,
                kind = %kind,
                ref_count = binding.ref_count,
                "reusing shared source instance"
            );
        }

        SourceLease {
            kind,
            source: binding.source.clone(),
            bindings: self.bindings.clone(),
        }
    }

    /// Current lease count for `kind`; zero when no instance exists.
    pub fn ref_count(&self, kind: &SourceKind) -> usize {
        self.bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .map(|binding| binding.ref_count)
            .unwrap_or(0)
    }

    pub fn contains(&self, kind: &SourceKind) -> bool {
        self.ref_count(kind) > 0
    }
}

/// Shared handle on a registry-owned source. Dropping it releases one reference.
pub struct SourceLease {
    kind: SourceKind,
    source: Arc<dyn LocationSource>,
    bindings: Bindings,
}

impl SourceLease {
    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }

    pub fn source(&self) -> Arc<dyn LocationSource> {
        self.source.clone()
    }
}

impl Deref for SourceLease {
    type Target = dyn LocationSource;

    fn deref(&self) -> &Self::Target {
        self.source.as_ref()
    }
}

impl Drop for SourceLease {
    fn drop(&mut self) {
        let mut bindings = self.bindings.lock().unwrap_or_else(PoisonError::into_inner);

        let remaining = {
            let Some(binding) = bindings.get_mut(&self.kind) else {
                warn!(
                    event = events::SOURCE_RELEASE,
                    component = COMPONENT,
                    kind = %self.kind,
                    reason = "missing_binding",
                    "released a lease with no registry binding"
                );
                return;
            };
            binding.ref_count -= 1;
            binding.ref_count
        };

        if remaining == 0 {
            bindings.remove(&self.kind);
            debug!(
                event = events::SOURCE_RELEASE,
                component = COMPONENT,
                kind = %self.kind,
                "dropped shared source instance"
            );
        }
    }
}

impl fmt::Debug for SourceLease {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceLease")
            .field("kind", &self.kind)
            .field("source", &self.source.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{SourceKind, SourceRegistry};
    use crate::accuracy::AccuracyLevel;
    use crate::sources::location_source::LocationSource;
    use crate::sources::static_source::StaticSource;
    use crate::location::Location;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn manual(name: &str) -> Arc<dyn LocationSource> {
        Arc::new(StaticSource::new(
            name,
            Location::new(1.0, 2.0, 10.0),
            AccuracyLevel::Exact,
        ))
    }

    #[test]
    fn acquire_reuses_instance_and_counts_references() {
        let registry = SourceRegistry::new();
        let created = AtomicUsize::new(0);
        let factory = || {
            created.fetch_add(1, Ordering::SeqCst);
            manual("wifi")
        };

        let first = registry.acquire(SourceKind::Wifi, factory);
        let second = registry.acquire(SourceKind::Wifi, || {
            created.fetch_add(1, Ordering::SeqCst);
            manual("other")
        });

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first.source(), &second.source()));
        assert_eq!(second.name(), "wifi");
        assert_eq!(registry.ref_count(&SourceKind::Wifi), 2);
    }

    #[test]
    fn last_lease_drop_releases_instance() {
        let registry = SourceRegistry::new();
        let first = registry.acquire(SourceKind::Ip, || manual("ip"));
        let second = registry.acquire(SourceKind::Ip, || manual("ip"));

        drop(first);
        assert!(registry.contains(&SourceKind::Ip));
        drop(second);
        assert!(!registry.contains(&SourceKind::Ip));

        let fresh = registry.acquire(SourceKind::Ip, || manual("ip-again"));
        assert_eq!(fresh.name(), "ip-again");
    }

    #[test]
    fn kinds_are_isolated() {
        let registry = SourceRegistry::new();
        let _home = registry.acquire(SourceKind::Static("home".into()), || manual("home"));
        let _work = registry.acquire(SourceKind::Static("work".into()), || manual("work"));

        assert_eq!(registry.ref_count(&SourceKind::Static("home".into())), 1);
        assert_eq!(registry.ref_count(&SourceKind::Static("work".into())), 1);
        assert_eq!(registry.ref_count(&SourceKind::Wifi), 0);
    }
}
