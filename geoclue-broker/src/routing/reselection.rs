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

//! Decides whether a provider status change warrants a new selection pass.

use crate::control_plane::provider_registry::ProviderId;
use crate::sources::location_source::ProviderStatus;

/// Why a selection pass runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReselectReason {
    /// Nothing was selected and a provider became usable.
    FirstUsable,
    /// The selected provider stopped being usable.
    SelectionLost,
    /// A provider ranked ahead of the selection became usable.
    BetterAvailable,
}

impl ReselectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ReselectReason::FirstUsable => "first_usable",
            ReselectReason::SelectionLost => "selection_lost",
            ReselectReason::BetterAvailable => "better_available",
        }
    }
}

/// Applies the reselection trigger rule for one (session, interface).
///
/// `candidates` is the session's ranked admissible list after the change, `current` its
/// selection and `changed` the provider whose status became `status`. Lower-ranked
/// providers coming and going never trigger a pass.
pub fn reselect_reason(
    candidates: &[ProviderId],
    current: Option<ProviderId>,
    changed: ProviderId,
    status: ProviderStatus,
) -> Option<ReselectReason> {
    let available = status.is_usable();
    let Some(current) = current else {
        return available.then_some(ReselectReason::FirstUsable);
    };
    if current == changed {
        return (!available).then_some(ReselectReason::SelectionLost);
    }
    if !available {
        return None;
    }
    let rank = |id: ProviderId| candidates.iter().position(|candidate| *candidate == id);
    match (rank(changed), rank(current)) {
        (Some(changed_rank), Some(current_rank)) if changed_rank < current_rank => {
            Some(ReselectReason::BetterAvailable)
        }
        // The selection fell out of the list without its own status changing.
        (Some(_), None) => Some(ReselectReason::BetterAvailable),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{reselect_reason, ReselectReason};
    use crate::control_plane::provider_registry::{ProviderId, ProviderRegistry};
    use crate::control_plane::descriptor::ProviderDescriptor;
    use crate::sources::location_source::ProviderStatus;

    fn ids() -> (ProviderId, ProviderId, ProviderId) {
        let mut registry = ProviderRegistry::new();
        let a = registry.insert(ProviderDescriptor::new("a")).expect("insert a");
        let b = registry.insert(ProviderDescriptor::new("b")).expect("insert b");
        let c = registry.insert(ProviderDescriptor::new("c")).expect("insert c");
        (a, b, c)
    }

    #[test]
    fn empty_selection_reacts_only_to_available() {
        let (a, _, _) = ids();
        assert_eq!(
            reselect_reason(&[a], None, a, ProviderStatus::Available),
            Some(ReselectReason::FirstUsable)
        );
        assert_eq!(reselect_reason(&[], None, a, ProviderStatus::Acquiring), None);
    }

    #[test]
    fn losing_the_selection_triggers() {
        let (a, b, _) = ids();
        assert_eq!(
            reselect_reason(&[b], Some(a), a, ProviderStatus::Error),
            Some(ReselectReason::SelectionLost)
        );
        assert_eq!(reselect_reason(&[a, b], Some(a), a, ProviderStatus::Available), None);
    }

    #[test]
    fn only_higher_ranked_arrivals_trigger() {
        let (a, b, c) = ids();
        assert_eq!(
            reselect_reason(&[a, b, c], Some(b), a, ProviderStatus::Available),
            Some(ReselectReason::BetterAvailable)
        );
        assert_eq!(reselect_reason(&[a, b, c], Some(b), c, ProviderStatus::Available), None);
        assert_eq!(reselect_reason(&[a, b], Some(a), c, ProviderStatus::Error), None);
        assert_eq!(reselect_reason(&[a, b], Some(b), a, ProviderStatus::Unavailable), None);
    }
}
