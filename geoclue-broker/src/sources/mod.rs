//! Location source layer.
//!
//! Defines the [`LocationSource`](location_source::LocationSource) capability the broker
//! consumes, the refcounted process-wide registry for shared instances, and the concrete
//! in-crate sources. Web-backed sources compose [`WebSourceCore`](web_source::WebSourceCore)
//! for connectivity gating and cancellable fetches.
//!
//! ```
//! use geoclue_broker::sources::location_source::{Activation, Deactivation, LocationSource};
//! use geoclue_broker::sources::static_source::StaticSource;
//! use geoclue_broker::{AccuracyLevel, Location};
//!
//! let source = StaticSource::new("manual", Location::new(52.52, 13.40, 50.0), AccuracyLevel::Street);
//!
//! // Activation is refcounted: only the last stop really stops the source.
//! assert_eq!(source.start().unwrap(), Activation::Started);
//! assert_eq!(source.start().unwrap(), Activation::AlreadyActive);
//! assert_eq!(source.stop().unwrap(), Deactivation::StillInUse);
//! assert_eq!(source.stop().unwrap(), Deactivation::Stopped);
//! ```

pub mod ip_source;
pub mod location_source;
pub mod source_registry;
pub mod static_source;
pub mod web_source;
