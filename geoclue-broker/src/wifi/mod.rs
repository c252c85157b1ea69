//! Wi-Fi source layer.
//!
//! Separates physical scan cadence from geolocation query cadence. The
//! [`ScanScheduler`](scan_scheduler::ScanScheduler) tracks visible access points and the
//! adaptive scan interval, [`Fingerprint`](fingerprint::Fingerprint) keys the
//! [`WifiCache`](cache::WifiCache), and [`WifiSource`](wifi_source::WifiSource) ties both to
//! a [`WifiScanner`](access_point::WifiScanner) and a web geolocator.

pub mod access_point;
pub mod cache;
pub mod fingerprint;
pub mod scan_scheduler;
pub mod wifi_source;
