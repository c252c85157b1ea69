//! Canonical structured event names used across `geoclue-broker`.

// Provider registry events.
pub const PROVIDER_LOAD_OK: &str = "provider_load_ok";
pub const PROVIDER_LOAD_SKIPPED: &str = "provider_load_skipped";
pub const PROVIDER_BIND: &str = "provider_bind";
pub const PROVIDER_REMOVE: &str = "provider_remove";
pub const PROVIDER_STATUS_CHANGED: &str = "provider_status_changed";
pub const PROVIDER_ACCURACY_CHANGED: &str = "provider_accuracy_changed";
pub const PROVIDER_EVENT_UNKNOWN: &str = "provider_event_unknown";

// Source activation and subscription events.
pub const SOURCE_START_OK: &str = "source_start_ok";
pub const SOURCE_START_FAILED: &str = "source_start_failed";
pub const SOURCE_STOP_OK: &str = "source_stop_ok";
pub const SOURCE_STOP_FAILED: &str = "source_stop_failed";
pub const SOURCE_ACQUIRE_CREATE: &str = "source_acquire_create";
pub const SOURCE_ACQUIRE_REUSE: &str = "source_acquire_reuse";
pub const SOURCE_RELEASE: &str = "source_release";
pub const SOURCE_SINK_CLOSED: &str = "source_sink_closed";

// Arbitration and relay events.
pub const SESSION_RESELECT: &str = "session_reselect";
pub const SESSION_PROVIDER_CHANGED: &str = "session_provider_changed";
pub const SESSION_VALUE_FORWARDED: &str = "session_value_forwarded";
pub const SESSION_VALUE_SUPPRESSED: &str = "session_value_suppressed";
pub const ACCURACY_SWEEP: &str = "accuracy_sweep";

// Session lifecycle events.
pub const SESSION_CREATE: &str = "session_create";
pub const SESSION_REUSE: &str = "session_reuse";
pub const SESSION_DESTROY: &str = "session_destroy";
pub const SESSION_START_OK: &str = "session_start_ok";
pub const SESSION_START_DENIED: &str = "session_start_denied";
pub const SESSION_START_CANCELLED: &str = "session_start_cancelled";
pub const SESSION_STOP: &str = "session_stop";
pub const SESSION_FORCE_STOP: &str = "session_force_stop";
pub const SESSION_RESTART: &str = "session_restart";
pub const SESSION_RECLAMP: &str = "session_reclamp";
pub const SESSION_REPLY_DROPPED: &str = "session_reply_dropped";
pub const SESSION_EVENTS_LAGGED: &str = "session_events_lagged";

// Broker loop events.
pub const BROKER_LOOP_START: &str = "broker_loop_start";
pub const BROKER_LOOP_STOP: &str = "broker_loop_stop";
pub const MEMORY_PRESSURE: &str = "memory_pressure";

// Web geolocation and Wi-Fi events.
pub const WEB_FETCH_START: &str = "web_fetch_start";
pub const WEB_FETCH_OK: &str = "web_fetch_ok";
pub const WEB_FETCH_FAILED: &str = "web_fetch_failed";
pub const WEB_FETCH_CANCELLED: &str = "web_fetch_cancelled";
pub const WEB_NETWORK_CHANGED: &str = "web_network_changed";
pub const WIFI_SCAN_OK: &str = "wifi_scan_ok";
pub const WIFI_SCAN_FAILED: &str = "wifi_scan_failed";
pub const WIFI_AP_PROMOTED: &str = "wifi_ap_promoted";
pub const WIFI_AP_DEMOTED: &str = "wifi_ap_demoted";
pub const WIFI_DEMAND_CHANGED: &str = "wifi_demand_changed";
pub const WIFI_REFRESH_SKIPPED: &str = "wifi_refresh_skipped";
pub const WIFI_CACHE_HIT: &str = "wifi_cache_hit";
pub const WIFI_CACHE_MISS: &str = "wifi_cache_miss";
pub const WIFI_FETCH_COALESCED: &str = "wifi_fetch_coalesced";
pub const WIFI_CACHE_PRUNE: &str = "wifi_cache_prune";
pub const WIFI_CACHE_CLEAR: &str = "wifi_cache_clear";
pub const WIFI_LOOP_START: &str = "wifi_loop_start";
pub const WIFI_LOOP_STOP: &str = "wifi_loop_stop";
