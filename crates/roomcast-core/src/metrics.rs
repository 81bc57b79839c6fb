//! Metric name constants shared by the router and the transport.
//!
//! The core only emits through the `metrics` facade; installing a recorder is
//! the embedding binary's job.

/// Connections accepted total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Connections torn down total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Registered connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Inbound control messages total (counter, labels: type).
pub const MESSAGES_ROUTED_TOTAL: &str = "messages_routed_total";
/// Successful per-recipient deliveries total (counter, labels: scope).
pub const DELIVERIES_TOTAL: &str = "deliveries_total";
/// Failed per-recipient deliveries total (counter, labels: scope, `error_type`).
pub const SEND_FAILURES_TOTAL: &str = "send_failures_total";
/// Fan-out duration in seconds (histogram, labels: scope).
pub const FAN_OUT_DURATION_SECONDS: &str = "fan_out_duration_seconds";
/// Recipients evicted after a failed send total (counter).
pub const EVICTIONS_TOTAL: &str = "evictions_total";
/// Frames dropped as undecodable total (counter, labels: `error_type`).
pub const PROTOCOL_ERRORS_TOTAL: &str = "protocol_errors_total";
/// Transport read failures total (counter).
pub const RECEIVE_ERRORS_TOTAL: &str = "receive_errors_total";
