//! Control channel metrics.
//!
//! # Metrics
//! - `control_channel_messages_received_total` (counter): decoded inbound messages by type
//! - `control_channel_decode_failures_total` (counter): inbound frames dropped as undecodable
//! - `control_channel_unhandled_messages_total` (counter): decoded messages with no typed handler
//! - `control_channel_requests_sent_total` (counter): outbound requests by type
//! - `control_channel_connect_attempts_total` (counter): connect attempts by outcome
//!
//! # Design Decisions
//! - Labels are wire type names, a small closed set fixed by the registry
//! - Recording goes through the `metrics` facade; exposition is the embedder's choice

pub const MESSAGES_RECEIVED: &str = "control_channel_messages_received_total";
pub const DECODE_FAILURES: &str = "control_channel_decode_failures_total";
pub const UNHANDLED_MESSAGES: &str = "control_channel_unhandled_messages_total";
pub const REQUESTS_SENT: &str = "control_channel_requests_sent_total";
pub const CONNECT_ATTEMPTS: &str = "control_channel_connect_attempts_total";

/// Outcome label for [`record_connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Success,
    Rejected,
    Failed,
}

impl ConnectOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectOutcome::Success => "success",
            ConnectOutcome::Rejected => "rejected",
            ConnectOutcome::Failed => "failed",
        }
    }
}

pub fn record_message_received(type_name: &str) {
    metrics::counter!(MESSAGES_RECEIVED, "type" => type_name.to_string()).increment(1);
}

pub fn record_decode_failure() {
    metrics::counter!(DECODE_FAILURES).increment(1);
}

pub fn record_unhandled(type_name: &str) {
    metrics::counter!(UNHANDLED_MESSAGES, "type" => type_name.to_string()).increment(1);
}

pub fn record_request_sent(type_name: &str) {
    metrics::counter!(REQUESTS_SENT, "type" => type_name.to_string()).increment(1);
}

pub fn record_connect(outcome: ConnectOutcome) {
    metrics::counter!(CONNECT_ATTEMPTS, "outcome" => outcome.as_str()).increment(1);
}
