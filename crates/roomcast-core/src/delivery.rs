//! Fan-out delivery with per-recipient failure handling.
//!
//! Delivery is best-effort: a failed send evicts that recipient and the
//! remaining recipients are still attempted. Sends within one fan-out run
//! concurrently and each is bounded by the send timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use metrics::{counter, histogram};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::envelope::Payload;
use crate::errors::SendError;
use crate::events::EventSink;
use crate::ids::ConnectionId;
use crate::lifecycle::LifecycleManager;
use crate::metrics::{DELIVERIES_TOTAL, FAN_OUT_DURATION_SECONDS, SEND_FAILURES_TOTAL};

/// Outcome of one fan-out call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Recipients a send was attempted to (sender excluded).
    pub attempted: usize,
    /// Sends that succeeded.
    pub delivered: usize,
    /// Recipients evicted after a failed send.
    pub evicted: usize,
}

/// Sends payloads to registry-wide or room-scoped recipient sets.
#[derive(Clone)]
pub struct DeliveryEngine {
    lifecycle: LifecycleManager,
    events: Arc<dyn EventSink>,
    send_timeout: Duration,
}

impl DeliveryEngine {
    /// Create an engine that evicts through `lifecycle` and reports to `events`.
    pub fn new(
        lifecycle: LifecycleManager,
        events: Arc<dyn EventSink>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            lifecycle,
            events,
            send_timeout,
        }
    }

    /// Deliver `payload` to every registered connection except `sender`.
    pub async fn broadcast(&self, sender: &ConnectionId, payload: Payload) -> DeliveryReport {
        let recipients: Vec<_> = self
            .lifecycle
            .registry()
            .connections()
            .into_iter()
            .filter(|c| c.id() != sender)
            .collect();
        self.fan_out("broadcast", recipients, Arc::new(payload)).await
    }

    /// Deliver `payload` to every member of `room` except `sender`.
    ///
    /// An unknown or empty room delivers nothing.
    pub async fn multicast(
        &self,
        sender: &ConnectionId,
        room: &str,
        payload: Payload,
    ) -> DeliveryReport {
        let recipients: Vec<_> = self
            .lifecycle
            .rooms()
            .members(room)
            .into_iter()
            .filter(|c| c.id() != sender)
            .collect();
        self.fan_out("multicast", recipients, Arc::new(payload)).await
    }

    async fn fan_out(
        &self,
        scope: &'static str,
        recipients: Vec<Arc<dyn Connection>>,
        payload: Arc<Payload>,
    ) -> DeliveryReport {
        let mut report = DeliveryReport {
            attempted: recipients.len(),
            ..DeliveryReport::default()
        };
        if recipients.is_empty() {
            debug!(scope, "no recipients");
            return report;
        }

        let start = Instant::now();
        let sends = recipients.iter().map(|recipient| {
            let payload = Arc::clone(&payload);
            async move {
                match tokio::time::timeout(self.send_timeout, recipient.send(payload)).await {
                    Ok(result) => result,
                    Err(_) => Err(SendError::Timeout(self.send_timeout)),
                }
            }
        });
        let results = join_all(sends).await;
        histogram!(FAN_OUT_DURATION_SECONDS, "scope" => scope)
            .record(start.elapsed().as_secs_f64());

        for (recipient, result) in recipients.iter().zip(results) {
            match result {
                Ok(()) => {
                    report.delivered += 1;
                    counter!(DELIVERIES_TOTAL, "scope" => scope).increment(1);
                    self.events.on_sent(recipient.as_ref(), &payload);
                }
                Err(error) => {
                    counter!(SEND_FAILURES_TOTAL, "scope" => scope, "error_type" => error.error_kind())
                        .increment(1);
                    warn!(
                        scope,
                        conn_id = %recipient.id(),
                        session_id = %recipient.session_id(),
                        error = %error,
                        "send failed, evicting recipient"
                    );
                    if self.lifecycle.evict(recipient) {
                        report.evicted += 1;
                    }
                    self.events.on_send_error(recipient.as_ref(), &error);
                }
            }
        }

        debug!(
            scope,
            recipients = report.attempted,
            delivered = report.delivered,
            evicted = report.evicted,
            "fan-out complete"
        );
        report
    }
}
