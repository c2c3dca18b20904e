//! Prometheus-compatible metrics for the courier agent.
//!
//! Counters come from the runtime's status snapshot; the server only
//! counts its own requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use courier_runtime::AgentStatus;

#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Total HTTP requests served.
    http_requests_total: AtomicU64,
    /// Server start time for uptime calculation.
    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                http_requests_total: AtomicU64::new(0),
                started_at: Instant::now(),
            }),
        }
    }

    pub fn inc_http_requests(&self) {
        self.inner
            .http_requests_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }

    /// Render metrics in Prometheus text exposition format.
    pub fn render_prometheus(&self, status: &AgentStatus) -> String {
        let credential_expiry = status
            .credential_expires_at
            .map(|t| t.timestamp())
            .unwrap_or(0);

        format!(
            r#"# HELP courier_uptime_seconds Time since the server started.
# TYPE courier_uptime_seconds gauge
courier_uptime_seconds {}

# HELP courier_http_requests_total Total HTTP requests served.
# TYPE courier_http_requests_total counter
courier_http_requests_total {}

# HELP courier_cycles_completed_total Poll cycles that ran to completion.
# TYPE courier_cycles_completed_total counter
courier_cycles_completed_total {}

# HELP courier_cycles_failed_total Poll cycles that ended early.
# TYPE courier_cycles_failed_total counter
courier_cycles_failed_total {}

# HELP courier_messages_decoded_total Channel messages decrypted.
# TYPE courier_messages_decoded_total counter
courier_messages_decoded_total {}

# HELP courier_replies_sent_total Replies confirmed on the ledger.
# TYPE courier_replies_sent_total counter
courier_replies_sent_total {}

# HELP courier_member_channels Channels the agent currently belongs to.
# TYPE courier_member_channels gauge
courier_member_channels {}

# HELP courier_active_conversations Channels with conversation history.
# TYPE courier_active_conversations gauge
courier_active_conversations {}

# HELP courier_credential_expiry_timestamp_seconds Expiry of the session credential (0 when none).
# TYPE courier_credential_expiry_timestamp_seconds gauge
courier_credential_expiry_timestamp_seconds {}
"#,
            self.uptime_secs(),
            self.inner.http_requests_total.load(Ordering::Relaxed),
            status.cycles_completed,
            status.cycles_failed,
            status.messages_decoded,
            status.replies_sent,
            status.member_channels,
            status.active_conversations,
            credential_expiry,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_counter_increments() {
        let m = Metrics::new();
        m.inc_http_requests();
        m.inc_http_requests();
        let output = m.render_prometheus(&AgentStatus::default());
        assert!(output.contains("courier_http_requests_total 2"));
    }

    #[test]
    fn test_metrics_reflect_status() {
        let m = Metrics::new();
        let status = AgentStatus {
            cycles_completed: 7,
            cycles_failed: 1,
            replies_sent: 3,
            member_channels: 2,
            ..Default::default()
        };
        let output = m.render_prometheus(&status);
        assert!(output.contains("courier_cycles_completed_total 7"));
        assert!(output.contains("courier_cycles_failed_total 1"));
        assert!(output.contains("courier_replies_sent_total 3"));
        assert!(output.contains("courier_member_channels 2"));
        assert!(output.contains("courier_credential_expiry_timestamp_seconds 0"));
    }

    #[test]
    fn test_metrics_prometheus_format() {
        let output = Metrics::new().render_prometheus(&AgentStatus::default());
        assert!(output.contains("# HELP courier_uptime_seconds"));
        assert!(output.contains("# TYPE courier_uptime_seconds gauge"));
        assert!(output.contains("# TYPE courier_replies_sent_total counter"));
    }
}
