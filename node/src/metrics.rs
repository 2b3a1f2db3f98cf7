//! # Prometheus Metrics
//!
//! Counters and gauges for a simulated swap. They are fed from the
//! [`SwapEvent`] streams of both clients and rendered in the Prometheus text
//! exposition format at the end of a run.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use swap_protocol::settlement::SettlementStep;
use swap_protocol::SwapEvent;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly: the prometheus handles are reference counted, so every
/// event-forwarding task can own a copy.
#[derive(Clone)]
pub struct SwapMetrics {
    registry: Registry,
    /// Messages published on the channel by either client.
    pub messages_published_total: IntCounter,
    /// Trade phase transitions, per peer.
    pub phase_transitions_total: IntCounterVec,
    /// Escrow calls started, per peer.
    pub settlement_calls_total: IntCounterVec,
    /// Escrow calls that failed, per peer.
    pub settlement_failures_total: IntCounterVec,
    /// Current [`swap_protocol::TradePhase`] code, per peer.
    pub trade_phase: IntGaugeVec,
}

impl SwapMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("swap".into()), None)?;

        let messages_published_total = IntCounter::new(
            "messages_published_total",
            "Messages published on the trade channel",
        )?;
        registry.register(Box::new(messages_published_total.clone()))?;

        let phase_transitions_total = IntCounterVec::new(
            Opts::new("phase_transitions_total", "Trade phase transitions"),
            &["peer"],
        )?;
        registry.register(Box::new(phase_transitions_total.clone()))?;

        let settlement_calls_total = IntCounterVec::new(
            Opts::new("settlement_calls_total", "Escrow calls started"),
            &["peer"],
        )?;
        registry.register(Box::new(settlement_calls_total.clone()))?;

        let settlement_failures_total = IntCounterVec::new(
            Opts::new("settlement_failures_total", "Escrow calls that failed"),
            &["peer"],
        )?;
        registry.register(Box::new(settlement_failures_total.clone()))?;

        let trade_phase = IntGaugeVec::new(
            Opts::new("trade_phase", "Current trade phase code"),
            &["peer"],
        )?;
        registry.register(Box::new(trade_phase.clone()))?;

        Ok(Self {
            registry,
            messages_published_total,
            phase_transitions_total,
            settlement_calls_total,
            settlement_failures_total,
            trade_phase,
        })
    }

    /// Updates the metrics of `peer` from one client event.
    pub fn observe(&self, peer: &str, event: &SwapEvent) {
        match event {
            SwapEvent::PhaseChanged { to, .. } => {
                self.phase_transitions_total.with_label_values(&[peer]).inc();
                self.trade_phase.with_label_values(&[peer]).set(to.code());
            }
            SwapEvent::Settlement(status) => {
                if status.busy {
                    self.settlement_calls_total.with_label_values(&[peer]).inc();
                }
                if matches!(status.step, SettlementStep::Failed(_)) {
                    self.settlement_failures_total.with_label_values(&[peer]).inc();
                }
            }
            _ => {}
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swap_protocol::settlement::{SettlementOp, SettlementStatus};
    use swap_protocol::TradePhase;

    fn status(step: SettlementStep, busy: bool) -> SwapEvent {
        SwapEvent::Settlement(SettlementStatus {
            step,
            message: String::new(),
            busy,
            signature: None,
            expires_at: None,
        })
    }

    #[test]
    fn phase_events_move_the_gauge() {
        let metrics = SwapMetrics::new().unwrap();
        metrics.observe(
            "a",
            &SwapEvent::PhaseChanged {
                from: TradePhase::Idle,
                to: TradePhase::Proposing,
            },
        );
        assert_eq!(metrics.trade_phase.with_label_values(&["a"]).get(), 2);
        assert_eq!(metrics.phase_transitions_total.with_label_values(&["a"]).get(), 1);
        assert_eq!(metrics.phase_transitions_total.with_label_values(&["b"]).get(), 0);
    }

    #[test]
    fn settlement_calls_and_failures_are_counted() {
        let metrics = SwapMetrics::new().unwrap();
        metrics.observe("b", &status(SettlementStep::Depositing, true));
        metrics.observe("b", &status(SettlementStep::Failed(SettlementOp::Deposit), false));
        assert_eq!(metrics.settlement_calls_total.with_label_values(&["b"]).get(), 1);
        assert_eq!(metrics.settlement_failures_total.with_label_values(&["b"]).get(), 1);
    }

    #[test]
    fn encoding_uses_the_namespace() {
        let metrics = SwapMetrics::new().unwrap();
        metrics.messages_published_total.inc_by(4);
        let text = metrics.encode().unwrap();
        assert!(text.contains("swap_messages_published_total 4"));
    }
}
