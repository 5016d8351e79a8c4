//! Exchange metrics
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding application installs a recorder.
//!
//! # Metrics
//!
//! - `agentchat_exchanges_total`: Counter of settled exchanges by outcome
//! - `agentchat_exchange_duration_seconds`: Histogram of exchange duration
//! - `agentchat_fragments_total`: Counter of delivered text fragments
//! - `agentchat_malformed_events_total`: Counter of skipped malformed events
//! - `agentchat_active_exchanges`: Gauge of exchanges in flight
//!
//! # Examples
//!
//! ```
//! use agentchat::stream::metrics::{ExchangeMetrics, ExchangeOutcome};
//!
//! let mut metrics = ExchangeMetrics::start("http");
//! metrics.record_fragment();
//! metrics.finish(ExchangeOutcome::Complete);
//! ```

use std::time::{Duration, Instant};

use metrics::{counter, decrement_gauge, histogram, increment_counter, increment_gauge};

/// How an exchange settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Stream ended normally
    Complete,
    /// A classified error ended the exchange
    Error,
    /// The caller stopped the exchange
    Cancelled,
    /// Input rejected before any channel call
    Rejected,
}

impl ExchangeOutcome {
    /// Label value used on the exchange counter.
    pub fn as_str(self) -> &'static str {
        match self {
            ExchangeOutcome::Complete => "complete",
            ExchangeOutcome::Error => "error",
            ExchangeOutcome::Cancelled => "cancelled",
            ExchangeOutcome::Rejected => "rejected",
        }
    }
}

/// Metrics for one exchange.
///
/// Records its outcome at most once.
#[derive(Debug)]
pub struct ExchangeMetrics {
    channel: &'static str,
    start: Instant,
    fragments: u64,
    recorded: bool,
}

impl ExchangeMetrics {
    /// Start tracking an exchange on the named channel.
    pub fn start(channel: &'static str) -> Self {
        increment_gauge!("agentchat_active_exchanges", 1.0, "channel" => channel);

        Self {
            channel,
            start: Instant::now(),
            fragments: 0,
            recorded: false,
        }
    }

    /// Count one delivered fragment.
    pub fn record_fragment(&mut self) {
        self.fragments += 1;
    }

    /// Fragments delivered so far
    pub fn fragments(&self) -> u64 {
        self.fragments
    }

    /// Time since the exchange started
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record the outcome along with duration and fragment totals.
    ///
    /// `malformed` is the number of events the extractor skipped as
    /// malformed during this exchange.
    pub fn finish_with(&mut self, outcome: ExchangeOutcome, malformed: u64) {
        if self.recorded {
            return;
        }
        self.recorded = true;

        let duration = self.start.elapsed();

        increment_counter!(
            "agentchat_exchanges_total",
            "channel" => self.channel,
            "outcome" => outcome.as_str()
        );

        histogram!(
            "agentchat_exchange_duration_seconds",
            duration.as_secs_f64(),
            "channel" => self.channel,
            "outcome" => outcome.as_str()
        );

        counter!("agentchat_fragments_total", self.fragments, "channel" => self.channel);

        if malformed > 0 {
            counter!("agentchat_malformed_events_total", malformed, "channel" => self.channel);
        }

        decrement_gauge!("agentchat_active_exchanges", 1.0, "channel" => self.channel);
    }

    /// Record the outcome with no malformed events.
    pub fn finish(&mut self, outcome: ExchangeOutcome) {
        self.finish_with(outcome, 0);
    }
}

impl Drop for ExchangeMetrics {
    fn drop(&mut self) {
        // An exchange future dropped mid-flight counts as cancelled.
        if !self.recorded {
            self.finish(ExchangeOutcome::Cancelled);
        }
    }
}
