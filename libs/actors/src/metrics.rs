//! Runtime Metrics
//!
//! Lock-free counters shared by a registry and its actors. Read them through
//! [`RuntimeMetrics::snapshot`].

use crate::supervisor::Directive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Registry-wide counters
#[derive(Debug, Default)]
pub struct RuntimeMetrics {
    pub activations: AtomicU64,
    pub activation_failures: AtomicU64,
    pub deactivations: AtomicU64,
    pub evictions: AtomicU64,

    pub messages_processed: AtomicU64,
    pub total_processing_time_ns: AtomicU64,
    pub handler_failures: AtomicU64,
    pub drain_turns: AtomicU64,

    // Supervision
    pub resumes: AtomicU64,
    pub restarts: AtomicU64,
    pub restart_failures: AtomicU64,
    pub stops: AtomicU64,
    pub escalations: AtomicU64,

    // Mailbox
    pub deliveries_rejected: AtomicU64,
    pub messages_evicted: AtomicU64,

    // Persistence
    pub saves: AtomicU64,
    pub save_failures: AtomicU64,
}

impl RuntimeMetrics {
    pub fn record_message_handled(&self, duration: Duration) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        self.total_processing_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_directive(&self, directive: Directive) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
        let counter = match directive {
            Directive::Resume => &self.resumes,
            Directive::Restart => &self.restarts,
            Directive::Stop => &self.stops,
            Directive::Escalate => &self.escalations,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_save(&self, success: bool) {
        if success {
            self.saves.fetch_add(1, Ordering::Relaxed);
        } else {
            self.save_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn avg_processing_time_ns(&self) -> f64 {
        let count = self.messages_processed.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.total_processing_time_ns.load(Ordering::Relaxed) as f64 / count as f64
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> RuntimeStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RuntimeStats {
            activations: load(&self.activations),
            activation_failures: load(&self.activation_failures),
            deactivations: load(&self.deactivations),
            evictions: load(&self.evictions),
            messages_processed: load(&self.messages_processed),
            avg_processing_time_ns: self.avg_processing_time_ns(),
            handler_failures: load(&self.handler_failures),
            drain_turns: load(&self.drain_turns),
            supervision: SupervisionStats {
                resumes: load(&self.resumes),
                restarts: load(&self.restarts),
                restart_failures: load(&self.restart_failures),
                stops: load(&self.stops),
                escalations: load(&self.escalations),
            },
            deliveries_rejected: load(&self.deliveries_rejected),
            messages_evicted: load(&self.messages_evicted),
            saves: load(&self.saves),
            save_failures: load(&self.save_failures),
        }
    }
}

/// Directive counts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupervisionStats {
    pub resumes: u64,
    pub restarts: u64,
    pub restart_failures: u64,
    pub stops: u64,
    pub escalations: u64,
}

/// Snapshot of [`RuntimeMetrics`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeStats {
    pub activations: u64,
    pub activation_failures: u64,
    pub deactivations: u64,
    pub evictions: u64,
    pub messages_processed: u64,
    pub avg_processing_time_ns: f64,
    pub handler_failures: u64,
    pub drain_turns: u64,
    pub supervision: SupervisionStats,
    pub deliveries_rejected: u64,
    pub messages_evicted: u64,
    pub saves: u64,
    pub save_failures: u64,
}
