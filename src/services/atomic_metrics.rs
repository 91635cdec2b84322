use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct AtomicMetrics {
    pay_initiated: AtomicU64,
    pay_failed: AtomicU64,
    notify_resolved: AtomicU64,
    notify_failed: AtomicU64,
    paid: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub pay_initiated: u64,
    pub pay_failed: u64,
    pub notify_resolved: u64,
    pub notify_failed: u64,
    pub paid: u64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_pay_initiated(&self) {
        self.pay_initiated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_pay_failed(&self) {
        self.pay_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_notify_resolved(&self, paid: bool) {
        self.notify_resolved.fetch_add(1, Ordering::Relaxed);
        if paid {
            self.paid.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn increment_notify_failed(&self) {
        self.notify_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pay_initiated: self.pay_initiated.load(Ordering::Relaxed),
            pay_failed: self.pay_failed.load(Ordering::Relaxed),
            notify_resolved: self.notify_resolved.load(Ordering::Relaxed),
            notify_failed: self.notify_failed.load(Ordering::Relaxed),
            paid: self.paid.load(Ordering::Relaxed),
        }
    }
}
