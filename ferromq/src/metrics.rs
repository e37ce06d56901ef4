//! Broker counters. The core only ever increments and decrements; scraping
//! and export belong to the embedding server.

use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Default)]
pub struct Counter(AtomicI64);

impl Counter {
    pub fn inc(&self, n: i64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn dec(&self, n: i64) {
        self.0.fetch_sub(n, Ordering::Relaxed);
    }

    pub fn value(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct BrokerMetrics {
    pub publish: Counter,
    pub deliver: Counter,
    pub acknowledge: Counter,
    pub confirm: Counter,
    pub total: Counter,
    pub ready: Counter,
    pub unacked: Counter,
}
