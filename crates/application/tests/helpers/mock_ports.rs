#![allow(dead_code)]

use lodestone_dns_application::ports::{Clock, RecordVisitor, Scheduler, VisitedRecord};
use lodestone_dns_domain::{DomainName, RecordType};
use std::cell::{Cell, RefCell};

pub struct FixedClock {
    pub now_ms: Cell<u64>,
}

impl FixedClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: Cell::new(now_ms),
        }
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }
}

#[derive(Default)]
pub struct RecordingScheduler {
    pub armed: Cell<Option<u64>>,
    pub arm_calls: Cell<usize>,
}

impl Scheduler for RecordingScheduler {
    fn arm(&self, deadline_ms: u64) {
        self.armed.set(Some(deadline_ms));
        self.arm_calls.set(self.arm_calls.get() + 1);
    }

    fn disarm(&self) {
        self.armed.set(None);
    }
}

#[derive(Default)]
pub struct CollectingVisitor {
    pub seen: RefCell<Vec<(DomainName, RecordType, u32)>>,
}

impl RecordVisitor for CollectingVisitor {
    fn visit(&mut self, record: &VisitedRecord<'_>) {
        self.seen
            .borrow_mut()
            .push((record.owner.clone(), record.record_type, record.ttl));
    }
}
