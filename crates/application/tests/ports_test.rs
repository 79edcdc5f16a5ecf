use lodestone_dns_application::ports::{
    AccessControl, AllowAll, Clock, RecordVisitor, RejectAll, Scheduler, SignatureVerifier,
    VisitedRecord,
};
use lodestone_dns_domain::{Credibility, DomainName, RecordClass, RecordType, SecurityState};

mod helpers;
use helpers::{CollectingVisitor, FixedClock, RecordingScheduler};

#[test]
fn test_clock_seconds_derive_from_millis() {
    let clock = FixedClock::new(12_345_678);
    assert_eq!(clock.now_secs(), 12_345);
}

#[test]
fn test_allow_all_permits_recursion() {
    let client = "192.0.2.1:5353".parse().unwrap();
    assert!(AllowAll.allow_recursion(client));
}

#[test]
fn test_reject_all_verifier() {
    assert!(!RejectAll.verify("key", b"message", b"signature"));
}

#[test]
fn test_scheduler_rearm_replaces_deadline() {
    let scheduler = RecordingScheduler::default();
    scheduler.arm(5_000);
    scheduler.arm(2_000);
    assert_eq!(scheduler.armed.get(), Some(2_000));
    assert_eq!(scheduler.arm_calls.get(), 2);
    scheduler.disarm();
    assert_eq!(scheduler.armed.get(), None);
}

#[test]
fn test_visitor_receives_borrowed_record() {
    let owner: DomainName = "www.example.".parse().unwrap();
    let mut visitor = CollectingVisitor::default();
    visitor.visit(&VisitedRecord {
        owner: &owner,
        zone: 0,
        class: RecordClass::IN,
        record_type: RecordType::A,
        ttl: 300,
        credibility: Credibility::AuthAnswer,
        security: SecurityState::Unchecked,
        hint: false,
        negative: false,
        rdata: "192.0.2.1",
    });
    let seen = visitor.seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], (owner, RecordType::A, 300));
}
