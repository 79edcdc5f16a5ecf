mod helpers;

use helpers::builders::*;
use helpers::ports::Harness;
use lodestone_dns_domain::{RecordType, ResponseCode, ServerKey};
use std::net::SocketAddr;

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

#[test]
fn test_failed_forwarders_are_not_asked_again() {
    let mut h = Harness::new(forwarding_config(&["203.0.113.1", "203.0.113.2", "203.0.113.3"]));
    let good = addr("203.0.113.3:53");
    h.ask(0x1111, "www.example.com.", TYPE_A);

    let mut asked = Vec::new();
    loop {
        let sent = h.take_upstream();
        assert_eq!(sent.len(), 1, "exactly one server asked at a time");
        let (server, query) = sent.into_iter().next().unwrap();
        assert!(!asked.contains(&server), "{} asked twice", server);
        assert!(recursion_desired(&query), "forwarded queries ask for recursion");
        asked.push(server);

        if server == good {
            let reply = ResponseBuilder::reply_to(&query)
                .answer("www.example.com.", 300, a_rdata([192, 0, 2, 80]))
                .build();
            h.respond(server, &reply);
            break;
        }
        let reply = ResponseBuilder::reply_to(&query).rcode(RCODE_SERVFAIL).build();
        h.respond(server, &reply);
    }

    let replies = h.take_replies();
    assert_eq!(replies.len(), 1);
    let reply = &replies[0];
    assert_eq!(reply.id(), 0x1111);
    assert_eq!(reply.rcode(), ResponseCode::NoError);
    assert!(reply.recursion_available());
    assert!(!reply.authoritative());
    assert_eq!(reply.answers.len(), 1);
    assert_eq!(reply.answers[0].rdata, a_rdata([192, 0, 2, 80]));
    assert!(h.state.tracker().is_empty());
}

#[test]
fn test_answer_is_cached_and_served_locally() {
    let mut h = Harness::new(forwarding_config(&["203.0.113.1"]));
    h.ask(1, "mail.example.com.", TYPE_MX);
    let (server, query) = h.take_upstream().remove(0);

    let mx = mx_rdata(10, "mx1.example.com.");
    let reply = ResponseBuilder::reply_to(&query)
        .answer("mail.example.com.", 300, mx.clone())
        .build();
    h.respond(server, &reply);
    let first = h.take_replies().remove(0);
    assert_eq!(first.answers[0].rdata, mx, "rdata passes through unchanged");

    h.advance_ms(100_000);
    h.ask(2, "mail.example.com.", TYPE_MX);
    assert!(h.take_upstream().is_empty(), "served without asking upstream");
    let second = h.take_replies().remove(0);
    assert_eq!(second.id(), 2);
    assert_eq!(second.answers.len(), 1);
    assert_eq!(second.answers[0].rdata, mx);
    assert_eq!(second.answers[0].ttl, 200);
}

#[test]
fn test_duplicate_request_is_dropped() {
    let mut h = Harness::new(forwarding_config(&["203.0.113.1"]));
    h.ask(7, "dup.example.com.", TYPE_A);
    h.ask(7, "dup.example.com.", TYPE_A);
    assert_eq!(h.take_upstream().len(), 1);
    assert!(h.take_client_bytes().is_empty());
    assert_eq!(h.state.tracker().len(), 1);
}

#[test]
fn test_long_cname_chain_fails() {
    let mut config = forwarding_config(&["203.0.113.1"]);
    config.resolver.max_cname_chain = 2;
    let mut h = Harness::new(config);
    h.ask(3, "a.example.com.", TYPE_A);
    let (server, query) = h.take_upstream().remove(0);

    let reply = ResponseBuilder::reply_to(&query)
        .answer("a.example.com.", 300, cname_rdata("b.example.com."))
        .answer("b.example.com.", 300, cname_rdata("c.example.com."))
        .answer("c.example.com.", 300, cname_rdata("d.example.com."))
        .answer("d.example.com.", 300, a_rdata([192, 0, 2, 1]))
        .build();
    h.respond(server, &reply);

    let reply = h.take_replies().remove(0);
    assert_eq!(reply.rcode(), ResponseCode::ServFail);
    assert!(h.state.tracker().is_empty());
}

#[test]
fn test_cname_chain_within_limit_is_returned_in_order() {
    let mut h = Harness::new(forwarding_config(&["203.0.113.1"]));
    h.ask(4, "www.example.com.", TYPE_A);
    let (server, query) = h.take_upstream().remove(0);
    let reply = ResponseBuilder::reply_to(&query)
        .answer("www.example.com.", 300, cname_rdata("web.example.com."))
        .answer("web.example.com.", 300, a_rdata([192, 0, 2, 7]))
        .build();
    h.respond(server, &reply);

    let reply = h.take_replies().remove(0);
    assert_eq!(reply.rcode(), ResponseCode::NoError);
    let types: Vec<RecordType> = reply.answers.iter().map(|r| r.record_type).collect();
    assert_eq!(types, vec![RecordType::CNAME, RecordType::A]);
}

#[test]
fn test_nxdomain_is_cached_with_bounded_ttl() {
    let mut config = forwarding_config(&["203.0.113.1"]);
    config.cache.max_negative_ttl = 600;
    let mut h = Harness::new(config);
    h.ask(5, "missing.example.com.", TYPE_A);
    let (server, query) = h.take_upstream().remove(0);
    let reply = ResponseBuilder::reply_to(&query)
        .rcode(RCODE_NXDOMAIN)
        .authoritative()
        .authority("example.com.", 3600, soa_rdata("example.com.", 7, 900))
        .build();
    h.respond(server, &reply);

    let first = h.take_replies().remove(0);
    assert_eq!(first.rcode(), ResponseCode::NxDomain);
    assert_eq!(first.authority.len(), 1);
    assert_eq!(first.authority[0].record_type, RecordType::SOA);
    assert!(first.authority[0].ttl <= 600);

    // Another type at the same name is covered by the NXDOMAIN entry.
    h.ask(6, "missing.example.com.", TYPE_AAAA);
    assert!(h.take_upstream().is_empty());
    let second = h.take_replies().remove(0);
    assert_eq!(second.rcode(), ResponseCode::NxDomain);
    assert_eq!(second.authority.len(), 1);
    assert!(second.authority[0].ttl <= 600);
}

#[test]
fn test_retries_then_expires_with_servfail() {
    let mut config = forwarding_config(&["203.0.113.1"]);
    config.resolver.query_lifetime_secs = 10;
    let mut h = Harness::new(config);
    let start = h.now.get();
    h.ask(8, "slow.example.com.", TYPE_A);
    assert_eq!(h.take_upstream().len(), 1);
    assert_eq!(h.armed.get(), Some(start + 4_000));

    h.fire_timer();
    let resent = h.take_upstream();
    assert_eq!(resent.len(), 1, "retransmitted after the timeout");
    assert_eq!(h.armed.get(), Some(start + 10_000), "backoff capped by the lifetime");
    assert!(h.take_client_bytes().is_empty());

    h.fire_timer();
    assert!(h.take_upstream().is_empty());
    let reply = h.take_replies().remove(0);
    assert_eq!(reply.rcode(), ResponseCode::ServFail);
    assert!(h.state.tracker().is_empty());
    assert_eq!(h.armed.get(), None);
}

#[test]
fn test_truncated_reply_is_retried_over_stream() {
    let mut h = Harness::new(forwarding_config(&["203.0.113.1"]));
    h.ask(9, "big.example.com.", TYPE_A);
    let (server, query) = h.take_upstream().remove(0);
    h.respond(server, &ResponseBuilder::reply_to(&query).truncated().build());

    assert!(h.take_client_bytes().is_empty());
    let streams = h.take_streams();
    assert_eq!(streams.len(), 1);
    let (stream_server, stream_query) = &streams[0];
    assert_eq!(*stream_server, server);
    assert_eq!(message_id(stream_query), message_id(&query));

    let full = ResponseBuilder::reply_to(stream_query)
        .answer("big.example.com.", 300, a_rdata([192, 0, 2, 1]))
        .answer("big.example.com.", 300, a_rdata([192, 0, 2, 2]))
        .build();
    h.respond(server, &full);
    let reply = h.take_replies().remove(0);
    assert_eq!(reply.rcode(), ResponseCode::NoError);
    assert_eq!(reply.answers.len(), 2);
}

#[test]
fn test_malformed_reply_moves_to_next_server() {
    let mut h = Harness::new(forwarding_config(&["203.0.113.1", "203.0.113.2"]));
    h.ask(10, "www.example.com.", TYPE_A);
    let (first, query) = h.take_upstream().remove(0);

    let mut broken = ResponseBuilder::reply_to(&query)
        .answer("www.example.com.", 300, a_rdata([192, 0, 2, 1]))
        .build();
    broken.truncate(broken.len() - 3);
    h.respond(first, &broken);

    let next = h.take_upstream();
    assert_eq!(next.len(), 1);
    assert_ne!(next[0].0, first);
    assert!(h.take_client_bytes().is_empty());
}

#[test]
fn test_reply_from_unasked_server_is_ignored() {
    let mut h = Harness::new(forwarding_config(&["203.0.113.1"]));
    h.ask(11, "www.example.com.", TYPE_A);
    let (_, query) = h.take_upstream().remove(0);
    let forged = ResponseBuilder::reply_to(&query)
        .answer("www.example.com.", 300, a_rdata([6, 6, 6, 6]))
        .build();
    h.respond(addr("198.51.100.66:53"), &forged);
    assert!(h.take_client_bytes().is_empty());
    assert_eq!(h.state.tracker().len(), 1);
}

#[test]
fn test_unsigned_reply_from_keyed_server_fails() {
    let mut config = forwarding_config(&["203.0.113.1"]);
    config.resolver.server_keys = vec![ServerKey {
        server: "203.0.113.1".into(),
        key: "transfer-key".into(),
    }];
    let mut h = Harness::new(config);
    h.ask(12, "www.example.com.", TYPE_A);
    let (server, query) = h.take_upstream().remove(0);
    let reply = ResponseBuilder::reply_to(&query)
        .answer("www.example.com.", 300, a_rdata([192, 0, 2, 1]))
        .build();
    h.respond(server, &reply);

    let reply = h.take_replies().remove(0);
    assert_eq!(reply.rcode(), ResponseCode::ServFail);
    assert!(h.take_upstream().is_empty());
}

#[test]
fn test_cache_floor_does_not_lift_negative_ttl() {
    let mut config = forwarding_config(&["203.0.113.1"]);
    config.cache.min_cache_ttl = 600;
    config.cache.max_negative_ttl = 300;
    let mut h = Harness::new(config);
    h.ask(13, "absent.example.com.", TYPE_A);
    let (server, query) = h.take_upstream().remove(0);
    let reply = ResponseBuilder::reply_to(&query)
        .rcode(RCODE_NXDOMAIN)
        .authoritative()
        .authority("example.com.", 3600, soa_rdata("example.com.", 7, 900))
        .build();
    h.respond(server, &reply);

    let first = h.take_replies().remove(0);
    assert_eq!(first.rcode(), ResponseCode::NxDomain);
    assert_eq!(first.authority[0].ttl, 300);

    h.advance_ms(299_000);
    h.ask(14, "absent.example.com.", TYPE_A);
    assert!(h.take_upstream().is_empty(), "still cached just before the ceiling");
    let cached = h.take_replies().remove(0);
    assert!(cached.authority[0].ttl <= 300);

    h.advance_ms(2_000);
    h.ask(15, "absent.example.com.", TYPE_A);
    assert_eq!(h.take_upstream().len(), 1, "negative entry gone after 300s");
}

#[test]
fn test_failed_reply_leaves_server_rtt_alone() {
    let mut h = Harness::new(forwarding_config(&["203.0.113.1"]));
    let ip = addr("203.0.113.1:53").ip();
    h.ask(16, "www.example.com.", TYPE_A);
    let (server, query) = h.take_upstream().remove(0);
    let initial = h.state.stats().known_rtt(ip).unwrap_or(0);
    assert!(initial <= 32);

    h.advance_ms(2_000);
    h.respond(server, &ResponseBuilder::reply_to(&query).rcode(RCODE_SERVFAIL).build());
    assert_eq!(h.take_replies().remove(0).rcode(), ResponseCode::ServFail);
    assert_eq!(h.state.stats().known_rtt(ip).unwrap_or(0), initial);

    h.ask(17, "www.example.com.", TYPE_A);
    let (server, query) = h.take_upstream().remove(0);
    h.advance_ms(2_000);
    let answer = ResponseBuilder::reply_to(&query)
        .answer("www.example.com.", 300, a_rdata([192, 0, 2, 1]))
        .build();
    h.respond(server, &answer);
    assert!(h.state.stats().known_rtt(ip).unwrap_or(0) >= 600);
}
