mod helpers;

use helpers::builders::*;
use helpers::ports::Harness;
use lodestone_dns_domain::{DomainName, ResponseCode};
use std::net::{IpAddr, SocketAddr};

const ROOT_A: &str = "198.41.0.4";
const ROOT_B: &str = "170.247.170.2";
const COM_SERVER: &str = "192.5.6.30";

fn two_roots() -> Harness {
    Harness::new(iterative_config(&[
        ("a.root-servers.net.", ROOT_A),
        ("b.root-servers.net.", ROOT_B),
    ]))
}

fn on_port_53(ip: &str) -> SocketAddr {
    SocketAddr::new(ip.parse().unwrap(), 53)
}

fn com_referral(query: &[u8]) -> Vec<u8> {
    ResponseBuilder::reply_to(query)
        .authority("com.", 172_800, ns_rdata("a.gtld-servers.net."))
        .additional("a.gtld-servers.net.", 172_800, a_rdata([192, 5, 6, 30]))
        .build()
}

#[test]
fn test_referral_is_followed_to_delegated_server() {
    let mut h = two_roots();
    h.ask(21, "www.example.com.", TYPE_A);
    let (root, query) = h.take_upstream().remove(0);
    assert!(root == on_port_53(ROOT_A) || root == on_port_53(ROOT_B));
    assert!(!recursion_desired(&query), "iterative queries do not ask for recursion");

    h.respond(root, &com_referral(&query));
    let (next, query) = h.take_upstream().remove(0);
    assert_eq!(next, on_port_53(COM_SERVER));

    let answer = ResponseBuilder::reply_to(&query)
        .authoritative()
        .answer("www.example.com.", 300, a_rdata([192, 0, 2, 44]))
        .build();
    h.respond(next, &answer);

    let reply = h.take_replies().remove(0);
    assert_eq!(reply.id(), 21);
    assert_eq!(reply.rcode(), ResponseCode::NoError);
    assert_eq!(reply.answers[0].rdata, a_rdata([192, 0, 2, 44]));
    assert!(h.state.tracker().is_empty());

    // The delegation stays cached: the next name under com goes straight
    // to the com server.
    h.ask(22, "other.com.", TYPE_A);
    let (server, _) = h.take_upstream().remove(0);
    assert_eq!(server, on_port_53(COM_SERVER));
}

#[test]
fn test_server_answering_for_its_own_cut_is_lame() {
    let mut h = two_roots();
    h.ask(23, "www.example.com.", TYPE_A);
    let (root, query) = h.take_upstream().remove(0);
    h.respond(root, &com_referral(&query));
    let (com, query) = h.take_upstream().remove(0);

    // Refers back to the zone it was asked about.
    let lame = ResponseBuilder::reply_to(&query)
        .authority("com.", 172_800, ns_rdata("a.gtld-servers.net."))
        .build();
    h.respond(com, &lame);

    let cut: DomainName = "com.".parse().unwrap();
    let ip: IpAddr = COM_SERVER.parse().unwrap();
    assert!(h.state.stats().is_lame(ip, &cut));
    let reply = h.take_replies().remove(0);
    assert_eq!(reply.rcode(), ResponseCode::ServFail);
}

#[test]
fn test_priming_accepts_known_root_servers() {
    let mut h = two_roots();
    h.state.start_priming().unwrap();
    let (root, query) = h.take_upstream().remove(0);
    let reply = ResponseBuilder::reply_to(&query)
        .authoritative()
        .answer(".", 518_400, ns_rdata("a.root-servers.net."))
        .answer(".", 518_400, ns_rdata("b.root-servers.net."))
        .additional("a.root-servers.net.", 518_400, a_rdata([198, 41, 0, 4]))
        .additional("b.root-servers.net.", 518_400, a_rdata([170, 247, 170, 2]))
        .build();
    h.respond(root, &reply);

    assert!(h.state.is_primed());
    assert!(h.state.tracker().is_empty());
    assert_eq!(h.armed.get(), None);
    assert!(h.take_client_bytes().is_empty());
}

#[test]
fn test_priming_with_too_few_known_servers_is_retried() {
    let mut h = two_roots();
    h.state.start_priming().unwrap();
    let (root, query) = h.take_upstream().remove(0);
    let reply = ResponseBuilder::reply_to(&query)
        .authoritative()
        .answer(".", 518_400, ns_rdata("a.root-servers.net."))
        .answer(".", 518_400, ns_rdata("x.unknown-roots.example."))
        .additional("a.root-servers.net.", 518_400, a_rdata([198, 41, 0, 4]))
        .build();
    let answered_at = h.now.get();
    h.respond(root, &reply);

    assert!(!h.state.is_primed());
    let retry_secs = h.state.config().resolver.priming_retry_secs;
    assert_eq!(h.armed.get(), Some(answered_at + retry_secs * 1000));

    h.fire_timer();
    let retried = h.take_upstream();
    assert_eq!(retried.len(), 1, "priming query sent again");
}

#[test]
fn test_priming_skipped_when_forwarding_only() {
    let mut h = Harness::new(forwarding_config(&["203.0.113.1"]));
    h.state.start_priming().unwrap();
    assert!(h.take_upstream().is_empty());
    assert!(h.state.tracker().is_empty());
}

#[test]
fn test_missing_glue_triggers_address_lookup() {
    let mut h = two_roots();
    h.ask(24, "www.example.org.", TYPE_A);
    let (root, query) = h.take_upstream().remove(0);

    // org is delegated to a server whose address the root does not give.
    let referral = ResponseBuilder::reply_to(&query)
        .authority("org.", 172_800, ns_rdata("ns.example.net."))
        .build();
    h.respond(root, &referral);

    // The parent is parked while ns.example.net is resolved from the root.
    assert!(h.take_client_bytes().is_empty());
    let (lookup_server, lookup) = h.take_upstream().remove(0);
    assert!(lookup_server == on_port_53(ROOT_A) || lookup_server == on_port_53(ROOT_B));
    assert_eq!(h.state.tracker().len(), 2);

    let glue = ResponseBuilder::reply_to(&lookup)
        .authoritative()
        .answer("ns.example.net.", 3600, a_rdata([192, 0, 2, 53]))
        .build();
    h.respond(lookup_server, &glue);

    let (org_server, query) = h.take_upstream().remove(0);
    assert_eq!(org_server, on_port_53("192.0.2.53"));
    let answer = ResponseBuilder::reply_to(&query)
        .authoritative()
        .answer("www.example.org.", 300, a_rdata([192, 0, 2, 99]))
        .build();
    h.respond(org_server, &answer);

    let reply = h.take_replies().remove(0);
    assert_eq!(reply.id(), 24);
    assert_eq!(reply.answers[0].rdata, a_rdata([192, 0, 2, 99]));
    assert!(h.state.tracker().is_empty());
}

#[test]
fn test_priming_goes_to_root_hints_despite_forwarders() {
    let mut config = iterative_config(&[("a.root-servers.net.", ROOT_A)]);
    config.resolver.forwarders = vec!["203.0.113.1".to_string()];
    config.resolver.forward_only = false;
    let mut h = Harness::new(config);

    h.state.start_priming().unwrap();
    let sent = h.take_upstream();
    assert_eq!(sent.len(), 1);
    let (server, query) = &sent[0];
    assert_eq!(*server, on_port_53(ROOT_A));
    assert!(!recursion_desired(query), "priming is not forwarded");

    // Client questions still go to the forwarder.
    h.ask(25, "www.example.com.", TYPE_A);
    let (server, _) = h.take_upstream().remove(0);
    assert_eq!(server, on_port_53("203.0.113.1"));
}
