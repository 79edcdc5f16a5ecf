use lodestone_dns_domain::{Config, ConfigError, RrsetOrder};
use std::io::Write;

mod helpers;
use helpers::ConfigBuilder;

#[test]
fn test_config_default_values() {
    let config = Config::default();

    assert_eq!(config.server.listen_address, "0.0.0.0:53");
    assert_eq!(config.cache.min_cache_ttl, 0);
    assert_eq!(config.cache.max_cache_ttl, 604_800);
    assert_eq!(config.cache.max_negative_ttl, 10_800);
    assert!(config.resolver.recursion);
    assert!(config.resolver.forwarders.is_empty());
    assert_eq!(config.resolver.root_hints.len(), 13);
    assert_eq!(config.resolver.min_root_servers, 2);
    assert_eq!(config.resolver.max_cname_chain, 8);
    assert_eq!(config.answer.default_order, RrsetOrder::Cyclic);
    assert_eq!(config.answer.max_udp_size, 4096);
    assert_eq!(config.logging.level, "info");
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_partial_toml_fills_defaults() {
    let toml_str = r#"
        [resolver]
        forwarders = ["9.9.9.9", "[2620:fe::fe]:53"]
        forward_only = true

        [[answer.rrset_order]]
        record_type = "A"
        order = "fixed"
    "#;

    let config: Config = toml::from_str(toml_str).unwrap();
    assert!(config.resolver.forward_only);
    assert_eq!(config.cache.max_cache_ttl, 604_800);
    assert_eq!(config.answer.rrset_order.len(), 1);
    assert_eq!(config.answer.rrset_order[0].order, RrsetOrder::Fixed);

    let addrs = config.resolver.forwarder_addrs().unwrap();
    assert_eq!(addrs[0].port(), 53);
    assert_eq!(addrs[1].to_string(), "[2620:fe::fe]:53");
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_rejects_forward_only_without_forwarders() {
    let config = ConfigBuilder::new().forward_only(true).build();
    assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
}

#[test]
fn test_validate_rejects_inverted_ttl_bounds() {
    let config = ConfigBuilder::new().cache_ttl_bounds(600, 60).build();
    assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
}

#[test]
fn test_validate_rejects_floor_above_negative_ceiling() {
    let mut config = ConfigBuilder::new().cache_ttl_bounds(600, 3600).build();
    config.cache.max_negative_ttl = 300;
    assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

    config.cache.max_negative_ttl = 600;
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_rejects_bad_topology_network() {
    let config = ConfigBuilder::new().topology("10.0.0.0/40", 1).build();
    assert!(config.validate().is_err());

    let config = ConfigBuilder::new().topology("10.0.0.0/8", 1).build();
    let networks = config.resolver.topology_networks().unwrap();
    assert_eq!(networks.len(), 1);
    assert_eq!(networks[0].1, 1);
}

#[test]
fn test_save_and_load_round_trip() {
    let config = ConfigBuilder::new()
        .forwarders(&["1.1.1.1:5353"])
        .cache_ttl_bounds(30, 3600)
        .build();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lodestone.toml");
    let path_str = path.to_str().unwrap();
    config.save(path_str).unwrap();

    let loaded = Config::load(Some(path_str)).unwrap();
    assert_eq!(loaded.resolver.forwarders, vec!["1.1.1.1:5353".to_string()]);
    assert_eq!(loaded.cache.min_cache_ttl, 30);
    assert_eq!(loaded.cache.max_cache_ttl, 3600);
}

#[test]
fn test_load_reports_parse_errors() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[cache\nmin_cache_ttl = ").unwrap();
    let result = Config::load(Some(file.path().to_str().unwrap()));
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_load_missing_file() {
    let result = Config::load(Some("/nonexistent/lodestone.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_, _))));
}
