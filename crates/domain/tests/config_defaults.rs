use vg_domain::config::Config;

#[test]
fn default_bind_address() {
    let config = Config::default();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8765);
}

#[test]
fn explicit_server_section_parses() {
    let toml_str = r#"
[server]
host = "127.0.0.1"
port = 3210
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 3210);
}

#[test]
fn engine_timeouts_default_sanely() {
    let config = Config::default();
    assert_eq!(config.llm.turn_timeout_secs, 90);
    assert_eq!(config.llm.chunk_timeout_secs, 5);
    assert_eq!(config.engine.dtmf_flush_ms, 1500);
}
