mod common;

use common::{ip, request, temp_path};
use ingress_shield::config::{parse_config, ConfigError};
use ingress_shield::SecurityOrchestrator;

const CONFIG: &str = r#"
[firewall]
blocked_addresses = ["198.51.100.66"]

[[firewall.rules]]
action = "block"
address = "203.0.113.0/24"
description = "known bad network"

[rate_limit]
per_ip = { max_requests = 3, window_secs = 60 }

[[rate_limit.rules]]
name = "/api/export"
max_requests = 1
window_secs = 60

[detection]
block_severity = "medium"
"#;

#[test]
fn test_configured_pipeline() {
    let config = parse_config(CONFIG).unwrap();
    let orch = SecurityOrchestrator::from_config(&config).unwrap();

    let bad_net = orch.admit_request(&request("203.0.113.7", 443));
    assert_eq!(bad_net.blocked_by, vec!["firewall"]);

    let denylisted = orch.admit_request(&request("198.51.100.66", 443));
    assert_eq!(denylisted.blocked_by, vec!["firewall"]);
    assert!(denylisted.recommendations[0].contains("denylisted"));

    // Medium severity blocks under this config.
    let traversal = orch.admit_request(&request("198.51.100.1", 443).payload("../../etc/passwd"));
    assert_eq!(traversal.blocked_by, vec!["intrusion_detection"]);
    assert!(!orch.firewall().is_blocked(&ip("198.51.100.1")));

    let export = request("198.51.100.2", 443).endpoint("/api/export");
    assert!(orch.admit_request(&export).allowed);
    assert_eq!(orch.admit_request(&export).blocked_by, vec!["rate_limiter"]);

    let plain = request("198.51.100.3", 443);
    for _ in 0..3 {
        assert!(orch.admit_request(&plain).allowed);
    }
    assert_eq!(orch.admit_request(&plain).blocked_by, vec!["rate_limiter"]);
}

#[test]
fn test_invalid_config_reports_every_problem() {
    let err = parse_config(
        r#"
[[firewall.rules]]
action = "allow"
address = "10.0.0.0/40"

[rate_limit]
per_ip = { max_requests = 0, window_secs = 60 }

[detection]
block_severity = "severe"
"#,
    )
    .unwrap_err();

    match err {
        ConfigError::Validation(errors) => {
            let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
            assert!(fields.contains(&"firewall.rules[0].address"));
            assert!(fields.contains(&"rate_limit.per_ip"));
            assert!(fields.contains(&"detection.block_severity"));
        }
        other => panic!("expected validation errors, got {other}"),
    }
}

#[test]
fn test_events_written_as_json_lines() {
    let path = temp_path("events.jsonl");
    let _ = std::fs::remove_file(&path);

    let orch = common::orchestrator_with(|c| c.events.jsonl_path = Some(path.to_string_lossy().into_owned()));
    orch.admit_request(&request("192.168.1.100", 8080));

    let content = std::fs::read_to_string(&path).unwrap();
    let kinds: Vec<String> = content
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["kind"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(kinds, vec!["firewall_checked", "rate_checked", "ids_checked", "admitted"]);

    let _ = std::fs::remove_file(&path);
}
