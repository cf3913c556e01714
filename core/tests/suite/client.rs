use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use soc_core::ApiError;
use soc_core::SearchSpec;
use soc_core::SessionContext;
use soc_core_test_support::TEST_TOKEN;
use soc_core_test_support::alert;
use soc_core_test_support::client_for;
use soc_core_test_support::signed_in_session;
use soc_core_test_support::sse_body;
use soc_protocol::DashboardStats;
use soc_protocol::FieldType;
use soc_protocol::LogLine;
use soc_protocol::QueryCriterion;
use soc_protocol::QueryOperator;
use soc_protocol::QueryValue;
use soc_protocol::RiskScore;
use soc_protocol::Role;
use soc_protocol::SchemaField;
use soc_protocol::Severity;
use soc_protocol::TimeRange;
use soc_protocol::records::NewSavedSearch;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::body_json;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::matchers::query_param;

#[tokio::test]
async fn schema_fetch_carries_bearer_token_and_drops_unknown_types() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/schema"))
        .and(query_param("index", "wazuh-alerts-*"))
        .and(header("authorization", format!("Bearer {TEST_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "index": "wazuh-alerts-*",
            "fields": [
                {"name": "rule.level", "type": "long"},
                {"name": "agent.name", "type": "keyword"},
                {"name": "geo.location", "type": "geo_point"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in_session(Role::Analyst));
    let schema = client.schema("wazuh-alerts-*").await.unwrap();

    assert_eq!(
        schema.fields,
        vec![
            SchemaField::new("rule.level", FieldType::Long),
            SchemaField::new("agent.name", FieldType::Keyword),
        ]
    );
}

#[tokio::test]
async fn execute_search_posts_builder_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/builder"))
        .and(body_json(json!({
            "field": "rule.level",
            "op": "term",
            "value": "12",
            "timeRange": "24h",
            "size": 100,
            "index": "wazuh-alerts-*"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "queryGenerated": "{}",
            "results": {"totalHits": 1, "data": [{"rule": {"level": 12}}]},
            "severity": "critical"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let spec = SearchSpec::build(
        QueryCriterion {
            field: SchemaField::new("rule.level", FieldType::Long),
            operator: QueryOperator::Term,
            value: QueryValue::from("12"),
            time_range: TimeRange::TwentyFourHours,
        },
        Role::Analyst,
        100,
        "wazuh-alerts-*",
    )
    .unwrap();
    let client = client_for(&server, signed_in_session(Role::Analyst));

    let response = client.execute_search(&spec).await.unwrap();

    assert_eq!(response.results.total_hits, 1);
    assert_eq!(response.severity, Some(Severity::Critical));
    assert!(!response.has_ai_analysis());
}

#[tokio::test]
async fn backend_error_detail_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"detail": "Index not allowed"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in_session(Role::Analyst));
    let err = client
        .chat("failed logins last hour", "secret-*", 10)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApiError::Status { status: 400, ref message } if message == "Index not allowed"
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn unauthorized_response_invalidates_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/audit"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let session = signed_in_session(Role::Admin);
    let mut auth_required = session.subscribe_auth_required();
    let client = client_for(&server, session.clone());

    let err = client.audit().await.unwrap_err();

    assert!(err.is_unauthorized());
    assert!(!session.is_authenticated());
    assert!(*auth_required.borrow_and_update());
}

#[tokio::test]
async fn login_signs_the_session_in() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .and(body_json(json!({"username": "root", "password": "hunter2"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"token": "abc", "role": "admin"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = SessionContext::in_memory();
    let client = client_for(&server, session.clone());

    let user = client.login("root", "hunter2").await.unwrap();

    assert_eq!(user.role, Role::Admin);
    assert_eq!(session.access_token().as_deref(), Some("abc"));
    assert_eq!(session.role(), Role::Admin);
}

#[tokio::test]
async fn refresh_replaces_the_access_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/refresh"))
        .and(body_json(json!({"token": TEST_TOKEN})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "renewed"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = signed_in_session(Role::Admin);
    let client = client_for(&server, session.clone());

    client.refresh().await.unwrap();

    assert_eq!(session.access_token().as_deref(), Some("renewed"));
    assert_eq!(session.role(), Role::Admin);
}

#[tokio::test]
async fn logout_signs_out_even_when_backend_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/logout"))
        .and(body_json(json!({"token": TEST_TOKEN})))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let session = signed_in_session(Role::Analyst);
    let client = client_for(&server, session.clone());

    assert!(client.logout().await.is_err());
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn recent_alerts_are_scoped_by_index_and_level() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/alerts/recent"))
        .and(query_param("index", "wazuh-alerts-*"))
        .and(query_param("min_level", "12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![alert("2"), alert("1")]))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in_session(Role::Analyst));
    let alerts = client.recent_alerts("wazuh-alerts-*", 12).await.unwrap();

    let ids: Vec<&str> = alerts.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "1"]);
}

#[tokio::test]
async fn saved_search_lifecycle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/saved"))
        .and(body_json(json!({
            "name": "ssh brute force",
            "index": "wazuh-alerts-*",
            "queryJson": "{\"match\":{}}"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "name": "ssh brute force",
            "index": "wazuh-alerts-*"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/saved/run"))
        .and(body_json(json!({"id": 7})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": {"totalHits": 3, "data": []}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/saved"))
        .and(query_param("id", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "deleted"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in_session(Role::Analyst));

    let saved = client
        .create_saved_search(&NewSavedSearch {
            name: "ssh brute force".to_string(),
            index: "wazuh-alerts-*".to_string(),
            query_json: "{\"match\":{}}".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(saved.id, 7);

    let results = client.run_saved_search(saved.id).await.unwrap();
    assert_eq!(results.results.total_hits, 3);

    client.delete_saved_search(saved.id).await.unwrap();
}

#[tokio::test]
async fn preflight_reports_backend_readiness() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/preflight"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "esOk": true,
            "credsOk": true,
            "llmOk": false,
            "schemaOk": true
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, SessionContext::in_memory());
    let status = client.preflight().await.unwrap();

    assert!(status.es_ok);
    assert!(!status.demo_mode);
    assert!(!status.all_ok());
}

#[tokio::test]
async fn remediation_is_acknowledged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/remediate"))
        .and(body_json(json!({"action": "block_ip"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Remediation action 'block_ip' triggered",
            "details": {"timestamp": "2026-10-15T08:00:00Z", "triggeredBy": "admin", "webhookSent": false}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in_session(Role::Admin));
    let ack = client.remediate("block_ip").await.unwrap();

    assert_eq!(ack.status, "success");
    assert_eq!(ack.details.unwrap().triggered_by, "admin");
}

#[tokio::test]
async fn dashboard_stats_are_typed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stats"))
        .and(query_param("index", "wazuh-alerts-*"))
        .and(header("authorization", format!("Bearer {TEST_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalAlerts": 1520,
            "highSeverity": 37,
            "activeAgents": 4,
            "topAttacker": "203.0.113.9",
            "riskScoring": [
                {"entity": "web-01", "score": 412.0},
                {"entity": "db-02", "score": 96}
            ],
            "aggregations": {"active_agents": {"value": 4}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in_session(Role::Analyst));
    let stats = client.stats("wazuh-alerts-*").await.unwrap();

    assert_eq!(
        stats,
        DashboardStats {
            total_alerts: 1520,
            high_severity: 37,
            active_agents: 4,
            top_attacker: "203.0.113.9".to_string(),
            risk_scoring: vec![
                RiskScore {
                    entity: "web-01".to_string(),
                    score: 412.0
                },
                RiskScore {
                    entity: "db-02".to_string(),
                    score: 96.0
                },
            ],
            error: None,
        }
    );
}

#[tokio::test]
async fn degraded_stats_still_decode() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "search backend unreachable",
            "totalAlerts": 0,
            "highSeverity": 0,
            "activeAgents": 0,
            "topAttacker": "N/A",
            "riskScoring": [],
            "aggregations": {}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in_session(Role::Analyst));
    let stats = client.stats("wazuh-alerts-*").await.unwrap();

    assert_eq!(stats.error.as_deref(), Some("search backend unreachable"));
    assert_eq!(stats.top_attacker(), None);
    assert_eq!(stats.total_alerts, 0);
}

#[tokio::test]
async fn log_stream_yields_lines_and_skips_malformed_payloads() {
    let server = MockServer::start().await;
    let payloads = vec![
        json!({"id": "a1", "line": "[2026-10-15T08:00:00Z] web-01 -> sshd: authentication failed"})
            .to_string(),
        "not json".to_string(),
        json!({"line": "[2026-10-15T08:00:02Z] db-02 -> File integrity changed"}).to_string(),
    ];
    Mock::given(method("GET"))
        .and(path("/api/logs/stream"))
        .and(query_param("index", "wazuh-archives-*"))
        .and(header("accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body(&payloads), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, signed_in_session(Role::Analyst));
    let lines: Vec<LogLine> = client
        .log_stream("wazuh-archives-*")
        .await
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(
        lines,
        vec![
            LogLine {
                id: Some("a1".to_string()),
                line: "[2026-10-15T08:00:00Z] web-01 -> sshd: authentication failed".to_string(),
            },
            LogLine {
                id: None,
                line: "[2026-10-15T08:00:02Z] db-02 -> File integrity changed".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn log_stream_refused_with_401_invalidates_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/logs/stream"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let session = signed_in_session(Role::Analyst);
    let client = client_for(&server, session.clone());

    let err = client.log_stream("wazuh-alerts-*").await.err();

    assert!(matches!(err, Some(ApiError::Unauthorized)));
    assert!(!session.is_authenticated());
}
