//! Node assembly tests over a temporary sled database

use tempfile::TempDir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use vitals_core::{MetricId, SensorReading};
use vitals_node::config::{Config, LedgerKind};
use vitals_node::node::{ingest_lines, Node, StreamSummary};
use vitals_pipeline::{AggregateStore, AnchorLog, AnchorStatus};

fn config_in(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.node.data_dir = dir.path().to_path_buf();
    config
}

#[tokio::test]
async fn test_seed_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let node = Node::open(&config_in(&dir)).await.unwrap();

    let created = node.seed().await.unwrap();
    assert_eq!(created, MetricId::ALL.to_vec());

    let again = node.seed().await.unwrap();
    assert!(again.is_empty());

    let spo2 = node.store().get_aggregate(MetricId::Spo2).await.unwrap().unwrap();
    assert_eq!(spo2.id, "100");
    assert_eq!(spo2.metric, "Oxygen Saturation");

    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_ingest_and_anchor_with_mock_ledger() {
    let dir = TempDir::new().unwrap();
    let node = Node::open(&config_in(&dir)).await.unwrap();
    node.seed().await.unwrap();

    assert!(node.ledger_reachable());

    let result = node
        .pipeline()
        .ingest(SensorReading::new(37.0, 70.0, 98.0).unwrap())
        .await;
    assert!(result.accepted);
    assert_eq!(result.anchored, Some(AnchorStatus::Sent));

    node.shutdown().await.unwrap();

    let anchors = node.store().recent(5).await.unwrap();
    assert_eq!(anchors.len(), 1);
    assert_eq!(anchors[0].ledger_reference, "mock-ledger-tx-1");
}

#[tokio::test]
async fn test_stream_writes_one_result_per_line() {
    let dir = TempDir::new().unwrap();
    let node = Node::open(&config_in(&dir)).await.unwrap();
    node.seed().await.unwrap();

    let input = concat!(
        "{\"temperature\": 37.0, \"heartRate\": 70, \"spo2\": 98}\n",
        "\n",
        "not json\n",
        "{\"temperature\": 37.1, \"heartRate\": 71}\n",
    );
    let mut output = Vec::new();

    let summary = ingest_lines(node.pipeline(), input.as_bytes(), &mut output)
        .await
        .unwrap();

    assert_eq!(
        summary,
        StreamSummary {
            accepted: 1,
            rejected: 2
        }
    );

    let lines: Vec<serde_json::Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["anchored"], "sent");
    assert!(lines[1]["reason"].as_str().unwrap().starts_with("Invalid JSON"));
    assert_eq!(lines[2]["reason"], "Missing field: spo2");

    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_ledger_still_opens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("node syncing"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir);
    config.ledger.kind = LedgerKind::JsonRpc;
    config.ledger.rpc_url = server.uri();
    config.ledger.contract_address = Some("0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string());
    config.ledger.from_address = Some("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string());

    let node = Node::open(&config).await.unwrap();
    assert!(!node.ledger_reachable());
    node.seed().await.unwrap();

    // Accepted locally; the failed submission leaves the anchor log empty
    let result = node
        .pipeline()
        .ingest(SensorReading::new(37.0, 70.0, 98.0).unwrap())
        .await;
    assert!(result.accepted);

    node.shutdown().await.unwrap();
    assert!(node.store().recent(5).await.unwrap().is_empty());
}
