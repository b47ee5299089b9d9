use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use submission_worker::domain::{
    codec, EventStream, FetchRequest, OutboundRecord, PartitionKeySource, PublishOutcome,
    QueueEndpoint, QueueMessage, SubmissionQueue, TransportError, TransportResult,
};
use submission_worker::{SubmissionWorker, SubmissionWorkerConfig};
use tokio_util::sync::CancellationToken;

const MESSAGE_ID: &str = "8bcc287b-0970-e8d4-001e-a5e6a7282efc";
const MESSAGE_BODY: &str = "eyJzdWJtaXNzaW9uX2lkIjogIjUxZWJmNDI2LWRkZWUtNDg4NS1iYmYzLWE1ZWJiNWQ2MGVhMSIsICJkZXZpY2VfaWQiOiAiN2M4NWU1NzktMTQ3MS00N2Y2LWFhZTAtOGYyZWUwNzRhYzMxIiwgInRpbWVfY3JlYXRlZCI6ICIyMDI0LTEwLTE2VDE0OjUxOjA4LjkwOTQ3NyIsICJldmVudHMiOiB7Im5ld19wcm9jZXNzIjogW3siY21kbCI6ICJub3RlcGFkLmV4ZSIsICJ1c2VyIjogImpvaG4ifSwgeyJjbWRsIjogImNhbGN1bGF0b3IuZXhlIiwgInVzZXIiOiAiYWRtaW4ifV0sICJuZXR3b3JrX2Nvbm5lY3Rpb24iOiBbeyJzb3VyY2VfaXAiOiAiMTkyLjE2OC4wLjEiLCAiZGVzdGluYXRpb25faXAiOiAiMjMuMTMuMjUyLjM5IiwgImRlc3RpbmF0aW9uX3BvcnQiOiA1NTQxM30sIHsic291cmNlX2lwIjogIjE5Mi4xNjguMC4xIiwgImRlc3RpbmF0aW9uX2lwIjogIjIzLjEzLjI1Mi4zOSIsICJkZXN0aW5hdGlvbl9wb3J0IjogMTk2OTd9XX19";

// In-memory transports for exercising the worker end to end
mod memory {
    use super::*;

    #[derive(Default)]
    pub struct InMemoryQueue {
        pending: Mutex<VecDeque<QueueMessage>>,
        in_flight: Mutex<Vec<QueueMessage>>,
        deleted: Mutex<Vec<String>>,
    }

    impl InMemoryQueue {
        pub fn with_messages(messages: Vec<QueueMessage>) -> Self {
            Self {
                pending: Mutex::new(messages.into()),
                ..Default::default()
            }
        }

        pub fn deleted(&self) -> Vec<String> {
            self.deleted.lock().unwrap().clone()
        }

        pub fn in_flight(&self) -> Vec<QueueMessage> {
            self.in_flight.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SubmissionQueue for InMemoryQueue {
        async fn resolve(&self, queue_name: &str) -> TransportResult<QueueEndpoint> {
            if queue_name != "submissions" {
                return Err(TransportError::NotFound(queue_name.to_string()));
            }
            Ok(QueueEndpoint {
                queue_name: queue_name.to_string(),
                address: format!("memory://{}", queue_name),
            })
        }

        async fn fetch(
            &self,
            _endpoint: &QueueEndpoint,
            request: FetchRequest,
        ) -> TransportResult<Vec<QueueMessage>> {
            let mut pending = self.pending.lock().unwrap();
            let count = request.max_messages.min(pending.len());
            let batch: Vec<QueueMessage> = pending.drain(..count).collect();
            self.in_flight.lock().unwrap().extend(batch.iter().cloned());
            Ok(batch)
        }

        async fn delete(
            &self,
            _endpoint: &QueueEndpoint,
            receipt_handle: &str,
        ) -> TransportResult<()> {
            let mut in_flight = self.in_flight.lock().unwrap();
            let before = in_flight.len();
            in_flight.retain(|m| m.receipt_handle != receipt_handle);
            if in_flight.len() == before {
                return Err(TransportError::NotFound(receipt_handle.to_string()));
            }
            self.deleted.lock().unwrap().push(receipt_handle.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct InMemoryStream {
        records: Mutex<Vec<(String, OutboundRecord)>>,
    }

    impl InMemoryStream {
        pub fn records(&self) -> Vec<(String, OutboundRecord)> {
            self.records.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventStream for InMemoryStream {
        async fn put_records(
            &self,
            stream_name: &str,
            records: &[OutboundRecord],
        ) -> TransportResult<PublishOutcome> {
            let mut stored = self.records.lock().unwrap();
            stored.extend(
                records
                    .iter()
                    .map(|record| (stream_name.to_string(), record.clone())),
            );
            Ok(PublishOutcome::default())
        }
    }
}

use memory::{InMemoryQueue, InMemoryStream};

fn message(id: &str, body: String) -> QueueMessage {
    QueueMessage {
        message_id: id.to_string(),
        receipt_handle: format!("receipt-{}", id),
        body,
        body_digest: format!("digest-{}", id),
    }
}

fn worker_config() -> SubmissionWorkerConfig {
    SubmissionWorkerConfig {
        batch_size: 10,
        poll_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

fn decoded_events(stream: &InMemoryStream) -> Vec<Value> {
    stream
        .records()
        .iter()
        .map(|(_, record)| codec::decode(&record.data).unwrap())
        .collect()
}

fn setup(
    messages: Vec<QueueMessage>,
    config: SubmissionWorkerConfig,
) -> (Arc<InMemoryQueue>, Arc<InMemoryStream>, SubmissionWorker) {
    let queue = Arc::new(InMemoryQueue::with_messages(messages));
    let stream = Arc::new(InMemoryStream::default());
    let worker = SubmissionWorker::new(queue.clone(), stream.clone(), config);
    (queue, stream, worker)
}

#[tokio::test]
async fn test_reference_message_produces_enriched_records() {
    let (queue, stream, worker) = setup(
        vec![message(MESSAGE_ID, MESSAGE_BODY.to_string())],
        worker_config(),
    );

    let report = worker.run_cycle().await;
    assert_eq!(report.records_published, 4);

    let records = stream.records();
    assert_eq!(records.len(), 4);
    for (stream_name, record) in &records {
        assert_eq!(stream_name, "events");
        assert_eq!(record.partition_key, MESSAGE_ID);
    }

    let events = decoded_events(&stream);
    let types: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
    assert_eq!(
        types,
        vec!["new_process", "new_process", "network_connection", "network_connection"]
    );
    assert_eq!(events[0]["cmdl"], "notepad.exe");
    assert_eq!(events[1]["cmdl"], "calculator.exe");
    assert_eq!(events[3]["destination_port"], 19697);

    for event in &events {
        assert_eq!(event["device_id"], "7c85e579-1471-47f6-aae0-8f2ee074ac31");
        assert!(uuid::Uuid::parse_str(event["event_id"].as_str().unwrap()).is_ok());
        assert!(chrono::DateTime::parse_from_rfc3339(event["time_created"].as_str().unwrap()).is_ok());
    }

    assert_eq!(queue.deleted(), vec![format!("receipt-{}", MESSAGE_ID)]);
    assert!(queue.in_flight().is_empty());
}

#[tokio::test]
async fn test_one_event_of_each_type_in_order() {
    let body = codec::encode(&json!({
        "submission_id": "51ebf426-ddee-4885-bbf3-a5ebb5d60ea1",
        "device_id": "7c85e579-1471-47f6-aae0-8f2ee074ac31",
        "time_created": "2024-10-16T14:51:08.909477",
        "events": {
            "network_connection": [{"source_ip": "192.168.0.1", "destination_ip": "23.13.252.39", "destination_port": 55413}],
            "new_process": [{"cmdl": "notepad.exe", "user": "john"}]
        }
    }));
    let (_queue, stream, worker) = setup(vec![message("m-1", body)], worker_config());

    worker.run_cycle().await;

    let events = decoded_events(&stream);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["type"], "new_process");
    assert_eq!(events[0]["user"], "john");
    assert_eq!(events[1]["type"], "network_connection");
    assert_eq!(events[1]["destination_port"], 55413);
}

#[tokio::test]
async fn test_event_ids_are_unique() {
    let (_queue, stream, worker) = setup(
        vec![message(MESSAGE_ID, MESSAGE_BODY.to_string())],
        worker_config(),
    );

    worker.run_cycle().await;

    let mut ids: Vec<String> = decoded_events(&stream)
        .iter()
        .map(|e| e["event_id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
}

#[tokio::test]
async fn test_invalid_device_is_acknowledged_without_records() {
    let body = codec::encode(&json!({
        "submission_id": "51ebf426-ddee-4885-bbf3-a5ebb5d60ea1",
        "device_id": "not-an-uuid",
        "time_created": "2024-10-16T14:51:08.909477",
        "events": {
            "new_process": [{"cmdl": "notepad.exe", "user": "john"}],
            "network_connection": [{"destination_ip": "23.13.252.39"}]
        }
    }));
    let (queue, stream, worker) = setup(vec![message("m-1", body)], worker_config());

    let report = worker.run_cycle().await;

    assert_eq!(report.acknowledged, 1);
    assert!(stream.records().is_empty());
    assert_eq!(queue.deleted(), vec!["receipt-m-1".to_string()]);
}

#[tokio::test]
async fn test_invalid_events_dropped_siblings_kept() {
    let body = codec::encode(&json!({
        "submission_id": "51ebf426-ddee-4885-bbf3-a5ebb5d60ea1",
        "device_id": "7c85e579-1471-47f6-aae0-8f2ee074ac31",
        "events": {
            "new_process": [
                {"cmdl": null, "user": "john"},
                {"cmdl": "calculator.exe", "user": "admin"}
            ],
            "network_connection": [
                {"source_ip": "192.168.0.1", "destination_ip": "not-an-ip"},
                {"source_ip": "192.168.0.1", "destination_ip": "23.13.252.39"}
            ]
        }
    }));
    let (_queue, stream, worker) = setup(vec![message("m-1", body)], worker_config());

    worker.run_cycle().await;

    let events = decoded_events(&stream);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["type"], "new_process");
    assert_eq!(events[0]["cmdl"], "calculator.exe");
    assert_eq!(events[1]["type"], "network_connection");
    assert_eq!(events[1]["destination_ip"], "23.13.252.39");
}

#[tokio::test]
async fn test_loosely_typed_envelope_is_processed_and_removed() {
    let body = codec::encode(&json!({
        "submission_id": 42,
        "device_id": "7c85e579-1471-47f6-aae0-8f2ee074ac31",
        "time_created": 1729090268,
        "events": {
            "new_process": ["notepad.exe", {"cmdl": "notepad.exe"}],
            "network_connection": [{"destination_ip": null}]
        }
    }));
    let (queue, stream, worker) = setup(vec![message("m-1", body)], worker_config());

    let report = worker.run_cycle().await;

    assert_eq!(report.malformed, 0);
    assert_eq!(report.acknowledged, 1);
    assert_eq!(stream.records().len(), 2);
    assert!(queue.in_flight().is_empty());
}

#[tokio::test]
async fn test_malformed_message_stays_in_flight() {
    let (queue, stream, worker) = setup(
        vec![
            message("bad", "definitely not base64!".to_string()),
            message(MESSAGE_ID, MESSAGE_BODY.to_string()),
        ],
        worker_config(),
    );

    let report = worker.run_cycle().await;

    assert_eq!(report.fetched, 2);
    assert_eq!(report.malformed, 1);
    assert_eq!(report.acknowledged, 1);
    assert_eq!(stream.records().len(), 4);

    let in_flight = queue.in_flight();
    assert_eq!(in_flight.len(), 1);
    assert_eq!(in_flight[0].message_id, "bad");
}

#[tokio::test]
async fn test_body_digest_partition_key() {
    let config = SubmissionWorkerConfig {
        partition_key_source: PartitionKeySource::BodyDigest,
        ..worker_config()
    };
    let (_queue, stream, worker) =
        setup(vec![message(MESSAGE_ID, MESSAGE_BODY.to_string())], config);

    worker.run_cycle().await;

    let records = stream.records();
    assert!(!records.is_empty());
    assert!(records
        .iter()
        .all(|(_, r)| r.partition_key == format!("digest-{}", MESSAGE_ID)));
}

#[tokio::test]
async fn test_batch_size_limits_each_cycle() {
    let messages = (0..3)
        .map(|i| message(&format!("m-{}", i), MESSAGE_BODY.to_string()))
        .collect();
    let config = SubmissionWorkerConfig {
        batch_size: 1,
        ..worker_config()
    };
    let (queue, _stream, worker) = setup(messages, config);

    let first = worker.run_cycle().await;
    assert_eq!(first.fetched, 1);
    assert_eq!(queue.deleted(), vec!["receipt-m-0".to_string()]);

    worker.run_cycle().await;
    worker.run_cycle().await;
    let idle = worker.run_cycle().await;

    assert_eq!(idle.fetched, 0);
    assert_eq!(queue.deleted().len(), 3);
    assert_eq!(worker.stats().snapshot().cycles, 4);
}

#[tokio::test]
async fn test_unknown_queue_skips_cycle() {
    let config = SubmissionWorkerConfig {
        queue_name: "missing".to_string(),
        ..worker_config()
    };
    let (queue, stream, worker) =
        setup(vec![message(MESSAGE_ID, MESSAGE_BODY.to_string())], config);

    let report = worker.run_cycle().await;

    assert!(report.skipped);
    assert!(stream.records().is_empty());
    assert!(queue.deleted().is_empty());
}

#[tokio::test]
async fn test_run_drains_queue_until_cancelled() {
    let messages = (0..3)
        .map(|i| message(&format!("m-{}", i), MESSAGE_BODY.to_string()))
        .collect();
    let config = SubmissionWorkerConfig {
        batch_size: 2,
        ..worker_config()
    };
    let (queue, stream, worker) = setup(messages, config);
    let worker = Arc::new(worker);

    let ctx = CancellationToken::new();
    let handle = {
        let worker = worker.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { worker.run(ctx).await })
    };

    tokio::time::timeout(Duration::from_secs(5), async {
        while queue.deleted().len() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("queue was not drained");

    ctx.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(stream.records().len(), 12);
    assert_eq!(worker.stats().snapshot().messages_acknowledged, 3);
}
