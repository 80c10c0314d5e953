//! End-to-end pipeline test: a command event flows from the log reader
//! through the dispatcher and runner into the workflow API, with session
//! persistence and an offset commit at the end.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use facteur_bridge::consumer::CommandConsumer;
use facteur_bridge::dispatcher::WorkflowDispatcher;
use facteur_bridge::runner::WorkflowRunner;
use facteur_core::dispatch::{DispatchResult, ServiceConfig};
use facteur_core::error::BridgeError;
use facteur_core::workflow::{SubmitRequest, SubmitResponse, TemplateStatus};
use facteur_ports::message_bus::{BusError, Message, MessageReader};
use facteur_ports::session::{SessionError, SessionStore};
use facteur_ports::workflow_api::{Clock, WorkflowApi};

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Default)]
struct CapturingApi {
    requests: Mutex<Vec<SubmitRequest>>,
}

#[async_trait]
impl WorkflowApi for CapturingApi {
    async fn submit_workflow(&self, request: SubmitRequest) -> Result<SubmitResponse, BridgeError> {
        let namespace = request.namespace.clone();
        self.requests.lock().unwrap().push(request);
        Ok(SubmitResponse {
            namespace,
            workflow_name: "facteur-dispatch-7k2pq".to_string(),
        })
    }

    async fn get_workflow_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<TemplateStatus, BridgeError> {
        Ok(TemplateStatus {
            namespace: namespace.to_string(),
            name: name.to_string(),
            ready: true,
        })
    }
}

struct ScriptedReader {
    messages: VecDeque<Message>,
    commits: Arc<Mutex<Vec<u64>>>,
}

#[async_trait]
impl MessageReader for ScriptedReader {
    async fn fetch(&mut self) -> Result<Message, BusError> {
        self.messages.pop_front().ok_or(BusError::EndOfStream)
    }

    async fn commit(&mut self, message: &Message) -> Result<(), BusError> {
        self.commits.lock().unwrap().push(message.offset);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BusError> {
        Ok(())
    }
}

#[derive(Default)]
struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn set(&self, key: &str, value: &[u8], _ttl: Duration) -> Result<(), SessionError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, SessionError> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(SessionError::NotFound)
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

#[tokio::test]
async fn command_event_reaches_the_workflow_api_and_commits() {
    let api = Arc::new(CapturingApi::default());
    let clock = Arc::new(FixedClock(
        Utc.with_ymd_and_hms(2025, 4, 22, 15, 4, 5).unwrap(),
    ));
    let runner = Arc::new(WorkflowRunner::new(api.clone()).with_clock(clock));
    let dispatcher = Arc::new(
        WorkflowDispatcher::new(
            runner,
            ServiceConfig {
                namespace: "argo".to_string(),
                workflow_template: "facteur-dispatch".to_string(),
                service_account: "facteur".to_string(),
                parameters: [("env".to_string(), "prod".to_string())].into(),
            },
        )
        .expect("dispatcher"),
    );

    let reader = ScriptedReader {
        messages: VecDeque::from([Message {
            topic: "discord.commands.incoming".to_string(),
            partition: 0,
            offset: 12,
            key: b"user-1".to_vec(),
            value: br#"{"command":"dispatch","options":{"payload":"{\"prompt\":\"x\"}"},"userId":"user-1","traceId":"trace-1"}"#
                .to_vec(),
            headers: Vec::new(),
        }]),
        commits: Arc::new(Mutex::new(Vec::new())),
    };
    let commits = reader.commits.clone();
    let store = Arc::new(MemoryStore::default());

    let mut consumer = CommandConsumer::new(Box::new(reader), dispatcher)
        .with_store(store.clone())
        .with_session_ttl(Duration::from_secs(60));
    consumer.run().await.expect("run");

    // One submission, baseline parameter plus request override, sorted keys.
    let requests = api.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].namespace, "argo");
    assert_eq!(requests[0].generate_name, "dispatch-20250422-150405-");
    let pairs: Vec<(&str, &str)> = requests[0]
        .parameters
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    assert_eq!(pairs, vec![("env", "prod"), ("payload", r#"{"prompt":"x"}"#)]);

    // The dispatch result landed in the session store under the user key.
    let entries = store.entries.lock().unwrap();
    let payload = entries.get("dispatch:user-1").expect("session entry");
    let result: DispatchResult = serde_json::from_slice(payload).expect("dispatch result");
    assert_eq!(result.workflow_name, "facteur-dispatch-7k2pq");
    // no correlation id on the event: the workflow name stands in
    assert_eq!(result.correlation_id, "facteur-dispatch-7k2pq");
    assert_eq!(result.trace_id, "trace-1");

    assert_eq!(*commits.lock().unwrap(), vec![12]);
}
