//! Queue wire types and the outbound message seam.

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::foundation::error::{FeedforgeError, FeedforgeResult};

/// Inbound/outbound queue payload:
/// `{"type": "process"|"generate", "data": {...}}`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum QueueMessage {
    Process(ProcessRequest),
    Generate(GenerateRequest),
}

impl QueueMessage {
    pub fn decode(raw: &str) -> FeedforgeResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| FeedforgeError::serde(format!("undecodable queue message: {e}")))
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProcessRequest {
    pub access_token: String,
    pub user_template_id: String,
    pub outfeed_id: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GenerateRequest {
    pub generated_feed_id: Uuid,
}

/// Outbound side of the queue; the transport itself lives outside this
/// system.
#[async_trait]
pub trait QueueSink: Send + Sync {
    async fn send(&self, message: &QueueMessage) -> FeedforgeResult<()>;
}

/// Collecting sink for tests.
#[derive(Default)]
pub struct MemoryQueueSink {
    messages: Mutex<Vec<QueueMessage>>,
}

impl MemoryQueueSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<QueueMessage> {
        self.messages.lock().expect("queue sink lock poisoned").clone()
    }

    pub fn drain(&self) -> Vec<QueueMessage> {
        std::mem::take(&mut *self.messages.lock().expect("queue sink lock poisoned"))
    }
}

#[async_trait]
impl QueueSink for MemoryQueueSink {
    async fn send(&self, message: &QueueMessage) -> FeedforgeResult<()> {
        self.messages
            .lock()
            .expect("queue sink lock poisoned")
            .push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_the_wire_shape() {
        let msg = QueueMessage::decode(
            r#"{"type": "process",
                "data": {"access_token": "tok", "user_template_id": "t1",
                         "outfeed_id": "feed-1"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            QueueMessage::Process(ProcessRequest {
                access_token: "tok".to_string(),
                user_template_id: "t1".to_string(),
                outfeed_id: "feed-1".to_string(),
            })
        );

        let id = Uuid::new_v4();
        let raw = format!(r#"{{"type": "generate", "data": {{"generated_feed_id": "{id}"}}}}"#);
        assert_eq!(
            QueueMessage::decode(&raw).unwrap(),
            QueueMessage::Generate(GenerateRequest {
                generated_feed_id: id
            })
        );
    }

    #[test]
    fn rejects_unknown_message_types() {
        assert!(QueueMessage::decode(r#"{"type": "explode", "data": {}}"#).is_err());
        assert!(QueueMessage::decode("not json").is_err());
    }

    #[test]
    fn encoding_matches_the_wire_shape() {
        let msg = QueueMessage::Generate(GenerateRequest {
            generated_feed_id: Uuid::nil(),
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "generate");
        assert_eq!(
            value["data"]["generated_feed_id"],
            "00000000-0000-0000-0000-000000000000"
        );
    }
}
