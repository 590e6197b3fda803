//! In-memory messenger that records every send.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tapflow_protocol::OutboundMessage;
use tokio::sync::Mutex;

use super::{ChannelError, Messenger};

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub to: String,
    pub message: OutboundMessage,
}

/// Records sends instead of delivering them.
#[derive(Clone)]
pub struct RecordingMessenger {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    display_number: String,
    fail_sends: Arc<AtomicBool>,
}

impl Default for RecordingMessenger {
    fn default() -> Self {
        Self::new("250788000000")
    }
}

impl RecordingMessenger {
    pub fn new(display_number: impl Into<String>) -> Self {
        Self {
            sent: Arc::default(),
            display_number: display_number.into(),
            fail_sends: Arc::default(),
        }
    }

    /// Make every subsequent send fail with an API error.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, to: &str) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|s| s.to == to)
            .map(|s| s.message.clone())
            .collect()
    }

    /// Bodies of text messages sent to `to`.
    pub async fn texts_to(&self, to: &str) -> Vec<String> {
        self.sent_to(to)
            .await
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::Text { body } => Some(body),
                _ => None,
            })
            .collect()
    }

    /// Every control id offered to `to`, in send order.
    pub async fn control_ids_to(&self, to: &str) -> Vec<String> {
        self.sent_to(to)
            .await
            .iter()
            .flat_map(|m| m.control_ids().into_iter().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, to: &str, message: OutboundMessage) -> Result<(), ChannelError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::Api {
                status: 503,
                message: "send disabled".into(),
            });
        }
        self.sent.lock().await.push(SentMessage {
            to: to.to_string(),
            message,
        });
        Ok(())
    }

    async fn media_url(&self, media_id: &str) -> Result<String, ChannelError> {
        Ok(format!("https://media.invalid/{media_id}"))
    }

    async fn display_number(&self) -> Result<String, ChannelError> {
        Ok(self.display_number.clone())
    }
}
