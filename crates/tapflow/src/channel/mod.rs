//! Outbound messaging.
//!
//! [`Messenger`] is the seam every flow replies through. [`CloudApiClient`]
//! talks to the WhatsApp Cloud API; [`RecordingMessenger`] captures sends in
//! memory for tests and dry runs.

use async_trait::async_trait;
use tapflow_protocol::{Button, ListMessage, OutboundMessage};

mod client;
mod error;
mod recording;

pub use client::CloudApiClient;
pub use error::ChannelError;
pub use recording::{RecordingMessenger, SentMessage};

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Deliver `message` to the contact address `to`.
    async fn send(&self, to: &str, message: OutboundMessage) -> Result<(), ChannelError>;

    /// Resolve a media id from an inbound attachment to a downloadable URL.
    async fn media_url(&self, media_id: &str) -> Result<String, ChannelError>;

    /// The bot's own phone number, digits only.
    async fn display_number(&self) -> Result<String, ChannelError>;

    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        self.send(to, OutboundMessage::text(body)).await
    }

    /// Buttons past the platform limit are dropped.
    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: Vec<Button>,
    ) -> Result<(), ChannelError> {
        self.send(to, OutboundMessage::buttons(body, buttons)).await
    }

    async fn send_list(&self, to: &str, list: ListMessage) -> Result<(), ChannelError> {
        self.send(to, OutboundMessage::list(list)).await
    }

    async fn send_image(
        &self,
        to: &str,
        url: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        self.send(to, OutboundMessage::image(url, caption.map(str::to_string)))
            .await
    }
}
