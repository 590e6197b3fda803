//! Share links and QR image URLs.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::cache::TtlCache;
use crate::channel::{ChannelError, Messenger};

const QR_SIZE: &str = "512x512";

/// Builds `wa.me` chat links and QR image URLs.
///
/// The bot's own number is either configured or looked up lazily through the
/// messenger and cached.
pub struct ShareLinks {
    messenger: Arc<dyn Messenger>,
    bot_number: TtlCache<String>,
    qr_renderer: Url,
}

impl ShareLinks {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        display_number: Option<String>,
        identity_ttl: Duration,
        qr_renderer: Url,
    ) -> Self {
        let bot_number = match display_number.map(|n| digits(&n)).filter(|n| !n.is_empty()) {
            Some(number) => TtlCache::fixed(number),
            None => TtlCache::new(identity_ttl),
        };
        Self {
            messenger,
            bot_number,
            qr_renderer,
        }
    }

    /// Link that opens a chat with `phone`, optionally with a prefilled message.
    pub fn chat_link(phone: &str, prefill: Option<&str>) -> String {
        let base = format!("https://wa.me/{}", digits(phone));
        let Ok(mut url) = Url::parse(&base) else {
            return base;
        };
        if let Some(text) = prefill.filter(|t| !t.is_empty()) {
            url.query_pairs_mut().append_pair("text", text);
        }
        url.to_string()
    }

    /// Link that opens a chat with the bot itself.
    pub async fn bot_link(&self, prefill: Option<&str>) -> Result<String, ChannelError> {
        let number = self
            .bot_number
            .get_or_refresh(|| self.messenger.display_number())
            .await?;
        Ok(Self::chat_link(&number, prefill))
    }

    /// URL of a QR image encoding `data`.
    pub fn qr_url(&self, data: &str) -> String {
        let mut url = self.qr_renderer.clone();
        url.query_pairs_mut()
            .append_pair("size", QR_SIZE)
            .append_pair("data", data);
        url.to_string()
    }
}

fn digits(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}
