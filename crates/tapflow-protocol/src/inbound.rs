//! Inbound webhook envelope.
//!
//! The platform nests a single message event several levels deep:
//!
//! ```text
//! { "entry": [ { "changes": [ { "value": { "contacts": [...], "messages": [ {...} ] } } ] } ] }
//! ```
//!
//! The `Raw*` structs mirror that shape loosely (every field optional) so a status
//! callback or a new message type never fails deserialization. [`WebhookEnvelope::first_message`]
//! then resolves the first message into an [`InboundMessage`], which is the only type
//! the rest of the system sees.

use serde::Deserialize;

// ============================================================================
// Resolved types
// ============================================================================

/// A single inbound message event, resolved from the raw envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Sender address (digits, no leading `+`). Absent on malformed payloads.
    pub sender: Option<String>,
    /// Platform message identifier, used for de-duplication.
    pub id: Option<String>,
    /// Unix timestamp in seconds, when the platform sent one.
    pub timestamp: Option<i64>,
    /// Sender's profile name from the `contacts` block.
    pub profile_name: Option<String>,
    pub kind: MessageKind,
}

/// The closed set of message shapes the router understands.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    Text { body: String },
    Media(MediaPayload),
    Location { latitude: f64, longitude: f64 },
    ListReply(Reply),
    ButtonReply(Reply),
    /// Anything else (stickers, reactions, malformed interactive payloads).
    Unsupported { type_name: String },
}

/// Attachment reference. The bytes live on the platform and must be fetched by id.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPayload {
    pub kind: MediaKind,
    pub media_id: String,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Document => "document",
        }
    }
}

/// An interactive control reply. `id` may be empty when the platform omits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub id: String,
    pub title: Option<String>,
}

impl InboundMessage {
    /// Text body, if this is a text message.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Text { body } => Some(body.as_str()),
            _ => None,
        }
    }

    /// Identifier of the tapped button or list row, if any.
    pub fn control_id(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::ListReply(reply) | MessageKind::ButtonReply(reply) => {
                Some(reply.id.as_str())
            }
            _ => None,
        }
    }

    /// Short type name for logging.
    pub fn type_name(&self) -> &str {
        match &self.kind {
            MessageKind::Text { .. } => "text",
            MessageKind::Media(media) => media.kind.as_str(),
            MessageKind::Location { .. } => "location",
            MessageKind::ListReply(_) => "list_reply",
            MessageKind::ButtonReply(_) => "button_reply",
            MessageKind::Unsupported { type_name } => type_name.as_str(),
        }
    }
}

// ============================================================================
// Raw envelope
// ============================================================================

/// Top-level webhook body.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<RawEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawEntry {
    #[serde(default)]
    pub changes: Vec<RawChange>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawChange {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: Option<RawChangeValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawChangeValue {
    #[serde(default)]
    pub contacts: Vec<RawContact>,
    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawContact {
    #[serde(default)]
    pub wa_id: Option<String>,
    #[serde(default)]
    pub profile: Option<RawProfile>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawProfile {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<RawText>,
    #[serde(default)]
    pub image: Option<RawMedia>,
    #[serde(default)]
    pub document: Option<RawMedia>,
    #[serde(default)]
    pub location: Option<RawLocation>,
    #[serde(default)]
    pub interactive: Option<RawInteractive>,
    /// Quick-reply buttons on template messages.
    #[serde(default)]
    pub button: Option<RawTemplateButton>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawText {
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawMedia {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawLocation {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawInteractive {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub list_reply: Option<RawReply>,
    #[serde(default)]
    pub button_reply: Option<RawReply>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawReply {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawTemplateButton {
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl WebhookEnvelope {
    /// Parse a raw request body.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Resolve the first message event in the envelope.
    ///
    /// Returns `None` for deliveries that carry no message (status callbacks,
    /// template updates, empty test pings).
    pub fn first_message(&self) -> Option<InboundMessage> {
        self.entry
            .iter()
            .flat_map(|entry| entry.changes.iter())
            .filter_map(|change| change.value.as_ref())
            .find_map(|value| {
                let raw = value.messages.first()?;
                let profile_name = value
                    .contacts
                    .iter()
                    .find(|c| c.wa_id.is_some() && c.wa_id == raw.from)
                    .or_else(|| value.contacts.first())
                    .and_then(|c| c.profile.as_ref())
                    .and_then(|p| p.name.clone());
                Some(resolve(raw, profile_name))
            })
    }
}

fn resolve(raw: &RawMessage, profile_name: Option<String>) -> InboundMessage {
    let sender = raw
        .from
        .as_deref()
        .map(|s| s.trim().trim_start_matches('+').to_string())
        .filter(|s| !s.is_empty());
    let id = raw
        .id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let timestamp = raw.timestamp.as_deref().and_then(|t| t.parse::<i64>().ok());

    InboundMessage {
        sender,
        id,
        timestamp,
        profile_name,
        kind: resolve_kind(raw),
    }
}

fn resolve_kind(raw: &RawMessage) -> MessageKind {
    let type_name = raw.kind.as_deref().unwrap_or("unknown");
    let unsupported = || MessageKind::Unsupported {
        type_name: type_name.to_string(),
    };

    match type_name {
        "text" => match raw.text.as_ref().and_then(|t| t.body.clone()) {
            Some(body) => MessageKind::Text { body },
            None => unsupported(),
        },
        "image" => resolve_media(MediaKind::Image, raw.image.as_ref()).unwrap_or_else(unsupported),
        "document" => {
            resolve_media(MediaKind::Document, raw.document.as_ref()).unwrap_or_else(unsupported)
        }
        "location" => match raw.location.as_ref() {
            Some(RawLocation {
                latitude: Some(latitude),
                longitude: Some(longitude),
            }) => MessageKind::Location {
                latitude: *latitude,
                longitude: *longitude,
            },
            _ => unsupported(),
        },
        "interactive" => {
            let Some(interactive) = raw.interactive.as_ref() else {
                return unsupported();
            };
            match interactive.kind.as_deref() {
                Some("list_reply") => MessageKind::ListReply(to_reply(
                    interactive.list_reply.as_ref(),
                )),
                Some("button_reply") => MessageKind::ButtonReply(to_reply(
                    interactive.button_reply.as_ref(),
                )),
                _ => unsupported(),
            }
        }
        "button" => match raw.button.as_ref() {
            Some(button) => MessageKind::ButtonReply(Reply {
                id: button.payload.clone().unwrap_or_default(),
                title: button.text.clone(),
            }),
            None => unsupported(),
        },
        _ => unsupported(),
    }
}

fn resolve_media(kind: MediaKind, media: Option<&RawMedia>) -> Option<MessageKind> {
    let media = media?;
    let media_id = media.id.clone().filter(|id| !id.is_empty())?;
    Some(MessageKind::Media(MediaPayload {
        kind,
        media_id,
        mime_type: media.mime_type.clone(),
        caption: media.caption.clone(),
        filename: media.filename.clone(),
    }))
}

fn to_reply(reply: Option<&RawReply>) -> Reply {
    Reply {
        id: reply
            .and_then(|r| r.id.as_deref())
            .map(str::trim)
            .unwrap_or_default()
            .to_string(),
        title: reply.and_then(|r| r.title.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(message: &str) -> String {
        format!(
            r#"{{
                "object": "whatsapp_business_account",
                "entry": [{{
                    "id": "123",
                    "changes": [{{
                        "field": "messages",
                        "value": {{
                            "messaging_product": "whatsapp",
                            "contacts": [{{ "wa_id": "250788000001", "profile": {{ "name": "Aline" }} }}],
                            "messages": [{message}]
                        }}
                    }}]
                }}]
            }}"#
        )
    }

    fn parse_first(message: &str) -> InboundMessage {
        WebhookEnvelope::parse(envelope(message).as_bytes())
            .unwrap()
            .first_message()
            .unwrap()
    }

    #[test]
    fn resolves_text_message() {
        let msg = parse_first(
            r#"{"from":"250788000001","id":"wamid.1","timestamp":"1700000000","type":"text","text":{"body":"hi"}}"#,
        );
        assert_eq!(msg.sender.as_deref(), Some("250788000001"));
        assert_eq!(msg.id.as_deref(), Some("wamid.1"));
        assert_eq!(msg.timestamp, Some(1_700_000_000));
        assert_eq!(msg.profile_name.as_deref(), Some("Aline"));
        assert_eq!(msg.text(), Some("hi"));
    }

    #[test]
    fn resolves_list_and_button_replies() {
        let list = parse_first(
            r#"{"from":"250788000001","id":"m2","type":"interactive","interactive":{"type":"list_reply","list_reply":{"id":"baskets","title":"Baskets"}}}"#,
        );
        assert_eq!(list.control_id(), Some("baskets"));
        assert!(matches!(list.kind, MessageKind::ListReply(_)));

        let button = parse_first(
            r#"{"from":"250788000001","id":"m3","type":"interactive","interactive":{"type":"button_reply","button_reply":{"id":"bk_type_public","title":"Public"}}}"#,
        );
        assert!(matches!(button.kind, MessageKind::ButtonReply(ref r) if r.id == "bk_type_public"));
    }

    #[test]
    fn resolves_template_button_payload() {
        let msg = parse_first(
            r#"{"from":"250788000001","id":"m4","type":"button","button":{"payload":"back_home","text":"Menu"}}"#,
        );
        assert_eq!(msg.control_id(), Some("back_home"));
    }

    #[test]
    fn resolves_media_and_location() {
        let image = parse_first(
            r#"{"from":"250788000001","id":"m5","type":"image","image":{"id":"media-1","mime_type":"image/jpeg"}}"#,
        );
        match image.kind {
            MessageKind::Media(media) => {
                assert_eq!(media.kind, MediaKind::Image);
                assert_eq!(media.media_id, "media-1");
                assert_eq!(media.mime_type.as_deref(), Some("image/jpeg"));
            }
            other => panic!("expected media, got {other:?}"),
        }

        let location = parse_first(
            r#"{"from":"250788000001","id":"m6","type":"location","location":{"latitude":-1.95,"longitude":30.06}}"#,
        );
        assert_eq!(
            location.kind,
            MessageKind::Location {
                latitude: -1.95,
                longitude: 30.06
            }
        );
    }

    #[test]
    fn unknown_and_incomplete_shapes_are_unsupported() {
        let sticker = parse_first(r#"{"from":"250788000001","id":"m7","type":"sticker","sticker":{}}"#);
        assert!(matches!(sticker.kind, MessageKind::Unsupported { ref type_name } if type_name == "sticker"));

        let no_coords = parse_first(
            r#"{"from":"250788000001","id":"m8","type":"location","location":{"latitude":1.0}}"#,
        );
        assert!(matches!(no_coords.kind, MessageKind::Unsupported { .. }));

        let no_media_id = parse_first(r#"{"from":"250788000001","id":"m9","type":"document","document":{}}"#);
        assert!(matches!(no_media_id.kind, MessageKind::Unsupported { .. }));
    }

    #[test]
    fn missing_sender_and_id_resolve_to_none() {
        let msg = parse_first(r#"{"type":"text","text":{"body":"x"}}"#);
        assert_eq!(msg.sender, None);
        assert_eq!(msg.id, None);
    }

    #[test]
    fn status_callback_has_no_message() {
        let body = r#"{"object":"whatsapp_business_account","entry":[{"changes":[{"field":"messages","value":{"statuses":[{"id":"wamid.1","status":"delivered"}]}}]}]}"#;
        let envelope = WebhookEnvelope::parse(body.as_bytes()).unwrap();
        assert!(envelope.first_message().is_none());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(WebhookEnvelope::parse(b"{not json").is_err());
    }
}
