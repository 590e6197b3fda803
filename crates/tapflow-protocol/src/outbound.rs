//! Outbound message types.
//!
//! Constructors apply the platform's limits: at most [`MAX_BUTTONS`] reply buttons,
//! at most [`MAX_LIST_ROWS`] list rows (excess silently dropped), and every title or
//! description cut to its character budget with a trailing ellipsis.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const MAX_BUTTONS: usize = 3;
pub const MAX_LIST_ROWS: usize = 10;
pub const BUTTON_TITLE_MAX: usize = 20;
pub const ROW_TITLE_MAX: usize = 24;
pub const ROW_DESCRIPTION_MAX: usize = 72;

const ELLIPSIS: char = '…';

/// Cut `text` to at most `max` characters, ending in an ellipsis when shortened.
pub fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max - 1).collect();
    out.push(ELLIPSIS);
    out
}

/// A reply button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub id: String,
    pub title: String,
}

impl Button {
    pub fn new(id: impl Into<String>, title: &str) -> Self {
        Self {
            id: id.into(),
            title: truncate(title, BUTTON_TITLE_MAX),
        }
    }
}

/// A row in a list message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ListRow {
    pub fn new(id: impl Into<String>, title: &str) -> Self {
        Self {
            id: id.into(),
            title: truncate(title, ROW_TITLE_MAX),
            description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        let description = truncate(description, ROW_DESCRIPTION_MAX);
        self.description = (!description.is_empty()).then_some(description);
        self
    }
}

/// A single-section list message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMessage {
    pub title: String,
    pub body: String,
    pub button_label: String,
    pub section_title: String,
    pub rows: Vec<ListRow>,
}

impl ListMessage {
    pub fn new(
        title: &str,
        body: &str,
        button_label: &str,
        section_title: &str,
        mut rows: Vec<ListRow>,
    ) -> Self {
        rows.truncate(MAX_LIST_ROWS);
        Self {
            title: title.to_string(),
            body: body.to_string(),
            button_label: truncate(button_label, BUTTON_TITLE_MAX),
            section_title: truncate(section_title, ROW_TITLE_MAX),
            rows,
        }
    }
}

/// Any message the service sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Text {
        body: String,
    },
    Buttons {
        body: String,
        buttons: Vec<Button>,
    },
    List(ListMessage),
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}

impl OutboundMessage {
    pub fn text(body: impl Into<String>) -> Self {
        OutboundMessage::Text { body: body.into() }
    }

    pub fn buttons(body: impl Into<String>, mut buttons: Vec<Button>) -> Self {
        buttons.truncate(MAX_BUTTONS);
        OutboundMessage::Buttons {
            body: body.into(),
            buttons,
        }
    }

    pub fn list(list: ListMessage) -> Self {
        OutboundMessage::List(list)
    }

    pub fn image(url: impl Into<String>, caption: Option<String>) -> Self {
        OutboundMessage::Image {
            url: url.into(),
            caption,
        }
    }

    /// Ids of every interactive control carried by this message.
    pub fn control_ids(&self) -> Vec<&str> {
        match self {
            OutboundMessage::Buttons { buttons, .. } => {
                buttons.iter().map(|b| b.id.as_str()).collect()
            }
            OutboundMessage::List(list) => list.rows.iter().map(|r| r.id.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Cloud API `/messages` request body for recipient `to`.
    pub fn to_cloud_payload(&self, to: &str) -> Value {
        match self {
            OutboundMessage::Text { body } => json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": to,
                "type": "text",
                "text": { "body": body, "preview_url": true },
            }),
            OutboundMessage::Buttons { body, buttons } => json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": to,
                "type": "interactive",
                "interactive": {
                    "type": "button",
                    "body": { "text": body },
                    "action": {
                        "buttons": buttons
                            .iter()
                            .map(|b| json!({ "type": "reply", "reply": { "id": b.id, "title": b.title } }))
                            .collect::<Vec<_>>(),
                    },
                },
            }),
            OutboundMessage::List(list) => json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": to,
                "type": "interactive",
                "interactive": {
                    "type": "list",
                    "header": { "type": "text", "text": list.title },
                    "body": { "text": list.body },
                    "action": {
                        "button": list.button_label,
                        "sections": [{
                            "title": list.section_title,
                            "rows": list.rows,
                        }],
                    },
                },
            }),
            OutboundMessage::Image { url, caption } => {
                let mut image = json!({ "link": url });
                if let Some(caption) = caption {
                    image["caption"] = json!(caption);
                }
                json!({
                    "messaging_product": "whatsapp",
                    "recipient_type": "individual",
                    "to": to,
                    "type": "image",
                    "image": image,
                })
            }
        }
    }
}
