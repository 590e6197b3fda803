//! WhatsApp Cloud API wire types for tapflow.
//!
//! Two halves:
//!
//! - [`inbound`]: the webhook envelope as the platform posts it, resolved once at the
//!   ingress boundary into a closed [`InboundMessage`] / [`MessageKind`] sum type.
//! - [`outbound`]: text, reply-button, list and image messages, with the platform's
//!   title budgets applied at construction time.
//!
//! This crate does no I/O.

pub mod inbound;
pub mod outbound;

pub use inbound::{InboundMessage, MediaKind, MediaPayload, MessageKind, Reply, WebhookEnvelope};
pub use outbound::{
    BUTTON_TITLE_MAX, Button, ListMessage, ListRow, MAX_BUTTONS, MAX_LIST_ROWS, OutboundMessage,
    ROW_DESCRIPTION_MAX, ROW_TITLE_MAX, truncate,
};
