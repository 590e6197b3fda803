//! Flow state machines.
//!
//! Each flow owns a set of state keys and interactive control ids. The router
//! picks the owning [`Flow`] for an event and calls one of its handlers with a
//! [`FlowContext`]; the handler replies, moves the user to the next state and
//! returns whether it actually handled the event.
//!
//! | flow | module |
//! |---|---|
//! | home menu and sharing | [`home`] |
//! | funding baskets | [`basket`] |
//! | marketplace | [`marketplace`] |
//! | nearby drivers / passengers | [`nearby`] |
//! | trip scheduling | [`schedule`] |
//! | insurance document intake | [`insurance`] |
//! | MoMo payment codes | [`momo_qr`] |

use std::fmt;
use std::sync::Arc;

use tapflow_protocol::{Button, ListMessage, MediaPayload, OutboundMessage};
use thiserror::Error;
use tracing::warn;

use crate::cache::TtlCache;
use crate::channel::{ChannelError, Messenger};
use crate::extraction::DocumentExtractor;
use crate::matching::MatchingEngine;
use crate::router::Route;
use crate::share::ShareLinks;
use crate::state::{FlowState, LoadedState};
use crate::store::{
    Contact, ContactStore, GeoPoint, StateStore, StorageError, StorageResult, Store,
};

pub mod basket;
pub mod home;
pub mod insurance;
pub mod marketplace;
pub mod momo_qr;
pub mod nearby;
pub mod schedule;

// ============================================================================
// Services
// ============================================================================

/// Long-lived collaborators shared by every request.
pub struct Services {
    pub store: Arc<dyn Store>,
    pub messenger: Arc<dyn Messenger>,
    pub matching: Arc<dyn MatchingEngine>,
    pub extractor: Arc<dyn DocumentExtractor>,
    pub share: ShareLinks,
    pub admins: TtlCache<Vec<String>>,
}

impl Services {
    /// Staff numbers for intake notifications, served from the TTL cache.
    pub async fn admin_numbers(&self) -> StorageResult<Vec<String>> {
        self.admins
            .get_or_refresh(|| self.store.admin_numbers())
            .await
    }
}

// ============================================================================
// Errors and outcomes
// ============================================================================

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("channel: {0}")]
    Channel(#[from] ChannelError),

    #[error("state encoding: {0}")]
    State(#[from] serde_json::Error),
}

/// Whether a handler took responsibility for the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Handled,
    /// Not for this flow; the router keeps looking or falls back.
    Declined,
}

pub type FlowResult = Result<Outcome, FlowError>;

// ============================================================================
// FlowContext
// ============================================================================

/// Per-request view of one user's conversation.
pub struct FlowContext<'a> {
    pub services: &'a Services,
    pub contact: Contact,
    pub state: FlowState,
    version: Option<i64>,
    pub request_id: String,
}

impl<'a> FlowContext<'a> {
    pub fn new(
        services: &'a Services,
        contact: Contact,
        loaded: LoadedState,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            services,
            contact,
            state: loaded.state,
            version: loaded.version,
            request_id: request_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.contact.user_id
    }

    pub fn phone(&self) -> &str {
        &self.contact.phone
    }

    pub fn store(&self) -> &dyn Store {
        self.services.store.as_ref()
    }

    /// Replace the user's state. Fails with a conflict if another request
    /// changed it since it was loaded.
    pub async fn set_state(&mut self, state: FlowState) -> Result<(), FlowError> {
        let data = state.data()?;
        let version = self
            .services
            .store
            .save_state(&self.contact.user_id, state.key(), &data, self.version)
            .await?;
        self.version = Some(version);
        self.state = state;
        Ok(())
    }

    /// Reset the user to `home`, under the same conflict check as
    /// [`set_state`](Self::set_state).
    pub async fn clear_state(&mut self) -> Result<(), FlowError> {
        let version = self
            .services
            .store
            .clear_state(&self.contact.user_id, self.version)
            .await?;
        self.version = Some(version);
        self.state = FlowState::Home;
        Ok(())
    }

    pub async fn reply(&self, message: OutboundMessage) -> Result<(), FlowError> {
        self.services
            .messenger
            .send(&self.contact.phone, message)
            .await?;
        Ok(())
    }

    pub async fn reply_text(&self, body: impl Into<String>) -> Result<(), FlowError> {
        self.reply(OutboundMessage::text(body)).await
    }

    pub async fn reply_buttons(
        &self,
        body: impl Into<String>,
        buttons: Vec<Button>,
    ) -> Result<(), FlowError> {
        self.reply(OutboundMessage::buttons(body, buttons)).await
    }

    pub async fn reply_list(&self, list: ListMessage) -> Result<(), FlowError> {
        self.reply(OutboundMessage::list(list)).await
    }

    pub async fn reply_image(
        &self,
        url: impl Into<String>,
        caption: Option<String>,
    ) -> Result<(), FlowError> {
        self.reply(OutboundMessage::image(url, caption)).await
    }

    /// Message another user by id. Skips unknown and opted-out contacts.
    /// Delivery failures are logged, not raised: the acting user's step has
    /// already been committed.
    pub async fn notify_user(
        &self,
        user_id: &str,
        message: OutboundMessage,
    ) -> Result<bool, FlowError> {
        let Some(contact) = self.store().get_contact(user_id).await? else {
            warn!(user_id, "Notification target not found");
            return Ok(false);
        };
        if contact.opted_out {
            return Ok(false);
        }
        Ok(self.notify_phone(&contact.phone, message).await)
    }

    /// Message an arbitrary address, logging failures.
    pub async fn notify_phone(&self, phone: &str, message: OutboundMessage) -> bool {
        match self.services.messenger.send(phone, message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(request_id = %self.request_id, to = phone, error = %e, "Notification failed");
                false
            }
        }
    }
}

// ============================================================================
// Flow
// ============================================================================

/// The flow that owns a control id or state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Flow {
    Home,
    Basket,
    Marketplace,
    Nearby,
    Schedule,
    Insurance,
    MomoQr,
}

impl Flow {
    pub const ALL: [Flow; 7] = [
        Flow::Home,
        Flow::Basket,
        Flow::Marketplace,
        Flow::Nearby,
        Flow::Schedule,
        Flow::Insurance,
        Flow::MomoQr,
    ];

    /// Flows that may claim free text, in the order they are asked.
    pub const TEXT_CLAIMERS: [Flow; 4] = [
        Flow::Basket,
        Flow::MomoQr,
        Flow::Insurance,
        Flow::Marketplace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Flow::Home => "home",
            Flow::Basket => "basket",
            Flow::Marketplace => "marketplace",
            Flow::Nearby => "nearby",
            Flow::Schedule => "schedule",
            Flow::Insurance => "insurance",
            Flow::MomoQr => "momo_qr",
        }
    }

    pub fn list_routes(&self) -> &'static [Route] {
        match self {
            Flow::Home => home::LIST_ROUTES,
            Flow::Basket => basket::LIST_ROUTES,
            Flow::Marketplace => marketplace::LIST_ROUTES,
            Flow::Nearby => nearby::LIST_ROUTES,
            Flow::Schedule => schedule::LIST_ROUTES,
            Flow::Insurance => insurance::LIST_ROUTES,
            Flow::MomoQr => momo_qr::LIST_ROUTES,
        }
    }

    pub fn button_routes(&self) -> &'static [Route] {
        match self {
            Flow::Home => home::BUTTON_ROUTES,
            Flow::Basket => basket::BUTTON_ROUTES,
            Flow::Marketplace => marketplace::BUTTON_ROUTES,
            Flow::Nearby => &[],
            Flow::Schedule => schedule::BUTTON_ROUTES,
            Flow::Insurance => &[],
            Flow::MomoQr => momo_qr::BUTTON_ROUTES,
        }
    }

    /// The flow waiting for a location in `state`, if any.
    pub fn awaiting_location(state: &FlowState) -> Option<Flow> {
        match state {
            FlowState::AwaitBusinessLocation(_) | FlowState::AwaitMarketSeeLoc(_) => {
                Some(Flow::Marketplace)
            }
            FlowState::NearAwaitLocDrivers(_) | FlowState::NearAwaitLocPassengers(_) => {
                Some(Flow::Nearby)
            }
            FlowState::AwaitSchedulePickup(_) | FlowState::SchedAwaitDrop(_) => {
                Some(Flow::Schedule)
            }
            _ => None,
        }
    }

    /// The flow waiting for an attachment in `state`, if any.
    pub fn awaiting_media(state: &FlowState) -> Option<Flow> {
        match state {
            FlowState::InsWaitDoc => Some(Flow::Insurance),
            _ => None,
        }
    }

    pub async fn on_list(self, ctx: &mut FlowContext<'_>, id: &str) -> FlowResult {
        match self {
            Flow::Home => Ok(Outcome::Declined),
            Flow::Basket => basket::on_list(ctx, id).await,
            Flow::Marketplace => marketplace::on_list(ctx, id).await,
            Flow::Nearby => nearby::on_list(ctx, id).await,
            Flow::Schedule => schedule::on_list(ctx, id).await,
            Flow::Insurance => insurance::on_list(ctx, id).await,
            Flow::MomoQr => momo_qr::on_list(ctx, id).await,
        }
    }

    pub async fn on_button(self, ctx: &mut FlowContext<'_>, id: &str) -> FlowResult {
        match self {
            Flow::Home => home::on_button(ctx, id).await,
            Flow::Basket => basket::on_button(ctx, id).await,
            Flow::Marketplace => marketplace::on_button(ctx, id).await,
            Flow::Schedule => schedule::on_button(ctx, id).await,
            Flow::MomoQr => momo_qr::on_button(ctx, id).await,
            Flow::Nearby | Flow::Insurance => Ok(Outcome::Declined),
        }
    }

    pub async fn on_location(self, ctx: &mut FlowContext<'_>, point: GeoPoint) -> FlowResult {
        match self {
            Flow::Marketplace => marketplace::on_location(ctx, point).await,
            Flow::Nearby => nearby::on_location(ctx, point).await,
            Flow::Schedule => schedule::on_location(ctx, point).await,
            _ => Ok(Outcome::Declined),
        }
    }

    pub async fn on_text(self, ctx: &mut FlowContext<'_>, text: &str) -> FlowResult {
        match self {
            Flow::Basket => basket::on_text(ctx, text).await,
            Flow::MomoQr => momo_qr::on_text(ctx, text).await,
            Flow::Insurance => insurance::on_text(ctx, text).await,
            Flow::Marketplace => marketplace::on_text(ctx, text).await,
            _ => Ok(Outcome::Declined),
        }
    }

    pub async fn on_media(self, ctx: &mut FlowContext<'_>, media: &MediaPayload) -> FlowResult {
        match self {
            Flow::Insurance => insurance::on_media(ctx, media).await,
            _ => Ok(Outcome::Declined),
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a positive whole amount, ignoring separators and currency text.
pub(crate) fn parse_amount(text: &str) -> Option<i64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse::<i64>().ok().filter(|amount| *amount > 0)
}

/// Local `07…` form of a stored international number, for display.
pub(crate) fn local_number(phone: &str) -> String {
    match phone.strip_prefix("250") {
        Some(rest) if rest.len() == 9 => format!("0{rest}"),
        _ => phone.to_string(),
    }
}
