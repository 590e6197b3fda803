//! Event dispatch.
//!
//! Each inbound message takes exactly one branch, tried in this order:
//!
//! 1. media, when the user's state is waiting for a document;
//! 2. list selection, resolved through the list [`RouteTable`];
//! 3. button tap, resolved through the button [`RouteTable`];
//! 4. location, when the state is one of the location wait-states;
//! 5. free text, offered to each text-claiming flow in turn;
//! 6. fallback, a "didn't catch that" prompt with a way home.
//!
//! A flow that declines an event sends it to the fallback. Errors from a flow
//! are logged and turned into an apology; they never reach the webhook.

mod table;

use tapflow_protocol::{InboundMessage, MessageKind, OutboundMessage};
use tracing::{error, info, warn};

use crate::flows::home::back_home_button;
use crate::flows::{Flow, FlowContext, FlowError, Outcome, Services};
use crate::guard::{self, GuardOutcome};
use crate::state;
use crate::store::{ContactStore, GeoPoint};

pub use table::{Pattern, Route, RouteConflict, RouteTable};

const FALLBACK_TEXT: &str = "I didn't catch that. Want to open the home menu?";
const APOLOGY_TEXT: &str = "Sorry, something went wrong on our side. Please try again.";

/// The branch an event took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Guard,
    Media(Flow),
    List(Flow),
    Button(Flow),
    Location(Flow),
    Text(Flow),
    Fallback,
    /// A flow failed and the user got an apology instead.
    Failed,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Guard => "guard",
            Branch::Media(_) => "media",
            Branch::List(_) => "list",
            Branch::Button(_) => "button",
            Branch::Location(_) => "location",
            Branch::Text(_) => "text",
            Branch::Fallback => "fallback",
            Branch::Failed => "failed",
        }
    }

    pub fn flow(&self) -> Option<Flow> {
        match self {
            Branch::Media(f)
            | Branch::List(f)
            | Branch::Button(f)
            | Branch::Location(f)
            | Branch::Text(f) => Some(*f),
            _ => None,
        }
    }
}

/// Priority-ordered dispatcher over the registered flows.
#[derive(Debug)]
pub struct Router {
    lists: RouteTable,
    buttons: RouteTable,
}

impl Router {
    /// Build the list and button tables from every flow's registrations,
    /// rejecting any overlap between flows.
    pub fn new() -> Result<Self, RouteConflict> {
        let lists = Flow::ALL
            .iter()
            .flat_map(|f| f.list_routes().iter().copied())
            .collect();
        let buttons = Flow::ALL
            .iter()
            .flat_map(|f| f.button_routes().iter().copied())
            .collect();
        Ok(Self {
            lists: RouteTable::new("list", lists)?,
            buttons: RouteTable::new("button", buttons)?,
        })
    }

    pub fn lists(&self) -> &RouteTable {
        &self.lists
    }

    pub fn buttons(&self) -> &RouteTable {
        &self.buttons
    }

    /// Process one inbound message from `sender` end to end.
    ///
    /// Loads the contact and state, runs the global guard, then dispatches.
    /// Never fails: storage or channel errors are logged and answered with an
    /// apology.
    pub async fn handle(
        &self,
        services: &Services,
        sender: &str,
        message: &InboundMessage,
        request_id: &str,
    ) -> Branch {
        let contact = match services
            .store
            .ensure_contact(sender, message.profile_name.as_deref())
            .await
        {
            Ok(contact) => contact,
            Err(e) => {
                error!(request_id, event = message.type_name(), error = %e, "Contact lookup failed");
                apologize(services, sender).await;
                return Branch::Failed;
            }
        };
        let loaded = match state::load(services.store.as_ref(), &contact.user_id).await {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(request_id, user_id = %contact.user_id, error = %e, "State load failed");
                apologize(services, sender).await;
                return Branch::Failed;
            }
        };

        let mut ctx = FlowContext::new(services, contact, loaded, request_id);
        let state_key = ctx.state.key();
        match self.route(&mut ctx, message).await {
            Ok(branch) => branch,
            Err(e) => {
                error!(
                    request_id,
                    user_id = ctx.user_id(),
                    event = message.type_name(),
                    state = state_key,
                    error = %e,
                    "Flow failed"
                );
                apologize(services, sender).await;
                Branch::Failed
            }
        }
    }

    async fn route(
        &self,
        ctx: &mut FlowContext<'_>,
        message: &InboundMessage,
    ) -> Result<Branch, FlowError> {
        if guard::apply(ctx, message).await? == GuardOutcome::Handled {
            return Ok(Branch::Guard);
        }
        let branch = self.dispatch(ctx, message).await?;
        if branch == Branch::Fallback {
            warn!(
                user_id = ctx.user_id(),
                event = message.type_name(),
                state = ctx.state.key(),
                "Route fallback"
            );
            fallback(ctx).await?;
        } else {
            info!(
                user_id = ctx.user_id(),
                route = branch.as_str(),
                flow = branch.flow().map(|f| f.as_str()),
                "Routed"
            );
        }
        Ok(branch)
    }

    /// Pick and run the one branch for `message`, or report [`Branch::Fallback`].
    pub async fn dispatch(
        &self,
        ctx: &mut FlowContext<'_>,
        message: &InboundMessage,
    ) -> Result<Branch, FlowError> {
        let state_key = ctx.state.key();
        match &message.kind {
            MessageKind::Media(media) => {
                if let Some(flow) = Flow::awaiting_media(&ctx.state)
                    && flow.on_media(ctx, media).await? == Outcome::Handled
                {
                    return Ok(Branch::Media(flow));
                }
            }
            MessageKind::ListReply(reply) => {
                if let Some(flow) = self.lists.resolve(&reply.id, state_key)
                    && flow.on_list(ctx, &reply.id).await? == Outcome::Handled
                {
                    return Ok(Branch::List(flow));
                }
            }
            MessageKind::ButtonReply(reply) => {
                if let Some(flow) = self.buttons.resolve(&reply.id, state_key)
                    && flow.on_button(ctx, &reply.id).await? == Outcome::Handled
                {
                    return Ok(Branch::Button(flow));
                }
            }
            MessageKind::Location {
                latitude,
                longitude,
            } => {
                let point = GeoPoint {
                    latitude: *latitude,
                    longitude: *longitude,
                };
                if let Some(flow) = Flow::awaiting_location(&ctx.state)
                    && flow.on_location(ctx, point).await? == Outcome::Handled
                {
                    return Ok(Branch::Location(flow));
                }
            }
            MessageKind::Text { body } => {
                for flow in Flow::TEXT_CLAIMERS {
                    if flow.on_text(ctx, body).await? == Outcome::Handled {
                        return Ok(Branch::Text(flow));
                    }
                }
            }
            MessageKind::Unsupported { .. } => {}
        }
        Ok(Branch::Fallback)
    }
}

async fn fallback(ctx: &FlowContext<'_>) -> Result<(), FlowError> {
    ctx.reply_buttons(FALLBACK_TEXT, vec![back_home_button()])
        .await
}

/// Best-effort apology with a way home.
async fn apologize(services: &Services, to: &str) {
    let message = OutboundMessage::buttons(APOLOGY_TEXT, vec![back_home_button()]);
    if let Err(e) = services.messenger.send(to, message).await {
        warn!(to, error = %e, "Apology could not be delivered");
    }
}

#[cfg(test)]
mod tests {
    use tapflow_protocol::{MediaKind, MediaPayload, Reply};

    use super::*;
    use crate::flows::testing::Harness;
    use crate::state::{BasketRef, FlowState};

    const PHONE: &str = "250788000001";

    fn message(kind: MessageKind) -> InboundMessage {
        InboundMessage {
            sender: Some(PHONE.into()),
            id: Some("wamid.1".into()),
            timestamp: None,
            profile_name: Some("Aline".into()),
            kind,
        }
    }

    fn list(id: &str) -> InboundMessage {
        message(MessageKind::ListReply(Reply {
            id: id.into(),
            title: None,
        }))
    }

    fn button(id: &str) -> InboundMessage {
        message(MessageKind::ButtonReply(Reply {
            id: id.into(),
            title: None,
        }))
    }

    fn text(body: &str) -> InboundMessage {
        message(MessageKind::Text { body: body.into() })
    }

    fn location() -> InboundMessage {
        message(MessageKind::Location {
            latitude: -1.95,
            longitude: 30.06,
        })
    }

    fn image() -> InboundMessage {
        message(MessageKind::Media(MediaPayload {
            kind: MediaKind::Image,
            media_id: "m1".into(),
            mime_type: Some("image/jpeg".into()),
            caption: None,
            filename: None,
        }))
    }

    async fn set(harness: &Harness, state: FlowState) {
        harness.ctx_in(PHONE, state).await;
    }

    #[test]
    fn registered_routes_are_disjoint() {
        let router = Router::new().unwrap();
        assert!(router.lists().routes().len() > 10);
        assert_eq!(router.buttons().resolve("bk_det_x", "home"), Some(Flow::Basket));
        assert_eq!(router.buttons().resolve("biz_catalog_skip", "home"), Some(Flow::Marketplace));
        assert_eq!(router.lists().resolve("see_cat_salon", "home"), Some(Flow::Marketplace));
        assert_eq!(router.lists().resolve("role_driver", "home"), None);
    }

    #[test]
    fn every_offered_entry_is_routable() {
        let router = Router::new().unwrap();
        for id in [
            "see_drivers",
            "see_passengers",
            "schedule_trip",
            "marketplace",
            "baskets",
            "motor_insurance",
            "momoqr_start",
        ] {
            assert!(router.lists().resolve(id, "home").is_some(), "{id}");
        }
    }

    #[tokio::test]
    async fn each_event_takes_one_branch() {
        let harness = Harness::new();
        let router = Router::new().unwrap();
        let services = &harness.services;

        assert_eq!(
            router.handle(services, PHONE, &list("baskets"), "r1").await,
            Branch::List(Flow::Basket)
        );
        assert_eq!(
            router.handle(services, PHONE, &button("mk_add"), "r2").await,
            Branch::Button(Flow::Marketplace)
        );
        assert_eq!(
            router.handle(services, PHONE, &text("JOIN_BASKET:nope"), "r3").await,
            Branch::Text(Flow::Basket)
        );
        assert_eq!(
            router.handle(services, PHONE, &text("menu"), "r4").await,
            Branch::Guard
        );

        set(&harness, FlowState::InsWaitDoc).await;
        assert_eq!(
            router.handle(services, PHONE, &image(), "r5").await,
            Branch::Media(Flow::Insurance)
        );
    }

    #[tokio::test]
    async fn unmatched_events_fall_back() {
        let harness = Harness::new();
        let router = Router::new().unwrap();
        let services = &harness.services;

        let events = [
            text("hello"),
            location(),
            image(),
            list(""),
            button(""),
            list("no_such_row"),
            list("role_driver"),
            button("bk_nope"),
            message(MessageKind::Unsupported {
                type_name: "sticker".into(),
            }),
        ];
        for event in &events {
            assert_eq!(
                router.handle(services, PHONE, event, "r").await,
                Branch::Fallback,
                "{event:?}"
            );
        }
        let fallbacks = harness
            .messenger
            .sent_to(PHONE)
            .await
            .into_iter()
            .filter(|m| matches!(m, OutboundMessage::Buttons { body, .. } if body == FALLBACK_TEXT))
            .count();
        assert_eq!(fallbacks, events.len());
    }

    #[tokio::test]
    async fn location_goes_to_waiting_flow() {
        let harness = Harness::new();
        let router = Router::new().unwrap();
        set(
            &harness,
            FlowState::NearAwaitLocDrivers(crate::state::VehicleFilter {
                vehicle: "moto".into(),
            }),
        )
        .await;
        assert_eq!(
            router.handle(&harness.services, PHONE, &location(), "r").await,
            Branch::Location(Flow::Nearby)
        );
    }

    #[tokio::test]
    async fn failures_become_an_apology() {
        let harness = Harness::new();
        let router = Router::new().unwrap();
        harness.messenger.fail_sends(true);
        assert_eq!(
            router.handle(&harness.services, PHONE, &list("baskets"), "r").await,
            Branch::Failed
        );

        harness.messenger.fail_sends(false);
        set(
            &harness,
            FlowState::AwaitContribAmount(BasketRef {
                basket_id: "missing".into(),
            }),
        )
        .await;
        assert_eq!(
            router.handle(&harness.services, PHONE, &text("500"), "r").await,
            Branch::Text(Flow::Basket)
        );
        assert!(harness.store.contributions().await.is_empty());
    }
}
