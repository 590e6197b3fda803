mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use axum::http::StatusCode;
use serde_json::Value;
use tapflow::flows::Flow;
use tapflow::matching::{MatchKind, MatchRow, StaticMatchingEngine};
use tapflow::router::{Pattern, Router};
use tapflow::state::{BasketRef, FlowState, ScheduleRole};
use tapflow::store::{
    BasketStatus, ContactStore, ContributionStatus, StateStore, TripRole, Visibility,
};
use tapflow_protocol::OutboundMessage;

use common::{TestApp, button_reply, every_state, image, list_reply, location, sticker, text};

const CREATOR: &str = "250788000001";
const MEMBER: &str = "250788000002";
const FALLBACK: &str = "I didn't catch that. Want to open the home menu?";

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

fn next_id() -> String {
    format!("wamid.{}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

async fn send(app: &TestApp, delivery: impl Fn(&str) -> Value) {
    assert_eq!(app.deliver(&delivery(&next_id())).await, StatusCode::OK);
}

async fn say(app: &TestApp, from: &str, body: &str) {
    send(app, |id| text(from, id, body)).await;
}

async fn pick(app: &TestApp, from: &str, row: &str) {
    send(app, |id| list_reply(from, id, row)).await;
}

async fn tap(app: &TestApp, from: &str, button: &str) {
    send(app, |id| button_reply(from, id, button)).await;
}

async fn fallbacks_to(app: &TestApp, phone: &str) -> usize {
    app.messenger
        .sent_to(phone)
        .await
        .iter()
        .filter(|m| matches!(m, OutboundMessage::Buttons { body, .. } if body == FALLBACK))
        .count()
}

// ============================================================================
// Global guard
// ============================================================================

#[tokio::test]
async fn global_commands_win_in_every_state() {
    let app = TestApp::new();
    for state in every_state() {
        for command in ["stop", " UNSUBSCRIBE ", "start", "Subscribe", "home", " Menu "] {
            app.put_state(CREATOR, &state).await;
            say(&app, CREATOR, command).await;
            assert_eq!(
                app.state_of(CREATOR).await,
                FlowState::Home,
                "{command:?} from {}",
                state.key()
            );
        }

        app.put_state(CREATOR, &state).await;
        tap(&app, CREATOR, "back_home").await;
        assert_eq!(app.state_of(CREATOR).await, FlowState::Home, "from {}", state.key());
    }
    assert_eq!(fallbacks_to(&app, CREATOR).await, 0);
    assert!(app.store.contributions().await.is_empty());
    assert!(!app.store.ensure_contact(CREATOR, None).await.unwrap().opted_out);
}

#[tokio::test]
async fn stop_during_contribution_amount_opts_out() {
    let app = TestApp::new();
    app.put_state(
        MEMBER,
        &FlowState::AwaitContribAmount(BasketRef {
            basket_id: "b1".into(),
        }),
    )
    .await;

    say(&app, MEMBER, "STOP").await;
    assert_eq!(app.state_of(MEMBER).await, FlowState::Home);
    assert!(app.store.contributions().await.is_empty());
    let contact = app.store.ensure_contact(MEMBER, None).await.unwrap();
    assert!(contact.opted_out);
    assert!(
        app.messenger
            .texts_to(MEMBER)
            .await
            .contains(&"You have been unsubscribed. Reply START to subscribe again.".to_string())
    );

    // The amount that would have been a contribution now goes nowhere.
    say(&app, MEMBER, "500").await;
    assert!(app.store.contributions().await.is_empty());
    assert_eq!(fallbacks_to(&app, MEMBER).await, 1);

    say(&app, MEMBER, "start").await;
    let contact = app.store.ensure_contact(MEMBER, None).await.unwrap();
    assert!(!contact.opted_out);
}

// ============================================================================
// Basket lifecycle
// ============================================================================

async fn create_private_basket(app: &TestApp) -> String {
    pick(app, CREATOR, "bk_new").await;
    say(app, CREATOR, "Harvest").await;
    say(app, CREATOR, "Seeds for the season").await;
    tap(app, CREATOR, "bk_type_private").await;
    say(app, CREATOR, "0788123456").await;
    say(app, CREATOR, "yes").await;
    let baskets = app.store.baskets().await;
    assert_eq!(baskets.len(), 1);
    baskets[0].id.clone()
}

#[tokio::test]
async fn creation_chain_accumulates_across_deliveries() {
    let app = TestApp::new();
    pick(&app, CREATOR, "bk_new").await;
    say(&app, CREATOR, "Harvest").await;
    say(&app, CREATOR, "skip").await;
    tap(&app, CREATOR, "bk_type_private").await;
    say(&app, CREATOR, "0788123456").await;

    let user_id = app.user_id(CREATOR).await;
    let record = app.store.load_state(&user_id).await.unwrap().unwrap();
    assert_eq!(record.key, "await_basket_confirm");
    assert_eq!(record.data["name"], "Harvest");
    assert_eq!(record.data["visibility"], "private");
    assert_eq!(record.data["payment_target"]["value"], "0788123456");

    say(&app, CREATOR, "YES").await;
    let basket = &app.store.baskets().await[0];
    assert_eq!(basket.name, "Harvest");
    assert_eq!(basket.description, None);
    assert_eq!(basket.visibility, Visibility::Private);
    assert_eq!(basket.status, BasketStatus::Active);
    assert_eq!(app.state_of(CREATOR).await, FlowState::BasketMenu);
}

#[tokio::test]
async fn approval_is_rechecked_against_the_creator() {
    let app = TestApp::new();
    let basket_id = create_private_basket(&app).await;

    say(&app, MEMBER, &format!("JOIN_BASKET:{basket_id}")).await;
    tap(&app, MEMBER, &format!("bk_cont_{basket_id}")).await;
    say(&app, MEMBER, "5,000").await;

    let contribution = app.store.contributions().await.remove(0);
    assert_eq!(contribution.amount, 5000);
    assert_eq!(contribution.status, ContributionStatus::Pending);
    let approve = format!("bk_appr_{}", contribution.id);
    assert!(app.messenger.control_ids_to(CREATOR).await.contains(&approve));

    // A forwarded approve button does nothing for anyone but the creator.
    tap(&app, MEMBER, &approve).await;
    assert_eq!(
        app.store.contributions().await[0].status,
        ContributionStatus::Pending
    );

    tap(&app, CREATOR, &approve).await;
    tap(&app, CREATOR, &format!("bk_rej_{}", contribution.id)).await;
    let resolved = &app.store.contributions().await[0];
    assert_eq!(resolved.status, ContributionStatus::Approved);
    assert_eq!(resolved.approver_id.as_deref(), Some(app.user_id(CREATOR).await.as_str()));
    assert!(
        app.messenger
            .texts_to(CREATOR)
            .await
            .contains(&"This contribution was already handled.".to_string())
    );
    assert!(
        app.messenger
            .texts_to(MEMBER)
            .await
            .contains(&"✅ Contribution approved! Thank you.".to_string())
    );
}

#[tokio::test]
async fn only_the_creator_closes_a_basket() {
    let app = TestApp::new();
    let basket_id = create_private_basket(&app).await;

    tap(&app, MEMBER, &format!("bk_close_{basket_id}")).await;
    assert_eq!(app.store.baskets().await[0].status, BasketStatus::Active);

    tap(&app, CREATOR, &format!("bk_close_{basket_id}")).await;
    assert_eq!(app.store.baskets().await[0].status, BasketStatus::Closed);
}

// ============================================================================
// Stale selections
// ============================================================================

#[tokio::test]
async fn stale_selections_are_revalidated() {
    let engine = StaticMatchingEngine::new().with_rows(
        MatchKind::Drivers,
        vec![MatchRow {
            id: "u-ghost".into(),
            title: "Ghost".into(),
            distance_km: Some(0.4),
            phone: None,
        }],
    );
    let app = TestApp::with_matching(engine);

    pick(&app, MEMBER, "see_drivers").await;
    pick(&app, MEMBER, "near_v_drv_moto").await;
    send(&app, |id| location(MEMBER, id)).await;
    assert!(app.messenger.control_ids_to(MEMBER).await.contains(&"drv_u-ghost".to_string()));

    pick(&app, MEMBER, "drv_u-ghost").await;
    pick(&app, MEMBER, "mtch_t-missing").await;
    pick(&app, MEMBER, "biz_missing").await;
    let bodies: Vec<String> = app
        .messenger
        .sent_to(MEMBER)
        .await
        .into_iter()
        .filter_map(|m| match m {
            OutboundMessage::Buttons { body, .. } | OutboundMessage::Text { body } => Some(body),
            _ => None,
        })
        .collect();
    assert!(bodies.contains(&"That driver is no longer available.".to_string()));
    assert!(bodies.contains(&"That trip is no longer available.".to_string()));
    assert_eq!(fallbacks_to(&app, MEMBER).await, 0);
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn unmatched_events_fall_back_without_state_change() {
    let app = TestApp::new();
    send(&app, |id| sticker(CREATOR, id)).await;
    send(&app, |id| location(CREATOR, id)).await;
    send(&app, |id| image(CREATOR, id)).await;
    say(&app, CREATOR, "hello there").await;
    pick(&app, CREATOR, "").await;
    tap(&app, CREATOR, "not_a_button").await;
    assert_eq!(fallbacks_to(&app, CREATOR).await, 6);
    assert_eq!(app.state_of(CREATOR).await, FlowState::Home);
    assert!(app.store.leads().await.is_empty());
}

#[tokio::test]
async fn role_ids_only_route_while_choosing_a_role() {
    let app = TestApp::new();
    pick(&app, CREATOR, "role_driver").await;
    assert_eq!(fallbacks_to(&app, CREATOR).await, 1);

    pick(&app, CREATOR, "schedule_trip").await;
    assert_eq!(app.state_of(CREATOR).await, FlowState::AwaitScheduleRole);
    pick(&app, CREATOR, "role_driver").await;
    assert_eq!(
        app.state_of(CREATOR).await,
        FlowState::AwaitScheduleVehicle(ScheduleRole {
            role: TripRole::Driver
        })
    );
}

#[tokio::test]
async fn bound_media_becomes_an_insurance_lead() {
    let app = TestApp::new();
    pick(&app, MEMBER, "motor_insurance").await;
    send(&app, |id| image(MEMBER, id)).await;
    let leads = app.store.leads().await;
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].media_id, "media-1");
    assert_eq!(app.state_of(MEMBER).await, FlowState::Home);
}

#[tokio::test]
async fn payment_code_end_to_end() {
    let app = TestApp::new();
    pick(&app, MEMBER, "momoqr_start").await;
    pick(&app, MEMBER, "mqr_code").await;
    say(&app, MEMBER, "123456").await;
    say(&app, MEMBER, "1500").await;
    let codes = app.store.payment_codes().await;
    assert_eq!(codes[0].ussd, "*182*8*1*123456*1500#");
    assert_eq!(app.state_of(MEMBER).await, FlowState::Home);
}

#[test]
fn route_tables_are_disjoint_and_complete() {
    let router = Router::new().expect("route tables overlap");
    for flow in Flow::ALL {
        for route in flow.list_routes() {
            assert!(router.lists().routes().contains(route));
        }
        for route in flow.button_routes() {
            assert!(router.buttons().routes().contains(route));
        }
    }
    let gated = router
        .lists()
        .routes()
        .iter()
        .filter(|r| matches!(r.pattern, Pattern::Gated { .. }))
        .count();
    assert_eq!(gated, 2);
}
