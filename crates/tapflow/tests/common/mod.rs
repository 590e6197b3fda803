//! Shared fixtures for driving the webhook app end to end.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;

use tapflow::auth::{SIGNATURE_HEADER, SignatureVerifier, sign};
use tapflow::cache::TtlCache;
use tapflow::channel::{Messenger, RecordingMessenger};
use tapflow::extraction::StaticDocumentExtractor;
use tapflow::flows::Services;
use tapflow::idempotency::IdempotencyGate;
use tapflow::matching::StaticMatchingEngine;
use tapflow::server::{AppState, build_app};
use tapflow::state::{
    BasketRef, BusinessCategory, FlowState, NamedBasket, ScheduleRole, TripRef, VehicleFilter,
};
use tapflow::store::{
    ContactStore, GeoPoint, MemoryStore, PaymentTarget, StateStore, TripRole, Visibility,
};
use tapflow::{router, state};

pub const SECRET: &str = "app-secret";
pub const VERIFY_TOKEN: &str = "verify-me";

pub struct TestApp {
    pub store: MemoryStore,
    pub messenger: RecordingMessenger,
    pub app: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(SignatureVerifier::new(Some(SECRET.into()), false), StaticMatchingEngine::new())
    }

    pub fn with_verifier(verifier: SignatureVerifier) -> Self {
        Self::build(verifier, StaticMatchingEngine::new())
    }

    pub fn with_matching(matching: StaticMatchingEngine) -> Self {
        Self::build(SignatureVerifier::new(Some(SECRET.into()), false), matching)
    }

    fn build(verifier: SignatureVerifier, matching: StaticMatchingEngine) -> Self {
        let store = MemoryStore::new();
        let messenger = RecordingMessenger::default();
        let messenger_dyn: Arc<dyn Messenger> = Arc::new(messenger.clone());
        let services = Services {
            store: Arc::new(store.clone()),
            messenger: messenger_dyn.clone(),
            matching: Arc::new(matching),
            extractor: Arc::new(StaticDocumentExtractor::disabled()),
            share: tapflow::share::ShareLinks::new(
                messenger_dyn,
                None,
                Duration::from_secs(60),
                Url::parse("https://qr.example/render").unwrap(),
            ),
            admins: TtlCache::new(Duration::from_secs(60)),
        };
        let state = AppState {
            services: Arc::new(services),
            router: Arc::new(router::Router::new().unwrap()),
            gate: IdempotencyGate::new(Arc::new(store.clone())),
            verifier,
            verify_token: Some(VERIFY_TOKEN.into()),
        };
        Self {
            store,
            messenger,
            app: build_app(state, Duration::from_secs(30)),
        }
    }

    /// POST a signed delivery.
    pub async fn deliver(&self, envelope: &Value) -> StatusCode {
        let body = serde_json::to_vec(envelope).unwrap();
        let signature = sign(SECRET, &body);
        self.post(body, Some(signature)).await
    }

    pub async fn post(&self, body: Vec<u8>, signature: Option<String>) -> StatusCode {
        let mut request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        let response = self
            .app
            .clone()
            .oneshot(request.body(Body::from(body)).unwrap())
            .await
            .unwrap();
        response.status()
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, String) {
        let response = self
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    pub async fn user_id(&self, phone: &str) -> String {
        self.store.ensure_contact(phone, None).await.unwrap().user_id
    }

    pub async fn state_of(&self, phone: &str) -> FlowState {
        let user_id = self.user_id(phone).await;
        state::load(&self.store, &user_id).await.unwrap().state
    }

    /// Put `phone` into `state` directly.
    pub async fn put_state(&self, phone: &str, flow_state: &FlowState) {
        let user_id = self.user_id(phone).await;
        let loaded = state::load(&self.store, &user_id).await.unwrap();
        self.store
            .save_state(&user_id, flow_state.key(), &flow_state.data().unwrap(), loaded.version)
            .await
            .unwrap();
    }
}

// ============================================================================
// Envelopes
// ============================================================================

pub fn envelope(from: &str, message: Value) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "waba-1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "contacts": [{ "wa_id": from, "profile": { "name": "Tester" } }],
                    "messages": [message]
                }
            }]
        }]
    })
}

pub fn text(from: &str, id: &str, body: &str) -> Value {
    envelope(
        from,
        json!({ "from": from, "id": id, "timestamp": "1700000000", "type": "text", "text": { "body": body } }),
    )
}

pub fn list_reply(from: &str, id: &str, row_id: &str) -> Value {
    envelope(
        from,
        json!({
            "from": from, "id": id, "type": "interactive",
            "interactive": { "type": "list_reply", "list_reply": { "id": row_id, "title": "row" } }
        }),
    )
}

pub fn button_reply(from: &str, id: &str, button_id: &str) -> Value {
    envelope(
        from,
        json!({
            "from": from, "id": id, "type": "interactive",
            "interactive": { "type": "button_reply", "button_reply": { "id": button_id, "title": "btn" } }
        }),
    )
}

pub fn location(from: &str, id: &str) -> Value {
    envelope(
        from,
        json!({
            "from": from, "id": id, "type": "location",
            "location": { "latitude": -1.9441, "longitude": 30.0619 }
        }),
    )
}

pub fn image(from: &str, id: &str) -> Value {
    envelope(
        from,
        json!({
            "from": from, "id": id, "type": "image",
            "image": { "id": "media-1", "mime_type": "image/jpeg" }
        }),
    )
}

pub fn sticker(from: &str, id: &str) -> Value {
    envelope(
        from,
        json!({ "from": from, "id": id, "type": "sticker", "sticker": { "id": "s1" } }),
    )
}

/// One state per persisted key.
pub fn every_state() -> Vec<FlowState> {
    let point = GeoPoint {
        latitude: -1.95,
        longitude: 30.06,
    };
    let named = NamedBasket::new("Harvest");
    let described = named.clone().describe(Some("Seeds".into()));
    let typed = described.clone().with_visibility(Visibility::Private);
    let business = BusinessCategory::new("pharmacy").named("Kigali Pharma");
    let role = ScheduleRole {
        role: TripRole::Driver,
    };
    let moto = VehicleFilter {
        vehicle: "moto".into(),
    };
    let target = PaymentTarget {
        value: "0788123456".into(),
        is_code: false,
    };

    let states = vec![
        FlowState::Home,
        FlowState::BasketMenu,
        FlowState::AwaitBasketName,
        FlowState::AwaitBasketDesc(named),
        FlowState::AwaitBasketType(described),
        FlowState::AwaitBasketMomo(typed.clone()),
        FlowState::AwaitBasketConfirm(typed.with_payment_target(None)),
        FlowState::AwaitContribAmount(BasketRef {
            basket_id: "b1".into(),
        }),
        FlowState::MarketMenu,
        FlowState::AwaitBusinessName(BusinessCategory::new("salon")),
        FlowState::AwaitBusinessDesc(business.clone()),
        FlowState::AwaitBusinessLocation(business.clone().describe(None)),
        FlowState::AwaitBusinessCatalog(business.describe(None).located(point)),
        FlowState::AwaitMarketSeeLoc(BusinessCategory::new("garage")),
        FlowState::NearAwaitLocDrivers(moto.clone()),
        FlowState::NearAwaitLocPassengers(moto),
        FlowState::AwaitScheduleRole,
        FlowState::AwaitScheduleVehicle(role.clone()),
        FlowState::AwaitSchedulePickup(role.with_vehicle("cab")),
        FlowState::SchedAwaitDrop(TripRef {
            trip_id: "t1".into(),
        }),
        FlowState::InsWaitDoc,
        FlowState::MomoAwaitNumber,
        FlowState::MomoAwaitCode,
        FlowState::MomoAwaitAmount(target),
    ];
    assert_eq!(states.len(), FlowState::KEYS.len());
    states
}
