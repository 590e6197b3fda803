//! Typed conversation state.
//!
//! Each user has at most one persisted row `{key, data, version}`. In memory
//! the pair `(key, data)` is a [`FlowState`]: one variant per key, carrying
//! exactly the fields collected so far. The draft types nest, so a step can
//! only be built from the one before it and nothing collected is lost.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::store::{GeoPoint, PaymentTarget, StateStore, StorageResult, TripRole, Visibility};

// ============================================================================
// Basket drafts
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedBasket {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescribedBasket {
    #[serde(flatten)]
    pub named: NamedBasket,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedBasket {
    #[serde(flatten)]
    pub described: DescribedBasket,
    pub visibility: Visibility,
}

/// Everything needed to create a basket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketDraft {
    #[serde(flatten)]
    pub typed: TypedBasket,
    #[serde(default)]
    pub payment_target: Option<PaymentTarget>,
}

impl NamedBasket {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn describe(self, description: Option<String>) -> DescribedBasket {
        DescribedBasket {
            named: self,
            description,
        }
    }
}

impl DescribedBasket {
    pub fn with_visibility(self, visibility: Visibility) -> TypedBasket {
        TypedBasket {
            described: self,
            visibility,
        }
    }
}

impl TypedBasket {
    pub fn with_payment_target(self, payment_target: Option<PaymentTarget>) -> BasketDraft {
        BasketDraft {
            typed: self,
            payment_target,
        }
    }

    pub fn name(&self) -> &str {
        &self.described.named.name
    }
}

impl BasketDraft {
    pub fn name(&self) -> &str {
        self.typed.name()
    }

    pub fn description(&self) -> Option<&str> {
        self.typed.described.description.as_deref()
    }

    pub fn visibility(&self) -> Visibility {
        self.typed.visibility
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketRef {
    pub basket_id: String,
}

// ============================================================================
// Marketplace drafts
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessCategory {
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedBusiness {
    #[serde(flatten)]
    pub category: BusinessCategory,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescribedBusiness {
    #[serde(flatten)]
    pub named: NamedBusiness,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedBusiness {
    #[serde(flatten)]
    pub described: DescribedBusiness,
    pub location: GeoPoint,
}

impl BusinessCategory {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
        }
    }

    pub fn named(self, name: impl Into<String>) -> NamedBusiness {
        NamedBusiness {
            category: self,
            name: name.into(),
        }
    }
}

impl NamedBusiness {
    pub fn describe(self, description: Option<String>) -> DescribedBusiness {
        DescribedBusiness {
            named: self,
            description,
        }
    }
}

impl DescribedBusiness {
    pub fn located(self, location: GeoPoint) -> LocatedBusiness {
        LocatedBusiness {
            described: self,
            location,
        }
    }
}

// ============================================================================
// Mobility drafts
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleFilter {
    pub vehicle: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRole {
    pub role: TripRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleVehicle {
    #[serde(flatten)]
    pub role: ScheduleRole,
    pub vehicle: String,
}

impl ScheduleRole {
    pub fn with_vehicle(self, vehicle: impl Into<String>) -> ScheduleVehicle {
        ScheduleVehicle {
            role: self,
            vehicle: vehicle.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRef {
    pub trip_id: String,
}

// ============================================================================
// FlowState
// ============================================================================

/// Where a user is in a conversation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FlowState {
    #[default]
    Home,

    // Funding baskets
    BasketMenu,
    AwaitBasketName,
    AwaitBasketDesc(NamedBasket),
    AwaitBasketType(DescribedBasket),
    AwaitBasketMomo(TypedBasket),
    AwaitBasketConfirm(BasketDraft),
    AwaitContribAmount(BasketRef),

    // Marketplace
    MarketMenu,
    AwaitBusinessName(BusinessCategory),
    AwaitBusinessDesc(NamedBusiness),
    AwaitBusinessLocation(DescribedBusiness),
    AwaitBusinessCatalog(LocatedBusiness),
    AwaitMarketSeeLoc(BusinessCategory),

    // Proximity match
    NearAwaitLocDrivers(VehicleFilter),
    NearAwaitLocPassengers(VehicleFilter),

    // Trip scheduling
    AwaitScheduleRole,
    AwaitScheduleVehicle(ScheduleRole),
    AwaitSchedulePickup(ScheduleVehicle),
    SchedAwaitDrop(TripRef),

    // Document intake
    InsWaitDoc,

    // Payment codes
    MomoAwaitNumber,
    MomoAwaitCode,
    MomoAwaitAmount(PaymentTarget),
}

#[derive(Debug, Error)]
pub enum StateDecodeError {
    #[error("unknown state key: {0}")]
    UnknownKey(String),

    #[error("invalid payload for state {key}: {source}")]
    Payload {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

fn payload<T: DeserializeOwned>(key: &str, data: Value) -> Result<T, StateDecodeError> {
    serde_json::from_value(data).map_err(|source| StateDecodeError::Payload {
        key: key.to_string(),
        source,
    })
}

fn empty() -> Value {
    Value::Object(Map::new())
}

impl FlowState {
    /// Every persisted key, in declaration order.
    pub const KEYS: &'static [&'static str] = &[
        "home",
        "basket_ctx",
        "await_basket_name",
        "await_basket_desc",
        "await_basket_type",
        "await_basket_momo",
        "await_basket_confirm",
        "await_contrib_amount",
        "market_ctx",
        "await_business_name",
        "await_business_desc",
        "await_business_location",
        "await_business_catalog",
        "await_market_see_loc",
        "near_await_loc_drivers",
        "near_await_loc_passengers",
        "await_schedule_role",
        "await_schedule_vehicle",
        "await_schedule_pickup",
        "sched_await_drop",
        "ins_wait_doc",
        "momo_await_number",
        "momo_await_code",
        "momo_await_amount",
    ];

    pub fn key(&self) -> &'static str {
        match self {
            FlowState::Home => "home",
            FlowState::BasketMenu => "basket_ctx",
            FlowState::AwaitBasketName => "await_basket_name",
            FlowState::AwaitBasketDesc(_) => "await_basket_desc",
            FlowState::AwaitBasketType(_) => "await_basket_type",
            FlowState::AwaitBasketMomo(_) => "await_basket_momo",
            FlowState::AwaitBasketConfirm(_) => "await_basket_confirm",
            FlowState::AwaitContribAmount(_) => "await_contrib_amount",
            FlowState::MarketMenu => "market_ctx",
            FlowState::AwaitBusinessName(_) => "await_business_name",
            FlowState::AwaitBusinessDesc(_) => "await_business_desc",
            FlowState::AwaitBusinessLocation(_) => "await_business_location",
            FlowState::AwaitBusinessCatalog(_) => "await_business_catalog",
            FlowState::AwaitMarketSeeLoc(_) => "await_market_see_loc",
            FlowState::NearAwaitLocDrivers(_) => "near_await_loc_drivers",
            FlowState::NearAwaitLocPassengers(_) => "near_await_loc_passengers",
            FlowState::AwaitScheduleRole => "await_schedule_role",
            FlowState::AwaitScheduleVehicle(_) => "await_schedule_vehicle",
            FlowState::AwaitSchedulePickup(_) => "await_schedule_pickup",
            FlowState::SchedAwaitDrop(_) => "sched_await_drop",
            FlowState::InsWaitDoc => "ins_wait_doc",
            FlowState::MomoAwaitNumber => "momo_await_number",
            FlowState::MomoAwaitCode => "momo_await_code",
            FlowState::MomoAwaitAmount(_) => "momo_await_amount",
        }
    }

    /// The persisted payload for this state.
    pub fn data(&self) -> Result<Value, serde_json::Error> {
        match self {
            FlowState::Home
            | FlowState::BasketMenu
            | FlowState::AwaitBasketName
            | FlowState::MarketMenu
            | FlowState::AwaitScheduleRole
            | FlowState::InsWaitDoc
            | FlowState::MomoAwaitNumber
            | FlowState::MomoAwaitCode => Ok(empty()),
            FlowState::AwaitBasketDesc(d) => serde_json::to_value(d),
            FlowState::AwaitBasketType(d) => serde_json::to_value(d),
            FlowState::AwaitBasketMomo(d) => serde_json::to_value(d),
            FlowState::AwaitBasketConfirm(d) => serde_json::to_value(d),
            FlowState::AwaitContribAmount(d) => serde_json::to_value(d),
            FlowState::AwaitBusinessName(d) => serde_json::to_value(d),
            FlowState::AwaitBusinessDesc(d) => serde_json::to_value(d),
            FlowState::AwaitBusinessLocation(d) => serde_json::to_value(d),
            FlowState::AwaitBusinessCatalog(d) => serde_json::to_value(d),
            FlowState::AwaitMarketSeeLoc(d) => serde_json::to_value(d),
            FlowState::NearAwaitLocDrivers(d) => serde_json::to_value(d),
            FlowState::NearAwaitLocPassengers(d) => serde_json::to_value(d),
            FlowState::AwaitScheduleVehicle(d) => serde_json::to_value(d),
            FlowState::AwaitSchedulePickup(d) => serde_json::to_value(d),
            FlowState::SchedAwaitDrop(d) => serde_json::to_value(d),
            FlowState::MomoAwaitAmount(d) => serde_json::to_value(d),
        }
    }

    /// Rebuild a state from its persisted key and payload.
    pub fn from_parts(key: &str, data: Value) -> Result<Self, StateDecodeError> {
        let state = match key {
            "home" => FlowState::Home,
            "basket_ctx" => FlowState::BasketMenu,
            "await_basket_name" => FlowState::AwaitBasketName,
            "await_basket_desc" => FlowState::AwaitBasketDesc(payload(key, data)?),
            "await_basket_type" => FlowState::AwaitBasketType(payload(key, data)?),
            "await_basket_momo" => FlowState::AwaitBasketMomo(payload(key, data)?),
            "await_basket_confirm" => FlowState::AwaitBasketConfirm(payload(key, data)?),
            "await_contrib_amount" => FlowState::AwaitContribAmount(payload(key, data)?),
            "market_ctx" => FlowState::MarketMenu,
            "await_business_name" => FlowState::AwaitBusinessName(payload(key, data)?),
            "await_business_desc" => FlowState::AwaitBusinessDesc(payload(key, data)?),
            "await_business_location" => FlowState::AwaitBusinessLocation(payload(key, data)?),
            "await_business_catalog" => FlowState::AwaitBusinessCatalog(payload(key, data)?),
            "await_market_see_loc" => FlowState::AwaitMarketSeeLoc(payload(key, data)?),
            "near_await_loc_drivers" => FlowState::NearAwaitLocDrivers(payload(key, data)?),
            "near_await_loc_passengers" => FlowState::NearAwaitLocPassengers(payload(key, data)?),
            "await_schedule_role" => FlowState::AwaitScheduleRole,
            "await_schedule_vehicle" => FlowState::AwaitScheduleVehicle(payload(key, data)?),
            "await_schedule_pickup" => FlowState::AwaitSchedulePickup(payload(key, data)?),
            "sched_await_drop" => FlowState::SchedAwaitDrop(payload(key, data)?),
            "ins_wait_doc" => FlowState::InsWaitDoc,
            "momo_await_number" => FlowState::MomoAwaitNumber,
            "momo_await_code" => FlowState::MomoAwaitCode,
            "momo_await_amount" => FlowState::MomoAwaitAmount(payload(key, data)?),
            other => return Err(StateDecodeError::UnknownKey(other.to_string())),
        };
        Ok(state)
    }

    pub fn is_home(&self) -> bool {
        matches!(self, FlowState::Home)
    }
}

// ============================================================================
// Loading
// ============================================================================

/// A user's state together with the row version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedState {
    pub state: FlowState,
    /// `None` when no row exists.
    pub version: Option<i64>,
}

/// Read the user's state. A missing row is `home`; an undecodable row is
/// logged and also treated as `home`, keeping its version so the next save
/// replaces it.
pub async fn load<S>(store: &S, user_id: &str) -> StorageResult<LoadedState>
where
    S: StateStore + ?Sized,
{
    let Some(record) = store.load_state(user_id).await? else {
        return Ok(LoadedState {
            state: FlowState::Home,
            version: None,
        });
    };

    let state = match FlowState::from_parts(&record.key, record.data) {
        Ok(state) => state,
        Err(e) => {
            warn!(user_id, state = %record.key, error = %e, "Discarding undecodable state");
            FlowState::Home
        }
    };
    Ok(LoadedState {
        state,
        version: Some(record.version),
    })
}
