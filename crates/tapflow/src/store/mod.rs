//! Durable storage.
//!
//! Every request may land on a different instance, so nothing here caches: each
//! call goes to the backing store, which is the single source of truth for
//! conversation state, the delivery ledger and the flow records.
//!
//! The repository traits are grouped under [`Store`], which every backend
//! implements in full:
//!
//! - [`MemoryStore`]: process-local maps, for tests and `database.url: memory`.
//! - [`SqliteStore`]: `sqlx` SQLite pool with schema bootstrap.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

mod error;
mod memory;
pub mod models;
mod sqlite;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use models::*;
pub use sqlite::SqliteStore;

/// A persisted conversation state row.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRecord {
    pub user_id: String,
    pub key: String,
    pub data: Value,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Core repositories
// ============================================================================

#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Return the contact for `phone`, creating it atomically if absent.
    async fn ensure_contact(
        &self,
        phone: &str,
        display_name: Option<&str>,
    ) -> StorageResult<Contact>;

    async fn get_contact(&self, user_id: &str) -> StorageResult<Option<Contact>>;

    async fn set_opted_out(&self, user_id: &str, opted_out: bool) -> StorageResult<()>;

    /// Phone numbers of staff who receive intake notifications.
    async fn admin_numbers(&self) -> StorageResult<Vec<String>>;
}

/// Per-user conversation state with compare-and-swap saves.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_state(&self, user_id: &str) -> StorageResult<Option<StateRecord>>;

    /// Replace the user's state row.
    ///
    /// `expected_version` is the version that was loaded (`None` when no row
    /// existed). A mismatch yields [`StorageError::Conflict`]. Returns the new version.
    async fn save_state(
        &self,
        user_id: &str,
        key: &str,
        data: &Value,
        expected_version: Option<i64>,
    ) -> StorageResult<i64>;

    /// Reset the user to `home` under the same compare-and-swap as
    /// [`save_state`](Self::save_state).
    ///
    /// The row is overwritten with a `home` tombstone rather than deleted, so
    /// versions keep counting up and a stale reader can never match again.
    async fn clear_state(
        &self,
        user_id: &str,
        expected_version: Option<i64>,
    ) -> StorageResult<i64> {
        let empty = Value::Object(Default::default());
        self.save_state(user_id, "home", &empty, expected_version)
            .await
    }
}

/// Append-only ledger of processed inbound message ids.
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    /// Insert `message_id`. A repeat insert fails with [`StorageError::Duplicate`].
    async fn record_delivery(&self, message_id: &str) -> StorageResult<()>;
}

// ============================================================================
// Flow repositories
// ============================================================================

#[async_trait]
pub trait BasketStore: Send + Sync {
    async fn create_basket(&self, basket: NewBasket) -> StorageResult<Basket>;

    async fn get_basket(&self, basket_id: &str) -> StorageResult<Option<Basket>>;

    /// Look up by public slug or id.
    async fn find_basket_by_token(&self, token: &str) -> StorageResult<Option<Basket>>;

    /// Baskets the user created or joined.
    async fn baskets_for_user(&self, user_id: &str) -> StorageResult<Vec<Basket>>;

    async fn set_basket_status(&self, basket_id: &str, status: BasketStatus)
    -> StorageResult<()>;

    async fn ensure_member(&self, basket_id: &str, user_id: &str) -> StorageResult<()>;

    async fn remove_member(&self, basket_id: &str, user_id: &str) -> StorageResult<()>;

    /// Members ordered by join time.
    async fn members(
        &self,
        basket_id: &str,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<BasketMember>>;

    async fn add_contribution(
        &self,
        basket_id: &str,
        contributor_id: &str,
        amount: i64,
    ) -> StorageResult<Contribution>;

    async fn get_contribution(&self, contribution_id: &str)
    -> StorageResult<Option<Contribution>>;

    /// Move a pending contribution to `status`. Returns `false` if it was no longer pending.
    async fn resolve_contribution(
        &self,
        contribution_id: &str,
        status: ContributionStatus,
        approver_id: &str,
    ) -> StorageResult<bool>;

    async fn credit_member(&self, basket_id: &str, user_id: &str, amount: i64)
    -> StorageResult<()>;
}

#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    async fn create_business(&self, business: NewBusiness) -> StorageResult<Business>;

    async fn get_business(&self, business_id: &str) -> StorageResult<Option<Business>>;
}

#[async_trait]
pub trait TripStore: Send + Sync {
    async fn create_trip(&self, trip: NewTrip) -> StorageResult<Trip>;

    async fn get_trip(&self, trip_id: &str) -> StorageResult<Option<Trip>>;

    async fn set_trip_dropoff(&self, trip_id: &str, dropoff: GeoPoint) -> StorageResult<()>;
}

#[async_trait]
pub trait IntakeStore: Send + Sync {
    async fn create_lead(&self, lead: NewInsuranceLead) -> StorageResult<InsuranceLead>;

    async fn attach_extraction(&self, lead_id: &str, extracted: &Value) -> StorageResult<()>;
}

#[async_trait]
pub trait PaymentCodeStore: Send + Sync {
    async fn create_payment_code(&self, request: NewPaymentCode)
    -> StorageResult<PaymentCodeRequest>;
}

/// Everything a request handler needs from storage.
pub trait Store:
    ContactStore
    + StateStore
    + DeliveryLedger
    + BasketStore
    + MarketplaceStore
    + TripStore
    + IntakeStore
    + PaymentCodeStore
{
}

impl<T> Store for T where
    T: ContactStore
        + StateStore
        + DeliveryLedger
        + BasketStore
        + MarketplaceStore
        + TripStore
        + IntakeStore
        + PaymentCodeStore
{
}

/// Open the backend named by a database URL (`memory`, `sqlite://path`, or a bare path).
pub async fn open(url: &str, pool_size: u32) -> StorageResult<std::sync::Arc<dyn Store>> {
    let url = url.trim();
    if url.is_empty() || url == "memory" {
        return Ok(std::sync::Arc::new(MemoryStore::new()));
    }
    Ok(std::sync::Arc::new(SqliteStore::connect(url, pool_size).await?))
}
