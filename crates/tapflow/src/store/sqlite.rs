//! SQLite backend.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};

use super::{
    Basket, BasketMember, BasketStatus, BasketStore, Business, Contact, ContactStore,
    Contribution, ContributionStatus, DeliveryLedger, GeoPoint, InsuranceLead, IntakeStore,
    MarketplaceStore, NewBasket, NewBusiness, NewInsuranceLead, NewPaymentCode, NewTrip,
    PaymentCodeRequest, PaymentCodeStore, PaymentTarget, StateRecord, StateStore, StorageError,
    StorageResult, Trip, TripRole, TripStatus, TripStore, Visibility, new_id,
};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS contacts (
        user_id TEXT PRIMARY KEY,
        phone TEXT NOT NULL UNIQUE,
        display_name TEXT,
        opted_out INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS admin_numbers (
        phone TEXT PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS conversation_states (
        user_id TEXT PRIMARY KEY,
        key TEXT NOT NULL,
        data TEXT NOT NULL DEFAULT '{}',
        version INTEGER NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS processed_messages (
        message_id TEXT PRIMARY KEY,
        received_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS baskets (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        visibility TEXT NOT NULL,
        status TEXT NOT NULL,
        public_slug TEXT UNIQUE,
        creator_id TEXT NOT NULL,
        momo_target TEXT,
        momo_is_code INTEGER,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS basket_members (
        basket_id TEXT NOT NULL REFERENCES baskets(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        total_contributed INTEGER NOT NULL DEFAULT 0,
        joined_at TEXT NOT NULL,
        PRIMARY KEY (basket_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS basket_contributions (
        id TEXT PRIMARY KEY,
        basket_id TEXT NOT NULL REFERENCES baskets(id) ON DELETE CASCADE,
        contributor_id TEXT NOT NULL,
        amount INTEGER NOT NULL,
        status TEXT NOT NULL,
        approver_id TEXT,
        created_at TEXT NOT NULL,
        resolved_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS businesses (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        category TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        catalog_url TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS trips (
        id TEXT PRIMARY KEY,
        creator_id TEXT NOT NULL,
        role TEXT NOT NULL,
        vehicle TEXT NOT NULL,
        pickup_lat REAL NOT NULL,
        pickup_lng REAL NOT NULL,
        dropoff_lat REAL,
        dropoff_lng REAL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS insurance_leads (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        media_id TEXT NOT NULL,
        mime_type TEXT,
        file_url TEXT,
        extracted TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS payment_codes (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        target TEXT NOT NULL,
        is_code INTEGER NOT NULL,
        amount INTEGER,
        ussd TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
];

const BASKET_COLUMNS: &str = "id, name, description, visibility, status, public_slug, creator_id, momo_target, momo_is_code, created_at";

fn sqlite_path_from_url(url: &str) -> String {
    let url = url.trim();
    match url.strip_prefix("sqlite://") {
        Some(path) => path.to_string(),
        None => url.strip_prefix("sqlite:").unwrap_or(url).to_string(),
    }
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and bootstrap the schema.
    pub async fn connect(url: &str, pool_size: u32) -> StorageResult<Self> {
        let path = sqlite_path_from_url(url);
        let path = if path.is_empty() || path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{path}")
        };

        let opts = SqliteConnectOptions::from_str(&path)
            .map_err(|e| StorageError::Database(format!("invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory database exists per connection, so keep exactly one.
        let max_connections = if path == "sqlite::memory:" {
            1
        } else {
            pool_size.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run schema creation (CREATE TABLE IF NOT EXISTS).
    pub async fn run_migrations(&self) -> StorageResult<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Replace the admin notification list.
    pub async fn set_admin_numbers(&self, numbers: &[String]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM admin_numbers")
            .execute(&mut *tx)
            .await?;
        for phone in numbers {
            sqlx::query("INSERT OR IGNORE INTO admin_numbers (phone) VALUES (?)")
                .bind(phone)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn contact_from_row(row: &SqliteRow) -> StorageResult<Contact> {
    Ok(Contact {
        user_id: row.try_get("user_id")?,
        phone: row.try_get("phone")?,
        display_name: row.try_get("display_name")?,
        opted_out: row.try_get("opted_out")?,
    })
}

fn parse_enum<T>(value: String, parse: fn(&str) -> Option<T>, what: &str) -> StorageResult<T> {
    parse(&value).ok_or_else(|| StorageError::Database(format!("invalid {what}: {value}")))
}

fn basket_from_row(row: &SqliteRow) -> StorageResult<Basket> {
    let momo_target: Option<String> = row.try_get("momo_target")?;
    let momo_is_code: Option<bool> = row.try_get("momo_is_code")?;
    Ok(Basket {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        visibility: parse_enum(row.try_get("visibility")?, Visibility::parse, "visibility")?,
        status: parse_enum(row.try_get("status")?, BasketStatus::parse, "basket status")?,
        public_slug: row.try_get("public_slug")?,
        creator_id: row.try_get("creator_id")?,
        payment_target: momo_target.map(|value| PaymentTarget {
            value,
            is_code: momo_is_code.unwrap_or(false),
        }),
        created_at: row.try_get("created_at")?,
    })
}

fn contribution_from_row(row: &SqliteRow) -> StorageResult<Contribution> {
    Ok(Contribution {
        id: row.try_get("id")?,
        basket_id: row.try_get("basket_id")?,
        contributor_id: row.try_get("contributor_id")?,
        amount: row.try_get("amount")?,
        status: parse_enum(
            row.try_get("status")?,
            ContributionStatus::parse,
            "contribution status",
        )?,
        approver_id: row.try_get("approver_id")?,
    })
}

fn business_from_row(row: &SqliteRow) -> StorageResult<Business> {
    Ok(Business {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        category: row.try_get("category")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        location: GeoPoint {
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
        },
        catalog_url: row.try_get("catalog_url")?,
    })
}

fn trip_from_row(row: &SqliteRow) -> StorageResult<Trip> {
    let dropoff_lat: Option<f64> = row.try_get("dropoff_lat")?;
    let dropoff_lng: Option<f64> = row.try_get("dropoff_lng")?;
    Ok(Trip {
        id: row.try_get("id")?,
        creator_id: row.try_get("creator_id")?,
        role: parse_enum(row.try_get("role")?, TripRole::parse, "trip role")?,
        vehicle: row.try_get("vehicle")?,
        pickup: GeoPoint {
            latitude: row.try_get("pickup_lat")?,
            longitude: row.try_get("pickup_lng")?,
        },
        dropoff: dropoff_lat
            .zip(dropoff_lng)
            .map(|(latitude, longitude)| GeoPoint {
                latitude,
                longitude,
            }),
        status: parse_enum(row.try_get("status")?, TripStatus::parse, "trip status")?,
    })
}

// ============================================================================
// Core repositories
// ============================================================================

#[async_trait]
impl ContactStore for SqliteStore {
    async fn ensure_contact(
        &self,
        phone: &str,
        display_name: Option<&str>,
    ) -> StorageResult<Contact> {
        sqlx::query(
            "INSERT INTO contacts (user_id, phone, display_name, opted_out, created_at)
             VALUES (?, ?, ?, 0, ?)
             ON CONFLICT(phone) DO NOTHING",
        )
        .bind(new_id())
        .bind(phone)
        .bind(display_name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT user_id, phone, display_name, opted_out FROM contacts WHERE phone = ?",
        )
        .bind(phone)
        .fetch_one(&self.pool)
        .await?;
        contact_from_row(&row)
    }

    async fn get_contact(&self, user_id: &str) -> StorageResult<Option<Contact>> {
        let row = sqlx::query(
            "SELECT user_id, phone, display_name, opted_out FROM contacts WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(contact_from_row).transpose()
    }

    async fn set_opted_out(&self, user_id: &str, opted_out: bool) -> StorageResult<()> {
        let result = sqlx::query("UPDATE contacts SET opted_out = ? WHERE user_id = ?")
            .bind(opted_out)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("contact", user_id));
        }
        Ok(())
    }

    async fn admin_numbers(&self) -> StorageResult<Vec<String>> {
        let rows = sqlx::query("SELECT phone FROM admin_numbers ORDER BY phone")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get("phone").map_err(StorageError::from))
            .collect()
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn load_state(&self, user_id: &str) -> StorageResult<Option<StateRecord>> {
        let row = sqlx::query(
            "SELECT user_id, key, data, version, updated_at FROM conversation_states WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let data: String = row.try_get("data")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
        Ok(Some(StateRecord {
            user_id: row.try_get("user_id")?,
            key: row.try_get("key")?,
            data: serde_json::from_str(&data)?,
            version: row.try_get("version")?,
            updated_at,
        }))
    }

    async fn save_state(
        &self,
        user_id: &str,
        key: &str,
        data: &Value,
        expected_version: Option<i64>,
    ) -> StorageResult<i64> {
        let data = serde_json::to_string(data)?;
        let conflict = || StorageError::Conflict {
            user_id: user_id.to_string(),
        };

        match expected_version {
            None => {
                let result = sqlx::query(
                    "INSERT INTO conversation_states (user_id, key, data, version, updated_at)
                     VALUES (?, ?, ?, 1, ?)",
                )
                .bind(user_id)
                .bind(key)
                .bind(&data)
                .bind(Utc::now())
                .execute(&self.pool)
                .await;
                match result {
                    Ok(_) => Ok(1),
                    Err(e) => match StorageError::from(e) {
                        StorageError::Duplicate { .. } => Err(conflict()),
                        other => Err(other),
                    },
                }
            }
            Some(version) => {
                let result = sqlx::query(
                    "UPDATE conversation_states
                     SET key = ?, data = ?, version = version + 1, updated_at = ?
                     WHERE user_id = ? AND version = ?",
                )
                .bind(key)
                .bind(&data)
                .bind(Utc::now())
                .bind(user_id)
                .bind(version)
                .execute(&self.pool)
                .await?;
                if result.rows_affected() == 0 {
                    return Err(conflict());
                }
                Ok(version + 1)
            }
        }
    }
}

#[async_trait]
impl DeliveryLedger for SqliteStore {
    async fn record_delivery(&self, message_id: &str) -> StorageResult<()> {
        sqlx::query("INSERT INTO processed_messages (message_id, received_at) VALUES (?, ?)")
            .bind(message_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ============================================================================
// Flow repositories
// ============================================================================

#[async_trait]
impl BasketStore for SqliteStore {
    async fn create_basket(&self, basket: NewBasket) -> StorageResult<Basket> {
        let id = new_id();
        let status = basket.initial_status();
        sqlx::query(
            "INSERT INTO baskets (id, name, description, visibility, status, public_slug, creator_id, momo_target, momo_is_code, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&basket.name)
        .bind(&basket.description)
        .bind(basket.visibility.as_str())
        .bind(status.as_str())
        .bind(&basket.public_slug)
        .bind(&basket.creator_id)
        .bind(basket.payment_target.as_ref().map(|t| t.value.clone()))
        .bind(basket.payment_target.as_ref().map(|t| t.is_code))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_basket(&id)
            .await?
            .ok_or_else(|| StorageError::not_found("basket", id))
    }

    async fn get_basket(&self, basket_id: &str) -> StorageResult<Option<Basket>> {
        let row = sqlx::query(&format!("SELECT {BASKET_COLUMNS} FROM baskets WHERE id = ?"))
            .bind(basket_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(basket_from_row).transpose()
    }

    async fn find_basket_by_token(&self, token: &str) -> StorageResult<Option<Basket>> {
        let row = sqlx::query(&format!(
            "SELECT {BASKET_COLUMNS} FROM baskets WHERE public_slug = ? OR id = ? LIMIT 1"
        ))
        .bind(token)
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(basket_from_row).transpose()
    }

    async fn baskets_for_user(&self, user_id: &str) -> StorageResult<Vec<Basket>> {
        let rows = sqlx::query(&format!(
            "SELECT {BASKET_COLUMNS} FROM baskets
             WHERE creator_id = ?
                OR id IN (SELECT basket_id FROM basket_members WHERE user_id = ?)
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(basket_from_row).collect()
    }

    async fn set_basket_status(
        &self,
        basket_id: &str,
        status: BasketStatus,
    ) -> StorageResult<()> {
        let result = sqlx::query("UPDATE baskets SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(basket_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("basket", basket_id));
        }
        Ok(())
    }

    async fn ensure_member(&self, basket_id: &str, user_id: &str) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO basket_members (basket_id, user_id, total_contributed, joined_at)
             VALUES (?, ?, 0, ?)
             ON CONFLICT(basket_id, user_id) DO NOTHING",
        )
        .bind(basket_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_member(&self, basket_id: &str, user_id: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM basket_members WHERE basket_id = ? AND user_id = ?")
            .bind(basket_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn members(
        &self,
        basket_id: &str,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<BasketMember>> {
        let (Ok(offset), Ok(limit)) = (i64::try_from(offset), i64::try_from(limit)) else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query(
            "SELECT m.basket_id, m.user_id, c.phone, m.total_contributed, m.joined_at
             FROM basket_members m
             LEFT JOIN contacts c ON c.user_id = m.user_id
             WHERE m.basket_id = ?
             ORDER BY m.joined_at ASC
             LIMIT ? OFFSET ?",
        )
        .bind(basket_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(BasketMember {
                    basket_id: row.try_get("basket_id")?,
                    user_id: row.try_get("user_id")?,
                    phone: row.try_get("phone")?,
                    total_contributed: row.try_get("total_contributed")?,
                    joined_at: row.try_get("joined_at")?,
                })
            })
            .collect()
    }

    async fn add_contribution(
        &self,
        basket_id: &str,
        contributor_id: &str,
        amount: i64,
    ) -> StorageResult<Contribution> {
        let contribution = Contribution {
            id: new_id(),
            basket_id: basket_id.to_string(),
            contributor_id: contributor_id.to_string(),
            amount,
            status: ContributionStatus::Pending,
            approver_id: None,
        };
        sqlx::query(
            "INSERT INTO basket_contributions (id, basket_id, contributor_id, amount, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&contribution.id)
        .bind(basket_id)
        .bind(contributor_id)
        .bind(amount)
        .bind(contribution.status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(contribution)
    }

    async fn get_contribution(
        &self,
        contribution_id: &str,
    ) -> StorageResult<Option<Contribution>> {
        let row = sqlx::query(
            "SELECT id, basket_id, contributor_id, amount, status, approver_id
             FROM basket_contributions WHERE id = ?",
        )
        .bind(contribution_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(contribution_from_row).transpose()
    }

    async fn resolve_contribution(
        &self,
        contribution_id: &str,
        status: ContributionStatus,
        approver_id: &str,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            "UPDATE basket_contributions
             SET status = ?, approver_id = ?, resolved_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(approver_id)
        .bind(Utc::now())
        .bind(contribution_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn credit_member(
        &self,
        basket_id: &str,
        user_id: &str,
        amount: i64,
    ) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO basket_members (basket_id, user_id, total_contributed, joined_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(basket_id, user_id)
             DO UPDATE SET total_contributed = total_contributed + excluded.total_contributed",
        )
        .bind(basket_id)
        .bind(user_id)
        .bind(amount)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MarketplaceStore for SqliteStore {
    async fn create_business(&self, business: NewBusiness) -> StorageResult<Business> {
        let business = Business {
            id: new_id(),
            owner_id: business.owner_id,
            category: business.category,
            name: business.name,
            description: business.description,
            location: business.location,
            catalog_url: business.catalog_url,
        };
        sqlx::query(
            "INSERT INTO businesses (id, owner_id, category, name, description, latitude, longitude, catalog_url, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&business.id)
        .bind(&business.owner_id)
        .bind(&business.category)
        .bind(&business.name)
        .bind(&business.description)
        .bind(business.location.latitude)
        .bind(business.location.longitude)
        .bind(&business.catalog_url)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(business)
    }

    async fn get_business(&self, business_id: &str) -> StorageResult<Option<Business>> {
        let row = sqlx::query(
            "SELECT id, owner_id, category, name, description, latitude, longitude, catalog_url
             FROM businesses WHERE id = ?",
        )
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(business_from_row).transpose()
    }
}

#[async_trait]
impl TripStore for SqliteStore {
    async fn create_trip(&self, trip: NewTrip) -> StorageResult<Trip> {
        let trip = Trip {
            id: new_id(),
            creator_id: trip.creator_id,
            role: trip.role,
            vehicle: trip.vehicle,
            pickup: trip.pickup,
            dropoff: None,
            status: TripStatus::Open,
        };
        sqlx::query(
            "INSERT INTO trips (id, creator_id, role, vehicle, pickup_lat, pickup_lng, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&trip.id)
        .bind(&trip.creator_id)
        .bind(trip.role.as_str())
        .bind(&trip.vehicle)
        .bind(trip.pickup.latitude)
        .bind(trip.pickup.longitude)
        .bind(trip.status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(trip)
    }

    async fn get_trip(&self, trip_id: &str) -> StorageResult<Option<Trip>> {
        let row = sqlx::query(
            "SELECT id, creator_id, role, vehicle, pickup_lat, pickup_lng, dropoff_lat, dropoff_lng, status
             FROM trips WHERE id = ?",
        )
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(trip_from_row).transpose()
    }

    async fn set_trip_dropoff(&self, trip_id: &str, dropoff: GeoPoint) -> StorageResult<()> {
        let result =
            sqlx::query("UPDATE trips SET dropoff_lat = ?, dropoff_lng = ? WHERE id = ?")
                .bind(dropoff.latitude)
                .bind(dropoff.longitude)
                .bind(trip_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("trip", trip_id));
        }
        Ok(())
    }
}

#[async_trait]
impl IntakeStore for SqliteStore {
    async fn create_lead(&self, lead: NewInsuranceLead) -> StorageResult<InsuranceLead> {
        let lead = InsuranceLead {
            id: new_id(),
            user_id: lead.user_id,
            media_id: lead.media_id,
            mime_type: lead.mime_type,
            file_url: lead.file_url,
            extracted: None,
        };
        sqlx::query(
            "INSERT INTO insurance_leads (id, user_id, media_id, mime_type, file_url, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&lead.id)
        .bind(&lead.user_id)
        .bind(&lead.media_id)
        .bind(&lead.mime_type)
        .bind(&lead.file_url)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(lead)
    }

    async fn attach_extraction(&self, lead_id: &str, extracted: &Value) -> StorageResult<()> {
        sqlx::query("UPDATE insurance_leads SET extracted = ? WHERE id = ?")
            .bind(serde_json::to_string(extracted)?)
            .bind(lead_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PaymentCodeStore for SqliteStore {
    async fn create_payment_code(
        &self,
        request: NewPaymentCode,
    ) -> StorageResult<PaymentCodeRequest> {
        let request = PaymentCodeRequest {
            id: new_id(),
            user_id: request.user_id,
            target: request.target,
            amount: request.amount,
            ussd: request.ussd,
        };
        sqlx::query(
            "INSERT INTO payment_codes (id, user_id, target, is_code, amount, ussd, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id)
        .bind(&request.user_id)
        .bind(&request.target.value)
        .bind(request.target.is_code)
        .bind(request.amount)
        .bind(&request.ussd)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(request)
    }
}
