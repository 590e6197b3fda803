//! Records read and written by the flows.
//!
//! Only the attributes the state machines touch are modelled here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Contacts
// ============================================================================

/// A platform contact, one per phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub user_id: String,
    pub phone: String,
    pub display_name: Option<String>,
    pub opted_out: bool,
}

// ============================================================================
// Shared value types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Mobile-money destination: a phone number or a merchant code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTarget {
    pub value: String,
    pub is_code: bool,
}

impl PaymentTarget {
    /// Classify free text: 4 to 9 digits is a merchant code, anything else a number.
    pub fn parse(text: &str) -> Option<Self> {
        let value = text.trim();
        if value.is_empty() {
            return None;
        }
        let digits = value.chars().filter(char::is_ascii_digit).count();
        Some(Self {
            value: value.to_string(),
            is_code: (4..=9).contains(&digits),
        })
    }
}

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ============================================================================
// Baskets
// ============================================================================

string_enum!(Visibility {
    Public => "public",
    Private => "private",
});

string_enum!(BasketStatus {
    Pending => "pending",
    Active => "active",
    Closed => "closed",
});

string_enum!(ContributionStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

#[derive(Debug, Clone, PartialEq)]
pub struct Basket {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub status: BasketStatus,
    pub public_slug: Option<String>,
    pub creator_id: String,
    pub payment_target: Option<PaymentTarget>,
    pub created_at: DateTime<Utc>,
}

impl Basket {
    /// Token used in share links and `JOIN_BASKET:` codes.
    pub fn share_token(&self) -> &str {
        self.public_slug.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone)]
pub struct NewBasket {
    pub name: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub creator_id: String,
    pub public_slug: Option<String>,
    pub payment_target: Option<PaymentTarget>,
}

impl NewBasket {
    /// Public baskets wait for review; private ones are usable immediately.
    pub fn initial_status(&self) -> BasketStatus {
        match self.visibility {
            Visibility::Public => BasketStatus::Pending,
            Visibility::Private => BasketStatus::Active,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasketMember {
    pub basket_id: String,
    pub user_id: String,
    pub phone: Option<String>,
    pub total_contributed: i64,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub id: String,
    pub basket_id: String,
    pub contributor_id: String,
    pub amount: i64,
    pub status: ContributionStatus,
    pub approver_id: Option<String>,
}

// ============================================================================
// Marketplace
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Business {
    pub id: String,
    pub owner_id: String,
    pub category: String,
    pub name: String,
    pub description: Option<String>,
    pub location: GeoPoint,
    pub catalog_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewBusiness {
    pub owner_id: String,
    pub category: String,
    pub name: String,
    pub description: Option<String>,
    pub location: GeoPoint,
    pub catalog_url: Option<String>,
}

// ============================================================================
// Trips
// ============================================================================

string_enum!(TripRole {
    Driver => "driver",
    Passenger => "passenger",
});

impl TripRole {
    pub fn opposite(&self) -> TripRole {
        match self {
            TripRole::Driver => TripRole::Passenger,
            TripRole::Passenger => TripRole::Driver,
        }
    }
}

string_enum!(TripStatus {
    Open => "open",
    Closed => "closed",
});

#[derive(Debug, Clone, PartialEq)]
pub struct Trip {
    pub id: String,
    pub creator_id: String,
    pub role: TripRole,
    pub vehicle: String,
    pub pickup: GeoPoint,
    pub dropoff: Option<GeoPoint>,
    pub status: TripStatus,
}

#[derive(Debug, Clone)]
pub struct NewTrip {
    pub creator_id: String,
    pub role: TripRole,
    pub vehicle: String,
    pub pickup: GeoPoint,
}

// ============================================================================
// Document intake
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct InsuranceLead {
    pub id: String,
    pub user_id: String,
    pub media_id: String,
    pub mime_type: Option<String>,
    pub file_url: Option<String>,
    pub extracted: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct NewInsuranceLead {
    pub user_id: String,
    pub media_id: String,
    pub mime_type: Option<String>,
    pub file_url: Option<String>,
}

// ============================================================================
// Payment codes
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentCodeRequest {
    pub id: String,
    pub user_id: String,
    pub target: PaymentTarget,
    pub amount: Option<i64>,
    pub ussd: String,
}

#[derive(Debug, Clone)]
pub struct NewPaymentCode {
    pub user_id: String,
    pub target: PaymentTarget,
    pub amount: Option<i64>,
    pub ussd: String,
}

/// Generate a lowercase ULID for new records.
pub fn new_id() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}
