//! In-memory store.
//!
//! All tables sit behind one `RwLock`, so each trait call is atomic just like a
//! single statement against the SQL backend.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{
    Basket, BasketMember, BasketStatus, BasketStore, Business, Contact, ContactStore,
    Contribution, ContributionStatus, DeliveryLedger, GeoPoint, InsuranceLead, IntakeStore,
    MarketplaceStore, NewBasket, NewBusiness, NewInsuranceLead, NewPaymentCode, NewTrip,
    PaymentCodeRequest, PaymentCodeStore, StateRecord, StateStore, StorageError, StorageResult,
    Trip, TripStatus, TripStore, new_id,
};

#[derive(Default)]
struct Tables {
    contacts: HashMap<String, Contact>,
    phone_index: HashMap<String, String>,
    admins: Vec<String>,
    states: HashMap<String, StateRecord>,
    ledger: HashSet<String>,
    baskets: HashMap<String, Basket>,
    members: Vec<BasketMember>,
    contributions: HashMap<String, Contribution>,
    businesses: HashMap<String, Business>,
    trips: HashMap<String, Trip>,
    leads: HashMap<String, InsuranceLead>,
    payment_codes: Vec<PaymentCodeRequest>,
}

/// Thread-safe in-memory implementation of every repository trait.
#[derive(Default, Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the admin notification list.
    pub async fn set_admin_numbers(&self, numbers: Vec<String>) {
        self.tables.write().await.admins = numbers;
    }

    /// Number of ledger rows for `message_id` (0 or 1).
    pub async fn delivery_count(&self, message_id: &str) -> usize {
        usize::from(self.tables.read().await.ledger.contains(message_id))
    }

    /// Every contribution, in no particular order.
    pub async fn contributions(&self) -> Vec<Contribution> {
        self.tables
            .read()
            .await
            .contributions
            .values()
            .cloned()
            .collect()
    }

    /// Every lead, in no particular order.
    pub async fn leads(&self) -> Vec<InsuranceLead> {
        self.tables.read().await.leads.values().cloned().collect()
    }

    pub async fn payment_codes(&self) -> Vec<PaymentCodeRequest> {
        self.tables.read().await.payment_codes.clone()
    }

    pub async fn trips(&self) -> Vec<Trip> {
        self.tables.read().await.trips.values().cloned().collect()
    }

    pub async fn businesses(&self) -> Vec<Business> {
        self.tables.read().await.businesses.values().cloned().collect()
    }

    pub async fn baskets(&self) -> Vec<Basket> {
        self.tables.read().await.baskets.values().cloned().collect()
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn ensure_contact(
        &self,
        phone: &str,
        display_name: Option<&str>,
    ) -> StorageResult<Contact> {
        let mut tables = self.tables.write().await;
        if let Some(user_id) = tables.phone_index.get(phone)
            && let Some(contact) = tables.contacts.get(user_id)
        {
            return Ok(contact.clone());
        }
        let contact = Contact {
            user_id: new_id(),
            phone: phone.to_string(),
            display_name: display_name.map(str::to_string),
            opted_out: false,
        };
        tables
            .phone_index
            .insert(phone.to_string(), contact.user_id.clone());
        tables
            .contacts
            .insert(contact.user_id.clone(), contact.clone());
        Ok(contact)
    }

    async fn get_contact(&self, user_id: &str) -> StorageResult<Option<Contact>> {
        Ok(self.tables.read().await.contacts.get(user_id).cloned())
    }

    async fn set_opted_out(&self, user_id: &str, opted_out: bool) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let contact = tables
            .contacts
            .get_mut(user_id)
            .ok_or_else(|| StorageError::not_found("contact", user_id))?;
        contact.opted_out = opted_out;
        Ok(())
    }

    async fn admin_numbers(&self) -> StorageResult<Vec<String>> {
        Ok(self.tables.read().await.admins.clone())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_state(&self, user_id: &str) -> StorageResult<Option<StateRecord>> {
        Ok(self.tables.read().await.states.get(user_id).cloned())
    }

    async fn save_state(
        &self,
        user_id: &str,
        key: &str,
        data: &Value,
        expected_version: Option<i64>,
    ) -> StorageResult<i64> {
        let mut tables = self.tables.write().await;
        let current = tables.states.get(user_id).map(|r| r.version);
        if current != expected_version {
            return Err(StorageError::Conflict {
                user_id: user_id.to_string(),
            });
        }
        let version = current.map_or(1, |v| v + 1);
        tables.states.insert(
            user_id.to_string(),
            StateRecord {
                user_id: user_id.to_string(),
                key: key.to_string(),
                data: data.clone(),
                version,
                updated_at: Utc::now(),
            },
        );
        Ok(version)
    }
}

#[async_trait]
impl DeliveryLedger for MemoryStore {
    async fn record_delivery(&self, message_id: &str) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.ledger.insert(message_id.to_string()) {
            return Err(StorageError::duplicate(format!("message {message_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl BasketStore for MemoryStore {
    async fn create_basket(&self, basket: NewBasket) -> StorageResult<Basket> {
        let status = basket.initial_status();
        let basket = Basket {
            id: new_id(),
            name: basket.name,
            description: basket.description,
            visibility: basket.visibility,
            status,
            public_slug: basket.public_slug,
            creator_id: basket.creator_id,
            payment_target: basket.payment_target,
            created_at: Utc::now(),
        };
        let mut tables = self.tables.write().await;
        if let Some(slug) = &basket.public_slug
            && tables
                .baskets
                .values()
                .any(|b| b.public_slug.as_ref() == Some(slug))
        {
            return Err(StorageError::duplicate(format!("basket slug {slug}")));
        }
        tables.baskets.insert(basket.id.clone(), basket.clone());
        Ok(basket)
    }

    async fn get_basket(&self, basket_id: &str) -> StorageResult<Option<Basket>> {
        Ok(self.tables.read().await.baskets.get(basket_id).cloned())
    }

    async fn find_basket_by_token(&self, token: &str) -> StorageResult<Option<Basket>> {
        let tables = self.tables.read().await;
        Ok(tables
            .baskets
            .values()
            .find(|b| b.id == token || b.public_slug.as_deref() == Some(token))
            .cloned())
    }

    async fn baskets_for_user(&self, user_id: &str) -> StorageResult<Vec<Basket>> {
        let tables = self.tables.read().await;
        let member_of: HashSet<&str> = tables
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .map(|m| m.basket_id.as_str())
            .collect();
        let mut baskets: Vec<Basket> = tables
            .baskets
            .values()
            .filter(|b| b.creator_id == user_id || member_of.contains(b.id.as_str()))
            .cloned()
            .collect();
        baskets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(baskets)
    }

    async fn set_basket_status(
        &self,
        basket_id: &str,
        status: BasketStatus,
    ) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let basket = tables
            .baskets
            .get_mut(basket_id)
            .ok_or_else(|| StorageError::not_found("basket", basket_id))?;
        basket.status = status;
        Ok(())
    }

    async fn ensure_member(&self, basket_id: &str, user_id: &str) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.baskets.contains_key(basket_id) {
            return Err(StorageError::not_found("basket", basket_id));
        }
        let exists = tables
            .members
            .iter()
            .any(|m| m.basket_id == basket_id && m.user_id == user_id);
        if !exists {
            let phone = tables.contacts.get(user_id).map(|c| c.phone.clone());
            tables.members.push(BasketMember {
                basket_id: basket_id.to_string(),
                user_id: user_id.to_string(),
                phone,
                total_contributed: 0,
                joined_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn remove_member(&self, basket_id: &str, user_id: &str) -> StorageResult<()> {
        self.tables
            .write()
            .await
            .members
            .retain(|m| !(m.basket_id == basket_id && m.user_id == user_id));
        Ok(())
    }

    async fn members(
        &self,
        basket_id: &str,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<BasketMember>> {
        let tables = self.tables.read().await;
        let mut members: Vec<BasketMember> = tables
            .members
            .iter()
            .filter(|m| m.basket_id == basket_id)
            .cloned()
            .collect();
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(members.into_iter().skip(offset).take(limit).collect())
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
        let mut tables = self.tables.write().await;
        if !tables.baskets.contains_key(basket_id) {
            return Err(StorageError::not_found("basket", basket_id));
        }
        tables
            .contributions
            .insert(contribution.id.clone(), contribution.clone());
        Ok(contribution)
    }

    async fn get_contribution(
        &self,
        contribution_id: &str,
    ) -> StorageResult<Option<Contribution>> {
        Ok(self
            .tables
            .read()
            .await
            .contributions
            .get(contribution_id)
            .cloned())
    }

    async fn resolve_contribution(
        &self,
        contribution_id: &str,
        status: ContributionStatus,
        approver_id: &str,
    ) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.contributions.get_mut(contribution_id) {
            Some(c) if c.status == ContributionStatus::Pending => {
                c.status = status;
                c.approver_id = Some(approver_id.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn credit_member(
        &self,
        basket_id: &str,
        user_id: &str,
        amount: i64,
    ) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(member) = tables
            .members
            .iter_mut()
            .find(|m| m.basket_id == basket_id && m.user_id == user_id)
        {
            member.total_contributed = member
                .total_contributed
                .checked_add(amount)
                .ok_or_else(|| {
                    StorageError::Database(format!("contribution total overflow for {user_id}"))
                })?;
            return Ok(());
        }
        let phone = tables.contacts.get(user_id).map(|c| c.phone.clone());
        tables.members.push(BasketMember {
            basket_id: basket_id.to_string(),
            user_id: user_id.to_string(),
            phone,
            total_contributed: amount,
            joined_at: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl MarketplaceStore for MemoryStore {
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
        self.tables
            .write()
            .await
            .businesses
            .insert(business.id.clone(), business.clone());
        Ok(business)
    }

    async fn get_business(&self, business_id: &str) -> StorageResult<Option<Business>> {
        Ok(self.tables.read().await.businesses.get(business_id).cloned())
    }
}

#[async_trait]
impl TripStore for MemoryStore {
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
        self.tables
            .write()
            .await
            .trips
            .insert(trip.id.clone(), trip.clone());
        Ok(trip)
    }

    async fn get_trip(&self, trip_id: &str) -> StorageResult<Option<Trip>> {
        Ok(self.tables.read().await.trips.get(trip_id).cloned())
    }

    async fn set_trip_dropoff(&self, trip_id: &str, dropoff: GeoPoint) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let trip = tables
            .trips
            .get_mut(trip_id)
            .ok_or_else(|| StorageError::not_found("trip", trip_id))?;
        trip.dropoff = Some(dropoff);
        Ok(())
    }
}

#[async_trait]
impl IntakeStore for MemoryStore {
    async fn create_lead(&self, lead: NewInsuranceLead) -> StorageResult<InsuranceLead> {
        let lead = InsuranceLead {
            id: new_id(),
            user_id: lead.user_id,
            media_id: lead.media_id,
            mime_type: lead.mime_type,
            file_url: lead.file_url,
            extracted: None,
        };
        self.tables
            .write()
            .await
            .leads
            .insert(lead.id.clone(), lead.clone());
        Ok(lead)
    }

    async fn attach_extraction(&self, lead_id: &str, extracted: &Value) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let lead = tables
            .leads
            .get_mut(lead_id)
            .ok_or_else(|| StorageError::not_found("lead", lead_id))?;
        lead.extracted = Some(extracted.clone());
        Ok(())
    }
}

#[async_trait]
impl PaymentCodeStore for MemoryStore {
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
        self.tables
            .write()
            .await
            .payment_codes
            .push(request.clone());
        Ok(request)
    }
}
