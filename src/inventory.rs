//! Inventory store: bookable items and their reservation ledger.
//!
//! Each item sits behind its own mutex so reserve and cancel are strictly
//! ordered per item while different items proceed in parallel. Locks are
//! always taken item first, ledger second.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

/// A bookable catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Identifier, unique within its service.
    pub id: String,
    /// Display name (hotel or airline).
    pub name: String,
    /// Location or route.
    pub location: String,
    /// Price per unit (night or seat).
    pub unit_price: u32,
    /// Rating, where applicable.
    pub rating: Option<f64>,
    /// Travel class, where applicable.
    pub class: Option<String>,
    /// Units currently available.
    pub available_quantity: u32,
    /// Units available when the catalog was seeded.
    pub capacity: u32,
    /// Domain-specific attributes (amenities, flight number, ...).
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl CatalogItem {
    /// Create a catalog item with full availability.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
        unit_price: u32,
        capacity: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location: location.into(),
            unit_price,
            rating: None,
            class: None,
            available_quantity: capacity,
            capacity,
            attributes: Map::new(),
        }
    }

    /// Set the rating.
    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    /// Set the travel class.
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// Set a domain-specific attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Get a string attribute.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// Status of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
}

/// A hold against an item's capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Booking reference, never reused.
    pub reference: String,
    /// Reserved item.
    pub item_id: String,
    /// Item name at booking time.
    pub item_name: String,
    /// Who booked.
    pub requester: String,
    /// Contact for confirmation, if given.
    pub contact: Option<String>,
    /// Units held against the item.
    pub quantity: u32,
    /// Price per unit at booking time.
    pub unit_price: u32,
    /// `unit_price * quantity`.
    pub total_cost: u64,
    /// Current status.
    pub status: ReservationStatus,
    /// When the reservation was created.
    pub created_at: DateTime<Utc>,
    /// Domain details (dates, party size, ...).
    #[serde(default)]
    pub details: Map<String, Value>,
}

/// Input to [`InventoryStore::reserve`].
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub item_id: String,
    pub quantity: u32,
    pub requester: String,
    pub contact: Option<String>,
    pub details: Map<String, Value>,
}

impl ReservationRequest {
    /// Request `quantity` units of `item_id` on behalf of `requester`.
    pub fn new(item_id: impl Into<String>, quantity: u32, requester: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
            requester: requester.into(),
            contact: None,
            details: Map::new(),
        }
    }

    /// Attach a contact address.
    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    /// Attach a domain detail.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Per-service inventory with an atomic reserve/cancel contract.
pub struct InventoryStore {
    /// Items in catalog order; the set is fixed at construction.
    items: Vec<Arc<Mutex<CatalogItem>>>,
    /// Item id -> index into `items`.
    index: HashMap<String, usize>,
    /// Reservation ledger.
    reservations: Mutex<HashMap<String, Reservation>>,
    /// Reference prefix, distinct per service.
    prefix: String,
    /// Next reference number.
    next_reference: AtomicU64,
}

impl InventoryStore {
    /// Create a store over a seeded catalog. A repeated id replaces the
    /// earlier item in place.
    pub fn new(prefix: impl Into<String>, first_reference: u64, catalog: Vec<CatalogItem>) -> Self {
        let mut items = Vec::with_capacity(catalog.len());
        let mut index = HashMap::with_capacity(catalog.len());
        for item in catalog {
            let id = item.id.clone();
            let slot = Arc::new(Mutex::new(item));
            match index.get(&id) {
                Some(&i) => items[i] = slot,
                None => {
                    index.insert(id, items.len());
                    items.push(slot);
                }
            }
        }

        Self {
            items,
            index,
            reservations: Mutex::new(HashMap::new()),
            prefix: prefix.into(),
            next_reference: AtomicU64::new(first_reference),
        }
    }

    fn slot(&self, item_id: &str) -> Result<&Arc<Mutex<CatalogItem>>> {
        self.index
            .get(item_id)
            .map(|&i| &self.items[i])
            .ok_or_else(|| Error::NotFound(format!("item {}", item_id)))
    }

    /// Snapshot of a single item.
    pub async fn item(&self, item_id: &str) -> Result<CatalogItem> {
        let slot = self.slot(item_id)?;
        let item = slot.lock().await;
        Ok(item.clone())
    }

    /// Items with remaining availability that match `predicate`, in catalog order.
    pub async fn search<F>(&self, predicate: F) -> Vec<CatalogItem>
    where
        F: Fn(&CatalogItem) -> bool,
    {
        let mut results = Vec::new();
        for slot in &self.items {
            let item = slot.lock().await;
            if item.available_quantity > 0 && predicate(&item) {
                results.push(item.clone());
            }
        }
        results
    }

    /// Reserve units of an item.
    ///
    /// The capacity check, the decrement and the ledger insert happen while
    /// the item lock is held, so concurrent reservations cannot both pass a
    /// stale check.
    pub async fn reserve(&self, request: ReservationRequest) -> Result<Reservation> {
        if request.quantity == 0 {
            return Err(Error::InvalidQuantity("quantity must be at least 1".into()));
        }

        let slot = self.slot(&request.item_id)?;
        let mut item = slot.lock().await;

        if item.available_quantity < request.quantity {
            return Err(Error::InsufficientCapacity {
                item_id: item.id.clone(),
                requested: request.quantity,
                available: item.available_quantity,
            });
        }

        let number = self.next_reference.fetch_add(1, Ordering::SeqCst);
        let reservation = Reservation {
            reference: format!("{}{}", self.prefix, number),
            item_id: item.id.clone(),
            item_name: item.name.clone(),
            requester: request.requester,
            contact: request.contact,
            quantity: request.quantity,
            unit_price: item.unit_price,
            total_cost: u64::from(item.unit_price) * u64::from(request.quantity),
            status: ReservationStatus::Confirmed,
            created_at: Utc::now(),
            details: request.details,
        };

        item.available_quantity -= request.quantity;
        self.reservations
            .lock()
            .await
            .insert(reservation.reference.clone(), reservation.clone());

        debug!(
            reference = %reservation.reference,
            item = %item.id,
            quantity = reservation.quantity,
            remaining = item.available_quantity,
            "reserved"
        );

        Ok(reservation)
    }

    /// Look up a reservation.
    pub async fn get(&self, reference: &str) -> Result<Reservation> {
        self.reservations
            .lock()
            .await
            .get(reference)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("booking {}", reference)))
    }

    /// Cancel a reservation and restore its quantity.
    ///
    /// A second cancel of the same reference fails with
    /// [`Error::AlreadyCancelled`] and mutates nothing.
    pub async fn cancel(&self, reference: &str) -> Result<Reservation> {
        let item_id = {
            let ledger = self.reservations.lock().await;
            let reservation = ledger
                .get(reference)
                .ok_or_else(|| Error::NotFound(format!("booking {}", reference)))?;
            if reservation.status == ReservationStatus::Cancelled {
                return Err(Error::AlreadyCancelled(reference.to_string()));
            }
            reservation.item_id.clone()
        };

        let slot = self.slot(&item_id)?;
        let mut item = slot.lock().await;
        let mut ledger = self.reservations.lock().await;
        let reservation = ledger
            .get_mut(reference)
            .ok_or_else(|| Error::NotFound(format!("booking {}", reference)))?;

        // Re-checked under the item lock: a concurrent cancel may have won.
        if reservation.status == ReservationStatus::Cancelled {
            return Err(Error::AlreadyCancelled(reference.to_string()));
        }

        reservation.status = ReservationStatus::Cancelled;
        item.available_quantity += reservation.quantity;

        debug!(
            reference,
            item = %item.id,
            restored = reservation.quantity,
            remaining = item.available_quantity,
            "cancelled"
        );

        Ok(reservation.clone())
    }

    /// All reservations, ordered by reference.
    pub async fn reservations(&self) -> Vec<Reservation> {
        let ledger = self.reservations.lock().await;
        let mut all: Vec<_> = ledger.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.reference.cmp(&b.reference)));
        all
    }
}
