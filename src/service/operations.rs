//! Operations shared by both catalogs, plus argument and date helpers.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::inventory::{CatalogItem, Reservation};
use crate::protocol::OperationSpec;

use super::{Operation, OperationContext};

/// Wire date format.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Deserialize validated arguments into a typed struct.
pub fn parse_args<T: DeserializeOwned>(arguments: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(arguments)).map_err(|e| Error::Validation(e.to_string()))
}

/// Fetch a required string argument.
pub fn string_arg(arguments: &Map<String, Value>, name: &str) -> Result<String> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::Validation(format!("missing required parameter '{}'", name)))
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| {
        Error::InvalidDate(format!("{} '{}' is not a YYYY-MM-DD date", field, raw))
    })
}

/// Parse a date that must not be strictly before `today`.
pub fn parse_upcoming_date(field: &str, raw: &str, today: NaiveDate) -> Result<NaiveDate> {
    let date = parse_date(field, raw)?;
    if date < today {
        return Err(Error::InvalidDate(format!(
            "{} {} cannot be in the past",
            field, raw
        )));
    }
    Ok(date)
}

/// Number of nights between two dates; must be positive.
pub fn nights_between(check_in: NaiveDate, check_out: NaiveDate) -> Result<u32> {
    let nights = (check_out - check_in).num_days();
    if nights <= 0 {
        return Err(Error::InvalidQuantity(
            "check-out must be after check-in".into(),
        ));
    }
    u32::try_from(nights).map_err(|_| Error::InvalidQuantity(format!("{} nights", nights)))
}

/// A head count that must be at least one.
pub fn positive_count(field: &str, count: i64) -> Result<u32> {
    if count < 1 {
        return Err(Error::InvalidQuantity(format!(
            "{} must be at least 1, got {}",
            field, count
        )));
    }
    u32::try_from(count).map_err(|_| Error::InvalidQuantity(format!("{} too large", field)))
}

/// Fetch the value of a reservation detail, or null.
pub fn detail(reservation: &Reservation, key: &str) -> Value {
    reservation.details.get(key).cloned().unwrap_or(Value::Null)
}

/// Fetch the value of an item attribute, or null.
pub fn attribute(item: &CatalogItem, key: &str) -> Value {
    item.attributes.get(key).cloned().unwrap_or(Value::Null)
}

/// Detail lookup for a single catalog item.
pub struct ItemDetails {
    pub spec: OperationSpec,
    /// Argument holding the item id.
    pub id_param: &'static str,
    /// Noun used in not-found messages ("Hotel", "Flight").
    pub noun: &'static str,
    pub view: fn(&CatalogItem) -> Value,
}

#[async_trait::async_trait]
impl Operation for ItemDetails {
    fn spec(&self) -> OperationSpec {
        self.spec.clone()
    }

    async fn execute(
        &self,
        arguments: Map<String, Value>,
        context: &OperationContext,
    ) -> Result<Value> {
        let id = string_arg(&arguments, self.id_param)?;
        let item = context.store.item(&id).await.map_err(|e| match e {
            Error::NotFound(_) => Error::NotFound(format!("{} with ID {}", self.noun, id)),
            other => other,
        })?;
        Ok((self.view)(&item))
    }
}

/// Status lookup for a reservation.
pub struct ReservationLookup {
    pub spec: OperationSpec,
    /// Argument holding the booking reference.
    pub ref_param: &'static str,
    pub view: fn(&Reservation) -> Value,
}

#[async_trait::async_trait]
impl Operation for ReservationLookup {
    fn spec(&self) -> OperationSpec {
        self.spec.clone()
    }

    async fn execute(
        &self,
        arguments: Map<String, Value>,
        context: &OperationContext,
    ) -> Result<Value> {
        let reference = string_arg(&arguments, self.ref_param)?;
        let reservation = context.store.get(&reference).await?;
        Ok((self.view)(&reservation))
    }
}

/// Cancellation of a reservation.
pub struct CancelReservation {
    pub spec: OperationSpec,
    /// Argument holding the booking reference.
    pub ref_param: &'static str,
    pub view: fn(&Reservation) -> Value,
}

#[async_trait::async_trait]
impl Operation for CancelReservation {
    fn spec(&self) -> OperationSpec {
        self.spec.clone()
    }

    async fn execute(
        &self,
        arguments: Map<String, Value>,
        context: &OperationContext,
    ) -> Result<Value> {
        let reference = string_arg(&arguments, self.ref_param)?;
        let reservation = context.store.cancel(&reference).await?;
        Ok((self.view)(&reservation))
    }
}
