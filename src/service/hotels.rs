//! Hotel booking service.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::inventory::{CatalogItem, InventoryStore, Reservation, ReservationRequest};
use crate::protocol::{OperationSpec, ParameterType};

use super::operations::{
    attribute, detail, nights_between, parse_args, parse_date, parse_upcoming_date,
    positive_count, CancelReservation, ItemDetails, ReservationLookup,
};
use super::{Operation, OperationContext, ResourceService};

/// Service name advertised in the manifest.
pub const HOTEL_AGENT: &str = "HotelBookingAgent";

/// Build the hotel service over the seeded catalog.
pub fn hotel_service() -> ResourceService {
    hotel_service_with(seed_hotels())
}

/// Build the hotel service over a custom catalog.
pub fn hotel_service_with(hotels: Vec<CatalogItem>) -> ResourceService {
    let store = InventoryStore::new("BK", 1000, hotels);

    ResourceService::new(HOTEL_AGENT, "1.0", store)
        .with_operation(SearchHotels)
        .with_operation(ItemDetails {
            spec: OperationSpec::new(
                "get_hotel_details",
                "Get detailed information about a specific hotel",
            )
            .required(
                "hotel_id",
                ParameterType::String,
                "The unique identifier of the hotel",
            ),
            id_param: "hotel_id",
            noun: "Hotel",
            view: hotel_view,
        })
        .with_operation(CreateBooking)
        .with_operation(ReservationLookup {
            spec: OperationSpec::new(
                "get_booking_status",
                "Check the status of an existing booking",
            )
            .required("booking_id", ParameterType::String, "The booking confirmation ID"),
            ref_param: "booking_id",
            view: booking_view,
        })
        .with_operation(CancelReservation {
            spec: OperationSpec::new("cancel_booking", "Cancel an existing hotel booking")
                .required(
                    "booking_id",
                    ParameterType::String,
                    "The booking confirmation ID to cancel",
                ),
            ref_param: "booking_id",
            view: booking_view,
        })
}

/// The demo hotel catalog.
pub fn seed_hotels() -> Vec<CatalogItem> {
    let hotel = |id: &str, name: &str, location: &str, price, rooms, rating, amenities: &[&str]| {
        CatalogItem::new(id, name, location, price, rooms)
            .with_rating(rating)
            .with_attribute("amenities", json!(amenities))
    };

    vec![
        hotel("1", "Marriott", "Frankfurt", 250, 5, 4.5, &["WiFi", "Pool", "Gym", "Restaurant"]),
        hotel("2", "Hyatt Residency", "Chicago", 180, 10, 4.2, &["WiFi", "Beach Access", "Pool", "Bar"]),
        hotel("3", "Grand Hyatt", "New York", 150, 8, 4.7, &["WiFi", "Hiking Trails", "Restaurant", "Spa"]),
        hotel("4", "Holiday Inn", "Frankfurt", 120, 15, 4.0, &["WiFi", "Breakfast", "Parking"]),
        hotel("5", "Marriott", "Chicago", 165, 25, 4.2, &["WiFi", "Breakfast"]),
    ]
}

fn hotel_view(item: &CatalogItem) -> Value {
    json!({
        "hotel_id": item.id,
        "name": item.name,
        "location": item.location,
        "price_per_night": item.unit_price,
        "available_rooms": item.available_quantity,
        "rating": item.rating,
        "amenities": attribute(item, "amenities"),
    })
}

fn booking_view(reservation: &Reservation) -> Value {
    json!({
        "booking_id": reservation.reference,
        "hotel_id": reservation.item_id,
        "hotel_name": reservation.item_name,
        "guest_name": reservation.requester,
        "check_in": detail(reservation, "check_in"),
        "check_out": detail(reservation, "check_out"),
        "num_guests": detail(reservation, "num_guests"),
        "nights": reservation.quantity,
        "price_per_night": reservation.unit_price,
        "total_cost": reservation.total_cost,
        "status": reservation.status,
        "created_at": reservation.created_at.to_rfc3339(),
    })
}

/// Search hotels by location, price and rating.
pub struct SearchHotels;

#[derive(Debug, Deserialize)]
struct SearchHotelsArgs {
    location: Option<String>,
    max_price: Option<f64>,
    min_rating: Option<f64>,
}

#[async_trait::async_trait]
impl Operation for SearchHotels {
    fn spec(&self) -> OperationSpec {
        OperationSpec::new(
            "search_hotels",
            "Search for available hotels based on location, price, and rating criteria",
        )
        .optional(
            "location",
            ParameterType::String,
            "City or location to search for hotels",
        )
        .optional("max_price", ParameterType::Number, "Maximum price per night in USD")
        .optional("min_rating", ParameterType::Number, "Minimum hotel rating (0-5)")
    }

    async fn execute(
        &self,
        arguments: Map<String, Value>,
        context: &OperationContext,
    ) -> Result<Value> {
        let args: SearchHotelsArgs = parse_args(arguments)?;
        let location = args.location.map(|l| l.to_lowercase());

        let hotels = context
            .store
            .search(|item| {
                location
                    .as_deref()
                    .map_or(true, |l| item.location.to_lowercase().contains(l))
                    && args
                        .max_price
                        .map_or(true, |max| f64::from(item.unit_price) <= max)
                    && args
                        .min_rating
                        .map_or(true, |min| item.rating.unwrap_or(0.0) >= min)
            })
            .await;

        let views: Vec<_> = hotels.iter().map(hotel_view).collect();
        Ok(json!({ "count": views.len(), "hotels": views }))
    }
}

/// Book rooms for a date range; the reserved quantity is the night count.
pub struct CreateBooking;

#[derive(Debug, Deserialize)]
struct CreateBookingArgs {
    hotel_id: String,
    guest_name: String,
    check_in: String,
    check_out: String,
    num_guests: i64,
}

#[async_trait::async_trait]
impl Operation for CreateBooking {
    fn spec(&self) -> OperationSpec {
        OperationSpec::new("create_booking", "Create a new hotel booking reservation")
            .required("hotel_id", ParameterType::String, "The hotel ID to book")
            .required("guest_name", ParameterType::String, "Name of the guest")
            .required(
                "check_in",
                ParameterType::String,
                "Check-in date in YYYY-MM-DD format",
            )
            .required(
                "check_out",
                ParameterType::String,
                "Check-out date in YYYY-MM-DD format",
            )
            .required("num_guests", ParameterType::Integer, "Number of guests")
    }

    async fn execute(
        &self,
        arguments: Map<String, Value>,
        context: &OperationContext,
    ) -> Result<Value> {
        let args: CreateBookingArgs = parse_args(arguments)?;

        let check_in = parse_upcoming_date("check_in", &args.check_in, context.today)?;
        let check_out = parse_date("check_out", &args.check_out)?;
        let nights = nights_between(check_in, check_out)?;
        let guests = positive_count("num_guests", args.num_guests)?;

        let request = ReservationRequest::new(args.hotel_id, nights, args.guest_name)
            .with_detail("check_in", args.check_in)
            .with_detail("check_out", args.check_out)
            .with_detail("num_guests", guests);

        let reservation = context.store.reserve(request).await?;
        Ok(booking_view(&reservation))
    }
}
