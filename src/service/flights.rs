//! Flight booking service.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::inventory::{CatalogItem, InventoryStore, Reservation, ReservationRequest};
use crate::protocol::{OperationSpec, ParameterType};

use super::operations::{
    attribute, detail, parse_args, parse_date, parse_upcoming_date, positive_count,
    CancelReservation, ItemDetails, ReservationLookup,
};
use super::{Operation, OperationContext, ResourceService};

/// Service name advertised in the manifest.
pub const FLIGHT_AGENT: &str = "FlightBookingAgent";

/// Build the flight service over the seeded catalog.
pub fn flight_service() -> ResourceService {
    flight_service_with(seed_flights())
}

/// Build the flight service over a custom catalog.
pub fn flight_service_with(flights: Vec<CatalogItem>) -> ResourceService {
    let store = InventoryStore::new("FLT", 5000, flights);

    ResourceService::new(FLIGHT_AGENT, "1.0", store)
        .with_operation(SearchFlights)
        .with_operation(ItemDetails {
            spec: OperationSpec::new(
                "get_flight_details",
                "Get detailed information about a specific flight",
            )
            .required(
                "flight_id",
                ParameterType::String,
                "The unique identifier of the flight",
            ),
            id_param: "flight_id",
            noun: "Flight",
            view: flight_view,
        })
        .with_operation(BookFlight)
        .with_operation(ReservationLookup {
            spec: OperationSpec::new(
                "get_flight_booking_status",
                "Check the status of an existing flight booking",
            )
            .required(
                "booking_reference",
                ParameterType::String,
                "The flight booking reference number",
            ),
            ref_param: "booking_reference",
            view: ticket_view,
        })
        .with_operation(CancelReservation {
            spec: OperationSpec::new(
                "cancel_flight_booking",
                "Cancel an existing flight booking",
            )
            .required(
                "booking_reference",
                ParameterType::String,
                "The flight booking reference number to cancel",
            ),
            ref_param: "booking_reference",
            view: ticket_view,
        })
}

/// A flight catalog entry.
pub fn flight(
    id: &str,
    airline: &str,
    flight_number: &str,
    route: (&str, &str),
    times: (&str, &str),
    price: u32,
    seats: u32,
) -> CatalogItem {
    let (origin, destination) = route;
    CatalogItem::new(id, airline, format!("{} - {}", origin, destination), price, seats)
        .with_class("Economy")
        .with_attribute("flight_number", flight_number)
        .with_attribute("origin", origin)
        .with_attribute("destination", destination)
        .with_attribute("departure_time", times.0)
        .with_attribute("arrival_time", times.1)
}

/// The demo flight catalog.
pub fn seed_flights() -> Vec<CatalogItem> {
    vec![
        flight("FL001", "Luftansa", "CJ201", ("Frankfurt", "Bangalore"), ("18:00", "20:30"), 220, 30),
        flight("FL002", "Luftansa", "CJ202", ("Bangalore", "Frankfurt"), ("14:00", "17:30"), 180, 30),
        flight("FL003", "SkyHigh Airlines", "SH305", ("Bangalore", "Chicago"), ("09:30", "13:00"), 320, 40),
        flight("FL004", "Premier Air", "PA450", ("Chicago", "Bangalore"), ("06:00", "09:15"), 200, 25),
        flight("FL005", "CloudJet", "CJ678", ("Mumbai", "Chicago"), ("15:45", "19:30"), 290, 35),
        flight("FL006", "CloudJet", "CJ777", ("Chicago", "Mumbai"), ("15:45", "19:30"), 310, 35),
    ]
}

fn flight_view(item: &CatalogItem) -> Value {
    json!({
        "flight_id": item.id,
        "airline": item.name,
        "flight_number": attribute(item, "flight_number"),
        "origin": attribute(item, "origin"),
        "destination": attribute(item, "destination"),
        "departure_time": attribute(item, "departure_time"),
        "arrival_time": attribute(item, "arrival_time"),
        "price": item.unit_price,
        "available_seats": item.available_quantity,
        "class": item.class,
    })
}

fn ticket_view(reservation: &Reservation) -> Value {
    json!({
        "booking_reference": reservation.reference,
        "flight_id": reservation.item_id,
        "airline": reservation.item_name,
        "flight_number": detail(reservation, "flight_number"),
        "origin": detail(reservation, "origin"),
        "destination": detail(reservation, "destination"),
        "passenger_name": reservation.requester,
        "passenger_email": reservation.contact,
        "travel_date": detail(reservation, "travel_date"),
        "num_passengers": reservation.quantity,
        "price_per_ticket": reservation.unit_price,
        "total_cost": reservation.total_cost,
        "status": reservation.status,
        "booked_at": reservation.created_at.to_rfc3339(),
    })
}

/// Search flights by route and price.
pub struct SearchFlights;

#[derive(Debug, Deserialize)]
struct SearchFlightsArgs {
    origin: String,
    destination: String,
    travel_date: Option<String>,
    max_price: Option<f64>,
}

#[async_trait::async_trait]
impl Operation for SearchFlights {
    fn spec(&self) -> OperationSpec {
        OperationSpec::new(
            "search_flights",
            "Search for available flights based on origin, destination, date, and price criteria",
        )
        .required("origin", ParameterType::String, "Departure city")
        .required("destination", ParameterType::String, "Arrival city")
        .optional(
            "travel_date",
            ParameterType::String,
            "Travel date in YYYY-MM-DD format",
        )
        .optional("max_price", ParameterType::Number, "Maximum ticket price in USD")
    }

    async fn execute(
        &self,
        arguments: Map<String, Value>,
        context: &OperationContext,
    ) -> Result<Value> {
        let args: SearchFlightsArgs = parse_args(arguments)?;
        if let Some(date) = &args.travel_date {
            parse_date("travel_date", date)?;
        }

        let origin = args.origin.to_lowercase();
        let destination = args.destination.to_lowercase();
        let route_matches = |item: &CatalogItem, key: &str, wanted: &str| {
            item.attribute_str(key)
                .is_some_and(|v| v.to_lowercase().contains(wanted))
        };

        let flights = context
            .store
            .search(|item| {
                route_matches(item, "origin", &origin)
                    && route_matches(item, "destination", &destination)
                    && args
                        .max_price
                        .map_or(true, |max| f64::from(item.unit_price) <= max)
            })
            .await;

        let views: Vec<_> = flights.iter().map(flight_view).collect();
        Ok(json!({
            "count": views.len(),
            "flights": views,
            "travel_date": args.travel_date.as_deref().unwrap_or("Not specified"),
        }))
    }
}

/// Book seats; the reserved quantity is the passenger count.
pub struct BookFlight;

#[derive(Debug, Deserialize)]
struct BookFlightArgs {
    flight_id: String,
    passenger_name: String,
    travel_date: String,
    num_passengers: i64,
    passenger_email: String,
}

#[async_trait::async_trait]
impl Operation for BookFlight {
    fn spec(&self) -> OperationSpec {
        OperationSpec::new("book_flight", "Book a flight ticket for a passenger")
            .required("flight_id", ParameterType::String, "The flight ID to book")
            .required("passenger_name", ParameterType::String, "Name of the passenger")
            .required(
                "travel_date",
                ParameterType::String,
                "Travel date in YYYY-MM-DD format",
            )
            .required("num_passengers", ParameterType::Integer, "Number of passengers")
            .required(
                "passenger_email",
                ParameterType::String,
                "Email address for booking confirmation",
            )
    }

    async fn execute(
        &self,
        arguments: Map<String, Value>,
        context: &OperationContext,
    ) -> Result<Value> {
        let args: BookFlightArgs = parse_args(arguments)?;

        parse_upcoming_date("travel_date", &args.travel_date, context.today)?;
        let passengers = positive_count("num_passengers", args.num_passengers)?;

        // Route details are copied onto the ticket so it stays readable on its own.
        let item = context.store.item(&args.flight_id).await?;
        let request = ReservationRequest::new(args.flight_id, passengers, args.passenger_name)
            .with_contact(args.passenger_email)
            .with_detail("travel_date", args.travel_date)
            .with_detail("flight_number", attribute(&item, "flight_number"))
            .with_detail("origin", attribute(&item, "origin"))
            .with_detail("destination", attribute(&item, "destination"));

        let reservation = context.store.reserve(request).await?;
        Ok(ticket_view(&reservation))
    }
}
