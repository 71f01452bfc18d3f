use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use itinerary_mesh::server::serve_with_shutdown;
use itinerary_mesh::service::{flight_service, hotel_service, ResourceService};
use itinerary_mesh::{
    CapabilityRegistry, DispatchRouter, Endpoint, ErrorKind, HttpTransport, ServiceTransport,
};

struct Running {
    endpoint: Endpoint,
    stop: oneshot::Sender<()>,
    task: JoinHandle<itinerary_mesh::Result<()>>,
}

async fn spawn(service: ResourceService) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = Endpoint::new(format!("http://{}", listener.local_addr().unwrap()));
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(serve_with_shutdown(listener, Arc::new(service), async move {
        let _ = stopped.await;
    }));
    Running {
        endpoint,
        stop,
        task,
    }
}

fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_discover_and_dispatch_over_http() {
    let hotel_server = spawn(hotel_service()).await;
    let flight_server = spawn(flight_service()).await;
    let hotels = hotel_server.endpoint.clone();
    let flights = flight_server.endpoint.clone();
    let transport: Arc<dyn ServiceTransport> =
        Arc::new(HttpTransport::new(Duration::from_secs(5)).unwrap());

    let registry =
        CapabilityRegistry::discover_all(transport.as_ref(), &[hotels.clone(), flights.clone()])
            .await;
    assert_eq!(registry.online().count(), 2);
    assert_eq!(registry.operations().len(), 10);

    let router = DispatchRouter::new(registry, transport, Duration::from_secs(5));

    let booked = router
        .dispatch(
            "book_flight",
            args(json!({
                "flight_id": "FL003",
                "passenger_name": "Ada Lovelace",
                "passenger_email": "ada@example.com",
                "travel_date": "2099-05-01",
                "num_passengers": 2
            })),
        )
        .await;
    assert!(booked.success, "{:?}", booked);
    let reference = booked.result.unwrap()["booking_reference"].clone();
    assert_eq!(reference, "FLT5000");

    let details = router
        .dispatch("get_flight_details", args(json!({"flight_id": "FL003"})))
        .await;
    assert_eq!(details.result.unwrap()["available_seats"], 38);

    let missing = router
        .dispatch("get_hotel_details", args(json!({"hotel_id": "42"})))
        .await;
    assert_eq!(missing.error_kind, Some(ErrorKind::NotFound));

    let stats = router.stats().await;
    assert_eq!(stats[&flights].successful_requests, 2);
    assert_eq!(stats[&hotels].successful_requests, 1);

    let _ = hotel_server.stop.send(());
    let _ = flight_server.stop.send(());
}

#[tokio::test]
async fn test_stopped_service_is_unreachable() {
    let server = spawn(hotel_service()).await;
    let transport: Arc<dyn ServiceTransport> =
        Arc::new(HttpTransport::new(Duration::from_secs(2)).unwrap());
    let registry =
        CapabilityRegistry::discover_all(transport.as_ref(), &[server.endpoint.clone()]).await;
    assert_eq!(registry.online().count(), 1);
    let router = DispatchRouter::new(registry, transport, Duration::from_secs(2));

    let _ = server.stop.send(());
    server.task.await.unwrap().unwrap();

    let envelope = router.dispatch("search_hotels", Map::new()).await;
    assert_eq!(envelope.error_kind, Some(ErrorKind::Unreachable));
    assert!(envelope.is_retriable());
}
