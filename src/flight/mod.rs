//! Sample flight-information service built on the RPC framework.

mod handlers;
mod service;

use std::sync::Arc;

pub use service::{Flight, FlightError, FlightService, MONITOR_POLL_INTERVAL};

use crate::handler::Dispatcher;

/// Build a dispatcher exposing every flight RPC method.
pub fn dispatcher(service: Arc<FlightService>) -> Dispatcher {
    Dispatcher::builder()
        .method("getFlight", handlers::get_flight(service.clone()))
        .method("addFlight", handlers::add_flight(service.clone()))
        .method("reserve", handlers::reserve(service.clone()))
        .method("findFlights", handlers::find_flights(service.clone()))
        .method("findDestinations", handlers::find_destinations(service.clone()))
        .method("monitorSeats", handlers::monitor_seats(service))
        .build()
}
