//! In-memory flight store and the seat-monitoring poller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// How often an open monitor re-reads the seat count.
pub const MONITOR_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One flight record.
#[derive(Debug, Clone, PartialEq)]
pub struct Flight {
    pub id: String,
    pub from: String,
    pub to: String,
    pub time: String,
    pub available_seats: i32,
    pub fare: f32,
}

/// Domain failures, carried to clients as exception messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlightError {
    #[error("flight not found")]
    NotFound,
    #[error("duplicate flight number found")]
    Duplicate,
    #[error("flight doesn't have enough available seats")]
    NotEnoughSeats,
}

/// Thread-safe flight database keyed by flight number.
#[derive(Default)]
pub struct FlightService {
    flights: RwLock<HashMap<String, Flight>>,
}

impl FlightService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, flight: Flight) -> Result<(), FlightError> {
        let mut flights = self.flights.write().await;
        if flights.contains_key(&flight.id) {
            return Err(FlightError::Duplicate);
        }
        debug!(id = %flight.id, "flight added");
        flights.insert(flight.id.clone(), flight);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Flight, FlightError> {
        if id.is_empty() {
            return Err(FlightError::NotFound);
        }
        let flights = self.flights.read().await;
        flights.get(id).cloned().ok_or(FlightError::NotFound)
    }

    /// Decrement the seat count, failing if fewer than `seats` remain.
    pub async fn reserve(&self, id: &str, seats: i32) -> Result<(), FlightError> {
        let mut flights = self.flights.write().await;
        let flight = flights.get_mut(id).ok_or(FlightError::NotFound)?;
        if flight.available_seats < seats {
            return Err(FlightError::NotEnoughSeats);
        }
        flight.available_seats -= seats;
        debug!(id, seats, remaining = flight.available_seats, "seats reserved");
        Ok(())
    }

    /// Flight numbers serving the given route, in unspecified order.
    /// An empty match is NotFound, never an empty list.
    pub async fn find_route(&self, from: &str, to: &str) -> Result<Vec<String>, FlightError> {
        let flights = self.flights.read().await;
        let ids: Vec<String> = flights
            .values()
            .filter(|f| f.from == from && f.to == to)
            .map(|f| f.id.clone())
            .collect();
        if ids.is_empty() {
            return Err(FlightError::NotFound);
        }
        Ok(ids)
    }

    /// Distinct destinations reachable from `from`, in unspecified order.
    /// An empty match is NotFound, never an empty list.
    pub async fn destinations_from(&self, from: &str) -> Result<Vec<String>, FlightError> {
        let flights = self.flights.read().await;
        let mut out: Vec<String> = Vec::new();
        for f in flights.values() {
            if f.from == from && !out.contains(&f.to) {
                out.push(f.to.clone());
            }
        }
        if out.is_empty() {
            return Err(FlightError::NotFound);
        }
        Ok(out)
    }

    /// Watch a flight's seat count for `duration_ms` milliseconds.
    ///
    /// The first poll only records the current count; each later poll that
    /// observes a different count pushes the new value on the seats channel.
    /// A lookup failure goes out on the error channel and ends the watch.
    /// Both channels close when the duration elapses or the watch dies, so
    /// the receiving side can treat channel closure as the end of the
    /// subscription. A subscriber that drops both receivers stops the
    /// poller on its next tick.
    pub fn monitor_seats(
        self: &Arc<Self>,
        id: String,
        duration_ms: i32,
    ) -> (mpsc::Receiver<i32>, mpsc::Receiver<FlightError>) {
        let (seats_tx, seats_rx) = mpsc::channel(16);
        let (err_tx, err_rx) = mpsc::channel(1);
        let service = Arc::clone(self);

        tokio::spawn(async move {
            let deadline = Instant::now() + Duration::from_millis(duration_ms.max(0) as u64);
            let expiry = sleep_until(deadline);
            tokio::pin!(expiry);

            let mut prev = match service.get(&id).await {
                Ok(flight) => flight.available_seats,
                Err(e) => {
                    let _ = err_tx.send(e).await;
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = &mut expiry => {
                        debug!(id, "monitor expired");
                        return;
                    }
                    _ = tokio::time::sleep(MONITOR_POLL_INTERVAL) => {}
                }

                // The subscriber is gone; stop polling the store.
                if seats_tx.is_closed() && err_tx.is_closed() {
                    debug!(id, "monitor abandoned");
                    return;
                }

                match service.get(&id).await {
                    Ok(flight) => {
                        if flight.available_seats != prev {
                            prev = flight.available_seats;
                            if seats_tx.send(prev).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = err_tx.send(e).await;
                        return;
                    }
                }
            }
        });

        (seats_rx, err_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flight(id: &str, from: &str, to: &str, seats: i32) -> Flight {
        Flight {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            time: "1200".to_string(),
            available_seats: seats,
            fare: 99.5,
        }
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let svc = FlightService::new();
        svc.add(flight("SQ001", "SIN", "NRT", 100)).await.unwrap();
        let got = svc.get("SQ001").await.unwrap();
        assert_eq!(got.to, "NRT");
        assert_eq!(got.available_seats, 100);
    }

    #[tokio::test]
    async fn test_duplicate_add_rejected() {
        let svc = FlightService::new();
        svc.add(flight("SQ001", "SIN", "NRT", 100)).await.unwrap();
        let err = svc.add(flight("SQ001", "SIN", "SYD", 50)).await.unwrap_err();
        assert_eq!(err, FlightError::Duplicate);
    }

    #[tokio::test]
    async fn test_get_empty_id_is_not_found() {
        let svc = FlightService::new();
        assert_eq!(svc.get("").await.unwrap_err(), FlightError::NotFound);
    }

    #[tokio::test]
    async fn test_reserve_exhaustion_leaves_count_untouched() {
        let svc = FlightService::new();
        svc.add(flight("SQ001", "SIN", "NRT", 5)).await.unwrap();
        let err = svc.reserve("SQ001", 10).await.unwrap_err();
        assert_eq!(err, FlightError::NotEnoughSeats);
        assert_eq!(svc.get("SQ001").await.unwrap().available_seats, 5);

        svc.reserve("SQ001", 5).await.unwrap();
        assert_eq!(svc.get("SQ001").await.unwrap().available_seats, 0);
    }

    #[tokio::test]
    async fn test_find_route_and_destinations() {
        let svc = FlightService::new();
        svc.add(flight("SQ001", "SIN", "NRT", 10)).await.unwrap();
        svc.add(flight("SQ002", "SIN", "NRT", 10)).await.unwrap();
        svc.add(flight("SQ003", "SIN", "SYD", 10)).await.unwrap();
        svc.add(flight("SQ004", "NRT", "SIN", 10)).await.unwrap();

        let mut route = svc.find_route("SIN", "NRT").await.unwrap();
        route.sort();
        assert_eq!(route, vec!["SQ001", "SQ002"]);

        let mut dests = svc.destinations_from("SIN").await.unwrap();
        dests.sort();
        assert_eq!(dests, vec!["NRT", "SYD"]);
    }

    #[tokio::test]
    async fn test_search_without_match_is_not_found() {
        let svc = FlightService::new();
        svc.add(flight("SQ001", "SIN", "NRT", 10)).await.unwrap();

        assert_eq!(
            svc.find_route("SYD", "SIN").await.unwrap_err(),
            FlightError::NotFound
        );
        assert_eq!(
            svc.destinations_from("CDG").await.unwrap_err(),
            FlightError::NotFound
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_pushes_only_changes() {
        let svc = Arc::new(FlightService::new());
        svc.add(flight("SQ001", "SIN", "NRT", 10)).await.unwrap();

        let (mut seats_rx, mut err_rx) = svc.monitor_seats("SQ001".to_string(), 3000);

        // No change during the first poll windows.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(seats_rx.try_recv().is_err());

        svc.reserve("SQ001", 3).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(seats_rx.recv().await, Some(7));

        // Expiry closes both channels.
        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(seats_rx.recv().await, None);
        assert_eq!(err_rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stops_when_receivers_drop() {
        let svc = Arc::new(FlightService::new());
        svc.add(flight("SQ001", "SIN", "NRT", 10)).await.unwrap();

        let (seats_rx, err_rx) = svc.monitor_seats("SQ001".to_string(), 60_000);
        drop(seats_rx);
        drop(err_rx);

        // The poller notices the dropped receivers on its next tick and
        // releases its service handle long before the deadline.
        tokio::time::sleep(MONITOR_POLL_INTERVAL * 3).await;
        assert_eq!(Arc::strong_count(&svc), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_unknown_flight_reports_error() {
        let svc = Arc::new(FlightService::new());
        let (mut seats_rx, mut err_rx) = svc.monitor_seats("NOPE".to_string(), 1000);
        assert_eq!(err_rx.recv().await, Some(FlightError::NotFound));
        assert_eq!(seats_rx.recv().await, None);
    }
}
