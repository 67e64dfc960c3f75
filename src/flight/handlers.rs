//! Wire bindings for the flight service.
//!
//! Each RPC method gets a small handler that decodes its argument field
//! stream, calls into [`FlightService`], and encodes the result (or an
//! exception) back through the invocation. Unknown argument fields are
//! skipped so older servers tolerate newer clients.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{AppErrorKind, AppException, Result, RpcError};
use crate::handler::{BoxFuture, Invocation, Method};
use crate::protocol::{BinaryReader, BinaryWriter, WireType};

use super::service::{Flight, FlightError, FlightService};

impl Flight {
    /// Encode as a field stream: id@1, from@2, to@3, time@4,
    /// availableSeats@5, fare@6, then stop.
    pub fn write_fields(&self, w: &mut BinaryWriter) -> Result<()> {
        w.write_field_begin(WireType::String, 1);
        w.write_string(&self.id)?;
        w.write_field_begin(WireType::String, 2);
        w.write_string(&self.from)?;
        w.write_field_begin(WireType::String, 3);
        w.write_string(&self.to)?;
        w.write_field_begin(WireType::String, 4);
        w.write_string(&self.time)?;
        w.write_field_begin(WireType::I32, 5);
        w.write_i32(self.available_seats);
        w.write_field_begin(WireType::Float, 6);
        w.write_f32(self.fare);
        w.write_field_stop();
        Ok(())
    }

    pub fn read_fields(r: &mut BinaryReader) -> Result<Flight> {
        let mut flight = Flight {
            id: String::new(),
            from: String::new(),
            to: String::new(),
            time: String::new(),
            available_seats: 0,
            fare: 0.0,
        };
        loop {
            let (wire_type, id) = r.read_field_begin()?;
            match (id, wire_type) {
                (_, WireType::Stop) => break,
                (1, WireType::String) => flight.id = r.read_string()?,
                (2, WireType::String) => flight.from = r.read_string()?,
                (3, WireType::String) => flight.to = r.read_string()?,
                (4, WireType::String) => flight.time = r.read_string()?,
                (5, WireType::I32) => flight.available_seats = r.read_i32()?,
                (6, WireType::Float) => flight.fare = r.read_f32()?,
                (_, other) => r.skip(other)?,
            }
        }
        Ok(flight)
    }
}

fn read_string_field(r: &mut BinaryReader, want_id: i16, what: &str) -> Result<String> {
    let mut value = None;
    loop {
        let (wire_type, id) = r.read_field_begin()?;
        match (id, wire_type) {
            (_, WireType::Stop) => break,
            (id, WireType::String) if id == want_id => value = Some(r.read_string()?),
            (_, other) => r.skip(other)?,
        }
    }
    value.ok_or_else(|| RpcError::invalid_data(format!("missing {what} argument")))
}

struct ReserveArgs {
    flight_id: String,
    seats: i32,
}

impl ReserveArgs {
    fn read(r: &mut BinaryReader) -> Result<ReserveArgs> {
        let mut flight_id = None;
        let mut seats = None;
        loop {
            let (wire_type, id) = r.read_field_begin()?;
            match (id, wire_type) {
                (_, WireType::Stop) => break,
                (1, WireType::String) => flight_id = Some(r.read_string()?),
                (2, WireType::I32) => seats = Some(r.read_i32()?),
                (_, other) => r.skip(other)?,
            }
        }
        Ok(ReserveArgs {
            flight_id: flight_id
                .ok_or_else(|| RpcError::invalid_data("missing flight ID argument"))?,
            seats: seats.ok_or_else(|| RpcError::invalid_data("missing seat count argument"))?,
        })
    }
}

struct RouteArgs {
    from: String,
    to: String,
}

impl RouteArgs {
    fn read(r: &mut BinaryReader) -> Result<RouteArgs> {
        let mut from = None;
        let mut to = None;
        loop {
            let (wire_type, id) = r.read_field_begin()?;
            match (id, wire_type) {
                (_, WireType::Stop) => break,
                (1, WireType::String) => from = Some(r.read_string()?),
                (2, WireType::String) => to = Some(r.read_string()?),
                (_, other) => r.skip(other)?,
            }
        }
        Ok(RouteArgs {
            from: from.ok_or_else(|| RpcError::invalid_data("missing origin argument"))?,
            to: to.ok_or_else(|| RpcError::invalid_data("missing destination argument"))?,
        })
    }
}

struct MonitorArgs {
    flight_id: String,
    duration_ms: i32,
}

impl MonitorArgs {
    fn read(r: &mut BinaryReader) -> Result<MonitorArgs> {
        let mut flight_id = None;
        let mut duration_ms = None;
        loop {
            let (wire_type, id) = r.read_field_begin()?;
            match (id, wire_type) {
                (_, WireType::Stop) => break,
                (1, WireType::String) => flight_id = Some(r.read_string()?),
                (2, WireType::I32) => duration_ms = Some(r.read_i32()?),
                (_, other) => r.skip(other)?,
            }
        }
        Ok(MonitorArgs {
            flight_id: flight_id
                .ok_or_else(|| RpcError::invalid_data("missing flight ID argument"))?,
            duration_ms: duration_ms
                .ok_or_else(|| RpcError::invalid_data("missing duration argument"))?,
        })
    }
}

fn service_exception(method: &str, err: &FlightError) -> AppException {
    AppException::new(
        AppErrorKind::InternalError,
        format!("internal server error processing {method}: {err}"),
    )
}

async fn reply_string_list(mut inv: Invocation, items: &[String]) -> Result<()> {
    inv.write_reply_begin()?;
    inv.writer().write_field_begin(WireType::List, 1);
    inv.writer().write_list_begin(WireType::String, items.len())?;
    for item in items {
        inv.writer().write_string(item)?;
    }
    inv.writer().write_field_stop();
    inv.flush().await
}

/// Handler for `getFlight`: flight ID in, flight struct at field 1 out.
pub fn get_flight(service: Arc<FlightService>) -> impl Method {
    move |mut inv: Invocation| -> BoxFuture<'static, Result<()>> {
        let service = service.clone();
        Box::pin(async move {
            let id = read_string_field(inv.reader(), 1, "flight ID")?;
            match service.get(&id).await {
                Ok(flight) => {
                    inv.write_reply_begin()?;
                    inv.writer().write_field_begin(WireType::Struct, 1);
                    flight.write_fields(inv.writer())?;
                    inv.writer().write_field_stop();
                    inv.flush().await
                }
                Err(e) => inv.reply_exception(&service_exception("getFlight", &e)).await,
            }
        })
    }
}

/// Handler for `addFlight`: the six flight fields flat in the argument
/// stream (same IDs and types as the flight struct), empty reply out.
pub fn add_flight(service: Arc<FlightService>) -> impl Method {
    move |mut inv: Invocation| -> BoxFuture<'static, Result<()>> {
        let service = service.clone();
        Box::pin(async move {
            let flight = Flight::read_fields(inv.reader())?;
            if flight.id.is_empty() {
                return Err(RpcError::invalid_data("missing flight ID argument"));
            }
            match service.add(flight).await {
                Ok(()) => inv.reply_empty().await,
                Err(e) => inv.reply_exception(&service_exception("addFlight", &e)).await,
            }
        })
    }
}

/// Handler for `reserve`: flight ID and seat count in, empty reply out.
pub fn reserve(service: Arc<FlightService>) -> impl Method {
    move |mut inv: Invocation| -> BoxFuture<'static, Result<()>> {
        let service = service.clone();
        Box::pin(async move {
            let args = ReserveArgs::read(inv.reader())?;
            match service.reserve(&args.flight_id, args.seats).await {
                Ok(()) => inv.reply_empty().await,
                Err(e) => inv.reply_exception(&service_exception("reserve", &e)).await,
            }
        })
    }
}

/// Handler for `findFlights`: origin and destination in, non-empty list of
/// flight numbers out. No match replies with an exception, never an empty
/// list.
pub fn find_flights(service: Arc<FlightService>) -> impl Method {
    move |mut inv: Invocation| -> BoxFuture<'static, Result<()>> {
        let service = service.clone();
        Box::pin(async move {
            let args = RouteArgs::read(inv.reader())?;
            match service.find_route(&args.from, &args.to).await {
                Ok(ids) => reply_string_list(inv, &ids).await,
                Err(e) => inv.reply_exception(&service_exception("findFlights", &e)).await,
            }
        })
    }
}

/// Handler for `findDestinations`: origin in, deduplicated non-empty list
/// of destinations out. No match replies with an exception.
pub fn find_destinations(service: Arc<FlightService>) -> impl Method {
    move |mut inv: Invocation| -> BoxFuture<'static, Result<()>> {
        let service = service.clone();
        Box::pin(async move {
            let from = read_string_field(inv.reader(), 1, "origin")?;
            match service.destinations_from(&from).await {
                Ok(dests) => reply_string_list(inv, &dests).await,
                Err(e) => {
                    inv.reply_exception(&service_exception("findDestinations", &e)).await
                }
            }
        })
    }
}

/// Handler for `monitorSeats`, the server-push subscription. The worker
/// stays alive for the whole subscription, so a draining server waits for
/// open monitors too.
pub fn monitor_seats(service: Arc<FlightService>) -> impl Method {
    move |mut inv: Invocation| -> BoxFuture<'static, Result<()>> {
        let service = service.clone();
        Box::pin(async move {
            let args = MonitorArgs::read(inv.reader())?;
            info!(
                peer = %inv.peer(),
                flight = %args.flight_id,
                duration_ms = args.duration_ms,
                "monitor opened"
            );
            run_monitor(service, inv, args).await
        })
    }
}

async fn run_monitor(
    service: Arc<FlightService>,
    mut inv: Invocation,
    args: MonitorArgs,
) -> Result<()> {
    let (mut seats_rx, mut err_rx) = service.monitor_seats(args.flight_id, args.duration_ms);
    let mut shutdown = inv.shutdown();
    let mut seats_open = true;
    let mut errs_open = true;

    while seats_open || errs_open {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            seats = seats_rx.recv(), if seats_open => {
                match seats {
                    Some(count) => {
                        debug!(peer = %inv.peer(), count, "pushing seat update");
                        inv.write_reply_begin()?;
                        inv.writer().write_field_begin(WireType::I32, 1);
                        inv.writer().write_i32(count);
                        inv.writer().write_field_stop();
                        inv.flush().await?;
                    }
                    None => seats_open = false,
                }
            }
            err = err_rx.recv(), if errs_open => {
                match err {
                    Some(e) => {
                        let exc = service_exception("monitorSeats", &e);
                        inv.reply_exception(&exc).await?;
                        return Ok(());
                    }
                    None => errs_open = false,
                }
            }
        }
    }

    info!(peer = %inv.peer(), "monitor closing");
    inv.reply_exception(&AppException::new(AppErrorKind::Unknown, "closing"))
        .await
}
