use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "slotchain_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "slotchain_query_duration_seconds";

/// Counter: booking attempts by outcome (`confirmed` or an error kind).
pub const BOOKINGS_TOTAL: &str = "slotchain_bookings_total";

/// Histogram: time from first slot listing to confirmation or failure.
pub const BOOKING_DURATION_SECONDS: &str = "slotchain_booking_duration_seconds";

/// Counter: atomic slot claims. Labels: outcome (claimed, unavailable).
pub const CLAIMS_TOTAL: &str = "slotchain_claims_total";

/// Counter: chains rolled back after a failed claim.
pub const COMPENSATIONS_TOTAL: &str = "slotchain_compensations_total";

/// Counter: reservations compensation gave up on (need manual release).
pub const COMPENSATION_FAILURES_TOTAL: &str = "slotchain_compensation_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "slotchain_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "slotchain_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "slotchain_connections_rejected_total";

/// Gauge: number of loaded providers.
pub const TENANTS_ACTIVE: &str = "slotchain_tenants_active";

/// Counter: admin-only commands refused to a customer session.
pub const AUTH_FAILURES_TOTAL: &str = "slotchain_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotchain_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotchain_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::SelectSlots { .. } => "select_slots",
        Command::SelectStarts { .. } => "select_starts",
        Command::SelectServices => "select_services",
        Command::InsertBooking { .. } => "insert_booking",
        Command::InsertReservation { .. } => "insert_reservation",
        Command::InsertSlot { .. } => "insert_slot",
        Command::DeleteSlot { .. } => "delete_slot",
        Command::SelectReservations { .. } => "select_reservations",
        Command::DeleteReservation { .. } => "delete_reservation",
        Command::SelectWorkPlan { .. } => "select_work_plan",
        Command::InsertWorkPlan { .. } => "insert_work_plan",
        Command::GenerateSlots { .. } => "generate_slots",
        Command::InsertService { .. } => "insert_service",
        Command::DeleteService { .. } => "delete_service",
    }
}
