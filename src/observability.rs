use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "clinicslot_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "clinicslot_query_duration_seconds";

/// Counter: mutations the scheduler refused. Labels: op, kind.
pub const SCHEDULING_REJECTIONS_TOTAL: &str = "clinicslot_scheduling_rejections_total";

// ── USE metrics (resource utilization) ──────────────────────────

pub const CONNECTIONS_ACTIVE: &str = "clinicslot_connections_active";

pub const CONNECTIONS_TOTAL: &str = "clinicslot_connections_total";

/// Counter: connections turned away at the limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "clinicslot_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "clinicslot_wal_flush_duration_seconds";

/// Histogram: mutations per group-commit flush.
pub const WAL_FLUSH_BATCH_SIZE: &str = "clinicslot_wal_flush_batch_size";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "clinicslot_wal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("metrics exporter not installed: {e}"),
    }
}

/// Short label for a command, used on query metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::UpsertPatient { .. } => "upsert_patient",
        Command::SelectPatient { .. } => "select_patient",
        Command::SelectAppointments { .. } => "select_appointments",
        Command::SelectAppointment { .. } => "select_appointment",
        Command::Book { .. } => "book",
        Command::Reschedule { .. } => "reschedule",
        Command::Cancel { .. } => "cancel",
        Command::SelectFreeSlots(_) => "select_free_slots",
        Command::SelectSchedule { .. } => "select_schedule",
        Command::InsertBlock { .. } => "insert_block",
        Command::SelectBlocks { .. } => "select_blocks",
        Command::DeleteBlock { .. } => "delete_block",
        Command::SelectHealth => "select_health",
    }
}
