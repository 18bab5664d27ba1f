use std::fmt::Debug;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::ClinicAuthSource;
use crate::engine::{AvailabilityCalculator, Scheduler, SchedulerError};
use crate::grid;
use crate::model::*;
use crate::observability::{self, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, Command, DaySelector};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn ts(t: Instant) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

fn id(v: u64) -> i64 {
    v as i64
}

// ── Result shapes ────────────────────────────────────────────────

/// The row shape a command answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResultTable {
    Patients,
    Appointments,
    FreeSlots,
    Schedule,
    Blocks,
    Health,
}

impl ResultTable {
    fn of(cmd: &Command) -> Option<Self> {
        match cmd {
            Command::UpsertPatient { .. } | Command::SelectPatient { .. } => Some(Self::Patients),
            Command::SelectAppointments { .. }
            | Command::SelectAppointment { .. }
            | Command::Book { .. }
            | Command::Reschedule { .. } => Some(Self::Appointments),
            Command::SelectFreeSlots(_) => Some(Self::FreeSlots),
            Command::SelectSchedule { .. } => Some(Self::Schedule),
            Command::InsertBlock { .. } | Command::SelectBlocks { .. } => Some(Self::Blocks),
            Command::SelectHealth => Some(Self::Health),
            Command::Cancel { .. } | Command::DeleteBlock { .. } => None,
        }
    }

    /// Shape for a statement whose `$N` parameters are not bound yet.
    fn of_unbound(stmt: &str) -> Option<Self> {
        let probe = replace_placeholders(stmt, |_| "'0'".to_string());
        sql::parse_sql(&probe).ok().as_ref().and_then(Self::of)
    }

    fn columns(self) -> Vec<(&'static str, Type)> {
        match self {
            Self::Patients => vec![
                ("id", Type::INT8),
                ("phone", Type::VARCHAR),
                ("name", Type::VARCHAR),
                ("notes", Type::VARCHAR),
            ],
            Self::Appointments => vec![
                ("id", Type::INT8),
                ("patient_id", Type::INT8),
                ("start", Type::VARCHAR),
                ("end", Type::VARCHAR),
                ("note", Type::VARCHAR),
                ("created_at", Type::VARCHAR),
            ],
            Self::FreeSlots => vec![
                ("date", Type::VARCHAR),
                ("start", Type::VARCHAR),
                ("end", Type::VARCHAR),
                ("label", Type::VARCHAR),
            ],
            Self::Schedule => vec![
                ("start", Type::VARCHAR),
                ("end", Type::VARCHAR),
                ("state", Type::VARCHAR),
                ("ref_id", Type::INT8),
            ],
            Self::Blocks => vec![
                ("id", Type::INT8),
                ("start", Type::VARCHAR),
                ("end", Type::VARCHAR),
                ("reason", Type::VARCHAR),
            ],
            Self::Health => vec![
                ("ok", Type::BOOL),
                ("office_open", Type::VARCHAR),
                ("office_close", Type::VARCHAR),
            ],
        }
    }

    fn schema(self, format: &Format) -> Vec<FieldInfo> {
        self.columns()
            .into_iter()
            .enumerate()
            .map(|(idx, (name, ty))| {
                FieldInfo::new(name.to_string(), None, None, ty, format.format_for(idx))
            })
            .collect()
    }
}

fn query_response<T>(
    table: ResultTable,
    format: &Format,
    items: impl IntoIterator<Item = T>,
    encode: impl Fn(&mut DataRowEncoder, T) -> PgWireResult<()>,
) -> Response {
    let schema = Arc::new(table.schema(format));
    let rows: Vec<PgWireResult<_>> = items
        .into_iter()
        .map(|item| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder, item)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn encode_patient(e: &mut DataRowEncoder, p: Patient) -> PgWireResult<()> {
    e.encode_field(&id(p.id))?;
    e.encode_field(&p.phone)?;
    e.encode_field(&p.name)?;
    e.encode_field(&p.notes)
}

fn encode_appointment(e: &mut DataRowEncoder, a: Appointment) -> PgWireResult<()> {
    e.encode_field(&id(a.id))?;
    e.encode_field(&id(a.patient_id))?;
    e.encode_field(&ts(a.span.start))?;
    e.encode_field(&ts(a.span.end))?;
    e.encode_field(&a.note)?;
    e.encode_field(&ts(a.created_at))
}

fn encode_block(e: &mut DataRowEncoder, b: AvailabilityException) -> PgWireResult<()> {
    e.encode_field(&id(b.id))?;
    e.encode_field(&ts(b.span.start))?;
    e.encode_field(&ts(b.span.end))?;
    e.encode_field(&b.reason)
}

// ── Handler ──────────────────────────────────────────────────────

pub struct ClinicHandler {
    scheduler: Arc<Scheduler>,
    calculator: Arc<AvailabilityCalculator>,
    query_parser: Arc<ClinicQueryParser>,
}

impl ClinicHandler {
    pub fn new(scheduler: Arc<Scheduler>, calculator: Arc<AvailabilityCalculator>) -> Self {
        Self {
            scheduler,
            calculator,
            query_parser: Arc::new(ClinicQueryParser),
        }
    }

    async fn run(&self, query: &str, format: &Format) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = observability::command_label(&cmd);
        let started = std::time::Instant::now();
        let result = self.execute_command(cmd, format).await;
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        result
    }

    async fn execute_command(&self, cmd: Command, format: &Format) -> PgWireResult<Response> {
        let s = &self.scheduler;
        match cmd {
            Command::UpsertPatient { phone, name, notes } => {
                let patient = s
                    .upsert_patient(&phone, &name, notes.as_deref())
                    .await
                    .map_err(scheduler_err)?;
                Ok(query_response(ResultTable::Patients, format, [patient], encode_patient))
            }
            Command::SelectPatient { phone } => {
                let patient = s.get_patient(&phone).await.map_err(scheduler_err)?;
                Ok(query_response(ResultTable::Patients, format, [patient], encode_patient))
            }
            Command::SelectAppointments { phone } => {
                let list = s.appointments_for_phone(&phone).await.map_err(scheduler_err)?;
                Ok(query_response(ResultTable::Appointments, format, list, encode_appointment))
            }
            Command::SelectAppointment { id } => {
                let a = s.get_appointment(id).await.map_err(scheduler_err)?;
                Ok(query_response(ResultTable::Appointments, format, [a], encode_appointment))
            }
            Command::Book { phone, start, note } => {
                let start = grid::parse_instant(&start).map_err(scheduler_err)?;
                let a = s.book(&phone, start, note).await.map_err(scheduler_err)?;
                Ok(query_response(ResultTable::Appointments, format, [a], encode_appointment))
            }
            Command::Reschedule { id, start } => {
                let start = grid::parse_instant(&start).map_err(scheduler_err)?;
                let a = s.reschedule(id, start).await.map_err(scheduler_err)?;
                Ok(query_response(ResultTable::Appointments, format, [a], encode_appointment))
            }
            Command::Cancel { id } => {
                s.cancel(id).await.map_err(scheduler_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectFreeSlots(selector) => {
                let (date, slots) = match selector {
                    DaySelector::Date(date) => {
                        let date = grid::parse_date(&date).map_err(scheduler_err)?;
                        (date, self.calculator.free_slots(date).await.map_err(scheduler_err)?)
                    }
                    DaySelector::Weekday { name, reference } => {
                        let reference = reference
                            .as_deref()
                            .map(grid::parse_date)
                            .transpose()
                            .map_err(scheduler_err)?;
                        self.calculator
                            .free_slots_on(&name, reference)
                            .await
                            .map_err(scheduler_err)?
                    }
                };
                let day = date.format("%Y-%m-%d").to_string();
                Ok(query_response(ResultTable::FreeSlots, format, slots, |e, slot| {
                    e.encode_field(&day)?;
                    e.encode_field(&ts(slot.start))?;
                    e.encode_field(&ts(slot.end))?;
                    e.encode_field(&grid::slot_label(&slot))
                }))
            }
            Command::SelectSchedule { date } => {
                let date = grid::parse_date(&date).map_err(scheduler_err)?;
                let day = self.calculator.day_schedule(date).await.map_err(scheduler_err)?;
                Ok(query_response(ResultTable::Schedule, format, day, |e, slot| {
                    let (state, ref_id) = match slot.state {
                        SlotState::Free => ("free", None),
                        SlotState::Booked(a) => ("booked", Some(id(a))),
                        SlotState::Blocked(b) => ("blocked", Some(id(b))),
                    };
                    e.encode_field(&ts(slot.span.start))?;
                    e.encode_field(&ts(slot.span.end))?;
                    e.encode_field(&state.to_string())?;
                    e.encode_field(&ref_id)
                }))
            }
            Command::InsertBlock { start, end, reason } => {
                let start = grid::parse_instant(&start).map_err(scheduler_err)?;
                let end = grid::parse_instant(&end).map_err(scheduler_err)?;
                let b = s.block(start, end, reason).await.map_err(scheduler_err)?;
                Ok(query_response(ResultTable::Blocks, format, [b], encode_block))
            }
            Command::SelectBlocks { date } => {
                let date = grid::parse_date(&date).map_err(scheduler_err)?;
                let list = s.exceptions_on(date).await.map_err(scheduler_err)?;
                Ok(query_response(ResultTable::Blocks, format, list, encode_block))
            }
            Command::DeleteBlock { id } => {
                s.remove_exception(id).await.map_err(scheduler_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectHealth => {
                let h = s.health();
                Ok(query_response(ResultTable::Health, format, [h], |e, h| {
                    e.encode_field(&h.ok)?;
                    e.encode_field(&h.office_open.format("%H:%M").to_string())?;
                    e.encode_field(&h.office_close.format("%H:%M").to_string())
                }))
            }
        }
    }
}

#[async_trait]
impl SimpleQueryHandler for ClinicHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(vec![self.run(query, &Format::UnifiedText).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct ClinicQueryParser;

#[async_trait]
impl QueryParser for ClinicQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        let format = column_format.unwrap_or(&Format::UnifiedText);
        Ok(ResultTable::of_unbound(stmt).map_or_else(Vec::new, |t| t.schema(format)))
    }
}

#[async_trait]
impl ExtendedQueryHandler for ClinicHandler {
    type Statement = String;
    type QueryParser = ClinicQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        self.run(&sql, &portal.result_column_format).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        let fields = ResultTable::of_unbound(&target.statement)
            .map_or_else(Vec::new, |t| t.schema(&Format::UnifiedText));
        Ok(DescribeStatementResponse::new(param_types, fields))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let fields = ResultTable::of_unbound(&target.statement.statement)
            .map_or_else(Vec::new, |t| t.schema(&target.result_column_format));
        Ok(DescribePortalResponse::new(fields))
    }
}

/// Rewrite every `$N` outside string literals with `value(N)`.
fn replace_placeholders(sql: &str, mut value: impl FnMut(usize) -> String) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    let mut in_literal = false;
    while let Some((i, c)) = chars.next() {
        if c == '\'' {
            in_literal = !in_literal;
        }
        if c != '$' || in_literal {
            out.push(c);
            continue;
        }
        let digits_start = i + 1;
        let mut digits_end = digits_start;
        while let Some(&(j, d)) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            digits_end = j + 1;
            chars.next();
        }
        match sql[digits_start..digits_end].parse::<usize>() {
            Ok(n) => out.push_str(&value(n)),
            Err(_) => out.push_str(&sql[i..digits_end]),
        }
    }
    out
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql: &str) -> usize {
    let mut max = 0;
    replace_placeholders(sql, |n| {
        max = max.max(n);
        String::new()
    });
    max
}

/// Inline bound text-format parameters as SQL literals.
fn substitute_params(portal: &Portal<String>) -> String {
    let params = &portal.parameters;
    replace_placeholders(&portal.statement.statement, |n| {
        match n.checked_sub(1).and_then(|i| params.get(i)) {
            Some(Some(bytes)) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            _ => "NULL".to_string(),
        }
    })
}

// ── Factory ──────────────────────────────────────────────────────

pub struct ClinicFactory {
    handler: Arc<ClinicHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<ClinicAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl ClinicFactory {
    pub fn new(
        scheduler: Arc<Scheduler>,
        calculator: Arc<AvailabilityCalculator>,
        password: String,
    ) -> Self {
        Self {
            handler: Arc::new(ClinicHandler::new(scheduler, calculator)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                ClinicAuthSource::new(password),
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for ClinicFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    scheduler: Arc<Scheduler>,
    calculator: Arc<AvailabilityCalculator>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = Arc::new(ClinicFactory::new(scheduler, calculator, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn scheduler_err(e: SchedulerError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        e.code().into(),
        e.to_string(),
    )))
}

fn sql_err(e: sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
