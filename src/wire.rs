use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::messages::data::DataRow;
use pgwire::tokio::TlsAcceptor;
use serde_json::json;
use tokio::net::TcpStream;

use crate::auth::{Credentials, SlotchainAuthSource};
use crate::booking::{BookingConfirmation, BookingError, ChainRequest, SlotRequest};
use crate::engine::{EngineError, workplan};
use crate::model::*;
use crate::observability::{self, AUTH_FAILURES_TOTAL, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, Command, SqlError};
use crate::tenant::{Tenant, TenantManager};

pub struct SlotchainHandler {
    tenant_manager: Arc<TenantManager>,
    credentials: Credentials,
    query_parser: Arc<SlotchainQueryParser>,
}

impl SlotchainHandler {
    pub fn new(tenant_manager: Arc<TenantManager>, credentials: Credentials) -> Self {
        Self {
            tenant_manager,
            credentials,
            query_parser: Arc::new(SlotchainQueryParser),
        }
    }

    fn resolve_tenant<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Tenant>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager
            .get_or_create(&db)
            .map_err(|e| user_error("08006", format!("tenant error: {e}")))
    }

    fn is_admin<C: ClientInfo>(&self, client: &C) -> bool {
        self.credentials
            .is_admin(client.metadata().get("user").map(String::as_str))
    }

    /// Parse, authorize, execute and record metrics for one statement.
    async fn run<C: ClientInfo>(&self, client: &C, query: &str) -> PgWireResult<Vec<Response>> {
        let tenant = self.resolve_tenant(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let admin = self.is_admin(client);
        if cmd.requires_admin() && !admin {
            metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
            return Err(user_error(
                "42501",
                format!("{} requires the admin user", observability::command_label(&cmd)),
            ));
        }

        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(&tenant, cmd, admin).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(
        &self,
        tenant: &Tenant,
        cmd: Command,
        admin: bool,
    ) -> PgWireResult<Vec<Response>> {
        let engine = &tenant.engine;
        match cmd {
            Command::SelectSlots { date } => {
                let slots = engine.list_slots(date).await;
                rows(slot_schema(), slots.iter(), encode_slot)
            }
            Command::SelectStarts { date, length } => {
                let starts = tenant
                    .booking
                    .available_starts(date, length)
                    .await
                    .map_err(booking_err)?;
                rows(starts_schema(), starts.iter(), |enc, start| {
                    enc.encode_field(&date.to_string())?;
                    enc.encode_field(&start.to_string())
                })
            }
            Command::SelectServices => {
                let services: Vec<Service> = engine
                    .list_services()
                    .into_iter()
                    .filter(|s| admin || s.active)
                    .collect();
                rows(service_schema(), services.iter(), encode_service)
            }
            Command::InsertBooking {
                date,
                start,
                length,
                customer,
                token,
            } => {
                let confirmation = tenant
                    .booking
                    .book_chain(ChainRequest {
                        date,
                        start,
                        length,
                        customer,
                        token,
                    })
                    .await
                    .map_err(booking_err)?;
                confirmation_response(&confirmation)
            }
            Command::InsertReservation {
                slot_id,
                customer,
                token,
            } => {
                let confirmation = tenant
                    .booking
                    .book_slot(SlotRequest {
                        slot_id,
                        customer,
                        token,
                    })
                    .await
                    .map_err(booking_err)?;
                confirmation_response(&confirmation)
            }
            Command::InsertSlot {
                date,
                time,
                capacity,
                withdrawn,
            } => {
                let slot = engine
                    .upsert_slot(date, time, capacity, withdrawn)
                    .await
                    .map_err(engine_err)?;
                rows(slot_schema(), std::iter::once(&slot), encode_slot)
            }
            Command::DeleteSlot { date, time } => {
                let deleted = engine.delete_slot(date, time).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(usize::from(deleted)))])
            }
            Command::SelectReservations { date } => {
                let reservations = engine.list_reservations(date).await;
                rows(reservation_schema(), reservations.iter(), encode_reservation)
            }
            Command::DeleteReservation { id } => {
                let released = engine.release_reservation(id).await.map_err(engine_err)?;
                if released {
                    tracing::info!(%id, "reservation released by admin");
                }
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(usize::from(released)))])
            }
            Command::SelectWorkPlan { date } => {
                let plan = engine.get_work_plan(date).await;
                rows(work_plan_schema(), plan.iter(), |enc, plan| {
                    enc.encode_field(&date.to_string())?;
                    enc.encode_field(&plan.format_windows())?;
                    enc.encode_field(&i64::from(plan.slot_len))?;
                    enc.encode_field(&i64::from(plan.break_min))
                })
            }
            Command::InsertWorkPlan { date, plan } => {
                engine.save_work_plan(date, plan).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::GenerateSlots {
                date,
                plan,
                capacity,
            } => {
                let plan = match plan {
                    Some(plan) => plan,
                    None => engine.get_work_plan(date).await.ok_or_else(|| {
                        user_error("22023", format!("no work plan saved for {date}"))
                    })?,
                };
                let written = workplan::generate(engine.as_ref(), date, &plan, capacity)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(written))])
            }
            Command::InsertService {
                name,
                duration_min,
                active,
            } => {
                let service = engine
                    .create_service(name, duration_min, active)
                    .await
                    .map_err(engine_err)?;
                rows(service_schema(), std::iter::once(&service), encode_service)
            }
            Command::DeleteService { id } => {
                let deleted = engine.delete_service(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(usize::from(deleted)))])
            }
        }
    }
}

// ── Result sets ──────────────────────────────────────────────────

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn bool_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::BOOL, FieldFormat::Text)
}

fn slot_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("date"),
        text_field("time"),
        int_field("capacity"),
        int_field("booked"),
        bool_field("locked"),
    ]
}

fn starts_schema() -> Vec<FieldInfo> {
    vec![text_field("date"), text_field("start")]
}

fn service_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("name"),
        int_field("duration_min"),
        bool_field("active"),
    ]
}

fn reservation_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("slot_id"),
        text_field("date"),
        text_field("time"),
        text_field("name"),
        text_field("email"),
        text_field("phone"),
        int_field("created_at"),
    ]
}

fn work_plan_schema() -> Vec<FieldInfo> {
    vec![
        text_field("date"),
        text_field("windows"),
        int_field("slot_len"),
        int_field("break_min"),
    ]
}

fn booking_schema() -> Vec<FieldInfo> {
    vec![
        text_field("date"),
        text_field("start"),
        text_field("end"),
        int_field("duration_min"),
        text_field("reservations"),
    ]
}

fn encode_slot(enc: &mut DataRowEncoder, slot: &Slot) -> PgWireResult<()> {
    enc.encode_field(&slot.id.to_string())?;
    enc.encode_field(&slot.date.to_string())?;
    enc.encode_field(&slot.time.to_string())?;
    enc.encode_field(&i64::from(slot.capacity))?;
    enc.encode_field(&i64::from(slot.booked_count))?;
    enc.encode_field(&slot.locked())
}

fn encode_service(enc: &mut DataRowEncoder, service: &Service) -> PgWireResult<()> {
    enc.encode_field(&service.id.to_string())?;
    enc.encode_field(&service.name)?;
    enc.encode_field(&i64::from(service.duration_min))?;
    enc.encode_field(&service.active)
}

fn encode_reservation(enc: &mut DataRowEncoder, r: &Reservation) -> PgWireResult<()> {
    enc.encode_field(&r.id.to_string())?;
    enc.encode_field(&r.slot_id.to_string())?;
    enc.encode_field(&r.date.to_string())?;
    enc.encode_field(&r.time.to_string())?;
    enc.encode_field(&r.customer.name)?;
    enc.encode_field(&r.customer.email)?;
    enc.encode_field(&r.customer.phone)?;
    enc.encode_field(&r.created_at)
}

/// One row describing a confirmed booking; `reservations` is a JSON array.
fn confirmation_response(c: &BookingConfirmation) -> PgWireResult<Vec<Response>> {
    let reservations = json!(c
        .reservations
        .iter()
        .map(|r| json!({ "id": r.id.to_string(), "slot_id": r.slot_id.to_string(), "time": r.time.to_string() }))
        .collect::<Vec<_>>());
    rows(booking_schema(), std::iter::once(c), |enc, c| {
        enc.encode_field(&c.date.to_string())?;
        enc.encode_field(&c.start.to_string())?;
        enc.encode_field(&hhmm(c.end_minute()))?;
        enc.encode_field(&i64::from(c.duration_min))?;
        enc.encode_field(&reservations.to_string())
    })
}

fn rows<'a, T: 'a>(
    schema: Vec<FieldInfo>,
    items: impl Iterator<Item = &'a T>,
    encode: impl Fn(&mut DataRowEncoder, &T) -> PgWireResult<()>,
) -> PgWireResult<Vec<Response>> {
    let schema = Arc::new(schema);
    let data: Vec<PgWireResult<DataRow>> = items
        .map(|item| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder, item)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(data)))])
}

/// Result columns for a statement, from the table it names.
fn schema_for(sql: &str) -> Vec<FieldInfo> {
    let lower = sql.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .filter(|w| !w.is_empty())
        .collect();
    let verb = words.first().copied().unwrap_or_default();
    let table = words
        .windows(2)
        .find(|w| w[0] == "from" || w[0] == "into")
        .map(|w| w[1].trim_matches('"'))
        .unwrap_or_default();
    match (verb, table) {
        ("select", "slots") | ("insert", "slots") => slot_schema(),
        ("select", "starts") => starts_schema(),
        ("select", "services") | ("insert", "services") => service_schema(),
        ("select", "reservations") => reservation_schema(),
        ("select", "work_plans") => work_plan_schema(),
        ("insert", "bookings") | ("insert", "reservations") => booking_schema(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for SlotchainHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        self.run(client, query).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct SlotchainQueryParser;

#[async_trait]
impl QueryParser for SlotchainQueryParser {
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
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(schema_for(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for SlotchainHandler {
    type Statement = String;
    type QueryParser = SlotchainQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
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
        let mut responses = self.run(client, &sql).await?;
        Ok(responses.remove(0))
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
        Ok(DescribeStatementResponse::new(param_types, schema_for(&target.statement)))
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
        Ok(DescribePortalResponse::new(schema_for(&target.statement.statement)))
    }
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Inline bound text parameters as quoted literals in one left-to-right pass.
/// Inserted values are never rescanned, and `$N` inside a quoted literal of
/// the statement is left alone.
fn substitute_params(portal: &Portal<String>) -> String {
    inline_params(&portal.statement.statement, &portal.parameters)
}

fn inline_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    let mut in_literal = false;
    while let Some((_, c)) = chars.next() {
        if c == '\'' {
            in_literal = !in_literal;
            out.push(c);
            continue;
        }
        if c != '$' || in_literal {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(&(_, d)) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            digits.push(d);
            chars.next();
        }
        let bound = digits
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| params.get(i));
        match bound {
            Some(Some(bytes)) => {
                out.push('\'');
                out.push_str(&String::from_utf8_lossy(bytes.as_ref()).replace('\'', "''"));
                out.push('\'');
            }
            Some(None) => out.push_str("NULL"),
            None => {
                out.push('$');
                out.push_str(&digits);
            }
        }
    }
    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct SlotchainFactory {
    handler: Arc<SlotchainHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<SlotchainAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl SlotchainFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, credentials: Credentials) -> Self {
        let auth_source = SlotchainAuthSource::new(credentials.clone());
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(SlotchainHandler::new(tenant_manager, credentials)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for SlotchainFactory {
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
    tenant_manager: Arc<TenantManager>,
    credentials: Credentials,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = SlotchainFactory::new(tenant_manager, credentials);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

/// SQLSTATE for each booking failure. `SB` codes are application-defined.
pub fn booking_sqlstate(e: &BookingError) -> &'static str {
    match e {
        BookingError::InvalidInput(_) => "22023",
        BookingError::VerificationFailed => "28000",
        BookingError::StartNotAvailable(_) => "SB001",
        BookingError::InsufficientSlots { .. } => "SB002",
        BookingError::ChainNotAvailable(_) => "SB003",
        BookingError::InvalidScheduleConfig(_) => "SB004",
        BookingError::BookingFailed { .. } => "SB005",
        BookingError::ChainRaceLost { .. } => "40001",
        BookingError::StoreUnavailable(_) => "58000",
    }
}

fn booking_err(e: BookingError) -> PgWireError {
    user_error(booking_sqlstate(&e), e.to_string())
}

fn engine_err(e: EngineError) -> PgWireError {
    let code = match &e {
        EngineError::InvalidInput(_) => "22023",
        EngineError::NotFound(_) => "02000",
        EngineError::SlotNotAvailable(_) => "SB001",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::StoreUnavailable(_) => "58000",
    };
    user_error(code, e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    let code = match e {
        SqlError::InvalidValue(_) => "22023",
        _ => "42601",
    };
    user_error(code, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_params_finds_highest() {
        assert_eq!(count_params("SELECT * FROM slots WHERE date = $1"), 1);
        assert_eq!(count_params("INSERT INTO slots (date, time) VALUES ($2, $10)"), 10);
        assert_eq!(count_params("SELECT * FROM services"), 0);
        assert_eq!(count_params("SELECT '$' FROM services"), 0);
    }

    #[test]
    fn inlined_values_are_not_rescanned() {
        let params: Vec<Option<&[u8]>> = vec![Some(&b"Ann $2"[..]), Some(&b"O'Neil $1"[..]), None];
        let sql = inline_params("VALUES ($1, $2, $3, '$1', $9)", &params);
        assert_eq!(sql, "VALUES ('Ann $2', 'O''Neil $1', NULL, '$1', $9)");
    }

    #[test]
    fn schema_follows_table() {
        let names = |sql: &str| -> Vec<String> {
            schema_for(sql).iter().map(|f| f.name().to_string()).collect()
        };
        assert_eq!(names("SELECT * FROM starts WHERE date = $1 AND duration_min = $2"), ["date", "start"]);
        assert_eq!(names("insert into bookings(date, start) values ($1, $2)")[4], "reservations");
        assert_eq!(names("SELECT * FROM \"slots\" WHERE date = $1")[0], "id");
        assert!(names("DELETE FROM slots WHERE date = $1 AND time = $2").is_empty());
        assert!(names("INSERT INTO work_plans VALUES ($1)").is_empty());
    }

    #[test]
    fn booking_errors_have_distinct_states() {
        let errors = [
            BookingError::InvalidInput(String::new()),
            BookingError::VerificationFailed,
            BookingError::StartNotAvailable(String::new()),
            BookingError::InvalidScheduleConfig(String::new()),
            BookingError::InsufficientSlots { need: None, available: 1 },
            BookingError::ChainNotAvailable(TimeOfDay::from_minutes(540).unwrap()),
            BookingError::ChainRaceLost { slot: TimeOfDay::from_minutes(540).unwrap(), orphaned: vec![] },
            BookingError::BookingFailed { reason: String::new(), orphaned: vec![] },
            BookingError::StoreUnavailable(String::new()),
        ];
        let mut states: Vec<&str> = errors.iter().map(booking_sqlstate).collect();
        states.sort_unstable();
        states.dedup();
        assert_eq!(states.len(), errors.len());
    }
}
