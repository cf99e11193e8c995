use chrono::NaiveDate;
use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::booking::Length;
use crate::model::*;

/// Default seats per slot when an INSERT leaves capacity out.
const DEFAULT_CAPACITY: u32 = 1;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    // ── customer surface ──
    SelectSlots {
        date: NaiveDate,
    },
    SelectStarts {
        date: NaiveDate,
        length: Length,
    },
    SelectServices,
    InsertBooking {
        date: NaiveDate,
        start: TimeOfDay,
        length: Length,
        customer: Customer,
        token: Option<String>,
    },
    InsertReservation {
        slot_id: Ulid,
        customer: Customer,
        token: Option<String>,
    },
    // ── admin surface ──
    InsertSlot {
        date: NaiveDate,
        time: TimeOfDay,
        capacity: u32,
        withdrawn: Option<bool>,
    },
    DeleteSlot {
        date: NaiveDate,
        time: TimeOfDay,
    },
    SelectReservations {
        date: NaiveDate,
    },
    DeleteReservation {
        id: Ulid,
    },
    SelectWorkPlan {
        date: NaiveDate,
    },
    InsertWorkPlan {
        date: NaiveDate,
        plan: WorkPlan,
    },
    /// `plan: None` expands the plan saved for the day.
    GenerateSlots {
        date: NaiveDate,
        plan: Option<WorkPlan>,
        capacity: u32,
    },
    InsertService {
        name: String,
        duration_min: Minutes,
        active: bool,
    },
    DeleteService {
        id: Ulid,
    },
}

impl Command {
    /// Commands only the admin user may run.
    pub fn requires_admin(&self) -> bool {
        !matches!(
            self,
            Command::SelectSlots { .. }
                | Command::SelectStarts { .. }
                | Command::SelectServices
                | Command::InsertBooking { .. }
                | Command::InsertReservation { .. }
        )
    }
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;
    let n = values.len();

    match table.as_str() {
        "slots" => {
            if n < 2 {
                return Err(SqlError::WrongArity("slots", 2, n));
            }
            Ok(Command::InsertSlot {
                date: parse_date_expr(&values[0])?,
                time: parse_time_expr(&values[1])?,
                capacity: optional(&values, 2, parse_u32)?.unwrap_or(DEFAULT_CAPACITY),
                withdrawn: optional(&values, 3, parse_bool)?,
            })
        }
        "bookings" => {
            if n < 6 {
                return Err(SqlError::WrongArity("bookings", 6, n));
            }
            let by_service = insert
                .columns
                .get(2)
                .is_some_and(|c| c.value.eq_ignore_ascii_case("service_id"));
            let length = if by_service {
                Length::Service(parse_ulid(&values[2])?)
            } else {
                Length::Minutes(parse_u32(&values[2])?)
            };
            Ok(Command::InsertBooking {
                date: parse_date_expr(&values[0])?,
                start: parse_time_expr(&values[1])?,
                length,
                customer: parse_customer(&values[3..6])?,
                token: optional(&values, 6, parse_string)?,
            })
        }
        "reservations" => {
            if n < 4 {
                return Err(SqlError::WrongArity("reservations", 4, n));
            }
            Ok(Command::InsertReservation {
                slot_id: parse_ulid(&values[0])?,
                customer: parse_customer(&values[1..4])?,
                token: optional(&values, 4, parse_string)?,
            })
        }
        "work_plans" => {
            if n < 4 {
                return Err(SqlError::WrongArity("work_plans", 4, n));
            }
            Ok(Command::InsertWorkPlan {
                date: parse_date_expr(&values[0])?,
                plan: parse_plan(&values[1..4])?,
            })
        }
        "generated_slots" => match n {
            1 | 2 => Ok(Command::GenerateSlots {
                date: parse_date_expr(&values[0])?,
                plan: None,
                capacity: optional(&values, 1, parse_u32)?.unwrap_or(DEFAULT_CAPACITY),
            }),
            4 | 5 => Ok(Command::GenerateSlots {
                date: parse_date_expr(&values[0])?,
                plan: Some(parse_plan(&values[1..4])?),
                capacity: optional(&values, 4, parse_u32)?.unwrap_or(DEFAULT_CAPACITY),
            }),
            _ => Err(SqlError::WrongArity("generated_slots", 4, n)),
        },
        "services" => {
            if n < 2 {
                return Err(SqlError::WrongArity("services", 2, n));
            }
            Ok(Command::InsertService {
                name: parse_string(&values[0])?,
                duration_min: parse_u32(&values[1])?,
                active: optional(&values, 2, parse_bool)?.unwrap_or(true),
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let filters = where_filters(delete.selection.as_ref())?;

    match table.as_str() {
        "slots" => Ok(Command::DeleteSlot {
            date: parse_date_expr(filters.require("date")?)?,
            time: parse_time_expr(filters.require("time")?)?,
        }),
        "reservations" => Ok(Command::DeleteReservation {
            id: parse_ulid(filters.require("id")?)?,
        }),
        "services" => Ok(Command::DeleteService {
            id: parse_ulid(filters.require("id")?)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let filters = where_filters(select.selection.as_ref())?;

    match table.as_str() {
        "slots" => Ok(Command::SelectSlots {
            date: parse_date_expr(filters.require("date")?)?,
        }),
        "starts" => {
            let length = match (filters.get("duration_min"), filters.get("service_id")) {
                (Some(minutes), None) => Length::Minutes(parse_u32(minutes)?),
                (None, Some(service)) => Length::Service(parse_ulid(service)?),
                (None, None) => return Err(SqlError::MissingFilter("duration_min")),
                (Some(_), Some(_)) => {
                    return Err(SqlError::Parse(
                        "filter on duration_min or service_id, not both".into(),
                    ));
                }
            };
            Ok(Command::SelectStarts {
                date: parse_date_expr(filters.require("date")?)?,
                length,
            })
        }
        "services" => Ok(Command::SelectServices),
        "reservations" => Ok(Command::SelectReservations {
            date: parse_date_expr(filters.require("date")?)?,
        }),
        "work_plans" => Ok(Command::SelectWorkPlan {
            date: parse_date_expr(filters.require("date")?)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// `col = value` pairs from a WHERE clause made of ANDed equalities.
struct Filters<'a>(Vec<(String, &'a Expr)>);

impl<'a> Filters<'a> {
    fn get(&self, column: &str) -> Option<&'a Expr> {
        self.0.iter().find(|(c, _)| c == column).map(|(_, e)| *e)
    }

    fn require(&self, column: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(column).ok_or(SqlError::MissingFilter(column))
    }
}

fn where_filters(selection: Option<&Expr>) -> Result<Filters<'_>, SqlError> {
    let mut pairs = Vec::new();
    if let Some(expr) = selection {
        collect_eq(expr, &mut pairs)?;
    }
    Ok(Filters(pairs))
}

fn collect_eq<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_eq(left, out)?;
                collect_eq(right, out)
            }
            ast::BinaryOperator::Eq => {
                let col = expr_column_name(left)
                    .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
                out.push((col, right.as_ref()));
                Ok(())
            }
            _ => Err(SqlError::Unsupported(format!("operator {op} in WHERE"))),
        },
        Expr::Nested(inner) => collect_eq(inner, out),
        _ => Err(SqlError::Unsupported(format!("WHERE {expr}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

/// First VALUES row. Multi-row inserts are rejected.
fn extract_insert_values(insert: &ast::Insert) -> Result<&[Expr], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.as_slice()),
            _ => Err(SqlError::Unsupported("multi-row VALUES".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

/// Parse `values[i]` if present and not NULL.
fn optional<T>(
    values: &[Expr],
    i: usize,
    parse: fn(&Expr) -> Result<T, SqlError>,
) -> Result<Option<T>, SqlError> {
    match values.get(i) {
        Some(expr) if !is_null(expr) => parse(expr).map(Some),
        _ => Ok(None),
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_date_expr(expr: &Expr) -> Result<NaiveDate, SqlError> {
    Ok(parse_date(&parse_string(expr)?)?)
}

fn parse_time_expr(expr: &Expr) -> Result<TimeOfDay, SqlError> {
    Ok(TimeOfDay::parse(&parse_string(expr)?)?)
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = parse_string(expr)?;
    Ulid::from_string(&s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::InvalidValue(format!("bad integer {s}: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::InvalidValue(format!("{v} out of range")))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    match extract_value(expr) {
        Some(Value::Boolean(b)) => Ok(*b),
        Some(Value::SingleQuotedString(s)) => match s.to_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
        },
        Some(Value::Number(n, _)) => Ok(n != "0"),
        Some(value) => Err(SqlError::Parse(format!("expected bool, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

/// `(name, email, phone)`; validated later by the booking service.
fn parse_customer(values: &[Expr]) -> Result<Customer, SqlError> {
    Ok(Customer::new(
        parse_string(&values[0])?,
        parse_string(&values[1])?,
        parse_string(&values[2])?,
    ))
}

/// `(windows, slot_len, break_min)`.
fn parse_plan(values: &[Expr]) -> Result<WorkPlan, SqlError> {
    let plan = WorkPlan {
        windows: WorkPlan::parse_windows(&parse_string(&values[0])?)?,
        slot_len: parse_u32(&values[1])?,
        break_min: parse_u32(&values[2])?,
    };
    plan.validate()?;
    Ok(plan)
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    /// Well-formed SQL carrying a value the domain rejects.
    InvalidValue(String),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected at least {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::InvalidValue(msg) => write!(f, "invalid value: {msg}"),
        }
    }
}

impl std::error::Error for SqlError {}

impl From<InvalidInput> for SqlError {
    fn from(e: InvalidInput) -> Self {
        SqlError::InvalidValue(e.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    fn date() -> NaiveDate {
        parse_date("2025-09-24").unwrap()
    }

    fn t(s: &str) -> TimeOfDay {
        TimeOfDay::parse(s).unwrap()
    }

    #[test]
    fn parse_select_slots() {
        let cmd = parse_sql("SELECT * FROM slots WHERE date = '2025-09-24'").unwrap();
        assert_eq!(cmd, Command::SelectSlots { date: date() });
        assert!(!cmd.requires_admin());
    }

    #[test]
    fn parse_select_starts_by_duration_or_service() {
        let cmd = parse_sql("SELECT * FROM starts WHERE date = '2025-09-24' AND duration_min = 40").unwrap();
        assert_eq!(
            cmd,
            Command::SelectStarts {
                date: date(),
                length: Length::Minutes(40)
            }
        );

        let sql = format!("SELECT * FROM starts WHERE service_id = '{SID}' AND date = '2025-09-24'");
        match parse_sql(&sql).unwrap() {
            Command::SelectStarts {
                length: Length::Service(id),
                ..
            } => assert_eq!(id.to_string(), SID),
            other => panic!("expected SelectStarts, got {other:?}"),
        }

        assert!(matches!(
            parse_sql("SELECT * FROM starts WHERE date = '2025-09-24'"),
            Err(SqlError::MissingFilter("duration_min"))
        ));
    }

    #[test]
    fn parse_insert_booking_by_minutes() {
        let sql = "INSERT INTO bookings (date, start, duration_min, name, email, phone) \
                   VALUES ('2025-09-24', '09:00', 41, 'Jana', 'jana@example.com', '0900')";
        match parse_sql(sql).unwrap() {
            Command::InsertBooking {
                date: d,
                start,
                length,
                customer,
                token,
            } => {
                assert_eq!(d, date());
                assert_eq!(start, t("09:00"));
                assert_eq!(length, Length::Minutes(41));
                assert_eq!(customer.email, "jana@example.com");
                assert_eq!(token, None);
            }
            other => panic!("expected InsertBooking, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_booking_by_service_with_token() {
        let sql = format!(
            "INSERT INTO bookings (date, start, service_id, name, email, phone, token) \
             VALUES ('2025-09-24', '09:00', '{SID}', 'Jana', 'jana@example.com', '0900', 'tok')"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertBooking { length, token, .. } => {
                assert!(matches!(length, Length::Service(_)));
                assert_eq!(token.as_deref(), Some("tok"));
            }
            other => panic!("expected InsertBooking, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_reservation() {
        let sql = format!(
            "INSERT INTO reservations (slot_id, name, email, phone, token) VALUES ('{SID}', 'A', 'a@b', '1', NULL)"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertReservation { slot_id, token, .. } => {
                assert_eq!(slot_id.to_string(), SID);
                assert_eq!(token, None);
            }
            other => panic!("expected InsertReservation, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_slot_defaults() {
        let cmd = parse_sql("INSERT INTO slots (date, time) VALUES ('2025-09-24', '09:20')").unwrap();
        assert_eq!(
            cmd,
            Command::InsertSlot {
                date: date(),
                time: t("09:20"),
                capacity: 1,
                withdrawn: None
            }
        );
        assert!(cmd.requires_admin());

        let cmd = parse_sql("INSERT INTO slots (date, time, capacity, locked) VALUES ('2025-09-24', '09:20', 3, true)").unwrap();
        assert!(matches!(
            cmd,
            Command::InsertSlot {
                capacity: 3,
                withdrawn: Some(true),
                ..
            }
        ));
    }

    #[test]
    fn parse_delete_slot() {
        let cmd = parse_sql("DELETE FROM slots WHERE date = '2025-09-24' AND time = '09:20'").unwrap();
        assert_eq!(
            cmd,
            Command::DeleteSlot {
                date: date(),
                time: t("09:20")
            }
        );
        assert!(matches!(
            parse_sql("DELETE FROM slots WHERE date = '2025-09-24'"),
            Err(SqlError::MissingFilter("time"))
        ));
    }

    #[test]
    fn parse_work_plan_and_generation() {
        let cmd = parse_sql(
            "INSERT INTO work_plans (date, windows, slot_len, break_min) VALUES ('2025-09-24', '09:00-12:00,13:00-16:00', 20, 5)",
        )
        .unwrap();
        match cmd {
            Command::InsertWorkPlan { plan, .. } => {
                assert_eq!(plan.windows.len(), 2);
                assert_eq!(plan.slot_len, 20);
                assert_eq!(plan.break_min, 5);
            }
            other => panic!("expected InsertWorkPlan, got {other:?}"),
        }

        let cmd = parse_sql("INSERT INTO generated_slots (date, capacity) VALUES ('2025-09-24', 2)").unwrap();
        assert_eq!(
            cmd,
            Command::GenerateSlots {
                date: date(),
                plan: None,
                capacity: 2
            }
        );

        let cmd = parse_sql(
            "INSERT INTO generated_slots (date, windows, slot_len, break_min) VALUES ('2025-09-24', '09:00-10:00', 15, 0)",
        )
        .unwrap();
        assert!(matches!(cmd, Command::GenerateSlots { plan: Some(_), capacity: 1, .. }));
    }

    #[test]
    fn bad_plan_is_invalid_value() {
        let err = parse_sql(
            "INSERT INTO work_plans (date, windows, slot_len, break_min) VALUES ('2025-09-24', '12:00-09:00', 20, 0)",
        )
        .unwrap_err();
        assert!(matches!(err, SqlError::InvalidValue(_)));
    }

    #[test]
    fn bad_date_is_invalid_value() {
        let err = parse_sql("SELECT * FROM slots WHERE date = '2025-02-30'").unwrap_err();
        assert!(matches!(err, SqlError::InvalidValue(_)));
    }

    #[test]
    fn bad_duration_is_invalid_value() {
        for minutes in ["-5", "4294967296", "'sixty'"] {
            let sql = format!(
                "INSERT INTO bookings (date, start, duration_min, name, email, phone) \
                 VALUES ('2025-09-24', '09:00', {minutes}, 'Jana', 'jana@example.com', '0900')"
            );
            let err = parse_sql(&sql).unwrap_err();
            assert!(matches!(err, SqlError::InvalidValue(_)), "{minutes}: {err}");
        }
    }

    #[test]
    fn parse_services() {
        let cmd = parse_sql("INSERT INTO services (name, duration_min) VALUES ('Haircut', 45)").unwrap();
        assert_eq!(
            cmd,
            Command::InsertService {
                name: "Haircut".into(),
                duration_min: 45,
                active: true
            }
        );
        assert_eq!(parse_sql("SELECT * FROM services").unwrap(), Command::SelectServices);
        let cmd = parse_sql(&format!("DELETE FROM services WHERE id = '{SID}'")).unwrap();
        assert!(matches!(cmd, Command::DeleteService { .. }));
    }

    #[test]
    fn parse_admin_reads() {
        let cmd = parse_sql("SELECT * FROM reservations WHERE date = '2025-09-24'").unwrap();
        assert!(cmd.requires_admin());
        let cmd = parse_sql("SELECT * FROM work_plans WHERE date = '2025-09-24'").unwrap();
        assert!(cmd.requires_admin());
        let cmd = parse_sql(&format!("DELETE FROM reservations WHERE id = '{SID}'")).unwrap();
        assert!(cmd.requires_admin());
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = "INSERT INTO foobar (id) VALUES ('x')";
        assert!(matches!(parse_sql(sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn multi_row_insert_rejected() {
        let sql = "INSERT INTO slots (date, time) VALUES ('2025-09-24', '09:00'), ('2025-09-24', '09:20')";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
