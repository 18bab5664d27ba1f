use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;

use crate::model::{AppointmentId, ExceptionId};

/// Which day a free-slot query targets. Date strings stay raw; the
/// scheduler's parser owns their validation.
#[derive(Debug, PartialEq)]
pub enum DaySelector {
    Date(String),
    Weekday { name: String, reference: Option<String> },
}

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    UpsertPatient {
        phone: String,
        name: String,
        notes: Option<String>,
    },
    SelectPatient {
        phone: String,
    },
    SelectAppointments {
        phone: String,
    },
    SelectAppointment {
        id: AppointmentId,
    },
    Book {
        phone: String,
        start: String,
        note: Option<String>,
    },
    Reschedule {
        id: AppointmentId,
        start: String,
    },
    Cancel {
        id: AppointmentId,
    },
    SelectFreeSlots(DaySelector),
    SelectSchedule {
        date: String,
    },
    InsertBlock {
        start: String,
        end: String,
        reason: Option<String>,
    },
    SelectBlocks {
        date: String,
    },
    DeleteBlock {
        id: ExceptionId,
    },
    SelectHealth,
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let stmts = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| SqlError::Parse(e.to_string()))?;
    let stmt = match stmts.as_slice() {
        [] => return Err(SqlError::Empty),
        [stmt] => stmt,
        _ => return Err(SqlError::Unsupported("multiple statements".into())),
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update { table, assignments, selection, .. } => {
            parse_update(&table.relation, assignments, selection)
        }
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

/// Default column order when an INSERT names no columns.
fn default_columns(table: &str) -> Option<&'static [&'static str]> {
    match table {
        "patients" => Some(&["phone", "name", "notes"]),
        "appointments" => Some(&["phone", "start", "note"]),
        "blocks" => Some(&["start", "end", "reason"]),
        _ => None,
    }
}

struct Row {
    table: &'static str,
    fields: Vec<(String, Expr)>,
}

impl Row {
    fn get(&self, column: &'static str) -> Option<&Expr> {
        self.fields.iter().find(|(c, _)| c == column).map(|(_, e)| e)
    }

    fn required(&self, column: &'static str) -> Result<String, SqlError> {
        let expr = self
            .get(column)
            .ok_or(SqlError::MissingColumn(self.table, column))?;
        parse_string_or_null(expr)?.ok_or(SqlError::MissingColumn(self.table, column))
    }

    fn optional(&self, column: &'static str) -> Result<Option<String>, SqlError> {
        self.get(column).map_or(Ok(None), parse_string_or_null)
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let name = insert_table_name(insert)?;
    let (table, defaults) = match default_columns(&name) {
        Some(cols) => (static_table(&name), cols),
        None => return Err(SqlError::UnknownTable(name)),
    };
    let values = extract_single_row(insert)?;

    let columns: Vec<String> = if insert.columns.is_empty() {
        defaults.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if values.len() > columns.len() {
        return Err(SqlError::WrongArity(table, columns.len(), values.len()));
    }
    let row = Row {
        table,
        fields: columns.into_iter().zip(values).collect(),
    };

    match table {
        "patients" => Ok(Command::UpsertPatient {
            phone: row.required("phone")?,
            name: row.required("name")?,
            notes: row.optional("notes")?,
        }),
        "appointments" => Ok(Command::Book {
            phone: row.required("phone")?,
            start: row.required("start")?,
            note: row.optional("note")?,
        }),
        _ => Ok(Command::InsertBlock {
            start: row.required("start")?,
            end: row.required("end")?,
            reason: row.optional("reason")?,
        }),
    }
}

fn static_table(name: &str) -> &'static str {
    match name {
        "patients" => "patients",
        "appointments" => "appointments",
        _ => "blocks",
    }
}

// ── UPDATE / DELETE ───────────────────────────────────────────

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(relation)?;
    if table != "appointments" {
        return Err(SqlError::Unsupported(format!("UPDATE {table}")));
    }
    let mut start = None;
    for assignment in assignments {
        let column = match &assignment.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            AssignmentTarget::Tuple(_) => None,
        };
        match column.as_deref() {
            Some("start") => start = parse_string_or_null(&assignment.value)?,
            Some(other) => return Err(SqlError::Unsupported(format!("SET {other}"))),
            None => return Err(SqlError::Unsupported("tuple assignment".into())),
        }
    }
    Ok(Command::Reschedule {
        id: extract_where_id(selection)?,
        start: start.ok_or(SqlError::MissingColumn("appointments", "start"))?,
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "appointments" => Ok(Command::Cancel { id }),
        "blocks" => Ok(Command::DeleteBlock { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        collect_eq_filters(selection, &mut filters)?;
    }
    let filter = |column: &str| {
        filters
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, e)| e)
    };
    let text = |column: &'static str| -> Result<String, SqlError> {
        let expr = filter(column).ok_or(SqlError::MissingFilter(column))?;
        parse_string_or_null(expr)?.ok_or(SqlError::MissingFilter(column))
    };

    match table.as_str() {
        "patients" => Ok(Command::SelectPatient { phone: text("phone")? }),
        "appointments" => match filter("id") {
            Some(expr) => Ok(Command::SelectAppointment { id: parse_id_expr(expr)? }),
            None => Ok(Command::SelectAppointments { phone: text("phone")? }),
        },
        "free_slots" => {
            if filter("date").is_some() {
                Ok(Command::SelectFreeSlots(DaySelector::Date(text("date")?)))
            } else if filter("day_of_week").is_some() {
                Ok(Command::SelectFreeSlots(DaySelector::Weekday {
                    name: text("day_of_week")?,
                    reference: filter("ref_date").map(parse_string_or_null).transpose()?.flatten(),
                }))
            } else {
                Err(SqlError::MissingFilter("date or day_of_week"))
            }
        }
        "schedule" => Ok(Command::SelectSchedule { date: text("date")? }),
        "blocks" => Ok(Command::SelectBlocks { date: text("date")? }),
        "health" => Ok(Command::SelectHealth),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Flatten `a = x AND b = y AND ...` into `(column, value)` pairs.
fn collect_eq_filters(expr: &Expr, out: &mut Vec<(String, Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        Expr::BinaryOp { left, op: ast::BinaryOperator::And, right } => {
            collect_eq_filters(left, out)?;
            collect_eq_filters(right, out)
        }
        Expr::BinaryOp { left, op: ast::BinaryOperator::Eq, right } => {
            let column = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
            out.push((column, right.as_ref().clone()));
            Ok(())
        }
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
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
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
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

fn extract_single_row(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [row] => Ok(row.clone()),
            [] => Err(SqlError::Parse("empty VALUES".into())),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<u64, SqlError> {
    match selection {
        Some(Expr::BinaryOp { left, op: ast::BinaryOperator::Eq, right })
            if expr_column_name(left).as_deref() == Some("id") =>
        {
            parse_id_expr(right)
        }
        _ => Err(SqlError::MissingFilter("id")),
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

fn parse_id_expr(expr: &Expr) -> Result<u64, SqlError> {
    match extract_value(expr) {
        Some(Value::Number(s, _) | Value::SingleQuotedString(s)) => s
            .trim()
            .parse()
            .map_err(|_| SqlError::Parse(format!("bad id: {s}"))),
        Some(value) => Err(SqlError::Parse(format!("expected id, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

/// Strings and numbers come back as text; `NULL` as `None`.
fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        Some(
            Value::SingleQuotedString(s)
            | Value::DoubleQuotedString(s)
            | Value::EscapedStringLiteral(s)
            | Value::Number(s, _),
        ) => Ok(Some(s.clone())),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("{0}: expected at most {1} values, got {2}")]
    WrongArity(&'static str, usize, usize),
    #[error("{0}: missing column {1}")]
    MissingColumn(&'static str, &'static str),
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
}
