//! Embedded analytical store
//!
//! The canonical relations live in a SQLite file that the engine only ever
//! reads. Every query opens its own read-only connection and drops it when
//! the rows are materialized; there is no pooling and no shared cursor.

use crate::error::{QaError, Result};
use crate::table::{Row, Table};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const AGRI_TABLE: &str = "agri_production";
pub const CLIMATE_TABLE: &str = "climate_obs";

/// Columns of `agri_production`.
pub const AGRI_COLUMNS: &[&str] = &[
    "state",
    "district",
    "year",
    "crop",
    "production_tonnes",
    "area_hectares",
    "yield_kg_per_ha",
];

/// Columns of `climate_obs` the resolvers rely on. Monthly rainfall columns
/// may also be present.
pub const CLIMATE_COLUMNS: &[&str] = &["state", "district", "year", "rainfall_mm", "temperature_avg"];

#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| QaError::Store(format!("unable to open {}: {}", self.path.display(), e)))
    }

    /// Run a read-only query and materialize every row.
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Table> {
        debug!("SQL: {} | params: {:?}", sql, params);
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            let mut out = Row::new();
            for (idx, name) in columns.iter().enumerate() {
                out.insert(name.clone(), sql_to_json(row.get_ref(idx)?));
            }
            Ok(out)
        })?;

        let mut table = Table::new(columns.clone());
        for row in rows {
            table.rows.push(row?);
        }
        Ok(table)
    }

    pub fn run(&self, builder: &SelectBuilder) -> Result<Table> {
        let (sql, params) = builder.build();
        self.query(&sql, &params)
    }

    /// `SELECT 1` on a fresh read-only connection.
    pub fn ping(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// Up to `limit` raw rows of one canonical relation.
    pub fn sample(&self, table: &str, limit: usize) -> Result<Table> {
        if table != AGRI_TABLE && table != CLIMATE_TABLE {
            return Err(QaError::Store(format!("unknown relation '{}'", table)));
        }
        let builder = SelectBuilder::new(table).column("*").limit(limit);
        self.run(&builder)
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
    }
}

/// Typed WHERE clause. Values are always bound as parameters; column and
/// table names only ever come from engine constants.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterClause {
    /// `LOWER(column) IN (?, ...)`, values lower-cased before binding
    OneOf { column: String, values: Vec<String> },
    /// `column BETWEEN ? AND ?`
    YearBetween { column: String, from: i32, to: i32 },
    /// `column > (SELECT MAX(column) FROM table) - ?`
    RecentYears { column: String, table: String, years: u32 },
}

impl FilterClause {
    pub fn one_of(column: &str, values: &[String]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(FilterClause::OneOf {
            column: column.to_string(),
            values: values.to_vec(),
        })
    }

    fn render(&self, params: &mut Vec<SqlValue>) -> String {
        match self {
            FilterClause::OneOf { column, values } => {
                let placeholders = vec!["?"; values.len()].join(", ");
                params.extend(values.iter().map(|v| SqlValue::Text(v.to_lowercase())));
                format!("LOWER({}) IN ({})", column, placeholders)
            }
            FilterClause::YearBetween { column, from, to } => {
                params.push(SqlValue::Integer(i64::from(*from)));
                params.push(SqlValue::Integer(i64::from(*to)));
                format!("{} BETWEEN ? AND ?", column)
            }
            FilterClause::RecentYears { column, table, years } => {
                let bare = column.rsplit('.').next().unwrap_or(column);
                params.push(SqlValue::Integer(i64::from(*years)));
                format!("{} > (SELECT MAX({}) FROM {}) - ?", column, bare, table)
            }
        }
    }
}

/// Parametrized SELECT builder for the canonical relations.
#[derive(Debug, Clone, Default)]
pub struct SelectBuilder {
    from: String,
    columns: Vec<String>,
    filters: Vec<FilterClause>,
    group_by: Vec<String>,
    order_by: Vec<String>,
    limit: Option<usize>,
}

impl SelectBuilder {
    pub fn new(from: &str) -> Self {
        Self {
            from: from.to_string(),
            ..Default::default()
        }
    }

    pub fn column(mut self, expr: &str) -> Self {
        self.columns.push(expr.to_string());
        self
    }

    pub fn filter(mut self, clause: Option<FilterClause>) -> Self {
        if let Some(clause) = clause {
            self.filters.push(clause);
        }
        self
    }

    pub fn group_by(mut self, column: &str) -> Self {
        self.group_by.push(column.to_string());
        self
    }

    pub fn order_by(mut self, expr: &str) -> Self {
        self.order_by.push(expr.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn build(&self) -> (String, Vec<SqlValue>) {
        let mut params = Vec::new();
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", columns, self.from);

        if !self.filters.is_empty() {
            let clauses: Vec<String> = self.filters.iter().map(|f| f.render(&mut params)).collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        if !self.group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", self.group_by.join(", ")));
        }
        if !self.order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", self.order_by.join(", ")));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        (sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, LocalStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("canonical.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE agri_production (state TEXT, district TEXT, year INTEGER, crop TEXT,
                 production_tonnes REAL, area_hectares REAL, yield_kg_per_ha REAL);
             INSERT INTO agri_production VALUES ('Punjab', 'Ludhiana', 2014, 'Rice', 1000.0, 50.0, 2000.0);
             INSERT INTO agri_production VALUES ('Punjab', 'Ludhiana', 2015, 'Rice', 1100.0, 50.0, 2200.0);
             INSERT INTO agri_production VALUES ('Kerala', NULL, 2015, 'Rice', 300.0, 20.0, 1500.0);",
        )
        .unwrap();
        (dir, LocalStore::new(path))
    }

    #[test]
    fn test_builder_binds_values() {
        let builder = SelectBuilder::new(AGRI_TABLE)
            .column("state")
            .column("AVG(production_tonnes) AS avg_value")
            .filter(FilterClause::one_of("state", &["Punjab".to_string(), "Kerala".to_string()]))
            .filter(FilterClause::one_of("crop", &[]))
            .group_by("state")
            .order_by("avg_value DESC")
            .limit(10);
        let (sql, params) = builder.build();
        assert_eq!(
            sql,
            "SELECT state, AVG(production_tonnes) AS avg_value FROM agri_production \
             WHERE LOWER(state) IN (?, ?) GROUP BY state ORDER BY avg_value DESC LIMIT 10"
        );
        assert_eq!(params, vec![SqlValue::Text("punjab".into()), SqlValue::Text("kerala".into())]);
    }

    #[test]
    fn test_hostile_value_stays_a_parameter() {
        let builder = SelectBuilder::new(AGRI_TABLE)
            .filter(FilterClause::one_of("state", &["x'); DROP TABLE agri_production; --".to_string()]));
        let (sql, params) = builder.build();
        assert!(!sql.contains("DROP"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_query_materializes_rows() {
        let (_dir, store) = fixture();
        let builder = SelectBuilder::new(AGRI_TABLE)
            .column("state")
            .column("district")
            .column("production_tonnes")
            .filter(Some(FilterClause::YearBetween {
                column: "year".to_string(),
                from: 2015,
                to: 2015,
            }))
            .order_by("production_tonnes DESC");
        let table = store.run(&builder).unwrap();
        assert_eq!(table.columns, vec!["state", "district", "production_tonnes"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.value(0, "production_tonnes"), Some(&json!(1100.0)));
        assert_eq!(table.value(1, "district"), Some(&Value::Null));
    }

    #[test]
    fn test_recent_years_filter() {
        let (_dir, store) = fixture();
        let builder = SelectBuilder::new(AGRI_TABLE).column("year").filter(Some(FilterClause::RecentYears {
            column: "year".to_string(),
            table: AGRI_TABLE.to_string(),
            years: 1,
        }));
        let table = store.run(&builder).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.rows.iter().all(|r| r.get("year") == Some(&json!(2015))));
    }

    #[test]
    fn test_ping_and_sample() {
        let (_dir, store) = fixture();
        store.ping().unwrap();
        assert_eq!(store.sample(AGRI_TABLE, 2).unwrap().len(), 2);
        assert!(store.sample("sqlite_master", 2).is_err());
    }

    #[test]
    fn test_missing_store_is_store_error() {
        let store = LocalStore::new("/nonexistent/dir/canonical.sqlite");
        assert!(matches!(store.ping(), Err(QaError::Store(_))));
    }
}
