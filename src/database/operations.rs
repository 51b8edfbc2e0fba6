use rusqlite::types::Value;

use crate::database::Database;
use crate::error::{DatabaseError, Result};
use crate::models::Vehicle;

/// Which catalog table a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalog {
    New,
    Used,
}

impl Catalog {
    pub fn table(self) -> &'static str {
        match self {
            Catalog::New => "cars_new",
            Catalog::Used => "cars_used",
        }
    }

    pub fn is_used(self) -> bool {
        matches!(self, Catalog::Used)
    }
}

/// A WHERE clause built from fixed fragments plus bound parameters.
///
/// Column names and operators come from the engine's own static strings;
/// every caller-derived value travels as a `?` parameter.
#[derive(Debug, Default)]
pub struct PredicateSet {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl PredicateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces the query to match nothing. Used when a filter contradicts the
    /// catalog itself, such as a new-only filter against the used table.
    pub fn never(&mut self) {
        self.clauses.push("0 = 1".to_string());
    }

    pub fn is_never(&self) -> bool {
        self.clauses.iter().any(|c| c == "0 = 1")
    }

    /// `column` matches any of the given substrings, case-insensitively.
    pub fn contains_any(&mut self, column: &str, variants: &[String]) {
        if variants.is_empty() {
            return;
        }
        let parts: Vec<String> = variants
            .iter()
            .map(|_| format!("LOWER({column}) LIKE ?"))
            .collect();
        self.clauses.push(format!("({})", parts.join(" OR ")));
        for v in variants {
            self.params.push(Value::Text(format!("%{}%", v.to_lowercase())));
        }
    }

    /// One OR-group per value set, all groups OR-ed together. Used for
    /// multi-color queries where each color has its own variant list.
    pub fn contains_any_grouped(&mut self, column: &str, groups: &[Vec<String>]) {
        let groups: Vec<&Vec<String>> = groups.iter().filter(|g| !g.is_empty()).collect();
        if groups.is_empty() {
            return;
        }
        let mut rendered = Vec::with_capacity(groups.len());
        for group in &groups {
            let parts: Vec<String> = group
                .iter()
                .map(|_| format!("LOWER({column}) LIKE ?"))
                .collect();
            rendered.push(format!("({})", parts.join(" OR ")));
            for v in group.iter() {
                self.params.push(Value::Text(format!("%{}%", v.to_lowercase())));
            }
        }
        self.clauses.push(format!("({})", rendered.join(" OR ")));
    }

    pub fn at_least(&mut self, column: &str, value: Value) {
        self.clauses.push(format!("{column} >= ?"));
        self.params.push(value);
    }

    pub fn at_most(&mut self, column: &str, value: Value) {
        self.clauses.push(format!("{column} <= ?"));
        self.params.push(value);
    }

    pub fn equals(&mut self, column: &str, value: Value) {
        self.clauses.push(format!("{column} = ?"));
        self.params.push(value);
    }

    /// Exact match for REAL columns, with a tolerance instead of `=`.
    pub fn close_to(&mut self, column: &str, value: f64) {
        self.clauses.push(format!("ABS({column} - ?) < 0.01"));
        self.params.push(Value::Real(value));
    }

    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            "1 = 1".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Seed row for catalog population, shared by both tables.
#[derive(Debug, Clone)]
pub struct VehicleSeed {
    pub title: String,
    pub brand: String,
    pub model: String,
    pub vin: Option<String>,
    pub color: Option<String>,
    pub price: i64,
    pub city: Option<String>,
    pub manufacture_year: i32,
    pub body_type: Option<String>,
    pub gear_box_type: Option<String>,
    pub driving_gear_type: Option<String>,
    pub engine_vol: Option<f64>,
    pub power: Option<i64>,
    pub fuel_type: Option<String>,
    pub dealer_center: Option<String>,
    pub mileage: Option<i64>,
}

impl Database {
    /// Runs one fully parameterized catalog query, rows in id order.
    pub fn query_catalog(&self, catalog: Catalog, predicates: &PredicateSet) -> Result<Vec<Vehicle>> {
        if predicates.is_never() {
            return Ok(Vec::new());
        }
        let conn = self.get_connection()?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} ORDER BY id ASC",
            catalog.table(),
            predicates.where_clause()
        );
        let mut stmt = conn.prepare(&sql).map_err(DatabaseError::Sqlite)?;
        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(predicates.params().iter()),
                |row| Vehicle::from_row(row, catalog.is_used()),
            )
            .map_err(DatabaseError::Sqlite)?;

        let mut vehicles = Vec::new();
        for row in rows {
            vehicles.push(row.map_err(DatabaseError::Sqlite)?);
        }
        Ok(vehicles)
    }

    pub fn insert_vehicle(&self, catalog: Catalog, seed: &VehicleSeed) -> Result<i64> {
        let conn = self.get_connection()?;
        match catalog {
            Catalog::New => {
                conn.execute(
                    "INSERT INTO cars_new (
                        title, brand, model, vin, color, price, city,
                        manufacture_year, body_type, gear_box_type,
                        driving_gear_type, engine_vol, power, fuel_type,
                        dealer_center
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    rusqlite::params![
                        seed.title,
                        seed.brand,
                        seed.model,
                        seed.vin,
                        seed.color,
                        seed.price,
                        seed.city,
                        seed.manufacture_year,
                        seed.body_type,
                        seed.gear_box_type,
                        seed.driving_gear_type,
                        seed.engine_vol,
                        seed.power,
                        seed.fuel_type,
                        seed.dealer_center,
                    ],
                )
                .map_err(DatabaseError::Sqlite)?;
            }
            Catalog::Used => {
                conn.execute(
                    "INSERT INTO cars_used (
                        title, brand, model, vin, color, price, city,
                        manufacture_year, body_type, gear_box_type,
                        driving_gear_type, engine_vol, power, fuel_type,
                        dealer_center, mileage
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                    rusqlite::params![
                        seed.title,
                        seed.brand,
                        seed.model,
                        seed.vin,
                        seed.color,
                        seed.price,
                        seed.city,
                        seed.manufacture_year,
                        seed.body_type,
                        seed.gear_box_type,
                        seed.driving_gear_type,
                        seed.engine_vol,
                        seed.power,
                        seed.fuel_type,
                        seed.dealer_center,
                        seed.mileage.unwrap_or(0),
                    ],
                )
                .map_err(DatabaseError::Sqlite)?;
            }
        }
        Ok(conn.last_insert_rowid())
    }
}
