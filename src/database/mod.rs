use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Row;

use crate::error::{AppError, DatabaseError, Result};
use crate::models::Vehicle;

pub mod operations;

pub type DbPool = Pool<SqliteConnectionManager>;

/// The vehicle catalog: two parallel tables, one per inventory state.
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA cache_size = 64000;
                 PRAGMA temp_store = MEMORY;",
            )
        });

        let pool = Pool::builder()
            .max_size(15)
            .build(manager)
            .map_err(DatabaseError::Pool)?;

        let db = Self { pool };
        db.initialize_schema()?;
        Ok(db)
    }

    /// In-memory catalog for tests. A single pooled connection: each
    /// in-memory connection would otherwise be its own database.
    pub fn in_memory() -> Result<Self> {
        let pool = Pool::builder()
            .max_size(1)
            .build(SqliteConnectionManager::memory())
            .map_err(DatabaseError::Pool)?;
        let db = Self { pool };
        db.initialize_schema()?;
        Ok(db)
    }

    pub fn get_connection(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(DatabaseError::Pool)
            .map_err(AppError::Database)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.get_connection()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cars_new (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                brand TEXT NOT NULL,
                model TEXT NOT NULL,
                vin TEXT,
                color TEXT,
                price INTEGER NOT NULL,
                city TEXT,
                manufacture_year INTEGER NOT NULL,
                body_type TEXT,
                gear_box_type TEXT,
                driving_gear_type TEXT,
                engine_vol REAL,
                power INTEGER,
                fuel_type TEXT,
                dealer_center TEXT
            )",
            [],
        )
        .map_err(DatabaseError::Sqlite)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cars_used (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                brand TEXT NOT NULL,
                model TEXT NOT NULL,
                vin TEXT,
                color TEXT,
                price INTEGER NOT NULL,
                city TEXT,
                manufacture_year INTEGER NOT NULL,
                body_type TEXT,
                gear_box_type TEXT,
                driving_gear_type TEXT,
                engine_vol REAL,
                power INTEGER,
                fuel_type TEXT,
                dealer_center TEXT,
                mileage INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )
        .map_err(DatabaseError::Sqlite)?;

        for stmt in [
            "CREATE INDEX IF NOT EXISTS idx_cars_new_brand ON cars_new(brand)",
            "CREATE INDEX IF NOT EXISTS idx_cars_new_price ON cars_new(price)",
            "CREATE INDEX IF NOT EXISTS idx_cars_used_brand ON cars_used(brand)",
            "CREATE INDEX IF NOT EXISTS idx_cars_used_price ON cars_used(price)",
        ] {
            conn.execute(stmt, []).map_err(DatabaseError::Sqlite)?;
        }

        Ok(())
    }

    pub fn health_check(&self) -> Result<bool> {
        let conn = self.get_connection()?;
        let mut stmt = conn
            .prepare("PRAGMA integrity_check")
            .map_err(DatabaseError::Sqlite)?;
        let integrity: String = stmt
            .query_row([], |row| row.get(0))
            .map_err(DatabaseError::Sqlite)?;
        if integrity != "ok" {
            return Err(AppError::Database(DatabaseError::Corruption(integrity)));
        }
        Ok(true)
    }
}

impl Vehicle {
    pub fn from_row(row: &Row, is_used: bool) -> rusqlite::Result<Self> {
        Ok(Vehicle {
            id: row.get("id")?,
            title: row.get("title")?,
            brand: row.get("brand")?,
            model: row.get("model")?,
            vin: row.get("vin")?,
            color: row.get("color")?,
            price: row.get("price")?,
            city: row.get("city")?,
            manufacture_year: row.get("manufacture_year")?,
            body_type: row.get("body_type")?,
            gear_box_type: row.get("gear_box_type")?,
            driving_gear_type: row.get("driving_gear_type")?,
            engine_vol: row.get("engine_vol")?,
            power: row.get("power")?,
            fuel_type: row.get("fuel_type")?,
            dealer_center: row.get("dealer_center")?,
            mileage: if is_used { row.get("mileage")? } else { None },
            is_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_initializes_idempotently() {
        let db = Database::in_memory().unwrap();
        // A second initialization against the same connection must not fail.
        db.initialize_schema().unwrap();
        assert!(db.health_check().unwrap());
    }

    #[test]
    fn file_backed_database_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("catalog.db")).unwrap();
        assert!(db.health_check().unwrap());
    }
}
