use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{DATE_FORMAT, Meal, ValidMeal};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            // `seq` carries insertion order; `id` is the public key.
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS meals (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    date TEXT,
                    meal TEXT NOT NULL,
                    notes TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_meals_date ON meals(date);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // Expects columns: 0: id, 1: date, 2: meal, 3: notes
    fn meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<Meal> {
        Ok(Meal {
            id: row.get(0)?,
            date: row.get(1)?,
            meal: row.get(2)?,
            notes: row.get(3)?,
        })
    }

    pub fn insert_meal(&self, id: &str, meal: &ValidMeal) -> Result<Meal> {
        let now = Local::now().to_rfc3339();
        let date_str = meal.date.format(DATE_FORMAT).to_string();
        self.conn
            .execute(
                "INSERT INTO meals (id, date, meal, notes, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, date_str, meal.meal, meal.notes, now],
            )
            .with_context(|| format!("Failed to insert meal {id}"))?;
        self.get_meal(id)?
            .with_context(|| format!("Meal {id} missing after insert"))
    }

    pub fn get_meal(&self, id: &str) -> Result<Option<Meal>> {
        let meal = self
            .conn
            .query_row(
                "SELECT id, date, meal, notes FROM meals WHERE id = ?1",
                params![id],
                Self::meal_from_row,
            )
            .optional()?;
        Ok(meal)
    }

    pub fn delete_meal(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM meals WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub fn list_meals(&self) -> Result<Vec<Meal>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, date, meal, notes FROM meals ORDER BY seq")?;
        let meals = stmt
            .query_map([], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    pub fn count_meals(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM meals", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
