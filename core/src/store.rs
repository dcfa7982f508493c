use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;

use crate::db::Database;
use crate::ids::{IdGenerator, RandomIds};
use crate::models::{Meal, NewMeal, validate_new_meal};

/// The authoritative meal plan.
///
/// Every operation takes the database lock for its whole duration, so
/// concurrent tool calls are serialized and cannot lose updates.
pub struct MealStore {
    db: Mutex<Database>,
    ids: Arc<dyn IdGenerator>,
}

impl MealStore {
    pub fn new(db: Database, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            db: Mutex::new(db),
            ids,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open(path)?, Arc::new(RandomIds::new())))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(
            Database::open_in_memory()?,
            Arc::new(RandomIds::new()),
        ))
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate and append a meal. A [`crate::models::ValidationError`] is
    /// returned (inside the `anyhow::Error`) when `meal` or `date` is missing
    /// or malformed; the plan is left untouched in that case.
    pub fn add(&self, new: &NewMeal) -> Result<Meal> {
        let valid = validate_new_meal(new)?;
        let db = self.db();
        // Injected generators may hand out an id that is already taken.
        let mut id = self.ids.next_id();
        while db.get_meal(&id)?.is_some() {
            id = self.ids.next_id();
        }
        db.insert_meal(&id, &valid)
    }

    pub fn remove(&self, id: &str) -> Result<bool> {
        self.db().delete_meal(id)
    }

    pub fn get(&self, id: &str) -> Result<Option<Meal>> {
        self.db().get_meal(id)
    }

    pub fn list(&self) -> Result<Vec<Meal>> {
        self.db().list_meals()
    }

    pub fn count(&self) -> Result<usize> {
        self.db().count_meals()
    }
}
