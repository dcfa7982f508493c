//! Widget-side state reconciliation.
//!
//! The widget sees two independently arriving inputs: the structured content
//! of the latest tool call and its own previously cached state. [`merge`]
//! folds one delivery into the cached state; [`Reconciler`] owns that state
//! between deliveries and applies local edits to it.
//!
//! Precedence: a cached state wins on load. After that, any payload that
//! differs from the one the state last applied replaces the view wholesale,
//! local edits included. Redelivery of the applied payload is a no-op, so
//! edits in progress survive duplicate pushes from the host.

use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::IdGenerator;
use crate::models::Meal;

/// One row of tool output as the widget receives it. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadMeal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl PayloadMeal {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let field = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            id: field("id").filter(|id| !id.is_empty()),
            date: field("date"),
            meal: field("meal"),
            notes: field("notes"),
        })
    }
}

impl From<&Meal> for PayloadMeal {
    fn from(meal: &Meal) -> Self {
        Self {
            id: Some(meal.id.clone()),
            date: meal.date.clone(),
            meal: Some(meal.meal.clone()),
            notes: meal.notes.clone(),
        }
    }
}

/// Structured content of a tool result: `{ "meals": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealsPayload {
    pub meals: Vec<PayloadMeal>,
}

impl MealsPayload {
    /// Lenient parse. Anything without a `meals` array is treated as absent;
    /// non-object entries inside the array are skipped.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let items = value.get("meals")?.as_array()?;
        Some(Self {
            meals: items.iter().filter_map(PayloadMeal::from_value).collect(),
        })
    }
}

impl From<&[Meal]> for MealsPayload {
    fn from(meals: &[Meal]) -> Self {
        Self {
            meals: meals.iter().map(PayloadMeal::from).collect(),
        }
    }
}

/// The cached view model the widget persists between renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetState {
    pub meals: Vec<Meal>,
    #[serde(default)]
    pub expanded: BTreeSet<String>,
    /// The server payload this state was last rebuilt from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied: Option<MealsPayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The payload was new and replaced the view.
    Applied,
    /// The payload matched the last applied one; nothing changed.
    Unchanged,
    /// No usable payload was delivered.
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MealField {
    Meal,
    Date,
    Notes,
}

impl FromStr for MealField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "meal" => Ok(Self::Meal),
            "date" => Ok(Self::Date),
            "notes" => Ok(Self::Notes),
            _ => bail!("Invalid field '{s}'. Must be one of: meal, date, notes"),
        }
    }
}

/// Fold one delivery into the cached state.
pub fn merge(
    cached: WidgetState,
    incoming: Option<&MealsPayload>,
    ids: &dyn IdGenerator,
) -> (WidgetState, Delivery) {
    let Some(payload) = incoming else {
        return (cached, Delivery::Absent);
    };
    if cached.applied.as_ref() == Some(payload) {
        return (cached, Delivery::Unchanged);
    }

    // Server ids are reserved up front so a generated id never claims one
    // that appears later in the payload.
    let mut seen: HashSet<String> = payload.meals.iter().filter_map(|r| r.id.clone()).collect();
    let mut kept = HashSet::new();
    let meals: Vec<Meal> = payload
        .meals
        .iter()
        .map(|row| {
            let id = match &row.id {
                Some(id) if kept.insert(id.clone()) => id.clone(),
                _ => unused_id(ids, &mut seen),
            };
            Meal {
                id,
                date: row.date.clone(),
                meal: row.meal.clone().unwrap_or_default(),
                notes: row.notes.clone(),
            }
        })
        .collect();

    let expanded = cached
        .expanded
        .into_iter()
        .filter(|id| seen.contains(id))
        .collect();

    let state = WidgetState {
        meals,
        expanded,
        applied: Some(payload.clone()),
    };
    (state, Delivery::Applied)
}

fn unused_id(ids: &dyn IdGenerator, seen: &mut HashSet<String>) -> String {
    loop {
        let id = ids.next_id();
        if seen.insert(id.clone()) {
            return id;
        }
    }
}

pub struct Reconciler {
    state: WidgetState,
    ids: Arc<dyn IdGenerator>,
}

impl Reconciler {
    /// Build the initial view from the cached state and the tool output
    /// present at load time.
    ///
    /// A cached state without an applied baseline adopts `incoming` as one, so
    /// the cache wins. A cached state whose baseline differs from `incoming`
    /// is overwritten like any later delivery.
    pub fn load(
        cached: Option<WidgetState>,
        incoming: Option<MealsPayload>,
        ids: Arc<dyn IdGenerator>,
    ) -> (Self, Delivery) {
        let state = match cached {
            Some(mut cached) => {
                if cached.applied.is_none() {
                    cached.applied.clone_from(&incoming);
                }
                cached
            }
            None => WidgetState::default(),
        };
        let mut reconciler = Self { state, ids };
        let delivery = reconciler.deliver(incoming.as_ref());
        (reconciler, delivery)
    }

    pub fn deliver(&mut self, incoming: Option<&MealsPayload>) -> Delivery {
        let cached = std::mem::take(&mut self.state);
        let (next, delivery) = merge(cached, incoming, self.ids.as_ref());
        self.state = next;
        delivery
    }

    #[must_use]
    pub fn state(&self) -> &WidgetState {
        &self.state
    }

    #[must_use]
    pub fn into_state(self) -> WidgetState {
        self.state
    }

    /// Insert an empty row at the top and return its id.
    pub fn add_blank(&mut self) -> String {
        let mut taken: HashSet<String> = self.state.meals.iter().map(|m| m.id.clone()).collect();
        let id = unused_id(self.ids.as_ref(), &mut taken);
        self.state.meals.insert(0, Meal::blank(id.clone()));
        id
    }

    /// Returns false when no row has that id. Empty dates and notes clear the
    /// field; an empty meal name is kept as typed.
    pub fn edit(&mut self, id: &str, field: MealField, value: &str) -> bool {
        let Some(meal) = self.state.meals.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        let optional = || Some(value.to_string()).filter(|v| !v.trim().is_empty());
        match field {
            MealField::Meal => meal.meal = value.to_string(),
            MealField::Date => meal.date = optional(),
            MealField::Notes => meal.notes = optional(),
        }
        true
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.state.meals.len();
        self.state.meals.retain(|m| m.id != id);
        self.state.expanded.remove(id);
        self.state.meals.len() != before
    }

    /// Flip a row's expanded flag. Returns the new flag, or `None` for an
    /// unknown id.
    pub fn toggle_expanded(&mut self, id: &str) -> Option<bool> {
        if !self.state.meals.iter().any(|m| m.id == id) {
            return None;
        }
        if self.state.expanded.remove(id) {
            Some(false)
        } else {
            self.state.expanded.insert(id.to_string());
            Some(true)
        }
    }
}
