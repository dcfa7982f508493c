use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meal {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub meal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Meal {
    /// An empty row, as inserted by the widget before the user types anything.
    #[must_use]
    pub fn blank(id: String) -> Self {
        Self {
            id,
            date: None,
            meal: String::new(),
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewMeal {
    #[serde(default)]
    pub meal: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("meal name must not be empty")]
    MissingMeal,
    #[error("date is required (YYYY-MM-DD)")]
    MissingDate,
    #[error("invalid date '{0}'. Use YYYY-MM-DD")]
    InvalidDate(String),
}

/// A `NewMeal` that passed validation, with whitespace trimmed and empty notes dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidMeal {
    pub meal: String,
    pub date: NaiveDate,
    pub notes: Option<String>,
}

pub fn validate_new_meal(new: &NewMeal) -> Result<ValidMeal, ValidationError> {
    let meal = new.meal.trim();
    if meal.is_empty() {
        return Err(ValidationError::MissingMeal);
    }

    let date = new.date.as_deref().map(str::trim).unwrap_or_default();
    if date.is_empty() {
        return Err(ValidationError::MissingDate);
    }
    let date = parse_plan_date(date)?;

    let notes = new
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    Ok(ValidMeal {
        meal: meal.to_string(),
        date,
        notes,
    })
}

/// Strict `YYYY-MM-DD`. chrono alone accepts `2025-1-5`, which we reject.
pub fn parse_plan_date(s: &str) -> Result<NaiveDate, ValidationError> {
    let well_formed = s.len() == 10
        && s.bytes()
            .enumerate()
            .all(|(i, b)| if i == 4 || i == 7 { b == b'-' } else { b.is_ascii_digit() });
    if !well_formed {
        return Err(ValidationError::InvalidDate(s.to_string()));
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| ValidationError::InvalidDate(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_meal(meal: &str, date: Option<&str>, notes: Option<&str>) -> NewMeal {
        NewMeal {
            meal: meal.to_string(),
            date: date.map(str::to_string),
            notes: notes.map(str::to_string),
        }
    }

    #[test]
    fn test_validate_trims_fields() {
        let valid = validate_new_meal(&new_meal("  Tacos ", Some(" 2025-12-01 "), Some(" spicy ")))
            .unwrap();
        assert_eq!(valid.meal, "Tacos");
        assert_eq!(valid.date, NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());
        assert_eq!(valid.notes.as_deref(), Some("spicy"));
    }

    #[test]
    fn test_validate_empty_notes_become_none() {
        let valid = validate_new_meal(&new_meal("Soup", Some("2025-01-02"), Some("   "))).unwrap();
        assert_eq!(valid.notes, None);
    }

    #[test]
    fn test_validate_missing_meal() {
        assert_eq!(
            validate_new_meal(&new_meal("   ", Some("2025-01-02"), None)),
            Err(ValidationError::MissingMeal)
        );
    }

    #[test]
    fn test_validate_missing_date() {
        assert_eq!(
            validate_new_meal(&new_meal("Soup", None, None)),
            Err(ValidationError::MissingDate)
        );
        assert_eq!(
            validate_new_meal(&new_meal("Soup", Some(""), None)),
            Err(ValidationError::MissingDate)
        );
    }

    #[test]
    fn test_validate_malformed_date() {
        for bad in ["tomorrow", "2025-13-01", "2025-02-30", "2025-1-05", "01/02/2025"] {
            assert!(
                matches!(
                    validate_new_meal(&new_meal("Soup", Some(bad), None)),
                    Err(ValidationError::InvalidDate(_))
                ),
                "expected {bad} to be rejected"
            );
        }
    }

    #[test]
    fn test_meal_serialization_omits_absent_fields() {
        let meal = Meal {
            id: "meal-1".to_string(),
            date: None,
            meal: "Pasta".to_string(),
            notes: None,
        };
        let json = serde_json::to_value(&meal).unwrap();
        assert_eq!(json, serde_json::json!({ "id": "meal-1", "meal": "Pasta" }));
    }
}
