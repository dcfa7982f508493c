use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use dinner_core::models::{DATE_FORMAT, Meal};

/// Resolve `--date`, defaulting to today. Accepts YYYY-MM-DD or today/yesterday/tomorrow.
pub(crate) fn parse_date(date_str: Option<&str>) -> Result<NaiveDate> {
    match date_str.map(str::trim) {
        None | Some("today") => Ok(Local::now().date_naive()),
        Some("yesterday") => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
        Some("tomorrow") => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
        Some(s) => NaiveDate::parse_from_str(s, DATE_FORMAT).with_context(|| {
            format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
        }),
    }
}

pub(crate) fn print_meal_table(meals: &[Meal]) {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Notes")]
        notes: String,
    }

    let rows: Vec<MealRow> = meals
        .iter()
        .map(|m| MealRow {
            id: m.id.clone(),
            date: m.date.clone().unwrap_or_else(|| "-".to_string()),
            meal: truncate(&m.meal, 40),
            notes: m.notes.as_deref().map(|n| truncate(n, 40)).unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
