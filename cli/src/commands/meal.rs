use anyhow::Result;
use std::process;

use dinner_core::models::{DATE_FORMAT, NewMeal};
use dinner_core::store::MealStore;

use super::helpers::{json_error, parse_date, print_meal_table};

pub(crate) fn cmd_add(
    store: &MealStore,
    meal: &str,
    date: Option<&str>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let added = store.add(&NewMeal {
        meal: meal.to_string(),
        date: Some(date.format(DATE_FORMAT).to_string()),
        notes,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&added)?);
    } else {
        let day = added.date.as_deref().unwrap_or("-");
        println!("Added \"{}\" on {day} (id {})", added.meal, added.id);
    }
    Ok(())
}

pub(crate) fn cmd_remove(store: &MealStore, id: &str, json: bool) -> Result<()> {
    let existing = store.get(id)?;
    if store.remove(id)? {
        if json {
            println!("{}", serde_json::json!({ "removed": id }));
        } else {
            let name = existing.map(|m| m.meal).unwrap_or_default();
            println!("Removed \"{name}\" ({id})");
        }
        Ok(())
    } else {
        if json {
            println!("{}", json_error(&format!("Meal {id} was not found")));
        } else {
            eprintln!("Meal {id} was not found");
        }
        process::exit(2);
    }
}

pub(crate) fn cmd_list(store: &MealStore, json: bool) -> Result<()> {
    let meals = store.list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
    } else if meals.is_empty() {
        println!("Your dinner plan is empty.");
    } else {
        print_meal_table(&meals);
        println!("{} meal(s) planned", meals.len());
    }
    Ok(())
}
