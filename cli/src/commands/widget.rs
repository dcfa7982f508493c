use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tabled::{Table, Tabled, settings::Style};

use dinner_core::ids::RandomIds;
use dinner_core::reconcile::{Delivery, MealField, MealsPayload, Reconciler, WidgetState};

use super::helpers::truncate;

/// A local edit applied after reconciliation.
pub(crate) enum WidgetAction {
    Add,
    Edit {
        id: String,
        field: MealField,
        value: String,
    },
    Delete {
        id: String,
    },
    Toggle {
        id: String,
    },
}

pub(crate) fn cmd_widget(
    tool_output: Option<&Path>,
    state_path: &Path,
    action: Option<WidgetAction>,
    json: bool,
) -> Result<()> {
    let incoming = tool_output.map(read_tool_output).transpose()?.flatten();
    let cached = load_state(state_path)?;

    let (mut reconciler, delivery) = Reconciler::load(cached, incoming, Arc::new(RandomIds::new()));
    tracing::debug!(?delivery, "widget state reconciled");

    let note = match action {
        None => None,
        Some(WidgetAction::Add) => Some(format!("Added row {}", reconciler.add_blank())),
        Some(WidgetAction::Edit { id, field, value }) => {
            if !reconciler.edit(&id, field, &value) {
                bail!("No meal with id '{id}' in the widget state");
            }
            Some(format!("Updated {id}"))
        }
        Some(WidgetAction::Delete { id }) => {
            if !reconciler.delete(&id) {
                bail!("No meal with id '{id}' in the widget state");
            }
            Some(format!("Deleted {id}"))
        }
        Some(WidgetAction::Toggle { id }) => match reconciler.toggle_expanded(&id) {
            Some(true) => Some(format!("Expanded {id}")),
            Some(false) => Some(format!("Collapsed {id}")),
            None => bail!("No meal with id '{id}' in the widget state"),
        },
    };

    let state = reconciler.into_state();
    save_state(state_path, &state)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        println!("{}", describe(delivery));
        if let Some(note) = note {
            println!("{note}");
        }
        println!("{}", render(&state));
    }
    Ok(())
}

fn describe(delivery: Delivery) -> &'static str {
    match delivery {
        Delivery::Applied => "Applied new tool output.",
        Delivery::Unchanged => "Tool output unchanged; kept local edits.",
        Delivery::Absent => "No tool output; showing cached state.",
    }
}

/// Read a tool output file. Accepts either the bare structured content or a
/// whole `tools/call` result carrying `structuredContent`. A file without a
/// usable `meals` array yields `None`.
pub(crate) fn read_tool_output(path: &Path) -> Result<Option<MealsPayload>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tool output: {}", path.display()))?;
    let value: Value = serde_json::from_str(&data)
        .with_context(|| format!("Invalid JSON in tool output: {}", path.display()))?;

    let content = value.get("structuredContent").unwrap_or(&value);
    let payload = MealsPayload::from_value(content);
    if payload.is_none() {
        tracing::warn!(path = %path.display(), "tool output has no meals array, ignoring it");
    }
    Ok(payload)
}

pub(crate) fn load_state(path: &Path) -> Result<Option<WidgetState>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read widget state: {}", path.display()))?;
    match serde_json::from_str(&data) {
        Ok(state) => Ok(Some(state)),
        Err(e) => {
            tracing::warn!(path = %path.display(), "discarding unreadable widget state: {e}");
            Ok(None)
        }
    }
}

pub(crate) fn save_state(path: &Path, state: &WidgetState) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let data = serde_json::to_string_pretty(state)?;
    std::fs::write(path, data)
        .with_context(|| format!("Failed to write widget state: {}", path.display()))
}

pub(crate) fn render(state: &WidgetState) -> String {
    #[derive(Tabled)]
    struct WidgetRow {
        #[tabled(rename = "")]
        marker: &'static str,
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Notes")]
        notes: String,
    }

    if state.meals.is_empty() {
        return "Your dinner plan is empty.".to_string();
    }

    let rows: Vec<WidgetRow> = state
        .meals
        .iter()
        .map(|m| {
            let expanded = state.expanded.contains(&m.id);
            let notes = match (&m.notes, expanded) {
                (Some(n), true) => n.clone(),
                (Some(_), false) => "…".to_string(),
                (None, _) => String::new(),
            };
            WidgetRow {
                marker: if expanded { "▾" } else { "▸" },
                id: m.id.clone(),
                date: m.date.clone().unwrap_or_else(|| "-".to_string()),
                meal: if m.meal.trim().is_empty() {
                    "(untitled)".to_string()
                } else {
                    truncate(&m.meal, 40)
                },
                notes,
            }
        })
        .collect();

    Table::new(&rows).with(Style::rounded()).to_string()
}
