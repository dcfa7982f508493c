//! The three dinner-plan tools and their result envelopes.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::mcp::{CallToolResult, ContentBlock, Tool};
use crate::widget::WidgetTemplate;
use dinner_core::models::{Meal, NewMeal, ValidationError};
use dinner_core::store::MealStore;

#[derive(Debug, Deserialize)]
struct RemoveMealInput {
    #[serde(default)]
    id: Option<String>,
}

pub struct ToolDispatcher {
    store: Arc<MealStore>,
    widget: Arc<WidgetTemplate>,
}

impl ToolDispatcher {
    pub fn new(store: Arc<MealStore>, widget: Arc<WidgetTemplate>) -> Self {
        Self { store, widget }
    }

    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            Tool {
                name: "add_meal".to_string(),
                title: "Add meal to dinner plan".to_string(),
                description: "Adds a meal to the dinner plan.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "meal": { "type": "string", "description": "Name of the meal." },
                        "date": { "type": "string", "description": "Date of the meal (YYYY-MM-DD)." },
                        "notes": { "type": "string", "description": "Optional notes." },
                    },
                    "required": ["meal", "date"],
                    "additionalProperties": true,
                }),
                annotations: None,
                meta: Some(self.descriptor_meta("Adding meal", "Added meal")),
            },
            Tool {
                name: "remove_meal".to_string(),
                title: "Remove meal from dinner plan".to_string(),
                description: "Removes a meal from the dinner plan by id.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "description": "Id of the meal to remove." },
                    },
                    "required": ["id"],
                    "additionalProperties": true,
                }),
                annotations: None,
                meta: Some(self.descriptor_meta("Removing meal", "Removed meal")),
            },
            Tool {
                name: "show_meals".to_string(),
                title: "Show dinner plan".to_string(),
                description: "Shows the current dinner plan with all scheduled meals.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {},
                    "additionalProperties": true,
                }),
                annotations: Some(json!({
                    "readOnlyHint": true,
                    "destructiveHint": false,
                    "openWorldHint": false,
                })),
                meta: Some(self.descriptor_meta("Showing meal plan", "Showed meal plan")),
            },
        ]
    }

    /// Run one tool. Failures never escape as JSON-RPC errors; they come back
    /// as results with `isError` set.
    pub fn call(&self, name: &str, arguments: Option<Value>) -> CallToolResult {
        tracing::info!(tool = name, "tool call");
        let arguments = arguments.unwrap_or_else(|| json!({}));
        let outcome = match name {
            "add_meal" => self.add_meal(arguments),
            "remove_meal" => self.remove_meal(arguments),
            "show_meals" => self.show_meals(),
            other => return error_result(format!("Unknown tool: {other}")),
        };
        outcome.unwrap_or_else(|err| {
            if let Some(invalid) = err.downcast_ref::<ValidationError>() {
                tracing::warn!(tool = name, "rejected: {invalid}");
                return error_result(format!("Input validation error: {invalid}"));
            }
            if let Some(bad_args) = err.downcast_ref::<serde_json::Error>() {
                tracing::warn!(tool = name, "bad arguments: {bad_args}");
                return error_result(format!("Input validation error: {bad_args}"));
            }
            tracing::error!(tool = name, "tool failed: {err:#}");
            error_result("Internal error while updating the dinner plan.".to_string())
        })
    }

    fn add_meal(&self, arguments: Value) -> anyhow::Result<CallToolResult> {
        let new: NewMeal = serde_json::from_value(arguments)?;
        let meal = self.store.add(&new)?;
        let meals = self.store.list()?;
        Ok(self.success(
            format!("Added \"{}\".", meal.meal),
            json!({ "meal": meal, "meals": meals }),
        ))
    }

    fn remove_meal(&self, arguments: Value) -> anyhow::Result<CallToolResult> {
        let input: RemoveMealInput = serde_json::from_value(arguments)?;
        let Some(id) = input.id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty()) else {
            return Ok(error_result("Missing meal id.".to_string()));
        };

        let existing = self.store.get(&id)?;
        let removed = self.store.remove(&id)?;
        let message = match existing {
            Some(meal) if removed => format!("Removed \"{}\".", meal.meal),
            _ => format!("Meal {id} was not found."),
        };
        let meals = self.store.list()?;
        Ok(self.success(message, json!({ "removed": removed, "meals": meals })))
    }

    fn show_meals(&self) -> anyhow::Result<CallToolResult> {
        let meals = self.store.list()?;
        Ok(self.success(plan_summary(&meals), json!({ "meals": meals })))
    }

    fn success(&self, message: String, structured: Value) -> CallToolResult {
        CallToolResult {
            content: vec![ContentBlock::Text { text: message }],
            structured_content: Some(structured),
            is_error: false,
            meta: Some(json!({
                "openai.com/widget": self.widget.embedded(),
                "openai/outputTemplate": self.widget.uri,
                "openai/widgetAccessible": true,
                "openai/resultCanProduceWidget": true,
            })),
        }
    }

    fn descriptor_meta(&self, invoking: &str, invoked: &str) -> Value {
        json!({
            "openai/outputTemplate": self.widget.uri,
            "openai/toolInvocation/invoking": invoking,
            "openai/toolInvocation/invoked": invoked,
            "openai/widgetAccessible": true,
            "openai/resultCanProduceWidget": true,
        })
    }
}

fn plan_summary(meals: &[Meal]) -> String {
    if meals.is_empty() {
        "Your dinner plan is empty.".to_string()
    } else {
        format!("You have {} meal(s) planned.", meals.len())
    }
}

fn error_result(message: String) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::Text { text: message }],
        structured_content: None,
        is_error: true,
        meta: None,
    }
}
