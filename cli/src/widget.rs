use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::mcp::{Resource, ResourceContents};

pub const TEMPLATE_URI: &str = "ui://widget/dinnercaster.html";
pub const MIME_TYPE: &str = "text/html+skybridge";
const COMPONENT: &str = "dinnercaster";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    File(PathBuf),
    /// No built widget was found; a shell pointing at `<base_url>/dinnercaster.js` is used.
    Generated,
}

/// The HTML template the host renders tool results with.
#[derive(Debug, Clone)]
pub struct WidgetTemplate {
    pub uri: String,
    pub html: String,
    pub source: TemplateSource,
}

impl WidgetTemplate {
    /// Load `<assets>/dinnercaster.html`, else the newest versioned
    /// `dinnercaster-*.html`, else generate a shell from `base_url`.
    pub fn load(assets_dir: &Path, base_url: &str) -> Result<Self> {
        let Some(path) = find_template(assets_dir)? else {
            return Ok(Self::generated(base_url));
        };
        let html = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read widget template: {}", path.display()))?;
        Ok(Self {
            uri: TEMPLATE_URI.to_string(),
            html,
            source: TemplateSource::File(path),
        })
    }

    pub fn generated(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let html = format!(
            "<div id=\"{COMPONENT}-root\"></div>\n\
             <link rel=\"stylesheet\" href=\"{base}/{COMPONENT}.css\">\n\
             <script type=\"module\" src=\"{base}/{COMPONENT}.js\"></script>\n"
        );
        Self {
            uri: TEMPLATE_URI.to_string(),
            html,
            source: TemplateSource::Generated,
        }
    }

    pub fn resource(&self) -> Resource {
        Resource {
            name: "dinner-widget".to_string(),
            title: "Dinner Planner Widget".to_string(),
            uri: self.uri.clone(),
            description: "Dinner planner widget markup".to_string(),
            mime_type: MIME_TYPE.to_string(),
            meta: Some(prefers_border()),
        }
    }

    pub fn contents(&self) -> ResourceContents {
        ResourceContents {
            uri: self.uri.clone(),
            mime_type: MIME_TYPE.to_string(),
            text: self.html.clone(),
            meta: Some(prefers_border()),
        }
    }

    /// The template as an embedded resource block, attached to tool results.
    pub fn embedded(&self) -> Value {
        json!({
            "type": "resource",
            "resource": {
                "uri": self.uri,
                "mimeType": MIME_TYPE,
                "text": self.html,
            }
        })
    }
}

fn prefers_border() -> Value {
    json!({ "openai/widgetPrefersBorder": true })
}

fn find_template(assets_dir: &Path) -> Result<Option<PathBuf>> {
    let exact = assets_dir.join(format!("{COMPONENT}.html"));
    if exact.is_file() {
        return Ok(Some(exact));
    }
    if !assets_dir.is_dir() {
        return Ok(None);
    }

    let prefix = format!("{COMPONENT}-");
    let mut versioned: Vec<PathBuf> = std::fs::read_dir(assets_dir)
        .with_context(|| format!("Failed to read assets directory: {}", assets_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".html"))
        })
        .collect();
    versioned.sort();
    Ok(versioned.pop())
}
