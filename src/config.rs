use serde::Deserialize;
use serde_json::Value;

/// Settings synchronized from the editor under the
/// `angular.component.extension` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Workspace-relative globs excluded from every sweep.
    pub ignore_globs: Vec<String>,
    /// Suppresses the informational index-count message.
    pub quiet: bool,
    /// Makes the definition resolver always return empty.
    pub disable_goto_definition: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ignore_globs: vec!["**/node_modules/**".to_string(), "**/dist/**".to_string()],
            quiet: false,
            disable_goto_definition: false,
        }
    }
}

impl ServerConfig {
    /// Reads the section out of a `didChangeConfiguration` settings blob or
    /// of `initialization_options`. Both the nested object form and a bare
    /// section object are accepted.
    pub fn from_settings(settings: &Value) -> Option<Self> {
        let section = settings
            .pointer("/angular/component/extension")
            .or_else(|| settings.get("angular.component.extension"))
            .unwrap_or(settings);
        serde_json::from_value(section.clone()).ok()
    }
}
