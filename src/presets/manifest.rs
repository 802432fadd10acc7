use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct PresetManifest {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Parameter name to value; emphasis takes an array.
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub default_effects: Vec<String>,
}
