use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::embedded::{embedded_preset, embedded_presets};
use super::manifest::PresetManifest;

/// User presets live next to the global config file.
pub fn user_presets_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("soundpaint").join("presets"))
}

fn user_preset_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if !dir.exists() {
        return Ok(names);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            names.push(stem.to_string());
        }
    }
    Ok(names)
}

/// Built-in and user preset names, sorted and deduplicated.
pub fn list_presets() -> Result<Vec<String>> {
    let user_dir = user_presets_dir();
    list_presets_in(user_dir.as_deref())
}

fn list_presets_in(user_dir: Option<&Path>) -> Result<Vec<String>> {
    let mut names: Vec<String> = embedded_presets()
        .iter()
        .map(|(name, _)| name.to_string())
        .collect();
    if let Some(dir) = user_dir {
        names.extend(user_preset_names(dir)?);
    }
    names.sort();
    names.dedup();
    Ok(names)
}

/// Loads a preset by name. A user preset shadows a built-in one.
pub fn load_preset(name: &str) -> Result<PresetManifest> {
    let user_dir = user_presets_dir();
    load_preset_in(name, user_dir.as_deref())
}

fn load_preset_in(name: &str, user_dir: Option<&Path>) -> Result<PresetManifest> {
    if let Some(dir) = user_dir {
        let path = dir.join(format!("{}.json", name));
        if path.exists() {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read preset: {}", path.display()))?;
            log::debug!("Using user preset {}", path.display());
            return parse_preset(&json)
                .with_context(|| format!("Failed to parse preset: {}", path.display()));
        }
    }

    match embedded_preset(name) {
        Some(json) => parse_preset(json)
            .with_context(|| format!("Failed to parse built-in preset '{}'", name)),
        None => anyhow::bail!(
            "Preset '{}' not found. Available presets: {:?}",
            name,
            list_presets_in(user_dir).unwrap_or_default()
        ),
    }
}

fn parse_preset(json: &str) -> Result<PresetManifest> {
    Ok(serde_json::from_str(json)?)
}
