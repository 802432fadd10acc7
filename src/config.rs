use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::audio::analysis::AnalyserSettings;
use crate::painter::PainterSettings;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub analyser: AnalyserSettings,
    #[serde(default)]
    pub painter: PainterSettings,
    /// Parameter overrides applied on top of the preset.
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub effects: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default)]
    pub font: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            crf: default_crf(),
            codec: default_codec(),
            pix_fmt: default_pix_fmt(),
            preset: default_preset(),
            font: None,
        }
    }
}

pub fn default_width() -> u32 { 1280 }
pub fn default_height() -> u32 { 720 }
pub fn default_fps() -> u32 { 30 }
pub fn default_crf() -> u32 { 18 }
pub fn default_codec() -> String { "libx264".into() }
pub fn default_pix_fmt() -> String { "yuv420p".into() }
pub fn default_preset() -> String { "default".into() }

/// `--config`, then `./soundpaint.toml`, then the per-user config files.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("soundpaint.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("soundpaint").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("soundpaint").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::notes::AliasPolicy;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.output.width, 1280);
        assert_eq!(config.output.preset, "default");
        assert_eq!(config.analyser.fft_size, 2048);
        assert_eq!(config.painter.scroll_step, 5);
        assert!(config.params.is_empty());
        assert!(config.effects.is_empty());
    }

    #[test]
    fn sections_are_read() {
        let config: Config = toml::from_str(
            r#"
            effects = ["dreamy"]

            [output]
            fps = 60
            font = "/fonts/mono.ttf"

            [analyser]
            fft_size = 4096
            smoothing_time_constant = 0.5

            [painter]
            alias_policy = "average"
            seed = 42
            show_emphasis_graph = true

            [params]
            emphasis = [20, 40, 60]
            sync_delay = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.output.fps, 60);
        assert_eq!(config.output.width, 1280);
        assert_eq!(config.output.font, Some(PathBuf::from("/fonts/mono.ttf")));
        assert_eq!(config.analyser.fft_size, 4096);
        assert_eq!(config.analyser.min_db, -100.0);
        assert_eq!(config.painter.alias_policy, AliasPolicy::Average);
        assert_eq!(config.painter.seed, Some(42));
        assert!(config.painter.show_emphasis_graph);
        assert_eq!(config.params.len(), 2);
        assert_eq!(config.effects, vec!["dreamy"]);

        let mut params = crate::params::Params::default();
        params.apply_table(&config.params);
        assert_eq!(params.emphasis, vec![20.0, 40.0, 60.0]);
        assert_eq!(params.sync_delay, 0.5);
    }

    #[test]
    fn unreadable_or_invalid_config_is_none() {
        assert!(load_config(Path::new("/nonexistent/soundpaint.toml")).is_none());

        let path = std::env::temp_dir().join(format!("soundpaint-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "output = 3").unwrap();
        assert!(load_config(&path).is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn explicit_path_wins() {
        let path = Path::new("/somewhere/custom.toml");
        assert_eq!(find_config(Some(path)), Some(path.to_path_buf()));
    }
}
