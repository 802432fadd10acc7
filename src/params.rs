//! Painter knobs.
//!
//! Every knob has a name, a range and a default, and is read live once per
//! frame through [`ParameterSet`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::audio::notes::{AliasPolicy, MapperParams, TOTAL_NOTES};

#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("unknown parameter '{0}'")]
    Unknown(String),
    #[error("expected name=value, got '{0}'")]
    Malformed(String),
    #[error("invalid value '{value}' for {param}")]
    InvalidValue { param: Param, value: String },
    #[error("emphasis needs at least 2 points, got {0}")]
    TooFewEmphasisPoints(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Param {
    Emphasis,
    NoiseReduction,
    NoteSize,
    Drift,
    Brightness,
    Smoothing,
    Zoom,
    SyncDelay,
}

impl Param {
    pub const ALL: [Param; 8] = [
        Param::Emphasis,
        Param::NoiseReduction,
        Param::NoteSize,
        Param::Drift,
        Param::Brightness,
        Param::Smoothing,
        Param::Zoom,
        Param::SyncDelay,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Param::Emphasis => "emphasis",
            Param::NoiseReduction => "noise_reduction",
            Param::NoteSize => "note_size",
            Param::Drift => "drift",
            Param::Brightness => "brightness",
            Param::Smoothing => "smoothing",
            Param::Zoom => "zoom",
            Param::SyncDelay => "sync_delay",
        }
    }

    pub fn range(self) -> (f32, f32) {
        match self {
            Param::Emphasis => (0.0, TOTAL_NOTES as f32),
            Param::NoiseReduction => (2.0, 20.0),
            Param::NoteSize => (0.2, 1.0),
            Param::Drift => (0.0, 10.0),
            Param::Brightness => (0.1, 0.8),
            Param::Smoothing => (0.0, 0.8),
            Param::Zoom => (0.5, 2.0),
            Param::SyncDelay => (0.0, 3.0),
        }
    }

    fn clamp(self, value: f32) -> f32 {
        let (min, max) = self.range();
        let clamped = value.clamp(min, max);
        if clamped != value {
            log::warn!("{} = {} is outside [{}, {}], using {}", self, value, min, max, clamped);
        }
        clamped
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Param {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        Param::ALL
            .into_iter()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| ParamError::Unknown(s.to_string()))
    }
}

/// Read-only view of the live knobs.
pub trait ParameterSet {
    fn scalar(&self, param: Param) -> f32;

    fn emphasis(&self) -> &[f32];

    fn mapper_params(&self, alias_policy: AliasPolicy) -> MapperParams {
        MapperParams {
            emphasis: self.emphasis().to_vec(),
            noise_reduction: self.scalar(Param::NoiseReduction),
            note_size: self.scalar(Param::NoteSize),
            smoothing: self.scalar(Param::Smoothing),
            alias_policy,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Params {
    pub emphasis: Vec<f32>,
    pub noise_reduction: f32,
    pub note_size: f32,
    pub drift: f32,
    pub brightness: f32,
    pub smoothing: f32,
    pub zoom: f32,
    pub sync_delay: f32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            emphasis: vec![25.0, 54.0, 80.0],
            noise_reduction: 10.0,
            note_size: 0.6,
            drift: 4.0,
            brightness: 0.5,
            smoothing: 0.1,
            zoom: 1.0,
            sync_delay: 0.0,
        }
    }
}

impl ParameterSet for Params {
    fn scalar(&self, param: Param) -> f32 {
        match param {
            Param::Emphasis => self.emphasis.first().copied().unwrap_or(0.0),
            Param::NoiseReduction => self.noise_reduction,
            Param::NoteSize => self.note_size,
            Param::Drift => self.drift,
            Param::Brightness => self.brightness,
            Param::Smoothing => self.smoothing,
            Param::Zoom => self.zoom,
            Param::SyncDelay => self.sync_delay,
        }
    }

    fn emphasis(&self) -> &[f32] {
        &self.emphasis
    }
}

impl Params {
    /// Sets one knob from its textual value, clamped into range.
    pub fn set(&mut self, param: Param, value: &str) -> Result<(), ParamError> {
        let invalid = || ParamError::InvalidValue {
            param,
            value: value.to_string(),
        };

        if param == Param::Emphasis {
            let points = value
                .split(',')
                .map(|v| v.trim().parse::<f32>().ok().filter(|p| p.is_finite()))
                .collect::<Option<Vec<f32>>>()
                .ok_or_else(invalid)?;
            if points.len() < 2 {
                return Err(ParamError::TooFewEmphasisPoints(points.len()));
            }
            self.emphasis = points.into_iter().map(|p| param.clamp(p)).collect();
            return Ok(());
        }

        let parsed: f32 = value
            .trim()
            .parse()
            .ok()
            .filter(|v: &f32| v.is_finite())
            .ok_or_else(invalid)?;
        let v = param.clamp(parsed);
        match param {
            Param::Emphasis => unreachable!("handled above"),
            Param::NoiseReduction => self.noise_reduction = v,
            Param::NoteSize => self.note_size = v,
            Param::Drift => self.drift = v,
            Param::Brightness => self.brightness = v,
            Param::Smoothing => self.smoothing = v,
            Param::Zoom => self.zoom = v,
            Param::SyncDelay => self.sync_delay = v,
        }
        Ok(())
    }

    /// Applies `name=value` overrides in order.
    pub fn apply_overrides<S: AsRef<str>>(&mut self, overrides: &[S]) -> Result<(), ParamError> {
        for raw in overrides {
            let raw = raw.as_ref();
            let (name, value) = raw
                .split_once('=')
                .ok_or_else(|| ParamError::Malformed(raw.to_string()))?;
            self.set(name.parse()?, value)?;
        }
        Ok(())
    }

    /// Applies a preset or config parameter table, skipping entries that
    /// fail.
    pub fn apply_table(&mut self, table: &HashMap<String, serde_json::Value>) {
        for (name, value) in table {
            let text = match value {
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(value_text)
                    .collect::<Vec<_>>()
                    .join(","),
                other => value_text(other),
            };
            let result = name.parse().and_then(|param| self.set(param, &text));
            if let Err(err) = result {
                log::warn!("Ignoring preset parameter: {}", err);
            }
        }
    }
}

/// Strings are taken as written, without JSON quotes.
fn value_text(value: &serde_json::Value) -> String {
    match value.as_str() {
        Some(text) => text.to_string(),
        None => value.to_string(),
    }
}
