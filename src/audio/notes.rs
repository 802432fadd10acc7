//! Spectrum to note-energy mapping.
//!
//! Turns one analyser snapshot (0-255 magnitude per frequency bin) into a
//! fixed grid of [`TOTAL_NOTES`] semitone energies, shaped by the emphasis
//! points, the zone noise reduction and release smoothing.

use serde::Deserialize;

/// Number of keys on the pitch grid.
pub const TOTAL_NOTES: usize = 108;

/// Key index of A4 (440 Hz).
pub const REFERENCE_KEY: i64 = 49;
pub const REFERENCE_FREQUENCY: f32 = 440.0;

/// Height of the emphasis bias curve per emphasis point.
pub const EMPHASIS_WEIGHT: f32 = 2.0;

/// A zone whose loudest note is at or below this is treated as silent.
pub const NOISE_FLOOR_EPSILON: f32 = 1e-6;

pub type NoteVector = [f32; TOTAL_NOTES];

pub const SILENCE: NoteVector = [0.0; TOTAL_NOTES];

/// How several spectrum bins that land on the same key are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasPolicy {
    /// The last bin in iteration order wins.
    #[default]
    Overwrite,
    /// Mean of every bin mapping to the key.
    Average,
}

/// Per-frame inputs of the mapper, read from the live parameter set.
#[derive(Clone, Debug)]
pub struct MapperParams {
    pub emphasis: Vec<f32>,
    pub noise_reduction: f32,
    pub note_size: f32,
    pub smoothing: f32,
    pub alias_policy: AliasPolicy,
}

/// Standard normal density.
pub fn gaussian(x: f32) -> f32 {
    (-x * x / 2.0).exp() / (2.0 * std::f32::consts::PI).sqrt()
}

pub fn lerp(a: f32, b: f32, alpha: f32) -> f32 {
    a + (b - a) * alpha
}

/// Loudness bias of `key` from the emphasis points.
pub fn emphasis_bias(key: f32, emphasis: &[f32]) -> f32 {
    let scale = 12.0 / TOTAL_NOTES as f32;
    emphasis
        .iter()
        .map(|&e| EMPHASIS_WEIGHT * gaussian((key - e) * scale))
        .sum()
}

/// Key a spectrum bin maps to, `None` when it falls off the grid.
pub fn key_for_bin(bin: usize, bin_count: usize, sample_rate: f32) -> Option<usize> {
    if bin_count == 0 {
        return None;
    }
    let frequency = bin as f32 / bin_count as f32 * sample_rate * 0.5;
    if frequency <= 0.0 || !frequency.is_finite() {
        return None;
    }
    let key = (12.0 * (frequency / REFERENCE_FREQUENCY).log2()).round() as i64 + REFERENCE_KEY;
    (0..TOTAL_NOTES as i64).contains(&key).then_some(key as usize)
}

/// Half-open key ranges the noise reduction works on.
///
/// Emphasis points are sorted and the rounded midpoints between neighbours
/// become zone boundaries. A boundary key belongs to the zone above it, so
/// every key lands in exactly one zone. Duplicate midpoints yield empty zones.
pub fn noise_zones(emphasis: &[f32]) -> Vec<std::ops::Range<usize>> {
    let mut sorted: Vec<f32> = emphasis.iter().copied().filter(|e| e.is_finite()).collect();
    sorted.sort_by(f32::total_cmp);

    let mut zones = Vec::with_capacity(sorted.len().max(1));
    let mut start = 0;
    for pair in sorted.windows(2) {
        let mid = ((pair[0] + pair[1]) / 2.0).round().clamp(0.0, TOTAL_NOTES as f32) as usize;
        zones.push(start..mid);
        start = mid;
    }
    zones.push(start..TOTAL_NOTES);
    zones
}

/// Suppresses every key relative to the loudest key of its zone.
pub fn reduce_noise(notes: &mut NoteVector, emphasis: &[f32], exponent: f32) {
    for zone in noise_zones(emphasis) {
        let slice = &mut notes[zone];
        let loudest = slice.iter().copied().fold(0.0f32, f32::max);

        if loudest <= NOISE_FLOOR_EPSILON {
            slice.fill(0.0);
            continue;
        }

        for note in slice.iter_mut() {
            *note *= (*note / loudest).powf(exponent);
        }
    }
}

/// Release-only smoothing: falling keys are pulled back toward `previous`.
pub fn smooth_release(notes: &mut NoteVector, previous: &NoteVector, smoothing: f32) {
    let smoothing = smoothing.clamp(0.0, 1.0);
    for (note, &prev) in notes.iter_mut().zip(previous.iter()) {
        if *note < prev {
            *note = lerp(*note, prev, smoothing);
        }
    }
}

/// Maps one analyser snapshot to note energies.
pub fn map_spectrum_to_notes(
    spectrum: &[u8],
    sample_rate: f32,
    previous: &NoteVector,
    params: &MapperParams,
) -> NoteVector {
    let mut notes = SILENCE;
    let mut hits = [0u32; TOTAL_NOTES];

    for (bin, &magnitude) in spectrum.iter().enumerate() {
        let Some(key) = key_for_bin(bin, spectrum.len(), sample_rate) else {
            continue;
        };

        let loudness = 0.5 + emphasis_bias(key as f32, &params.emphasis);
        let value = (magnitude as f32 / 255.0) * loudness * params.note_size;

        match params.alias_policy {
            AliasPolicy::Overwrite => notes[key] = value,
            AliasPolicy::Average => {
                notes[key] += value;
                hits[key] += 1;
            }
        }
    }

    if params.alias_policy == AliasPolicy::Average {
        for (note, &count) in notes.iter_mut().zip(hits.iter()) {
            if count > 1 {
                *note /= count as f32;
            }
        }
    }

    reduce_noise(&mut notes, &params.emphasis, params.noise_reduction);
    smooth_release(&mut notes, previous, params.smoothing);

    for note in notes.iter_mut() {
        if !note.is_finite() || *note < 0.0 {
            *note = 0.0;
        }
    }

    notes
}

/// Largest energy in the vector, 0 for silence or garbage.
pub fn loudest(notes: &[f32]) -> f32 {
    notes
        .iter()
        .copied()
        .filter(|n| n.is_finite())
        .fold(0.0f32, f32::max)
}

/// Two-slot rolling note state swapped once per tick.
#[derive(Clone, Debug)]
pub struct NoteHistory {
    current: NoteVector,
    previous: NoteVector,
}

impl Default for NoteHistory {
    fn default() -> Self {
        Self {
            current: SILENCE,
            previous: SILENCE,
        }
    }
}

impl NoteHistory {
    pub fn current(&self) -> &NoteVector {
        &self.current
    }

    /// Maps a fresh snapshot against the last frame and rotates the slots.
    /// A missing snapshot maps as silence so the release tail still decays.
    pub fn advance(
        &mut self,
        spectrum: Option<&[u8]>,
        sample_rate: f32,
        params: &MapperParams,
    ) -> &NoteVector {
        let next = map_spectrum_to_notes(spectrum.unwrap_or(&[]), sample_rate, &self.current, params);
        self.previous = std::mem::replace(&mut self.current, next);
        &self.current
    }

    pub fn reset(&mut self) {
        self.current = SILENCE;
        self.previous = SILENCE;
    }
}
