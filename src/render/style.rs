use super::surface::Rgb;
use crate::audio::notes::TOTAL_NOTES;

/// Maps a key and its loudness to how its mark looks.
pub trait NoteStyle {
    fn color(&self, key: usize, loudness: f32) -> Rgb;

    fn radius(&self, loudness: f32) -> f32 {
        (255.0 * sanitize(loudness) / 15.0).round()
    }
}

/// Hue cycles with the pitch class, brightness rises with loudness and key.
#[derive(Clone, Copy, Debug)]
pub struct PitchClassStyle {
    pub brightness: f32,
}

impl NoteStyle for PitchClassStyle {
    fn color(&self, key: usize, loudness: f32) -> Rgb {
        let loudness = sanitize(loudness);
        let tone = (key % 12) as f32 / 12.0;
        let brightness = self.brightness + key as f32 / TOTAL_NOTES as f32;
        let pi = std::f32::consts::PI;

        let channel = |phase: f32| {
            let base = (tone * pi + phase * pi).sin().clamp(0.0, 1.0);
            let value = (base * 255.0 * loudness * brightness).round().clamp(0.0, 255.0);
            if value.is_finite() {
                value as u8
            } else {
                0
            }
        };

        Rgb::new(channel(0.0), channel(0.5), channel(1.3))
    }
}

/// Clamps loudness into [0, 1]; non-finite values count as silence.
pub fn sanitize(loudness: f32) -> f32 {
    if loudness.is_finite() {
        loudness.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_black_and_dotless() {
        let style = PitchClassStyle { brightness: 0.5 };
        for key in [0, 11, 49, 107] {
            assert_eq!(style.color(key, 0.0), Rgb::BLACK);
        }
        assert_eq!(style.radius(0.0), 0.0);
    }

    #[test]
    fn nan_loudness_is_treated_as_silence() {
        let style = PitchClassStyle { brightness: 0.5 };
        assert_eq!(style.color(30, f32::NAN), Rgb::BLACK);
        assert_eq!(style.radius(f32::NAN), 0.0);
    }

    #[test]
    fn radius_saturates_at_full_loudness() {
        let style = PitchClassStyle { brightness: 0.5 };
        assert_eq!(style.radius(1.0), 17.0);
        assert_eq!(style.radius(3.0), 17.0);
    }

    #[test]
    fn pitch_class_changes_hue() {
        let style = PitchClassStyle { brightness: 0.8 };
        // Same octave position, different pitch class
        assert_ne!(style.color(48, 1.0), style.color(54, 1.0));
        // Key 0 has tone 0, so its red channel is sin(0)
        assert_eq!(style.color(0, 1.0).r, 0);
    }
}
