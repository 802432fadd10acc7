use super::analysis::AnalyserSettings;
use super::decode::AudioHandle;
use super::nodes::{Analyser, AudioSource, Delay, NodeHandle};

/// Rate of a context created before any audio is known.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Shared audio processing context.
///
/// Owns the clock every node reads and hands out node handles. The
/// application creates exactly one and passes it to whatever needs it.
pub struct AudioContext {
    sample_rate: u32,
    current_time: f64,
    next_handle: u32,
    destination: NodeHandle,
}

impl AudioContext {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            current_time: 0.0,
            next_handle: 1,
            destination: NodeHandle::new(0),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds since the context was created.
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Moves the clock forward. The clock never runs backwards.
    pub fn advance_to(&mut self, time: f64) {
        if time > self.current_time {
            self.current_time = time;
        }
    }

    pub fn destination(&self) -> NodeHandle {
        self.destination
    }

    fn allocate(&mut self) -> NodeHandle {
        let handle = NodeHandle::new(self.next_handle);
        self.next_handle += 1;
        handle
    }

    pub fn create_analyser(&mut self, settings: AnalyserSettings) -> Analyser {
        Analyser::new(self.allocate(), settings)
    }

    pub fn create_delay(&mut self, delay: f32) -> Delay {
        Delay::new(self.allocate(), delay)
    }

    pub fn create_source(&mut self, audio: AudioHandle) -> AudioSource {
        if audio.sample_rate != self.sample_rate {
            log::debug!(
                "Source at {}Hz in a {}Hz context, analysing at the source rate",
                audio.sample_rate, self.sample_rate
            );
        }
        AudioSource::new(self.allocate(), audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::nodes::AudioNode;

    #[test]
    fn handles_are_unique_and_never_the_destination() {
        let mut ctx = AudioContext::new(44100);
        let a = ctx.create_delay(0.0);
        let b = ctx.create_analyser(AnalyserSettings::default());
        assert_ne!(a.handle(), b.handle());
        assert_ne!(a.handle(), ctx.destination());
        assert_ne!(b.handle(), ctx.destination());
    }

    #[test]
    fn clock_is_monotonic() {
        let mut ctx = AudioContext::new(48000);
        ctx.advance_to(1.5);
        ctx.advance_to(1.0);
        assert_eq!(ctx.current_time(), 1.5);
    }
}
