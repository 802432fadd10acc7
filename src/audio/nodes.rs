//! Audio graph nodes.
//!
//! Each node kind implements [`AudioNode`] on its own; there is no shared
//! base. Connections are recorded as handles, the signal itself is read
//! straight from the playing [`AudioSource`] at the lag of the tapping path.

use super::analysis::{AnalyserSettings, SpectrumAnalyzer};
use super::context::AudioContext;
use super::decode::AudioHandle;

/// Longest delay a [`Delay`] node accepts, in seconds.
pub const MAX_DELAY: f32 = 179.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeHandle(u32);

impl NodeHandle {
    pub(super) fn new(id: u32) -> Self {
        Self(id)
    }
}

pub trait AudioNode {
    fn handle(&self) -> NodeHandle;

    /// Where this node's output currently goes.
    fn output(&self) -> Option<NodeHandle>;

    fn connect(&mut self, target: NodeHandle) -> &mut Self
    where
        Self: Sized;

    fn disconnect(&mut self);
}

/// Anything that can hand out a byte spectrum every frame.
pub trait SpectrumSource {
    /// Current spectrum, `None` when there is nothing to analyse.
    fn snapshot(&mut self) -> Option<Vec<u8>>;

    fn sample_rate(&self) -> f32;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PlaybackState {
    Stopped,
    Playing,
}

/// Playback of one decoded file against the context clock.
pub struct AudioSource {
    handle: NodeHandle,
    output: Option<NodeHandle>,
    audio: AudioHandle,
    state: PlaybackState,
    started_at: f64,
}

impl AudioSource {
    pub(super) fn new(handle: NodeHandle, audio: AudioHandle) -> Self {
        Self {
            handle,
            output: None,
            audio,
            state: PlaybackState::Stopped,
            started_at: 0.0,
        }
    }

    pub fn audio(&self) -> &AudioHandle {
        &self.audio
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn play(&mut self, ctx: &AudioContext) {
        if self.state != PlaybackState::Playing {
            self.started_at = ctx.current_time();
            self.state = PlaybackState::Playing;
        }
    }

    pub fn stop(&mut self) {
        self.started_at = 0.0;
        self.state = PlaybackState::Stopped;
    }

    /// Playback position in seconds.
    pub fn position(&self, ctx: &AudioContext) -> f64 {
        match self.state {
            PlaybackState::Playing => ctx.current_time() - self.started_at,
            PlaybackState::Stopped => 0.0,
        }
    }

    /// Moves to `Stopped` once playback runs `tail` seconds past the end,
    /// so delayed paths can drain. Returns true on the call that observed
    /// the end.
    pub fn poll_ended(&mut self, ctx: &AudioContext, tail: f64) -> bool {
        if self.is_playing() && self.position(ctx) >= self.audio.duration() + tail.max(0.0) {
            self.stop();
            return true;
        }
        false
    }

    /// The `len` samples that end at `time` seconds, zero-filled outside
    /// the decoded range.
    pub fn window_ending_at(&self, time: f64, len: usize) -> Vec<f32> {
        let end = (time * self.audio.sample_rate as f64).floor() as i64;
        let start = end - len as i64;
        (start..end)
            .map(|i| {
                usize::try_from(i)
                    .ok()
                    .and_then(|i| self.audio.samples.get(i))
                    .copied()
                    .unwrap_or(0.0)
            })
            .collect()
    }
}

impl AudioNode for AudioSource {
    fn handle(&self) -> NodeHandle {
        self.handle
    }

    fn output(&self) -> Option<NodeHandle> {
        self.output
    }

    fn connect(&mut self, target: NodeHandle) -> &mut Self {
        self.output = Some(target);
        self
    }

    fn disconnect(&mut self) {
        self.output = None;
    }
}

/// Fixed signal delay.
pub struct Delay {
    handle: NodeHandle,
    output: Option<NodeHandle>,
    delay: f32,
}

impl Delay {
    pub(super) fn new(handle: NodeHandle, delay: f32) -> Self {
        let mut node = Self {
            handle,
            output: None,
            delay: 0.0,
        };
        node.set_delay(delay);
        node
    }

    pub fn delay(&self) -> f32 {
        self.delay
    }

    pub fn set_delay(&mut self, delay: f32) {
        self.delay = if delay.is_finite() {
            delay.clamp(0.0, MAX_DELAY)
        } else {
            0.0
        };
    }
}

impl AudioNode for Delay {
    fn handle(&self) -> NodeHandle {
        self.handle
    }

    fn output(&self) -> Option<NodeHandle> {
        self.output
    }

    fn connect(&mut self, target: NodeHandle) -> &mut Self {
        self.output = Some(target);
        self
    }

    fn disconnect(&mut self) {
        self.output = None;
    }
}

/// Spectrum tap on the signal path.
pub struct Analyser {
    handle: NodeHandle,
    output: Option<NodeHandle>,
    analyzer: SpectrumAnalyzer,
    lag: f64,
}

impl Analyser {
    pub(super) fn new(handle: NodeHandle, settings: AnalyserSettings) -> Self {
        Self {
            handle,
            output: None,
            analyzer: SpectrumAnalyzer::new(settings),
            lag: 0.0,
        }
    }

    /// Places the tap behind `delay`, so it hears the delayed signal.
    pub fn tap_after(&mut self, delay: &Delay) {
        self.lag = delay.delay() as f64;
    }

    /// Spectrum of `source` as heard at this tap right now.
    pub fn read(&mut self, ctx: &AudioContext, source: &AudioSource) -> Option<Vec<u8>> {
        if !source.is_playing() {
            return None;
        }
        let time = source.position(ctx) - self.lag;
        let window = source.window_ending_at(time, self.analyzer.fft_size());
        Some(self.analyzer.process(&window))
    }

    pub fn reset(&mut self) {
        self.analyzer.reset();
    }
}

impl AudioNode for Analyser {
    fn handle(&self) -> NodeHandle {
        self.handle
    }

    fn output(&self) -> Option<NodeHandle> {
        self.output
    }

    fn connect(&mut self, target: NodeHandle) -> &mut Self {
        self.output = Some(target);
        self
    }

    fn disconnect(&mut self) {
        self.output = None;
    }
}

/// An analyser reading a source for one frame.
pub struct AnalyserTap<'a> {
    pub analyser: &'a mut Analyser,
    pub source: Option<&'a AudioSource>,
    pub ctx: &'a AudioContext,
}

impl SpectrumSource for AnalyserTap<'_> {
    fn snapshot(&mut self) -> Option<Vec<u8>> {
        let source = self.source?;
        self.analyser.read(self.ctx, source)
    }

    /// Rate of the samples being analysed; the context rate when detached.
    fn sample_rate(&self) -> f32 {
        self.source
            .map_or(self.ctx.sample_rate(), |source| source.audio().sample_rate) as f32
    }
}
