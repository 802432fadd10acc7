//! Frame driver tying the audio graph to the scroll compositor.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Deserialize;
use std::path::Path;

use crate::audio::analysis::AnalyserSettings;
use crate::audio::context::AudioContext;
use crate::audio::decode::{AudioHandle, LoadState, PendingAudio};
use crate::audio::nodes::{Analyser, AnalyserTap, AudioNode, AudioSource, Delay, SpectrumSource};
use crate::audio::notes::{AliasPolicy, MapperParams, NoteHistory};
use crate::params::{Param, ParameterSet};
use crate::render::compositor::{FrameParams, NoteLayer, ScrollCompositor, ScrollHead};
use crate::render::style::PitchClassStyle;
use crate::render::surface::{Canvas, Surface, SurfaceError};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PainterSettings {
    /// Pixels the head moves per frame
    pub scroll_step: u32,
    pub alias_policy: AliasPolicy,
    pub show_emphasis_graph: bool,
    /// Color multiplier for look-ahead marks
    pub preview_brightness: f32,
    /// Fixed rng seed for reproducible drift
    pub seed: Option<u64>,
}

impl Default for PainterSettings {
    fn default() -> Self {
        Self {
            scroll_step: 5,
            alias_policy: AliasPolicy::Overwrite,
            show_emphasis_graph: false,
            preview_brightness: 0.35,
            seed: None,
        }
    }
}

pub struct Painter {
    compositor: ScrollCompositor<Canvas>,
    head: ScrollHead,
    active: NoteHistory,
    preview: NoteHistory,
    source: Option<AudioSource>,
    active_analyser: Analyser,
    preview_analyser: Analyser,
    delay: Delay,
    rng: StdRng,
    settings: PainterSettings,
    fps: u32,
    playing: bool,
    warned_clamp: bool,
}

impl Painter {
    pub fn new(
        ctx: &mut AudioContext,
        width: u32,
        height: u32,
        fps: u32,
        settings: PainterSettings,
        analyser: AnalyserSettings,
    ) -> Result<Self, SurfaceError> {
        let compositor = ScrollCompositor::new(
            Canvas::new(width, height)?,
            Canvas::new(width, height)?,
            width,
            height,
            settings.scroll_step,
            settings.show_emphasis_graph,
        )?;
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            compositor,
            head: ScrollHead::new(settings.scroll_step),
            active: NoteHistory::default(),
            preview: NoteHistory::default(),
            source: None,
            active_analyser: ctx.create_analyser(analyser.clone()),
            preview_analyser: ctx.create_analyser(analyser),
            delay: ctx.create_delay(0.0),
            rng,
            settings,
            fps: fps.max(1),
            playing: false,
            warned_clamp: false,
        })
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Length of the loaded audio, zero before anything was played.
    pub fn duration(&self) -> f64 {
        self.source
            .as_ref()
            .map_or(0.0, |source| source.audio().duration())
    }

    pub fn width(&self) -> u32 {
        self.compositor.visible().width()
    }

    pub fn height(&self) -> u32 {
        self.compositor.visible().height()
    }

    /// New viewport size. Painted history is dropped and the head restarts.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        self.compositor.resize(width, height)?;
        self.head.reset();
        self.active.reset();
        self.preview.reset();
        Ok(())
    }

    /// Starts `audio` from the beginning, replacing whatever was playing.
    ///
    /// The graph is source -> preview tap -> delay -> active tap ->
    /// destination; the active tap hears what is audible, the preview tap
    /// hears it `sync_delay` seconds early.
    pub fn play(&mut self, ctx: &mut AudioContext, audio: AudioHandle, params: &dyn ParameterSet) {
        self.stop();
        self.preview_analyser.disconnect();
        self.delay.disconnect();
        self.active_analyser.disconnect();

        self.delay.set_delay(params.scalar(Param::SyncDelay));
        self.active_analyser.connect(ctx.destination());
        self.delay.connect(self.active_analyser.handle());
        self.preview_analyser.connect(self.delay.handle());
        self.active_analyser.tap_after(&self.delay);
        self.active_analyser.reset();
        self.preview_analyser.reset();

        let duration = audio.duration();
        let mut source = ctx.create_source(audio);
        source.connect(self.preview_analyser.handle()).play(ctx);
        self.source = Some(source);

        self.head.reset();
        self.active.reset();
        self.preview.reset();
        self.compositor.clear();
        self.warned_clamp = false;
        self.playing = true;

        log::debug!(
            "Playing {:.2}s of audio with {:.2}s sync delay",
            duration,
            self.delay.delay()
        );
    }

    /// Starts playback once a background decode is done. Returns whether
    /// playback started; a failed decode is an error.
    pub fn play_when_ready(
        &mut self,
        ctx: &mut AudioContext,
        pending: &mut PendingAudio,
        params: &dyn ParameterSet,
    ) -> Result<bool> {
        match pending.poll() {
            LoadState::Pending => Ok(false),
            LoadState::Ready(audio) => {
                self.play(ctx, audio, params);
                Ok(true)
            }
            LoadState::Failed(msg) => {
                anyhow::bail!("Failed to decode {}: {}", pending.path().display(), msg)
            }
        }
    }

    pub fn stop(&mut self) {
        if let Some(source) = self.source.as_mut() {
            source.stop();
            source.disconnect();
        }
        self.playing = false;
    }

    /// Columns ahead of the head where look-ahead marks spawn for a given
    /// sync delay.
    pub fn preview_offset(&self, sync_delay: f32) -> i64 {
        let frames = (sync_delay.max(0.0) * self.fps as f32).round() as i64;
        frames * self.head.step()
    }

    /// Draws one frame. Returns false, drawing nothing, when not playing.
    pub fn tick(&mut self, ctx: &AudioContext, params: &dyn ParameterSet) -> bool {
        if !self.playing {
            return false;
        }

        let sync_delay = params.scalar(Param::SyncDelay);
        if sync_delay != self.delay.delay() {
            self.delay.set_delay(sync_delay);
            self.active_analyser.tap_after(&self.delay);
        }

        let tail = self.delay.delay() as f64;
        let ended = self
            .source
            .as_mut()
            .map_or(true, |source| source.poll_ended(ctx, tail));
        if ended {
            log::info!("Playback finished");
            self.playing = false;
            return false;
        }

        let mapper = params.mapper_params(self.settings.alias_policy);
        let mut active_tap = AnalyserTap {
            analyser: &mut self.active_analyser,
            source: self.source.as_ref(),
            ctx,
        };
        advance_from(&mut self.active, &mut active_tap, &mapper);

        let lead = self.preview_offset(self.delay.delay());
        let with_preview = lead > 0;
        if with_preview {
            let mut preview_tap = AnalyserTap {
                analyser: &mut self.preview_analyser,
                source: self.source.as_ref(),
                ctx,
            };
            advance_from(&mut self.preview, &mut preview_tap, &mapper);
        }

        let max_lead = self.compositor.max_spawn_offset();
        if lead > max_lead && !self.warned_clamp {
            log::warn!(
                "Sync delay needs a {}px lead but the history only allows {}px; preview marks will land early",
                lead,
                max_lead
            );
            self.warned_clamp = true;
        }

        let mut layers = Vec::with_capacity(2);
        if with_preview {
            layers.push(NoteLayer {
                notes: self.preview.current(),
                offset: lead.min(max_lead),
                brightness: self.settings.preview_brightness,
            });
        }
        layers.push(NoteLayer {
            notes: self.active.current(),
            offset: 0,
            brightness: 1.0,
        });

        let style = PitchClassStyle {
            brightness: params.scalar(Param::Brightness),
        };
        let frame = FrameParams {
            zoom: params.scalar(Param::Zoom),
            drift: params.scalar(Param::Drift),
            emphasis: params.emphasis(),
        };

        self.compositor.render_frame(
            self.head.position(),
            &layers,
            self.active.current(),
            &style,
            &frame,
            &mut self.rng,
        );
        self.head.advance(self.compositor.axis());
        true
    }

    /// The visible frame as opaque RGBA8 over black.
    pub fn frame_rgba(&self) -> Vec<u8> {
        let mut pixels = self.compositor.visible().data().to_vec();
        // Premultiplied over black is the color itself.
        pixels.par_chunks_exact_mut(4).for_each(|px| px[3] = 255);
        pixels
    }

    pub fn save_png(&self, path: &Path) -> Result<(), SurfaceError> {
        Canvas::from_rgba(self.width(), self.height(), self.frame_rgba())?.save_png(path)
    }
}

fn advance_from(history: &mut NoteHistory, tap: &mut dyn SpectrumSource, mapper: &MapperParams) {
    let sample_rate = tap.sample_rate();
    let spectrum = tap.snapshot();
    history.advance(spectrum.as_deref(), sample_rate, mapper);
}
