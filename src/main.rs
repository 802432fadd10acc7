mod audio;
mod cli;
mod config;
mod encode;
mod painter;
mod params;
mod presets;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use audio::context::{AudioContext, DEFAULT_SAMPLE_RATE};
use audio::decode::PendingAudio;
use cli::Cli;
use config::Config;
use encode::ffmpeg::{total_frames, EncoderSettings, FfmpegEncoder};
use painter::Painter;
use params::Params;
use presets::loader;
use render::effects::{expand_effects, EffectChain};
use render::gpu::GpuContext;
use render::surface::Canvas;
use render::text::{format_elapsed, FrameBuffer, TextOverlay};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let cfg = match config::find_config(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };
    merge_config(&mut cli, &cfg);

    if cli.list_presets {
        println!("Available presets:");
        for name in loader::list_presets()? {
            match loader::load_preset(&name) {
                Ok(p) => println!("  {:<12} {:<14} {}", name, p.display_name, p.description),
                Err(_) => println!("  {}", name),
            }
        }
        return Ok(());
    }

    let input = cli.input.as_ref().context("Input audio file is required")?;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    log::info!("soundpaint");
    log::info!("Input: {}", input.display());
    log::info!("Output: {}", cli.output.display());
    log::info!("Preset: {}", cli.preset);
    log::info!("Resolution: {}x{} @ {}fps", cli.width, cli.height, cli.fps);

    // 1. Parameters: defaults, preset, config, command line
    let preset = loader::load_preset(&cli.preset)?;
    let mut params = Params::default();
    params.apply_table(&preset.parameters);
    params.apply_table(&cfg.params);
    params
        .apply_overrides(&cli.params)
        .context("Invalid --param")?;
    log::debug!("Parameters: {:?}", params);

    // 2. Audio graph and painter, then decode in the background
    let mut ctx = AudioContext::new(DEFAULT_SAMPLE_RATE);
    let mut painter_settings = cfg.painter.clone();
    if cli.seed.is_some() {
        painter_settings.seed = cli.seed;
    }
    let mut painter = Painter::new(
        &mut ctx,
        cli.width,
        cli.height,
        cli.fps,
        painter_settings,
        cfg.analyser.clone(),
    )?;

    // 3. Play as soon as the decode lands
    let mut pending = PendingAudio::spawn(input);
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("Decoding {}", input.display()));
    spinner.enable_steady_tick(Duration::from_millis(100));
    loop {
        match painter.play_when_ready(&mut ctx, &mut pending, &params) {
            Ok(true) => break,
            Ok(false) => std::thread::sleep(Duration::from_millis(20)),
            Err(err) => {
                spinner.finish_and_clear();
                return Err(err);
            }
        }
    }
    spinner.finish_and_clear();
    let duration = painter.duration();
    log::info!("Decoded {:.1}s of audio", duration);

    // 4. Effects: CLI, then config, then preset defaults
    let effect_names = if !cli.effects.is_empty() {
        cli.effects.clone()
    } else if !cfg.effects.is_empty() {
        cfg.effects.clone()
    } else {
        preset.default_effects.clone()
    };
    let effects = expand_effects(&effect_names);
    let effect_chain = if effects.is_empty() {
        None
    } else {
        match GpuContext::new().and_then(|gpu| EffectChain::new(gpu, cli.width, cli.height, &effects)) {
            Ok(chain) => {
                log::info!("Effects: {:?}", effects);
                Some(chain)
            }
            Err(err) => {
                log::warn!("Effects disabled: {:#}", err);
                None
            }
        }
    };

    // 5. Text overlay
    let text_overlay = if cli.title.is_some() || cli.show_time {
        match cli.font.as_deref() {
            Some(path) => {
                let size = TextOverlay::size_for(cli.width, cli.height);
                match TextOverlay::from_file(path, size) {
                    Ok(overlay) => Some(overlay),
                    Err(err) => {
                        log::warn!("Text overlay disabled: {:#}", err);
                        None
                    }
                }
            }
            None => {
                log::warn!("Text overlay needs a font, pass --font or set output.font");
                None
            }
        }
    } else {
        None
    };

    // 6. Encoder
    let sync_delay = params.sync_delay;
    let frame_count = total_frames(duration, sync_delay, cli.fps);
    log::info!("Total frames: {}, sync delay {:.2}s", frame_count, sync_delay);

    let mut encoder = FfmpegEncoder::new(&EncoderSettings {
        output: cli.output.clone(),
        audio: input.clone(),
        width: cli.width,
        height: cli.height,
        fps: cli.fps,
        codec: cli.codec.clone(),
        pix_fmt: cli.pix_fmt.clone(),
        crf: cli.crf,
        bitrate: cli.bitrate.clone(),
        audio_offset: sync_delay,
    })?;

    // 7. Render loop
    let pb = ProgressBar::new(frame_count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")?
            .progress_chars("=>-"),
    );

    let shorter = cli.width.min(cli.height) as f32;
    let margin = (shorter * 0.07) as u32;
    let text_color = [255u8, 255, 255, 220];
    let mut last_frame = Vec::new();

    for frame_idx in 0..frame_count {
        let time = frame_idx as f64 / cli.fps as f64;
        ctx.advance_to(time);
        if painter.is_playing() {
            painter.tick(&ctx, &params);
        }

        let mut pixels = painter.frame_rgba();
        if let Some(chain) = effect_chain.as_ref() {
            pixels = chain.apply(&pixels, time as f32)?;
        }

        if let Some(overlay) = text_overlay.as_ref() {
            let mut frame = FrameBuffer {
                pixels: &mut pixels,
                width: cli.width,
                height: cli.height,
            };
            if let Some(title) = cli.title.as_deref() {
                let x = cli.width.saturating_sub(margin + overlay.measure_width(title));
                overlay.composite(&mut frame, title, x, margin, text_color);
            }
            if cli.show_time {
                // Clock follows the audible track, which starts after the delay.
                let clock = format_elapsed(time - sync_delay as f64);
                let y = cli.height.saturating_sub(margin + overlay.line_height());
                overlay.composite(&mut frame, &clock, margin, y, text_color);
            }
        }

        encoder.write_frame(&pixels)?;
        pb.set_position(frame_idx as u64 + 1);
        last_frame = pixels;
    }

    pb.finish_with_message("Rendering complete");

    log::info!("Finishing encoding...");
    encoder.finish()?;

    if let Some(path) = cli.png.as_ref() {
        if last_frame.is_empty() {
            painter.save_png(path)?;
        } else {
            Canvas::from_rgba(cli.width, cli.height, last_frame)?.save_png(path)?;
        }
        log::info!("Saved last frame to {}", path.display());
    }

    log::info!("Done! Output: {}", cli.output.display());
    Ok(())
}

/// Config values apply only where the CLI is still at its default.
fn merge_config(cli: &mut Cli, cfg: &Config) {
    if cli.width == config::default_width() { cli.width = cfg.output.width; }
    if cli.height == config::default_height() { cli.height = cfg.output.height; }
    if cli.fps == config::default_fps() { cli.fps = cfg.output.fps; }
    if cli.crf == config::default_crf() { cli.crf = cfg.output.crf; }
    if cli.codec == config::default_codec() { cli.codec = cfg.output.codec.clone(); }
    if cli.pix_fmt == config::default_pix_fmt() { cli.pix_fmt = cfg.output.pix_fmt.clone(); }
    if cli.preset == config::default_preset() { cli.preset = cfg.output.preset.clone(); }
    if cli.font.is_none() { cli.font = cfg.output.font.clone(); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_beat_config_values() {
        let cfg: Config = toml::from_str(
            r#"
            [output]
            width = 640
            fps = 24
            preset = "calm"
            "#,
        )
        .unwrap();
        let mut cli = Cli::parse_from(["soundpaint", "--fps", "60"]);
        merge_config(&mut cli, &cfg);

        assert_eq!(cli.width, 640);
        assert_eq!(cli.fps, 60);
        assert_eq!(cli.height, 720);
        assert_eq!(cli.preset, "calm");
    }
}
