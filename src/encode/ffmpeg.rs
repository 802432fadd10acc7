use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

/// Everything ffmpeg needs besides the frames.
#[derive(Clone, Debug)]
pub struct EncoderSettings {
    pub output: PathBuf,
    pub audio: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    pub bitrate: Option<String>,
    /// Seconds the audio track starts after the first frame.
    pub audio_offset: f32,
}

impl EncoderSettings {
    /// stderr is only read once ffmpeg exits, so it is limited to errors.
    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(), "error".into(),
            "-nostats".into(),
            "-y".into(),
            "-f".into(), "rawvideo".into(),
            "-pixel_format".into(), "rgba".into(),
            "-video_size".into(), format!("{}x{}", self.width, self.height),
            "-framerate".into(), self.fps.to_string(),
            "-i".into(), "pipe:0".into(),
        ];

        if self.audio_offset > 0.0 {
            args.extend(["-itsoffset".into(), format!("{:.3}", self.audio_offset)]);
        }
        args.extend([
            "-i".into(), self.audio.to_string_lossy().into_owned(),
            "-map".into(), "0:v".into(),
            "-map".into(), "1:a".into(),
            "-c:v".into(), self.codec.clone(),
            "-pix_fmt".into(), self.pix_fmt.clone(),
        ]);

        match &self.bitrate {
            Some(bitrate) => args.extend(["-b:v".into(), bitrate.clone()]),
            None => args.extend([
                "-crf".into(), self.crf.to_string(),
                "-preset".into(), "medium".into(),
            ]),
        }

        args.extend([
            "-c:a".into(), "aac".into(),
            "-b:a".into(), "192k".into(),
            "-shortest".into(),
            self.output.to_string_lossy().into_owned(),
        ]);
        args
    }
}

/// ffmpeg child fed raw RGBA frames over stdin.
pub struct FfmpegEncoder {
    child: Child,
    frame_len: usize,
}

impl FfmpegEncoder {
    pub fn new(settings: &EncoderSettings) -> Result<Self> {
        let child = Command::new("ffmpeg")
            .args(settings.build_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}, audio offset {:.2}s",
            settings.width,
            settings.height,
            settings.fps,
            settings.codec,
            settings.audio_offset
        );

        Ok(Self {
            child,
            frame_len: (settings.width * settings.height * 4) as usize,
        })
    }

    pub fn write_frame(&mut self, rgba: &[u8]) -> Result<()> {
        if rgba.len() != self.frame_len {
            anyhow::bail!("Frame is {} bytes, expected {}", rgba.len(), self.frame_len);
        }
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(rgba).context("Failed to write frame to ffmpeg")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        // EOF on stdin ends the stream
        drop(self.child.stdin.take());

        let output = self.child.wait_with_output().context("Failed to wait for ffmpeg")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("FFmpeg encoding complete");
        Ok(())
    }
}

/// Frames needed to cover the audio plus its start offset.
pub fn total_frames(duration: f64, audio_offset: f32, fps: u32) -> usize {
    ((duration + audio_offset.max(0.0) as f64) * fps as f64).ceil().max(0.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EncoderSettings {
        EncoderSettings {
            output: PathBuf::from("out.mp4"),
            audio: PathBuf::from("song.flac"),
            width: 640,
            height: 360,
            fps: 30,
            codec: "libx264".into(),
            pix_fmt: "yuv420p".into(),
            crf: 18,
            bitrate: None,
            audio_offset: 0.0,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn crf_mode_without_offset() {
        let args = settings().build_args();
        assert_eq!(value_after(&args, "-video_size"), Some("640x360"));
        assert_eq!(value_after(&args, "-crf"), Some("18"));
        assert!(!args.iter().any(|a| a == "-itsoffset" || a == "-b:v"));
        // progress and banner output would fill the unread stderr pipe
        assert_eq!(value_after(&args, "-loglevel"), Some("error"));
        assert!(args.iter().any(|a| a == "-nostats"));
        assert!(args.iter().any(|a| a == "-hide_banner"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn bitrate_replaces_crf() {
        let args = EncoderSettings {
            bitrate: Some("5M".into()),
            ..settings()
        }
        .build_args();
        assert_eq!(value_after(&args, "-b:v"), Some("5M"));
        assert!(!args.iter().any(|a| a == "-crf"));
    }

    #[test]
    fn offset_applies_to_the_audio_input_only() {
        let args = EncoderSettings {
            audio_offset: 1.25,
            ..settings()
        }
        .build_args();
        let offset = args.iter().position(|a| a == "-itsoffset").unwrap();
        assert_eq!(args[offset + 1], "1.250");
        assert_eq!(args[offset + 2], "-i");
        assert_eq!(args[offset + 3], "song.flac");
    }

    #[test]
    fn frame_count_covers_the_delayed_tail() {
        assert_eq!(total_frames(10.0, 0.0, 30), 300);
        assert_eq!(total_frames(10.0, 0.5, 30), 315);
        assert_eq!(total_frames(0.01, 0.0, 30), 1);
        assert_eq!(total_frames(0.0, 0.0, 30), 0);
    }
}
