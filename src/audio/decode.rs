use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded mono signal.
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioData {
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Shared, immutable decoded audio ready to be played.
pub type AudioHandle = Arc<AudioData>;

pub fn decode_audio(path: &Path) -> Result<AudioData> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Failed to probe audio format")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .context("No audio tracks found")?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count()).max(1);
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(err)) => {
                log::debug!("Skipping undecodable packet: {}", err);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        downmix_into(&mut samples, sample_buf.samples(), channels);
    }

    let data = AudioData {
        samples,
        sample_rate,
    };

    log::info!(
        "Decoded audio: {} samples, {}Hz, {:.1}s",
        data.samples.len(),
        sample_rate,
        data.duration()
    );

    Ok(data)
}

/// Averages interleaved channels into mono.
fn downmix_into(out: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}

/// Observed state of a background decode.
pub enum LoadState {
    Pending,
    Ready(AudioHandle),
    Failed(String),
}

/// Audio file being decoded on a worker thread.
pub struct PendingAudio {
    path: PathBuf,
    receiver: Option<Receiver<Result<AudioData>>>,
    outcome: Option<std::result::Result<AudioHandle, String>>,
}

impl PendingAudio {
    pub fn spawn(path: &Path) -> Self {
        let (sender, receiver) = mpsc::channel();
        let worker_path = path.to_path_buf();
        std::thread::spawn(move || {
            // The receiver may be gone if the caller gave up on this file.
            let _ = sender.send(decode_audio(&worker_path));
        });

        Self {
            path: path.to_path_buf(),
            receiver: Some(receiver),
            outcome: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-blocking check of the decode.
    pub fn poll(&mut self) -> LoadState {
        if self.outcome.is_none() {
            let polled = self.receiver.as_ref().map(|receiver| receiver.try_recv());
            match polled {
                Some(Ok(result)) => self.settle(result),
                Some(Err(TryRecvError::Empty)) => return LoadState::Pending,
                Some(Err(TryRecvError::Disconnected)) | None => {
                    self.outcome = Some(Err("decoder thread exited".into()));
                }
            }
            self.receiver = None;
        }

        match &self.outcome {
            Some(Ok(handle)) => LoadState::Ready(Arc::clone(handle)),
            Some(Err(msg)) => LoadState::Failed(msg.clone()),
            None => LoadState::Pending,
        }
    }

    fn settle(&mut self, result: Result<AudioData>) {
        self.outcome = Some(result.map(Arc::new).map_err(|e| format!("{:#}", e)));
    }
}
