use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rubato::{FftFixedIn, Resampler};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::INPUT_SAMPLE_RATE;

/// Where the broadcast audio comes from. Immutable for the duration of one
/// recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioSource {
    Microphone,
    SystemAudio,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no capture device available for {0:?}")]
    NoDevice(AudioSource),
    #[error("capture device rejected: {0}")]
    Device(String),
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("resampler error: {0}")]
    Resample(String),
}

/// Owns the capture thread. Dropping the handle releases the audio device;
/// the stream and the device are acquired and released together so no exit
/// path can leak a live capture device.
pub struct CaptureHandle {
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    join: Option<std::thread::JoinHandle<()>>,
    sample_rate: u32,
}

impl CaptureHandle {
    /// Device sample rate the raw chunks arrive at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stops the capture thread and waits for the device to be released.
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts capturing mono f32 chunks at the device's native rate.
///
/// `cpal::Stream` is not `Send`, so the stream lives on a dedicated thread
/// that parks until the handle is stopped or dropped. Chunks are delivered
/// with `try_send`: if the consumer falls behind, frames are dropped rather
/// than blocking the platform audio callback.
pub async fn start_capture(
    source: AudioSource,
    chunk_tx: mpsc::Sender<Vec<f32>>,
) -> Result<CaptureHandle, CaptureError> {
    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

    let join = std::thread::Builder::new()
        .name("sereno-capture".to_string())
        .spawn(move || match build_stream(source, chunk_tx) {
            Ok((stream, rate)) => {
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(CaptureError::Stream(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(rate));
                // Park until the handle is stopped or dropped.
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Capture stream released");
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
            }
        })
        .map_err(|e| CaptureError::Stream(e.to_string()))?;

    let sample_rate = ready_rx
        .await
        .map_err(|_| CaptureError::Stream("capture thread exited before ready".to_string()))??;

    debug!(?source, sample_rate, "Audio capture started");
    Ok(CaptureHandle {
        stop_tx: Some(stop_tx),
        join: Some(join),
        sample_rate,
    })
}

fn build_stream(
    source: AudioSource,
    chunk_tx: mpsc::Sender<Vec<f32>>,
) -> Result<(cpal::Stream, u32), CaptureError> {
    let host = cpal::default_host();

    // SYSTEM_AUDIO records what the machine is playing: a loopback input
    // stream opened on the default output device (WASAPI-style loopback).
    // MICROPHONE is the plain default input device.
    let device = match source {
        AudioSource::Microphone => host.default_input_device(),
        AudioSource::SystemAudio => host.default_output_device(),
    }
    .ok_or(CaptureError::NoDevice(source))?;

    let config = match source {
        AudioSource::Microphone => device.default_input_config(),
        AudioSource::SystemAudio => device
            .default_output_config()
            .or_else(|_| device.default_input_config()),
    }
    .map_err(|e| CaptureError::Device(e.to_string()))?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let err_fn = |e| warn!(%e, "Audio stream error");

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = downmix_mono(data, channels);
                    let _ = chunk_tx.try_send(mono);
                },
                err_fn,
                None,
            )
            .map_err(|e| CaptureError::Stream(e.to_string()))?,
        cpal::SampleFormat::I16 => device
            .build_input_stream(
                &config.into(),
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let as_f32: Vec<f32> =
                        data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                    let mono = downmix_mono(&as_f32, channels);
                    let _ = chunk_tx.try_send(mono);
                },
                err_fn,
                None,
            )
            .map_err(|e| CaptureError::Stream(e.to_string()))?,
        other => return Err(CaptureError::UnsupportedFormat(format!("{other:?}"))),
    };

    Ok((stream, sample_rate))
}

/// Averages interleaved channels down to mono.
fn downmix_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Converts device-rate mono samples into fixed-size 16 kHz frames.
///
/// Accumulates arbitrary-size input chunks, resamples through an FFT
/// resampler when the device rate differs from 16 kHz, and emits exactly
/// `frame_samples`-long frames ready for PCM encoding.
pub struct FrameBuffer {
    resampler: Option<FftFixedIn<f32>>,
    chunk_in: usize,
    in_buf: Vec<f32>,
    frame_samples: usize,
    pending: Vec<f32>,
}

const RESAMPLER_CHUNK: usize = 1024;

impl FrameBuffer {
    pub fn new(in_hz: u32, frame_samples: usize) -> Result<Self, CaptureError> {
        let resampler = if in_hz == INPUT_SAMPLE_RATE {
            None
        } else {
            Some(
                FftFixedIn::<f32>::new(
                    in_hz as usize,
                    INPUT_SAMPLE_RATE as usize,
                    RESAMPLER_CHUNK,
                    1,
                    1,
                )
                .map_err(|e| CaptureError::Resample(e.to_string()))?,
            )
        };
        Ok(Self {
            resampler,
            chunk_in: RESAMPLER_CHUNK,
            in_buf: Vec::with_capacity(RESAMPLER_CHUNK),
            frame_samples,
            pending: Vec::with_capacity(frame_samples),
        })
    }

    /// Feeds one input chunk, invoking `emit` for every completed frame.
    pub fn push(&mut self, mut src: &[f32], emit: &mut impl FnMut(&[f32])) {
        if self.resampler.is_none() {
            self.emit_frames(src, emit);
            return;
        }

        while !src.is_empty() {
            let space = self.chunk_in - self.in_buf.len();
            let take = space.min(src.len());
            self.in_buf.extend_from_slice(&src[..take]);
            src = &src[take..];

            if self.in_buf.len() == self.chunk_in {
                let result = self
                    .resampler
                    .as_mut()
                    .and_then(|r| r.process(&[&self.in_buf[..]], None).ok());
                if let Some(out) = result {
                    self.emit_frames(&out[0], emit);
                }
                self.in_buf.clear();
            }
        }
    }

    fn emit_frames(&mut self, mut data: &[f32], emit: &mut impl FnMut(&[f32])) {
        while !data.is_empty() {
            let space = self.frame_samples - self.pending.len();
            let take = space.min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.pending.len() == self.frame_samples {
                emit(&self.pending);
                self.pending.clear();
            }
        }
    }
}

/// Converts f32 samples in [-1, 1] to clamped signed 16-bit little-endian
/// PCM and base64-encodes the result for the realtime-input message.
pub fn encode_pcm16_base64(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    BASE64.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        let interleaved = [0.5, -0.5, 1.0, 0.0];
        assert_eq!(downmix_mono(&interleaved, 2), vec![0.0, 0.5]);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let data = [0.1, 0.2, 0.3];
        assert_eq!(downmix_mono(&data, 1), data.to_vec());
    }

    #[test]
    fn test_pcm_encoding_clamps() {
        let encoded = encode_pcm16_base64(&[0.0, 1.0, -1.0, 2.0, -2.0]);
        let bytes = BASE64.decode(encoded).unwrap();
        let samples: Vec<i16> = bytes
            .chunks(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![0, i16::MAX, -i16::MAX, i16::MAX, -i16::MAX]);
    }

    #[test]
    fn test_frame_buffer_passthrough_frames() {
        let mut buffer = FrameBuffer::new(INPUT_SAMPLE_RATE, 4).unwrap();
        let mut frames: Vec<Vec<f32>> = Vec::new();
        buffer.push(&[0.1; 6], &mut |frame| frames.push(frame.to_vec()));
        buffer.push(&[0.1; 2], &mut |frame| frames.push(frame.to_vec()));
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.len() == 4));
    }

    #[test]
    fn test_frame_buffer_resamples_48k() {
        let mut buffer = FrameBuffer::new(48_000, 512).unwrap();
        let mut emitted = 0usize;
        // 48000 input samples resample to ~16000 output samples.
        for _ in 0..48 {
            buffer.push(&[0.0f32; 1000], &mut |frame| {
                assert_eq!(frame.len(), 512);
                emitted += frame.len();
            });
        }
        assert!(emitted >= 14_000 && emitted <= 16_384, "emitted {emitted}");
    }
}
