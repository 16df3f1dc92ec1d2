//! Audio clip capture from the system microphone

use crate::config::AudioConfig;
use crate::error::AudioError;
use std::time::Duration;

/// Source of fixed-length mono clips.
///
/// `record` blocks for roughly `duration` and returns
/// `duration * sample_rate` samples in [-1, 1].
pub trait AudioSource: Send {
    fn record(&mut self, duration: Duration, sample_rate: u32) -> Result<Vec<f32>, AudioError>;
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn record(&mut self, duration: Duration, sample_rate: u32) -> Result<Vec<f32>, AudioError> {
        (**self).record(duration, sample_rate)
    }
}

/// Build the platform audio source for a configuration
pub fn default_source(config: &AudioConfig) -> Result<Box<dyn AudioSource>, AudioError> {
    #[cfg(feature = "cpal")]
    {
        Ok(Box::new(cpal_backend::CpalAudioSource::new(config.device_name.clone())))
    }

    #[cfg(not(feature = "cpal"))]
    {
        let _ = config;
        Err(AudioError::DeviceUnavailable(
            "built without the `cpal` feature".to_string(),
        ))
    }
}

/// Names of the available input devices
pub fn list_devices() -> Result<Vec<String>, AudioError> {
    #[cfg(feature = "cpal")]
    {
        cpal_backend::list_devices()
    }

    #[cfg(not(feature = "cpal"))]
    {
        Ok(Vec::new())
    }
}

/// Number of samples a clip of `duration` holds at `sample_rate`
pub fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64).round() as usize
}

/// Average interleaved frames down to one channel
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear interpolation from `from_rate` to `to_rate`
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let index = (pos.floor() as usize).min(last);
            let frac = (pos - index as f64) as f32;
            let a = samples[index];
            let b = samples[(index + 1).min(last)];
            a + (b - a) * frac
        })
        .collect()
}

#[cfg(feature = "cpal")]
pub use cpal_backend::CpalAudioSource;

#[cfg(feature = "cpal")]
mod cpal_backend {
    use super::{downmix, resample, samples_for, AudioSource};
    use crate::error::AudioError;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{Device, Host, SampleFormat};
    use crossbeam_channel::{bounded, RecvTimeoutError};
    use std::time::{Duration, Instant};
    use tracing::{debug, warn};

    /// Extra time allowed past the clip length before a capture is abandoned
    const CAPTURE_GRACE: Duration = Duration::from_secs(2);

    /// Microphone capture through cpal.
    ///
    /// The device is opened per clip and the stream dropped afterwards, so an
    /// unplugged microphone fails one clip and is picked up again on the next.
    pub struct CpalAudioSource {
        device_name: Option<String>,
    }

    impl CpalAudioSource {
        pub fn new(device_name: Option<String>) -> Self {
            Self { device_name }
        }

        fn find_device(&self, host: &Host) -> Result<Device, AudioError> {
            match self.device_name {
                Some(ref name) => {
                    const MAX_DEVICES_TO_CHECK: usize = 100;
                    let devices = host
                        .input_devices()
                        .map_err(|e| AudioError::DeviceUnavailable(format!("Failed to enumerate devices: {}", e)))?;
                    for device in devices.take(MAX_DEVICES_TO_CHECK) {
                        if let Ok(device_name) = device.name() {
                            if device_name == *name || device_name.contains(name.as_str()) {
                                return Ok(device);
                            }
                        }
                    }
                    Err(AudioError::DeviceUnavailable(format!("No input device named '{}'", name)))
                }
                None => host
                    .default_input_device()
                    .ok_or_else(|| AudioError::DeviceUnavailable("No input device available".to_string())),
            }
        }
    }

    impl AudioSource for CpalAudioSource {
        fn record(&mut self, duration: Duration, sample_rate: u32) -> Result<Vec<f32>, AudioError> {
            let host = cpal::default_host();
            let device = self.find_device(&host)?;

            // Capture in whatever the device natively offers, convert afterwards
            let supported = device
                .default_input_config()
                .map_err(|e| AudioError::DeviceUnavailable(format!("Failed to get input config: {}", e)))?;
            let channels = supported.channels().max(1) as usize;
            let native_rate = supported.sample_rate().0;
            let sample_format = supported.sample_format();
            let config = supported.config();
            debug!(
                "Capturing {} channel(s) of {:?} at {} Hz",
                channels, sample_format, native_rate
            );

            let native_wanted = samples_for(duration, native_rate);
            let (chunk_tx, chunk_rx) = bounded::<Vec<f32>>(1024);
            let (err_tx, err_rx) = bounded::<String>(1);
            let on_error = move |err: cpal::StreamError| {
                let _ = err_tx.try_send(err.to_string());
            };

            let stream = match sample_format {
                SampleFormat::F32 => device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if chunk_tx.try_send(downmix(data, channels)).is_err() {
                            debug!("Clip buffer full, dropping samples");
                        }
                    },
                    on_error,
                    None,
                ),
                SampleFormat::I16 => device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let floats: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                        if chunk_tx.try_send(downmix(&floats, channels)).is_err() {
                            debug!("Clip buffer full, dropping samples");
                        }
                    },
                    on_error,
                    None,
                ),
                SampleFormat::U16 => device.build_input_stream(
                    &config,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| {
                        let floats: Vec<f32> = data.iter().map(|&s| (s as f32 - 32768.0) / 32768.0).collect();
                        if chunk_tx.try_send(downmix(&floats, channels)).is_err() {
                            debug!("Clip buffer full, dropping samples");
                        }
                    },
                    on_error,
                    None,
                ),
                other => {
                    return Err(AudioError::DeviceUnavailable(format!(
                        "Unsupported sample format {:?}",
                        other
                    )))
                }
            }
            .map_err(|e| AudioError::DeviceUnavailable(format!("Failed to build stream: {}", e)))?;

            stream
                .play()
                .map_err(|e| AudioError::DeviceUnavailable(format!("Failed to start stream: {}", e)))?;

            let deadline = Instant::now() + duration + CAPTURE_GRACE;
            let mut samples = Vec::with_capacity(native_wanted);
            while samples.len() < native_wanted {
                if let Ok(err) = err_rx.try_recv() {
                    return Err(AudioError::Capture(err));
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    warn!("Clip capture timed out with {}/{} samples", samples.len(), native_wanted);
                    return Err(AudioError::Capture("Timed out waiting for audio samples".to_string()));
                }
                match chunk_rx.recv_timeout(remaining.min(Duration::from_millis(100))) {
                    Ok(chunk) => samples.extend(chunk.into_iter().map(|s| if s.is_finite() { s } else { 0.0 })),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(AudioError::Capture("Audio stream closed".to_string()));
                    }
                }
            }
            drop(stream);

            samples.truncate(native_wanted);
            let mut samples = resample(&samples, native_rate, sample_rate);
            samples.resize(samples_for(duration, sample_rate), 0.0);
            Ok(samples)
        }
    }

    pub fn list_devices() -> Result<Vec<String>, AudioError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| AudioError::DeviceUnavailable(format!("Failed to enumerate devices: {}", e)))?;

        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}
