//! Output device lookup and stream configuration

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::AudioError;

/// Wrapper around cpal device
pub struct AudioDevice {
    inner: cpal::Device,
    pub name: String,
}

impl AudioDevice {
    pub fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self {
            inner: device,
            name,
        }
    }

    pub fn inner(&self) -> &cpal::Device {
        &self.inner
    }

    pub fn into_inner(self) -> cpal::Device {
        self.inner
    }

    /// Get supported output configurations
    pub fn supported_output_configs(&self) -> Result<Vec<cpal::SupportedStreamConfigRange>, AudioError> {
        self.inner
            .supported_output_configs()
            .map(|iter| iter.collect())
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))
    }

    /// Get default output config
    pub fn default_output_config(&self) -> Result<cpal::SupportedStreamConfig, AudioError> {
        self.inner
            .default_output_config()
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))
    }

    /// Pick an output config for a clip.
    ///
    /// Prefers a config with the clip's exact channel count and rate (f32
    /// first); otherwise falls back to the device default and leaves channel
    /// mapping and rate conversion to the caller.
    pub fn output_config_for(
        &self,
        channels: u16,
        sample_rate: u32,
    ) -> Result<cpal::SupportedStreamConfig, AudioError> {
        let rate = cpal::SampleRate(sample_rate);
        let mut matching: Vec<cpal::SupportedStreamConfigRange> = self
            .supported_output_configs()
            .unwrap_or_default()
            .into_iter()
            .filter(|c| {
                c.channels() == channels && c.min_sample_rate() <= rate && rate <= c.max_sample_rate()
            })
            .collect();
        matching.sort_by_key(|c| c.sample_format() != cpal::SampleFormat::F32);

        match matching.into_iter().next() {
            Some(range) => Ok(range.with_sample_rate(rate)),
            None => {
                let fallback = self.default_output_config()?;
                tracing::warn!(
                    "{} has no {} ch / {} Hz output; using {} ch / {} Hz",
                    self.name,
                    channels,
                    sample_rate,
                    fallback.channels(),
                    fallback.sample_rate().0
                );
                Ok(fallback)
            }
        }
    }
}

/// Names of all output devices
pub fn list_output_devices() -> Vec<String> {
    let host = cpal::default_host();
    match host.output_devices() {
        Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
        Err(e) => {
            tracing::warn!("Could not enumerate output devices: {}", e);
            Vec::new()
        }
    }
}

/// Output device by name, or the host default when `name` is `None`
pub fn get_output_device(name: Option<&str>) -> Result<AudioDevice, AudioError> {
    let host = cpal::default_host();

    let Some(name) = name else {
        return host
            .default_output_device()
            .map(AudioDevice::from_cpal)
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()));
    };

    let devices = host
        .output_devices()
        .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name == name {
                return Ok(AudioDevice::from_cpal(device));
            }
        }
    }

    Err(AudioError::DeviceNotFound(name.to_string()))
}
