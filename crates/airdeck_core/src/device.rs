//! Output Device Enumeration and Selection
//!
//! Decks only ever play, so only output devices are listed.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// An output device as seen by the host audio API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDevice {
    /// Human-readable device name, also used to select the device
    pub name: String,

    /// Whether this is the system default output
    pub is_default: bool,

    /// Common sample rates the device accepts (may be empty if querying failed)
    pub sample_rates: Vec<u32>,

    /// Maximum supported channels
    pub max_channels: u16,
}

impl OutputDevice {
    /// List every output device on the default host
    pub fn enumerate() -> EngineResult<Vec<OutputDevice>> {
        let host = cpal::default_host();
        let default_name = host.default_output_device().and_then(|d| d.name().ok());

        let devices: Vec<OutputDevice> = host
            .output_devices()
            .map_err(|e| EngineError::DeviceNotFound(e.to_string()))?
            .filter_map(|device| Self::from_cpal_device(&device, default_name.as_deref()).ok())
            .collect();

        if devices.is_empty() {
            return Err(EngineError::NoDevicesFound);
        }
        Ok(devices)
    }

    /// Find a cpal output device by name, or the default when `name` is `None`
    pub fn resolve(name: Option<&str>) -> EngineResult<cpal::Device> {
        let host = cpal::default_host();
        let device = match name {
            None => host.default_output_device().ok_or(EngineError::NoDevicesFound)?,
            Some(wanted) => host
                .output_devices()
                .map_err(|e| EngineError::DeviceNotFound(e.to_string()))?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| EngineError::DeviceNotFound(wanted.to_string()))?,
        };

        debug!(device = ?device.name().ok(), "Output device resolved");
        Ok(device)
    }

    fn from_cpal_device(device: &cpal::Device, default_name: Option<&str>) -> EngineResult<Self> {
        let name = device
            .name()
            .map_err(|e| EngineError::DeviceNotFound(e.to_string()))?;
        let is_default = default_name.map(|d| d == name).unwrap_or(false);

        let (sample_rates, max_channels) = match device.supported_output_configs() {
            Ok(configs) => Self::extract_config_info(configs),
            Err(_) => (vec![], 2),
        };

        Ok(OutputDevice {
            name,
            is_default,
            sample_rates,
            max_channels,
        })
    }

    fn extract_config_info(
        configs: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
    ) -> (Vec<u32>, u16) {
        let mut sample_rates = Vec::new();
        let mut max_channels = 0u16;

        const COMMON_RATES: [u32; 7] = [22050, 44100, 48000, 88200, 96000, 176400, 192000];

        for config in configs {
            max_channels = max_channels.max(config.channels());

            let min = config.min_sample_rate().0;
            let max = config.max_sample_rate().0;
            for &rate in &COMMON_RATES {
                if rate >= min && rate <= max && !sample_rates.contains(&rate) {
                    sample_rates.push(rate);
                }
            }
        }

        sample_rates.sort_unstable();
        (sample_rates, max_channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_device_serialization() {
        let device = OutputDevice {
            name: "Test Device".to_string(),
            is_default: true,
            sample_rates: vec![44100, 48000],
            max_channels: 2,
        };

        let json = serde_json::to_string(&device).unwrap();
        let deserialized: OutputDevice = serde_json::from_str(&json).unwrap();

        assert_eq!(device.name, deserialized.name);
        assert_eq!(device.sample_rates, deserialized.sample_rates);
        assert!(deserialized.is_default);
    }

    // Hardware-dependent tests are marked with #[ignore]
    // Run them with: cargo test -- --ignored

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_enumerate_outputs() {
        let devices = OutputDevice::enumerate();
        assert!(devices.is_ok());
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_resolve_unknown_device() {
        let result = OutputDevice::resolve(Some("no such device, surely"));
        assert!(matches!(result, Err(EngineError::DeviceNotFound(_))));
    }
}
