//! Device selection
//!
//! A session is bound to one device for its whole lifetime. Callers name
//! the device explicitly or pass "auto", which probes the factory for
//! available accelerators in a fixed priority order and falls back to
//! CPU. CPU is always assumed present, so auto-detection cannot fail.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::BackendFactory;
use crate::{CoreError, Result};

/// Device types a backend can be bound to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Cuda,
    Metal,
    Vulkan,
    Rocm,
    OpenCl,
    Cpu,
}

/// Accelerators probed by "auto", most preferred first. CPU is the
/// unconditional fallback and is never probed.
const AUTO_PROBE_ORDER: [DeviceType; 5] = [
    DeviceType::Metal,
    DeviceType::Rocm,
    DeviceType::Cuda,
    DeviceType::Vulkan,
    DeviceType::OpenCl,
];

impl DeviceType {
    /// Lowercase name used in config files, library names and the CLI
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Cuda => "cuda",
            DeviceType::Metal => "metal",
            DeviceType::Vulkan => "vulkan",
            DeviceType::Rocm => "rocm",
            DeviceType::OpenCl => "opencl",
            DeviceType::Cpu => "cpu",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cuda" => Ok(DeviceType::Cuda),
            "metal" => Ok(DeviceType::Metal),
            "vulkan" => Ok(DeviceType::Vulkan),
            "rocm" => Ok(DeviceType::Rocm),
            "opencl" => Ok(DeviceType::OpenCl),
            "cpu" => Ok(DeviceType::Cpu),
            other => Err(CoreError::invalid_device(
                "DEVICE_UNKNOWN",
                format!("Unrecognized device name '{}'", other),
                "Device selection",
                "Use one of: auto, cuda, metal, vulkan, rocm, opencl, cpu",
                other,
            )),
        }
    }
}

/// One device binding: type plus ordinal for multi-accelerator hosts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    /// Device type
    pub device_type: DeviceType,

    /// Device ordinal
    pub device_id: usize,
}

impl Device {
    pub fn new(device_type: DeviceType, device_id: usize) -> Self {
        Self {
            device_type,
            device_id,
        }
    }

    /// Resolve a textual device request against the factory's probe.
    ///
    /// Explicit names must parse to a known device type; "auto" probes
    /// accelerators in priority order and falls back to CPU.
    pub fn resolve(name: &str, device_id: usize, factory: &dyn BackendFactory) -> Result<Device> {
        let device_type = if name == "auto" {
            let detected = AUTO_PROBE_ORDER
                .iter()
                .copied()
                .find(|candidate| factory.device_available(*candidate))
                .unwrap_or(DeviceType::Cpu);
            debug!("Auto-detected device: {}", detected);
            detected
        } else {
            name.parse()?
        };
        Ok(Device::new(device_type, device_id))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device_type, self.device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFactory;

    #[test]
    fn test_parse_known_device_names() {
        let cases = [
            ("cuda", DeviceType::Cuda),
            ("metal", DeviceType::Metal),
            ("vulkan", DeviceType::Vulkan),
            ("rocm", DeviceType::Rocm),
            ("opencl", DeviceType::OpenCl),
            ("cpu", DeviceType::Cpu),
        ];
        for (name, expected) in cases {
            assert_eq!(name.parse::<DeviceType>().unwrap(), expected);
        }
    }

    #[test]
    fn test_parse_unknown_device_name_fails() {
        let err = "tpu".parse::<DeviceType>().unwrap_err();
        assert_eq!(err.code(), "DEVICE_UNKNOWN");
    }

    #[test]
    fn test_display_matches_parse() {
        for name in ["cuda", "metal", "vulkan", "rocm", "opencl", "cpu"] {
            let device_type: DeviceType = name.parse().unwrap();
            assert_eq!(device_type.to_string(), name);
        }
    }

    #[test]
    fn test_serde_lowercase_names() {
        let json = serde_json::to_string(&DeviceType::OpenCl).unwrap();
        assert_eq!(json, "\"opencl\"");
        let parsed: DeviceType = serde_json::from_str("\"rocm\"").unwrap();
        assert_eq!(parsed, DeviceType::Rocm);
    }

    #[test]
    fn test_auto_falls_back_to_cpu() {
        let factory = ScriptedFactory::new(Vec::new());
        let device = Device::resolve("auto", 0, &factory).unwrap();
        assert_eq!(device.device_type, DeviceType::Cpu);
    }

    #[test]
    fn test_auto_respects_probe_priority() {
        let factory = ScriptedFactory::new(Vec::new())
            .with_available(vec![DeviceType::Vulkan, DeviceType::Cuda]);
        let device = Device::resolve("auto", 0, &factory).unwrap();
        // cuda outranks vulkan in the probe order
        assert_eq!(device.device_type, DeviceType::Cuda);
    }

    #[test]
    fn test_explicit_name_skips_probe() {
        let factory = ScriptedFactory::new(Vec::new()).with_available(vec![DeviceType::Metal]);
        let device = Device::resolve("cpu", 2, &factory).unwrap();
        assert_eq!(device.device_type, DeviceType::Cpu);
        assert_eq!(device.device_id, 2);
    }
}
