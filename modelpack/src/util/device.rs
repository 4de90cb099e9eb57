/*!
 Contains data structures used to describe where tensor data should live.
*/

use std::fmt::Display;

/// Represents the device a tensor's storage is bound to
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Device {
    /// Host memory
    Cpu,
    /// A CUDA device, optionally pinned to an ordinal
    Cuda(Option<u8>),
}

impl Device {
    /// Parse a storage location string as written into an archive, i.e. `cpu` or `cuda:0`
    pub fn from_location(location: &str) -> Option<Self> {
        match location {
            "cpu" => Some(Self::Cpu),
            "cuda" => Some(Self::Cuda(None)),
            other => {
                let ordinal = other.strip_prefix("cuda:")?;
                Some(Self::Cuda(Some(ordinal.parse().ok()?)))
            }
        }
    }

    /// Given user's input, return a variant if the input matches one
    pub fn from_cli(device: &str) -> Option<Self> {
        Self::from_location(device.to_lowercase().as_str())
    }
}

impl Default for Device {
    /// The default Device is [`Device::Cpu`].
    fn default() -> Self {
        Self::Cpu
    }
}

impl Display for Device {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(fmt, "cpu"),
            Device::Cuda(None) => write!(fmt, "cuda"),
            Device::Cuda(Some(ordinal)) => write!(fmt, "cuda:{ordinal}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::util::device::Device;

    #[test]
    fn can_parse_cpu_any_case() {
        assert!(matches!(Device::from_cli("cpu"), Some(Device::Cpu)));
        assert!(matches!(Device::from_cli("CPU"), Some(Device::Cpu)));
        assert!(matches!(Device::from_cli("Cpu"), Some(Device::Cpu)));
    }

    #[test]
    fn can_parse_cuda_without_ordinal() {
        assert!(matches!(Device::from_cli("cuda"), Some(Device::Cuda(None))));
        assert!(matches!(Device::from_cli("CUDA"), Some(Device::Cuda(None))));
    }

    #[test]
    fn can_parse_cuda_with_ordinal() {
        assert!(matches!(
            Device::from_cli("cuda:0"),
            Some(Device::Cuda(Some(0)))
        ));
        assert!(matches!(
            Device::from_cli("cuda:3"),
            Some(Device::Cuda(Some(3)))
        ));
    }

    #[test]
    fn cant_parse_invalid() {
        assert!(Device::from_cli("gpu").is_none());
        assert!(Device::from_cli("cuda:").is_none());
        assert!(Device::from_cli("cuda:x").is_none());
        assert!(Device::from_cli("").is_none());
    }

    #[test]
    fn location_parsing_is_case_sensitive() {
        assert!(Device::from_location("CPU").is_none());
        assert!(matches!(Device::from_location("cpu"), Some(Device::Cpu)));
    }
}
