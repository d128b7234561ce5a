//! Backend registry and device opening
//!
//! Maps a backend tag to its operator. Transport handles are created by the
//! caller and handed over here, so this crate never depends on a specific
//! transport implementation.

use std::collections::HashMap;

use rfuse_blhost::BlhostOperator;
use rfuse_core::operator::{BackendKind, FuseOperator};
use rfuse_core::register::FuseRegister;
use rfuse_core::transport::{BootSession, EleHandler};
use rfuse_core::{Error, Result};
use rfuse_nxpele::NxpeleOperator;

/// Connection to a device, as required by one of the backends
pub enum DeviceHandle {
    /// MCU bootloader session
    Boot(Box<dyn BootSession>),
    /// EdgeLock enclave message channel
    Ele(Box<dyn EleHandler>),
}

impl DeviceHandle {
    fn describe(&self) -> &'static str {
        match self {
            DeviceHandle::Boot(_) => "boot session",
            DeviceHandle::Ele(_) => "EdgeLock message handler",
        }
    }
}

/// Create the operator of a backend on top of a device handle
///
/// Fails with a configuration error if the handle does not fit the backend.
pub fn open_operator(kind: BackendKind, handle: DeviceHandle) -> Result<Box<dyn FuseOperator>> {
    match (kind, handle) {
        (BackendKind::Blhost, DeviceHandle::Boot(session)) => {
            Ok(Box::new(BlhostOperator::new(session)))
        }
        (BackendKind::Nxpele, DeviceHandle::Ele(handler)) => {
            Ok(Box::new(NxpeleOperator::new(handler)))
        }
        (kind, handle) => Err(Error::Configuration(format!(
            "The {} operator cannot use a {}",
            kind,
            handle.describe()
        ))),
    }
}

/// Format one write command of a backend's tool
pub fn format_write_command(
    kind: BackendKind,
    index: u32,
    value: u32,
    lock: bool,
    verify: bool,
) -> String {
    match kind {
        BackendKind::Blhost => {
            BlhostOperator::<Box<dyn BootSession>>::format_write_command(index, value, lock, verify)
        }
        BackendKind::Nxpele => {
            NxpeleOperator::<Box<dyn EleHandler>>::format_write_command(index, value, lock, verify)
        }
    }
}

/// Format a complete programming script of a backend's tool
pub fn format_script(
    kind: BackendKind,
    family: &str,
    revision: &str,
    fuses: &[&FuseRegister],
) -> Result<String> {
    match kind {
        BackendKind::Blhost => {
            BlhostOperator::<Box<dyn BootSession>>::format_script(family, revision, fuses)
        }
        BackendKind::Nxpele => {
            NxpeleOperator::<Box<dyn EleHandler>>::format_script(family, revision, fuses)
        }
    }
}

/// Parsed device parameters
pub struct DeviceParams {
    /// Device name
    pub name: String,
    /// Key-value parameters
    pub params: HashMap<String, String>,
}

/// Parse a device string into name and parameters
///
/// Format: "name" or "name:key1=value1,key2=value2"
pub fn parse_device_params(s: &str) -> core::result::Result<DeviceParams, Box<dyn std::error::Error>> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));

    let mut params = HashMap::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            if let Some((key, value)) = opt.split_once('=') {
                params.insert(key.to_string(), value.to_string());
            } else {
                return Err(
                    format!("Invalid parameter format: '{}' (expected key=value)", opt).into(),
                );
            }
        }
    }

    Ok(DeviceParams {
        name: name.to_string(),
        params,
    })
}

/// Names of the devices compiled into this build
pub fn available_devices() -> Vec<&'static str> {
    #[allow(unused_mut)]
    let mut devices = Vec::new();
    #[cfg(feature = "dummy")]
    devices.push("dummy");
    devices
}

/// Open a device by name and create the operator of `kind` on top of it
///
/// # Example
/// ```ignore
/// let operator = open_device("dummy:words=64", BackendKind::Blhost)?;
/// ```
pub fn open_device(
    device: &str,
    kind: BackendKind,
) -> core::result::Result<Box<dyn FuseOperator>, Box<dyn std::error::Error>> {
    let params = parse_device_params(device)?;

    match params.name.as_str() {
        #[cfg(feature = "dummy")]
        "dummy" => open_dummy(&params, kind),

        _ => Err(format!("Unknown device: {}", params.name).into()),
    }
}

#[cfg(feature = "dummy")]
fn open_dummy(
    params: &DeviceParams,
    kind: BackendKind,
) -> core::result::Result<Box<dyn FuseOperator>, Box<dyn std::error::Error>> {
    use rfuse_dummy::{DummyConfig, DummyFuses};

    let mut config = DummyConfig::default();
    if let Some(words) = params.params.get("words") {
        config.words = words
            .parse()
            .map_err(|e| format!("Invalid words value '{}': {}", words, e))?;
    }
    log::info!("Using dummy OTP device with {} words", config.words);

    let device = DummyFuses::new(config);
    let handle = match kind {
        BackendKind::Blhost => DeviceHandle::Boot(Box::new(device)),
        BackendKind::Nxpele => DeviceHandle::Ele(Box::new(device)),
    };
    Ok(open_operator(kind, handle)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfuse_dummy::DummyFuses;

    #[test]
    fn test_open_operator() {
        let op = open_operator(
            BackendKind::Blhost,
            DeviceHandle::Boot(Box::new(DummyFuses::new_default())),
        )
        .unwrap();
        assert_eq!(op.kind(), BackendKind::Blhost);

        let op = open_operator(
            BackendKind::Nxpele,
            DeviceHandle::Ele(Box::new(DummyFuses::new_default())),
        )
        .unwrap();
        assert_eq!(op.kind(), BackendKind::Nxpele);
    }

    #[test]
    fn test_mismatched_handle() {
        let err = open_operator(
            BackendKind::Nxpele,
            DeviceHandle::Boot(Box::new(DummyFuses::new_default())),
        )
        .err()
        .unwrap();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_dispatch_formatting() {
        assert_eq!(
            format_write_command(BackendKind::Blhost, 1, 0x10, true, true),
            "efuse-program-once 1 0x10 --verify lock"
        );
        assert_eq!(
            format_write_command(BackendKind::Nxpele, 1, 0x10, true, true),
            "write-fuse --index 1 --data 0x10 --lock"
        );
        let fuse = FuseRegister::new("F", Some(1), 32);
        assert!(format_script(BackendKind::Nxpele, "x", "a0", &[&fuse])
            .unwrap()
            .starts_with("# NXPELE"));
    }

    #[test]
    fn test_parse_device_params() {
        let params = parse_device_params("dummy:words=16").unwrap();
        assert_eq!(params.name, "dummy");
        assert_eq!(params.params.get("words"), Some(&"16".to_string()));
        assert!(parse_device_params("dummy:words").is_err());
        assert!(parse_device_params("usb").unwrap().params.is_empty());
    }
}
