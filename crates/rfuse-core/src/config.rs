//! Declarative fuse configuration in TOML
//!
//! ```toml
//! family = "mimxrt1189"
//! revision = "latest"
//!
//! [registers]
//! BOOT_CFG0 = 0x1234
//! SRK_HASH = "0x0011223344556677"
//! BOOT_CFG1 = { BOOT_MODE = "SERIAL", SEC_CONFIG = 2 }
//! ```
//!
//! Register and bitfield order of the file is preserved. Registers are
//! written as inline tables so that export keeps that order as well.

use std::fs;
use std::marker::PhantomData;
use std::path::Path;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};

use crate::error::{Error, Result};
use crate::register::{FuseRegister, FuseRegisters};
use crate::{hex_bytes, parse_hex_bytes, parse_number};

/// A single configuration value
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Boolean, taken as 0 or 1
    Bool(bool),
    /// Integer
    Int(u64),
    /// Hex or decimal number string, or an enum name
    Text(String),
}

impl ConfigValue {
    /// Numeric value, if the value is a number
    pub fn as_number(&self) -> Option<u64> {
        match self {
            ConfigValue::Bool(b) => Some(u64::from(*b)),
            ConfigValue::Int(n) => Some(*n),
            ConfigValue::Text(s) => parse_number(s).ok(),
        }
    }
}

/// String keyed map keeping insertion order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigMap<V>(Vec<(String, V)>);

impl<V> Default for ConfigMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> ConfigMap<V> {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, replacing an existing entry of the same name
    pub fn insert(&mut self, name: impl Into<String>, value: V) {
        let name = name.into();
        match self.0.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Look up an entry (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&V> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Iterate over the entries in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate over the names in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V> FromIterator<(String, V)> for ConfigMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

struct ConfigMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for ConfigMapVisitor<V> {
    type Value = ConfigMap<V>;

    fn expecting(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "a table")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> core::result::Result<Self::Value, A::Error> {
        let mut map = ConfigMap::new();
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            if map.get(&key).is_some() {
                return Err(serde::de::Error::custom(format!("duplicate key '{}'", key)));
            }
            map.0.push((key, value));
        }
        Ok(map)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for ConfigMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        deserializer.deserialize_map(ConfigMapVisitor(PhantomData))
    }
}

/// Configuration of one register
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(untagged)]
pub enum RegisterConfig {
    /// Value of the whole register
    Value(ConfigValue),
    /// Values of individual bitfields
    Bitfields(ConfigMap<ConfigValue>),
}

/// Register name -> configuration, in file order
pub type RegisterMap = ConfigMap<RegisterConfig>;

fn default_revision() -> String {
    "latest".to_string()
}

/// Fuse configuration of one device
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct FuseConfig {
    /// Device family
    pub family: String,
    /// Silicon revision, `latest` if omitted
    #[serde(default = "default_revision")]
    pub revision: String,
    /// Register values
    #[serde(default)]
    pub registers: RegisterMap,
}

impl FuseConfig {
    /// Create an empty configuration
    pub fn new(family: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            revision: revision.into(),
            registers: RegisterMap::new(),
        }
    }

    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save the configuration to a TOML file
    pub fn to_toml_file(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_toml_string())?;
        Ok(())
    }

    /// Convert the configuration to a TOML string
    pub fn to_toml_string(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("family = {}\n", toml_string(&self.family)));
        output.push_str(&format!("revision = {}\n", toml_string(&self.revision)));
        output.push_str("\n[registers]\n");

        for (name, reg) in self.registers.iter() {
            match reg {
                RegisterConfig::Value(value) => {
                    output.push_str(&format!("{} = {}\n", toml_key(name), toml_value(value)));
                }
                RegisterConfig::Bitfields(fields) => {
                    let fields: Vec<String> = fields
                        .iter()
                        .map(|(k, v)| format!("{} = {}", toml_key(k), toml_value(v)))
                        .collect();
                    output.push_str(&format!("{} = {{ {} }}\n", toml_key(name), fields.join(", ")));
                }
            }
        }

        output
    }
}

fn toml_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn toml_key(key: &str) -> String {
    if !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        key.to_string()
    } else {
        toml_string(key)
    }
}

fn toml_value(value: &ConfigValue) -> String {
    match value {
        ConfigValue::Bool(b) => b.to_string(),
        ConfigValue::Int(n) if *n > i64::MAX as u64 => toml_string(&format!("0x{:X}", n)),
        ConfigValue::Int(n) => format!("0x{:X}", n),
        ConfigValue::Text(s) => toml_string(s),
    }
}

fn fit_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::Configuration(format!("Value {:#x} of {} exceeds 32 bits", value, what)))
}

fn apply_register_value(reg: &mut FuseRegister, value: &ConfigValue) -> Result<()> {
    if reg.has_group_registers() {
        let bytes = match value {
            ConfigValue::Int(n) => n.to_be_bytes().to_vec(),
            ConfigValue::Text(s) => match parse_hex_bytes(s) {
                Some(bytes) => bytes,
                None => parse_number(s)
                    .map_err(|e| Error::Configuration(format!("{}: {}", reg.name(), e)))?
                    .to_be_bytes()
                    .to_vec(),
            },
            ConfigValue::Bool(_) => {
                return Err(Error::Configuration(format!(
                    "Group register {} cannot take a boolean value",
                    reg.name()
                )))
            }
        };
        return reg.set_bytes_value(&bytes, false);
    }

    let number = value.as_number().ok_or_else(|| {
        Error::Configuration(format!("Invalid value {:?} for register {}", value, reg.name()))
    })?;
    let number = fit_u32(number, reg.name())?;
    reg.set_value(number, false)
}

fn apply_bitfield_value(reg: &mut FuseRegister, bitfield: &str, value: &ConfigValue) -> Result<()> {
    match value.as_number() {
        Some(number) => {
            let number = fit_u32(number, bitfield)?;
            reg.set_bitfield_value(bitfield, number)
        }
        None => match value {
            ConfigValue::Text(enum_name) => reg.set_bitfield_enum(bitfield, enum_name),
            _ => Err(Error::Configuration(format!(
                "Invalid value {:?} for bitfield {}",
                value, bitfield
            ))),
        },
    }
}

impl FuseRegisters {
    /// Apply register values from a configuration
    ///
    /// Group members may be addressed directly. Returns the uids of the
    /// configured registers in configuration order. Nothing is written to
    /// hardware.
    pub fn load_config(&mut self, registers: &RegisterMap) -> Result<Vec<String>> {
        let mut loaded = Vec::with_capacity(registers.len());
        for (name, config) in registers.iter() {
            let reg = self.find_reg_mut(name, true)?;
            match config {
                RegisterConfig::Value(value) => apply_register_value(reg, value)?,
                RegisterConfig::Bitfields(fields) => {
                    for (bitfield, value) in fields.iter() {
                        apply_bitfield_value(reg, bitfield, value)?;
                    }
                }
            }
            loaded.push(reg.uid().to_string());
        }
        self.update_locks();
        Ok(loaded)
    }

    /// Export the current register values
    ///
    /// With `diff` only registers that differ from their reset value are
    /// included.
    pub fn get_config(&self, diff: bool) -> Result<RegisterMap> {
        let mut map = RegisterMap::new();
        for reg in self.iter() {
            if diff && reg.has_reset_value() {
                continue;
            }
            let config = if reg.has_group_registers() {
                RegisterConfig::Value(ConfigValue::Text(hex_bytes(&reg.get_bytes_value(false))))
            } else if reg.bitfields().is_empty() || !bitfields_cover(reg)? {
                RegisterConfig::Value(ConfigValue::Int(u64::from(reg.get_value(false)?)))
            } else {
                let value = reg.get_value(true)?;
                RegisterConfig::Bitfields(
                    reg.bitfields()
                        .iter()
                        .map(|b| (b.name().to_string(), ConfigValue::Int(u64::from(b.extract(value)))))
                        .collect(),
                )
            };
            map.insert(reg.name(), config);
        }
        Ok(map)
    }
}

/// Whether a bitfield export restores `reg` when loaded over its reset value
///
/// Bits outside every bitfield must still hold their reset state.
fn bitfields_cover(reg: &FuseRegister) -> Result<bool> {
    let covered = reg.bitfields().iter().fold(0, |acc, b| acc | b.mask());
    Ok((reg.get_value(true)? ^ reg.reset_value()) & !covered == 0)
}
