//! Feature fuse scripts
//!
//! Renders the fuse script of a family feature (for example the SRK hash of
//! a secure boot setup) from its database definition. Values of the
//! definition are either literals or names of attributes provided by the
//! caller, typically taken from a generated image.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rfuse_core::database::FuseDatabase;
use rfuse_core::operator::BackendKind;
use rfuse_core::register::{FuseRegister, FuseRegisters};
use rfuse_core::script::{BitfieldValueSpec, FuseValueSpec, ScriptDefinition};
use rfuse_core::{parse_hex_bytes, parse_number, Error, Result, TOOL_NAME, TOOL_VERSION};

use crate::registry::format_write_command;

/// Value of an attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// Integer
    Int(u64),
    /// Big-endian byte string, e.g. a hash
    Bytes(Vec<u8>),
    /// Boolean, taken as 0 or 1
    Bool(bool),
}

/// Provider of named attribute values
pub trait AttributeSource {
    /// Value of the attribute `name`, `None` if unknown
    ///
    /// Fails when the attribute exists but its value is not usable.
    fn attribute(&self, name: &str) -> Result<Option<AttributeValue>>;
}

impl AttributeSource for HashMap<String, AttributeValue> {
    fn attribute(&self, name: &str) -> Result<Option<AttributeValue>> {
        Ok(self.get(name).cloned())
    }
}

/// Attributes from a TOML table
///
/// Integers and booleans map directly. Strings are parsed as hex byte
/// strings (`0x...`) or decimal numbers, arrays as byte lists.
impl AttributeSource for toml::Table {
    fn attribute(&self, name: &str) -> Result<Option<AttributeValue>> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        let invalid = || Error::Configuration(format!("Invalid value of attribute {}: {}", name, value));
        let value = match value {
            toml::Value::Integer(n) => AttributeValue::Int(u64::try_from(*n).map_err(|_| invalid())?),
            toml::Value::Boolean(b) => AttributeValue::Bool(*b),
            toml::Value::String(s) => match parse_hex_bytes(s) {
                Some(bytes) => AttributeValue::Bytes(bytes),
                None => AttributeValue::Int(parse_number(s).map_err(|_| invalid())?),
            },
            toml::Value::Array(items) => AttributeValue::Bytes(
                items
                    .iter()
                    .map(|item| item.as_integer().and_then(|n| u8::try_from(n).ok()))
                    .collect::<Option<Vec<u8>>>()
                    .ok_or_else(invalid)?,
            ),
            _ => return Err(invalid()),
        };
        Ok(Some(value))
    }
}

fn resolve(attrs: &dyn AttributeSource, name: &str) -> Result<AttributeValue> {
    attrs
        .attribute(name)?
        .ok_or_else(|| Error::AttributeResolution(name.to_string()))
}

fn fit_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::Configuration(format!("Value {:#x} of {} exceeds 32 bits", value, what)))
}

/// Big-endian bytes as a number, at most four significant bytes
fn bytes_to_u32(bytes: &[u8], what: &str) -> Result<u32> {
    let significant: Vec<u8> = bytes.iter().copied().skip_while(|&b| b == 0).collect();
    if significant.len() > 4 {
        return Err(Error::Configuration(format!(
            "Value of {} bytes does not fit {}",
            bytes.len(),
            what
        )));
    }
    Ok(significant
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
}

/// Apply a whole-register value; literals are raw, attributes interpreted
fn apply_register_value(reg: &mut FuseRegister, value: AttributeValue, raw: bool) -> Result<()> {
    match value {
        AttributeValue::Bytes(bytes) => reg.set_bytes_value(&bytes, raw),
        AttributeValue::Int(n) if reg.has_group_registers() => {
            reg.set_bytes_value(&n.to_be_bytes(), raw)
        }
        AttributeValue::Int(n) => {
            let value = fit_u32(n, reg.name())?;
            reg.set_value(value, raw)
        }
        AttributeValue::Bool(b) => apply_register_value(reg, AttributeValue::Int(u64::from(b)), raw),
    }
}

fn apply_bitfield_value(reg: &mut FuseRegister, bitfield: &str, value: AttributeValue) -> Result<()> {
    let value = match value {
        AttributeValue::Int(n) => fit_u32(n, bitfield)?,
        AttributeValue::Bool(b) => u32::from(b),
        AttributeValue::Bytes(bytes) => bytes_to_u32(&bytes, bitfield)?,
    };
    reg.set_bitfield_value(bitfield, value)
}

/// Hex representation without leading zeros
fn hex_number(bytes: &[u8]) -> String {
    let digits: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        "0x0".to_string()
    } else {
        format!("0x{}", digits)
    }
}

/// Fuse script of one family feature
#[derive(Debug, Clone)]
pub struct FuseScript {
    family: String,
    revision: String,
    feature: String,
    backend: BackendKind,
    definition: ScriptDefinition,
    registers: FuseRegisters,
}

impl FuseScript {
    /// Select the script `<feature>.fuses`, or `<feature>.fuses_<index>`
    pub fn new(
        db: &FuseDatabase,
        family: &str,
        revision: &str,
        feature: &str,
        index: Option<u32>,
    ) -> Result<Self> {
        let def = db.get(family, revision)?;
        let key = match index {
            Some(index) => format!("fuses_{}", index),
            None => "fuses".to_string(),
        };
        let definition = def.script(feature, &key)?.clone();

        Ok(Self {
            family: family.to_string(),
            revision: revision.to_string(),
            feature: feature.to_string(),
            backend: def.tool(),
            definition,
            registers: def.registers(),
        })
    }

    /// Script name from the definition
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Feature the script belongs to
    pub fn feature(&self) -> &str {
        &self.feature
    }

    /// Whether writes are issued without verification
    pub fn no_verify(&self) -> bool {
        self.definition.no_verify
    }

    /// Backend the commands are generated for
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Script file header
    pub fn file_header(&self) -> String {
        format!(
            "# {} {} fuses programming script\n# Generated by {} {}\n# Family: {} Revision: {}",
            self.backend, self.definition.name, TOOL_NAME, TOOL_VERSION, self.family, self.revision
        )
    }

    /// Generate the script
    ///
    /// With `info_only` only the list of OTP words and values is returned.
    /// Fails without output if any attribute cannot be resolved.
    pub fn generate_script(&self, attrs: &dyn AttributeSource, info_only: bool) -> Result<String> {
        let mut registers = self.registers.clone();
        let verify = !self.definition.no_verify;
        let mut script = self.file_header() + "\n";
        let mut info = String::new();

        for (name, spec) in &self.definition.fuses {
            let reg = registers.find_reg_mut(name, true)?;
            let mut extra_info = String::new();
            let mut partial = false;

            match spec {
                FuseValueSpec::Literal(value) => {
                    apply_register_value(reg, AttributeValue::Int(*value), true)?
                }
                FuseValueSpec::Attribute(attr) => {
                    apply_register_value(reg, resolve(attrs, attr)?, false)?
                }
                FuseValueSpec::Bitfields(fields) => {
                    for (bitfield, value) in fields {
                        let value = match value {
                            BitfieldValueSpec::Literal(v) => AttributeValue::Int(*v),
                            BitfieldValueSpec::Attribute(attr) => resolve(attrs, attr)?,
                        };
                        apply_bitfield_value(reg, bitfield, value)?;
                        let bf = reg.get_bitfield(bitfield)?;
                        extra_info.push_str(&format!(
                            "# Bitfield: {}, Description: {}, Value: {:#x}\n",
                            bf.name(),
                            bf.description(),
                            reg.get_bitfield_value(bitfield)?
                        ));
                    }
                    partial = fields.len() < reg.bitfields().len();
                }
            }

            let reg: &FuseRegister = reg;
            let value = if reg.has_group_registers() {
                hex_number(&reg.get_bytes_value(false))
            } else {
                format!("{:#x}", reg.get_value(false)?)
            };
            script.push_str(&format!("\n# Value: {}\n", value));
            script.push_str(&format!("# Description: {}\n", reg.description()));
            script.push_str(&extra_info);
            if partial {
                script.push_str("# WARNING! Partially set register, check all bitfields before writing\n");
            }

            if reg.has_group_registers() {
                script.push_str(&format!("# Grouped register name: {}\n\n", reg.name()));
                info.push_str(&format!("\n --== Grouped register name: {} ==-- \n", reg.name()));
                for member in reg.sub_regs() {
                    let index = otp_index(member)?;
                    let raw = member.get_value(true)?;
                    script.push_str(&format!(
                        "# OTP ID: {}, Value: {:#x}\n",
                        member.name(),
                        member.get_value(false)?
                    ));
                    script.push_str(&format_write_command(self.backend, index, raw, false, verify));
                    script.push('\n');
                    info.push_str(&format!("OTP ID: {}, Value: {:#x}\n", index, raw));
                }
            } else {
                let index = otp_index(reg)?;
                let raw = reg.get_value(true)?;
                script.push_str(&format!("# OTP ID: {}\n\n", reg.name()));
                script.push_str(&format_write_command(self.backend, index, raw, false, verify));
                script.push('\n');
                info.push_str(&format!("OTP ID: {}, Value: {:#x}\n", index, raw));
            }
        }

        log::debug!(
            "Generated {} fuse script of {} for {}",
            self.definition.name,
            self.feature,
            self.family
        );
        if info_only {
            Ok(info)
        } else {
            Ok(script)
        }
    }

    /// Write the script to `<output_dir>/<filename>_<backend>.bcf`
    ///
    /// Returns the path of the written file. Nothing is written if the
    /// script cannot be generated.
    pub fn write_script(
        &self,
        filename: &str,
        output_dir: &Path,
        attrs: &dyn AttributeSource,
    ) -> Result<PathBuf> {
        let content = self.generate_script(attrs, false)?;
        let path = output_dir.join(format!("{}_{}.bcf", filename, self.backend));
        fs::write(&path, content)?;
        log::info!("Fuse script written to {}", path.display());
        Ok(path)
    }
}

fn otp_index(reg: &FuseRegister) -> Result<u32> {
    reg.otp_index()
        .ok_or_else(|| Error::Configuration(format!("OTP index is not defined for {}", reg.name())))
}
