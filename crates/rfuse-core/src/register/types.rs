//! Register, bitfield and enum types

use crate::error::{Error, Result};
use crate::lock::{FuseLock, IndividualWriteLock};

/// Access rights of a register or bitfield
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
pub enum Access {
    /// Readable and writable
    #[default]
    #[serde(alias = "RW")]
    ReadWrite,
    /// Readable only
    #[serde(alias = "RO")]
    ReadOnly,
    /// Writable only
    #[serde(alias = "WO")]
    WriteOnly,
    /// Neither readable nor writable from the host
    #[serde(alias = "NONE")]
    NoAccess,
}

impl Access {
    /// Check whether the host may read
    pub const fn is_readable(&self) -> bool {
        matches!(self, Access::ReadWrite | Access::ReadOnly)
    }

    /// Check whether the host may write
    pub const fn is_writable(&self) -> bool {
        matches!(self, Access::ReadWrite | Access::WriteOnly)
    }

    /// Human readable description
    pub const fn description(&self) -> &'static str {
        match self {
            Access::ReadWrite => "Read/Write",
            Access::ReadOnly => "Read only",
            Access::WriteOnly => "Write only",
            Access::NoAccess => "No access",
        }
    }
}

impl core::fmt::Display for Access {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A named value of a bitfield
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuseEnum {
    /// Symbolic name
    pub name: String,
    /// Integer value, fits the owning bitfield
    pub value: u32,
    /// Human readable description
    pub description: String,
}

impl FuseEnum {
    /// Create a new enum value
    pub fn new(name: impl Into<String>, value: u32, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            description: description.into(),
        }
    }
}

/// A bitfield within a leaf register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    name: String,
    offset: u32,
    width: u32,
    reset_value: u32,
    access: Access,
    description: String,
    enums: Vec<FuseEnum>,
}

impl Bitfield {
    /// Create a new bitfield at `offset` spanning `width` bits
    pub fn new(name: impl Into<String>, offset: u32, width: u32) -> Self {
        Self {
            name: name.into(),
            offset,
            width,
            reset_value: 0,
            access: Access::ReadWrite,
            description: String::new(),
            enums: Vec::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the access rights
    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    /// Append a named value
    pub fn with_enum(mut self, value: FuseEnum) -> Self {
        self.enums.push(value);
        self
    }

    /// Bitfield name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bit offset within the register
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Width in bits
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Reset value of the bitfield, derived from the register reset value
    pub fn reset_value(&self) -> u32 {
        self.reset_value
    }

    /// Access rights
    pub fn access(&self) -> Access {
        self.access
    }

    /// Description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Named values
    pub fn enums(&self) -> &[FuseEnum] {
        &self.enums
    }

    /// Largest value the bitfield can hold
    pub fn max_value(&self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }

    /// Mask of the bitfield within the register
    pub fn mask(&self) -> u32 {
        self.max_value() << self.offset
    }

    /// Extract this bitfield from a register value
    pub fn extract(&self, reg_value: u32) -> u32 {
        (reg_value & self.mask()) >> self.offset
    }

    /// Insert `value` into a register value
    pub fn insert(&self, reg_value: u32, value: u32) -> Result<u32> {
        if value > self.max_value() {
            return Err(Error::Configuration(format!(
                "Value {:#x} does not fit bitfield {} ({} bits)",
                value, self.name, self.width
            )));
        }
        Ok((reg_value & !self.mask()) | (value << self.offset))
    }

    /// Find a named value by name (case-insensitive)
    pub fn get_enum(&self, name: &str) -> Result<&FuseEnum> {
        self.enums
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::NotFound {
                kind: "enum",
                name: format!("{}.{}", self.name, name),
            })
    }

    /// Find the named value matching `value`, if any
    pub fn enum_by_value(&self, value: u32) -> Option<&FuseEnum> {
        self.enums.iter().find(|e| e.value == value)
    }

    pub(crate) fn validate(&mut self, reg_name: &str, reg_width: u32, reg_reset: u32) -> Result<()> {
        // Register widths are at most 32 bits, so a fitting field has offset < 32
        let fits = self
            .offset
            .checked_add(self.width)
            .is_some_and(|end| end <= reg_width);
        if self.width == 0 || !fits {
            return Err(Error::Configuration(format!(
                "Bitfield {}.{} (offset {}, width {}) exceeds register width {}",
                reg_name, self.name, self.offset, self.width, reg_width
            )));
        }
        for e in &self.enums {
            if e.value > self.max_value() {
                return Err(Error::Configuration(format!(
                    "Enum {} value {:#x} does not fit bitfield {}.{}",
                    e.name, e.value, reg_name, self.name
                )));
            }
        }
        self.reset_value = self.extract(reg_reset);
        Ok(())
    }
}

/// A fuse register
///
/// Structural attributes are fixed once the register is part of a
/// [`super::FuseRegisters`] collection; only the value and the active locks
/// change during a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuseRegister {
    name: String,
    uid: String,
    otp_index: Option<u32>,
    width: u32,
    description: String,
    access: Access,
    reset_value: u32,
    reverse: bool,
    individual_write_lock: IndividualWriteLock,
    bitfields: Vec<Bitfield>,
    sub_regs: Vec<FuseRegister>,
    reverse_subregs_order: bool,
    value: u32,
    fuse_locks: FuseLock,
    applied_locks: FuseLock,
}

impl FuseRegister {
    /// Create a new leaf register
    ///
    /// The uid defaults to the name.
    pub fn new(name: impl Into<String>, otp_index: Option<u32>, width: u32) -> Self {
        let name = name.into();
        Self {
            uid: name.clone(),
            name,
            otp_index,
            width,
            description: String::new(),
            access: Access::ReadWrite,
            reset_value: 0,
            reverse: false,
            individual_write_lock: IndividualWriteLock::Never,
            bitfields: Vec::new(),
            sub_regs: Vec::new(),
            reverse_subregs_order: false,
            value: 0,
            fuse_locks: FuseLock::empty(),
            applied_locks: FuseLock::empty(),
        }
    }

    /// Create a new group register from its members
    pub fn group(name: impl Into<String>, sub_regs: Vec<FuseRegister>, reverse_order: bool) -> Self {
        let width = sub_regs.iter().map(|r| r.width).sum();
        let mut reg = Self::new(name, None, width);
        reg.sub_regs = sub_regs;
        reg.reverse_subregs_order = reverse_order;
        reg
    }

    /// Set the stable uid
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the access rights
    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    /// Set the reset value, which is also the initial value
    pub fn with_reset_value(mut self, reset_value: u32) -> Self {
        self.reset_value = reset_value;
        self.value = reset_value;
        self
    }

    /// Interpret the value as byte-reversed raw value
    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Set the individual write lock policy
    pub fn with_write_lock(mut self, policy: IndividualWriteLock) -> Self {
        self.individual_write_lock = policy;
        self
    }

    /// Append a bitfield
    pub fn with_bitfield(mut self, bitfield: Bitfield) -> Self {
        self.bitfields.push(bitfield);
        self
    }

    /// Register name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stable unique identifier
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// OTP word index, `None` for group registers
    pub fn otp_index(&self) -> Option<u32> {
        self.otp_index
    }

    /// Width in bits
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Access rights
    pub fn access(&self) -> Access {
        self.access
    }

    /// Individual write lock policy
    pub fn individual_write_lock(&self) -> IndividualWriteLock {
        self.individual_write_lock
    }

    /// Bitfields in declaration order
    pub fn bitfields(&self) -> &[Bitfield] {
        &self.bitfields
    }

    /// Group members in declaration order
    pub fn sub_regs(&self) -> &[FuseRegister] {
        &self.sub_regs
    }

    /// Whether members are concatenated in reverse order
    pub fn reverse_subregs_order(&self) -> bool {
        self.reverse_subregs_order
    }

    /// Check whether this is a group register
    pub fn has_group_registers(&self) -> bool {
        !self.sub_regs.is_empty()
    }

    /// Group members in concatenation order
    pub fn ordered_sub_regs(&self) -> Vec<&FuseRegister> {
        if self.reverse_subregs_order {
            self.sub_regs.iter().rev().collect()
        } else {
            self.sub_regs.iter().collect()
        }
    }

    /// Number of bytes in the byte representation of the value
    pub fn byte_len(&self) -> usize {
        if self.has_group_registers() {
            self.sub_regs.iter().map(|r| r.byte_len()).sum()
        } else {
            self.width.div_ceil(8) as usize
        }
    }

    fn leaf_only(&self, what: &str) -> Result<()> {
        if self.has_group_registers() {
            return Err(Error::Configuration(format!(
                "Cannot {} of group register {} as a single word",
                what, self.name
            )));
        }
        Ok(())
    }

    fn max_value(&self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }

    fn reverse_bytes(&self, value: u32) -> u32 {
        let len = self.byte_len();
        let bytes = value.to_be_bytes();
        let mut out = [0u8; 4];
        for (i, b) in bytes[4 - len..].iter().rev().enumerate() {
            out[4 - len + i] = *b;
        }
        u32::from_be_bytes(out)
    }

    /// Get the value of a leaf register
    ///
    /// `raw` returns the exact hardware bit pattern; otherwise the
    /// register's interpretation (byte reversal) is applied.
    pub fn get_value(&self, raw: bool) -> Result<u32> {
        self.leaf_only("get value")?;
        if !raw && self.reverse {
            Ok(self.reverse_bytes(self.value))
        } else {
            Ok(self.value)
        }
    }

    /// Set the value of a leaf register
    pub fn set_value(&mut self, value: u32, raw: bool) -> Result<()> {
        self.leaf_only("set value")?;
        let value = if !raw && self.reverse {
            self.reverse_bytes(value)
        } else {
            value
        };
        if value > self.max_value() {
            return Err(Error::Configuration(format!(
                "Value {:#x} does not fit register {} ({} bits)",
                value, self.name, self.width
            )));
        }
        self.value = value;
        Ok(())
    }

    /// Get the value as big-endian bytes
    ///
    /// Group registers concatenate the raw bytes of their members.
    pub fn get_bytes_value(&self, raw: bool) -> Vec<u8> {
        if self.has_group_registers() {
            return self
                .ordered_sub_regs()
                .into_iter()
                .flat_map(|r| r.get_bytes_value(true))
                .collect();
        }
        let value = if !raw && self.reverse {
            self.reverse_bytes(self.value)
        } else {
            self.value
        };
        value.to_be_bytes()[4 - self.byte_len()..].to_vec()
    }

    /// Set the value from big-endian bytes
    ///
    /// Shorter input is zero-extended on the left. Group registers split the
    /// bytes across their members in concatenation order.
    pub fn set_bytes_value(&mut self, bytes: &[u8], raw: bool) -> Result<()> {
        let len = self.byte_len();
        let significant = bytes.iter().skip_while(|&&b| b == 0).count();
        if significant > len {
            return Err(Error::Configuration(format!(
                "Value of {} bytes does not fit register {} ({} bytes)",
                bytes.len(),
                self.name,
                len
            )));
        }
        let mut padded = vec![0u8; len];
        let take = bytes.len().min(len);
        padded[len - take..].copy_from_slice(&bytes[bytes.len() - take..]);

        if self.has_group_registers() {
            let reverse = self.reverse_subregs_order;
            let mut members: Vec<&mut FuseRegister> = self.sub_regs.iter_mut().collect();
            if reverse {
                members.reverse();
            }
            let mut pos = 0;
            for member in members {
                let n = member.byte_len();
                member.set_bytes_value(&padded[pos..pos + n], true)?;
                pos += n;
            }
            return Ok(());
        }

        let mut word = [0u8; 4];
        word[4 - len..].copy_from_slice(&padded);
        self.set_value(u32::from_be_bytes(word), raw)
    }

    /// Reset value of a leaf register
    pub fn reset_value(&self) -> u32 {
        self.reset_value
    }

    /// Reset value as big-endian raw bytes
    pub fn get_reset_bytes(&self) -> Vec<u8> {
        if self.has_group_registers() {
            return self
                .ordered_sub_regs()
                .into_iter()
                .flat_map(|r| r.get_reset_bytes())
                .collect();
        }
        self.reset_value.to_be_bytes()[4 - self.byte_len()..].to_vec()
    }

    /// Check whether the current value equals the reset value
    pub fn has_reset_value(&self) -> bool {
        self.get_bytes_value(true) == self.get_reset_bytes()
    }

    /// Restore the reset value (members included)
    pub fn reset(&mut self) {
        self.value = self.reset_value;
        for member in &mut self.sub_regs {
            member.reset();
        }
    }

    /// Find a bitfield by name (case-insensitive)
    pub fn get_bitfield(&self, name: &str) -> Result<&Bitfield> {
        self.bitfields
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::bitfield_not_found(format!("{}.{}", self.name, name)))
    }

    /// Get the value of a bitfield
    pub fn get_bitfield_value(&self, name: &str) -> Result<u32> {
        Ok(self.get_bitfield(name)?.extract(self.value))
    }

    /// Set the value of a bitfield
    pub fn set_bitfield_value(&mut self, name: &str, value: u32) -> Result<()> {
        let new_value = self.get_bitfield(name)?.insert(self.value, value)?;
        self.value = new_value;
        Ok(())
    }

    /// Set a bitfield to one of its named values
    pub fn set_bitfield_enum(&mut self, name: &str, enum_name: &str) -> Result<()> {
        let value = self.get_bitfield(name)?.get_enum(enum_name)?.value;
        self.set_bitfield_value(name, value)
    }

    /// Locks currently active on the register
    pub fn active_locks(&self) -> FuseLock {
        self.fuse_locks | self.applied_locks
    }

    /// Mark locks as applied to the register
    pub fn lock(&mut self, lock: FuseLock) {
        self.applied_locks |= lock;
    }

    pub(crate) fn set_fuse_locks(&mut self, locks: FuseLock) {
        self.fuse_locks = locks;
    }

    pub(crate) fn sub_regs_mut(&mut self) -> &mut [FuseRegister] {
        &mut self.sub_regs
    }

    pub(crate) fn validate(&mut self) -> Result<()> {
        if self.has_group_registers() {
            if self.otp_index.is_some() {
                return Err(Error::Configuration(format!(
                    "Group register {} must not have an OTP index",
                    self.name
                )));
            }
            if !self.bitfields.is_empty() {
                return Err(Error::Configuration(format!(
                    "Group register {} must not define bitfields",
                    self.name
                )));
            }
            for member in &mut self.sub_regs {
                if member.has_group_registers() {
                    return Err(Error::Configuration(format!(
                        "Group register {} cannot nest group register {}",
                        self.name, member.name
                    )));
                }
                member.validate()?;
            }
            self.width = self.sub_regs.iter().map(|r| r.width).sum();
            return Ok(());
        }

        if self.width == 0 || self.width > 32 {
            return Err(Error::Configuration(format!(
                "Register {} width {} is not within 1..=32 bits",
                self.name, self.width
            )));
        }
        if self.reset_value > self.max_value() {
            return Err(Error::Configuration(format!(
                "Reset value {:#x} does not fit register {}",
                self.reset_value, self.name
            )));
        }
        let (name, width, reset) = (self.name.clone(), self.width, self.reset_value);
        for bitfield in &mut self.bitfields {
            bitfield.validate(&name, width, reset)?;
        }
        Ok(())
    }
}

impl core::fmt::Display for FuseRegister {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Name:        {} ({})", self.name, self.uid)?;
        match self.otp_index {
            Some(index) => writeln!(f, "OTP index:   {}", index)?,
            None => writeln!(f, "OTP index:   -")?,
        }
        writeln!(f, "Width:       {}", self.width)?;
        writeln!(f, "Access:      {}", self.access)?;
        writeln!(f, "Write lock:  {}", self.individual_write_lock)?;
        writeln!(f, "Value:       {}", crate::hex_bytes(&self.get_bytes_value(true)))?;
        if !self.description.is_empty() {
            writeln!(f, "Description: {}", self.description)?;
        }
        for bitfield in &self.bitfields {
            writeln!(
                f,
                "  Bitfield {} [{}:{}] = {:#x} {}",
                bitfield.name,
                bitfield.offset + bitfield.width - 1,
                bitfield.offset,
                bitfield.extract(self.value),
                bitfield.description
            )?;
            for e in &bitfield.enums {
                writeln!(f, "    {} = {:#x} {}", e.name, e.value, e.description)?;
            }
        }
        for member in self.ordered_sub_regs() {
            writeln!(
                f,
                "  Member {} (OTP index {:?})",
                member.name, member.otp_index
            )?;
        }
        Ok(())
    }
}
