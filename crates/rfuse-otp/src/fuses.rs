//! Fuse orchestration
//!
//! [`Fuses`] owns the register map of one device and the operator used to
//! reach it. Every hardware access goes through the lock rules:
//!
//! - a register guarded by a lock fuse gets that lock fuse read first, and
//!   the access is refused when the matching lock is set,
//! - the individual write lock policy of a register decides whether a write
//!   locks the fuse,
//! - registers with the `Always` policy can only be written while they still
//!   hold their reset value.
//!
//! The registers touched by the latest load, read or write form the fuse
//! context, which script generation works on.

use rfuse_core::config::FuseConfig;
use rfuse_core::database::FuseDatabase;
use rfuse_core::lock::{FuseLock, IndividualWriteLock};
use rfuse_core::operator::{BackendKind, FuseOperator};
use rfuse_core::register::{FuseRegister, FuseRegisters};
use rfuse_core::{Error, Result};

use crate::registry::format_script;

/// Fuses of one device
pub struct Fuses {
    family: String,
    revision: String,
    backend: BackendKind,
    registers: FuseRegisters,
    operator: Option<Box<dyn FuseOperator>>,
    /// uids of the registers touched by the latest operation
    fuse_context: Vec<String>,
}

fn ensure_readable(reg: &FuseRegister) -> Result<()> {
    if !reg.access().is_readable() {
        return Err(Error::OperationFailure(format!(
            "Unable to read fuse {}. Fuse access: {}",
            reg.name(),
            reg.access().description()
        )));
    }
    Ok(())
}

impl Fuses {
    /// Create the fuses of a family with reset values and no operator
    pub fn new(db: &FuseDatabase, family: &str, revision: &str) -> Result<Self> {
        let def = db.get(family, revision)?;
        Ok(Self {
            family: def.family().to_string(),
            revision: revision.to_string(),
            backend: def.tool(),
            registers: def.registers(),
            operator: None,
            fuse_context: Vec::new(),
        })
    }

    /// Create the fuses described by a configuration
    pub fn load_from_config(db: &FuseDatabase, config: &FuseConfig) -> Result<Self> {
        let mut fuses = Self::new(db, &config.family, &config.revision)?;
        fuses.load_config(config)?;
        Ok(fuses)
    }

    /// Set the operator used for hardware access
    ///
    /// The operator must drive the backend of the family.
    pub fn set_operator(&mut self, operator: Box<dyn FuseOperator>) -> Result<()> {
        if operator.kind() != self.backend {
            return Err(Error::Configuration(format!(
                "Invalid fuse operator type: {}, expected: {}",
                operator.kind(),
                self.backend
            )));
        }
        self.operator = Some(operator);
        Ok(())
    }

    /// Builder variant of [`Fuses::set_operator`]
    pub fn with_operator(mut self, operator: Box<dyn FuseOperator>) -> Result<Self> {
        self.set_operator(operator)?;
        Ok(self)
    }

    fn operator(&mut self) -> Result<&mut Box<dyn FuseOperator>> {
        self.operator
            .as_mut()
            .ok_or_else(|| Error::Configuration("Fuse operator is not defined".into()))
    }

    /// Device family
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Silicon revision as requested
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Backend of the family
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// The register map
    pub fn registers(&self) -> &FuseRegisters {
        &self.registers
    }

    /// The register map, mutable
    pub fn registers_mut(&mut self) -> &mut FuseRegisters {
        &mut self.registers
    }

    /// Registers touched by the latest operation, in order
    pub fn fuse_context(&self) -> Vec<&FuseRegister> {
        self.fuse_context
            .iter()
            .filter_map(|uid| self.registers.find_reg(uid, true).ok())
            .collect()
    }

    /// Apply a configuration without touching the hardware
    ///
    /// The configured registers become the fuse context. On error the
    /// register map is left unchanged.
    pub fn load_config(&mut self, config: &FuseConfig) -> Result<()> {
        if !config.family.eq_ignore_ascii_case(&self.family) {
            return Err(Error::Configuration(format!(
                "Configuration is for family {}, not {}",
                config.family, self.family
            )));
        }
        let mut registers = self.registers.clone();
        let loaded = registers.load_config(&config.registers)?;
        log::debug!("Loaded {} registers from configuration", loaded.len());
        self.registers = registers;
        self.fuse_context = loaded;
        Ok(())
    }

    /// Read every top-level register from the device
    ///
    /// Registers that cannot be read because of their access rights, a lock
    /// or a device error are skipped with a warning and left out of the
    /// fuse context.
    pub fn read_all(&mut self) -> Result<()> {
        let regs: Vec<(String, String)> = self
            .registers
            .iter()
            .map(|r| (r.uid().to_string(), r.name().to_string()))
            .collect();

        let mut context = Vec::new();
        for (uid, name) in regs {
            match self.read_single(&uid, true) {
                Ok(_) => context.push(uid),
                Err(e) if e.is_operation_failure() => {
                    log::warn!("Unable to read the fuse {}: {}", name, e);
                }
                Err(e) => return Err(e),
            }
        }
        self.fuse_context = context;
        Ok(())
    }

    /// Read one register from the device and return its raw bytes
    ///
    /// Group registers read all their members. With `check_locks` the lock
    /// fuse of the register is read first.
    pub fn read_single(&mut self, name: &str, check_locks: bool) -> Result<Vec<u8>> {
        let reg = self.registers.find_reg(name, true)?;
        let uid = reg.uid().to_string();

        if reg.has_group_registers() {
            ensure_readable(reg)?;
            let members: Vec<String> = reg.sub_regs().iter().map(|m| m.uid().to_string()).collect();
            if check_locks {
                self.check_lock(&uid, FuseLock::READ_LOCK, true)?;
            }
            for member in members {
                self.read_leaf(&member, true, true)?;
            }
        } else {
            self.read_leaf(&uid, check_locks, true)?;
        }

        let value = self.registers.find_reg(&uid, true)?.get_bytes_value(true);
        self.fuse_context = vec![uid];
        Ok(value)
    }

    /// Read one leaf register from the hardware
    ///
    /// With `cache` the value is stored in the register map and all locks
    /// are recomputed. Without it the stored values stay untouched and only
    /// the lock state of guarded registers is refreshed.
    fn read_leaf(&mut self, uid: &str, check_locks: bool, cache: bool) -> Result<u32> {
        let reg = self.registers.find_reg(uid, true)?;
        ensure_readable(reg)?;
        let index = reg.otp_index().ok_or_else(|| {
            Error::Configuration(format!("OTP index is not defined for fuse {}", reg.name()))
        })?;

        if check_locks {
            self.check_lock(uid, FuseLock::READ_LOCK, cache)?;
        }

        let value = self.operator()?.read_fuse(index)?;
        log::debug!("Read fuse {} (index {}): {:#010x}", uid, index, value);
        if cache {
            self.registers.find_reg_mut(uid, true)?.set_value(value, true)?;
            self.registers.update_locks();
        }
        Ok(value)
    }

    /// Read the lock fuse of a register and fail if `lock` is active
    fn check_lock(&mut self, uid: &str, lock: FuseLock, cache: bool) -> Result<()> {
        let reg = self.registers.find_reg(uid, true)?;
        let Some(lock_fuse) = self.registers.get_lock_fuse(reg) else {
            return Ok(());
        };
        let lock_uid = lock_fuse.uid().to_string();
        let lock_name = lock_fuse.name().to_string();

        log::debug!("Reading the value of lock register {} first", lock_name);
        // A fuse that locks itself is read without checking its own lock
        let value = self.read_leaf(&lock_uid, lock_uid != uid, cache)?;
        let active = if cache {
            self.registers.find_reg(uid, true)?.active_locks()
        } else {
            self.registers.apply_lock_fuse_value(uid, value)?
        };

        if active.contains(lock) {
            return Err(Error::LockViolation {
                fuse: self.registers.find_reg(uid, true)?.name().to_string(),
                lock_fuse: lock_name,
                lock,
            });
        }
        Ok(())
    }

    /// Write one register to the device
    ///
    /// Group registers write all their members in declaration order.
    pub fn write_single(&mut self, name: &str, lock: bool) -> Result<()> {
        let reg = self.registers.find_reg(name, true)?;
        let uid = reg.uid().to_string();
        let targets: Vec<String> = if reg.has_group_registers() {
            reg.sub_regs().iter().map(|m| m.uid().to_string()).collect()
        } else {
            vec![uid.clone()]
        };

        for target in &targets {
            self.write_leaf(target, lock)?;
        }
        self.fuse_context = vec![uid];
        Ok(())
    }

    fn write_leaf(&mut self, uid: &str, lock: bool) -> Result<()> {
        let reg = self.registers.find_reg(uid, true)?;
        let name = reg.name().to_string();
        let index = reg.otp_index().ok_or_else(|| {
            Error::Configuration(format!("OTP index for fuse {} is not set", name))
        })?;
        if !reg.access().is_writable() {
            return Err(Error::OperationFailure(format!(
                "Unable to write fuse {}. Fuse access: {}",
                name,
                reg.access().description()
            )));
        }
        let policy = reg.individual_write_lock();
        let reset = reg.reset_value();

        self.check_lock(uid, FuseLock::WRITE_LOCK, false)?;

        if policy == IndividualWriteLock::Always {
            let current = self.read_leaf(uid, true, false)?;
            if current != reset {
                return Err(Error::OperationFailure(format!(
                    "Fuse {} has non reset value {:#x} and is write-locked",
                    name, current
                )));
            }
        }

        let effective_lock = match policy {
            IndividualWriteLock::Implicit if lock => {
                log::warn!(
                    "The lock request for {} is ignored as the fuse will be implicitly locked after write",
                    name
                );
                false
            }
            IndividualWriteLock::Always if !lock => {
                log::info!(
                    "Enabling the lock flag for {} as the fuse has individual write lock set to 'always'",
                    name
                );
                true
            }
            _ => lock,
        };

        let value = self.registers.find_reg(uid, true)?.get_value(true)?;
        log::info!("Writing fuse {} (index {}): {:#010x}", name, index, value);
        self.operator()?.write_fuse(index, value, effective_lock)?;

        // Keep the local lock state in line with the device
        if effective_lock || policy == IndividualWriteLock::Implicit {
            self.registers
                .find_reg_mut(uid, true)?
                .lock(FuseLock::WRITE_LOCK);
        }
        Ok(())
    }

    /// Write several registers in order, without lock requests
    ///
    /// All written registers become the fuse context.
    pub fn write_multiple<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        let mut written = Vec::with_capacity(names.len());
        for name in names {
            let uid = self.registers.find_reg(name.as_ref(), true)?.uid().to_string();
            self.write_single(&uid, false)?;
            written.push(uid);
        }
        self.fuse_context = written;
        Ok(())
    }

    /// Programming script for the fuse context
    ///
    /// Group registers are expanded into their members.
    pub fn create_fuse_script(&self) -> Result<String> {
        let mut fuses = Vec::new();
        for uid in &self.fuse_context {
            let reg = self.registers.find_reg(uid, true)?;
            if reg.has_group_registers() {
                fuses.extend(reg.ordered_sub_regs());
            } else {
                fuses.push(reg);
            }
        }
        format_script(self.backend, &self.family, &self.revision, &fuses)
    }

    /// Export the register values as configuration
    ///
    /// With `diff` only registers differing from their reset value are
    /// included.
    pub fn get_config(&self, diff: bool) -> Result<FuseConfig> {
        let mut config = FuseConfig::new(&self.family, &self.revision);
        config.registers = self.registers.get_config(diff)?;
        log::debug!("The fuse configuration was created");
        Ok(config)
    }
}

impl core::fmt::Debug for Fuses {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Fuses")
            .field("family", &self.family)
            .field("revision", &self.revision)
            .field("backend", &self.backend)
            .field("operator", &self.operator.as_ref().map(|op| op.kind()))
            .field("fuse_context", &self.fuse_context)
            .finish()
    }
}
