//! Collection of fuse registers with lock fuse relations

use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::FuseRegister;
use crate::error::{Error, Result};
use crate::lock::{FuseLock, LockFuseRef};

/// The fuse register map of one device family
///
/// Top-level registers are kept in declaration order. Group members are
/// owned by their group and are only reachable through lookups with
/// `include_group_members` set.
#[derive(Debug, Clone, Default)]
pub struct FuseRegisters {
    registers: Vec<FuseRegister>,
    /// uid of the guarded register -> its lock fuse reference (by uid)
    lock_fuses: BTreeMap<String, LockFuseRef>,
}

fn matches(reg: &FuseRegister, name: &str) -> bool {
    reg.name().eq_ignore_ascii_case(name) || reg.uid().eq_ignore_ascii_case(name)
}

impl FuseRegisters {
    /// Build a register map, validating every register
    ///
    /// Names and uids must be unique, and no two leaf registers may share an
    /// OTP index.
    pub fn new(mut registers: Vec<FuseRegister>) -> Result<Self> {
        for reg in &mut registers {
            reg.validate()?;
        }

        let mut keys = HashSet::new();
        let mut indexes = HashSet::new();
        let all = registers
            .iter()
            .flat_map(|r| core::iter::once(r).chain(r.sub_regs().iter()));
        for reg in all {
            let own: BTreeSet<String> = [reg.name(), reg.uid()]
                .iter()
                .map(|k| k.to_ascii_lowercase())
                .collect();
            for key in own {
                if !keys.insert(key) {
                    return Err(Error::Configuration(format!(
                        "Duplicate register name or uid in {} ({})",
                        reg.name(),
                        reg.uid()
                    )));
                }
            }
            if let Some(index) = reg.otp_index() {
                if !indexes.insert(index) {
                    return Err(Error::Configuration(format!(
                        "Duplicate OTP index {} (register {})",
                        index,
                        reg.name()
                    )));
                }
            }
        }

        Ok(Self {
            registers,
            lock_fuses: BTreeMap::new(),
        })
    }

    /// Designate the lock fuse of a register
    ///
    /// The lock fuse must be a leaf register. A register may be its own
    /// lock fuse.
    pub fn set_lock_fuse(&mut self, register: &str, lock: LockFuseRef) -> Result<()> {
        let uid = self.find_reg(register, true)?.uid().to_string();
        let lock_reg = self.find_reg(&lock.register, true)?;
        if lock_reg.has_group_registers() {
            return Err(Error::Configuration(format!(
                "Lock fuse {} of {} must not be a group register",
                lock_reg.name(),
                register
            )));
        }
        let lock = LockFuseRef {
            register: lock_reg.uid().to_string(),
            ..lock
        };
        self.lock_fuses.insert(uid, lock);
        Ok(())
    }

    /// Reject lock fuse chains that loop back without a self lock
    ///
    /// Reading a lock fuse checks its own lock fuse first, so a chain such
    /// as `A -> B -> A` could never be resolved.
    pub fn check_lock_chains(&self) -> Result<()> {
        for start in self.lock_fuses.keys() {
            let mut seen = HashSet::new();
            let mut current = start.as_str();
            while let Some(lock) = self.lock_fuses.get(current) {
                if lock.register == current {
                    break;
                }
                if !seen.insert(current) {
                    return Err(Error::Configuration(format!(
                        "Lock fuse chain of {} forms a cycle through {}",
                        start, current
                    )));
                }
                current = lock.register.as_str();
            }
        }
        Ok(())
    }

    /// Number of top-level registers
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    /// Check if there are no registers
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Iterate over top-level registers in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &FuseRegister> {
        self.registers.iter()
    }

    /// Iterate over top-level registers and group members
    pub fn iter_all(&self) -> impl Iterator<Item = &FuseRegister> {
        self.registers
            .iter()
            .flat_map(|r| core::iter::once(r).chain(r.sub_regs().iter()))
    }

    /// Find a register by name or uid (case-insensitive)
    pub fn find_reg(&self, name: &str, include_group_members: bool) -> Result<&FuseRegister> {
        if let Some(reg) = self.registers.iter().find(|r| matches(r, name)) {
            return Ok(reg);
        }
        if include_group_members {
            if let Some(reg) = self
                .registers
                .iter()
                .flat_map(|r| r.sub_regs().iter())
                .find(|r| matches(r, name))
            {
                return Ok(reg);
            }
        }
        Err(Error::register_not_found(name))
    }

    /// Find a register by name or uid, mutable
    pub fn find_reg_mut(
        &mut self,
        name: &str,
        include_group_members: bool,
    ) -> Result<&mut FuseRegister> {
        let top = self.registers.iter().position(|r| matches(r, name));
        if let Some(pos) = top {
            return Ok(&mut self.registers[pos]);
        }
        if include_group_members {
            for reg in &mut self.registers {
                if let Some(member) = reg.sub_regs_mut().iter_mut().find(|r| matches(r, name)) {
                    return Ok(member);
                }
            }
        }
        Err(Error::register_not_found(name))
    }

    /// Lock fuse reference of a register, if it has one
    pub fn lock_fuse_ref(&self, reg: &FuseRegister) -> Option<&LockFuseRef> {
        self.lock_fuses.get(reg.uid())
    }

    /// The register whose value holds the locks of `reg`
    pub fn get_lock_fuse(&self, reg: &FuseRegister) -> Option<&FuseRegister> {
        let lock = self.lock_fuse_ref(reg)?;
        self.find_reg(&lock.register, true).ok()
    }

    /// Recompute the lock state of every guarded register
    ///
    /// Must be called after any value change that may concern a lock fuse.
    pub fn update_locks(&mut self) {
        let updates: Vec<_> = self
            .lock_fuses
            .iter()
            .filter_map(|(uid, lock)| {
                let value = self
                    .find_reg(&lock.register, true)
                    .ok()?
                    .get_value(true)
                    .ok()?;
                Some((uid.clone(), lock.decode(value)))
            })
            .collect();

        for (uid, locks) in updates {
            if let Ok(reg) = self.find_reg_mut(&uid, true) {
                if reg.active_locks() != locks {
                    log::debug!("Locks of {} derived from lock fuse: {}", reg.name(), locks);
                }
                reg.set_fuse_locks(locks);
            }
        }
    }

    /// Derive the locks of one register from a lock fuse value
    ///
    /// For lock fuse values read from hardware without being stored in the
    /// map. Returns the locks now active on the register.
    pub fn apply_lock_fuse_value(&mut self, name: &str, lock_fuse_value: u32) -> Result<FuseLock> {
        let uid = self.find_reg(name, true)?.uid().to_string();
        let locks = self.lock_fuses.get(&uid).map(|lock| lock.decode(lock_fuse_value));
        let reg = self.find_reg_mut(&uid, true)?;
        if let Some(locks) = locks {
            reg.set_fuse_locks(locks);
        }
        Ok(reg.active_locks())
    }

    /// Restore every register to its reset value
    pub fn reset(&mut self) {
        for reg in &mut self.registers {
            reg.reset();
        }
        self.update_locks();
    }
}

impl<'a> IntoIterator for &'a FuseRegisters {
    type Item = &'a FuseRegister;
    type IntoIter = core::slice::Iter<'a, FuseRegister>;

    fn into_iter(self) -> Self::IntoIter {
        self.registers.iter()
    }
}
