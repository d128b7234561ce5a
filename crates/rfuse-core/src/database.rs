//! Fuse database for runtime loading and lookup
//!
//! Every family is described by one RON file:
//!
//! ```ron
//! (
//!     family: "mimxrt1189",
//!     revisions: ["a0", "b0"],
//!     tool: nxpele,
//!     registers: [
//!         (name: "LOCK0", index: 0, lock: (register: "LOCK0", write_lock_mask: 0x1)),
//!         (
//!             name: "BOOT_CFG0",
//!             uid: "fuse1",
//!             index: 1,
//!             lock: (register: "LOCK0", write_lock_mask: 0x2, read_lock_mask: 0x4),
//!             bitfields: [
//!                 (name: "BOOT_MODE", offset: 0, width: 2, enums: [(name: "SERIAL", value: 1)]),
//!             ],
//!         ),
//!         (name: "SRK_HASH", sub_regs: [(name: "SRK0", index: 8), (name: "SRK1", index: 9)]),
//!     ],
//!     scripts: {
//!         "ahab": {
//!             "fuses": (name: "SRK", fuses: [("SRK_HASH", Attribute("srk_hash"))]),
//!         },
//!     },
//! )
//! ```
//!
//! Optional values do not need `Some(..)`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ron::extensions::Extensions;

use crate::error::{DatabaseError, Error, Result};
use crate::lock::{IndividualWriteLock, LockFuseRef};
use crate::operator::BackendKind;
use crate::register::{Access, Bitfield, FuseEnum, FuseRegister, FuseRegisters};
use crate::script::{FuseValueSpec, ScriptDefinition};

// ============================================================================
// RON deserialization types (intermediate format)
// ============================================================================

#[derive(Debug, Clone, serde::Deserialize)]
struct EnumDef {
    name: String,
    value: u32,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct BitfieldDef {
    name: String,
    offset: u32,
    width: u32,
    #[serde(default)]
    description: String,
    #[serde(default)]
    access: Access,
    #[serde(default)]
    enums: Vec<EnumDef>,
}

fn default_width() -> u32 {
    32
}

#[derive(Debug, Clone, serde::Deserialize)]
struct RegisterDef {
    name: String,
    #[serde(default)]
    uid: Option<String>,
    #[serde(default)]
    index: Option<u32>,
    #[serde(default = "default_width")]
    width: u32,
    #[serde(default)]
    description: String,
    #[serde(default)]
    access: Access,
    #[serde(default)]
    reset_value: u32,
    #[serde(default)]
    reverse: bool,
    #[serde(default)]
    write_lock: IndividualWriteLock,
    #[serde(default)]
    lock: Option<LockFuseRef>,
    #[serde(default)]
    bitfields: Vec<BitfieldDef>,
    #[serde(default)]
    sub_regs: Vec<RegisterDef>,
    #[serde(default)]
    reverse_subregs_order: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct FamilyDef {
    family: String,
    revisions: Vec<String>,
    #[serde(default)]
    latest: Option<String>,
    tool: BackendKind,
    registers: Vec<RegisterDef>,
    #[serde(default)]
    scripts: BTreeMap<String, BTreeMap<String, ScriptDefinition>>,
}

impl RegisterDef {
    /// Build the register, collecting `(uid, lock)` pairs on the way
    fn build(
        self,
        locks: &mut Vec<(String, LockFuseRef)>,
    ) -> core::result::Result<FuseRegister, DatabaseError> {
        let uid = self.uid.unwrap_or_else(|| self.name.clone());
        if let Some(lock) = self.lock {
            locks.push((uid.clone(), lock));
        }

        let reg = if self.sub_regs.is_empty() {
            let mut reg = FuseRegister::new(self.name, self.index, self.width);
            for bf in self.bitfields {
                let mut bitfield = Bitfield::new(bf.name, bf.offset, bf.width)
                    .with_description(bf.description)
                    .with_access(bf.access);
                for e in bf.enums {
                    bitfield = bitfield.with_enum(FuseEnum::new(e.name, e.value, e.description));
                }
                reg = reg.with_bitfield(bitfield);
            }
            reg.with_reset_value(self.reset_value)
                .with_reverse(self.reverse)
                .with_write_lock(self.write_lock)
        } else {
            if self.index.is_some() || !self.bitfields.is_empty() || self.reset_value != 0 {
                return Err(DatabaseError::Validation(format!(
                    "Group register {} must only define its members",
                    self.name
                )));
            }
            let members = self
                .sub_regs
                .into_iter()
                .map(|member| member.build(locks))
                .collect::<core::result::Result<Vec<_>, _>>()?;
            FuseRegister::group(self.name, members, self.reverse_subregs_order)
        };

        Ok(reg
            .with_uid(uid)
            .with_description(self.description)
            .with_access(self.access))
    }
}

// ============================================================================
// Fuse database
// ============================================================================

/// Fuse definitions of one device family
#[derive(Debug, Clone)]
pub struct FamilyDefinition {
    family: String,
    revisions: Vec<String>,
    latest: String,
    tool: BackendKind,
    registers: FuseRegisters,
    scripts: BTreeMap<String, BTreeMap<String, ScriptDefinition>>,
}

impl FamilyDefinition {
    fn from_def(def: FamilyDef) -> core::result::Result<Self, DatabaseError> {
        let invalid = |e: Error| DatabaseError::Validation(format!("{}: {}", def.family, e));

        if def.revisions.is_empty() {
            return Err(DatabaseError::Validation(format!(
                "{}: no revisions defined",
                def.family
            )));
        }
        let latest = match &def.latest {
            Some(latest) => latest.clone(),
            None => def.revisions[def.revisions.len() - 1].clone(),
        };
        if !def.revisions.iter().any(|r| r.eq_ignore_ascii_case(&latest)) {
            return Err(DatabaseError::Validation(format!(
                "{}: latest revision {} is not a known revision",
                def.family, latest
            )));
        }

        let mut locks = Vec::new();
        let regs = def
            .registers
            .into_iter()
            .map(|r| r.build(&mut locks))
            .collect::<core::result::Result<Vec<_>, _>>()?;
        let mut registers = FuseRegisters::new(regs).map_err(invalid)?;
        for (uid, lock) in locks {
            registers.set_lock_fuse(&uid, lock).map_err(invalid)?;
        }
        registers.check_lock_chains().map_err(invalid)?;
        registers.update_locks();

        for (feature, scripts) in &def.scripts {
            for (key, script) in scripts {
                validate_script(&registers, script).map_err(|e| {
                    DatabaseError::Validation(format!(
                        "{}: script {}.{}: {}",
                        def.family, feature, key, e
                    ))
                })?;
            }
        }

        Ok(Self {
            family: def.family,
            revisions: def.revisions,
            latest,
            tool: def.tool,
            registers,
            scripts: def.scripts,
        })
    }

    /// Family name
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Known silicon revisions
    pub fn revisions(&self) -> &[String] {
        &self.revisions
    }

    /// The revision `latest` resolves to
    pub fn latest_revision(&self) -> &str {
        &self.latest
    }

    /// Backend used to program this family
    pub fn tool(&self) -> BackendKind {
        self.tool
    }

    /// Resolve `latest` and check that the revision exists
    pub fn resolve_revision(&self, revision: &str) -> Result<&str> {
        if revision.eq_ignore_ascii_case("latest") {
            return Ok(&self.latest);
        }
        self.revisions
            .iter()
            .find(|r| r.eq_ignore_ascii_case(revision))
            .map(String::as_str)
            .ok_or_else(|| Error::NotFound {
                kind: "revision",
                name: format!("{} rev {}", self.family, revision),
            })
    }

    /// Fresh register map with reset values
    pub fn registers(&self) -> FuseRegisters {
        self.registers.clone()
    }

    /// Features that define scripts
    pub fn script_features(&self) -> impl Iterator<Item = &str> {
        self.scripts.keys().map(String::as_str)
    }

    /// Look up a script definition, `key` being `fuses` or `fuses_<n>`
    pub fn script(&self, feature: &str, key: &str) -> Result<&ScriptDefinition> {
        self.scripts
            .get(feature)
            .and_then(|scripts| scripts.get(key))
            .ok_or_else(|| Error::NotFound {
                kind: "script",
                name: format!("{}.{}", feature, key),
            })
    }
}

fn validate_script(registers: &FuseRegisters, script: &ScriptDefinition) -> Result<()> {
    for (name, value) in &script.fuses {
        let reg = registers.find_reg(name, true)?;
        if let FuseValueSpec::Bitfields(fields) = value {
            for (bitfield, _) in fields {
                reg.get_bitfield(bitfield)?;
            }
        }
    }
    Ok(())
}

/// Runtime fuse database
///
/// Holds the fuse definitions of all known families.
#[derive(Debug, Clone, Default)]
pub struct FuseDatabase {
    families: Vec<FamilyDefinition>,
}

impl FuseDatabase {
    /// Create an empty fuse database
    pub fn new() -> Self {
        Self {
            families: Vec::new(),
        }
    }

    /// Load a family definition from a single RON file
    pub fn load_file(&mut self, path: &Path) -> core::result::Result<usize, DatabaseError> {
        let content = fs::read_to_string(path)?;
        self.load_ron(&content)
    }

    /// Load a family definition from a RON string
    pub fn load_ron(&mut self, content: &str) -> core::result::Result<usize, DatabaseError> {
        let def: FamilyDef = ron::Options::default()
            .with_default_extension(Extensions::IMPLICIT_SOME)
            .from_str(content)?;

        if self.find(&def.family).is_some() {
            return Err(DatabaseError::Validation(format!(
                "Family {} is defined more than once",
                def.family
            )));
        }

        let family = FamilyDefinition::from_def(def)?;
        log::debug!(
            "Loaded fuse definitions of {} ({} registers, tool {})",
            family.family,
            family.registers.len(),
            family.tool
        );
        self.families.push(family);
        Ok(1)
    }

    /// Load all RON files from a directory
    pub fn load_dir(&mut self, dir: &Path) -> core::result::Result<usize, DatabaseError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "ron") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut total = 0;
        for path in paths {
            total += self.load_file(&path)?;
        }
        Ok(total)
    }

    /// Names of all families, sorted
    pub fn families(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.families.iter().map(|f| f.family.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Number of families in the database
    pub fn len(&self) -> usize {
        self.families.len()
    }

    /// Check if the database is empty
    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    fn find(&self, family: &str) -> Option<&FamilyDefinition> {
        self.families
            .iter()
            .find(|f| f.family.eq_ignore_ascii_case(family))
    }

    /// Look up a family, checking that the revision exists
    pub fn get(&self, family: &str, revision: &str) -> Result<&FamilyDefinition> {
        let def = self.find(family).ok_or_else(|| Error::NotFound {
            kind: "family",
            name: family.to_string(),
        })?;
        def.resolve_revision(revision)?;
        Ok(def)
    }
}
