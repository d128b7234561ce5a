//! Shared fixtures for the rfuse-otp integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use rfuse_core::database::FuseDatabase;
use rfuse_core::operator::{render_operator_script, BackendKind, FuseOperator};
use rfuse_core::register::FuseRegister;
use rfuse_core::{Error, Result};

pub const LPC_FAMILY: &str = r#"
(
    family: "lpc55s3x",
    revisions: ["a0", "a1"],
    tool: blhost,
    registers: [
        (
            name: "LOCK_CFG",
            index: 0,
            description: "Lock bits",
            lock: (register: "LOCK_CFG", write_lock_mask: 0x1, read_lock_mask: 0x2),
        ),
        (name: "FUSE_A", index: 3, description: "Customer word"),
        (name: "FUSE_B", index: 4, write_lock: Always),
        (name: "FUSE_C", index: 5, write_lock: Implicit),
        (
            name: "BOOT_CFG",
            index: 6,
            description: "Boot configuration",
            lock: (register: "LOCK_CFG", write_lock_mask: 0x4, read_lock_mask: 0x8),
            bitfields: [
                (name: "BOOT_MODE", offset: 0, width: 2, enums: [(name: "SERIAL", value: 1)]),
                (name: "SEC_BOOT", offset: 4, width: 1, description: "Secure boot enable"),
            ],
        ),
        (
            name: "FUSE_RL",
            index: 7,
            write_lock: Always,
            lock: (register: "LOCK_CFG", read_lock_mask: 0x10),
        ),
        (name: "RO_WORD", index: 8, access: RO),
        (name: "KEY", description: "Customer key", sub_regs: [
            (name: "KEY0", index: 10),
            (name: "KEY1", index: 11),
        ]),
        (name: "KEY_REV", reverse_subregs_order: true, sub_regs: [
            (name: "KEY_REV0", index: 12),
            (name: "KEY_REV1", index: 13),
        ]),
    ],
    scripts: {
        "sb": {
            "fuses": (
                name: "Secure boot",
                fuses: [
                    ("FUSE_A", Attribute("customer_word")),
                    ("BOOT_CFG", Bitfields([("SEC_BOOT", Literal(1))])),
                ],
            ),
            "fuses_1": (
                name: "Key",
                no_verify: true,
                fuses: [("KEY", Attribute("key")), ("FUSE_C", Literal(0x42))],
            ),
        },
    },
)
"#;

pub fn database() -> FuseDatabase {
    let mut db = FuseDatabase::new();
    db.load_ron(LPC_FAMILY).unwrap();
    db
}

#[derive(Debug, Default)]
pub struct RecorderState {
    pub words: BTreeMap<u32, u32>,
    pub failing: BTreeSet<u32>,
    pub reads: Vec<u32>,
    pub writes: Vec<(u32, u32, bool)>,
}

/// Operator that records every call and keeps words in memory
///
/// Clones share their state.
#[derive(Debug, Clone)]
pub struct Recorder {
    kind: BackendKind,
    pub state: Rc<RefCell<RecorderState>>,
}

impl Recorder {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            state: Rc::new(RefCell::new(RecorderState::default())),
        }
    }

    pub fn set_word(&self, index: u32, value: u32) {
        self.state.borrow_mut().words.insert(index, value);
    }

    pub fn fail(&self, index: u32) {
        self.state.borrow_mut().failing.insert(index);
    }

    pub fn writes(&self) -> Vec<(u32, u32, bool)> {
        self.state.borrow().writes.clone()
    }

    pub fn reads(&self) -> Vec<u32> {
        self.state.borrow().reads.clone()
    }
}

impl FuseOperator for Recorder {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn read_fuse(&mut self, index: u32) -> Result<u32> {
        let mut state = self.state.borrow_mut();
        if state.failing.contains(&index) {
            return Err(Error::OperationFailure(format!("read of {} failed", index)));
        }
        state.reads.push(index);
        Ok(state.words.get(&index).copied().unwrap_or(0))
    }

    fn write_fuse(&mut self, index: u32, value: u32, lock: bool) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.failing.contains(&index) {
            return Err(Error::OperationFailure(format!("write of {} failed", index)));
        }
        *state.words.entry(index).or_insert(0) |= value;
        state.writes.push((index, value, lock));
        Ok(())
    }

    fn format_write_command(index: u32, value: u32, lock: bool, _verify: bool) -> String {
        format!("write {} {:#x}{}", index, value, if lock { " lock" } else { "" })
    }

    fn format_script(family: &str, revision: &str, fuses: &[&FuseRegister]) -> Result<String> {
        render_operator_script(BackendKind::Blhost, family, revision, fuses, |index, value| {
            Self::format_write_command(index, value, false, false)
        })
    }
}
