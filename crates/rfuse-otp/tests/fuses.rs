//! Lock-aware reads and writes through a recording operator

mod common;

use common::{database, Recorder};
use rfuse_core::config::FuseConfig;
use rfuse_core::lock::FuseLock;
use rfuse_core::operator::BackendKind;
use rfuse_core::Error;
use rfuse_otp::Fuses;

fn fuses_with_recorder() -> (Fuses, Recorder) {
    let db = database();
    let recorder = Recorder::new(BackendKind::Blhost);
    let mut fuses = Fuses::new(&db, "lpc55s3x", "latest").unwrap();
    fuses.set_operator(Box::new(recorder.clone())).unwrap();
    (fuses, recorder)
}

fn set_raw(fuses: &mut Fuses, name: &str, value: u32) {
    fuses
        .registers_mut()
        .find_reg_mut(name, true)
        .unwrap()
        .set_value(value, true)
        .unwrap();
}

fn active_locks(fuses: &Fuses, name: &str) -> FuseLock {
    fuses.registers().find_reg(name, true).unwrap().active_locks()
}

#[test]
fn test_write_with_lock() {
    let (mut fuses, recorder) = fuses_with_recorder();
    set_raw(&mut fuses, "FUSE_A", 0xDEADBEEF);

    fuses.write_single("FUSE_A", true).unwrap();

    assert_eq!(recorder.writes(), vec![(3, 0xDEADBEEF, true)]);
    assert_eq!(active_locks(&fuses, "FUSE_A"), FuseLock::WRITE_LOCK);
    let context: Vec<&str> = fuses.fuse_context().iter().map(|r| r.name()).collect();
    assert_eq!(context, vec!["FUSE_A"]);
}

#[test]
fn test_write_without_lock() {
    let (mut fuses, recorder) = fuses_with_recorder();
    set_raw(&mut fuses, "FUSE_A", 0x1);

    fuses.write_single("FUSE_A", false).unwrap();

    assert_eq!(recorder.writes(), vec![(3, 0x1, false)]);
    assert!(active_locks(&fuses, "FUSE_A").is_empty());
}

#[test]
fn test_always_policy_locks_and_blocks_second_write() {
    let (mut fuses, recorder) = fuses_with_recorder();
    set_raw(&mut fuses, "FUSE_B", 0x5);

    fuses.write_single("FUSE_B", false).unwrap();
    assert_eq!(recorder.writes(), vec![(4, 0x5, true)]);
    assert!(active_locks(&fuses, "FUSE_B").contains(FuseLock::WRITE_LOCK));

    for lock in [false, true] {
        let err = fuses.write_single("FUSE_B", lock).unwrap_err();
        assert!(matches!(err, Error::OperationFailure(_)), "{:?}", err);
    }
    assert_eq!(recorder.writes().len(), 1);
}

#[test]
fn test_always_policy_requires_reset_value() {
    let (mut fuses, recorder) = fuses_with_recorder();
    recorder.set_word(4, 0x100);
    set_raw(&mut fuses, "FUSE_B", 0x5);

    let err = fuses.write_single("FUSE_B", true).unwrap_err();
    assert!(err.to_string().contains("non reset value 0x100"), "{}", err);
    assert!(recorder.writes().is_empty());
    // The pending value survives the failed write
    assert_eq!(
        fuses.registers().find_reg("FUSE_B", false).unwrap().get_value(true).unwrap(),
        0x5
    );
}

#[test]
fn test_implicit_policy_ignores_lock_request() {
    let (mut fuses, recorder) = fuses_with_recorder();
    set_raw(&mut fuses, "FUSE_C", 0x42);

    fuses.write_single("FUSE_C", true).unwrap();

    assert_eq!(recorder.writes(), vec![(5, 0x42, false)]);
    assert!(active_locks(&fuses, "FUSE_C").contains(FuseLock::WRITE_LOCK));
}

#[test]
fn test_implicit_policy_locks_without_request() {
    let (mut fuses, recorder) = fuses_with_recorder();
    set_raw(&mut fuses, "FUSE_C", 0x1);

    fuses.write_single("FUSE_C", false).unwrap();

    assert_eq!(recorder.writes(), vec![(5, 0x1, false)]);
    assert_eq!(active_locks(&fuses, "FUSE_C"), FuseLock::WRITE_LOCK);
}

#[test]
fn test_write_blocked_by_lock_fuse() {
    let (mut fuses, recorder) = fuses_with_recorder();
    recorder.set_word(0, 0x4);
    set_raw(&mut fuses, "BOOT_CFG", 0x11);

    let err = fuses.write_single("BOOT_CFG", false).unwrap_err();
    match &err {
        Error::LockViolation { fuse, lock_fuse, lock } => {
            assert_eq!(fuse, "BOOT_CFG");
            assert_eq!(lock_fuse, "LOCK_CFG");
            assert_eq!(*lock, FuseLock::WRITE_LOCK);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(err.is_operation_failure());
    assert!(recorder.writes().is_empty());

    // Lock fuse reads on the write path do not replace pending values
    let regs = fuses.registers();
    assert_eq!(regs.find_reg("BOOT_CFG", false).unwrap().get_value(true).unwrap(), 0x11);
    assert_eq!(regs.find_reg("LOCK_CFG", false).unwrap().get_value(true).unwrap(), 0);
}

#[test]
fn test_write_reads_lock_fuse_first() {
    let (mut fuses, recorder) = fuses_with_recorder();
    set_raw(&mut fuses, "BOOT_CFG", 0x1);

    fuses.write_single("BOOT_CFG", false).unwrap();

    let reads = recorder.reads();
    assert!(!reads.is_empty());
    assert!(reads.iter().all(|&index| index == 0));
    assert_eq!(recorder.writes(), vec![(6, 0x1, false)]);
}

#[test]
fn test_write_self_locking_fuse() {
    let (mut fuses, recorder) = fuses_with_recorder();
    set_raw(&mut fuses, "LOCK_CFG", 0x4);

    fuses.write_single("LOCK_CFG", false).unwrap();

    // The lock fuse is its own lock register and is read once
    assert_eq!(recorder.reads(), vec![0]);
    assert_eq!(recorder.writes(), vec![(0, 0x4, false)]);
}

#[test]
fn test_write_self_locking_fuse_locked() {
    let (mut fuses, recorder) = fuses_with_recorder();
    recorder.set_word(0, 0x1);
    set_raw(&mut fuses, "LOCK_CFG", 0x4);

    let err = fuses.write_single("LOCK_CFG", false).unwrap_err();
    match &err {
        Error::LockViolation { fuse, lock_fuse, lock } => {
            assert_eq!(fuse, "LOCK_CFG");
            assert_eq!(lock_fuse, "LOCK_CFG");
            assert_eq!(*lock, FuseLock::WRITE_LOCK);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(recorder.reads(), vec![0]);
    assert!(recorder.writes().is_empty());
}

#[test]
fn test_always_with_read_lock_fails_on_pre_write_read() {
    let (mut fuses, recorder) = fuses_with_recorder();
    recorder.set_word(0, 0x10);
    set_raw(&mut fuses, "FUSE_RL", 0x3);

    let err = fuses.write_single("FUSE_RL", false).unwrap_err();
    assert!(
        matches!(err, Error::LockViolation { lock, .. } if lock == FuseLock::READ_LOCK),
        "{:?}",
        err
    );
    assert!(recorder.writes().is_empty());
}

#[test]
fn test_write_read_only_register() {
    let (mut fuses, recorder) = fuses_with_recorder();

    let err = fuses.write_single("RO_WORD", false).unwrap_err();
    assert!(err.to_string().contains("Unable to write fuse RO_WORD"));
    assert!(recorder.writes().is_empty());
}

#[test]
fn test_group_write_order() {
    let (mut fuses, recorder) = fuses_with_recorder();
    fuses
        .registers_mut()
        .find_reg_mut("KEY_REV", false)
        .unwrap()
        .set_bytes_value(&[0, 0, 0, 1, 0, 0, 0, 2], true)
        .unwrap();

    fuses.write_single("KEY_REV", false).unwrap();

    // Members are written in declaration order
    assert_eq!(recorder.writes(), vec![(12, 0x2, false), (13, 0x1, false)]);
    let context: Vec<&str> = fuses.fuse_context().iter().map(|r| r.name()).collect();
    assert_eq!(context, vec!["KEY_REV"]);
}

#[test]
fn test_group_read_composite() {
    let (mut fuses, recorder) = fuses_with_recorder();
    recorder.set_word(10, 0x1122_3344);
    recorder.set_word(11, 0x5566_7788);
    recorder.set_word(12, 0x1122_3344);
    recorder.set_word(13, 0x5566_7788);

    assert_eq!(
        fuses.read_single("KEY", true).unwrap(),
        vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]
    );
    assert_eq!(
        fuses.read_single("KEY_REV", true).unwrap(),
        vec![0x55, 0x66, 0x77, 0x88, 0x11, 0x22, 0x33, 0x44]
    );
}

#[test]
fn test_self_locking_read() {
    let (mut fuses, recorder) = fuses_with_recorder();
    recorder.set_word(0, 0x1);

    assert_eq!(fuses.read_single("LOCK_CFG", true).unwrap(), vec![0, 0, 0, 1]);
    assert_eq!(active_locks(&fuses, "LOCK_CFG"), FuseLock::WRITE_LOCK);
    // Guarded registers follow the cached lock fuse value
    assert!(active_locks(&fuses, "BOOT_CFG").is_empty());
}

#[test]
fn test_self_locking_read_locked() {
    let (mut fuses, recorder) = fuses_with_recorder();
    recorder.set_word(0, 0x2);

    let err = fuses.read_single("LOCK_CFG", true).unwrap_err();
    assert!(
        matches!(err, Error::LockViolation { lock, ref lock_fuse, .. }
            if lock == FuseLock::READ_LOCK && lock_fuse == "LOCK_CFG"),
        "{:?}",
        err
    );
}

#[test]
fn test_read_locks_follow_lock_fuse() {
    let (mut fuses, recorder) = fuses_with_recorder();
    recorder.set_word(0, 0x8);
    recorder.set_word(6, 0x11);

    assert!(matches!(
        fuses.read_single("BOOT_CFG", true),
        Err(Error::LockViolation { lock, .. }) if lock == FuseLock::READ_LOCK
    ));
    // Without lock checks the word is read anyway
    assert_eq!(fuses.read_single("BOOT_CFG", false).unwrap(), vec![0, 0, 0, 0x11]);
}

#[test]
fn test_read_all_skips_failing_register() {
    let (mut fuses, recorder) = fuses_with_recorder();
    recorder.fail(3);
    recorder.set_word(5, 0x77);

    fuses.read_all().unwrap();

    let total = fuses.registers().len();
    let context: Vec<&str> = fuses.fuse_context().iter().map(|r| r.name()).collect();
    assert_eq!(context.len(), total - 1);
    assert!(!context.contains(&"FUSE_A"));
    assert_eq!(
        fuses.registers().find_reg("FUSE_C", false).unwrap().get_value(true).unwrap(),
        0x77
    );
}

#[test]
fn test_read_all_skips_locked_register() {
    let (mut fuses, recorder) = fuses_with_recorder();
    recorder.set_word(0, 0x8);

    fuses.read_all().unwrap();

    let context: Vec<&str> = fuses.fuse_context().iter().map(|r| r.name()).collect();
    assert!(!context.contains(&"BOOT_CFG"));
    assert!(context.contains(&"LOCK_CFG"));
}

#[test]
fn test_operator_required() {
    let db = database();
    let mut fuses = Fuses::new(&db, "lpc55s3x", "a0").unwrap();
    let err = fuses.read_single("FUSE_A", true).unwrap_err();
    assert!(err.is_configuration_error());
    assert_eq!(fuses.revision(), "a0");
}

#[test]
fn test_operator_kind_mismatch() {
    let db = database();
    let mut fuses = Fuses::new(&db, "lpc55s3x", "latest").unwrap();
    let err = fuses
        .set_operator(Box::new(Recorder::new(BackendKind::Nxpele)))
        .unwrap_err();
    assert!(err.to_string().contains("Invalid fuse operator type: nxpele"));
}

#[test]
fn test_load_write_and_script() {
    let db = database();
    let config = FuseConfig::from_toml_str(
        r#"
family = "lpc55s3x"

[registers]
FUSE_A = 0x12345678
KEY = "0x0000000100000002"
BOOT_CFG = { BOOT_MODE = "SERIAL", SEC_BOOT = 1 }
"#,
    )
    .unwrap();
    let recorder = Recorder::new(BackendKind::Blhost);
    let mut fuses = Fuses::load_from_config(&db, &config)
        .unwrap()
        .with_operator(Box::new(recorder.clone()))
        .unwrap();

    let names: Vec<String> = fuses.fuse_context().iter().map(|r| r.uid().to_string()).collect();
    assert_eq!(names, vec!["FUSE_A", "KEY", "BOOT_CFG"]);

    fuses.write_multiple(&names).unwrap();
    assert_eq!(
        recorder.writes(),
        vec![(3, 0x1234_5678, false), (10, 0x1, false), (11, 0x2, false), (6, 0x11, false)]
    );

    let script = fuses.create_fuse_script().unwrap();
    assert!(script.starts_with("# BLHOST fuses programming script\n"));
    assert!(script.contains("# Chip: lpc55s3x rev:latest\n"));
    assert!(script.contains("# Fuse FUSE_A, index 3 and value: 0x12345678.\nefuse-program-once 3 0x12345678 --no-verify\n"));
    assert!(script.contains("# Fuse KEY0, index 10 and value: 0x00000001.\n"));
    assert!(script.contains("efuse-program-once 11 0x2 --no-verify\n"));
    assert!(script.find("index 10").unwrap() < script.find("index 11").unwrap());
}

#[test]
fn test_load_config_family_mismatch() {
    let db = database();
    let mut fuses = Fuses::new(&db, "lpc55s3x", "latest").unwrap();
    let config = FuseConfig::from_toml_str("family = \"mimxrt1189\"\n[registers]\nFUSE_A = 1\n").unwrap();
    assert!(fuses.load_config(&config).unwrap_err().is_configuration_error());
    assert!(fuses.fuse_context().is_empty());
}

#[test]
fn test_failed_load_leaves_registers_untouched() {
    let db = database();
    let mut fuses = Fuses::new(&db, "lpc55s3x", "latest").unwrap();
    let config = FuseConfig::from_toml_str(
        "family = \"lpc55s3x\"\n[registers]\nFUSE_A = 7\nNOPE = 1\n",
    )
    .unwrap();

    assert!(fuses.load_config(&config).is_err());
    assert_eq!(
        fuses.registers().find_reg("FUSE_A", false).unwrap().get_value(true).unwrap(),
        0
    );
}

#[test]
fn test_config_round_trip() {
    let db = database();
    let config = FuseConfig::from_toml_str(
        r#"
family = "lpc55s3x"
revision = "a1"

[registers]
FUSE_A = 0xCAFE
BOOT_CFG = { BOOT_MODE = 2, SEC_BOOT = 1 }
KEY = "0x00000000000000ff"
"#,
    )
    .unwrap();
    let fuses = Fuses::load_from_config(&db, &config).unwrap();

    let exported = fuses.get_config(true).unwrap();
    assert_eq!(exported.family, "lpc55s3x");
    assert_eq!(exported.revision, "a1");
    let names: Vec<&str> = exported.registers.keys().collect();
    assert_eq!(names, vec!["FUSE_A", "BOOT_CFG", "KEY"]);

    let reloaded = Fuses::load_from_config(&db, &exported).unwrap();
    assert_eq!(reloaded.get_config(false).unwrap(), fuses.get_config(false).unwrap());

    let full = fuses.get_config(false).unwrap();
    assert_eq!(full.registers.len(), fuses.registers().len());
}
