//! List commands implementation

use rfuse_core::database::FuseDatabase;

/// List the devices compiled into this build
pub fn list_devices() {
    println!("Available devices:");
    println!();
    for device in rfuse_otp::available_devices() {
        match device {
            "dummy" => println!("  dummy     - In-memory OTP emulator for testing"),
            other => println!("  {}", other),
        }
    }
}

/// List all families of the fuse database
pub fn list_families(db: &FuseDatabase) {
    println!("Known device families:");
    println!();
    println!("{:<16} {:<8} {:<8} {:<20} {}", "Family", "Backend", "Latest", "Revisions", "Features");
    println!("{}", "-".repeat(72));

    for name in db.families() {
        let Ok(family) = db.get(name, "latest") else {
            continue;
        };
        let features: Vec<&str> = family.script_features().collect();
        println!(
            "{:<16} {:<8} {:<8} {:<20} {}",
            family.family(),
            family.tool(),
            family.latest_revision(),
            family.revisions().join(", "),
            features.join(", ")
        );
    }
}
