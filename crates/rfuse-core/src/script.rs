//! Feature script definitions
//!
//! A family may describe fuse programming scripts for its features (secure
//! boot keys, debug authentication, ...). Each definition lists fuses and
//! the value they receive, either literally or resolved from an attribute
//! source at generation time.

/// Value of one bitfield in a script definition
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub enum BitfieldValueSpec {
    /// Literal raw value
    Literal(u64),
    /// Name of an attribute resolved at generation time
    Attribute(String),
}

/// Value of one fuse in a script definition
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub enum FuseValueSpec {
    /// Literal raw value of the whole register
    Literal(u64),
    /// Values of individual bitfields, in order
    Bitfields(Vec<(String, BitfieldValueSpec)>),
    /// Name of an attribute resolved at generation time
    Attribute(String),
}

impl FuseValueSpec {
    /// Names of all attributes this value refers to
    pub fn attributes(&self) -> Vec<&str> {
        match self {
            FuseValueSpec::Literal(_) => Vec::new(),
            FuseValueSpec::Attribute(name) => vec![name.as_str()],
            FuseValueSpec::Bitfields(fields) => fields
                .iter()
                .filter_map(|(_, value)| match value {
                    BitfieldValueSpec::Attribute(name) => Some(name.as_str()),
                    BitfieldValueSpec::Literal(_) => None,
                })
                .collect(),
        }
    }
}

fn default_script_name() -> String {
    "Fuse Script".to_string()
}

/// One script definition of a family feature
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct ScriptDefinition {
    /// Human readable name used in the script header
    #[serde(default = "default_script_name")]
    pub name: String,
    /// Skip verification after write, needed for read protected fuses
    #[serde(default)]
    pub no_verify: bool,
    /// Fuses in programming order
    pub fuses: Vec<(String, FuseValueSpec)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_definition() {
        let ron = r#"
        (
            name: "SRK hash",
            no_verify: true,
            fuses: [
                ("SRKH", Attribute("srk_hash")),
                ("BOOT_CFG", Bitfields([("SEC_CONFIG", Literal(2)), ("KEY_REV", Attribute("key_rev"))])),
                ("LOCK", Literal(0x1)),
            ],
        )
        "#;
        let def: ScriptDefinition = ron::from_str(ron).unwrap();
        assert_eq!(def.name, "SRK hash");
        assert!(def.no_verify);
        assert_eq!(def.fuses.len(), 3);
        assert_eq!(def.fuses[0].1.attributes(), vec!["srk_hash"]);
        assert_eq!(def.fuses[1].1.attributes(), vec!["key_rev"]);
        assert!(def.fuses[2].1.attributes().is_empty());
    }

    #[test]
    fn test_defaults() {
        let def: ScriptDefinition = ron::from_str("(fuses: [])").unwrap();
        assert_eq!(def.name, "Fuse Script");
        assert!(!def.no_verify);
    }
}
