//! Common types describing an attached managed runtime.

/// Target architecture reported by the attached runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    /// 32-bit x86
    X86,
    /// 64-bit x86-64
    X64,
}

impl Architecture {
    pub fn is_64bit(&self) -> bool {
        matches!(self, Architecture::X64)
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Architecture::X86 => write!(f, "x86"),
            Architecture::X64 => write!(f, "x64"),
        }
    }
}

/// One managed runtime instance found in the target process
#[derive(Debug, Clone)]
pub struct RuntimeInfo {
    /// Runtime version string
    pub version: String,
    /// Runtime flavor (e.g. "Core", "Desktop")
    pub flavor: String,
    /// Debug access component backing this runtime's introspection
    pub dac_file: String,
    /// Target architecture of the process
    pub architecture: Architecture,
}

/// A module loaded into the runtime's application domain
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    /// Assembly name, if the module has one (dynamic modules may not)
    pub assembly_name: Option<String>,
    /// Base address of the module image in the target process
    pub base_address: u64,
}

/// A type declared in a module
#[derive(Debug, Clone)]
pub struct TypeRecord {
    /// Full type name
    pub name: String,
    /// Address of the type's method table; keys method enumeration
    pub method_table: u64,
}

/// The JIT-generated native code range for a method.
///
/// Only the hot region is tracked. A region with `hot_size == 0` is not
/// usable and must be treated as absent, not as "method has no code".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeRegion {
    /// Start address of the hot region
    pub hot_start: u64,
    /// Size of the hot region in bytes
    pub hot_size: u64,
}

impl CodeRegion {
    pub fn is_usable(&self) -> bool {
        self.hot_size > 0
    }
}

/// Identity of a logical method.
///
/// A snapshot can expose two records for one source method (a placeholder
/// and the compiled instance); they are the same logical method iff both
/// the metadata token and the full signature match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodIdentity {
    pub metadata_token: u32,
    pub full_signature: String,
}

/// One method record as enumerated from the snapshot
#[derive(Debug, Clone)]
pub struct MethodRecord {
    /// Metadata token of the method definition
    pub metadata_token: u32,
    /// Full managed signature, e.g. `Script.Run(System.String)`
    pub full_signature: String,
    /// Method table of the declaring type, if known
    pub declaring_type: Option<u64>,
    /// Hot/cold region of the compiled code; may be empty
    pub hot_cold: CodeRegion,
}

impl MethodRecord {
    pub fn identity(&self) -> MethodIdentity {
        MethodIdentity {
            metadata_token: self.metadata_token,
            full_signature: self.full_signature.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_region_is_not_usable() {
        let region = CodeRegion { hot_start: 0x1000, hot_size: 0 };
        assert!(!region.is_usable());
        assert!(CodeRegion { hot_start: 0x1000, hot_size: 1 }.is_usable());
    }

    #[test]
    fn identity_requires_token_and_signature() {
        let a = MethodRecord {
            metadata_token: 0x0600_0001,
            full_signature: "Script.Run(System.String)".into(),
            declaring_type: None,
            hot_cold: CodeRegion::default(),
        };
        let mut b = a.clone();
        assert_eq!(a.identity(), b.identity());
        b.metadata_token = 0x0600_0002;
        assert_ne!(a.identity(), b.identity());
    }
}
