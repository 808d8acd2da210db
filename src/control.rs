// src/control.rs

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::errors::{RegistryControlError, ServiceControlError};

/// A service's configured startup policy, as a closed enumeration.
///
/// The textual tokens are the ones used in the persisted state file; anything
/// outside this set is rejected at the parsing boundary rather than passed
/// through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum StartMode {
    #[strum(serialize = "AUTO_START")]
    AutoStart,
    #[strum(serialize = "DEMAND_START")]
    DemandStart,
    #[strum(serialize = "DISABLED")]
    Disabled,
    #[strum(serialize = "BOOT_START")]
    BootStart,
    #[strum(serialize = "SYSTEM_START")]
    SystemStart,
}

impl StartMode {
    /// Only these modes may be written back to a service. Boot and system
    /// drivers are never reconfigured by this tool.
    pub fn is_restorable(self) -> bool {
        matches!(
            self,
            StartMode::AutoStart | StartMode::DemandStart | StartMode::Disabled
        )
    }
}

/// A typed value to be written to the registry.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RegistryKeyValue {
    Dword(u32),
    String(String),
}

impl RegistryKeyValue {
    pub fn type_token(&self) -> &'static str {
        match self {
            RegistryKeyValue::Dword(_) => "REG_DWORD",
            RegistryKeyValue::String(_) => "REG_SZ",
        }
    }

    pub fn to_snapshot(&self) -> RegistryValueSnapshot {
        match self {
            RegistryKeyValue::Dword(v) => RegistryValueSnapshot {
                value_type: "REG_DWORD".to_string(),
                raw: format!("0x{:x}", v),
            },
            RegistryKeyValue::String(s) => RegistryValueSnapshot {
                value_type: "REG_SZ".to_string(),
                raw: s.clone(),
            },
        }
    }
}

impl fmt::Display for RegistryKeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryKeyValue::Dword(v) => write!(f, "Dword({})", v),
            RegistryKeyValue::String(s) => write!(f, "String({})", s),
        }
    }
}

/// A registry value exactly as observed on the system: its type token and the
/// raw textual rendering of its data. DWORD data renders in hex (`0x1`), the
/// same way `reg query` prints it.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct RegistryValueSnapshot {
    #[serde(rename = "type")]
    pub value_type: String,
    pub raw: String,
}

impl RegistryValueSnapshot {
    pub fn is_dword(&self) -> bool {
        self.value_type.eq_ignore_ascii_case("REG_DWORD")
    }

    /// Numeric reading of the raw text, accepting both `0x1` and `1`.
    pub fn as_dword(&self) -> Option<u32> {
        parse_dword_text(&self.raw)
    }

    /// Type-aware comparison against a desired value: DWORDs compare as
    /// integers regardless of hex/decimal rendering, everything else as exact
    /// strings.
    pub fn matches_desired(&self, desired: &RegistryKeyValue) -> bool {
        match desired {
            RegistryKeyValue::Dword(want) => {
                self.is_dword() && self.as_dword() == Some(*want)
            }
            RegistryKeyValue::String(want) => {
                !self.is_dword() && self.raw == *want
            }
        }
    }

    /// Type-aware comparison against another snapshot, used when deciding
    /// whether a captured original still matches the live value. DWORDs
    /// compare numerically; other types require matching type tokens
    /// (case-insensitive) and identical raw data.
    pub fn same_value(&self, other: &RegistryValueSnapshot) -> bool {
        if self.is_dword() && other.is_dword() {
            match (self.as_dword(), other.as_dword()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        } else {
            self.value_type.eq_ignore_ascii_case(&other.value_type) && self.raw == other.raw
        }
    }

    /// Converts the snapshot back into a writable value. `None` when the
    /// snapshot claims to be a DWORD but its raw text is not a number.
    pub fn to_value(&self) -> Option<RegistryKeyValue> {
        if self.is_dword() {
            self.as_dword().map(RegistryKeyValue::Dword)
        } else {
            Some(RegistryKeyValue::String(self.raw.clone()))
        }
    }
}

fn parse_dword_text(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        raw.parse::<u32>().ok()
    }
}

/// Read and write access to service start configuration.
///
/// `query_start_mode` returns `Ok(None)` for a service that does not exist on
/// the machine; an `Err` means the query itself failed. `stop` is invoked
/// best-effort before disabling a service and its failure is swallowed by
/// callers.
pub trait ServiceControl {
    fn query_start_mode(&self, service: &str) -> Result<Option<StartMode>, ServiceControlError>;

    fn set_start_mode(&self, service: &str, mode: StartMode) -> Result<(), ServiceControlError>;

    fn stop(&self, service: &str) -> Result<(), ServiceControlError>;
}

/// Read and write access to named registry values.
///
/// `query_value` returns `Ok(None)` for a value that does not exist (not an
/// error). `delete_value` succeeds when the value is already gone.
pub trait RegistryControl {
    fn query_value(
        &self,
        path: &str,
        name: &str,
    ) -> Result<Option<RegistryValueSnapshot>, RegistryControlError>;

    fn set_value(
        &self,
        path: &str,
        name: &str,
        value: &RegistryKeyValue,
    ) -> Result<(), RegistryControlError>;

    fn delete_value(&self, path: &str, name: &str) -> Result<(), RegistryControlError>;
}
