// src/utils/registry.rs

use winreg::{
    enums::{
        RegType::{REG_DWORD, REG_SZ},
        HKEY_CLASSES_ROOT, HKEY_CURRENT_CONFIG, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS,
        KEY_READ, KEY_WRITE,
    },
    RegKey, RegValue,
};

use crate::{
    control::{RegistryControl, RegistryKeyValue, RegistryValueSnapshot},
    errors::RegistryControlError,
};

/// Registry collaborator backed by the live Windows registry via `winreg`.
pub struct WindowsRegistry;

/// Parses a full registry path into hive and subkey path. Accepts both the
/// long hive names and the common short aliases (HKLM, HKCU, ...).
pub fn parse_registry_path(path: &str) -> Result<(RegKey, String), RegistryControlError> {
    let components: Vec<&str> = path.split('\\').collect();
    if components.len() < 2 {
        return Err(RegistryControlError::InvalidKeyFormat(path.to_string()));
    }
    let hive = match components[0].to_uppercase().as_str() {
        "HKEY_LOCAL_MACHINE" | "HKLM" => HKEY_LOCAL_MACHINE,
        "HKEY_CURRENT_USER" | "HKCU" => HKEY_CURRENT_USER,
        "HKEY_CLASSES_ROOT" | "HKCR" => HKEY_CLASSES_ROOT,
        "HKEY_USERS" | "HKU" => HKEY_USERS,
        "HKEY_CURRENT_CONFIG" | "HKCC" => HKEY_CURRENT_CONFIG,
        other => return Err(RegistryControlError::UnsupportedHive(other.to_string())),
    };
    let subkey = components[1..].join("\\");
    Ok((RegKey::predef(hive), subkey))
}

fn decode_value(name: &str, value: &RegValue) -> Result<RegistryValueSnapshot, RegistryControlError> {
    match value.vtype {
        REG_DWORD => {
            if value.bytes.len() < 4 {
                return Err(RegistryControlError::ReadValueError(format!(
                    "REG_DWORD data too small for value '{}'",
                    name
                )));
            }
            let dword = u32::from_le_bytes([
                value.bytes[0],
                value.bytes[1],
                value.bytes[2],
                value.bytes[3],
            ]);
            Ok(RegistryKeyValue::Dword(dword).to_snapshot())
        }
        REG_SZ => {
            let utf16: Vec<u16> = value
                .bytes
                .chunks_exact(2)
                .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
                .collect();
            let text = String::from_utf16_lossy(&utf16)
                .trim_end_matches('\u{0}')
                .to_string();
            Ok(RegistryValueSnapshot {
                value_type: "REG_SZ".to_string(),
                raw: text,
            })
        }
        other => Err(RegistryControlError::ReadValueError(format!(
            "Unsupported registry value type {:?} for value '{}'",
            other, name
        ))),
    }
}

impl RegistryControl for WindowsRegistry {
    fn query_value(
        &self,
        path: &str,
        name: &str,
    ) -> Result<Option<RegistryValueSnapshot>, RegistryControlError> {
        let (hive, subkey_path) = parse_registry_path(path)?;

        let subkey = match hive.open_subkey_with_flags(&subkey_path, KEY_READ) {
            Ok(subkey) => subkey,
            // A missing key means the value is absent, which is a valid
            // state rather than an error.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RegistryControlError::KeyOpenError(format!(
                    "'{}': {}",
                    subkey_path, e
                )))
            }
        };

        match subkey.get_raw_value(name) {
            Ok(value) => decode_value(name, &value).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RegistryControlError::ReadValueError(format!(
                "'{}': {}",
                name, e
            ))),
        }
    }

    fn set_value(
        &self,
        path: &str,
        name: &str,
        value: &RegistryKeyValue,
    ) -> Result<(), RegistryControlError> {
        let (hive, subkey_path) = parse_registry_path(path)?;

        // create_subkey creates all intermediate subkeys if they don't exist.
        let (key, _) = hive.create_subkey(&subkey_path).map_err(|e| {
            RegistryControlError::CreateError(format!("'{}': {}", subkey_path, e))
        })?;

        match value {
            RegistryKeyValue::Dword(v) => key.set_value(name, v).map_err(|e| {
                RegistryControlError::SetValueError(format!("'{}' to {}: {}", name, v, e))
            }),
            RegistryKeyValue::String(s) => key
                .set_raw_value(
                    name,
                    &RegValue {
                        bytes: s
                            .encode_utf16()
                            .chain(std::iter::once(0))
                            .flat_map(|c| c.to_le_bytes())
                            .collect(),
                        vtype: REG_SZ,
                    },
                )
                .map_err(|e| {
                    RegistryControlError::SetValueError(format!("'{}' to '{}': {}", name, s, e))
                }),
        }
    }

    fn delete_value(&self, path: &str, name: &str) -> Result<(), RegistryControlError> {
        let (hive, subkey_path) = parse_registry_path(path)?;

        let subkey = match hive.open_subkey_with_flags(&subkey_path, KEY_WRITE) {
            Ok(subkey) => subkey,
            // Key already gone: the value cannot exist either.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(RegistryControlError::KeyOpenError(format!(
                    "'{}': {}",
                    subkey_path, e
                )))
            }
        };

        match subkey.delete_value(name) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RegistryControlError::DeleteValueError(format!(
                "'{}' in '{}': {}",
                name, subkey_path, e
            ))),
        }
    }
}
