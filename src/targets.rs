// src/targets.rs

use crate::control::RegistryKeyValue;

/// A Windows service on the curated debloat list. Applying disables it;
/// restoring puts back whatever start mode was captured first.
#[derive(Debug, Clone)]
pub struct ManagedService {
    /// Service name as registered with the service control manager.
    pub id: &'static str,
    /// Human label used in reports and in the state file.
    pub label: &'static str,
}

/// A registry value on the curated debloat list.
#[derive(Debug, Clone)]
pub struct ManagedRegistryValue {
    /// Full path of the registry key (e.g. "HKEY_LOCAL_MACHINE\\Software\\...").
    pub path: &'static str,
    /// Name of the registry value.
    pub name: &'static str,
    /// The value to set when applying.
    pub desired: RegistryKeyValue,
    pub label: &'static str,
}

impl ManagedRegistryValue {
    /// Key under which the captured original is stored in the state file.
    pub fn state_key(&self) -> String {
        format!("{}\\{}", self.path, self.name)
    }
}

pub fn managed_services() -> Vec<ManagedService> {
    vec![
        ManagedService {
            id: "RetailDemo",
            label: "Retail demo mode",
        },
        ManagedService {
            id: "MapsBroker",
            label: "Offline maps service",
        },
        ManagedService {
            id: "lfsvc",
            label: "Geolocation service",
        },
        ManagedService {
            id: "RemoteRegistry",
            label: "Remote Registry",
        },
        ManagedService {
            id: "Fax",
            label: "Fax service",
        },
        ManagedService {
            id: "WMPNetworkSvc",
            label: "Media sharing",
        },
        ManagedService {
            id: "WerSvc",
            label: "Error reporting",
        },
        ManagedService {
            id: "SEMgrSvc",
            label: "Payments / NFC",
        },
        ManagedService {
            id: "PhoneSvc",
            label: "Phone integration",
        },
        ManagedService {
            id: "WalletService",
            label: "Wallet service",
        },
    ]
}

pub fn managed_registry_values() -> Vec<ManagedRegistryValue> {
    vec![
        ManagedRegistryValue {
            path: "HKEY_LOCAL_MACHINE\\SOFTWARE\\Policies\\Microsoft\\Windows\\CloudContent",
            name: "DisableWindowsConsumerFeatures",
            desired: RegistryKeyValue::Dword(1),
            label: "Consumer Experience",
        },
        ManagedRegistryValue {
            path: "HKEY_CURRENT_USER\\Software\\Microsoft\\GameBar",
            name: "AllowAutoGameMode",
            desired: RegistryKeyValue::Dword(0),
            label: "Xbox Game Bar",
        },
        ManagedRegistryValue {
            path: "HKEY_CURRENT_USER\\Software\\Microsoft\\Windows\\CurrentVersion\\GameDVR",
            name: "AppCaptureEnabled",
            desired: RegistryKeyValue::Dword(0),
            label: "Game DVR",
        },
    ]
}
