// src/utils/services.rs

use widestring::U16CString;
use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::ERROR_SERVICE_DOES_NOT_EXIST,
        System::Services::{
            ChangeServiceConfigW, CloseServiceHandle, ControlService, OpenSCManagerW,
            OpenServiceW, QueryServiceConfigW, ENUM_SERVICE_TYPE, QUERY_SERVICE_CONFIGW,
            SC_HANDLE, SC_MANAGER_CONNECT, SERVICE_AUTO_START, SERVICE_BOOT_START,
            SERVICE_CHANGE_CONFIG, SERVICE_CONTROL_STOP, SERVICE_DEMAND_START, SERVICE_DISABLED,
            SERVICE_ERROR, SERVICE_NO_CHANGE, SERVICE_QUERY_CONFIG, SERVICE_STATUS, SERVICE_STOP,
            SERVICE_SYSTEM_START,
        },
    },
};

use crate::{
    control::{ServiceControl, StartMode},
    errors::ServiceControlError,
};

/// Service collaborator backed by the Windows service control manager.
pub struct WindowsServices;

struct ScHandle(SC_HANDLE);

impl Drop for ScHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseServiceHandle(self.0);
        }
    }
}

fn open_manager() -> Result<ScHandle, ServiceControlError> {
    unsafe {
        OpenSCManagerW(PCWSTR::null(), PCWSTR::null(), SC_MANAGER_CONNECT)
            .map(ScHandle)
            .map_err(|e| ServiceControlError::ManagerOpenError(format!("{:?}", e)))
    }
}

/// Opens a service handle; `Ok(None)` when the service is not installed.
fn open_service(
    manager: &ScHandle,
    name: &str,
    access: u32,
) -> Result<Option<ScHandle>, ServiceControlError> {
    let wide = U16CString::from_str(name)
        .map_err(|e| ServiceControlError::ServiceOpenError(name.to_string(), e.to_string()))?;
    unsafe {
        match OpenServiceW(manager.0, PCWSTR::from_raw(wide.as_ptr()), access) {
            Ok(handle) => Ok(Some(ScHandle(handle))),
            Err(e) if e.code() == ERROR_SERVICE_DOES_NOT_EXIST.to_hresult() => Ok(None),
            Err(e) => Err(ServiceControlError::ServiceOpenError(
                name.to_string(),
                format!("{:?}", e),
            )),
        }
    }
}

impl ServiceControl for WindowsServices {
    fn query_start_mode(&self, service: &str) -> Result<Option<StartMode>, ServiceControlError> {
        let manager = open_manager()?;
        let handle = match open_service(&manager, service, SERVICE_QUERY_CONFIG)? {
            Some(handle) => handle,
            None => return Ok(None),
        };

        // Two-call pattern: the first call reports the required buffer size.
        let mut needed = 0u32;
        unsafe {
            let _ = QueryServiceConfigW(handle.0, None, 0, &mut needed);
        }
        if needed == 0 {
            return Err(ServiceControlError::QueryError(
                service.to_string(),
                "config size query returned zero".to_string(),
            ));
        }

        // u64 backing keeps the buffer aligned for QUERY_SERVICE_CONFIGW.
        let mut buffer = vec![0u64; (needed as usize + 7) / 8];
        unsafe {
            QueryServiceConfigW(
                handle.0,
                Some(buffer.as_mut_ptr() as *mut QUERY_SERVICE_CONFIGW),
                needed,
                &mut needed,
            )
            .map_err(|e| {
                ServiceControlError::QueryError(service.to_string(), format!("{:?}", e))
            })?;
        }
        let config = unsafe { &*(buffer.as_ptr() as *const QUERY_SERVICE_CONFIGW) };

        let start_type = config.dwStartType;
        let mode = if start_type == SERVICE_AUTO_START {
            StartMode::AutoStart
        } else if start_type == SERVICE_DEMAND_START {
            StartMode::DemandStart
        } else if start_type == SERVICE_DISABLED {
            StartMode::Disabled
        } else if start_type == SERVICE_BOOT_START {
            StartMode::BootStart
        } else if start_type == SERVICE_SYSTEM_START {
            StartMode::SystemStart
        } else {
            return Err(ServiceControlError::UnknownStartType(
                service.to_string(),
                start_type.0,
            ));
        };
        Ok(Some(mode))
    }

    fn set_start_mode(&self, service: &str, mode: StartMode) -> Result<(), ServiceControlError> {
        let target = match mode {
            StartMode::AutoStart => SERVICE_AUTO_START,
            StartMode::DemandStart => SERVICE_DEMAND_START,
            StartMode::Disabled => SERVICE_DISABLED,
            // Boot and system driver start types are never written.
            other => return Err(ServiceControlError::UnsupportedStartMode(other.to_string())),
        };

        let manager = open_manager()?;
        let handle = open_service(&manager, service, SERVICE_CHANGE_CONFIG)?.ok_or_else(|| {
            ServiceControlError::ConfigureError(
                service.to_string(),
                "service does not exist".to_string(),
            )
        })?;

        unsafe {
            ChangeServiceConfigW(
                handle.0,
                ENUM_SERVICE_TYPE(SERVICE_NO_CHANGE),
                target,
                SERVICE_ERROR(SERVICE_NO_CHANGE),
                PCWSTR::null(),
                PCWSTR::null(),
                None,
                PCWSTR::null(),
                PCWSTR::null(),
                PCWSTR::null(),
                PCWSTR::null(),
            )
            .map_err(|e| {
                ServiceControlError::ConfigureError(service.to_string(), format!("{:?}", e))
            })
        }
    }

    fn stop(&self, service: &str) -> Result<(), ServiceControlError> {
        let manager = open_manager()?;
        let handle = open_service(&manager, service, SERVICE_STOP)?.ok_or_else(|| {
            ServiceControlError::StopError(
                service.to_string(),
                "service does not exist".to_string(),
            )
        })?;

        let mut status = SERVICE_STATUS::default();
        unsafe {
            ControlService(handle.0, SERVICE_CONTROL_STOP, &mut status).map_err(|e| {
                ServiceControlError::StopError(service.to_string(), format!("{:?}", e))
            })
        }
    }
}
