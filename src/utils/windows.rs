// src/utils/windows.rs

use widestring::U16CString;
use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{CloseHandle, HANDLE, HWND},
        Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY},
        System::Threading::{GetCurrentProcess, OpenProcessToken},
        UI::WindowsAndMessaging::{
            MessageBoxW, IDCANCEL, IDNO, IDYES, MB_ICONERROR, MB_ICONINFORMATION,
            MB_ICONQUESTION, MB_YESNOCANCEL, MESSAGEBOX_RESULT, MESSAGEBOX_STYLE,
        },
    },
};

/// Checks if the current process is running with elevated (administrator)
/// privileges.
pub fn is_elevated() -> bool {
    let mut handle: HANDLE = HANDLE::default();
    if unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut handle).is_ok() } {
        let mut elevation: TOKEN_ELEVATION = unsafe { std::mem::zeroed() };
        let size = std::mem::size_of::<TOKEN_ELEVATION>();
        let mut ret_size = size;
        if unsafe {
            GetTokenInformation(
                handle,
                TokenElevation,
                Some(&mut elevation as *mut _ as *mut _),
                size as u32,
                &mut ret_size as *mut _ as *mut _,
            )
            .is_ok()
        } {
            if handle != HANDLE(std::ptr::null_mut()) && unsafe { CloseHandle(handle).is_err() } {
                return false;
            }
            return elevation.TokenIsElevated != 0;
        }
    }
    if handle != HANDLE(std::ptr::null_mut()) && unsafe { CloseHandle(handle).is_err() } {
        return false;
    }
    false
}

/// What the operator picked at the front door.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    Apply,
    Restore,
    Audit,
    Exit,
}

fn message_box(text: &str, title: &str, style: MESSAGEBOX_STYLE) -> MESSAGEBOX_RESULT {
    let text = U16CString::from_str(text).unwrap_or_default();
    let title = U16CString::from_str(title).unwrap_or_default();
    unsafe {
        MessageBoxW(
            HWND::default(),
            PCWSTR::from_raw(text.as_ptr()),
            PCWSTR::from_raw(title.as_ptr()),
            style,
        )
    }
}

/// Modal yes/no/cancel menu: YES applies, NO restores, CANCEL runs the
/// read-only audit. Dismissing the dialog exits without running anything.
pub fn prompt_mode(title: &str) -> PromptChoice {
    let choice = message_box(
        "SAFE WINDOWS SYSTEM DEBLOATER\n\n\
         YES  \u{2192} Apply safe debloat\n\
         NO   \u{2192} Restore (only what this tool changed)\n\
         CANCEL \u{2192} Audit mode (no changes)\n\n\
         This tool does not delete system files.",
        title,
        MB_YESNOCANCEL | MB_ICONQUESTION,
    );
    if choice == IDYES {
        PromptChoice::Apply
    } else if choice == IDNO {
        PromptChoice::Restore
    } else if choice == IDCANCEL {
        PromptChoice::Audit
    } else {
        PromptChoice::Exit
    }
}

pub fn show_error(text: &str, title: &str) {
    let _ = message_box(text, title, MB_ICONERROR);
}

pub fn show_info(text: &str, title: &str) {
    let _ = message_box(text, title, MB_ICONINFORMATION);
}
