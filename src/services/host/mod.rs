//! Адаптеры оконной системы и глобального ввода.
//!
//! Ядро работает только через `WindowHost` и `InputHook`; реализация Win32
//! собирается лишь под Windows, эмулятор dry-run доступен везде.

mod dry_run;
mod r#trait;
#[cfg(target_os = "windows")]
mod win32_desktop;
#[cfg(target_os = "windows")]
mod win32_input;

pub use self::dry_run::{DryRunDesktop, DryRunInputHook, SimulatedWindow};
#[cfg(test)]
pub use self::dry_run::HostFailure;
pub use self::r#trait::{
    create_host, ActionCallback, HostAdapters, HotkeyHandle, InputHook, WindowHost,
};
