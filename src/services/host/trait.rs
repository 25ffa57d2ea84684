use crate::error::Result;
use crate::events::{
    ExStyle, Point, RawInputEvent, ScreenSize, WindowCommand, WindowHandle, WindowInfo, WindowRect,
};
use crate::mappings::KeyCombo;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use super::dry_run::{DryRunDesktop, DryRunInputHook};

/// Callback bound to a trigger; invoked by the hook or the dispatcher
pub type ActionCallback = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by the input hook for a registered hotkey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HotkeyHandle(pub u32);

/// Windowing host adapter: everything the core needs from the desktop.
///
/// Implementations MUST be callable from any thread. Failures that stem from
/// insufficient privilege are reported as `AlterError::PermissionDenied`,
/// everything else as `AlterError::UnknownHost`.
pub trait WindowHost: Send + Sync {
    /// Visible top-level windows that have a title
    fn enumerate_windows(&self) -> Result<Vec<WindowInfo>>;

    fn is_window(&self, handle: WindowHandle) -> bool;

    fn window_title(&self, handle: WindowHandle) -> Result<String>;

    fn window_process_id(&self, handle: WindowHandle) -> Option<u32>;

    fn ex_style(&self, handle: WindowHandle) -> Result<ExStyle>;

    fn set_ex_style(&self, handle: WindowHandle, style: ExStyle) -> Result<()>;

    /// Requires the window to carry the layered style bit
    fn set_layered_alpha(&self, handle: WindowHandle, alpha: u8) -> Result<()>;

    fn window_rect(&self, handle: WindowHandle) -> Result<WindowRect>;

    fn set_topmost(&self, handle: WindowHandle, topmost: bool) -> Result<()>;

    /// Force the host to recompute frame and visual state after a style change
    fn refresh_frame(&self, handle: WindowHandle) -> Result<()>;

    fn is_minimized(&self, handle: WindowHandle) -> Result<bool>;

    fn post_command(&self, handle: WindowHandle, command: WindowCommand) -> Result<()>;

    fn cursor_position(&self) -> Result<Point>;

    fn screen_size(&self) -> Result<ScreenSize>;

    /// Root top-level window under the given point
    fn window_at(&self, point: Point) -> Option<WindowHandle>;

    fn terminate_process(&self, pid: u32) -> Result<()>;
}

/// Process-wide input event source.
///
/// Only one instance may be started at a time; this is a construction
/// discipline of `main`, not a hidden singleton.
pub trait InputHook: Send + Sync {
    /// Start delivering pointer events into `sink`
    fn start(&self, sink: UnboundedSender<RawInputEvent>) -> Result<()>;

    fn stop(&self) -> Result<()>;

    /// Register a global key combination; `suppress` consumes the keystroke
    fn register_hotkey(
        &self,
        combo: &KeyCombo,
        suppress: bool,
        callback: ActionCallback,
    ) -> Result<HotkeyHandle>;

    /// Unknown or already removed handles are treated as success
    fn unregister_hotkey(&self, handle: HotkeyHandle) -> Result<()>;
}

/// Host adapters selected for this run
pub struct HostAdapters {
    pub windows: Arc<dyn WindowHost>,
    pub input: Arc<dyn InputHook>,
    /// Present only in dry-run mode; drives the simulated cursor
    pub simulated: Option<Arc<DryRunDesktop>>,
}

/// Factory function to create the host adapters based on the dry_run flag
pub fn create_host(dry_run: bool) -> Result<HostAdapters> {
    if !dry_run {
        #[cfg(target_os = "windows")]
        {
            return Ok(HostAdapters {
                windows: Arc::new(super::win32_desktop::Win32Desktop::new()),
                input: Arc::new(super::win32_input::Win32InputHook::new()),
                simulated: None,
            });
        }

        #[cfg(not(target_os = "windows"))]
        tracing::warn!("Оконная система поддерживается только в Windows, включён режим эмуляции");
    }

    let desktop = Arc::new(DryRunDesktop::with_fake_windows());
    Ok(HostAdapters {
        windows: desktop.clone(),
        input: Arc::new(DryRunInputHook::new()),
        simulated: Some(desktop),
    })
}
