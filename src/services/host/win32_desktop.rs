use crate::error::{AlterError, Result};
use crate::events::{ExStyle, Point, ScreenSize, WindowCommand, WindowHandle, WindowInfo, WindowRect};
use crate::trace_if_enabled;
use std::ffi::c_void;
use windows::core::HRESULT;
use windows::Win32::Foundation::{
    CloseHandle, SetLastError, BOOL, COLORREF, ERROR_ACCESS_DENIED, HWND, LPARAM, POINT, RECT,
    WIN32_ERROR, WPARAM,
};
use windows::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetAncestor, GetCursorPos, GetSystemMetrics, GetWindowRect, GetWindowTextLengthW,
    GetWindowTextW, GetWindowThreadProcessId, IsIconic, IsWindow, IsWindowVisible, PostMessageW,
    SetLayeredWindowAttributes, SetWindowPos, WindowFromPoint, GA_ROOT, GWL_EXSTYLE, HWND_NOTOPMOST,
    HWND_TOPMOST, LWA_ALPHA, SC_MINIMIZE, SC_RESTORE, SM_CXSCREEN, SM_CYSCREEN, SWP_FRAMECHANGED,
    SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER, WM_CLOSE, WM_SYSCOMMAND,
};

#[cfg(target_pointer_width = "64")]
use windows::Win32::UI::WindowsAndMessaging::{GetWindowLongPtrW, SetWindowLongPtrW};
#[cfg(target_pointer_width = "32")]
use windows::Win32::UI::WindowsAndMessaging::{GetWindowLongW, SetWindowLongW};

use super::r#trait::WindowHost;

fn hwnd(handle: WindowHandle) -> HWND {
    HWND(handle.value() as *mut c_void)
}

fn handle_of(hwnd: HWND) -> WindowHandle {
    WindowHandle(hwnd.0 as isize)
}

/// Отказ в доступе отличается от прочих ошибок оконной системы
fn host_error(context: &str, error: windows::core::Error) -> AlterError {
    if error.code() == HRESULT::from_win32(ERROR_ACCESS_DENIED.0) {
        crate::alter_error!(permission, "{}: {}", context, error.message())
    } else {
        crate::alter_error!(host, "{}: {} ({})", context, error.message(), error.code())
    }
}

#[cfg(target_pointer_width = "64")]
unsafe fn read_ex_style(hwnd: HWND) -> u32 {
    GetWindowLongPtrW(hwnd, GWL_EXSTYLE) as u32
}

#[cfg(target_pointer_width = "32")]
unsafe fn read_ex_style(hwnd: HWND) -> u32 {
    GetWindowLongW(hwnd, GWL_EXSTYLE) as u32
}

#[cfg(target_pointer_width = "64")]
unsafe fn write_ex_style(hwnd: HWND, style: u32) -> isize {
    SetWindowLongPtrW(hwnd, GWL_EXSTYLE, style as isize)
}

#[cfg(target_pointer_width = "32")]
unsafe fn write_ex_style(hwnd: HWND, style: u32) -> isize {
    SetWindowLongW(hwnd, GWL_EXSTYLE, style as i32) as isize
}

/// Реальный рабочий стол Windows
#[derive(Debug, Default)]
pub struct Win32Desktop;

impl Win32Desktop {
    pub fn new() -> Self {
        Self
    }

    fn ensure_alive(&self, handle: WindowHandle) -> Result<HWND> {
        if self.is_window(handle) {
            Ok(hwnd(handle))
        } else {
            Err(AlterError::StaleHandle(handle))
        }
    }
}

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let windows = &mut *(lparam.0 as *mut Vec<WindowInfo>);

    if !IsWindowVisible(hwnd).as_bool() {
        return BOOL(1);
    }

    let Some(title) = read_title(hwnd) else {
        return BOOL(1);
    };

    let mut pid = 0u32;
    let _ = GetWindowThreadProcessId(hwnd, Some(&mut pid));
    windows.push(WindowInfo::new(handle_of(hwnd), title).with_pid(pid));
    BOOL(1)
}

unsafe fn read_title(hwnd: HWND) -> Option<String> {
    let length = GetWindowTextLengthW(hwnd);
    if length <= 0 {
        return None;
    }
    let mut buffer = vec![0u16; length as usize + 1];
    let read = GetWindowTextW(hwnd, &mut buffer);
    if read <= 0 {
        return None;
    }
    let title = String::from_utf16_lossy(&buffer[..read as usize]);
    if title.trim().is_empty() {
        None
    } else {
        Some(title)
    }
}

impl WindowHost for Win32Desktop {
    fn enumerate_windows(&self) -> Result<Vec<WindowInfo>> {
        let mut windows: Vec<WindowInfo> = Vec::new();
        unsafe {
            EnumWindows(Some(collect_window), LPARAM(&mut windows as *mut _ as isize))
                .map_err(|e| host_error("EnumWindows", e))?;
        }
        Ok(windows)
    }

    fn is_window(&self, handle: WindowHandle) -> bool {
        unsafe { IsWindow(hwnd(handle)).as_bool() }
    }

    fn window_title(&self, handle: WindowHandle) -> Result<String> {
        let hwnd = self.ensure_alive(handle)?;
        Ok(unsafe { read_title(hwnd) }.unwrap_or_default())
    }

    fn window_process_id(&self, handle: WindowHandle) -> Option<u32> {
        let mut pid = 0u32;
        unsafe {
            GetWindowThreadProcessId(hwnd(handle), Some(&mut pid));
        }
        (pid != 0).then_some(pid)
    }

    fn ex_style(&self, handle: WindowHandle) -> Result<ExStyle> {
        let hwnd = self.ensure_alive(handle)?;
        Ok(ExStyle(unsafe { read_ex_style(hwnd) }))
    }

    fn set_ex_style(&self, handle: WindowHandle, style: ExStyle) -> Result<()> {
        let hwnd = self.ensure_alive(handle)?;
        unsafe {
            // Нулевой результат - ошибка только при ненулевом коде последней ошибки
            SetLastError(WIN32_ERROR(0));
            if write_ex_style(hwnd, style.bits()) == 0 {
                let error = windows::core::Error::from_win32();
                if error.code().is_err() {
                    return Err(host_error("SetWindowLongPtrW", error));
                }
            }
        }
        trace_if_enabled!("Окну {} установлен стиль {}", handle, style);
        Ok(())
    }

    fn set_layered_alpha(&self, handle: WindowHandle, alpha: u8) -> Result<()> {
        let hwnd = self.ensure_alive(handle)?;
        unsafe {
            SetLayeredWindowAttributes(hwnd, COLORREF(0), alpha, LWA_ALPHA)
                .map_err(|e| host_error("SetLayeredWindowAttributes", e))
        }
    }

    fn window_rect(&self, handle: WindowHandle) -> Result<WindowRect> {
        let hwnd = self.ensure_alive(handle)?;
        let mut rect = RECT::default();
        unsafe {
            GetWindowRect(hwnd, &mut rect).map_err(|e| host_error("GetWindowRect", e))?;
        }
        Ok(WindowRect::new(rect.left, rect.top, rect.right, rect.bottom))
    }

    fn set_topmost(&self, handle: WindowHandle, topmost: bool) -> Result<()> {
        let hwnd = self.ensure_alive(handle)?;
        let insert_after = if topmost { HWND_TOPMOST } else { HWND_NOTOPMOST };
        unsafe {
            SetWindowPos(hwnd, insert_after, 0, 0, 0, 0, SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE)
                .map_err(|e| host_error("SetWindowPos", e))
        }
    }

    fn refresh_frame(&self, handle: WindowHandle) -> Result<()> {
        let hwnd = self.ensure_alive(handle)?;
        unsafe {
            SetWindowPos(
                hwnd,
                None,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOZORDER | SWP_FRAMECHANGED,
            )
            .map_err(|e| host_error("SetWindowPos(SWP_FRAMECHANGED)", e))
        }
    }

    fn is_minimized(&self, handle: WindowHandle) -> Result<bool> {
        let hwnd = self.ensure_alive(handle)?;
        Ok(unsafe { IsIconic(hwnd).as_bool() })
    }

    fn post_command(&self, handle: WindowHandle, command: WindowCommand) -> Result<()> {
        let hwnd = self.ensure_alive(handle)?;
        let (message, wparam) = match command {
            WindowCommand::Minimize => (WM_SYSCOMMAND, SC_MINIMIZE as usize),
            WindowCommand::Restore => (WM_SYSCOMMAND, SC_RESTORE as usize),
            WindowCommand::Close => (WM_CLOSE, 0),
        };
        unsafe {
            PostMessageW(hwnd, message, WPARAM(wparam), LPARAM(0))
                .map_err(|e| host_error("PostMessageW", e))
        }
    }

    fn cursor_position(&self) -> Result<Point> {
        let mut point = POINT::default();
        unsafe {
            GetCursorPos(&mut point).map_err(|e| host_error("GetCursorPos", e))?;
        }
        Ok(Point::new(point.x, point.y))
    }

    fn screen_size(&self) -> Result<ScreenSize> {
        let (width, height) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
        if width <= 0 || height <= 0 {
            return Err(crate::alter_error!(host, "GetSystemMetrics вернул {}x{}", width, height));
        }
        Ok(ScreenSize::new(width as u32, height as u32))
    }

    fn window_at(&self, point: Point) -> Option<WindowHandle> {
        unsafe {
            let under = WindowFromPoint(POINT { x: point.x, y: point.y });
            if under.0.is_null() {
                return None;
            }
            let root = GetAncestor(under, GA_ROOT);
            let target = if root.0.is_null() { under } else { root };
            Some(handle_of(target))
        }
    }

    fn terminate_process(&self, pid: u32) -> Result<()> {
        unsafe {
            let process = OpenProcess(PROCESS_TERMINATE, false, pid)
                .map_err(|e| host_error("OpenProcess", e))?;
            let result = TerminateProcess(process, 1).map_err(|e| host_error("TerminateProcess", e));
            let _ = CloseHandle(process);
            result
        }
    }
}
