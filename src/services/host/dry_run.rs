use crate::debug_if_enabled;
use crate::error::{AlterError, Result};
use crate::events::{
    ExStyle, Point, RawInputEvent, ScreenSize, WindowCommand, WindowHandle, WindowInfo, WindowRect,
};
use crate::mappings::KeyCombo;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicIsize, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use super::r#trait::{ActionCallback, HotkeyHandle, InputHook, WindowHost};

/// Вид отказа, который эмулятор может вернуть на смену стиля
#[cfg_attr(not(test), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFailure {
    PermissionDenied,
    Unknown,
}

/// Окно эмулируемого рабочего стола
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedWindow {
    pub title: String,
    pub rect: WindowRect,
    pub ex_style: ExStyle,
    pub alpha: Option<u8>,
    pub topmost: bool,
    pub minimized: bool,
    pub pid: u32,
    pub visible: bool,
    /// Закрывается ли окно по WM_CLOSE (зависшие окна - нет)
    pub responds_to_close: bool,
    pub frame_refreshes: u32,
}

impl SimulatedWindow {
    pub fn new(title: &str, rect: WindowRect, pid: u32) -> Self {
        Self {
            title: title.to_string(),
            rect,
            ex_style: ExStyle(0x0000_0100),
            alpha: None,
            topmost: false,
            minimized: false,
            pid,
            visible: true,
            responds_to_close: true,
            frame_refreshes: 0,
        }
    }
}

/// Эмулятор рабочего стола для режима dry-run и тестов
pub struct DryRunDesktop {
    windows: RwLock<BTreeMap<WindowHandle, SimulatedWindow>>,
    cursor: RwLock<Point>,
    screen: ScreenSize,
    next_handle: AtomicIsize,
    style_failure: RwLock<Option<HostFailure>>,
    alpha_history: Mutex<Vec<(WindowHandle, u8)>>,
    posted: Mutex<Vec<(WindowHandle, WindowCommand)>>,
    terminated: Mutex<Vec<u32>>,
}

impl DryRunDesktop {
    pub fn new(screen: ScreenSize) -> Self {
        Self {
            windows: RwLock::new(BTreeMap::new()),
            cursor: RwLock::new(Point::default()),
            screen,
            next_handle: AtomicIsize::new(0x1000),
            style_failure: RwLock::new(None),
            alpha_history: Mutex::new(Vec::new()),
            posted: Mutex::new(Vec::new()),
            terminated: Mutex::new(Vec::new()),
        }
    }

    /// Рабочий стол с несколькими фиктивными окнами
    pub fn with_fake_windows() -> Self {
        let desktop = Self::new(ScreenSize::new(1920, 1080));

        let fake_windows = [
            ("Terminal - dry_run", WindowRect::new(100, 100, 900, 600)),
            ("Browser - dry_run", WindowRect::new(400, 200, 1400, 900)),
            ("Editor - dry_run", WindowRect::new(960, 0, 1920, 1040)),
            ("Game - dry_run", WindowRect::new(0, 0, 1920, 1080)),
        ];

        for (i, (title, rect)) in fake_windows.iter().enumerate() {
            desktop.add_window(SimulatedWindow::new(title, *rect, 40_000 + i as u32));
        }

        desktop
    }

    pub fn add_window(&self, window: SimulatedWindow) -> WindowHandle {
        let handle = WindowHandle(self.next_handle.fetch_add(0x10, Ordering::SeqCst));
        self.windows.write().insert(handle, window);
        handle
    }

    /// Окно уничтожено извне (пользователь закрыл программу)
    pub fn destroy_window(&self, handle: WindowHandle) {
        self.windows.write().remove(&handle);
    }

    pub fn set_cursor(&self, point: Point) {
        *self.cursor.write() = point;
    }

    /// Эмуляция движения курсора: каждые `period` курсор перескакивает
    /// внутрь первого окна и обратно
    pub fn spawn_emulation(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Dry-run режим - курсор эмулируется с периодом {:?}", period);
            let mut ticker = interval(period);
            let mut inside = false;

            loop {
                ticker.tick().await;

                let target = self.windows.read().values().next().map(|w| w.rect);
                let Some(rect) = target else {
                    continue;
                };

                let point = if inside {
                    Point::new(rect.right + 50, rect.bottom + 50)
                } else {
                    Point::new((rect.left + rect.right) / 2, (rect.top + rect.bottom) / 2)
                };
                inside = !inside;

                info!("Dry-run: курсор перемещён в {}", point);
                self.set_cursor(point);
            }
        })
    }

    fn with_window<T>(&self, handle: WindowHandle, f: impl FnOnce(&SimulatedWindow) -> T) -> Result<T> {
        self.windows
            .read()
            .get(&handle)
            .map(f)
            .ok_or(AlterError::StaleHandle(handle))
    }

    fn with_window_mut<T>(
        &self,
        handle: WindowHandle,
        f: impl FnOnce(&mut SimulatedWindow) -> T,
    ) -> Result<T> {
        self.windows
            .write()
            .get_mut(&handle)
            .map(f)
            .ok_or(AlterError::StaleHandle(handle))
    }
}

/// Проверки и настройка отказов для тестов
#[cfg(test)]
impl DryRunDesktop {
    pub fn window(&self, handle: WindowHandle) -> Option<SimulatedWindow> {
        self.windows.read().get(&handle).cloned()
    }

    pub fn update_window<F: FnOnce(&mut SimulatedWindow)>(&self, handle: WindowHandle, f: F) {
        if let Some(window) = self.windows.write().get_mut(&handle) {
            f(window);
        }
    }

    pub fn fail_style_changes(&self, failure: Option<HostFailure>) {
        *self.style_failure.write() = failure;
    }

    pub fn alpha_history(&self) -> Vec<(WindowHandle, u8)> {
        self.alpha_history.lock().clone()
    }

    pub fn posted_commands(&self) -> Vec<(WindowHandle, WindowCommand)> {
        self.posted.lock().clone()
    }

    pub fn terminated_processes(&self) -> Vec<u32> {
        self.terminated.lock().clone()
    }
}

impl WindowHost for DryRunDesktop {
    fn enumerate_windows(&self) -> Result<Vec<WindowInfo>> {
        Ok(self
            .windows
            .read()
            .iter()
            .filter(|(_, w)| w.visible && !w.title.is_empty())
            .map(|(handle, w)| WindowInfo::new(*handle, w.title.clone()).with_pid(w.pid))
            .collect())
    }

    fn is_window(&self, handle: WindowHandle) -> bool {
        self.windows.read().contains_key(&handle)
    }

    fn window_title(&self, handle: WindowHandle) -> Result<String> {
        self.with_window(handle, |w| w.title.clone())
    }

    fn window_process_id(&self, handle: WindowHandle) -> Option<u32> {
        self.with_window(handle, |w| w.pid).ok()
    }

    fn ex_style(&self, handle: WindowHandle) -> Result<ExStyle> {
        self.with_window(handle, |w| w.ex_style)
    }

    fn set_ex_style(&self, handle: WindowHandle, style: ExStyle) -> Result<()> {
        match *self.style_failure.read() {
            Some(HostFailure::PermissionDenied) => {
                return Err(crate::alter_error!(permission, "SetWindowLongPtrW: доступ запрещён (5)"));
            }
            Some(HostFailure::Unknown) => {
                return Err(crate::alter_error!(host, "SetWindowLongPtrW: неизвестная ошибка (1400)"));
            }
            None => {}
        }
        self.with_window_mut(handle, |w| w.ex_style = style)
    }

    fn set_layered_alpha(&self, handle: WindowHandle, alpha: u8) -> Result<()> {
        self.with_window_mut(handle, |w| {
            if !w.ex_style.contains(ExStyle::LAYERED) {
                return Err(crate::alter_error!(host, "окно {} не имеет стиля WS_EX_LAYERED", handle));
            }
            w.alpha = Some(alpha);
            Ok(())
        })??;
        self.alpha_history.lock().push((handle, alpha));
        Ok(())
    }

    fn window_rect(&self, handle: WindowHandle) -> Result<WindowRect> {
        self.with_window(handle, |w| w.rect)
    }

    fn set_topmost(&self, handle: WindowHandle, topmost: bool) -> Result<()> {
        self.with_window_mut(handle, |w| w.topmost = topmost)
    }

    fn refresh_frame(&self, handle: WindowHandle) -> Result<()> {
        self.with_window_mut(handle, |w| w.frame_refreshes += 1)
    }

    fn is_minimized(&self, handle: WindowHandle) -> Result<bool> {
        self.with_window(handle, |w| w.minimized)
    }

    fn post_command(&self, handle: WindowHandle, command: WindowCommand) -> Result<()> {
        let closes = self.with_window_mut(handle, |w| match command {
            WindowCommand::Minimize => {
                w.minimized = true;
                false
            }
            WindowCommand::Restore => {
                w.minimized = false;
                false
            }
            WindowCommand::Close => w.responds_to_close,
        })?;

        if closes {
            self.destroy_window(handle);
        }

        info!("[DRY RUN] Окну {} отправлена команда {:?}", handle, command);
        self.posted.lock().push((handle, command));
        Ok(())
    }

    fn cursor_position(&self) -> Result<Point> {
        Ok(*self.cursor.read())
    }

    fn screen_size(&self) -> Result<ScreenSize> {
        Ok(self.screen)
    }

    fn window_at(&self, point: Point) -> Option<WindowHandle> {
        // Последнее добавленное окно считается верхним в z-порядке
        self.windows
            .read()
            .iter()
            .rev()
            .find(|(_, w)| w.visible && !w.minimized && w.rect.contains(point))
            .map(|(handle, _)| *handle)
    }

    fn terminate_process(&self, pid: u32) -> Result<()> {
        warn!("[DRY RUN] Принудительное завершение процесса {}", pid);
        self.windows.write().retain(|_, w| w.pid != pid);
        self.terminated.lock().push(pid);
        Ok(())
    }
}

struct RegisteredHotkey {
    combo: KeyCombo,
    callback: ActionCallback,
}

/// Эмулятор глобального хука ввода: события подаются вручную
pub struct DryRunInputHook {
    sink: Mutex<Option<UnboundedSender<RawInputEvent>>>,
    hotkeys: DashMap<HotkeyHandle, RegisteredHotkey>,
    rejected: DashMap<KeyCombo, ()>,
    next_id: AtomicU32,
}

impl Default for DryRunInputHook {
    fn default() -> Self {
        Self::new()
    }
}

impl DryRunInputHook {
    pub fn new() -> Self {
        Self {
            sink: Mutex::new(None),
            hotkeys: DashMap::new(),
            rejected: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }
}

#[cfg(test)]
impl DryRunInputHook {
    pub fn is_running(&self) -> bool {
        self.sink.lock().is_some()
    }

    /// Подать сырое событие, как будто оно пришло от хука ОС
    pub fn inject(&self, event: RawInputEvent) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        }
    }

    /// Нажать зарегистрированную комбинацию; колбэк вызывается прямо из "хука"
    pub fn press_hotkey(&self, combo: &str) -> bool {
        let Ok(pressed) = KeyCombo::parse(combo) else {
            return false;
        };

        let callback = self
            .hotkeys
            .iter()
            .find(|entry| entry.value().combo == pressed)
            .map(|entry| Arc::clone(&entry.value().callback));

        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// ОС откажет в регистрации этой комбинации (занята другим процессом)
    pub fn reject_combo(&self, combo: &str) {
        if let Ok(combo) = KeyCombo::parse(combo) {
            self.rejected.insert(combo, ());
        }
    }

    pub fn registered_combos(&self) -> Vec<String> {
        let mut combos: Vec<String> = self
            .hotkeys
            .iter()
            .map(|entry| entry.value().combo.to_string())
            .collect();
        combos.sort();
        combos
    }
}

impl InputHook for DryRunInputHook {
    fn start(&self, sink: UnboundedSender<RawInputEvent>) -> Result<()> {
        let mut current = self.sink.lock();
        if current.is_some() {
            return Err(crate::alter_error!(internal, "хук ввода уже запущен"));
        }
        info!("Dry-run режим - хук ввода работает в режиме эмуляции");
        *current = Some(sink);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        if self.sink.lock().take().is_some() {
            info!("Dry-run хук ввода остановлен");
        }
        Ok(())
    }

    fn register_hotkey(
        &self,
        combo: &KeyCombo,
        suppress: bool,
        callback: ActionCallback,
    ) -> Result<HotkeyHandle> {
        if self.rejected.contains_key(combo) {
            return Err(crate::alter_error!(host, "RegisterHotKey отклонил '{}'", combo));
        }
        if self.hotkeys.iter().any(|entry| entry.value().combo == *combo) {
            return Err(crate::alter_error!(host, "комбинация '{}' уже зарегистрирована", combo));
        }

        let handle = HotkeyHandle(self.next_id.fetch_add(1, Ordering::SeqCst));
        debug_if_enabled!("[DRY RUN] Регистрация '{}' (suppress: {}) -> {:?}", combo, suppress, handle);
        self.hotkeys.insert(
            handle,
            RegisteredHotkey {
                combo: combo.clone(),
                callback,
            },
        );
        Ok(handle)
    }

    fn unregister_hotkey(&self, handle: HotkeyHandle) -> Result<()> {
        if self.hotkeys.remove(&handle).is_none() {
            debug_if_enabled!("[DRY RUN] {:?} уже удалён", handle);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_layered_alpha_requires_layered_style() {
        let desktop = DryRunDesktop::new(ScreenSize::new(1000, 800));
        let handle = desktop.add_window(SimulatedWindow::new("w", WindowRect::new(0, 0, 10, 10), 1));

        assert!(desktop.set_layered_alpha(handle, 128).is_err());

        let style = desktop.ex_style(handle).unwrap();
        desktop.set_ex_style(handle, style | ExStyle::LAYERED).unwrap();
        desktop.set_layered_alpha(handle, 128).unwrap();

        assert_eq!(desktop.window(handle).unwrap().alpha, Some(128));
    }

    #[test]
    fn test_destroyed_window_is_stale() {
        let desktop = DryRunDesktop::new(ScreenSize::new(1000, 800));
        let handle = desktop.add_window(SimulatedWindow::new("w", WindowRect::new(0, 0, 10, 10), 1));

        desktop.destroy_window(handle);

        assert!(!desktop.is_window(handle));
        assert!(matches!(desktop.window_rect(handle), Err(AlterError::StaleHandle(h)) if h == handle));
    }

    #[test]
    fn test_window_at_returns_topmost_match() {
        let desktop = DryRunDesktop::with_fake_windows();
        let windows = desktop.enumerate_windows().unwrap();

        // (500, 500) попадает в Terminal, Browser и Game; сверху - Game
        let hit = desktop.window_at(Point::new(500, 500)).unwrap();
        assert_eq!(desktop.window_title(hit).unwrap(), "Game - dry_run");
        assert_eq!(windows.len(), 4);
    }

    #[test]
    fn test_hotkey_registration_and_press() {
        let hook = DryRunInputHook::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        let combo = KeyCombo::parse("ctrl+alt+m").unwrap();
        let handle = hook
            .register_hotkey(&combo, true, Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        assert!(hook.press_hotkey("alt+ctrl+m"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Повторная регистрация той же комбинации отклоняется, как в ОС
        assert!(hook.register_hotkey(&combo, true, Arc::new(|| {})).is_err());

        hook.unregister_hotkey(handle).unwrap();
        hook.unregister_hotkey(handle).unwrap();
        assert!(!hook.press_hotkey("ctrl+alt+m"));
    }
}
