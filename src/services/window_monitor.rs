//! Отслеживание окна: прозрачность по наведению курсора, поверх всех окон,
//! скрытие из панели задач. Один экземпляр отслеживает одно окно.

use crate::config::MonitorConfig;
use crate::error::{AlterError, Result};
use crate::events::{ExStyle, WindowHandle};
use crate::services::host::WindowHost;
use crate::services::scheduler::{schedule_repeating, UiScheduler};
use crate::trace_if_enabled;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Проценты 0..=100 в байт прозрачности 0..=255 с округлением
pub fn alpha_from_percent(percent: u8) -> u8 {
    (f64::from(percent.min(100)) / 100.0 * 255.0).round() as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOptions {
    pub hover_opacity: u8,
    pub away_transparency: u8,
    pub always_on_top: bool,
    pub hide_taskbar: bool,
    pub poll_interval: Duration,
}

impl From<&MonitorConfig> for MonitorOptions {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            hover_opacity: config.hover_opacity,
            away_transparency: config.away_transparency,
            always_on_top: config.always_on_top,
            hide_taskbar: config.hide_taskbar,
            poll_interval: config.poll_interval(),
        }
    }
}

/// Результат одного тика опроса
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Continue,
    Stopped,
    /// Окно исчезло; сообщается ровно один раз
    WindowClosed,
}

#[derive(Debug, Clone, Copy)]
struct MonitoredWindow {
    handle: WindowHandle,
    original_style: ExStyle,
    topmost_applied: bool,
}

pub type WindowClosedCallback = Arc<dyn Fn(WindowHandle) + Send + Sync>;

pub struct WindowMonitor {
    host: Arc<dyn WindowHost>,
    opaque_alpha: u8,
    transparent_alpha: u8,
    always_on_top: bool,
    hide_taskbar: bool,
    poll_interval: Duration,
    running: AtomicBool,
    /// Также служит блокировкой записи прозрачности
    window: Mutex<Option<MonitoredWindow>>,
    generation: AtomicU64,
}

impl WindowMonitor {
    pub fn new(host: Arc<dyn WindowHost>, options: MonitorOptions) -> Self {
        Self {
            host,
            opaque_alpha: alpha_from_percent(options.hover_opacity),
            transparent_alpha: alpha_from_percent(options.away_transparency),
            always_on_top: options.always_on_top,
            hide_taskbar: options.hide_taskbar,
            poll_interval: options.poll_interval,
            running: AtomicBool::new(false),
            window: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn opaque_alpha(&self) -> u8 {
        self.opaque_alpha
    }

    pub fn transparent_alpha(&self) -> u8 {
        self.transparent_alpha
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn handle(&self) -> Option<WindowHandle> {
        self.window.lock().map(|w| w.handle)
    }

    /// Применить стили к окну и запустить опрос в UI-потоке.
    /// При ошибке монитор остаётся остановленным.
    pub fn start(
        self: &Arc<Self>,
        handle: WindowHandle,
        scheduler: Arc<dyn UiScheduler>,
        on_closed: WindowClosedCallback,
    ) -> Result<()> {
        self.activate(handle)?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let monitor = Arc::clone(self);

        schedule_repeating(scheduler, Duration::ZERO, self.poll_interval, move || {
            // Тики предыдущего запуска не должны продолжать опрос нового окна
            if monitor.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            match monitor.poll() {
                PollOutcome::Continue => true,
                PollOutcome::Stopped => false,
                PollOutcome::WindowClosed => {
                    on_closed(handle);
                    false
                }
            }
        });

        Ok(())
    }

    fn activate(&self, handle: WindowHandle) -> Result<()> {
        let mut window = self.window.lock();
        if self.running.load(Ordering::SeqCst) {
            return Err(AlterError::AlreadyMonitoring);
        }
        if !self.host.is_window(handle) {
            return Err(AlterError::StaleHandle(handle));
        }

        let original_style = self.host.ex_style(handle)?;
        let mut style = original_style | ExStyle::LAYERED;
        if self.hide_taskbar {
            style = style | ExStyle::TOOLWINDOW;
        }
        self.host.set_ex_style(handle, style)?;

        let mut topmost_applied = false;
        if self.always_on_top {
            if let Err(e) = self.host.set_topmost(handle, true) {
                if let Err(rollback) = self.host.set_ex_style(handle, original_style) {
                    warn!("Не удалось вернуть стиль окна {}: {}", handle, rollback);
                }
                return Err(e);
            }
            topmost_applied = true;
        }

        *window = Some(MonitoredWindow {
            handle,
            original_style,
            topmost_applied,
        });
        self.running.store(true, Ordering::SeqCst);

        info!(
            "Отслеживание окна {} запущено (стиль {} -> {}, прозрачность {}/{})",
            handle, original_style, style, self.opaque_alpha, self.transparent_alpha
        );
        Ok(())
    }

    /// Один тик опроса: курсор над окном - непрозрачно, иначе прозрачно
    pub fn poll(&self) -> PollOutcome {
        if !self.is_running() {
            return PollOutcome::Stopped;
        }
        let Some(handle) = self.handle() else {
            return PollOutcome::Stopped;
        };

        if !self.host.is_window(handle) {
            return self.mark_closed(handle);
        }

        let alpha = match (self.host.cursor_position(), self.host.window_rect(handle)) {
            (Ok(cursor), Ok(rect)) => {
                if rect.contains(cursor) {
                    self.opaque_alpha
                } else {
                    self.transparent_alpha
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                if e.is_stale_handle() {
                    return self.mark_closed(handle);
                }
                warn!("Тик опроса окна {} пропущен: {}", handle, e);
                return PollOutcome::Continue;
            }
        };

        let window = self.window.lock();
        if !self.is_running() || window.is_none() {
            return PollOutcome::Stopped;
        }
        match self.host.set_layered_alpha(handle, alpha) {
            Ok(()) => {
                trace_if_enabled!("Окно {}: прозрачность {}", handle, alpha);
                PollOutcome::Continue
            }
            Err(e) if e.is_stale_handle() => {
                drop(window);
                self.mark_closed(handle)
            }
            Err(e) => {
                warn!("Не удалось установить прозрачность окна {}: {}", handle, e);
                PollOutcome::Continue
            }
        }
    }

    fn mark_closed(&self, handle: WindowHandle) -> PollOutcome {
        let mut window = self.window.lock();
        if !self.running.swap(false, Ordering::SeqCst) {
            return PollOutcome::Stopped;
        }
        window.take();
        info!("Отслеживаемое окно {} закрыто", handle);
        PollOutcome::WindowClosed
    }

    /// Остановить отслеживание и вернуть окну исходный вид.
    /// Повторный вызов ничего не делает.
    pub fn stop(&self) {
        let mut guard = self.window.lock();
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(window) = guard.take() else {
            return;
        };

        if !self.host.is_window(window.handle) {
            debug!("Окно {} уже не существует, восстановление пропущено", window.handle);
            return;
        }

        let handle = window.handle;
        if window.topmost_applied {
            if let Err(e) = self.host.set_topmost(handle, false) {
                warn!("Не удалось снять режим поверх всех окон с {}: {}", handle, e);
            }
        }
        if let Err(e) = self.host.set_layered_alpha(handle, 255) {
            warn!("Не удалось вернуть непрозрачность окну {}: {}", handle, e);
        }
        if let Err(e) = self.host.set_ex_style(handle, window.original_style) {
            warn!("Не удалось вернуть исходный стиль окну {}: {}", handle, e);
        }
        if let Err(e) = self.host.refresh_frame(handle) {
            warn!("Не удалось обновить рамку окна {}: {}", handle, e);
        }

        info!("Отслеживание окна {} остановлено", handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Point, ScreenSize, WindowRect};
    use crate::services::host::{DryRunDesktop, HostFailure, SimulatedWindow};
    use crate::services::scheduler::ManualScheduler;
    use std::sync::atomic::AtomicUsize;

    const RECT: WindowRect = WindowRect::new(100, 100, 500, 400);

    fn options() -> MonitorOptions {
        MonitorOptions {
            hover_opacity: 100,
            away_transparency: 50,
            always_on_top: false,
            hide_taskbar: false,
            poll_interval: Duration::from_millis(100),
        }
    }

    fn setup(options: MonitorOptions) -> (Arc<DryRunDesktop>, WindowHandle, Arc<WindowMonitor>) {
        let desktop = Arc::new(DryRunDesktop::new(ScreenSize::new(1920, 1080)));
        let handle = desktop.add_window(SimulatedWindow::new("Target", RECT, 99));
        let monitor = Arc::new(WindowMonitor::new(desktop.clone(), options));
        (desktop, handle, monitor)
    }

    fn closed_counter() -> (WindowClosedCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        (
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            count,
        )
    }

    #[test]
    fn test_alpha_levels_are_rounded() {
        assert_eq!(alpha_from_percent(100), 255);
        assert_eq!(alpha_from_percent(50), 128);
        assert_eq!(alpha_from_percent(0), 0);
        assert_eq!(alpha_from_percent(20), 51);
    }

    #[test]
    fn test_cursor_entering_window_switches_to_opaque() {
        let (desktop, handle, monitor) = setup(options());
        let scheduler = ManualScheduler::new();
        let (on_closed, _) = closed_counter();

        desktop.set_cursor(Point::new(0, 0));
        monitor.start(handle, scheduler.clone(), on_closed).unwrap();
        scheduler.run_pending();
        assert_eq!(desktop.window(handle).unwrap().alpha, Some(128));

        desktop.set_cursor(Point::new(300, 200));
        scheduler.advance(Duration::from_millis(100));
        assert_eq!(desktop.window(handle).unwrap().alpha, Some(255));
    }

    #[test]
    fn test_edge_counts_as_inside() {
        let (desktop, handle, monitor) = setup(options());
        let scheduler = ManualScheduler::new();
        let (on_closed, _) = closed_counter();

        desktop.set_cursor(Point::new(RECT.left, 250));
        monitor.start(handle, scheduler.clone(), on_closed).unwrap();
        scheduler.run_pending();

        assert_eq!(desktop.window(handle).unwrap().alpha, Some(255));
    }

    #[test]
    fn test_start_applies_styles_and_stop_restores_them() {
        let (desktop, handle, monitor) = setup(MonitorOptions {
            always_on_top: true,
            hide_taskbar: true,
            ..options()
        });
        let original = desktop.window(handle).unwrap().ex_style;
        let scheduler = ManualScheduler::new();
        let (on_closed, _) = closed_counter();

        monitor.start(handle, scheduler.clone(), on_closed).unwrap();
        let applied = desktop.window(handle).unwrap();
        assert!(applied.ex_style.contains(ExStyle::LAYERED | ExStyle::TOOLWINDOW));
        assert!(applied.topmost);

        monitor.stop();
        let restored = desktop.window(handle).unwrap();
        assert_eq!(restored.ex_style, original);
        assert_eq!(restored.alpha, Some(255));
        assert!(!restored.topmost);
        assert_eq!(restored.frame_refreshes, 1);
        assert!(!monitor.is_running());

        // Повторная остановка ничего не меняет
        monitor.stop();
        assert_eq!(desktop.window(handle).unwrap().frame_refreshes, 1);
        scheduler.advance(Duration::from_secs(1));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_stop_when_never_started_is_noop() {
        let (desktop, handle, monitor) = setup(options());
        monitor.stop();
        assert_eq!(desktop.window(handle).unwrap().alpha, None);
        assert_eq!(monitor.poll(), PollOutcome::Stopped);
    }

    #[test]
    fn test_destroyed_window_notifies_exactly_once() {
        let (desktop, handle, monitor) = setup(options());
        let scheduler = ManualScheduler::new();
        let (on_closed, closed) = closed_counter();

        monitor.start(handle, scheduler.clone(), on_closed).unwrap();
        scheduler.run_pending();

        desktop.destroy_window(handle);
        scheduler.advance(Duration::from_millis(100));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(!monitor.is_running());

        scheduler.advance(Duration::from_secs(1));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.poll(), PollOutcome::Stopped);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_permission_failure_leaves_monitor_stopped() {
        let (desktop, handle, monitor) = setup(options());
        desktop.fail_style_changes(Some(HostFailure::PermissionDenied));
        let (on_closed, _) = closed_counter();

        let result = monitor.start(handle, ManualScheduler::new(), on_closed.clone());
        assert!(matches!(result, Err(AlterError::PermissionDenied(_))));
        assert!(!monitor.is_running());

        desktop.fail_style_changes(Some(HostFailure::Unknown));
        let result = monitor.start(handle, ManualScheduler::new(), on_closed);
        assert!(matches!(result, Err(AlterError::UnknownHost(_))));
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_second_start_is_rejected() {
        let (_, handle, monitor) = setup(options());
        let scheduler = ManualScheduler::new();
        let (on_closed, _) = closed_counter();

        monitor.start(handle, scheduler.clone(), on_closed.clone()).unwrap();
        let again = monitor.start(handle, scheduler, on_closed);
        assert!(matches!(again, Err(AlterError::AlreadyMonitoring)));
    }

    #[test]
    fn test_restart_does_not_resume_old_poll_chain() {
        let (desktop, handle, monitor) = setup(options());
        let scheduler = ManualScheduler::new();
        let (on_closed, _) = closed_counter();

        monitor.start(handle, scheduler.clone(), on_closed.clone()).unwrap();
        monitor.stop();
        monitor.start(handle, scheduler.clone(), on_closed).unwrap();

        // Старый нулевой тик и новый: старый завершается, новый перевзводится
        scheduler.run_pending();
        assert_eq!(scheduler.pending(), 1);
        assert!(desktop.alpha_history().len() >= 2);
    }
}
