//! Контроллер приложения: связывает реестр триггеров, диспетчер событий мыши
//! и монитор окна, выполняет действия и сообщает о событиях внешнему слою.

use crate::config::Config;
use crate::error::{AlterError, Result};
use crate::events::{Action, Notification, TriggerSpec, WindowCommand, WindowHandle, WindowInfo};
use crate::services::dispatcher::EventDispatcher;
use crate::services::gesture::GestureSettings;
use crate::services::host::{InputHook, WindowHost};
use crate::services::scheduler::UiScheduler;
use crate::services::trigger_registry::{InstallReport, TriggerRegistry};
use crate::services::window_monitor::{MonitorOptions, WindowMonitor};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

/// Пауза между остановкой отслеживания и отправкой WM_CLOSE
const FORCE_CLOSE_DELAY: Duration = Duration::from_millis(100);
/// Сколько ждать закрытия окна до завершения процесса
const FORCE_KILL_GRACE: Duration = Duration::from_millis(1500);

pub struct Controller {
    config: Arc<Config>,
    host: Arc<dyn WindowHost>,
    input: Arc<dyn InputHook>,
    scheduler: Arc<dyn UiScheduler>,
    registry: TriggerRegistry,
    dispatcher: Arc<EventDispatcher>,
    monitor: Mutex<Option<Arc<WindowMonitor>>>,
    indicator_visible: AtomicBool,
    notifications: UnboundedSender<Notification>,
    started: AtomicBool,
    shut_down: AtomicBool,
    own_pid: u32,
    this: Weak<Controller>,
}

impl Controller {
    pub fn new(
        config: Arc<Config>,
        host: Arc<dyn WindowHost>,
        input: Arc<dyn InputHook>,
        scheduler: Arc<dyn UiScheduler>,
    ) -> (Arc<Self>, UnboundedReceiver<Notification>) {
        let (notifications, receiver) = unbounded_channel();

        let controller = Arc::new_cyclic(|this: &Weak<Controller>| {
            let registry = TriggerRegistry::new(
                Arc::clone(&input),
                Arc::clone(&host),
                Arc::clone(&scheduler),
                GestureSettings::from(&config.input),
            );

            for action in Action::ALL {
                registry.configure(action, config.trigger_spec(action));

                let weak = this.clone();
                registry.set_callback(
                    action,
                    Arc::new(move || {
                        if let Some(controller) = weak.upgrade() {
                            controller.schedule_action(action);
                        }
                    }),
                );
            }

            let dispatcher = Arc::new(EventDispatcher::new(registry.dispatch_table()));

            Controller {
                config,
                host,
                input,
                scheduler,
                registry,
                dispatcher,
                monitor: Mutex::new(None),
                indicator_visible: AtomicBool::new(true),
                notifications,
                started: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                own_pid: std::process::id(),
                this: this.clone(),
            }
        });

        (controller, receiver)
    }

    /// Запустить хук ввода, разбор очереди событий и установить триггеры
    pub fn start(&self) -> Result<()> {
        if self.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        // При конфликте ничего не запускается, повторный start возможен
        let conflicts = self.registry.check_conflicts();
        if !conflicts.is_empty() {
            return Err(AlterError::TriggerConflict(conflicts));
        }

        self.input.start(self.dispatcher.sink())?;
        self.started.store(true, Ordering::SeqCst);
        self.dispatcher
            .start(Arc::clone(&self.scheduler), self.config.input.dispatch_interval());
        self.reinstall(false);

        info!("Контроллер запущен");
        Ok(())
    }

    /// Видимые окна с заголовком, кроме окон самой программы
    pub fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        Ok(self
            .host
            .enumerate_windows()?
            .into_iter()
            .filter(|w| w.pid != Some(self.own_pid))
            .collect())
    }

    /// Точное совпадение заголовка, иначе первое вхождение без учёта регистра
    pub fn find_window(&self, title: &str) -> Result<WindowInfo> {
        let windows = self.list_windows()?;

        if let Some(exact) = windows.iter().find(|w| w.title == title) {
            return Ok(exact.clone());
        }

        windows
            .into_iter()
            .find(|w| w.matches_pattern(title))
            .ok_or_else(|| AlterError::WindowNotFound(title.to_string()))
    }

    /// Окно верхнего уровня под курсором
    pub fn select_window_at_cursor(&self) -> Result<WindowInfo> {
        let cursor = self.host.cursor_position()?;
        let handle = self
            .host
            .window_at(cursor)
            .ok_or_else(|| AlterError::WindowNotFound(format!("под курсором {}", cursor)))?;

        if self.is_self_window(handle) {
            return Err(AlterError::CannotMonitorSelf);
        }

        let title = self.host.window_title(handle)?;
        let mut info = WindowInfo::new(handle, title);
        if let Some(pid) = self.host.window_process_id(handle) {
            info = info.with_pid(pid);
        }
        Ok(info)
    }

    fn is_self_window(&self, handle: WindowHandle) -> bool {
        self.host.window_process_id(handle) == Some(self.own_pid)
    }

    pub fn start_monitoring(&self, handle: WindowHandle) -> Result<()> {
        let conflicts = self.registry.check_conflicts();
        if !conflicts.is_empty() {
            return Err(AlterError::TriggerConflict(conflicts));
        }

        let mut slot = self.monitor.lock();
        if slot.as_ref().is_some_and(|m| m.is_running()) {
            return Err(AlterError::AlreadyMonitoring);
        }
        if !self.host.is_window(handle) {
            return Err(AlterError::StaleHandle(handle));
        }
        if self.is_self_window(handle) {
            return Err(AlterError::CannotMonitorSelf);
        }

        let monitor = Arc::new(WindowMonitor::new(
            Arc::clone(&self.host),
            MonitorOptions::from(&self.config.monitor),
        ));

        let weak = self.this.clone();
        monitor.start(
            handle,
            Arc::clone(&self.scheduler),
            Arc::new(move |closed| {
                if let Some(controller) = weak.upgrade() {
                    controller.handle_window_closed(closed);
                }
            }),
        )?;

        *slot = Some(monitor);
        drop(slot);

        self.reinstall(true);
        Ok(())
    }

    pub fn stop_monitoring(&self) {
        let monitor = self.monitor.lock().take();
        if let Some(monitor) = monitor {
            monitor.stop();
            self.reinstall(false);
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.lock().as_ref().is_some_and(|m| m.is_running())
    }

    pub fn monitored_window(&self) -> Option<WindowHandle> {
        self.monitor.lock().as_ref().and_then(|m| m.handle())
    }

    pub fn indicator_visible(&self) -> bool {
        self.indicator_visible.load(Ordering::SeqCst)
    }

    /// Переназначить триггер действия. При конфликте установка не выполняется,
    /// ранее установленные привязки сохраняются
    pub fn configure_trigger(&self, action: Action, spec: TriggerSpec) -> Result<InstallReport> {
        self.registry.configure(action, spec);

        let conflicts = self.registry.check_conflicts();
        if !conflicts.is_empty() {
            warn!("Конфликт триггеров, установка отложена");
            return Err(AlterError::TriggerConflict(conflicts));
        }

        Ok(self.reinstall(self.is_monitoring()))
    }

    fn reinstall(&self, monitoring_active: bool) -> InstallReport {
        self.registry.remove_all();
        let report = self.registry.install_all(monitoring_active);

        for failure in &report.failures {
            if let AlterError::TriggerInstall { action, reason } = failure {
                self.notify(Notification::InstallFailed {
                    action: *action,
                    reason: reason.clone(),
                });
            }
        }
        report
    }

    fn handle_window_closed(&self, handle: WindowHandle) {
        {
            let mut slot = self.monitor.lock();
            if slot.as_ref().is_some_and(|m| !m.is_running()) {
                slot.take();
            }
        }
        self.reinstall(false);
        self.notify(Notification::WindowClosed { handle });
    }

    fn notify(&self, notification: Notification) {
        // Получатель мог уже завершиться при выходе
        let _ = self.notifications.send(notification);
    }

    fn schedule_action(&self, action: Action) {
        let weak = self.this.clone();
        self.scheduler.schedule_now(Box::new(move || {
            if let Some(controller) = weak.upgrade() {
                controller.run_action(action);
            }
        }));
    }

    /// Выполнение действия; всегда в UI-потоке
    pub fn run_action(&self, action: Action) {
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }
        info!("Сработал триггер: {}", action);
        self.notify(Notification::TriggerFired(action));

        match action {
            Action::MinimizeOrRestore => self.minimize_or_restore(),
            Action::ForceClose => self.force_close(),
            Action::HideIndicator => self.set_indicator(false),
            Action::ShowIndicator => self.set_indicator(true),
            Action::ExitApp => {
                self.shutdown();
                self.notify(Notification::ExitRequested);
            }
        }
    }

    fn minimize_or_restore(&self) {
        let Some(handle) = self.monitored_window() else {
            return;
        };

        let command = match self.host.is_minimized(handle) {
            Ok(true) => WindowCommand::Restore,
            Ok(false) => WindowCommand::Minimize,
            Err(e) => {
                warn!("Окно {} недоступно: {}", handle, e);
                return;
            }
        };

        if let Err(e) = self.host.post_command(handle, command) {
            warn!("Не удалось отправить {:?} окну {}: {}", command, handle, e);
        }
    }

    fn force_close(&self) {
        let Some(handle) = self.monitored_window() else {
            return;
        };
        let pid = self.host.window_process_id(handle);

        self.stop_monitoring();
        info!("Принудительное закрытие окна {} (pid {:?})", handle, pid);

        let host = Arc::clone(&self.host);
        let scheduler = Arc::clone(&self.scheduler);
        self.scheduler.schedule_after(
            FORCE_CLOSE_DELAY,
            Box::new(move || {
                if !host.is_window(handle) {
                    return;
                }
                if let Err(e) = host.post_command(handle, WindowCommand::Close) {
                    warn!("Не удалось отправить WM_CLOSE окну {}: {}", handle, e);
                }

                let Some(pid) = pid else {
                    return;
                };
                let killer = Arc::clone(&host);
                scheduler.schedule_after(
                    FORCE_KILL_GRACE,
                    Box::new(move || {
                        if !killer.is_window(handle) {
                            return;
                        }
                        warn!("Окно {} не закрылось, завершаем процесс {}", handle, pid);
                        if let Err(e) = killer.terminate_process(pid) {
                            error!("Не удалось завершить процесс {}: {}", pid, e);
                        }
                    }),
                );
            }),
        );
    }

    fn set_indicator(&self, visible: bool) {
        if self.indicator_visible.swap(visible, Ordering::SeqCst) != visible {
            self.notify(Notification::IndicatorChanged { visible });
        }
    }

    /// Остановить всё; повторный вызов ничего не делает
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Остановка контроллера");

        let monitor = self.monitor.lock().take();
        if let Some(monitor) = monitor {
            monitor.stop();
        }
        self.registry.remove_all();
        self.dispatcher.stop();
        if let Err(e) = self.input.stop() {
            warn!("Ошибка при остановке хука ввода: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{MouseButtonTrigger, Point, RawInputEvent, WindowRect};
    use crate::services::host::{DryRunDesktop, DryRunInputHook, SimulatedWindow};
    use crate::services::scheduler::ManualScheduler;

    struct Fixture {
        desktop: Arc<DryRunDesktop>,
        hook: Arc<DryRunInputHook>,
        scheduler: Arc<ManualScheduler>,
        controller: Arc<Controller>,
        notifications: UnboundedReceiver<Notification>,
        target: WindowHandle,
    }

    impl Fixture {
        fn drain_notifications(&mut self) -> Vec<Notification> {
            let mut out = Vec::new();
            while let Ok(n) = self.notifications.try_recv() {
                out.push(n);
            }
            out
        }
    }

    fn fixture_with(config: Config) -> Fixture {
        let desktop = Arc::new(DryRunDesktop::new(crate::events::ScreenSize::new(1920, 1080)));
        let target = desktop.add_window(SimulatedWindow::new(
            "Notepad - notes.txt",
            WindowRect::new(100, 100, 800, 600),
            4242,
        ));
        desktop.add_window(SimulatedWindow::new(
            "Hover Alter",
            WindowRect::new(1000, 100, 1400, 500),
            std::process::id(),
        ));

        let hook = Arc::new(DryRunInputHook::new());
        let scheduler = ManualScheduler::new();
        let (controller, notifications) = Controller::new(
            Arc::new(config),
            desktop.clone(),
            hook.clone(),
            scheduler.clone(),
        );
        controller.start().unwrap();

        Fixture {
            desktop,
            hook,
            scheduler,
            controller,
            notifications,
            target,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Config::default())
    }

    #[test]
    fn test_start_installs_only_global_actions() {
        let f = fixture();
        assert!(f.hook.is_running());
        assert_eq!(f.hook.registered_combos(), vec!["ctrl+alt+h", "ctrl+alt+s", "ctrl+alt+x"]);
    }

    #[test]
    fn test_start_with_conflict_leaves_controller_restartable() {
        let mut config = Config::default();
        config
            .triggers
            .insert(Action::ExitApp, crate::config::TriggerSettings::keyboard("ctrl+alt+h"));

        let desktop = Arc::new(DryRunDesktop::new(crate::events::ScreenSize::new(1920, 1080)));
        let hook = Arc::new(DryRunInputHook::new());
        let scheduler = ManualScheduler::new();
        let (controller, _notifications) =
            Controller::new(Arc::new(config), desktop, hook.clone(), scheduler.clone());

        assert!(matches!(controller.start(), Err(AlterError::TriggerConflict(_))));
        assert!(!hook.is_running());
        assert_eq!(scheduler.pending(), 0);
        assert!(hook.registered_combos().is_empty());

        controller.registry.configure(Action::ExitApp, TriggerSpec::keyboard("ctrl+alt+x"));
        controller.start().unwrap();

        assert!(hook.is_running());
        assert_eq!(hook.registered_combos(), vec!["ctrl+alt+h", "ctrl+alt+s", "ctrl+alt+x"]);
    }

    #[test]
    fn test_hotkey_runs_action_on_ui_thread() {
        let mut f = fixture();

        assert!(f.hook.press_hotkey("ctrl+alt+h"));
        assert!(f.controller.indicator_visible());

        f.scheduler.run_pending();
        assert!(!f.controller.indicator_visible());
        assert_eq!(
            f.drain_notifications(),
            vec![
                Notification::TriggerFired(Action::HideIndicator),
                Notification::IndicatorChanged { visible: false },
            ]
        );
    }

    #[test]
    fn test_list_and_find_windows_skip_own_process() {
        let f = fixture();

        let titles: Vec<String> = f.controller.list_windows().unwrap().into_iter().map(|w| w.title).collect();
        assert_eq!(titles, vec!["Notepad - notes.txt"]);

        assert_eq!(f.controller.find_window("Notepad - notes.txt").unwrap().handle, f.target);
        assert_eq!(f.controller.find_window("NOTEPAD").unwrap().handle, f.target);
        assert!(matches!(f.controller.find_window("Hover Alter"), Err(AlterError::WindowNotFound(_))));
    }

    #[test]
    fn test_select_window_at_cursor() {
        let f = fixture();

        f.desktop.set_cursor(Point::new(200, 200));
        assert_eq!(f.controller.select_window_at_cursor().unwrap().handle, f.target);

        f.desktop.set_cursor(Point::new(1200, 200));
        assert!(matches!(f.controller.select_window_at_cursor(), Err(AlterError::CannotMonitorSelf)));

        f.desktop.set_cursor(Point::new(1800, 1000));
        assert!(matches!(f.controller.select_window_at_cursor(), Err(AlterError::WindowNotFound(_))));
    }

    #[test]
    fn test_start_monitoring_guards() {
        let f = fixture();
        let own = f.controller.host.window_at(Point::new(1200, 200)).unwrap();

        assert!(matches!(f.controller.start_monitoring(own), Err(AlterError::CannotMonitorSelf)));
        assert!(matches!(
            f.controller.start_monitoring(WindowHandle(0xDEAD)),
            Err(AlterError::StaleHandle(_))
        ));

        f.controller.start_monitoring(f.target).unwrap();
        assert!(f.controller.is_monitoring());
        assert_eq!(f.hook.registered_combos().len(), 5);
        assert!(matches!(f.controller.start_monitoring(f.target), Err(AlterError::AlreadyMonitoring)));

        f.controller.stop_monitoring();
        assert!(!f.controller.is_monitoring());
        assert_eq!(f.hook.registered_combos().len(), 3);
    }

    #[test]
    fn test_conflicting_configuration_blocks_monitoring() {
        let f = fixture();

        let result = f.controller.configure_trigger(Action::ExitApp, TriggerSpec::keyboard("ctrl+alt+h"));
        assert!(matches!(result, Err(AlterError::TriggerConflict(ref c)) if c.len() == 1));
        // Прежние привязки остаются установленными
        assert_eq!(f.hook.registered_combos(), vec!["ctrl+alt+h", "ctrl+alt+s", "ctrl+alt+x"]);

        assert!(matches!(f.controller.start_monitoring(f.target), Err(AlterError::TriggerConflict(_))));

        f.controller
            .configure_trigger(Action::ExitApp, TriggerSpec::keyboard("ctrl+alt+q"))
            .unwrap();
        f.controller.start_monitoring(f.target).unwrap();
    }

    #[test]
    fn test_minimize_toggles_between_minimize_and_restore() {
        let f = fixture();
        f.controller.start_monitoring(f.target).unwrap();

        f.hook.press_hotkey("ctrl+alt+m");
        f.scheduler.run_pending();
        assert!(f.desktop.window(f.target).unwrap().minimized);

        f.hook.press_hotkey("ctrl+alt+m");
        f.scheduler.run_pending();
        assert!(!f.desktop.window(f.target).unwrap().minimized);
        assert_eq!(
            f.desktop.posted_commands(),
            vec![(f.target, WindowCommand::Minimize), (f.target, WindowCommand::Restore)]
        );
    }

    #[test]
    fn test_force_close_kills_unresponsive_process() {
        let f = fixture();
        f.desktop.update_window(f.target, |w| w.responds_to_close = false);
        f.controller.start_monitoring(f.target).unwrap();

        f.hook.press_hotkey("ctrl+alt+c");
        f.scheduler.run_pending();
        assert!(!f.controller.is_monitoring());
        assert!(f.desktop.posted_commands().is_empty());

        f.scheduler.advance(FORCE_CLOSE_DELAY);
        assert_eq!(f.desktop.posted_commands(), vec![(f.target, WindowCommand::Close)]);
        assert!(f.desktop.terminated_processes().is_empty());

        f.scheduler.advance(FORCE_KILL_GRACE);
        assert_eq!(f.desktop.terminated_processes(), vec![4242]);
        assert!(!f.desktop.is_window(f.target));
    }

    #[test]
    fn test_force_close_spares_process_that_closed() {
        let f = fixture();
        f.controller.start_monitoring(f.target).unwrap();

        f.hook.press_hotkey("ctrl+alt+c");
        f.scheduler.run_pending();
        f.scheduler.advance(FORCE_CLOSE_DELAY + FORCE_KILL_GRACE);

        assert!(!f.desktop.is_window(f.target));
        assert!(f.desktop.terminated_processes().is_empty());
    }

    #[test]
    fn test_external_close_notifies_and_drops_monitor_only_triggers() {
        let mut f = fixture();
        f.controller.start_monitoring(f.target).unwrap();
        f.scheduler.run_pending();

        f.desktop.destroy_window(f.target);
        f.scheduler.advance(Duration::from_millis(100));

        assert!(!f.controller.is_monitoring());
        assert_eq!(f.hook.registered_combos().len(), 3);
        let closed: Vec<_> = f
            .drain_notifications()
            .into_iter()
            .filter(|n| matches!(n, Notification::WindowClosed { .. }))
            .collect();
        assert_eq!(closed, vec![Notification::WindowClosed { handle: f.target }]);
    }

    #[test]
    fn test_mouse_wheel_trigger_through_dispatcher() {
        let mut config = Config::default();
        config
            .triggers
            .insert(Action::ShowIndicator, crate::config::TriggerSettings {
                trigger_type: crate::config::TriggerType::MouseButton,
                keyboard: String::new(),
                mouse_button: MouseButtonTrigger::WheelUp,
                gesture_trigger: crate::events::GestureButton::Right,
                gesture_pattern: crate::events::SwipePattern::SwipeRight,
            });
        let mut f = fixture_with(config);

        f.controller.run_action(Action::HideIndicator);
        f.drain_notifications();

        assert!(f.hook.inject(RawInputEvent::wheel(120)));
        f.scheduler.advance(Duration::from_millis(20));
        f.scheduler.run_pending();

        assert!(f.controller.indicator_visible());
        assert!(f
            .drain_notifications()
            .contains(&Notification::IndicatorChanged { visible: true }));
    }

    #[test]
    fn test_install_failure_is_reported() {
        let mut f = fixture();
        f.hook.reject_combo("ctrl+alt+q");

        let report = f
            .controller
            .configure_trigger(Action::ExitApp, TriggerSpec::keyboard("ctrl+alt+q"))
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert!(f.drain_notifications().iter().any(
            |n| matches!(n, Notification::InstallFailed { action: Action::ExitApp, .. })
        ));
        assert_eq!(f.hook.registered_combos(), vec!["ctrl+alt+h", "ctrl+alt+s"]);
    }

    #[test]
    fn test_exit_shuts_everything_down_once() {
        let mut f = fixture();
        f.controller.start_monitoring(f.target).unwrap();
        f.scheduler.run_pending();

        f.hook.press_hotkey("ctrl+alt+x");
        f.scheduler.run_pending();

        assert!(!f.hook.is_running());
        assert!(f.hook.registered_combos().is_empty());
        assert_eq!(f.desktop.window(f.target).unwrap().alpha, Some(255));
        assert!(f.drain_notifications().contains(&Notification::ExitRequested));

        f.controller.shutdown();
        f.controller.run_action(Action::ShowIndicator);
        assert!(f.drain_notifications().is_empty());
    }
}
