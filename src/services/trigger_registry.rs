//! Реестр триггеров: какие действия на что назначены, поиск конфликтов
//! и установка/снятие привязок у хука ввода.

use crate::error::{AlterError, Result};
use crate::events::{
    Action, GestureButton, MouseButtonTrigger, ScreenSize, SwipePattern, TriggerConflict,
    TriggerKey, TriggerSpec,
};
use crate::mappings::KeyCombo;
use crate::services::gesture::{GestureRecognizer, GestureSettings};
use crate::services::host::{ActionCallback, HotkeyHandle, InputHook, WindowHost};
use crate::services::scheduler::UiScheduler;
use crate::debug_if_enabled;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Таблицы, по которым диспетчер раздаёт события мыши
#[derive(Default)]
pub struct DispatchTable {
    mouse_buttons: DashMap<MouseButtonTrigger, ActionCallback>,
    recognizers: RwLock<Vec<Arc<GestureRecognizer>>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mouse_callback(&self, trigger: MouseButtonTrigger) -> Option<ActionCallback> {
        self.mouse_buttons.get(&trigger).map(|entry| Arc::clone(entry.value()))
    }

    /// Снимок живых распознавателей; блокировка не удерживается во время обработки
    pub fn recognizers(&self) -> Vec<Arc<GestureRecognizer>> {
        self.recognizers.read().clone()
    }

    pub fn bind_mouse_button(&self, trigger: MouseButtonTrigger, callback: ActionCallback) {
        self.mouse_buttons.insert(trigger, callback);
    }

    pub fn add_recognizer(&self, recognizer: Arc<GestureRecognizer>) {
        self.recognizers.write().push(recognizer);
    }

    /// Снятые распознаватели прерывают запись, даже если кнопка ещё зажата
    fn clear(&self) {
        self.mouse_buttons.clear();
        let removed = std::mem::take(&mut *self.recognizers.write());
        for recognizer in removed {
            recognizer.cancel();
        }
    }
}

/// Фактически установленная привязка действия
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Hotkey(String),
    MouseButton(MouseButtonTrigger),
    Gesture(GestureButton, SwipePattern),
}

/// Итог установки: ошибки изолированы по действиям
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<Action>,
    pub skipped: Vec<Action>,
    pub failures: Vec<AlterError>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct TriggerRegistry {
    specs: RwLock<BTreeMap<Action, TriggerSpec>>,
    callbacks: RwLock<BTreeMap<Action, ActionCallback>>,
    hotkeys: Mutex<Vec<(Action, HotkeyHandle)>>,
    bindings: RwLock<BTreeMap<Action, Binding>>,
    table: Arc<DispatchTable>,
    input: Arc<dyn InputHook>,
    host: Arc<dyn WindowHost>,
    scheduler: Arc<dyn UiScheduler>,
    gesture_settings: GestureSettings,
}

impl TriggerRegistry {
    pub fn new(
        input: Arc<dyn InputHook>,
        host: Arc<dyn WindowHost>,
        scheduler: Arc<dyn UiScheduler>,
        gesture_settings: GestureSettings,
    ) -> Self {
        Self {
            specs: RwLock::new(BTreeMap::new()),
            callbacks: RwLock::new(BTreeMap::new()),
            hotkeys: Mutex::new(Vec::new()),
            bindings: RwLock::new(BTreeMap::new()),
            table: Arc::new(DispatchTable::new()),
            input,
            host,
            scheduler,
            gesture_settings,
        }
    }

    pub fn dispatch_table(&self) -> Arc<DispatchTable> {
        Arc::clone(&self.table)
    }

    /// Назначить действию триггер; установка выполняется отдельно
    pub fn configure(&self, action: Action, spec: TriggerSpec) {
        debug_if_enabled!("Триггер '{}' -> {}", action, spec);
        self.specs.write().insert(action, spec);
    }

    pub fn spec(&self, action: Action) -> Option<TriggerSpec> {
        self.specs.read().get(&action).cloned()
    }

    /// Точка регистрации обработчика срабатывания действия
    pub fn set_callback(&self, action: Action, callback: ActionCallback) {
        self.callbacks.write().insert(action, callback);
    }

    /// Группы действий с одинаковым нормализованным триггером
    pub fn check_conflicts(&self) -> Vec<TriggerConflict> {
        let mut groups: BTreeMap<TriggerKey, Vec<Action>> = BTreeMap::new();

        for (action, spec) in self.specs.read().iter() {
            if let Some(key) = spec.key() {
                groups.entry(key).or_default().push(*action);
            }
        }

        groups
            .into_iter()
            .filter(|(_, actions)| actions.len() >= 2)
            .map(|(key, actions)| TriggerConflict { key, actions })
            .collect()
    }

    /// Установить привязки всех действий. Действия, требующие отслеживаемого
    /// окна, пропускаются при `monitoring_active == false`
    pub fn install_all(&self, monitoring_active: bool) -> InstallReport {
        if !self.hotkeys.lock().is_empty() || !self.bindings.read().is_empty() {
            debug_if_enabled!("Повторная установка без снятия, снимаем старые привязки");
            self.remove_all();
        }

        let specs = self.specs.read().clone();
        let callbacks = self.callbacks.read().clone();
        let mut report = InstallReport::default();
        let mut screen: Option<ScreenSize> = None;

        for (action, spec) in specs {
            if action.requires_monitoring() && !monitoring_active {
                report.skipped.push(action);
                continue;
            }

            let Some(callback) = callbacks.get(&action).cloned() else {
                report.failures.push(AlterError::TriggerInstall {
                    action,
                    reason: "обработчик действия не зарегистрирован".to_string(),
                });
                continue;
            };

            let binding = match spec {
                TriggerSpec::Keyboard { combo } if combo.trim().is_empty() => {
                    report.skipped.push(action);
                    continue;
                }
                TriggerSpec::Keyboard { combo } => match self.install_hotkey(action, &combo, callback) {
                    Ok(binding) => binding,
                    Err(e) => {
                        warn!("Не удалось назначить '{}' для '{}': {}", combo, action, e);
                        report.failures.push(AlterError::TriggerInstall {
                            action,
                            reason: e.to_string(),
                        });
                        continue;
                    }
                },
                TriggerSpec::MouseButton { button } => {
                    self.table.bind_mouse_button(button, callback);
                    Binding::MouseButton(button)
                }
                TriggerSpec::Gesture {
                    trigger_button,
                    pattern,
                } => {
                    let screen = *screen.get_or_insert_with(|| self.screen_size());
                    let recognizer = GestureRecognizer::new(
                        action,
                        trigger_button,
                        pattern,
                        callback,
                        Arc::clone(&self.host),
                        Arc::clone(&self.scheduler),
                        screen,
                        self.gesture_settings,
                    );
                    self.table.add_recognizer(Arc::new(recognizer));
                    Binding::Gesture(trigger_button, pattern)
                }
            };

            self.bindings.write().insert(action, binding);
            report.installed.push(action);
        }

        info!(
            "Триггеры установлены: {}, пропущено: {}, ошибок: {}",
            report.installed.len(),
            report.skipped.len(),
            report.failures.len()
        );
        report
    }

    fn install_hotkey(&self, action: Action, combo: &str, callback: ActionCallback) -> Result<Binding> {
        let parsed = KeyCombo::parse(combo)?;
        let handle = self.input.register_hotkey(&parsed, true, callback)?;
        self.hotkeys.lock().push((action, handle));
        Ok(Binding::Hotkey(parsed.to_string()))
    }

    fn screen_size(&self) -> ScreenSize {
        self.host.screen_size().unwrap_or_else(|e| {
            warn!("Не удалось получить размер экрана ({}), используется 1920x1080", e);
            ScreenSize::new(1920, 1080)
        })
    }

    /// Снять все привязки; повторный вызов ничего не делает
    pub fn remove_all(&self) {
        let hotkeys: Vec<(Action, HotkeyHandle)> = self.hotkeys.lock().drain(..).collect();
        for (action, handle) in hotkeys {
            if let Err(e) = self.input.unregister_hotkey(handle) {
                warn!("Не удалось снять горячую клавишу '{}': {}", action, e);
            }
        }
        self.table.clear();
        self.bindings.write().clear();
    }

    /// Снимок установленных привязок
    pub fn bindings(&self) -> BTreeMap<Action, Binding> {
        self.bindings.read().clone()
    }
}
