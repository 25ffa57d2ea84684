use super::input::MouseButton;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Действие, к которому привязывается триггер
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[serde(alias = "minimize_monitored_window")]
    MinimizeOrRestore,
    #[serde(alias = "close_window")]
    ForceClose,
    #[serde(alias = "hide_tray")]
    HideIndicator,
    #[serde(alias = "show_tray")]
    ShowIndicator,
    ExitApp,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::MinimizeOrRestore,
        Action::ForceClose,
        Action::HideIndicator,
        Action::ShowIndicator,
        Action::ExitApp,
    ];

    /// Действие имеет смысл только пока окно отслеживается
    pub fn requires_monitoring(&self) -> bool {
        matches!(self, Action::MinimizeOrRestore | Action::ForceClose)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::MinimizeOrRestore => "minimize_or_restore",
            Action::ForceClose => "force_close",
            Action::HideIndicator => "hide_indicator",
            Action::ShowIndicator => "show_indicator",
            Action::ExitApp => "exit_app",
        }
    }

    pub fn default_combo(&self) -> &'static str {
        match self {
            Action::MinimizeOrRestore => "ctrl+alt+m",
            Action::ForceClose => "ctrl+alt+c",
            Action::HideIndicator => "ctrl+alt+h",
            Action::ShowIndicator => "ctrl+alt+s",
            Action::ExitApp => "ctrl+alt+x",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Кнопка или колесо мыши как самостоятельный триггер
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButtonTrigger {
    MiddleClick,
    WheelUp,
    WheelDown,
}

impl fmt::Display for MouseButtonTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MouseButtonTrigger::MiddleClick => "middle_click",
            MouseButtonTrigger::WheelUp => "wheel_up",
            MouseButtonTrigger::WheelDown => "wheel_down",
        };
        f.write_str(name)
    }
}

/// Кнопка, удержание которой записывает жест
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureButton {
    Middle,
    Right,
}

impl GestureButton {
    pub fn mouse_button(&self) -> MouseButton {
        match self {
            GestureButton::Middle => MouseButton::Middle,
            GestureButton::Right => MouseButton::Right,
        }
    }
}

impl fmt::Display for GestureButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GestureButton::Middle => f.write_str("middle"),
            GestureButton::Right => f.write_str("right"),
        }
    }
}

/// Направление жеста-свайпа
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwipePattern {
    SwipeRight,
    SwipeLeft,
    SwipeUp,
    SwipeDown,
}

impl fmt::Display for SwipePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SwipePattern::SwipeRight => "swipe_right",
            SwipePattern::SwipeLeft => "swipe_left",
            SwipePattern::SwipeUp => "swipe_up",
            SwipePattern::SwipeDown => "swipe_down",
        };
        f.write_str(name)
    }
}

/// Настроенный триггер одного действия
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TriggerSpec {
    Keyboard {
        combo: String,
    },
    MouseButton {
        button: MouseButtonTrigger,
    },
    Gesture {
        trigger_button: GestureButton,
        pattern: SwipePattern,
    },
}

impl TriggerSpec {
    pub fn keyboard(combo: impl Into<String>) -> Self {
        TriggerSpec::Keyboard { combo: combo.into() }
    }

    pub fn mouse_button(button: MouseButtonTrigger) -> Self {
        TriggerSpec::MouseButton { button }
    }

    pub fn gesture(trigger_button: GestureButton, pattern: SwipePattern) -> Self {
        TriggerSpec::Gesture {
            trigger_button,
            pattern,
        }
    }

    /// Нормализованный ключ для поиска конфликтов.
    /// Пустая комбинация клавиш означает "не назначено" и ключа не имеет.
    pub fn key(&self) -> Option<TriggerKey> {
        match self {
            TriggerSpec::Keyboard { combo } if combo.trim().is_empty() => None,
            TriggerSpec::Keyboard { combo } => Some(TriggerKey::Keyboard(combo.clone())),
            TriggerSpec::MouseButton { button } => Some(TriggerKey::MouseButton(*button)),
            TriggerSpec::Gesture {
                trigger_button,
                pattern,
            } => Some(TriggerKey::Gesture(*trigger_button, *pattern)),
        }
    }
}

impl fmt::Display for TriggerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key() {
            Some(key) => write!(f, "{}", key),
            None => write!(f, "keyboard <none>"),
        }
    }
}

/// Пара (категория, нормализованное значение) триггера
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TriggerKey {
    Keyboard(String),
    MouseButton(MouseButtonTrigger),
    Gesture(GestureButton, SwipePattern),
}

impl TriggerKey {
    pub fn category(&self) -> &'static str {
        match self {
            TriggerKey::Keyboard(_) => "keyboard",
            TriggerKey::MouseButton(_) => "mouse_button",
            TriggerKey::Gesture(..) => "mouse_gesture",
        }
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKey::Keyboard(combo) => write!(f, "{} '{}'", self.category(), combo),
            TriggerKey::MouseButton(button) => write!(f, "{} '{}'", self.category(), button),
            TriggerKey::Gesture(button, pattern) => {
                write!(f, "{} '{} + {}'", self.category(), button, pattern)
            }
        }
    }
}

/// Конфликт: один и тот же триггер назначен нескольким действиям
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerConflict {
    pub key: TriggerKey,
    pub actions: Vec<Action>,
}

impl fmt::Display for TriggerConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actions: Vec<String> = self.actions.iter().map(|a| format!("\"{}\"", a)).collect();
        write!(f, "- {} используется для {}", self.key, actions.join(", "))
    }
}
