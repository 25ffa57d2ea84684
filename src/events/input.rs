use serde::{Deserialize, Serialize};
use std::fmt;

/// Кнопка мыши в сыром событии
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    X1,
    X2,
}

/// Состояние кнопки
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ButtonState {
    Pressed,
    Released,
}

/// Сырое событие указателя от хука ввода. Перемещения не передаются:
/// распознаватели жестов сами опрашивают позицию курсора
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawInputEvent {
    Button { button: MouseButton, state: ButtonState },
    /// Положительная дельта - прокрутка вверх
    Wheel { delta: i32 },
}

impl RawInputEvent {
    pub fn press(button: MouseButton) -> Self {
        Self::Button {
            button,
            state: ButtonState::Pressed,
        }
    }

    pub fn release(button: MouseButton) -> Self {
        Self::Button {
            button,
            state: ButtonState::Released,
        }
    }

    pub fn wheel(delta: i32) -> Self {
        Self::Wheel { delta }
    }
}

impl fmt::Display for RawInputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawInputEvent::Button { button, state } => write!(f, "{:?} {:?}", button, state),
            RawInputEvent::Wheel { delta } => write!(f, "wheel {}", delta),
        }
    }
}
