pub mod input;
pub mod trigger;
pub mod window;

pub use input::{ButtonState, MouseButton, RawInputEvent};
pub use trigger::{
    Action, GestureButton, MouseButtonTrigger, SwipePattern, TriggerConflict, TriggerKey,
    TriggerSpec,
};
pub use window::{ExStyle, Point, ScreenSize, WindowCommand, WindowHandle, WindowInfo, WindowRect};

/// Уведомления для внешнего слоя (UI, трей, main)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Отслеживаемое окно исчезло (не путать с остановкой по запросу)
    WindowClosed { handle: WindowHandle },
    TriggerFired(Action),
    IndicatorChanged { visible: bool },
    InstallFailed { action: Action, reason: String },
    ExitRequested,
}
