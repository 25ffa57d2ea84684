use crate::events::{Action, TriggerConflict, WindowHandle};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlterError {
    #[error("Ошибка конфигурации: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Недостаточно прав для изменения стиля окна: {0}. Запустите программу от имени администратора")]
    PermissionDenied(String),

    #[error("Ошибка оконной системы: {0}")]
    UnknownHost(String),

    #[error("Окно {0} больше не существует")]
    StaleHandle(WindowHandle),

    #[error("Конфликт триггеров:\n{}", format_conflicts(.0))]
    TriggerConflict(Vec<TriggerConflict>),

    #[error("Не удалось установить триггер для '{action}': {reason}")]
    TriggerInstall { action: Action, reason: String },

    #[error("Неверная комбинация клавиш: {0}")]
    InvalidCombo(String),

    #[error("Нельзя отслеживать собственное окно программы")]
    CannotMonitorSelf,

    #[error("Отслеживание уже запущено")]
    AlreadyMonitoring,

    #[error("Окно не найдено: {0}")]
    WindowNotFound(String),

    #[error("Сервис недоступен: {0}")]
    ServiceUnavailable(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

fn format_conflicts(conflicts: &[TriggerConflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl AlterError {
    /// Ошибка затрагивает только устаревший дескриптор окна
    pub fn is_stale_handle(&self) -> bool {
        matches!(self, AlterError::StaleHandle(_))
    }
}

pub type Result<T> = std::result::Result<T, AlterError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! alter_error {
    (permission, $($arg:tt)*) => {
        $crate::error::AlterError::PermissionDenied(format!($($arg)*))
    };
    (host, $($arg:tt)*) => {
        $crate::error::AlterError::UnknownHost(format!($($arg)*))
    };
    (invalid_combo, $($arg:tt)*) => {
        $crate::error::AlterError::InvalidCombo(format!($($arg)*))
    };
    (service_unavailable, $($arg:tt)*) => {
        $crate::error::AlterError::ServiceUnavailable(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::AlterError::Internal(format!($($arg)*))
    };
}
