use crate::events::{Action, GestureButton, MouseButtonTrigger, SwipePattern, TriggerSpec};
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub logging: LoggingConfig,
    pub monitor: MonitorConfig,
    pub input: InputConfig,
    #[serde(default)]
    pub triggers: BTreeMap<Action, TriggerSettings>,
    /// Заголовок окна, которое отслеживалось при прошлом запуске
    #[serde(default)]
    pub last_window_title: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Непрозрачность под курсором, проценты 0..=100
    pub hover_opacity: u8,
    /// Непрозрачность вне курсора, проценты 0..=100
    pub away_transparency: u8,
    pub always_on_top: bool,
    pub hide_taskbar: bool,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    pub dispatch_interval_ms: u64,
    pub gesture_sample_interval_ms: u64,
    pub gesture_join_timeout_ms: u64,
    pub gesture_min_points: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Keyboard,
    MouseButton,
    MouseGesture,
}

/// Триггер действия в том виде, в каком он хранится в файле настроек.
/// Хранятся значения всех трёх вариантов, активный выбирается полем `type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TriggerSettings {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub keyboard: String,
    #[serde(default = "default_mouse_button")]
    pub mouse_button: MouseButtonTrigger,
    #[serde(default = "default_gesture_trigger")]
    pub gesture_trigger: GestureButton,
    #[serde(default = "default_gesture_pattern")]
    pub gesture_pattern: SwipePattern,
}

fn default_mouse_button() -> MouseButtonTrigger {
    MouseButtonTrigger::MiddleClick
}

fn default_gesture_trigger() -> GestureButton {
    GestureButton::Right
}

fn default_gesture_pattern() -> SwipePattern {
    SwipePattern::SwipeRight
}

impl TriggerSettings {
    pub fn keyboard(combo: &str) -> Self {
        Self {
            trigger_type: TriggerType::Keyboard,
            keyboard: combo.to_string(),
            mouse_button: default_mouse_button(),
            gesture_trigger: default_gesture_trigger(),
            gesture_pattern: default_gesture_pattern(),
        }
    }

    pub fn to_spec(&self) -> TriggerSpec {
        match self.trigger_type {
            TriggerType::Keyboard => TriggerSpec::keyboard(self.keyboard.trim()),
            TriggerType::MouseButton => TriggerSpec::mouse_button(self.mouse_button),
            TriggerType::MouseGesture => {
                TriggerSpec::gesture(self.gesture_trigger, self.gesture_pattern)
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                filter: "hover_alter=info".to_string(),
            },
            monitor: MonitorConfig {
                hover_opacity: 100,
                away_transparency: 50,
                always_on_top: false,
                hide_taskbar: false,
                poll_interval_ms: 100,
            },
            input: InputConfig {
                dispatch_interval_ms: 20,
                gesture_sample_interval_ms: 10,
                gesture_join_timeout_ms: 500,
                gesture_min_points: 5,
            },
            triggers: Action::ALL
                .iter()
                .map(|action| (*action, TriggerSettings::keyboard(action.default_combo())))
                .collect(),
            last_window_title: None,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        // Триггеры по умолчанию подставляются после извлечения: иначе устаревшие
        // имена действий из файла (close_window) смешались бы с новыми ключами
        let mut defaults = Config::default();
        defaults.triggers.clear();

        let figment = Figment::from(Serialized::defaults(defaults))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("ALTER_").split("__"));

        let mut config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.fill_missing_triggers();
        config.validate()?;

        Ok(config)
    }

    /// Действия без записи в файле получают комбинацию по умолчанию
    fn fill_missing_triggers(&mut self) {
        for action in Action::ALL {
            self.triggers
                .entry(action)
                .or_insert_with(|| TriggerSettings::keyboard(action.default_combo()));
        }
    }

    pub fn validate(&self) -> Result<()> {
        // Валидация настроек логирования
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        // Валидация прозрачности
        if self.monitor.hover_opacity > 100 {
            anyhow::bail!("hover_opacity должно быть в диапазоне 0..=100");
        }
        if self.monitor.away_transparency > 100 {
            anyhow::bail!("away_transparency должно быть в диапазоне 0..=100");
        }

        if self.monitor.poll_interval_ms < 10 {
            anyhow::bail!("poll_interval_ms должно быть минимум 10");
        }

        if self.input.dispatch_interval_ms == 0 {
            anyhow::bail!("dispatch_interval_ms должно быть больше 0");
        }
        if self.input.gesture_sample_interval_ms == 0 {
            anyhow::bail!("gesture_sample_interval_ms должно быть больше 0");
        }

        Ok(())
    }

    /// Текущий триггер действия (с учётом значения по умолчанию)
    pub fn trigger_spec(&self, action: Action) -> TriggerSpec {
        self.triggers
            .get(&action)
            .map(TriggerSettings::to_spec)
            .unwrap_or_else(|| TriggerSpec::keyboard(action.default_combo()))
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl InputConfig {
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    pub fn gesture_sample_interval(&self) -> Duration {
        Duration::from_millis(self.gesture_sample_interval_ms)
    }

    pub fn gesture_join_timeout(&self) -> Duration {
        Duration::from_millis(self.gesture_join_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.triggers.len(), Action::ALL.len());
    }

    #[test]
    fn test_default_triggers_are_keyboard_combos() {
        let config = Config::default();

        assert_eq!(
            config.trigger_spec(Action::MinimizeOrRestore),
            TriggerSpec::keyboard("ctrl+alt+m")
        );
        assert_eq!(config.trigger_spec(Action::ExitApp), TriggerSpec::keyboard("ctrl+alt+x"));
    }

    #[test]
    fn test_validation_rejects_out_of_range_opacity() {
        let mut config = Config::default();
        config.monitor.away_transparency = 150;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitor.poll_interval_ms = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_with_legacy_action_names() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
last_window_title = "Notepad"

[monitor]
hover_opacity = 90
away_transparency = 30
always_on_top = true
hide_taskbar = false
poll_interval_ms = 100

[triggers.close_window]
type = "mouse_gesture"
gesture_trigger = "middle"
gesture_pattern = "swipe_down"

[triggers.exit_app]
type = "mouse_button"
mouse_button = "wheel_up"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.monitor.hover_opacity, 90);
        assert!(config.monitor.always_on_top);
        assert_eq!(config.last_window_title.as_deref(), Some("Notepad"));
        assert_eq!(
            config.trigger_spec(Action::ForceClose),
            TriggerSpec::gesture(GestureButton::Middle, SwipePattern::SwipeDown)
        );
        assert_eq!(
            config.trigger_spec(Action::ExitApp),
            TriggerSpec::mouse_button(MouseButtonTrigger::WheelUp)
        );
        // Не указанные в файле действия сохраняют значения по умолчанию
        assert_eq!(
            config.trigger_spec(Action::ShowIndicator),
            TriggerSpec::keyboard("ctrl+alt+s")
        );
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.monitor.away_transparency, 50);
        assert_eq!(config.input.dispatch_interval_ms, 20);
    }
}
