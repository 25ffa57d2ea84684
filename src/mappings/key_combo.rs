use crate::error::{AlterError, Result};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

use super::key_name_to_vk::KeyNameToVk;

/// Модификатор горячей клавиши
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Win,
}

impl Modifier {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "ctrl" | "control" => Some(Modifier::Ctrl),
            "alt" => Some(Modifier::Alt),
            "shift" => Some(Modifier::Shift),
            "win" | "super" | "windows" | "cmd" => Some(Modifier::Win),
            _ => None,
        }
    }

    /// Флаг MOD_* для RegisterHotKey
    pub fn flag(&self) -> u32 {
        match self {
            Modifier::Alt => 0x0001,
            Modifier::Ctrl => 0x0002,
            Modifier::Shift => 0x0004,
            Modifier::Win => 0x0008,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Modifier::Ctrl => "ctrl",
            Modifier::Alt => "alt",
            Modifier::Shift => "shift",
            Modifier::Win => "win",
        }
    }
}

/// Разобранная комбинация клавиш вида "ctrl+alt+m"
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyCombo {
    modifiers: SmallVec<[Modifier; 4]>,
    vk: u32,
}

impl KeyCombo {
    pub fn parse(combo: &str) -> Result<Self> {
        let normalized = combo.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(AlterError::InvalidCombo("пустая комбинация".to_string()));
        }

        let mut modifiers: SmallVec<[Modifier; 4]> = SmallVec::new();
        let mut vk: Option<u32> = None;

        for part in normalized.split('+') {
            let part = part.trim();
            if part.is_empty() {
                return Err(crate::alter_error!(invalid_combo, "пустой сегмент в '{}'", combo));
            }

            if let Some(modifier) = Modifier::parse(part) {
                if !modifiers.contains(&modifier) {
                    modifiers.push(modifier);
                }
                continue;
            }

            let code = KeyNameToVk::translate(part).ok_or_else(|| {
                crate::alter_error!(invalid_combo, "неизвестная клавиша '{}' в '{}'", part, combo)
            })?;

            if vk.replace(code).is_some() {
                return Err(crate::alter_error!(
                    invalid_combo,
                    "больше одной основной клавиши в '{}'",
                    combo
                ));
            }
        }

        let vk = vk.ok_or_else(|| {
            crate::alter_error!(invalid_combo, "нет основной клавиши в '{}'", combo)
        })?;

        modifiers.sort();
        Ok(Self { modifiers, vk })
    }

    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    /// Объединённые флаги MOD_* для RegisterHotKey
    pub fn modifier_flags(&self) -> u32 {
        self.modifiers.iter().fold(0, |acc, m| acc | m.flag())
    }

    pub fn vk(&self) -> u32 {
        self.vk
    }
}

impl FromStr for KeyCombo {
    type Err = AlterError;

    fn from_str(s: &str) -> Result<Self> {
        KeyCombo::parse(s)
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in &self.modifiers {
            write!(f, "{}+", modifier.name())?;
        }
        match KeyNameToVk::reverse_translate(self.vk) {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "vk{:#04x}", self.vk),
        }
    }
}
