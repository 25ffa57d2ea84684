use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

/// Непрозрачный дескриптор окна хоста (HWND на Windows)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowHandle(pub isize);

impl WindowHandle {
    pub fn value(&self) -> isize {
        self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// Точка в экранных координатах
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Прямоугольник окна на экране (left/top/right/bottom как у Win32 RECT)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl WindowRect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Попадание точки в прямоугольник, границы включительно
    pub fn contains(&self, point: Point) -> bool {
        self.left <= point.x && point.x <= self.right && self.top <= point.y && point.y <= self.bottom
    }
}

impl fmt::Display for WindowRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {} - {}, {}]", self.left, self.top, self.right, self.bottom)
    }
}

/// Размер основного экрана
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Расширенные биты стиля окна (GWL_EXSTYLE)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExStyle(pub u32);

impl ExStyle {
    pub const TOOLWINDOW: ExStyle = ExStyle(0x0000_0080);
    pub const LAYERED: ExStyle = ExStyle(0x0008_0000);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: ExStyle) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ExStyle {
    type Output = ExStyle;

    fn bitor(self, rhs: ExStyle) -> ExStyle {
        ExStyle(self.0 | rhs.0)
    }
}

impl BitAnd for ExStyle {
    type Output = ExStyle;

    fn bitand(self, rhs: ExStyle) -> ExStyle {
        ExStyle(self.0 & rhs.0)
    }
}

impl Not for ExStyle {
    type Output = ExStyle;

    fn not(self) -> ExStyle {
        ExStyle(!self.0)
    }
}

impl fmt::Display for ExStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Команды, которые можно отправить окну сообщением
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowCommand {
    Minimize,
    Restore,
    Close,
}

/// Информация о видимом окне верхнего уровня
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub title: String,
    pub pid: Option<u32>,
}

impl WindowInfo {
    pub fn new(handle: WindowHandle, title: String) -> Self {
        Self { handle, title, pid: None }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Проверить, соответствует ли заголовок паттерну (регистронезависимо)
    pub fn matches_pattern(&self, pattern: &str) -> bool {
        if pattern.is_empty() {
            return false;
        }
        self.title.to_lowercase().contains(&pattern.to_lowercase())
    }
}

impl fmt::Display for WindowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" [{}]", self.title, self.handle)
    }
}
