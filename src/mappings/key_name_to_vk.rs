use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Преобразование имён клавиш в виртуальные коды Win32 (VK_*)
/// Отвечает за трансляцию строковых имён клавиш из конфигурации
pub struct KeyNameToVk;

// Статическая карта основных клавиш
static KEY_NAME_TO_VK: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    let mut map = HashMap::new();

    // Буквенные клавиши: VK_A..VK_Z совпадают с ASCII
    for (i, name) in [
        "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q", "r",
        "s", "t", "u", "v", "w", "x", "y", "z",
    ]
    .iter()
    .enumerate()
    {
        map.insert(*name, 0x41 + i as u32);
    }

    // Цифровые клавиши (верхний ряд)
    for (i, name) in ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"].iter().enumerate() {
        map.insert(*name, 0x30 + i as u32);
    }

    // Функциональные клавиши F1..F24
    for (i, name) in [
        "f1", "f2", "f3", "f4", "f5", "f6", "f7", "f8", "f9", "f10", "f11", "f12", "f13", "f14",
        "f15", "f16", "f17", "f18", "f19", "f20", "f21", "f22", "f23", "f24",
    ]
    .iter()
    .enumerate()
    {
        map.insert(*name, 0x70 + i as u32);
    }

    // Специальные клавиши
    map.insert("space", 0x20);
    map.insert("enter", 0x0D);
    map.insert("return", 0x0D);
    map.insert("escape", 0x1B);
    map.insert("esc", 0x1B);
    map.insert("backspace", 0x08);
    map.insert("tab", 0x09);
    map.insert("capslock", 0x14);

    // Навигация
    map.insert("insert", 0x2D);
    map.insert("delete", 0x2E);
    map.insert("home", 0x24);
    map.insert("end", 0x23);
    map.insert("pageup", 0x21);
    map.insert("page up", 0x21);
    map.insert("pagedown", 0x22);
    map.insert("page down", 0x22);
    map.insert("left", 0x25);
    map.insert("up", 0x26);
    map.insert("right", 0x27);
    map.insert("down", 0x28);

    // Системные
    map.insert("printscreen", 0x2C);
    map.insert("print screen", 0x2C);
    map.insert("scrolllock", 0x91);
    map.insert("pause", 0x13);

    // Знаки пунктуации (раскладка US)
    map.insert(";", 0xBA);
    map.insert("=", 0xBB);
    map.insert(",", 0xBC);
    map.insert("-", 0xBD);
    map.insert(".", 0xBE);
    map.insert("/", 0xBF);
    map.insert("`", 0xC0);
    map.insert("[", 0xDB);
    map.insert("\\", 0xDC);
    map.insert("]", 0xDD);
    map.insert("'", 0xDE);

    // Цифровой блок
    for (i, name) in [
        "num 0", "num 1", "num 2", "num 3", "num 4", "num 5", "num 6", "num 7", "num 8", "num 9",
    ]
    .iter()
    .enumerate()
    {
        map.insert(*name, 0x60 + i as u32);
    }
    map.insert("num *", 0x6A);
    map.insert("num plus", 0x6B);
    map.insert("num -", 0x6D);
    map.insert("num .", 0x6E);
    map.insert("num /", 0x6F);

    map
});

impl KeyNameToVk {
    /// Получить виртуальный код клавиши по её имени
    pub fn translate(key_name: &str) -> Option<u32> {
        let normalized = key_name.trim().to_lowercase();
        KEY_NAME_TO_VK.get(normalized.as_str()).copied()
    }

    /// Обратное преобразование (каноническое имя клавиши)
    pub fn reverse_translate(vk: u32) -> Option<&'static str> {
        KEY_NAME_TO_VK
            .iter()
            .filter(|(_, code)| **code == vk)
            .map(|(name, _)| *name)
            .min_by_key(|name| (name.contains(' '), name.len()))
    }
}
