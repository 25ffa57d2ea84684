use crate::events::{Point, ScreenSize, SwipePattern};

/// Классификация пути курсора в направленный свайп.
///
/// Смещение считается от первой точки пути к последней. Порог по оси
/// составляет пятую часть размера экрана вдоль неё, допуск поперёк оси -
/// десятую часть. Сравнения строгие: смещение, равное порогу, свайпом
/// не считается.
pub fn classify(path: &[Point], screen: ScreenSize) -> Option<SwipePattern> {
    let first = path.first()?;
    let last = path.last()?;

    let dx = f64::from(last.x - first.x);
    let dy = f64::from(last.y - first.y);

    let width = f64::from(screen.width);
    let height = f64::from(screen.height);

    let horizontal_threshold = width / 5.0;
    let vertical_threshold = height / 5.0;
    let horizontal_tolerance = height / 10.0;
    let vertical_tolerance = width / 10.0;

    if dy.abs() < horizontal_tolerance {
        if dx > horizontal_threshold {
            return Some(SwipePattern::SwipeRight);
        }
        if dx < -horizontal_threshold {
            return Some(SwipePattern::SwipeLeft);
        }
    }

    if dx.abs() < vertical_tolerance {
        if dy > vertical_threshold {
            return Some(SwipePattern::SwipeDown);
        }
        if dy < -vertical_threshold {
            return Some(SwipePattern::SwipeUp);
        }
    }

    None
}
