use crate::config::InputConfig;
use crate::events::{Action, ButtonState, GestureButton, Point, RawInputEvent, ScreenSize, SwipePattern};
use crate::services::host::{ActionCallback, WindowHost};
use crate::services::scheduler::UiScheduler;
use crate::{debug_if_enabled, trace_if_enabled};
use parking_lot::Mutex;
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::classifier::classify;

/// Тайминги записи жеста
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureSettings {
    pub sample_interval: Duration,
    pub join_timeout: Duration,
    /// Путь из стольких точек и меньше отбрасывается без анализа
    pub min_points: usize,
}

impl From<&InputConfig> for GestureSettings {
    fn from(config: &InputConfig) -> Self {
        Self {
            sample_interval: config.gesture_sample_interval(),
            join_timeout: config.gesture_join_timeout(),
            min_points: config.gesture_min_points,
        }
    }
}

#[derive(Default)]
struct Recording {
    path: Vec<Point>,
    is_recording: bool,
    sampler_done: Option<Receiver<()>>,
}

/// Распознаватель жеста для одной привязки (действие, кнопка, направление)
pub struct GestureRecognizer {
    action: Action,
    trigger_button: GestureButton,
    pattern: SwipePattern,
    callback: ActionCallback,
    host: Arc<dyn WindowHost>,
    scheduler: Arc<dyn UiScheduler>,
    screen: ScreenSize,
    settings: GestureSettings,
    recording: Arc<Mutex<Recording>>,
}

impl GestureRecognizer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        action: Action,
        trigger_button: GestureButton,
        pattern: SwipePattern,
        callback: ActionCallback,
        host: Arc<dyn WindowHost>,
        scheduler: Arc<dyn UiScheduler>,
        screen: ScreenSize,
        settings: GestureSettings,
    ) -> Self {
        Self {
            action,
            trigger_button,
            pattern,
            callback,
            host,
            scheduler,
            screen,
            settings,
            recording: Arc::new(Mutex::new(Recording::default())),
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn trigger_button(&self) -> GestureButton {
        self.trigger_button
    }

    pub fn pattern(&self) -> SwipePattern {
        self.pattern
    }

    pub fn is_recording(&self) -> bool {
        self.recording.lock().is_recording
    }

    /// Прервать запись без анализа и дождаться потока выборки.
    /// Вызывается, когда распознаватель снимается с привязки
    pub fn cancel(&self) {
        let sampler_done = {
            let mut recording = self.recording.lock();
            if !recording.is_recording {
                return;
            }
            recording.is_recording = false;
            recording.path.clear();
            recording.sampler_done.take()
        };

        debug!("Жест '{}': запись прервана", self.action);
        self.wait_for_sampler(sampler_done);
    }

    /// Вызывается для каждого сырого события в порядке поступления
    pub fn handle_event(&self, event: &RawInputEvent) {
        let RawInputEvent::Button { button, state } = *event else {
            return;
        };
        if button != self.trigger_button.mouse_button() {
            return;
        }

        match state {
            ButtonState::Pressed => self.begin_recording(),
            ButtonState::Released => self.finish_recording(),
        }
    }

    fn begin_recording(&self) {
        let start = match self.host.cursor_position() {
            Ok(point) => point,
            Err(e) => {
                warn!("Жест '{}': не удалось получить позицию курсора: {}", self.action, e);
                return;
            }
        };

        let (done_tx, done_rx) = channel::<()>();
        {
            let mut recording = self.recording.lock();
            if recording.is_recording {
                return;
            }
            recording.path.clear();
            recording.path.push(start);
            recording.is_recording = true;
            recording.sampler_done = Some(done_rx);
        }

        let shared = Arc::clone(&self.recording);
        let host = Arc::clone(&self.host);
        let interval = self.settings.sample_interval;

        let spawned = std::thread::Builder::new()
            .name(format!("gesture-{}", self.action))
            .spawn(move || {
                loop {
                    std::thread::sleep(interval);
                    let position = host.cursor_position();

                    let mut recording = shared.lock();
                    if !recording.is_recording {
                        break;
                    }
                    if let Ok(point) = position {
                        if recording.path.last() != Some(&point) {
                            recording.path.push(point);
                        }
                    }
                }
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(_) => debug_if_enabled!("Жест '{}': запись начата в {}", self.action, start),
            Err(e) => {
                error!("Жест '{}': не удалось запустить поток выборки: {}", self.action, e);
                let mut recording = self.recording.lock();
                recording.is_recording = false;
                recording.path.clear();
                recording.sampler_done = None;
            }
        }
    }

    fn finish_recording(&self) {
        let (path, sampler_done) = {
            let mut recording = self.recording.lock();
            if !recording.is_recording {
                return;
            }
            recording.is_recording = false;
            (std::mem::take(&mut recording.path), recording.sampler_done.take())
        };

        self.wait_for_sampler(sampler_done);

        match recognize(&path, self.screen, self.settings.min_points) {
            Some(pattern) if pattern == self.pattern => {
                info!("Распознан жест {} + {} -> {}", self.trigger_button, pattern, self.action);
                let callback = Arc::clone(&self.callback);
                self.scheduler.schedule_now(Box::new(move || callback()));
            }
            Some(other) => {
                debug_if_enabled!("Жест '{}': {} не совпадает с {}", self.action, other, self.pattern)
            }
            None => trace_if_enabled!(
                "Жест '{}': путь из {} точек не распознан",
                self.action,
                path.len()
            ),
        }
    }

    fn wait_for_sampler(&self, sampler_done: Option<Receiver<()>>) {
        if let Some(done) = sampler_done {
            // Зависший поток не убивается: анализ идёт по уже снятому пути
            if done.recv_timeout(self.settings.join_timeout).is_err() {
                warn!("Жест '{}': поток выборки не завершился вовремя", self.action);
            }
        }
    }
}

impl Drop for GestureRecognizer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Направление пути; путь из `min_points` точек и короче не анализируется
fn recognize(path: &[Point], screen: ScreenSize, min_points: usize) -> Option<SwipePattern> {
    if path.len() <= min_points {
        return None;
    }
    classify(path, screen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::events::{ExStyle, MouseButton, WindowCommand, WindowHandle, WindowInfo, WindowRect};
    use crate::services::host::DryRunDesktop;
    use crate::services::scheduler::ManualScheduler;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    const SCREEN: ScreenSize = ScreenSize {
        width: 1000,
        height: 800,
    };

    /// Курсор проходит заданные точки по одной на каждый запрос позиции,
    /// затем стоит на месте (и при `stall` отвечает с задержкой)
    struct ScriptedCursor {
        desktop: DryRunDesktop,
        script: Mutex<VecDeque<Point>>,
        last: Mutex<Point>,
        idle_polls: AtomicUsize,
        stall: Option<Duration>,
    }

    impl ScriptedCursor {
        fn new(points: &[(i32, i32)], stall: Option<Duration>) -> Arc<Self> {
            Arc::new(Self {
                desktop: DryRunDesktop::new(SCREEN),
                script: Mutex::new(points.iter().map(|p| Point::from(*p)).collect()),
                last: Mutex::new(Point::default()),
                idle_polls: AtomicUsize::new(0),
                stall,
            })
        }

        fn idle_polls(&self) -> usize {
            self.idle_polls.load(Ordering::SeqCst)
        }

        /// Все точки сценария уже сняты потоком выборки
        fn wait_until_played(&self) {
            let deadline = Instant::now() + Duration::from_secs(2);
            while self.idle_polls() == 0 {
                assert!(Instant::now() < deadline, "сценарий курсора не доигран");
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    impl WindowHost for ScriptedCursor {
        fn enumerate_windows(&self) -> Result<Vec<WindowInfo>> {
            self.desktop.enumerate_windows()
        }
        fn is_window(&self, handle: WindowHandle) -> bool {
            self.desktop.is_window(handle)
        }
        fn window_title(&self, handle: WindowHandle) -> Result<String> {
            self.desktop.window_title(handle)
        }
        fn window_process_id(&self, handle: WindowHandle) -> Option<u32> {
            self.desktop.window_process_id(handle)
        }
        fn ex_style(&self, handle: WindowHandle) -> Result<ExStyle> {
            self.desktop.ex_style(handle)
        }
        fn set_ex_style(&self, handle: WindowHandle, style: ExStyle) -> Result<()> {
            self.desktop.set_ex_style(handle, style)
        }
        fn set_layered_alpha(&self, handle: WindowHandle, alpha: u8) -> Result<()> {
            self.desktop.set_layered_alpha(handle, alpha)
        }
        fn window_rect(&self, handle: WindowHandle) -> Result<WindowRect> {
            self.desktop.window_rect(handle)
        }
        fn set_topmost(&self, handle: WindowHandle, topmost: bool) -> Result<()> {
            self.desktop.set_topmost(handle, topmost)
        }
        fn refresh_frame(&self, handle: WindowHandle) -> Result<()> {
            self.desktop.refresh_frame(handle)
        }
        fn is_minimized(&self, handle: WindowHandle) -> Result<bool> {
            self.desktop.is_minimized(handle)
        }
        fn post_command(&self, handle: WindowHandle, command: WindowCommand) -> Result<()> {
            self.desktop.post_command(handle, command)
        }
        fn cursor_position(&self) -> Result<Point> {
            let next = self.script.lock().pop_front();
            match next {
                Some(point) => {
                    *self.last.lock() = point;
                    Ok(point)
                }
                None => {
                    self.idle_polls.fetch_add(1, Ordering::SeqCst);
                    if let Some(stall) = self.stall {
                        std::thread::sleep(stall);
                    }
                    Ok(*self.last.lock())
                }
            }
        }
        fn screen_size(&self) -> Result<ScreenSize> {
            Ok(SCREEN)
        }
        fn window_at(&self, point: Point) -> Option<WindowHandle> {
            self.desktop.window_at(point)
        }
        fn terminate_process(&self, pid: u32) -> Result<()> {
            self.desktop.terminate_process(pid)
        }
    }

    const RIGHTWARD: [(i32, i32); 7] = [(0, 0), (60, 1), (120, 2), (180, 3), (240, 4), (300, 5), (360, 6)];

    fn settings() -> GestureSettings {
        GestureSettings {
            sample_interval: Duration::from_millis(5),
            join_timeout: Duration::from_millis(500),
            min_points: 5,
        }
    }

    fn setup(
        cursor: &Arc<ScriptedCursor>,
        pattern: SwipePattern,
        settings: GestureSettings,
    ) -> (Arc<ManualScheduler>, GestureRecognizer, Arc<AtomicUsize>) {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        let recognizer = GestureRecognizer::new(
            Action::ForceClose,
            GestureButton::Right,
            pattern,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            cursor.clone(),
            scheduler.clone(),
            SCREEN,
            settings,
        );

        (scheduler, recognizer, fired)
    }

    fn drag(cursor: &ScriptedCursor, recognizer: &GestureRecognizer) {
        recognizer.handle_event(&RawInputEvent::press(MouseButton::Right));
        cursor.wait_until_played();
        recognizer.handle_event(&RawInputEvent::release(MouseButton::Right));
    }

    fn points(n: i32) -> Vec<Point> {
        (0..n).map(|i| Point::new(i * 100, 0)).collect()
    }

    #[test]
    fn test_min_points_boundary() {
        assert_eq!(recognize(&points(5), SCREEN, 5), None);
        assert_eq!(recognize(&points(6), SCREEN, 5), Some(SwipePattern::SwipeRight));
        assert_eq!(recognize(&[], SCREEN, 5), None);
    }

    #[test]
    fn test_matching_swipe_schedules_callback_on_ui_thread() {
        let cursor = ScriptedCursor::new(&RIGHTWARD, None);
        let (scheduler, recognizer, fired) = setup(&cursor, SwipePattern::SwipeRight, settings());

        drag(&cursor, &recognizer);

        assert!(!recognizer.is_recording());
        // Колбэк не вызывается из потока выборки, только через планировщик
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 1);

        scheduler.run_pending();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_other_direction_does_not_fire() {
        let cursor = ScriptedCursor::new(&RIGHTWARD, None);
        let (scheduler, recognizer, _) = setup(&cursor, SwipePattern::SwipeLeft, settings());

        drag(&cursor, &recognizer);

        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_short_path_is_discarded() {
        // Пять различных точек - ровно минимум, анализ не выполняется
        let cursor = ScriptedCursor::new(&RIGHTWARD[..5], None);
        let (scheduler, recognizer, _) = setup(&cursor, SwipePattern::SwipeRight, settings());

        drag(&cursor, &recognizer);

        assert_eq!(scheduler.pending(), 0);
        assert!(!recognizer.is_recording());
    }

    #[test]
    fn test_stuck_sampler_is_abandoned_after_join_timeout() {
        let cursor = ScriptedCursor::new(&RIGHTWARD, Some(Duration::from_millis(400)));
        let (scheduler, recognizer, _) = setup(
            &cursor,
            SwipePattern::SwipeRight,
            GestureSettings {
                join_timeout: Duration::from_millis(50),
                ..settings()
            },
        );

        recognizer.handle_event(&RawInputEvent::press(MouseButton::Right));
        cursor.wait_until_played();

        let started = Instant::now();
        recognizer.handle_event(&RawInputEvent::release(MouseButton::Right));
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(300), "ожидание заняло {:?}", elapsed);
        // Анализ по уже снятому пути
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_cancel_stops_sampler_without_classifying() {
        let cursor = ScriptedCursor::new(&RIGHTWARD, None);
        let (scheduler, recognizer, _) = setup(&cursor, SwipePattern::SwipeRight, settings());

        recognizer.handle_event(&RawInputEvent::press(MouseButton::Right));
        cursor.wait_until_played();
        recognizer.cancel();

        assert!(!recognizer.is_recording());
        assert!(recognizer.recording.lock().path.is_empty());

        let polls = cursor.idle_polls();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(cursor.idle_polls(), polls);

        // Отпускание после отмены ничего не распознаёт
        recognizer.handle_event(&RawInputEvent::release(MouseButton::Right));
        assert_eq!(scheduler.pending(), 0);

        recognizer.cancel();
    }

    #[test]
    fn test_dropping_recognizer_mid_recording_stops_sampler() {
        let cursor = ScriptedCursor::new(&RIGHTWARD, None);
        let (_, recognizer, _) = setup(&cursor, SwipePattern::SwipeRight, settings());

        recognizer.handle_event(&RawInputEvent::press(MouseButton::Right));
        cursor.wait_until_played();
        drop(recognizer);

        let polls = cursor.idle_polls();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(cursor.idle_polls(), polls);
    }

    #[test]
    fn test_ignores_other_buttons() {
        let cursor = ScriptedCursor::new(&[(10, 10)], None);
        let (_, recognizer, _) = setup(&cursor, SwipePattern::SwipeRight, settings());

        recognizer.handle_event(&RawInputEvent::press(MouseButton::Middle));
        assert!(!recognizer.is_recording());

        recognizer.handle_event(&RawInputEvent::wheel(120));
        recognizer.handle_event(&RawInputEvent::press(MouseButton::Right));
        assert!(recognizer.is_recording());

        recognizer.handle_event(&RawInputEvent::release(MouseButton::Right));
        assert!(!recognizer.is_recording());
    }

    #[test]
    fn test_release_without_press_is_noop() {
        let cursor = ScriptedCursor::new(&[], None);
        let (scheduler, recognizer, _) = setup(&cursor, SwipePattern::SwipeRight, settings());
        recognizer.handle_event(&RawInputEvent::release(MouseButton::Right));
        assert_eq!(scheduler.pending(), 0);
    }
}
