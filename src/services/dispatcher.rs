//! Единая точка разбора событий мыши.
//!
//! Хук ОС только кладёт сырые события в очередь. Диспетчер периодически
//! забирает всё накопившееся в UI-потоке и раздаёт события распознавателям
//! жестов и обработчикам кнопок мыши строго в порядке поступления.

use crate::events::{ButtonState, MouseButton, MouseButtonTrigger, RawInputEvent};
use crate::services::scheduler::{schedule_repeating, UiScheduler};
use crate::services::trigger_registry::DispatchTable;
use crate::trace_if_enabled;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

pub struct EventDispatcher {
    sender: UnboundedSender<RawInputEvent>,
    receiver: Mutex<UnboundedReceiver<RawInputEvent>>,
    table: Arc<DispatchTable>,
    running: AtomicBool,
}

impl EventDispatcher {
    pub fn new(table: Arc<DispatchTable>) -> Self {
        let (sender, receiver) = unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            table,
            running: AtomicBool::new(false),
        }
    }

    /// Приёмник для хука ввода
    pub fn sink(&self) -> UnboundedSender<RawInputEvent> {
        self.sender.clone()
    }

    /// Забрать всё, что уже лежит в очереди, не дожидаясь новых событий
    fn take_pending(&self) -> Vec<RawInputEvent> {
        let mut receiver = self.receiver.lock();
        let mut events = Vec::new();
        loop {
            match receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("Очередь событий мыши закрыта");
                    break;
                }
            }
        }
        events
    }

    /// Разобрать очередь; возвращает число обработанных событий
    pub fn drain(&self) -> usize {
        let events = self.take_pending();
        for event in &events {
            self.dispatch(event);
        }
        events.len()
    }

    fn dispatch(&self, event: &RawInputEvent) {
        trace_if_enabled!("Событие мыши: {}", event);

        for recognizer in self.table.recognizers() {
            recognizer.handle_event(event);
        }

        let trigger = match *event {
            RawInputEvent::Wheel { delta } if delta > 0 => Some(MouseButtonTrigger::WheelUp),
            RawInputEvent::Wheel { .. } => Some(MouseButtonTrigger::WheelDown),
            RawInputEvent::Button {
                button: MouseButton::Middle,
                state: ButtonState::Released,
            } => Some(MouseButtonTrigger::MiddleClick),
            _ => None,
        };

        if let Some(callback) = trigger.and_then(|t| self.table.mouse_callback(t)) {
            callback();
        }
    }

    /// Запустить периодический разбор очереди в UI-потоке
    pub fn start(self: &Arc<Self>, scheduler: Arc<dyn UiScheduler>, period: Duration) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Диспетчер событий мыши запущен с периодом {:?}", period);

        let dispatcher = Arc::clone(self);
        schedule_repeating(scheduler, Duration::ZERO, period, move || {
            if !dispatcher.running.load(Ordering::SeqCst) {
                return false;
            }
            dispatcher.drain();
            true
        });
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            debug!("Диспетчер событий мыши остановлен");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
