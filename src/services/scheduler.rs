//! Единый логический UI-поток.
//!
//! Все колбэки действий, тики опроса окна и разбор очереди событий мыши
//! выполняются строго последовательно в одном потоке. Отложенные задачи
//! отсчитываются таймерами tokio и только потом попадают в очередь потока.

use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, info};

pub type UiTask = Box<dyn FnOnce() + Send + 'static>;

/// Планировщик задач единого UI-потока
pub trait UiScheduler: Send + Sync {
    /// Выполнить задачу в UI-потоке не раньше чем через `delay`
    fn schedule_after(&self, delay: Duration, task: UiTask);

    fn schedule_now(&self, task: UiTask) {
        self.schedule_after(Duration::ZERO, task);
    }
}

/// Повторяющийся таймер: `tick` перевзводится с периодом `period`,
/// пока возвращает `true`
pub fn schedule_repeating<F>(
    scheduler: Arc<dyn UiScheduler>,
    initial_delay: Duration,
    period: Duration,
    tick: F,
) where
    F: Fn() -> bool + Send + Sync + 'static,
{
    arm(scheduler, initial_delay, period, Arc::new(tick));
}

fn arm(
    scheduler: Arc<dyn UiScheduler>,
    delay: Duration,
    period: Duration,
    tick: Arc<dyn Fn() -> bool + Send + Sync>,
) {
    let next = Arc::clone(&scheduler);
    scheduler.schedule_after(
        delay,
        Box::new(move || {
            if tick() {
                arm(next, period, period, tick);
            }
        }),
    );
}

enum UiMessage {
    Run(UiTask),
    Shutdown,
}

/// Реальный UI-поток: выделенный поток ОС, разбирающий очередь задач
pub struct UiLoop {
    sender: UnboundedSender<UiMessage>,
    runtime: Handle,
    stopped: AtomicBool,
}

impl UiLoop {
    pub fn spawn(runtime: Handle) -> Result<(Arc<Self>, JoinHandle<()>)> {
        let (sender, mut receiver) = unbounded_channel::<UiMessage>();

        let thread = std::thread::Builder::new()
            .name("ui-loop".to_string())
            .spawn(move || {
                info!("UI-поток запущен");
                let mut executed: u64 = 0;
                while let Some(message) = receiver.blocking_recv() {
                    match message {
                        UiMessage::Run(task) => {
                            task();
                            executed += 1;
                        }
                        UiMessage::Shutdown => break,
                    }
                }
                info!("UI-поток завершён, выполнено задач: {}", executed);
            })?;

        let ui_loop = Arc::new(Self {
            sender,
            runtime,
            stopped: AtomicBool::new(false),
        });

        Ok((ui_loop, thread))
    }

    /// Остановить поток после уже поставленных в очередь задач
    pub fn shutdown(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            info!("Остановка UI-потока");
            let _ = self.sender.send(UiMessage::Shutdown);
        }
    }
}

impl UiScheduler for UiLoop {
    fn schedule_after(&self, delay: Duration, task: UiTask) {
        if self.stopped.load(Ordering::SeqCst) {
            debug!("UI-поток остановлен, задача отброшена");
            return;
        }

        if delay.is_zero() {
            let _ = self.sender.send(UiMessage::Run(task));
            return;
        }

        let sender = self.sender.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Получатель мог завершиться - значит, приложение закрывается
            let _ = sender.send(UiMessage::Run(task));
        });
    }
}

#[cfg(test)]
pub use manual::ManualScheduler;
