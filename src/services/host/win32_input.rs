use crate::debug_if_enabled;
use crate::error::{AlterError, Result};
use crate::events::{ButtonState, MouseButton, Point, RawInputEvent};
use crate::mappings::KeyCombo;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{channel, sync_channel, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};
use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    RegisterHotKey, UnregisterHotKey, HOT_KEY_MODIFIERS, MOD_NOREPEAT,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW,
    SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx, HC_ACTION, HHOOK, MSG,
    MSLLHOOKSTRUCT, PM_NOREMOVE, WH_MOUSE_LL, WM_APP, WM_HOTKEY, WM_LBUTTONDOWN, WM_LBUTTONUP,
    WM_MBUTTONDOWN, WM_MBUTTONUP, WM_MOUSEWHEEL, WM_QUIT, WM_RBUTTONDOWN, WM_RBUTTONUP,
    WM_XBUTTONDOWN, WM_XBUTTONUP,
};

use super::r#trait::{ActionCallback, HotkeyHandle, InputHook};

/// Сообщение потоку хука: выполнить накопившиеся команды
const WM_HOOK_COMMAND: u32 = WM_APP + 1;

thread_local! {
    // Процедура хука вызывается в потоке, который его установил
    static EVENT_SINK: RefCell<Option<UnboundedSender<RawInputEvent>>> = const { RefCell::new(None) };
}

enum HookCommand {
    Register {
        id: u32,
        modifiers: u32,
        vk: u32,
        reply: SyncSender<Result<()>>,
    },
    Unregister {
        id: u32,
    },
}

struct HookThread {
    thread_id: u32,
    commands: Sender<HookCommand>,
    join: JoinHandle<()>,
}

/// Глобальный хук ввода Windows: WH_MOUSE_LL и RegisterHotKey в одном
/// потоке с очередью сообщений
pub struct Win32InputHook {
    thread: Mutex<Option<HookThread>>,
    callbacks: Arc<DashMap<u32, ActionCallback>>,
    next_id: AtomicU32,
}

impl Default for Win32InputHook {
    fn default() -> Self {
        Self::new()
    }
}

impl Win32InputHook {
    pub fn new() -> Self {
        Self {
            thread: Mutex::new(None),
            callbacks: Arc::new(DashMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    fn send_command(&self, command: HookCommand) -> Result<()> {
        let guard = self.thread.lock();
        let thread = guard.as_ref().ok_or_else(|| {
            crate::alter_error!(service_unavailable, "поток хука ввода не запущен")
        })?;

        thread
            .commands
            .send(command)
            .map_err(|_| crate::alter_error!(service_unavailable, "поток хука ввода завершился"))?;

        unsafe {
            PostThreadMessageW(thread.thread_id, WM_HOOK_COMMAND, WPARAM(0), LPARAM(0))
                .map_err(|e| crate::alter_error!(host, "PostThreadMessageW: {}", e.message()))
        }
    }
}

fn run_hook_thread(
    sink: UnboundedSender<RawInputEvent>,
    commands: Receiver<HookCommand>,
    callbacks: Arc<DashMap<u32, ActionCallback>>,
    ready: SyncSender<Result<u32>>,
) {
    let mut msg = MSG::default();
    unsafe {
        // Создаём очередь сообщений потока до того, как сообщить о готовности
        let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
    }
    let thread_id = unsafe { GetCurrentThreadId() };

    let module = match unsafe { GetModuleHandleW(None) } {
        Ok(module) => module,
        Err(e) => {
            let _ = ready.send(Err(crate::alter_error!(host, "GetModuleHandleW: {}", e.message())));
            return;
        }
    };

    EVENT_SINK.with(|cell| *cell.borrow_mut() = Some(sink));

    let hook = match unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_hook_proc), module, 0) } {
        Ok(hook) if !hook.0.is_null() => hook,
        Ok(_) | Err(_) => {
            let reason = windows::core::Error::from_win32();
            let _ = ready.send(Err(crate::alter_error!(
                host,
                "SetWindowsHookExW(WH_MOUSE_LL): {}",
                reason.message()
            )));
            return;
        }
    };

    let _ = ready.send(Ok(thread_id));
    info!("Поток хука ввода запущен (thread id {})", thread_id);

    let mut registered: Vec<u32> = Vec::new();

    loop {
        let result = unsafe { GetMessageW(&mut msg, None, 0, 0) };
        if result.0 == 0 || result.0 == -1 {
            break;
        }

        match msg.message {
            WM_HOTKEY => {
                let id = msg.wParam.0 as u32;
                let callback = callbacks.get(&id).map(|entry| Arc::clone(entry.value()));
                match callback {
                    Some(callback) => callback(),
                    None => debug_if_enabled!("WM_HOTKEY для неизвестного id {}", id),
                }
            }
            WM_HOOK_COMMAND => {
                while let Ok(command) = commands.try_recv() {
                    apply_command(command, &mut registered);
                }
            }
            _ => unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            },
        }
    }

    for id in registered.drain(..) {
        unsafe {
            let _ = UnregisterHotKey(None, id as i32);
        }
    }
    unsafe {
        let _ = UnhookWindowsHookEx(hook);
    }
    EVENT_SINK.with(|cell| cell.borrow_mut().take());
    info!("Поток хука ввода завершён");
}

fn apply_command(command: HookCommand, registered: &mut Vec<u32>) {
    match command {
        HookCommand::Register {
            id,
            modifiers,
            vk,
            reply,
        } => {
            let result = unsafe {
                RegisterHotKey(None, id as i32, HOT_KEY_MODIFIERS(modifiers) | MOD_NOREPEAT, vk)
            }
            .map_err(|e| crate::alter_error!(host, "RegisterHotKey: {}", e.message()));

            if result.is_ok() {
                registered.push(id);
            }
            let _ = reply.send(result);
        }
        HookCommand::Unregister { id } => {
            if let Some(position) = registered.iter().position(|r| *r == id) {
                registered.swap_remove(position);
                unsafe {
                    let _ = UnregisterHotKey(None, id as i32);
                }
            }
        }
    }
}

unsafe extern "system" fn mouse_hook_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION as i32 {
        let info = &*(lparam.0 as *const MSLLHOOKSTRUCT);
        let high_word = ((info.mouseData >> 16) & 0xFFFF) as u16;

        // Перемещения в очередь не попадают: путь жеста снимает поток выборки
        let event = match wparam.0 as u32 {
            WM_LBUTTONDOWN => Some(RawInputEvent::press(MouseButton::Left)),
            WM_LBUTTONUP => Some(RawInputEvent::release(MouseButton::Left)),
            WM_RBUTTONDOWN => Some(RawInputEvent::press(MouseButton::Right)),
            WM_RBUTTONUP => Some(RawInputEvent::release(MouseButton::Right)),
            WM_MBUTTONDOWN => Some(RawInputEvent::press(MouseButton::Middle)),
            WM_MBUTTONUP => Some(RawInputEvent::release(MouseButton::Middle)),
            WM_XBUTTONDOWN | WM_XBUTTONUP => {
                let button = if high_word == 2 { MouseButton::X2 } else { MouseButton::X1 };
                let state = if wparam.0 as u32 == WM_XBUTTONDOWN {
                    ButtonState::Pressed
                } else {
                    ButtonState::Released
                };
                Some(RawInputEvent::Button { button, state })
            }
            WM_MOUSEWHEEL => Some(RawInputEvent::wheel(high_word as i16 as i32)),
            _ => None,
        };

        if let Some(event) = event {
            EVENT_SINK.with(|cell| {
                if let Some(sink) = cell.borrow().as_ref() {
                    let _ = sink.send(event);
                }
            });
            crate::trace_if_enabled!(
                "Хук мыши: {} в {}",
                event,
                Point::new(info.pt.x, info.pt.y)
            );
        }
    }

    CallNextHookEx(HHOOK(std::ptr::null_mut()), code, wparam, lparam)
}

impl InputHook for Win32InputHook {
    fn start(&self, sink: UnboundedSender<RawInputEvent>) -> Result<()> {
        let mut guard = self.thread.lock();
        if guard.is_some() {
            return Err(crate::alter_error!(internal, "хук ввода уже запущен"));
        }

        let (commands_tx, commands_rx) = channel::<HookCommand>();
        let (ready_tx, ready_rx) = sync_channel::<Result<u32>>(1);
        let callbacks = Arc::clone(&self.callbacks);

        let join = std::thread::Builder::new()
            .name("input-hook".to_string())
            .spawn(move || run_hook_thread(sink, commands_rx, callbacks, ready_tx))?;

        let thread_id = ready_rx
            .recv_timeout(Duration::from_secs(2))
            .map_err(|_| crate::alter_error!(host, "поток хука ввода не сообщил о готовности"))??;

        *guard = Some(HookThread {
            thread_id,
            commands: commands_tx,
            join,
        });
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let Some(thread) = self.thread.lock().take() else {
            return Ok(());
        };

        unsafe {
            let _ = PostThreadMessageW(thread.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
        if thread.join.join().is_err() {
            error!("Поток хука ввода завершился с паникой");
        }
        self.callbacks.clear();
        Ok(())
    }

    fn register_hotkey(
        &self,
        combo: &KeyCombo,
        suppress: bool,
        callback: ActionCallback,
    ) -> Result<HotkeyHandle> {
        if !suppress {
            warn!("RegisterHotKey всегда перехватывает '{}', флаг suppress игнорируется", combo);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (reply_tx, reply_rx) = sync_channel::<Result<()>>(1);

        self.callbacks.insert(id, callback);
        let outcome = self
            .send_command(HookCommand::Register {
                id,
                modifiers: combo.modifier_flags(),
                vk: combo.vk(),
                reply: reply_tx,
            })
            .and_then(|_| {
                reply_rx.recv_timeout(Duration::from_secs(1)).map_err(|_| {
                    AlterError::ServiceUnavailable("поток хука ввода не ответил".to_string())
                })?
            });

        match outcome {
            Ok(()) => {
                debug_if_enabled!("Горячая клавиша '{}' зарегистрирована (id {})", combo, id);
                Ok(HotkeyHandle(id))
            }
            Err(e) => {
                self.callbacks.remove(&id);
                Err(e)
            }
        }
    }

    fn unregister_hotkey(&self, handle: HotkeyHandle) -> Result<()> {
        if self.callbacks.remove(&handle.0).is_none() {
            return Ok(());
        }
        match self.send_command(HookCommand::Unregister { id: handle.0 }) {
            // Поток уже остановлен - регистрации сняты вместе с ним
            Err(AlterError::ServiceUnavailable(_)) => Ok(()),
            other => other,
        }
    }
}
