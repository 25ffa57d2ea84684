use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::signal;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};
mod config;
mod error;
mod events;
mod mappings;
mod services;
mod utils;

use config::Config;
use events::Notification;
use services::{create_host, Controller, UiLoop};

#[derive(Parser, Debug)]
#[command(name = "hover-alter")]
#[command(about = "Прозрачность окна при наведении курсора и глобальные триггеры для управления им")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "alter.toml")]
    config: String,

    /// Режим сухого запуска (эмуляция рабочего стола и ввода)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (перекрывает [logging] из конфигурации)
    #[arg(long)]
    log_level: Option<String>,

    /// Заголовок окна для отслеживания при запуске (точный или подстрока)
    #[arg(short, long)]
    window: Option<String>,

    /// Показать видимые окна и выйти
    #[arg(long)]
    list_windows: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Загрузка конфигурации
    let config = Arc::new(Config::load(&args.config)?);

    // Инициализация системы логирования
    let directive = match &args.log_level {
        Some(level) => level.clone(),
        None => format!("{},{}", config.logging.level, config.logging.filter),
    };
    init_tracing(&directive)?;

    info!("Запуск Hover Alter v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {}", args.config);

    if args.dry_run {
        warn!("Режим сухого запуска - окна и ввод эмулируются");
    }

    let host = create_host(args.dry_run)?;
    let (ui_loop, ui_thread) = UiLoop::spawn(Handle::current())?;
    let (controller, mut notifications) = Controller::new(
        config.clone(),
        host.windows.clone(),
        host.input.clone(),
        ui_loop.clone(),
    );

    if args.list_windows {
        for window in controller.list_windows()? {
            println!("{}\t{}", window.handle, window.title);
        }
        ui_loop.shutdown();
        let _ = tokio::task::spawn_blocking(move || ui_thread.join()).await;
        return Ok(());
    }

    let emulation = host
        .simulated
        .clone()
        .map(|desktop| desktop.spawn_emulation(Duration::from_secs(3)));

    controller.start()?;
    info!("Все компоненты инициализированы");

    let wanted = args
        .window
        .clone()
        .or_else(|| config.last_window_title.clone())
        .or_else(|| {
            // В dry-run без явного выбора отслеживаем первое фиктивное окно
            host.simulated.as_ref()?;
            controller.list_windows().ok()?.into_iter().next().map(|w| w.title)
        });

    match wanted {
        Some(title) => match controller.find_window(&title) {
            Ok(window) => match controller.start_monitoring(window.handle) {
                Ok(()) => info!("Отслеживается окно {}", window),
                Err(e) => error!("Не удалось начать отслеживание {}: {}", window, e),
            },
            Err(e) => warn!("{}", e),
        },
        None => info!("Окно для отслеживания не выбрано, активны только глобальные триггеры"),
    }

    // Ожидание сигнала завершения или запроса выхода
    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Получен сигнал завершения (Ctrl+C)"),
                    Err(err) => error!("Ошибка при ожидании сигнала завершения: {}", err),
                }
                break;
            }
            notification = notifications.recv() => match notification {
                Some(Notification::ExitRequested) | None => {
                    info!("Запрошен выход из программы");
                    break;
                }
                Some(Notification::WindowClosed { handle }) => {
                    info!("Отслеживаемое окно {} закрыто, отслеживание остановлено", handle);
                }
                Some(Notification::TriggerFired(action)) => debug!("Выполнено действие {}", action),
                Some(Notification::IndicatorChanged { visible }) => {
                    info!("Индикатор {}", if visible { "показан" } else { "скрыт" });
                }
                Some(Notification::InstallFailed { action, reason }) => {
                    error!("Триггер '{}' не установлен: {}", action, reason);
                }
            }
        }
    }

    info!("Завершение работы...");

    controller.shutdown();
    if let Some(task) = emulation {
        task.abort();
    }
    ui_loop.shutdown();

    // Ожидаем завершения UI-потока (с таймаутом)
    let shutdown_timeout = Duration::from_secs(5);
    let shutdown_result =
        tokio::time::timeout(shutdown_timeout, tokio::task::spawn_blocking(move || ui_thread.join()))
            .await;

    match shutdown_result {
        Ok(Ok(Ok(()))) => info!("UI-поток завершил работу корректно"),
        Ok(_) => warn!("UI-поток завершился с ошибкой"),
        Err(_) => warn!("Таймаут при завершении UI-потока"),
    }

    info!("Hover Alter завершил работу");
    Ok(())
}

fn init_tracing(directive: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(directive))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    Ok(())
}
