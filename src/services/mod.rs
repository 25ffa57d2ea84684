pub mod controller;
pub mod dispatcher;
pub mod gesture;
pub mod host;
pub mod scheduler;
pub mod trigger_registry;
pub mod window_monitor;

pub use controller::Controller;
pub use host::create_host;
pub use scheduler::UiLoop;
