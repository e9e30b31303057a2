pub mod display;
pub mod logging;
pub mod process;

// App state (configuration, paths)
pub mod state;

pub use process::{spawn_service, start_service, ServiceConfig, ServiceError, ShutdownHandle};
pub use state::{AppConfig, AppState, StateError};
