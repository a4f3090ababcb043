pub mod config;
pub mod context;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use context::ServiceContext;
pub use errors::{ErrorKind, HerqlesError, HerqlesResult};
pub use logging::init_logging;
