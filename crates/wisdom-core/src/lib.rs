pub mod config;
pub mod controller;
pub mod format;
pub mod poll;
pub mod reconcile;
pub mod service;
pub mod session;
pub mod types;

pub use config::*;
pub use controller::*;
pub use poll::*;
pub use reconcile::*;
pub use service::*;
pub use session::*;
pub use types::*;
