pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod guard;
pub mod models;
pub mod mutations;
pub mod poller;
pub mod session;
pub mod validation;
pub mod views;

pub use api::ApiClient;
pub use config::Config;
pub use error::{ClientError, ValidationErrors};
pub use session::{Session, SessionStatus, SessionStore};
