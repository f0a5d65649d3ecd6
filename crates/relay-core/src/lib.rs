pub mod cache;
pub mod card;
pub mod config;
pub mod context;
pub mod error;
pub mod io;
pub mod paths;
pub mod record;
pub mod review;
pub mod store;

pub use error::{RelayError, Result};
