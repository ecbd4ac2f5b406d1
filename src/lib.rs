pub mod batch;
pub mod config;
pub mod error;
pub mod fetch;
pub mod process;
pub mod table;
pub mod write;

pub use error::{Error, Result};
pub use table::{Table, Value};
