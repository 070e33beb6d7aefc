pub mod error;

pub use error::{CrudError, Result};
