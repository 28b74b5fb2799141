pub mod error;
pub mod fixtures;
pub mod models;
pub mod validation;

pub use error::{Error, ErrorResponse};
pub use models::*;
pub use validation::{validate_deployment, validate_name, Validation, ValidationErrors};

pub type Result<T> = std::result::Result<T, Error>;
