mod environment;
mod error;
mod extractors;

pub use environment::{Environment, ServerSignerConfig};
pub use error::{ApiErrorResponse, AppError};
pub use extractors::{ValidatedJson, ValidatedQuery};
