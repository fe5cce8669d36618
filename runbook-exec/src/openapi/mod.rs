mod loader;
mod refs;
mod router;
mod schema;
mod validator;

pub use loader::{load_openapi, parse_openapi_str};
pub use refs::RefError;
pub use validator::{HttpValidator, NopValidator, OpenApi3Validator, ValidationError};
