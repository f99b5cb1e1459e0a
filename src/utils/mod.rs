//! Request helpers shared by the API handlers.

mod validate;

pub use validate::ValidatedJson;
