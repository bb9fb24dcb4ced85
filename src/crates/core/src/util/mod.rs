pub mod errors;
pub mod hash;

pub use errors::*;
pub use hash::{hash_code, hash_code_units};
