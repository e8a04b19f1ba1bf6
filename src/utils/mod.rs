pub mod clock;
pub mod crypto;
pub mod file;
pub mod keys;

pub use clock::*;
pub use keys::*;
