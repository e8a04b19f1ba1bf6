pub mod actor;
pub mod event;
pub mod photo;
pub mod user;

pub use actor::*;
pub use event::*;
pub use photo::*;
pub use user::*;
