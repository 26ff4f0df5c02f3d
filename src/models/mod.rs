pub mod command;
pub mod reply;
pub mod request;

pub use command::*;
pub use reply::*;
pub use request::*;
