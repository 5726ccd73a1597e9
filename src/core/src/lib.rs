pub mod config;
pub mod error;
pub mod ids;
pub mod log;
pub mod room_code;
pub mod time;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use ids::{RoomId, UserId};
