//! 핸들러 모듈

pub mod admin;
pub mod connection;
pub mod matchmaking;
pub mod race;

pub use admin::*;
pub use connection::*;
pub use matchmaking::*;
pub use race::*;
