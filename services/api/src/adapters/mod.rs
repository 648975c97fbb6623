pub mod db;
pub mod platform;

pub use db::PgStore;
pub use platform::HttpAgentPlatform;
