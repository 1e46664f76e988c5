pub mod antinuke;
pub mod commands;
pub mod data;
pub mod embeds;
pub mod gateway;
pub mod handlers;
pub mod logging;
pub mod moderation;
pub mod nightmode;
pub mod permissions;
pub mod settings;
pub mod store;
pub mod voice;

pub const COMMAND_TARGET: &str = "escudo::command";
pub const ERROR_TARGET: &str = "escudo::error";
pub const EVENT_TARGET: &str = "escudo::handlers";
pub const ANTINUKE_TARGET: &str = "escudo::antinuke";
pub const CONSOLE_TARGET: &str = "escudo";

pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
