//! Embed builders shared by commands and log posts

use serenity::all::{CreateEmbed, CreateEmbedFooter, Timestamp};

pub const SUCCESS_COLOUR: u32 = 0x2E_CC71;
pub const ERROR_COLOUR: u32 = 0xE7_4C3C;
pub const WARNING_COLOUR: u32 = 0xF3_9C12;
pub const INFO_COLOUR: u32 = 0x34_98DB;

const FOOTER: &str = "ESCUDO | Protection Bot";

fn base(title: &str, description: &str, colour: u32) -> CreateEmbed {
    CreateEmbed::new()
        .title(title)
        .description(description)
        .colour(colour)
        .footer(CreateEmbedFooter::new(FOOTER))
        .timestamp(Timestamp::now())
}

#[must_use]
pub fn success(title: &str, description: &str) -> CreateEmbed {
    base(&format!("✅ {title}"), description, SUCCESS_COLOUR)
}

#[must_use]
pub fn error(title: &str, description: &str) -> CreateEmbed {
    base(&format!("❌ {title}"), description, ERROR_COLOUR)
}

#[must_use]
pub fn warning(title: &str, description: &str) -> CreateEmbed {
    base(&format!("⚠️ {title}"), description, WARNING_COLOUR)
}

#[must_use]
pub fn info(title: &str, description: &str) -> CreateEmbed {
    base(&format!("ℹ️ {title}"), description, INFO_COLOUR)
}
