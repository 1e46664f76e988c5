use chrono::{DateTime, Utc};
use derive_more::Display;
use serenity::all::{GuildId, UserId};
use uuid::Uuid;

/// The destructive action that was reverted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum IncidentKind {
    #[display("Unauthorized ban")]
    Ban,
    #[display("Unauthorized channel deletion")]
    ChannelDelete,
    #[display("Unauthorized role deletion")]
    RoleDelete,
    #[display("Unauthorized admin permission grant")]
    AdminGrant,
}

impl IncidentKind {
    /// Audit-log reason attached to compensating actions
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Ban => "ESCUDO Antinuke: Unauthorized ban",
            Self::ChannelDelete => "ESCUDO Antinuke: Unauthorized channel deletion",
            Self::RoleDelete => "ESCUDO Antinuke: Unauthorized role deletion",
            Self::AdminGrant => "ESCUDO Antinuke: Unauthorized admin permission grant",
        }
    }

    const fn remedy(self) -> &'static str {
        match self {
            Self::Ban => "Banned perpetrator and unbanned target",
            Self::ChannelDelete => "Banned perpetrator and recreated channel",
            Self::RoleDelete => "Banned perpetrator and recreated role",
            Self::AdminGrant => "Banned perpetrator and removed admin roles",
        }
    }
}

/// A retaliated antinuke event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AntinukeIncident {
    pub id: Uuid,
    pub guild_id: GuildId,
    pub kind: IncidentKind,
    /// Human-readable description of the affected object
    pub target: String,
    pub perpetrator: UserId,
    pub timestamp: DateTime<Utc>,
}

impl AntinukeIncident {
    #[must_use]
    pub fn new(
        guild_id: GuildId,
        kind: IncidentKind,
        target: impl Into<String>,
        perpetrator: UserId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            guild_id,
            kind,
            target: target.into(),
            perpetrator,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn title(&self) -> String {
        format!("Antinuke: {}", self.kind)
    }

    /// Body of the log-channel embed
    #[must_use]
    pub fn description(&self) -> String {
        format!(
            "**Action:** {}\n**Target:** {}\n**Perpetrator:** <@{}> ({})\n**Action Taken:** {}\n**Incident:** `{}`",
            self.kind,
            self.target,
            self.perpetrator,
            self.perpetrator,
            self.kind.remedy(),
            self.id
        )
    }
}
