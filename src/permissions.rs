//! Command authority levels

use crate::store::GuildConfig;
use serenity::all::{Permissions, RoleId};

/// How much a caller may do. Each level includes the ones below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Authority {
    Member,
    Mod,
    Admin,
    Owner,
}

/// What we know about the invoking member
#[derive(Debug, Clone, Copy)]
pub struct CallerFacts<'a> {
    /// Configured owner or extra owner of the guild
    pub is_owner: bool,
    pub permissions: Permissions,
    pub roles: &'a [RoleId],
}

#[must_use]
pub fn resolve_authority(config: &GuildConfig, caller: &CallerFacts<'_>) -> Authority {
    let has_any = |roles: &std::collections::BTreeSet<RoleId>| {
        caller.roles.iter().any(|role| roles.contains(role))
    };

    if caller.is_owner {
        Authority::Owner
    } else if caller.permissions.administrator() || has_any(&config.admin_roles) {
        Authority::Admin
    } else if caller.permissions.manage_messages()
        || caller.permissions.kick_members()
        || has_any(&config.mod_roles)
    {
        Authority::Mod
    } else {
        Authority::Member
    }
}
