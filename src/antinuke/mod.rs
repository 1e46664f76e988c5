//! Antinuke rule engine
//!
//! Each destructive event is screened the same way: the guild must have antinuke
//! enabled, the latest audit entry of the matching kind must point at the affected
//! object, and its actor must not be the bot, an owner or whitelisted. Survivors
//! are reverted and the actor is banned. Compensating calls are independent and
//! best-effort.

mod incident;

pub use incident::{AntinukeIncident, IncidentKind};

use crate::gateway::{AuditKind, ChannelBlueprint, Gateway, GatewayError, RoleBlueprint};
use crate::store::StoreError;
use crate::{ANTINUKE_TARGET, Data};
use serenity::all::{GuildId, RoleId, UserId};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum AntinukeError {
    #[error("Failed to read guild config: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to read audit log: {0}")]
    AuditLog(#[from] GatewayError),
}

/// Why an event was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Disabled,
    NoAuditEntry,
    TargetMismatch,
    ActorIsBot,
    ActorIsOwner,
    ActorWhitelisted,
    /// The member already had administrator before the update
    NotAnAdminGrant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Ignored(IgnoreReason),
    Retaliated(AntinukeIncident),
}

impl Verdict {
    #[must_use]
    pub const fn is_retaliation(&self) -> bool {
        matches!(self, Self::Retaliated(_))
    }
}

enum Screening {
    Culprit(UserId),
    Stop(IgnoreReason),
}

pub struct RuleEngine<'a> {
    data: &'a Data,
    gateway: &'a dyn Gateway,
}

impl<'a> RuleEngine<'a> {
    #[must_use]
    pub fn new(data: &'a Data, gateway: &'a dyn Gateway) -> Self {
        Self { data, gateway }
    }

    async fn screen(
        &self,
        guild_id: GuildId,
        kind: AuditKind,
        target: u64,
    ) -> Result<Screening, AntinukeError> {
        let config = self.data.guild_configs.get(guild_id).await?;
        if !config.antinuke.enabled {
            return Ok(Screening::Stop(IgnoreReason::Disabled));
        }

        let Some(entry) = self.gateway.latest_audit_entry(guild_id, kind).await? else {
            return Ok(Screening::Stop(IgnoreReason::NoAuditEntry));
        };
        if !entry.targets(target) {
            return Ok(Screening::Stop(IgnoreReason::TargetMismatch));
        }

        let actor = entry.actor;
        if actor == self.gateway.bot_user_id() {
            return Ok(Screening::Stop(IgnoreReason::ActorIsBot));
        }
        if self.data.is_owner(guild_id, actor) {
            return Ok(Screening::Stop(IgnoreReason::ActorIsOwner));
        }
        if self.data.whitelist.contains(guild_id, actor) {
            return Ok(Screening::Stop(IgnoreReason::ActorWhitelisted));
        }
        Ok(Screening::Culprit(actor))
    }

    async fn punish(&self, guild_id: GuildId, actor: UserId, kind: IncidentKind) {
        if let Err(e) = self.gateway.ban(guild_id, actor, kind.reason()).await {
            warn!(
                target: ANTINUKE_TARGET,
                guild_id = %guild_id,
                actor = %actor,
                error = %e,
                "Failed to ban antinuke perpetrator"
            );
        }
    }

    async fn report(&self, incident: AntinukeIncident) -> Verdict {
        warn!(
            target: ANTINUKE_TARGET,
            incident_id = %incident.id,
            guild_id = %incident.guild_id,
            kind = %incident.kind,
            perpetrator = %incident.perpetrator,
            target_object = %incident.target,
            "Antinuke triggered"
        );
        if let Err(e) = self
            .gateway
            .post_log(incident.guild_id, &incident.title(), &incident.description())
            .await
        {
            debug!(guild_id = %incident.guild_id, error = %e, "Could not post antinuke log");
        }
        Verdict::Retaliated(incident)
    }

    /// A member was banned
    ///
    /// # Errors
    /// Returns an error if the guild config or audit log cannot be read.
    pub async fn on_member_ban(
        &self,
        guild_id: GuildId,
        banned: UserId,
        banned_label: &str,
    ) -> Result<Verdict, AntinukeError> {
        let actor = match self.screen(guild_id, AuditKind::MemberBan, banned.get()).await? {
            Screening::Culprit(actor) => actor,
            Screening::Stop(reason) => return Ok(Verdict::Ignored(reason)),
        };

        let kind = IncidentKind::Ban;
        if let Err(e) = self.gateway.unban(guild_id, banned, kind.reason()).await {
            warn!(
                target: ANTINUKE_TARGET,
                guild_id = %guild_id,
                user_id = %banned,
                error = %e,
                "Failed to unban antinuke victim"
            );
        }
        self.punish(guild_id, actor, kind).await;

        Ok(self
            .report(AntinukeIncident::new(
                guild_id,
                kind,
                format!("{banned_label} ({banned})"),
                actor,
            ))
            .await)
    }

    /// A channel was deleted. `blueprint` is `None` for channel kinds that cannot
    /// be recreated; the actor is still punished.
    ///
    /// # Errors
    /// Returns an error if the guild config or audit log cannot be read.
    pub async fn on_channel_delete(
        &self,
        guild_id: GuildId,
        channel_id: u64,
        channel_name: &str,
        blueprint: Option<&ChannelBlueprint>,
    ) -> Result<Verdict, AntinukeError> {
        let actor = match self.screen(guild_id, AuditKind::ChannelDelete, channel_id).await? {
            Screening::Culprit(actor) => actor,
            Screening::Stop(reason) => return Ok(Verdict::Ignored(reason)),
        };

        let kind = IncidentKind::ChannelDelete;
        self.punish(guild_id, actor, kind).await;
        if let Some(blueprint) = blueprint {
            if let Err(e) = self
                .gateway
                .create_channel(guild_id, blueprint, kind.reason())
                .await
            {
                warn!(
                    target: ANTINUKE_TARGET,
                    guild_id = %guild_id,
                    channel = %channel_name,
                    error = %e,
                    "Failed to recreate deleted channel"
                );
            }
        }

        Ok(self
            .report(AntinukeIncident::new(
                guild_id,
                kind,
                format!("#{channel_name} ({channel_id})"),
                actor,
            ))
            .await)
    }

    /// A role was deleted. Without a cached snapshot the role cannot be recreated.
    ///
    /// # Errors
    /// Returns an error if the guild config or audit log cannot be read.
    pub async fn on_role_delete(
        &self,
        guild_id: GuildId,
        role_id: RoleId,
        snapshot: Option<&RoleBlueprint>,
    ) -> Result<Verdict, AntinukeError> {
        let actor = match self.screen(guild_id, AuditKind::RoleDelete, role_id.get()).await? {
            Screening::Culprit(actor) => actor,
            Screening::Stop(reason) => return Ok(Verdict::Ignored(reason)),
        };

        let kind = IncidentKind::RoleDelete;
        self.punish(guild_id, actor, kind).await;
        if let Some(blueprint) = snapshot {
            if let Err(e) = self
                .gateway
                .create_role(guild_id, blueprint, kind.reason())
                .await
            {
                warn!(
                    target: ANTINUKE_TARGET,
                    guild_id = %guild_id,
                    role = %blueprint.name,
                    error = %e,
                    "Failed to recreate deleted role"
                );
            }
        }

        let label = snapshot.map_or_else(|| "unknown role".to_string(), |b| format!("@{}", b.name));
        Ok(self
            .report(AntinukeIncident::new(
                guild_id,
                kind,
                format!("{label} ({role_id})"),
                actor,
            ))
            .await)
    }

    /// A member's roles changed. Only a false to true flip of administrator counts.
    ///
    /// # Errors
    /// Returns an error if the guild config or audit log cannot be read.
    pub async fn on_member_update(
        &self,
        guild_id: GuildId,
        member: UserId,
        member_label: &str,
        was_admin: bool,
        is_admin: bool,
    ) -> Result<Verdict, AntinukeError> {
        if was_admin || !is_admin {
            return Ok(Verdict::Ignored(IgnoreReason::NotAnAdminGrant));
        }
        let actor = match self
            .screen(guild_id, AuditKind::MemberRoleUpdate, member.get())
            .await?
        {
            Screening::Culprit(actor) => actor,
            Screening::Stop(reason) => return Ok(Verdict::Ignored(reason)),
        };

        let kind = IncidentKind::AdminGrant;
        self.punish(guild_id, actor, kind).await;
        match self.gateway.admin_roles_of(guild_id, member).await {
            Ok(roles) => {
                for role_id in roles {
                    if let Err(e) = self
                        .gateway
                        .remove_member_role(guild_id, member, role_id, kind.reason())
                        .await
                    {
                        warn!(
                            target: ANTINUKE_TARGET,
                            guild_id = %guild_id,
                            user_id = %member,
                            role_id = %role_id,
                            error = %e,
                            "Failed to strip admin role"
                        );
                    }
                }
            }
            Err(e) => {
                warn!(
                    target: ANTINUKE_TARGET,
                    guild_id = %guild_id,
                    user_id = %member,
                    error = %e,
                    "Failed to look up admin roles"
                );
            }
        }

        Ok(self
            .report(AntinukeIncident::new(
                guild_id,
                kind,
                format!("{member_label} ({member})"),
                actor,
            ))
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{AuditEntry, MockGateway};
    use crate::settings::BotSettings;
    use mockall::predicate::eq;

    const BOT: u64 = 1;
    const NUKER: u64 = 666;
    const GUILD: u64 = 100;

    fn data() -> Data {
        Data::in_memory(BotSettings {
            owner_ids: vec![UserId::new(7)],
            ..BotSettings::default()
        })
    }

    fn gateway_with_audit(kind: AuditKind, actor: u64, target: u64) -> MockGateway {
        let mut gateway = MockGateway::new();
        gateway.expect_bot_user_id().return_const(UserId::new(BOT));
        gateway
            .expect_latest_audit_entry()
            .with(eq(GuildId::new(GUILD)), eq(kind))
            .returning(move |_, _| {
                Ok(Some(AuditEntry {
                    actor: UserId::new(actor),
                    target: Some(target),
                }))
            });
        gateway.expect_post_log().returning(|_, _, _| Ok(()));
        gateway
    }

    #[tokio::test]
    async fn test_disabled_antinuke_makes_no_calls() {
        let data = data();
        data.guild_configs
            .update(GuildId::new(GUILD), |config| config.antinuke.enabled = false)
            .await
            .unwrap();
        // No expectations: any gateway call would panic
        let gateway = MockGateway::new();

        let verdict = RuleEngine::new(&data, &gateway)
            .on_member_ban(GuildId::new(GUILD), UserId::new(50), "victim")
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Ignored(IgnoreReason::Disabled));
    }

    #[tokio::test]
    async fn test_whitelisted_actor_is_not_banned() {
        let data = data();
        data.whitelist
            .add(GuildId::new(GUILD), UserId::new(NUKER))
            .await
            .unwrap();
        let mut gateway = gateway_with_audit(AuditKind::MemberBan, NUKER, 50);
        gateway.expect_ban().never();
        gateway.expect_unban().never();

        let verdict = RuleEngine::new(&data, &gateway)
            .on_member_ban(GuildId::new(GUILD), UserId::new(50), "victim")
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Ignored(IgnoreReason::ActorWhitelisted));
    }

    #[tokio::test]
    async fn test_whitelisted_actor_may_delete_channels_and_roles() {
        let data = data();
        data.whitelist
            .add(GuildId::new(GUILD), UserId::new(NUKER))
            .await
            .unwrap();
        let blueprint = ChannelBlueprint::voice("lounge", None);

        let mut gateway = gateway_with_audit(AuditKind::ChannelDelete, NUKER, 900);
        gateway.expect_ban().never();
        gateway.expect_create_channel().never();
        let verdict = RuleEngine::new(&data, &gateway)
            .on_channel_delete(GuildId::new(GUILD), 900, "lounge", Some(&blueprint))
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Ignored(IgnoreReason::ActorWhitelisted));

        let mut gateway = gateway_with_audit(AuditKind::RoleDelete, NUKER, 300);
        gateway.expect_ban().never();
        gateway.expect_create_role().never();
        let verdict = RuleEngine::new(&data, &gateway)
            .on_role_delete(
                GuildId::new(GUILD),
                RoleId::new(300),
                Some(&RoleBlueprint::named("staff")),
            )
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Ignored(IgnoreReason::ActorWhitelisted));
    }

    #[tokio::test]
    async fn test_owner_and_bot_are_exempt() {
        let data = data();
        let mut gateway = gateway_with_audit(AuditKind::RoleDelete, 7, 300);
        gateway.expect_ban().never();
        let verdict = RuleEngine::new(&data, &gateway)
            .on_role_delete(GuildId::new(GUILD), RoleId::new(300), None)
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Ignored(IgnoreReason::ActorIsOwner));

        let mut gateway = gateway_with_audit(AuditKind::RoleDelete, BOT, 300);
        gateway.expect_ban().never();
        let verdict = RuleEngine::new(&data, &gateway)
            .on_role_delete(GuildId::new(GUILD), RoleId::new(300), None)
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Ignored(IgnoreReason::ActorIsBot));
    }

    #[tokio::test]
    async fn test_audit_entry_for_other_target_is_ignored() {
        let data = data();
        let mut gateway = gateway_with_audit(AuditKind::MemberBan, NUKER, 51);
        gateway.expect_ban().never();

        let verdict = RuleEngine::new(&data, &gateway)
            .on_member_ban(GuildId::new(GUILD), UserId::new(50), "victim")
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Ignored(IgnoreReason::TargetMismatch));
    }

    #[tokio::test]
    async fn test_unauthorized_ban_is_reverted() {
        let data = data();
        let mut gateway = gateway_with_audit(AuditKind::MemberBan, NUKER, 50);
        gateway
            .expect_unban()
            .withf(|guild, user, _| guild.get() == GUILD && user.get() == 50)
            .times(1)
            .returning(|_, _, _| Ok(()));
        gateway
            .expect_ban()
            .withf(|guild, user, reason| {
                guild.get() == GUILD && user.get() == NUKER && reason.contains("Unauthorized ban")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let verdict = RuleEngine::new(&data, &gateway)
            .on_member_ban(GuildId::new(GUILD), UserId::new(50), "victim")
            .await
            .unwrap();
        match verdict {
            Verdict::Retaliated(incident) => {
                assert_eq!(incident.kind, IncidentKind::Ban);
                assert_eq!(incident.perpetrator, UserId::new(NUKER));
            }
            other => panic!("expected retaliation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_channel_recreated_even_when_ban_fails() {
        let data = data();
        let mut gateway = gateway_with_audit(AuditKind::ChannelDelete, NUKER, 900);
        gateway
            .expect_ban()
            .times(1)
            .returning(|_, _, _| Err(GatewayError::Forbidden("higher role".to_string())));
        gateway
            .expect_create_channel()
            .withf(|_, blueprint, _| blueprint.name == "general")
            .times(1)
            .returning(|_, _, _| Ok(serenity::all::ChannelId::new(901)));

        let blueprint = ChannelBlueprint {
            name: "general".to_string(),
            category: None,
            position: Some(0),
            shape: crate::gateway::ChannelShape::Text {
                topic: None,
                nsfw: false,
            },
        };
        let verdict = RuleEngine::new(&data, &gateway)
            .on_channel_delete(GuildId::new(GUILD), 900, "general", Some(&blueprint))
            .await
            .unwrap();
        assert!(verdict.is_retaliation());
    }

    #[tokio::test]
    async fn test_admin_grant_strips_admin_roles() {
        let data = data();
        let mut gateway = gateway_with_audit(AuditKind::MemberRoleUpdate, NUKER, 55);
        gateway.expect_ban().times(1).returning(|_, _, _| Ok(()));
        gateway
            .expect_admin_roles_of()
            .returning(|_, _| Ok(vec![RoleId::new(10), RoleId::new(11)]));
        gateway
            .expect_remove_member_role()
            .withf(|_, user, _, _| user.get() == 55)
            .times(2)
            .returning(|_, _, _, _| Ok(()));

        let verdict = RuleEngine::new(&data, &gateway)
            .on_member_update(GuildId::new(GUILD), UserId::new(55), "member", false, true)
            .await
            .unwrap();
        assert!(verdict.is_retaliation());
    }

    #[tokio::test]
    async fn test_existing_admin_is_not_a_grant() {
        let data = data();
        let gateway = MockGateway::new();
        let verdict = RuleEngine::new(&data, &gateway)
            .on_member_update(GuildId::new(GUILD), UserId::new(55), "member", true, true)
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Ignored(IgnoreReason::NotAnAdminGrant));

        // Ordinary role changes reach the engine too and stop before any call
        for (was_admin, is_admin) in [(false, false), (true, false)] {
            let verdict = RuleEngine::new(&data, &gateway)
                .on_member_update(GuildId::new(GUILD), UserId::new(55), "member", was_admin, is_admin)
                .await
                .unwrap();
            assert_eq!(verdict, Verdict::Ignored(IgnoreReason::NotAnAdminGrant));
        }
    }
}
