//! Black-box tests of the membership engine over in-memory collaborators.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use memberhub_auth::{
    AccessDecision, Action, DenialReason, Expiry, Identity, Plan, ProfileRecord, PunitiveKind,
    PunitiveState, Role, WriteBack,
};
use memberhub_content::{Availability, ContentNode, LockReason};
use memberhub_core::{ContentNodeId, DomainError, FixedClock, PrincipalId};
use memberhub_infra::config::{EngineConfig, SUPREME_ADMIN_EMAIL, BOOTSTRAP_ADMIN_EMAIL};
use memberhub_infra::memory::{
    InMemoryContentRepository, InMemoryProfileStore, InMemorySessionStore,
};
use memberhub_infra::MembershipEngine;

const OWNER: &str = "owner@community.test";
const BOOTSTRAP: &str = "ops@community.test";

type Engine = MembershipEngine<
    Arc<InMemoryProfileStore>,
    Arc<InMemoryContentRepository>,
    Arc<InMemorySessionStore>,
    Arc<FixedClock>,
>;

struct Harness {
    engine: Engine,
    profiles: Arc<InMemoryProfileStore>,
    content: Arc<InMemoryContentRepository>,
    sessions: Arc<InMemorySessionStore>,
    clock: Arc<FixedClock>,
}

fn t(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn harness(now: DateTime<Utc>) -> Harness {
    memberhub_observability::init_for_tests();

    let config = EngineConfig::from_lookup(|key| match key {
        k if k == SUPREME_ADMIN_EMAIL => Some(OWNER.to_string()),
        k if k == BOOTSTRAP_ADMIN_EMAIL => Some(BOOTSTRAP.to_string()),
        _ => None,
    })
    .unwrap();

    let profiles = Arc::new(InMemoryProfileStore::new());
    let content = Arc::new(InMemoryContentRepository::new());
    let sessions = Arc::new(InMemorySessionStore::new());
    let clock = Arc::new(FixedClock::new(now));
    let engine = MembershipEngine::new(
        &config,
        profiles.clone(),
        content.clone(),
        sessions.clone(),
        clock.clone(),
    )
    .unwrap();

    Harness {
        engine,
        profiles,
        content,
        sessions,
        clock,
    }
}

impl Harness {
    fn member(&self, email: &str, configure: impl FnOnce(&mut ProfileRecord)) -> Identity {
        let id = PrincipalId::new();
        let mut record = ProfileRecord::new(id, email);
        record.created_at = Some(t(2023, 6, 1).to_rfc3339());
        configure(&mut record);
        self.profiles.insert(record);
        Identity::authenticated(id, email)
    }

    fn admin(&self) -> Identity {
        self.member("admin@community.test", |r| r.role = Some("admin".to_string()))
    }

    fn id(identity: &Identity) -> PrincipalId {
        identity.id.unwrap()
    }
}

fn diamond_since(anchor: DateTime<Utc>) -> impl FnOnce(&mut ProfileRecord) {
    move |r| {
        r.plan = Some("diamond".to_string());
        r.plan_activated_at = Some(anchor.to_rfc3339());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entitlements
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn drip_scenarios_open_on_schedule() {
    let h = harness(t(2024, 1, 7));
    let member = h.member("a@x.test", diamond_since(t(2024, 1, 1)));
    let node = ContentNode::module(ContentNodeId::new()).locked(7);
    let node_id = node.id;
    h.content.insert_node(node);

    assert_eq!(
        h.engine.resolve_availability(&member, node_id),
        Ok(Availability::PendingDays(1))
    );

    h.clock.set(t(2024, 1, 8));
    assert_eq!(h.engine.resolve_availability(&member, node_id), Ok(Availability::Available));
}

#[test]
fn free_plan_is_prompted_to_upgrade() {
    let h = harness(t(2030, 1, 1));
    let member = h.member("free@x.test", |r| r.plan = Some("free".to_string()));
    let node = ContentNode::module(ContentNodeId::new()).locked(0);
    let node_id = node.id;
    h.content.insert_node(node);

    assert_eq!(
        h.engine.resolve_availability(&member, node_id),
        Ok(Availability::Locked(LockReason::NoPlan))
    );
}

#[test]
fn manual_unlock_overrides_plan_until_revoked() {
    let h = harness(t(2024, 1, 2));
    let admin = h.admin();
    let member = h.member("free@x.test", |r| r.plan = Some("free".to_string()));
    let node = ContentNode::module(ContentNodeId::new()).locked(30);
    let node_id = node.id;
    h.content.insert_node(node);

    assert_eq!(h.engine.grant_manual_unlock(&admin, Harness::id(&member), node_id), Ok(true));
    assert_eq!(h.engine.grant_manual_unlock(&admin, Harness::id(&member), node_id), Ok(false));
    assert_eq!(h.engine.resolve_availability(&member, node_id), Ok(Availability::Available));

    let grant = h.content.grant(Harness::id(&member), node_id).unwrap();
    assert_eq!(grant.granted_by, Harness::id(&admin));

    assert_eq!(h.engine.revoke_manual_unlock(&admin, Harness::id(&member), node_id), Ok(true));
    assert_eq!(
        h.engine.resolve_availability(&member, node_id),
        Ok(Availability::Locked(LockReason::NoPlan))
    );
}

#[test]
fn support_cannot_force_unlock() {
    let h = harness(t(2024, 1, 2));
    let support = h.member("s@x.test", |r| r.role = Some("support".to_string()));
    let member = h.member("m@x.test", |_| {});
    let node = ContentNode::module(ContentNodeId::new()).locked(0);
    let node_id = node.id;
    h.content.insert_node(node);

    assert!(matches!(
        h.engine.grant_manual_unlock(&support, Harness::id(&member), node_id),
        Err(DomainError::PermissionDenied(_))
    ));
}

#[test]
fn dangling_lesson_fails_closed() {
    let h = harness(t(2024, 1, 2));
    let member = h.member("a@x.test", diamond_since(t(2024, 1, 1)));
    let module = ContentNode::module(ContentNodeId::new());
    let lesson = ContentNode::lesson(ContentNodeId::new(), module.id);
    let lesson_id = lesson.id;
    h.content.insert_node(module.clone());
    h.content.insert_node(lesson);

    assert_eq!(h.engine.resolve_availability(&member, lesson_id), Ok(Availability::Available));

    h.content.remove_node(module.id);
    assert_eq!(
        h.engine.resolve_availability(&member, lesson_id),
        Ok(Availability::Locked(LockReason::Unknown))
    );
}

fn corrupt_anchor(r: &mut ProfileRecord) {
    r.plan = Some("diamond".to_string());
    r.plan_activated_at = Some("01/01/2024".to_string());
}

#[test]
fn corrupt_anchor_locks_drip_content_as_unknown() {
    let h = harness(t(2024, 1, 7));
    let member = h.member("a@x.test", corrupt_anchor);
    let node = ContentNode::module(ContentNodeId::new()).locked(7);
    let node_id = node.id;
    h.content.insert_node(node);

    assert_eq!(
        h.engine.resolve_availability(&member, node_id),
        Ok(Availability::Locked(LockReason::Unknown))
    );
}

#[test]
fn corrupt_anchor_leaves_open_and_granted_content_available() {
    let h = harness(t(2024, 1, 7));
    let admin = h.admin();
    let member = h.member("a@x.test", corrupt_anchor);
    let open = ContentNode::module(ContentNodeId::new());
    let granted = ContentNode::module(ContentNodeId::new()).locked(30);
    let (open_id, granted_id) = (open.id, granted.id);
    h.content.insert_node(open);
    h.content.insert_node(granted);
    h.engine.grant_manual_unlock(&admin, Harness::id(&member), granted_id).unwrap();

    assert_eq!(h.engine.resolve_availability(&member, open_id), Ok(Availability::Available));
    assert_eq!(h.engine.resolve_availability(&member, granted_id), Ok(Availability::Available));
}

#[test]
fn corrupt_plan_timestamps_do_not_block_authoring() {
    let h = harness(t(2024, 1, 7));
    let member = h.member("a@x.test", |r| {
        corrupt_anchor(r);
        r.plan_expires_at = Some("soon".to_string());
        r.created_at = Some("yesterday".to_string());
    });

    assert_eq!(
        h.engine.check_access(&member, Action::CreatePost, None),
        Ok(AccessDecision::Authorized)
    );
    assert_eq!(h.engine.resolve_role(&member), Ok(Role::User));
}

#[test]
fn anonymous_visitor_has_no_principal() {
    let h = harness(t(2024, 1, 2));
    assert_eq!(
        h.engine.resolve_availability(&Identity::anonymous(), ContentNodeId::new()),
        Err(DomainError::NoPrincipal)
    );
    assert_eq!(
        h.engine.check_access(&Identity::anonymous(), Action::CreatePost, None),
        Ok(AccessDecision::Denied(DenialReason::NoPrincipal))
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Moderation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn expired_ban_heals_on_read_and_is_persisted() {
    let h = harness(t(2024, 2, 1));
    let member = h.member("a@x.test", |r| {
        r.is_banned = true;
        r.banned_until = Some(t(2024, 1, 1).to_rfc3339());
    });

    assert_eq!(
        h.engine.check_access(&member, Action::CreatePost, None),
        Ok(AccessDecision::Authorized)
    );
    let record = h.profiles.get(Harness::id(&member)).unwrap();
    assert!(!record.is_banned);
}

#[test]
fn heal_write_failure_does_not_deny() {
    let h = harness(t(2024, 2, 1));
    let member = h.member("a@x.test", |r| {
        r.is_muted = true;
        r.muted_until = Some(t(2024, 1, 15).to_rfc3339());
    });
    h.profiles.fail_next_writes(2);

    assert_eq!(
        h.engine.check_access(&member, Action::SendChatMessage, None),
        Ok(AccessDecision::Authorized)
    );
    // Still stale in storage; the next read heals it again.
    assert!(h.profiles.get(Harness::id(&member)).unwrap().is_muted);

    let standing = h.engine.standing(&member).unwrap();
    assert_eq!(standing.mute.state, PunitiveState::Clear);
    assert_eq!(standing.mute.write_back, WriteBack::Persisted);
    assert!(!h.profiles.get(Harness::id(&member)).unwrap().is_muted);
}

#[test]
fn permanent_ban_always_denies() {
    let h = harness(t(2024, 1, 1));
    let member = h.member("a@x.test", |r| r.is_banned = true);

    for years in [0, 1, 50] {
        h.clock.set(t(2024 + years, 1, 1));
        let decision = h.engine.check_access(&member, Action::CreateComment, None).unwrap();
        let AccessDecision::Denied(DenialReason::Banned(notice)) = &decision else {
            panic!("expected ban denial, got {decision:?}");
        };
        assert_eq!(notice.until, Expiry::Permanent);
    }
}

#[test]
fn muted_support_moderates_but_cannot_post() {
    let h = harness(t(2024, 1, 1));
    let support = h.member("s@x.test", |r| {
        r.role = Some("support".to_string());
        r.is_muted = true;
        r.muted_until = Some(t(2024, 1, 3).to_rfc3339());
    });

    let post = h.engine.check_access(&support, Action::CreatePost, None).unwrap();
    assert!(matches!(post, AccessDecision::Denied(DenialReason::Muted(_))));
    assert_eq!(
        h.engine.check_access(&support, Action::DeleteAnyPost, None),
        Ok(AccessDecision::Authorized)
    );
}

#[test]
fn ban_replay_does_not_extend() {
    let h = harness(t(2024, 1, 1));
    let admin = h.admin();
    let member = h.member("a@x.test", |_| {});

    let target = Harness::id(&member);
    let first = h.engine.impose_punitive(&admin, PunitiveKind::Ban, target, Some(3)).unwrap();
    let second = h.engine.impose_punitive(&admin, PunitiveKind::Ban, target, Some(3)).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, PunitiveState::Active(Expiry::At(t(2024, 1, 4))));

    h.clock.advance(Duration::days(3));
    assert_eq!(
        h.engine.check_access(&member, Action::CreatePost, None),
        Ok(AccessDecision::Authorized)
    );
}

#[test]
fn lift_clears_and_support_cannot_impose() {
    let h = harness(t(2024, 1, 1));
    let admin = h.admin();
    let support = h.member("s@x.test", |r| r.role = Some("support".to_string()));
    let member = h.member("a@x.test", |_| {});

    assert!(matches!(
        h.engine.impose_punitive(&support, PunitiveKind::Mute, Harness::id(&member), Some(1)),
        Err(DomainError::PermissionDenied(_))
    ));

    h.engine.impose_punitive(&admin, PunitiveKind::Mute, Harness::id(&member), None).unwrap();
    assert!(!h.engine.check_access(&member, Action::CreatePost, None).unwrap().is_authorized());

    h.engine.lift_punitive(&admin, PunitiveKind::Mute, Harness::id(&member)).unwrap();
    assert!(h.engine.check_access(&member, Action::CreatePost, None).unwrap().is_authorized());
}

#[test]
fn ban_ends_sessions_as_follow_up() {
    let h = harness(t(2024, 1, 1));
    let admin = h.admin();
    let member = h.member("a@x.test", |_| {});
    h.sessions.open_session(Harness::id(&member));
    h.sessions.open_session(Harness::id(&member));

    let outcome = h.engine.ban_and_end_session(&admin, Harness::id(&member), Some(7)).unwrap();
    assert_eq!(outcome.sessions_ended, Ok(2));
    assert_eq!(h.sessions.active_sessions(Harness::id(&member)), 0);

    // A session-layer failure is reported, the ban still stands.
    h.sessions.open_session(Harness::id(&member));
    h.sessions.fail_next_invalidations(1);
    let outcome = h.engine.ban_and_end_session(&admin, Harness::id(&member), None).unwrap();
    assert!(matches!(outcome.sessions_ended, Err(DomainError::Persistence(_))));
    assert_eq!(outcome.state, PunitiveState::Active(Expiry::Permanent));
    assert!(h.profiles.get(Harness::id(&member)).unwrap().is_banned);
}

#[test]
fn banned_admin_cannot_moderate() {
    let h = harness(t(2024, 1, 1));
    let admin = h.member("a@x.test", |r| {
        r.role = Some("admin".to_string());
        r.is_banned = true;
    });
    let member = h.member("m@x.test", |_| {});

    assert!(matches!(
        h.engine.impose_punitive(&admin, PunitiveKind::Ban, Harness::id(&member), Some(1)),
        Err(DomainError::PermissionDenied(msg)) if msg.contains("banned")
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles and plans
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn operator_identities_resolve_from_identity_email() {
    let h = harness(t(2024, 1, 1));
    let owner = h.member(OWNER, |r| r.role = Some("user".to_string()));
    let ops = h.member(BOOTSTRAP, |_| {});

    assert_eq!(h.engine.resolve_role(&owner), Ok(Role::SupremeAdmin));
    assert_eq!(h.engine.resolve_role(&ops), Ok(Role::Admin));
}

#[test]
fn role_changes_respect_the_lattice() {
    let h = harness(t(2024, 1, 1));
    let admin = h.admin();
    let owner = h.member(OWNER, |_| {});
    let member = h.member("m@x.test", |_| {});

    h.engine.change_role(&admin, Harness::id(&member), Role::Support).unwrap();
    assert_eq!(h.engine.resolve_role(&member), Ok(Role::Support));

    assert!(h.engine.change_role(&admin, Harness::id(&owner), Role::User).is_err());
    assert!(h.engine.change_role(&admin, Harness::id(&member), Role::SupremeAdmin).is_err());
    assert!(h.engine.change_role(&member, Harness::id(&admin), Role::User).is_err());
    assert_eq!(h.engine.resolve_role(&owner), Ok(Role::SupremeAdmin));
}

#[test]
fn plan_change_sets_activation_anchor_once() {
    let h = harness(t(2024, 1, 1));
    let admin = h.admin();
    let member = h.member("m@x.test", |_| {});
    let node = ContentNode::module(ContentNodeId::new()).locked(10);
    let node_id = node.id;
    h.content.insert_node(node);

    h.engine
        .change_plan(&admin, Harness::id(&member), Some(Plan::new("diamond")), None)
        .unwrap();
    assert_eq!(
        h.engine.resolve_availability(&member, node_id),
        Ok(Availability::PendingDays(10))
    );

    // A later plan change must not reset the drip clock.
    h.clock.set(t(2024, 1, 6));
    h.engine
        .change_plan(&admin, Harness::id(&member), Some(Plan::new("diamond")), None)
        .unwrap();
    assert_eq!(
        h.engine.resolve_availability(&member, node_id),
        Ok(Availability::PendingDays(5))
    );

    let record = h.profiles.get(Harness::id(&member)).unwrap();
    assert_eq!(record.plan_activated_at, Some(t(2024, 1, 1).to_rfc3339()));
    assert_eq!(record.plan_updated_at, Some(t(2024, 1, 6).to_rfc3339()));
}

#[test]
fn explanation_is_available_for_support_consoles() {
    let h = harness(t(2024, 1, 1));
    let member = h.member("m@x.test", |r| {
        r.is_muted = true;
        r.muted_until = Some(t(2024, 1, 2).to_rfc3339());
    });

    let explanation = h.engine.explain_access(&member, Action::CreatePost, None).unwrap();
    assert!(!explanation.granted);
    assert_eq!(explanation.reason, "you are muted for 1 more day");
    assert_eq!(explanation.role, Some(Role::User));
}
