mod common;

use std::sync::atomic::Ordering;

use chrono::Duration;

use common::{Harness, GROUP_CHAT};
use invite_bot::engine::issuance::IssueOutcome;
use invite_bot::engine::{Event, Outcome};
use invite_bot::models::announcement::{Referrer, UnknownReason};
use invite_bot::models::invite::InviteStatus;
use invite_bot::models::membership::MembershipMode;
use invite_bot::models::UserId;
use invite_bot::store::registry::InviteRegistry;
use invite_bot::sweeper;

/// Issue an invite for `referrer` at `at` and return its token name.
async fn issue(h: &Harness, referrer: i64, at: chrono::DateTime<chrono::Utc>) -> String {
    match h.engine.issuance.request_invite(UserId(referrer), at).await.unwrap() {
        IssueOutcome::Issued { token, .. } => token,
        other => panic!("expected Issued, got {other:?}"),
    }
}

#[tokio::test]
async fn join_through_tracked_invite_credits_referrer() {
    let h = Harness::new(common::settings(MembershipMode::RequireMember));
    h.telegram.set_status(42, invite_bot::models::membership::MembershipStatus::Member);
    h.telegram.set_name(42, "@asha");
    let t0 = common::t0();
    let token = issue(&h, 42, t0).await;

    let joined_at = t0 + Duration::minutes(10);
    let a = h
        .engine
        .attribution
        .on_member_joined(GROUP_CHAT, common::person(7, "Ravi"), Some(&token), joined_at)
        .await;

    assert_eq!(
        a.referrer,
        Referrer::Known {
            id: UserId(42),
            display_name: Some("@asha".into()),
        }
    );
    assert!(a.restriction_applied);
    assert_eq!(a.muted_until, joined_at + Duration::seconds(86_400));
    assert_eq!(a.mute_seconds, 86_400);
    assert_eq!(a.rules_url.as_deref(), Some("https://example.org/rules"));

    let record = h.registry.lookup(&token).await.unwrap().unwrap();
    assert_eq!(record.used_by, Some(UserId(7)));
    assert_eq!(record.status(joined_at + Duration::days(1)), InviteStatus::Used);

    let restricted = h.telegram.restricted.lock().clone();
    assert_eq!(restricted, vec![(GROUP_CHAT, UserId(7), a.muted_until)]);
}

#[tokio::test]
async fn join_after_expiry_is_allowed_but_unattributed() {
    let h = Harness::new(common::settings(MembershipMode::RequireNonMember));
    let t0 = common::t0();
    let token = issue(&h, 42, t0).await;

    let a = h
        .engine
        .attribution
        .on_member_joined(
            GROUP_CHAT,
            common::person(7, "Ravi"),
            Some(&token),
            t0 + Duration::seconds(3601),
        )
        .await;

    assert_eq!(a.referrer, Referrer::unknown(UnknownReason::Expired));
    // The join stands and still gets the usual restriction.
    assert!(a.restriction_applied);

    let record = h.registry.lookup(&token).await.unwrap().unwrap();
    assert_eq!(record.used_by, None);
    assert_eq!(
        record.status(t0 + Duration::seconds(3601)),
        InviteStatus::Expired
    );
}

#[tokio::test]
async fn join_exactly_at_expiry_still_counts() {
    let h = Harness::new(common::settings(MembershipMode::RequireNonMember));
    let t0 = common::t0();
    let token = issue(&h, 42, t0).await;

    let a = h
        .engine
        .attribution
        .on_member_joined(
            GROUP_CHAT,
            common::person(7, "Ravi"),
            Some(&token),
            t0 + Duration::seconds(3600),
        )
        .await;
    assert!(matches!(a.referrer, Referrer::Known { id: UserId(42), .. }));
}

#[tokio::test]
async fn second_join_on_same_token_is_an_anomaly() {
    let h = Harness::new(common::settings(MembershipMode::RequireNonMember));
    let t0 = common::t0();
    let token = issue(&h, 42, t0).await;

    let first = h
        .engine
        .attribution
        .on_member_joined(GROUP_CHAT, common::person(7, "Ravi"), Some(&token), t0)
        .await;
    assert!(matches!(first.referrer, Referrer::Known { .. }));

    let second = h
        .engine
        .attribution
        .on_member_joined(GROUP_CHAT, common::person(8, "Zoe"), Some(&token), t0)
        .await;
    assert_eq!(second.referrer, Referrer::unknown(UnknownReason::AlreadyUsed));

    // First redeemer is kept.
    let record = h.registry.lookup(&token).await.unwrap().unwrap();
    assert_eq!(record.used_by, Some(UserId(7)));
}

#[tokio::test]
async fn join_without_link_or_with_foreign_link() {
    let h = Harness::new(common::settings(MembershipMode::RequireNonMember));
    let t0 = common::t0();

    let no_link = h
        .engine
        .attribution
        .on_member_joined(GROUP_CHAT, common::person(7, "Ravi"), None, t0)
        .await;
    assert_eq!(no_link.referrer, Referrer::unknown(UnknownReason::NoToken));
    assert!(no_link.restriction_applied);

    let foreign = h
        .engine
        .attribution
        .on_member_joined(GROUP_CHAT, common::person(8, "Zoe"), Some("Summer meetup"), t0)
        .await;
    assert_eq!(foreign.referrer, Referrer::unknown(UnknownReason::NotTracked));

    // Well-formed but never minted here.
    let stray = h
        .engine
        .attribution
        .on_member_joined(
            GROUP_CHAT,
            common::person(9, "Lee"),
            Some("ref:42:0011aabbccdd"),
            t0,
        )
        .await;
    assert_eq!(stray.referrer, Referrer::unknown(UnknownReason::NotTracked));
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn restriction_failure_does_not_block_announcement() {
    let h = Harness::new(common::settings(MembershipMode::RequireNonMember));
    h.telegram.restrict_down.store(true, Ordering::SeqCst);
    let t0 = common::t0();
    let token = issue(&h, 42, t0).await;

    let a = h
        .engine
        .attribution
        .on_member_joined(GROUP_CHAT, common::person(7, "Ravi"), Some(&token), t0)
        .await;
    assert!(!a.restriction_applied);
    // Attribution is independent of the restriction.
    assert!(matches!(
        a.referrer,
        Referrer::Known {
            id: UserId(42),
            display_name: None
        }
    ));
    assert_eq!(a.member.id, UserId(7));
}

#[tokio::test]
async fn join_via_event_dispatch() {
    let h = Harness::new(common::settings(MembershipMode::RequireNonMember));
    let t0 = common::t0();
    let token = issue(&h, 42, t0).await;

    let outcome = h
        .engine
        .handle(
            Event::MemberJoined {
                chat_id: GROUP_CHAT,
                user: common::person(7, "Ravi"),
                invite_name: Some(token),
            },
            t0,
        )
        .await;
    let Outcome::Joined(a) = outcome else {
        panic!("expected Joined");
    };
    assert_eq!(a.chat_id, GROUP_CHAT);
    assert!(matches!(a.referrer, Referrer::Known { id: UserId(42), .. }));
}

#[tokio::test]
async fn sweep_clears_expired_records_and_idle_locks() {
    let h = Harness::new(common::settings(MembershipMode::RequireNonMember));
    // t0 is long past, so its invites are well beyond expiry + grace.
    issue(&h, 42, common::t0()).await;
    assert_eq!(h.registry.len(), 1);

    let report = sweeper::sweep_once(&h.engine, &h.stores, Duration::seconds(60)).await;
    assert_eq!(report.invites_purged, 1);
    assert_eq!(report.locks_dropped, 1);
    assert!(h.registry.is_empty());
}
