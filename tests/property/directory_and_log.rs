//! Property-based tests for the directory and the message log.
//!
//! Uses proptest to verify:
//! 1. The directory never contains the current user or anyone of their role,
//!    and keeps roster order.
//! 2. The pair filter returns an order-preserving subsequence, is pure and
//!    idempotent, and every message belongs to exactly one pair.
//! 3. Search results are a subset of the directory; the empty term is identity.
//! 4. Upload progress never decreases and never exceeds 100.

use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use lmschat::chat::history::{append, messages_for_pair};
use lmschat::directory::{build_directory, search};
use lmschat_proto::message::{FileMeta, Message, MessageBody, MessageId, Timestamp};
use lmschat_proto::upload::{PROGRESS_COMPLETE, UploadingFile};
use lmschat_proto::user::{Role, User, UserId};

// --- Strategies ---

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::Admin), Just(Role::Teacher), Just(Role::Student)]
}

/// Rosters with unique ids `user-0..n`.
fn arb_roster() -> impl Strategy<Value = Vec<User>> {
    prop::collection::vec((arb_role(), "[A-Za-z ]{1,16}", any::<bool>()), 0..24).prop_map(
        |entries| {
            entries
                .into_iter()
                .enumerate()
                .map(|(i, (role, name, online))| User {
                    id: UserId::new(format!("user-{i}")),
                    name,
                    email: format!("user-{i}@lms.test"),
                    role,
                    profile_pic: None,
                    online,
                    last_seen: None,
                })
                .collect()
        },
    )
}

/// Participant ids drawn from a small pool so pairs repeat.
fn arb_participant() -> impl Strategy<Value = UserId> {
    (0u8..5).prop_map(|n| UserId::new(format!("p{n}")))
}

fn arb_log() -> impl Strategy<Value = Vec<Message>> {
    prop::collection::vec((arb_participant(), arb_participant(), any::<bool>()), 0..40).prop_map(
        |entries| {
            entries
                .into_iter()
                .enumerate()
                .map(|(i, (from, to, is_file))| {
                    let body = if is_file {
                        MessageBody::File(FileMeta {
                            name: format!("f{i}.pdf"),
                            size: 1,
                            media_type: "application/pdf".into(),
                            url: format!("file:///f{i}.pdf"),
                        })
                    } else {
                        MessageBody::Text(format!("m{i}"))
                    };
                    Message {
                        id: MessageId::new(i as u64),
                        sender_id: from,
                        receiver_id: to,
                        body,
                        timestamp: Timestamp::from_millis(i as u64),
                        read: false,
                    }
                })
                .collect()
        },
    )
}

// --- Directory ---

proptest! {
    #[test]
    fn directory_excludes_self_and_own_role(
        roster in arb_roster(),
        pick in any::<prop::sample::Index>(),
        seed in any::<u64>(),
    ) {
        prop_assume!(!roster.is_empty());
        let me = &roster[pick.index(roster.len())];
        let mut rng = StdRng::seed_from_u64(seed);
        let directory = build_directory(me, &roster, &mut rng, 0.7);

        for conv in &directory {
            prop_assert_ne!(&conv.id, &me.id);
            prop_assert_ne!(conv.role, me.role);
            prop_assert_eq!(conv.unread, 0);
        }

        let expected: Vec<&UserId> = roster
            .iter()
            .filter(|u| u.role != me.role && u.id != me.id)
            .map(|u| &u.id)
            .collect();
        let actual: Vec<&UserId> = directory.iter().map(|c| &c.id).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn presence_follows_probability_extremes(roster in arb_roster(), seed in any::<u64>()) {
        let me = User {
            id: UserId::new("me"),
            name: "Me".into(),
            email: "me@lms.test".into(),
            role: Role::Student,
            profile_pic: None,
            online: true,
            last_seen: None,
        };
        let mut rng = StdRng::seed_from_u64(seed);
        prop_assert!(build_directory(&me, &roster, &mut rng, 1.0).iter().all(|c| c.online));
        prop_assert!(build_directory(&me, &roster, &mut rng, 0.0).iter().all(|c| !c.online));
    }

    #[test]
    fn search_is_a_filter(roster in arb_roster(), term in "[a-z]{0,3}") {
        let me = User {
            id: UserId::new("me"),
            name: "Me".into(),
            email: "me@lms.test".into(),
            role: Role::Admin,
            profile_pic: None,
            online: true,
            last_seen: None,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let directory = build_directory(&me, &roster, &mut rng, 0.5);

        let hits = search(&directory, &term);
        prop_assert!(hits.len() <= directory.len());
        for hit in &hits {
            prop_assert!(hit.name.to_lowercase().contains(&term));
        }
        prop_assert_eq!(search(&directory, "").len(), directory.len());
    }
}

// --- Message log ---

proptest! {
    #[test]
    fn pair_filter_is_ordered_subsequence(
        log in arb_log(),
        a in arb_participant(),
        b in arb_participant(),
    ) {
        let thread = messages_for_pair(&log, &a, &b);

        // Subsequence of the log in the same order.
        let mut cursor = log.iter();
        for message in &thread {
            prop_assert!(cursor.any(|m| m == message));
            prop_assert!(message.is_between(&a, &b));
        }

        // Nothing that belongs to the pair is left out.
        let expected = log.iter().filter(|m| m.is_between(&a, &b)).count();
        prop_assert_eq!(thread.len(), expected);

        // Symmetric, pure and idempotent.
        prop_assert_eq!(&messages_for_pair(&log, &b, &a), &thread);
        prop_assert_eq!(&messages_for_pair(&log, &a, &b), &thread);
        prop_assert_eq!(&messages_for_pair(&thread, &a, &b), &thread);
    }

    #[test]
    fn every_message_belongs_to_exactly_one_pair(log in arb_log()) {
        let mut pairs: Vec<(UserId, UserId)> = log
            .iter()
            .map(|m| {
                let (x, y) = (m.sender_id.clone(), m.receiver_id.clone());
                if x <= y { (x, y) } else { (y, x) }
            })
            .collect();
        pairs.sort();
        pairs.dedup();

        let total: usize = pairs
            .iter()
            .map(|(x, y)| messages_for_pair(&log, x, y).len())
            .sum();
        prop_assert_eq!(total, log.len());
    }

    #[test]
    fn append_only_grows_at_the_end(log in arb_log(), extra in arb_log()) {
        let mut grown = log.clone();
        for message in extra.clone() {
            grown = append(&grown, message);
        }
        prop_assert_eq!(grown.len(), log.len() + extra.len());
        prop_assert_eq!(&grown[..log.len()], &log[..]);
        prop_assert_eq!(&grown[log.len()..], &extra[..]);
    }
}

// --- Uploads ---

proptest! {
    #[test]
    fn upload_progress_is_monotonic(steps in prop::collection::vec(0u8..=60, 0..40)) {
        let mut upload = UploadingFile::start(
            FileMeta {
                name: "a.bin".into(),
                size: 1,
                media_type: "application/octet-stream".into(),
                url: "file:///a.bin".into(),
            },
            UserId::new("p0"),
            UserId::new("p1"),
        );
        let mut last = upload.progress;
        for step in steps {
            let now = upload.advance(step);
            prop_assert!(now >= last);
            prop_assert!(now <= PROGRESS_COMPLETE);
            last = now;
        }
        upload.complete();
        prop_assert_eq!(upload.progress, PROGRESS_COMPLETE);
        prop_assert_eq!(upload.advance(10), PROGRESS_COMPLETE);
    }
}
