mod common;

use common::{Ack, FakeVolumio, canonical, feed_track, next_page, track};
use volsync::{
    Crawler, EvictionOrder, MutationKind, MutationOutcome, RotationPolicy, RuleSet, Synchronizer,
};

fn synchronizer(fake: &FakeVolumio) -> Synchronizer<&FakeVolumio, &FakeVolumio> {
    Synchronizer::new(Crawler::new(fake), fake)
}

fn rules(json: &str) -> RuleSet {
    RuleSet::from_json(json).unwrap()
}

#[test]
fn test_single_matching_track_is_added() {
    let fake = FakeVolumio::new()
        .with_playlist("jazz", vec![])
        .with_playlist("- latest 50", vec![]);
    let candidates = vec![
        feed_track("Miles Davis - Kind of Blue", "a"),
        feed_track("Unrelated", "b"),
    ];

    let report = synchronizer(&fake).sync(
        &candidates,
        &rules(r#"{"jazz": ["miles davis"]}"#),
        &RotationPolicy::default(),
    );

    let jazz_adds: Vec<_> = report.for_playlist("jazz").collect();
    assert_eq!(jazz_adds.len(), 1);
    assert_eq!(jazz_adds[0].kind, MutationKind::Add);
    assert_eq!(jazz_adds[0].track.uri, canonical("a"));
    assert_eq!(jazz_adds[0].outcome, MutationOutcome::Acknowledged);
    assert_eq!(fake.playlist_uris("jazz"), vec![canonical("a")]);
    assert_eq!(fake.playlist_uris("- latest 50"), vec![canonical("a")]);
    assert!(report.is_clean());
}

#[test]
fn test_second_run_adds_nothing() {
    let fake = FakeVolumio::new().with_playlist("jazz", vec![]);
    let candidates = vec![
        feed_track("Miles Davis - Kind of Blue", "a"),
        feed_track("Miles Davis Quintet", "c"),
    ];
    let rules = rules(r#"{"jazz": ["miles davis"]}"#);
    let rotation = RotationPolicy::default();

    let first = synchronizer(&fake).sync(&candidates, &rules, &rotation);
    assert_eq!(first.adds().count(), 4);

    let second = synchronizer(&fake).sync(&candidates, &rules, &rotation);
    assert_eq!(second.adds().count(), 0);
    assert_eq!(second.removes().count(), 0);
    assert!(second.newly_added.is_empty());
}

#[test]
fn test_track_already_present_under_another_uri_is_skipped() {
    let fake = FakeVolumio::new().with_playlist(
        "jazz",
        vec![track("mixcloud", "Kind of Blue", &canonical("a"))],
    );
    let candidates = vec![feed_track("Miles Davis - Kind of Blue", "a")];

    let report = synchronizer(&fake).sync(
        &candidates,
        &rules(r#"{"jazz": ["miles davis"]}"#),
        &RotationPolicy::default(),
    );

    assert_eq!(report.adds().count(), 0);
}

#[test]
fn test_candidates_with_same_canonical_uri_are_added_once() {
    let fake = FakeVolumio::new();
    let candidates = vec![
        feed_track("Miles Davis - Kind of Blue", "a"),
        track(
            "mixcloud",
            "Miles Davis - Kind of Blue (repost)",
            "mixcloud/user@username=Other@cloudcast@cloudcastId=a@queue=1",
        ),
    ];

    let report = synchronizer(&fake).sync(
        &candidates,
        &rules(r#"{"jazz": ["miles davis"]}"#),
        &RotationPolicy::default(),
    );

    assert_eq!(report.for_playlist("jazz").count(), 1);
    assert_eq!(report.newly_added.len(), 1);
}

#[test]
fn test_track_matching_two_rules_lands_in_both() {
    let fake = FakeVolumio::new();
    let candidates = vec![feed_track("Alice Coltrane - Journey in Satchidananda", "j")];

    let report = synchronizer(&fake).sync(
        &candidates,
        &rules(r#"{"jazz": ["coltrane"], "spiritual": ["satchidananda"]}"#),
        &RotationPolicy::default(),
    );

    assert_eq!(fake.playlist_uris("jazz"), vec![canonical("j")]);
    assert_eq!(fake.playlist_uris("spiritual"), vec![canonical("j")]);
    // Shared by both playlists, counted once for the rotation.
    assert_eq!(report.newly_added.len(), 1);
    assert_eq!(fake.playlist_uris("- latest 50").len(), 1);
}

#[test]
fn test_rules_are_processed_in_document_order() {
    let fake = FakeVolumio::new();
    let candidates = vec![feed_track("Soul Jazz", "s")];

    synchronizer(&fake).sync(
        &candidates,
        &rules(r#"{"soul": ["soul"], "jazz": ["jazz"]}"#),
        &RotationPolicy::default(),
    );

    let order: Vec<String> = fake
        .edits
        .borrow()
        .iter()
        .map(|(_, playlist, _)| playlist.clone())
        .collect();
    assert_eq!(order, vec!["soul", "jazz", "- latest 50"]);
}

#[test]
fn test_rotation_is_trimmed_from_the_front() {
    let fake = FakeVolumio::new().with_playlist(
        "recent",
        vec![
            track("mixcloud", "Old 1", &canonical("o1")),
            track("mixcloud", "Old 2", &canonical("o2")),
        ],
    );
    let candidates: Vec<_> = (1..=4)
        .map(|i| feed_track(&format!("House {}", i), &format!("n{}", i)))
        .collect();
    let rotation = RotationPolicy::new("recent", 3, EvictionOrder::Front).unwrap();

    let report = synchronizer(&fake).sync(&candidates, &rules(r#"{"house": ["house"]}"#), &rotation);

    assert_eq!(report.newly_added.len(), 4);
    assert_eq!(
        fake.playlist_uris("recent"),
        vec![canonical("n1"), canonical("n2"), canonical("n3")]
    );
    let removed: Vec<String> = report
        .removes()
        .map(|m| m.track.uri.clone())
        .collect();
    assert_eq!(
        removed,
        vec![canonical("o1"), canonical("o2")]
    );
}

#[test]
fn test_rotation_can_evict_newest_first() {
    let fake = FakeVolumio::new().with_playlist(
        "recent",
        vec![
            track("mixcloud", "Old 1", &canonical("o1")),
            track("mixcloud", "Old 2", &canonical("o2")),
        ],
    );
    let candidates = vec![feed_track("House 1", "n1"), feed_track("House 2", "n2")];
    let rotation = RotationPolicy::new("recent", 3, EvictionOrder::Back).unwrap();

    synchronizer(&fake).sync(&candidates, &rules(r#"{"house": ["house"]}"#), &rotation);

    assert_eq!(
        fake.playlist_uris("recent"),
        vec![canonical("o1"), canonical("o2"), canonical("n1")]
    );
}

#[test]
fn test_rotation_bound_holds_without_new_tracks() {
    let fake = FakeVolumio::new().with_playlist(
        "recent",
        (0..5)
            .map(|i| track("mixcloud", "Old", &canonical(&i.to_string())))
            .collect(),
    );
    let rotation = RotationPolicy::new("recent", 2, EvictionOrder::Front).unwrap();

    let report = synchronizer(&fake).sync(&[], &rules(r#"{"house": ["house"]}"#), &rotation);

    assert_eq!(report.removes().count(), 3);
    assert_eq!(fake.playlist("recent").len(), 2);
}

#[test]
fn test_unacknowledged_adds_are_reported_unknown() {
    let fake = FakeVolumio::new();
    fake.acknowledge(Ack::Silent);
    let candidates = vec![feed_track("Miles Davis", "a")];

    let report = synchronizer(&fake).sync(
        &candidates,
        &rules(r#"{"jazz": ["miles"]}"#),
        &RotationPolicy::default(),
    );

    assert!(report.mutations.iter().all(|m| m.outcome == MutationOutcome::Unknown));
    assert_eq!(report.unknown_outcomes(), 2);
    assert_eq!(report.newly_added.len(), 1);
}

#[test]
fn test_rejected_adds_do_not_feed_the_rotation() {
    let fake = FakeVolumio::new();
    fake.acknowledge(Ack::Error);
    let candidates = vec![feed_track("Miles Davis", "a")];

    let report = synchronizer(&fake).sync(
        &candidates,
        &rules(r#"{"jazz": ["miles"]}"#),
        &RotationPolicy::default(),
    );

    assert_eq!(report.adds().count(), 1);
    assert!(matches!(
        report.mutations[0].outcome,
        MutationOutcome::Rejected(_)
    ));
    assert!(report.newly_added.is_empty());
}

#[test]
fn test_failing_playlist_does_not_stop_the_pass() {
    let fake = FakeVolumio::new().with_broken("playlists/jazz");
    let candidates = vec![feed_track("Miles Davis Soul", "a")];

    let report = synchronizer(&fake).sync(
        &candidates,
        &rules(r#"{"jazz": ["miles"], "soul": ["soul"]}"#),
        &RotationPolicy::default(),
    );

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].playlist, "jazz");
    assert_eq!(fake.playlist_uris("soul"), vec![canonical("a")]);
}

#[test]
fn test_failing_add_abandons_only_its_playlist() {
    let fake = FakeVolumio::new().with_failing_add(&canonical("b"));
    let candidates = vec![
        feed_track("Miles Davis - Kind of Blue", "a"),
        feed_track("Miles Davis - Bitches Brew", "b"),
        feed_track("Miles Davis - In a Silent Way", "c"),
        feed_track("Soul Power", "s"),
    ];

    let report = synchronizer(&fake).sync(
        &candidates,
        &rules(r#"{"jazz": ["miles"], "soul": ["soul"]}"#),
        &RotationPolicy::default(),
    );

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].playlist, "jazz");
    // The pass stops at "b": "c" is never tried.
    assert_eq!(fake.playlist_uris("jazz"), vec![canonical("a")]);
    assert_eq!(fake.playlist_uris("soul"), vec![canonical("s")]);
    assert_eq!(
        fake.playlist_uris("- latest 50"),
        vec![canonical("a"), canonical("s")]
    );
    assert_eq!(
        report.newly_added.iter().map(|t| t.uri.clone()).collect::<Vec<_>>(),
        vec![canonical("a"), canonical("s")]
    );
}

#[test]
fn test_dedupe_removes_all_but_one_copy() {
    let kept = track("mixcloud", "Twice", &canonical("t"));
    let fake = FakeVolumio::new().with_playlist(
        "jazz",
        vec![
            kept.clone(),
            track("mixcloud", "Single", &canonical("s")),
            kept.clone(),
            kept.clone(),
            // Same URI, different record: not an exact duplicate.
            track("mixcloud", "Twice (edit)", &canonical("t")),
        ],
    );

    let mutations = synchronizer(&fake).dedupe("jazz").unwrap();

    assert_eq!(mutations.len(), 2);
    assert!(mutations.iter().all(|m| m.kind == MutationKind::Remove));
    assert_eq!(fake.playlist("jazz").len(), 3);
}

#[test]
fn test_dedupe_on_clean_playlist_does_nothing() {
    let fake = FakeVolumio::new().with_playlist(
        "jazz",
        vec![track("mixcloud", "A", &canonical("a")), track("mixcloud", "B", &canonical("b"))],
    );
    assert!(synchronizer(&fake).dedupe("jazz").unwrap().is_empty());
    assert!(fake.edits.borrow().is_empty());
}

#[test]
fn test_collect_then_sync() {
    let fake = FakeVolumio::new()
        .with_playlist(
            "- latest 50",
            vec![
                track("mixcloud", "Known 1", &canonical("k1")),
                track("mixcloud", "Known 2", &canonical("k2")),
            ],
        )
        .with_feed_page(
            "mixcloud/user@username=NTSRadio",
            vec![
                feed_track("Floating Points - Jazz set", "f1"),
                feed_track("Known 1", "k1"),
                next_page("mixcloud/user@username=NTSRadio@page=2"),
            ],
        )
        .with_feed_page(
            "mixcloud/user@username=NTSRadio@page=2",
            vec![
                feed_track("Known 2", "k2"),
                next_page("mixcloud/user@username=NTSRadio@page=3"),
            ],
        )
        .with_feed_page(
            "mixcloud/user@username=NTSRadio@page=3",
            vec![feed_track("Older Jazz", "old")],
        );

    let sync = synchronizer(&fake);
    let candidates = sync
        .crawler()
        .collect_candidates(&["mixcloud/user@username=NTSRadio".to_string()], "- latest 50", 2)
        .unwrap();
    assert_eq!(candidates.len(), 3);
    assert!(
        !fake
            .fetched
            .borrow()
            .contains(&"mixcloud/user@username=NTSRadio@page=3".to_string())
    );

    let report = sync.sync(&candidates, &rules(r#"{"jazz": ["jazz"]}"#), &RotationPolicy::default());
    assert_eq!(fake.playlist_uris("jazz"), vec![canonical("f1")]);
    assert_eq!(fake.playlist("- latest 50").len(), 3);
    assert!(report.is_clean());
}
