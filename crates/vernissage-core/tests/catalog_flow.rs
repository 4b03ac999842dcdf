use chrono::Utc;
use tempfile::tempdir;
use vernissage_core::catalog::Catalog;
use vernissage_core::filter::Filter;
use vernissage_core::happening::{Happening, Status};
use vernissage_core::newsletter::Subscriber;

#[test]
fn catalog_roundtrip_and_filtering() {
    let temp = tempdir().expect("tempdir");
    let catalog = Catalog::open(temp.path()).expect("open catalog");

    let now = Utc::now();
    let mut happening = Happening::new_scheduled(
        "Formations of Light".to_string(),
        "exhibition".to_string(),
        now,
        1,
    );
    happening.tags = vec!["painting".to_string(), "group".to_string()];
    happening.venue = Some("Main Gallery".to_string());

    catalog
        .add_happening(vec![], happening.clone())
        .expect("add happening should succeed");

    let happenings = catalog.load_happenings().expect("load happenings");
    assert_eq!(happenings.len(), 1);

    let filter = Filter::parse(&["+painting".to_string()], now).expect("parse filter");
    assert!(filter.matches(&happenings[0], now));

    catalog
        .move_to_archive(happenings[0].uuid)
        .expect("move to archive");
    assert!(catalog.load_happenings().expect("load happenings").is_empty());

    let archive = catalog.load_archive().expect("load archive");
    assert_eq!(archive.len(), 1);
    assert_eq!(archive[0].status, Status::Archived);
    assert_eq!(archive[0].id, None);
}

#[test]
fn fresh_catalog_seeds_builtin_types() {
    let temp = tempdir().expect("tempdir");
    let catalog = Catalog::open(temp.path()).expect("open catalog");

    let types = catalog.types_by_slug().expect("load types");
    assert!(types.contains_key("exhibition"));
    assert!(types.contains_key("event"));
}

#[test]
fn undo_snapshot_restores_previous_state() {
    let temp = tempdir().expect("tempdir");
    let catalog = Catalog::open(temp.path()).expect("open catalog");

    let now = Utc::now();
    let happening =
        Happening::new_scheduled("Night Readings".to_string(), "event".to_string(), now, 1);

    catalog.push_undo_snapshot(&[], &[]).expect("push snapshot");
    catalog
        .add_happening(vec![], happening)
        .expect("add happening");
    assert_eq!(catalog.load_happenings().expect("load happenings").len(), 1);

    let (happenings, archive) = catalog
        .pop_undo_snapshot()
        .expect("pop snapshot")
        .expect("a snapshot was pushed");
    catalog.save_happenings(&happenings).expect("save happenings");
    catalog.save_archive(&archive).expect("save archive");

    assert!(catalog.load_happenings().expect("load happenings").is_empty());
}

#[test]
fn subscriber_roundtrip() {
    let temp = tempdir().expect("tempdir");
    let catalog = Catalog::open(temp.path()).expect("open catalog");

    let now = Utc::now();
    catalog
        .save_subscribers(&[Subscriber {
            email: "curator@example.org".to_string(),
            entry: now,
            source: Some("signup-form".to_string()),
        }])
        .expect("save subscribers");

    let subscribers = catalog.load_subscribers().expect("load subscribers");
    assert_eq!(subscribers.len(), 1);
    assert_eq!(subscribers[0].email, "curator@example.org");
}
