use std::time::Duration;

use domains::{Attachment, IntakeEvent, ModerationAction, Partition};
use integration_tests::{album_event, Harness, ADMIN_ID};
use services::IntakeStatus;

const CAPTION: &str = "Storm damage on Elm Road";

fn album(submitter: i64) -> [IntakeEvent; 3] {
    [
        album_event(submitter, "g1", Attachment::photo("a1"), None),
        album_event(submitter, "g1", Attachment::photo("a2"), None),
        album_event(submitter, "g1", Attachment::video("a3"), Some(CAPTION)),
    ]
}

const ORDERS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

#[tokio::test]
async fn album_becomes_one_submission_in_any_order() {
    for order in ORDERS {
        let h = Harness::new();
        let events = album(7);
        for idx in order {
            h.intake.accept(events[idx].clone()).await.unwrap();
        }
        // Nothing is left for the sweeper to create.
        h.clock.advance(Duration::from_secs(5));
        let report = h.aggregator.sweep().await;
        assert!(report.finalized.is_empty(), "order {order:?}");

        let document = h.backend.document().unwrap();
        assert_eq!(document.pending.len(), 1, "order {order:?}");
        let submission = &document.pending[0];
        assert_eq!(submission.body, CAPTION);
        let mut references: Vec<_> = submission.attachments.iter().map(|a| a.reference.as_str()).collect();
        references.sort_unstable();
        assert_eq!(references, vec!["a1", "a2", "a3"], "order {order:?}");
        assert_eq!(h.notifier.notices().len(), 1);
    }
}

#[tokio::test]
async fn caption_creates_and_later_items_append() {
    let h = Harness::new();
    let [a1, a2, a3] = album(7);

    let first = h.intake.accept(a3).await.unwrap();
    assert_eq!(first.status, IntakeStatus::Pending);
    assert_eq!(h.intake.accept(a1).await.unwrap().status, IntakeStatus::Appended);
    assert_eq!(h.intake.accept(a2).await.unwrap().status, IntakeStatus::Appended);
}

#[tokio::test]
async fn captionless_album_is_created_after_the_quiet_period() {
    let h = Harness::new();
    let [a1, a2, _] = album(7);
    assert_eq!(h.intake.accept(a1).await.unwrap().status, IntakeStatus::Buffered);
    assert_eq!(h.intake.accept(a2).await.unwrap().status, IntakeStatus::Buffered);

    h.clock.advance(Duration::from_millis(500));
    assert!(h.aggregator.sweep().await.finalized.is_empty());
    assert!(h.backend.document().is_none());

    h.clock.advance(Duration::from_secs(2));
    let report = h.aggregator.sweep().await;
    assert_eq!(report.finalized.len(), 1);
    let created = &report.finalized[0];
    assert_eq!(created.partition, Partition::Pending);
    assert_eq!(created.submission.attachments.len(), 2);
    assert!(created.submission.body.is_empty());
}

#[tokio::test]
async fn late_items_after_moderation_are_dropped() {
    let h = Harness::new();
    let [a1, a2, a3] = album(7);
    let id = h.intake.accept(a3).await.unwrap().submission.unwrap().id;
    h.desk
        .workflow()
        .decide(id, ModerationAction::Approve)
        .await
        .unwrap()
        .unwrap();

    h.intake.accept(a1).await.unwrap();
    h.intake.accept(a2).await.unwrap();

    let document = h.backend.document().unwrap();
    assert_eq!(document.published[0].attachments, vec![Attachment::video("a3")]);
}

#[tokio::test]
async fn admin_album_keeps_growing_while_published() {
    let h = Harness::new();
    let [a1, a2, a3] = album(ADMIN_ID);
    let created = h.intake.accept(a3).await.unwrap();
    assert_eq!(created.status, IntakeStatus::Published);
    h.intake.accept(a1).await.unwrap();
    h.intake.accept(a2).await.unwrap();

    let document = h.backend.document().unwrap();
    assert_eq!(document.published[0].attachments.len(), 3);
}

#[tokio::test]
async fn separate_albums_stay_separate() {
    let h = Harness::new();
    h.intake
        .accept(album_event(7, "g1", Attachment::photo("x1"), Some("first")))
        .await
        .unwrap();
    h.intake
        .accept(album_event(7, "g2", Attachment::photo("y1"), Some("second")))
        .await
        .unwrap();
    h.intake
        .accept(album_event(8, "g1", Attachment::photo("z1"), Some("third")))
        .await
        .unwrap();

    let document = h.backend.document().unwrap();
    assert_eq!(document.pending.len(), 3);
    assert!(document.duplicate_ids().is_empty());
}
