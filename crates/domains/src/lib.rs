//! newsroom/crates/domains/src/lib.rs
//!
//! The central domain model and interface definitions for newsroom.

pub mod error;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_notice_prefers_first_photo() {
        let fixed = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut clock = MockClock::new();
        clock.expect_now().return_const(fixed);

        let submission = Submission {
            id: 12,
            body: "Road closed on Main St".into(),
            submitter_id: 42,
            submitter_name: "Ana".into(),
            submitter_handle: Some("ana".into()),
            created_at: clock.now(),
            attachments: vec![Attachment::video("v1"), Attachment::photo("p1")],
            origin_attribution: None,
            moderation_correlation: None,
            moderated_at: None,
            reactions: None,
        };

        let notice = ModerationNotice::from(&submission);
        assert_eq!(notice.submission_id, 12);
        assert_eq!(notice.first_attachment, Some(Attachment::photo("p1")));
        assert_eq!(submission.created_at, fixed);
    }
}
