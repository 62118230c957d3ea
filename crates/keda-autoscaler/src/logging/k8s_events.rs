//! Publishing of reconciliation errors as Kubernetes events.

use std::{error::Error, fmt::Write as _};

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::{
    controller,
    events::{Event, EventType, Recorder},
};

use super::controller::ReconcilerError;

/// Upper bound of the event note, in bytes.
const MAX_NOTE_LENGTH: usize = 1024;

/// Renders `error` followed by all of its sources, separated by `: `.
pub fn error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();

    while let Some(error) = source {
        // Writing to a String can't fail
        let _ = write!(message, ": {error}");
        source = error.source();
    }

    message
}

/// Converts a reconciliation error into a publishable Kubernetes [`Event`].
fn error_to_event<E: ReconcilerError>(error: &E) -> Event {
    let mut note = error_chain(error);
    message::truncate_with_ellipsis(&mut note, MAX_NOTE_LENGTH);

    Event {
        type_: EventType::Warning,
        reason: error.category().to_owned(),
        note: Some(note),
        action: "Reconcile".to_owned(),
        secondary: error.secondary_object().map(Into::into),
    }
}

/// Publishes an error returned by the reconciler as event on the reconciled object.
///
/// Meant to be called on the results of [`kube::runtime::Controller::run`]. Other controller
/// errors concern the operator administrator only and are not published.
pub async fn publish_controller_error_as_k8s_event<ReconcileErr, QueueErr>(
    recorder: &Recorder,
    controller_error: &controller::Error<ReconcileErr, QueueErr>,
) where
    ReconcileErr: ReconcilerError,
    QueueErr: Error,
{
    let controller::Error::ReconcilerFailed(error, object) = controller_error else {
        return;
    };

    let reference = ObjectReference::from(object.clone());
    if let Err(error) = recorder.publish(&error_to_event(error), &reference).await {
        tracing::error!(
            error = &error as &dyn Error,
            "Failed to report error as Kubernetes event"
        );
    }
}

mod message {
    /// Ensures that `msg` is at most `max_len` _bytes_ long.
    ///
    /// If `msg` is longer than `max_len` then the extra text is replaced with an ellipsis.
    pub fn truncate_with_ellipsis(msg: &mut String, max_len: usize) {
        const ELLIPSIS: char = '…';
        const ELLIPSIS_LEN: usize = ELLIPSIS.len_utf8();

        if msg.len() > max_len {
            msg.truncate(floor_char_boundary(msg, max_len.saturating_sub(ELLIPSIS_LEN)));
            if ELLIPSIS_LEN <= max_len {
                msg.push(ELLIPSIS);
            }
        }
        debug_assert!(msg.len() <= max_len);
    }

    /// Returns the largest char boundary of `s` that is not after `pos`.
    pub(super) fn floor_char_boundary(s: &str, pos: usize) -> usize {
        (0..=pos.min(s.len()))
            .rev()
            .find(|&index| s.is_char_boundary(index))
            .unwrap_or_default()
    }

    #[cfg(test)]
    mod tests {
        use rstest::rstest;

        use super::*;

        #[rstest]
        #[case::fits("hello", 5, "hello")]
        #[case::one_too_long("hello", 4, "h…")]
        #[case::much_too_long("hello, this is a much larger string", 4, "h…")]
        #[case::emoji("hello🙋", 8, "hello…")]
        #[case::no_room_for_ellipsis("hello", 2, "")]
        fn truncate(#[case] input: &str, #[case] max_len: usize, #[case] expected: &str) {
            let mut msg = input.to_owned();
            truncate_with_ellipsis(&mut msg, max_len);
            assert_eq!(msg, expected);
        }

        #[rstest]
        #[case::ascii("hello", 2, 2)]
        #[case::inside_emoji("hello🙋", 7, 5)]
        #[case::past_the_end("hello", 10, 5)]
        fn floor_boundary(#[case] input: &str, #[case] pos: usize, #[case] expected: usize) {
            assert_eq!(floor_char_boundary(input, pos), expected);
        }
    }
}
