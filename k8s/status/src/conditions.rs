//! Gateway API condition vocabulary (§4.9 step 6): `Accepted` and
//! `ResolvedRefs` are set independently, and an error whose `kind()` isn't
//! one of the reasons this module knows about marks both conditions false
//! rather than inventing a reason string.

use chrono::Utc;
use lbc_core::ControllerError;
use lbc_k8s_api::{Condition, Time};

pub const TYPE_ACCEPTED: &str = "Accepted";
pub const TYPE_RESOLVED_REFS: &str = "ResolvedRefs";
pub const TYPE_PROGRAMMED: &str = "Programmed";

pub const REASON_ACCEPTED: &str = "Accepted";
pub const REASON_PROGRAMMED: &str = "Programmed";
pub const REASON_RESOLVED_REFS: &str = "ResolvedRefs";
pub const REASON_INVALID: &str = "Invalid";
pub const REASON_BACKEND_NOT_FOUND: &str = "BackendNotFound";
pub const REASON_REF_NOT_PERMITTED: &str = "RefNotPermitted";
pub const REASON_PENDING: &str = "Pending";

fn condition(type_: &str, status: bool, reason: &str, message: String, generation: Option<i64>) -> Condition {
    Condition {
        last_transition_time: Time(Utc::now()),
        message,
        observed_generation: generation,
        reason: reason.to_string(),
        status: if status { "True" } else { "False" }.to_string(),
        type_: type_.to_string(),
    }
}

pub fn accepted(generation: Option<i64>) -> Condition {
    condition(
        TYPE_ACCEPTED,
        true,
        REASON_ACCEPTED,
        "reconciled successfully".into(),
        generation,
    )
}

pub fn resolved_refs(generation: Option<i64>) -> Condition {
    condition(
        TYPE_RESOLVED_REFS,
        true,
        REASON_RESOLVED_REFS,
        "all references resolved".into(),
        generation,
    )
}

pub fn programmed(generation: Option<i64>) -> Condition {
    condition(
        TYPE_PROGRAMMED,
        true,
        REASON_PROGRAMMED,
        "load balancer programmed".into(),
        generation,
    )
}

/// Reduces a build/synthesis failure to the `(Accepted, ResolvedRefs)` pair
/// a Gateway listener or route parentRef reports. An error kind that isn't
/// in the known reason vocabulary marks both conditions false with a
/// generic `Invalid` reason rather than leaking an AWS-internal error kind
/// into route status.
pub fn from_error(err: &ControllerError, generation: Option<i64>) -> (Condition, Condition) {
    let message = err.to_string();
    let (accepted_reason, refs_resolve) = match err {
        ControllerError::AwsNotFound { .. } => (REASON_BACKEND_NOT_FOUND, false),
        ControllerError::Validation { .. } | ControllerError::Conflict { .. } | ControllerError::Fatal { .. } => {
            (REASON_INVALID, true)
        }
        ControllerError::TokenNotFulfilled { .. }
        | ControllerError::AwsThrottling { .. }
        | ControllerError::AwsConflict { .. }
        | ControllerError::TransientIo { .. } => (REASON_PENDING, true),
    };

    let accepted = condition(TYPE_ACCEPTED, false, accepted_reason, message.clone(), generation);
    let resolved = if refs_resolve {
        resolved_refs(generation)
    } else {
        condition(TYPE_RESOLVED_REFS, false, REASON_REF_NOT_PERMITTED, message, generation)
    };
    (accepted, resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbc_core::ErrorContext;

    #[test]
    fn aws_not_found_marks_backend_not_found_and_resolved() {
        let err = ControllerError::AwsNotFound { context: ErrorContext::none() };
        let (accepted, resolved) = from_error(&err, Some(3));
        assert_eq!(accepted.reason, REASON_BACKEND_NOT_FOUND);
        assert_eq!(accepted.status, "False");
        assert_eq!(resolved.type_, TYPE_RESOLVED_REFS);
        assert_eq!(resolved.status, "True");
        assert_eq!(accepted.observed_generation, Some(3));
    }

    #[test]
    fn validation_marks_invalid_and_refs_not_permitted() {
        let err = ControllerError::validation("bad listener", ErrorContext::none());
        let (accepted, resolved) = from_error(&err, None);
        assert_eq!(accepted.reason, REASON_INVALID);
        assert_eq!(resolved.reason, REASON_REF_NOT_PERMITTED);
        assert_eq!(resolved.status, "False");
    }

    #[test]
    fn throttling_marks_pending_without_failing_resolved_refs() {
        let err = ControllerError::AwsThrottling {
            message: "rate exceeded".into(),
            context: ErrorContext::none(),
        };
        let (accepted, resolved) = from_error(&err, None);
        assert_eq!(accepted.reason, REASON_PENDING);
        assert_eq!(resolved.status, "True");
    }

    #[test]
    fn accepted_condition_reports_true() {
        let condition = accepted(Some(1));
        assert_eq!(condition.status, "True");
        assert_eq!(condition.type_, TYPE_ACCEPTED);
    }
}
