//! Error classification rules
//!
//! A [`RuleSet`] is a plain ordered list of `(Matcher, Disposition)` pairs.
//! The first matching rule wins; an error no rule matches is
//! [`Disposition::Unclassified`] and always ends the operation.

use crate::{ErrorKind, HandlerErrorCode, OperationStatus, Progress, RemoteError};

/// Selects which errors a rule applies to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Matcher {
    /// Any of these service error codes
    Codes(Vec<Box<str>>),
    /// Any of these concrete failure types
    Kinds(Vec<ErrorKind>),
}

impl Matcher {
    pub fn codes(codes: &[&str]) -> Self {
        Self::Codes(codes.iter().map(|c| Box::from(*c)).collect())
    }

    pub fn kinds(kinds: &[ErrorKind]) -> Self {
        Self::Kinds(kinds.to_vec())
    }

    /// True when `error` falls under this matcher
    pub fn matches(&self, error: &RemoteError) -> bool {
        match self {
            Self::Codes(codes) => error
                .code()
                .map_or(false, |code| codes.iter().any(|c| c.as_ref() == code)),
            Self::Kinds(kinds) => kinds.contains(&error.kind),
        }
    }
}

/// How a classified error is treated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Swallow; the prior progress is returned unchanged
    Ignore,
    /// Swallow and force a status
    IgnoreWithStatus(OperationStatus),
    /// Terminal failure with this code and the error's message
    FailWith(HandlerErrorCode),
    /// No rule matched
    Unclassified,
}

impl Disposition {
    pub fn is_ignore(&self) -> bool {
        matches!(self, Self::Ignore | Self::IgnoreWithStatus(_))
    }
}

/// One matcher paired with what to do on a match
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    pub matcher: Matcher,
    pub disposition: Disposition,
}

/// Ordered, immutable list of rules
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule after the existing ones
    pub fn rule(mut self, matcher: Matcher, disposition: Disposition) -> Self {
        self.rules.push(Rule {
            matcher,
            disposition,
        });
        self
    }

    pub fn on_codes(self, codes: &[&str], disposition: Disposition) -> Self {
        self.rule(Matcher::codes(codes), disposition)
    }

    pub fn on_kinds(self, kinds: &[ErrorKind], disposition: Disposition) -> Self {
        self.rule(Matcher::kinds(kinds), disposition)
    }

    /// These rules first, then everything in `base`
    pub fn extend(&self, base: &RuleSet) -> RuleSet {
        self.clone().or_else(base.clone())
    }

    /// Try these rules; if none match, try `fallback`
    pub fn or_else(mut self, fallback: RuleSet) -> RuleSet {
        self.rules.extend(fallback.rules);
        self
    }

    /// First matching disposition, in declaration order
    pub fn classify(&self, error: &RemoteError) -> Disposition {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(error))
            .map(|rule| rule.disposition)
            .unwrap_or(Disposition::Unclassified)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Treat a vanished resource as a finished operation (delete flows)
    pub fn ignore_not_found_as_success() -> RuleSet {
        RuleSet::new().on_codes(
            NOT_FOUND_CODES,
            Disposition::IgnoreWithStatus(OperationStatus::Success),
        )
    }
}

/// Remote is rate limiting the caller
pub const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
];

/// Target does not exist
pub const NOT_FOUND_CODES: &[&str] = &[
    "NotFound",
    "ResourceNotFoundException",
    "ResourceNotFoundFault",
    "NoSuchEntity",
];

/// Create collided with an existing object
pub const ALREADY_EXISTS_CODES: &[&str] = &[
    "AlreadyExists",
    "ResourceAlreadyExistsException",
    "ResourceAlreadyExistsFault",
];

/// Request rejected as malformed
pub const INVALID_REQUEST_CODES: &[&str] = &[
    "ValidationException",
    "InvalidParameterValue",
    "InvalidParameterCombination",
    "MissingParameter",
];

/// Target is busy or in the wrong state for this call
pub const CONFLICT_CODES: &[&str] = &[
    "ConflictException",
    "InvalidStateFault",
    "ResourceInUseException",
];

/// Account limits reached
pub const QUOTA_CODES: &[&str] = &[
    "ServiceQuotaExceededException",
    "LimitExceededException",
    "QuotaExceededFault",
];

/// Caller lacks permission
pub const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "NotAuthorized",
];

/// Rules shared by every operation
pub fn default_rules() -> RuleSet {
    RuleSet::new()
        .on_codes(THROTTLING_CODES, Disposition::FailWith(HandlerErrorCode::Throttling))
        .on_codes(NOT_FOUND_CODES, Disposition::FailWith(HandlerErrorCode::NotFound))
        .on_codes(ALREADY_EXISTS_CODES, Disposition::FailWith(HandlerErrorCode::AlreadyExists))
        .on_codes(INVALID_REQUEST_CODES, Disposition::FailWith(HandlerErrorCode::InvalidRequest))
        .on_codes(CONFLICT_CODES, Disposition::FailWith(HandlerErrorCode::ResourceConflict))
        .on_codes(QUOTA_CODES, Disposition::FailWith(HandlerErrorCode::ServiceLimitExceeded))
        .on_codes(ACCESS_DENIED_CODES, Disposition::FailWith(HandlerErrorCode::AccessDenied))
        .on_kinds(&[ErrorKind::Throttled], Disposition::FailWith(HandlerErrorCode::Throttling))
        .on_kinds(&[ErrorKind::Validation], Disposition::FailWith(HandlerErrorCode::InvalidRequest))
}

/// Classify `error` and fold it into `progress`.
///
/// Ignored errors are dropped for good; everything else ends the
/// operation. A forced `InProgress` status uses a zero delay.
pub fn handle_exception<R>(
    progress: Progress<R>,
    error: &RemoteError,
    rules: &RuleSet,
) -> Progress<R> {
    handle_exception_with_delay(progress, error, rules, 0)
}

/// Like [`handle_exception`], suspending for `delay_seconds` on a forced `InProgress`
pub fn handle_exception_with_delay<R>(
    progress: Progress<R>,
    error: &RemoteError,
    rules: &RuleSet,
    delay_seconds: u32,
) -> Progress<R> {
    apply_disposition(progress, error, rules.classify(error), delay_seconds)
}

pub(crate) fn apply_disposition<R>(
    progress: Progress<R>,
    error: &RemoteError,
    disposition: Disposition,
    delay_seconds: u32,
) -> Progress<R> {
    match disposition {
        Disposition::Ignore => {
            tracing::debug!(code = ?error.code(), kind = ?error.kind, "Ignoring remote error");
            progress
        }
        Disposition::IgnoreWithStatus(status) => {
            tracing::debug!(
                code = ?error.code(),
                ?status,
                "Ignoring remote error with status override"
            );
            progress.with_status(status, delay_seconds)
        }
        Disposition::FailWith(code) => {
            tracing::warn!(%code, error = %error, "Remote call failed");
            Progress::failed(code, error.message.clone())
        }
        Disposition::Unclassified => {
            tracing::error!(
                code = ?error.code(),
                kind = ?error.kind,
                error = %error,
                "Unclassified remote error"
            );
            Progress::failed(HandlerErrorCode::InternalFailure, error.message.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OperationState;

    #[test]
    fn test_first_match_wins() {
        let rules = RuleSet::new()
            .on_codes(&["ThrottlingException"], Disposition::Ignore)
            .on_kinds(
                &[ErrorKind::Service],
                Disposition::FailWith(HandlerErrorCode::InternalFailure),
            );

        let err = RemoteError::service("ThrottlingException", "Rate exceeded");
        assert_eq!(rules.classify(&err), Disposition::Ignore);
    }

    #[test]
    fn test_specific_rules_override_defaults() {
        let specific = RuleSet::new().on_codes(&["ResourceNotFoundException"], Disposition::Ignore);
        let err = RemoteError::service("ResourceNotFoundException", "no such db");

        assert_eq!(
            default_rules().classify(&err),
            Disposition::FailWith(HandlerErrorCode::NotFound)
        );
        assert_eq!(specific.clone().or_else(default_rules()).classify(&err), Disposition::Ignore);
        assert_eq!(specific.extend(&default_rules()).classify(&err), Disposition::Ignore);
    }

    #[test]
    fn test_composition_is_associative() {
        let a = RuleSet::new().on_codes(&["A"], Disposition::Ignore);
        let b = RuleSet::new()
            .on_codes(&["A", "B"], Disposition::FailWith(HandlerErrorCode::Throttling));
        let c = RuleSet::new()
            .on_kinds(&[ErrorKind::Service], Disposition::FailWith(HandlerErrorCode::NotFound));

        let left = a.clone().or_else(b.clone()).or_else(c.clone());
        let right = a.or_else(b.or_else(c));
        assert_eq!(left, right);

        let err = RemoteError::service("B", "b");
        assert_eq!(left.classify(&err), Disposition::FailWith(HandlerErrorCode::Throttling));
    }

    #[test]
    fn test_unmatched_is_unclassified() {
        let err = RemoteError::of_kind(ErrorKind::Connection, "reset by peer");
        assert_eq!(default_rules().classify(&err), Disposition::Unclassified);
        assert_eq!(RuleSet::new().classify(&err), Disposition::Unclassified);
    }

    #[test]
    fn test_kind_matcher() {
        let err = RemoteError::of_kind(ErrorKind::Throttled, "client side limiter");
        assert_eq!(
            default_rules().classify(&err),
            Disposition::FailWith(HandlerErrorCode::Throttling)
        );
    }

    #[test]
    fn test_handle_exception_dispositions() {
        let start = || Progress::progress("db", OperationState::new());

        let err = RemoteError::service("ConflictException", "busy");
        match handle_exception(start(), &err, &default_rules()) {
            Progress::Failed { code, message } => {
                assert_eq!(code, HandlerErrorCode::ResourceConflict);
                assert_eq!(&*message, "busy");
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = RemoteError::of_kind(ErrorKind::Timeout, "timed out");
        assert_eq!(
            handle_exception(start(), &err, &default_rules()),
            Progress::failed(HandlerErrorCode::InternalFailure, "timed out")
        );

        let ignore = RuleSet::new().on_kinds(&[ErrorKind::Timeout], Disposition::Ignore);
        assert_eq!(handle_exception(start(), &err, &ignore), start());

        let err = RemoteError::service("ResourceNotFoundException", "gone");
        let out = handle_exception(start(), &err, &RuleSet::ignore_not_found_as_success());
        assert!(matches!(out, Progress::Success { .. }));
    }

    #[test]
    fn test_forced_in_progress_uses_delay() {
        let rules = RuleSet::new().on_codes(
            &["InvalidStateFault"],
            Disposition::IgnoreWithStatus(OperationStatus::InProgress),
        );
        let err = RemoteError::service("InvalidStateFault", "modifying");
        let start = Progress::progress((), OperationState::new());
        let out = handle_exception_with_delay(start, &err, &rules, 15);
        assert!(matches!(out, Progress::InProgress { delay_seconds: 15, .. }));
    }
}
