//! Marker vocabulary exchanged between roles.
//!
//! The conversation surface is plain text; the pipeline keys off these
//! tokens to interpret each role's outcome. Field labels carry structured
//! values (binary path, artifact directory, rejection reason) inside an
//! otherwise free-form turn.

use crate::conversation::Role;

pub const CODE_READY: &str = "CODE_READY";
pub const BUILD_SUCCEEDED: &str = "BUILD_SUCCEEDED";
pub const BUILD_FAILED: &str = "BUILD_FAILED";
pub const RUN_SUCCEEDED: &str = "RUN_SUCCEEDED";
pub const RUN_FAILED: &str = "RUN_FAILED";
pub const VALIDATION_PASSED: &str = "VALIDATION_PASSED";
pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";

pub const FIELD_BINARY: &str = "binary:";
pub const FIELD_ARTIFACTS: &str = "artifacts:";
pub const FIELD_REASON: &str = "reason:";
pub const FIELD_EVIDENCE: &str = "evidence:";
pub const FIELD_NEXT: &str = "next:";

/// Success marker expected from a worker role, if it has one.
pub fn success_marker(role: Role) -> Option<&'static str> {
    match role {
        Role::Generate => Some(CODE_READY),
        Role::Build => Some(BUILD_SUCCEEDED),
        Role::Run => Some(RUN_SUCCEEDED),
        Role::Validate => Some(VALIDATION_PASSED),
        Role::Moderator => None,
    }
}

/// Failure marker expected from a worker role, if it has one.
pub fn failure_marker(role: Role) -> Option<&'static str> {
    match role {
        Role::Generate => None,
        Role::Build => Some(BUILD_FAILED),
        Role::Run => Some(RUN_FAILED),
        Role::Validate => Some(VALIDATION_FAILED),
        Role::Moderator => None,
    }
}

/// True if `text` asserts the success outcome for `role`.
pub fn claims_success(role: Role, text: &str) -> bool {
    success_marker(role).is_some_and(|m| text.contains(m))
}

/// True if `text` asserts the failure outcome for `role`.
pub fn claims_failure(role: Role, text: &str) -> bool {
    failure_marker(role).is_some_and(|m| text.contains(m))
}

/// True if `text` asserts any outcome (success or failure) for `role`.
///
/// An outcome claim from a tool-backed role whose audit counter did not
/// advance is the hallucination signal.
pub fn claims_outcome(role: Role, text: &str) -> bool {
    claims_success(role, text) || claims_failure(role, text)
}

/// Extracts the value of a `label:` field from a turn's text.
///
/// The value is the remainder of the first line starting with `label`,
/// trimmed. Labels are matched at line start, case-sensitively.
pub fn extract_field<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    text.lines().find_map(|line| {
        let line = line.trim_start();
        line.strip_prefix(label).map(str::trim)
    })
}
