use serde::{Deserialize, Serialize};

use crate::models::Recruiter;

/// Client session state. Guest mode is a local-only override: the
/// ephemeral id never corresponds to a recruiter row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SessionMode {
    Authenticated { recruiter: Recruiter },
    Guest { ephemeral_id: String },
    Unauthenticated,
}

impl SessionMode {
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, SessionMode::Unauthenticated)
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, SessionMode::Guest { .. })
    }

    /// The id to send as `recruiterId` on chat requests, if any.
    pub fn recruiter_id(&self) -> Option<String> {
        match self {
            SessionMode::Authenticated { recruiter } => Some(recruiter.id.to_string()),
            SessionMode::Guest { ephemeral_id } => Some(ephemeral_id.clone()),
            SessionMode::Unauthenticated => None,
        }
    }
}

/// Prefix for synthetic guest identities. Requests carrying such an id
/// skip recruiter resolution and persistence on the server.
pub const GUEST_ID_PREFIX: &str = "guest-";

pub fn is_guest_id(recruiter_id: &str) -> bool {
    recruiter_id.starts_with(GUEST_ID_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_mode_reports_authenticated() {
        let mode = SessionMode::Guest { ephemeral_id: "guest-123".into() };
        assert!(mode.is_authenticated());
        assert!(mode.is_guest());
        assert_eq!(mode.recruiter_id().as_deref(), Some("guest-123"));
    }

    #[test]
    fn unauthenticated_has_no_recruiter_id() {
        assert_eq!(SessionMode::Unauthenticated.recruiter_id(), None);
        assert!(!SessionMode::Unauthenticated.is_authenticated());
    }

    #[test]
    fn guest_id_prefix_detection() {
        assert!(is_guest_id("guest-1700000000000"));
        assert!(!is_guest_id("6a4c7d1e-0000-0000-0000-000000000000"));
    }
}
