//! Source-selection decision table for the translation orchestrator.
//!
//! The orchestrator never branches on errors itself. After every attempt
//! it feeds the current [`Step`] into [`decide`] and executes whatever
//! [`NextAction`] comes back, until the table returns
//! [`NextAction::Return`].
//!
//! ```text
//! step                      condition                         action
//! ------------------------  --------------------------------  ------------------------
//! Start                     word && prefer_dictionary         TryDictionary
//! Start                     otherwise, credential             TryExternal
//! Start                     otherwise, no credential          Return(CredentialsMissing)
//! DictionaryFailed(k)       !allow_fallback                   Return(Propagate)
//! DictionaryFailed(Valid.)  -                                 Return(Propagate)
//! DictionaryFailed(k)       credential                        TryExternal
//! DictionaryFailed(NotFnd)  no credential                     Return(NotFoundWithHint)
//! DictionaryFailed(k)       no credential                     Return(PropagateWithHint)
//! ExternalFailed(k)         -                                 Return(Propagate)
//! ```

use serde::Serialize;

use crate::error::ErrorKind;
use crate::models::InputKind;

/// Where the orchestrator currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Start,
    DictionaryFailed(ErrorKind),
    ExternalFailed(ErrorKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyInput {
    pub kind: InputKind,
    pub prefer_dictionary: bool,
    pub allow_fallback: bool,
    pub step: Step,
    pub has_credential: bool,
}

/// How a terminal failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Failure {
    /// Return the last component error verbatim.
    Propagate,
    /// `WordNotFound` carrying the configure-a-translator hint.
    NotFoundWithHint,
    /// The last component error, kind unchanged, with the hint appended.
    PropagateWithHint,
    /// `AuthFailed("credentials missing")`.
    CredentialsMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    TryDictionary,
    TryExternal,
    Return(Failure),
}

pub fn decide(input: &PolicyInput) -> NextAction {
    match input.step {
        Step::Start => {
            if input.kind == InputKind::Word && input.prefer_dictionary {
                NextAction::TryDictionary
            } else if input.has_credential {
                NextAction::TryExternal
            } else {
                NextAction::Return(Failure::CredentialsMissing)
            }
        }
        Step::DictionaryFailed(kind) => {
            if !input.allow_fallback || kind == ErrorKind::Validation {
                NextAction::Return(Failure::Propagate)
            } else if input.has_credential {
                NextAction::TryExternal
            } else if kind == ErrorKind::WordNotFound {
                NextAction::Return(Failure::NotFoundWithHint)
            } else {
                NextAction::Return(Failure::PropagateWithHint)
            }
        }
        Step::ExternalFailed(_) => NextAction::Return(Failure::Propagate),
    }
}
