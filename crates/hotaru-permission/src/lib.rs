//! Permission rule evaluation and free-form question gating.
//!
//! Last-match-wins rule evaluation over layered rulesets, an ask/reply flow
//! with sticky "always" approvals and reject-cascade, a doom loop that
//! forces a fresh `ask` after repeated tool failures, and a question
//! mechanism mirroring the same shape.

mod evaluate;
mod question;
mod service;
mod types;

pub use evaluate::{DOOM_LOOP_THRESHOLD, builtin_defaults, evaluate, evaluate_with_rule};
pub use question::{Answer, QuestionAsked, QuestionError, QuestionHandle, QuestionService};
pub use service::{PermissionHandle, PermissionService};
pub use types::{Action, AskError, Decision, PermissionAsked, PermissionRule, SessionId};
