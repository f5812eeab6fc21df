//! Centralized authorization decisions.
//!
//! Every state-changing operation goes through [`authorize`] — there are no
//! ad hoc role comparisons at call sites. The rule table is evaluated in
//! order, first match wins, over a snapshot of membership state supplied by
//! the caller. The gate itself is pure and synchronous: no I/O, no caching,
//! re-evaluated on every call.
//!
//! ## Rule table
//!
//! | # | Rule | Outcome |
//! |---|------|---------|
//! | 1 | subject role is ADMIN | Allowed |
//! | 2 | no membership on target project | Denied(NotAMember) |
//! | 3 | delete-bug and subject is neither reporter nor PROJECT_MANAGER | Denied(InsufficientRole) |
//! | 4 | action's capability missing from membership | Denied(MissingCapability) |
//! | 5 | create-bug with an assignee lacking membership | Denied(AssigneeNotMember) |
//! | 6 | otherwise | Allowed |

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::models::{Capability, ProjectMembership, Role, Subject};

/// A state-changing action subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    CreateBug,
    UpdateBug,
    DeleteBug,
    Comment,
    Watch,
    ManageMembers,
}

impl Action {
    /// Capabilities that satisfy this action's membership check.
    ///
    /// Watch accepts any working capability: every real member (triager,
    /// commenter, tester) may subscribe to a bug.
    fn accepted_capabilities(self) -> &'static [Capability] {
        match self {
            Action::CreateBug | Action::UpdateBug => &[Capability::ManageBugs],
            Action::Comment => &[Capability::Comment],
            Action::Watch => &[Capability::ManageBugs, Capability::Comment, Capability::Test],
            Action::ManageMembers => &[Capability::ManageProject],
            // Delete is decided by rule 3 (reporter/role), not capabilities.
            Action::DeleteBug => &[],
        }
    }
}

/// Why an action was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    NotAMember,
    InsufficientRole,
    MissingCapability,
    AssigneeNotMember,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DenialReason::NotAMember => "not a project member",
            DenialReason::InsufficientRole => "role does not permit this action",
            DenialReason::MissingCapability => "membership lacks the required capability",
            DenialReason::AssigneeNotMember => "assignee is not a project member",
        };
        f.write_str(s)
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(DenialReason),
}

impl Decision {
    /// Convert a denial into [`Error::Forbidden`].
    pub fn permit(self) -> Result<(), Error> {
        match self {
            Decision::Allowed => Ok(()),
            Decision::Denied(reason) => Err(Error::Forbidden(reason)),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Snapshot of the state the gate decides over.
///
/// The caller loads this fresh for every check; decisions are never cached
/// across mutations.
#[derive(Debug)]
pub struct AuthzContext<'a> {
    pub subject: &'a Subject,
    /// Subject's membership on the target project, if any.
    pub membership: Option<&'a ProjectMembership>,
    /// Whether the assignee named in the command (if any) holds membership
    /// on the target project. Ignored unless the target names an assignee.
    pub assignee_is_member: bool,
}

/// The entity an action is aimed at.
#[derive(Debug, Clone, Copy, Default)]
pub struct Target {
    pub project_id: Uuid,
    /// Reporter of the targeted bug, where the action has one.
    pub reporter_id: Option<Uuid>,
    /// Assignee named by the command, where the action has one.
    pub assignee_id: Option<Uuid>,
}

/// Decide whether `ctx.subject` may perform `action` on `target`.
pub fn authorize(ctx: &AuthzContext<'_>, action: Action, target: &Target) -> Decision {
    // Rule 1: admins bypass everything.
    if ctx.subject.role == Role::Admin {
        return Decision::Allowed;
    }

    // Rule 2: every remaining action requires project membership.
    let membership = match ctx.membership {
        Some(m) if m.project_id == target.project_id => m,
        _ => return Decision::Denied(DenialReason::NotAMember),
    };

    // Rule 3: delete is reporter-or-manager only.
    if action == Action::DeleteBug {
        let is_reporter = target.reporter_id == Some(ctx.subject.id);
        let is_manager = ctx.subject.role == Role::ProjectManager;
        return if is_reporter || is_manager {
            Decision::Allowed
        } else {
            Decision::Denied(DenialReason::InsufficientRole)
        };
    }

    // Rule 4: capability check.
    let accepted = action.accepted_capabilities();
    if !accepted.is_empty() && !membership.capabilities.contains_any(accepted) {
        return Decision::Denied(DenialReason::MissingCapability);
    }

    // Rule 5: creating with an assignee requires the assignee to be a member.
    if action == Action::CreateBug && target.assignee_id.is_some() && !ctx.assignee_is_member {
        return Decision::Denied(DenialReason::AssigneeNotMember);
    }

    Decision::Allowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CapabilitySet;
    use chrono::Utc;

    fn subject(role: Role) -> Subject {
        Subject {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            display_name: "Alice".to_string(),
            role,
        }
    }

    fn membership(subject: &Subject, project_id: Uuid, caps: CapabilitySet) -> ProjectMembership {
        ProjectMembership {
            subject_id: subject.id,
            project_id,
            capabilities: caps,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_admin_always_allowed() {
        let admin = subject(Role::Admin);
        let ctx = AuthzContext {
            subject: &admin,
            membership: None,
            assignee_is_member: false,
        };
        let target = Target {
            project_id: Uuid::new_v4(),
            ..Default::default()
        };
        for action in [
            Action::CreateBug,
            Action::UpdateBug,
            Action::DeleteBug,
            Action::Comment,
            Action::Watch,
            Action::ManageMembers,
        ] {
            assert!(authorize(&ctx, action, &target).is_allowed());
        }
    }

    #[test]
    fn test_non_member_denied() {
        let dev = subject(Role::Developer);
        let ctx = AuthzContext {
            subject: &dev,
            membership: None,
            assignee_is_member: false,
        };
        let target = Target {
            project_id: Uuid::new_v4(),
            ..Default::default()
        };
        assert_eq!(
            authorize(&ctx, Action::Comment, &target),
            Decision::Denied(DenialReason::NotAMember)
        );
    }

    #[test]
    fn test_membership_on_wrong_project_is_not_membership() {
        let dev = subject(Role::Developer);
        let m = membership(&dev, Uuid::new_v4(), CapabilitySet::all());
        let ctx = AuthzContext {
            subject: &dev,
            membership: Some(&m),
            assignee_is_member: false,
        };
        let target = Target {
            project_id: Uuid::new_v4(), // different project
            ..Default::default()
        };
        assert_eq!(
            authorize(&ctx, Action::UpdateBug, &target),
            Decision::Denied(DenialReason::NotAMember)
        );
    }

    #[test]
    fn test_reporter_may_delete_own_bug() {
        let reporter = subject(Role::Reporter);
        let project_id = Uuid::new_v4();
        let m = membership(&reporter, project_id, CapabilitySet::empty());
        let ctx = AuthzContext {
            subject: &reporter,
            membership: Some(&m),
            assignee_is_member: false,
        };
        let target = Target {
            project_id,
            reporter_id: Some(reporter.id),
            assignee_id: None,
        };
        assert!(authorize(&ctx, Action::DeleteBug, &target).is_allowed());
    }

    #[test]
    fn test_reporter_cannot_delete_foreign_bug() {
        let reporter = subject(Role::Reporter);
        let project_id = Uuid::new_v4();
        let m = membership(&reporter, project_id, CapabilitySet::all());
        let ctx = AuthzContext {
            subject: &reporter,
            membership: Some(&m),
            assignee_is_member: false,
        };
        let target = Target {
            project_id,
            reporter_id: Some(Uuid::new_v4()), // someone else's bug
            assignee_id: None,
        };
        assert_eq!(
            authorize(&ctx, Action::DeleteBug, &target),
            Decision::Denied(DenialReason::InsufficientRole)
        );
    }

    #[test]
    fn test_project_manager_may_delete_any_bug() {
        let pm = subject(Role::ProjectManager);
        let project_id = Uuid::new_v4();
        let m = membership(&pm, project_id, CapabilitySet::empty());
        let ctx = AuthzContext {
            subject: &pm,
            membership: Some(&m),
            assignee_is_member: false,
        };
        let target = Target {
            project_id,
            reporter_id: Some(Uuid::new_v4()),
            assignee_id: None,
        };
        assert!(authorize(&ctx, Action::DeleteBug, &target).is_allowed());
    }

    #[test]
    fn test_missing_capability_denied() {
        let qa = subject(Role::Qa);
        let project_id = Uuid::new_v4();
        let m = membership(
            &qa,
            project_id,
            CapabilitySet::empty().with(Capability::Test),
        );
        let ctx = AuthzContext {
            subject: &qa,
            membership: Some(&m),
            assignee_is_member: false,
        };
        let target = Target {
            project_id,
            ..Default::default()
        };
        assert_eq!(
            authorize(&ctx, Action::UpdateBug, &target),
            Decision::Denied(DenialReason::MissingCapability)
        );
        // But Test capability is enough to watch.
        assert!(authorize(&ctx, Action::Watch, &target).is_allowed());
    }

    #[test]
    fn test_create_with_non_member_assignee_denied() {
        let dev = subject(Role::Developer);
        let project_id = Uuid::new_v4();
        let m = membership(
            &dev,
            project_id,
            CapabilitySet::empty().with(Capability::ManageBugs),
        );
        let ctx = AuthzContext {
            subject: &dev,
            membership: Some(&m),
            assignee_is_member: false,
        };
        let target = Target {
            project_id,
            reporter_id: None,
            assignee_id: Some(Uuid::new_v4()),
        };
        assert_eq!(
            authorize(&ctx, Action::CreateBug, &target),
            Decision::Denied(DenialReason::AssigneeNotMember)
        );

        let ctx_ok = AuthzContext {
            assignee_is_member: true,
            ..ctx
        };
        assert!(authorize(&ctx_ok, Action::CreateBug, &target).is_allowed());
    }

    #[test]
    fn test_permit_maps_denial_to_forbidden() {
        let err = Decision::Denied(DenialReason::MissingCapability)
            .permit()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Forbidden(DenialReason::MissingCapability)
        ));
        assert!(Decision::Allowed.permit().is_ok());
    }
}
