//! Derivation of roles and navigation from group membership.
//!
//! The primary role comes from a fixed precedence table, so the result
//! never depends on the order in which groups were granted or listed.

use crate::model::{Group, GroupSet};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Highest precedence first.
const PRECEDENCE: [Group; 4] = [
    Group::Admin,
    Group::ProgramCoordinator,
    Group::Lecturer,
    Group::Student,
];

/// Navigation targets offered by the dashboard.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum View {
    SemesterManagement,
    UserManagement,
    ProjectManagement,
    PreviousProjects,
    ProjectCatalogue,
    MyProject,
    Submissions,
    PresentationTimeslot,
    SupervisedProjects,
    Applications,
    Evaluations,
    PanelPresentations,
    PanelAssignment,
    PresentationSchedule,
    StudentReports,
    Dashboard,
}

impl View {
    pub const ALL: [View; 16] = [
        View::SemesterManagement,
        View::UserManagement,
        View::ProjectManagement,
        View::PreviousProjects,
        View::ProjectCatalogue,
        View::MyProject,
        View::Submissions,
        View::PresentationTimeslot,
        View::SupervisedProjects,
        View::Applications,
        View::Evaluations,
        View::PanelPresentations,
        View::PanelAssignment,
        View::PresentationSchedule,
        View::StudentReports,
        View::Dashboard,
    ];

    fn for_group(group: Group) -> &'static [View] {
        match group {
            Group::Admin => &View::ALL,
            Group::Student => &[
                View::ProjectCatalogue,
                View::MyProject,
                View::Submissions,
                View::PresentationTimeslot,
                View::PreviousProjects,
            ],
            Group::Lecturer => &[
                View::ProjectCatalogue,
                View::SupervisedProjects,
                View::Applications,
                View::Evaluations,
                View::PanelPresentations,
                View::PreviousProjects,
            ],
            Group::ProgramCoordinator => &[
                View::PanelAssignment,
                View::PresentationSchedule,
                View::StudentReports,
                View::Dashboard,
                View::PreviousProjects,
            ],
        }
    }
}

/// Duties a lecturer may carry on top of supervision.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum LecturerSubrole {
    SupervisorPanel,
    ProgramCoordinator,
}

impl fmt::Display for LecturerSubrole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            LecturerSubrole::SupervisorPanel => "Supervisor, Panel",
            LecturerSubrole::ProgramCoordinator => "Program Coordinator",
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Role {
    pub primary: Group,
    pub views: BTreeSet<View>,
    /// Empty unless the user is a lecturer.
    pub lecturer_subroles: BTreeSet<LecturerSubrole>,
}

impl Role {
    pub fn can_see(&self, view: View) -> bool {
        self.views.contains(&view)
    }

    pub fn is_admin(&self) -> bool {
        self.primary == Group::Admin
    }
}

/// Users without any recognized group are treated as students.
pub fn resolve_role(groups: &GroupSet) -> Role {
    let primary = PRECEDENCE
        .into_iter()
        .find(|&g| groups.contains(g))
        .unwrap_or(Group::Student);
    let views = if groups.is_empty() {
        View::for_group(Group::Student).iter().copied().collect()
    } else {
        groups
            .iter()
            .flat_map(|g| View::for_group(g).iter().copied())
            .collect()
    };
    let lecturer_subroles = if groups.contains(Group::Lecturer) {
        groups
            .iter()
            .filter_map(|g| match g {
                Group::Lecturer => Some(LecturerSubrole::SupervisorPanel),
                Group::ProgramCoordinator => Some(LecturerSubrole::ProgramCoordinator),
                _ => None,
            })
            .collect()
    } else {
        BTreeSet::new()
    };
    Role {
        primary,
        views,
        lecturer_subroles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        let role = resolve_role(&GroupSet::from([Group::Admin, Group::Lecturer]));
        assert_eq!(role.primary, Group::Admin);
        let role = resolve_role(&GroupSet::from([Group::Lecturer, Group::Admin]));
        assert_eq!(role.primary, Group::Admin);
        let role = resolve_role(&GroupSet::from([Group::Lecturer, Group::ProgramCoordinator]));
        assert_eq!(role.primary, Group::ProgramCoordinator);
        let role = resolve_role(&GroupSet::from_ids([1, 2]));
        assert_eq!(role.primary, Group::Lecturer);
    }

    #[test]
    fn test_default_to_student() {
        let role = resolve_role(&GroupSet::new());
        assert_eq!(role.primary, Group::Student);
        assert!(role.can_see(View::MyProject));
        assert!(!role.can_see(View::UserManagement));
        assert!(role.lecturer_subroles.is_empty());
        assert_eq!(resolve_role(&GroupSet::from_ids([7])), role);
    }

    #[test]
    fn test_admin_sees_everything() {
        let role = resolve_role(&GroupSet::from([Group::Admin]));
        assert!(role.is_admin());
        assert!(View::ALL.iter().all(|&v| role.can_see(v)));
    }

    #[test]
    fn test_scoped_views() {
        let student = resolve_role(&GroupSet::from([Group::Student]));
        assert!(!student.can_see(View::SemesterManagement));
        assert!(!student.can_see(View::ProjectManagement));
        assert!(student.can_see(View::PreviousProjects));
        let lecturer = resolve_role(&GroupSet::from([Group::Lecturer]));
        assert!(lecturer.can_see(View::SupervisedProjects));
        assert!(!lecturer.can_see(View::PanelAssignment));
        assert!(!lecturer.can_see(View::UserManagement));
        let coordinator = resolve_role(&GroupSet::from([Group::Lecturer, Group::ProgramCoordinator]));
        assert!(coordinator.can_see(View::SupervisedProjects));
        assert!(coordinator.can_see(View::PanelAssignment));
    }

    #[test]
    fn test_lecturer_subroles() {
        let role = resolve_role(&GroupSet::from([Group::Lecturer, Group::ProgramCoordinator]));
        assert_eq!(
            role.lecturer_subroles.into_iter().collect::<Vec<_>>(),
            vec![
                LecturerSubrole::SupervisorPanel,
                LecturerSubrole::ProgramCoordinator
            ]
        );
        let role = resolve_role(&GroupSet::from([Group::ProgramCoordinator]));
        assert!(role.lecturer_subroles.is_empty());
    }
}
