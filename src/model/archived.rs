use super::{Project, SemesterId, User};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ArchivedProjectId(pub i64);

impl fmt::Display for ArchivedProjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A name copied out of a user record at archival time. It is a plain value
/// and can never be followed back to the user it was taken from.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NameSnapshot(String);

impl NameSnapshot {
    pub fn of(user: &User) -> Self {
        NameSnapshot(user.full_name.clone())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for NameSnapshot {
    fn from(name: String) -> Self {
        NameSnapshot(name)
    }
}

impl fmt::Display for NameSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable historical record of a project from a past semester.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ArchivedProject {
    pub id: ArchivedProjectId,
    pub title: String,
    pub description: String,
    pub collaborator: String,
    pub tool: String,
    pub num_students: u32,
    pub state: Option<String>,
    pub creator: NameSnapshot,
    pub assignees: Vec<NameSnapshot>,
    pub semester: SemesterId,
    pub semester_label: String,
    /// Creation time of the live project, not of the archived record.
    pub created_at: DateTime<Utc>,
}

/// An archived record before the store has given it an id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewArchivedProject {
    pub title: String,
    pub description: String,
    pub collaborator: String,
    pub tool: String,
    pub num_students: u32,
    pub state: Option<String>,
    pub creator: NameSnapshot,
    pub assignees: Vec<NameSnapshot>,
    pub semester: SemesterId,
    pub semester_label: String,
    pub created_at: DateTime<Utc>,
}

impl NewArchivedProject {
    /// Freeze `project`, copying the names of the people involved as they are now.
    pub fn snapshot(
        project: &Project,
        creator: &User,
        assignees: &[&User],
        semester_label: &str,
    ) -> Self {
        NewArchivedProject {
            title: project.title.clone(),
            description: project.description.clone(),
            collaborator: project.collaborator.clone(),
            tool: project.tool.clone(),
            num_students: project.num_students,
            state: project.state.clone(),
            creator: NameSnapshot::of(creator),
            assignees: assignees.iter().map(|u| NameSnapshot::of(u)).collect(),
            semester: project.semester,
            semester_label: semester_label.to_owned(),
            created_at: project.created_at,
        }
    }

    pub fn with_id(self, id: ArchivedProjectId) -> ArchivedProject {
        ArchivedProject {
            id,
            title: self.title,
            description: self.description,
            collaborator: self.collaborator,
            tool: self.tool,
            num_students: self.num_students,
            state: self.state,
            creator: self.creator,
            assignees: self.assignees,
            semester: self.semester,
            semester_label: self.semester_label,
            created_at: self.created_at,
        }
    }
}
