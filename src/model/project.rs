use super::{SemesterId, UserId};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ProjectId(pub i64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A project of the current semester. People are held by reference and
/// resolved when displayed.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub description: String,
    pub collaborator: String,
    pub tool: String,
    pub num_students: u32,
    pub state: Option<String>,
    pub created_by: UserId,
    pub assigned_to: Vec<UserId>,
    pub semester: SemesterId,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub collaborator: String,
    pub tool: String,
    pub num_students: u32,
    pub state: Option<String>,
    pub created_by: UserId,
    pub assigned_to: Vec<UserId>,
}

impl NewProject {
    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProjectUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub collaborator: Option<String>,
    pub tool: Option<String>,
    pub num_students: Option<u32>,
    pub state: Option<String>,
    pub assigned_to: Option<Vec<UserId>>,
}

impl ProjectUpdate {
    pub fn apply_to(self, project: &mut Project) -> Result<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(title) = self.title {
            project.title = title;
        }
        if let Some(description) = self.description {
            project.description = description;
        }
        if let Some(collaborator) = self.collaborator {
            project.collaborator = collaborator;
        }
        if let Some(tool) = self.tool {
            project.tool = tool;
        }
        if let Some(num_students) = self.num_students {
            project.num_students = num_students;
        }
        if let Some(state) = self.state {
            project.state = Some(state);
        }
        if let Some(assigned_to) = self.assigned_to {
            project.assigned_to = assigned_to;
        }
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        Err(Error::validation("project title cannot be empty"))
    } else {
        Ok(())
    }
}
