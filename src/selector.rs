//! Routing of project reads to the live store or to the archive.

use crate::error::Result;
use crate::listing::{Listable, SortKey};
use crate::model::{ArchivedProject, Group, Project, SemesterId, User, UserId};
use crate::registry::Registry;
use crate::roles::Role;
use crate::store::Store;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Source {
    Live,
    Archive,
}

/// Restriction of a project list to one person.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scope {
    All,
    /// Projects created by this lecturer.
    Supervised(UserId),
    /// Projects this student is assigned to.
    Assigned(UserId),
}

impl Scope {
    /// The "my projects" scope of a user, following the role they act in.
    pub fn mine(user: &User) -> Self {
        if user.is_in(Group::Lecturer) {
            Scope::Supervised(user.id)
        } else if user.is_in(Group::Student) {
            Scope::Assigned(user.id)
        } else {
            Scope::All
        }
    }

    fn admits(self, project: &Project) -> bool {
        match self {
            Scope::All => true,
            Scope::Supervised(user) => project.created_by == user,
            Scope::Assigned(user) => project.assigned_to.contains(&user),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProjectQuery {
    pub source: Source,
    pub semester: SemesterId,
    pub scope: Scope,
}

/// What a role may do with the rows of a query.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ProjectAccess {
    pub edit: bool,
    pub delete: bool,
    pub apply: bool,
}

impl ProjectQuery {
    /// Archived rows are read-only for everyone.
    pub fn access(&self, role: &Role) -> ProjectAccess {
        match self.source {
            Source::Archive => ProjectAccess::default(),
            Source::Live => ProjectAccess {
                edit: role.is_admin(),
                delete: role.is_admin(),
                apply: role.primary == Group::Student,
            },
        }
    }
}

/// A project row as shown in lists, whichever store it comes from.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub id: i64,
    pub source: Source,
    pub title: String,
    pub description: String,
    pub collaborator: String,
    pub tool: String,
    pub num_students: u32,
    pub state: Option<String>,
    pub creator: Option<String>,
    pub assignees: Vec<String>,
    pub semester: SemesterId,
}

impl ProjectSummary {
    fn live(project: Project, users: &HashMap<UserId, User>) -> Self {
        let name = |id: &UserId| users.get(id).map(|u| u.full_name.clone());
        ProjectSummary {
            id: project.id.0,
            source: Source::Live,
            creator: name(&project.created_by),
            assignees: project.assigned_to.iter().filter_map(name).collect(),
            title: project.title,
            description: project.description,
            collaborator: project.collaborator,
            tool: project.tool,
            num_students: project.num_students,
            state: project.state,
            semester: project.semester,
        }
    }

    fn archived(project: ArchivedProject) -> Self {
        ProjectSummary {
            id: project.id.0,
            source: Source::Archive,
            title: project.title,
            description: project.description,
            collaborator: project.collaborator,
            tool: project.tool,
            num_students: project.num_students,
            state: project.state,
            creator: Some(project.creator.to_string()),
            assignees: project.assignees.iter().map(|n| n.to_string()).collect(),
            semester: project.semester,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProjectField {
    Id,
    Title,
    Creator,
    Collaborator,
    Tool,
    Students,
}

impl Listable for ProjectSummary {
    type Field = ProjectField;

    fn search_text(&self) -> Vec<&str> {
        vec![&self.title]
    }

    fn sort_key(&self, field: ProjectField) -> SortKey<'_> {
        match field {
            ProjectField::Id => SortKey::Number(self.id),
            ProjectField::Title => SortKey::Text(&self.title),
            ProjectField::Creator => self
                .creator
                .as_deref()
                .map_or(SortKey::Missing, SortKey::Text),
            ProjectField::Collaborator if self.collaborator.is_empty() => SortKey::Missing,
            ProjectField::Collaborator => SortKey::Text(&self.collaborator),
            ProjectField::Tool if self.tool.is_empty() => SortKey::Missing,
            ProjectField::Tool => SortKey::Text(&self.tool),
            ProjectField::Students => SortKey::Number(i64::from(self.num_students)),
        }
    }
}

pub struct ViewSelector<'a, S> {
    store: &'a S,
}

impl<'a, S: Store> ViewSelector<'a, S> {
    pub fn new(store: &'a S) -> Self {
        ViewSelector { store }
    }

    /// Route a semester to its project source. No semester means the current
    /// one. The current semester is live, every other known semester is read
    /// from the archive, unknown ids are `Error::NotFound`.
    pub async fn select(&self, semester: Option<SemesterId>, scope: Scope) -> Result<ProjectQuery> {
        let registry = Registry::new(self.store);
        let current = registry.current().await?;
        let (source, semester) = match semester {
            None => (Source::Live, current.id),
            Some(id) if id == current.id => (Source::Live, id),
            Some(id) => (Source::Archive, registry.semester(id).await?.id),
        };
        debug!(?source, %semester, "selected project source");
        Ok(ProjectQuery {
            source,
            semester,
            scope,
        })
    }

    pub async fn fetch(&self, query: &ProjectQuery) -> Result<Vec<ProjectSummary>> {
        Ok(match query.source {
            Source::Live => {
                let users = self
                    .store
                    .users(None)
                    .await?
                    .into_iter()
                    .map(|u| (u.id, u))
                    .collect::<HashMap<_, _>>();
                self.store
                    .projects(query.semester)
                    .await?
                    .into_iter()
                    .filter(|p| query.scope.admits(p))
                    .map(|p| ProjectSummary::live(p, &users))
                    .collect()
            }
            // Archived lists are shared by everyone, names are all they hold.
            Source::Archive => self
                .store
                .archived_projects(query.semester)
                .await?
                .into_iter()
                .map(ProjectSummary::archived)
                .collect(),
        })
    }
}
