//! Administrative façade: every dashboard operation, bounded by a deadline.

use crate::archive::{Archival, Archiver};
use crate::config::AdminConfig;
use crate::error::{Error, Result};
use crate::listing::{self, ListParams, Listable, Page, SortKey};
use crate::model::{
    AcademicYear, Group, GroupSet, NewProject, NewSemester, NewUser, Project, ProjectId,
    ProjectUpdate, Semester, SemesterId, Term, User, UserId, UserUpdate,
};
use crate::registry::Registry;
use crate::roles::{self, Role};
use crate::selector::{ProjectField, ProjectQuery, ProjectSummary, Scope, ViewSelector};
use crate::store::Store;
use chrono::NaiveDate;
use tracing::{info, instrument, warn};

/// Result of the update-semester workflow. The new semester exists whatever
/// happened to the archival of the previous one.
#[derive(Debug)]
pub struct Transition {
    pub semester: Semester,
    pub outcome: TransitionOutcome,
}

impl Transition {
    pub fn deactivated_students(&self) -> usize {
        match &self.outcome {
            TransitionOutcome::Archived(archival) => archival.deactivated_students(),
            _ => 0,
        }
    }
}

#[derive(Debug)]
pub enum TransitionOutcome {
    /// There was no semester before this one.
    NothingToArchive,
    Archived(Archival),
    /// The previous semester is still unarchived; retry or reconcile.
    Failed(Error),
}

/// A page of projects together with where it was read from.
#[derive(Debug)]
pub struct ProjectListing {
    pub query: ProjectQuery,
    pub page: Page<ProjectSummary>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UserField {
    Username,
    FullName,
    Email,
    Group,
}

impl Listable for User {
    type Field = UserField;

    fn search_text(&self) -> Vec<&str> {
        vec![&self.username, &self.email, &self.full_name]
    }

    fn sort_key(&self, field: UserField) -> SortKey<'_> {
        match field {
            UserField::Username => SortKey::Text(&self.username),
            UserField::FullName => SortKey::Text(&self.full_name),
            UserField::Email => SortKey::Text(&self.email),
            UserField::Group => SortKey::Text(roles::resolve_role(&self.groups).primary.name()),
        }
    }
}

pub struct Admin<S> {
    store: S,
    config: AdminConfig,
}

impl<S: Store> Admin<S> {
    pub fn new(store: S, config: AdminConfig) -> Self {
        Admin { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn bounded<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        let deadline = self.config.operation_timeout();
        tokio::time::timeout(deadline, operation)
            .await
            .map_err(|_| Error::Timeout(deadline))?
    }

    pub async fn list_semesters(&self) -> Result<Vec<Semester>> {
        self.bounded(Registry::new(&self.store).list()).await
    }

    pub async fn current_semester(&self) -> Result<Semester> {
        self.bounded(Registry::new(&self.store).current()).await
    }

    pub async fn advance_semester(
        &self,
        term: Term,
        academic_year: AcademicYear,
        start_date: Option<NaiveDate>,
    ) -> Result<Semester> {
        self.bounded(Registry::new(&self.store).advance(term, academic_year, start_date))
            .await
    }

    fn archiver(&self) -> Archiver<'_, S> {
        Archiver::new(&self.store).deactivating_students(self.config.deactivate_students_on_archive)
    }

    /// Archive the live projects of a past semester.
    pub async fn archive_projects(&self, semester: SemesterId) -> Result<Archival> {
        self.bounded(self.archiver().archive(semester)).await
    }

    /// Open the next semester, then archive the one it replaces. Each step
    /// has its own deadline. An archival failure, timeouts included, is
    /// reported in the outcome and leaves the advance in place.
    #[instrument(skip(self))]
    pub async fn update_semester(
        &self,
        term: Term,
        academic_year: AcademicYear,
        start_date: Option<NaiveDate>,
    ) -> Result<Transition> {
        let (outgoing, semester) = self
            .bounded(async {
                let outgoing = self.store.current_semester_id().await?;
                let semester = Registry::new(&self.store)
                    .advance_from(
                        outgoing,
                        NewSemester {
                            term,
                            academic_year,
                            start_date,
                        },
                    )
                    .await?;
                Ok((outgoing, semester))
            })
            .await?;
        let Some(outgoing) = outgoing else {
            return Ok(Transition {
                semester,
                outcome: TransitionOutcome::NothingToArchive,
            });
        };
        let outcome = match self.bounded(self.archiver().archive(outgoing)).await {
            Ok(archival) => TransitionOutcome::Archived(archival),
            Err(e) => {
                warn!(%outgoing, error = %e, "semester advanced but not archived");
                TransitionOutcome::Failed(e)
            }
        };
        Ok(Transition { semester, outcome })
    }

    /// Archive every past semester which is not archived yet.
    pub async fn reconcile(&self) -> Result<Vec<Archival>> {
        self.bounded(self.archiver().reconcile()).await
    }

    pub fn resolve_role(&self, group_ids: &[i64]) -> Role {
        roles::resolve_role(&GroupSet::from_ids(group_ids.iter().copied()))
    }

    pub async fn role_for(&self, user: UserId) -> Result<Role> {
        let user = self.bounded(self.find_user(user)).await?;
        Ok(roles::resolve_role(&user.groups))
    }

    pub async fn select_project_source(
        &self,
        semester: Option<SemesterId>,
        scope: Scope,
    ) -> Result<ProjectQuery> {
        self.bounded(ViewSelector::new(&self.store).select(semester, scope))
            .await
    }

    pub async fn list_projects(
        &self,
        semester: Option<SemesterId>,
        scope: Scope,
        params: &ListParams<ProjectField>,
    ) -> Result<ProjectListing> {
        self.bounded(async {
            let selector = ViewSelector::new(&self.store);
            let query = selector.select(semester, scope).await?;
            let rows = selector.fetch(&query).await?;
            Ok(ProjectListing {
                query,
                page: listing::apply(rows, params),
            })
        })
        .await
    }

    pub async fn list_users(
        &self,
        group: Option<Group>,
        params: &ListParams<UserField>,
    ) -> Result<Page<User>> {
        let users = self.bounded(self.store.users(group)).await?;
        Ok(listing::apply(users, params))
    }

    #[instrument(skip(self, user), fields(username = %user.username))]
    pub async fn create_user(&self, user: NewUser) -> Result<User> {
        user.validate()?;
        let user = self.bounded(self.store.create_user(user)).await?;
        info!(id = %user.id, "user created");
        Ok(user)
    }

    #[instrument(skip(self, update))]
    pub async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<User> {
        self.bounded(async {
            let mut user = self.find_user(id).await?;
            update.apply_to(&mut user)?;
            self.store.save_user(&user).await?;
            Ok(user)
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: UserId) -> Result<()> {
        self.bounded(async {
            self.find_user(id).await?;
            self.store.delete_user(id).await?;
            info!("user deleted");
            Ok(())
        })
        .await
    }

    /// New projects always belong to the semester which is current when
    /// the store writes them.
    #[instrument(skip(self, project), fields(title = %project.title))]
    pub async fn create_project(&self, project: NewProject) -> Result<Project> {
        project.validate()?;
        self.bounded(async {
            self.find_user(project.created_by).await?;
            self.check_users(&project.assigned_to).await?;
            let project = self.store.create_project(project).await?;
            info!(id = %project.id, semester = %project.semester, "project created");
            Ok(project)
        })
        .await
    }

    #[instrument(skip(self, update))]
    pub async fn update_project(&self, id: ProjectId, update: ProjectUpdate) -> Result<Project> {
        self.bounded(async {
            let mut project = self
                .store
                .project(id)
                .await?
                .ok_or_else(|| Error::not_found("project", id))?;
            if let Some(assigned_to) = &update.assigned_to {
                self.check_users(assigned_to).await?;
            }
            update.apply_to(&mut project)?;
            self.store.save_project(&project).await?;
            Ok(project)
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete_project(&self, id: ProjectId) -> Result<()> {
        self.bounded(self.store.delete_project(id)).await
    }

    async fn find_user(&self, id: UserId) -> Result<User> {
        self.store
            .user(id)
            .await?
            .ok_or_else(|| Error::not_found("user", id))
    }

    async fn check_users(&self, ids: &[UserId]) -> Result<()> {
        for &id in ids {
            self.find_user(id).await?;
        }
        Ok(())
    }
}
