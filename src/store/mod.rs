//! Persistence collaborators.
//!
//! Every operation is async and either completes or fails with an error.
//! Operations touching several rows are atomic: they apply completely or
//! not at all.

use crate::error::Result;
use crate::model::{
    ArchivedProject, Group, NewArchivedProject, NewProject, NewSemester, NewUser, Project,
    ProjectId, Semester, SemesterId, User, UserId,
};

pub use self::memory::MemoryStore;
pub use self::sql::{Dialect, SqlStore};

mod memory;
mod sql;

/// What an archival batch wrote.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArchivedBatch {
    pub records: Vec<ArchivedProject>,
    /// Accounts switched to inactive by the batch.
    pub deactivated: usize,
}

pub trait Store: Send + Sync {
    /// All semesters, in no particular order, with `is_latest` set from the
    /// current-semester pointer.
    fn semesters(&self) -> impl Future<Output = Result<Vec<Semester>>> + Send;
    fn semester(&self, id: SemesterId) -> impl Future<Output = Result<Option<Semester>>> + Send;
    fn current_semester_id(&self) -> impl Future<Output = Result<Option<SemesterId>>> + Send;

    /// Create a semester and move the current pointer to it, provided the
    /// pointer still designates `expected`. Fails with `Error::Conflict`
    /// otherwise, in which case nothing is written.
    fn advance_semester(
        &self,
        expected: Option<SemesterId>,
        semester: NewSemester,
    ) -> impl Future<Output = Result<Semester>> + Send;

    /// Mark `semester` as archived, insert `records`, delete the `retired`
    /// live projects and deactivate the members of `deactivate`, as one unit.
    /// Fails with `Error::AlreadyArchived` if the semester carries the archived
    /// mark already, and with `Error::Conflict` if the semester holds live
    /// projects missing from `retired`.
    fn archive_semester(
        &self,
        semester: SemesterId,
        records: Vec<NewArchivedProject>,
        retired: Vec<ProjectId>,
        deactivate: Option<Group>,
    ) -> impl Future<Output = Result<ArchivedBatch>> + Send;
    fn archived_projects(
        &self,
        semester: SemesterId,
    ) -> impl Future<Output = Result<Vec<ArchivedProject>>> + Send;

    fn create_user(&self, user: NewUser) -> impl Future<Output = Result<User>> + Send;
    fn user(&self, id: UserId) -> impl Future<Output = Result<Option<User>>> + Send;
    fn users(&self, group: Option<Group>) -> impl Future<Output = Result<Vec<User>>> + Send;
    fn save_user(&self, user: &User) -> impl Future<Output = Result<()>> + Send;
    /// Delete a user, the live projects they created and their assignments.
    fn delete_user(&self, id: UserId) -> impl Future<Output = Result<()>> + Send;

    /// Insert a project into whichever semester is current at write time.
    /// Fails with `Error::NotFound` when no semester exists yet.
    fn create_project(&self, project: NewProject) -> impl Future<Output = Result<Project>> + Send;
    fn project(&self, id: ProjectId) -> impl Future<Output = Result<Option<Project>>> + Send;
    fn projects(&self, semester: SemesterId) -> impl Future<Output = Result<Vec<Project>>> + Send;
    /// Only projects of the current semester can be saved or deleted, others
    /// give `Error::Conflict`. The stored semester of a project never changes.
    fn save_project(&self, project: &Project) -> impl Future<Output = Result<()>> + Send;
    fn delete_project(&self, id: ProjectId) -> impl Future<Output = Result<()>> + Send;
}
