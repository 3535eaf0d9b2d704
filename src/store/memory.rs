use super::{ArchivedBatch, Store};
use crate::error::{Error, Result};
use crate::model::{
    ArchivedProject, ArchivedProjectId, Group, NewArchivedProject, NewProject, NewSemester,
    NewUser, Project, ProjectId, Semester, SemesterId, User, UserId,
};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
#[cfg(test)]
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
#[cfg(test)]
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    semesters: BTreeMap<SemesterId, Semester>,
    current: Option<SemesterId>,
    users: BTreeMap<UserId, User>,
    projects: BTreeMap<ProjectId, Project>,
    archived: BTreeMap<ArchivedProjectId, ArchivedProject>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn with_pointer(&self, semester: &Semester) -> Semester {
        Semester {
            is_latest: self.current == Some(semester.id),
            ..semester.clone()
        }
    }

    /// Semester of a project which may still be modified.
    fn live_semester_of(&self, id: ProjectId) -> Result<SemesterId> {
        let project = self
            .projects
            .get(&id)
            .ok_or_else(|| Error::not_found("project", id))?;
        if self.current != Some(project.semester) {
            return Err(Error::conflict(format!(
                "project {id} belongs to a past semester and is read-only"
            )));
        }
        Ok(project.semester)
    }

    fn check_username(&self, username: &str, except: Option<UserId>) -> Result<()> {
        let taken = self
            .users
            .values()
            .any(|u| Some(u.id) != except && u.username.eq_ignore_ascii_case(username));
        if taken {
            Err(Error::conflict(format!("username {username:?} is already taken")))
        } else {
            Ok(())
        }
    }
}

/// In-process store, used for tests and embedding. Everything is lost when
/// the value is dropped.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    #[cfg(test)]
    fail_archive: AtomicBool,
    #[cfg(test)]
    archive_delay_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Make the next archival batch fail before anything is written.
    #[cfg(test)]
    pub(crate) fn fail_next_archive(&self) {
        self.fail_archive.store(true, Ordering::SeqCst);
    }

    /// Make the next archival batch wait before it starts.
    #[cfg(test)]
    pub(crate) fn delay_next_archive(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.archive_delay_ms.store(millis, Ordering::SeqCst);
    }

    #[cfg(test)]
    async fn injected_delay(&self) {
        let millis = self.archive_delay_ms.swap(0, Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    #[cfg(not(test))]
    async fn injected_delay(&self) {}

    #[cfg(test)]
    fn injected_fault(&self) -> Result<()> {
        if self.fail_archive.swap(false, Ordering::SeqCst) {
            Err(Error::Storage(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }

    #[cfg(not(test))]
    fn injected_fault(&self) -> Result<()> {
        Ok(())
    }
}

impl Store for MemoryStore {
    async fn semesters(&self) -> Result<Vec<Semester>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .semesters
            .values()
            .map(|s| tables.with_pointer(s))
            .collect())
    }

    async fn semester(&self, id: SemesterId) -> Result<Option<Semester>> {
        let tables = self.tables.lock().await;
        Ok(tables.semesters.get(&id).map(|s| tables.with_pointer(s)))
    }

    async fn current_semester_id(&self) -> Result<Option<SemesterId>> {
        Ok(self.tables.lock().await.current)
    }

    async fn advance_semester(
        &self,
        expected: Option<SemesterId>,
        semester: NewSemester,
    ) -> Result<Semester> {
        let mut tables = self.tables.lock().await;
        if tables.current != expected {
            return Err(Error::conflict(format!(
                "current semester moved from {expected:?} to {:?}",
                tables.current
            )));
        }
        let id = SemesterId(tables.next_id());
        let semester = Semester {
            id,
            term: semester.term,
            academic_year: semester.academic_year,
            start_date: semester.start_date,
            archived: false,
            is_latest: true,
        };
        tables.semesters.insert(id, semester.clone());
        tables.current = Some(id);
        Ok(semester)
    }

    async fn archive_semester(
        &self,
        semester: SemesterId,
        records: Vec<NewArchivedProject>,
        retired: Vec<ProjectId>,
        deactivate: Option<Group>,
    ) -> Result<ArchivedBatch> {
        self.injected_delay().await;
        let mut tables = self.tables.lock().await;
        match tables.semesters.get(&semester) {
            None => return Err(Error::not_found("semester", semester)),
            Some(s) if s.archived => return Err(Error::AlreadyArchived(semester)),
            Some(_) => (),
        }
        let retired = retired.into_iter().collect::<BTreeSet<_>>();
        let live = tables
            .projects
            .values()
            .filter(|p| p.semester == semester)
            .map(|p| p.id)
            .collect::<BTreeSet<_>>();
        if !live.is_subset(&retired) {
            return Err(Error::conflict(format!(
                "live projects of semester {semester} changed during archival"
            )));
        }
        self.injected_fault()?;
        let records = records
            .into_iter()
            .map(|record| record.with_id(ArchivedProjectId(tables.next_id())))
            .collect::<Vec<_>>();
        for record in &records {
            tables.archived.insert(record.id, record.clone());
        }
        tables.projects.retain(|id, _| !retired.contains(id));
        let mut deactivated = 0;
        if let Some(group) = deactivate {
            for user in tables.users.values_mut() {
                if user.is_in(group) && user.is_active {
                    user.is_active = false;
                    deactivated += 1;
                }
            }
        }
        if let Some(s) = tables.semesters.get_mut(&semester) {
            s.archived = true;
        }
        Ok(ArchivedBatch {
            records,
            deactivated,
        })
    }

    async fn archived_projects(&self, semester: SemesterId) -> Result<Vec<ArchivedProject>> {
        Ok(self
            .tables
            .lock()
            .await
            .archived
            .values()
            .filter(|a| a.semester == semester)
            .cloned()
            .collect())
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.lock().await;
        tables.check_username(&user.username, None)?;
        let user = User {
            id: UserId(tables.next_id()),
            username: user.username,
            full_name: user.full_name,
            email: user.email,
            groups: user.groups,
            is_active: true,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn users(&self, group: Option<Group>) -> Result<Vec<User>> {
        Ok(self
            .tables
            .lock()
            .await
            .users
            .values()
            .filter(|u| group.is_none_or(|g| u.is_in(g)))
            .cloned()
            .collect())
    }

    async fn save_user(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&user.id) {
            return Err(Error::not_found("user", user.id));
        }
        tables.check_username(&user.username, Some(user.id))?;
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables.users.remove(&id).is_none() {
            return Err(Error::not_found("user", id));
        }
        tables.projects.retain(|_, p| p.created_by != id);
        for project in tables.projects.values_mut() {
            project.assigned_to.retain(|&u| u != id);
        }
        Ok(())
    }

    async fn create_project(&self, project: NewProject) -> Result<Project> {
        let mut tables = self.tables.lock().await;
        let semester = tables
            .current
            .ok_or_else(|| Error::not_found("semester", "current"))?;
        let project = Project {
            id: ProjectId(tables.next_id()),
            title: project.title,
            description: project.description,
            collaborator: project.collaborator,
            tool: project.tool,
            num_students: project.num_students,
            state: project.state,
            created_by: project.created_by,
            assigned_to: project.assigned_to,
            semester,
            created_at: Utc::now(),
        };
        tables.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn project(&self, id: ProjectId) -> Result<Option<Project>> {
        Ok(self.tables.lock().await.projects.get(&id).cloned())
    }

    async fn projects(&self, semester: SemesterId) -> Result<Vec<Project>> {
        Ok(self
            .tables
            .lock()
            .await
            .projects
            .values()
            .filter(|p| p.semester == semester)
            .cloned()
            .collect())
    }

    async fn save_project(&self, project: &Project) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let semester = tables.live_semester_of(project.id)?;
        tables.projects.insert(
            project.id,
            Project {
                semester,
                ..project.clone()
            },
        );
        Ok(())
    }

    async fn delete_project(&self, id: ProjectId) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.live_semester_of(id)?;
        tables.projects.remove(&id);
        Ok(())
    }
}
