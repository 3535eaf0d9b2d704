use crate::error::{Error, Result};
use crate::model::{
    ArchivedProject, Group, NewArchivedProject, Project, Semester, SemesterId, User, UserId,
};
use crate::registry::Registry;
use crate::store::Store;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// Outcome of an archival request. Asking again for a semester which has
/// been archived already is not an error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Archival {
    Archived {
        semester: SemesterId,
        records: Vec<ArchivedProject>,
        deactivated_students: usize,
    },
    AlreadyArchived {
        semester: SemesterId,
        records: Vec<ArchivedProject>,
    },
}

impl Archival {
    pub fn semester(&self) -> SemesterId {
        match self {
            Archival::Archived { semester, .. } | Archival::AlreadyArchived { semester, .. } => {
                *semester
            }
        }
    }

    pub fn records(&self) -> &[ArchivedProject] {
        match self {
            Archival::Archived { records, .. } | Archival::AlreadyArchived { records, .. } => {
                records
            }
        }
    }

    pub fn count(&self) -> usize {
        self.records().len()
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Archival::Archived { .. })
    }

    /// Student accounts switched off by this archival, zero when nothing
    /// new was archived.
    pub fn deactivated_students(&self) -> usize {
        match self {
            Archival::Archived {
                deactivated_students,
                ..
            } => *deactivated_students,
            Archival::AlreadyArchived { .. } => 0,
        }
    }
}

/// Freezes the live projects of past semesters into archived records.
pub struct Archiver<'a, S> {
    store: &'a S,
    deactivate: Option<Group>,
}

impl<'a, S: Store> Archiver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Archiver {
            store,
            deactivate: None,
        }
    }

    /// Also mark every student inactive, in the same batch as the records.
    pub fn deactivating_students(self, enabled: bool) -> Self {
        Archiver {
            deactivate: enabled.then_some(Group::Student),
            ..self
        }
    }

    /// Archive every live project of `outgoing`, which must not be the
    /// current semester. Safe to retry: once a semester carries the archived
    /// mark, later calls return the records produced the first time.
    #[instrument(skip(self))]
    pub async fn archive(&self, outgoing: SemesterId) -> Result<Archival> {
        let semester = Registry::new(self.store).semester(outgoing).await?;
        if semester.is_latest {
            return Err(Error::validation(format!(
                "{semester} is the current semester and cannot be archived"
            )));
        }
        if semester.archived {
            return self.already_archived(outgoing).await;
        }
        let projects = self.store.projects(outgoing).await?;
        let users = self
            .store
            .users(None)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect::<HashMap<_, _>>();
        let records = projects
            .iter()
            .map(|p| snapshot(p, &users, &semester))
            .collect::<Result<Vec<_>>>()?;
        let retired = projects.iter().map(|p| p.id).collect();
        match self
            .store
            .archive_semester(outgoing, records, retired, self.deactivate)
            .await
        {
            Ok(batch) => {
                info!(
                    count = batch.records.len(),
                    deactivated = batch.deactivated,
                    "projects archived"
                );
                Ok(Archival::Archived {
                    semester: outgoing,
                    records: batch.records,
                    deactivated_students: batch.deactivated,
                })
            }
            Err(Error::AlreadyArchived(_)) => self.already_archived(outgoing).await,
            Err(e) => {
                warn!(error = %e, "archival failed, it can be retried");
                Err(e)
            }
        }
    }

    /// Archive every past semester which has not been archived yet.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<Vec<Archival>> {
        let mut done = Vec::new();
        for semester in Registry::new(self.store).list().await? {
            if !semester.is_latest && !semester.archived {
                done.push(self.archive(semester.id).await?);
            }
        }
        info!(semesters = done.len(), "reconciliation complete");
        Ok(done)
    }

    async fn already_archived(&self, semester: SemesterId) -> Result<Archival> {
        debug!(%semester, "semester has been archived already");
        Ok(Archival::AlreadyArchived {
            semester,
            records: self.store.archived_projects(semester).await?,
        })
    }
}

fn snapshot(
    project: &Project,
    users: &HashMap<UserId, User>,
    semester: &Semester,
) -> Result<NewArchivedProject> {
    let user = |id: &UserId| users.get(id).ok_or_else(|| Error::not_found("user", id));
    let creator = user(&project.created_by)?;
    let assignees = project
        .assigned_to
        .iter()
        .map(user)
        .collect::<Result<Vec<_>>>()?;
    Ok(NewArchivedProject::snapshot(
        project,
        creator,
        &assignees,
        &semester.label(),
    ))
}
