use super::{ArchivedBatch, Store};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::model::{
    AcademicYear, ArchivedProject, ArchivedProjectId, Group, GroupSet, NameSnapshot,
    NewArchivedProject, NewProject, NewSemester, NewUser, Project, ProjectId, Semester,
    SemesterId, Term, User, UserId,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::any::{AnyPoolOptions, AnyQueryResult, AnyRow};
use sqlx::{Any, AnyPool, Row, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dialect {
    MySql,
    Sqlite,
}

impl Dialect {
    pub fn of(url: &str) -> Result<Self> {
        if url.starts_with("mysql:") || url.starts_with("mariadb:") {
            Ok(Dialect::MySql)
        } else if url.starts_with("sqlite:") {
            Ok(Dialect::Sqlite)
        } else {
            Err(Error::validation(format!("unsupported database url {url:?}")))
        }
    }

    fn schema(self) -> Vec<String> {
        let (key, nocase, insert_ignore) = match self {
            Dialect::MySql => (
                "BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY",
                "",
                "INSERT IGNORE",
            ),
            Dialect::Sqlite => (
                "INTEGER PRIMARY KEY AUTOINCREMENT",
                " COLLATE NOCASE",
                "INSERT OR IGNORE",
            ),
        };
        vec![
            format!(
                "CREATE TABLE IF NOT EXISTS semesters (id {key}, term BIGINT NOT NULL, \
                 academic_year VARCHAR(50) NOT NULL, start_date VARCHAR(10) NULL, \
                 archived BIGINT NOT NULL DEFAULT 0)"
            ),
            "CREATE TABLE IF NOT EXISTS current_semester (id BIGINT NOT NULL PRIMARY KEY, \
             semester_id BIGINT NULL)"
                .to_owned(),
            format!("{insert_ignore} INTO current_semester (id, semester_id) VALUES (1, NULL)"),
            format!(
                "CREATE TABLE IF NOT EXISTS users (id {key}, \
                 username VARCHAR(150){nocase} NOT NULL UNIQUE, full_name VARCHAR(255) NOT NULL, \
                 email VARCHAR(254) NOT NULL, is_active BIGINT NOT NULL DEFAULT 1)"
            ),
            "CREATE TABLE IF NOT EXISTS user_groups (user_id BIGINT NOT NULL, \
             group_id BIGINT NOT NULL, PRIMARY KEY (user_id, group_id))"
                .to_owned(),
            format!(
                "CREATE TABLE IF NOT EXISTS projects (id {key}, title VARCHAR(255) NOT NULL, \
                 description TEXT NOT NULL, collaborator VARCHAR(255) NOT NULL, tool TEXT NOT NULL, \
                 num_students BIGINT NOT NULL, state VARCHAR(255) NULL, created_by BIGINT NOT NULL, \
                 semester_id BIGINT NOT NULL, created_at VARCHAR(40) NOT NULL)"
            ),
            "CREATE TABLE IF NOT EXISTS project_assignees (project_id BIGINT NOT NULL, \
             position BIGINT NOT NULL, user_id BIGINT NOT NULL, PRIMARY KEY (project_id, position))"
                .to_owned(),
            format!(
                "CREATE TABLE IF NOT EXISTS archived_projects (id {key}, title VARCHAR(255) NOT NULL, \
                 description TEXT NOT NULL, collaborator VARCHAR(255) NOT NULL, tool TEXT NOT NULL, \
                 num_students BIGINT NOT NULL, state VARCHAR(255) NULL, \
                 creator_name VARCHAR(255) NOT NULL, semester_id BIGINT NOT NULL, \
                 semester_label VARCHAR(255) NOT NULL, created_at VARCHAR(40) NOT NULL)"
            ),
            "CREATE TABLE IF NOT EXISTS archived_assignees (archived_id BIGINT NOT NULL, \
             position BIGINT NOT NULL, name VARCHAR(255) NOT NULL, PRIMARY KEY (archived_id, position))"
                .to_owned(),
        ]
    }
}

/// Store backed by a MySQL (or, with the `sqlite` feature, SQLite) database.
pub struct SqlStore {
    pool: AnyPool,
    dialect: Dialect,
}

impl SqlStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let dialect = Dialect::of(&config.url)?;
        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;
        debug!(?dialect, "connected to database");
        Ok(Self { pool, dialect })
    }

    /// Create missing tables. Existing data is left alone.
    pub async fn init_schema(&self) -> Result<()> {
        for statement in self.dialect.schema() {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        info!(dialect = ?self.dialect, "database schema is ready");
        Ok(())
    }

    async fn groups(&self, user: Option<UserId>) -> Result<HashMap<UserId, Vec<i64>>> {
        let query = match user {
            Some(id) => sqlx::query("SELECT user_id, group_id FROM user_groups WHERE user_id = ?")
                .bind(id.0),
            None => sqlx::query("SELECT user_id, group_id FROM user_groups"),
        };
        let mut groups: HashMap<UserId, Vec<i64>> = HashMap::new();
        for row in query.fetch_all(&self.pool).await? {
            groups
                .entry(UserId(row.try_get("user_id")?))
                .or_default()
                .push(row.try_get("group_id")?);
        }
        Ok(groups)
    }

    async fn assignees(&self, filter: Assignees) -> Result<HashMap<ProjectId, Vec<UserId>>> {
        let query = match filter {
            Assignees::Project(id) => sqlx::query(
                "SELECT project_id, user_id FROM project_assignees WHERE project_id = ? \
                 ORDER BY project_id, position",
            )
            .bind(id.0),
            Assignees::Semester(id) => sqlx::query(
                "SELECT pa.project_id, pa.user_id FROM project_assignees pa \
                 JOIN projects p ON p.id = pa.project_id WHERE p.semester_id = ? \
                 ORDER BY pa.project_id, pa.position",
            )
            .bind(id.0),
        };
        let mut assignees: HashMap<ProjectId, Vec<UserId>> = HashMap::new();
        for row in query.fetch_all(&self.pool).await? {
            assignees
                .entry(ProjectId(row.try_get("project_id")?))
                .or_default()
                .push(UserId(row.try_get("user_id")?));
        }
        Ok(assignees)
    }
}

enum Assignees {
    Project(ProjectId),
    Semester(SemesterId),
}

fn inserted_id(result: &AnyQueryResult) -> Result<i64> {
    result
        .last_insert_id()
        .ok_or_else(|| Error::Storage(sqlx::Error::Protocol("missing inserted row id".into())))
}

fn decode_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> Error {
    Error::Storage(sqlx::Error::Decode(Box::new(e)))
}

fn unique_violation(err: sqlx::Error, message: String) -> Error {
    if matches!(&err, sqlx::Error::Database(db) if db.is_unique_violation()) {
        Error::Conflict(message)
    } else {
        Error::Storage(err)
    }
}

fn timestamp_text(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp_from_row(row: &AnyRow, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&row.try_get::<String, _>(column)?)
        .map(|at| at.with_timezone(&Utc))
        .map_err(decode_error)
}

fn semester_from_row(row: &AnyRow) -> Result<Semester> {
    let start_date = row
        .try_get::<Option<String>, _>("start_date")?
        .map(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT))
        .transpose()
        .map_err(decode_error)?;
    Ok(Semester {
        id: SemesterId(row.try_get("id")?),
        term: Term::try_from(row.try_get::<i64, _>("term")?)?,
        academic_year: row.try_get::<String, _>("academic_year")?.parse::<AcademicYear>()?,
        start_date,
        archived: row.try_get::<i64, _>("archived")? != 0,
        is_latest: row.try_get::<Option<i64>, _>("current")?.is_some(),
    })
}

fn count_from_row(row: &AnyRow, column: &str) -> Result<u32> {
    u32::try_from(row.try_get::<i64, _>(column)?).map_err(decode_error)
}

fn user_from_row(row: &AnyRow, groups: &mut HashMap<UserId, Vec<i64>>) -> Result<User> {
    let id = UserId(row.try_get("id")?);
    Ok(User {
        id,
        username: row.try_get("username")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        groups: GroupSet::from_ids(groups.remove(&id).unwrap_or_default()),
        is_active: row.try_get::<i64, _>("is_active")? != 0,
    })
}

fn project_from_row(row: &AnyRow, assignees: &mut HashMap<ProjectId, Vec<UserId>>) -> Result<Project> {
    let id = ProjectId(row.try_get("id")?);
    Ok(Project {
        id,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        collaborator: row.try_get("collaborator")?,
        tool: row.try_get("tool")?,
        num_students: count_from_row(row, "num_students")?,
        state: row.try_get("state")?,
        created_by: UserId(row.try_get("created_by")?),
        assigned_to: assignees.remove(&id).unwrap_or_default(),
        semester: SemesterId(row.try_get("semester_id")?),
        created_at: timestamp_from_row(row, "created_at")?,
    })
}

const SEMESTER_COLUMNS: &str = "SELECT s.id, s.term, s.academic_year, s.start_date, s.archived, \
     c.semester_id AS current FROM semesters s \
     LEFT JOIN current_semester c ON c.id = 1 AND c.semester_id = s.id";

const PROJECT_COLUMNS: &str = "SELECT id, title, description, collaborator, tool, num_students, \
     state, created_by, semester_id, created_at FROM projects";

const CURRENT_SEMESTER: &str = "(SELECT semester_id FROM current_semester WHERE id = 1)";

async fn insert_groups(
    tx: &mut Transaction<'static, Any>,
    user: UserId,
    groups: &GroupSet,
) -> Result<()> {
    for group in groups.iter() {
        sqlx::query("INSERT INTO user_groups (user_id, group_id) VALUES (?, ?)")
            .bind(user.0)
            .bind(group.id())
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

async fn insert_assignees(
    tx: &mut Transaction<'static, Any>,
    project: ProjectId,
    assignees: &[UserId],
) -> Result<()> {
    for (position, user) in (0i64..).zip(assignees) {
        sqlx::query("INSERT INTO project_assignees (project_id, position, user_id) VALUES (?, ?, ?)")
            .bind(project.0)
            .bind(position)
            .bind(user.0)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

async fn delete_projects_where(
    tx: &mut Transaction<'static, Any>,
    column: &str,
    value: i64,
) -> Result<u64> {
    sqlx::query(&format!(
        "DELETE FROM project_assignees WHERE project_id IN (SELECT id FROM projects WHERE {column} = ?)"
    ))
    .bind(value)
    .execute(&mut **tx)
    .await?;
    let deleted = sqlx::query(&format!("DELETE FROM projects WHERE {column} = ?"))
        .bind(value)
        .execute(&mut **tx)
        .await?;
    Ok(deleted.rows_affected())
}

/// Succeeds when the project exists and belongs to the current semester.
async fn check_live_project(tx: &mut Transaction<'static, Any>, id: ProjectId) -> Result<()> {
    let row = sqlx::query(&format!(
        "SELECT semester_id, {CURRENT_SEMESTER} AS current FROM projects WHERE id = ?"
    ))
    .bind(id.0)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| Error::not_found("project", id))?;
    if row.try_get::<Option<i64>, _>("current")? != Some(row.try_get::<i64, _>("semester_id")?) {
        return Err(Error::conflict(format!(
            "project {id} belongs to a past semester and is read-only"
        )));
    }
    Ok(())
}

async fn exists(tx: &mut Transaction<'static, Any>, table: &str, id: i64) -> Result<bool> {
    Ok(sqlx::query(&format!("SELECT id FROM {table} WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .is_some())
}

impl Store for SqlStore {
    async fn semesters(&self) -> Result<Vec<Semester>> {
        sqlx::query(SEMESTER_COLUMNS)
            .map(|row: AnyRow| semester_from_row(&row))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .collect()
    }

    async fn semester(&self, id: SemesterId) -> Result<Option<Semester>> {
        sqlx::query(&format!("{SEMESTER_COLUMNS} WHERE s.id = ?"))
            .bind(id.0)
            .map(|row: AnyRow| semester_from_row(&row))
            .fetch_optional(&self.pool)
            .await?
            .transpose()
    }

    async fn current_semester_id(&self) -> Result<Option<SemesterId>> {
        let current = sqlx::query("SELECT semester_id FROM current_semester WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(match current {
            Some(row) => row.try_get::<Option<i64>, _>("semester_id")?.map(SemesterId),
            None => None,
        })
    }

    async fn advance_semester(
        &self,
        expected: Option<SemesterId>,
        semester: NewSemester,
    ) -> Result<Semester> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO semesters (term, academic_year, start_date, archived) VALUES (?, ?, ?, 0)",
        )
        .bind(i64::from(semester.term.number()))
        .bind(semester.academic_year.to_string())
        .bind(semester.start_date.map(|d| d.format(DATE_FORMAT).to_string()))
        .execute(&mut *tx)
        .await?;
        let id = SemesterId(inserted_id(&inserted)?);
        let swapped = match expected {
            Some(previous) => sqlx::query(
                "UPDATE current_semester SET semester_id = ? WHERE id = 1 AND semester_id = ?",
            )
            .bind(id.0)
            .bind(previous.0),
            None => sqlx::query(
                "UPDATE current_semester SET semester_id = ? WHERE id = 1 AND semester_id IS NULL",
            )
            .bind(id.0),
        }
        .execute(&mut *tx)
        .await?;
        if swapped.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(Error::conflict(format!(
                "current semester is no longer {expected:?}"
            )));
        }
        tx.commit().await?;
        Ok(Semester {
            id,
            term: semester.term,
            academic_year: semester.academic_year,
            start_date: semester.start_date,
            archived: false,
            is_latest: true,
        })
    }

    async fn archive_semester(
        &self,
        semester: SemesterId,
        records: Vec<NewArchivedProject>,
        retired: Vec<ProjectId>,
        deactivate: Option<Group>,
    ) -> Result<ArchivedBatch> {
        let mut tx = self.pool.begin().await?;
        let marked = sqlx::query("UPDATE semesters SET archived = 1 WHERE id = ? AND archived = 0")
            .bind(semester.0)
            .execute(&mut *tx)
            .await?;
        if marked.rows_affected() != 1 {
            let known = exists(&mut tx, "semesters", semester.0).await?;
            tx.rollback().await?;
            return Err(if known {
                Error::AlreadyArchived(semester)
            } else {
                Error::not_found("semester", semester)
            });
        }
        let mut archived = Vec::with_capacity(records.len());
        for record in records {
            let inserted = sqlx::query(
                "INSERT INTO archived_projects (title, description, collaborator, tool, \
                 num_students, state, creator_name, semester_id, semester_label, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(record.title.clone())
            .bind(record.description.clone())
            .bind(record.collaborator.clone())
            .bind(record.tool.clone())
            .bind(i64::from(record.num_students))
            .bind(record.state.clone())
            .bind(record.creator.as_str().to_owned())
            .bind(record.semester.0)
            .bind(record.semester_label.clone())
            .bind(timestamp_text(record.created_at))
            .execute(&mut *tx)
            .await?;
            let id = ArchivedProjectId(inserted_id(&inserted)?);
            for (position, name) in (0i64..).zip(&record.assignees) {
                sqlx::query(
                    "INSERT INTO archived_assignees (archived_id, position, name) VALUES (?, ?, ?)",
                )
                .bind(id.0)
                .bind(position)
                .bind(name.as_str().to_owned())
                .execute(&mut *tx)
                .await?;
            }
            archived.push(record.with_id(id));
        }
        for project in retired {
            delete_projects_where(&mut tx, "id", project.0).await?;
        }
        let remaining =
            sqlx::query("SELECT COUNT(*) AS remaining FROM projects WHERE semester_id = ?")
                .bind(semester.0)
                .fetch_one(&mut *tx)
                .await?
                .try_get::<i64, _>("remaining")?;
        if remaining > 0 {
            tx.rollback().await?;
            return Err(Error::conflict(format!(
                "live projects of semester {semester} changed during archival"
            )));
        }
        let deactivated = match deactivate {
            Some(group) => {
                sqlx::query(
                    "UPDATE users SET is_active = 0 WHERE is_active = 1 \
                     AND id IN (SELECT user_id FROM user_groups WHERE group_id = ?)",
                )
                .bind(group.id())
                .execute(&mut *tx)
                .await?
                .rows_affected()
            }
            None => 0,
        };
        tx.commit().await?;
        Ok(ArchivedBatch {
            records: archived,
            deactivated: usize::try_from(deactivated).map_err(decode_error)?,
        })
    }

    async fn archived_projects(&self, semester: SemesterId) -> Result<Vec<ArchivedProject>> {
        let mut assignees: HashMap<i64, Vec<NameSnapshot>> = HashMap::new();
        let rows = sqlx::query(
            "SELECT aa.archived_id, aa.name FROM archived_assignees aa \
             JOIN archived_projects ap ON ap.id = aa.archived_id WHERE ap.semester_id = ? \
             ORDER BY aa.archived_id, aa.position",
        )
        .bind(semester.0)
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            assignees
                .entry(row.try_get("archived_id")?)
                .or_default()
                .push(NameSnapshot::from(row.try_get::<String, _>("name")?));
        }
        sqlx::query(
            "SELECT id, title, description, collaborator, tool, num_students, state, \
             creator_name, semester_id, semester_label, created_at FROM archived_projects \
             WHERE semester_id = ? ORDER BY id",
        )
        .bind(semester.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| -> Result<ArchivedProject> {
            let id = row.try_get::<i64, _>("id")?;
            Ok(ArchivedProject {
                id: ArchivedProjectId(id),
                title: row.try_get("title")?,
                description: row.try_get("description")?,
                collaborator: row.try_get("collaborator")?,
                tool: row.try_get("tool")?,
                num_students: count_from_row(&row, "num_students")?,
                state: row.try_get("state")?,
                creator: NameSnapshot::from(row.try_get::<String, _>("creator_name")?),
                assignees: assignees.remove(&id).unwrap_or_default(),
                semester: SemesterId(row.try_get("semester_id")?),
                semester_label: row.try_get("semester_label")?,
                created_at: timestamp_from_row(&row, "created_at")?,
            })
        })
        .collect()
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO users (username, full_name, email, is_active) VALUES (?, ?, ?, 1)",
        )
        .bind(user.username.clone())
        .bind(user.full_name.clone())
        .bind(user.email.clone())
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, format!("username {:?} is already taken", user.username)))?;
        let id = UserId(inserted_id(&inserted)?);
        insert_groups(&mut tx, id, &user.groups).await?;
        tx.commit().await?;
        Ok(User {
            id,
            username: user.username,
            full_name: user.full_name,
            email: user.email,
            groups: user.groups,
            is_active: true,
        })
    }

    async fn user(&self, id: UserId) -> Result<Option<User>> {
        let mut groups = self.groups(Some(id)).await?;
        sqlx::query("SELECT id, username, full_name, email, is_active FROM users WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| user_from_row(&row, &mut groups))
            .transpose()
    }

    async fn users(&self, group: Option<Group>) -> Result<Vec<User>> {
        let mut groups = self.groups(None).await?;
        let query = match group {
            Some(group) => sqlx::query(
                "SELECT id, username, full_name, email, is_active FROM users \
                 WHERE id IN (SELECT user_id FROM user_groups WHERE group_id = ?) ORDER BY id",
            )
            .bind(group.id()),
            None => sqlx::query(
                "SELECT id, username, full_name, email, is_active FROM users ORDER BY id",
            ),
        };
        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| user_from_row(&row, &mut groups))
            .collect()
    }

    async fn save_user(&self, user: &User) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        if !exists(&mut tx, "users", user.id.0).await? {
            tx.rollback().await?;
            return Err(Error::not_found("user", user.id));
        }
        sqlx::query(
            "UPDATE users SET username = ?, full_name = ?, email = ?, is_active = ? WHERE id = ?",
        )
        .bind(user.username.clone())
        .bind(user.full_name.clone())
        .bind(user.email.clone())
        .bind(i64::from(user.is_active))
        .bind(user.id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, format!("username {:?} is already taken", user.username)))?;
        sqlx::query("DELETE FROM user_groups WHERE user_id = ?")
            .bind(user.id.0)
            .execute(&mut *tx)
            .await?;
        insert_groups(&mut tx, user.id, &user.groups).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        if !exists(&mut tx, "users", id.0).await? {
            tx.rollback().await?;
            return Err(Error::not_found("user", id));
        }
        let dropped = delete_projects_where(&mut tx, "created_by", id.0).await?;
        for statement in [
            "DELETE FROM project_assignees WHERE user_id = ?",
            "DELETE FROM user_groups WHERE user_id = ?",
            "DELETE FROM users WHERE id = ?",
        ] {
            sqlx::query(statement).bind(id.0).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        debug!(user = %id, projects = dropped, "deleted user and the live projects they created");
        Ok(())
    }

    async fn create_project(&self, project: NewProject) -> Result<Project> {
        let created_at = Utc::now();
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO projects (title, description, collaborator, tool, num_students, \
             state, created_by, created_at, semester_id) \
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, semester_id FROM current_semester \
             WHERE id = 1 AND semester_id IS NOT NULL",
        )
        .bind(project.title.clone())
        .bind(project.description.clone())
        .bind(project.collaborator.clone())
        .bind(project.tool.clone())
        .bind(i64::from(project.num_students))
        .bind(project.state.clone())
        .bind(project.created_by.0)
        .bind(timestamp_text(created_at))
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(Error::not_found("semester", "current"));
        }
        let id = ProjectId(inserted_id(&inserted)?);
        let row = sqlx::query(&format!("{PROJECT_COLUMNS} WHERE id = ?"))
            .bind(id.0)
            .fetch_one(&mut *tx)
            .await?;
        insert_assignees(&mut tx, id, &project.assigned_to).await?;
        tx.commit().await?;
        let mut assignees = HashMap::from([(id, project.assigned_to)]);
        project_from_row(&row, &mut assignees)
    }

    async fn project(&self, id: ProjectId) -> Result<Option<Project>> {
        let mut assignees = self.assignees(Assignees::Project(id)).await?;
        sqlx::query(&format!("{PROJECT_COLUMNS} WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| project_from_row(&row, &mut assignees))
            .transpose()
    }

    async fn projects(&self, semester: SemesterId) -> Result<Vec<Project>> {
        let mut assignees = self.assignees(Assignees::Semester(semester)).await?;
        sqlx::query(&format!("{PROJECT_COLUMNS} WHERE semester_id = ? ORDER BY id"))
            .bind(semester.0)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| project_from_row(&row, &mut assignees))
            .collect()
    }

    async fn save_project(&self, project: &Project) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(&format!(
            "UPDATE projects SET title = ?, description = ?, collaborator = ?, tool = ?, \
             num_students = ?, state = ? WHERE id = ? AND semester_id = {CURRENT_SEMESTER}"
        ))
        .bind(project.title.clone())
        .bind(project.description.clone())
        .bind(project.collaborator.clone())
        .bind(project.tool.clone())
        .bind(i64::from(project.num_students))
        .bind(project.state.clone())
        .bind(project.id.0)
        .execute(&mut *tx)
        .await?;
        // MySQL reports unchanged rows as unaffected.
        if updated.rows_affected() == 0 {
            if let Err(e) = check_live_project(&mut tx, project.id).await {
                tx.rollback().await?;
                return Err(e);
            }
        }
        sqlx::query("DELETE FROM project_assignees WHERE project_id = ?")
            .bind(project.id.0)
            .execute(&mut *tx)
            .await?;
        insert_assignees(&mut tx, project.id, &project.assigned_to).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_project(&self, id: ProjectId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query(&format!(
            "DELETE FROM projects WHERE id = ? AND semester_id = {CURRENT_SEMESTER}"
        ))
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
        if deleted.rows_affected() == 0 {
            let e = check_live_project(&mut tx, id)
                .await
                .err()
                .unwrap_or_else(|| Error::not_found("project", id));
            tx.rollback().await?;
            return Err(e);
        }
        sqlx::query("DELETE FROM project_assignees WHERE project_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;

    async fn store() -> SqlStore {
        let store = SqlStore::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_owned(),
            max_connections: 1,
            acquire_timeout_secs: 5,
        })
        .await
        .unwrap();
        store.init_schema().await.unwrap();
        store
    }

    fn first_semester() -> NewSemester {
        NewSemester {
            term: Term::First,
            academic_year: AcademicYear::starting(2023),
            start_date: NaiveDate::from_ymd_opt(2023, 10, 2),
        }
    }

    #[tokio::test]
    async fn test_pointer_compare_and_swap() {
        let store = store().await;
        let first = store.advance_semester(None, first_semester()).await.unwrap();
        assert!(matches!(
            store.advance_semester(None, first_semester()).await,
            Err(Error::Conflict(_))
        ));
        let second = NewSemester {
            term: Term::Second,
            ..first_semester()
        };
        let second = store.advance_semester(Some(first.id), second).await.unwrap();
        assert_eq!(store.current_semester_id().await.unwrap(), Some(second.id));
        let semesters = store.semesters().await.unwrap();
        assert_eq!(semesters.len(), 2);
        assert_eq!(semesters.iter().filter(|s| s.is_latest).count(), 1);
        assert_eq!(
            store.semester(first.id).await.unwrap().unwrap().start_date,
            first.start_date
        );
    }

    async fn lecturer(store: &SqlStore) -> User {
        store
            .create_user(NewUser {
                username: "lecturer".into(),
                full_name: "Lee Turner".into(),
                email: "lee@example.org".into(),
                groups: GroupSet::from([Group::Lecturer]),
            })
            .await
            .unwrap()
    }

    fn compiler(lecturer: &User) -> NewProject {
        NewProject {
            title: "Compiler".into(),
            description: "A small compiler".into(),
            collaborator: String::new(),
            tool: "Rust".into(),
            num_students: 2,
            state: Some("open".into()),
            created_by: lecturer.id,
            assigned_to: vec![lecturer.id],
        }
    }

    #[tokio::test]
    async fn test_archive_batch() {
        let store = store().await;
        let semester = store.advance_semester(None, first_semester()).await.unwrap();
        let lecturer = lecturer(&store).await;
        let student = store
            .create_user(NewUser {
                username: "student".into(),
                full_name: "Stu Dent".into(),
                email: "stu@example.org".into(),
                groups: GroupSet::from([Group::Student]),
            })
            .await
            .unwrap();
        let project = store.create_project(compiler(&lecturer)).await.unwrap();
        assert_eq!(project.semester, semester.id);
        assert_eq!(store.project(project.id).await.unwrap().unwrap(), project);
        let record =
            NewArchivedProject::snapshot(&project, &lecturer, &[&lecturer], &semester.label());
        let batch = store
            .archive_semester(
                semester.id,
                vec![record.clone()],
                vec![project.id],
                Some(Group::Student),
            )
            .await
            .unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.deactivated, 1);
        assert!(!store.user(student.id).await.unwrap().unwrap().is_active);
        assert!(store.user(lecturer.id).await.unwrap().unwrap().is_active);
        assert!(store.projects(semester.id).await.unwrap().is_empty());
        assert!(matches!(
            store
                .archive_semester(semester.id, vec![record], vec![], None)
                .await,
            Err(Error::AlreadyArchived(_))
        ));
        let stored = store.archived_projects(semester.id).await.unwrap();
        assert_eq!(stored, batch.records);
        assert_eq!(stored[0].assignees[0].as_str(), "Lee Turner");
        assert_eq!(stored[0].state.as_deref(), Some("open"));
        assert_eq!(stored[0].created_at, project.created_at);
    }

    #[tokio::test]
    async fn test_archive_batch_needs_every_live_project() {
        let store = store().await;
        let semester = store.advance_semester(None, first_semester()).await.unwrap();
        let lecturer = lecturer(&store).await;
        let listed = store.create_project(compiler(&lecturer)).await.unwrap();
        let unlisted = store.create_project(compiler(&lecturer)).await.unwrap();
        let record =
            NewArchivedProject::snapshot(&listed, &lecturer, &[&lecturer], &semester.label());
        assert!(matches!(
            store
                .archive_semester(semester.id, vec![record], vec![listed.id], None)
                .await,
            Err(Error::Conflict(_))
        ));
        assert_eq!(store.projects(semester.id).await.unwrap().len(), 2);
        assert!(store.archived_projects(semester.id).await.unwrap().is_empty());
        assert!(!store.semester(semester.id).await.unwrap().unwrap().archived);
        assert!(store.project(unlisted.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_past_projects_are_read_only() {
        let store = store().await;
        assert!(matches!(
            store.create_project(compiler(&lecturer(&store).await)).await,
            Err(Error::NotFound { .. })
        ));
        let first = store.advance_semester(None, first_semester()).await.unwrap();
        let lecturer = store.users(Some(Group::Lecturer)).await.unwrap().remove(0);
        let mut project = store.create_project(compiler(&lecturer)).await.unwrap();
        project.state = Some("taken".into());
        store.save_project(&project).await.unwrap();
        store.save_project(&project).await.unwrap();
        assert_eq!(store.project(project.id).await.unwrap().unwrap(), project);

        let second = NewSemester {
            term: Term::Second,
            ..first_semester()
        };
        let second = store.advance_semester(Some(first.id), second).await.unwrap();
        assert!(matches!(
            store.save_project(&project).await,
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            store.delete_project(project.id).await,
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            store.delete_project(ProjectId(999)).await,
            Err(Error::NotFound { .. })
        ));
        let fresh = store.create_project(compiler(&lecturer)).await.unwrap();
        assert_eq!(fresh.semester, second.id);
        store.delete_project(fresh.id).await.unwrap();
        assert!(store.project(fresh.id).await.unwrap().is_none());
    }
}
