pub use self::archived::{ArchivedProject, ArchivedProjectId, NameSnapshot, NewArchivedProject};
pub use self::project::{NewProject, Project, ProjectId, ProjectUpdate};
pub use self::semester::{AcademicYear, NewSemester, Semester, SemesterId, Term};
pub use self::user::{Group, GroupSet, NewUser, User, UserId, UserUpdate};

mod archived;
mod project;
mod semester;
mod user;
