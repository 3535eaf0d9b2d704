use fypadmin::admin::{Admin, TransitionOutcome};
use fypadmin::config::AdminConfig;
use fypadmin::listing::{ListParams, Sort};
use fypadmin::model::{
    AcademicYear, Group, GroupSet, NewProject, NewUser, ProjectUpdate, Term, User, UserUpdate,
};
use fypadmin::selector::{ProjectField, Scope, Source};
use fypadmin::store::{MemoryStore, Store};
use fypadmin::{Error, roles::View};

fn admin() -> Admin<MemoryStore> {
    Admin::new(MemoryStore::new(), AdminConfig::default())
}

async fn user(admin: &Admin<MemoryStore>, username: &str, full_name: &str, groups: &[Group]) -> User {
    admin
        .create_user(NewUser {
            username: username.into(),
            full_name: full_name.into(),
            email: format!("{username}@uni.example"),
            groups: groups.iter().copied().collect::<GroupSet>(),
        })
        .await
        .unwrap()
}

fn project(title: &str, tool: &str, created_by: &User, assigned_to: &[&User]) -> NewProject {
    NewProject {
        title: title.into(),
        description: format!("{title} for the final year"),
        collaborator: String::new(),
        tool: tool.into(),
        num_students: assigned_to.len().max(1) as u32,
        state: Some("open".into()),
        created_by: created_by.id,
        assigned_to: assigned_to.iter().map(|u| u.id).collect(),
    }
}

#[tokio::test]
async fn full_semester_cycle() {
    let admin = admin();
    let first = admin
        .update_semester(Term::First, AcademicYear::starting(2023), None)
        .await
        .unwrap()
        .semester;
    let lecturer = user(&admin, "mtan", "Mei Tan", &[Group::Lecturer]).await;
    let alice = user(&admin, "alice", "Alice Ng", &[Group::Student]).await;
    let bob = user(&admin, "bob", "Bob Lim", &[Group::Student]).await;
    admin
        .create_project(project("Compiler", "Rust", &lecturer, &[&alice]))
        .await
        .unwrap();
    admin
        .create_project(project("Scheduler", "", &lecturer, &[&bob]))
        .await
        .unwrap();

    let live = admin
        .list_projects(None, Scope::All, &ListParams::new(10))
        .await
        .unwrap();
    assert_eq!(live.query.source, Source::Live);
    assert_eq!(live.query.semester, first.id);
    assert_eq!(live.page.total, 2);

    let transition = admin
        .update_semester(Term::Second, AcademicYear::starting(2023), None)
        .await
        .unwrap();
    let TransitionOutcome::Archived(archival) = &transition.outcome else {
        panic!("previous semester should have been archived");
    };
    assert_eq!(archival.count(), 2);
    assert_eq!(transition.deactivated_students(), 2);
    for record in archival.records() {
        assert_eq!(record.state.as_deref(), Some("open"));
        assert!(record.created_at <= chrono::Utc::now());
    }

    // Renaming and deleting people leaves the archive unchanged.
    admin
        .update_user(
            alice.id,
            UserUpdate {
                full_name: Some("Alice Wong".into()),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap();
    admin.delete_user(lecturer.id).await.unwrap();

    let params = ListParams {
        sort: Some(Sort::ascending(ProjectField::Title)),
        ..ListParams::new(10)
    };
    let past = admin
        .list_projects(Some(first.id), Scope::Assigned(bob.id), &params)
        .await
        .unwrap();
    assert_eq!(past.query.source, Source::Archive);
    assert_eq!(past.page.total, 2);
    let rows = &past.page.items;
    assert_eq!(rows[0].title, "Compiler");
    assert_eq!(rows[0].creator.as_deref(), Some("Mei Tan"));
    assert_eq!(rows[0].assignees, vec!["Alice Ng".to_owned()]);
    assert_eq!(rows[1].title, "Scheduler");

    let current = admin
        .list_projects(None, Scope::All, &params)
        .await
        .unwrap();
    assert_eq!(current.query.semester, transition.semester.id);
    assert!(current.page.items.is_empty());

    let again = admin.archive_projects(first.id).await.unwrap();
    assert!(!again.is_fresh());
    assert_eq!(again.records(), archival.records());
}

#[tokio::test]
async fn repeated_transition_is_rejected() {
    let admin = admin();
    admin
        .update_semester(Term::First, AcademicYear::starting(2023), None)
        .await
        .unwrap();
    admin
        .update_semester(Term::Second, AcademicYear::starting(2023), None)
        .await
        .unwrap();
    let again = admin
        .update_semester(Term::Second, AcademicYear::starting(2023), None)
        .await;
    assert!(matches!(again, Err(Error::Validation(_))));
    let semesters = admin.list_semesters().await.unwrap();
    assert_eq!(semesters.len(), 2);
    assert_eq!(semesters.iter().filter(|s| s.is_latest).count(), 1);
    assert_eq!(semesters.iter().filter(|s| s.archived).count(), 1);
}

#[tokio::test]
async fn archived_projects_cannot_be_edited() {
    let admin = admin();
    admin
        .advance_semester(Term::First, AcademicYear::starting(2023), None)
        .await
        .unwrap();
    let lecturer = user(&admin, "mtan", "Mei Tan", &[Group::Lecturer]).await;
    let created = admin
        .create_project(project("Compiler", "Rust", &lecturer, &[]))
        .await
        .unwrap();
    admin
        .advance_semester(Term::Second, AcademicYear::starting(2023), None)
        .await
        .unwrap();
    let result = admin
        .update_project(
            created.id,
            ProjectUpdate {
                title: Some("Optimizer".into()),
                ..ProjectUpdate::default()
            },
        )
        .await;
    assert!(matches!(result, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn roles_and_access() {
    let admin = admin();
    admin
        .advance_semester(Term::First, AcademicYear::starting(2023), None)
        .await
        .unwrap();
    admin
        .advance_semester(Term::Second, AcademicYear::starting(2023), None)
        .await
        .unwrap();
    let staff = user(&admin, "root", "Ada Root", &[Group::Lecturer, Group::Admin]).await;
    let student = user(&admin, "sid", "Sid Ho", &[Group::Student]).await;
    let staff_role = admin.role_for(staff.id).await.unwrap();
    let student_role = admin.role_for(student.id).await.unwrap();
    assert!(staff_role.is_admin());
    assert!(staff_role.can_see(View::SemesterManagement));
    assert!(!student_role.can_see(View::SemesterManagement));

    let semesters = admin.list_semesters().await.unwrap();
    let past = semesters.iter().find(|s| !s.is_latest).unwrap();
    let live = admin.select_project_source(None, Scope::All).await.unwrap();
    let archive = admin
        .select_project_source(Some(past.id), Scope::All)
        .await
        .unwrap();
    assert!(live.access(&staff_role).delete);
    assert!(live.access(&student_role).apply);
    assert!(!archive.access(&staff_role).edit);
    assert!(!archive.access(&student_role).apply);
}

#[tokio::test]
async fn students_stay_active_when_configured() {
    let admin = Admin::new(
        MemoryStore::new(),
        AdminConfig {
            deactivate_students_on_archive: false,
            ..AdminConfig::default()
        },
    );
    admin
        .update_semester(Term::First, AcademicYear::starting(2023), None)
        .await
        .unwrap();
    let student = user(&admin, "sid", "Sid Ho", &[Group::Student]).await;
    let transition = admin
        .update_semester(Term::Second, AcademicYear::starting(2023), None)
        .await
        .unwrap();
    assert!(matches!(transition.outcome, TransitionOutcome::Archived(_)));
    assert_eq!(transition.deactivated_students(), 0);
    assert!(admin.store().user(student.id).await.unwrap().unwrap().is_active);
}
