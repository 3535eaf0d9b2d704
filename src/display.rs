use eyre::{Result, WrapErr};
use fypadmin::admin::{ProjectListing, Transition, TransitionOutcome};
use fypadmin::archive::Archival;
use fypadmin::listing::Page;
use fypadmin::model::{Semester, User};
use fypadmin::roles::Role;
use fypadmin::selector::{ProjectSummary, Source};
use serde::Serialize;
use std::io;

pub fn display_semesters(semesters: &[Semester]) {
    if semesters.is_empty() {
        println!("No semester has been created yet");
        return;
    }
    for s in semesters {
        print!("  - [{}] {}", s.id, s);
        if s.is_latest {
            print!(" (current)");
        }
        if s.archived {
            print!(" (archived)");
        }
        println!();
    }
}

pub fn display_semester(semester: &Semester) {
    println!("{} (id {})", semester, semester.id);
    if let (Some(start), Some(end)) = (semester.start_date, semester.end_date()) {
        println!("  Runs from {start} to {end}");
        let week = semester.final_week();
        if let (Some(first), Some(last)) = (week.first(), week.last()) {
            println!("  Presentation week: {first} to {last}");
        }
    }
}

pub fn display_archival(archival: &Archival) {
    if archival.is_fresh() {
        println!(
            "Archived {} project(s) of semester {}",
            archival.count(),
            archival.semester()
        );
    } else {
        println!(
            "Semester {} was already archived ({} project(s))",
            archival.semester(),
            archival.count()
        );
    }
}

pub fn display_transition(transition: &Transition) {
    println!("Current semester is now {}", transition.semester);
    match &transition.outcome {
        TransitionOutcome::NothingToArchive => println!("No previous semester to archive"),
        TransitionOutcome::Archived(archival) => display_archival(archival),
        TransitionOutcome::Failed(e) => {
            println!("Previous semester could not be archived: {e}");
            println!("Run the reconcile command to retry");
        }
    }
    let deactivated = transition.deactivated_students();
    if deactivated > 0 {
        println!("{deactivated} student account(s) deactivated");
    }
}

fn display_page_footer<T>(page: &Page<T>) {
    println!(
        "Page {}/{} ({} matching)",
        page.page + 1,
        page.page_count().max(1),
        page.total
    );
}

pub fn display_projects(listing: &ProjectListing) {
    let origin = match listing.query.source {
        Source::Live => "live",
        Source::Archive => "archived",
    };
    println!("Projects of semester {} ({origin}):", listing.query.semester);
    for p in &listing.page.items {
        print!(
            "  - {} by {}",
            p.title,
            p.creator.as_deref().unwrap_or("unknown")
        );
        if !p.assignees.is_empty() {
            print!(" [{}]", p.assignees.join(", "));
        }
        println!(" ({} student(s))", p.num_students);
    }
    display_page_footer(&listing.page);
}

pub fn display_users(page: &Page<User>) {
    for u in &page.items {
        let groups = u.groups.iter().map(|g| g.name()).collect::<Vec<_>>();
        print!("  - {} <{}> ({})", u, u.email, groups.join(", "));
        if !u.is_active {
            print!(" (inactive)");
        }
        println!();
    }
    display_page_footer(page);
}

pub fn display_role(role: &Role) {
    println!("Primary role: {}", role.primary);
    if !role.lecturer_subroles.is_empty() {
        let subroles = role
            .lecturer_subroles
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>();
        println!("Lecturer duties: {}", subroles.join(" / "));
    }
    println!("Views:");
    for view in &role.views {
        println!("  - {view:?}");
    }
}

#[derive(Serialize)]
struct CsvProject<'a> {
    id: i64,
    title: &'a str,
    description: &'a str,
    collaborator: &'a str,
    tool: &'a str,
    num_students: u32,
    state: &'a str,
    creator: &'a str,
    assignees: String,
}

pub fn write_projects_csv<W: io::Write>(projects: &[ProjectSummary], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for p in projects {
        writer
            .serialize(CsvProject {
                id: p.id,
                title: &p.title,
                description: &p.description,
                collaborator: &p.collaborator,
                tool: &p.tool,
                num_students: p.num_students,
                state: p.state.as_deref().unwrap_or_default(),
                creator: p.creator.as_deref().unwrap_or_default(),
                assignees: p.assignees.join("; "),
            })
            .wrap_err("cannot write project row")?;
    }
    writer.flush().wrap_err("cannot flush CSV output")?;
    Ok(())
}
