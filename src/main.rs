use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use fypadmin::Admin;
use fypadmin::admin::UserField;
use fypadmin::config::Config;
use fypadmin::listing::{Direction, ListParams, Sort};
use fypadmin::model::{AcademicYear, Group, SemesterId, Term};
use fypadmin::selector::{ProjectField, Scope};
use fypadmin::store::SqlStore;
use tracing::Level;

mod display;

#[derive(Parser)]
#[clap(version, author, about)]
struct Options {
    #[clap(short, long, default_value = "fypadmin.toml")]
    /// Configuration file
    config: String,
    #[clap(short, action = clap::ArgAction::Count)]
    /// Set verbosity level
    verbose: u8,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database tables
    Init,
    /// List semesters, newest first
    Semesters,
    /// Show the current semester
    Current,
    /// Open a new semester and archive the previous one
    Advance {
        #[clap(long, value_parser = parse_term)]
        /// Term number (1 or 2)
        term: Term,
        #[clap(long)]
        /// Academic year, e.g. 2023/2024
        year: AcademicYear,
        #[clap(long)]
        /// First day of the semester (YYYY-MM-DD)
        start: Option<chrono::NaiveDate>,
    },
    /// Archive the projects of a past semester
    Archive {
        #[clap(long)]
        semester: i64,
    },
    /// Archive every past semester which has not been archived yet
    Reconcile,
    /// List projects of a semester, the current one by default
    Projects {
        #[clap(long)]
        semester: Option<i64>,
        #[clap(long, default_value = "")]
        search: String,
        #[clap(long, value_parser = parse_project_field)]
        sort: Option<ProjectField>,
        #[clap(long)]
        desc: bool,
        #[clap(long, default_value_t = 1)]
        page: usize,
        #[clap(long)]
        page_size: Option<usize>,
        #[clap(long)]
        /// Write the page as CSV on standard output
        csv: bool,
    },
    /// List users
    Users {
        #[clap(long, value_parser = parse_group)]
        group: Option<Group>,
        #[clap(long, default_value = "")]
        search: String,
        #[clap(long, value_parser = parse_user_field)]
        sort: Option<UserField>,
        #[clap(long)]
        desc: bool,
        #[clap(long, default_value_t = 1)]
        page: usize,
        #[clap(long)]
        page_size: Option<usize>,
    },
    /// Show the role derived from a set of group ids
    Role { groups: Vec<i64> },
}

fn parse_term(s: &str) -> Result<Term, String> {
    let n = s.parse::<i64>().map_err(|e| e.to_string())?;
    Term::try_from(n).map_err(|e| e.to_string())
}

fn parse_group(s: &str) -> Result<Group, String> {
    let n = s.parse::<i64>().map_err(|e| e.to_string())?;
    Group::try_from(n).map_err(|e| e.to_string())
}

fn parse_project_field(s: &str) -> Result<ProjectField, String> {
    Ok(match s {
        "id" => ProjectField::Id,
        "title" => ProjectField::Title,
        "creator" => ProjectField::Creator,
        "collaborator" => ProjectField::Collaborator,
        "tool" => ProjectField::Tool,
        "students" => ProjectField::Students,
        other => return Err(format!("unknown project field {other}")),
    })
}

fn parse_user_field(s: &str) -> Result<UserField, String> {
    Ok(match s {
        "username" => UserField::Username,
        "name" => UserField::FullName,
        "email" => UserField::Email,
        "group" => UserField::Group,
        other => return Err(format!("unknown user field {other}")),
    })
}

fn list_params<F: Copy + Eq>(
    search: String,
    sort: Option<F>,
    desc: bool,
    page: usize,
    page_size: usize,
) -> ListParams<F> {
    let direction = if desc {
        Direction::Descending
    } else {
        Direction::Ascending
    };
    ListParams {
        search,
        sort: sort.map(|field| Sort { field, direction }),
        page: page.saturating_sub(1),
        page_size,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let options = Options::parse();
    let level = match options.verbose {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
    let config = Config::load(&options.config)?;
    let store = SqlStore::connect(&config.database)
        .await
        .wrap_err_with(|| format!("cannot connect to {}", config.database.url))?;
    let default_page_size = config.admin.page_size;
    let admin = Admin::new(store, config.admin);
    match options.command {
        Command::Init => {
            admin.store().init_schema().await?;
            println!("Database schema is ready");
        }
        Command::Semesters => display::display_semesters(&admin.list_semesters().await?),
        Command::Current => display::display_semester(&admin.current_semester().await?),
        Command::Advance { term, year, start } => {
            let transition = admin.update_semester(term, year, start).await?;
            display::display_transition(&transition);
        }
        Command::Archive { semester } => {
            let archival = admin.archive_projects(SemesterId(semester)).await?;
            display::display_archival(&archival);
        }
        Command::Reconcile => {
            let done = admin.reconcile().await?;
            if done.is_empty() {
                println!("Every past semester is archived");
            }
            for archival in &done {
                display::display_archival(archival);
            }
        }
        Command::Projects {
            semester,
            search,
            sort,
            desc,
            page,
            page_size,
            csv,
        } => {
            let params = list_params(
                search,
                sort,
                desc,
                page,
                page_size.unwrap_or(default_page_size),
            );
            let listing = admin
                .list_projects(semester.map(SemesterId), Scope::All, &params)
                .await?;
            if csv {
                display::write_projects_csv(&listing.page.items, std::io::stdout())?;
            } else {
                display::display_projects(&listing);
            }
        }
        Command::Users {
            group,
            search,
            sort,
            desc,
            page,
            page_size,
        } => {
            let params = list_params(
                search,
                sort,
                desc,
                page,
                page_size.unwrap_or(default_page_size),
            );
            display::display_users(&admin.list_users(group, &params).await?);
        }
        Command::Role { groups } => display::display_role(&admin.resolve_role(&groups)),
    }
    Ok(())
}
