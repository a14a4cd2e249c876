//! Command-line subcommands and how their results are printed.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use std::fmt::Write as _;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use taskboard::api::types::{
  NewProject, NewTask, Priority, Project, SearchResults, Status, Task, Team, User,
};
use taskboard::api::ApiClient;
use taskboard::cache::Subscription;
use taskboard::config::Config;
use taskboard::error::ApiError;
use taskboard::query::{QueryOptions, QueryState};
use taskboard::search::{
  SearchController, SearchFacet, SearchGroup, SearchPhase, SearchView,
};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// List all projects
  Projects,
  /// Show a single project
  Project { id: u64 },
  /// List tasks of a project or assigned to a user
  Tasks {
    #[arg(long, conflicts_with = "user", required_unless_present = "user")]
    project: Option<u64>,
    #[arg(long)]
    user: Option<u64>,
    /// Keep watching, refetching every SECS seconds
    #[arg(long, value_name = "SECS")]
    watch: Option<u64>,
  },
  /// List users
  Users,
  /// List teams
  Teams,
  /// Create a project
  CreateProject {
    #[arg(long)]
    name: String,
    #[arg(long)]
    description: Option<String>,
  },
  /// Create a task in a project
  CreateTask {
    #[arg(long)]
    project: u64,
    #[arg(long)]
    title: String,
    #[arg(long)]
    priority: Option<Priority>,
    #[arg(long)]
    status: Option<Status>,
    #[arg(long)]
    points: Option<u32>,
  },
  /// Move a task to another status
  SetStatus {
    #[arg(long)]
    project: u64,
    #[arg(long)]
    task: u64,
    status: Status,
  },
  /// Search tasks, projects and users
  Search {
    #[arg(required_unless_present = "interactive")]
    term: Option<String>,
    /// Only show one group of results
    #[arg(long, default_value_t = SearchFacet::All)]
    facet: SearchFacet,
    /// Read search input line by line from stdin
    #[arg(short, long)]
    interactive: bool,
  },
}

/// Run one command to completion, printing its result to stdout.
pub async fn run(command: Command, client: &ApiClient, config: &Config) -> Result<()> {
  match command {
    Command::Projects => {
      let projects = loaded(client.get_projects().await, "load projects")?;
      print!("{}", render_projects(&projects));
    }
    Command::Project { id } => {
      let project = loaded(client.get_project(id).await, "load project")?;
      print!("{}", render_projects(std::slice::from_ref(&project)));
    }
    Command::Tasks {
      project,
      user,
      watch: Some(secs),
    } => {
      let options = QueryOptions::new().poll_every(Duration::from_secs(secs.max(1)));
      let subscription = match (project, user) {
        (Some(project_id), _) => client.watch_tasks(project_id, options),
        (None, Some(user_id)) => client.watch_tasks_by_user(user_id, options),
        (None, None) => return Err(eyre!("Either --project or --user is required")),
      }
      .map_err(|e| eyre!("Failed to watch tasks: {}", e))?;
      watch_tasks(subscription).await;
    }
    Command::Tasks { project, user, .. } => {
      let state = match (project, user) {
        (Some(project_id), _) => client.get_tasks(project_id).await,
        (None, Some(user_id)) => client.get_tasks_by_user(user_id).await,
        (None, None) => return Err(eyre!("Either --project or --user is required")),
      };
      let tasks = loaded(state, "load tasks")?;
      print!("{}", render_tasks(&tasks));
    }
    Command::Users => {
      let users = loaded(client.get_users().await, "load users")?;
      print!("{}", render_users(&users));
    }
    Command::Teams => {
      let teams = loaded(client.get_teams().await, "load teams")?;
      print!("{}", render_teams(&teams));
    }
    Command::CreateProject { name, description } => {
      let project = client
        .create_project(&NewProject {
          name,
          description,
          ..NewProject::default()
        })
        .await
        .map_err(|e| eyre!("Failed to create project: {}", e))?;
      println!("Created project #{} {}", project.id, project.name);
    }
    Command::CreateTask {
      project,
      title,
      priority,
      status,
      points,
    } => {
      let task = client
        .create_task(&NewTask {
          title,
          project_id: project,
          priority,
          status,
          points,
          ..NewTask::default()
        })
        .await
        .map_err(|e| eyre!("Failed to create task: {}", e))?;
      println!("Created task #{} {}", task.id, task.title);
    }
    Command::SetStatus {
      project,
      task,
      status,
    } => {
      let task = client
        .update_task_status(project, task, status)
        .await
        .map_err(|e| eyre!("Failed to update task {}: {}", task, e))?;
      println!(
        "Task #{} is now {}",
        task.id,
        task.status.map(|s| s.as_str()).unwrap_or(status.as_str())
      );
    }
    Command::Search {
      term,
      facet,
      interactive,
    } => {
      if interactive {
        interactive_search(client, config, facet).await?;
      } else if let Some(term) = term {
        let mut search = SearchController::new(client.clone(), &config.search);
        search.commit(term);
        let view = search.settled().await;
        if view.phase == SearchPhase::Idle {
          println!(
            "Search terms need at least {} characters",
            config.search.min_term_length
          );
        } else {
          print!("{}", render_search(&view, facet));
        }
      }
    }
  }

  Ok(())
}

/// Feed stdin lines to a search controller and print each settled result.
async fn interactive_search(client: &ApiClient, config: &Config, facet: SearchFacet) -> Result<()> {
  let mut search = SearchController::new(client.clone(), &config.search);
  let mut view = search.watch();
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  let mut printed = SearchView::default();

  loop {
    tokio::select! {
      line = lines.next_line() => {
        match line.map_err(|e| eyre!("Failed to read input: {}", e))? {
          Some(line) => search.input(line.trim()),
          None => break,
        }
      }
      changed = view.changed() => {
        if changed.is_err() {
          break;
        }
        let current = view.borrow_and_update().clone();
        if !current.results.is_loading() && current != printed {
          print!("{}", render_search(&current, facet));
          printed = current;
        }
      }
    }
  }

  // Input closed; let the last typed term commit and finish
  if search.is_pending() {
    tokio::time::sleep(config.search.debounce()).await;
  }
  let last = search.settled().await;
  if last != printed {
    print!("{}", render_search(&last, facet));
  }

  Ok(())
}

/// Print the task list every time it settles, until interrupted.
async fn watch_tasks(mut subscription: Subscription) {
  loop {
    match subscription.settled().await.decode::<Vec<Task>>() {
      QueryState::Success(tasks) => {
        println!("--- {}", chrono::Local::now().format("%H:%M:%S"));
        print!("{}", render_tasks(&tasks));
      }
      QueryState::Error(e) => eprintln!("Failed to load tasks: {e}"),
      QueryState::Idle | QueryState::Loading(_) => {}
    }

    tokio::select! {
      changed = subscription.changed() => {
        if !changed {
          break;
        }
      }
      _ = tokio::signal::ctrl_c() => break,
    }
  }
}

/// Data of a finished query, or the error it settled with.
fn loaded<T>(
  state: Result<QueryState<T>, ApiError>,
  action: &str,
) -> Result<T> {
  match state.map_err(|e| eyre!("Failed to {}: {}", action, e))? {
    QueryState::Success(data) => Ok(data),
    QueryState::Error(e) => Err(eyre!("Failed to {}: {}", action, e)),
    QueryState::Idle | QueryState::Loading(_) => Err(eyre!("Failed to {}: no data", action)),
  }
}

// ============================================================================
// Rendering
// ============================================================================

fn render_projects(projects: &[Project]) -> String {
  let mut out = String::new();
  for project in projects {
    let _ = write!(out, "{:>5}  {}", project.id, project.name);
    if let (Some(start), Some(due)) = (&project.start_date, &project.due_date) {
      let _ = write!(out, "  ({} → {})", short_date(start), short_date(due));
    }
    out.push('\n');
  }
  out
}

fn render_tasks(tasks: &[Task]) -> String {
  let mut out = String::new();
  for task in tasks {
    let status = task.status.map(|s| s.as_str()).unwrap_or("-");
    let priority = task
      .priority
      .map(|p| p.to_string())
      .unwrap_or_else(|| "-".to_string());
    let assignee = task
      .assignee
      .as_ref()
      .map(|u| u.username.as_str())
      .unwrap_or("unassigned");
    let _ = writeln!(
      out,
      "{:>5}  {:<12} {:<8} {:<14} {}",
      task.id, status, priority, assignee, task.title
    );
  }
  out
}

fn render_users(users: &[User]) -> String {
  let mut out = String::new();
  for user in users {
    let id = user
      .user_id
      .map(|id| id.to_string())
      .unwrap_or_else(|| "-".to_string());
    let team = user.team_name.as_deref().unwrap_or("");
    let _ = writeln!(out, "{:>5}  {:<16} {}", id, user.username, team);
  }
  out
}

fn render_teams(teams: &[Team]) -> String {
  let mut out = String::new();
  for team in teams {
    let owner = team.product_owner_username.as_deref().unwrap_or("-");
    let manager = team.project_manager_username.as_deref().unwrap_or("-");
    let _ = writeln!(
      out,
      "{:>5}  {:<20} PO: {:<14} PM: {}",
      team.id, team.team_name, owner, manager
    );
  }
  out
}

fn render_search(view: &SearchView, facet: SearchFacet) -> String {
  match (&view.phase, &view.results) {
    (SearchPhase::Idle, _) => String::new(),
    (_, QueryState::Error(e)) => format!("Search for {:?} failed: {}\n", view.term, e),
    (_, QueryState::Success(results)) => render_groups(&view.term, results, facet),
    _ => String::new(),
  }
}

fn render_groups(term: &str, results: &SearchResults, facet: SearchFacet) -> String {
  let groups = results.groups(facet);
  if groups.is_empty() {
    return format!("No results for {term:?}\n");
  }

  let mut out = String::new();
  for group in groups {
    let _ = writeln!(out, "{} ({})", group.title(), group.len());
    let body = match group {
      SearchGroup::Tasks(tasks) => render_tasks(tasks),
      SearchGroup::Projects(projects) => render_projects(projects),
      SearchGroup::Users(users) => render_users(users),
    };
    out.push_str(&body);
  }
  out
}

/// `2023-01-01T00:00:00Z` → `2023-01-01`; anything unparseable is shown as is.
fn short_date(raw: &str) -> String {
  chrono::DateTime::parse_from_rfc3339(raw)
    .map(|dt| dt.format("%Y-%m-%d").to_string())
    .unwrap_or_else(|_| raw.to_string())
}
