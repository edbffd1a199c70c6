use std::time::Duration;

use anyhow::Result;
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

use sessionlens_runtime::{RuntimeConfig, SessionCoordinator, ViewerEvent};
use sessionlens_types::{Chunk, ChunkPayload};

use crate::args::{Cli, Commands, OutputFormat};

pub fn run(cli: Cli) -> Result<()> {
    let mut config = RuntimeConfig::load();
    if let Some(root) = cli.root {
        config.projects_root = root;
    }

    match cli.command {
        Commands::Projects { format } => projects(config, format),
        Commands::Sessions { project, format } => sessions(config, &project, format),
        Commands::Show { project, session, format, context } => {
            show(config, &project, &session, format, context)
        }
        Commands::Search { query, project } => search(config, &query, project.as_deref()),
        Commands::Watch { follow, project } => watch(config, follow, project.as_deref()),
    }
}

fn color_enabled() -> bool {
    std::io::stdout().is_terminal()
}

fn projects(config: RuntimeConfig, format: OutputFormat) -> Result<()> {
    let mut coordinator = SessionCoordinator::new(config)?;
    coordinator.scan_projects()?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(coordinator.projects())?);
        }
        OutputFormat::Plain => {
            for project in coordinator.projects() {
                if color_enabled() {
                    println!(
                        "{}  {} ({} sessions)",
                        project.id.bold(),
                        project.path.dimmed(),
                        project.session_count
                    );
                } else {
                    println!("{}  {} ({} sessions)", project.id, project.path, project.session_count);
                }
            }
        }
    }
    Ok(())
}

fn sessions(config: RuntimeConfig, project: &str, format: OutputFormat) -> Result<()> {
    let mut coordinator = SessionCoordinator::new(config)?;
    coordinator.scan_projects()?;
    coordinator.select_project(project)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(coordinator.sessions(project))?);
        }
        OutputFormat::Plain => {
            for session in coordinator.sessions(project) {
                let branch = if session.git_branch.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", session.git_branch)
                };
                println!(
                    "{}  {} msgs{}  {}",
                    session.id,
                    session.message_count,
                    branch,
                    session.first_message.replace('\n', " ")
                );
            }
        }
    }
    Ok(())
}

fn show(
    config: RuntimeConfig,
    project: &str,
    session: &str,
    format: OutputFormat,
    context: bool,
) -> Result<()> {
    let mut coordinator = SessionCoordinator::new(config)?;
    coordinator.scan_projects()?;
    coordinator.select_project(project)?;
    coordinator.select_session(session)?;

    // One background parse; wait for its completion message
    let deadline = std::time::Instant::now() + Duration::from_secs(60);
    while coordinator.chunks(session).is_none() {
        coordinator.pump();
        if std::time::Instant::now() >= deadline {
            anyhow::bail!("timed out loading session {session}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    let chunks = coordinator.chunks(session).unwrap_or(&[]);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(chunks)?),
        OutputFormat::Plain => {
            for chunk in chunks {
                print_chunk(chunk, context);
            }
        }
    }
    Ok(())
}

fn print_chunk(chunk: &Chunk, context: bool) {
    let colored = color_enabled();
    match &chunk.payload {
        ChunkPayload::User { text, .. } => {
            let header = format!("── user ({})", chunk.id);
            if colored {
                println!("{}", header.green().bold());
            } else {
                println!("{header}");
            }
            println!("{text}");
        }
        ChunkPayload::Ai { status, tool_executions, processes } => {
            let header = format!(
                "── assistant ({}) {:?} · {} tools · {} tokens · ${:.4}",
                chunk.id,
                status,
                tool_executions.len(),
                chunk.metrics.total_tokens,
                chunk.metrics.cost_usd
            );
            if colored {
                println!("{}", header.blue().bold());
            } else {
                println!("{header}");
            }
            for exec in tool_executions {
                let outcome = match &exec.result {
                    Some(r) if r.is_error => "error",
                    Some(_) => "ok",
                    None => "pending",
                };
                println!("  {} [{}] {}ms", exec.call.name, outcome, exec.duration_ms);
            }
            for process in processes {
                let parallel = if process.is_parallel { " ∥" } else { "" };
                println!(
                    "  subagent {}{} · {} ({} msgs)",
                    process.id, parallel, process.description, process.metrics.message_count
                );
            }
        }
        ChunkPayload::System { command_output } => {
            println!("── system ({})", chunk.id);
            println!("{command_output}");
        }
        ChunkPayload::Compact { tokens_freed } => {
            let header = format!("── compaction ({}) freed ~{} tokens", chunk.id, tokens_freed);
            if colored {
                println!("{}", header.yellow());
            } else {
                println!("{header}");
            }
        }
    }

    if context && let Some(stats) = &chunk.context_stats {
        println!(
            "  context: phase {} · {} tokens accumulated",
            stats.phase_number, stats.total_estimated_tokens
        );
        for (category, tokens) in &stats.tokens_by_category {
            println!("    {}: {}", category.as_str(), tokens);
        }
    }
    println!();
}

fn search(config: RuntimeConfig, query: &str, project: Option<&str>) -> Result<()> {
    let engine = sessionlens_runtime::SearchEngine::new(config.projects_root);
    let results = engine.search(query, project);

    for result in &results {
        if result.message_type == "project" {
            println!("project {}  {}", result.project_id, result.context);
        } else {
            println!(
                "{} #{} ({}): …{}…",
                result.session_id, result.message_index, result.message_type, result.context
            );
        }
    }
    eprintln!("{} results", results.len());
    Ok(())
}

fn watch(config: RuntimeConfig, follow: bool, project: Option<&str>) -> Result<()> {
    let mut coordinator = SessionCoordinator::new(config)?;
    coordinator.set_follow_latest(follow);
    coordinator.scan_projects()?;
    if let Some(project) = project {
        coordinator.select_project(project)?;
    }

    eprintln!("watching for session activity (ctrl-c to stop)");
    loop {
        coordinator.pump();
        while let Ok(event) = coordinator.events().try_recv() {
            match event {
                ViewerEvent::SessionActivityChanged { session_id, is_ongoing } => {
                    let state = if is_ongoing { "active" } else { "idle" };
                    println!("session {session_id} is now {state}");
                }
                ViewerEvent::ConversationUpdated { session_id } => {
                    println!("session {session_id} updated");
                }
                ViewerEvent::ConversationLoaded { session_id } => {
                    println!("session {session_id} loaded");
                }
                ViewerEvent::NotificationFired(entry) => {
                    println!("notification [{}]: {}", entry.trigger_name, entry.matched_text);
                }
                ViewerEvent::ConversationLoadFailed { session_id } => {
                    eprintln!("session {session_id} failed to load");
                }
                ViewerEvent::ProjectsLoaded | ViewerEvent::SessionsLoaded { .. } => {}
            }
        }
        std::thread::sleep(Duration::from_millis(200));
    }
}
