use clap::{Parser, Subcommand, ValueEnum};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum OutputFormat {
    Plain,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Plain => write!(f, "plain"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "sessionlens", about = "Browse, search, and tail AI agent session logs", version)]
pub struct Cli {
    /// Override the projects root directory
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List projects under the root
    Projects {
        #[arg(long, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },
    /// List sessions of a project, newest first
    Sessions {
        /// Encoded project id, e.g. -home-wiz-app
        project: String,
        #[arg(long, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },
    /// Show one conversation as chunks
    Show {
        project: String,
        session: String,
        #[arg(long, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
        /// Include per-chunk context attribution
        #[arg(long)]
        context: bool,
    },
    /// Search project names, or session content within a project
    Search {
        query: String,
        #[arg(long)]
        project: Option<String>,
    },
    /// Follow live sessions, printing updates and notifications
    Watch {
        /// Auto-select whichever session is receiving writes
        #[arg(long)]
        follow: bool,
        /// Project to select initially
        #[arg(long)]
        project: Option<String>,
    },
}
