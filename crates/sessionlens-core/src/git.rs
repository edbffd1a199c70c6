//! Git metadata resolution without shelling out.
//!
//! Reads `.git/HEAD` directly so a branch can be shown for sessions whose
//! records carry none. Worktrees keep `.git` as a file with a `gitdir:`
//! pointer to the real directory.

use std::fs;
use std::path::{Path, PathBuf};

/// Resolve the current branch of the repository at `project_path`.
///
/// Returns an empty string for non-repositories or unreadable state.
/// A detached HEAD resolves to the short commit hash.
pub fn resolve_git_branch(project_path: &Path) -> String {
    let Some(head_path) = head_file(project_path) else {
        return String::new();
    };

    let Ok(head) = fs::read_to_string(&head_path) else {
        return String::new();
    };
    let head = head.trim();

    if let Some(branch) = head.strip_prefix("ref: refs/heads/") {
        return branch.to_string();
    }

    // Detached HEAD
    if head.len() >= 8 {
        head[..8].to_string()
    } else {
        head.to_string()
    }
}

/// Whether `project_path` is a git worktree (`.git` is a pointer file).
pub fn is_worktree(project_path: &Path) -> bool {
    project_path.join(".git").is_file()
}

fn head_file(project_path: &Path) -> Option<PathBuf> {
    let git_path = project_path.join(".git");

    if git_path.is_file() {
        let content = fs::read_to_string(&git_path).ok()?;
        let gitdir = content.trim().strip_prefix("gitdir:")?.trim();
        let head = Path::new(gitdir).join("HEAD");
        return head.exists().then_some(head);
    }

    if git_path.is_dir() {
        let head = git_path.join("HEAD");
        return head.exists().then_some(head);
    }

    None
}
