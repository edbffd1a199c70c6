//! Path sandboxing and sensitive-path redaction.
//!
//! Every path surfaced to readers must resolve (following symlinks) under
//! an allowed root, and session paths must carry a `.jsonl` extension.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

static SENSITIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"[/\\]\.ssh[/\\]",
        r"[/\\]\.aws[/\\]",
        r"[/\\]\.config[/\\]gcloud[/\\]",
        r"[/\\]\.azure[/\\]",
        r"[/\\]\.env($|\.)",
        r"[/\\]\.git-credentials$",
        r"[/\\]\.gitconfig$",
        r"[/\\]\.npmrc$",
        r"[/\\]\.docker[/\\]config\.json$",
        r"[/\\]\.kube[/\\]config$",
        r"[/\\]id_rsa$",
        r"[/\\]id_ed25519$",
        r"[/\\]id_ecdsa$",
        r"\.pem$",
        r"\.key$",
        r"[/\\]etc[/\\]passwd$",
        r"[/\\]etc[/\\]shadow$",
        r"credentials\.json$",
        r"secrets\.json$",
        r"tokens\.json$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

/// Check whether a file path matches any sensitive pattern.
pub fn is_sensitive_path(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    SENSITIVE_PATTERNS.iter().any(|re| re.is_match(&normalized))
}

/// Roots under which session data may be read.
pub fn allowed_roots() -> Vec<PathBuf> {
    match dirs::home_dir() {
        Some(home) => vec![home.join(".claude")],
        None => Vec::new(),
    }
}

/// Validate that a path resolves inside an allowed root.
///
/// Symlinks are resolved before the check so a link cannot escape the
/// sandbox. Paths that fail to canonicalize are rejected.
pub fn is_path_allowed(path: &Path, extra_roots: &[PathBuf]) -> bool {
    let Ok(resolved) = path.canonicalize() else {
        return false;
    };

    let mut roots = allowed_roots();
    roots.extend_from_slice(extra_roots);

    roots.iter().any(|root| {
        root.canonicalize()
            .map(|r| resolved == r || resolved.starts_with(&r))
            .unwrap_or(false)
    })
}

/// Validate a session file path: `.jsonl` extension and inside the sandbox.
pub fn validate_session_path(path: &Path, extra_roots: &[PathBuf]) -> bool {
    if path.extension().is_none_or(|e| e != "jsonl") {
        return false;
    }
    is_path_allowed(path, extra_roots)
}

/// Mask sensitive paths for display.
pub fn sanitize_display_path(path: &str) -> String {
    if is_sensitive_path(path) {
        "[sensitive path hidden]".to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_sensitive_patterns() {
        assert!(is_sensitive_path("/home/wiz/.ssh/id_rsa"));
        assert!(is_sensitive_path("/home/wiz/.aws/credentials"));
        assert!(is_sensitive_path("/home/wiz/project/.env"));
        assert!(is_sensitive_path("/home/wiz/project/.env.local"));
        assert!(is_sensitive_path("/home/wiz/server.pem"));
        assert!(is_sensitive_path("/home/wiz/private.key"));
        assert!(is_sensitive_path("/etc/passwd"));
        assert!(is_sensitive_path("/etc/shadow"));
        assert!(is_sensitive_path("/app/secrets.json"));
        assert!(is_sensitive_path(r"C:\Users\wiz\.kube\config"));
    }

    #[test]
    fn test_non_sensitive_paths() {
        assert!(!is_sensitive_path("/home/wiz/project/src/main.rs"));
        assert!(!is_sensitive_path("/home/wiz/.claude/projects/x/session.jsonl"));
        // ".env" must be its own segment prefix, not part of a longer name
        assert!(!is_sensitive_path("/home/wiz/.envelope/notes.md"));
    }

    #[test]
    fn test_sanitize_display_path() {
        assert_eq!(sanitize_display_path("/home/wiz/.ssh/id_rsa"), "[sensitive path hidden]");
        assert_eq!(sanitize_display_path("/home/wiz/notes.md"), "/home/wiz/notes.md");
    }

    #[test]
    fn test_extra_root_allows_session_path() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("abc.jsonl");
        fs::write(&session, "{}\n").unwrap();

        let extra = vec![dir.path().to_path_buf()];
        assert!(validate_session_path(&session, &extra));
        assert!(!validate_session_path(&session, &[]));
    }

    #[test]
    fn test_rejects_wrong_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("abc.json");
        fs::write(&file, "{}\n").unwrap();

        let extra = vec![dir.path().to_path_buf()];
        assert!(!validate_session_path(&file, &extra));
    }

    #[test]
    fn test_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.jsonl");
        let extra = vec![dir.path().to_path_buf()];
        assert!(!validate_session_path(&missing, &extra));
    }

    #[test]
    fn test_symlink_cannot_escape_sandbox() {
        let inside = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let target = outside.path().join("real.jsonl");
        fs::write(&target, "{}\n").unwrap();

        let link = inside.path().join("link.jsonl");
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&target, &link).unwrap();
            let extra = vec![inside.path().to_path_buf()];
            assert!(!validate_session_path(&link, &extra));
        }
    }
}
