mod codec;
mod git;
mod sandbox;

pub use codec::{decode_path, encode_path, project_display_name, strip_composite_suffix};
pub use git::{is_worktree, resolve_git_branch};
pub use sandbox::{
    allowed_roots, is_path_allowed, is_sensitive_path, sanitize_display_path,
    validate_session_path,
};
