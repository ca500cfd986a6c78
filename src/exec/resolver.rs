//! Executable resolution for pipeline segments.
//!
//! Resolves `argv[0]` to an absolute path through the search path, flags
//! semantic wrappers, and answers whether a resolved binary lives in a
//! trusted directory. Finding a binary on `PATH` confers no trust by
//! itself — a user-writable directory early on `PATH` can shadow a system
//! utility with a look-alike, so trust is a separate, explicit check.

use serde::Serialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Utilities whose job is to re-interpret their arguments as another
/// program or inline script. The real action of such an invocation is
/// opaque to static argument analysis, so resolution flags them and the
/// evaluator denies them regardless of what follows. Operator-tunable
/// data, not logic.
pub const SEMANTIC_WRAPPERS: &[&str] = &[
    "sh", "bash", "zsh", "dash", "ksh", "fish", "env", "nice", "nohup", "setsid", "stdbuf",
    "timeout", "time", "xargs", "sudo", "doas", "su", "chroot", "watch", "strace", "ltrace",
    "busybox", "script", "eval", "command", "exec",
];

/// Standard system binary directories. A safe-bin profile only applies to
/// binaries resolved from one of these (or a caller-supplied trusted
/// directory); anything else is PATH-shadowing territory.
pub const SYSTEM_TRUSTED_DIRS: &[&str] = &[
    "/usr/bin",
    "/bin",
    "/usr/local/bin",
    "/usr/sbin",
    "/sbin",
    "/usr/local/sbin",
    "/opt/homebrew/bin",
    "/opt/homebrew/sbin",
];

/// Outcome of resolving one segment's executable. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutableResolution {
    /// The `argv[0]` token as written.
    pub raw_executable: String,
    /// Canonicalized absolute path of the binary that would run.
    pub resolved_path: PathBuf,
    /// File name of the resolved binary. Taken after canonicalization so
    /// a symlink named like a safe utility cannot borrow its profile.
    pub executable_name: String,
    /// Set when resolution itself detects a disallowed pattern
    /// (a semantic wrapper).
    pub policy_blocked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveExecutableError {
    /// `FOO=bar cmd` re-interprets everything after it (`PATH`,
    /// `LD_PRELOAD`, ...), so it is refused rather than skipped.
    #[error("leading environment assignment '{0}' is not analyzable")]
    EnvAssignment(String),
    #[error("executable '{0}' not found on the search path")]
    NotFound(String),
}

/// Resolve an `argv[0]` token to an [`ExecutableResolution`].
///
/// `path_env` defaults to the process `PATH`; `cwd` anchors relative
/// lookups. Both are injectable so evaluations are reproducible in tests.
pub fn resolve_executable(
    raw: &str,
    path_env: Option<&OsStr>,
    cwd: &Path,
) -> Result<ExecutableResolution, ResolveExecutableError> {
    if is_env_assignment(raw) {
        return Err(ResolveExecutableError::EnvAssignment(raw.to_string()));
    }

    let process_path = std::env::var_os("PATH");
    let search_path = path_env.or(process_path.as_deref());

    let found = which::which_in(raw, search_path, cwd)
        .map_err(|_| ResolveExecutableError::NotFound(raw.to_string()))?;
    // Canonicalize so symlinked directories (/bin -> /usr/bin) and
    // symlinked binaries compare against what actually runs.
    let resolved_path = found.canonicalize().unwrap_or(found);

    let executable_name = resolved_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ResolveExecutableError::NotFound(raw.to_string()))?;

    let policy_blocked = SEMANTIC_WRAPPERS.contains(&executable_name.as_str());

    Ok(ExecutableResolution {
        raw_executable: raw.to_string(),
        resolved_path,
        executable_name,
        policy_blocked,
    })
}

/// `NAME=value` before any path separator is a shell environment
/// assignment, not an executable.
fn is_env_assignment(token: &str) -> bool {
    let candidate = token.split('/').next().unwrap_or("");
    let Some((name, _)) = candidate.split_once('=') else {
        return false;
    };
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Whether `resolved` sits directly inside a trusted directory.
///
/// The built-in system set is always consulted; `extra` holds directories
/// the operator explicitly marked trusted. Trusted directories are
/// canonicalized before comparison for the same symlink reasons as above.
pub fn is_trusted_location(resolved: &Path, extra: &[PathBuf]) -> bool {
    let Some(parent) = resolved.parent() else {
        return false;
    };

    SYSTEM_TRUSTED_DIRS
        .iter()
        .map(PathBuf::from)
        .chain(extra.iter().cloned())
        .any(|dir| {
            let canonical = dir.canonicalize().unwrap_or(dir);
            parent == canonical
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[cfg(unix)]
    fn fake_bin(dir: &Path, name: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn env_assignment_detection() {
        assert!(is_env_assignment("FOO=bar"));
        assert!(is_env_assignment("_X=1"));
        assert!(!is_env_assignment("jq"));
        assert!(!is_env_assignment("./a=b/jq"));
        assert!(!is_env_assignment("1=2"));
    }

    #[cfg(unix)]
    #[test]
    fn resolves_through_injected_path() {
        let dir = tempfile::tempdir().unwrap();
        fake_bin(dir.path(), "jq");

        let res = resolve_executable(
            "jq",
            Some(dir.path().as_os_str()),
            dir.path(),
        )
        .unwrap();
        assert_eq!(res.executable_name, "jq");
        assert!(res.resolved_path.is_absolute());
        assert!(!res.policy_blocked);
    }

    #[cfg(unix)]
    #[test]
    fn missing_executable_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_executable(
            "definitely-not-here",
            Some(dir.path().as_os_str()),
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, ResolveExecutableError::NotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn env_assignment_prefix_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_executable(
            "PATH=/tmp",
            Some(dir.path().as_os_str()),
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, ResolveExecutableError::EnvAssignment(_)));
    }

    #[cfg(unix)]
    #[test]
    fn wrapper_is_policy_blocked() {
        let dir = tempfile::tempdir().unwrap();
        fake_bin(dir.path(), "env");

        let res = resolve_executable(
            "env",
            Some(dir.path().as_os_str()),
            dir.path(),
        )
        .unwrap();
        assert!(res.policy_blocked);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cannot_borrow_a_safe_name() {
        let dir = tempfile::tempdir().unwrap();
        let real = fake_bin(dir.path(), "python3");
        std::os::unix::fs::symlink(&real, dir.path().join("jq")).unwrap();

        let res = resolve_executable(
            "jq",
            Some(dir.path().as_os_str()),
            dir.path(),
        )
        .unwrap();
        // Canonicalization reveals the real target name.
        assert_eq!(res.executable_name, "python3");
    }

    #[cfg(unix)]
    #[test]
    fn tempdir_is_not_trusted_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_bin(dir.path(), "sort");
        assert!(!is_trusted_location(&bin, &[]));
    }

    #[cfg(unix)]
    #[test]
    fn explicit_trusted_dir_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_bin(dir.path(), "sort");
        let canonical_bin = bin.canonicalize().unwrap();
        assert!(is_trusted_location(
            &canonical_bin,
            &[dir.path().to_path_buf()]
        ));
    }

    #[test]
    fn wrapper_table_contains_shells_and_env() {
        for name in ["sh", "bash", "env", "xargs", "sudo"] {
            assert!(SEMANTIC_WRAPPERS.contains(&name), "{name} missing");
        }
    }
}
