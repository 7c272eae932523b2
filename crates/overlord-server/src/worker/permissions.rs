//! The capability grant handed to a worker.

use std::path::{Path, PathBuf};

/// The minimal capability set a worker runs with: network access on,
/// filesystem write off, filesystem read restricted to an explicit
/// allow-list. The script loader enforces the grant; scripts are never
/// handed filesystem or process bindings at all.
#[derive(Debug, Clone)]
pub struct WorkerPermissions {
    pub net: bool,
    pub write: bool,
    pub read: Vec<PathBuf>,
}

impl WorkerPermissions {
    /// The grant for running one resolved script: read access to exactly
    /// that script path (when it is a local path) and nothing else.
    pub fn for_script(location: Option<&str>) -> Self {
        let read = location
            .filter(|l| !is_remote(l))
            .map(|l| vec![PathBuf::from(l)])
            .unwrap_or_default();

        Self {
            net: true,
            write: false,
            read,
        }
    }

    pub fn allows_read(&self, path: &Path) -> bool {
        self.read.iter().any(|allowed| allowed.as_path() == path)
    }
}

pub(crate) fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_for_local_script() {
        let permissions = WorkerPermissions::for_script(Some("./mocks/hello.js"));
        assert!(permissions.net);
        assert!(!permissions.write);
        assert!(permissions.allows_read(Path::new("./mocks/hello.js")));
        assert!(!permissions.allows_read(Path::new("./mocks/other.js")));
        assert!(!permissions.allows_read(Path::new("/etc/passwd")));
    }

    #[test]
    fn test_grant_for_remote_script_has_no_read_paths() {
        let permissions = WorkerPermissions::for_script(Some("http://localhost:5000/world"));
        assert!(permissions.net);
        assert!(permissions.read.is_empty());
    }

    #[test]
    fn test_grant_for_absent_location() {
        let permissions = WorkerPermissions::for_script(None);
        assert!(permissions.read.is_empty());
    }
}
