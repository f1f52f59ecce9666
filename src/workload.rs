//! Detection of running workloads that warrant a boost policy.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use tokio::fs;

/// Answers whether any process with one of the given names is running.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkloadDetector: Send + Sync {
    async fn is_running(&self, names: &[String]) -> bool;
}

/// Scans a procfs tree (`<root>/<pid>/comm` and `cmdline`).
#[derive(Debug, Clone)]
pub struct ProcScanner {
    root: PathBuf,
}

impl ProcScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn process_names(pid_dir: &Path) -> Vec<String> {
        let mut names = Vec::with_capacity(2);

        if let Ok(comm) = fs::read_to_string(pid_dir.join("comm")).await {
            names.push(comm.trim().to_string());
        }
        if let Ok(cmdline) = fs::read(pid_dir.join("cmdline")).await {
            if let Some(argv0) = cmdline.split(|b| *b == 0).next().filter(|a| !a.is_empty()) {
                let argv0 = String::from_utf8_lossy(argv0);
                if let Some(base) = Path::new(argv0.as_ref()).file_name() {
                    names.push(base.to_string_lossy().into_owned());
                }
            }
        }

        names
    }
}

fn matches_any(candidate: &str, names: &[String]) -> bool {
    names.iter().any(|n| !n.is_empty() && candidate.contains(n.as_str()))
}

#[async_trait]
impl WorkloadDetector for ProcScanner {
    async fn is_running(&self, names: &[String]) -> bool {
        if names.is_empty() {
            return false;
        }

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot scan {}: {e}", self.root.display());
                return false;
            }
        };

        // Processes may exit mid-scan; unreadable entries are skipped.
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_pid = entry
                .file_name()
                .to_str()
                .is_some_and(|s| s.bytes().all(|b| b.is_ascii_digit()));
            if !is_pid {
                continue;
            }

            let found = Self::process_names(&entry.path())
                .await
                .iter()
                .any(|candidate| matches_any(candidate, names));
            if found {
                return true;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_process(root: &Path, pid: &str, comm: &str, cmdline: &[u8]) {
        let dir = root.join(pid);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("comm"), format!("{comm}\n")).unwrap();
        std::fs::write(dir.join("cmdline"), cmdline).unwrap();
    }

    #[tokio::test]
    async fn finds_process_by_comm() {
        let root = TempDir::new().unwrap();
        fake_process(root.path(), "10", "bash", b"/bin/bash\0");
        fake_process(root.path(), "42", "clang-18", b"/usr/bin/clang-18\0-c\0a.c\0");

        let scanner = ProcScanner::new(root.path());
        assert!(scanner.is_running(&["clang".to_string()]).await);
        assert!(!scanner.is_running(&["rustc".to_string()]).await);
    }

    #[tokio::test]
    async fn finds_process_by_argv0_basename() {
        let root = TempDir::new().unwrap();
        fake_process(root.path(), "7", "cc1plus", b"/opt/llvm/bin/clang++\0x.cpp\0");

        let scanner = ProcScanner::new(root.path());
        assert!(scanner.is_running(&["clang".to_string()]).await);
    }

    #[tokio::test]
    async fn ignores_non_pid_entries_and_missing_root() {
        let root = TempDir::new().unwrap();
        fake_process(root.path(), "self", "clang", b"clang\0");

        assert!(!ProcScanner::new(root.path()).is_running(&["clang".to_string()]).await);
        assert!(!ProcScanner::new(root.path().join("nope")).is_running(&["clang".to_string()]).await);
    }

    #[test]
    fn empty_names_never_match() {
        assert!(!matches_any("clang", &[String::new()]));
        assert!(matches_any("clang-18", &["clang".to_string()]));
    }
}
