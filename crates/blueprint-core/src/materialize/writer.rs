//! All-or-nothing commit of staged files

use super::target::{EntryKind, FsTarget, Snapshot, WriteTarget};
use crate::error::MaterializationError;
use crate::session::CancelFlag;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What to do when a destination already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    #[default]
    Refuse,
    Overwrite,
}

/// A fully rendered file waiting for the commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Normalized path relative to the project root
    pub path: String,
    pub content: Vec<u8>,
    pub mode: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub root: PathBuf,
    /// Relative paths written, in commit order
    pub written: Vec<String>,
    /// How many of those replaced an existing file
    pub replaced: usize,
    pub created_dirs: usize,
}

/// Everything a commit changed, so it can be undone
#[derive(Debug, Default)]
struct Journal {
    created_dirs: Vec<PathBuf>,
    created_files: Vec<PathBuf>,
    replaced: Vec<(PathBuf, Snapshot)>,
}

/// Writes staged files under a root directory
pub struct Materializer<T: WriteTarget = FsTarget> {
    target: T,
    policy: OverwritePolicy,
}

impl Materializer<FsTarget> {
    pub fn new(policy: OverwritePolicy) -> Self {
        Self::with_target(FsTarget, policy)
    }
}

impl<T: WriteTarget> Materializer<T> {
    pub fn with_target(target: T, policy: OverwritePolicy) -> Self {
        Self { target, policy }
    }

    /// Write every staged file or none of them
    ///
    /// Destinations are checked before anything is written. A failed write or
    /// a cancellation between writes rolls back everything done so far.
    pub fn commit(
        &self,
        files: &[StagedFile],
        root: &Path,
        cancel: &CancelFlag,
    ) -> Result<CommitReport, MaterializationError> {
        self.preflight(files, root)?;

        let mut journal = Journal::default();
        let mut report = CommitReport {
            root: root.to_path_buf(),
            ..Default::default()
        };

        for file in files {
            if cancel.is_cancelled() {
                warn!(written = journal.created_files.len(), "commit cancelled, rolling back");
                let leftovers = self.rollback(journal);
                return Err(MaterializationError::Cancelled { leftovers });
            }

            let path = root.join(&file.path);
            if let Err((failed, source)) = self.write_one(&path, file, &mut journal, &mut report) {
                warn!(path = %failed.display(), error = %source, "write failed, rolling back");
                let leftovers = self.rollback(journal);
                return Err(MaterializationError::PartialWriteFailure {
                    path: failed,
                    source,
                    leftovers,
                });
            }
            report.written.push(file.path.clone());
        }

        report.created_dirs = journal.created_dirs.len();
        info!(
            root = %root.display(),
            files = report.written.len(),
            replaced = report.replaced,
            "commit complete"
        );
        Ok(report)
    }

    fn preflight(&self, files: &[StagedFile], root: &Path) -> Result<(), MaterializationError> {
        for file in files {
            // Every existing component below the root, the destination last
            let mut path = root.to_path_buf();
            let mut components = Path::new(&file.path).components().peekable();
            while let Some(component) = components.next() {
                path.push(component);
                let kind = self
                    .target
                    .kind(&path)
                    .map_err(|source| MaterializationError::Io {
                        path: path.clone(),
                        source,
                    })?;
                let last = components.peek().is_none();
                match kind {
                    None => break,
                    Some(EntryKind::Symlink) => {
                        return Err(MaterializationError::SymlinkInPath { path })
                    }
                    Some(EntryKind::Dir) if last => {
                        return Err(MaterializationError::DestinationExists { path })
                    }
                    Some(EntryKind::File) if last && self.policy == OverwritePolicy::Refuse => {
                        return Err(MaterializationError::DestinationExists { path })
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    fn write_one(
        &self,
        path: &Path,
        file: &StagedFile,
        journal: &mut Journal,
        report: &mut CommitReport,
    ) -> Result<(), (PathBuf, io::Error)> {
        if let Some(parent) = path.parent() {
            self.create_dirs(parent, journal)?;
        }

        let existing = self.target.kind(path).map_err(|e| (path.to_path_buf(), e))?;
        if existing.is_some() {
            let snapshot = self.target.read(path).map_err(|e| (path.to_path_buf(), e))?;
            journal.replaced.push((path.to_path_buf(), snapshot));
            report.replaced += 1;
        } else {
            journal.created_files.push(path.to_path_buf());
        }

        self.target
            .write(path, &file.content, file.mode)
            .map_err(|e| (path.to_path_buf(), e))?;
        debug!(path = %file.path, mode = %format!("{:o}", file.mode), "wrote file");
        Ok(())
    }

    /// `mkdir -p`, journaling each directory actually created
    fn create_dirs(&self, dir: &Path, journal: &mut Journal) -> Result<(), (PathBuf, io::Error)> {
        let mut missing = Vec::new();
        let mut current = Some(dir);
        while let Some(path) = current {
            if path.as_os_str().is_empty() {
                break;
            }
            match self.target.kind(path).map_err(|e| (path.to_path_buf(), e))? {
                // the root itself may be reached through a link
                Some(EntryKind::Dir) | Some(EntryKind::Symlink) => break,
                Some(EntryKind::File) => {
                    return Err((
                        path.to_path_buf(),
                        io::Error::new(io::ErrorKind::AlreadyExists, "a file is in the way of a directory"),
                    ))
                }
                None => missing.push(path.to_path_buf()),
            }
            current = path.parent();
        }

        for path in missing.into_iter().rev() {
            self.target
                .create_dir(&path)
                .map_err(|e| (path.clone(), e))?;
            journal.created_dirs.push(path);
        }
        Ok(())
    }

    /// Undo a journal; returns the paths that could not be restored
    fn rollback(&self, journal: Journal) -> Vec<PathBuf> {
        let mut leftovers = Vec::new();

        for path in journal.created_files.into_iter().rev() {
            match self.target.remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not remove written file");
                    leftovers.push(path);
                }
            }
        }

        for (path, snapshot) in journal.replaced.into_iter().rev() {
            if let Err(e) = self.target.write(&path, &snapshot.content, snapshot.mode) {
                warn!(path = %path.display(), error = %e, "could not restore replaced file");
                leftovers.push(path);
            }
        }

        for path in journal.created_dirs.into_iter().rev() {
            if let Err(e) = self.target.remove_dir(&path) {
                warn!(path = %path.display(), error = %e, "could not remove created directory");
                leftovers.push(path);
            }
        }

        leftovers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use walkdir::WalkDir;

    /// Real filesystem that fails the write numbered `fail_at` (0-based)
    struct FailingTarget {
        fail_at: usize,
        writes: AtomicUsize,
    }

    impl FailingTarget {
        fn new(fail_at: usize) -> Self {
            Self {
                fail_at,
                writes: AtomicUsize::new(0),
            }
        }
    }

    impl WriteTarget for FailingTarget {
        fn kind(&self, path: &Path) -> io::Result<Option<EntryKind>> {
            FsTarget.kind(path)
        }
        fn create_dir(&self, path: &Path) -> io::Result<()> {
            FsTarget.create_dir(path)
        }
        fn read(&self, path: &Path) -> io::Result<Snapshot> {
            FsTarget.read(path)
        }
        fn write(&self, path: &Path, content: &[u8], mode: u32) -> io::Result<()> {
            if self.writes.fetch_add(1, Ordering::SeqCst) == self.fail_at {
                // leave a truncated file behind, like a full disk would
                std::fs::write(path, &content[..content.len() / 2])?;
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            FsTarget.write(path, content, mode)
        }
        fn remove_file(&self, path: &Path) -> io::Result<()> {
            FsTarget.remove_file(path)
        }
        fn remove_dir(&self, path: &Path) -> io::Result<()> {
            FsTarget.remove_dir(path)
        }
    }

    fn staged(path: &str, content: &str) -> StagedFile {
        StagedFile {
            path: path.to_string(),
            content: content.as_bytes().to_vec(),
            mode: 0o644,
        }
    }

    fn entries(root: &Path) -> Vec<PathBuf> {
        WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.path().to_path_buf())
            .collect()
    }

    #[test]
    fn test_commit_writes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("project");
        let mut script = staged("scripts/build.sh", "#!/bin/sh\n");
        script.mode = 0o755;
        let files = vec![staged("main.go", "package main\n"), script];

        let report = Materializer::new(OverwritePolicy::Refuse)
            .commit(&files, &root, &CancelFlag::new())
            .unwrap();
        assert_eq!(report.written, vec!["main.go", "scripts/build.sh"]);
        assert_eq!(report.created_dirs, 2);
        assert_eq!(std::fs::read_to_string(root.join("main.go")).unwrap(), "package main\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(root.join("scripts/build.sh")).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_existing_destination_refused_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "mine").unwrap();
        let files = vec![staged("main.go", "package main\n"), staged("README.md", "theirs")];

        let err = Materializer::new(OverwritePolicy::Refuse)
            .commit(&files, dir.path(), &CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, MaterializationError::DestinationExists { .. }));
        assert!(!dir.path().join("main.go").exists());
        assert_eq!(std::fs::read_to_string(dir.path().join("README.md")).unwrap(), "mine");
    }

    #[test]
    fn test_failure_on_last_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("out");
        let files = vec![
            staged("go.mod", "module demo\n"),
            staged("cmd/api/main.go", "package main\n"),
            staged("internal/auth/jwt.go", "package auth\n"),
        ];

        let err = Materializer::with_target(FailingTarget::new(2), OverwritePolicy::Refuse)
            .commit(&files, &root, &CancelFlag::new())
            .unwrap_err();
        match err {
            MaterializationError::PartialWriteFailure { path, leftovers, .. } => {
                assert!(path.ends_with("internal/auth/jwt.go"));
                assert!(leftovers.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!root.exists());
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn test_rollback_restores_overwritten_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "original").unwrap();
        let files = vec![staged("README.md", "generated"), staged("main.go", "package main\n")];

        let err = Materializer::with_target(FailingTarget::new(1), OverwritePolicy::Overwrite)
            .commit(&files, dir.path(), &CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, MaterializationError::PartialWriteFailure { .. }));
        assert_eq!(std::fs::read_to_string(dir.path().join("README.md")).unwrap(), "original");
        assert!(!dir.path().join("main.go").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_destination_refused_even_with_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("outside.txt");
        std::fs::write(&outside, "secret").unwrap();
        let root = dir.path().join("project");
        std::fs::create_dir(&root).unwrap();
        std::os::unix::fs::symlink("../outside.txt", root.join("README.md")).unwrap();

        let files = vec![staged("main.go", "package main\n"), staged("README.md", "generated")];
        let err = Materializer::new(OverwritePolicy::Overwrite)
            .commit(&files, &root, &CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, MaterializationError::SymlinkInPath { ref path } if path.ends_with("README.md")));
        assert_eq!(std::fs::read_to_string(&outside).unwrap(), "secret");
        assert!(!root.join("main.go").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_below_root_refused() {
        let dir = tempfile::tempdir().unwrap();
        let elsewhere = dir.path().join("elsewhere");
        std::fs::create_dir(&elsewhere).unwrap();
        let root = dir.path().join("project");
        std::fs::create_dir(&root).unwrap();
        std::os::unix::fs::symlink(&elsewhere, root.join("cmd")).unwrap();

        let err = Materializer::new(OverwritePolicy::Overwrite)
            .commit(&[staged("cmd/main.go", "package main\n")], &root, &CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, MaterializationError::SymlinkInPath { ref path } if path.ends_with("cmd")));
        assert!(entries(&elsewhere).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_root_reached_through_symlink_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        Materializer::new(OverwritePolicy::Refuse)
            .commit(&[staged("pkg/lib.go", "package pkg\n")], &link, &CancelFlag::new())
            .unwrap();
        assert_eq!(std::fs::read_to_string(real.join("pkg/lib.go")).unwrap(), "package pkg\n");
    }

    #[test]
    fn test_cancelled_commit_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = Materializer::new(OverwritePolicy::Refuse)
            .commit(&[staged("main.go", "package main\n")], dir.path(), &cancel)
            .unwrap_err();
        assert!(matches!(err, MaterializationError::Cancelled { .. }));
        assert!(entries(dir.path()).is_empty());
    }
}
