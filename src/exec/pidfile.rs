//! PID file handle: opened before the privilege drop, written after detach.

use std::fs::File;
use std::io::Write;
use std::os::unix::io::IntoRawFd;
use std::path::{Path, PathBuf};

/// An open, still-empty PID file.
///
/// Dropping it closes the file unwritten, which is what every fatal path
/// between creation and [`PidFile::write_pid`] relies on.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    file: File,
}

impl PidFile {
    pub fn new(path: PathBuf, file: File) -> Self {
        Self { path, file }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `<pid>\n` and close. Failures are logged, never fatal.
    pub fn write_pid(mut self, pid: u32) {
        if let Err(e) = writeln!(self.file, "{}", pid) {
            log::warn!("Failed to write PID {} to {}: {}", pid, self.path.display(), e);
        }

        let fd = self.file.into_raw_fd();
        match nix::unistd::close(fd) {
            Ok(()) => log::info!("Wrote PID {} to {}", pid, self.path.display()),
            Err(e) => log::warn!("Failed to close {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_single_line_with_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        let file = File::create(&path).unwrap();

        PidFile::new(path.clone(), file).write_pid(4242);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "4242\n");
    }

    #[test]
    fn drop_leaves_file_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        let file = File::create(&path).unwrap();

        let pid_file = PidFile::new(path.clone(), file);
        assert_eq!(pid_file.path(), path.as_path());
        drop(pid_file);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn write_failure_is_logged_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        File::create(&path).unwrap();
        let read_only = File::open(&path).unwrap();

        PidFile::new(path.clone(), read_only).write_pid(4242);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
