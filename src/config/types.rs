/// Core types shared by the CLI, the identity resolver and the transition chain
use nix::errno::Errno;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Program name used as the prefix of every diagnostic on stderr.
pub const PROGNAME: &str = "daemonize";

/// Exit status for bad flags or a missing program argument.
pub const EXIT_USAGE: i32 = 1;

/// Exit status for every resolution, I/O, privilege, detach or exec failure.
pub const EXIT_FAILURE: i32 = 2;

/// Everything the transition needs to know, fixed before the first step runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionRequest {
    /// Detach from the controlling terminal before exec
    pub daemonize: bool,
    /// Target user name
    pub username: Option<String>,
    /// Target group name; overrides the user's primary group
    pub groupname: Option<String>,
    /// File that receives the final process id
    pub pidfile: Option<PathBuf>,
    /// Directory to enter before anything else happens
    pub working_directory: Option<PathBuf>,
    /// Replace the environment with `HOME` only instead of inheriting it
    pub scrub_environment: bool,
    /// Treat failed setgroups/setgid/setuid calls as fatal
    pub strict: bool,
}

impl Default for TransitionRequest {
    fn default() -> Self {
        Self {
            daemonize: true,
            username: None,
            groupname: None,
            pidfile: None,
            working_directory: None,
            scrub_environment: true,
            strict: false,
        }
    }
}

impl TransitionRequest {
    /// True when neither a user nor a group was requested.
    pub fn keeps_identity(&self) -> bool {
        self.username.is_none() && self.groupname.is_none()
    }
}

#[derive(Error, Debug)]
pub enum DaemonizeError {
    #[error("{0}")]
    Usage(String),

    #[error("{name}: no such user")]
    UnknownUser { name: String },

    #[error("{name}: no such group")]
    UnknownGroup { name: String },

    #[error("getpwuid({uid}): no such user")]
    UnknownUserId { uid: u32 },

    #[error("getgrgid({gid}): no such group")]
    UnknownGroupId { gid: u32 },

    #[error("{context}: {source}")]
    Lookup {
        context: String,
        #[source]
        source: Errno,
    },

    #[error("{}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", path.display())]
    PidFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{op}: {source}")]
    Privilege {
        op: &'static str,
        #[source]
        source: Errno,
    },

    #[error("credential verification failed: {0}")]
    Verification(String),

    #[error("daemon: {0}")]
    Detach(#[source] Errno),

    #[error("{}: {source}", program.display())]
    Exec {
        program: PathBuf,
        #[source]
        source: Errno,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DaemonizeError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            DaemonizeError::Usage(_) => EXIT_USAGE,
            _ => EXIT_FAILURE,
        }
    }

    /// True for failures that happen while looking up names or ids.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            DaemonizeError::UnknownUser { .. }
                | DaemonizeError::UnknownGroup { .. }
                | DaemonizeError::UnknownUserId { .. }
                | DaemonizeError::UnknownGroupId { .. }
                | DaemonizeError::Lookup { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DaemonizeError>;
