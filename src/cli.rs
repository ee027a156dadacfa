use crate::config::types::{TransitionRequest, EXIT_USAGE, PROGNAME};
use crate::exec::controller;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "daemonize",
    version,
    about = "Drop privileges, write a PID file, detach and exec a program",
    override_usage = "daemonize [-F|-B] [-u user] [-g group] [-p pidfile] [-d directory] [-E] [-S] program [args...]"
)]
struct Cli {
    /// Run in foreground
    #[arg(short = 'F', overrides_with = "background")]
    foreground: bool,
    /// Run in background (default)
    #[arg(short = 'B', overrides_with = "foreground")]
    background: bool,
    /// Drop to this user's privileges
    #[arg(short = 'u', value_name = "USER")]
    user: Option<String>,
    /// Drop to this group's privileges (overrides the user's primary group)
    #[arg(short = 'g', value_name = "GROUP")]
    group: Option<String>,
    /// Write the final process id to this file
    #[arg(short = 'p', value_name = "FILE")]
    pidfile: Option<PathBuf>,
    /// Change to this directory before anything else
    #[arg(short = 'd', value_name = "DIR")]
    directory: Option<PathBuf>,
    /// Keep the caller's environment instead of passing only HOME
    #[arg(short = 'E')]
    keep_environment: bool,
    /// Fail if setgroups, setgid or setuid fail
    #[arg(short = 'S')]
    strict: bool,
    /// Program to execute, followed by its arguments
    #[arg(
        value_name = "PROGRAM",
        required = true,
        num_args = 1..,
        trailing_var_arg = true
    )]
    command: Vec<OsString>,
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub request: TransitionRequest,
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl From<Cli> for Invocation {
    fn from(cli: Cli) -> Self {
        let mut command = cli.command.into_iter();
        let program = command.next().map(PathBuf::from).unwrap_or_default();

        Invocation {
            request: TransitionRequest {
                daemonize: !cli.foreground,
                username: cli.user,
                groupname: cli.group,
                pidfile: cli.pidfile,
                working_directory: cli.directory,
                scrub_environment: !cli.keep_environment,
                strict: cli.strict,
            },
            program,
            args: command.collect(),
        }
    }
}

/// Parse an argv (including argv[0]) into an [`Invocation`].
pub fn parse_args<I, T>(args: I) -> Result<Invocation, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let invocation = Cli::try_parse_from(args).map(Invocation::from)?;
    // Only reachable after `--`; a leading dash is never a program path we accept
    if invocation.program.as_os_str().as_bytes().first() == Some(&b'-') {
        return Err(Cli::command().error(
            ErrorKind::InvalidValue,
            format!(
                "program must not start with '-': {}",
                invocation.program.display()
            ),
        ));
    }
    Ok(invocation)
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_target(false)
        .init();
}

/// Entry point of the `daemonize` binary. Never returns: either the process
/// image is replaced or the process exits with 1 (usage) or 2 (failure).
pub fn run() -> ! {
    init_logging();

    let invocation = match parse_args(std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(e) => {
            // --help and --version go to stdout and succeed
            let code = if e.use_stderr() { EXIT_USAGE } else { 0 };
            if let Err(print_err) = e.print() {
                log::debug!("Failed to print usage: {}", print_err);
            }
            std::process::exit(code);
        }
    };

    if invocation.request.username.is_some() && !nix::unistd::geteuid().is_root() {
        log::warn!("Not running as root; switching user will likely fail");
    }

    let err = match controller::daemonize(
        &invocation.request,
        &invocation.program,
        &invocation.args,
    ) {
        Ok(never) => match never {},
        Err(e) => e,
    };

    eprintln!("{}: {}", PROGNAME, err);
    std::process::exit(err.exit_code());
}
