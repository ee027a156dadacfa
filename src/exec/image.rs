//! Argument vector and environment of the program that replaces us.

use crate::config::types::{DaemonizeError, Result};
use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessImageSpec {
    pub program: PathBuf,
    /// `argv[0]` is the program path, followed by the caller's arguments.
    pub argv: Vec<OsString>,
    /// `None` inherits the current environment.
    pub env: Option<Vec<OsString>>,
}

/// NUL-terminated form handed to execve/execv.
///
/// Only [`ProcessImageSpec::into_native`] builds one, so holding a
/// `NativeImage` means every string already passed the NUL check.
#[derive(Debug)]
pub struct NativeImage {
    spec: ProcessImageSpec,
    program: CString,
    argv: Vec<CString>,
    env: Option<Vec<CString>>,
}

impl NativeImage {
    pub fn spec(&self) -> &ProcessImageSpec {
        &self.spec
    }

    pub fn program(&self) -> &CString {
        &self.program
    }

    pub fn argv(&self) -> &[CString] {
        &self.argv
    }

    pub fn env(&self) -> Option<&[CString]> {
        self.env.as_deref()
    }
}

impl ProcessImageSpec {
    pub fn new(program: PathBuf, args: &[OsString], env: Option<Vec<OsString>>) -> Self {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(program.clone().into_os_string());
        argv.extend(args.iter().cloned());
        Self { program, argv, env }
    }

    pub fn into_native(self) -> Result<NativeImage> {
        let program = to_cstring(self.program.as_os_str(), "program path")?;
        let argv = self
            .argv
            .iter()
            .map(|arg| to_cstring(arg, "argument"))
            .collect::<Result<Vec<_>>>()?;
        let env = match &self.env {
            Some(entries) => Some(
                entries
                    .iter()
                    .map(|entry| to_cstring(entry, "environment entry"))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };
        Ok(NativeImage {
            spec: self,
            program,
            argv,
            env,
        })
    }
}

fn to_cstring(value: &OsStr, what: &str) -> Result<CString> {
    CString::new(value.as_bytes()).map_err(|_| {
        DaemonizeError::Config(format!(
            "{} contains NUL byte: {}",
            what,
            value.to_string_lossy()
        ))
    })
}

/// The scrubbed environment: exactly `HOME=<dir>`, or nothing at all.
pub fn minimal_environment(home: Option<&Path>) -> Vec<OsString> {
    match home {
        Some(dir) if !dir.as_os_str().is_empty() => {
            let mut entry = b"HOME=".to_vec();
            entry.extend_from_slice(dir.as_os_str().as_bytes());
            vec![OsString::from_vec(entry)]
        }
        _ => Vec::new(),
    }
}
