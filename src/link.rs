//! Linking object files into executables
//!
//! Native linking is delegated to the system C compiler driver, which knows
//! where the C runtime and `printf` live on the host.

use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// Driver used when `$CC` is unset
pub const DEFAULT_CC: &str = "cc";

/// Linker errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("failed to run linker `{driver}`: {message}")]
    Spawn { driver: String, message: String },

    #[error("linker `{driver}` failed with {status}")]
    Failed { driver: String, status: String },
}

/// Invokes a C compiler driver to produce executables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linker {
    driver: OsString,
}

impl Linker {
    pub fn new(driver: impl Into<OsString>) -> Self {
        Self { driver: driver.into() }
    }

    /// Use `$CC`, falling back to [`DEFAULT_CC`]
    pub fn from_env() -> Self {
        match std::env::var_os("CC") {
            Some(cc) if !cc.is_empty() => Self::new(cc),
            _ => Self::new(DEFAULT_CC),
        }
    }

    pub fn driver(&self) -> &std::ffi::OsStr {
        &self.driver
    }

    /// Command line that would link `object` into `output`
    pub fn command(&self, object: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.driver);
        cmd.arg(object).arg("-o").arg(output);
        cmd
    }

    /// Link `object` into the executable `output`
    pub fn link(&self, object: &Path, output: &Path) -> Result<(), LinkError> {
        let driver = self.driver.to_string_lossy().into_owned();
        debug!(%driver, object = %object.display(), output = %output.display(), "linking");

        let status = self
            .command(object, output)
            .status()
            .map_err(|e| LinkError::Spawn {
                driver: driver.clone(),
                message: e.to_string(),
            })?;

        if !status.success() {
            return Err(LinkError::Failed {
                driver,
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for Linker {
    fn default() -> Self {
        Self::new(DEFAULT_CC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let linker = Linker::new("clang");
        let cmd = linker.command(Path::new("prog.o"), Path::new("prog"));
        assert_eq!(cmd.get_program(), "clang");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["prog.o", "-o", "prog"]);
    }

    #[test]
    fn test_missing_driver_reports_spawn_error() {
        let linker = Linker::new("rpnc-no-such-linker");
        let err = linker.link(Path::new("prog.o"), Path::new("prog")).unwrap_err();
        assert!(matches!(err, LinkError::Spawn { ref driver, .. } if driver == "rpnc-no-such-linker"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_driver_reports_status() {
        let err = Linker::new("false").link(Path::new("prog.o"), Path::new("prog")).unwrap_err();
        assert!(matches!(err, LinkError::Failed { .. }));
    }

    #[test]
    fn test_default_driver() {
        assert_eq!(Linker::default().driver(), DEFAULT_CC);
    }
}
