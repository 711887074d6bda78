//! The external tool whose start time is measured.

use std::ffi::OsString;
use std::fmt::Display;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

/// The path of the tool binary relative to the home directory.
pub const DEFAULT_RELATIVE_PATH: [&str; 3] = ["minikube", "out", "minikube"];

/// The driver the monitored profile is started with.
pub const DRIVER: &str = "docker";

/// The monitored profile.
pub const PROFILE: &str = "cloud-monitoring";

/// A single command line of the external tool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Invocation {
    /// The binary to execute.
    pub program: PathBuf,

    /// The arguments passed to the binary.
    pub args: Vec<OsString>,
}

impl Invocation {
    /// Creates a new invocation of the given program.
    pub fn new<P, I, A>(program: P, args: I) -> Self
    where
        P: Into<PathBuf>,
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The subcommand of this invocation, i.e. its first argument.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().and_then(|arg| arg.to_str())
    }
}

impl Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }

        Ok(())
    }
}

/// The external tool together with the profile it operates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tool {
    path: PathBuf,
    driver: String,
    profile: String,
}

impl Tool {
    /// Creates a new tool at the given path.
    pub fn new<P, D, N>(path: P, driver: D, profile: N) -> Self
    where
        P: Into<PathBuf>,
        D: Into<String>,
        N: Into<String>,
    {
        Self {
            path: path.into(),
            driver: driver.into(),
            profile: profile.into(),
        }
    }

    /// Locates the tool in the given home directory, or the current user's
    /// home directory if none is given.
    pub fn locate<D, N>(home: Option<&Path>, driver: D, profile: N) -> Result<Self, Error>
    where
        D: Into<String>,
        N: Into<String>,
    {
        let home = match home {
            Some(home) => home.to_path_buf(),
            None => dirs::home_dir().ok_or(Error::HomeNotFound)?,
        };

        Ok(Self::new(Self::default_path(&home), driver, profile))
    }

    /// Locates minikube for the monitored profile and driver, see
    /// [`Tool::locate`].
    pub fn minikube(home: Option<&Path>) -> Result<Self, Error> {
        Self::locate(home, DRIVER, PROFILE)
    }

    /// The default location of the tool binary in a home directory.
    pub fn default_path(home: &Path) -> PathBuf {
        DEFAULT_RELATIVE_PATH
            .iter()
            .fold(home.to_path_buf(), |path, segment| path.join(segment))
    }
}

impl Tool {
    /// The path to the tool binary.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The driver the profile is started with.
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// The name of the profile.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// The invocation which starts the profile, this is the one being timed.
    pub fn start(&self) -> Invocation {
        Invocation::new(
            &self.path,
            [
                "start".to_owned(),
                format!("--driver={}", self.driver),
                "-p".to_owned(),
                self.profile.clone(),
            ],
        )
    }

    /// The invocation which deletes the profile again.
    pub fn delete(&self) -> Invocation {
        Invocation::new(&self.path, ["delete", "-p", self.profile.as_str()])
    }
}

/// Returned by [`Tool::locate`].
#[derive(Debug, Error)]
pub enum Error {
    /// No home directory could be determined.
    #[error("couldn't determine the home directory")]
    HomeNotFound,
}
