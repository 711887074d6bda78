#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;

use assert_cmd::Command;
#[expect(
    deprecated,
    reason = "cargo_bin is deprecated, cargo_bin! is not, see https://github.com/rust-lang/rust/issues/148426"
)]
use assert_cmd::cargo::cargo_bin;
use temp_dir::TempDir;

/// The timed invocation as the fake tool logs it.
pub const START: &str = "start --driver=docker -p cloud-monitoring";

/// The cleanup invocation as the fake tool logs it.
pub const DELETE: &str = "delete -p cloud-monitoring";

/// Stands in for minikube: appends its arguments to `$HOME/calls.log` and
/// exits with `FAKE_START_EXIT` or `FAKE_DELETE_EXIT`.
const FAKE_MINIKUBE: &str = r#"#!/bin/sh
echo "$@" >> "$HOME/calls.log"
case "$1" in
    start) exit "${FAKE_START_EXIT:-0}" ;;
    delete) exit "${FAKE_DELETE_EXIT:-0}" ;;
esac
"#;

/// A temporary home directory startwatch runs in.
#[derive(Debug)]
pub struct Home {
    dir: TempDir,
}

impl Home {
    /// A home directory without minikube.
    pub fn empty() -> Self {
        Self {
            dir: TempDir::with_prefix("startwatch-").unwrap(),
        }
    }

    /// A home directory with a fake minikube where startwatch looks for it.
    pub fn with_minikube() -> Self {
        let home = Self::empty();
        let path = home.minikube();

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, FAKE_MINIKUBE).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        home
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where startwatch expects minikube.
    pub fn minikube(&self) -> PathBuf {
        self.path().join("minikube").join("out").join("minikube")
    }

    /// Writes a file relative to the home directory.
    pub fn write(&self, path: impl AsRef<Path>, content: &str) {
        let path = self.path().join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// The arguments of each invocation of the fake minikube, in order.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.path().join("calls.log"))
            .map(|log| log.lines().map(ToOwned::to_owned).collect())
            .unwrap_or_default()
    }

    /// A startwatch command which sees only this home directory.
    pub fn startwatch(&self) -> Command {
        let mut cmd = Command::new(cargo_bin!("startwatch"));
        cmd.current_dir(self.path())
            .env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default())
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join(".config"))
            .arg("--color=never");
        cmd
    }
}
