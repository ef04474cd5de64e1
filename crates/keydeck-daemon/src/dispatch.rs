//! Key press to command dispatch.
//!
//! Commands are fire-and-forget: a press launches `sh -c <command>` and
//! returns immediately. Nothing waits for the child on the key callback
//! thread; a detached reaper collects it so no zombies pile up, and an
//! optional exit hook may observe the status. Launch failures are silent
//! unless an error hook is installed.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use tracing::debug;

use crate::config::Config;

/// Shell used to interpret commands.
const DEFAULT_SHELL: &str = "/bin/sh";

/// Called with the command and the error when a launch fails.
pub type LaunchErrorHook = Arc<dyn Fn(&str, &io::Error) + Send + Sync>;

/// Called with the command and its exit status once a child finishes.
pub type ExitHook = Arc<dyn Fn(&str, ExitStatus) + Send + Sync>;

/// Starts a command without waiting for it.
pub trait Launcher: Send + Sync {
    fn launch(&self, command: &str) -> io::Result<()>;
}

/// Launches commands through the system shell.
#[derive(Clone)]
pub struct ShellLauncher {
    shell: PathBuf,
    on_exit: Option<ExitHook>,
}

impl ShellLauncher {
    pub fn new() -> Self {
        Self::with_shell(DEFAULT_SHELL)
    }

    /// Uses a specific shell binary, invoked as `<shell> -c <command>`.
    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
            on_exit: None,
        }
    }

    /// Installs a hook observing each child's exit status.
    pub fn with_exit_hook(mut self, hook: ExitHook) -> Self {
        self.on_exit = Some(hook);
        self
    }
}

impl Default for ShellLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl Launcher for ShellLauncher {
    fn launch(&self, command: &str) -> io::Result<()> {
        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .spawn()?;
        debug!("Launched {:?} (pid {})", command, child.id());

        let command = command.to_string();
        let on_exit = self.on_exit.clone();
        thread::spawn(move || match child.wait() {
            Ok(status) => {
                if let Some(hook) = on_exit {
                    hook(&command, status);
                }
            }
            Err(e) => debug!("Failed to reap {:?}: {}", command, e),
        });
        Ok(())
    }
}

/// Maps key presses to configured commands.
#[derive(Clone)]
pub struct CommandDispatcher {
    commands: Arc<HashMap<u8, String>>,
    launcher: Arc<dyn Launcher>,
    on_error: Option<LaunchErrorHook>,
}

impl CommandDispatcher {
    /// Builds a dispatcher for every key with a `command`.
    pub fn new(config: &Config, launcher: Arc<dyn Launcher>) -> Self {
        let commands = config
            .keys()
            .filter_map(|key| key.command.clone().map(|cmd| (key.index, cmd)))
            .collect();
        Self {
            commands: Arc::new(commands),
            launcher,
            on_error: None,
        }
    }

    /// Installs a hook observing launch failures.
    pub fn with_error_hook(mut self, hook: LaunchErrorHook) -> Self {
        self.on_error = Some(hook);
        self
    }

    /// Returns the command bound to a key.
    pub fn command(&self, key: u8) -> Option<&str> {
        self.commands.get(&key).map(String::as_str)
    }

    /// Handles one key transition. Releases and unbound keys are ignored.
    pub fn on_key_event(&self, key: u8, pressed: bool) {
        if !pressed {
            return;
        }
        let Some(command) = self.command(key) else {
            debug!("Key {} has no command", key);
            return;
        };

        if let Err(e) = self.launcher.launch(command) {
            match &self.on_error {
                Some(hook) => hook(command, &e),
                None => debug!("Failed to launch {:?}: {}", command, e),
            }
        }
    }
}
