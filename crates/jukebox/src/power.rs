//! Platform power-off.

use std::process::Command;

pub trait PowerControl: Send {
    fn request_shutdown(&mut self);
}

/// Runs a configured command (e.g. `systemctl poweroff`). With no command configured the
/// request is only logged.
#[derive(Debug, Clone, Default)]
pub struct CommandPowerControl {
    command: Vec<String>,
}

impl CommandPowerControl {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl PowerControl for CommandPowerControl {
    fn request_shutdown(&mut self) {
        let Some((program, args)) = self.command.split_first() else {
            tracing::warn!("power-down requested but no poweroff command is configured");
            return;
        };
        tracing::info!(command = %self.command.join(" "), "powering down");
        match Command::new(program).args(args).status() {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::warn!(%status, "poweroff command failed"),
            Err(e) => tracing::warn!(error = %e, program = %program, "poweroff command not run"),
        }
    }
}
