//! Command handler: runs a local executable per intent.
//!
//! The intent is written to the child's stdin as one JSON line. A zero exit
//! with JSON on stdout is the handler's response. The child runs in the
//! action directory with a copy of the service environment. No timeout is
//! enforced.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::actions::environment::ActionEnvironment;
use crate::actions::handler::{
    HandlerResponse, HandlerState, IntentHandler, load_definition,
};
use crate::error::ActionError;
use crate::messages::NluIntent;

/// Maximum stderr bytes echoed into the debug log.
const MAX_STDERR_LOG: usize = 4 * 1024;

#[derive(Debug, Deserialize)]
struct CommandDefinition {
    command: Option<String>,
    /// Reserved; not applied to the command line yet.
    #[serde(default)]
    parameters: Option<serde_json::Value>,
}

/// A resolved executable, ready to run.
#[derive(Debug, Clone)]
struct ResolvedCommand {
    program: PathBuf,
}

/// Resolve a command from `def.json`.
///
/// A leading `.` stands for the action directory, so `./run.sh` and
/// `.run.sh` both become `<dir>/run.sh`. Anything else is used verbatim.
pub fn expand_command(self_directory: &Path, command: &str) -> Option<PathBuf> {
    let command = command.trim();
    if command.is_empty() {
        return None;
    }
    match command.strip_prefix('.') {
        Some(rest) => {
            let rest = rest.trim_start_matches(['/', '\\']);
            if rest.is_empty() {
                return None;
            }
            Some(self_directory.join(rest))
        }
        None => Some(PathBuf::from(command)),
    }
}

/// Runs a local command for each intent.
#[derive(Debug)]
pub struct CommandHandler {
    environment: ActionEnvironment,
    state: HandlerState<ResolvedCommand>,
}

impl CommandHandler {
    pub fn new(environment: ActionEnvironment) -> Self {
        Self {
            environment,
            state: HandlerState::Uninitialized,
        }
    }

    /// The resolved executable, once ready.
    pub fn program(&self) -> Option<&Path> {
        match &self.state {
            HandlerState::Ready(cmd) => Some(&cmd.program),
            _ => None,
        }
    }

    fn load(&self) -> Result<ResolvedCommand, ActionError> {
        let definition: CommandDefinition = load_definition(&self.environment)?;
        if definition.parameters.is_some() {
            tracing::debug!(
                action = %self.environment.action_name(),
                "Command parameters are ignored"
            );
        }
        let program = definition
            .command
            .as_deref()
            .and_then(|cmd| expand_command(self.environment.self_directory(), cmd))
            .ok_or_else(|| ActionError::MissingCommand {
                action: self.environment.action_name().to_string(),
            })?;
        Ok(ResolvedCommand { program })
    }

    async fn run(
        &self,
        cmd: &ResolvedCommand,
        payload: &[u8],
    ) -> Result<std::process::Output, ActionError> {
        let program = cmd.program.display().to_string();
        tracing::debug!(action = %self.environment.action_name(), command = %program, "Running command");

        let mut child = Command::new(&cmd.program)
            .current_dir(self.environment.self_directory())
            .envs(std::env::vars_os())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ActionError::Spawn {
                command: program.clone(),
                reason: e.to_string(),
            })?;

        // Feed stdin while draining stdout/stderr; the child may write
        // before it reads.
        let stdin = child.stdin.take();
        let feed = async {
            if let Some(mut stdin) = stdin {
                // A child that exits without reading stdin closes the pipe early.
                if let Err(e) = stdin.write_all(payload).await {
                    tracing::debug!(command = %program, "stdin write failed: {}", e);
                }
            }
        };
        let ((), output) = tokio::join!(feed, child.wait_with_output());

        output.map_err(|e| ActionError::Spawn {
            command: program,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl IntentHandler for CommandHandler {
    fn kind(&self) -> &'static str {
        "command"
    }

    fn environment(&self) -> &ActionEnvironment {
        &self.environment
    }

    fn initialize(&mut self) -> Result<(), ActionError> {
        match self.load() {
            Ok(cmd) => {
                self.state = HandlerState::Ready(cmd);
                Ok(())
            }
            Err(e) => {
                self.state = HandlerState::Disabled(e.to_string());
                Err(e)
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    async fn handle(&self, intent: &NluIntent) -> Result<Option<HandlerResponse>, ActionError> {
        let cmd = self.state.ready(self.environment.action_name())?;

        let mut payload = serde_json::to_vec(&intent.to_rhasspy_json())?;
        payload.push(b'\n');

        let output = self.run(cmd, &payload).await?;

        if !output.stderr.is_empty() {
            let end = output.stderr.len().min(MAX_STDERR_LOG);
            tracing::debug!(
                action = %self.environment.action_name(),
                "stderr: {}",
                String::from_utf8_lossy(&output.stderr[..end])
            );
        }

        if !output.status.success() {
            return Err(ActionError::ProcessFailed {
                command: cmd.program.display().to_string(),
                code: output.status.code(),
            });
        }

        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let value: serde_json::Value =
            serde_json::from_slice(&output.stdout).map_err(|e| ActionError::InvalidOutput {
                action: self.environment.action_name().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Some(HandlerResponse::new(value)))
    }
}
