use super::CoordinatorError;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// What the coordinator asks a launcher to run
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub agent: String,
    /// The agent writes its `AgentReport` JSON here
    pub result_file: PathBuf,
    pub dry_run: bool,
    pub force: bool,
}

/// How a launched agent ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub success: bool,
    /// `None` if the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl LaunchOutcome {
    pub fn from_code(code: i32) -> Self {
        Self {
            success: code == 0,
            exit_code: Some(code),
        }
    }
}

/// Starts one agent and waits for it to finish
pub trait AgentLauncher: Sync {
    fn launch(&self, request: &LaunchRequest) -> Result<LaunchOutcome, CoordinatorError>;
}

/// Runs each agent as a child process of the given executable
pub struct ProcessLauncher {
    program: PathBuf,
    root: PathBuf,
    config: Option<PathBuf>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, root: &Path, config: Option<&Path>) -> Self {
        Self {
            program: program.into(),
            root: root.to_path_buf(),
            config: config.map(Path::to_path_buf),
        }
    }

    /// Launch agents with the currently running binary
    pub fn current_exe(root: &Path, config: Option<&Path>) -> Result<Self, CoordinatorError> {
        let program = std::env::current_exe().map_err(|source| CoordinatorError::Launch {
            agent: "*".to_string(),
            source,
        })?;
        Ok(Self::new(program, root, config))
    }

    pub fn command(&self, request: &LaunchRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--quiet").arg("--root").arg(&self.root);
        if let Some(config) = &self.config {
            cmd.arg("--config").arg(config);
        }
        cmd.arg("agent")
            .arg(&request.agent)
            .arg("--result-file")
            .arg(&request.result_file);
        if request.dry_run {
            cmd.arg("--dry-run");
        }
        if request.force {
            cmd.arg("--force");
        }
        cmd
    }
}

impl AgentLauncher for ProcessLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<LaunchOutcome, CoordinatorError> {
        let mut cmd = self.command(request);
        debug!("Launching {:?}", cmd);

        let status = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| CoordinatorError::Launch {
                agent: request.agent.clone(),
                source,
            })?;

        Ok(LaunchOutcome {
            success: status.success(),
            exit_code: status.code(),
        })
    }
}
