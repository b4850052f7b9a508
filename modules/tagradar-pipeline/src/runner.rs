use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::StageFailure;

/// One external pipeline step.
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub path: PathBuf,
}

impl Stage {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Launches stages as child processes rooted at a fixed working directory.
///
/// Output is logged line by line as it arrives and accumulated in full.
/// The runner never interprets what a stage prints.
#[derive(Debug, Clone)]
pub struct StageRunner {
    workdir: PathBuf,
    interpreter: Option<String>,
    timeout: Duration,
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl StageRunner {
    pub fn new(
        workdir: impl Into<PathBuf>,
        interpreter: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            workdir: workdir.into(),
            interpreter,
            timeout,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run `stage` with `args` passed verbatim, in order. Returns stdout on exit code 0.
    pub async fn run(&self, stage: &Stage, args: &[String]) -> Result<String, StageFailure> {
        self.run_with_env(stage, args, &[]).await
    }

    pub async fn run_with_env(
        &self,
        stage: &Stage,
        args: &[String],
        envs: &[(&str, OsString)],
    ) -> Result<String, StageFailure> {
        let mut cmd = match &self.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&stage.path);
                cmd
            }
            None => Command::new(&stage.path),
        };
        cmd.args(args)
            .envs(envs.iter().map(|(k, v)| (*k, v)))
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(
            stage = %stage.name,
            path = %stage.path.display(),
            args = ?args,
            "Executing stage"
        );

        let mut child = cmd.spawn().map_err(|source| StageFailure::Spawn {
            stage: stage.name.clone(),
            source,
        })?;

        let stdout = drain(child.stdout.take(), &stage.name, Stream::Stdout);
        let stderr = drain(child.stderr.take(), &stage.name, Stream::Stderr);

        // One deadline covers the exit and both streams reaching EOF. A
        // background process that inherited the pipes keeps them open after
        // the stage itself has exited.
        let finished = timeout(self.timeout, async {
            let (status, stdout, stderr) = tokio::join!(child.wait(), stdout, stderr);
            status.map(|status| (status, stdout, stderr))
        })
        .await;

        let (status, stdout, stderr) = match finished {
            Ok(Ok(done)) => done,
            Ok(Err(source)) => {
                return Err(StageFailure::Spawn {
                    stage: stage.name.clone(),
                    source,
                });
            }
            Err(_) => {
                if !matches!(child.try_wait(), Ok(Some(_))) {
                    if let Err(e) = child.kill().await {
                        warn!(stage = %stage.name, error = %e, "Failed to kill timed out stage");
                    }
                }
                warn!(
                    stage = %stage.name,
                    timeout_secs = self.timeout.as_secs(),
                    "Stage timed out"
                );
                return Err(StageFailure::TimedOut {
                    stage: stage.name.clone(),
                    after: self.timeout,
                });
            }
        };

        if status.success() {
            info!(stage = %stage.name, "Finished executing stage");
            Ok(stdout)
        } else {
            warn!(stage = %stage.name, exit_code = ?status.code(), "Stage exited with failure");
            Err(StageFailure::Exit {
                stage: stage.name.clone(),
                exit_code: status.code(),
                stderr,
            })
        }
    }
}

/// Read a child stream to the end, logging each line as it arrives.
async fn drain<R: AsyncRead + Unpin>(reader: Option<R>, stage: &str, stream: Stream) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    let mut reader = BufReader::new(reader);
    let mut collected = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let chunk = String::from_utf8_lossy(&buf);
                let line = chunk.trim_end_matches(['\r', '\n']);
                match stream {
                    Stream::Stdout => info!(stage = %stage, "{line}"),
                    Stream::Stderr => warn!(stage = %stage, "{line}"),
                }
                collected.push_str(&chunk);
            }
            Err(e) => {
                warn!(stage = %stage, error = %e, "Stopped reading stage output");
                break;
            }
        }
    }

    collected
}
