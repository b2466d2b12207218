//! External UCI engine (e.g. Stockfish) run as a child process.

use std::{path::PathBuf, process::Stdio, time::Duration};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::Command,
    sync::mpsc,
    time::timeout,
};

use super::{EngineChannel, EngineLauncher};
use crate::error::EngineError;

pub struct UciProcessLauncher {
    path: PathBuf,
}

impl UciProcessLauncher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EngineLauncher for UciProcessLauncher {
    async fn launch(&self) -> Result<EngineChannel, EngineError> {
        let mut process = Command::new(&self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::Initialization(format!(
                    "failed to spawn {}: {e}",
                    self.path.display()
                ))
            })?;
        info!("spawned engine {} (pid {:?})", self.path.display(), process.id());

        let mut stdin = process
            .stdin
            .take()
            .ok_or_else(|| EngineError::Initialization("engine stdin unavailable".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| EngineError::Initialization("engine stdout unavailable".to_string()))?;

        let (commands, mut commands_rx) = mpsc::channel::<String>(32);
        let (replies_tx, replies) = mpsc::channel::<String>(256);

        // owns the child: when the session drops its sender the process is reaped or killed
        tokio::spawn(async move {
            while let Some(command) = commands_rx.recv().await {
                let written = async {
                    stdin.write_all(format!("{command}\n").as_bytes()).await?;
                    stdin.flush().await
                };
                if let Err(e) = written.await {
                    warn!("failed to write to engine: {e}");
                    break;
                }
            }
            drop(stdin);
            match timeout(Duration::from_secs(2), process.wait()).await {
                Ok(Ok(status)) => debug!("engine exited with {status}"),
                _ => debug!("killing engine process"),
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if replies_tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("failed to read from engine: {e}");
                        break;
                    }
                }
            }
        });

        Ok(EngineChannel { commands, replies })
    }
}
