//! The engine session: a task owning the engine channel.
//!
//! Requests arrive over an mpsc channel and are answered through a oneshot,
//! so each accepted request settles exactly once. At most one search is in
//! flight; the protocol has no way to tell two searches apart.

use std::{sync::Arc, time::Duration};

use futures::channel::oneshot;
use log::{debug, error, info, warn};
use tokio::{
    sync::{mpsc, watch},
    time::{Instant, sleep_until, timeout},
};

use super::{
    EngineChannel, EngineLauncher, EngineSettings, SessionState,
    protocol::{self, EngineCommand, EngineReply},
};
use crate::{difficulty::EngineParams, error::EngineError, game::ChessMove};

pub(crate) struct SearchRequest {
    pub fen: String,
    pub params: EngineParams,
    pub reply: oneshot::Sender<Result<ChessMove, EngineError>>,
}

struct ActiveSearch {
    reply: oneshot::Sender<Result<ChessMove, EngineError>>,
    deadline: Instant,
}

struct EngineSession {
    channel: EngineChannel,
    settings: EngineSettings,
    search: Option<ActiveSearch>,
}

pub(crate) async fn run(
    launcher: Arc<dyn EngineLauncher>,
    settings: EngineSettings,
    state: watch::Sender<SessionState>,
    mut requests: mpsc::Receiver<SearchRequest>,
) {
    let started = timeout(settings.handshake_timeout, start(launcher.as_ref())).await;
    let channel = match started {
        Ok(Ok(channel)) => channel,
        Ok(Err(e)) => return give_up(e, &state, requests).await,
        Err(_) => return give_up(EngineError::Timeout("handshake"), &state, requests).await,
    };

    info!("engine ready");
    state.send_replace(SessionState::Ready);

    let mut session = EngineSession {
        channel,
        settings,
        search: None,
    };
    match session.serve(&mut requests).await {
        Ok(()) => {
            debug!("bridge dropped, closing engine session");
            let _ = session.send(EngineCommand::Quit).await;
        }
        Err(e) => {
            if let Some(search) = session.search.take() {
                let _ = search.reply.send(Err(e.clone()));
            }
            give_up(e, &state, requests).await;
        }
    }
}

async fn start(launcher: &dyn EngineLauncher) -> Result<EngineChannel, EngineError> {
    let mut channel = launcher.launch().await?;
    handshake(&mut channel, EngineCommand::Uci, EngineReply::UciOk).await?;
    handshake(&mut channel, EngineCommand::IsReady, EngineReply::ReadyOk).await?;
    Ok(channel)
}

async fn handshake(
    channel: &mut EngineChannel,
    command: EngineCommand,
    expected: EngineReply,
) -> Result<(), EngineError> {
    let line = command.to_string();
    debug!("engine < {line}");
    channel
        .commands
        .send(line)
        .await
        .map_err(|_| EngineError::Initialization("engine input closed".to_string()))?;

    loop {
        let line = channel.replies.recv().await.ok_or_else(|| {
            EngineError::Initialization("engine exited during handshake".to_string())
        })?;
        debug!("engine > {line}");
        if protocol::parse_reply(&line).ok().as_ref() == Some(&expected) {
            return Ok(());
        }
    }
}

/// Marks the session failed and keeps refusing requests until the bridge goes away.
async fn give_up(
    e: EngineError,
    state: &watch::Sender<SessionState>,
    mut requests: mpsc::Receiver<SearchRequest>,
) {
    error!("engine session failed: {e}");
    state.send_replace(SessionState::Failed(e));
    while let Some(request) = requests.recv().await {
        let _ = request.reply.send(Err(EngineError::NotReady));
    }
}

impl EngineSession {
    /// Runs until the bridge is dropped (`Ok`) or the session breaks (`Err`).
    async fn serve(&mut self, requests: &mut mpsc::Receiver<SearchRequest>) -> Result<(), EngineError> {
        loop {
            let deadline = self.search.as_ref().map(|s| s.deadline);
            let watchdog = sleep_until(deadline.unwrap_or_else(Instant::now));

            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.accept(request).await?,
                    None => return Ok(()),
                },
                line = self.channel.replies.recv() => match line {
                    Some(line) => self.on_line(&line)?,
                    None => return Err(EngineError::Transport("engine closed its output".to_string())),
                },
                _ = watchdog, if deadline.is_some() => {
                    warn!("engine did not answer within the search window");
                    return Err(EngineError::Timeout("search"));
                }
            }
        }
    }

    async fn accept(&mut self, request: SearchRequest) -> Result<(), EngineError> {
        if self.search.is_some() {
            let _ = request.reply.send(Err(EngineError::Busy));
            return Ok(());
        }

        for command in protocol::search_commands(&request.fen, request.params) {
            if let Err(e) = self.send(command).await {
                let _ = request.reply.send(Err(e.clone()));
                return Err(e);
            }
        }

        let window = Duration::from_millis(request.params.move_time_ms) + self.settings.search_grace;
        self.search = Some(ActiveSearch {
            reply: request.reply,
            deadline: Instant::now() + window,
        });
        Ok(())
    }

    fn on_line(&mut self, line: &str) -> Result<(), EngineError> {
        debug!("engine > {line}");
        match protocol::parse_reply(line) {
            Ok(EngineReply::BestMove(mv)) => match self.search.take() {
                Some(search) => {
                    info!("engine chose {mv}");
                    let _ = search.reply.send(Ok(mv));
                }
                None => warn!("ignoring unsolicited {line:?}"),
            },
            Ok(EngineReply::Info(info)) => {
                if let (Some(depth), Some(cp)) = (info.depth, info.cp) {
                    debug!("engine thinking: depth {depth}, score {cp}cp, pv {}", info.pv.join(" "));
                }
            }
            Ok(_) => {}
            Err(e) => match self.search.take() {
                Some(search) => {
                    let _ = search.reply.send(Err(e.clone()));
                    return Err(e);
                }
                None => warn!("ignoring malformed {line:?}: {e}"),
            },
        }
        Ok(())
    }

    async fn send(&mut self, command: EngineCommand) -> Result<(), EngineError> {
        let line = command.to_string();
        debug!("engine < {line}");
        self.channel
            .commands
            .send(line)
            .await
            .map_err(|_| EngineError::Transport("engine closed its input".to_string()))
    }
}
