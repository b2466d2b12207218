//! Bridge to the automated opponent.
//!
//! The engine runs outside the controller and is reached only through line
//! messages. One [`EngineBridge`] owns one session; the session itself runs as
//! a task that holds the channel, so the controller never shares state with it.

pub mod protocol;
pub mod random_engine;
mod session;
pub mod uci_process;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{
    FutureExt,
    channel::oneshot,
    future::{self, BoxFuture},
};
use log::{debug, info};
use tokio::sync::{mpsc, watch};

use crate::{difficulty::EngineParams, error::EngineError, game::ChessMove};

pub use random_engine::RandomEngineLauncher;
pub use uci_process::UciProcessLauncher;

/// Line channel to a running engine: commands in, replies out.
pub struct EngineChannel {
    pub commands: mpsc::Sender<String>,
    pub replies: mpsc::Receiver<String>,
}

/// Starts an engine and hands back its channel.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> Result<EngineChannel, EngineError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    /// Terminal. Carries the error the session was given up on.
    Failed(EngineError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub handshake_timeout: Duration,
    /// Allowed on top of the requested move time before a search is abandoned.
    pub search_grace: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            search_grace: Duration::from_secs(5),
        }
    }
}

/// Settles exactly once with the engine's move or the reason there is none.
pub type PendingMove = BoxFuture<'static, Result<ChessMove, EngineError>>;

pub struct EngineBridge {
    settings: EngineSettings,
    state: watch::Receiver<SessionState>,
    requests: mpsc::Sender<session::SearchRequest>,
    unstarted: Option<(watch::Sender<SessionState>, mpsc::Receiver<session::SearchRequest>)>,
}

impl EngineBridge {
    pub fn new(settings: EngineSettings) -> Self {
        let (state_tx, state) = watch::channel(SessionState::Uninitialized);
        let (requests, requests_rx) = mpsc::channel(8);
        Self {
            settings,
            state,
            requests,
            unstarted: Some((state_tx, requests_rx)),
        }
    }

    /// Launches the engine and performs the handshake in the background.
    /// Returns at once; watch [`EngineBridge::readiness`] for the outcome.
    pub fn initialize(&mut self, launcher: Arc<dyn EngineLauncher>) -> Result<(), EngineError> {
        let (state_tx, requests_rx) = self.unstarted.take().ok_or_else(|| {
            EngineError::Initialization("engine session was already started".to_string())
        })?;

        info!("starting engine session");
        state_tx.send_replace(SessionState::Initializing);
        tokio::spawn(session::run(launcher, self.settings, state_tx, requests_rx));
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.state.borrow() == SessionState::Ready
    }

    /// Resolves once, when the session first becomes ready or fails.
    pub fn readiness(&self) -> BoxFuture<'static, Result<(), EngineError>> {
        let mut state = self.state.clone();
        async move {
            let settled = state
                .wait_for(|s| matches!(s, SessionState::Ready | SessionState::Failed(_)))
                .await
                .map(|s| (*s).clone());
            match settled {
                Ok(SessionState::Ready) => Ok(()),
                Ok(SessionState::Failed(e)) => Err(e),
                Ok(_) | Err(_) => Err(EngineError::Initialization(
                    "engine session ended before it was ready".to_string(),
                )),
            }
        }
        .boxed()
    }

    /// Asks the engine for a move in `fen`. Returns immediately; the handle
    /// fails with [`EngineError::NotReady`] unless the session is ready and
    /// with [`EngineError::Busy`] while another search is outstanding.
    pub fn request_move(&self, fen: &str, params: EngineParams) -> PendingMove {
        if !self.is_ready() {
            return future::ready(Err(EngineError::NotReady)).boxed();
        }

        let (reply, settled) = oneshot::channel();
        let request = session::SearchRequest {
            fen: fen.to_string(),
            params,
            reply,
        };
        if let Err(e) = self.requests.try_send(request) {
            debug!("search request refused: {e}");
            let err = match e {
                mpsc::error::TrySendError::Full(_) => EngineError::Busy,
                mpsc::error::TrySendError::Closed(_) => EngineError::NotReady,
            };
            return future::ready(Err(err)).boxed();
        }

        async move {
            settled.await.unwrap_or_else(|_| {
                Err(EngineError::Transport(
                    "engine session dropped the request".to_string(),
                ))
            })
        }
        .boxed()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted engine for tests: the test side sees every command line and
    //! decides what the engine answers.

    use super::*;
    use std::sync::Mutex;

    pub struct ScriptedLauncher {
        channel: Mutex<Option<EngineChannel>>,
        failure: Option<EngineError>,
    }

    pub struct EngineSide {
        pub commands: mpsc::Receiver<String>,
        pub replies: mpsc::Sender<String>,
    }

    impl EngineSide {
        pub async fn expect(&mut self, expected: &str) {
            let line = self.commands.recv().await.expect("engine channel closed");
            assert_eq!(line, expected);
        }

        pub async fn reply(&self, line: &str) {
            self.replies.send(line.to_string()).await.unwrap();
        }

        /// Answers the uci/isready handshake.
        pub async fn handshake(&mut self) {
            self.expect("uci").await;
            self.reply("id name scripted").await;
            self.reply("uciok").await;
            self.expect("isready").await;
            self.reply("readyok").await;
        }
    }

    impl ScriptedLauncher {
        pub fn new() -> (Arc<Self>, EngineSide) {
            let (commands, commands_rx) = mpsc::channel(32);
            let (replies_tx, replies) = mpsc::channel(32);
            let launcher = Arc::new(Self {
                channel: Mutex::new(Some(EngineChannel { commands, replies })),
                failure: None,
            });
            (
                launcher,
                EngineSide {
                    commands: commands_rx,
                    replies: replies_tx,
                },
            )
        }

        pub fn failing(reason: &str) -> Arc<Self> {
            Arc::new(Self {
                channel: Mutex::new(None),
                failure: Some(EngineError::Initialization(reason.to_string())),
            })
        }
    }

    #[async_trait]
    impl EngineLauncher for ScriptedLauncher {
        async fn launch(&self) -> Result<EngineChannel, EngineError> {
            if let Some(e) = &self.failure {
                return Err(e.clone());
            }
            self.channel
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| EngineError::Initialization("already launched".to_string()))
        }
    }

    pub async fn ready_bridge(settings: EngineSettings) -> (EngineBridge, EngineSide) {
        let (launcher, mut side) = ScriptedLauncher::new();
        let mut bridge = EngineBridge::new(settings);
        bridge.initialize(launcher).unwrap();
        let ready = bridge.readiness();
        side.handshake().await;
        ready.await.unwrap();
        (bridge, side)
    }
}
