use async_trait::async_trait;
use log::{debug, warn};
use rand::{Rng, rng};
use shakmaty::{CastlingMode, Chess, Position};
use tokio::sync::mpsc;

use super::{EngineChannel, EngineLauncher, protocol::EngineCommand};
use crate::{error::EngineError, game};

/// An engine task that speaks the protocol and plays a random legal move.
/// Needs no external binary.
pub struct RandomEngineLauncher;

#[async_trait]
impl EngineLauncher for RandomEngineLauncher {
    async fn launch(&self) -> Result<EngineChannel, EngineError> {
        let (commands, commands_rx) = mpsc::channel(32);
        let (replies_tx, replies) = mpsc::channel(32);
        tokio::spawn(RandomEngine::new().run(commands_rx, replies_tx));
        Ok(EngineChannel { commands, replies })
    }
}

struct RandomEngine {
    game: Chess,
}

impl RandomEngine {
    fn new() -> RandomEngine {
        RandomEngine {
            game: Chess::default(),
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<String>, replies: mpsc::Sender<String>) {
        while let Some(line) = commands.recv().await {
            let command = match line.parse::<EngineCommand>() {
                Ok(command) => command,
                Err(e) => {
                    debug!("random engine ignoring {e}");
                    continue;
                }
            };

            let answer = match command {
                EngineCommand::Uci => vec!["id name rusty-random".to_string(), "uciok".to_string()],
                EngineCommand::IsReady => vec!["readyok".to_string()],
                EngineCommand::SetOption { .. } => Vec::new(),
                EngineCommand::Position { fen } => {
                    match game::parse_fen(&fen) {
                        Ok(position) => self.game = position,
                        Err(e) => warn!("random engine got {e}"),
                    }
                    Vec::new()
                }
                EngineCommand::Go { .. } => vec![format!("bestmove {}", self.search())],
                EngineCommand::Quit => break,
            };

            for reply in answer {
                if replies.send(reply).await.is_err() {
                    return;
                }
            }
        }
    }

    fn search(&self) -> String {
        let legals = self.game.legal_moves();
        if legals.is_empty() {
            return "(none)".to_string();
        }
        let pick = rng().random_range(0..legals.len());

        legals[pick].to_uci(CastlingMode::Standard).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        difficulty::{DifficultyLevel, resolve},
        engine::{EngineBridge, EngineSettings},
        game::GameState,
    };

    #[tokio::test]
    async fn test_plays_legal_moves_through_bridge() {
        let mut bridge = EngineBridge::new(EngineSettings::default());
        bridge
            .initialize(std::sync::Arc::new(RandomEngineLauncher))
            .unwrap();
        bridge.readiness().await.unwrap();

        let mut game = GameState::new();
        for _ in 0..10 {
            if game.status().is_game_over {
                break;
            }
            let mv = bridge
                .request_move(&game.serialize(), resolve(DifficultyLevel::Easy))
                .await
                .unwrap();
            game.apply_move(mv).unwrap();
        }
        assert!(game.history_len() >= 4);
    }

    #[test]
    fn test_no_move_when_stalemated() {
        let mut engine = RandomEngine::new();
        engine.game = game::parse_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(engine.search(), "(none)");
    }
}
