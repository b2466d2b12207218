//! Turn orchestration.
//!
//! The controller decides whose turn it is, locks the board while the engine
//! thinks or a promotion piece is being chosen, and feeds engine replies back
//! into the game. Everything reaches it as a [`GameEvent`] on one channel:
//! board input from the front-end and settled engine requests alike, so all
//! game state is mutated from a single logical thread.

use futures::channel::mpsc::UnboundedSender;
use log::{debug, error, info, warn};
use shakmaty::{Color, Position, Square};

use crate::{
    difficulty::{self, DifficultyLevel},
    engine::EngineBridge,
    error::{EngineError, IllegalMoveError, InvalidPositionError, TurnError},
    game::{ChessMove, GameState, GameStatus},
    promotion::{self, PromotionChoice, PromotionFlow},
    render::{BoardRenderer, RenderState},
    util,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOverReason {
    Checkmate { winner: Color },
    Stalemate,
    Draw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    PlayerToMove,
    AutomatedThinking,
    AwaitingPromotionChoice,
    GameOver(GameOverReason),
}

#[derive(Debug)]
pub enum GameEvent {
    UserMove { from: Square, to: Square },
    PromotionChosen(PromotionChoice),
    PromotionCancelled,
    NewGame { human: Color },
    Undo,
    SetDifficulty(DifficultyLevel),
    LoadPosition(String),
    FlipBoard,
    /// The engine session finished initializing, one way or the other.
    EngineStatus(Result<(), EngineError>),
    /// A search settled. `fen` is the position it was issued against.
    EngineReply {
        ticket: u64,
        fen: String,
        result: Result<ChessMove, EngineError>,
    },
}

/// Messages for the player that are not part of the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    EngineUnavailable(String),
    EngineError(String),
    IllegalMove(String),
    InvalidPosition(String),
    DifficultyChanged(DifficultyLevel),
}

struct InFlightSearch {
    ticket: u64,
}

pub struct TurnController {
    game: GameState,
    promotion: PromotionFlow,
    bridge: EngineBridge,
    renderer: Box<dyn BoardRenderer>,
    events: UnboundedSender<GameEvent>,
    state: TurnState,
    human: Color,
    orientation: Color,
    automated_enabled: bool,
    difficulty: DifficultyLevel,
    in_flight: Option<InFlightSearch>,
    next_ticket: u64,
    notices: Vec<Notice>,
}

impl TurnController {
    /// `events` is where settled engine requests are posted; the front-end
    /// feeds that channel back into [`TurnController::handle`].
    pub fn new(
        bridge: EngineBridge,
        renderer: Box<dyn BoardRenderer>,
        events: UnboundedSender<GameEvent>,
        difficulty: DifficultyLevel,
    ) -> Self {
        Self {
            game: GameState::new(),
            promotion: PromotionFlow::new(),
            bridge,
            renderer,
            events,
            state: TurnState::PlayerToMove,
            human: Color::White,
            orientation: Color::White,
            automated_enabled: false,
            difficulty,
            in_flight: None,
            next_ticket: 0,
            notices: Vec::new(),
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// The board accepts input exactly when a player is to move.
    pub fn is_interactive(&self) -> bool {
        self.state == TurnState::PlayerToMove
    }

    pub fn automated_enabled(&self) -> bool {
        self.automated_enabled
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn engine(&self) -> &EngineBridge {
        &self.bridge
    }

    pub fn difficulty(&self) -> DifficultyLevel {
        self.difficulty
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn handle(&mut self, event: GameEvent) -> Result<(), TurnError> {
        debug!("event {event:?} in {:?}", self.state);
        match event {
            GameEvent::UserMove { from, to } => self.user_move(from, to),
            GameEvent::PromotionChosen(choice) => self.choose_promotion(choice),
            GameEvent::PromotionCancelled => self.cancel_promotion(),
            GameEvent::NewGame { human } => {
                self.new_game(human);
                Ok(())
            }
            GameEvent::Undo => self.undo().map(|_| ()),
            GameEvent::SetDifficulty(level) => {
                self.set_difficulty(level);
                Ok(())
            }
            GameEvent::LoadPosition(fen) => {
                if let Err(e) = self.load_position(&fen) {
                    self.notices.push(Notice::InvalidPosition(e.to_string()));
                }
                Ok(())
            }
            GameEvent::FlipBoard => {
                self.orientation = !self.orientation;
                self.render();
                Ok(())
            }
            GameEvent::EngineStatus(status) => {
                self.engine_status(status);
                Ok(())
            }
            GameEvent::EngineReply {
                ticket,
                fen,
                result,
            } => {
                self.engine_reply(ticket, &fen, result);
                Ok(())
            }
        }
    }

    pub fn user_move(&mut self, from: Square, to: Square) -> Result<(), TurnError> {
        self.accepting_input()?;

        let piece = self.game.piece_at(from);
        if promotion::is_promotion(piece, to) {
            if !self.game.has_legal_promotion(from, to) {
                return Err(self.illegal(IllegalMoveError::new(
                    format!("{from}{to}"),
                    "no legal promotion",
                )));
            }
            self.promotion.trigger(piece, from, to);
            self.state = TurnState::AwaitingPromotionChoice;
            self.render();
            return Ok(());
        }

        match self.game.apply_move(ChessMove::new(from, to)) {
            Ok(_) => {
                self.advance();
                Ok(())
            }
            Err(e) => Err(self.illegal(e)),
        }
    }

    pub fn choose_promotion(&mut self, choice: PromotionChoice) -> Result<(), TurnError> {
        if self.state != TurnState::AwaitingPromotionChoice {
            return Err(TurnError::NoPendingPromotion);
        }
        let mv = self
            .promotion
            .resolve(choice)
            .ok_or(TurnError::NoPendingPromotion)?;

        match self.game.apply_move(mv) {
            Ok(_) => {
                self.advance();
                Ok(())
            }
            Err(e) => {
                self.state = TurnState::PlayerToMove;
                self.render();
                Err(self.illegal(e))
            }
        }
    }

    pub fn cancel_promotion(&mut self) -> Result<(), TurnError> {
        if self.state != TurnState::AwaitingPromotionChoice {
            return Err(TurnError::NoPendingPromotion);
        }
        self.promotion.cancel();
        self.state = TurnState::PlayerToMove;
        self.render();
        Ok(())
    }

    pub fn new_game(&mut self, human: Color) {
        info!("new game, player has {human}");
        self.promotion.cancel();
        self.game.reset();
        self.human = human;
        self.orientation = human;
        self.advance();
    }

    /// Takes back the player's last move, and the engine's reply to it if
    /// there is one. Returns how many moves were taken back.
    pub fn undo(&mut self) -> Result<usize, TurnError> {
        if matches!(self.state, TurnState::GameOver(_)) {
            return Err(TurnError::GameOver);
        }
        self.promotion.cancel();

        let played = self.game.history_len();
        let count = if self.automated_enabled && self.game.turn() == self.human && played >= 2 {
            2
        } else {
            played.min(1)
        };
        for _ in 0..count {
            self.game.undo();
        }
        info!("took back {count} move(s)");

        self.advance();
        Ok(count)
    }

    pub fn set_difficulty(&mut self, level: DifficultyLevel) {
        info!("difficulty set to {level}");
        self.difficulty = level;
        self.notices.push(Notice::DifficultyChanged(level));
    }

    pub fn load_position(&mut self, fen: &str) -> Result<(), InvalidPositionError> {
        self.game.load_position(fen)?;
        self.promotion.cancel();
        self.advance();
        Ok(())
    }

    pub fn status_line(&self) -> String {
        let status = self.game.status();
        match self.state {
            TurnState::GameOver(GameOverReason::Checkmate { winner }) => {
                if self.automated_enabled {
                    let who = if winner == self.human { "Player" } else { "Engine" };
                    format!("Checkmate! {who} wins.")
                } else {
                    format!("Checkmate! {} wins.", color_name(winner))
                }
            }
            TurnState::GameOver(GameOverReason::Stalemate) => "Stalemate. Game is a draw.".to_string(),
            TurnState::GameOver(GameOverReason::Draw) => {
                "Draw by rule (50-move, threefold repetition, or insufficient material).".to_string()
            }
            TurnState::AutomatedThinking => "Engine is thinking...".to_string(),
            TurnState::AwaitingPromotionChoice => {
                "Choose a promotion piece: q, r, b or n.".to_string()
            }
            TurnState::PlayerToMove => {
                let mut line = if self.automated_enabled {
                    format!("Player ({}) to move.", color_name(self.human))
                } else {
                    format!("{} to move.", color_name(status.turn))
                };
                if status.is_check {
                    line.push_str(" Check!");
                }
                line
            }
        }
    }

    fn accepting_input(&self) -> Result<(), TurnError> {
        match self.state {
            TurnState::PlayerToMove => Ok(()),
            TurnState::GameOver(_) => Err(TurnError::GameOver),
            state => Err(TurnError::NotAcceptingInput(state)),
        }
    }

    fn illegal(&mut self, e: IllegalMoveError) -> TurnError {
        warn!("{e}");
        self.notices.push(Notice::IllegalMove(e.to_string()));
        TurnError::Illegal(e)
    }

    fn engine_owns_turn(&self) -> bool {
        self.automated_enabled && self.game.turn() != self.human
    }

    /// Re-derives the turn state from the position after it changed.
    fn advance(&mut self) {
        let status = self.game.status();
        self.state = if status.is_game_over {
            let reason = game_over_reason(&status);
            info!("game over: {reason:?}");
            TurnState::GameOver(reason)
        } else if self.engine_owns_turn() {
            TurnState::AutomatedThinking
        } else {
            TurnState::PlayerToMove
        };

        if self.state == TurnState::AutomatedThinking {
            self.start_search();
        }
        self.render();
    }

    fn start_search(&mut self) {
        if let Some(search) = &self.in_flight {
            // no way to abort it: wait for its reply, drop it, then ask again
            debug!("search {} still outstanding, deferring", search.ticket);
            return;
        }

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let fen = self.game.serialize();
        let params = difficulty::resolve(self.difficulty);
        info!("asking engine for a move ({})", self.difficulty);

        let pending = self.bridge.request_move(&fen, params);
        self.in_flight = Some(InFlightSearch { ticket });

        let events = self.events.clone();
        tokio::spawn(async move {
            let result = pending.await;
            if events
                .unbounded_send(GameEvent::EngineReply {
                    ticket,
                    fen,
                    result,
                })
                .is_err()
            {
                debug!("controller gone, dropping reply to search {ticket}");
            }
        });
    }

    fn engine_status(&mut self, status: Result<(), EngineError>) {
        match status {
            Ok(()) if self.bridge.is_ready() => {
                info!("engine opponent available");
                self.automated_enabled = true;
                if self.state == TurnState::PlayerToMove {
                    self.advance();
                } else {
                    self.render();
                }
            }
            Ok(()) => self.disable_engine(EngineError::NotReady),
            Err(e) => self.disable_engine(e),
        }
    }

    fn engine_reply(&mut self, ticket: u64, fen: &str, result: Result<ChessMove, EngineError>) {
        match &self.in_flight {
            Some(search) if search.ticket == ticket => self.in_flight = None,
            _ => {
                warn!("ignoring reply to unknown search {ticket}");
                return;
            }
        }

        if let Err(e) = &result {
            if e.is_session_fatal() {
                error!("engine search failed: {e}");
                self.disable_engine(e.clone());
                return;
            }
        }

        if self.state != TurnState::AutomatedThinking || fen != self.game.serialize() {
            warn!("discarding stale engine reply to search {ticket}");
            if self.state == TurnState::AutomatedThinking {
                self.start_search();
            }
            return;
        }

        let mv = match result {
            Ok(mv) => mv,
            Err(e) => {
                warn!("engine search refused: {e}");
                if !self.bridge.is_ready() {
                    self.disable_engine(e);
                } else {
                    self.notices.push(Notice::EngineError(e.to_string()));
                    self.state = TurnState::PlayerToMove;
                    self.render();
                }
                return;
            }
        };

        match self.game.apply_move(mv) {
            Ok(applied) => {
                info!("engine played {} ({})", applied.mv, applied.san);
                self.advance();
            }
            Err(e) => {
                error!("engine proposed an illegal move: {e}");
                self.disable_engine(EngineError::Protocol(e.to_string()));
            }
        }
    }

    /// Falls back to two players at one board for the rest of the session.
    fn disable_engine(&mut self, e: EngineError) {
        warn!("engine opponent disabled: {e}");
        self.automated_enabled = false;
        self.notices.push(Notice::EngineUnavailable(e.to_string()));
        if self.state == TurnState::AutomatedThinking {
            self.state = TurnState::PlayerToMove;
        }
        self.render();
    }

    fn render(&mut self) {
        let interactive = self.is_interactive();
        let state = RenderState {
            board: self.game.position().board().clone(),
            fen: self.game.serialize(),
            orientation: self.orientation,
            turn: self.game.turn(),
            interactive,
            dests: if interactive {
                self.game.legal_destinations()
            } else {
                Default::default()
            },
            last_move: self.game.last_move().map(|m| (m.mv.from, m.mv.to)),
            check: self.game.checked_king(),
            status: self.status_line(),
            history: util::format_history(self.game.history()),
        };
        self.renderer.render(&state);
    }
}

fn game_over_reason(status: &GameStatus) -> GameOverReason {
    if status.is_checkmate {
        GameOverReason::Checkmate {
            winner: !status.turn,
        }
    } else if status.is_stalemate {
        GameOverReason::Stalemate
    } else {
        GameOverReason::Draw
    }
}

fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "White",
        Color::Black => "Black",
    }
}
