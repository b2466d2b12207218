//! Game state facade over the shakmaty rules engine.
//!
//! Owns the current position and the move history. Every applied move
//! produces a fresh position snapshot; undo restores the snapshot taken
//! before the move, so positions are never patched in place.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use log::{debug, warn};
use shakmaty::{
    CastlingMode, Chess, Color, EnPassantMode, Piece, Position, Role, Square, fen::Fen, san::San,
    uci::UciMove,
};

use crate::{
    error::{IllegalMoveError, InvalidPositionError, MoveNotationError},
    util,
};

/// A move as exchanged with the board and the engine: `e2e4`, `e7e8q`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChessMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Role>,
}

impl ChessMove {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }

    pub fn with_promotion(self, role: Role) -> Self {
        Self {
            promotion: Some(role),
            ..self
        }
    }

    pub fn to_uci(self) -> UciMove {
        UciMove::Normal {
            from: self.from,
            to: self.to,
            promotion: self.promotion,
        }
    }
}

impl fmt::Display for ChessMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uci())
    }
}

impl FromStr for ChessMove {
    type Err = MoveNotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        util::parse_uci_move(s)
    }
}

/// Derived after every move, never updated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameStatus {
    pub turn: Color,
    pub is_check: bool,
    pub is_checkmate: bool,
    pub is_stalemate: bool,
    pub is_draw: bool,
    pub is_game_over: bool,
}

/// A move that made it onto the board, with what the rules engine learned about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub mv: ChessMove,
    pub san: String,
    pub color: Color,
    pub role: Role,
    pub captured: Option<Role>,
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    before: Chess,
    applied: AppliedMove,
}

/// Pieces taken by each side, as `(role, count)` in role order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedPieces {
    pub by_white: Vec<(Role, u32)>,
    pub by_black: Vec<(Role, u32)>,
}

#[derive(Debug, Clone)]
pub struct GameState {
    position: Chess,
    history: Vec<HistoryEntry>,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    pub fn new() -> Self {
        Self {
            position: Chess::default(),
            history: Vec::new(),
        }
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    pub fn turn(&self) -> Color {
        self.position.turn()
    }

    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.position.board().piece_at(square)
    }

    /// Validates `mv` against the current position and plays it.
    /// An illegal or incomplete move (e.g. a promotion without a piece) leaves
    /// the game untouched.
    pub fn apply_move(&mut self, mv: ChessMove) -> Result<AppliedMove, IllegalMoveError> {
        let legal = mv
            .to_uci()
            .to_move(&self.position)
            .map_err(|e| IllegalMoveError::new(mv.to_string(), e.to_string()))?;

        let mut san = San::from_move(&self.position, legal).to_string();
        let color = self.position.turn();
        let before = self.position.clone();
        self.position.play_unchecked(legal);

        if self.position.is_checkmate() {
            san.push('#');
        } else if self.position.is_check() {
            san.push('+');
        }

        let applied = AppliedMove {
            mv,
            san,
            color,
            role: legal.role(),
            captured: legal.capture(),
        };
        debug!("applied {} ({})", applied.mv, applied.san);

        self.history.push(HistoryEntry {
            before,
            applied: applied.clone(),
        });
        Ok(applied)
    }

    /// All destinations for the side to move, keyed by origin square.
    /// Castling is reported king-to-target (`e1g1`), the way a board expects it.
    pub fn legal_destinations(&self) -> BTreeMap<Square, BTreeSet<Square>> {
        let mut dests: BTreeMap<Square, BTreeSet<Square>> = BTreeMap::new();
        for m in self.position.legal_moves() {
            if let UciMove::Normal { from, to, .. } = m.to_uci(CastlingMode::Standard) {
                dests.entry(from).or_default().insert(to);
            }
        }
        dests
    }

    /// Whether some legal move goes `from` -> `to` as a promotion.
    pub fn has_legal_promotion(&self, from: Square, to: Square) -> bool {
        self.position
            .legal_moves()
            .iter()
            .any(|m| m.is_promotion() && m.from() == Some(from) && m.to() == to)
    }

    pub fn status(&self) -> GameStatus {
        let pos = &self.position;
        let is_checkmate = pos.is_checkmate();
        let is_stalemate = pos.is_stalemate();
        let is_draw = is_stalemate
            || pos.is_insufficient_material()
            || pos.halfmoves() >= 100
            || self.is_threefold_repetition();

        GameStatus {
            turn: pos.turn(),
            is_check: pos.is_check(),
            is_checkmate,
            is_stalemate,
            is_draw,
            is_game_over: is_checkmate || is_draw,
        }
    }

    /// Square of the king in check, if any.
    pub fn checked_king(&self) -> Option<Square> {
        if self.position.is_check() {
            self.position.board().king_of(self.position.turn())
        } else {
            None
        }
    }

    /// Pops the last move and restores the position before it.
    pub fn undo(&mut self) -> Option<ChessMove> {
        let entry = self.history.pop()?;
        self.position = entry.before;
        debug!("undid {}", entry.applied.mv);
        Some(entry.applied.mv)
    }

    pub fn reset(&mut self) {
        self.position = Chess::default();
        self.history.clear();
    }

    /// Replaces the game with the position in `fen`. History starts over.
    /// Malformed input leaves the current game untouched.
    pub fn load_position(&mut self, fen: &str) -> Result<(), InvalidPositionError> {
        let position = parse_fen(fen).inspect_err(|e| warn!("failed to load position: {e}"))?;
        self.position = position;
        self.history.clear();
        Ok(())
    }

    pub fn serialize(&self) -> String {
        Fen::from_position(&self.position, EnPassantMode::Legal).to_string()
    }

    pub fn history(&self) -> impl Iterator<Item = &AppliedMove> {
        self.history.iter().map(|entry| &entry.applied)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn last_move(&self) -> Option<&AppliedMove> {
        self.history.last().map(|entry| &entry.applied)
    }

    pub fn captured(&self) -> CapturedPieces {
        let count = |color: Color| {
            Role::ALL
                .into_iter()
                .filter_map(|role| {
                    let n = self
                        .history()
                        .filter(|m| m.color == color && m.captured == Some(role))
                        .count() as u32;
                    (n > 0).then_some((role, n))
                })
                .collect()
        };

        CapturedPieces {
            by_white: count(Color::White),
            by_black: count(Color::Black),
        }
    }

    fn is_threefold_repetition(&self) -> bool {
        let current = repetition_key(&self.position);
        let earlier = self
            .history
            .iter()
            .filter(|entry| repetition_key(&entry.before) == current)
            .count();
        earlier + 1 >= 3
    }
}

pub fn parse_fen(fen: &str) -> Result<Chess, InvalidPositionError> {
    let fen: Fen = fen
        .trim()
        .parse()
        .map_err(|e: shakmaty::fen::ParseFenError| InvalidPositionError(e.to_string()))?;
    fen.into_position(CastlingMode::Standard)
        .map_err(|e| InvalidPositionError(e.to_string()))
}

/// FEN without the move counters.
fn repetition_key(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal)
        .to_string()
        .split(' ')
        .take(4)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn mv(s: &str) -> ChessMove {
        s.parse().unwrap()
    }

    fn play(game: &mut GameState, line: &str) {
        for m in line.split_whitespace() {
            game.apply_move(mv(m)).unwrap();
        }
    }

    #[test]
    fn test_e2e4_hands_turn_to_black() {
        let mut game = GameState::new();
        let applied = game.apply_move(mv("e2e4")).unwrap();
        assert_eq!(applied.san, "e4");
        assert_eq!(applied.role, Role::Pawn);

        let status = game.status();
        assert_eq!(status.turn, Color::Black);
        assert!(!status.is_check);
        assert!(!status.is_game_over);
        assert!(game.serialize().starts_with("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq"));
    }

    #[test]
    fn test_illegal_move_has_no_side_effects() {
        let mut game = GameState::new();
        let before = game.serialize();
        let err = game.apply_move(mv("e2e5")).unwrap_err();
        assert_eq!(err.notation, "e2e5");
        assert_eq!(game.serialize(), before);
        assert_eq!(game.history_len(), 0);
    }

    #[test]
    fn test_promotion_requires_piece() {
        let mut game = GameState::new();
        game.load_position("8/4P3/8/8/8/8/k7/4K3 w - - 0 1").unwrap();
        assert!(game.apply_move(mv("e7e8")).is_err());
        assert!(game.has_legal_promotion(Square::E7, Square::E8));

        let applied = game.apply_move(mv("e7e8q")).unwrap();
        assert_eq!(applied.mv.promotion, Some(Role::Queen));
        assert_eq!(
            game.piece_at(Square::E8),
            Some(Piece {
                color: Color::White,
                role: Role::Queen
            })
        );
    }

    #[test]
    fn test_fools_mate_is_checkmate() {
        let mut game = GameState::new();
        play(&mut game, "f2f3 e7e5 g2g4 d8h4");
        let status = game.status();
        assert!(status.is_checkmate);
        assert!(status.is_game_over);
        assert!(!status.is_draw);
        assert_eq!(game.last_move().unwrap().san, "Qh4#");
        assert_eq!(game.checked_king(), Some(Square::E1));
    }

    #[test]
    fn test_stalemate_counts_as_draw() {
        let mut game = GameState::new();
        game.load_position("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        let status = game.status();
        assert!(status.is_stalemate);
        assert!(status.is_draw);
        assert!(status.is_game_over);
        assert!(!status.is_checkmate);
    }

    #[test]
    fn test_threefold_repetition() {
        let mut game = GameState::new();
        play(&mut game, "g1f3 g8f6 f3g1 f6g8 g1f3 g8f6 f3g1");
        assert!(!game.status().is_draw);
        play(&mut game, "f6g8");
        assert!(game.status().is_draw);
    }

    #[test]
    fn test_insufficient_material_and_fifty_moves() {
        let mut game = GameState::new();
        game.load_position("8/8/8/4k3/8/8/8/4K3 w - - 0 1").unwrap();
        assert!(game.status().is_draw);

        game.load_position("8/8/8/4k3/8/8/8/R3K3 w - - 100 80").unwrap();
        assert!(game.status().is_draw);
    }

    #[test]
    fn test_undo_restores_previous_position() {
        let mut game = GameState::new();
        assert_eq!(game.undo(), None);

        let start = game.serialize();
        play(&mut game, "e2e4 e7e5");
        assert_eq!(game.undo(), Some(mv("e7e5")));
        assert_eq!(game.undo(), Some(mv("e2e4")));
        assert_eq!(game.serialize(), start);
        assert_eq!(game.undo(), None);
    }

    #[test]
    fn test_legal_destinations_at_start() {
        let game = GameState::new();
        let dests = game.legal_destinations();
        assert_eq!(dests.len(), 10);
        assert_eq!(dests.values().map(BTreeSet::len).sum::<usize>(), 20);
        assert_eq!(
            dests[&Square::E2],
            BTreeSet::from([Square::E3, Square::E4])
        );
    }

    #[test]
    fn test_castling_destination_is_king_target() {
        let mut game = GameState::new();
        game.load_position("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let dests = game.legal_destinations();
        assert!(dests[&Square::E1].contains(&Square::G1));
        assert!(dests[&Square::E1].contains(&Square::C1));

        let applied = game.apply_move(mv("e1g1")).unwrap();
        assert_eq!(applied.san, "O-O");
        assert!(game.piece_at(Square::F1).is_some());
    }

    #[test]
    fn test_load_invalid_position_keeps_state() {
        let mut game = GameState::new();
        play(&mut game, "d2d4");
        let before = game.serialize();

        assert!(game.load_position("not a fen").is_err());
        assert!(game.load_position("8/8/8/8/8/8/8/8 w - - 0 1").is_err());
        assert_eq!(game.serialize(), before);
        assert_eq!(game.history_len(), 1);
    }

    #[test]
    fn test_serialize_round_trip_on_reachable_positions() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let mut game = GameState::new();
            for _ in 0..60 {
                let legals = game.position().legal_moves();
                if legals.is_empty() {
                    break;
                }
                let m = legals[rng.random_range(0..legals.len())];
                let uci = m.to_uci(CastlingMode::Standard).to_string();
                game.apply_move(uci.parse().unwrap()).unwrap();

                let fen = game.serialize();
                let mut reloaded = GameState::new();
                reloaded.load_position(&fen).unwrap();
                assert_eq!(reloaded.serialize(), fen);
                assert_eq!(reloaded.legal_destinations(), game.legal_destinations());
            }
        }
    }

    #[test]
    fn test_captured_pieces() {
        let mut game = GameState::new();
        play(&mut game, "e2e4 d7d5 e4d5 d8d5 b1c3 d5a2 a1a2");
        let captured = game.captured();
        assert_eq!(captured.by_white, vec![(Role::Pawn, 1), (Role::Queen, 1)]);
        assert_eq!(captured.by_black, vec![(Role::Pawn, 2)]);
    }
}
