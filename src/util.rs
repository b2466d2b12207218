use std::str::FromStr;

use shakmaty::{Role, uci::UciMove};

use crate::{
    error::MoveNotationError,
    game::{AppliedMove, ChessMove},
};

/// Parses `from + to [+ promotion]`, e.g. `g1f3` or `e7e8q`.
pub fn parse_uci_move(move_str: &str) -> Result<ChessMove, MoveNotationError> {
    let trimmed = move_str.trim();
    let malformed = || MoveNotationError(trimmed.to_string());

    match UciMove::from_str(trimmed).map_err(|_| malformed())? {
        UciMove::Normal {
            from,
            to,
            promotion,
        } => match promotion {
            None | Some(Role::Queen | Role::Rook | Role::Bishop | Role::Knight) => Ok(ChessMove {
                from,
                to,
                promotion,
            }),
            Some(_) => Err(malformed()),
        },
        _ => Err(malformed()),
    }
}

/// Numbered move pairs, one line per full move: `1. e4 e5`.
pub fn format_history<'a>(moves: impl IntoIterator<Item = &'a AppliedMove>) -> String {
    let sans = moves.into_iter().map(|m| m.san.as_str()).collect::<Vec<_>>();
    if sans.is_empty() {
        return "No moves yet.".to_string();
    }

    sans.chunks(2)
        .enumerate()
        .map(|(i, pair)| format!("{}. {}", i + 1, pair.join(" ")))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameState;
    use shakmaty::Square;

    #[test]
    fn test_parse_four_and_five_chars() {
        assert_eq!(
            parse_uci_move("e2e4").unwrap(),
            ChessMove::new(Square::E2, Square::E4)
        );
        assert_eq!(
            parse_uci_move(" e7e8q\n").unwrap(),
            ChessMove::new(Square::E7, Square::E8).with_promotion(Role::Queen)
        );
        assert_eq!(
            parse_uci_move("a2a1n").unwrap().promotion,
            Some(Role::Knight)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "e2", "e2e9", "z1a1", "e7e8x", "e7e8k", "0000", "P@e4", "e2e4qq"] {
            assert!(parse_uci_move(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_format_history() {
        let mut game = GameState::new();
        assert_eq!(format_history(game.history()), "No moves yet.");

        for m in ["e2e4", "e7e5", "g1f3"] {
            game.apply_move(m.parse().unwrap()).unwrap();
        }
        assert_eq!(format_history(game.history()), "1. e4 e5\n2. Nf3");
    }
}
