//! What the board view is given after every change, and a plain-text view for the terminal.

use std::{
    collections::{BTreeMap, BTreeSet},
    io::{self, Write},
};

use shakmaty::{Board, Color, File, Rank, Square};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderState {
    pub board: Board,
    pub fen: String,
    pub orientation: Color,
    pub turn: Color,
    /// Mirrors the turn state: true only while a player may move.
    pub interactive: bool,
    /// Empty whenever the board is not interactive.
    pub dests: BTreeMap<Square, BTreeSet<Square>>,
    pub last_move: Option<(Square, Square)>,
    pub check: Option<Square>,
    pub status: String,
    pub history: String,
}

pub trait BoardRenderer: Send {
    fn render(&mut self, state: &RenderState);
}

/// Draws the board as text on stdout.
pub struct TerminalRenderer;

impl BoardRenderer for TerminalRenderer {
    fn render(&mut self, state: &RenderState) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(draw_board(state).as_bytes());
        let _ = writeln!(out, "\n{}\n\n{}\n", state.history, state.status);
        let _ = out.flush();
    }
}

pub fn draw_board(state: &RenderState) -> String {
    let mut ranks: Vec<Rank> = Rank::ALL.into_iter().rev().collect();
    let mut files: Vec<File> = File::ALL.into_iter().collect();
    if state.orientation == Color::Black {
        ranks.reverse();
        files.reverse();
    }

    let mut out = String::new();
    for rank in &ranks {
        out.push_str(&format!("{} ", rank.char()));
        for file in &files {
            let square = Square::from_coords(*file, *rank);
            let symbol = state.board.piece_at(square).map_or('.', |p| p.char());
            let marker = if state.check == Some(square) {
                '!'
            } else if state.last_move.is_some_and(|(from, to)| from == square || to == square) {
                '*'
            } else {
                ' '
            };
            out.push(symbol);
            out.push(marker);
        }
        out.push('\n');
    }
    out.push_str("  ");
    for file in &files {
        out.push(file.char());
        out.push(' ');
    }
    out.push('\n');
    out
}
