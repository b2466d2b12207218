//! Holds a pawn move on its last rank until the player picks a piece.

use std::{fmt, str::FromStr};

use shakmaty::{Color, Piece, Rank, Role, Square};

use crate::game::ChessMove;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionChoice {
    Queen,
    Rook,
    Bishop,
    Knight,
}

impl PromotionChoice {
    pub fn role(self) -> Role {
        match self {
            PromotionChoice::Queen => Role::Queen,
            PromotionChoice::Rook => Role::Rook,
            PromotionChoice::Bishop => Role::Bishop,
            PromotionChoice::Knight => Role::Knight,
        }
    }
}

impl FromStr for PromotionChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "q" | "queen" => Ok(PromotionChoice::Queen),
            "r" | "rook" => Ok(PromotionChoice::Rook),
            "b" | "bishop" => Ok(PromotionChoice::Bishop),
            "n" | "knight" => Ok(PromotionChoice::Knight),
            _ => Err(format!("not a promotion piece: {s:?}")),
        }
    }
}

impl fmt::Display for PromotionChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPromotion {
    pub from: Square,
    pub to: Square,
}

#[derive(Debug, Default)]
pub struct PromotionFlow {
    pending: Option<PendingPromotion>,
}

/// A pawn reaching the far rank for its color.
pub fn is_promotion(piece: Option<Piece>, to: Square) -> bool {
    match piece {
        Some(Piece {
            role: Role::Pawn,
            color,
        }) => to.rank() == last_rank(color),
        _ => false,
    }
}

fn last_rank(color: Color) -> Rank {
    match color {
        Color::White => Rank::Eighth,
        Color::Black => Rank::First,
    }
}

impl PromotionFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stashes the move and returns true if `piece` moving to `to` promotes;
    /// otherwise leaves the flow untouched.
    pub fn trigger(&mut self, piece: Option<Piece>, from: Square, to: Square) -> bool {
        if !is_promotion(piece, to) {
            return false;
        }
        self.pending = Some(PendingPromotion { from, to });
        true
    }

    /// Completes the stashed move with `choice` and clears the stash.
    pub fn resolve(&mut self, choice: PromotionChoice) -> Option<ChessMove> {
        self.pending
            .take()
            .map(|p| ChessMove::new(p.from, p.to).with_promotion(choice.role()))
    }

    pub fn cancel(&mut self) -> Option<PendingPromotion> {
        self.pending.take()
    }

    pub fn pending(&self) -> Option<PendingPromotion> {
        self.pending
    }
}
