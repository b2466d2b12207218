//! Chess against an automated opponent: rules, turn control and the bridge to
//! a UCI engine.

pub mod config;
pub mod difficulty;
pub mod engine;
pub mod error;
pub mod game;
pub mod preferences;
pub mod promotion;
pub mod render;
pub mod turn;
pub mod util;
