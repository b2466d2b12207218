//! The engine's line-oriented text protocol (UCI subset).

use std::{fmt, str::FromStr};

use crate::{difficulty::EngineParams, error::EngineError, game::ChessMove, util};

pub const SKILL_LEVEL_OPTION: &str = "Skill Level";
const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Uci,
    IsReady,
    SetOption { name: String, value: String },
    Position { fen: String },
    Go { depth: u32, movetime_ms: u64 },
    Quit,
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineCommand::Uci => write!(f, "uci"),
            EngineCommand::IsReady => write!(f, "isready"),
            EngineCommand::SetOption { name, value } => {
                write!(f, "setoption name {name} value {value}")
            }
            EngineCommand::Position { fen } => write!(f, "position fen {fen}"),
            EngineCommand::Go { depth, movetime_ms } => {
                write!(f, "go depth {depth} movetime {movetime_ms}")
            }
            EngineCommand::Quit => write!(f, "quit"),
        }
    }
}

impl FromStr for EngineCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
        match head {
            "uci" => Ok(EngineCommand::Uci),
            "isready" => Ok(EngineCommand::IsReady),
            "quit" => Ok(EngineCommand::Quit),
            "setoption" => {
                let rest = rest.strip_prefix("name ").ok_or("setoption without name")?;
                let (name, value) = rest.split_once(" value ").unwrap_or((rest, ""));
                Ok(EngineCommand::SetOption {
                    name: name.trim().to_string(),
                    value: value.trim().to_string(),
                })
            }
            "position" => match rest.split_once(' ') {
                Some(("fen", fen)) => Ok(EngineCommand::Position {
                    fen: fen.trim().to_string(),
                }),
                _ if rest.trim() == "startpos" => Ok(EngineCommand::Position {
                    fen: START_FEN.to_string(),
                }),
                _ => Err(format!("unsupported position command: {line}")),
            },
            "go" => {
                let depth = keyword_value(rest, "depth").unwrap_or(1);
                let movetime_ms = keyword_value(rest, "movetime").unwrap_or(0);
                Ok(EngineCommand::Go { depth, movetime_ms })
            }
            _ => Err(format!("unknown command: {line}")),
        }
    }
}

/// The three commands of one search, in the order the engine needs them:
/// options, then position, then go.
pub fn search_commands(fen: &str, params: EngineParams) -> [EngineCommand; 3] {
    [
        EngineCommand::SetOption {
            name: SKILL_LEVEL_OPTION.to_string(),
            value: params.skill_level.to_string(),
        },
        EngineCommand::Position {
            fen: fen.to_string(),
        },
        EngineCommand::Go {
            depth: params.search_depth,
            movetime_ms: params.move_time_ms,
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineReply {
    UciOk,
    ReadyOk,
    BestMove(ChessMove),
    Info(SearchInfo),
    Other,
}

/// Progress reported by `info` lines. Only logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchInfo {
    pub depth: Option<u32>,
    pub cp: Option<i32>,
    pub mate: Option<i32>,
    pub pv: Vec<String>,
}

/// Parses one reply line. Only a `bestmove` whose move cannot be read is an error.
pub fn parse_reply(line: &str) -> Result<EngineReply, EngineError> {
    let line = line.trim();
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("uciok") => Ok(EngineReply::UciOk),
        Some("readyok") => Ok(EngineReply::ReadyOk),
        Some("bestmove") => {
            let notation = parts
                .next()
                .ok_or_else(|| EngineError::Protocol(format!("bestmove without a move: {line:?}")))?;
            util::parse_uci_move(notation)
                .map(EngineReply::BestMove)
                .map_err(|e| EngineError::Protocol(e.to_string()))
        }
        Some("info") => Ok(EngineReply::Info(SearchInfo {
            depth: keyword_value(line, "depth"),
            cp: keyword_value(line, "cp"),
            mate: keyword_value(line, "mate"),
            pv: parse_pv(line),
        })),
        _ => Ok(EngineReply::Other),
    }
}

fn keyword_value<T: FromStr>(line: &str, keyword: &str) -> Option<T> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    parts
        .windows(2)
        .find(|pair| pair[0] == keyword)
        .and_then(|pair| pair[1].parse().ok())
}

fn parse_pv(line: &str) -> Vec<String> {
    line.split_whitespace()
        .skip_while(|part| *part != "pv")
        .skip(1)
        .take_while(|part| !part.starts_with("bmc") && *part != "string")
        .map(str::to_string)
        .collect()
}
