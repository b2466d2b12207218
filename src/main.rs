use std::sync::Arc;

use anyhow::Result;
use futures::{StreamExt, channel::mpsc};
use log::{debug, info, warn};
use rusty_chess_opponent::{
    config::{AppConfig, EngineKind, Opponent},
    difficulty,
    engine::{EngineBridge, EngineLauncher, RandomEngineLauncher, UciProcessLauncher},
    game::CapturedPieces,
    preferences::{JsonPreferenceStore, PreferenceStore, Preferences},
    promotion::PromotionChoice,
    render::TerminalRenderer,
    error::TurnError,
    turn::{GameEvent, Notice, TurnController, TurnState},
    util::{format_history, parse_uci_move},
};
use shakmaty::{Color, Role, Square};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
commands:
  e2e4, e7e8q        move (a promotion without a piece asks for one)
  promote q|r|b|n    pick the promotion piece
  cancel             drop a pending promotion
  undo               take back your last move
  new [white|black]  start over, optionally choosing a side
  difficulty <name>  easy, medium, hard or expert
  flip               turn the board around
  load <fen>         set up a position
  fen | history | captured | help | quit";

#[tokio::main]
async fn main() -> Result<()> {
    let (config, source) = AppConfig::load()?;
    setup_logger(&config)?;
    match &source {
        Some(path) => info!("read config from {}", path.display()),
        None => info!("no config file, using defaults and environment"),
    }
    debug!("config: {config:?}");

    let store = JsonPreferenceStore::new(&config.preferences_path);
    let mut preferences = store.load();
    let level = match &config.difficulty {
        Some(name) => difficulty::resolve_name(name).level,
        None => preferences.difficulty,
    };

    let (events_tx, mut events) = mpsc::unbounded();

    let mut bridge = EngineBridge::new(config.engine_settings());
    if config.opponent == Opponent::Engine {
        let launcher: Arc<dyn EngineLauncher> = match config.engine_kind {
            EngineKind::Uci => Arc::new(UciProcessLauncher::new(&config.engine_path)),
            EngineKind::Random => Arc::new(RandomEngineLauncher),
        };
        bridge.initialize(launcher)?;

        // the game is playable locally while the engine starts up
        let readiness = bridge.readiness();
        let status_tx = events_tx.clone();
        tokio::spawn(async move {
            let _ = status_tx.unbounded_send(GameEvent::EngineStatus(readiness.await));
        });
    } else {
        info!("no engine opponent configured, two players at one board");
    }

    let mut human = config.human_color.color();
    let mut controller =
        TurnController::new(bridge, Box::new(TerminalRenderer), events_tx.clone(), level);
    controller.handle(GameEvent::NewGame { human })?;
    println!("{HELP}\n");

    let (input_tx, mut input) = tokio::sync::mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if input_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    loop {
        let event = tokio::select! {
            Some(event) = events.next() => event,
            line = input.recv() => {
                let Some(line) = line else {
                    info!("input closed");
                    break;
                };
                match parse_command(&line, human) {
                    Ok(Command::Play(batch)) => {
                        for event in batch {
                            if let GameEvent::NewGame { human: side } = event {
                                human = side;
                            }
                            dispatch(&mut controller, event);
                        }
                        flush_notices(&mut controller, &store, &mut preferences);
                        continue;
                    }
                    Ok(Command::Move { from, to, promotion }) => {
                        if let Err(e) = play_move(&mut controller, from, to, promotion) {
                            println!("{e}");
                        }
                        flush_notices(&mut controller, &store, &mut preferences);
                        continue;
                    }
                    Ok(Command::Show(what)) => {
                        show(&controller, what);
                        continue;
                    }
                    Ok(Command::Quit) => break,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                }
            }
        };
        dispatch(&mut controller, event);
        flush_notices(&mut controller, &store, &mut preferences);
    }

    info!("bye");
    Ok(())
}

fn setup_logger(config: &AppConfig) -> Result<()> {
    // stdout belongs to the board
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(config.log_level()?)
        .chain(std::io::stderr());
    if let Some(path) = &config.log_file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }
    dispatch.apply()?;
    Ok(())
}

/// Plays `from`-`to`, answering the promotion question with `promotion` if
/// the move turned out to need one.
fn play_move(
    controller: &mut TurnController,
    from: Square,
    to: Square,
    promotion: Option<PromotionChoice>,
) -> Result<(), TurnError> {
    controller.user_move(from, to)?;
    match promotion {
        Some(choice) if controller.state() == TurnState::AwaitingPromotionChoice => {
            controller.choose_promotion(choice)
        }
        _ => Ok(()),
    }
}

fn dispatch(controller: &mut TurnController, event: GameEvent) {
    if let Err(e) = controller.handle(event) {
        println!("{e}");
    }
}

fn flush_notices(
    controller: &mut TurnController,
    store: &JsonPreferenceStore,
    preferences: &mut Preferences,
) {
    for notice in controller.take_notices() {
        match notice {
            Notice::EngineUnavailable(reason) => {
                println!("Engine unavailable ({reason}). Playing locally.")
            }
            Notice::EngineError(reason) => println!("Engine error: {reason}"),
            Notice::IllegalMove(_) => {}
            Notice::InvalidPosition(reason) => println!("{reason}"),
            Notice::DifficultyChanged(level) => {
                println!("Difficulty set to {level}.");
                preferences.difficulty = level;
                if let Err(e) = store.save(preferences) {
                    warn!("failed to save preferences: {e}");
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Fen,
    History,
    Captured,
    Help,
}

#[derive(Debug)]
enum Command {
    Move {
        from: Square,
        to: Square,
        promotion: Option<PromotionChoice>,
    },
    Play(Vec<GameEvent>),
    Show(View),
    Quit,
}

fn parse_command(line: &str, human: Color) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    let play = |event: GameEvent| -> Result<Command, String> { Ok(Command::Play(vec![event])) };
    match word.to_ascii_lowercase().as_str() {
        "quit" | "exit" => Ok(Command::Quit),
        "help" | "?" => Ok(Command::Show(View::Help)),
        "fen" => Ok(Command::Show(View::Fen)),
        "history" => Ok(Command::Show(View::History)),
        "captured" => Ok(Command::Show(View::Captured)),
        "undo" => play(GameEvent::Undo),
        "flip" => play(GameEvent::FlipBoard),
        "cancel" => play(GameEvent::PromotionCancelled),
        "promote" => rest
            .parse::<PromotionChoice>()
            .map(|choice| Command::Play(vec![GameEvent::PromotionChosen(choice)])),
        "difficulty" => {
            let resolved = difficulty::resolve_name(rest);
            if let Some(diagnostic) = resolved.diagnostic {
                println!("{diagnostic}, using {}", resolved.level);
            }
            play(GameEvent::SetDifficulty(resolved.level))
        }
        "load" if !rest.is_empty() => play(GameEvent::LoadPosition(rest.to_string())),
        "new" => {
            let human = match rest.to_ascii_lowercase().as_str() {
                "" => human,
                "white" | "w" => Color::White,
                "black" | "b" => Color::Black,
                other => return Err(format!("unknown side {other:?}")),
            };
            play(GameEvent::NewGame { human })
        }
        _ => {
            let mv = parse_uci_move(line).map_err(|e| format!("{e} (type help)"))?;
            Ok(Command::Move {
                from: mv.from,
                to: mv.to,
                promotion: mv.promotion.map(promotion_choice),
            })
        }
    }
}

fn promotion_choice(role: Role) -> PromotionChoice {
    match role {
        Role::Rook => PromotionChoice::Rook,
        Role::Bishop => PromotionChoice::Bishop,
        Role::Knight => PromotionChoice::Knight,
        _ => PromotionChoice::Queen,
    }
}

fn show(controller: &TurnController, view: View) {
    match view {
        View::Fen => println!("{}", controller.game().serialize()),
        View::History => println!("{}", format_history(controller.game().history())),
        View::Captured => println!("{}", format_captured(&controller.game().captured())),
        View::Help => println!("{HELP}"),
    }
    if view != View::Help {
        debug!("{:?} while {:?}", view, controller.state());
    }
}

fn format_captured(captured: &CapturedPieces) -> String {
    let side = |pieces: &[(Role, u32)]| {
        if pieces.is_empty() {
            return "-".to_string();
        }
        pieces
            .iter()
            .map(|(role, n)| format!("{}x{n}", role.upper_char()))
            .collect::<Vec<_>>()
            .join(" ")
    };
    format!(
        "White took: {}\nBlack took: {}",
        side(&captured.by_white),
        side(&captured.by_black)
    )
}
