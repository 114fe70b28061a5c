//! Static Semantic Prober: keyword evidence for each game's concepts.
//!
//! A cheap textual pre-filter. Nothing is executed.

use gamecheck_error::ProbeError;

use crate::game::GameId;

/// A concept a game must mention, satisfied by any one of its keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Concept {
    /// Human-readable concept name.
    pub name: &'static str,
    /// Lowercase keywords, matched as case-insensitive substrings.
    pub keywords: &'static [&'static str],
}

const TIC_TAC_TOE: &[Concept] = &[
    Concept { name: "board", keywords: &["board", "grid"] },
    Concept { name: "win check", keywords: &["win", "check"] },
    Concept { name: "graphics", keywords: &["pygame"] },
];

const CONNECT_FOUR: &[Concept] = &[
    Concept { name: "board", keywords: &["board"] },
    Concept { name: "piece drop", keywords: &["drop", "column"] },
    Concept { name: "graphics", keywords: &["pygame"] },
];

const SNAKE_GAME: &[Concept] = &[
    Concept { name: "snake", keywords: &["snake"] },
    Concept { name: "food or movement", keywords: &["fruit", "food", "move", "direction"] },
];

const BALL_BOUNCING: &[Concept] = &[
    Concept { name: "ball", keywords: &["ball"] },
    Concept { name: "physics", keywords: &["bounce", "collision", "velocity", "speed"] },
];

const SNAKES_AND_LADDERS: &[Concept] = &[
    Concept { name: "ladders", keywords: &["ladder"] },
    Concept { name: "snakes", keywords: &["snake"] },
    Concept { name: "position", keywords: &["position", "pos"] },
];

/// The concept table for `game`.
pub fn concepts(game: GameId) -> &'static [Concept] {
    match game {
        GameId::TicTacToe => TIC_TAC_TOE,
        GameId::ConnectFour => CONNECT_FOUR,
        GameId::SnakeGame => SNAKE_GAME,
        GameId::BallBouncing => BALL_BOUNCING,
        GameId::SnakesAndLadders => SNAKES_AND_LADDERS,
    }
}

/// Check `source` against the concept table of the game named `game`.
///
/// Unknown names fail with [`ProbeError::UnknownGame`].
pub fn probe(source: &str, game: &str) -> Result<(), ProbeError> {
    let game: GameId = game.parse()?;
    check(source, game)
}

/// Check `source` against the concept table of `game`.
pub fn check(source: &str, game: GameId) -> Result<(), ProbeError> {
    let haystack = source.to_lowercase();
    let missing: Vec<String> = concepts(game)
        .iter()
        .filter(|c| !c.keywords.iter().any(|k| haystack.contains(k)))
        .map(|c| format!("{} ({})", c.name, c.keywords.join("|")))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        tracing::debug!(%game, ?missing, "static semantic probe found gaps");
        Err(ProbeError::MissingCapability(format!(
            "missing concepts: {}",
            missing.join(", ")
        )))
    }
}
