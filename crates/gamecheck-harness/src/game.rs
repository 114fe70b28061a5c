//! The closed set of games the harness knows how to probe.

use std::fmt;
use std::str::FromStr;

use gamecheck_error::ProbeError;
use serde::{Deserialize, Serialize};

/// Identifies which behavioural contract applies to an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameId {
    /// 3x3 tic-tac-toe.
    TicTacToe,
    /// 6x7 connect four.
    ConnectFour,
    /// Classic snake.
    SnakeGame,
    /// A single bouncing ball.
    BallBouncing,
    /// Snakes and ladders.
    SnakesAndLadders,
}

impl GameId {
    /// Every known game, in canonical order.
    pub const ALL: [GameId; 5] = [
        GameId::TicTacToe,
        GameId::ConnectFour,
        GameId::SnakeGame,
        GameId::BallBouncing,
        GameId::SnakesAndLadders,
    ];

    /// The wire name of this game (`tic_tac_toe`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            GameId::TicTacToe => "tic_tac_toe",
            GameId::ConnectFour => "connect_four",
            GameId::SnakeGame => "snake_game",
            GameId::BallBouncing => "ball_bouncing",
            GameId::SnakesAndLadders => "snakes_and_ladders",
        }
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameId {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameId::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| ProbeError::UnknownGame(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_wire_name() {
        for game in GameId::ALL {
            assert_eq!(game.as_str().parse::<GameId>().unwrap(), game);
        }
    }

    #[test]
    fn unknown_name_is_unknown_game() {
        let err = "pong".parse::<GameId>().unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_GAME");
        assert_eq!(err.to_string(), "unknown game: pong");
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&GameId::SnakesAndLadders).unwrap();
        assert_eq!(json, "\"snakes_and_ladders\"");
        let back: GameId = serde_json::from_str("\"connect_four\"").unwrap();
        assert_eq!(back, GameId::ConnectFour);
    }
}
