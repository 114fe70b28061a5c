//! Board fixtures for win-checker probes.
//!
//! The first fixture of each list is the primary fixture; the rest are
//! auxiliary.

use serde_json::{json, Value};

use crate::namespace::array_arg;

/// Player id every fixture is evaluated for.
pub const PLAYER: i64 = 1;

/// A board and the verdict a correct checker returns for [`PLAYER`].
#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    /// Short name used in failure messages.
    pub label: &'static str,
    /// The board as sent to the module.
    pub board: Value,
    /// Whether [`PLAYER`] has won on this board.
    pub expect_win: bool,
}

/// 3x3 tic-tac-toe boards with `null` for empty cells.
pub fn tic_tac_toe() -> Vec<Fixture> {
    vec![
        Fixture {
            label: "horizontal",
            board: json!([[1, 1, 1], [null, 2, null], [null, null, 2]]),
            expect_win: true,
        },
        Fixture {
            label: "vertical",
            board: json!([[1, null, 2], [1, null, 2], [1, null, null]]),
            expect_win: true,
        },
        Fixture {
            label: "diagonal",
            board: json!([[1, null, 2], [null, 1, 2], [null, null, 1]]),
            expect_win: true,
        },
        Fixture {
            label: "no line",
            board: json!([[1, 2, 1], [2, 1, 2], [null, null, null]]),
            expect_win: false,
        },
    ]
}

/// Rows of a connect-four grid.
pub const CONNECT_FOUR_ROWS: usize = 6;
/// Columns of a connect-four grid.
pub const CONNECT_FOUR_COLS: usize = 7;

fn connect_four_board(cells: &[(usize, usize)]) -> Value {
    let mut rows = vec![vec![0i64; CONNECT_FOUR_COLS]; CONNECT_FOUR_ROWS];
    for &(r, c) in cells {
        rows[r][c] = PLAYER;
    }
    array_arg(rows)
}

/// 6x7 connect-four grids, zero for empty cells, sent as numeric arrays.
pub fn connect_four() -> Vec<Fixture> {
    vec![
        Fixture {
            label: "horizontal",
            board: connect_four_board(&[(0, 0), (0, 1), (0, 2), (0, 3)]),
            expect_win: true,
        },
        Fixture {
            label: "vertical",
            board: connect_four_board(&[(0, 0), (1, 0), (2, 0), (3, 0)]),
            expect_win: true,
        },
        Fixture {
            label: "three only",
            board: connect_four_board(&[(0, 0), (0, 1), (0, 2)]),
            expect_win: false,
        },
    ]
}
