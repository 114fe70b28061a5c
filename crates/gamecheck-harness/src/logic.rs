//! Game-Logic Prober: behavioral checks against a loaded namespace.
//!
//! Each game has one fixed probe. A probe fails on a missing capability or on
//! a wrong answer for its primary fixture. Auxiliary fixtures only fail the
//! probe on a wrong answer; if the module raises on one, it is skipped.

use gamecheck_error::ProbeError;
use serde_json::{json, Value};

use crate::fixtures::{self, Fixture, PLAYER};
use crate::game::GameId;
use crate::namespace::{BindingKind, CallError, Namespace, Target};

/// How a win checker receives its board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinConvention {
    /// `checker(board, player)`.
    BoardAndPlayer,
    /// The module global `board` is rebound, then `checker(player)`.
    ModuleBoard,
}

/// A win-detection function and the calling convention it accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinChecker {
    name: String,
    convention: WinConvention,
}

impl WinChecker {
    /// Settle the calling convention on the primary fixture.
    ///
    /// `(board, player)` is tried first. The module-board form is tried only
    /// when the arguments do not bind to the checker's signature, so a checker
    /// that raises or answers wrongly is never retried.
    pub async fn establish<N: Namespace + ?Sized>(
        ns: &mut N,
        name: &str,
        primary: &Fixture,
    ) -> Result<Self, ProbeError> {
        let direct = Self {
            name: name.to_string(),
            convention: WinConvention::BoardAndPlayer,
        };
        let err = match direct.check(ns, primary).await {
            Ok(verdict) => {
                direct.verify(primary, verdict)?;
                return Ok(direct);
            }
            Err(e) => e,
        };
        if !err.is_signature() {
            return Err(ProbeError::AssertionFailure(format!(
                "{name} function error: {err}"
            )));
        }

        tracing::debug!(checker = name, error = %err, "board and player rejected, trying module board");
        let module_board = Self {
            name: name.to_string(),
            convention: WinConvention::ModuleBoard,
        };
        match module_board.check(ns, primary).await {
            Ok(verdict) => {
                module_board.verify(primary, verdict)?;
                Ok(module_board)
            }
            Err(e) => Err(ProbeError::AssertionFailure(format!(
                "{name} function error: {e}"
            ))),
        }
    }

    /// The checker's binding name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The convention settled on by [`establish`](Self::establish).
    pub fn convention(&self) -> WinConvention {
        self.convention
    }

    /// Ask the checker about `fixture`; `Ok` carries the truthiness of its answer.
    pub async fn check<N: Namespace + ?Sized>(
        &self,
        ns: &mut N,
        fixture: &Fixture,
    ) -> Result<bool, CallError> {
        let target = Target::global(&self.name);
        let reply = match self.convention {
            WinConvention::BoardAndPlayer => {
                ns.call(target, vec![fixture.board.clone(), json!(PLAYER)])
                    .await?
            }
            WinConvention::ModuleBoard => {
                ns.set_global("board", fixture.board.clone()).await?;
                ns.call(target, vec![json!(PLAYER)]).await?
            }
        };
        Ok(reply.truthy)
    }

    /// Check an auxiliary fixture. A wrong answer fails; an error is skipped.
    pub async fn expect<N: Namespace + ?Sized>(
        &self,
        ns: &mut N,
        fixture: &Fixture,
    ) -> Result<(), ProbeError> {
        match self.check(ns, fixture).await {
            Ok(verdict) => self.verify(fixture, verdict),
            Err(e) => {
                tracing::debug!(checker = %self.name, fixture = fixture.label, error = %e, "auxiliary fixture skipped");
                Ok(())
            }
        }
    }

    fn verify(&self, fixture: &Fixture, verdict: bool) -> Result<(), ProbeError> {
        match (fixture.expect_win, verdict) {
            (true, true) | (false, false) => Ok(()),
            (true, false) => Err(ProbeError::AssertionFailure(format!(
                "win detection failed for {} win",
                fixture.label
            ))),
            (false, true) => Err(ProbeError::AssertionFailure(
                "false positive win detection".to_string(),
            )),
        }
    }
}

/// Probe the game named `game`. Unknown names fail with [`ProbeError::UnknownGame`].
pub async fn probe_named<N: Namespace + ?Sized>(ns: &mut N, game: &str) -> Result<(), ProbeError> {
    let game: GameId = game.parse()?;
    probe(ns, game).await
}

/// Run the behavioral probe for `game`.
#[tracing::instrument(skip_all, fields(%game))]
pub async fn probe<N: Namespace + ?Sized>(ns: &mut N, game: GameId) -> Result<(), ProbeError> {
    let result = match game {
        GameId::TicTacToe => tic_tac_toe(ns).await,
        GameId::ConnectFour => connect_four(ns).await,
        GameId::SnakeGame => snake_game(ns).await,
        GameId::BallBouncing => ball_bouncing(ns).await,
        GameId::SnakesAndLadders => snakes_and_ladders(ns).await,
    };
    match &result {
        Ok(()) => tracing::debug!("game logic probe passed"),
        Err(e) => tracing::debug!(error = %e, "game logic probe failed"),
    }
    result
}

async fn run_fixtures<N: Namespace + ?Sized>(
    ns: &mut N,
    checker: &str,
    fixtures: &[Fixture],
) -> Result<(), ProbeError> {
    let Some((primary, auxiliary)) = fixtures.split_first() else {
        return Ok(());
    };
    let checker = WinChecker::establish(ns, checker, primary).await?;
    for fixture in auxiliary {
        checker.expect(ns, fixture).await?;
    }
    Ok(())
}

async fn tic_tac_toe<N: Namespace + ?Sized>(ns: &mut N) -> Result<(), ProbeError> {
    if !ns.bindings().contains("check_win") {
        return Err(ProbeError::MissingCapability(
            "missing check_win function".to_string(),
        ));
    }
    run_fixtures(ns, "check_win", &fixtures::tic_tac_toe()).await
}

async fn connect_four<N: Namespace + ?Sized>(ns: &mut N) -> Result<(), ProbeError> {
    if let Some(checker) = ns.bindings().first_of(&["winning_move", "check_win"]) {
        return run_fixtures(ns, checker, &fixtures::connect_four()).await;
    }

    if ns.bindings().contains("create_board") {
        match ns.call(Target::global("create_board"), Vec::new()).await {
            Ok(board) if !board.value.is_null() => {
                tracing::debug!("no win checker, accepting create_board");
                return Ok(());
            }
            Ok(_) => tracing::debug!("create_board returned None"),
            Err(e) => tracing::debug!(error = %e, "create_board failed"),
        }
    }
    Err(ProbeError::MissingCapability(
        "missing winning_move function".to_string(),
    ))
}

async fn snake_game<N: Namespace + ?Sized>(ns: &mut N) -> Result<(), ProbeError> {
    let bindings = ns.bindings();
    let class = if bindings.kind_of("Snake") == Some(BindingKind::Class) {
        Some("Snake".to_string())
    } else {
        bindings
            .iter()
            .find(|b| b.kind == BindingKind::Class && b.name.to_lowercase().contains("snake"))
            .map(|b| b.name.clone())
    };
    let class =
        class.ok_or_else(|| ProbeError::MissingCapability("missing Snake class".to_string()))?;

    let instance = ns
        .call(Target::global(&class), Vec::new())
        .await
        .map_err(|e| ProbeError::AssertionFailure(format!("{class} instantiation error: {e}")))?;
    let handle = instance.handle().ok_or_else(|| {
        ProbeError::AssertionFailure(format!("{class}() did not return an object"))
    })?;
    let info = ns
        .describe(Target::Handle { handle })
        .await
        .map_err(|e| ProbeError::AssertionFailure(format!("cannot inspect {class} instance: {e}")))?;

    if !(info.has_attribute("move_snake") || info.has_attribute("move")) {
        return Err(ProbeError::MissingCapability(format!(
            "{class} class missing move functionality"
        )));
    }

    if info.has_attribute("check_collision") {
        match ns
            .call(Target::attribute(handle, "check_collision"), Vec::new())
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_signature() => {
                tracing::debug!(error = %e, "check_collision needs arguments, skipped");
            }
            Err(e) => {
                return Err(ProbeError::AssertionFailure(format!(
                    "check_collision error: {e}"
                )))
            }
        }
    }
    Ok(())
}

const BALL_UPDATES: &[&str] = &["update_ball", "move_ball", "update"];
const BALL_POSITIONS: &[&str] = &["ball_x", "ball_pos", "ball_position"];
const BALL_VELOCITIES: &[&str] = &["ball_velocity_x", "ball_velocity", "ball_speed_x", "ball_dx"];

async fn observe<N: Namespace + ?Sized>(ns: &mut N, names: &[Option<&str>]) -> Vec<Option<Value>> {
    let mut state = Vec::with_capacity(names.len());
    for name in names {
        let value = match name {
            Some(name) => ns.get(Target::global(*name)).await.ok().map(|v| v.value),
            None => None,
        };
        state.push(value);
    }
    state
}

async fn ball_bouncing<N: Namespace + ?Sized>(ns: &mut N) -> Result<(), ProbeError> {
    let bindings = ns.bindings();
    let update = BALL_UPDATES
        .iter()
        .copied()
        .find(|n| bindings.kind_of(n) == Some(BindingKind::Function));
    let position = bindings.first_of(BALL_POSITIONS);
    let velocity = bindings.first_of(BALL_VELOCITIES);

    if let Some(op) = update {
        let before = observe(ns, &[position, velocity]).await;
        match ns.call(Target::global(op), Vec::new()).await {
            Ok(_) => {
                let after = observe(ns, &[position, velocity]).await;
                tracing::debug!(op, changed = before != after, "ball update invoked");
                return Ok(());
            }
            Err(e) if e.is_signature() => {
                tracing::debug!(op, error = %e, "ball update needs arguments, checking state");
            }
            Err(e) => return Err(ProbeError::AssertionFailure(format!("{op} error: {e}"))),
        }
    }

    if position.is_some() && velocity.is_some() {
        Ok(())
    } else {
        Err(ProbeError::MissingCapability(
            "missing ball physics (update_ball or ball variables)".to_string(),
        ))
    }
}

async fn snakes_and_ladders<N: Namespace + ?Sized>(ns: &mut N) -> Result<(), ProbeError> {
    let bindings = ns.bindings();
    let features = [("ladders", bindings.kind_of("ladders")), ("snakes", bindings.kind_of("snakes"))];
    if features.iter().all(|(_, kind)| kind.is_none()) {
        return Err(ProbeError::MissingCapability(
            "missing ladders and snakes dictionaries".to_string(),
        ));
    }
    for (name, kind) in features {
        if matches!(kind, Some(k) if k != BindingKind::Mapping) {
            return Err(ProbeError::AssertionFailure(format!(
                "{name} is not a dictionary"
            )));
        }
    }
    if bindings
        .first_of(&["player_pos", "position", "player_position"])
        .is_none()
    {
        return Err(ProbeError::MissingCapability(
            "missing position tracking".to_string(),
        ));
    }
    Ok(())
}
