//! Match session state machine and authoritative tick loop

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};
use uuid::Uuid;

use crate::store::ResultStore;
use crate::tournament::TournamentEvent;
use crate::util::time::tick_duration;
use crate::ws::directory::{ChannelId, ConnectionDirectory};
use crate::ws::protocol::{
    CountdownData, GameMode, GamePhase, GameSnapshot, GameStateData, NoticeData, PaddleSide,
    PaddleSnapshot, Point, ScoreEntry, ServerMsg,
};

use super::simulation::{self, Ball, Paddle};
use super::MatchResult;

/// One bound participant: identity plus the channel handle that was current
/// when the player was bound. Sends always go through the directory; the
/// stored handle only serves to detect supersession by a reconnect.
#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub identity: String,
    pub alias: String,
    pub channel: ChannelId,
}

/// Shared collaborators a session task needs while running
#[derive(Clone)]
pub struct SessionContext {
    pub directory: Arc<ConnectionDirectory>,
    pub store: Arc<ResultStore>,
    pub tournament_tx: mpsc::UnboundedSender<TournamentEvent>,
}

struct SessionInner {
    phase: GamePhase,
    ball: Ball,
    left_paddle: Paddle,
    right_paddle: Paddle,
    left: PlayerSlot,
    right: Option<PlayerSlot>,
    left_score: u32,
    right_score: u32,
    countdown: u32,
    winner: Option<PlayerSlot>,
    rng: ChaCha8Rng,
}

/// One authoritative Pong match between two paddle-controlling sides.
///
/// Both participants' registry slots hold the same `Arc<MatchSession>`.
/// Interior state is mutated only by the session's own task and by the
/// join/input handlers, never by another session.
pub struct MatchSession {
    pub id: Uuid,
    pub mode: GameMode,
    pub max_score: u32,
    /// Set when this match belongs to a tournament bracket
    pub tournament_id: Option<Uuid>,
    inner: Mutex<SessionInner>,
}

impl MatchSession {
    /// Remote match waiting for a joiner
    pub fn new_remote(creator: PlayerSlot, max_score: u32, countdown: u32) -> Self {
        Self::build(
            creator,
            None,
            GameMode::Remote,
            max_score,
            countdown,
            None,
            GamePhase::Waiting,
        )
    }

    /// Local match: both paddles bound to the creator's connection, countdown
    /// starts immediately
    pub fn new_local(
        creator: PlayerSlot,
        opponent_alias: String,
        max_score: u32,
        countdown: u32,
    ) -> Self {
        let right = PlayerSlot {
            identity: creator.identity.clone(),
            alias: opponent_alias,
            channel: creator.channel,
        };
        Self::build(
            creator,
            Some(right),
            GameMode::Local,
            max_score,
            countdown,
            None,
            GamePhase::Countdown,
        )
    }

    /// Remote match with both sides already bound (quick match, tournament
    /// rounds). Tournament semifinals start directly in `playing` because the
    /// bracket runs a shared countdown for all four entrants.
    pub fn new_pair(
        left: PlayerSlot,
        right: PlayerSlot,
        max_score: u32,
        countdown: u32,
        tournament_id: Option<Uuid>,
        phase: GamePhase,
    ) -> Self {
        Self::build(
            left,
            Some(right),
            GameMode::Remote,
            max_score,
            countdown,
            tournament_id,
            phase,
        )
    }

    fn build(
        left: PlayerSlot,
        right: Option<PlayerSlot>,
        mode: GameMode,
        max_score: u32,
        countdown: u32,
        tournament_id: Option<Uuid>,
        phase: GamePhase,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(rand::random());
        let ball = Ball::serve(&mut rng);

        Self {
            id: Uuid::new_v4(),
            mode,
            max_score,
            tournament_id,
            inner: Mutex::new(SessionInner {
                phase,
                ball,
                left_paddle: Paddle::left(),
                right_paddle: Paddle::right(),
                left,
                right,
                left_score: 0,
                right_score: 0,
                countdown,
                winner: None,
                rng,
            }),
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.inner.lock().phase
    }

    pub fn owner(&self) -> PlayerSlot {
        self.inner.lock().left.clone()
    }

    /// Identities this session is registered under
    pub fn participants(&self) -> Vec<PlayerSlot> {
        let inner = self.inner.lock();
        let mut slots = vec![inner.left.clone()];
        if let Some(right) = &inner.right {
            if right.identity != inner.left.identity {
                slots.push(right.clone());
            }
        }
        slots
    }

    pub fn winner(&self) -> Option<PlayerSlot> {
        self.inner.lock().winner.clone()
    }

    /// Bind the second player and move to countdown. Fails without mutation
    /// when the session is not waiting or the joiner is the owner.
    pub fn join(&self, joiner: PlayerSlot) -> bool {
        let mut inner = self.inner.lock();
        if inner.phase != GamePhase::Waiting || inner.left.identity == joiner.identity {
            return false;
        }
        inner.right = Some(joiner);
        inner.phase = GamePhase::Countdown;
        true
    }

    /// Apply a paddle movement command. The side comes from the bound
    /// identity in remote mode; the client-supplied hint is honored only for
    /// local sessions where one connection drives both paddles.
    pub fn apply_input(&self, identity: &str, up: bool, paddle: Option<PaddleSide>) {
        let mut inner = self.inner.lock();
        if inner.phase != GamePhase::Playing {
            return;
        }

        let side = match self.mode {
            GameMode::Local => paddle.unwrap_or(PaddleSide::Left),
            GameMode::Remote => {
                if inner.left.identity == identity {
                    PaddleSide::Left
                } else if inner
                    .right
                    .as_ref()
                    .is_some_and(|r| r.identity == identity)
                {
                    PaddleSide::Right
                } else {
                    return;
                }
            }
        };

        let target = match side {
            PaddleSide::Left => &mut inner.left_paddle,
            PaddleSide::Right => &mut inner.right_paddle,
        };
        target.update_pos(up, !up);
    }

    /// Full state snapshot for broadcast
    pub fn snapshot(&self) -> GameSnapshot {
        let inner = self.inner.lock();
        GameSnapshot {
            id: self.id,
            status: inner.phase,
            ball: inner.ball.pos,
            left_paddle: PaddleSnapshot {
                top_point: Point {
                    x: inner.left_paddle.x,
                    y: inner.left_paddle.y,
                },
                height: inner.left_paddle.height,
            },
            right_paddle: PaddleSnapshot {
                top_point: Point {
                    x: inner.right_paddle.x,
                    y: inner.right_paddle.y,
                },
                height: inner.right_paddle.height,
            },
            max_score: self.max_score,
            scores: vec![
                ScoreEntry {
                    alias: inner.left.alias.clone(),
                    score: inner.left_score,
                },
                ScoreEntry {
                    alias: inner
                        .right
                        .as_ref()
                        .map(|r| r.alias.clone())
                        .unwrap_or_default(),
                    score: inner.right_score,
                },
            ],
            countdown: inner.countdown,
        }
    }

    /// Terminal transition. Applies at most once: the disconnect path and the
    /// score-threshold path race here, and only the first caller gets the
    /// result back.
    pub fn finish(&self, winner_side: PaddleSide) -> Option<MatchResult> {
        let mut inner = self.inner.lock();
        if inner.phase == GamePhase::Finished {
            return None;
        }
        inner.phase = GamePhase::Finished;

        let left = inner.left.clone();
        let right = inner.right.clone().unwrap_or_else(|| left.clone());
        let winner = match winner_side {
            PaddleSide::Left => left.clone(),
            PaddleSide::Right => right.clone(),
        };
        inner.winner = Some(winner.clone());

        Some(MatchResult {
            mode: self.mode_label(),
            match_id: self.id,
            left_identity: left.identity,
            right_identity: right.identity,
            left_alias: left.alias,
            right_alias: right.alias,
            winner_identity: winner.identity,
            winner_alias: winner.alias,
            left_score: inner.left_score,
            right_score: inner.right_score,
        })
    }

    pub fn mode_label(&self) -> &'static str {
        if self.tournament_id.is_some() {
            "tournament"
        } else {
            match self.mode {
                GameMode::Local => "local",
                GameMode::Remote => "remote",
            }
        }
    }

    fn slots(&self) -> (PlayerSlot, Option<PlayerSlot>) {
        let inner = self.inner.lock();
        (inner.left.clone(), inner.right.clone())
    }

    fn broadcast(&self, ctx: &SessionContext, msg: ServerMsg) {
        let (left, right) = self.slots();
        ctx.directory.send(&left.identity, msg.clone());
        if let Some(right) = right {
            if right.identity != left.identity {
                ctx.directory.send(&right.identity, msg);
            }
        }
    }

    /// Whether the slot's channel is still the identity's live connection
    fn slot_open(&self, ctx: &SessionContext, slot: &PlayerSlot) -> bool {
        ctx.directory.is_current(&slot.identity, slot.channel)
    }

    /// Run the session to completion: countdown, then the fixed-rate
    /// authoritative tick loop. The spawning service removes the session from
    /// the registry and notifies the owning bracket after this returns.
    pub async fn run(self: Arc<Self>, ctx: SessionContext) {
        info!(match_id = %self.id, mode = self.mode_label(), "match session started");

        if self.phase() == GamePhase::Countdown {
            self.run_countdown(&ctx).await;
        }

        if self.phase() != GamePhase::Playing {
            return;
        }

        // Best-effort initiation record; failure never blocks the match.
        let store = ctx.store.clone();
        let record = self.start_record();
        tokio::spawn(async move {
            if let Err(e) = store.record_start(record).await {
                error!(error = %e, "failed to write match initiation record");
            }
        });

        self.run_ticks(&ctx).await;
    }

    async fn run_countdown(&self, ctx: &SessionContext) {
        let mut remaining = { self.inner.lock().countdown };
        let mut ticker = interval(Duration::from_secs(1));

        loop {
            ticker.tick().await;
            if self.phase() != GamePhase::Countdown {
                return;
            }
            self.broadcast(ctx, ServerMsg::Countdown(CountdownData { value: remaining }));
            if remaining == 0 {
                break;
            }
            remaining -= 1;
            self.inner.lock().countdown = remaining;
        }

        let mut inner = self.inner.lock();
        if inner.phase == GamePhase::Countdown {
            inner.phase = GamePhase::Playing;
        }
    }

    async fn run_ticks(self: &Arc<Self>, ctx: &SessionContext) {
        let mut ticker = interval(tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            match self.phase() {
                GamePhase::Playing => {}
                GamePhase::Paused => continue,
                _ => return,
            }

            // Advance the simulation one tick.
            let threshold_reached = {
                let mut inner = self.inner.lock();
                let SessionInner {
                    ball,
                    left_paddle,
                    right_paddle,
                    left_score,
                    right_score,
                    rng,
                    ..
                } = &mut *inner;

                if let Some(side) = simulation::step(ball, left_paddle, right_paddle) {
                    match side {
                        PaddleSide::Left => *left_score += 1,
                        PaddleSide::Right => *right_score += 1,
                    }
                    ball.reset(rng);
                }

                *left_score >= self.max_score || *right_score >= self.max_score
            };

            // (a) Connectivity first: a vanished channel ends the match in the
            // other side's favor even if a goal landed this tick.
            let (left, right) = self.slots();
            if !self.slot_open(ctx, &left) {
                self.finish_and_report(ctx, PaddleSide::Right, "opponent disconnected")
                    .await;
                return;
            }
            match &right {
                Some(right) if self.slot_open(ctx, right) => {}
                _ => {
                    self.finish_and_report(ctx, PaddleSide::Left, "opponent disconnected")
                        .await;
                    return;
                }
            }

            // (b) Score threshold.
            if threshold_reached {
                let winner = {
                    let inner = self.inner.lock();
                    if inner.left_score > inner.right_score {
                        PaddleSide::Left
                    } else {
                        PaddleSide::Right
                    }
                };
                self.finish_and_report(ctx, winner, "score limit reached").await;
                return;
            }

            // Push the full snapshot to both participants, strictly
            // tick-ordered.
            let snapshot = self.snapshot();
            self.broadcast(ctx, ServerMsg::GameState(GameStateData { game: snapshot }));
        }
    }

    async fn finish_and_report(&self, ctx: &SessionContext, winner: PaddleSide, reason: &str) {
        let Some(result) = self.finish(winner) else {
            return;
        };

        info!(
            match_id = %self.id,
            winner = %result.winner_alias,
            left_score = result.left_score,
            right_score = result.right_score,
            reason,
            "match finished"
        );

        self.broadcast(
            ctx,
            ServerMsg::GameOver(NoticeData {
                value: format!("{} wins ({})", result.winner_alias, reason),
            }),
        );

        if let Err(e) = ctx.store.persist_result(&result).await {
            error!(match_id = %self.id, error = %e, "failed to persist match result");
        }
    }

    fn start_record(&self) -> MatchResult {
        let (left, right) = self.slots();
        let right = right.unwrap_or_else(|| left.clone());
        MatchResult {
            mode: self.mode_label(),
            match_id: self.id,
            left_identity: left.identity,
            right_identity: right.identity,
            left_alias: left.alias,
            right_alias: right.alias,
            winner_identity: String::new(),
            winner_alias: String::new(),
            left_score: 0,
            right_score: 0,
        }
    }
}
