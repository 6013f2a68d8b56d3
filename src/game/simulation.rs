//! Pong ball and paddle physics
//!
//! Pure state transitions, no I/O. All coordinates are normalized fractions
//! of the playfield (`[0,1]`), so the simulation is independent of any client
//! viewport size.

use rand::Rng;

use crate::ws::protocol::{PaddleSide, Point};

/// Fraction of playfield height covered by a paddle
pub const PADDLE_HEIGHT: f32 = 0.2;
/// Fixed per-move paddle step
pub const PADDLE_STEP: f32 = 0.01;
/// Paddle thickness along the x axis
pub const PADDLE_THICKNESS: f32 = 0.01;
pub const LEFT_PADDLE_X: f32 = 0.0;
pub const RIGHT_PADDLE_X: f32 = 0.99;
pub const BALL_RADIUS: f32 = 0.01;
/// Scalar speed multiplier at serve; never decreases within a rally
pub const SERVE_SPEED: f32 = 1.3;

const SERVE_VELOCITY_MIN: f32 = 0.001;
const SERVE_VELOCITY_MAX: f32 = 0.005;

/// The ball: normalized position, per-tick velocity and a scalar speed
/// multiplier that resets with every serve.
#[derive(Debug, Clone, PartialEq)]
pub struct Ball {
    pub pos: Point,
    pub vx: f32,
    pub vy: f32,
    pub radius: f32,
    pub speed: f32,
}

impl Ball {
    /// Serve from the center with a random direction. Each velocity component
    /// gets an independent random sign and a small magnitude.
    pub fn serve(rng: &mut impl Rng) -> Self {
        Self {
            pos: Point { x: 0.5, y: 0.5 },
            vx: random_component(rng),
            vy: random_component(rng),
            radius: BALL_RADIUS,
            speed: SERVE_SPEED,
        }
    }

    /// Reset after a goal: back to center, fresh random velocity, speed
    /// multiplier back to the serve value.
    pub fn reset(&mut self, rng: &mut impl Rng) {
        *self = Self::serve(rng);
    }
}

fn random_component(rng: &mut impl Rng) -> f32 {
    let magnitude = rng.gen_range(SERVE_VELOCITY_MIN..SERVE_VELOCITY_MAX);
    if rng.gen_bool(0.5) {
        magnitude
    } else {
        -magnitude
    }
}

/// A paddle: fixed x per side, mutable top point y.
/// Invariant: `0 <= y && y + height <= 1` after every move.
#[derive(Debug, Clone, PartialEq)]
pub struct Paddle {
    pub x: f32,
    pub y: f32,
    pub height: f32,
    step: f32,
}

impl Paddle {
    pub fn left() -> Self {
        Self::at(LEFT_PADDLE_X)
    }

    pub fn right() -> Self {
        Self::at(RIGHT_PADDLE_X)
    }

    fn at(x: f32) -> Self {
        Self {
            x,
            y: 0.5,
            height: PADDLE_HEIGHT,
            step: PADDLE_STEP,
        }
    }

    /// Apply movement commands. Each direction is evaluated independently
    /// with its own bound check before the step is applied; contradictory
    /// input has no precedence rule.
    pub fn update_pos(&mut self, up: bool, down: bool) {
        if up && self.y - self.step >= 0.0 {
            self.y -= self.step;
        }
        if down && self.y + self.height + self.step <= 1.0 {
            self.y += self.step;
        }
    }

    pub fn reset(&mut self) {
        self.y = 0.5;
    }

    fn covers(&self, y: f32) -> bool {
        y >= self.y && y <= self.y + self.height
    }
}

/// Advance the ball one tick against the two paddles.
///
/// Returns `Some(side)` naming the scoring side when the ball crossed the
/// left or right edge without a paddle collision. On a goal both paddles
/// recenter for the next serve; the caller resets the ball.
pub fn step(ball: &mut Ball, left: &mut Paddle, right: &mut Paddle) -> Option<PaddleSide> {
    ball.pos.x += ball.vx * ball.speed;
    ball.pos.y += ball.vy * ball.speed;

    // Paddle collision: the leading edge crosses the paddle plane while the
    // ball's y is within the paddle span. Horizontal velocity flips, no
    // energy change.
    if ball.vx < 0.0
        && ball.pos.x - ball.radius <= left.x + PADDLE_THICKNESS
        && left.covers(ball.pos.y)
    {
        ball.vx = -ball.vx;
        return None;
    }
    if ball.vx > 0.0 && ball.pos.x + ball.radius >= right.x && right.covers(ball.pos.y) {
        ball.vx = -ball.vx;
        return None;
    }

    // Vertical walls
    if ball.pos.y < 0.0 || ball.pos.y > 1.0 {
        ball.vy = -ball.vy;
    }

    // Goal: ball left the playfield with no paddle hit this tick
    if ball.pos.x < 0.0 {
        left.reset();
        right.reset();
        return Some(PaddleSide::Right);
    }
    if ball.pos.x > 1.0 {
        left.reset();
        right.reset();
        return Some(PaddleSide::Left);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn paddle_stays_in_bounds_for_any_move_sequence() {
        let mut rng = rng();
        let mut paddle = Paddle::left();

        for _ in 0..10_000 {
            let up = rng.gen_bool(0.5);
            let down = rng.gen_bool(0.5);
            paddle.update_pos(up, down);

            assert!(paddle.y >= 0.0, "paddle top out of bounds: {}", paddle.y);
            assert!(
                paddle.y + paddle.height <= 1.0,
                "paddle bottom out of bounds: {}",
                paddle.y + paddle.height
            );
        }
    }

    #[test]
    fn paddle_move_is_rejected_not_clamped() {
        let mut paddle = Paddle::left();
        paddle.y = 0.005; // less than one step from the top

        paddle.update_pos(true, false);
        // The step would overshoot, so nothing is applied.
        assert_eq!(paddle.y, 0.005);
    }

    #[test]
    fn contradictory_input_applies_both_checks_independently() {
        let mut paddle = Paddle::left();
        paddle.y = 0.4;

        paddle.update_pos(true, true);
        // Both directions pass their bound checks and cancel out.
        assert!((paddle.y - 0.4).abs() < f32::EPSILON);

        paddle.y = 0.0; // pinned to the top: only down can move
        paddle.update_pos(true, true);
        assert!((paddle.y - PADDLE_STEP).abs() < f32::EPSILON);
    }

    #[test]
    fn left_paddle_collision_flips_horizontal_velocity() {
        let mut left = Paddle::left();
        let mut right = Paddle::right();
        let mut ball = Ball {
            pos: Point { x: 0.03, y: 0.55 },
            vx: -0.02,
            vy: 0.0,
            radius: BALL_RADIUS,
            speed: 1.0,
        };

        let event = step(&mut ball, &mut left, &mut right);
        assert!(event.is_none());
        assert!(ball.vx > 0.0);
    }

    #[test]
    fn collision_requires_vertical_overlap() {
        let mut left = Paddle::left(); // spans [0.5, 0.7]
        let mut right = Paddle::right();
        let mut ball = Ball {
            pos: Point { x: 0.03, y: 0.1 },
            vx: -0.02,
            vy: 0.0,
            radius: BALL_RADIUS,
            speed: 1.0,
        };

        // Misses the paddle; keeps travelling left until it crosses the edge.
        assert!(step(&mut ball, &mut left, &mut right).is_none());
        assert!(ball.vx < 0.0);
        let event = step(&mut ball, &mut left, &mut right);
        assert_eq!(event, Some(PaddleSide::Right));
    }

    #[test]
    fn vertical_walls_flip_vertical_velocity() {
        let mut left = Paddle::left();
        let mut right = Paddle::right();
        let mut ball = Ball {
            pos: Point { x: 0.5, y: 0.005 },
            vx: 0.0,
            vy: -0.01,
            radius: BALL_RADIUS,
            speed: 1.0,
        };

        assert!(step(&mut ball, &mut left, &mut right).is_none());
        assert!(ball.vy > 0.0);
    }

    #[test]
    fn crossing_right_edge_scores_for_left() {
        let mut left = Paddle::left();
        let mut right = Paddle::right();
        right.y = 0.0; // move the paddle away from the ball's path

        let mut ball = Ball {
            pos: Point { x: 0.995, y: 0.6 },
            vx: 0.02,
            vy: 0.0,
            radius: BALL_RADIUS,
            speed: 1.0,
        };

        let event = step(&mut ball, &mut left, &mut right);
        assert_eq!(event, Some(PaddleSide::Left));
    }

    #[test]
    fn goal_recenters_both_paddles() {
        let mut left = Paddle::left();
        let mut right = Paddle::right();
        left.y = 0.1;
        right.y = 0.0;

        let mut ball = Ball {
            pos: Point { x: 0.995, y: 0.6 },
            vx: 0.02,
            vy: 0.0,
            radius: BALL_RADIUS,
            speed: 1.0,
        };

        assert_eq!(step(&mut ball, &mut left, &mut right), Some(PaddleSide::Left));
        assert_eq!(left.y, 0.5);
        assert_eq!(right.y, 0.5);
    }

    #[test]
    fn no_score_event_while_ball_in_field() {
        let mut left = Paddle::left();
        let mut right = Paddle::right();
        let mut ball = Ball {
            pos: Point { x: 0.5, y: 0.5 },
            vx: 0.004,
            vy: 0.002,
            radius: BALL_RADIUS,
            speed: SERVE_SPEED,
        };

        for _ in 0..50 {
            assert_eq!(step(&mut ball, &mut left, &mut right), None);
        }
    }

    #[test]
    fn serve_velocity_within_expected_range() {
        let mut rng = rng();
        for _ in 0..100 {
            let ball = Ball::serve(&mut rng);
            assert_eq!(ball.pos, Point { x: 0.5, y: 0.5 });
            assert_eq!(ball.speed, SERVE_SPEED);
            for v in [ball.vx, ball.vy] {
                let mag = v.abs();
                assert!((SERVE_VELOCITY_MIN..SERVE_VELOCITY_MAX).contains(&mag));
            }
        }
    }

    #[test]
    fn reset_restores_serve_distribution() {
        let mut rng = rng();
        let mut ball = Ball::serve(&mut rng);
        ball.pos = Point { x: 0.9, y: 0.1 };
        ball.speed = 2.0;

        ball.reset(&mut rng);
        assert_eq!(ball.pos, Point { x: 0.5, y: 0.5 });
        assert_eq!(ball.speed, SERVE_SPEED);
    }
}
