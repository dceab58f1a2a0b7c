//! Direct-line pursuit of the follow target, run once per state tick.
//!
//! Yaw convention: zero faces +Z and increases toward +X, so the heading to a
//! displacement `(dx, dz)` is `atan2(dx, dz)`.

use std::f64::consts::{PI, TAU};

use glam::DVec3;
use shared::protocol::EntityPose;

use crate::avatar::AvatarState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PursuitParams {
    /// Horizontal stand-off kept from the target.
    pub follow_distance: f64,
    /// Fraction of the remaining gap closed per tick.
    pub follow_speed: f64,
    /// Fraction of the heading error corrected per tick.
    pub smoothing_factor: f64,
}

impl Default for PursuitParams {
    fn default() -> Self {
        Self {
            follow_distance: 2.0,
            follow_speed: 0.2,
            smoothing_factor: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PursuitOutcome {
    Idle,
    TargetAbsent,
    Moved,
    /// Target sits exactly on the bot (or the input is non-finite); pose kept.
    Degenerate,
}

/// Wraps `angle` into `(-PI, PI]`.
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Scans `snapshot` for the current target and steers toward it.
pub fn apply_snapshot(
    state: &mut AvatarState,
    snapshot: &[EntityPose],
    params: &PursuitParams,
) -> PursuitOutcome {
    if !state.is_following() {
        return PursuitOutcome::Idle;
    }
    let target_id = state.target_id;
    let mut outcome = PursuitOutcome::TargetAbsent;
    for entity in snapshot.iter().filter(|e| e.entity_id == target_id) {
        outcome = step(state, entity, params);
    }
    outcome
}

/// One pursuit update toward `target`.
pub fn step(
    state: &mut AvatarState,
    target: &EntityPose,
    params: &PursuitParams,
) -> PursuitOutcome {
    let pose = &mut state.pose;
    let bot = DVec3::new(pose.x, pose.y, pose.z);
    let delta = DVec3::new(target.x, target.y, target.z) - bot;
    let distance = delta.length();

    if !distance.is_finite() || distance == 0.0 {
        return PursuitOutcome::Degenerate;
    }

    let mut offset = delta / distance * params.follow_distance;
    offset.y = 0.0;
    let next = bot + (delta - offset) * params.follow_speed;

    let target_yaw = delta.x.atan2(delta.z);
    let angle_difference = normalize_angle(target_yaw - pose.yaw);
    let next_yaw = if angle_difference.abs() < PI {
        pose.yaw + angle_difference * params.smoothing_factor
    } else {
        target_yaw
    };

    pose.x = next.x;
    pose.y = next.y;
    pose.z = next.z;
    pose.yaw = next_yaw;
    PursuitOutcome::Moved
}

#[cfg(test)]
#[path = "tests/pursuit_tests.rs"]
mod tests;
