//! Stereo panning and distance attenuation.

use glam::Vec3;

use crate::channel::{Channel, EntityId, LogicalChannel};

/// Attenuation 1.0 fades a sound out completely at this many world units.
pub const NOMINAL_CLIP_DIST: f32 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Listener {
    pub origin: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

impl Default for Listener {
    fn default() -> Self {
        Self { origin: Vec3::ZERO, forward: Vec3::X, right: Vec3::NEG_Y, up: Vec3::Z }
    }
}

impl Listener {
    pub fn at(origin: Vec3) -> Self {
        Self { origin, ..Default::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialContext {
    /// Entity the listener is attached to; its sounds are never attenuated.
    pub view_entity: EntityId,
    pub mono: bool,
    pub voice_volume_scale: f32,
}

impl Default for SpatialContext {
    fn default() -> Self {
        Self { view_entity: EntityId(0), mono: false, voice_volume_scale: 1.0 }
    }
}

/// Left and right gains for `ch`. Both are `>= 0`.
pub fn spatialize(ch: &Channel, listener: &Listener, ctx: &SpatialContext) -> (i32, i32) {
    if ch.logical == LogicalChannel::VOICE || ch.emitter == ctx.view_entity {
        let v = (ch.master_vol as f32 * ctx.voice_volume_scale) as i32;
        return (v.max(0), v.max(0));
    }

    let offset = ch.origin - listener.origin;
    let dist = offset.length() * ch.dist_mult;
    let dot = listener.right.dot(offset.normalize_or_zero());

    let (lscale, rscale) = if ctx.mono { (1.0, 1.0) } else { (1.0 - dot, 1.0 + dot) };

    let gain = |side: f32| -> i32 {
        let v = (ch.master_vol as f32 * (1.0 - dist) * side * ctx.voice_volume_scale) as i32;
        v.max(0)
    };
    (gain(lscale), gain(rscale))
}

/// Spatialize in place.
pub fn apply(ch: &mut Channel, listener: &Listener, ctx: &SpatialContext) {
    let (l, r) = spatialize(ch, listener, ctx);
    ch.left = l;
    ch.right = r;
}
