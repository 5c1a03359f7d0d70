//! Fixed-capacity channel pool.
//!
//! Slot layout: `[0, NUM_AMBIENTS)` ambient slots, then the dynamic slots
//! handed out by [`ChannelPool::pick`], then static world loops appended by
//! [`ChannelPool::add_static`] up to the pool capacity.

use std::collections::HashMap;
use std::ops::Range;

use asset_manager::SoundId;
use glam::Vec3;
use rand::Rng;
use tracing::debug;

use crate::error::AudioError;
use crate::spatializer::{self, Listener, SpatialContext};

/// Water, sky, slime, lava.
pub const NUM_AMBIENTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntityId(pub i32);

impl EntityId {
    /// Owner of static world sounds.
    pub const WORLD: EntityId = EntityId(0);
}

/// Per-entity channel number chosen by the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LogicalChannel(pub i32);

impl LogicalChannel {
    /// Never overrides another sound of the same entity.
    pub const AUTO: LogicalChannel = LogicalChannel(0);
    /// Overrides any sound of the same entity.
    pub const ANY: LogicalChannel = LogicalChannel(-1);
    /// Voice chat, played at full volume.
    pub const VOICE: LogicalChannel = LogicalChannel(-2);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub usize);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Channel {
    pub emitter: EntityId,
    pub logical: LogicalChannel,
    pub sound: Option<SoundId>,
    pub origin: Vec3,
    pub dist_mult: f32,
    /// 0..=255
    pub master_vol: i32,
    pub left: i32,
    pub right: i32,
    /// Read position in frames.
    pub pos: i64,
    pub end_time: u64,
    pub looping: bool,
    /// Pool tick the sound was started in.
    pub start_tick: u64,
}

impl Channel {
    pub fn is_active(&self) -> bool {
        self.sound.is_some()
    }

    pub fn is_audible(&self) -> bool {
        self.is_active() && (self.left > 0 || self.right > 0)
    }

    fn remaining(&self, painted: u64) -> i64 {
        self.end_time as i64 - painted as i64
    }
}

#[derive(Debug, Clone)]
pub struct ChannelPool {
    channels: Vec<Channel>,
    dynamic: usize,
    /// Slots in use: ambients, dynamics and the statics added so far.
    total: usize,
    tick: u64,
}

impl ChannelPool {
    pub fn new(dynamic: usize, capacity: usize) -> Self {
        let capacity = capacity.max(NUM_AMBIENTS + dynamic);
        Self { channels: vec![Channel::default(); capacity], dynamic, total: NUM_AMBIENTS + dynamic, tick: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.channels.len()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Current tick, stamped on sounds as they start.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Begin a new tick. Sounds started from here on no longer count as
    /// twins of the ones started before.
    pub fn advance_tick(&mut self) {
        self.tick += 1;
    }

    pub fn ambient_range(&self) -> Range<usize> {
        0..NUM_AMBIENTS
    }

    pub fn dynamic_range(&self) -> Range<usize> {
        NUM_AMBIENTS..NUM_AMBIENTS + self.dynamic
    }

    pub fn static_range(&self) -> Range<usize> {
        NUM_AMBIENTS + self.dynamic..self.total
    }

    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels[..self.total].get(id.0)
    }

    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels[..self.total].get_mut(id.0)
    }

    /// Every slot in use, in mixing order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels[..self.total]
    }

    pub fn channels_mut(&mut self) -> &mut [Channel] {
        &mut self.channels[..self.total]
    }

    pub fn ambients_mut(&mut self) -> &mut [Channel] {
        &mut self.channels[..NUM_AMBIENTS]
    }

    /// Choose the dynamic slot a new sound from `emitter` should play on.
    ///
    /// A non-`AUTO` request replaces the same entity's sound on that channel
    /// (or on any channel for `ANY`). Otherwise the slot closest to finishing
    /// is taken, never stealing an active sound of the view entity for another
    /// entity. The chosen slot's sound is cleared.
    pub fn pick(
        &mut self,
        emitter: EntityId,
        logical: LogicalChannel,
        view_entity: EntityId,
        painted: u64,
    ) -> Option<ChannelId> {
        let mut first_to_die = None;
        let mut life_left = i64::MAX;

        for idx in self.dynamic_range() {
            let ch = &self.channels[idx];
            if logical != LogicalChannel::AUTO
                && ch.emitter == emitter
                && (ch.logical == logical || logical == LogicalChannel::ANY)
            {
                first_to_die = Some(idx);
                break;
            }

            // don't let monster sounds override player sounds
            if ch.emitter == view_entity && emitter != view_entity && ch.is_active() {
                continue;
            }

            let left = ch.remaining(painted);
            if left < life_left {
                life_left = left;
                first_to_die = Some(idx);
            }
        }

        match first_to_die {
            Some(idx) => {
                self.channels[idx].sound = None;
                Some(ChannelId(idx))
            }
            None => {
                debug!(emitter = emitter.0, "no free channel");
                None
            }
        }
    }

    /// Silence the first dynamic slot playing for `emitter` on `logical`.
    pub fn stop(&mut self, emitter: EntityId, logical: LogicalChannel) -> bool {
        let range = self.dynamic_range();
        if let Some(ch) = self.channels[range]
            .iter_mut()
            .find(|c| c.emitter == emitter && c.logical == logical)
        {
            ch.end_time = 0;
            ch.sound = None;
            return true;
        }
        false
    }

    /// Reset every slot and drop all statics.
    pub fn stop_all(&mut self) {
        self.channels.iter_mut().for_each(|c| *c = Channel::default());
        self.total = NUM_AMBIENTS + self.dynamic;
    }

    /// Append a static world sound.
    pub fn add_static(&mut self, channel: Channel) -> Result<ChannelId, AudioError> {
        if self.total == self.channels.len() {
            return Err(AudioError::StaticCapacity);
        }
        let idx = self.total;
        self.channels[idx] = channel;
        self.total += 1;
        Ok(ChannelId(idx))
    }

    /// Another dynamic slot started `sound` during the current tick and has
    /// not advanced yet.
    pub fn has_same_tick_twin(&self, id: ChannelId, sound: SoundId) -> bool {
        self.dynamic_range().filter(|&i| i != id.0).any(|i| {
            let ch = &self.channels[i];
            ch.sound == Some(sound) && ch.start_tick == self.tick && ch.pos == 0
        })
    }

    /// Push a freshly started channel forward by a random amount so identical
    /// sounds triggered together don't stack. Returns the skip applied.
    pub fn offset_duplicate<R: Rng + ?Sized>(
        &mut self,
        id: ChannelId,
        sound_length: u64,
        device_rate: u32,
        rng: &mut R,
    ) -> u64 {
        let Some(sound) = self.get(id).and_then(|c| c.sound) else {
            return 0;
        };
        if !self.has_same_tick_twin(id, sound) {
            return 0;
        }
        let bound = ((0.1 * device_rate as f64) as u64).min(sound_length);
        let skip = if bound > 0 { rng.random_range(0..bound) } else { 0 };
        let ch = &mut self.channels[id.0];
        ch.pos += skip as i64;
        ch.end_time = ch.end_time.saturating_sub(skip);
        skip
    }

    /// Respatialize dynamic and static slots, folding identical statics into
    /// the first static slot carrying the same sound.
    pub fn spatialize_all(&mut self, listener: &Listener, ctx: &SpatialContext) {
        let statics_from = NUM_AMBIENTS + self.dynamic;
        let mut first_static: HashMap<SoundId, usize> = HashMap::new();

        for i in NUM_AMBIENTS..self.total {
            let Some(sound) = self.channels[i].sound else {
                continue;
            };
            spatializer::apply(&mut self.channels[i], listener, ctx);
            if i < statics_from {
                continue;
            }
            let first = *first_static.entry(sound).or_insert(i);
            if first != i && self.channels[i].is_audible() {
                let (l, r) = (self.channels[i].left, self.channels[i].right);
                let head = &mut self.channels[first];
                head.left = head.left.saturating_add(l);
                head.right = head.right.saturating_add(r);
                let ch = &mut self.channels[i];
                ch.left = 0;
                ch.right = 0;
            }
        }
    }

    /// Clear finished one-shot dynamic sounds.
    pub fn retire_expired(&mut self, painted: u64) -> usize {
        let range = self.dynamic_range();
        let mut n = 0;
        for ch in &mut self.channels[range] {
            if ch.is_active() && !ch.looping && ch.end_time <= painted {
                ch.sound = None;
                n += 1;
            }
        }
        n
    }

    /// Slots currently producing sound.
    pub fn audible_count(&self) -> usize {
        self.channels().iter().filter(|c| c.is_audible()).count()
    }
}
