//! Reusable sliced-image instances, keyed by layer content fingerprint.
//!
//! A Spine attachment can only sit in one slot at a time, so every simultaneous occurrence of
//! the same content needs its own instance. Instances are recycled once their display interval
//! ([`FramePoint`]) has ended.

use crate::{Error, KeyframeLayer};
use std::collections::{HashMap, VecDeque};

/// Frame interval during which a pooled instance is displayed. Both ends are `-1` when idle.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct FramePoint {
    pub start: i32,
    pub end: i32,
}

impl FramePoint {
    pub const IDLE: FramePoint = FramePoint { start: -1, end: -1 };

    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn is_idle(&self) -> bool {
        *self == Self::IDLE
    }
}

impl Default for FramePoint {
    fn default() -> Self {
        Self::IDLE
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PoolId(usize);

#[derive(Clone, Debug)]
pub struct PoolData {
    pub fingerprint: u64,
    pub tex_id: u32,
    /// Frame at which the instance was first displayed.
    pub created_frame: u32,
    pub copy_index: u32,
    /// Slot / attachment name reserved when the instance was created.
    pub name: String,
    /// Baseline slot order key: `frame*1000 + tex*100 + skin*10 + copy`, taken from the base
    /// skin at creation.
    pub order_key: u64,
    pub frame_point: FramePoint,
}

impl PoolData {
    /// Image name of this instance for texture variant `skin_index`.
    pub fn image_name(&self, skin_index: usize) -> String {
        format!("{}_s{skin_index}", self.name)
    }
}

#[derive(Debug, Default)]
struct Bucket {
    used: Vec<PoolId>,
    unused: VecDeque<PoolId>,
}

/// Result of [`ResourcePool::get`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Acquired {
    pub id: PoolId,
    /// The instance is new: its slot, skins and images still have to be emitted.
    pub created: bool,
}

#[derive(Debug)]
pub struct ResourcePool {
    instances: Vec<PoolData>,
    buckets: HashMap<u64, Bucket>,
    ceiling: usize,
}

impl Default for ResourcePool {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CEILING)
    }
}

impl ResourcePool {
    pub const DEFAULT_CEILING: usize = 150;

    pub fn new(ceiling: usize) -> Self {
        Self {
            instances: Vec::new(),
            buckets: HashMap::new(),
            ceiling: ceiling.max(1),
        }
    }

    /// Takes an idle instance for `layer` (or creates one) and marks it active for
    /// `frame_point`.
    pub fn get(&mut self, layer: &KeyframeLayer, frame_point: FramePoint) -> Result<Acquired, Error> {
        let bucket = self.buckets.entry(layer.fingerprint).or_default();

        let (id, created) = match bucket.unused.pop_front() {
            Some(id) => (id, false),
            None => {
                if bucket.used.len() >= self.ceiling {
                    return Err(Error::PoolExhausted {
                        fingerprint: layer.fingerprint,
                        limit: self.ceiling,
                    });
                }
                let copy_index = bucket.used.len() as u32;
                let created_frame = u32::try_from(frame_point.start).unwrap_or(0);
                let id = PoolId(self.instances.len());
                self.instances.push(PoolData {
                    fingerprint: layer.fingerprint,
                    tex_id: layer.tex_id,
                    created_frame,
                    copy_index,
                    name: resource_name(layer, copy_index),
                    order_key: order_key(created_frame, layer.tex_id, 0, copy_index),
                    frame_point: FramePoint::IDLE,
                });
                tracing::trace!(name = %self.instances[id.0].name, "created pool instance");
                (id, true)
            }
        };

        let data = &mut self.instances[id.0];
        if !data.frame_point.is_idle() {
            return Err(Error::PoolInvariant {
                name: data.name.clone(),
                start: data.frame_point.start,
                end: data.frame_point.end,
            });
        }
        data.frame_point = frame_point;
        bucket.used.push(id);
        Ok(Acquired { id, created })
    }

    /// The active instance of `layer` displayed exactly over `frame_point`.
    pub fn find(&self, layer: &KeyframeLayer, frame_point: FramePoint) -> Result<PoolId, Error> {
        self.buckets
            .get(&layer.fingerprint)
            .and_then(|bucket| {
                bucket
                    .used
                    .iter()
                    .copied()
                    .find(|id| self.instances[id.0].frame_point == frame_point)
            })
            .ok_or(Error::PoolMiss {
                fingerprint: layer.fingerprint,
                start: frame_point.start,
                end: frame_point.end,
            })
    }

    /// Returns an active instance to the idle set.
    pub fn release(&mut self, layer: &KeyframeLayer, id: PoolId) -> Result<(), Error> {
        let data = &mut self.instances[id.0];
        let miss = Error::PoolMiss {
            fingerprint: layer.fingerprint,
            start: data.frame_point.start,
            end: data.frame_point.end,
        };
        let Some(bucket) = self.buckets.get_mut(&layer.fingerprint) else {
            return Err(miss);
        };
        let Some(pos) = bucket.used.iter().position(|u| *u == id) else {
            return Err(miss);
        };
        bucket.used.remove(pos);
        data.frame_point = FramePoint::IDLE;
        bucket.unused.push_back(id);
        Ok(())
    }

    pub fn data(&self, id: PoolId) -> &PoolData {
        &self.instances[id.0]
    }

    /// Number of instances ever created for `fingerprint`.
    pub fn created_count(&self, fingerprint: u64) -> usize {
        self.buckets
            .get(&fingerprint)
            .map(|b| b.used.len() + b.unused.len())
            .unwrap_or(0)
    }

    pub fn active_count(&self, fingerprint: u64) -> usize {
        self.buckets
            .get(&fingerprint)
            .map(|b| b.used.len())
            .unwrap_or(0)
    }

    pub fn instances(&self) -> &[PoolData] {
        &self.instances
    }
}

fn order_key(frame: u32, tex_id: u32, skin_index: u32, copy_index: u32) -> u64 {
    u64::from(frame) * 1000
        + u64::from(tex_id) * 100
        + u64::from(skin_index) * 10
        + u64::from(copy_index)
}

fn resource_name(layer: &KeyframeLayer, copy_index: u32) -> String {
    if layer.is_fog() {
        format!("fog_{:016x}_{copy_index}", layer.fingerprint)
    } else {
        format!("t{}_{:016x}_{copy_index}", layer.tex_id, layer.fingerprint)
    }
}
