//! Builds the Spine document from combined skeleton event streams.

use crate::geometry::Triangulator;
use crate::math::{Matrix, quad_multiply, quad_multiply_perspective};
use crate::{
    AnimationData, AnimationEntry, AttachmentEntry, AttachmentKey, BlendMode, BoneEntry,
    BoundingBoxEntry, ConvertOptions, DeformKey, DrawOrderKey, DrawOrderOffset, Error,
    ImageSlicer, KeyframeLayer, LinkedMeshEntry, MeshEntry, PoolId, QUAD_FPS, QuadDocument,
    ResourcePool, SkeletonHeader, SkinEntry, SliceRequest, SlotEntry, SpineDocument, Span,
    Target,
};
use std::collections::{BTreeMap, HashMap};

pub const ROOT_BONE: &str = "root";
pub const HITBOX_SKIN: &str = "Hitbox";

/// Spine time of a combined frame key.
///
/// Frame 0 maps to the start of the animation; later keys land at the end of their frame.
pub fn frame_time(frame: u32) -> f32 {
    if frame == 0 {
        0.0
    } else {
        (frame + 1) as f32 / QUAD_FPS
    }
}

#[derive(Clone, Debug)]
struct SlotRecord {
    name: String,
    blend: BlendMode,
    order_key: u64,
    hitbox: bool,
}

#[derive(Clone, Debug)]
struct PendingAnimation {
    name: String,
    entry: AnimationEntry,
    /// Visible keyframe slots after each frame key, in draw order.
    draw_frames: Vec<(f32, Vec<String>)>,
}

type SkinMap = BTreeMap<String, BTreeMap<String, BTreeMap<String, AttachmentEntry>>>;

/// Key of a visible layer: (bone, render position).
type LayerKey = (usize, usize);

pub struct Assembler<'a> {
    doc: &'a QuadDocument,
    options: &'a ConvertOptions,
    slicer: &'a dyn ImageSlicer,
    pool: ResourcePool,
    slots: Vec<SlotRecord>,
    slot_index: HashMap<String, usize>,
    skins: SkinMap,
    animations: Vec<PendingAnimation>,
    slices: Vec<SliceRequest>,
}

impl<'a> Assembler<'a> {
    pub fn new(
        doc: &'a QuadDocument,
        options: &'a ConvertOptions,
        slicer: &'a dyn ImageSlicer,
    ) -> Self {
        Self {
            doc,
            options,
            slicer,
            pool: ResourcePool::new(options.pool_ceiling),
            slots: Vec::new(),
            slot_index: HashMap::new(),
            skins: SkinMap::new(),
            animations: Vec::new(),
            slices: Vec::new(),
        }
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    /// Slice requests reserved since the last call.
    pub fn take_slice_requests(&mut self) -> Vec<SliceRequest> {
        std::mem::take(&mut self.slices)
    }

    /// Emits the animation of one combined skeleton.
    #[tracing::instrument(skip_all, fields(skeleton = data.skeleton))]
    pub fn assemble_skeleton(&mut self, data: &AnimationData) -> Result<(), Error> {
        let doc = self.doc;
        let Some(skeleton) = doc.skeleton(data.skeleton) else {
            return Err(Error::InvalidValue {
                message: format!("combined data for unknown skeleton {}", data.skeleton),
            });
        };

        let mut entry = AnimationEntry::default();
        let mut visible = BTreeMap::<LayerKey, String>::new();
        let mut draw_frames = Vec::with_capacity(data.frames.len());

        for (&frame, events) in &data.frames {
            let time = frame_time(frame);
            // Conceal first so instances freed at this frame can be shown again right away.
            for &si in &events.concealed {
                self.conceal(&data.spans[si], time, &mut entry, &mut visible)?;
            }
            for &si in &events.displayed {
                self.display(&data.spans[si], time, &mut entry, &mut visible)?;
            }
            draw_frames.push((time, visible.values().cloned().collect()));
        }

        let mut name = skeleton.name.clone();
        if data.is_mix {
            name.push_str("_MIX");
        }
        if data.is_loop {
            name.push_str("_LOOP");
        }
        if entry.slots.is_empty() {
            name.push_str("_EMPTY");
        }
        if self.animations.iter().any(|a| a.name == name) {
            name = format!("{name}_{}", skeleton.id);
        }

        tracing::debug!(
            animation = %name,
            slots = entry.slots.len(),
            frames = draw_frames.len(),
            "assembled animation"
        );
        self.animations.push(PendingAnimation {
            name,
            entry,
            draw_frames,
        });
        Ok(())
    }

    fn display(
        &mut self,
        span: &Span,
        time: f32,
        entry: &mut AnimationEntry,
        visible: &mut BTreeMap<LayerKey, String>,
    ) -> Result<(), Error> {
        let doc = self.doc;
        let curve = if span.keyframe_mix {
            None
        } else {
            Some("stepped")
        };

        if let Target::HitBox(h) = span.target {
            let Some(hitbox) = doc.hitbox(h) else {
                return Ok(());
            };
            for (ri, rect) in hitbox.rects.iter().enumerate() {
                let name = hitbox_slot_name(hitbox.id, ri, &rect.name);
                self.register_hitbox(&name);
                push_deform(
                    entry,
                    HITBOX_SKIN,
                    &name,
                    DeformKey {
                        time,
                        vertices: rect.quad.to_vec(),
                        curve,
                    },
                );
                push_attachment(entry, &name, time, Some(name.clone()));
            }
            return Ok(());
        }

        let Some(keyframe) = doc.displayed_keyframe(span.target) else {
            if !span.target.is_none() {
                tracing::debug!(attach = ?span.target, "timeline attach has nothing to display");
            }
            return Ok(());
        };

        let identity;
        let matrix = match self.timeline_matrix(span) {
            Some(m) => m,
            None => {
                identity = Matrix::identity4();
                &identity
            }
        };
        let perspective = self.options.perspective_mix && span.matrix_mix;

        for (pos, layer) in keyframe.layers_in_order() {
            let acquired = self.pool.get(layer, span.frame_point())?;
            if acquired.created {
                self.register_instance(acquired.id, layer);
            }
            let name = self.pool.data(acquired.id).name.clone();

            let moved = if perspective {
                quad_multiply_perspective(matrix, &layer.dst_matrix)
            } else {
                quad_multiply(matrix, &layer.dst_matrix)
            };
            let vertices = moved.sub(&layer.zero_center_matrix)?.into_values();

            push_deform(
                entry,
                &base_skin_name(layer),
                &name,
                DeformKey {
                    time,
                    vertices,
                    curve,
                },
            );
            push_attachment(entry, &name, time, Some(name.clone()));
            visible.insert((span.bone, pos), name);
        }
        Ok(())
    }

    fn conceal(
        &mut self,
        span: &Span,
        time: f32,
        entry: &mut AnimationEntry,
        visible: &mut BTreeMap<LayerKey, String>,
    ) -> Result<(), Error> {
        let doc = self.doc;

        if let Target::HitBox(h) = span.target {
            let Some(hitbox) = doc.hitbox(h) else {
                return Ok(());
            };
            for (ri, rect) in hitbox.rects.iter().enumerate() {
                push_attachment(entry, &hitbox_slot_name(hitbox.id, ri, &rect.name), time, None);
            }
            return Ok(());
        }

        let Some(keyframe) = doc.displayed_keyframe(span.target) else {
            return Ok(());
        };
        for (pos, layer) in keyframe.layers_in_order() {
            let id = self.pool.find(layer, span.frame_point())?;
            push_attachment(entry, &self.pool.data(id).name, time, None);
            self.pool.release(layer, id)?;
            visible.remove(&(span.bone, pos));
        }
        Ok(())
    }

    fn timeline_matrix(&self, span: &Span) -> Option<&'a Matrix> {
        let doc = self.doc;
        let animation = doc.animation(span.animation?)?;
        animation.timelines.get(span.timeline?)?.matrix.as_ref()
    }

    /// Declares the slot, skin attachments and images of a freshly created pool instance.
    fn register_instance(&mut self, id: PoolId, layer: &KeyframeLayer) {
        let data = self.pool.data(id).clone();
        if self.slot_index.contains_key(&data.name) {
            return;
        }
        self.slot_index.insert(data.name.clone(), self.slots.len());
        self.slots.push(SlotRecord {
            name: data.name.clone(),
            blend: BlendMode::from_blend_id(layer.blend_id),
            order_key: data.order_key,
            hitbox: false,
        });

        let variants = if layer.is_fog() {
            1
        } else {
            self.slicer.skin_count(layer.tex_id).max(1)
        };
        let base_skin = base_skin_name(layer);

        for skin_index in 0..variants {
            let attachment = if skin_index == 0 {
                AttachmentEntry::Mesh(MeshEntry {
                    path: data.image_name(0),
                    uvs: layer.uvs.to_vec(),
                    triangles: Triangulator.triangulate(&layer.zero_center),
                    vertices: layer.zero_center.to_vec(),
                    hull: 4,
                    width: layer.width(),
                    height: layer.height(),
                })
            } else {
                AttachmentEntry::LinkedMesh(LinkedMeshEntry {
                    path: data.image_name(skin_index),
                    parent: data.name.clone(),
                    skin: base_skin.clone(),
                    deform: true,
                    width: layer.width(),
                    height: layer.height(),
                })
            };
            self.skins
                .entry(skin_name(layer, skin_index))
                .or_default()
                .entry(data.name.clone())
                .or_default()
                .insert(data.name.clone(), attachment);

            self.slices.push(SliceRequest {
                name: data.image_name(skin_index),
                tex_id: layer.tex_id,
                skin_index,
                copy_index: data.copy_index,
                rect: layer.bounds,
                layer: layer.clone(),
            });
        }
    }

    fn register_hitbox(&mut self, name: &str) {
        if self.slot_index.contains_key(name) {
            return;
        }
        self.slot_index.insert(name.to_string(), self.slots.len());
        self.slots.push(SlotRecord {
            name: name.to_string(),
            blend: BlendMode::Normal,
            order_key: u64::MAX,
            hitbox: true,
        });
        self.skins
            .entry(HITBOX_SKIN.to_string())
            .or_default()
            .entry(name.to_string())
            .or_default()
            .insert(
                name.to_string(),
                AttachmentEntry::BoundingBox(BoundingBoxEntry {
                    vertex_count: 4,
                    vertices: vec![0.0; 8],
                }),
            );
    }

    /// Orders slots, turns recorded draw orders into offsets and builds the document.
    pub fn finish(mut self) -> SpineDocument {
        self.slots.sort_by(|a, b| {
            a.hitbox
                .cmp(&b.hitbox)
                .then(a.order_key.cmp(&b.order_key))
                .then_with(|| a.name.cmp(&b.name))
        });
        let baseline: HashMap<&str, usize> = self
            .slots
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        let mut animations = BTreeMap::new();
        for pending in self.animations {
            let mut entry = pending.entry;
            entry.draw_order = draw_order_track(&baseline, &pending.draw_frames);
            animations.insert(pending.name, entry);
        }

        SpineDocument {
            skeleton: SkeletonHeader::new(self.options.images_path.clone()),
            bones: vec![BoneEntry {
                name: ROOT_BONE.to_string(),
            }],
            slots: self
                .slots
                .iter()
                .map(|s| SlotEntry {
                    name: s.name.clone(),
                    bone: ROOT_BONE.to_string(),
                    blend: s.blend,
                    attachment: None,
                })
                .collect(),
            skins: self
                .skins
                .into_iter()
                .map(|(name, attachments)| SkinEntry { name, attachments })
                .collect(),
            animations,
        }
    }
}

fn base_skin_name(layer: &KeyframeLayer) -> String {
    skin_name(layer, 0)
}

fn skin_name(layer: &KeyframeLayer, skin_index: usize) -> String {
    if layer.is_fog() {
        format!("fog/{skin_index}")
    } else {
        format!("{}/{skin_index}", layer.tex_id)
    }
}

/// Slot and attachment name of one hit rectangle; the index keeps repeated names apart.
fn hitbox_slot_name(hitbox_id: u32, rect: usize, rect_name: &str) -> String {
    format!("hitbox{hitbox_id}_{rect}_{rect_name}")
}

fn same_time(a: f32, b: f32) -> bool {
    (a - b).abs() <= 1.0e-6
}

/// Appends an attachment key; a key at the same time replaces the previous one.
fn push_attachment(entry: &mut AnimationEntry, slot: &str, time: f32, name: Option<String>) {
    let keys = &mut entry.slots.entry(slot.to_string()).or_default().attachment;
    if let Some(last) = keys.last_mut()
        && same_time(last.time, time)
    {
        last.name = name;
        return;
    }
    keys.push(AttachmentKey { time, name });
}

fn push_deform(entry: &mut AnimationEntry, skin: &str, slot: &str, key: DeformKey) {
    let keys = entry
        .deform
        .entry(skin.to_string())
        .or_default()
        .entry(slot.to_string())
        .or_default()
        .entry(slot.to_string())
        .or_default();
    if let Some(last) = keys.last_mut()
        && same_time(last.time, key.time)
    {
        *last = key;
        return;
    }
    keys.push(key);
}

/// Offsets that move the `visible` slots into their listed order.
///
/// The visible slots are redistributed over their own baseline positions; every other slot
/// keeps its place. Entries are returned in baseline order, zero offsets omitted.
pub(crate) fn draw_order_offsets(
    baseline: &HashMap<&str, usize>,
    visible: &[String],
) -> Vec<DrawOrderOffset> {
    let ordered: Vec<(&str, usize)> = visible
        .iter()
        .filter_map(|name| baseline.get(name.as_str()).map(|&i| (name.as_str(), i)))
        .collect();
    let mut positions: Vec<usize> = ordered.iter().map(|(_, i)| *i).collect();
    positions.sort_unstable();

    let mut moves: Vec<(usize, DrawOrderOffset)> = ordered
        .iter()
        .zip(&positions)
        .filter(|((_, from), to)| from != *to)
        .map(|((name, from), to)| {
            (
                *from,
                DrawOrderOffset {
                    slot: (*name).to_string(),
                    offset: *to as i32 - *from as i32,
                },
            )
        })
        .collect();
    moves.sort_by_key(|(from, _)| *from);
    moves.into_iter().map(|(_, offset)| offset).collect()
}

/// Draw-order keys for recorded frames. All-zero frames are only kept to reset a preceding
/// reordered frame; repeated identical frames are dropped.
pub(crate) fn draw_order_track(
    baseline: &HashMap<&str, usize>,
    frames: &[(f32, Vec<String>)],
) -> Vec<DrawOrderKey> {
    let mut keys: Vec<DrawOrderKey> = Vec::new();
    for (time, visible) in frames {
        let offsets = draw_order_offsets(baseline, visible);
        let previous = keys.last().map(|k| k.offsets.as_slice()).unwrap_or(&[]);
        if offsets.as_slice() == previous {
            continue;
        }
        keys.push(DrawOrderKey {
            time: *time,
            offsets,
        });
    }
    keys
}
