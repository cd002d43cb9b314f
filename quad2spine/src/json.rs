use crate::math::{Matrix, Quad};
use crate::{
    Animation, Attach, AttachKind, Bone, Error, HitRect, Hitbox, Keyframe, KeyframeLayer,
    QuadDocument, QuadSkeleton, Slot, Target, Timeline,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Root {
    #[serde(default, rename = "Keyframe", alias = "keyframe")]
    keyframes: Vec<Value>,
    #[serde(default, rename = "Animation", alias = "animation")]
    animations: Vec<Value>,
    #[serde(default, rename = "Skeleton", alias = "skeleton")]
    skeletons: Vec<Value>,
    #[serde(default, rename = "Slot", alias = "slot")]
    slots: Vec<Value>,
    #[serde(default, rename = "Hitbox", alias = "hitbox")]
    hitboxes: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct AttachDef {
    #[serde(rename = "type")]
    kind: String,
    id: i32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagsDef {
    One(String),
    Many(Vec<String>),
}

impl TagsDef {
    fn into_vec(self) -> Vec<String> {
        match self {
            TagsDef::One(s) => vec![s],
            TagsDef::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LayerDef {
    #[serde(default)]
    srcquad: Option<Vec<f32>>,
    dstquad: Vec<f32>,
    #[serde(default, alias = "tex")]
    tex_id: u32,
    #[serde(default, alias = "blend")]
    blend_id: u32,
    #[serde(default)]
    attribute: Option<TagsDef>,
    #[serde(default)]
    fogquad: Option<TagsDef>,
}

#[derive(Debug, Deserialize)]
struct KeyframeDef {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    layer: Vec<Option<LayerDef>>,
    #[serde(default)]
    order: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct HitRectDef {
    #[serde(default)]
    name: Option<String>,
    hitquad: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct HitboxDef {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    layer: Vec<Option<HitRectDef>>,
}

#[derive(Debug, Deserialize)]
struct TimelineDef {
    time: u32,
    #[serde(default)]
    attach: Option<AttachDef>,
    #[serde(default)]
    matrix: Option<Vec<f32>>,
    #[serde(default)]
    keyframe_mix: bool,
    #[serde(default)]
    matrix_mix: bool,
}

#[derive(Debug, Deserialize)]
struct AnimationDef {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    timeline: Vec<TimelineDef>,
    #[serde(default)]
    loop_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct BoneDef {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    attach: Option<AttachDef>,
}

#[derive(Debug, Deserialize)]
struct SkeletonDef {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    bone: Vec<BoneDef>,
}

/// Maps source ids of one kind to arena indices. `None` marks an id that was assigned and then
/// dropped.
#[derive(Debug, Default)]
struct IdTable {
    entries: Vec<Option<usize>>,
}

impl IdTable {
    fn push(&mut self, arena_index: Option<usize>) -> u32 {
        self.entries.push(arena_index);
        (self.entries.len() - 1) as u32
    }

    fn lookup(&self, id: i32) -> Option<Option<usize>> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.entries.get(i).copied())
    }
}

#[derive(Debug, Default)]
struct Linker {
    keyframes: IdTable,
    slots: IdTable,
    hitboxes: IdTable,
    animations: IdTable,
    skeletons: IdTable,
}

impl Linker {
    fn resolve(&self, attach: Option<Attach>, referrer: &dyn Fn() -> String) -> Result<Target, Error> {
        let Some(attach) = attach else {
            return Ok(Target::None);
        };
        let table = match attach.kind {
            AttachKind::Keyframe => &self.keyframes,
            AttachKind::Slot => &self.slots,
            AttachKind::HitBox => &self.hitboxes,
            AttachKind::Animation => &self.animations,
            AttachKind::Skeleton => &self.skeletons,
        };
        let entry = table.lookup(attach.id).ok_or_else(|| Error::Link {
            kind: attach.kind,
            id: attach.id,
            referrer: referrer(),
        })?;
        let Some(index) = entry else {
            tracing::debug!(kind = ?attach.kind, id = attach.id, "reference to dropped entity");
            return Ok(Target::None);
        };
        Ok(match attach.kind {
            AttachKind::Keyframe => Target::Keyframe(index),
            AttachKind::Slot => Target::Slot(index),
            AttachKind::HitBox => Target::HitBox(index),
            AttachKind::Animation => Target::Animation(index),
            AttachKind::Skeleton => Target::Skeleton(index),
        })
    }
}

impl QuadDocument {
    pub fn from_json_slice(input: &[u8]) -> Result<Self, Error> {
        Self::from_json_slice_with_scale(input, 1.0)
    }

    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        Self::from_json_slice(input.as_bytes())
    }

    /// Decodes and links a quad document, multiplying every quad coordinate by `scale`.
    #[tracing::instrument(skip(input), fields(bytes = input.len()))]
    pub fn from_json_slice_with_scale(input: &[u8], scale: f32) -> Result<Self, Error> {
        if !scale.is_finite() || scale < 1.0 {
            return Err(Error::InvalidValue {
                message: format!("scale factor must be a finite number >= 1, got {scale}"),
            });
        }

        let value: Value = serde_json::from_slice(input).map_err(|e| Error::Format {
            message: e.to_string(),
        })?;
        if !value.is_object() {
            return Err(Error::Format {
                message: "top-level value must be an object".to_string(),
            });
        }
        let root: Root = serde_json::from_value(value).map_err(|e| Error::Format {
            message: e.to_string(),
        })?;

        let keyframe_defs = decode_elements::<KeyframeDef>("keyframe", root.keyframes, OnBad::Fail)?;
        let hitbox_defs = decode_elements::<HitboxDef>("hitbox", root.hitboxes, OnBad::Skip)?;
        let slot_defs = decode_elements::<Vec<AttachDef>>("slot", root.slots, OnBad::Fail)?;
        let animation_defs =
            decode_elements::<AnimationDef>("animation", root.animations, OnBad::Fail)?;
        let skeleton_defs =
            decode_elements::<SkeletonDef>("skeleton", root.skeletons, OnBad::Skip)?;

        let mut linker = Linker::default();
        let mut doc = QuadDocument::default();

        for (index, def) in keyframe_defs {
            let id = linker.keyframes.entries.len() as u32;
            let keyframe = build_keyframe(id, index, def, scale)?;
            if keyframe.layers.is_empty() {
                linker.keyframes.push(None);
                continue;
            }
            linker.keyframes.push(Some(doc.keyframes.len()));
            doc.keyframes.push(keyframe);
        }

        for (index, def) in hitbox_defs {
            let id = linker.hitboxes.entries.len() as u32;
            match build_hitbox(id, index, def, scale) {
                Ok(hitbox) => {
                    linker.hitboxes.push(Some(doc.hitboxes.len()));
                    doc.hitboxes.push(hitbox);
                }
                Err(error) => tracing::warn!(index, %error, "dropping hitbox"),
            }
        }

        let mut slot_attaches = Vec::with_capacity(slot_defs.len());
        for (index, def) in slot_defs {
            let attaches = def
                .iter()
                .map(|a| attach_from_def(a, "slot", index))
                .collect::<Result<Vec<_>, _>>()?;
            linker.slots.push(Some(slot_attaches.len()));
            slot_attaches.push(attaches);
        }

        let mut animations = Vec::with_capacity(animation_defs.len());
        for (index, def) in animation_defs {
            if def.name.as_deref().is_some_and(is_sentinel_name) {
                tracing::debug!(index, "skipping sentinel animation");
                continue;
            }
            linker.animations.push(Some(animations.len()));
            animations.push((index, def));
        }

        let mut skeletons = Vec::with_capacity(skeleton_defs.len());
        for (index, def) in skeleton_defs {
            let attaches = def
                .bone
                .iter()
                .map(|bone| {
                    bone.attach
                        .as_ref()
                        .map(|a| attach_from_def(a, "skeleton", index))
                        .transpose()
                })
                .collect::<Result<Vec<_>, _>>();
            match attaches {
                Ok(attaches) => {
                    linker.skeletons.push(Some(skeletons.len()));
                    skeletons.push((def, attaches));
                }
                Err(error) => tracing::warn!(index, %error, "dropping skeleton"),
            }
        }

        for (id, attaches) in slot_attaches.into_iter().enumerate() {
            let mut targets = Vec::with_capacity(attaches.len());
            for attach in &attaches {
                targets.push(linker.resolve(Some(*attach), &|| format!("slot {id}"))?);
            }
            doc.slots.push(Slot {
                id: id as u32,
                attaches,
                targets,
            });
        }

        for (id, (index, def)) in animations.into_iter().enumerate() {
            let animation = build_animation(id as u32, index, def, scale, &linker)?;
            doc.animations.push(animation);
        }

        for (id, (def, attaches)) in skeletons.into_iter().enumerate() {
            let name = def.name.unwrap_or_else(|| format!("skeleton {id}"));
            let mut bones = Vec::with_capacity(def.bone.len());
            for (bi, (bone, attach)) in def.bone.into_iter().zip(attaches).enumerate() {
                let target =
                    linker.resolve(attach, &|| format!("bone {bi} of skeleton '{name}'"))?;
                bones.push(Bone {
                    name: bone.name.unwrap_or_else(|| format!("bone {bi}")),
                    attach,
                    target,
                });
            }
            doc.skeletons.push(QuadSkeleton {
                id: id as u32,
                name,
                bones,
            });
        }

        tracing::debug!(
            keyframes = doc.keyframes.len(),
            animations = doc.animations.len(),
            skeletons = doc.skeletons.len(),
            slots = doc.slots.len(),
            hitboxes = doc.hitboxes.len(),
            "loaded quad document"
        );
        Ok(doc)
    }
}

/// What to do with an array element that does not decode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum OnBad {
    Fail,
    /// Log and drop the element; it consumes no id.
    Skip,
}

/// Decodes every non-null element of one top-level array, keeping its position for errors.
fn decode_elements<T: DeserializeOwned>(
    kind: &'static str,
    values: Vec<Value>,
    on_bad: OnBad,
) -> Result<Vec<(usize, T)>, Error> {
    let mut out = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        if value.is_null() {
            continue;
        }
        match serde_json::from_value(value) {
            Ok(def) => out.push((index, def)),
            Err(e) if on_bad == OnBad::Skip => {
                tracing::warn!(kind, index, error = %e, "dropping undecodable element");
            }
            Err(e) => {
                return Err(Error::Schema {
                    kind,
                    index,
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(out)
}

/// Animation names end with their number; `-1` marks an unused placeholder.
fn is_sentinel_name(name: &str) -> bool {
    name.split_whitespace()
        .next_back()
        .and_then(|token| token.parse::<i32>().ok())
        == Some(-1)
}

fn attach_from_def(def: &AttachDef, kind: &'static str, index: usize) -> Result<Attach, Error> {
    let attach_kind = AttachKind::from_json_name(&def.kind.to_ascii_lowercase()).ok_or_else(|| {
        Error::Schema {
            kind,
            index,
            message: format!("unknown attach type '{}'", def.kind),
        }
    })?;
    Ok(Attach {
        kind: attach_kind,
        id: def.id,
    })
}

fn parse_quad(values: &[f32], scale: f32, kind: &'static str, index: usize) -> Result<Quad, Error> {
    let quad: Quad = values.try_into().map_err(|_| Error::Schema {
        kind,
        index,
        message: format!("quad must have 8 values, got {}", values.len()),
    })?;
    Ok(quad.map(|v| v * scale))
}

fn build_keyframe(id: u32, index: usize, def: KeyframeDef, scale: f32) -> Result<Keyframe, Error> {
    let mut layers = Vec::with_capacity(def.layer.len());
    for layer in def.layer.into_iter().flatten() {
        let src_quad = layer
            .srcquad
            .as_deref()
            .map(|q| parse_quad(q, scale, "keyframe", index))
            .transpose()?;
        let dst_quad = parse_quad(&layer.dstquad, scale, "keyframe", index)?;
        let fog = layer
            .fogquad
            .map(|tags| parse_fog(&tags.into_vec(), index))
            .transpose()?;
        layers.push(KeyframeLayer::from_raw(
            src_quad,
            dst_quad,
            layer.tex_id,
            layer.blend_id,
            layer.attribute.map(TagsDef::into_vec).unwrap_or_default(),
            fog,
        ));
    }

    let mut order = Vec::with_capacity(def.order.len());
    for i in def.order {
        if i < layers.len() {
            order.push(i);
        } else {
            tracing::warn!(keyframe = id, layer = i, "ignoring out-of-range layer order entry");
        }
    }

    Ok(Keyframe {
        id,
        name: def.name.unwrap_or_else(|| format!("keyframe {id}")),
        layers,
        order,
    })
}

fn build_hitbox(id: u32, index: usize, def: HitboxDef, scale: f32) -> Result<Hitbox, Error> {
    let mut rects = Vec::with_capacity(def.layer.len());
    for (ri, rect) in def.layer.into_iter().enumerate() {
        let Some(rect) = rect else { continue };
        rects.push(HitRect {
            name: rect.name.unwrap_or_else(|| format!("layer {ri}")),
            quad: parse_quad(&rect.hitquad, scale, "hitbox", index)?,
        });
    }
    Ok(Hitbox {
        id,
        name: def.name.unwrap_or_else(|| format!("hitbox {id}")),
        rects,
    })
}

fn build_animation(
    id: u32,
    index: usize,
    def: AnimationDef,
    scale: f32,
    linker: &Linker,
) -> Result<Animation, Error> {
    let name = def.name.unwrap_or_else(|| format!("animation {id}"));

    let loop_start = match def.loop_id {
        Some(l) if l >= 0 => {
            let l = l as usize;
            if l >= def.timeline.len() {
                return Err(Error::Schema {
                    kind: "animation",
                    index,
                    message: format!(
                        "loop_id {l} out of range for {} timelines",
                        def.timeline.len()
                    ),
                });
            }
            Some(l)
        }
        _ => None,
    };

    let mut timelines = Vec::with_capacity(def.timeline.len());
    for (ti, t) in def.timeline.into_iter().enumerate() {
        let attach = t
            .attach
            .as_ref()
            .map(|a| attach_from_def(a, "animation", index))
            .transpose()?;
        let target = linker.resolve(attach, &|| {
            format!("timeline {ti} of animation '{name}'")
        })?;
        timelines.push(Timeline {
            duration: t.time,
            attach,
            target,
            matrix: t.matrix.as_deref().map(|m| scaled_transform(m, scale)),
            keyframe_mix: t.keyframe_mix,
            matrix_mix: t.matrix_mix,
        });
    }

    Ok(Animation {
        id,
        name,
        timelines,
        loop_start,
    })
}

/// A 4x4 transform whose translation entries follow the document scale.
fn scaled_transform(values: &[f32], scale: f32) -> Matrix {
    let mut m = Matrix::transform4(values).into_values();
    for i in [2, 3, 6, 7] {
        m[i] *= scale;
    }
    Matrix::from_values(4, 4, &m, 0.0)
}

fn parse_fog(colors: &[String], index: usize) -> Result<[[f32; 4]; 4], Error> {
    let parsed = colors
        .iter()
        .map(|c| parse_hex_color_rgba(c, index))
        .collect::<Result<Vec<_>, _>>()?;
    match parsed.as_slice() {
        [c] => Ok([*c; 4]),
        [a, b, c, d] => Ok([*a, *b, *c, *d]),
        _ => Err(Error::Schema {
            kind: "keyframe",
            index,
            message: format!("fogquad must have 1 or 4 colours, got {}", parsed.len()),
        }),
    }
}

fn parse_hex_color_rgba(input: &str, index: usize) -> Result<[f32; 4], Error> {
    let invalid = || Error::Schema {
        kind: "keyframe",
        index,
        message: format!("invalid fog colour '{input}'"),
    };
    let hex = input.trim().trim_start_matches('#');
    if hex.len() != 6 && hex.len() != 8 {
        return Err(invalid());
    }
    let channel = |i: usize| -> Result<f32, Error> {
        let s = hex.get(i * 2..i * 2 + 2).ok_or_else(invalid)?;
        let v = u8::from_str_radix(s, 16).map_err(|_| invalid())?;
        Ok(f32::from(v) / 255.0)
    };
    let alpha = if hex.len() == 8 { channel(3)? } else { 1.0 };
    Ok([channel(0)?, channel(1)?, channel(2)?, alpha])
}
