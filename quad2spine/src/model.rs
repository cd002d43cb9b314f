use crate::math::{Matrix, Quad};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AttachKind {
    Keyframe,
    Slot,
    HitBox,
    Animation,
    Skeleton,
}

impl AttachKind {
    pub(crate) fn from_json_name(name: &str) -> Option<Self> {
        match name {
            "keyframe" => Some(Self::Keyframe),
            "slot" => Some(Self::Slot),
            "hitbox" => Some(Self::HitBox),
            "animation" => Some(Self::Animation),
            "skeleton" => Some(Self::Skeleton),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keyframe => "keyframe",
            Self::Slot => "slot",
            Self::HitBox => "hitbox",
            Self::Animation => "animation",
            Self::Skeleton => "skeleton",
        }
    }
}

/// A cross-reference as written in the source document.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Attach {
    pub kind: AttachKind,
    pub id: i32,
}

/// A linked [`Attach`]: an index into the matching arena of [`QuadDocument`].
///
/// `None` means the id was assigned but the entity was dropped while decoding (e.g. a keyframe
/// without layers), so nothing is shown.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Target {
    #[default]
    None,
    Keyframe(usize),
    Slot(usize),
    HitBox(usize),
    Animation(usize),
    Skeleton(usize),
}

impl Target {
    pub fn is_none(&self) -> bool {
        matches!(self, Target::None)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn bounding(quad: &Quad) -> Self {
        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        for corner in quad.chunks_exact(2) {
            min_x = min_x.min(corner[0]);
            min_y = min_y.min(corner[1]);
            max_x = max_x.max(corner[0]);
            max_y = max_y.max(corner[1]);
        }
        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }
}

/// One textured (or fog-filled) quad of a keyframe.
///
/// Derived geometry is computed once by [`KeyframeLayer::from_raw`].
#[derive(Clone, Debug)]
pub struct KeyframeLayer {
    pub src_quad: Option<Quad>,
    pub dst_quad: Quad,
    pub tex_id: u32,
    pub blend_id: u32,
    pub attributes: Vec<String>,
    /// Corner colours of a fog layer, `[r, g, b, a]` in `0..=1`.
    pub fog: Option<[[f32; 4]; 4]>,

    pub bounds: Rect,
    /// Per-corner texture coordinates, `u0, v0, .. u3, v3`.
    pub uvs: [f32; 8],
    /// Setup-pose vertices centred on the origin.
    pub zero_center: Quad,
    pub dst_matrix: Matrix,
    pub zero_center_matrix: Matrix,
    pub fingerprint: u64,
}

const UV_LABELS: [(f32, f32); 4] = [(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)];

impl KeyframeLayer {
    pub fn from_raw(
        src_quad: Option<Quad>,
        dst_quad: Quad,
        tex_id: u32,
        blend_id: u32,
        attributes: Vec<String>,
        fog: Option<[[f32; 4]; 4]>,
    ) -> Self {
        let shape = src_quad.unwrap_or(dst_quad);
        let bounds = Rect::bounding(&shape);

        let mut order = [0usize, 1, 2, 3];
        order.sort_by(|&a, &b| {
            let pa = (shape[a * 2], shape[a * 2 + 1]);
            let pb = (shape[b * 2], shape[b * 2 + 1]);
            pa.partial_cmp(&pb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut uvs = [0.0f32; 8];
        for (rank, &corner) in order.iter().enumerate() {
            let (u, v) = UV_LABELS[rank];
            uvs[corner * 2] = u;
            uvs[corner * 2 + 1] = v;
        }

        let half_w = bounds.width * 0.5;
        let half_h = bounds.height * 0.5;
        let mut zero_center = [0.0f32; 8];
        for i in 0..4 {
            zero_center[i * 2] = (uvs[i * 2] * 2.0 - 1.0) * half_w;
            zero_center[i * 2 + 1] = (uvs[i * 2 + 1] * 2.0 - 1.0) * half_h;
        }

        let fingerprint = match (&src_quad, &fog) {
            (Some(src), _) => quad_fingerprint(src, tex_id),
            (None, Some(colors)) => fog_fingerprint(colors, &bounds),
            (None, None) => fog_fingerprint(&[[1.0; 4]; 4], &bounds),
        };

        Self {
            src_quad,
            dst_quad,
            tex_id,
            blend_id,
            attributes,
            fog,
            bounds,
            uvs,
            zero_center,
            dst_matrix: Matrix::from_quad(&dst_quad),
            zero_center_matrix: Matrix::from_quad(&zero_center),
            fingerprint,
        }
    }

    pub fn is_fog(&self) -> bool {
        self.src_quad.is_none()
    }

    pub fn width(&self) -> f32 {
        self.bounds.width
    }

    pub fn height(&self) -> f32 {
        self.bounds.height
    }
}

struct Fnv1a64(u64);

impl Fnv1a64 {
    fn new() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }

    fn write(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 ^= u64::from(*b);
            self.0 = self.0.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }

    fn write_f32(&mut self, v: f32) {
        // -0.0 and 0.0 describe the same corner.
        self.write(&(v + 0.0).to_bits().to_le_bytes());
    }
}

fn quad_fingerprint(quad: &Quad, tex_id: u32) -> u64 {
    let mut h = Fnv1a64::new();
    h.write(&[0]);
    h.write(&tex_id.to_le_bytes());
    for v in quad {
        h.write_f32(*v);
    }
    h.0
}

fn fog_fingerprint(colors: &[[f32; 4]; 4], bounds: &Rect) -> u64 {
    let mut h = Fnv1a64::new();
    h.write(&[1]);
    for c in colors.iter().flatten() {
        h.write_f32(*c);
    }
    h.write_f32(bounds.width.round());
    h.write_f32(bounds.height.round());
    h.0
}

#[derive(Clone, Debug)]
pub struct Keyframe {
    pub id: u32,
    pub name: String,
    pub layers: Vec<KeyframeLayer>,
    /// Explicit render order (layer indices); empty means list order.
    pub order: Vec<usize>,
}

impl Keyframe {
    /// Layers in render order, paired with their render position.
    pub fn layers_in_order(&self) -> Vec<(usize, &KeyframeLayer)> {
        if self.order.is_empty() {
            return self.layers.iter().enumerate().collect();
        }
        self.order
            .iter()
            .filter_map(|&i| self.layers.get(i))
            .enumerate()
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct HitRect {
    pub name: String,
    pub quad: Quad,
}

#[derive(Clone, Debug)]
pub struct Hitbox {
    pub id: u32,
    pub name: String,
    pub rects: Vec<HitRect>,
}

#[derive(Clone, Debug)]
pub struct Slot {
    pub id: u32,
    pub attaches: Vec<Attach>,
    pub targets: Vec<Target>,
}

impl Slot {
    /// The first keyframe this slot selects, if any.
    pub fn first_keyframe(&self) -> Option<usize> {
        self.targets.iter().find_map(|t| match t {
            Target::Keyframe(k) => Some(*k),
            _ => None,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Timeline {
    pub duration: u32,
    pub attach: Option<Attach>,
    pub target: Target,
    pub matrix: Option<Matrix>,
    pub keyframe_mix: bool,
    pub matrix_mix: bool,
}

#[derive(Clone, Debug)]
pub struct Animation {
    pub id: u32,
    pub name: String,
    pub timelines: Vec<Timeline>,
    pub loop_start: Option<usize>,
}

impl Animation {
    pub fn is_loop(&self) -> bool {
        self.loop_start.is_some()
    }

    /// Sum of all timeline durations, saturating at `u32::MAX`.
    pub fn total_frames(&self) -> u32 {
        self.timelines
            .iter()
            .fold(0u32, |total, t| total.saturating_add(t.duration))
    }
}

#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub attach: Option<Attach>,
    pub target: Target,
}

#[derive(Clone, Debug)]
pub struct QuadSkeleton {
    pub id: u32,
    pub name: String,
    pub bones: Vec<Bone>,
}

/// A decoded and linked quad document. Every [`Target`] indexes one of these arenas.
#[derive(Clone, Debug, Default)]
pub struct QuadDocument {
    pub keyframes: Vec<Keyframe>,
    pub animations: Vec<Animation>,
    pub skeletons: Vec<QuadSkeleton>,
    pub slots: Vec<Slot>,
    pub hitboxes: Vec<Hitbox>,
}

impl QuadDocument {
    pub fn keyframe(&self, index: usize) -> Option<&Keyframe> {
        self.keyframes.get(index)
    }

    pub fn animation(&self, index: usize) -> Option<&Animation> {
        self.animations.get(index)
    }

    pub fn skeleton(&self, index: usize) -> Option<&QuadSkeleton> {
        self.skeletons.get(index)
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn hitbox(&self, index: usize) -> Option<&Hitbox> {
        self.hitboxes.get(index)
    }

    /// Resolves a target to the keyframe it displays, following one level of slot indirection.
    pub fn displayed_keyframe(&self, target: Target) -> Option<&Keyframe> {
        match target {
            Target::Keyframe(k) => self.keyframe(k),
            Target::Slot(s) => self
                .slot(s)
                .and_then(Slot::first_keyframe)
                .and_then(|k| self.keyframe(k)),
            _ => None,
        }
    }
}
