//! Spine skeleton JSON document, as written by the assembler.

use crate::{Error, SPINE_EXPORT_VERSION};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Serialize)]
pub struct SpineDocument {
    pub skeleton: SkeletonHeader,
    pub bones: Vec<BoneEntry>,
    pub slots: Vec<SlotEntry>,
    pub skins: Vec<SkinEntry>,
    pub animations: BTreeMap<String, AnimationEntry>,
}

impl SpineDocument {
    pub fn to_json_string(&self, pretty: bool) -> Result<String, Error> {
        let out = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        out.map_err(|e| Error::Serialize {
            message: e.to_string(),
        })
    }

    pub fn slot(&self, name: &str) -> Option<&SlotEntry> {
        self.slots.iter().find(|s| s.name == name)
    }

    pub fn skin(&self, name: &str) -> Option<&SkinEntry> {
        self.skins.iter().find(|s| s.name == name)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SkeletonHeader {
    pub spine: String,
    pub images: String,
}

impl SkeletonHeader {
    pub fn new(images: impl Into<String>) -> Self {
        Self {
            spine: SPINE_EXPORT_VERSION.to_string(),
            images: images.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BoneEntry {
    pub name: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
    Multiply,
    Screen,
}

impl BlendMode {
    pub fn from_blend_id(id: u32) -> Self {
        match id {
            1 => Self::Additive,
            2 => Self::Multiply,
            3 => Self::Screen,
            _ => Self::Normal,
        }
    }

    fn is_normal(&self) -> bool {
        *self == Self::Normal
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SlotEntry {
    pub name: String,
    pub bone: String,
    #[serde(skip_serializing_if = "BlendMode::is_normal")]
    pub blend: BlendMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SkinEntry {
    pub name: String,
    /// slot name -> attachment name -> attachment
    pub attachments: BTreeMap<String, BTreeMap<String, AttachmentEntry>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum AttachmentEntry {
    #[serde(rename = "mesh")]
    Mesh(MeshEntry),
    #[serde(rename = "linkedmesh")]
    LinkedMesh(LinkedMeshEntry),
    #[serde(rename = "boundingbox")]
    BoundingBox(BoundingBoxEntry),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeshEntry {
    pub path: String,
    pub uvs: Vec<f32>,
    pub triangles: Vec<u16>,
    pub vertices: Vec<f32>,
    pub hull: u32,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinkedMeshEntry {
    pub path: String,
    pub parent: String,
    pub skin: String,
    pub deform: bool,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BoundingBoxEntry {
    #[serde(rename = "vertexCount")]
    pub vertex_count: u32,
    pub vertices: Vec<f32>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct AnimationEntry {
    pub slots: BTreeMap<String, SlotTimelines>,
    /// skin -> slot -> attachment -> frames
    pub deform: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<DeformKey>>>>,
    #[serde(rename = "drawOrder", skip_serializing_if = "Vec::is_empty")]
    pub draw_order: Vec<DrawOrderKey>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SlotTimelines {
    pub attachment: Vec<AttachmentKey>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttachmentKey {
    pub time: f32,
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeformKey {
    pub time: f32,
    pub vertices: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curve: Option<&'static str>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DrawOrderKey {
    pub time: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub offsets: Vec<DrawOrderOffset>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DrawOrderOffset {
    pub slot: String,
    pub offset: i32,
}
