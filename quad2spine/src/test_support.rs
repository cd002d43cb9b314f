use crate::{
    ConvertOptions, ImageSlicer, NullProgress, ProgressSink, QuadDocument, SliceError,
    SliceRequest, SpineDocument, convert,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

pub(crate) const SQUARE: [f32; 8] = [0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0];

pub(crate) fn layer(tex_id: u32, quad: [f32; 8]) -> Value {
    json!({ "srcquad": quad, "dstquad": quad, "tex_id": tex_id })
}

pub(crate) fn attach(kind: &str, id: i32) -> Value {
    json!({ "type": kind, "id": id })
}

pub(crate) fn timeline(time: u32, target: Value) -> Value {
    json!({ "time": time, "attach": target })
}

/// One skeleton with one bone playing one animation of two timelines (10 and 20 frames) on
/// keyframe 0.
pub(crate) fn two_timeline_document() -> Value {
    json!({
        "Keyframe": [{ "name": "kf 0", "layer": [layer(0, SQUARE)] }],
        "Animation": [{
            "name": "idle 0",
            "timeline": [
                timeline(10, attach("keyframe", 0)),
                timeline(20, attach("keyframe", 0)),
            ],
        }],
        "Skeleton": [{ "name": "hero", "bone": [{ "name": "b0", "attach": attach("animation", 0) }] }],
    })
}

pub(crate) fn load(value: &Value) -> QuadDocument {
    let bytes = serde_json::to_vec(value).unwrap();
    QuadDocument::from_json_slice(&bytes).unwrap()
}

pub(crate) fn convert_value(value: &Value, options: &ConvertOptions) -> SpineDocument {
    convert_with(value, options, Arc::new(RecordingSlicer::default())).unwrap()
}

pub(crate) fn convert_with(
    value: &Value,
    options: &ConvertOptions,
    slicer: Arc<dyn ImageSlicer>,
) -> Result<SpineDocument, crate::Error> {
    let doc = load(value);
    convert(&doc, options, slicer, &NullProgress)
}

#[derive(Default)]
pub(crate) struct RecordingSlicer {
    pub(crate) skins: usize,
    pub(crate) fail_on: Option<String>,
    pub(crate) seen: Mutex<Vec<String>>,
}

impl RecordingSlicer {
    pub(crate) fn with_skins(skins: usize) -> Self {
        Self {
            skins,
            ..Self::default()
        }
    }

    pub(crate) fn seen_sorted(&self) -> Vec<String> {
        let mut seen = self.seen.lock().unwrap().clone();
        seen.sort();
        seen
    }
}

impl ImageSlicer for RecordingSlicer {
    fn skin_count(&self, _tex_id: u32) -> usize {
        self.skins.max(1)
    }

    fn slice(&self, request: &SliceRequest) -> Result<(), SliceError> {
        self.seen.lock().unwrap().push(request.name.clone());
        match &self.fail_on {
            Some(prefix) if request.name.starts_with(prefix.as_str()) => {
                Err(format!("texture {} is unreadable", request.tex_id).into())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingProgress {
    pub(crate) reports: Mutex<Vec<(String, u8)>>,
}

impl ProgressSink for RecordingProgress {
    fn report(&self, message: &str, percent: u8) {
        self.reports
            .lock()
            .unwrap()
            .push((message.to_string(), percent));
    }
}

pub(crate) fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 0.001,
        "expected {expected}, got {actual} (diff {diff})"
    );
}
