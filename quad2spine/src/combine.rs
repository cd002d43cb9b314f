//! Merges the bone tracks of one skeleton into a single frame-indexed event stream.

use crate::{Error, FramePoint, QuadDocument, Target};
use std::collections::BTreeMap;

/// One scheduled appearance on a bone track.
#[derive(Clone, Debug)]
pub struct Span {
    pub bone: usize,
    /// Animation arena index; `None` for bones that attach a keyframe, slot or hitbox directly.
    pub animation: Option<usize>,
    /// Timeline index inside `animation`.
    pub timeline: Option<usize>,
    pub target: Target,
    pub start_frame: u32,
    pub end_frame: u32,
    pub keyframe_mix: bool,
    pub matrix_mix: bool,
    /// Produced by loop extension.
    pub synthesized: bool,
}

impl Span {
    pub fn frame_point(&self) -> FramePoint {
        FramePoint::new(self.start_frame as i32, self.end_frame as i32)
    }

    pub fn duration(&self) -> u32 {
        self.end_frame - self.start_frame
    }
}

/// Spans entering and leaving at one frame, as indices into [`AnimationData::spans`].
#[derive(Clone, Debug, Default)]
pub struct FrameEvents {
    pub displayed: Vec<usize>,
    pub concealed: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct AnimationData {
    pub skeleton: usize,
    pub spans: Vec<Span>,
    /// Span indices per (flattened) bone, in chaining order.
    pub tracks: Vec<Vec<usize>>,
    pub frames: BTreeMap<u32, FrameEvents>,
    pub is_loop: bool,
    pub is_mix: bool,
    pub end_frame: u32,
}

impl AnimationData {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[derive(Clone, Debug)]
struct Entry {
    timeline: Option<usize>,
    target: Target,
    duration: u32,
    keyframe_mix: bool,
    matrix_mix: bool,
}

/// Largest frame a track may reach; frame points are stored as `i32`.
pub const MAX_FRAME: u32 = i32::MAX as u32;

#[derive(Clone, Debug)]
struct BoneSource {
    animation: Option<usize>,
    entries: Vec<Entry>,
    loop_start: Option<usize>,
    /// Shown for the whole skeleton length rather than a fixed duration.
    fill: bool,
}

/// Combines the bones of `skeleton` into one event stream.
///
/// With `looping`, looping animations shorter than the longest bone track are repeated from
/// their loop start until they reach it.
pub fn combine(doc: &QuadDocument, skeleton: usize, looping: bool) -> Result<AnimationData, Error> {
    let mut sources = Vec::new();
    let mut stack = Vec::new();
    collect_bones(doc, skeleton, &mut stack, &mut sources)?;

    let mut max_end = 0;
    for source in sources.iter().filter(|s| !s.fill) {
        max_end = max_end.max(track_length(doc, source)?);
    }
    let fill_len = max_end.max(1);

    let mut data = AnimationData {
        skeleton,
        spans: Vec::new(),
        tracks: Vec::with_capacity(sources.len()),
        frames: BTreeMap::new(),
        is_loop: false,
        is_mix: false,
        end_frame: 0,
    };

    for (bone, source) in sources.iter().enumerate() {
        let mut track = Vec::with_capacity(source.entries.len());
        let mut frame = 0u32;
        let mut push = |data: &mut AnimationData, entry: &Entry, start: u32, end: u32, synthesized| {
            data.spans.push(Span {
                bone,
                animation: source.animation,
                timeline: entry.timeline,
                target: entry.target,
                start_frame: start,
                end_frame: end,
                keyframe_mix: entry.keyframe_mix,
                matrix_mix: entry.matrix_mix,
                synthesized,
            });
            track.push(data.spans.len() - 1);
        };

        for entry in &source.entries {
            let duration = if source.fill { fill_len } else { entry.duration };
            push(&mut data, entry, frame, frame + duration, false);
            frame += duration;
        }

        if let Some(loop_start) = source.loop_start.filter(|_| looping && !source.fill) {
            data.is_loop = true;
            if source.entries[loop_start..].iter().any(|e| e.duration > 0) {
                let mut i = loop_start;
                while frame < max_end {
                    let entry = &source.entries[i];
                    let end = frame.saturating_add(entry.duration).min(max_end);
                    push(&mut data, entry, frame, end, true);
                    frame = end;
                    i += 1;
                    if i == source.entries.len() {
                        i = loop_start;
                    }
                }
            }
        }

        data.tracks.push(track);
        data.end_frame = data.end_frame.max(frame);
    }

    for (index, span) in data.spans.iter().enumerate() {
        if span.keyframe_mix || span.matrix_mix {
            data.is_mix = true;
        }
        if span.target.is_none() || span.end_frame == span.start_frame {
            continue;
        }
        data.frames
            .entry(span.start_frame)
            .or_default()
            .displayed
            .push(index);
        data.frames
            .entry(span.end_frame)
            .or_default()
            .concealed
            .push(index);
    }

    tracing::debug!(
        skeleton,
        bones = data.tracks.len(),
        spans = data.spans.len(),
        frames = data.frames.len(),
        end_frame = data.end_frame,
        "combined skeleton"
    );
    Ok(data)
}

/// Chained length of one bone track, rejecting tracks past [`MAX_FRAME`].
fn track_length(doc: &QuadDocument, source: &BoneSource) -> Result<u32, Error> {
    source
        .entries
        .iter()
        .try_fold(0u32, |total, e| {
            total
                .checked_add(e.duration)
                .filter(|&t| t <= MAX_FRAME)
        })
        .ok_or_else(|| {
            let name = source
                .animation
                .and_then(|a| doc.animation(a))
                .map_or("<none>", |a| a.name.as_str());
            Error::InvalidValue {
                message: format!("animation '{name}' runs past frame {MAX_FRAME}"),
            }
        })
}

fn collect_bones(
    doc: &QuadDocument,
    skeleton: usize,
    stack: &mut Vec<usize>,
    out: &mut Vec<BoneSource>,
) -> Result<(), Error> {
    let Some(skel) = doc.skeleton(skeleton) else {
        return Ok(());
    };
    if stack.contains(&skeleton) {
        return Err(Error::SkeletonCycle {
            skeleton: skel.name.clone(),
        });
    }
    stack.push(skeleton);

    for bone in &skel.bones {
        match bone.target {
            Target::None => {}
            Target::Skeleton(sub) => collect_bones(doc, sub, stack, out)?,
            Target::Animation(a) => {
                let Some(animation) = doc.animation(a) else {
                    continue;
                };
                out.push(BoneSource {
                    animation: Some(a),
                    entries: animation
                        .timelines
                        .iter()
                        .enumerate()
                        .map(|(i, t)| Entry {
                            timeline: Some(i),
                            target: t.target,
                            duration: t.duration,
                            keyframe_mix: t.keyframe_mix,
                            matrix_mix: t.matrix_mix,
                        })
                        .collect(),
                    loop_start: animation.loop_start,
                    fill: false,
                });
            }
            target => out.push(BoneSource {
                animation: None,
                entries: vec![Entry {
                    timeline: None,
                    target,
                    duration: 0,
                    keyframe_mix: false,
                    matrix_mix: false,
                }],
                loop_start: None,
                fill: true,
            }),
        }
    }

    stack.pop();
    Ok(())
}
