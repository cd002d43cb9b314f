use crate::test_support::{SQUARE, attach, layer, load, timeline};
use crate::{Error, MAX_FRAME, Target, combine};
use serde_json::{Value, json};

/// Skeleton 0 plays animation 0 (10 + 20 frames) and animation 1 on two bones.
fn two_bone_document(second: Value) -> Value {
    json!({
        "Keyframe": [
            { "layer": [layer(0, SQUARE)] },
            { "layer": [layer(1, SQUARE)] },
        ],
        "Animation": [
            {
                "name": "long 0",
                "timeline": [
                    timeline(10, attach("keyframe", 0)),
                    timeline(20, attach("keyframe", 1)),
                ],
            },
            second,
        ],
        "Skeleton": [{
            "name": "pair",
            "bone": [
                { "attach": attach("animation", 0) },
                { "attach": attach("animation", 1) },
            ],
        }],
    })
}

fn short_loop(duration: u32) -> Value {
    json!({
        "name": "short 1",
        "timeline": [timeline(duration, attach("keyframe", 1))],
        "loop_id": 0,
    })
}

#[test]
fn bone_tracks_are_chained_and_merged_by_frame() {
    let doc = load(&two_bone_document(json!({
        "timeline": [timeline(5, attach("keyframe", 1))],
    })));
    let data = combine(&doc, 0, false).unwrap();

    assert_eq!(data.spans.len(), 3);
    assert_eq!(data.tracks, vec![vec![0, 1], vec![2]]);
    assert_eq!(data.end_frame, 30);
    assert!(!data.is_loop);
    assert!(!data.is_mix);

    let frames: Vec<(u32, usize, usize)> = data
        .frames
        .iter()
        .map(|(f, e)| (*f, e.displayed.len(), e.concealed.len()))
        .collect();
    assert_eq!(frames, vec![(0, 2, 0), (5, 0, 1), (10, 1, 1), (30, 0, 1)]);

    // Every displayed span is concealed exactly once, at its end frame.
    for (index, span) in data.spans.iter().enumerate() {
        assert!(data.frames[&span.start_frame].displayed.contains(&index));
        assert!(data.frames[&span.end_frame].concealed.contains(&index));
    }
}

#[test]
fn looping_repeats_until_the_longest_track() {
    let doc = load(&two_bone_document(short_loop(5)));

    let plain = combine(&doc, 0, false).unwrap();
    assert!(!plain.is_loop);
    assert_eq!(plain.tracks[1].len(), 1);

    let data = combine(&doc, 0, true).unwrap();
    assert!(data.is_loop);
    let track: Vec<(u32, u32)> = data.tracks[1]
        .iter()
        .map(|&i| (data.spans[i].start_frame, data.spans[i].end_frame))
        .collect();
    assert_eq!(
        track,
        vec![(0, 5), (5, 10), (10, 15), (15, 20), (20, 25), (25, 30)]
    );
    assert!(data.tracks[1][1..].iter().all(|&i| data.spans[i].synthesized));
    assert_eq!(data.end_frame, 30);
}

#[test]
fn loop_extension_clamps_the_last_repeat() {
    let doc = load(&two_bone_document(short_loop(7)));
    let data = combine(&doc, 0, true).unwrap();
    let last = &data.spans[*data.tracks[1].last().unwrap()];
    assert_eq!((last.start_frame, last.end_frame), (28, 30));
    assert_eq!(last.duration(), 2);
    assert_eq!(data.tracks[1].len(), 5);
}

#[test]
fn loop_start_skips_intro_timelines() {
    let doc = load(&two_bone_document(json!({
        "timeline": [
            timeline(4, attach("keyframe", 0)),
            timeline(6, attach("keyframe", 1)),
        ],
        "loop_id": 1,
    })));
    let data = combine(&doc, 0, true).unwrap();
    let targets: Vec<(u32, Target)> = data.tracks[1]
        .iter()
        .map(|&i| (data.spans[i].start_frame, data.spans[i].target))
        .collect();
    assert_eq!(
        targets,
        vec![
            (0, Target::Keyframe(0)),
            (4, Target::Keyframe(1)),
            (10, Target::Keyframe(1)),
            (16, Target::Keyframe(1)),
            (22, Target::Keyframe(1)),
            (28, Target::Keyframe(1)),
        ]
    );
}

#[test]
fn direct_attachments_cover_the_skeleton_length() {
    let doc = load(&json!({
        "Keyframe": [{ "layer": [layer(0, SQUARE)] }],
        "Animation": [{ "timeline": [timeline(12, attach("keyframe", 0))] }],
        "Skeleton": [{
            "bone": [
                { "attach": attach("animation", 0) },
                { "attach": attach("keyframe", 0) },
            ],
        }],
    }));
    let data = combine(&doc, 0, false).unwrap();
    let fill = &data.spans[data.tracks[1][0]];
    assert_eq!(fill.animation, None);
    assert_eq!((fill.start_frame, fill.end_frame), (0, 12));
}

#[test]
fn sub_skeletons_are_flattened_and_cycles_rejected() {
    let doc = load(&json!({
        "Keyframe": [{ "layer": [layer(0, SQUARE)] }],
        "Animation": [{ "timeline": [timeline(3, attach("keyframe", 0))] }],
        "Skeleton": [
            { "name": "inner", "bone": [{ "attach": attach("animation", 0) }] },
            {
                "name": "outer",
                "bone": [
                    { "attach": attach("skeleton", 0) },
                    { "attach": attach("animation", 0) },
                ],
            },
            { "name": "loop", "bone": [{ "attach": attach("skeleton", 2) }] },
        ],
    }));
    let data = combine(&doc, 1, false).unwrap();
    assert_eq!(data.tracks.len(), 2);

    match combine(&doc, 2, false) {
        Err(Error::SkeletonCycle { skeleton }) => assert_eq!(skeleton, "loop"),
        other => panic!("expected a cycle error, got {other:?}"),
    }
}

#[test]
fn zero_length_and_empty_spans_produce_no_events() {
    let doc = load(&json!({
        "Keyframe": [{ "layer": [layer(0, SQUARE)] }],
        "Animation": [{
            "timeline": [
                timeline(0, attach("keyframe", 0)),
                timeline(5, json!(null)),
                { "time": 5, "attach": attach("keyframe", 0), "keyframe_mix": true },
            ],
        }],
        "Skeleton": [{ "bone": [{ "attach": attach("animation", 0) }] }],
    }));
    let data = combine(&doc, 0, false).unwrap();
    assert_eq!(data.spans.len(), 3);
    assert!(data.is_mix);
    let keys: Vec<u32> = data.frames.keys().copied().collect();
    assert_eq!(keys, vec![5, 10]);
    assert_eq!(data.frames[&5].displayed, vec![2]);
}

#[test]
fn skeleton_without_bones_combines_to_nothing() {
    let doc = load(&json!({ "Skeleton": [{ "name": "bare", "bone": [] }] }));
    let data = combine(&doc, 0, true).unwrap();
    assert!(data.is_empty());
    assert!(data.spans.is_empty());
    assert_eq!(data.end_frame, 0);
    assert!(!data.is_loop);
}

#[test]
fn tracks_past_the_frame_limit_are_rejected() {
    let doc = load(&json!({
        "Keyframe": [{ "layer": [layer(0, SQUARE)] }],
        "Animation": [{
            "name": "endless 0",
            "timeline": [
                timeline(4_000_000_000, attach("keyframe", 0)),
                timeline(4_000_000_000, attach("keyframe", 0)),
            ],
        }],
        "Skeleton": [{ "bone": [{ "attach": attach("animation", 0) }] }],
    }));
    match combine(&doc, 0, false) {
        Err(Error::InvalidValue { message }) => assert!(message.contains("endless 0"), "{message}"),
        other => panic!("expected an invalid value, got {other:?}"),
    }

    let doc = load(&json!({
        "Keyframe": [{ "layer": [layer(0, SQUARE)] }],
        "Animation": [{
            "timeline": [
                timeline(MAX_FRAME - 1, attach("keyframe", 0)),
                timeline(1, attach("keyframe", 0)),
            ],
        }],
        "Skeleton": [{ "bone": [{ "attach": attach("animation", 0) }] }],
    }));
    let data = combine(&doc, 0, false).unwrap();
    assert_eq!(data.end_frame, MAX_FRAME);
    assert_eq!(data.spans[1].frame_point().end, i32::MAX);
}
