use crate::test_support::{SQUARE, assert_approx, attach, layer, load};
use crate::{KeyframeLayer, Rect, Target};
use proptest::prelude::*;
use serde_json::json;

fn textured(src: [f32; 8], tex_id: u32) -> KeyframeLayer {
    KeyframeLayer::from_raw(Some(src), src, tex_id, 0, Vec::new(), None)
}

#[test]
fn bounding_rect_of_rotated_quad() {
    let r = Rect::bounding(&[5.0, 0.0, 10.0, 5.0, 5.0, 10.0, 0.0, 5.0]);
    assert_eq!(
        r,
        Rect {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0
        }
    );
}

#[test]
fn uvs_follow_lexicographic_corner_rank() {
    let l = textured(SQUARE, 0);
    assert_eq!(l.uvs, [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]);

    // Same square, corners listed starting from the far corner.
    let l = textured([10.0, 10.0, 0.0, 10.0, 0.0, 0.0, 10.0, 0.0], 0);
    assert_eq!(l.uvs, [1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0]);
}

#[test]
fn zero_center_is_centred_on_origin() {
    let l = textured([3.0, 7.0, 23.0, 7.0, 23.0, 17.0, 3.0, 17.0], 2);
    assert_eq!(l.zero_center, [-10.0, -5.0, 10.0, -5.0, 10.0, 5.0, -10.0, 5.0]);
    let (sx, sy) = l
        .zero_center
        .chunks_exact(2)
        .fold((0.0, 0.0), |(sx, sy), c| (sx + c[0], sy + c[1]));
    assert_approx(sx, 0.0);
    assert_approx(sy, 0.0);
    assert_approx(l.width(), 20.0);
    assert_approx(l.height(), 10.0);
}

#[test]
fn fingerprint_depends_on_source_content_only() {
    let a = textured(SQUARE, 0);
    let moved = KeyframeLayer::from_raw(
        Some(SQUARE),
        [100.0, 100.0, 110.0, 100.0, 110.0, 110.0, 100.0, 110.0],
        0,
        1,
        vec!["glow".to_string()],
        None,
    );
    assert_eq!(a.fingerprint, moved.fingerprint);

    assert_ne!(a.fingerprint, textured(SQUARE, 1).fingerprint);
    let mut shifted = SQUARE;
    shifted[0] = 1.0;
    assert_ne!(a.fingerprint, textured(shifted, 0).fingerprint);
}

#[test]
fn fingerprint_treats_negative_zero_as_zero() {
    let mut negative = SQUARE;
    negative[0] = -0.0;
    negative[1] = -0.0;
    assert_eq!(
        textured(SQUARE, 0).fingerprint,
        textured(negative, 0).fingerprint
    );
}

#[test]
fn fog_layer_uses_destination_bounds_and_colours() {
    let red = [[1.0, 0.0, 0.0, 1.0]; 4];
    let blue = [[0.0, 0.0, 1.0, 1.0]; 4];
    let dst = [0.0, 0.0, 40.0, 0.0, 40.0, 20.0, 0.0, 20.0];
    let fog = KeyframeLayer::from_raw(None, dst, 0, 0, Vec::new(), Some(red));
    assert!(fog.is_fog());
    assert_approx(fog.width(), 40.0);
    assert_approx(fog.height(), 20.0);

    let same = KeyframeLayer::from_raw(None, dst, 3, 0, Vec::new(), Some(red));
    let other = KeyframeLayer::from_raw(None, dst, 0, 0, Vec::new(), Some(blue));
    assert_eq!(fog.fingerprint, same.fingerprint);
    assert_ne!(fog.fingerprint, other.fingerprint);
    assert_ne!(fog.fingerprint, textured(dst, 0).fingerprint);
}

#[test]
fn explicit_layer_order_drives_render_positions() {
    let doc = load(&json!({
        "Keyframe": [{
            "layer": [layer(0, SQUARE), layer(1, SQUARE)],
            "order": [1, 0],
        }],
    }));
    let keyframe = &doc.keyframes[0];
    let ordered: Vec<(usize, u32)> = keyframe
        .layers_in_order()
        .into_iter()
        .map(|(pos, l)| (pos, l.tex_id))
        .collect();
    assert_eq!(ordered, vec![(0, 1), (1, 0)]);
}

#[test]
fn displayed_keyframe_follows_slot_indirection() {
    let doc = load(&json!({
        "Keyframe": [{ "layer": [layer(0, SQUARE)] }, { "layer": [layer(4, SQUARE)] }],
        "Slot": [[attach("keyframe", 1), attach("keyframe", 0)]],
    }));
    assert_eq!(doc.slots[0].targets, vec![Target::Keyframe(1), Target::Keyframe(0)]);
    let shown = doc.displayed_keyframe(Target::Slot(0)).unwrap();
    assert_eq!(shown.layers[0].tex_id, 4);
    assert!(doc.displayed_keyframe(Target::None).is_none());
    assert!(doc.displayed_keyframe(Target::Slot(3)).is_none());
}

fn any_quad() -> impl Strategy<Value = [f32; 8]> {
    prop::array::uniform8(-1000.0f32..1000.0)
}

proptest! {
    #[test]
    fn fingerprint_tracks_source_quad_and_texture(
        src in any_quad(),
        dst in any_quad(),
        tex_id in 0u32..16,
        corner in 0usize..8,
        delta in 0.5f32..100.0,
    ) {
        let base = textured(src, tex_id);
        let placed = KeyframeLayer::from_raw(Some(src), dst, tex_id, 1, Vec::new(), None);
        prop_assert_eq!(base.fingerprint, placed.fingerprint);

        let mut moved = src;
        moved[corner] += delta;
        prop_assert_ne!(base.fingerprint, textured(moved, tex_id).fingerprint);
        prop_assert_ne!(base.fingerprint, textured(src, tex_id + 1).fingerprint);
    }

    #[test]
    fn uvs_are_unit_corners_and_zero_center_sums_to_origin(src in any_quad()) {
        let l = textured(src, 0);
        let mut corners: Vec<(f32, f32)> =
            l.uvs.chunks_exact(2).map(|c| (c[0], c[1])).collect();
        corners.sort_by(|a, b| a.partial_cmp(b).unwrap());
        prop_assert_eq!(corners, vec![(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)]);

        let (sx, sy) = l
            .zero_center
            .chunks_exact(2)
            .fold((0.0f32, 0.0f32), |(sx, sy), c| (sx + c[0], sy + c[1]));
        prop_assert!(sx.abs() <= 1e-3, "x sum {}", sx);
        prop_assert!(sy.abs() <= 1e-3, "y sum {}", sy);
    }
}
