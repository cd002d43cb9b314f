/// Ear-clipping triangulator for simple polygons given as flat `x, y` pairs.
#[derive(Default)]
pub(crate) struct Triangulator;

impl Triangulator {
    pub(crate) fn triangulate(&self, vertices: &[f32]) -> Vec<u16> {
        let vertex_count = vertices.len() / 2;
        if vertex_count < 3 {
            return Vec::new();
        }

        let mut indices: Vec<usize> = (0..vertex_count).collect();
        let mut concave: Vec<bool> = (0..vertex_count)
            .map(|i| is_concave_at(i, vertex_count, vertices, &indices))
            .collect();

        let mut triangles: Vec<u16> = Vec::with_capacity((vertex_count - 2) * 3);
        let mut remaining = vertex_count;

        while remaining > 3 {
            let mut previous = remaining - 1;
            let mut i = 0usize;
            let mut next = 1usize;

            loop {
                if !concave[i] && is_ear(previous, i, next, remaining, vertices, &indices, &concave)
                {
                    break;
                }

                if next == 0 {
                    // No clean ear: fall back to the last convex corner, or the first one.
                    while i > 0 && concave[i] {
                        i -= 1;
                    }
                    break;
                }

                previous = i;
                i = next;
                next = (next + 1) % remaining;
            }

            triangles.push(indices[(remaining + i - 1) % remaining] as u16);
            triangles.push(indices[i] as u16);
            triangles.push(indices[(i + 1) % remaining] as u16);

            indices.remove(i);
            concave.remove(i);
            remaining -= 1;

            let before = (remaining + i - 1) % remaining;
            let after = if i == remaining { 0 } else { i };
            concave[before] = is_concave_at(before, remaining, vertices, &indices);
            concave[after] = is_concave_at(after, remaining, vertices, &indices);
        }

        triangles.push(indices[2] as u16);
        triangles.push(indices[0] as u16);
        triangles.push(indices[1] as u16);

        triangles
    }
}

fn point(vertices: &[f32], index: usize) -> (f32, f32) {
    (vertices[index * 2], vertices[index * 2 + 1])
}

fn is_ear(
    previous: usize,
    current: usize,
    next: usize,
    remaining: usize,
    vertices: &[f32],
    indices: &[usize],
    concave: &[bool],
) -> bool {
    let p1 = point(vertices, indices[previous]);
    let p2 = point(vertices, indices[current]);
    let p3 = point(vertices, indices[next]);

    let mut k = (next + 1) % remaining;
    while k != previous {
        if concave[k] {
            let v = point(vertices, indices[k]);
            if positive_area(p3, p1, v) && positive_area(p1, p2, v) && positive_area(p2, p3, v) {
                return false;
            }
        }
        k = (k + 1) % remaining;
    }
    true
}

fn positive_area(p1: (f32, f32), p2: (f32, f32), p3: (f32, f32)) -> bool {
    p1.0 * (p3.1 - p2.1) + p2.0 * (p1.1 - p3.1) + p3.0 * (p2.1 - p1.1) >= 0.0
}

fn is_concave_at(index: usize, count: usize, vertices: &[f32], indices: &[usize]) -> bool {
    let previous = point(vertices, indices[(count + index - 1) % count]);
    let current = point(vertices, indices[index]);
    let next = point(vertices, indices[(index + 1) % count]);
    !positive_area(previous, current, next)
}
