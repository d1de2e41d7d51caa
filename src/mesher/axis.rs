//! One-dimensional coordinate generation for the structured lattice.

use log::warn;

/// Coordinates closer than this are the same lattice level.
pub const LEVEL_EPSILON: f64 = 1e-9;

/// `divisions + 1` evenly spaced values from `start` to `end`, both exact.
pub fn linspace(start: f64, end: f64, divisions: usize) -> Vec<f64> {
    let divisions = divisions.max(1);
    let step = (end - start) / divisions as f64;
    let mut values: Vec<f64> = (0..divisions).map(|i| start + step * i as f64).collect();
    values.push(end);
    values
}

/// Axis over `[start, end]` refined inside `refined`.
///
/// The refined interval gets `n_near` divisions and the remaining segments on
/// either side get `n_far` each. Segments share their boundary coordinate.
/// If the refined interval does not sit inside the axis, a single coarse
/// linspace over the whole axis is returned instead.
///
/// # Arguments
/// * `start` - Lower axis bound
/// * `end` - Upper axis bound
/// * `refined` - Sub-interval to refine
/// * `n_far` - Divisions of each coarse segment
/// * `n_near` - Divisions of the refined segment
pub fn refined_axis(
    start: f64,
    end: f64,
    refined: (f64, f64),
    n_far: usize,
    n_near: usize,
) -> Vec<f64> {
    let (rs, re) = refined;
    if rs < start - LEVEL_EPSILON || re > end + LEVEL_EPSILON || re - rs <= LEVEL_EPSILON {
        warn!(
            target: "mesh",
            "refinement interval [{rs}, {re}] lies outside axis [{start}, {end}], using uniform spacing"
        );
        return linspace(start, end, n_far);
    }
    let rs = rs.max(start);
    let re = re.min(end);

    let mut coords = Vec::new();
    if rs > start + LEVEL_EPSILON {
        coords.extend(linspace(start, rs, n_far));
        coords.pop();
    }
    coords.extend(linspace(rs, re, n_near));
    if re < end - LEVEL_EPSILON {
        coords.extend(linspace(re, end, n_far).into_iter().skip(1));
    }

    coords
}

/// Graded depth of level `k` out of `n` over a column of height `lz`.
///
/// `grading` blends uniform spacing (0) with sine biasing (1), which is finest
/// at the free surface.
pub fn graded_depth(k: usize, n: usize, lz: f64, grading: f64) -> f64 {
    if k >= n {
        return lz;
    }
    let t = k as f64 / n as f64;
    let uniform = (1.0 - grading) * k as f64 * lz / n as f64;
    let biased = grading * lz * (1.0 - (std::f64::consts::FRAC_PI_2 * t).cos());
    uniform + biased
}

/// Depth levels from the surface (0) down to `lz`, with every breakpoint
/// present as an exact level.
///
/// A breakpoint snaps the nearest graded level onto itself when that level is
/// within half the local spacing, otherwise it is inserted. The surface, the
/// base and levels already snapped never move.
pub fn depth_levels(lz: f64, nz: usize, grading: f64, breakpoints: &[f64]) -> Vec<f64> {
    let nz = nz.max(1);
    let mut levels: Vec<f64> = (0..=nz).map(|k| graded_depth(k, nz, lz, grading)).collect();
    let mut pinned = vec![false; levels.len()];
    pinned[0] = true;
    pinned[nz] = true;

    let mut breakpoints: Vec<f64> = breakpoints
        .iter()
        .copied()
        .filter(|&d| d > LEVEL_EPSILON && d < lz - LEVEL_EPSILON)
        .collect();
    breakpoints.sort_by(f64::total_cmp);

    for bp in breakpoints {
        let nearest = nearest_index(&levels, bp);
        let distance = (levels[nearest] - bp).abs();
        if distance <= LEVEL_EPSILON {
            levels[nearest] = bp;
            pinned[nearest] = true;
            continue;
        }

        let spacing = if bp > levels[nearest] {
            levels[nearest + 1] - levels[nearest]
        } else {
            levels[nearest] - levels[nearest - 1]
        };
        if !pinned[nearest] && distance <= 0.5 * spacing {
            levels[nearest] = bp;
            pinned[nearest] = true;
        } else {
            let at = levels.partition_point(|&d| d < bp);
            levels.insert(at, bp);
            pinned.insert(at, true);
        }
    }

    levels.dedup_by(|a, b| (*a - *b).abs() <= LEVEL_EPSILON);
    levels
}

/// Depth levels turned into ascending z coordinates (base first).
pub fn depths_to_z(depths: &[f64]) -> Vec<f64> {
    depths.iter().rev().map(|&d| if d == 0.0 { 0.0 } else { -d }).collect()
}

/// Coordinates of `axis` strictly between `lo` and `hi`, bracketed by both.
pub fn sub_axis(axis: &[f64], lo: f64, hi: f64, tolerance: f64) -> Vec<f64> {
    let mut coords = vec![lo];
    coords.extend(
        axis.iter()
            .copied()
            .filter(|&c| c > lo + tolerance && c < hi - tolerance),
    );
    coords.push(hi);
    coords
}

fn nearest_index(levels: &[f64], value: f64) -> usize {
    let mut best = 0;
    for (i, level) in levels.iter().enumerate() {
        if (level - value).abs() < (levels[best] - value).abs() {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn strictly_increasing(values: &[f64]) -> bool {
        values.windows(2).all(|w| w[1] > w[0])
    }

    #[test]
    fn linspace_hits_both_ends() {
        let values = linspace(0.0, 1.5, 4);
        assert_eq!(values.len(), 5);
        assert_eq!(values[0], 0.0);
        assert_eq!(values[4], 1.5);
        assert_relative_eq!(values[1], 0.375);
    }

    #[test]
    fn refined_axis_shares_segment_boundaries() {
        let quarter = refined_axis(0.0, 3.0, (0.0, 1.5), 6, 4);
        assert_eq!(quarter.len(), 11);
        assert!(strictly_increasing(&quarter));
        assert!(quarter.contains(&1.5));

        let full = refined_axis(0.0, 6.0, (1.5, 4.5), 3, 12);
        assert_eq!(full.len(), 19);
        assert!(strictly_increasing(&full));
        assert_eq!(full[3], 1.5);
        assert_eq!(full[15], 4.5);

        let near = full[4] - full[3];
        let far = full[1] - full[0];
        assert!(near < far);
    }

    #[test]
    fn refined_axis_degrades_outside_bounds() {
        let coords = refined_axis(0.0, 3.0, (2.0, 4.0), 6, 4);
        assert_eq!(coords, linspace(0.0, 3.0, 6));
    }

    #[test]
    fn grading_is_finer_near_surface() {
        let levels = depth_levels(10.0, 10, 1.0, &[]);
        assert_eq!(levels.len(), 11);
        assert_eq!(levels[10], 10.0);
        assert!(levels[1] - levels[0] < levels[10] - levels[9]);

        let uniform = depth_levels(10.0, 20, 0.0, &[]);
        assert_eq!(uniform[3], 1.5);
    }

    #[test]
    fn breakpoints_become_exact_levels() {
        let levels = depth_levels(10.0, 10, 0.5, &[1.5, 2.0, 5.0, 9.0]);
        for bp in [1.5, 2.0, 5.0, 9.0] {
            assert!(levels.iter().any(|&d| d == bp), "missing level {bp}");
        }
        assert!(strictly_increasing(&levels));
        assert_eq!(levels[0], 0.0);
        assert_eq!(*levels.last().unwrap(), 10.0);
    }

    #[test]
    fn sub_axis_brackets_inner_coordinates() {
        let axis = linspace(0.0, 3.0, 6);
        assert_eq!(sub_axis(&axis, 0.0, 1.5, 1e-6), vec![0.0, 0.5, 1.0, 1.5]);
        assert_eq!(depths_to_z(&[0.0, 1.0, 2.5]), vec![-2.5, -1.0, 0.0]);
    }
}
