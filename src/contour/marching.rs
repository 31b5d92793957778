//! Iso-lines of a scalar field sampled on a regular longitude/latitude grid.
//!
//! Marching squares with the saddle cells resolved by the average of the four
//! corners, then the segments are joined into paths through the grid edges they
//! share and simplified with Ramer–Douglas–Peucker.

use ahash::AHashMap;

use crate::{constants::Degree, contour::geojson::Position};

/// Scalar field sampled at `lon0 + i·dlon`, `lat0 + j·dlat`, row-major (`j · nlon + i`).
///
/// A periodic grid wraps in longitude: the cell on the right of column `nlon - 1`
/// reaches back to column 0.
#[derive(Debug, Clone)]
pub struct SampledGrid {
    pub lon0: Degree,
    pub dlon: Degree,
    pub nlon: usize,
    pub lat0: Degree,
    pub dlat: Degree,
    pub nlat: usize,
    pub periodic: bool,
    pub values: Vec<f64>,
}

/// A grid edge crossed by an iso-line: horizontal edges join `(i, j)` to `(i + 1, j)`,
/// vertical ones `(i, j)` to `(i, j + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EdgeKey {
    H(usize, usize),
    V(usize, usize),
}

impl SampledGrid {
    #[inline]
    fn value(&self, i: usize, j: usize) -> f64 {
        self.values[j * self.nlon + i % self.nlon]
    }

    fn n_cell_columns(&self) -> usize {
        if self.periodic {
            self.nlon
        } else {
            self.nlon.saturating_sub(1)
        }
    }

    fn wrap(&self, i: usize) -> usize {
        if self.periodic {
            i % self.nlon
        } else {
            i
        }
    }

    /// Crossing of the `level` on an edge, by linear interpolation.
    fn crossing(&self, key: EdgeKey, level: f64) -> Position {
        let (i, j, di, dj) = match key {
            EdgeKey::H(i, j) => (i, j, 1, 0),
            EdgeKey::V(i, j) => (i, j, 0, 1),
        };
        let va = self.value(i, j);
        let vb = self.value(i + di, j + dj);
        let t = if vb != va {
            ((level - va) / (vb - va)).clamp(0.0, 1.0)
        } else {
            0.5
        };
        [
            self.lon0 + (i as f64 + t * di as f64) * self.dlon,
            self.lat0 + (j as f64 + t * dj as f64) * self.dlat,
        ]
    }

    /// Paths along which the field equals `level`, the region `value <= level` being inside.
    ///
    /// Paths that leave the grid are returned open; the others are closed (first point
    /// repeated at the end). The output only depends on the grid, so it is reproducible.
    pub fn iso_lines(&self, level: f64) -> Vec<Vec<Position>> {
        let segments = self.segments(level);
        join_segments(&segments)
            .into_iter()
            .map(|keys| keys.into_iter().map(|k| self.crossing(k, level)).collect())
            .collect()
    }

    fn segments(&self, level: f64) -> Vec<[EdgeKey; 2]> {
        let mut segments = Vec::new();
        if self.nlat < 2 {
            return segments;
        }

        for j in 0..self.nlat - 1 {
            for i in 0..self.n_cell_columns() {
                let v00 = self.value(i, j);
                let v10 = self.value(i + 1, j);
                let v11 = self.value(i + 1, j + 1);
                let v01 = self.value(i, j + 1);

                let case = (v00 <= level) as u8
                    | ((v10 <= level) as u8) << 1
                    | ((v11 <= level) as u8) << 2
                    | ((v01 <= level) as u8) << 3;

                let bottom = EdgeKey::H(i, j);
                let top = EdgeKey::H(i, j + 1);
                let left = EdgeKey::V(i, j);
                let right = EdgeKey::V(self.wrap(i + 1), j);

                let center_inside = 0.25 * (v00 + v10 + v11 + v01) <= level;

                match case {
                    0 | 15 => {}
                    1 | 14 => segments.push([left, bottom]),
                    2 | 13 => segments.push([bottom, right]),
                    3 | 12 => segments.push([left, right]),
                    4 | 11 => segments.push([right, top]),
                    6 | 9 => segments.push([bottom, top]),
                    7 | 8 => segments.push([left, top]),
                    5 => {
                        if center_inside {
                            segments.push([bottom, right]);
                            segments.push([left, top]);
                        } else {
                            segments.push([left, bottom]);
                            segments.push([right, top]);
                        }
                    }
                    10 => {
                        if center_inside {
                            segments.push([left, bottom]);
                            segments.push([right, top]);
                        } else {
                            segments.push([bottom, right]);
                            segments.push([left, top]);
                        }
                    }
                    _ => unreachable!("marching squares case {case}"),
                }
            }
        }
        segments
    }
}

/// Chain segments sharing an edge; open chains first, then cycles.
fn join_segments(segments: &[[EdgeKey; 2]]) -> Vec<Vec<EdgeKey>> {
    let mut incident: AHashMap<EdgeKey, Vec<usize>> = AHashMap::with_capacity(segments.len());
    for (s, keys) in segments.iter().enumerate() {
        for key in keys {
            incident.entry(*key).or_default().push(s);
        }
    }

    let mut used = vec![false; segments.len()];
    let mut paths = Vec::new();

    let walk = |start: EdgeKey, first: usize, used: &mut Vec<bool>| {
        let mut path = vec![start];
        let mut key = start;
        let mut seg = Some(first);
        while let Some(s) = seg {
            used[s] = true;
            let [a, b] = segments[s];
            key = if a == key { b } else { a };
            path.push(key);
            seg = incident
                .get(&key)
                .and_then(|ns| ns.iter().copied().find(|&n| !used[n]));
        }
        path
    };

    // open chains start at an edge crossed by a single segment
    for (s, keys) in segments.iter().enumerate() {
        for &key in keys {
            if !used[s] && incident.get(&key).map_or(0, Vec::len) == 1 {
                paths.push(walk(key, s, &mut used));
            }
        }
    }
    for (s, keys) in segments.iter().enumerate() {
        if !used[s] {
            paths.push(walk(keys[0], s, &mut used));
        }
    }
    paths
}

fn point_segment_distance(p: &Position, a: &Position, b: &Position) -> f64 {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return (p[0] - a[0]).hypot(p[1] - a[1]);
    }
    let t = (((p[0] - a[0]) * dx + (p[1] - a[1]) * dy) / len2).clamp(0.0, 1.0);
    (p[0] - a[0] - t * dx).hypot(p[1] - a[1] - t * dy)
}

/// Ramer–Douglas–Peucker simplification; both end points are kept.
pub fn simplify(path: &[Position], epsilon: f64) -> Vec<Position> {
    if path.len() < 3 {
        return path.to_vec();
    }

    let mut keep = vec![false; path.len()];
    keep[0] = true;
    keep[path.len() - 1] = true;

    let mut stack = vec![(0, path.len() - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let (farthest, distance) = (start + 1..end)
            .map(|k| (k, point_segment_distance(&path[k], &path[start], &path[end])))
            .fold((start, -1.0), |best, cur| if cur.1 > best.1 { cur } else { best });
        if distance > epsilon {
            keep[farthest] = true;
            stack.push((start, farthest));
            stack.push((farthest, end));
        }
    }

    path.iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

/// Make longitudes continuous along a path, the first one wrapped into `[0, 360)`.
///
/// Each longitude is moved by whole turns to within 180° of the previous one. A closed
/// path winding once around a pole ends a full turn away from its start; it is closed
/// again along the pole on the side of its mean latitude.
pub fn unwrap_longitudes(path: &[Position]) -> Vec<Position> {
    let Some(first) = path.first() else {
        return Vec::new();
    };
    let closed = path.len() > 1 && path.first() == path.last();

    let mut unwrapped = Vec::with_capacity(path.len() + 3);
    let mut previous = first[0].rem_euclid(360.0);
    unwrapped.push([previous, first[1]]);
    for p in &path[1..] {
        previous += (p[0] - previous + 180.0).rem_euclid(360.0) - 180.0;
        unwrapped.push([previous, p[1]]);
    }

    let start = unwrapped[0];
    if closed && (previous - start[0]).abs() > 180.0 {
        let mean_lat = unwrapped.iter().map(|p| p[1]).sum::<f64>() / unwrapped.len() as f64;
        let pole = 90.0_f64.copysign(mean_lat);
        unwrapped.push([previous, pole]);
        unwrapped.push([start[0], pole]);
        unwrapped.push(start);
    }
    unwrapped
}

/// Length of a path in the longitude/latitude plane, in degrees.
pub fn path_length(path: &[Position]) -> f64 {
    path.windows(2)
        .map(|w| (w[1][0] - w[0][0]).hypot(w[1][1] - w[0][1]))
        .sum()
}
