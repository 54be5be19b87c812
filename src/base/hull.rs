//! Shared tree-hull and mass-point recursion, used by both `PBase` and the
//! CAR weight base (§4.2, §4.5). A "group" is one set of siblings that must
//! sum to 1; a base made of several independent alternatives is simply
//! several independent top-level groups handed to the same recursion.
//!
//! Grounded on the teacher's `linalg::vector_ops` elementwise helpers: small
//! free functions over `&[f64]` slices rather than methods on a solver
//! struct, since this recursion is shared by more than one owner type.

use crate::error::{EngineError, EngineResult};
use crate::limits::{EPS, EPS_SUM, VX_CUTOFFDIM, VX_MAXDIM};

/// Per-variable local and global hull bounds, indexed the same way as the
/// `box_lo`/`box_up` slices passed in.
#[derive(Debug, Clone)]
pub struct HullResult {
    pub l_hull_lo: Vec<f64>,
    pub l_hull_up: Vec<f64>,
    pub hull_lo: Vec<f64>,
    pub hull_up: Vec<f64>,
}

/// Runs stage 2 (§4.2) over every group in `top_groups`, recursing into
/// `children(node)` for any node with a non-empty child list.
pub fn tree_hull(
    children: &dyn Fn(usize) -> Vec<usize>,
    top_groups: &[Vec<usize>],
    total_nodes: usize,
    box_lo: &[f64],
    box_up: &[f64],
) -> EngineResult<HullResult> {
    let mut out = HullResult {
        l_hull_lo: vec![0.0; total_nodes],
        l_hull_up: vec![1.0; total_nodes],
        hull_lo: vec![0.0; total_nodes],
        hull_up: vec![1.0; total_nodes],
    };
    for group in top_groups {
        recurse_hull(children, group, 1.0, 1.0, box_lo, box_up, &mut out)?;
    }
    Ok(out)
}

fn recurse_hull(
    children: &dyn Fn(usize) -> Vec<usize>,
    siblings: &[usize],
    p_lobo: f64,
    p_upbo: f64,
    box_lo: &[f64],
    box_up: &[f64],
    out: &mut HullResult,
) -> EngineResult<()> {
    if siblings.is_empty() {
        return Ok(());
    }
    let mut pmin: f64 = siblings.iter().map(|&v| box_lo[v]).sum();
    let mut pmax: f64 = siblings.iter().map(|&v| box_up[v]).sum();
    if pmin > 1.0 + EPS_SUM || pmax < 1.0 - EPS_SUM {
        return Err(EngineError::Inconsistent);
    }
    pmin = pmin.min(1.0);
    pmax = pmax.max(1.0);

    for &v in siblings {
        let l_hull_lo = (box_lo[v]).max(box_up[v] + 1.0 - pmax);
        let l_hull_up = (box_up[v]).min(box_lo[v] + 1.0 - pmin);
        if l_hull_up < l_hull_lo - EPS {
            return Err(EngineError::Inconsistent);
        }
        out.l_hull_lo[v] = l_hull_lo;
        out.l_hull_up[v] = l_hull_up;
        out.hull_lo[v] = l_hull_lo * p_lobo;
        out.hull_up[v] = l_hull_up * p_upbo;

        let kids = children(v);
        if !kids.is_empty() {
            recurse_hull(children, &kids, out.hull_lo[v], out.hull_up[v], box_lo, box_up, out)?;
        }
    }
    Ok(())
}

/// Stage 4 (§4.2): the canonical feasible local/global mass point, with the
/// vertex/warp correction blended in per sibling group.
pub fn mass_point(
    children: &dyn Fn(usize) -> Vec<usize>,
    top_groups: &[Vec<usize>],
    total_nodes: usize,
    l_mhull_lo: &[f64],
    l_mhull_up: &[f64],
) -> EngineResult<(Vec<f64>, Vec<f64>)> {
    let mut l_mp = vec![0.0; total_nodes];
    let mut mp = vec![0.0; total_nodes];
    for group in top_groups {
        recurse_mass_point(children, group, 1.0, l_mhull_lo, l_mhull_up, &mut l_mp, &mut mp)?;
    }
    Ok((l_mp, mp))
}

fn recurse_mass_point(
    children: &dyn Fn(usize) -> Vec<usize>,
    siblings: &[usize],
    norm: f64,
    l_mhull_lo: &[f64],
    l_mhull_up: &[f64],
    l_mp: &mut [f64],
    mp: &mut [f64],
) -> EngineResult<()> {
    if siblings.is_empty() {
        return Ok(());
    }
    let pmin: f64 = siblings.iter().map(|&v| l_mhull_lo[v]).sum();
    let pmax: f64 = siblings.iter().map(|&v| l_mhull_up[v]).sum();

    let (lofrac, upfrac) = if pmin >= 1.0 - EPS {
        (1.0, 0.0)
    } else if pmax <= 1.0 + EPS {
        (0.0, 1.0)
    } else if pmax > pmin + EPS {
        let lofrac = (pmax - 1.0) / (pmax - pmin);
        (lofrac, 1.0 - lofrac)
    } else {
        (0.5, 0.5)
    };

    let bounds: Vec<(f64, f64)> =
        siblings.iter().map(|&v| (l_mhull_lo[v], l_mhull_up[v])).collect();
    let plain: Vec<f64> = bounds.iter().map(|&(lo, up)| lofrac * lo + upfrac * up).collect();
    let warp = adjust_vx(&bounds, 1.0);
    let blend = warp_blend_factor(siblings.len());

    let mut sum_check = 0.0;
    for (i, &v) in siblings.iter().enumerate() {
        let final_v = match &warp {
            Some(w) => (1.0 - blend) * plain[i] + blend * w[i],
            None => plain[i],
        };
        l_mp[v] = final_v;
        mp[v] = norm * final_v;
        sum_check += final_v;

        let kids = children(v);
        if !kids.is_empty() {
            recurse_mass_point(children, &kids, mp[v], l_mhull_lo, l_mhull_up, l_mp, mp)?;
        }
    }
    if (sum_check - 1.0).abs() > EPS_SUM {
        return Err(EngineError::Inconsistent);
    }
    Ok(())
}

/// Above [`VX_CUTOFFDIM`] siblings the warp contribution is tapered linearly
/// to zero at [`VX_MAXDIM`]; below it, a flat 1/2 blend is used.
fn warp_blend_factor(dim: usize) -> f64 {
    if dim <= VX_CUTOFFDIM {
        0.5
    } else if dim >= VX_MAXDIM {
        0.0
    } else {
        let span = (VX_MAXDIM - VX_CUTOFFDIM) as f64;
        0.5 * (1.0 - (dim - VX_CUTOFFDIM) as f64 / span)
    }
}

/// The vertex/warp correction (§4.2 stage 4.3): enumerates the extreme
/// vertices of the simplex `{x : lo ≤ x ≤ up, Σx = target}` by depth-first
/// path-splitting over the non-collapsed (active) dimensions, and returns
/// the weighted-average vertex coordinate per dimension. Returns `None` when
/// there is nothing to warp (no active dims, too many dims, or a degenerate
/// normalizer).
fn adjust_vx(bounds: &[(f64, f64)], target: f64) -> Option<Vec<f64>> {
    let dim = bounds.len();
    if dim == 0 || dim > VX_MAXDIM {
        return None;
    }
    let active: Vec<usize> = (0..dim).filter(|&i| bounds[i].1 - bounds[i].0 > EPS).collect();
    let k = active.len();
    if k == 0 {
        return None;
    }
    let collapsed_sum: f64 =
        (0..dim).filter(|i| !active.contains(i)).map(|&i| bounds[i].0).sum();
    let pivot = active[k - 1];
    let free = &active[..k - 1];

    let mut contributions = vec![0.0f64; dim];
    let mut vertices: Vec<(f64, f64, Vec<(usize, f64)>)> = Vec::new();
    let mut sum2 = 0.0f64;

    let combos = 1usize << free.len();
    for mask in 0..combos {
        let mut sigma = collapsed_sum;
        let mut values: Vec<(usize, f64)> = Vec::with_capacity(dim);
        let mut up_count = 0usize;
        for (bit, &d) in free.iter().enumerate() {
            let use_up = (mask >> bit) & 1 == 1;
            let v = if use_up { bounds[d].1 } else { bounds[d].0 };
            if use_up {
                up_count += 1;
            }
            sigma += v;
            values.push((d, v));
        }
        let pivot_val = target - sigma;
        if pivot_val < bounds[pivot].0 - EPS || pivot_val > bounds[pivot].1 + EPS {
            continue;
        }
        let pivot_val = pivot_val.clamp(bounds[pivot].0, bounds[pivot].1);
        values.push((pivot, pivot_val));

        let s_pow = (target - sigma).abs().powi(dim as i32 - 1);
        let sign = if up_count % 2 == 0 { 1.0 } else { -1.0 };
        sum2 += s_pow;
        vertices.push((sign * s_pow, sigma, values));
    }

    if vertices.is_empty() || sum2.abs() < EPS {
        return None;
    }

    for (signed_weight, sigma, values) in &vertices {
        for &(d, c) in values {
            contributions[d] += signed_weight * (dim as f64 * c + target - sigma) / (dim as f64 * sum2);
        }
    }
    Some(contributions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_hull_with_no_statements_is_unit_box() {
        let children = |_: usize| Vec::new();
        let groups = vec![vec![0usize, 1usize]];
        let box_lo = vec![0.0, 0.0];
        let box_up = vec![1.0, 1.0];
        let hull = tree_hull(&children, &groups, 2, &box_lo, &box_up).unwrap();
        assert!((hull.l_hull_lo[0] - 0.0).abs() < 1e-9);
        assert!((hull.l_hull_up[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn inconsistent_siblings_reported() {
        let children = |_: usize| Vec::new();
        let groups = vec![vec![0usize, 1usize]];
        let box_lo = vec![0.6, 0.6];
        let box_up = vec![1.0, 1.0];
        let err = tree_hull(&children, &groups, 2, &box_lo, &box_up).unwrap_err();
        assert_eq!(err, EngineError::Inconsistent);
    }

    #[test]
    fn mass_point_sums_to_one() {
        let children = |_: usize| Vec::new();
        let groups = vec![vec![0usize, 1usize, 2usize]];
        let lo = vec![0.0, 0.0, 0.0];
        let up = vec![1.0, 1.0, 1.0];
        let (l_mp, mp) = mass_point(&children, &groups, 3, &lo, &up).unwrap();
        let sum: f64 = l_mp.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!((mp[0] - l_mp[0]).abs() < 1e-12);
    }

    #[test]
    fn warp_blend_factor_tapers() {
        assert_eq!(warp_blend_factor(3), 0.5);
        assert_eq!(warp_blend_factor(VX_MAXDIM), 0.0);
        assert!(warp_blend_factor(VX_CUTOFFDIM + 1) < 0.5);
    }
}
