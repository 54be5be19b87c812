//! NEMO: the moment calculus producing per-alternative mean, variance, and
//! third central moment (§4.4).
//!
//! P-node moments treat a sibling group as a generalized Dirichlet; V-node
//! moments treat a leaf's interval as a triangular distribution. Per-leaf
//! product moments combine the two, and a separable sibling-covariance
//! model approximates cross-leaf dependence (only leaves sharing a parent
//! are treated as correlated; the rest are assumed independent).

use crate::error::EngineResult;
use crate::limits::EPS;

use super::Evaluator;

#[derive(Debug, Clone, Copy, Default)]
struct PMoments {
    mean: f64,
    var: f64,
    cov: f64,
}

#[derive(Debug, Clone, Copy)]
struct VMoments {
    mean: f64,
    var: f64,
    tcm: f64,
}

#[derive(Debug, Clone, Copy)]
struct ProductMoments {
    mean: f64,
    var: f64,
    cov: f64,
    tcm: f64,
}

/// Per-alternative mean, variance, third central moment, and standard
/// deviation of expected value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub mean: f64,
    pub variance: f64,
    pub third_central_moment: f64,
    pub std_dev: f64,
}

fn v_node_moments(lo: f64, up: f64, declared_mid: f64) -> VMoments {
    let t = up - lo;
    if t.abs() < EPS {
        return VMoments { mean: declared_mid, var: 0.0, tcm: 0.0 };
    }
    let adm_lo = (2.0 * lo + up) / 3.0;
    let adm_up = (lo + 2.0 * up) / 3.0;
    let clipped = declared_mid.clamp(adm_lo, adm_up);
    let mean = 0.5 * (clipped + declared_mid);
    let mode = 3.0 * mean - lo - up;
    let q = (mode - lo) / t;
    let var = t * t * (1.0 - q + q * q) / 18.0;
    let mut tcm = t.powi(3) * (2.0 - 3.0 * q - 3.0 * q * q + 2.0 * q * q * q) / 270.0;
    if tcm.abs() < EPS.powi(3) {
        tcm = 0.0;
    }
    VMoments { mean, var, tcm }
}

impl<'a> Evaluator<'a> {
    /// Per-alternative NEMO moments of expected value.
    pub fn moments(&self, alt: usize) -> EngineResult<Moments> {
        let leaf_moments = self.leaf_product_moments(alt)?;
        let mean: f64 = leaf_moments.iter().map(|(_, m)| m.mean).sum();
        let var_sum: f64 = leaf_moments.iter().map(|(_, m)| m.var).sum();
        let tcm_sum: f64 = leaf_moments.iter().map(|(_, m)| m.tcm).sum();

        let mut covar_sum = 0.0;
        for i in 0..leaf_moments.len() {
            for j in (i + 1)..leaf_moments.len() {
                let (ni, _) = leaf_moments[i];
                let (nj, _) = leaf_moments[j];
                if self.frame().same_parent(ni, nj)? {
                    covar_sum += -leaf_moments[i].1.cov * leaf_moments[j].1.cov;
                }
            }
        }

        let mut variance = (var_sum + 2.0 * covar_sum).max(0.0);
        if variance.abs() < EPS {
            variance = 0.0;
        }
        let std_dev = variance.sqrt();

        // Normalized by n_nodes rather than a proper cumulant law; preserved
        // as a documented approximation (DESIGN.md, Open Question 4).
        let n_nodes = leaf_moments.len().max(1) as f64;
        let mut tcm = tcm_sum / n_nodes;
        if tcm.abs() < EPS {
            tcm = 0.0;
        }

        Ok(Moments { mean, variance, third_central_moment: tcm, std_dev })
    }

    /// Per-leaf standard deviation of the `P*V` product, for `(alt, leaf)`.
    pub fn per_variable_std_dev(&self, alt: usize) -> EngineResult<Vec<(usize, f64)>> {
        Ok(self
            .leaf_product_moments(alt)?
            .into_iter()
            .map(|(node, m)| (node, m.var.max(0.0).sqrt()))
            .collect())
    }

    fn leaf_product_moments(&self, alt: usize) -> EngineResult<Vec<(usize, ProductMoments)>> {
        let mut p_local = std::collections::HashMap::new();
        let top = self.frame().top_level_b1(alt)?;
        self.p_moments_recurse(&top, &mut p_local)?;

        let mut out = Vec::new();
        for leaf in self.frame().leaves_of_alt(alt)? {
            let local = p_local.get(&leaf).copied().unwrap_or_default();
            let local_mp = self.p_base().local_mass_point_at(leaf)?.max(EPS);
            let global_mp = self.p_base().mass_point_at(leaf)?;
            let ancestor_factor = global_mp / local_mp;
            let p_var = local.var * ancestor_factor * ancestor_factor;
            let p_cov = local.cov * ancestor_factor * ancestor_factor;

            let (lo, up) = self.v_base().hull(leaf)?;
            let v_mid = self.v_base().mass_point_at(leaf)?;
            let vm = v_node_moments(lo, up, v_mid);

            let pv_mean = global_mp * vm.mean;
            let pv_var = p_var * vm.var + p_var * vm.mean * vm.mean + global_mp * global_mp * vm.var;
            let pv_cov = p_cov.max(0.0).sqrt() * vm.mean;
            let pv_tcm = global_mp * vm.tcm;

            out.push((leaf, ProductMoments { mean: pv_mean, var: pv_var, cov: pv_cov, tcm: pv_tcm }));
        }
        Ok(out)
    }

    fn p_moments_recurse(
        &self,
        siblings: &[usize],
        out: &mut std::collections::HashMap<usize, PMoments>,
    ) -> EngineResult<()> {
        if siblings.is_empty() {
            return Ok(());
        }
        let mut l_hull_lo = Vec::with_capacity(siblings.len());
        let mut l_hull_up = Vec::with_capacity(siblings.len());
        let mut l_mp = Vec::with_capacity(siblings.len());
        for &node in siblings {
            let (lo, up) = self.p_base().local_hull(node)?;
            l_hull_lo.push(lo);
            l_hull_up.push(up);
            l_mp.push(self.p_base().local_mass_point_at(node)?);
        }
        let sum_width: f64 = l_hull_lo.iter().zip(&l_hull_up).map(|(&lo, &up)| up - lo).sum();
        let sum_lo: f64 = l_hull_lo.iter().sum();
        let denom = 1.0 - sum_lo;
        let lambda = if denom.abs() <= EPS { 1.0 } else { sum_width / denom };

        for (i, &node) in siblings.iter().enumerate() {
            let t = l_hull_up[i] - l_hull_lo[i];
            let m = l_mp[i];
            let var = t * t * m * (1.0 - m) / (lambda + 1.0);
            let cov = t * t * m * m / (lambda + 1.0);
            out.insert(node, PMoments { mean: m, var, cov });

            if !self.frame().is_real_b1(node)? {
                let children = self.frame().children_b1(node)?;
                self.p_moments_recurse(&children, out)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::base::{PBase, VBase};
    use crate::eval::Evaluator;
    use crate::frame::Frame;

    #[test]
    fn default_flat_frame_has_nonnegative_variance() {
        let frame = Frame::create_flat("f", &[2, 2]).unwrap();
        let mut p = PBase::new();
        p.load(&frame).unwrap();
        let mut v = VBase::new();
        v.load(&frame).unwrap();
        let eval = Evaluator::new(&frame, &p, &v);
        let m = eval.moments(0).unwrap();
        assert!(m.variance >= 0.0);
        assert!(m.std_dev >= 0.0);
    }
}
