//! The decision-frame topology: alternatives, their node-trees, and the
//! four index encodings that address nodes within them (§3, §4.1).
//!
//! Grounded on the teacher's `lp::LinearProgram`/`qp::QuadraticProgram`
//! shape (a plain data-holding struct built by a `new`/constructor function,
//! queried through small getters) — here specialized to a forest of
//! node-trees instead of a sparse constraint matrix.

pub mod index;

use crate::error::{EngineError, EngineResult};
use crate::limits::{MAX_ALTS, MAX_CONS, MAX_COPA, MAX_NOPA};
pub use index::{A1, A2, B2, Class};

/// The topology of one decision frame: `n_alts` alternatives, each owning a
/// rooted ordered tree of real/intermediate nodes, plus the index tables
/// that translate between A1/A2/B1/B2 addressing.
#[derive(Debug, Clone)]
pub struct Frame {
    name: String,
    n_alts: usize,
    alt_names: Vec<String>,

    n_cons: Vec<usize>,
    im_cons: Vec<usize>,
    tot_cons: Vec<usize>,

    b1_offset: Vec<usize>,
    real_offset: Vec<usize>,
    interm_offset: Vec<usize>,

    /// B1-indexed: parent's B1 index, `None` for a top-level (root-child) node.
    parent: Vec<Option<usize>>,
    /// B1-indexed: first child's B1 index, `None` for a real (leaf) node.
    first_child: Vec<Option<usize>>,
    /// B1-indexed: next sibling's B1 index, `None` for the last sibling.
    next_sibling: Vec<Option<usize>>,
    /// B1-indexed: whether the node is real (leaf) or intermediate.
    is_real: Vec<bool>,
    /// B1-indexed: the node's rank within its own alternative's real/intermediate sequence.
    local_class_rank: Vec<usize>,

    /// B2-real rank -> B1 index.
    real_to_b1: Vec<usize>,
    /// B2-intermediate rank -> B1 index.
    interm_to_b1: Vec<usize>,

    attached: bool,
}

/// Input topology for [`Frame::create_tree`]: per alternative, `next`/`down`
/// pointer arrays addressed by the alternative's own 0-based pre-order node
/// numbering (node 0 is always the root's first child; the implicit root
/// itself has no array slot).
pub struct TreeSpec<'a> {
    pub tot_cons: &'a [usize],
    pub next: &'a [Vec<Option<usize>>],
    pub down: &'a [Vec<Option<usize>>],
}

impl Frame {
    /// Builds a frame where every alternative is a flat list of real consequences
    /// (no intermediate branching).
    pub fn create_flat(name: impl Into<String>, leaf_counts: &[usize]) -> EngineResult<Self> {
        Self::validate_alt_count(leaf_counts.len())?;

        let mut parent = Vec::new();
        let mut first_child = Vec::new();
        let mut next_sibling = Vec::new();
        let mut is_real = Vec::new();
        let mut local_class_rank = Vec::new();
        let mut real_to_b1 = Vec::new();
        let interm_to_b1 = Vec::new();

        let mut b1_offset = Vec::with_capacity(leaf_counts.len());
        let mut real_offset = Vec::with_capacity(leaf_counts.len());
        let mut interm_offset = Vec::with_capacity(leaf_counts.len());
        let mut running_b1 = 0usize;
        let mut running_real = 0usize;
        let running_interm = 0usize;

        let mut n_cons = Vec::with_capacity(leaf_counts.len());
        let im_cons = vec![0usize; leaf_counts.len()];
        let mut tot_cons = Vec::with_capacity(leaf_counts.len());

        for (_alt, &leaves) in leaf_counts.iter().enumerate() {
            if leaves == 0 {
                return Err(EngineError::TreeError);
            }
            if leaves > MAX_COPA {
                return Err(EngineError::TooManyCons);
            }
            b1_offset.push(running_b1);
            real_offset.push(running_real);
            interm_offset.push(running_interm);

            for i in 0..leaves {
                parent.push(None);
                first_child.push(None);
                next_sibling.push(if i + 1 < leaves { Some(running_b1 + i + 1) } else { None });
                is_real.push(true);
                local_class_rank.push(i);
                real_to_b1.push(running_b1 + i);
            }

            n_cons.push(leaves);
            tot_cons.push(leaves);
            running_b1 += leaves;
            running_real += leaves;
        }

        if running_real > MAX_CONS {
            return Err(EngineError::TooManyCons);
        }

        Ok(Self {
            name: name.into(),
            n_alts: leaf_counts.len(),
            alt_names: (0..leaf_counts.len()).map(|i| format!("alt{i}")).collect(),
            n_cons,
            im_cons,
            tot_cons,
            b1_offset,
            real_offset,
            interm_offset,
            parent,
            first_child,
            next_sibling,
            is_real,
            local_class_rank,
            real_to_b1,
            interm_to_b1,
            attached: false,
        })
    }

    /// Builds a frame from explicit per-alternative tree topology, validating
    /// pre-order contiguity and the "no lonely intermediate" rule (§3, §4.1).
    pub fn create_tree(name: impl Into<String>, spec: TreeSpec<'_>) -> EngineResult<Self> {
        let n_alts = spec.tot_cons.len();
        Self::validate_alt_count(n_alts)?;
        if spec.next.len() != n_alts || spec.down.len() != n_alts {
            return Err(EngineError::InputError);
        }

        let mut parent = Vec::new();
        let mut first_child = Vec::new();
        let mut next_sibling = Vec::new();
        let mut is_real = Vec::new();
        let mut local_class_rank = Vec::new();
        let mut real_to_b1 = Vec::new();
        let mut interm_to_b1 = Vec::new();

        let mut b1_offset = Vec::with_capacity(n_alts);
        let mut real_offset = Vec::with_capacity(n_alts);
        let mut interm_offset = Vec::with_capacity(n_alts);
        let mut running_b1 = 0usize;
        let mut running_real = 0usize;
        let mut running_interm = 0usize;

        let mut n_cons = Vec::with_capacity(n_alts);
        let mut im_cons = Vec::with_capacity(n_alts);
        let mut tot_cons = Vec::with_capacity(n_alts);

        for alt in 0..n_alts {
            let tot = spec.tot_cons[alt];
            if tot == 0 {
                return Err(EngineError::TreeError);
            }
            if tot > MAX_NOPA {
                return Err(EngineError::TooManyCons);
            }
            let next_a = &spec.next[alt];
            let down_a = &spec.down[alt];
            if next_a.len() != tot || down_a.len() != tot {
                return Err(EngineError::InputError);
            }

            let (alt_is_real, alt_parent, alt_rank, n_real, n_interm) =
                validate_alt_topology(tot, next_a, down_a)?;
            if n_real > MAX_COPA {
                return Err(EngineError::TooManyCons);
            }

            b1_offset.push(running_b1);
            real_offset.push(running_real);
            interm_offset.push(running_interm);

            for local in 0..tot {
                let b1 = running_b1 + local;
                parent.push(alt_parent[local].map(|p| running_b1 + p));
                first_child.push(down_a[local].map(|c| running_b1 + c));
                next_sibling.push(next_a[local].map(|s| running_b1 + s));
                is_real.push(alt_is_real[local]);
                local_class_rank.push(alt_rank[local]);
                if alt_is_real[local] {
                    real_to_b1.push(b1);
                } else {
                    interm_to_b1.push(b1);
                }
            }

            n_cons.push(n_real);
            im_cons.push(n_interm);
            tot_cons.push(tot);
            running_b1 += tot;
            running_real += n_real;
            running_interm += n_interm;
        }

        if running_real > MAX_CONS {
            return Err(EngineError::TooManyCons);
        }

        Ok(Self {
            name: name.into(),
            n_alts,
            alt_names: (0..n_alts).map(|i| format!("alt{i}")).collect(),
            n_cons,
            im_cons,
            tot_cons,
            b1_offset,
            real_offset,
            interm_offset,
            parent,
            first_child,
            next_sibling,
            is_real,
            local_class_rank,
            real_to_b1,
            interm_to_b1,
            attached: false,
        })
    }

    fn validate_alt_count(n_alts: usize) -> EngineResult<()> {
        if n_alts < 2 {
            return Err(EngineError::TooFewAlts);
        }
        if n_alts > MAX_ALTS {
            return Err(EngineError::TooManyAlts);
        }
        Ok(())
    }

    /// Builds the index tables and marks the frame attached. Idempotent on an
    /// already-attached frame only insofar as a second call is rejected
    /// (`state-error`) — matching the teacher's single-attach contract.
    pub fn attach(&mut self) -> EngineResult<()> {
        if self.attached {
            return Err(EngineError::StateError);
        }
        self.attached = true;
        Ok(())
    }

    /// Marks the frame detached. Statements already loaded into bases are
    /// untouched; their derived hulls/mass points must be treated as stale by
    /// callers until the frame is re-attached. Idempotent.
    pub fn detach(&mut self) {
        self.attached = false;
    }

    /// Consumes the frame. Provided for lifecycle symmetry with `create_flat`/
    /// `create_tree`; Rust's ownership model frees the backing storage on drop
    /// regardless.
    pub fn dispose(self) {}

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_alts(&self) -> usize {
        self.n_alts
    }

    pub fn alt_name(&self, alt: usize) -> Option<&str> {
        self.alt_names.get(alt).map(|s| s.as_str())
    }

    pub fn set_alt_name(&mut self, alt: usize, name: impl Into<String>) -> EngineResult<()> {
        let slot = self.alt_names.get_mut(alt).ok_or(EngineError::AltUnknown)?;
        *slot = name.into();
        Ok(())
    }

    pub fn n_cons(&self, alt: usize) -> EngineResult<usize> {
        self.n_cons.get(alt).copied().ok_or(EngineError::AltUnknown)
    }

    pub fn im_cons(&self, alt: usize) -> EngineResult<usize> {
        self.im_cons.get(alt).copied().ok_or(EngineError::AltUnknown)
    }

    pub fn tot_cons(&self, alt: usize) -> EngineResult<usize> {
        self.tot_cons.get(alt).copied().ok_or(EngineError::AltUnknown)
    }

    /// Total number of real leaves across every alternative.
    pub fn total_n_cons(&self) -> usize {
        self.n_cons.iter().sum()
    }

    /// Total number of intermediate nodes across every alternative.
    pub fn total_im_cons(&self) -> usize {
        self.im_cons.iter().sum()
    }

    /// Total number of nodes (real + intermediate) across every alternative.
    pub fn total_nodes(&self) -> usize {
        self.tot_cons.iter().sum()
    }

    // -- index conversions -------------------------------------------------

    pub fn a1_to_b1(&self, a1: A1) -> EngineResult<usize> {
        let &offset = self.b1_offset.get(a1.alt).ok_or(EngineError::AltUnknown)?;
        let tot = self.tot_cons[a1.alt];
        if a1.node >= tot {
            return Err(EngineError::InputError);
        }
        Ok(offset + a1.node)
    }

    pub fn b1_to_a1(&self, b1: usize) -> EngineResult<A1> {
        if b1 >= self.total_nodes() {
            return Err(EngineError::InputError);
        }
        // n_alts is capped at MAX_ALTS; a linear scan is simplest and fast enough.
        for alt in (0..self.n_alts).rev() {
            if b1 >= self.b1_offset[alt] {
                return Ok(A1::new(alt, b1 - self.b1_offset[alt]));
            }
        }
        Err(EngineError::Corrupted)
    }

    pub fn a1_to_a2(&self, a1: A1) -> EngineResult<A2> {
        let b1 = self.a1_to_b1(a1)?;
        let rank = self.local_class_rank[b1];
        Ok(if self.is_real[b1] { Class::Real(rank) } else { Class::Intermediate(rank) })
    }

    pub fn a2_to_a1(&self, alt: usize, a2: A2) -> EngineResult<A1> {
        let b1 = match a2 {
            Class::Real(local_rank) => {
                let &off = self.real_offset.get(alt).ok_or(EngineError::AltUnknown)?;
                let n_real = self.n_cons[alt];
                if local_rank >= n_real {
                    return Err(EngineError::InputError);
                }
                self.real_to_b1[off + local_rank]
            }
            Class::Intermediate(local_rank) => {
                let &off = self.interm_offset.get(alt).ok_or(EngineError::AltUnknown)?;
                let n_interm = self.im_cons[alt];
                if local_rank >= n_interm {
                    return Err(EngineError::InputError);
                }
                self.interm_to_b1[off + local_rank]
            }
        };
        self.b1_to_a1(b1)
    }

    pub fn b1_to_b2(&self, b1: usize) -> EngineResult<B2> {
        let a1 = self.b1_to_a1(b1)?;
        let rank = self.local_class_rank[b1];
        Ok(if self.is_real[b1] {
            Class::Real(self.real_offset[a1.alt] + rank)
        } else {
            Class::Intermediate(self.interm_offset[a1.alt] + rank)
        })
    }

    pub fn b2_to_b1(&self, b2: B2) -> EngineResult<usize> {
        match b2 {
            Class::Real(r) => self.real_to_b1.get(r).copied().ok_or(EngineError::InputError),
            Class::Intermediate(r) => self.interm_to_b1.get(r).copied().ok_or(EngineError::InputError),
        }
    }

    pub fn is_real_b1(&self, b1: usize) -> EngineResult<bool> {
        self.is_real.get(b1).copied().ok_or(EngineError::InputError)
    }

    pub fn parent_b1(&self, b1: usize) -> EngineResult<Option<usize>> {
        self.parent.get(b1).copied().ok_or(EngineError::InputError)
    }

    pub fn first_child_b1(&self, b1: usize) -> EngineResult<Option<usize>> {
        self.first_child.get(b1).copied().ok_or(EngineError::InputError)
    }

    pub fn next_sibling_b1(&self, b1: usize) -> EngineResult<Option<usize>> {
        self.next_sibling.get(b1).copied().ok_or(EngineError::InputError)
    }

    /// All of a node's children, in sibling order (empty for a real node).
    pub fn children_b1(&self, b1: usize) -> EngineResult<Vec<usize>> {
        let mut out = Vec::new();
        let mut cur = self.first_child_b1(b1)?;
        while let Some(c) = cur {
            out.push(c);
            cur = self.next_sibling_b1(c)?;
        }
        Ok(out)
    }

    /// The top-level children of an alternative's implicit root.
    pub fn top_level_b1(&self, alt: usize) -> EngineResult<Vec<usize>> {
        if alt >= self.n_alts {
            return Err(EngineError::AltUnknown);
        }
        let root_first = self.b1_offset[alt];
        let mut out = Vec::new();
        let mut cur = Some(root_first);
        while let Some(c) = cur {
            out.push(c);
            cur = self.next_sibling_b1(c)?;
        }
        Ok(out)
    }

    /// Every real (leaf) node's B1 index within one alternative.
    pub fn leaves_of_alt(&self, alt: usize) -> EngineResult<Vec<usize>> {
        let &offset = self.b1_offset.get(alt).ok_or(EngineError::AltUnknown)?;
        let tot = self.tot_cons[alt];
        Ok((offset..offset + tot).filter(|&b1| self.is_real[b1]).collect())
    }

    /// Every node's B1 index within one alternative, in pre-order.
    pub fn nodes_of_alt(&self, alt: usize) -> EngineResult<Vec<usize>> {
        let &offset = self.b1_offset.get(alt).ok_or(EngineError::AltUnknown)?;
        let tot = self.tot_cons[alt];
        Ok((offset..offset + tot).collect())
    }

    /// Two nodes share the same parent (both top-level counts as "same parent").
    pub fn same_parent(&self, b1_a: usize, b1_b: usize) -> EngineResult<bool> {
        Ok(self.parent_b1(b1_a)? == self.parent_b1(b1_b)?)
    }

    /// Number of siblings of `b1` (including itself).
    pub fn sibling_count(&self, b1: usize) -> EngineResult<usize> {
        let a1 = self.b1_to_a1(b1)?;
        match self.parent_b1(b1)? {
            Some(p) => Ok(self.children_b1(p)?.len()),
            None => Ok(self.top_level_b1(a1.alt)?.len()),
        }
    }

    /// True iff every parent in the frame has children that are all real or
    /// all intermediate (no mixed level) — required by several CAR entry
    /// points that assume a uniform tree shape.
    pub fn is_pure_tree(&self) -> bool {
        for b1 in 0..self.total_nodes() {
            if self.is_real[b1] {
                continue;
            }
            let children = match self.children_b1(b1) {
                Ok(c) => c,
                Err(_) => return false,
            };
            if children.is_empty() {
                continue;
            }
            let first_real = self.is_real[children[0]];
            if children.iter().any(|&c| self.is_real[c] != first_real) {
                return false;
            }
        }
        for alt in 0..self.n_alts {
            let top = match self.top_level_b1(alt) {
                Ok(t) => t,
                Err(_) => return false,
            };
            if top.is_empty() {
                continue;
            }
            let first_real = self.is_real[top[0]];
            if top.iter().any(|&c| self.is_real[c] != first_real) {
                return false;
            }
        }
        true
    }
}

/// Validates one alternative's `next`/`down` arrays and returns, per local
/// node index: `is_real`, `parent` (local index), `local_class_rank`, the
/// real-node count, and the intermediate-node count.
fn validate_alt_topology(
    tot_cons: usize,
    next: &[Option<usize>],
    down: &[Option<usize>],
) -> EngineResult<(Vec<bool>, Vec<Option<usize>>, Vec<usize>, usize, usize)> {
    let mut is_real = vec![false; tot_cons];
    let mut parent: Vec<Option<usize>> = vec![None; tot_cons];
    let mut local_class_rank = vec![0usize; tot_cons];
    let mut visited = vec![false; tot_cons];
    let mut expected = 0usize;
    let mut n_real = 0usize;
    let mut n_interm = 0usize;

    let mut top_level = Vec::new();
    let mut cur = Some(0usize);
    while let Some(n) = cur {
        if n >= tot_cons {
            return Err(EngineError::TreeError);
        }
        top_level.push(n);
        cur = next[n];
    }

    let mut stack: Vec<(usize, Option<usize>)> =
        top_level.into_iter().rev().map(|n| (n, None)).collect();

    while let Some((node, par)) = stack.pop() {
        if node != expected || visited[node] {
            return Err(EngineError::TreeError);
        }
        visited[node] = true;
        expected += 1;
        parent[node] = par;

        match down[node] {
            None => {
                is_real[node] = true;
                local_class_rank[node] = n_real;
                n_real += 1;
            }
            Some(first_child) => {
                let mut children = Vec::new();
                let mut c = Some(first_child);
                while let Some(ci) = c {
                    if ci >= tot_cons {
                        return Err(EngineError::TreeError);
                    }
                    children.push(ci);
                    c = next[ci];
                }
                if children.len() < 2 {
                    return Err(EngineError::TreeError);
                }
                is_real[node] = false;
                local_class_rank[node] = n_interm;
                n_interm += 1;
                for &ci in children.iter().rev() {
                    stack.push((ci, Some(node)));
                }
            }
        }
    }

    if expected != tot_cons {
        return Err(EngineError::TreeError);
    }

    Ok((is_real, parent, local_class_rank, n_real, n_interm))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn flat_frame_round_trips_indices() {
        let frame = Frame::create_flat("f", &[2, 3]).unwrap();
        assert_eq!(frame.n_alts(), 2);
        assert_eq!(frame.total_n_cons(), 5);
        for alt in 0..2 {
            for node in 0..frame.tot_cons(alt).unwrap() {
                let a1 = A1::new(alt, node);
                let b1 = frame.a1_to_b1(a1).unwrap();
                assert_eq!(frame.b1_to_a1(b1).unwrap(), a1);
                let a2 = frame.a1_to_a2(a1).unwrap();
                assert_eq!(frame.a2_to_a1(alt, a2).unwrap(), a1);
                let b2 = frame.b1_to_b2(b1).unwrap();
                assert_eq!(frame.b2_to_b1(b2).unwrap(), b1);
            }
        }
    }

    /// §8 property 5, parametrized across `(alt, node)` pairs spanning both
    /// alternatives of a mixed flat/tree frame.
    #[rstest]
    #[case(0, 0)]
    #[case(0, 1)]
    #[case(0, 2)]
    #[case(0, 3)]
    #[case(1, 0)]
    fn index_round_trip_holds_for_every_node(#[case] alt: usize, #[case] node: usize) {
        let tot = vec![4, 1];
        let next = vec![vec![Some(3), Some(2), None, None], vec![None]];
        let down = vec![vec![Some(1), None, None, None], vec![None]];
        let spec = TreeSpec { tot_cons: &tot, next: &next, down: &down };
        let frame = Frame::create_tree("f", spec).unwrap();

        let a1 = A1::new(alt, node);
        let b1 = frame.a1_to_b1(a1).unwrap();
        assert_eq!(frame.b1_to_a1(b1).unwrap(), a1);
        let a2 = frame.a1_to_a2(a1).unwrap();
        assert_eq!(frame.a2_to_a1(alt, a2).unwrap(), a1);
        let b2 = frame.b1_to_b2(b1).unwrap();
        assert_eq!(frame.b2_to_b1(b2).unwrap(), b1);
    }

    #[test]
    fn too_few_alts_rejected() {
        assert_eq!(Frame::create_flat("f", &[2]).unwrap_err(), EngineError::TooFewAlts);
    }

    #[test]
    fn lonely_intermediate_rejected() {
        // alt 0: node0 = intermediate with a single child node1 (lonely).
        let tot = vec![2, 1];
        let next = vec![vec![None, None], vec![None]];
        let down = vec![vec![Some(1), None], vec![None]];
        let spec = TreeSpec { tot_cons: &tot, next: &next, down: &down };
        let err = Frame::create_tree("f", spec).unwrap_err();
        assert_eq!(err, EngineError::TreeError);
    }

    #[test]
    fn tree_frame_builds_expected_topology() {
        // alt 0: root -> {A (intermediate, children A1,A2), B (real)}
        // pre-order: 0=A, 1=A1, 2=A2, 3=B
        let tot = vec![4, 1];
        let next = vec![
            vec![Some(3), Some(2), None, None],
            vec![None],
        ];
        let down = vec![
            vec![Some(1), None, None, None],
            vec![None],
        ];
        let spec = TreeSpec { tot_cons: &tot, next: &next, down: &down };
        let frame = Frame::create_tree("f", spec).unwrap();
        assert_eq!(frame.n_cons(0).unwrap(), 3);
        assert_eq!(frame.im_cons(0).unwrap(), 1);
        let b1_a = frame.a1_to_b1(A1::new(0, 0)).unwrap();
        assert!(!frame.is_real_b1(b1_a).unwrap());
        let children = frame.children_b1(b1_a).unwrap();
        assert_eq!(children.len(), 2);
        assert!(frame.is_pure_tree());
    }
}
