//! `massframe`: decision analysis under imprecise probability and value
//! information (§1-§2).
//!
//! [`Engine`] owns the process-wide state §5 describes: at most one attached
//! [`Frame`], one [`PBase`]/[`VBase`] pair per criterion sharing that frame's
//! topology, and the [`CarLayer`] translating ordinal input into the
//! statements those bases consume.

pub mod base;
pub mod car;
pub mod diagnostics;
pub mod error;
pub mod eval;
pub mod frame;
pub mod limits;
pub mod persist;

pub use base::{PBase, Statement, TradeoffStatement, VBase};
pub use car::{CarLayer, CarMode, Generator, WBase};
pub use diagnostics::{Diagnostics, Event, NoOpDiagnostics, PrintDiagnostics};
pub use error::{EngineError, EngineResult};
pub use eval::{Evaluator, Moments, SecurityLevel, Triple};
pub use frame::{Frame, TreeSpec, A1, A2, B2, Class};
pub use persist::{PersistedFrame, PersistedMidpoint, PersistedStatement};

/// The top-level engine: at most one attached frame, one P/V-Base pair per
/// criterion, and the CAR translation layer (§5 "the engine holds
/// process-wide state").
pub struct Engine {
    frame: Option<Frame>,
    p_bases: Vec<PBase>,
    v_bases: Vec<VBase>,
    car: CarLayer,
    diagnostics: Box<dyn Diagnostics>,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            frame: None,
            p_bases: Vec::new(),
            v_bases: Vec::new(),
            car: CarLayer::new(),
            diagnostics: Box::new(NoOpDiagnostics),
        }
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_diagnostics(diagnostics: Box<dyn Diagnostics>) -> Self {
        Self { diagnostics, ..Self::default() }
    }

    /// Builds a flat (leaf-only) frame with `n_criteria` P/V-Base pairs and
    /// loads them all, but leaves the frame unattached (§4.1 "create flat").
    pub fn create_flat(
        &mut self,
        name: impl Into<String>,
        leaf_counts: &[usize],
        n_criteria: usize,
    ) -> EngineResult<()> {
        let frame = Frame::create_flat(name, leaf_counts)?;
        self.install_frame(frame, n_criteria)
    }

    /// Builds a tree frame and loads `n_criteria` P/V-Base pairs against it
    /// (§4.1 "create tree").
    pub fn create_tree(
        &mut self,
        name: impl Into<String>,
        spec: TreeSpec<'_>,
        n_criteria: usize,
    ) -> EngineResult<()> {
        let frame = Frame::create_tree(name, spec)?;
        self.install_frame(frame, n_criteria)
    }

    fn install_frame(&mut self, frame: Frame, n_criteria: usize) -> EngineResult<()> {
        let mut p_bases = Vec::with_capacity(n_criteria);
        let mut v_bases = Vec::with_capacity(n_criteria);
        for _ in 0..n_criteria {
            let mut p = PBase::new();
            p.load(&frame)?;
            let mut v = VBase::new();
            v.load(&frame)?;
            p_bases.push(p);
            v_bases.push(v);
        }
        self.frame = Some(frame);
        self.p_bases = p_bases;
        self.v_bases = v_bases;
        Ok(())
    }

    /// Builds the index tables and marks the frame attached (§4.1 "attach").
    pub fn attach(&mut self) -> EngineResult<()> {
        let frame = self.frame.as_mut().ok_or(EngineError::StateError)?;
        frame.attach()?;
        self.diagnostics.notify(Event::FrameAttached { name: frame.name() });
        Ok(())
    }

    /// Marks bases invalid (stale) but keeps their statements (§4.1 "detach").
    pub fn detach(&mut self) -> EngineResult<()> {
        let frame = self.frame.as_mut().ok_or(EngineError::StateError)?;
        frame.detach();
        for p in &mut self.p_bases {
            p.invalidate();
        }
        for v in &mut self.v_bases {
            v.invalidate();
        }
        self.diagnostics.notify(Event::FrameDetached { name: frame.name() });
        Ok(())
    }

    /// Frees the frame and its bases (§4.1 "dispose"). Rust's ownership model
    /// frees the backing storage on drop regardless; provided for lifecycle
    /// symmetry with `create_flat`/`create_tree`.
    pub fn dispose(&mut self) {
        self.frame = None;
        self.p_bases.clear();
        self.v_bases.clear();
    }

    pub fn is_attached(&self) -> bool {
        self.frame.as_ref().is_some_and(Frame::is_attached)
    }

    pub fn n_criteria(&self) -> usize {
        self.p_bases.len()
    }

    pub fn frame(&self) -> EngineResult<&Frame> {
        self.frame.as_ref().ok_or(EngineError::StateError)
    }

    pub fn p_base(&self, criterion: usize) -> EngineResult<&PBase> {
        self.p_bases.get(criterion).ok_or(EngineError::CritUnknown)
    }

    pub fn p_base_mut(&mut self, criterion: usize) -> EngineResult<&mut PBase> {
        self.p_bases.get_mut(criterion).ok_or(EngineError::CritUnknown)
    }

    pub fn v_base(&self, criterion: usize) -> EngineResult<&VBase> {
        self.v_bases.get(criterion).ok_or(EngineError::CritUnknown)
    }

    pub fn v_base_mut(&mut self, criterion: usize) -> EngineResult<&mut VBase> {
        self.v_bases.get_mut(criterion).ok_or(EngineError::CritUnknown)
    }

    /// Adds a probability statement to one criterion's base, rolling back on
    /// failure and surfacing the rollback to diagnostics (§5 "mutations are
    /// transactional").
    pub fn add_p_statement(&mut self, criterion: usize, stmt: Statement) -> EngineResult<()> {
        let frame = self.frame.as_ref().ok_or(EngineError::StateError)?;
        let base = self.p_bases.get_mut(criterion).ok_or(EngineError::CritUnknown)?;
        let result = base.add_statement(frame, stmt);
        if result.is_err() {
            self.diagnostics.notify(Event::ReloadRolledBack { reason: "add_p_statement" });
        }
        result
    }

    pub fn add_v_statement(&mut self, criterion: usize, stmt: Statement) -> EngineResult<()> {
        let frame = self.frame.as_ref().ok_or(EngineError::StateError)?;
        let base = self.v_bases.get_mut(criterion).ok_or(EngineError::CritUnknown)?;
        let result = base.add_statement(frame, stmt);
        if result.is_err() {
            self.diagnostics.notify(Event::ReloadRolledBack { reason: "add_v_statement" });
        }
        result
    }

    /// Borrows frame and one criterion's bases into a read-only [`Evaluator`]
    /// (§4.4).
    pub fn evaluator(&self, criterion: usize) -> EngineResult<Evaluator<'_>> {
        let frame = self.frame.as_ref().ok_or(EngineError::StateError)?;
        let p = self.p_bases.get(criterion).ok_or(EngineError::CritUnknown)?;
        let v = self.v_bases.get(criterion).ok_or(EngineError::CritUnknown)?;
        Ok(Evaluator::new(frame, p, v))
    }

    pub fn car(&self) -> &CarLayer {
        &self.car
    }

    pub fn car_mut(&mut self) -> &mut CarLayer {
        &mut self.car
    }

    /// Initializes the CAR layer, supplying the real attachment state CAR
    /// itself cannot observe (§4.5 "init-while-frame-loaded is an error").
    pub fn car_init(&mut self, method: Generator, mode: CarMode) -> EngineResult<()> {
        self.car.init(method, mode, self.is_attached())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_flat_loads_every_criterion() {
        let mut engine = Engine::new();
        engine.create_flat("f", &[2, 2], 3).unwrap();
        assert_eq!(engine.n_criteria(), 3);
        for c in 0..3 {
            assert!(engine.p_base(c).unwrap().is_loaded());
            assert!(engine.v_base(c).unwrap().is_loaded());
        }
    }

    #[test]
    fn attach_then_detach_round_trips() {
        let mut engine = Engine::new();
        engine.create_flat("f", &[2, 2], 1).unwrap();
        engine.attach().unwrap();
        assert!(engine.is_attached());
        engine.detach().unwrap();
        assert!(!engine.is_attached());
        assert!(!engine.p_base(0).unwrap().is_loaded());
    }

    #[test]
    fn car_init_rejects_while_attached() {
        let mut engine = Engine::new();
        engine.create_flat("f", &[2, 2], 1).unwrap();
        engine.attach().unwrap();
        let err = engine.car_init(Generator::default(), CarMode::default()).unwrap_err();
        assert_eq!(err, EngineError::StateError);
    }

    #[test]
    fn unknown_criterion_rejected_on_evaluator() {
        let mut engine = Engine::new();
        engine.create_flat("f", &[2, 2], 1).unwrap();
        let err = engine.evaluator(5).unwrap_err();
        assert_eq!(err, EngineError::CritUnknown);
    }

    #[test]
    fn end_to_end_omega_matches_default_midpoint() {
        let mut engine = Engine::new();
        engine.create_flat("f", &[2, 2, 2], 1).unwrap();
        engine.attach().unwrap();
        let eval = engine.evaluator(0).unwrap();
        for alt in 0..3 {
            assert!((eval.omega(alt).unwrap() - 0.5).abs() < 1e-9);
        }
    }
}
