//! Suspension points.

/// Saved state of one suspension point.
///
/// Owns every value that must survive until the computation resumes.
pub trait YieldPoint<V> {
    /// Call `visitor` for every live value.
    fn visit_refs(&self, visitor: &mut dyn FnMut(&V));

    /// Drop ownership of every live value.
    fn release_refs(&mut self);

    /// Value being delegated to if suspended inside a `yield from`.
    fn yield_from_value(&self) -> Option<&V> {
        None
    }
}

/// Yield point holding a resume label and a flat list of live locals.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveLocals<V> {
    /// Where the compiled body continues.
    pub resume_at: usize,
    /// Locals live across the suspension.
    pub locals: Vec<V>,
    /// Sub-iterator of an in-progress `yield from`.
    pub delegate: Option<V>,
}

impl<V> LiveLocals<V> {
    /// Yield point at `resume_at` keeping `locals` alive.
    pub fn new(resume_at: usize, locals: Vec<V>) -> Self {
        Self {
            resume_at,
            locals,
            delegate: None,
        }
    }

    /// Same, suspended while delegating to `delegate`.
    pub fn delegating(resume_at: usize, locals: Vec<V>, delegate: V) -> Self {
        Self {
            resume_at,
            locals,
            delegate: Some(delegate),
        }
    }
}

impl<V> YieldPoint<V> for LiveLocals<V> {
    fn visit_refs(&self, visitor: &mut dyn FnMut(&V)) {
        for local in &self.locals {
            visitor(local);
        }
        if let Some(delegate) = &self.delegate {
            visitor(delegate);
        }
    }

    fn release_refs(&mut self) {
        self.locals.clear();
        self.delegate = None;
    }

    fn yield_from_value(&self) -> Option<&V> {
        self.delegate.as_ref()
    }
}
