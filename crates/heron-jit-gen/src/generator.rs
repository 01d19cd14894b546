//! Generator execution state machine.

use std::fmt;

use heron_jit_exec::{FunctionId, JitFunction};

use crate::yield_point::YieldPoint;

/// Generator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenState {
    /// Created, never resumed
    NotStarted,
    /// Resumed at least once and not finished; includes being suspended
    Running,
    /// Returned or raised; terminal
    Completed,
}

/// What the caller sends into a resumed generator.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeInput<V> {
    /// Value for the pending `yield` expression; `None` on first resume.
    Send(Option<V>),
    /// Raise the caller's pending error at the suspension point.
    Throw,
}

/// Per-generator storage attached to compiled code.
///
/// Holds the suspension point the compiled body resumes from. The body
/// takes the yield point out on entry and installs a new one before it
/// yields.
pub struct ExecutionFooter<Y> {
    yield_point: Option<Y>,
    resumes: u64,
}

impl<Y> ExecutionFooter<Y> {
    fn new(start: Option<Y>) -> Self {
        Self {
            yield_point: start,
            resumes: 0,
        }
    }

    /// Current yield point.
    pub fn yield_point(&self) -> Option<&Y> {
        self.yield_point.as_ref()
    }

    /// Remove the yield point, e.g. to read its locals on resume.
    pub fn take_yield_point(&mut self) -> Option<Y> {
        self.yield_point.take()
    }

    /// Install the yield point for the next suspension.
    pub fn set_yield_point(&mut self, point: Y) {
        self.yield_point = Some(point);
    }

    /// Number of times the generator has been resumed, this one included.
    pub fn resume_count(&self) -> u64 {
        self.resumes
    }
}

impl<Y> fmt::Debug for ExecutionFooter<Y> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionFooter")
            .field("has_yield_point", &self.yield_point.is_some())
            .field("resumes", &self.resumes)
            .finish()
    }
}

/// Compiled generator body.
///
/// Called with the footer, the resume input and the `finish_yield_from`
/// flag. Returns the yielded value, or `None` once the body has finished.
pub type EntryPoint<V, Y> =
    Box<dyn FnMut(&mut ExecutionFooter<Y>, ResumeInput<V>, bool) -> Option<V> + Send>;

/// A JIT-compiled generator.
pub struct JitGenerator<V, Y> {
    state: GenState,
    /// Yield point for the first resume; moves into the footer then.
    start: Option<Y>,
    footer: Option<ExecutionFooter<Y>>,
    entry: EntryPoint<V, Y>,
    function: Option<FunctionId>,
}

impl<V, Y: YieldPoint<V>> JitGenerator<V, Y> {
    /// New generator that will enter `entry` at `start`.
    pub fn new(start: Y, entry: EntryPoint<V, Y>) -> Self {
        Self {
            state: GenState::NotStarted,
            start: Some(start),
            footer: None,
            entry,
            function: None,
        }
    }

    /// Generator running the compiled body of `function`.
    ///
    /// Returns `None` unless `function` is flagged as a generator.
    pub fn for_function(
        function: &JitFunction,
        start: Y,
        entry: EntryPoint<V, Y>,
    ) -> Option<Self> {
        if !function.is_generator() {
            return None;
        }
        tracing::trace!(
            target: "heron::gen",
            function = function.qualname(),
            "creating generator"
        );
        Some(Self {
            function: Some(function.id()),
            ..Self::new(start, entry)
        })
    }

    /// Function whose compiled body this generator runs, if created from one.
    pub fn function_id(&self) -> Option<FunctionId> {
        self.function
    }

    /// Current state.
    pub fn state(&self) -> GenState {
        self.state
    }

    /// Footer, allocated on first resume.
    pub fn footer(&self) -> Option<&ExecutionFooter<Y>> {
        self.footer.as_ref()
    }

    /// Resume the body.
    ///
    /// With `inject_error`, `input` is discarded and [`ResumeInput::Throw`]
    /// is delivered instead. Returns the yielded value, or `None` when the
    /// body finished, after which the generator is [`GenState::Completed`].
    ///
    /// # Panics
    ///
    /// Panics if there is no yield point to resume from. Must not be called
    /// after completion.
    pub fn resume(&mut self, input: ResumeInput<V>, inject_error: bool) -> Option<V> {
        self.resume_with(input, inject_error, false)
    }

    /// [`resume`](Self::resume), telling the body whether the delegated
    /// `yield from` sub-iterator has finished.
    pub fn resume_with(
        &mut self,
        input: ResumeInput<V>,
        inject_error: bool,
        finish_yield_from: bool,
    ) -> Option<V> {
        debug_assert_ne!(
            self.state,
            GenState::Completed,
            "resumed a completed generator"
        );

        let start = &mut self.start;
        let footer = self
            .footer
            .get_or_insert_with(|| ExecutionFooter::new(start.take()));
        assert!(
            footer.yield_point.is_some(),
            "generator resumed with no yield point"
        );
        footer.resumes += 1;

        self.state = GenState::Running;
        let input = if inject_error { ResumeInput::Throw } else { input };
        tracing::trace!(
            target: "heron::gen",
            resume = footer.resumes,
            inject_error,
            finish_yield_from,
            "resuming generator"
        );

        let result = (self.entry)(footer, input, finish_yield_from);
        if result.is_none() {
            footer.yield_point = None;
            self.state = GenState::Completed;
            tracing::trace!(target: "heron::gen", "generator completed");
        }
        result
    }

    /// Visit the locals that must stay reachable while suspended.
    ///
    /// No-op once completed or when there is no yield point.
    pub fn visit_live_references(&self, visitor: &mut dyn FnMut(&V)) {
        if let Some(point) = self.live_yield_point() {
            point.visit_refs(visitor);
        }
    }

    /// Release the suspended locals.
    ///
    /// No-op once completed or when there is no yield point. The yield point
    /// is removed first, so a repeated teardown releases nothing.
    pub fn teardown(&mut self) {
        if self.state == GenState::Completed {
            return;
        }
        let point = match &mut self.footer {
            Some(footer) => footer.yield_point.take(),
            None => self.start.take(),
        };
        if let Some(mut point) = point {
            tracing::trace!(target: "heron::gen", state = ?self.state, "tearing down generator");
            point.release_refs();
        }
    }

    /// Value delegated to by an in-progress `yield from`.
    pub fn yield_from_value(&self) -> Option<&V> {
        self.live_yield_point()?.yield_from_value()
    }

    fn live_yield_point(&self) -> Option<&Y> {
        if self.state == GenState::Completed {
            return None;
        }
        match &self.footer {
            Some(footer) => footer.yield_point.as_ref(),
            None => self.start.as_ref(),
        }
    }
}

impl<V, Y> fmt::Debug for JitGenerator<V, Y> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JitGenerator")
            .field("state", &self.state)
            .field("function", &self.function)
            .field("footer", &self.footer)
            .finish_non_exhaustive()
    }
}
