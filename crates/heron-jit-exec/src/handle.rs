//! Function and code identities seen by the coordinator.
//!
//! The host object model owns [`JitFunction`]s. The coordinator only keeps
//! [`FunctionHandle`]s, which are weak: a function may be dropped between
//! registration and compilation and every consumer must tolerate a failed
//! [`FunctionHandle::upgrade`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_FUNCTION_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a function object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(u64);

impl FunctionId {
    fn next() -> Self {
        Self(NEXT_FUNCTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// De-duplication key for a code body.
///
/// Distinct from [`FunctionId`]: several closures can share one body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeId(u64);

impl CodeId {
    fn next() -> Self {
        Self(NEXT_CODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// A code body that one or more functions close over.
#[derive(Debug)]
pub struct CodeObject {
    id: CodeId,
    name: String,
}

impl CodeObject {
    /// Create a new code body with a fresh identity.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: CodeId::next(),
            name: name.into(),
        })
    }

    /// Identity used to de-duplicate concurrent compiles.
    pub fn id(&self) -> CodeId {
        self.id
    }

    /// Code body name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Function kind flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionFlags {
    /// Statically compiled; satisfies a stronger contract and may bypass the
    /// allow-list when `compile_all_static_functions` is set.
    pub is_static: bool,
    /// Suspendable (generator-like) function
    pub is_generator: bool,
}

/// A compilable function object owned by the host.
pub struct JitFunction {
    id: FunctionId,
    qualname: String,
    code: Arc<CodeObject>,
    flags: FunctionFlags,
}

impl JitFunction {
    /// Create a plain function over `code`.
    pub fn new(qualname: impl Into<String>, code: Arc<CodeObject>) -> Arc<Self> {
        Self::with_flags(qualname, code, FunctionFlags::default())
    }

    /// Create a function with explicit kind flags.
    pub fn with_flags(
        qualname: impl Into<String>,
        code: Arc<CodeObject>,
        flags: FunctionFlags,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: FunctionId::next(),
            qualname: qualname.into(),
            code,
            flags,
        })
    }

    /// Function identity.
    pub fn id(&self) -> FunctionId {
        self.id
    }

    /// Fully qualified name, e.g. `module:Class.method`.
    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    /// Shared code body.
    pub fn code(&self) -> &Arc<CodeObject> {
        &self.code
    }

    /// Identity of the shared code body.
    pub fn code_id(&self) -> CodeId {
        self.code.id()
    }

    /// Kind flags.
    pub fn flags(&self) -> FunctionFlags {
        self.flags
    }

    /// Check if function is statically compiled
    #[inline]
    pub fn is_static(&self) -> bool {
        self.flags.is_static
    }

    /// Check if function is generator-like
    #[inline]
    pub fn is_generator(&self) -> bool {
        self.flags.is_generator
    }

    /// Non-owning handle to this function.
    pub fn handle(self: &Arc<Self>) -> FunctionHandle {
        FunctionHandle {
            id: self.id,
            code: self.code.id(),
            function: Arc::downgrade(self),
        }
    }
}

impl fmt::Debug for JitFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JitFunction")
            .field("id", &self.id)
            .field("qualname", &self.qualname)
            .field("code", &self.code.id())
            .field("flags", &self.flags)
            .finish()
    }
}

/// Weak identity of a [`JitFunction`], compared by [`FunctionId`].
#[derive(Clone)]
pub struct FunctionHandle {
    id: FunctionId,
    code: CodeId,
    function: Weak<JitFunction>,
}

impl FunctionHandle {
    /// Function identity.
    pub fn id(&self) -> FunctionId {
        self.id
    }

    /// Code identity captured at handle creation.
    pub fn code_id(&self) -> CodeId {
        self.code
    }

    /// The function, if the host still keeps it alive.
    pub fn upgrade(&self) -> Option<Arc<JitFunction>> {
        self.function.upgrade()
    }

    /// Whether the host has dropped the function.
    pub fn is_dropped(&self) -> bool {
        self.function.strong_count() == 0
    }
}

impl PartialEq for FunctionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FunctionHandle {}

impl Hash for FunctionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for FunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionHandle")
            .field("id", &self.id)
            .field("code", &self.code)
            .field("dropped", &self.is_dropped())
            .finish()
    }
}
