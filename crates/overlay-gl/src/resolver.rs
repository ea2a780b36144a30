//! GL entry-point resolution inside the host's current context.
//!
//! Guest renderers make native GL calls while the host's context is current,
//! so they need the host's function pointers. [`ProcResolver::resolve`] is a
//! pure lookup: it returns null (never panics) when the symbol is unknown or
//! no context is current on the calling thread.

use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::Once;

use tracing::{debug, trace};

/// Resolves GL function pointers from the calling thread's current context.
pub trait ProcResolver: Send + Sync {
    /// Look up `symbol`. Null when unresolvable or when no context is current.
    fn resolve(&self, symbol: &str) -> *const c_void;
}

/// A host's GL context, as far as symbol lookup is concerned.
///
/// Hosts implement this over their toolkit's context object (the equivalent
/// of "current context → getProcAddress").
pub trait GlContextSource: Send + Sync {
    /// Whether this context is current on the calling thread.
    fn is_current(&self) -> bool;

    /// Raw lookup. Only called while [`is_current`](Self::is_current) holds.
    fn proc_address(&self, symbol: &CStr) -> *const c_void;
}

/// Resolver backed by a host-provided [`GlContextSource`].
pub struct ContextResolver<S> {
    source: S,
}

impl<S: GlContextSource> ContextResolver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: GlContextSource> ProcResolver for ContextResolver<S> {
    fn resolve(&self, symbol: &str) -> *const c_void {
        if !self.source.is_current() {
            trace!(symbol, "no current GL context");
            return std::ptr::null();
        }
        match CString::new(symbol) {
            Ok(name) => self.source.proc_address(&name),
            Err(_) => std::ptr::null(),
        }
    }
}

static LOADER_INIT: Once = Once::new();

/// Resolver using the platform GL loader (`wglGetProcAddress`,
/// `glXGetProcAddress`, ...) for hosts that do not expose their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoaderResolver;

impl LoaderResolver {
    pub fn new() -> Self {
        LOADER_INIT.call_once(|| {
            gl_loader::init_gl();
            debug!("platform GL loader initialized");
        });
        Self
    }
}

impl ProcResolver for LoaderResolver {
    fn resolve(&self, symbol: &str) -> *const c_void {
        gl_loader::get_proc_address(symbol).cast()
    }
}

impl<R: ProcResolver + ?Sized> ProcResolver for std::sync::Arc<R> {
    fn resolve(&self, symbol: &str) -> *const c_void {
        (**self).resolve(symbol)
    }
}

impl<R: ProcResolver + ?Sized> ProcResolver for Box<R> {
    fn resolve(&self, symbol: &str) -> *const c_void {
        (**self).resolve(symbol)
    }
}

/// Load the `gl` crate's function table through `resolver`.
///
/// Must be called inside a pipeline callback (host context current). Returns
/// `false` when the core entry points could not be resolved.
pub fn load_gl_functions(resolver: &dyn ProcResolver) -> bool {
    gl::load_with(|symbol| resolver.resolve(symbol));
    let loaded = gl::GetIntegerv::is_loaded()
        && gl::GetString::is_loaded()
        && gl::BindFramebuffer::is_loaded();
    if loaded {
        debug!("GL function table loaded from host context");
    }
    loaded
}

/// Whether the `gl` function table holds entry points for one host context.
///
/// Each host owns one. Once the host context is invalidated the table is
/// stale, and the next [`ensure_loaded`](Self::ensure_loaded) resolves every
/// entry point again through the resolver it is given.
#[derive(Debug, Default)]
pub struct GlLoader {
    loaded: bool,
    loads: u64,
}

impl GlLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load through `resolver` unless already loaded for the live context.
    /// A failed load is retried on the next call.
    pub fn ensure_loaded(&mut self, resolver: &dyn ProcResolver) -> bool {
        if !self.loaded {
            self.loaded = load_gl_functions(resolver);
            if self.loaded {
                self.loads += 1;
            }
        }
        self.loaded
    }

    /// The context the table was loaded from is gone.
    pub fn invalidate(&mut self) {
        if self.loaded {
            trace!("GL function table marked stale");
        }
        self.loaded = false;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Successful loads so far, one per host context lifetime.
    pub fn loads(&self) -> u64 {
        self.loads
    }
}

/// C-ABI adapter for guest renderers that take a
/// `void *(*)(void *ctx, const char *name)` lookup callback.
///
/// # Safety
///
/// `ctx` must be null or point to a live `R` for the duration of the call,
/// and `name` must be null or a NUL-terminated string.
pub unsafe extern "C" fn proc_address_trampoline<R: ProcResolver>(
    ctx: *mut c_void,
    name: *const c_char,
) -> *mut c_void {
    if ctx.is_null() || name.is_null() {
        return std::ptr::null_mut();
    }
    let resolver = &*(ctx as *const R);
    match CStr::from_ptr(name).to_str() {
        Ok(symbol) => resolver.resolve(symbol) as *mut c_void,
        Err(_) => std::ptr::null_mut(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeContext {
        current: AtomicBool,
        lookups: AtomicUsize,
    }

    impl FakeContext {
        fn new(current: bool) -> Self {
            Self {
                current: AtomicBool::new(current),
                lookups: AtomicUsize::new(0),
            }
        }
    }

    impl GlContextSource for FakeContext {
        fn is_current(&self) -> bool {
            self.current.load(Ordering::SeqCst)
        }

        fn proc_address(&self, symbol: &CStr) -> *const c_void {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if symbol.to_bytes().starts_with(b"gl") {
                0x1000 as *const c_void
            } else {
                std::ptr::null()
            }
        }
    }

    #[test]
    fn resolves_only_while_current() {
        let resolver = ContextResolver::new(FakeContext::new(false));
        assert!(resolver.resolve("glClear").is_null());
        assert_eq!(resolver.source().lookups.load(Ordering::SeqCst), 0);

        resolver.source().current.store(true, Ordering::SeqCst);
        assert_eq!(resolver.resolve("glClear") as usize, 0x1000);
        assert!(resolver.resolve("vkCreateDevice").is_null());
    }

    #[test]
    fn interior_nul_resolves_to_null() {
        let resolver = ContextResolver::new(FakeContext::new(true));
        assert!(resolver.resolve("gl\0Clear").is_null());
    }

    #[test]
    fn trampoline_forwards_and_rejects_null() {
        let resolver = ContextResolver::new(FakeContext::new(true));
        let ctx = &resolver as *const _ as *mut c_void;
        let name = CString::new("glViewport").unwrap();
        unsafe {
            let found = proc_address_trampoline::<ContextResolver<FakeContext>>(ctx, name.as_ptr());
            assert_eq!(found as usize, 0x1000);
            assert!(proc_address_trampoline::<ContextResolver<FakeContext>>(
                std::ptr::null_mut(),
                name.as_ptr()
            )
            .is_null());
            assert!(
                proc_address_trampoline::<ContextResolver<FakeContext>>(ctx, std::ptr::null())
                    .is_null()
            );
        }
    }
    fn lookups(resolver: &ContextResolver<FakeContext>) -> usize {
        resolver.source().lookups.load(Ordering::SeqCst)
    }

    // The only test in this crate that touches the process-wide `gl` table;
    // the fake pointers are never called.
    #[test]
    fn recreated_context_is_resolved_again_after_invalidation() {
        let first = ContextResolver::new(FakeContext::new(true));
        let second = ContextResolver::new(FakeContext::new(true));
        let mut loader = GlLoader::new();

        assert!(loader.ensure_loaded(&first));
        let first_lookups = lookups(&first);
        assert!(first_lookups > 0);

        // same context: no second pass over the entry points
        assert!(loader.ensure_loaded(&first));
        assert!(loader.ensure_loaded(&second));
        assert_eq!(lookups(&first), first_lookups);
        assert_eq!(lookups(&second), 0);

        loader.invalidate();
        assert!(!loader.is_loaded());
        assert!(loader.ensure_loaded(&second));
        assert!(lookups(&second) > 0);
        assert_eq!(lookups(&first), first_lookups);
        assert_eq!(loader.loads(), 2);
    }
}
