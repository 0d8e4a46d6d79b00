//! Late binding of the modern display-manager entry point
//!
//! Older runtimes do not export `GetDisplayManagerInstance`. The symbol is
//! looked up once per probe, the function pointer cached, and every later
//! call routes through the cached `Option`.

use libloading::Library;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use super::{DisplayManager, DisplayManagerProbe};
use crate::runtime::SrContext;

/// Module names the runtime ships its display library under
pub const DISPLAY_MODULE_CANDIDATES: [&str; 4] = [
    "SimulatedRealityDisplays",
    "SimulatedRealityDisplaysd",
    "SimulatedRealityDisplays32",
    "SimulatedRealityDisplays32d",
];

/// Exported symbol of runtimes that have a display manager
pub const DISPLAY_MANAGER_SYMBOL: &[u8] = b"GetDisplayManagerInstance\0";

/// `IDisplayManager* GetDisplayManagerInstance(SRContext&)`
pub type GetDisplayManagerInstanceFn = unsafe extern "C" fn(context: *mut c_void) -> *mut c_void;

struct ResolvedEntry {
    // Keeps the module mapped for as long as `entry` may be called.
    _library: Library,
    entry: GetDisplayManagerInstanceFn,
}

/// Probe resolving the display manager from the runtime's shared library
pub struct SharedLibraryProbe {
    candidates: Vec<String>,
    resolved: OnceLock<Option<ResolvedEntry>>,
}

impl SharedLibraryProbe {
    pub fn new() -> Self {
        Self::with_candidates(DISPLAY_MODULE_CANDIDATES.iter().map(|name| name.to_string()))
    }

    pub fn with_candidates(candidates: impl IntoIterator<Item = String>) -> Self {
        Self {
            candidates: candidates.into_iter().collect(),
            resolved: OnceLock::new(),
        }
    }

    /// Process-wide probe over the default module names
    pub fn global() -> Arc<SharedLibraryProbe> {
        static GLOBAL: OnceLock<Arc<SharedLibraryProbe>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(SharedLibraryProbe::new())))
    }

    /// Whether the running runtime exports the display manager
    pub fn is_available(&self) -> bool {
        self.entry().is_some()
    }

    fn entry(&self) -> Option<GetDisplayManagerInstanceFn> {
        self.resolved
            .get_or_init(|| resolve(&self.candidates))
            .as_ref()
            .map(|resolved| resolved.entry)
    }
}

impl Default for SharedLibraryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayManagerProbe for SharedLibraryProbe {
    fn display_manager(&self, context: &dyn SrContext) -> Option<Box<dyn DisplayManager>> {
        let entry = self.entry()?;
        let handle = context.raw_handle();
        if handle.is_null() {
            return None;
        }
        // SAFETY: `entry` was resolved from the runtime's display module, which
        // stays loaded for the life of the probe, and `handle` is a live context.
        let raw = unsafe { entry(handle) };
        NonNull::new(raw).and_then(|manager| context.adopt_display_manager(manager))
    }
}

/// Probe for runtimes known to predate the display manager
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyOnlyProbe;

impl DisplayManagerProbe for LegacyOnlyProbe {
    fn display_manager(&self, _context: &dyn SrContext) -> Option<Box<dyn DisplayManager>> {
        None
    }
}

fn resolve(candidates: &[String]) -> Option<ResolvedEntry> {
    for name in candidates {
        let library = match open_module(name) {
            Ok(library) => library,
            Err(e) => {
                debug!("Display module {} not loaded: {}", name, e);
                continue;
            }
        };

        // SAFETY: the symbol type matches the runtime's exported C signature.
        let entry = unsafe { library.get::<GetDisplayManagerInstanceFn>(DISPLAY_MANAGER_SYMBOL) }
            .map(|symbol| *symbol);

        match entry {
            Ok(entry) => {
                info!("Display manager entry point resolved from {}", name);
                return Some(ResolvedEntry {
                    _library: library,
                    entry,
                });
            }
            Err(e) => debug!("{} has no display manager entry point: {}", name, e),
        }
    }

    info!("Display manager not exported by the runtime, using legacy display");
    None
}

#[cfg(target_os = "windows")]
fn open_module(name: &str) -> Result<Library, libloading::Error> {
    // Only bind against a module the runtime already mapped into the process.
    libloading::os::windows::Library::open_already_loaded(name).map(Library::from)
}

#[cfg(not(target_os = "windows"))]
fn open_module(name: &str) -> Result<Library, libloading::Error> {
    // SAFETY: loading the runtime's own display library runs no untrusted initializers.
    unsafe { Library::new(libloading::library_filename(name)) }
}
