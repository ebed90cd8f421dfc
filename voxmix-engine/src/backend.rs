//! Process-wide codec backend
//!
//! Codec and format registration happens exactly once per process, no matter
//! how many engines, sessions or decoders are created, and from which thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use symphonia::core::codecs::CodecRegistry;
use symphonia::core::probe::Probe;
use tracing::info;

/// Registered codecs and container probes.
pub struct Backend {
    codecs: CodecRegistry,
}

impl Backend {
    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn probe(&self) -> &'static Probe {
        symphonia::default::get_probe()
    }
}

static BACKEND: OnceLock<Backend> = OnceLock::new();
static INIT_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Get the backend, initializing it on first use.
pub fn backend() -> &'static Backend {
    BACKEND.get_or_init(|| {
        let mut codecs = CodecRegistry::new();
        symphonia::default::register_enabled_codecs(&mut codecs);
        INIT_COUNT.fetch_add(1, Ordering::SeqCst);
        info!("Audio backend initialized");
        Backend { codecs }
    })
}

/// Whether [`backend`] has run its initializer in this process.
pub fn is_initialized() -> bool {
    BACKEND.get().is_some()
}

/// How many times the initializer has executed (always 0 or 1).
pub fn init_count() -> usize {
    INIT_COUNT.load(Ordering::SeqCst)
}
