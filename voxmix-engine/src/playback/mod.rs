//! Per-source gain stages and the timeline mixer

pub mod fader;
pub mod limiter;
pub mod mixer;
pub mod sidechain;

pub use fader::FadeEnvelope;
pub use limiter::PeakLimiter;
pub use mixer::{decoder_opener, Mixer, SourceOpener};
pub use sidechain::SidechainDucker;
