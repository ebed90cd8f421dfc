//! File-to-file decode
//!
//! Decodes any container the backend reads into WAV or raw s16le (chosen by
//! the output extension) at a caller-chosen rate and channel count. Another
//! thread may stop a running transcode or poll its progress.

use crate::audio::{create_sink, FrameSource, StopFlag, TimedSourceDecoder};
use crate::config::EngineConfig;
use crate::error::SessionError;
use crate::session::RenderOutcome;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{info, warn};
use voxmix_common::TrackKind;

pub struct Transcoder {
    stop: StopFlag,
    progress: AtomicU8,
    chunk_frames: usize,
    retry_limit: u32,
}

impl Transcoder {
    pub fn new(engine_config: &EngineConfig) -> Self {
        Self {
            stop: StopFlag::new(),
            progress: AtomicU8::new(0),
            chunk_frames: engine_config.chunk_frames.max(1),
            retry_limit: engine_config.decode_retry_limit,
        }
    }

    /// Stop the transcode in progress. A later `run` starts afresh.
    pub fn stop(&self) {
        self.stop.raise();
    }

    /// Percent of the input written so far; 0 when the input length is unknown.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Acquire)
    }

    /// Decode `input` into `output` at `sample_rate` Hz × `channels`.
    ///
    /// A stop leaves a valid, shorter file and returns
    /// [`RenderOutcome::Stopped`].
    pub fn run(
        &self,
        input: &Path,
        output: &Path,
        sample_rate: u32,
        channels: u16,
    ) -> Result<RenderOutcome, SessionError> {
        self.stop.clear();
        self.progress.store(0, Ordering::Release);

        let mut decoder = TimedSourceDecoder::with_retry_limit(
            input,
            sample_rate,
            channels,
            TrackKind::Music,
            self.retry_limit,
        )?
        .with_stop_flag(self.stop.clone());
        let total = decoder.duration_frames().filter(|&frames| frames > 0);
        let mut sink = create_sink(output, sample_rate, channels)?;
        info!(
            "Transcoding {} to {} ({} Hz × {} ch)",
            input.display(),
            output.display(),
            sample_rate,
            channels
        );

        let width = channels as usize;
        let mut buffer = vec![0i16; self.chunk_frames * width];
        let mut written = 0u64;
        loop {
            if self.stop.is_raised() {
                sink.finish()?;
                warn!(
                    "Transcode of {} stopped after {} frames",
                    input.display(),
                    written
                );
                return Ok(RenderOutcome::Stopped);
            }
            let n = decoder.read(&mut buffer, self.chunk_frames, false)?;
            if n == 0 {
                break;
            }
            sink.write(&buffer[..n * width])?;
            written += n as u64;
            if let Some(total) = total {
                let percent = (written.min(total) * 100 / total) as u8;
                self.progress.fetch_max(percent, Ordering::AcqRel);
            }
        }

        sink.finish()?;
        self.progress.store(100, Ordering::Release);
        info!("Transcoded {} frames into {}", written, output.display());
        Ok(RenderOutcome::Completed)
    }
}
