//! Cropped view of a frame source
//!
//! Plays `[start, end)` of the inner source as if it were the whole file:
//! frame 0 of the view is `start`, the view ends at `end` or at the inner
//! end of stream (whichever comes first), and looping wraps back to `start`.

use crate::audio::FrameSource;
use crate::error::DecodeError;

pub struct CroppedSource {
    inner: Box<dyn FrameSource>,
    start: u64,
    end: Option<u64>,
    /// Frames into the view
    position: u64,
}

impl CroppedSource {
    /// Crop `inner` to frames `[start, end)`; `None` runs to the end of the
    /// inner stream.
    pub fn new(
        mut inner: Box<dyn FrameSource>,
        start: u64,
        end: Option<u64>,
    ) -> Result<Self, DecodeError> {
        if let Some(end) = end {
            if end <= start {
                return Err(DecodeError::InvalidFormat(format!(
                    "crop end frame {} is not after start frame {}",
                    end, start
                )));
            }
        }
        inner.seek_to_frame(start)?;
        Ok(Self {
            inner,
            start,
            end,
            position: 0,
        })
    }

    /// End of the view in inner frames, when known.
    fn end_bound(&self) -> Option<u64> {
        match (self.end, self.inner.duration_frames()) {
            (Some(end), Some(total)) => Some(end.min(total)),
            (Some(end), None) => Some(end),
            (None, total) => total,
        }
    }

    fn rewind(&mut self) -> Result<(), DecodeError> {
        self.inner.seek_to_frame(self.start)?;
        self.position = 0;
        Ok(())
    }
}

impl FrameSource for CroppedSource {
    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn duration_frames(&self) -> Option<u64> {
        self.inner.duration_frames().map(|total| {
            let end = self.end.map_or(total, |end| end.min(total));
            end.saturating_sub(self.start)
        })
    }

    fn seek_to_frame(&mut self, frame: u64) -> Result<(), DecodeError> {
        self.inner.seek_to_frame(self.start + frame)?;
        self.position = frame;
        Ok(())
    }

    fn read(
        &mut self,
        out: &mut [i16],
        max_frames: usize,
        looping: bool,
    ) -> Result<usize, DecodeError> {
        let channels = self.inner.channels().max(1) as usize;
        let max_frames = max_frames.min(out.len() / channels);
        let mut written = 0;
        let mut rewound_without_data = false;

        while written < max_frames {
            let room = (max_frames - written) as u64;
            let want = match self.end_bound() {
                Some(bound) => bound.saturating_sub(self.start + self.position).min(room),
                None => room,
            } as usize;

            let n = if want == 0 {
                0
            } else {
                let dst = &mut out[written * channels..(written + want) * channels];
                self.inner.read(dst, want, false)?
            };
            if n == 0 {
                if !looping || rewound_without_data {
                    break;
                }
                self.rewind()?;
                rewound_without_data = true;
                continue;
            }
            rewound_without_data = false;
            written += n;
            self.position += n as u64;
        }

        Ok(written)
    }
}
