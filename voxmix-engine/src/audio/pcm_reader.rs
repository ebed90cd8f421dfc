//! Headerless s16le PCM file reader
//!
//! The voice recording arrives as raw PCM with a caller-declared sample rate
//! and channel count. Seeking is a byte offset; there is nothing to decode.

use crate::audio::FrameSource;
use crate::error::DecodeError;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use voxmix_common::pcm::remix_channels;

const BYTES_PER_SAMPLE: u64 = 2;

pub struct PcmFileReader {
    path: PathBuf,
    reader: BufReader<File>,
    sample_rate: u32,
    source_channels: u16,
    output_channels: u16,
    total_frames: u64,
    position: u64,
    bytes: Vec<u8>,
    samples: Vec<i16>,
    remixed: Vec<i16>,
}

impl PcmFileReader {
    pub fn open(
        path: &Path,
        sample_rate: u32,
        source_channels: u16,
        output_channels: u16,
    ) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let total_frames = len / (BYTES_PER_SAMPLE * source_channels.max(1) as u64);
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            sample_rate,
            source_channels: source_channels.max(1),
            output_channels: output_channels.max(1),
            total_frames,
            position: 0,
            bytes: Vec::new(),
            samples: Vec::new(),
            remixed: Vec::new(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn io_error(&self, err: std::io::Error) -> DecodeError {
        DecodeError::Io {
            path: self.path.clone(),
            attempts: 1,
            reason: err.to_string(),
        }
    }
}

impl FrameSource for PcmFileReader {
    fn channels(&self) -> u16 {
        self.output_channels
    }

    fn duration_frames(&self) -> Option<u64> {
        Some(self.total_frames)
    }

    fn seek_to_frame(&mut self, frame: u64) -> Result<(), DecodeError> {
        let frame = frame.min(self.total_frames);
        let offset = frame * BYTES_PER_SAMPLE * self.source_channels as u64;
        self.reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| self.io_error(e))?;
        self.position = frame;
        Ok(())
    }

    fn read(
        &mut self,
        out: &mut [i16],
        max_frames: usize,
        looping: bool,
    ) -> Result<usize, DecodeError> {
        let out_channels = self.output_channels as usize;
        let max_frames = max_frames.min(out.len() / out_channels);
        let mut written = 0;

        while written < max_frames {
            let remaining = self.total_frames - self.position;
            if remaining == 0 {
                if !looping || self.total_frames == 0 {
                    break;
                }
                self.seek_to_frame(0)?;
                continue;
            }

            let frames = (max_frames - written).min(remaining as usize);
            let src_channels = self.source_channels as usize;
            self.bytes.resize(frames * src_channels * BYTES_PER_SAMPLE as usize, 0);
            if let Err(e) = self.reader.read_exact(&mut self.bytes) {
                return Err(self.io_error(e));
            }

            self.samples.clear();
            self.samples.extend(
                self.bytes
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]])),
            );
            self.remixed.clear();
            remix_channels(
                &self.samples,
                self.source_channels,
                self.output_channels,
                &mut self.remixed,
            );

            out[written * out_channels..(written + frames) * out_channels]
                .copy_from_slice(&self.remixed);
            written += frames;
            self.position += frames as u64;
        }

        Ok(written)
    }
}
