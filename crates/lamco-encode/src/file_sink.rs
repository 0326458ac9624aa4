//! Elementary stream files
//!
//! A minimal on-disk [`ContainerWriter`]: the codec configuration followed
//! by every sample, back to back. With H.264 Annex-B output from the encoder
//! the resulting `.h264` file is directly playable.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::encoder::TrackFormat;
use crate::error::MuxerError;
use crate::muxer::{ContainerFactory, ContainerWriter, MuxResult, SampleInfo};

/// Writes a single video track as a raw elementary stream
#[derive(Debug)]
pub struct ElementaryStreamWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    codec_config: Option<Vec<u8>>,
    started: bool,
    samples: u64,
}

impl ElementaryStreamWriter {
    /// Create the file at `path`
    pub fn create(path: &Path) -> MuxResult<Self> {
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            out: Some(BufWriter::new(file)),
            codec_config: None,
            started: false,
            samples: 0,
        })
    }

    /// Samples written so far
    #[must_use]
    pub fn samples(&self) -> u64 {
        self.samples
    }

    fn out(&mut self) -> MuxResult<&mut BufWriter<File>> {
        self.out
            .as_mut()
            .ok_or_else(|| MuxerError::invalid_state("writer already stopped"))
    }
}

impl ContainerWriter for ElementaryStreamWriter {
    fn add_track(&mut self, format: &TrackFormat) -> MuxResult<usize> {
        if self.codec_config.is_some() {
            return Err(MuxerError::TrackRejected(
                "elementary streams carry a single track".to_string(),
            ));
        }
        if !format.mime.starts_with("video/") {
            return Err(MuxerError::TrackRejected(format!("unsupported mime {}", format.mime)));
        }
        self.codec_config = Some(format.codec_config.clone());
        Ok(0)
    }

    fn start(&mut self) -> MuxResult<()> {
        if self.started {
            return Err(MuxerError::invalid_state("already started"));
        }
        let config = self
            .codec_config
            .clone()
            .ok_or_else(|| MuxerError::invalid_state("start before add_track"))?;
        self.out()?.write_all(&config)?;
        self.started = true;
        Ok(())
    }

    fn write_sample(&mut self, track: usize, data: &[u8], _info: SampleInfo) -> MuxResult<()> {
        if !self.started {
            return Err(MuxerError::invalid_state("sample before start"));
        }
        if track != 0 {
            return Err(MuxerError::invalid_state(format!("unknown track {}", track)));
        }
        self.out()?.write_all(data)?;
        self.samples += 1;
        Ok(())
    }

    fn stop(&mut self) -> MuxResult<()> {
        if !self.started {
            return Err(MuxerError::invalid_state("stop before start"));
        }
        let mut out = self
            .out
            .take()
            .ok_or_else(|| MuxerError::invalid_state("writer already stopped"))?;
        out.flush()?;
        debug!("Wrote {} samples to {}", self.samples, self.path.display());
        Ok(())
    }
}

/// Opens [`ElementaryStreamWriter`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct ElementaryStreamFactory;

impl ContainerFactory for ElementaryStreamFactory {
    fn open(&self, path: &Path) -> MuxResult<Box<dyn ContainerWriter>> {
        Ok(Box::new(ElementaryStreamWriter::create(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncoderParams;

    fn info() -> SampleInfo {
        SampleInfo {
            pts_us: 0,
            key_frame: false,
        }
    }

    #[test]
    fn test_writes_config_then_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip_high_quality_0.h264");

        let mut writer = ElementaryStreamWriter::create(&path).unwrap();
        let format = TrackFormat::from_params(&EncoderParams::default(), vec![0, 0, 0, 1, 0x67]);
        assert_eq!(writer.add_track(&format).unwrap(), 0);
        writer.start().unwrap();
        writer.write_sample(0, &[0, 0, 0, 1, 0x65, 9], info()).unwrap();
        writer.stop().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 1, 0x67, 0, 0, 0, 1, 0x65, 9]);
        assert_eq!(writer.samples(), 1);
    }

    #[test]
    fn test_rejects_out_of_order_calls() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ElementaryStreamWriter::create(&dir.path().join("x.h264")).unwrap();

        assert!(writer.start().is_err());
        assert!(writer.write_sample(0, &[1], info()).is_err());

        let format = TrackFormat::from_params(&EncoderParams::default(), vec![1]);
        writer.add_track(&format).unwrap();
        assert!(matches!(
            writer.add_track(&format),
            Err(MuxerError::TrackRejected(_))
        ));
        writer.start().unwrap();
        writer.stop().unwrap();
        assert!(writer.stop().is_err());
    }

    #[test]
    fn test_factory_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.h264");
        let writer = ElementaryStreamFactory.open(&path).unwrap();
        drop(writer);
        assert!(path.exists());
    }
}
