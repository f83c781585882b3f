//! Frame ingestion sources.
//!
//! Real camera drivers live outside this crate. The controller ships a
//! synthetic source for `stub://` URLs so the perception loop can run on a
//! bench without hardware; any other scheme must be supplied by the caller as
//! a `FrameSource` implementation.

pub mod synthetic;

use anyhow::{bail, Result};

use crate::frame::FrameSource;

pub use synthetic::SyntheticSource;

/// Configuration for a frame source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Source URL (`stub://<name>` for the synthetic source).
    pub url: String,
    /// Target frame rate; the synthetic source paces itself to it.
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://workcell".to_string(),
            target_fps: 15,
            width: 640,
            height: 480,
        }
    }
}

/// Open the built-in source for `config.url`.
pub fn open_source(config: SourceConfig) -> Result<Box<dyn FrameSource>> {
    if config.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config)));
    }
    bail!(
        "no built-in frame source for '{}'; provide a FrameSource implementation",
        config.url
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_urls_open_synthetic_source() -> Result<()> {
        let mut source = open_source(SourceConfig::default())?;
        source.connect()?;
        let frame = source.next_frame()?;
        assert_eq!(frame.width, 640);
        assert_eq!(frame.height, 480);
        Ok(())
    }

    #[test]
    fn other_schemes_are_rejected() {
        let config = SourceConfig {
            url: "rtsp://10.0.0.5/stream".to_string(),
            ..SourceConfig::default()
        };
        assert!(open_source(config).is_err());
    }
}
