//! Synthetic frame source (`stub://`) for bench runs and tests.

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::frame::{Frame, FrameSource, SourceStats};
use crate::ingest::SourceConfig;

pub struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
    last_frame: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            last_frame: None,
        }
    }

    fn frame_interval(&self) -> Duration {
        if self.config.target_fps == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(1.0 / self.config.target_fps as f64)
    }

    /// Flat grey background with a slow brightness drift.
    fn generate_pixels(&self) -> Vec<u8> {
        let pixel_count = (self.config.width * self.config.height * 3) as usize;
        let shade = 96u8.wrapping_add((self.frame_count / 30 % 16) as u8);
        vec![shade; pixel_count]
    }
}

impl FrameSource for SyntheticSource {
    /// Synthetic sources are always "connected".
    fn connect(&mut self) -> Result<()> {
        log::info!("SyntheticSource: connected to {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if let Some(last) = self.last_frame {
            let remaining = self.frame_interval().saturating_sub(last.elapsed());
            if !remaining.is_zero() {
                std::thread::sleep(remaining);
            }
        }
        self.frame_count += 1;
        let now = Instant::now();
        self.last_frame = Some(now);
        Ok(Frame::captured(
            self.generate_pixels(),
            self.config.width,
            self.config.height,
            3,
            self.frame_count,
            now,
        ))
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> SourceConfig {
        SourceConfig {
            url: "stub://test".to_string(),
            target_fps: 0,
            width: 32,
            height: 24,
        }
    }

    #[test]
    fn frames_are_sequenced_and_well_formed() -> Result<()> {
        let mut source = SyntheticSource::new(fast_config());
        source.connect()?;
        let first = source.next_frame()?;
        let second = source.next_frame()?;
        assert!(first.is_well_formed());
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert!(second.captured_at >= first.captured_at);
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }
}
