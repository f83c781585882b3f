use anyhow::Result;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Replays prepared detections, one batch per frame.
///
/// Batches are re-stamped with the frame's capture instant. When the script
/// runs dry the detector reports empty frames, or repeats the last batch when
/// built with `looping`. The script can be extended from another thread
/// through a `ScriptHandle`.
pub struct ScriptedDetector {
    script: Arc<Mutex<VecDeque<Vec<Detection>>>>,
    looping: bool,
    last: Vec<Detection>,
}

/// Shared handle to push more batches into a running `ScriptedDetector`.
#[derive(Clone)]
pub struct ScriptHandle {
    script: Arc<Mutex<VecDeque<Vec<Detection>>>>,
}

impl ScriptHandle {
    pub fn push(&self, batch: Vec<Detection>) {
        let mut script = match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        script.push_back(batch);
    }
}

impl ScriptedDetector {
    pub fn new(batches: Vec<Vec<Detection>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(batches.into())),
            looping: false,
            last: Vec::new(),
        }
    }

    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    pub fn handle(&self) -> ScriptHandle {
        ScriptHandle {
            script: self.script.clone(),
        }
    }
}

impl Default for ScriptedDetector {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl DetectorBackend for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Detection>> {
        let next = {
            let mut script = match self.script.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            script.pop_front()
        };
        let batch = match next {
            Some(batch) => {
                if self.looping {
                    self.last = batch.clone();
                }
                batch
            }
            None if self.looping => self.last.clone(),
            None => Vec::new(),
        };
        Ok(batch
            .into_iter()
            .filter(|det| det.confidence >= confidence)
            .map(|mut det| {
                det.timestamp = frame.captured_at;
                det
            })
            .collect())
    }
}
