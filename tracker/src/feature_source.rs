//! Feature source boundary.
//!
//! The landmark extractor lives outside this crate. It is modelled as a
//! non-blocking `FeatureSource` that yields at most one `FeatureFrame` per
//! poll. A poll that yields nothing means no fresh frame arrived in time and
//! is treated by the gaze loop as "no face".

use std::collections::VecDeque;
use std::io::{BufRead, Write};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::features::FeatureVector;

/// One processed camera frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    /// Extracted features; absent when no face was found.
    #[serde(default)]
    pub features: Option<FeatureVector>,
    #[serde(default)]
    pub blink: bool,
    pub face_detected: bool,
}

impl FeatureFrame {
    pub fn face(features: FeatureVector, blink: bool) -> Self {
        Self {
            features: Some(features),
            blink,
            face_detected: true,
        }
    }

    pub fn no_face() -> Self {
        Self {
            features: None,
            blink: false,
            face_detected: false,
        }
    }

    /// Features that may be fed to a model: present, finite, with a face.
    pub fn usable_features(&self) -> Option<&FeatureVector> {
        if !self.face_detected {
            return None;
        }
        self.features.as_ref().filter(|f| f.is_finite())
    }
}

/// Non-blocking supplier of feature frames.
pub trait FeatureSource: Send {
    /// Next frame if one is ready. `None` means a missing frame this cycle.
    fn poll(&mut self) -> Option<FeatureFrame>;

    /// Whether the source will never produce another frame.
    fn is_exhausted(&self) -> bool;
}

/// Replays a fixed sequence. `None` entries simulate frames that did not
/// arrive within the frame interval.
pub struct ScriptedFeatureSource {
    frames: VecDeque<Option<FeatureFrame>>,
}

impl ScriptedFeatureSource {
    pub fn new(frames: Vec<Option<FeatureFrame>>) -> Self {
        Self {
            frames: VecDeque::from(frames),
        }
    }

    /// Every frame arrives on time.
    pub fn from_frames(frames: Vec<FeatureFrame>) -> Self {
        Self::new(frames.into_iter().map(Some).collect())
    }

    /// Parse a JSON-lines trace. Each line is a `FeatureFrame` object or
    /// `null` for a dropped frame; blank lines are skipped.
    pub fn from_json_lines<R: BufRead>(reader: R) -> anyhow::Result<Self> {
        let mut frames = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("reading trace line {}", lineno + 1))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let frame: Option<FeatureFrame> = serde_json::from_str(trimmed)
                .with_context(|| format!("parsing trace line {}", lineno + 1))?;
            frames.push(frame);
        }
        Ok(Self::new(frames))
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FeatureSource for ScriptedFeatureSource {
    fn poll(&mut self) -> Option<FeatureFrame> {
        self.frames.pop_front().flatten()
    }

    fn is_exhausted(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Records every frame pulled from an inner source.
pub struct RecordingSource<S: FeatureSource> {
    inner: S,
    recorded: Vec<Option<FeatureFrame>>,
}

impl<S: FeatureSource> RecordingSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            recorded: Vec::new(),
        }
    }

    pub fn recorded(&self) -> &[Option<FeatureFrame>] {
        &self.recorded
    }

    pub fn into_recorded(self) -> Vec<Option<FeatureFrame>> {
        self.recorded
    }

    /// Write the recorded frames in the trace format read by
    /// `ScriptedFeatureSource::from_json_lines`.
    pub fn write_json_lines<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        for frame in &self.recorded {
            serde_json::to_writer(&mut writer, frame).context("serializing frame")?;
            writer.write_all(b"\n").context("writing trace")?;
        }
        writer.flush().context("flushing trace")?;
        Ok(())
    }
}

impl<F: FeatureSource + ?Sized> FeatureSource for Box<F> {
    fn poll(&mut self) -> Option<FeatureFrame> {
        (**self).poll()
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }
}

impl<S: FeatureSource> FeatureSource for RecordingSource<S> {
    fn poll(&mut self) -> Option<FeatureFrame> {
        let frame = self.inner.poll();
        self.recorded.push(frame.clone());
        frame
    }

    fn is_exhausted(&self) -> bool {
        self.inner.is_exhausted()
    }
}
