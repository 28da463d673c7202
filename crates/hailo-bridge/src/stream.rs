//! # Streams
//!
//! Metadata for the named input/output tensor streams of a configured model, and
//! the fixed-size frame arithmetic every buffer binding is checked against.

use std::collections::HashMap;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::QueryError;

/// Per-call timeout applied inside the blocking inference primitive
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Depth of the accelerator's internal per-stream queue
pub const DEFAULT_STREAM_QUEUE_SIZE: usize = 2;

/// Every inference call processes exactly one frame
pub const FRAMES_PER_CALL: usize = 1;

/// Which side of the host/device boundary a stream feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// Element format of a stream as seen by the host.
///
/// `Auto` lets the accelerator pick its native format when a pipeline is bound;
/// it is never a valid format for a concrete stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatType {
    Auto,
    Uint8,
    Uint16,
    Float32,
}

impl FormatType {
    /// Bytes per element, `None` for [`FormatType::Auto`]
    pub fn element_size(self) -> Option<usize> {
        match self {
            FormatType::Auto => None,
            FormatType::Uint8 => Some(1),
            FormatType::Uint16 => Some(2),
            FormatType::Float32 => Some(4),
        }
    }

    /// Resolve a requested format against the stream's native format
    pub fn resolve(self, native: FormatType) -> FormatType {
        match self {
            FormatType::Auto => native,
            requested => requested,
        }
    }
}

/// Stream metadata as reported by the accelerator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub name: String,
    pub shape: Vec<usize>,
    pub format: FormatType,
}

impl StreamInfo {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, format: FormatType) -> Self {
        Self {
            name: name.into(),
            shape,
            format,
        }
    }

    /// Exact byte count of one frame of this stream.
    ///
    /// Computed from shape and element format only; no padding or scaling.
    pub fn frame_size(&self) -> Result<usize, QueryError> {
        let element_size = self.format.element_size().ok_or_else(|| QueryError::UnresolvedFormat {
            name: self.name.clone(),
        })?;
        self.shape
            .iter()
            .try_fold(element_size, |acc, dim| acc.checked_mul(*dim))
            .ok_or_else(|| QueryError::FrameSizeOverflow {
                name: self.name.clone(),
            })
    }

    /// The name and frame size of this stream
    pub fn descriptor(&self) -> Result<StreamDescriptor, QueryError> {
        Ok(StreamDescriptor {
            name: self.name.clone(),
            frame_size: self.frame_size()?,
        })
    }
}

/// The read-only view of a stream handed back to callers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub name: String,
    pub frame_size: usize,
}

/// Parameters used when binding a stream into a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub format: FormatType,
    pub timeout: Duration,
    pub queue_size: usize,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            format: FormatType::Auto,
            timeout: DEFAULT_STREAM_TIMEOUT,
            queue_size: DEFAULT_STREAM_QUEUE_SIZE,
        }
    }
}

/// Stream descriptors resolved once, with a name index for per-call lookups.
#[derive(Debug, Clone, Default)]
pub(crate) struct StreamTable {
    descriptors: Vec<StreamDescriptor>,
    index: HashMap<String, usize>,
}

impl StreamTable {
    pub(crate) fn from_infos(infos: &[StreamInfo]) -> Result<Self, QueryError> {
        let descriptors = infos
            .iter()
            .map(StreamInfo::descriptor)
            .collect::<Result<Vec<_>, _>>()?;
        let index = descriptors
            .iter()
            .enumerate()
            .map(|(idx, desc)| (desc.name.clone(), idx))
            .collect();
        Ok(Self { descriptors, index })
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub(crate) fn descriptors(&self) -> &[StreamDescriptor] {
        &self.descriptors
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.descriptors.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.descriptors.len()
    }
}
