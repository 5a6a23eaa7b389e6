use std::collections::BTreeMap;

use crate::{
    error::WriteError,
    output::ContainerWriter,
    stream::{MediaKind, StreamDescriptor},
};

/// Which source streams are carried to the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamSelection {
    /// Every audio and video stream, in source order.
    #[default]
    AudioVideo,
    /// Video streams only.
    VideoOnly,
    /// The first video stream only.
    FirstVideo,
}

impl StreamSelection {
    pub fn carries(&self, kind: MediaKind) -> bool {
        match self {
            StreamSelection::AudioVideo => matches!(kind, MediaKind::Audio | MediaKind::Video),
            StreamSelection::VideoOnly | StreamSelection::FirstVideo => kind == MediaKind::Video,
        }
    }

    fn limit(&self) -> usize {
        match self {
            StreamSelection::FirstVideo => 1,
            _ => usize::MAX,
        }
    }
}

/// Source stream index to destination stream index, fixed for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamMapping {
    entries: BTreeMap<usize, usize>,
}

impl StreamMapping {
    pub fn destination(&self, source_index: usize) -> Option<usize> {
        self.entries.get(&source_index).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(source, destination)` pairs ordered by source index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.entries.iter().map(|(s, d)| (*s, *d))
    }
}

pub struct StreamMapper {
    selection: StreamSelection,
}

impl StreamMapper {
    pub fn new(selection: StreamSelection) -> Self {
        Self { selection }
    }

    /// Decide which streams are carried without touching a writer.
    pub fn plan(&self, sources: &[StreamDescriptor]) -> StreamMapping {
        let mut ordered: Vec<&StreamDescriptor> = sources.iter().collect();
        ordered.sort_by_key(|s| s.index());

        let entries = ordered
            .into_iter()
            .filter(|s| self.selection.carries(s.kind()))
            .take(self.selection.limit())
            .enumerate()
            .map(|(destination, s)| (s.index(), destination))
            .collect();
        StreamMapping { entries }
    }

    /// Create one destination stream per carried source stream and return the
    /// resulting mapping. Any creation failure aborts the whole mapping.
    pub fn map<W: ContainerWriter + ?Sized>(
        &self,
        sources: &[StreamDescriptor],
        writer: &mut W,
    ) -> Result<StreamMapping, WriteError> {
        let planned = self.plan(sources);
        let mut entries = BTreeMap::new();
        for (source_index, _) in planned.iter() {
            let Some(source) = sources.iter().find(|s| s.index() == source_index) else {
                continue;
            };
            let destination = writer.add_stream(source)?;
            log::info!(
                "map stream {} ({:?} {:?}) -> {}",
                source_index,
                source.kind(),
                source.codec_id(),
                destination
            );
            entries.insert(source_index, destination);
        }
        Ok(StreamMapping { entries })
    }
}

impl Default for StreamMapper {
    fn default() -> Self {
        Self::new(StreamSelection::default())
    }
}

#[cfg(test)]
#[path = "mapper_test.rs"]
mod mapper_test;
