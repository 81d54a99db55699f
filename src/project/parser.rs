// Project model parser
// Turns a project.xml document tree into a ProjectModel

use roxmltree::Document;
use thiserror::Error;

use super::document::{
    arrangement_clips_of, audio_reference_of, clips_of, tracks_of, transport_tempo_of, ClipElement,
};
use super::model::{Clip, ProjectModel, Track};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("document has no track container (Structure element); not a project file")]
    MissingRoot,
    #[error("project.xml is not well-formed XML: {0}")]
    Malformed(#[from] roxmltree::Error),
}

impl ProjectModel {
    /// Parse project XML text
    pub fn from_xml(text: &str) -> Result<Self, ParseError> {
        let document = Document::parse(text)?;
        Self::from_document(&document)
    }

    /// Build the model from an already parsed document.
    ///
    /// Missing or malformed attributes fall back to the defaults in
    /// [`super::document::defaults`]; only a missing track container fails.
    pub fn from_document(document: &Document<'_>) -> Result<Self, ParseError> {
        let track_elements = tracks_of(document).ok_or(ParseError::MissingRoot)?;

        let mut tracks: Vec<Track> = track_elements
            .iter()
            .map(|element| Track {
                name: element.name(),
                id: element.id().map(str::to_string),
                clips: clips_of(element).iter().map(build_clip).collect(),
            })
            .collect();

        for (track_id, element) in arrangement_clips_of(document) {
            match tracks.iter_mut().find(|t| t.id.as_deref() == Some(track_id)) {
                Some(track) => track.clips.push(build_clip(&element)),
                None => log::debug!("Ignoring arrangement clip for unknown track {}", track_id),
            }
        }

        let model = ProjectModel::new(tracks, transport_tempo_of(document));
        log::info!(
            "Parsed project: {} tracks, {} clips ({} with audio)",
            model.tracks().len(),
            model.clip_count(),
            model.audio_clip_count()
        );
        Ok(model)
    }
}

fn build_clip(element: &ClipElement<'_, '_>) -> Clip {
    Clip {
        name: element.name(),
        start_beat: element.start_beat(),
        audio_reference: audio_reference_of(element),
    }
}
