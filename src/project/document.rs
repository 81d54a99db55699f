// Typed accessors over the project.xml document tree
// The parser only talks to these functions, never to raw element names

use roxmltree::{Document, Node};

use super::model::{FileReference, Tempo};

const STRUCTURE: &str = "Structure";
const TRACK: &str = "Track";
const CLIP_PATH: &[&str] = &["Lanes", "Clips", "Clip"];
const WARPED_FILE_PATH: &[&str] = &["Warps", "Audio", "File"];
const AUDIO_FILE_PATH: &[&str] = &["Audio", "File"];
const TEMPO_PATH: &[&str] = &["Transport", "Tempo"];

/// Fallbacks applied when an attribute is absent or unparsable.
///
/// | element | attribute | default     |
/// |---------|-----------|-------------|
/// | Track   | `name`    | `""`        |
/// | Clip    | `name`    | `"unnamed"` |
/// | Clip    | `time`    | `0.0`       |
pub mod defaults {
    pub const TRACK_NAME: &str = "";
    pub const CLIP_NAME: &str = "unnamed";
    pub const CLIP_TIME: f64 = 0.0;
}

/// Attribute value types with an explicit parse policy
pub trait AttributeValue: Sized {
    fn parse_attribute(raw: &str) -> Option<Self>;
}

impl AttributeValue for String {
    /// Empty strings count as absent
    fn parse_attribute(raw: &str) -> Option<Self> {
        (!raw.is_empty()).then(|| raw.to_string())
    }
}

impl AttributeValue for f64 {
    /// Surrounding whitespace is ignored; NaN and infinities are rejected
    fn parse_attribute(raw: &str) -> Option<Self> {
        raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

/// Parse an optional raw attribute, falling back to `default` when the
/// attribute is missing or does not parse.
pub fn parse_or_default<T: AttributeValue>(raw: Option<&str>, default: T) -> T {
    raw.and_then(T::parse_attribute).unwrap_or(default)
}

/// A `Track` element under the project structure
#[derive(Debug, Clone, Copy)]
pub struct TrackElement<'a, 'input> {
    node: Node<'a, 'input>,
}

impl<'a, 'input> TrackElement<'a, 'input> {
    pub fn name(&self) -> String {
        parse_or_default(self.node.attribute("name"), defaults::TRACK_NAME.to_string())
    }

    pub fn id(&self) -> Option<&'a str> {
        self.node.attribute("id")
    }
}

/// A `Clip` element inside a lane
#[derive(Debug, Clone, Copy)]
pub struct ClipElement<'a, 'input> {
    node: Node<'a, 'input>,
}

impl<'a, 'input> ClipElement<'a, 'input> {
    pub fn name(&self) -> String {
        parse_or_default(self.node.attribute("name"), defaults::CLIP_NAME.to_string())
    }

    pub fn start_beat(&self) -> f64 {
        parse_or_default(self.node.attribute("time"), defaults::CLIP_TIME)
    }
}

/// Select the tracks of every track container, in document order.
///
/// Returns None when the document has no track container at all, which
/// tells "not a project file" apart from an empty project.
pub fn tracks_of<'a, 'input>(document: &'a Document<'input>) -> Option<Vec<TrackElement<'a, 'input>>> {
    let containers: Vec<_> = document
        .descendants()
        .filter(|node| node.has_tag_name(STRUCTURE))
        .collect();
    if containers.is_empty() {
        return None;
    }

    Some(
        containers
            .into_iter()
            .flat_map(|container| container.children())
            .filter(|node| node.has_tag_name(TRACK))
            .map(|node| TrackElement { node })
            .collect(),
    )
}

/// Clips placed directly inside a track's lanes
pub fn clips_of<'a, 'input>(track: &TrackElement<'a, 'input>) -> Vec<ClipElement<'a, 'input>> {
    track
        .node
        .descendants()
        .filter(|node| ends_with_path(*node, CLIP_PATH))
        .map(|node| ClipElement { node })
        .collect()
}

/// Clips placed in arrangement lanes that point at a track by id.
///
/// Each entry pairs the referenced track id with the clip. Clips that sit
/// inside a `Track` element belong to that track and are not returned here.
pub fn arrangement_clips_of<'a, 'input>(
    document: &'a Document<'input>,
) -> Vec<(&'a str, ClipElement<'a, 'input>)> {
    document
        .descendants()
        .filter(|node| ends_with_path(*node, CLIP_PATH))
        .filter(|node| !node.ancestors().any(|a| a.has_tag_name(TRACK)))
        .filter_map(|node| {
            let track_id = node
                .ancestors()
                .filter(|a| a.has_tag_name("Lanes"))
                .find_map(|lanes| lanes.attribute("track"))?;
            Some((track_id, ClipElement { node }))
        })
        .collect()
}

/// Locate the clip's audio file. A warped audio file takes precedence over a
/// plain one; within each, the first match in document order wins.
pub fn audio_reference_of(clip: &ClipElement<'_, '_>) -> Option<FileReference> {
    let file = first_descendant_with_path(clip.node, WARPED_FILE_PATH)
        .or_else(|| first_descendant_with_path(clip.node, AUDIO_FILE_PATH))?;
    file.attribute("path").map(FileReference::new)
}

/// The tempo declared under `Transport`, if present and valid
pub fn transport_tempo_of(document: &Document<'_>) -> Option<Tempo> {
    let tempo = document
        .descendants()
        .find(|node| ends_with_path(*node, TEMPO_PATH))?;
    let bpm = f64::parse_attribute(tempo.attribute("value")?)?;
    Tempo::new(bpm).ok()
}

fn first_descendant_with_path<'a, 'input>(
    root: Node<'a, 'input>,
    path: &[&str],
) -> Option<Node<'a, 'input>> {
    root.descendants()
        .skip(1)
        .find(|node| ends_with_path(*node, path))
}

/// True if `node` and its nearest element ancestors carry the tag names in
/// `path`, innermost last (`a > b > c` style)
fn ends_with_path(node: Node<'_, '_>, path: &[&str]) -> bool {
    let mut current = Some(node);
    for name in path.iter().rev() {
        match current {
            Some(n) if n.is_element() && n.has_tag_name(*name) => current = n.parent_element(),
            _ => return false,
        }
    }
    true
}
