// Project model module
// Parses project.xml into tracks, clips and file references

pub mod document;
pub mod model;
pub mod parser;

pub use model::{Clip, FileReference, ProjectModel, Tempo, TempoError, Track};
pub use parser::ParseError;
