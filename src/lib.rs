// dawplayer - DAWproject archive player
// Module declarations
pub mod archive;
pub mod audio;
pub mod commands;
pub mod project;
pub mod scheduler;
pub mod settings;
pub mod state;

pub use archive::ProjectArchive;
pub use audio::{AudioSink, ClockTime, CpalSink, Player, TransportState};
pub use project::{Clip, FileReference, ProjectModel, Tempo, Track};
pub use scheduler::{schedule, ScheduleReport, SchedulingWarning};
pub use state::{LoadError, Session};

/// Entry point for the command-line player
pub async fn run() -> anyhow::Result<()> {
    commands::run(std::env::args()).await
}
