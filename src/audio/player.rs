// Audio player implementation
// Owns the loaded session and drives the play/pause toggle
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use super::{AudioSink, TransportState};
use crate::project::{ProjectModel, Tempo};
use crate::scheduler::{schedule_with, ScheduleOptions, ScheduleReport, SchedulingError};
use crate::settings::PlaybackSettings;
use crate::state::{LoadError, Session};

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("no project loaded")]
    NoProjectLoaded,
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
}

/// What a toggle did
#[derive(Debug, Clone, PartialEq)]
pub enum ToggleOutcome {
    /// Clock was idle: every clip was scheduled
    Started(ScheduleReport),
    Suspended,
    Resumed,
}

/// Play/pause over one sink.
///
/// Transport moves `Idle -> Running <-> Suspended`. Only the first play
/// schedules clips; later toggles pause and resume the sink clock, so the
/// scheduled start times stay valid.
pub struct Player {
    sink: Arc<dyn AudioSink>,
    session: Option<Session>,
    settings: PlaybackSettings,
    last_report: Option<ScheduleReport>,
}

impl Player {
    pub fn new(sink: Arc<dyn AudioSink>, settings: PlaybackSettings) -> Self {
        Self {
            sink,
            session: None,
            settings,
            last_report: None,
        }
    }

    /// Load a project from memory. On failure the current session is kept.
    pub fn load(&mut self, bytes: impl Into<Arc<[u8]>>) -> Result<&ProjectModel, LoadError> {
        let session = Session::load(bytes)?;
        Ok(self.replace_session(session))
    }

    pub fn load_file(&mut self, path: &Path) -> Result<&ProjectModel, LoadError> {
        let session = Session::load_file(path)?;
        Ok(self.replace_session(session))
    }

    fn replace_session(&mut self, session: Session) -> &ProjectModel {
        self.last_report = None;
        let session = self.session.insert(session);
        session.model()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn state(&self) -> TransportState {
        self.sink.state()
    }

    /// Report of the scheduling pass for the current session, if any
    pub fn last_report(&self) -> Option<&ScheduleReport> {
        self.last_report.as_ref()
    }

    /// The project's own tempo, else the configured default
    pub fn tempo(&self) -> Tempo {
        self.session
            .as_ref()
            .and_then(|s| s.model().tempo())
            .unwrap_or_else(|| self.settings.default_tempo())
    }

    pub async fn toggle(&mut self) -> Result<ToggleOutcome, PlayerError> {
        let session = self.session.as_ref().ok_or(PlayerError::NoProjectLoaded)?;

        match self.sink.state() {
            TransportState::Idle => {
                let reference = self.sink.now().offset_by(self.settings.schedule_lead_secs());
                let options = ScheduleOptions {
                    tempo: self.tempo(),
                    reference,
                    max_concurrent_decodes: self.settings.max_concurrent_decodes,
                };
                let report = schedule_with(
                    session.model(),
                    Arc::clone(session.archive()),
                    Arc::clone(&self.sink),
                    options,
                )
                .await?;
                self.last_report = Some(report.clone());
                Ok(ToggleOutcome::Started(report))
            }
            TransportState::Running => {
                self.sink.suspend();
                log::info!("Playback suspended");
                Ok(ToggleOutcome::Suspended)
            }
            TransportState::Suspended => {
                self.sink.resume();
                log::info!("Playback resumed");
                Ok(ToggleOutcome::Resumed)
            }
        }
    }
}
