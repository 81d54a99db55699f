// Playback scheduler
// Maps clip beat positions to clock times and hands decoded clips to the sink

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::archive::ProjectArchive;
use crate::audio::decoder::extension_of;
use crate::audio::{AudioSink, ClockTime};
use crate::project::{ProjectModel, Tempo};

pub const DEFAULT_MAX_CONCURRENT_DECODES: usize = 8;

/// Per-clip problem that skips one clip but never the whole schedule
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum SchedulingWarning {
    #[error("{path} not found in archive")]
    FileNotFound { path: String },
    #[error("failed to decode {path}: {reason}")]
    DecodeFailed { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("a clip scheduling task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
    #[error("max concurrent decodes must be at least 1")]
    NoWorkers,
}

/// A clip that was handed to the sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledClip {
    pub clip_name: String,
    pub path: String,
    pub start_beat: f64,
    /// Seconds after the reference instant, before clamping
    pub start_offset_seconds: f64,
    /// Clock time the sink was asked to start at
    pub at: ClockTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScheduleReport {
    /// Ordered by start offset
    pub scheduled: Vec<ScheduledClip>,
    /// Clips without an audio file (MIDI, automation)
    pub skipped_without_audio: usize,
    pub warnings: Vec<SchedulingWarning>,
}

impl ScheduleReport {
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.len()
    }
}

/// Per-clip work item. Owns everything it needs so tasks share nothing
/// mutable.
struct ClipJob {
    clip_name: String,
    path: String,
    start_beat: f64,
}

/// Scheduling parameters captured once per call
#[derive(Debug, Clone, Copy)]
pub struct ScheduleOptions {
    pub tempo: Tempo,
    /// Every clip offset is measured from this instant
    pub reference: ClockTime,
    pub max_concurrent_decodes: usize,
}

impl ScheduleOptions {
    pub fn new(tempo: Tempo, reference: ClockTime) -> Self {
        Self {
            tempo,
            reference,
            max_concurrent_decodes: DEFAULT_MAX_CONCURRENT_DECODES,
        }
    }
}

/// Decode and schedule every audio clip of `model`.
///
/// Each clip becomes an independent blocking task (archive read, decode,
/// play request). All tasks are joined before returning; missing files and
/// decode failures become warnings in the report. Start times are
/// `reference + start_beat * seconds_per_beat`, with negative offsets clamped
/// to the reference itself.
pub async fn schedule(
    model: &ProjectModel,
    tempo: Tempo,
    archive: Arc<ProjectArchive>,
    sink: Arc<dyn AudioSink>,
    reference_clock_time: ClockTime,
) -> Result<ScheduleReport, SchedulingError> {
    schedule_with(
        model,
        archive,
        sink,
        ScheduleOptions::new(tempo, reference_clock_time),
    )
    .await
}

pub async fn schedule_with(
    model: &ProjectModel,
    archive: Arc<ProjectArchive>,
    sink: Arc<dyn AudioSink>,
    options: ScheduleOptions,
) -> Result<ScheduleReport, SchedulingError> {
    if options.max_concurrent_decodes == 0 {
        return Err(SchedulingError::NoWorkers);
    }

    let tempo = options.tempo;
    let reference = options.reference;

    let mut skipped_without_audio = 0;
    let jobs: Vec<ClipJob> = model
        .clips()
        .filter_map(|clip| match &clip.audio_reference {
            Some(file) => Some(ClipJob {
                clip_name: clip.name.clone(),
                path: file.archive_path.clone(),
                start_beat: clip.start_beat,
            }),
            None => {
                skipped_without_audio += 1;
                None
            }
        })
        .collect();

    log::info!(
        "Scheduling {} audio clips at {} BPM ({} without audio)",
        jobs.len(),
        options.tempo.beats_per_minute(),
        skipped_without_audio
    );

    let permits = Arc::new(Semaphore::new(options.max_concurrent_decodes));
    let mut tasks = JoinSet::new();

    for job in jobs {
        let archive = Arc::clone(&archive);
        let sink = Arc::clone(&sink);
        let permits = Arc::clone(&permits);

        tasks.spawn(async move {
            // The semaphore is never closed
            let _permit = permits.acquire_owned().await.ok();
            tokio::task::spawn_blocking(move || {
                run_clip_job(job, &archive, sink.as_ref(), tempo, reference)
            })
            .await
        });
    }

    let mut report = ScheduleReport {
        skipped_without_audio,
        ..Default::default()
    };
    let mut first_failure = None;

    while let Some(joined) = tasks.join_next().await {
        // Outer error: the async wrapper; inner: the blocking task
        match joined.and_then(|inner| inner) {
            Ok(Ok(scheduled)) => report.scheduled.push(scheduled),
            Ok(Err(warning)) => {
                log::warn!("{}", warning);
                report.warnings.push(warning);
            }
            Err(e) => {
                log::error!("Clip task failed: {}", e);
                first_failure.get_or_insert(e);
            }
        }
    }

    if let Some(e) = first_failure {
        return Err(SchedulingError::TaskFailed(e));
    }

    report
        .scheduled
        .sort_by(|a, b| a.start_offset_seconds.total_cmp(&b.start_offset_seconds));

    log::info!(
        "Scheduled {} clips, {} warnings",
        report.scheduled_count(),
        report.warnings.len()
    );
    Ok(report)
}

fn run_clip_job(
    job: ClipJob,
    archive: &ProjectArchive,
    sink: &dyn AudioSink,
    tempo: Tempo,
    reference: ClockTime,
) -> Result<ScheduledClip, SchedulingWarning> {
    let bytes = archive
        .read(&job.path)
        .ok_or_else(|| SchedulingWarning::FileNotFound {
            path: job.path.clone(),
        })?;

    let audio = sink
        .decode(bytes, extension_of(&job.path))
        .map_err(|e| SchedulingWarning::DecodeFailed {
            path: job.path.clone(),
            reason: e.to_string(),
        })?;

    let start_offset_seconds = tempo.beats_to_seconds(job.start_beat);
    let at = reference.offset_by(start_offset_seconds);
    sink.play(Arc::new(audio), at);

    log::debug!(
        "Scheduled {} at {:.2}s ({} beats)",
        job.path,
        start_offset_seconds,
        job.start_beat
    );

    Ok(ScheduledClip {
        clip_name: job.clip_name,
        path: job.path,
        start_beat: job.start_beat,
        start_offset_seconds,
        at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::build_zip;
    use crate::audio::tests::RecordingSink;
    use crate::project::{Clip, FileReference, Track};

    fn clip(name: &str, beat: f64, path: Option<&str>) -> Clip {
        Clip {
            name: name.to_string(),
            start_beat: beat,
            audio_reference: path.map(FileReference::new),
        }
    }

    fn model(clips: Vec<Clip>) -> ProjectModel {
        ProjectModel::new(
            vec![Track {
                name: "Audio".into(),
                id: None,
                clips,
            }],
            None,
        )
    }

    fn archive(entries: &[(&str, &[u8])]) -> Arc<ProjectArchive> {
        Arc::new(ProjectArchive::open(build_zip(entries)).unwrap())
    }

    fn bpm(value: f64) -> Tempo {
        Tempo::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_four_beats_at_120_is_two_seconds() {
        let sink = Arc::new(RecordingSink::new());
        let report = schedule(
            &model(vec![clip("Loop", 4.0, Some("audio/loop.wav"))]),
            bpm(120.0),
            archive(&[("audio/loop.wav", b"data")]),
            sink.clone(),
            ClockTime::ZERO,
        )
        .await
        .unwrap();

        assert_eq!(report.scheduled_count(), 1);
        assert_eq!(report.scheduled[0].start_offset_seconds, 2.0);
        assert_eq!(sink.play_times(), vec![2.0]);
    }

    #[tokio::test]
    async fn test_offsets_are_relative_to_reference() {
        let sink = Arc::new(RecordingSink::new());
        schedule(
            &model(vec![
                clip("a", 0.0, Some("a.wav")),
                clip("b", 2.0, Some("b.wav")),
            ]),
            bpm(60.0),
            archive(&[("a.wav", b"a"), ("b.wav", b"b")]),
            sink.clone(),
            ClockTime::from_secs_f64(10.0),
        )
        .await
        .unwrap();

        assert_eq!(sink.play_times(), vec![10.0, 12.0]);
    }

    #[tokio::test]
    async fn test_far_future_clip_saturates_instead_of_failing() {
        let sink = Arc::new(RecordingSink::new());
        let report = schedule(
            &model(vec![
                clip("Now", 0.0, Some("a.wav")),
                clip("Later", 1e20, Some("b.wav")),
            ]),
            bpm(120.0),
            archive(&[("a.wav", b"a"), ("b.wav", b"b")]),
            sink.clone(),
            ClockTime::ZERO,
        )
        .await
        .unwrap();

        assert_eq!(report.scheduled_count(), 2);
        assert!(report.warnings.is_empty());
        assert_eq!(report.scheduled[1].clip_name, "Later");
        assert_eq!(report.scheduled[1].at, ClockTime::MAX);
        assert_eq!(sink.plays.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_clip_without_audio_is_skipped_silently() {
        let sink = Arc::new(RecordingSink::new());
        let report = schedule(
            &model(vec![clip("Notes", 4.0, None)]),
            bpm(120.0),
            archive(&[("project.xml", b"")]),
            sink.clone(),
            ClockTime::ZERO,
        )
        .await
        .unwrap();

        assert_eq!(report.scheduled_count(), 0);
        assert_eq!(report.skipped_without_audio, 1);
        assert!(report.warnings.is_empty());
        assert!(sink.plays.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_warns_once_and_others_play() {
        let sink = Arc::new(RecordingSink::new());
        let report = schedule(
            &model(vec![
                clip("gone", 0.0, Some("audio/missing.wav")),
                clip("here", 1.0, Some("audio/here.wav")),
                clip("also", 2.0, Some("audio/also.wav")),
            ]),
            bpm(120.0),
            archive(&[("audio/here.wav", b"x"), ("audio/also.wav", b"y")]),
            sink.clone(),
            ClockTime::ZERO,
        )
        .await
        .unwrap();

        assert_eq!(
            report.warnings,
            vec![SchedulingWarning::FileNotFound {
                path: "audio/missing.wav".into()
            }]
        );
        assert_eq!(report.scheduled_count(), 2);
        assert_eq!(sink.play_times(), vec![0.5, 1.0]);
    }

    #[tokio::test]
    async fn test_decode_failure_is_a_warning() {
        let sink = Arc::new(RecordingSink::new());
        let report = schedule(
            &model(vec![
                clip("broken", 0.0, Some("broken.wav")),
                clip("fine", 0.0, Some("fine.wav")),
            ]),
            bpm(120.0),
            archive(&[("broken.wav", b"BAD!"), ("fine.wav", b"ok")]),
            sink.clone(),
            ClockTime::ZERO,
        )
        .await
        .unwrap();

        assert_eq!(report.scheduled_count(), 1);
        assert_eq!(report.scheduled[0].path, "fine.wav");
        assert!(matches!(
            &report.warnings[..],
            [SchedulingWarning::DecodeFailed { path, .. }] if path == "broken.wav"
        ));
    }

    #[tokio::test]
    async fn test_negative_beat_plays_at_reference() {
        let sink = Arc::new(RecordingSink::new());
        let report = schedule(
            &model(vec![clip("early", -4.0, Some("a.wav"))]),
            bpm(120.0),
            archive(&[("a.wav", b"a")]),
            sink.clone(),
            ClockTime::from_secs_f64(1.0),
        )
        .await
        .unwrap();

        assert_eq!(report.scheduled[0].start_offset_seconds, -2.0);
        assert_eq!(report.scheduled[0].at, ClockTime::from_secs_f64(1.0));
        assert_eq!(sink.play_times(), vec![1.0]);
    }

    #[tokio::test]
    async fn test_tempo_change_scales_offsets() {
        let project = model(vec![
            clip("a", 2.0, Some("a.wav")),
            clip("b", 6.0, Some("b.wav")),
        ]);
        let files = archive(&[("a.wav", b"a"), ("b.wav", b"b")]);

        let at_120 = schedule(&project, bpm(120.0), files.clone(), Arc::new(RecordingSink::new()), ClockTime::ZERO)
            .await
            .unwrap();
        let at_60 = schedule(&project, bpm(60.0), files, Arc::new(RecordingSink::new()), ClockTime::ZERO)
            .await
            .unwrap();

        let offsets = |r: &ScheduleReport| -> Vec<f64> {
            r.scheduled.iter().map(|c| c.start_offset_seconds).collect()
        };
        assert_eq!(offsets(&at_120), vec![1.0, 3.0]);
        assert_eq!(offsets(&at_60), vec![2.0, 6.0]);
    }

    #[tokio::test]
    async fn test_report_sorted_by_offset_not_document_order() {
        let sink = Arc::new(RecordingSink::new());
        let report = schedule(
            &model(vec![
                clip("late", 8.0, Some("a.wav")),
                clip("early", 1.0, Some("a.wav")),
                clip("mid", 4.0, Some("a.wav")),
            ]),
            bpm(120.0),
            archive(&[("a.wav", b"a")]),
            sink,
            ClockTime::ZERO,
        )
        .await
        .unwrap();

        let names: Vec<_> = report.scheduled.iter().map(|c| c.clip_name.as_str()).collect();
        assert_eq!(names, vec!["early", "mid", "late"]);
    }

    #[tokio::test]
    async fn test_single_worker_still_schedules_everything() {
        let sink = Arc::new(RecordingSink::new());
        let clips = (0..20).map(|i| clip("c", i as f64, Some("a.wav"))).collect();
        let mut options = ScheduleOptions::new(bpm(120.0), ClockTime::ZERO);
        options.max_concurrent_decodes = 1;

        let report = schedule_with(&model(clips), archive(&[("a.wav", b"a")]), sink.clone(), options)
            .await
            .unwrap();

        assert_eq!(report.scheduled_count(), 20);
        assert_eq!(sink.plays.lock().len(), 20);
    }

    #[tokio::test]
    async fn test_zero_workers_is_an_error() {
        let mut options = ScheduleOptions::new(bpm(120.0), ClockTime::ZERO);
        options.max_concurrent_decodes = 0;
        let result = schedule_with(
            &model(vec![]),
            archive(&[("a", b"")]),
            Arc::new(RecordingSink::new()),
            options,
        )
        .await;
        assert!(matches!(result, Err(SchedulingError::NoWorkers)));
    }
}
