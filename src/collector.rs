use anyhow::{Context, Result};

use crate::{
    config::{CollectorConfig, LabelTarget},
    operator::{CommandSource, PreviewSink},
    pipeline::{FrameSource, LandmarkExtractor},
    session::RecordingSession,
    storage::{self, DatasetMetadata},
    types::{CaptureStatus, OperatorCommand, PreviewUpdate, SessionOutcome},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelReport {
    pub label: String,
    pub target: u32,
    pub saved: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectionReport {
    pub labels: Vec<LabelReport>,
}

impl CollectionReport {
    pub fn total_saved(&self) -> u32 {
        self.labels.iter().map(|l| l.saved).sum()
    }
}

/// Runs recording sessions for every label, one camera acquisition each.
pub struct DatasetCollector<O, E, P, C> {
    config: CollectorConfig,
    open_camera: O,
    extractor: E,
    preview: P,
    commands: C,
}

impl<O, F, E, P, C> DatasetCollector<O, E, P, C>
where
    O: FnMut() -> Result<F>,
    F: FrameSource,
    E: LandmarkExtractor,
    P: PreviewSink,
    C: CommandSource,
{
    pub fn new(config: CollectorConfig, open_camera: O, extractor: E, preview: P, commands: C) -> Self {
        Self {
            config,
            open_camera,
            extractor,
            preview,
            commands,
        }
    }

    pub fn prepare(&self) -> Result<()> {
        storage::ensure_layout(&self.config.base_dir, &self.config.label_names())
    }

    pub fn collect(&mut self) -> Result<CollectionReport> {
        self.prepare()?;
        let metadata = DatasetMetadata::for_today(&self.config);
        let metadata_path = storage::write_metadata(&self.config.base_dir, &metadata)
            .context("failed to write dataset metadata")?;
        log::info!("dataset metadata written to {}", metadata_path.display());

        let mut report = CollectionReport::default();
        for target in self.config.labels.clone() {
            println!("\n=== Collecting data for: {} ===", target.name);
            let saved = self.collect_label(&target);
            println!("\nCompleted: {}", target.name);
            report.labels.push(LabelReport {
                label: target.name,
                target: target.recordings,
                saved,
            });
        }

        self.preview.present(PreviewUpdate {
            frame: None,
            status: CaptureStatus::Finished,
        });
        Ok(report)
    }

    fn collect_label(&mut self, target: &LabelTarget) -> u32 {
        let mut index = 1;
        while index <= target.recordings {
            println!("\nRecording {index} of {}", target.recordings);

            let saved = self.attempt(&target.name, index);
            if saved {
                index += 1;
            }

            self.preview.present(PreviewUpdate {
                frame: None,
                status: CaptureStatus::AwaitingConfirmation {
                    label: target.name.clone(),
                    saved,
                },
            });
            println!("\nContinue with the next recording? (s/n): ");
            if !self.wait_for_decision() {
                break;
            }
        }
        index - 1
    }

    fn attempt(&mut self, label: &str, index: u32) -> bool {
        println!("\nGet ready to record '{label}' - recording #{index}");
        println!("Press SPACE to start recording");
        println!("Press Q to cancel");

        let camera = match (self.open_camera)() {
            Ok(camera) => camera,
            Err(err) => {
                log::error!("camera unavailable: {err:?}");
                println!("Camera unavailable, recording not started");
                return false;
            }
        };

        let session = RecordingSession {
            label,
            index,
            output: storage::recording_path(&self.config.base_dir, label, index),
            max_idle_frames: self.config.max_idle_frames,
            extractor: &mut self.extractor,
            preview: &mut self.preview,
            commands: &mut self.commands,
        };

        match session.run(camera) {
            Ok(outcome) => {
                match &outcome {
                    SessionOutcome::Saved(path) => {
                        println!("\nRecording saved: {}", path.display());
                    }
                    SessionOutcome::Cancelled => println!("Recording cancelled"),
                    SessionOutcome::CameraFailed => {
                        println!("Camera stopped delivering frames, recording discarded");
                    }
                    SessionOutcome::Stalled => {
                        println!("No hand detected for too long, recording discarded");
                    }
                }
                outcome.is_success()
            }
            Err(err) => {
                log::error!("failed to save recording '{label}' #{index}: {err:?}");
                println!("Recording could not be saved");
                false
            }
        }
    }

    /// `true` to keep recording this label. Start/cancel keys are ignored here.
    fn wait_for_decision(&mut self) -> bool {
        loop {
            match self.commands.wait() {
                Some(OperatorCommand::Continue) => return true,
                Some(OperatorCommand::Stop) | None => return false,
                Some(other) => log::debug!("ignoring {other:?} while awaiting confirmation"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, fs, rc::Rc};

    use anyhow::anyhow;

    use super::*;
    use crate::{
        session::tests::{RecordingPreview, ScriptedCamera, ScriptedCommands, ScriptedExtractor},
        types::{
            FRAMES_PER_RECORDING,
            OperatorCommand::{Cancel, Continue, Start, Stop},
        },
    };

    /// Polls for one attempt that starts on its first frame and runs to completion.
    fn one_recording() -> Vec<Option<OperatorCommand>> {
        let mut polls = vec![Some(Start)];
        polls.extend(std::iter::repeat_n(None, FRAMES_PER_RECORDING));
        polls
    }

    fn cameras(opened: Rc<Cell<usize>>) -> impl FnMut() -> Result<ScriptedCamera> {
        move || {
            opened.set(opened.get() + 1);
            Ok(ScriptedCamera::new(64).0)
        }
    }

    #[test]
    fn failed_attempt_retries_the_same_index() {
        let dir = tempfile::tempdir().unwrap();
        let config = CollectorConfig::with_labels(dir.path(), [("hola", 2)]).unwrap();
        let opened = Rc::new(Cell::new(0));
        // Cancel the first attempt, then record twice.
        let mut polls = vec![Some(Cancel), None];
        polls.extend(one_recording());
        polls.extend(one_recording());
        let commands = ScriptedCommands::new(polls, [Continue, Continue, Continue]);
        let mut collector = DatasetCollector::new(
            config,
            cameras(opened.clone()),
            ScriptedExtractor::always(1),
            RecordingPreview::default(),
            commands,
        );

        let report = collector.collect().unwrap();

        assert_eq!(opened.get(), 3);
        assert_eq!(report.labels[0].saved, 2);
        assert!(dir.path().join("hola/grabacion_1.npy").exists());
        assert!(dir.path().join("hola/grabacion_2.npy").exists());
        assert!(!dir.path().join("hola/grabacion_3.npy").exists());
    }

    #[test]
    fn write_failure_does_not_advance_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let config = CollectorConfig::with_labels(dir.path(), [("hola", 1)]).unwrap();
        // A non-empty directory on the recording name makes every save fail.
        let occupied = dir.path().join("hola/grabacion_1.npy/occupied");
        fs::create_dir_all(&occupied).unwrap();
        let opened = Rc::new(Cell::new(0));
        let mut polls = one_recording();
        polls.extend(one_recording());
        let mut preview = RecordingPreview::default();
        let mut collector = DatasetCollector::new(
            config,
            cameras(opened.clone()),
            ScriptedExtractor::always(1),
            &mut preview,
            ScriptedCommands::new(polls, [Continue, Stop]),
        );

        let report = collector.collect().unwrap();

        assert_eq!(opened.get(), 2);
        assert_eq!(report.labels[0].saved, 0);
        assert!(occupied.is_dir());
        assert!(!dir.path().join("hola/grabacion_1.npy.partial").exists());
        assert!(!dir.path().join("hola/grabacion_2.npy").exists());
        let failed = CaptureStatus::AwaitingConfirmation {
            label: "hola".into(),
            saved: false,
        };
        assert_eq!(preview.updates.iter().filter(|u| u.status == failed).count(), 2);
    }

    #[test]
    fn metadata_failure_aborts_before_any_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = CollectorConfig::with_labels(dir.path(), [("hola", 1)]).unwrap();
        fs::create_dir_all(dir.path().join(storage::METADATA_FILENAME)).unwrap();
        let opened = Rc::new(Cell::new(0));
        let mut preview = RecordingPreview::default();
        let mut collector = DatasetCollector::new(
            config,
            cameras(opened.clone()),
            ScriptedExtractor::always(1),
            &mut preview,
            ScriptedCommands::new(one_recording(), [Continue]),
        );

        assert!(collector.collect().is_err());
        assert_eq!(opened.get(), 0);
        assert!(preview.updates.is_empty());
    }

    #[test]
    fn stop_moves_on_to_next_label() {
        let dir = tempfile::tempdir().unwrap();
        let config = CollectorConfig::with_labels(dir.path(), [("hola", 5), ("no", 1)]).unwrap();
        let mut polls = one_recording();
        polls.extend(one_recording());
        let commands = ScriptedCommands::new(polls, [Stop, Continue]);
        let mut collector = DatasetCollector::new(
            config,
            cameras(Rc::new(Cell::new(0))),
            ScriptedExtractor::always(1),
            RecordingPreview::default(),
            commands,
        );

        let report = collector.collect().unwrap();

        assert_eq!(
            report.labels,
            vec![
                LabelReport {
                    label: "hola".into(),
                    target: 5,
                    saved: 1
                },
                LabelReport {
                    label: "no".into(),
                    target: 1,
                    saved: 1
                },
            ]
        );
        assert_eq!(report.total_saved(), 2);
        assert!(dir.path().join("no/grabacion_1.npy").exists());
    }

    #[test]
    fn metadata_is_written_even_without_recordings() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("dataset");
        let config = CollectorConfig::with_labels(&base, [("hola", 1), ("gracias", 1)]).unwrap();
        let mut collector = DatasetCollector::new(
            config,
            || -> Result<ScriptedCamera> { Err(anyhow!("no camera")) },
            ScriptedExtractor::always(1),
            RecordingPreview::default(),
            ScriptedCommands::new([], [Stop, Stop]),
        );

        let report = collector.collect().unwrap();

        assert_eq!(report.total_saved(), 0);
        let metadata = DatasetMetadata::read(&base).unwrap();
        assert_eq!(metadata.labels, vec!["hola", "gracias"]);
        assert_eq!(metadata.total_labels, 2);
        assert!(base.join("gracias").is_dir());
        assert_eq!(fs::read_dir(base.join("hola")).unwrap().count(), 0);
    }

    #[test]
    fn prompt_ignores_recording_keys_and_closed_source_stops() {
        let dir = tempfile::tempdir().unwrap();
        let config = CollectorConfig::with_labels(dir.path(), [("si", 3)]).unwrap();
        let commands = ScriptedCommands::new(one_recording(), [Start, Cancel, Continue]);
        let mut preview = RecordingPreview::default();
        let mut collector = DatasetCollector::new(
            config,
            cameras(Rc::new(Cell::new(0))),
            ScriptedExtractor::always(1),
            &mut preview,
            commands,
        );

        let report = collector.collect().unwrap();

        // The second attempt is never started and its camera runs dry.
        assert_eq!(report.labels[0].saved, 1);
        assert!(matches!(
            preview.updates.last().map(|u| &u.status),
            Some(CaptureStatus::Finished)
        ));
        assert!(preview.updates.iter().any(|u| u.status
            == CaptureStatus::AwaitingConfirmation {
                label: "si".into(),
                saved: true
            }));
    }
}
