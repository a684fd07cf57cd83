//! One bounded capture-and-save operation for a single recording.

use std::path::PathBuf;

use anyhow::Result;

use crate::{
    operator::{CommandSource, PreviewSink},
    pipeline::{FrameSource, LandmarkExtractor},
    storage,
    types::{
        CaptureStatus, FRAMES_PER_RECORDING, LandmarkSequence, LandmarkVector, OperatorCommand,
        PreviewUpdate, SessionOutcome,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Complete,
    Cancelled,
    Stalled,
}

/// The start/cancel state machine and its landmark buffer, free of any I/O.
#[derive(Debug)]
pub struct Recorder {
    state: SessionState,
    buffer: Vec<LandmarkVector>,
    idle_streak: u32,
    max_idle_frames: Option<u32>,
}

impl Recorder {
    pub fn new(max_idle_frames: Option<u32>) -> Self {
        Self {
            state: SessionState::Idle,
            buffer: Vec::with_capacity(FRAMES_PER_RECORDING),
            idle_streak: 0,
            max_idle_frames,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn captured(&self) -> usize {
        self.buffer.len()
    }

    pub fn handle(&mut self, command: OperatorCommand) {
        match (self.state, command) {
            (SessionState::Idle, OperatorCommand::Start) => self.state = SessionState::Recording,
            (SessionState::Idle | SessionState::Recording, OperatorCommand::Cancel) => {
                self.state = SessionState::Cancelled;
            }
            _ => {}
        }
    }

    /// Feeds one frame's landmarks. Empty vectors never count toward the target.
    pub fn observe(&mut self, landmarks: LandmarkVector) -> SessionState {
        if self.state != SessionState::Recording {
            return self.state;
        }

        if landmarks.is_empty() {
            self.idle_streak = self.idle_streak.saturating_add(1);
            if self
                .max_idle_frames
                .is_some_and(|limit| self.idle_streak >= limit)
            {
                self.state = SessionState::Stalled;
            }
            return self.state;
        }

        self.idle_streak = 0;
        self.buffer.push(landmarks);
        if self.buffer.len() >= FRAMES_PER_RECORDING {
            self.state = SessionState::Complete;
        }
        self.state
    }

    /// The finished sequence, only once the recorder is complete.
    pub fn into_sequence(self) -> Option<LandmarkSequence> {
        if self.state != SessionState::Complete {
            return None;
        }
        LandmarkSequence::from_frames(self.buffer)
    }

    fn status(&self, label: &str, index: u32) -> CaptureStatus {
        match self.state {
            SessionState::Recording => CaptureStatus::Recording {
                label: label.to_string(),
                index,
                captured: self.buffer.len(),
                total: FRAMES_PER_RECORDING,
            },
            _ => CaptureStatus::Waiting {
                label: label.to_string(),
                index,
            },
        }
    }
}

pub struct RecordingSession<'a, E, P, C> {
    pub label: &'a str,
    pub index: u32,
    pub output: PathBuf,
    pub max_idle_frames: Option<u32>,
    pub extractor: &'a mut E,
    pub preview: &'a mut P,
    pub commands: &'a mut C,
}

impl<E, P, C> RecordingSession<'_, E, P, C>
where
    E: LandmarkExtractor,
    P: PreviewSink,
    C: CommandSource,
{
    /// Runs the capture loop until the recording is saved or abandoned.
    /// The camera is consumed so it is released on every exit path.
    pub fn run<F: FrameSource>(mut self, mut camera: F) -> Result<SessionOutcome> {
        let mut recorder = Recorder::new(self.max_idle_frames);

        loop {
            let frame = match camera.read() {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("camera read failed during '{}' #{}: {err:?}", self.label, self.index);
                    return Ok(SessionOutcome::CameraFailed);
                }
            };

            // Overlay reflects the state before this frame is counted.
            let status = recorder.status(self.label, self.index);

            let (frame, landmarks) = match self.extractor.extract(frame) {
                Ok(extraction) => (Some(extraction.frame), extraction.landmarks),
                Err(err) => {
                    log::warn!("landmark extraction failed: {err:?}");
                    (None, LandmarkVector::empty())
                }
            };

            match recorder.observe(landmarks) {
                SessionState::Complete => break,
                SessionState::Stalled => {
                    log::warn!(
                        "no hand seen for {} frames, abandoning '{}' #{}",
                        self.max_idle_frames.unwrap_or_default(),
                        self.label,
                        self.index
                    );
                    return Ok(SessionOutcome::Stalled);
                }
                _ => {}
            }
            // A failed extraction still refreshes the status.
            self.preview.present(PreviewUpdate { frame, status });

            while let Some(command) = self.commands.poll() {
                recorder.handle(command);
            }
            if recorder.state() == SessionState::Cancelled {
                log::info!("recording '{}' #{} cancelled", self.label, self.index);
                return Ok(SessionOutcome::Cancelled);
            }
        }

        drop(camera);
        let sequence = recorder
            .into_sequence()
            .ok_or_else(|| anyhow::anyhow!("recorder completed without a full sequence"))?;
        storage::write_sequence(&self.output, &sequence)?;
        log::info!("recording saved: {}", self.output.display());
        Ok(SessionOutcome::Saved(self.output))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
    };

    use anyhow::anyhow;

    use super::*;
    use crate::{
        pipeline::Extraction,
        types::{Frame, LANDMARKS_PER_HAND},
    };

    /// Yields a fixed number of frames, then fails like an unplugged camera.
    pub(crate) struct ScriptedCamera {
        remaining: usize,
        released: Arc<AtomicBool>,
    }

    impl ScriptedCamera {
        pub(crate) fn new(frames: usize) -> (Self, Arc<AtomicBool>) {
            let released = Arc::new(AtomicBool::new(false));
            (
                Self {
                    remaining: frames,
                    released: released.clone(),
                },
                released,
            )
        }
    }

    impl FrameSource for ScriptedCamera {
        fn read(&mut self) -> Result<Frame> {
            if self.remaining == 0 {
                return Err(anyhow!("no frame"));
            }
            self.remaining -= 1;
            Ok(Frame::blank(4, 4))
        }
    }

    impl Drop for ScriptedCamera {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    /// Returns scripted hand counts per frame, repeating the last entry.
    pub(crate) struct ScriptedExtractor {
        hands: VecDeque<usize>,
        last: usize,
    }

    impl ScriptedExtractor {
        pub(crate) fn new(hands: impl IntoIterator<Item = usize>) -> Self {
            Self {
                hands: hands.into_iter().collect(),
                last: 0,
            }
        }

        pub(crate) fn always(hands: usize) -> Self {
            Self {
                hands: VecDeque::new(),
                last: hands,
            }
        }
    }

    impl LandmarkExtractor for ScriptedExtractor {
        fn extract(&mut self, frame: Frame) -> Result<Extraction> {
            if let Some(next) = self.hands.pop_front() {
                self.last = next;
            }
            Ok(Extraction {
                frame,
                landmarks: LandmarkVector::new(vec![0.5; self.last * LANDMARKS_PER_HAND]),
            })
        }
    }

    /// Every frame fails, like a backend whose model cannot run.
    pub(crate) struct FailingExtractor;

    impl LandmarkExtractor for FailingExtractor {
        fn extract(&mut self, _frame: Frame) -> Result<Extraction> {
            Err(anyhow!("inference backend unavailable"))
        }
    }

    /// One entry per poll; `None` entries end a frame's batch of commands.
    #[derive(Default)]
    pub(crate) struct ScriptedCommands {
        pub(crate) polls: VecDeque<Option<OperatorCommand>>,
        pub(crate) answers: VecDeque<OperatorCommand>,
    }

    impl ScriptedCommands {
        pub(crate) fn new(
            polls: impl IntoIterator<Item = Option<OperatorCommand>>,
            answers: impl IntoIterator<Item = OperatorCommand>,
        ) -> Self {
            Self {
                polls: polls.into_iter().collect(),
                answers: answers.into_iter().collect(),
            }
        }
    }

    impl CommandSource for ScriptedCommands {
        fn poll(&mut self) -> Option<OperatorCommand> {
            self.polls.pop_front().flatten()
        }

        fn wait(&mut self) -> Option<OperatorCommand> {
            self.answers.pop_front()
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingPreview {
        pub(crate) updates: Vec<PreviewUpdate>,
    }

    impl PreviewSink for RecordingPreview {
        fn present(&mut self, update: PreviewUpdate) {
            self.updates.push(update);
        }
    }

    fn run_session(
        output: PathBuf,
        camera: ScriptedCamera,
        extractor: &mut ScriptedExtractor,
        commands: &mut ScriptedCommands,
        max_idle_frames: Option<u32>,
    ) -> (SessionOutcome, RecordingPreview) {
        let mut preview = RecordingPreview::default();
        let outcome = RecordingSession {
            label: "hola",
            index: 1,
            output,
            max_idle_frames,
            extractor,
            preview: &mut preview,
            commands,
        }
        .run(camera)
        .unwrap();
        (outcome, preview)
    }

    #[test]
    fn recorder_only_records_after_start() {
        let mut recorder = Recorder::new(None);
        let hand = LandmarkVector::new(vec![0.1; LANDMARKS_PER_HAND]);
        assert_eq!(recorder.observe(hand.clone()), SessionState::Idle);
        assert_eq!(recorder.captured(), 0);

        recorder.handle(OperatorCommand::Continue);
        assert_eq!(recorder.state(), SessionState::Idle);
        recorder.handle(OperatorCommand::Start);
        for _ in 0..FRAMES_PER_RECORDING - 1 {
            assert_eq!(recorder.observe(hand.clone()), SessionState::Recording);
        }
        assert_eq!(recorder.observe(LandmarkVector::empty()), SessionState::Recording);
        assert_eq!(recorder.observe(hand), SessionState::Complete);
        assert_eq!(recorder.state(), SessionState::Complete);
        assert_eq!(recorder.into_sequence().unwrap().frames().len(), FRAMES_PER_RECORDING);
    }

    #[test]
    fn endless_stall_without_cap_keeps_recording() {
        let mut recorder = Recorder::new(None);
        recorder.handle(OperatorCommand::Start);
        recorder.idle_streak = u32::MAX - 1;
        for _ in 0..3 {
            assert_eq!(recorder.observe(LandmarkVector::empty()), SessionState::Recording);
        }
        assert_eq!(recorder.idle_streak, u32::MAX);
    }

    #[test]
    fn cancel_wins_from_any_active_state() {
        let mut recorder = Recorder::new(None);
        recorder.handle(OperatorCommand::Cancel);
        assert_eq!(recorder.state(), SessionState::Cancelled);
        recorder.handle(OperatorCommand::Start);
        assert_eq!(recorder.state(), SessionState::Cancelled);
        assert!(recorder.into_sequence().is_none());
    }

    #[test]
    fn idle_cap_stalls_after_consecutive_empty_frames() {
        let mut recorder = Recorder::new(Some(3));
        recorder.handle(OperatorCommand::Start);
        let hand = LandmarkVector::new(vec![0.1; LANDMARKS_PER_HAND]);
        recorder.observe(LandmarkVector::empty());
        recorder.observe(LandmarkVector::empty());
        recorder.observe(hand);
        recorder.observe(LandmarkVector::empty());
        recorder.observe(LandmarkVector::empty());
        assert_eq!(recorder.state(), SessionState::Recording);
        assert_eq!(recorder.observe(LandmarkVector::empty()), SessionState::Stalled);
    }

    #[test]
    fn completed_session_writes_thirty_frames_and_releases_camera() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("grabacion_1.npy");
        let (camera, released) = ScriptedCamera::new(100);
        let mut extractor = ScriptedExtractor::always(1);
        let mut commands = ScriptedCommands::new([None, Some(OperatorCommand::Start)], []);

        let (outcome, preview) =
            run_session(output.clone(), camera, &mut extractor, &mut commands, None);

        assert_eq!(outcome, SessionOutcome::Saved(output.clone()));
        assert!(released.load(Ordering::SeqCst));
        let array: ndarray::Array2<f32> = ndarray_npy::read_npy(&output).unwrap();
        assert_eq!(array.shape(), &[FRAMES_PER_RECORDING, LANDMARKS_PER_HAND]);

        assert!(matches!(preview.updates[0].status, CaptureStatus::Waiting { .. }));
        // The frame that completes the recording is not shown.
        let last = preview.updates.last().unwrap();
        assert_eq!(
            last.status,
            CaptureStatus::Recording {
                label: "hola".into(),
                index: 1,
                captured: FRAMES_PER_RECORDING - 2,
                total: FRAMES_PER_RECORDING,
            }
        );
    }

    #[test]
    fn cancel_before_completion_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("grabacion_1.npy");
        let (camera, released) = ScriptedCamera::new(100);
        let mut extractor = ScriptedExtractor::always(2);
        let mut polls = vec![Some(OperatorCommand::Start)];
        polls.extend(std::iter::repeat_n(None, 10));
        polls.push(Some(OperatorCommand::Cancel));
        let mut commands = ScriptedCommands::new(polls, []);

        let (outcome, _) = run_session(output.clone(), camera, &mut extractor, &mut commands, None);

        assert_eq!(outcome, SessionOutcome::Cancelled);
        assert!(released.load(Ordering::SeqCst));
        assert!(!output.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn frames_without_hands_never_complete() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("grabacion_1.npy");
        let (camera, released) = ScriptedCamera::new(200);
        let mut extractor = ScriptedExtractor::always(0);
        let mut commands = ScriptedCommands::new([Some(OperatorCommand::Start)], []);

        let (outcome, preview) =
            run_session(output.clone(), camera, &mut extractor, &mut commands, None);

        // Only the camera running dry ends the session.
        assert_eq!(outcome, SessionOutcome::CameraFailed);
        assert!(released.load(Ordering::SeqCst));
        assert!(!output.exists());
        assert_eq!(preview.updates.len(), 200);
        assert!(preview.updates.iter().all(|u| match &u.status {
            CaptureStatus::Recording { captured, .. } => *captured == 0,
            CaptureStatus::Waiting { .. } => true,
            _ => false,
        }));
    }

    #[test]
    fn idle_cap_abandons_stalled_session() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("grabacion_1.npy");
        let (camera, released) = ScriptedCamera::new(200);
        let mut extractor = ScriptedExtractor::new([1, 1, 1, 0]);
        let mut commands = ScriptedCommands::new([Some(OperatorCommand::Start)], []);

        let (outcome, _) = run_session(output.clone(), camera, &mut extractor, &mut commands, Some(20));

        assert_eq!(outcome, SessionOutcome::Stalled);
        assert!(released.load(Ordering::SeqCst));
        assert!(!output.exists());
    }

    #[test]
    fn extraction_errors_still_refresh_the_preview() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("grabacion_1.npy");
        let (camera, released) = ScriptedCamera::new(10);
        let mut commands = ScriptedCommands::new([Some(OperatorCommand::Start)], []);
        let mut preview = RecordingPreview::default();

        let outcome = RecordingSession {
            label: "hola",
            index: 1,
            output: output.clone(),
            max_idle_frames: None,
            extractor: &mut FailingExtractor,
            preview: &mut preview,
            commands: &mut commands,
        }
        .run(camera)
        .unwrap();

        assert_eq!(outcome, SessionOutcome::CameraFailed);
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(preview.updates.len(), 10);
        assert!(preview.updates.iter().all(|u| u.frame.is_none()));
        assert!(matches!(preview.updates[0].status, CaptureStatus::Waiting { .. }));
        assert!(preview.updates[1].status.is_recording());
    }

    #[test]
    fn extraction_errors_count_toward_the_idle_cap() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("grabacion_1.npy");
        let (camera, released) = ScriptedCamera::new(200);
        let mut commands = ScriptedCommands::new([Some(OperatorCommand::Start)], []);
        let mut preview = RecordingPreview::default();

        let outcome = RecordingSession {
            label: "hola",
            index: 1,
            output: output.clone(),
            max_idle_frames: Some(5),
            extractor: &mut FailingExtractor,
            preview: &mut preview,
            commands: &mut commands,
        }
        .run(camera)
        .unwrap();

        // One idle frame before start, then four failures shown before the fifth stalls.
        assert_eq!(outcome, SessionOutcome::Stalled);
        assert!(released.load(Ordering::SeqCst));
        assert!(!output.exists());
        assert_eq!(preview.updates.len(), 5);
    }

    #[test]
    fn camera_failure_mid_recording_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("grabacion_1.npy");
        let (camera, released) = ScriptedCamera::new(12);
        let mut extractor = ScriptedExtractor::always(1);
        let mut commands = ScriptedCommands::new([Some(OperatorCommand::Start)], []);

        let (outcome, _) = run_session(output.clone(), camera, &mut extractor, &mut commands, None);

        assert_eq!(outcome, SessionOutcome::CameraFailed);
        assert!(released.load(Ordering::SeqCst));
        assert!(!output.exists());
    }
}
