//! Single-queue pipeline runtime
//!
//! Every frame and directive of a session goes through one unbounded queue
//! and is handed to the stages in submission order. A directive therefore
//! reaches a stage only after every data frame enqueued before it.
//!
//! Observers are attached at a stage position and see every frame about to
//! enter that stage, including the start frame.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use super::PipelineError;
use super::frames::{Directive, Frame, PipelineItem};
use super::processor::{FrameObserver, FrameProcessor};

/// Producer handle for a pipeline's queue
#[derive(Clone, Debug)]
pub struct PipelineQueue {
    tx: mpsc::UnboundedSender<PipelineItem>,
}

impl PipelineQueue {
    pub fn push_frame(&self, frame: Frame) -> Result<(), PipelineError> {
        self.tx
            .send(PipelineItem::Frame(frame))
            .map_err(|_| PipelineError::QueueClosed)
    }

    pub fn push_directive(&self, directive: Directive) -> Result<(), PipelineError> {
        self.tx
            .send(PipelineItem::Directive(directive))
            .map_err(|_| PipelineError::QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

type StartedCallback = Box<dyn Fn() + Send + Sync>;

/// An ordered list of stages fed from one queue
pub struct Pipeline {
    stages: Vec<Arc<dyn FrameProcessor>>,
    queue: PipelineQueue,
    rx: Mutex<Option<mpsc::UnboundedReceiver<PipelineItem>>>,
    on_started: Option<StartedCallback>,
    observers: Vec<(usize, Arc<dyn FrameObserver>)>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn FrameProcessor>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            stages,
            queue: PipelineQueue { tx },
            rx: Mutex::new(Some(rx)),
            on_started: None,
            observers: Vec::new(),
        }
    }

    /// Show every frame entering `stages[position]` to `observer`.
    ///
    /// A position past the last stage observes the pipeline's output.
    pub fn with_observer(mut self, position: usize, observer: Arc<dyn FrameObserver>) -> Self {
        self.observers.push((position, observer));
        self
    }

    /// Callback fired once the start frame has passed through every stage
    pub fn with_on_started(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_started = Some(Box::new(callback));
        self
    }

    pub fn queue(&self) -> PipelineQueue {
        self.queue.clone()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run until an end frame is processed.
    pub async fn run(&self) -> Result<(), PipelineError> {
        self.run_with_input(None).await
    }

    /// Run until an end frame is processed, feeding `input` into the queue.
    ///
    /// Can be called once per pipeline.
    pub async fn run_with_input(
        &self,
        input: Option<mpsc::Receiver<Frame>>,
    ) -> Result<(), PipelineError> {
        let rx = self.rx.lock().take().ok_or(PipelineError::AlreadyRunning)?;

        let queue = self.queue.clone();
        let pump = async move {
            if let Some(mut input) = input {
                while let Some(frame) = input.recv().await {
                    if queue.push_frame(frame).is_err() {
                        break;
                    }
                }
                debug!("Transport input closed");
            }
            std::future::pending::<()>().await
        };

        tokio::select! {
            result = self.process(rx) => result,
            _ = pump => Ok(()),
        }
    }

    async fn process(
        &self,
        mut rx: mpsc::UnboundedReceiver<PipelineItem>,
    ) -> Result<(), PipelineError> {
        self.start().await?;

        loop {
            let deadline = self.next_deadline();

            let item = tokio::select! {
                item = rx.recv() => item,
                _ = wait_until(deadline) => {
                    self.fire_deadlines().await;
                    continue;
                }
            };

            match item {
                Some(PipelineItem::Frame(Frame::End)) => {
                    self.push_through(0, vec![Frame::End]).await;
                    info!("Pipeline ended");
                    return Ok(());
                }
                Some(PipelineItem::Frame(frame)) => {
                    self.push_through(0, vec![frame]).await;
                }
                Some(PipelineItem::Directive(directive)) => {
                    self.dispatch_directive(directive).await;
                }
                None => return Err(PipelineError::QueueClosed),
            }
        }
    }

    async fn start(&self) -> Result<(), PipelineError> {
        let mut frames = vec![Frame::Start];
        for (index, stage) in self.stages.iter().enumerate() {
            self.observe(index, &frames);
            let mut next = Vec::with_capacity(frames.len());
            for frame in frames {
                next.extend(stage.process_frame(frame).await?);
            }
            if !next.iter().any(|f| matches!(f, Frame::Start)) {
                return Err(PipelineError::StartNotPropagated(stage.name().to_string()));
            }
            frames = next;
        }
        self.observe(self.stages.len(), &frames);

        info!("Pipeline fully started (start frame passed through all stages)");
        if let Some(callback) = &self.on_started {
            callback();
        }
        Ok(())
    }

    /// Pass frames through `stages[from..]`. Stage failures drop the frame.
    async fn push_through(&self, from: usize, mut frames: Vec<Frame>) {
        for (index, stage) in self.stages.iter().enumerate().skip(from) {
            if frames.is_empty() {
                return;
            }
            self.observe(index, &frames);
            let mut next = Vec::with_capacity(frames.len());
            for frame in frames {
                let frame_name = frame.name();
                match stage.process_frame(frame).await {
                    Ok(out) => next.extend(out),
                    Err(e) => {
                        warn!(stage = stage.name(), frame = frame_name, error = %e, "Stage failed to process frame");
                    }
                }
            }
            frames = next;
        }
        self.observe(self.stages.len(), &frames);
    }

    fn observe(&self, position: usize, frames: &[Frame]) {
        for (_, observer) in self.observers.iter().filter(|(at, _)| *at == position) {
            for frame in frames {
                observer.on_frame(frame);
            }
        }
    }

    async fn dispatch_directive(&self, mut directive: Directive) {
        for stage in &self.stages {
            match stage.handle_directive(directive).await {
                None => return,
                Some(unhandled) => directive = unhandled,
            }
        }
        // Dropping the directive drops its acknowledgment sender.
        warn!(?directive, "Directive reached the end of the pipeline unhandled");
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.stages.iter().filter_map(|s| s.deadline()).min()
    }

    async fn fire_deadlines(&self) {
        let now = Instant::now();
        for (index, stage) in self.stages.iter().enumerate() {
            if stage.deadline().is_some_and(|d| d <= now) {
                match stage.on_deadline().await {
                    Ok(out) => self.push_through(index + 1, out).await,
                    Err(e) => warn!(stage = stage.name(), error = %e, "Stage deadline failed"),
                }
            }
        }
    }

    /// Run each stage's cleanup, logging failures
    pub async fn cleanup(&self) {
        for stage in &self.stages {
            if let Err(e) = stage.cleanup().await {
                warn!(stage = stage.name(), error = %e, "Stage cleanup failed");
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::{CredentialedService, ProviderRole};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Records every frame and directive it sees
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
        consume_directives: bool,
        cleaned: AtomicBool,
    }

    #[async_trait]
    impl FrameProcessor for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn process_frame(&self, frame: Frame) -> Result<Vec<Frame>, PipelineError> {
            let label = match &frame {
                Frame::Transcription { text } => format!("t:{text}"),
                other => other.name().to_string(),
            };
            self.seen.lock().push(label);
            Ok(vec![frame])
        }

        async fn handle_directive(&self, directive: Directive) -> Option<Directive> {
            self.seen.lock().push("directive".to_string());
            if !self.consume_directives {
                return Some(directive);
            }
            match directive {
                Directive::SwitchService { ack, .. } => {
                    let _ = ack.send(());
                    None
                }
            }
        }

        async fn cleanup(&self) -> Result<(), PipelineError> {
            self.cleaned.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn transcription(text: &str) -> Frame {
        Frame::Transcription {
            text: text.to_string(),
        }
    }

    fn switch_directive() -> (Directive, oneshot::Receiver<()>) {
        let (ack, rx) = oneshot::channel();
        let service = Arc::new(CredentialedService::new(ProviderRole::Stt, "groq", "k".into()));
        (
            Directive::SwitchService {
                role: ProviderRole::Stt,
                service,
                ack,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn test_frames_and_directives_keep_submission_order() {
        let recorder = Arc::new(Recorder {
            consume_directives: true,
            ..Default::default()
        });
        let pipeline = Pipeline::new(vec![recorder.clone() as Arc<dyn FrameProcessor>]);
        let queue = pipeline.queue();

        let (directive, ack) = switch_directive();
        queue.push_frame(transcription("a")).unwrap();
        queue.push_directive(directive).unwrap();
        queue.push_frame(transcription("b")).unwrap();
        queue.push_frame(Frame::End).unwrap();

        pipeline.run().await.unwrap();
        ack.await.unwrap();

        assert_eq!(
            *recorder.seen.lock(),
            vec!["StartFrame", "t:a", "directive", "t:b", "EndFrame"]
        );
    }

    #[tokio::test]
    async fn test_on_started_fires_after_start_traversal() {
        let started = Arc::new(AtomicBool::new(false));
        let flag = started.clone();
        let pipeline = Pipeline::new(vec![Arc::new(Recorder::default()) as Arc<dyn FrameProcessor>])
            .with_on_started(move || flag.store(true, Ordering::SeqCst));

        pipeline.queue().push_frame(Frame::End).unwrap();
        pipeline.run().await.unwrap();

        assert!(started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unhandled_directive_drops_ack() {
        let pipeline = Pipeline::new(vec![Arc::new(Recorder::default()) as Arc<dyn FrameProcessor>]);
        let (directive, ack) = switch_directive();
        pipeline.queue().push_directive(directive).unwrap();
        pipeline.queue().push_frame(Frame::End).unwrap();

        pipeline.run().await.unwrap();
        assert!(ack.await.is_err());
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let pipeline = Pipeline::new(vec![Arc::new(Recorder::default()) as Arc<dyn FrameProcessor>]);
        pipeline.queue().push_frame(Frame::End).unwrap();
        pipeline.run().await.unwrap();

        assert!(matches!(
            pipeline.run().await,
            Err(PipelineError::AlreadyRunning)
        ));
    }

    #[tokio::test]
    async fn test_input_is_pumped_into_queue() {
        let recorder = Arc::new(Recorder::default());
        let pipeline = Pipeline::new(vec![recorder.clone() as Arc<dyn FrameProcessor>]);
        let (tx, rx) = mpsc::channel(8);

        tx.send(transcription("from-input")).await.unwrap();
        tx.send(Frame::End).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), pipeline.run_with_input(Some(rx)))
            .await
            .expect("pipeline ends on end frame")
            .unwrap();

        assert!(recorder.seen.lock().contains(&"t:from-input".to_string()));
    }

    /// Remembers the names of observed frames
    #[derive(Default)]
    struct SeenNames(Mutex<Vec<String>>);

    impl FrameObserver for SeenNames {
        fn on_frame(&self, frame: &Frame) {
            let label = match frame {
                Frame::Transcription { text } => format!("t:{text}"),
                other => other.name().to_string(),
            };
            self.0.lock().push(label);
        }
    }

    /// Drops transcriptions containing "drop"
    struct DropFilter;

    #[async_trait]
    impl FrameProcessor for DropFilter {
        fn name(&self) -> &str {
            "drop-filter"
        }

        async fn process_frame(&self, frame: Frame) -> Result<Vec<Frame>, PipelineError> {
            match &frame {
                Frame::Transcription { text } if text.contains("drop") => Ok(Vec::new()),
                _ => Ok(vec![frame]),
            }
        }
    }

    #[tokio::test]
    async fn test_observers_see_frames_at_their_position() {
        let before = Arc::new(SeenNames::default());
        let after = Arc::new(SeenNames::default());
        let pipeline = Pipeline::new(vec![
            Arc::new(DropFilter) as Arc<dyn FrameProcessor>,
            Arc::new(Recorder::default()),
        ])
        .with_observer(0, before.clone())
        .with_observer(1, after.clone());

        let queue = pipeline.queue();
        queue.push_frame(transcription("keep")).unwrap();
        queue.push_frame(transcription("drop me")).unwrap();
        queue.push_frame(Frame::End).unwrap();
        pipeline.run().await.unwrap();

        assert_eq!(
            *before.0.lock(),
            vec!["StartFrame", "t:keep", "t:drop me", "EndFrame"]
        );
        assert_eq!(*after.0.lock(), vec!["StartFrame", "t:keep", "EndFrame"]);
    }

    #[tokio::test]
    async fn test_cleanup_reaches_every_stage() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let pipeline = Pipeline::new(vec![a.clone() as Arc<dyn FrameProcessor>, b.clone()]);

        pipeline.cleanup().await;
        assert!(a.cleaned.load(Ordering::SeqCst));
        assert!(b.cleaned.load(Ordering::SeqCst));
        assert_eq!(pipeline.stage_names(), vec!["recorder", "recorder"]);
    }
}
