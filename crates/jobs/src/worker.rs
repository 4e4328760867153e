//! Worker pool that drains the job queue. Separation is CPU-bound and
//! runs on the blocking pool; a semaphore caps how many jobs run at
//! once. Input and output files are always deleted, whatever the
//! outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use stemsplit_separation::{SeparationEngine, StemChoice};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::delivery::{Delivery, FailureKind};
use crate::JobRequest;

/// Blocking separation call, abstracted so tests can run the pool
/// without a model on disk.
pub trait Separator: Send + Sync + 'static {
    fn separate(
        &self,
        input: &Path,
        choice: StemChoice,
        out_dir: &Path,
    ) -> stemsplit_separation::Result<PathBuf>;
}

impl Separator for SeparationEngine {
    fn separate(
        &self,
        input: &Path,
        choice: StemChoice,
        out_dir: &Path,
    ) -> stemsplit_separation::Result<PathBuf> {
        self.separate_file(input, choice, out_dir)
    }
}

pub struct JobRunner {
    separator: Arc<dyn Separator>,
    delivery: Arc<dyn Delivery>,
    out_dir: PathBuf,
    timeout: Duration,
    workers: usize,
}

impl JobRunner {
    pub fn new(
        separator: Arc<dyn Separator>,
        delivery: Arc<dyn Delivery>,
        out_dir: PathBuf,
        timeout: Duration,
        workers: usize,
    ) -> Self {
        Self {
            separator,
            delivery,
            out_dir,
            timeout,
            workers,
        }
    }

    pub fn spawn(
        self,
        rx: mpsc::Receiver<JobRequest>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(rx, shutdown))
    }

    async fn run(self, mut rx: mpsc::Receiver<JobRequest>, shutdown: CancellationToken) {
        let semaphore = Arc::new(Semaphore::new(self.workers.max(1)));
        tracing::info!(workers = self.workers, "job runner started");

        loop {
            // Hold a permit before pulling a job so the queue, not an
            // unbounded task set, absorbs the backlog.
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let job = tokio::select! {
                _ = shutdown.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let separator = Arc::clone(&self.separator);
            let delivery = Arc::clone(&self.delivery);
            let out_dir = self.out_dir.clone();
            let deadline = self.timeout;
            tokio::spawn(async move {
                run_one(separator, delivery, out_dir, deadline, job).await;
                drop(permit);
            });
        }

        tracing::info!("job runner stopped");
    }
}

async fn run_one(
    separator: Arc<dyn Separator>,
    delivery: Arc<dyn Delivery>,
    out_dir: PathBuf,
    deadline: Duration,
    job: JobRequest,
) {
    let JobRequest {
        chat_id,
        input_path,
        choice,
    } = job;
    tracing::info!(chat_id, %choice, input = %input_path.display(), "job started");

    let blocking_input = input_path.clone();
    let mut handle = tokio::task::spawn_blocking(move || {
        separator.separate(&blocking_input, choice, &out_dir)
    });
    let outcome = tokio::time::timeout(deadline, &mut handle).await;

    if let Err(e) = tokio::fs::remove_file(&input_path).await {
        tracing::warn!(path = %input_path.display(), error = %e, "failed to remove input file");
    }

    match outcome {
        Err(_) => {
            tracing::warn!(chat_id, timeout_secs = deadline.as_secs(), "job timed out");
            delivery
                .fail(chat_id, FailureKind::Timeout, "processing deadline exceeded")
                .await;
            // The blocking task cannot be aborted; reap whatever output
            // it eventually produces.
            tokio::spawn(async move {
                if let Ok(Ok(path)) = handle.await {
                    let _ = tokio::fs::remove_file(path).await;
                }
            });
        }
        Ok(Err(join_err)) => {
            tracing::error!(chat_id, error = %join_err, "separation task panicked");
            delivery
                .fail(chat_id, FailureKind::Internal, &join_err.to_string())
                .await;
        }
        Ok(Ok(Err(sep_err))) => {
            let kind = FailureKind::classify(&sep_err);
            tracing::warn!(chat_id, ?kind, error = %sep_err, "job failed");
            delivery.fail(chat_id, kind, &sep_err.to_string()).await;
        }
        Ok(Ok(Ok(output))) => {
            match delivery.deliver(chat_id, &output, choice).await {
                Ok(()) => tracing::info!(chat_id, "job delivered"),
                Err(e) => {
                    tracing::error!(chat_id, error = %e, "delivery failed");
                    delivery
                        .fail(chat_id, FailureKind::Internal, &e.to_string())
                        .await;
                }
            }
            if let Err(e) = tokio::fs::remove_file(&output).await {
                tracing::warn!(path = %output.display(), error = %e, "failed to remove output file");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::queue::JobQueue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use stemsplit_separation::SeparationError;

    #[derive(Debug, PartialEq)]
    enum Event {
        Delivered { chat_id: i64, output_existed: bool },
        Failed { chat_id: i64, kind: FailureKind },
    }

    #[derive(Default)]
    struct RecordingDelivery {
        events: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl Delivery for RecordingDelivery {
        async fn deliver(
            &self,
            chat_id: i64,
            output: &Path,
            _choice: StemChoice,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(Event::Delivered {
                    chat_id,
                    output_existed: output.exists(),
                });
            Ok(())
        }

        async fn fail(&self, chat_id: i64, kind: FailureKind, _detail: &str) {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(Event::Failed { chat_id, kind });
        }
    }

    impl RecordingDelivery {
        fn take(&self) -> Vec<Event> {
            std::mem::take(&mut self.events.lock().unwrap_or_else(|e| e.into_inner()))
        }

        async fn wait_for(&self, count: usize) {
            for _ in 0..200 {
                if self.events.lock().unwrap_or_else(|e| e.into_inner()).len() >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("timed out waiting for {count} delivery events");
        }
    }

    struct FakeSeparator {
        delay: Duration,
        fail_with: Option<fn() -> SeparationError>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeSeparator {
        fn ok() -> Self {
            Self {
                delay: Duration::ZERO,
                fail_with: None,
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::ok()
            }
        }

        fn failing(f: fn() -> SeparationError) -> Self {
            Self {
                fail_with: Some(f),
                ..Self::ok()
            }
        }
    }

    impl Separator for FakeSeparator {
        fn separate(
            &self,
            _input: &Path,
            _choice: StemChoice,
            out_dir: &Path,
        ) -> stemsplit_separation::Result<PathBuf> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.running.fetch_sub(1, Ordering::SeqCst);

            if let Some(make_err) = self.fail_with {
                return Err(make_err());
            }
            let out = out_dir.join(format!("out-{}.mp3", rand_suffix()));
            std::fs::write(&out, b"mp3")?;
            Ok(out)
        }
    }

    fn rand_suffix() -> u128 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    }

    struct Harness {
        queue: JobQueue,
        delivery: Arc<RecordingDelivery>,
        shutdown: CancellationToken,
        dir: tempfile::TempDir,
    }

    fn start(separator: FakeSeparator, workers: usize, timeout: Duration) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let delivery = Arc::new(RecordingDelivery::default());
        let (queue, rx) = JobQueue::bounded(16);
        let shutdown = CancellationToken::new();
        JobRunner::new(
            Arc::new(separator),
            Arc::clone(&delivery) as Arc<dyn Delivery>,
            dir.path().to_path_buf(),
            timeout,
            workers,
        )
        .spawn(rx, shutdown.clone());
        Harness {
            queue,
            delivery,
            shutdown,
            dir,
        }
    }

    fn stage_input(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"audio").expect("write input");
        path
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn success_delivers_then_cleans_up() {
        let h = start(FakeSeparator::ok(), 2, Duration::from_secs(5));
        let input = stage_input(h.dir.path(), "in.mp3");

        h.queue
            .try_enqueue(JobRequest {
                chat_id: 42,
                input_path: input.clone(),
                choice: StemChoice::Vocals,
            })
            .expect("enqueue");
        h.delivery.wait_for(1).await;

        let events = h.delivery.take();
        assert_eq!(
            events,
            vec![Event::Delivered {
                chat_id: 42,
                output_existed: true
            }]
        );
        assert!(!input.exists(), "input file should be deleted");
        let leftovers: Vec<_> = std::fs::read_dir(h.dir.path())
            .expect("read_dir")
            .flatten()
            .collect();
        assert!(leftovers.is_empty(), "output should be deleted after delivery");
        h.shutdown.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn decode_failure_reports_invalid_audio_and_cleans_up() {
        let h = start(
            FakeSeparator::failing(|| SeparationError::Decode("garbage".into())),
            2,
            Duration::from_secs(5),
        );
        let input = stage_input(h.dir.path(), "in.mp3");

        h.queue
            .try_enqueue(JobRequest {
                chat_id: 7,
                input_path: input.clone(),
                choice: StemChoice::Accompaniment,
            })
            .expect("enqueue");
        h.delivery.wait_for(1).await;

        let events = h.delivery.take();
        assert_eq!(
            events,
            vec![Event::Failed {
                chat_id: 7,
                kind: FailureKind::InvalidAudio
            }]
        );
        assert!(!input.exists(), "input file should be deleted on failure");
        h.shutdown.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_job_times_out_and_late_output_is_reaped() {
        let h = start(
            FakeSeparator::slow(Duration::from_millis(300)),
            2,
            Duration::from_millis(50),
        );
        let input = stage_input(h.dir.path(), "in.mp3");

        h.queue
            .try_enqueue(JobRequest {
                chat_id: 9,
                input_path: input.clone(),
                choice: StemChoice::Vocals,
            })
            .expect("enqueue");
        h.delivery.wait_for(1).await;

        let events = h.delivery.take();
        assert_eq!(
            events,
            vec![Event::Failed {
                chat_id: 9,
                kind: FailureKind::Timeout
            }]
        );
        assert!(!input.exists());

        // The blocking task finishes later; its output must be reaped.
        tokio::time::sleep(Duration::from_millis(600)).await;
        let leftovers: Vec<_> = std::fs::read_dir(h.dir.path())
            .expect("read_dir")
            .flatten()
            .collect();
        assert!(leftovers.is_empty(), "late output should be reaped");
        h.shutdown.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn worker_count_caps_concurrency() {
        let separator = FakeSeparator::slow(Duration::from_millis(100));
        let dir = tempfile::tempdir().expect("tempdir");
        let delivery = Arc::new(RecordingDelivery::default());
        let (queue, rx) = JobQueue::bounded(16);
        let shutdown = CancellationToken::new();

        let separator = Arc::new(separator);
        JobRunner::new(
            Arc::clone(&separator) as Arc<dyn Separator>,
            Arc::clone(&delivery) as Arc<dyn Delivery>,
            dir.path().to_path_buf(),
            Duration::from_secs(5),
            1,
        )
        .spawn(rx, shutdown.clone());

        for id in 0..3 {
            let input = stage_input(dir.path(), &format!("in-{id}.mp3"));
            queue
                .try_enqueue(JobRequest {
                    chat_id: id,
                    input_path: input,
                    choice: StemChoice::Vocals,
                })
                .expect("enqueue");
        }
        delivery.wait_for(3).await;

        assert_eq!(separator.peak.load(Ordering::SeqCst), 1);
        shutdown.cancel();
    }
}
