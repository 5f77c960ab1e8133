//! End-to-end tests of frame-window evaluation over a temporary MOTChallenge
//! layout, with a scripted engine standing in for TrackEval.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::{tempdir, TempDir};

use frame_window_eval::{
    evaluate_window, ConfigLayers, EngineJob, EngineReport, Error, ErrorKind, EvaluationEngine,
    EvaluationObserver, EvaluationRequest, EvaluationService, FrameWindow, MetricValue, Overrides,
    PairLocks, RequestContext, Sandbox, SandboxToken, SequenceInfoFile,
};

const SEQUENCE: &str = "MOT16-02";
const TRACKER: &str = "MPNTrack";
const SUMMARY: &str = "HOTA DetA MOTA\n63.5 70.2 55.0\n";

// =============================================================================
// Fixtures
// =============================================================================

fn records(frames: impl IntoIterator<Item = u64>, id: u32) -> String {
    frames
        .into_iter()
        .map(|f| format!("{},{},100,200,50,80,1,1,1.0\n", f, id))
        .collect()
}

struct Fixture {
    root: TempDir,
    layers: ConfigLayers,
}

impl Fixture {
    fn new() -> Self {
        let root = tempdir().unwrap();
        let mut layers = ConfigLayers::default();
        layers.dataset.gt_folder = root.path().join("gt");
        layers.dataset.trackers_folder = root.path().join("trackers");
        layers.dataset.benchmark = "MOT16".to_string();

        let seq = layers.dataset.sequence_dir(SEQUENCE);
        fs::create_dir_all(seq.join("gt")).unwrap();
        fs::write(seq.join("gt").join("gt.txt"), records(1..=100, 1)).unwrap();
        fs::write(
            seq.join("seqinfo.ini"),
            "[Sequence]\nname=MOT16-02\nimDir=img1\nframeRate=30\nseqLength=100\nimWidth=1920\nimHeight=1080\nimExt=.jpg\n",
        )
        .unwrap();

        let tracker_file = layers.dataset.tracker_file(TRACKER, SEQUENCE);
        fs::create_dir_all(tracker_file.parent().unwrap()).unwrap();
        fs::write(&tracker_file, records(1..=100, 2)).unwrap();

        Self { root, layers }
    }

    /// Every path under the fixture root with its file content.
    fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        fn walk(dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    out.insert(path.clone(), Vec::new());
                    walk(&path, out);
                } else {
                    out.insert(path.clone(), fs::read(&path).unwrap());
                }
            }
        }
        let mut out = BTreeMap::new();
        walk(self.root.path(), &mut out);
        out
    }
}

/// What the engine found in the sandbox it was handed.
#[derive(Debug, Clone)]
struct Seen {
    sequence: String,
    tracker: String,
    gt_lines: usize,
    tracker_content: String,
    seq_length: Option<String>,
}

struct ScriptedEngine {
    summary: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen: Mutex<Vec<Seen>>,
}

impl ScriptedEngine {
    fn new(summary: Option<&str>) -> Self {
        Self {
            summary: summary.map(str::to_string),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    fn inspect(&self, job: &EngineJob<'_>) -> frame_window_eval::Result<EngineReport> {
        let dataset = job.dataset.config();
        let sequence = job.dataset.sequences()[0].clone();
        let tracker = job.dataset.trackers()[0].clone();

        let gt = fs::read_to_string(dataset.gt_file(&sequence))?;
        let tracker_content = fs::read_to_string(dataset.tracker_file(&tracker, &sequence))?;
        let seqinfo = SequenceInfoFile::new(dataset.sequence_dir(&sequence).join("seqinfo.ini"))?;
        self.seen.lock().unwrap().push(Seen {
            seq_length: seqinfo.get("Sequence", "seqLength").map(str::to_string),
            gt_lines: gt.lines().count(),
            tracker_content,
            sequence,
            tracker: tracker.clone(),
        });

        let until = Instant::now() + self.delay;
        while Instant::now() < until {
            if job.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if job.deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(Error::Engine("scripted engine timed out".to_string()));
            }
            thread::sleep(Duration::from_millis(5));
        }

        if let Some(summary) = &self.summary {
            let path = job.dataset.summary_path(&tracker);
            fs::create_dir_all(path.parent().unwrap())?;
            fs::write(path, summary)?;
        }
        Ok(EngineReport {
            messages: vec!["Success".to_string()],
        })
    }
}

impl EvaluationEngine for ScriptedEngine {
    fn evaluate(&self, job: &EngineJob<'_>) -> frame_window_eval::Result<EngineReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let outcome = self.inspect(job);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

#[derive(Default)]
struct Recorder {
    created: AtomicUsize,
    reclaimed: AtomicUsize,
    dirs: Mutex<Vec<PathBuf>>,
}

impl EvaluationObserver for Recorder {
    fn sandbox_created(&self, sandbox: &Sandbox) {
        self.created.fetch_add(1, Ordering::SeqCst);
        let mut dirs = self.dirs.lock().unwrap();
        dirs.push(sandbox.gt_dir().to_path_buf());
        dirs.push(sandbox.tracker_dir().to_path_buf());
    }

    fn sandbox_reclaimed(&self, sandbox: &Sandbox) {
        assert!(sandbox.is_reclaimed());
        self.reclaimed.fetch_add(1, Ordering::SeqCst);
    }
}

fn window(start: u64, end: u64) -> FrameWindow {
    FrameWindow::new(start, end).unwrap()
}

fn run(
    fixture: &Fixture,
    request: &EvaluationRequest,
    engine: &ScriptedEngine,
) -> (frame_window_eval::Result<frame_window_eval::CategorizedResult>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let ctx = RequestContext::new().with_observer(recorder.clone());
    let outcome = evaluate_window(request, &fixture.layers, engine, &ctx);
    (outcome, recorder)
}

// =============================================================================
// Test 1: Window filtering reaches the engine
// =============================================================================

#[test]
fn test_window_is_filtered_before_engine_runs() {
    let fixture = Fixture::new();
    let before = fixture.snapshot();
    let engine = ScriptedEngine::new(Some(SUMMARY));
    let request = EvaluationRequest::new(SEQUENCE, TRACKER, window(10, 20));

    let (outcome, recorder) = run(&fixture, &request, &engine);
    outcome.unwrap();

    let seen = engine.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].gt_lines, 11);
    assert_eq!(seen[0].tracker_content, records(10..=20, 2));
    assert_eq!(seen[0].seq_length.as_deref(), Some("11"));
    assert!(seen[0].sequence.starts_with("MOT16-02_"));
    assert!(seen[0].tracker.starts_with("MPNTrack_"));

    assert_eq!(recorder.reclaimed.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.snapshot(), before);
}

#[test]
fn test_window_past_sequence_end_keeps_window_length() {
    let fixture = Fixture::new();
    let before = fixture.snapshot();
    let engine = ScriptedEngine::new(Some(SUMMARY));
    let request = EvaluationRequest::new(SEQUENCE, TRACKER, window(95, 110));

    let (outcome, _) = run(&fixture, &request, &engine);
    outcome.unwrap();

    let seen = engine.seen();
    assert_eq!(seen[0].gt_lines, 6);
    assert_eq!(seen[0].tracker_content, records(95..=100, 2));
    assert_eq!(seen[0].seq_length.as_deref(), Some("16"));
    assert_eq!(fixture.snapshot(), before);
}

// =============================================================================
// Test 2: Summary categorization
// =============================================================================

#[test]
fn test_summary_is_categorized() {
    let fixture = Fixture::new();
    let engine = ScriptedEngine::new(Some(SUMMARY));
    let request = EvaluationRequest::new(SEQUENCE, TRACKER, window(1, 100));

    let (outcome, _) = run(&fixture, &request, &engine);
    let result = outcome.unwrap();

    assert_eq!(result.hota.len(), 2);
    assert_eq!(result.hota["HOTA"], MetricValue::Number(63.5));
    assert_eq!(result.hota["DetA"], MetricValue::Number(70.2));
    assert_eq!(result.clear["MOTA"], MetricValue::Number(55.0));
    assert!(result.identity.is_empty());
    assert!(result.vace.is_empty());
    assert!(result.count.is_empty());
}

// =============================================================================
// Test 3: Unknown metric families
// =============================================================================

#[test]
fn test_no_known_metric_fails_before_engine() {
    let fixture = Fixture::new();
    let before = fixture.snapshot();
    let engine = ScriptedEngine::new(Some(SUMMARY));
    let request = EvaluationRequest::new(SEQUENCE, TRACKER, window(10, 20)).with_metrics(["Bogus"]);

    let (outcome, recorder) = run(&fixture, &request, &engine);

    assert_eq!(outcome.unwrap_err().kind(), ErrorKind::Engine);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    assert_eq!(recorder.reclaimed.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.snapshot(), before);
}

// =============================================================================
// Test 4: Missing summary artifact
// =============================================================================

#[test]
fn test_missing_summary_reclaims_once() {
    let fixture = Fixture::new();
    let before = fixture.snapshot();
    let engine = ScriptedEngine::new(None);
    let request = EvaluationRequest::new(SEQUENCE, TRACKER, window(10, 20));

    let (outcome, recorder) = run(&fixture, &request, &engine);

    assert_eq!(outcome.unwrap_err().kind(), ErrorKind::SummaryNotFound);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.created.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.reclaimed.load(Ordering::SeqCst), 1);
    for dir in recorder.dirs.lock().unwrap().iter() {
        assert!(!dir.exists(), "{} survived", dir.display());
    }
    assert_eq!(fixture.snapshot(), before);
}

// =============================================================================
// Test 5: Failures before any sandbox exists
// =============================================================================

#[test]
fn test_config_error_creates_no_sandbox() {
    let fixture = Fixture::new();
    let before = fixture.snapshot();
    let engine = ScriptedEngine::new(Some(SUMMARY));
    let request = EvaluationRequest::new(SEQUENCE, TRACKER, window(10, 20))
        .with_overrides(Overrides::new().with("NOT_A_KEY", ["1"]));

    let (outcome, recorder) = run(&fixture, &request, &engine);

    assert_eq!(outcome.unwrap_err().kind(), ErrorKind::Config);
    assert_eq!(recorder.created.load(Ordering::SeqCst), 0);
    assert_eq!(recorder.reclaimed.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.snapshot(), before);
}

#[test]
fn test_missing_tracker_is_missing_source() {
    let fixture = Fixture::new();
    let before = fixture.snapshot();
    let engine = ScriptedEngine::new(Some(SUMMARY));
    let request = EvaluationRequest::new(SEQUENCE, "NoSuchTracker", window(10, 20));

    let (outcome, recorder) = run(&fixture, &request, &engine);

    assert_eq!(outcome.unwrap_err().kind(), ErrorKind::MissingSource);
    assert_eq!(recorder.created.load(Ordering::SeqCst), 0);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.snapshot(), before);
}

// =============================================================================
// Test 6: Filter failures
// =============================================================================

#[test]
fn test_unparseable_record_is_filter_error_and_cleans_up() {
    let fixture = Fixture::new();
    let gt = fixture.layers.dataset.gt_file(SEQUENCE);
    let mut content = fs::read_to_string(&gt).unwrap();
    content.push_str("frame,1,0,0,1,1,1\n");
    fs::write(&gt, content).unwrap();
    let before = fixture.snapshot();
    let engine = ScriptedEngine::new(Some(SUMMARY));
    let request = EvaluationRequest::new(SEQUENCE, TRACKER, window(10, 20));

    let (outcome, recorder) = run(&fixture, &request, &engine);

    assert_eq!(outcome.unwrap_err().kind(), ErrorKind::FilterIo);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    assert_eq!(recorder.reclaimed.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.snapshot(), before);
}

#[test]
fn test_shared_gt_location_is_rejected_before_sandbox() {
    let fixture = Fixture::new();
    let shared = fixture.layers.dataset.gt_split_dir().join("shared_gt.txt");
    fs::write(&shared, records(1..=100, 3)).unwrap();
    let before = fixture.snapshot();
    let engine = ScriptedEngine::new(Some(SUMMARY));
    let request = EvaluationRequest::new(SEQUENCE, TRACKER, window(10, 20))
        .with_overrides(Overrides::new().with("GT_LOC_FORMAT", ["{gt_folder}/shared_gt.txt"]));

    let (outcome, recorder) = run(&fixture, &request, &engine);

    assert_eq!(outcome.unwrap_err().kind(), ErrorKind::Config);
    assert_eq!(recorder.created.load(Ordering::SeqCst), 0);
    assert_eq!(fs::read_to_string(&shared).unwrap(), records(1..=100, 3));
    assert_eq!(fixture.snapshot(), before);
}

#[test]
fn test_gt_location_outside_sandbox_is_filter_error() {
    let fixture = Fixture::new();
    let gt_root = fixture.layers.dataset.gt_folder.clone();
    let targets = [
        ("{gt_folder}/../elsewhere/{seq}/gt.txt", gt_root.join("elsewhere")),
        ("{gt_folder}-copy/{seq}/gt.txt", gt_root.join("MOT16-train-copy")),
    ];
    for (format, dir) in targets {
        let target = dir.join("MOT16-02_fixed").join("gt.txt");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, records(1..=100, 4)).unwrap();
        let before = fixture.snapshot();
        let engine = ScriptedEngine::new(Some(SUMMARY));
        let request = EvaluationRequest::new(SEQUENCE, TRACKER, window(10, 20))
            .with_overrides(Overrides::new().with("GT_LOC_FORMAT", [format]));
        let recorder = Arc::new(Recorder::default());
        let ctx = RequestContext::new()
            .with_token(SandboxToken::from_string("fixed"))
            .with_observer(recorder.clone());

        let err = evaluate_window(&request, &fixture.layers, &engine, &ctx).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::FilterIo, "{}", format);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.reclaimed.load(Ordering::SeqCst), 1);
        assert_eq!(fs::read_to_string(&target).unwrap(), records(1..=100, 4));
        assert_eq!(fixture.snapshot(), before);
    }
}

// =============================================================================
// Test 7: Uploaded tracker file
// =============================================================================

#[test]
fn test_uploaded_tracker_file_replaces_tracker_record() {
    let fixture = Fixture::new();
    let upload = fixture.root.path().join("upload.txt");
    fs::write(&upload, records(1..=50, 7)).unwrap();
    let before = fixture.snapshot();
    let engine = ScriptedEngine::new(Some(SUMMARY));
    let request =
        EvaluationRequest::new(SEQUENCE, TRACKER, window(45, 60)).with_tracker_file(&upload);

    let (outcome, _) = run(&fixture, &request, &engine);
    outcome.unwrap();

    assert_eq!(engine.seen()[0].tracker_content, records(45..=50, 7));
    assert_eq!(engine.seen()[0].gt_lines, 16);
    assert_eq!(fixture.snapshot(), before);
}

#[test]
fn test_missing_upload_is_filter_error() {
    let fixture = Fixture::new();
    let before = fixture.snapshot();
    let engine = ScriptedEngine::new(Some(SUMMARY));
    let request = EvaluationRequest::new(SEQUENCE, TRACKER, window(1, 5))
        .with_tracker_file(fixture.root.path().join("missing.txt"));

    let (outcome, _) = run(&fixture, &request, &engine);

    assert_eq!(outcome.unwrap_err().kind(), ErrorKind::FilterIo);
    assert_eq!(fixture.snapshot(), before);
}

// =============================================================================
// Test 8: Concurrent requests through the service
// =============================================================================

#[test]
fn test_concurrent_requests_on_same_pair_are_isolated() {
    let fixture = Fixture::new();
    let before = fixture.snapshot();
    let engine = Arc::new(ScriptedEngine::new(Some(SUMMARY)).with_delay(Duration::from_millis(50)));
    let service = EvaluationService::new(engine.clone(), fixture.layers.clone());

    let windows = [(1, 10), (5, 30), (40, 41), (90, 100)];
    let handles: Vec<_> = windows
        .iter()
        .map(|&(s, e)| service.submit(EvaluationRequest::new(SEQUENCE, TRACKER, window(s, e))).unwrap())
        .collect();
    for handle in handles {
        handle.wait().unwrap();
    }

    let seen = engine.seen();
    assert_eq!(seen.len(), windows.len());
    let mut sequences: Vec<_> = seen.iter().map(|s| s.sequence.clone()).collect();
    sequences.sort();
    sequences.dedup();
    assert_eq!(sequences.len(), windows.len());

    let mut lengths: Vec<_> = seen.iter().map(|s| s.gt_lines).collect();
    lengths.sort();
    assert_eq!(lengths, vec![2, 10, 11, 26]);
    assert_eq!(fixture.snapshot(), before);
}

#[test]
fn test_pair_locks_serialise_same_pair() {
    let fixture = Fixture::new();
    let engine = Arc::new(ScriptedEngine::new(Some(SUMMARY)).with_delay(Duration::from_millis(30)));
    let service = EvaluationService::new(engine.clone(), fixture.layers.clone())
        .with_pair_locks(Arc::new(PairLocks::new()));

    let handles: Vec<_> = (0..3)
        .map(|i| service.submit(EvaluationRequest::new(SEQUENCE, TRACKER, window(1 + i, 20))).unwrap())
        .collect();
    for handle in handles {
        handle.wait().unwrap();
    }

    assert_eq!(engine.calls.load(Ordering::SeqCst), 3);
    assert_eq!(engine.max_in_flight.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Test 9: Cancellation and deadlines
// =============================================================================

fn wait_for_snapshot(fixture: &Fixture, expected: &BTreeMap<PathBuf, Vec<u8>>) {
    let until = Instant::now() + Duration::from_secs(10);
    while fixture.snapshot() != *expected {
        assert!(Instant::now() < until, "sandbox was not reclaimed");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_cancelled_request_reclaims_sandbox() {
    let fixture = Fixture::new();
    let before = fixture.snapshot();
    let engine = Arc::new(ScriptedEngine::new(Some(SUMMARY)).with_delay(Duration::from_secs(30)));
    let service = EvaluationService::new(engine.clone(), fixture.layers.clone());

    let handle = service.submit(EvaluationRequest::new(SEQUENCE, TRACKER, window(1, 10))).unwrap();
    let until = Instant::now() + Duration::from_secs(10);
    while engine.calls.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < until);
        thread::sleep(Duration::from_millis(5));
    }
    handle.cancel();

    assert_eq!(handle.wait().unwrap_err().kind(), ErrorKind::Cancelled);
    assert_eq!(fixture.snapshot(), before);
}

#[test]
fn test_timeout_is_engine_error() {
    let fixture = Fixture::new();
    let before = fixture.snapshot();
    let engine = Arc::new(ScriptedEngine::new(Some(SUMMARY)).with_delay(Duration::from_secs(30)));
    let service = EvaluationService::new(engine, fixture.layers.clone())
        .with_timeout(Duration::from_millis(200));

    let started = Instant::now();
    let outcome = service
        .submit(EvaluationRequest::new(SEQUENCE, TRACKER, window(1, 10)))
        .unwrap()
        .wait();

    assert_eq!(outcome.unwrap_err().kind(), ErrorKind::Engine);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(fixture.snapshot(), before);
}

#[test]
fn test_dropped_handle_abandons_request() {
    let fixture = Fixture::new();
    let before = fixture.snapshot();
    let engine = Arc::new(ScriptedEngine::new(Some(SUMMARY)).with_delay(Duration::from_secs(30)));
    let service = EvaluationService::new(engine.clone(), fixture.layers.clone());

    let handle = service.submit(EvaluationRequest::new(SEQUENCE, TRACKER, window(1, 10))).unwrap();
    let handle = match handle.wait_timeout(Duration::from_millis(50)) {
        Err(handle) => handle,
        Ok(outcome) => panic!("finished early: {:?}", outcome),
    };
    drop(handle);

    wait_for_snapshot(&fixture, &before);
}
