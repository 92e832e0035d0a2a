use std::cell::Cell;
use std::fs::File;
use std::rc::Rc;
use std::time::Duration;

use depth_recorder::book::{parse_snapshot, DepthSnapshot, PriceLevel};
use depth_recorder::capture::{
    CaptureLoop, CaptureReport, CaptureState, CaptureWindow, EndReason, ParsePolicy, ReplayClock,
};
use depth_recorder::error::{CaptureError, ParseError, SourceError};
use depth_recorder::export::{read_table, TableExporter};
use depth_recorder::record::{EventKind, EventRecord, FileHeader, JournalWriter, JOURNAL_VERSION};
use depth_recorder::source::replay::ReplaySource;
use depth_recorder::source::{RawPayload, SnapshotSource};

fn depth_json(base: f32, levels: usize) -> String {
    let bids: Vec<[String; 2]> = (0..levels)
        .map(|i| [format!("{:.2}", base - i as f32), format!("{:.4}", 0.5 + i as f32)])
        .collect();
    let asks: Vec<[String; 2]> = (0..levels)
        .map(|i| [format!("{:.2}", base + 1.0 + i as f32), format!("{:.4}", 0.25 + i as f32)])
        .collect();
    serde_json::json!({ "lastUpdateId": 1027024, "bids": bids, "asks": asks }).to_string()
}

fn event_at(seq: u64, elapsed_ms: u64, kind: EventKind) -> EventRecord {
    EventRecord { seq, recv_unix_ns: 0, elapsed_ns: elapsed_ms * 1_000_000, kind }
}

fn payload(seq: u64, ms: u64, base: f32) -> EventRecord {
    event_at(seq, ms, EventKind::Payload(depth_json(base, 10)))
}

/// Counts releases of the wrapped source.
struct Tracked {
    inner: ReplaySource,
    released: Rc<Cell<usize>>,
}

impl SnapshotSource for Tracked {
    fn next(&mut self) -> Result<RawPayload, SourceError> {
        self.inner.next()
    }

    fn release(&mut self) {
        self.released.set(self.released.get() + 1);
    }
}

fn run(
    secs: u64,
    policy: ParsePolicy,
    events: Vec<EventRecord>,
) -> (Result<CaptureReport, CaptureError>, CaptureState, usize) {
    let clock = ReplayClock::default();
    let released = Rc::new(Cell::new(0));
    let source = Tracked { inner: ReplaySource::new(events, clock.clone()), released: released.clone() };
    let mut capture = CaptureLoop::new(CaptureWindow::seconds(secs), policy, clock);
    let res = capture.run(|| Ok(source));
    (res, capture.state(), released.get())
}

fn exported_rows(report: &CaptureReport, precision: usize) -> Vec<DepthSnapshot> {
    let mut out = Vec::new();
    TableExporter::new(precision).export(&report.buffer, &mut out).unwrap();
    read_table(out.as_slice()).unwrap()
}

#[test]
fn transient_gap_leaves_zero_row() {
    let events = vec![
        payload(0, 100, 100.0),
        payload(1, 1_100, 101.0),
        event_at(2, 2_100, EventKind::Transient("HTTP 503".into())),
        payload(3, 3_100, 103.0),
        payload(4, 4_100, 104.0),
        payload(5, 5_100, 105.0),
    ];
    let (res, state, released) = run(5, ParsePolicy::Skip, events);
    let report = res.unwrap();
    assert_eq!(state, CaptureState::Done);
    assert_eq!(released, 1);
    assert_eq!(report.end, EndReason::WindowElapsed);
    assert_eq!(report.stats.transient, 1);
    assert_eq!(report.stats.late, 1);
    assert_eq!(report.buffer.snapshot_count(), 4);

    let rows = exported_rows(&report, 2);
    assert_eq!(rows.len(), 5);
    assert!(rows[2].is_zero());
    for (row, base) in [(0, 100.0), (1, 101.0), (3, 103.0), (4, 104.0)] {
        assert_eq!(rows[row], parse_snapshot(&depth_json(base, 10)).unwrap(), "row {row}");
    }
}

#[test]
fn graceful_close_exports_full_capacity() {
    let events = vec![
        payload(0, 10, 50.0),
        payload(1, 1_010, 51.0),
        payload(2, 2_010, 52.0),
        event_at(3, 2_500, EventKind::Closed),
        payload(4, 3_010, 53.0),
    ];
    let (res, state, released) = run(10, ParsePolicy::Skip, events);
    let report = res.unwrap();
    assert_eq!(state, CaptureState::Done);
    assert_eq!(released, 1);
    assert_eq!(report.end, EndReason::SourceClosed);

    let rows = exported_rows(&report, 5);
    assert_eq!(rows.len(), 10);
    assert_eq!(rows[0].bids[0], PriceLevel::new(50.0, 0.5));
    assert_eq!(rows[2].asks[9], PriceLevel::new(62.0, 9.25));
    assert!(rows[3..].iter().all(DepthSnapshot::is_zero));
}

#[test]
fn exhausted_replay_counts_as_close() {
    let (res, _, _) = run(3, ParsePolicy::Skip, vec![payload(0, 0, 10.0)]);
    let report = res.unwrap();
    assert_eq!(report.end, EndReason::SourceClosed);
    assert_eq!(report.buffer.capacity(), 3);
    assert_eq!(report.buffer.snapshot_count(), 1);
}

#[test]
fn bad_payload_is_skipped_by_default() {
    let short = event_at(1, 1_200, EventKind::Payload(depth_json(20.0, 8)));
    let bad = event_at(2, 2_200, EventKind::Payload(depth_json(20.0, 10).replacen("\"20.00\"", "\"abc\"", 1)));
    let (res, state, _) = run(4, ParsePolicy::Skip, vec![payload(0, 200, 20.0), short, bad, payload(3, 3_200, 23.0)]);
    let report = res.unwrap();
    assert_eq!(state, CaptureState::Done);
    assert_eq!(report.stats.dropped, 2);
    assert_eq!(report.stats.written, 2);
    assert!(report.buffer.is_gap(1));
    assert!(report.buffer.is_gap(2));
}

#[test]
fn abort_policy_fails_the_run_and_releases() {
    let bad = event_at(1, 1_200, EventKind::Payload(depth_json(20.0, 10).replacen("\"20.00\"", "\"abc\"", 1)));
    let (res, state, released) = run(4, ParsePolicy::Abort, vec![payload(0, 200, 20.0), bad]);
    assert!(matches!(
        res,
        Err(CaptureError::Parse(ParseError::InvalidNumericField { .. }))
    ));
    assert_eq!(state, CaptureState::Aborted);
    assert_eq!(released, 1);
}

#[test]
fn transport_failure_aborts_and_releases() {
    struct Failing(Rc<Cell<usize>>);
    impl SnapshotSource for Failing {
        fn next(&mut self) -> Result<RawPayload, SourceError> {
            Err(SourceError::Transport("connection reset".into()))
        }
        fn release(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }
    let released = Rc::new(Cell::new(0));
    let src = Failing(released.clone());
    let mut capture = CaptureLoop::new(CaptureWindow::seconds(5), ParsePolicy::Skip, ReplayClock::default());
    let res = capture.run(|| Ok(src));
    assert!(matches!(res, Err(CaptureError::Transport(_))));
    assert_eq!(capture.state(), CaptureState::Aborted);
    assert_eq!(released.get(), 1);
}

#[test]
fn same_unit_keeps_latest_snapshot() {
    let (res, _, _) = run(2, ParsePolicy::Skip, vec![payload(0, 100, 1.0), payload(1, 900, 2.0)]);
    let report = res.unwrap();
    assert_eq!(report.stats.overwritten, 1);
    assert_eq!(report.buffer.snapshot_count(), 1);
    assert_eq!(report.buffer.get(0).unwrap().bids[0].price, 2.0);
}

#[test]
fn stop_signal_interrupts_after_current_read() {
    let clock = ReplayClock::default();
    let (tx, rx) = crossbeam_channel::bounded(1);
    tx.send(()).unwrap();
    let source = ReplaySource::new(vec![payload(0, 0, 7.0), payload(1, 1_000, 8.0)], clock.clone());
    let mut capture = CaptureLoop::new(CaptureWindow::seconds(60), ParsePolicy::Skip, clock).with_stop_signal(rx);
    let report = capture.run(|| Ok(source)).unwrap();
    assert_eq!(report.end, EndReason::Interrupted);
    assert_eq!(report.buffer.snapshot_count(), 1);
    assert_eq!(report.buffer.capacity(), 60);
}

#[test]
fn journal_replays_into_the_same_table() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("btcusdt.bin");
    let header = FileHeader {
        version: JOURNAL_VERSION,
        created_unix_ns: 0,
        symbol: "btcusdt".into(),
        mode: "poll".into(),
        window_secs: 4,
        unit_ms: 1000,
    };
    {
        let mut w = JournalWriter::create(&journal, header).unwrap();
        w.append(Duration::from_millis(300), EventKind::Payload(depth_json(30_000.0, 12))).unwrap();
        w.append(Duration::from_millis(1_300), EventKind::Transient("timeout".into())).unwrap();
        w.append(Duration::from_millis(2_300), EventKind::Payload(depth_json(30_002.0, 10))).unwrap();
        w.finish().unwrap();
    }

    let clock = ReplayClock::default();
    let (j, source) = ReplaySource::open(&journal, clock.clone()).unwrap();
    assert!(j.trailer.is_some_and(|t| t.written == 3 && t.lost == 0));
    let window = CaptureWindow::new(j.header.window(), j.header.unit());
    let report = CaptureLoop::new(window, ParsePolicy::Skip, clock).run(|| Ok(source)).unwrap();

    let csv_path = dir.path().join("out").join("btcusdt.csv");
    TableExporter::new(2).export_to_path(&report.buffer, &csv_path).unwrap();
    let rows = read_table(File::open(&csv_path).unwrap()).unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].bids[0], PriceLevel::new(30_000.0, 0.5));
    assert!(rows[1].is_zero());
    assert_eq!(rows[2].asks[0], PriceLevel::new(30_003.0, 0.25));
    assert!(rows[3].is_zero());
}
