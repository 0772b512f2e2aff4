//! Receiver/processor pipeline
//!
//! The receiver task reads wire lines and enqueues them into a bounded
//! channel with a short wait; lines that cannot be queued in time are
//! dropped. The processor drains the channel in order and drives the live
//! state, classifier, aggregator, warning assist, and sinks. Closing the
//! channel is the shutdown signal; the processor exits only once it is empty.

use crate::error::IngestError;
use crate::sink::SessionSink;
use crate::state::LiveSensorState;
use can_protocol::{control, WireMessage};
use curve_warning::CurveWarningAssist;
use segmentation::{
    ClassifierConfig, Segment, SegmentAggregator, SegmentClassifier, SegmentLibrary, SegmentType,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tracing::{debug, info, trace, warn};

/// Client pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Replay server address
    pub server_addr: String,
    /// Bounded queue capacity (messages)
    pub queue_capacity: usize,
    /// Longest wait for queue space before dropping (ms)
    pub enqueue_timeout_ms: u64,
    /// Processor poll interval (ms)
    pub poll_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:54000".to_string(),
            queue_capacity: 1000,
            enqueue_timeout_ms: 50,
            poll_interval_ms: 10,
        }
    }
}

impl PipelineConfig {
    fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Pipeline counters, shared between receiver and processor
#[derive(Debug, Default)]
pub struct PipelineStats {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
    parse_errors: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub processed: u64,
    pub parse_errors: u64,
}

impl PipelineStats {
    fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingest.enqueued").increment(1);
    }

    fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingest.dropped").increment(1);
    }

    fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingest.processed").increment(1);
    }

    fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingest.parse_errors").increment(1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of one client session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub stats: StatsSnapshot,
    /// Server sent the completion marker
    pub completed: bool,
    /// Segments recorded during the session
    pub segments: usize,
    /// Simulation time of the last applied message (ms)
    pub last_sim_time_ms: f64,
}

/// Consumer-side state of a session
pub struct SessionProcessor {
    state: LiveSensorState,
    classifier: SegmentClassifier,
    aggregator: SegmentAggregator,
    assist: Option<CurveWarningAssist>,
    sinks: Vec<Box<dyn SessionSink>>,
}

impl SessionProcessor {
    /// Create a processor that records segments
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            state: LiveSensorState::new(),
            classifier: SegmentClassifier::new(config),
            aggregator: SegmentAggregator::new(),
            assist: None,
            sinks: Vec::new(),
        }
    }

    /// Also produce curve warnings from a previous recording
    pub fn with_assist(mut self, assist: CurveWarningAssist) -> Self {
        self.assist = Some(assist);
        self
    }

    /// Add a presentation sink
    pub fn with_sink(mut self, sink: impl SessionSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Parse and apply one wire line
    pub fn handle_line(&mut self, line: &str, stats: &PipelineStats) {
        let message = match WireMessage::parse(line) {
            Ok(message) => message,
            Err(e) => {
                stats.record_parse_error();
                debug!("Skipping message: {}", e);
                return;
            }
        };
        stats.record_processed();

        if !self.state.apply(&message) {
            return;
        }

        let segment = self.classify();

        let advisory = match (self.assist.as_mut(), self.state.position) {
            (Some(assist), Some(position)) => {
                Some(assist.update(position, self.state.sim_time_ms))
            }
            _ => None,
        };

        for sink in &mut self.sinks {
            sink.on_update(&self.state, segment, advisory.as_ref());
        }
    }

    fn classify(&mut self) -> Option<SegmentType> {
        let tick = self.state.tick()?;
        let steering = self.state.steering_deg?;

        let segment_type = self.classifier.update(tick.yaw_rate_dps, steering, tick.time_ms);
        if let Some(closed) = self
            .aggregator
            .observe(segment_type, self.classifier.direction(), &tick)
        {
            for sink in &mut self.sinks {
                sink.on_segment_closed(closed);
            }
        }
        Some(segment_type)
    }

    /// Close the open segment at the latest known position
    pub fn finish(&mut self) -> Option<&Segment> {
        let tick = self.state.tick()?;
        let closed = self
            .aggregator
            .finish(tick.time_ms, tick.position, tick.heading_deg)?;
        for sink in &mut self.sinks {
            sink.on_segment_closed(closed);
        }
        Some(closed)
    }

    /// Tell the sinks the session is over
    pub fn complete(&mut self, report: &RunReport) {
        for sink in &mut self.sinks {
            sink.on_complete(report);
        }
    }

    pub fn state(&self) -> &LiveSensorState {
        &self.state
    }

    pub fn library(&self) -> &SegmentLibrary {
        self.aggregator.library()
    }

    /// Hand over the segments recorded in this session
    pub fn into_library(self) -> SegmentLibrary {
        self.aggregator.into_library()
    }
}

/// Read lines until the completion marker or end of stream.
///
/// Returns whether the completion marker was seen.
pub async fn receive_loop<R>(
    reader: R,
    tx: mpsc::Sender<String>,
    enqueue_timeout: Duration,
    stats: Arc<PipelineStats>,
) -> Result<bool, IngestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim() == control::SIMULATION_COMPLETE {
            info!("Simulation complete");
            return Ok(true);
        }

        match tx.send_timeout(line, enqueue_timeout).await {
            Ok(()) => stats.record_enqueued(),
            Err(SendTimeoutError::Timeout(line)) => {
                stats.record_dropped();
                warn!("Queue full, dropped message: {}", line);
            }
            Err(SendTimeoutError::Closed(_)) => {
                warn!("Processor stopped, receiver exiting");
                return Ok(false);
            }
        }
    }

    warn!("Connection closed before simulation completed");
    Ok(false)
}

/// Drain the queue in order until it is closed and empty
pub async fn process_loop(
    rx: &mut mpsc::Receiver<String>,
    processor: &mut SessionProcessor,
    stats: &PipelineStats,
    poll_interval: Duration,
) {
    loop {
        match tokio::time::timeout(poll_interval, rx.recv()).await {
            Ok(Some(line)) => processor.handle_line(&line, stats),
            Ok(None) => break,
            Err(_) => trace!("Queue idle"),
        }
    }
}

/// Run the receiver and processor over an established stream
pub async fn run_pipeline<R>(
    reader: R,
    config: &PipelineConfig,
    processor: &mut SessionProcessor,
) -> Result<RunReport, IngestError>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let stats = Arc::new(PipelineStats::default());
    let (tx, mut rx) = mpsc::channel(config.queue_capacity.max(1));

    let receiver = tokio::spawn(receive_loop(
        reader,
        tx,
        config.enqueue_timeout(),
        Arc::clone(&stats),
    ));

    process_loop(&mut rx, processor, &stats, config.poll_interval()).await;
    let received = receiver.await;

    // Close the last segment even if the connection broke
    processor.finish();

    let completed = received.map_err(|e| IngestError::Receiver(e.to_string()))??;
    let report = RunReport {
        stats: stats.snapshot(),
        completed,
        segments: processor.library().len(),
        last_sim_time_ms: processor.state().sim_time_ms,
    };
    processor.complete(&report);

    Ok(report)
}

/// Connect to the replay server and run one full session
pub async fn run_session(
    config: &PipelineConfig,
    processor: &mut SessionProcessor,
) -> Result<RunReport, IngestError> {
    let stream = TcpStream::connect(&config.server_addr)
        .await
        .map_err(|source| IngestError::Connect {
            addr: config.server_addr.clone(),
            source,
        })?;
    stream.set_nodelay(true)?;
    info!("Connected to replay server at {}", config.server_addr);

    let (read_half, mut write_half) = stream.into_split();
    write_half
        .write_all(format!("{}\n", control::START).as_bytes())
        .await?;

    let report = run_pipeline(BufReader::new(read_half), config, processor).await;
    drop(write_half);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SessionSink;
    use curve_warning::{Advisory, WarningConfig};
    use std::sync::Mutex;

    /// Sink that keeps what it sees for assertions
    #[derive(Clone, Default)]
    struct CollectingSink {
        updates: Arc<Mutex<Vec<Option<SegmentType>>>>,
        closed: Arc<Mutex<Vec<SegmentType>>>,
        advisories: Arc<Mutex<Vec<String>>>,
        completed: Arc<Mutex<Option<RunReport>>>,
    }

    impl SessionSink for CollectingSink {
        fn on_update(
            &mut self,
            _state: &LiveSensorState,
            segment: Option<SegmentType>,
            advisory: Option<&Advisory>,
        ) {
            self.updates.lock().unwrap().push(segment);
            if let Some(advisory) = advisory {
                self.advisories.lock().unwrap().push(advisory.to_string());
            }
        }

        fn on_segment_closed(&mut self, segment: &Segment) {
            self.closed.lock().unwrap().push(segment.segment_type);
        }

        fn on_complete(&mut self, report: &RunReport) {
            *self.completed.lock().unwrap() = Some(report.clone());
        }
    }

    fn steering_line(t: f64, angle: f64) -> String {
        format!(
            "CAN|0018|{:.1}|STEERING|SteeringWheelAngleFrame [ID=0018, Time={:.1}, Angle={:.1}°]",
            t, t, angle
        )
    }

    fn speed_line(t: f64, kmh: f64) -> String {
        format!(
            "CAN|0F7A|{:.1}|SPEED|VehicleSpeedFrame [ID=0F7A, Time={:.1}, Speed={:.1} km/h]",
            t, t, kmh
        )
    }

    fn dynamics_line(t: f64, yaw: f64) -> String {
        format!("CAN|0B41|{:.1}|DYNAMICS|{:.2}|0.10|0.50", t, yaw)
    }

    /// Straight driving north, then a right-hand curve
    fn drive_lines() -> Vec<String> {
        let mut lines = Vec::new();
        for i in 0..20 {
            let t = i as f64 * 100.0;
            let lat = 48.0 + i as f64 * 0.0001;
            let curving = i >= 10;
            let lon = if curving {
                11.0 + (i - 9) as f64 * 0.0001
            } else {
                11.0
            };
            let yaw = if curving { 6.0 } else { 0.1 };
            let steer = if curving { 40.0 } else { 1.0 };

            lines.push(format!("GPS|{:.1}|{:.6}|{:.6}", t, lat, lon));
            lines.push(steering_line(t + 1.0, steer));
            lines.push(speed_line(t + 2.0, 25.0));
            lines.push(dynamics_line(t + 3.0, yaw));
        }
        lines
    }

    fn session_input(lines: &[String]) -> Vec<u8> {
        let mut text = lines.join("\n");
        text.push('\n');
        text.push_str(control::SIMULATION_COMPLETE);
        text.push('\n');
        text.into_bytes()
    }

    #[tokio::test]
    async fn test_pipeline_records_segments() {
        let sink = CollectingSink::default();
        let mut processor =
            SessionProcessor::new(ClassifierConfig::default()).with_sink(sink.clone());

        let mut lines = drive_lines();
        lines.insert(5, "GARBAGE|line".to_string());
        let input = std::io::Cursor::new(session_input(&lines));

        let report = run_pipeline(input, &PipelineConfig::default(), &mut processor)
            .await
            .unwrap();

        assert!(report.completed);
        assert_eq!(report.stats.enqueued, 81);
        assert_eq!(report.stats.dropped, 0);
        assert_eq!(report.stats.processed, 80);
        assert_eq!(report.stats.parse_errors, 1);
        assert_eq!(report.segments, 2);

        let library = processor.library();
        assert_eq!(library.summary().straights, 1);
        assert_eq!(library.summary().curves, 1);

        let curve = library.curves().next().unwrap();
        assert_eq!(curve.direction, segmentation::CurveDirection::Right);
        assert_eq!(curve.average_speed_kmh, 25.0);

        assert_eq!(
            *sink.closed.lock().unwrap(),
            vec![SegmentType::Straight, SegmentType::Curve]
        );
        assert_eq!(sink.completed.lock().unwrap().as_ref(), Some(&report));
        // Nothing is classified before steering, yaw and GPS are all known
        assert_eq!(sink.updates.lock().unwrap()[0], None);
    }

    #[tokio::test]
    async fn test_warning_run_uses_recorded_library() {
        let mut recorder = SessionProcessor::new(ClassifierConfig::default());
        let input = std::io::Cursor::new(session_input(&drive_lines()));
        run_pipeline(input, &PipelineConfig::default(), &mut recorder)
            .await
            .unwrap();
        let library = Arc::new(recorder.into_library());

        let sink = CollectingSink::default();
        let assist = CurveWarningAssist::new(WarningConfig::default(), library);
        let mut processor = SessionProcessor::new(ClassifierConfig::default())
            .with_assist(assist)
            .with_sink(sink.clone());
        let input = std::io::Cursor::new(session_input(&drive_lines()));
        run_pipeline(input, &PipelineConfig::default(), &mut processor)
            .await
            .unwrap();

        let advisories = sink.advisories.lock().unwrap();
        assert!(advisories
            .iter()
            .any(|a| a.contains("Next CURVE") && a.contains("(right)")));
        assert!(advisories.iter().any(|a| a.contains("[!] IMMEDIATE CURVE")));
        assert_eq!(
            advisories.last().map(String::as_str),
            Some("ADAS: No upcoming segments detected")
        );
    }

    #[tokio::test]
    async fn test_first_curve_heading_waits_for_second_fix() {
        // Turning from the first sample, driving due west the whole time
        let mut lines = vec!["GPS|0.0|48.000000|11.000000".to_string()];
        for step in 0..4 {
            let t = 10.0 + step as f64 * 20.0;
            lines.push(steering_line(t, -40.0));
            lines.push(dynamics_line(t + 10.0, -6.0));
        }
        for (second, lon) in [(1, 10.999), (2, 10.998)] {
            let t = second as f64 * 1000.0;
            lines.push(format!("GPS|{:.1}|48.000000|{:.6}", t, lon));
            lines.push(steering_line(t + 10.0, -40.0));
            lines.push(speed_line(t + 20.0, 30.0));
            lines.push(dynamics_line(t + 30.0, -6.0));
        }

        let mut processor = SessionProcessor::new(ClassifierConfig::default());
        let input = std::io::Cursor::new(session_input(&lines));
        run_pipeline(input, &PipelineConfig::default(), &mut processor)
            .await
            .unwrap();

        let curve = processor.library().curves().next().cloned().unwrap();
        assert_eq!(curve.direction, segmentation::CurveDirection::Left);
        assert!(!curve.headings.is_empty());
        assert!(curve.headings.iter().all(|h| (h - 270.0).abs() < 0.01));
        // Constant bearing: the angle comes from yaw alone, about 6 °/s over 2 s
        assert!(curve.curve_degrees < 15.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_without_blocking() {
        let (tx, mut rx) = mpsc::channel(4);
        let stats = Arc::new(PipelineStats::default());

        let mut text = String::new();
        for i in 0..10 {
            text.push_str(&format!("GPS|{}.0|48.0|11.0\n", i * 1000));
        }
        text.push_str("SIMULATION_COMPLETE\n");

        // Nobody reads the queue while the receiver runs
        let completed = receive_loop(
            std::io::Cursor::new(text.into_bytes()),
            tx,
            Duration::from_millis(50),
            Arc::clone(&stats),
        )
        .await
        .unwrap();

        assert!(completed);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.enqueued, 4);
        assert_eq!(snapshot.dropped, 6);

        // Queued lines keep their order
        let first = rx.recv().await.unwrap();
        assert!(first.starts_with("GPS|0.0"));
    }

    #[tokio::test]
    async fn test_eof_without_marker_is_incomplete() {
        let mut processor = SessionProcessor::new(ClassifierConfig::default());
        let input = std::io::Cursor::new(b"GPS|0.0|48.0|11.0\n".to_vec());

        let report = run_pipeline(input, &PipelineConfig::default(), &mut processor)
            .await
            .unwrap();

        assert!(!report.completed);
        assert_eq!(report.stats.processed, 1);
        assert_eq!(report.segments, 0);
    }
}
