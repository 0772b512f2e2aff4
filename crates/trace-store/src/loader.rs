//! CAN and GPS Trace File Loaders
//!
//! Both loaders skip bad lines and keep going; only failing to open or read
//! the file aborts a load.

use crate::error::TraceError;
use crate::{CanTrace, GpsTrace};
use can_protocol::{is_known_id, offset_duration, CanFrame, GpsFix};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

/// Data length code expected in front of the eight payload bytes
const FRAME_DLC: &str = "8";

/// Payload byte count
const PAYLOAD_BYTES: usize = 8;

/// Summary of a trace load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Lines read from the file
    pub lines: usize,
    /// Records stored in the trace
    pub accepted: usize,
    /// Lines ignored (blank, comment, unmatched, unknown ID)
    pub skipped: usize,
    /// Lines that matched but could not be decoded
    pub errors: usize,
}

/// Load a CAN trace file
pub fn load_can_trace(path: impl AsRef<Path>) -> Result<(CanTrace, LoadReport), TraceError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| TraceError::io(path, e))?;
    let (trace, report) =
        parse_can_trace(BufReader::new(file)).map_err(|e| TraceError::io(path, e))?;

    info!(
        "Loaded CAN trace {}: {} frames ({} skipped, {} errors)",
        path.display(),
        report.accepted,
        report.skipped,
        report.errors
    );
    Ok((trace, report))
}

/// Load a GPS trace file
pub fn load_gps_trace(path: impl AsRef<Path>) -> Result<(GpsTrace, LoadReport), TraceError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| TraceError::io(path, e))?;
    let (trace, report) = parse_gps_trace(file).map_err(|e| TraceError::io(path, e))?;

    info!(
        "Loaded GPS trace {}: {} fixes ({} errors)",
        path.display(),
        report.accepted,
        report.errors
    );
    Ok((trace, report))
}

/// Parse CAN trace text from any buffered reader
pub fn parse_can_trace<R: BufRead>(reader: R) -> std::io::Result<(CanTrace, LoadReport)> {
    let mut trace = CanTrace::new();
    let mut report = LoadReport::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        report.lines += 1;

        match parse_can_line(&line, index + 1) {
            Ok(Some(frame)) => {
                trace.push(frame);
                report.accepted += 1;
            }
            Ok(None) => report.skipped += 1,
            Err(e) => {
                debug!("Skipping CAN line: {}", e);
                report.errors += 1;
            }
        }
    }

    Ok((trace, report))
}

/// Parse one CAN trace line.
///
/// Returns `Ok(None)` for lines that carry no known frame, and an error for
/// lines that look like a frame but have a bad timestamp or payload.
pub fn parse_can_line(line: &str, line_no: usize) -> Result<Option<CanFrame>, TraceError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(';') {
        return Ok(None);
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(pos) = (1..tokens.len()).find(|&i| is_frame_header(&tokens, i)) else {
        return Ok(None);
    };

    let id = tokens[pos];
    if !is_known_id(id) {
        return Ok(None);
    }

    let timestamp_ms = tokens[1]
        .parse::<f64>()
        .ok()
        .filter(|&ms| offset_duration(ms).is_some())
        .ok_or_else(|| TraceError::parse(line_no, format!("invalid timestamp '{}'", tokens[1])))?;

    let payload = tokens[pos + 2..pos + 2 + PAYLOAD_BYTES].concat();
    CanFrame::decode(id, &payload, timestamp_ms)
        .map(Some)
        .map_err(|e| TraceError::parse(line_no, e))
}

/// `<ID:4> 8 <b0:2> ... <b7:2>` starting at token `i`
fn is_frame_header(tokens: &[&str], i: usize) -> bool {
    let is_word = |t: &str, len: usize| {
        t.len() == len && t.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    is_word(tokens[i], 4)
        && tokens.get(i + 1) == Some(&FRAME_DLC)
        && tokens.len() >= i + 2 + PAYLOAD_BYTES
        && tokens[i + 2..i + 2 + PAYLOAD_BYTES]
            .iter()
            .all(|t| is_word(t, 2))
}

/// Parse GPS CSV text (`latitude,longitude[;]`, no header)
pub fn parse_gps_trace<R: Read>(reader: R) -> std::io::Result<(GpsTrace, LoadReport)> {
    let mut trace = GpsTrace::new();
    let mut report = LoadReport::default();

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    for result in csv_reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                warn!("Skipping malformed GPS record: {}", e);
                report.lines += 1;
                report.errors += 1;
                continue;
            }
        };
        report.lines += 1;

        if record.len() < 2 {
            report.skipped += 1;
            continue;
        }

        let latitude = record[0].parse::<f64>();
        let longitude = record[1].trim_end_matches(';').trim().parse::<f64>();
        match (latitude, longitude) {
            (Ok(lat), Ok(lon)) => {
                // Offsets follow accepted fixes, not raw line numbers
                trace.push(GpsFix::from_index(trace.len(), lat, lon));
                report.accepted += 1;
            }
            _ => {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                warn!("Error parsing GPS line {}: {:?}", line, record);
                report.errors += 1;
            }
        }
    }

    Ok((trace, report))
}
