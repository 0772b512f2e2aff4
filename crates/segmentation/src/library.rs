//! Recorded segment library
//!
//! Built during a recording run and read by the curve warning assist on
//! later runs. Persisted as JSON.

use crate::geo::{haversine_m, GeoPoint};
use crate::segment::{Segment, SegmentType};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Library persistence errors
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Failed to access segment library {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid segment library format: {0}")]
    Format(#[from] serde_json::Error),
}

/// Segment counts by type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LibrarySummary {
    pub straights: usize,
    pub curves: usize,
}

/// Ordered collection of closed segments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentLibrary {
    segments: Vec<Segment>,
}

impl SegmentLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a closed segment
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    /// Straight segments in recording order
    pub fn straights(&self) -> impl Iterator<Item = &Segment> {
        self.of_type(SegmentType::Straight)
    }

    /// Curve segments in recording order
    pub fn curves(&self) -> impl Iterator<Item = &Segment> {
        self.of_type(SegmentType::Curve)
    }

    pub fn summary(&self) -> LibrarySummary {
        LibrarySummary {
            straights: self.straights().count(),
            curves: self.curves().count(),
        }
    }

    /// Nearest segment that starts after `time_ms`, with its distance (m).
    ///
    /// Segments are recorded in drive order, so a later start time stands in
    /// for "ahead of the vehicle".
    pub fn find_nearest_upcoming(
        &self,
        position: GeoPoint,
        time_ms: f64,
    ) -> Option<(&Segment, f64)> {
        self.segments
            .iter()
            .filter(|segment| segment.start_time_ms > time_ms)
            .map(|segment| (segment, haversine_m(position, segment.start_position)))
            .fold(None, |best: Option<(&Segment, f64)>, candidate| match best {
                Some((_, best_distance)) if best_distance <= candidate.1 => best,
                _ => Some(candidate),
            })
    }

    /// Write the library as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LibraryError> {
        let path = path.as_ref();
        let io_error = |source| LibraryError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush().map_err(io_error)?;

        info!("Saved {} segments to {}", self.len(), path.display());
        Ok(())
    }

    /// Read a library written by [`SegmentLibrary::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LibraryError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LibraryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let library: Self = serde_json::from_reader(BufReader::new(file))?;

        info!("Loaded {} segments from {}", library.len(), path.display());
        Ok(library)
    }

    fn of_type(&self, segment_type: SegmentType) -> impl Iterator<Item = &Segment> {
        self.segments
            .iter()
            .filter(move |segment| segment.segment_type == segment_type)
    }
}

impl FromIterator<Segment> for SegmentLibrary {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{OpenSegment, Tick};

    fn segment(segment_type: SegmentType, start_ms: f64, lat: f64) -> Segment {
        let tick = Tick {
            time_ms: start_ms,
            position: GeoPoint::new(lat, 11.0),
            heading_deg: Some(0.0),
            speed_kmh: Some(25.0),
            yaw_rate_dps: 3.0,
            long_accel: None,
            lat_accel: None,
        };
        OpenSegment::open(segment_type, &tick).finalize(
            start_ms + 1000.0,
            GeoPoint::new(lat + 0.001, 11.0),
            Some(30.0),
        )
    }

    fn library() -> SegmentLibrary {
        [
            segment(SegmentType::Straight, 0.0, 48.000),
            segment(SegmentType::Curve, 5000.0, 48.010),
            segment(SegmentType::Straight, 10_000.0, 48.020),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_summary_and_filters() {
        let library = library();
        assert_eq!(library.summary(), LibrarySummary { straights: 2, curves: 1 });
        assert_eq!(library.curves().count(), 1);
        assert!(library.straights().all(|s| s.segment_type == SegmentType::Straight));
    }

    #[test]
    fn test_nearest_upcoming_skips_past_segments() {
        let library = library();

        // Standing on the first segment's start but past its start time
        let (nearest, _) = library
            .find_nearest_upcoming(GeoPoint::new(48.0, 11.0), 1000.0)
            .unwrap();
        assert_eq!(nearest.start_time_ms, 5000.0);

        let (nearest, distance) = library
            .find_nearest_upcoming(GeoPoint::new(48.019, 11.0), 1000.0)
            .unwrap();
        assert_eq!(nearest.start_time_ms, 10_000.0);
        assert!((distance - 111.19).abs() < 0.1);

        assert!(library.find_nearest_upcoming(GeoPoint::new(48.0, 11.0), 10_000.0).is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segments.json");

        let library = library();
        library.save(&path).unwrap();
        let loaded = SegmentLibrary::load(&path).unwrap();

        assert_eq!(loaded.len(), library.len());
        assert_eq!(loaded.summary(), library.summary());
        for (a, b) in loaded.iter().zip(library.iter()) {
            assert_eq!(a.segment_type, b.segment_type);
            assert_eq!(a.start_time_ms, b.start_time_ms);
            assert_eq!(a.direction, b.direction);
            assert!((a.length_m - b.length_m).abs() < 1e-6);
            assert_eq!(a.path.len(), b.path.len());
        }
    }

    #[test]
    fn test_load_missing_file() {
        let err = SegmentLibrary::load("/nonexistent/segments.json").unwrap_err();
        assert!(matches!(err, LibraryError::Io { .. }));
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(SegmentLibrary::load(&path), Err(LibraryError::Format(_))));
    }
}
