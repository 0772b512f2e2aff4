//! Road Segmentation
//!
//! Classifies live vehicle dynamics into straight and curve segments and
//! derives their geometry:
//! - Sliding-window classifier with debounce
//! - Per-segment statistics and heading-based curve angle
//! - Haversine length and forward bearing
//! - Persistent segment library

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod geo;
pub mod library;
pub mod segment;

pub use aggregator::SegmentAggregator;
pub use classifier::SegmentClassifier;
pub use config::ClassifierConfig;
pub use geo::{bearing_deg, haversine_m, normalize_delta, GeoPoint, EARTH_RADIUS_M};
pub use library::{LibraryError, LibrarySummary, SegmentLibrary};
pub use segment::{CurveDirection, OpenSegment, Segment, SegmentType, Tick};
