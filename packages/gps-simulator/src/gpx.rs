//! gpx.rs — GPX 1.1 track files
//!
//! Reading: the first `<trk>` with points wins (its segments concatenated);
//! otherwise the first `<rte>` with points. Elements the simulator has no use
//! for (metadata, waypoints, extensions) are ignored.
//!
//! Writing: `TrackRecorder` keeps every point in memory and rewrites the whole
//! document on each flush, so the file on disk is always a complete GPX file.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gps_types::TrackPoint;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GpxError;

const GPX_VERSION: &str = "1.1";
const GPX_CREATOR: &str = "gps-simulator";
const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";
const TRACK_NAME: &str = "GPS Simulator Track";
const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

// ── Document shape ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct GpxDoc {
    #[serde(rename = "@version", default)]
    version: String,
    #[serde(rename = "@creator", default)]
    creator: String,
    #[serde(rename = "@xmlns", default)]
    xmlns: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    trk: Vec<Trk>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    rte: Vec<Rte>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Trk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    trkseg: Vec<Seg>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Seg {
    #[serde(default)]
    trkpt: Vec<GpxPoint>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Rte {
    #[serde(default)]
    rtept: Vec<GpxPoint>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GpxPoint {
    #[serde(rename = "@lat")]
    lat: f64,
    #[serde(rename = "@lon")]
    lon: f64,
    #[serde(default)]
    ele: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time: Option<DateTime<Utc>>,
}

impl From<GpxPoint> for TrackPoint {
    fn from(p: GpxPoint) -> Self {
        TrackPoint::new(p.lat, p.lon, p.ele, p.time)
    }
}

impl From<&TrackPoint> for GpxPoint {
    fn from(p: &TrackPoint) -> Self {
        GpxPoint { lat: p.lat, lon: p.lon, ele: p.elevation, time: p.time }
    }
}

// ── Reading ───────────────────────────────────────────────────────────────────

/// Parse GPX text. `origin` is only used in error messages.
pub fn parse_track(xml: &str, origin: &Path) -> Result<Vec<TrackPoint>, GpxError> {
    let doc: GpxDoc = quick_xml::de::from_str(xml).map_err(|e| GpxError::Parse {
        path: origin.to_path_buf(),
        reason: e.to_string(),
    })?;

    let from_track = doc
        .trk
        .into_iter()
        .map(|trk| trk.trkseg.into_iter().flat_map(|seg| seg.trkpt).collect::<Vec<_>>())
        .find(|points| !points.is_empty());

    let points = match from_track {
        Some(points) => points,
        None => doc
            .rte
            .into_iter()
            .map(|rte| rte.rtept)
            .find(|points| !points.is_empty())
            .ok_or_else(|| GpxError::NoPoints(origin.to_path_buf()))?,
    };

    Ok(points.into_iter().map(TrackPoint::from).collect())
}

pub fn read_track(path: &Path) -> Result<Vec<TrackPoint>, GpxError> {
    let xml = std::fs::read_to_string(path).map_err(|source| GpxError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let points = parse_track(&xml, path)?;
    info!("Loaded {} points from {}", points.len(), path.display());
    Ok(points)
}

// ── Writing ───────────────────────────────────────────────────────────────────

/// Render a complete GPX document holding one track segment.
pub fn render_track(points: &[TrackPoint]) -> Result<String, GpxError> {
    let doc = GpxDoc {
        version: GPX_VERSION.to_string(),
        creator: GPX_CREATOR.to_string(),
        xmlns: GPX_NAMESPACE.to_string(),
        trk: vec![Trk {
            name: Some(TRACK_NAME.to_string()),
            trkseg: vec![Seg { trkpt: points.iter().map(GpxPoint::from).collect() }],
        }],
        rte: Vec::new(),
    };

    let mut body = String::new();
    let mut ser = quick_xml::se::Serializer::with_root(&mut body, Some("gpx"))
        .map_err(|e| GpxError::Encode(e.to_string()))?;
    ser.indent(' ', 2);
    doc.serialize(ser).map_err(|e| GpxError::Encode(e.to_string()))?;

    Ok(format!("{XML_DECLARATION}{body}\n"))
}

/// Write `points` as a fresh GPX file.
pub fn write_track(path: &Path, points: &[TrackPoint]) -> Result<(), GpxError> {
    let xml = render_track(points)?;
    std::fs::write(path, xml).map_err(|source| GpxError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Records the simulated track to a GPX file while the simulator runs.
#[derive(Debug)]
pub struct TrackRecorder {
    path: PathBuf,
    file: File,
    points: Vec<TrackPoint>,
}

impl TrackRecorder {
    /// Points between automatic flushes.
    pub const FLUSH_EVERY: usize = 10;

    /// Create (or truncate) the output file up front so an unwritable path
    /// fails at construction rather than mid-run.
    pub fn create(path: &Path) -> Result<Self, GpxError> {
        let file = File::create(path).map_err(|source| GpxError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Recording track to {}", path.display());
        Ok(Self { path: path.to_path_buf(), file, points: Vec::new() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Append a point; rewrites the file every `FLUSH_EVERY` points.
    pub fn record(&mut self, point: TrackPoint) -> Result<(), GpxError> {
        self.points.push(point);
        if self.points.len() % Self::FLUSH_EVERY == 0 {
            self.flush()?;
        }
        Ok(())
    }

    /// Rewrite the file with every point recorded so far.
    pub fn flush(&mut self) -> Result<(), GpxError> {
        let xml = render_track(&self.points)?;
        let io_err = |source| GpxError::Io { path: self.path.clone(), source };

        self.file.set_len(0).map_err(io_err)?;
        self.file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        self.file.write_all(xml.as_bytes()).map_err(io_err)?;
        self.file.sync_data().map_err(io_err)?;

        debug!("Track flushed: {} points → {}", self.points.len(), self.path.display());
        Ok(())
    }
}
