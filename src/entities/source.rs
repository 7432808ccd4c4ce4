//! Source resolution: logical animation id → scene file + named segments
//!
//! Container formats (dotLottie archives, manifests) live outside this crate;
//! they plug in through [`SourceResolver`]. [`FileResolver`] is the plain
//! case: the id is a path (optionally under a root directory) and named
//! segments come from the scene's own `markers` array.
//!
//! Marker units: `tm`/`dr` are read as frames. Some exporters write seconds;
//! that ambiguity is left to the resolver implementation.

use log::debug;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::scene::{LoadError, Segment};

/// Top-level fields of a Lottie document used by the player
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LottieHeader {
    /// Width
    pub w: f32,
    /// Height
    pub h: f32,
    /// Frame rate
    pub fr: f32,
    /// In point (frames)
    pub ip: f32,
    /// Out point (frames)
    pub op: f32,
    pub markers: Vec<LottieMarker>,
}

impl Default for LottieHeader {
    fn default() -> Self {
        Self {
            w: 0.0,
            h: 0.0,
            fr: 60.0,
            ip: 0.0,
            op: 0.0,
            markers: Vec::new(),
        }
    }
}

/// Named timeline marker (`cm` comment or `n` name, `tm` start, `dr` length)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LottieMarker {
    pub cm: Option<String>,
    pub n: Option<String>,
    pub tm: f32,
    pub dr: f32,
}

impl LottieMarker {
    pub fn name(&self) -> Option<&str> {
        self.cm.as_deref().or(self.n.as_deref())
    }

    pub fn segment(&self) -> Segment {
        Segment::new(self.tm, self.tm + self.dr)
    }
}

impl LottieHeader {
    /// Read and parse the header of a Lottie JSON file
    pub fn read(path: &Path) -> Result<Self, LoadError> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => LoadError::NotFound(path.to_path_buf()),
            _ => LoadError::Io(format!("{}: {}", path.display(), e)),
        })?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, LoadError> {
        serde_json::from_slice(bytes).map_err(|e| LoadError::Parse(e.to_string()))
    }

    /// Frame count between in and out points
    pub fn total_frames(&self) -> f32 {
        (self.op - self.ip).max(0.0)
    }

    /// Duration in seconds
    pub fn duration(&self) -> f32 {
        if self.fr > 0.0 {
            self.total_frames() / self.fr
        } else {
            0.0
        }
    }

    /// Marker name → frame range (first occurrence wins)
    pub fn marker_segments(&self) -> HashMap<String, Segment> {
        let mut out = HashMap::new();
        for marker in &self.markers {
            if let Some(name) = marker.name() {
                out.entry(name.to_string()).or_insert_with(|| marker.segment());
            }
        }
        out
    }
}

/// A resolved animation source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSource {
    /// Concrete scene file
    pub path: PathBuf,
    /// Named segments (marker / state name → frame range)
    pub markers: HashMap<String, Segment>,
}

/// Maps logical animation ids to scene files
pub trait SourceResolver: Send + Sync {
    fn resolve(&self, id: &str) -> Result<ResolvedSource, LoadError>;
}

/// Treats ids as filesystem paths, optionally relative to a root
#[derive(Debug, Clone, Default)]
pub struct FileResolver {
    root: Option<PathBuf>,
}

impl FileResolver {
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Resolve relative ids against `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: Some(root.into()) }
    }
}

impl SourceResolver for FileResolver {
    fn resolve(&self, id: &str) -> Result<ResolvedSource, LoadError> {
        if id.trim().is_empty() {
            return Err(LoadError::EmptyPath);
        }
        let raw = PathBuf::from(id);
        let path = match &self.root {
            Some(root) if raw.is_relative() => root.join(raw),
            _ => raw,
        };
        if !path.exists() {
            return Err(LoadError::NotFound(path));
        }

        // Markers are optional: a scene the header parser can't read may
        // still be loadable by the engine.
        let markers = match LottieHeader::read(&path) {
            Ok(header) => header.marker_segments(),
            Err(e) => {
                debug!("No markers for {}: {}", path.display(), e);
                HashMap::new()
            }
        };

        Ok(ResolvedSource { path, markers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "v": "5.7.0", "fr": 30, "ip": 0, "op": 90, "w": 320, "h": 240,
        "layers": [],
        "markers": [
            {"cm": "intro", "tm": 0, "dr": 30},
            {"n": "loop", "tm": 30, "dr": 45},
            {"cm": "blip", "tm": 80, "dr": 0}
        ]
    }"#;

    #[test]
    fn test_header_parse() {
        let header = LottieHeader::parse(DOC.as_bytes()).unwrap();
        assert_eq!(header.w, 320.0);
        assert_eq!(header.total_frames(), 90.0);
        assert!((header.duration() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_marker_segments() {
        let header = LottieHeader::parse(DOC.as_bytes()).unwrap();
        let markers = header.marker_segments();
        assert_eq!(markers["intro"], Segment::new(0.0, 30.0));
        assert_eq!(markers["loop"], Segment::new(30.0, 75.0));
        // zero duration -> one frame
        assert_eq!(markers["blip"], Segment { begin: 80.0, end: 81.0 });
    }

    #[test]
    fn test_header_parse_error() {
        assert!(matches!(LottieHeader::parse(b"not json"), Err(LoadError::Parse(_))));
    }

    #[test]
    fn test_file_resolver() {
        let dir = std::env::temp_dir().join(format!("lotta_resolver_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("anim.json"), DOC).unwrap();

        let resolver = FileResolver::with_root(&dir);
        let src = resolver.resolve("anim.json").unwrap();
        assert_eq!(src.path, dir.join("anim.json"));
        assert_eq!(src.markers.len(), 3);

        assert!(matches!(resolver.resolve("missing.json"), Err(LoadError::NotFound(_))));
        assert!(matches!(resolver.resolve("  "), Err(LoadError::EmptyPath)));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
