//! On-disk project bundle.
//!
//! A project is a directory holding `project.json` (metadata plus the full
//! [`TimelineState`]), a `sources/` folder for imported media and an
//! `exports/` folder for rendered files.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use splice_common::config::TimelineDefaults;
use splice_common::ids::{IdGenerator, IdKind, UuidIds};
use tracing::{debug, info};

use crate::state::TimelineState;

/// Current schema version written by [`LoadedProject::save`].
pub const PROJECT_SCHEMA_VERSION: &str = "1.0";

pub const PROJECT_FILE_NAME: &str = "project.json";
pub const SOURCES_DIR: &str = "sources";
pub const EXPORTS_DIR: &str = "exports";

/// Top-level project file (`project.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    /// Schema version.
    pub version: String,

    pub name: String,

    /// Unique project identifier (UUID).
    pub id: String,

    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,

    /// The editable timeline.
    pub state: TimelineState,
}

impl ProjectFile {
    pub fn new(name: impl Into<String>, state: TimelineState) -> Self {
        let now = Utc::now();
        Self {
            version: PROJECT_SCHEMA_VERSION.to_string(),
            name: name.into(),
            id: UuidIds.next_id(IdKind::Project),
            created_at: now,
            modified_at: now,
            state,
        }
    }
}

/// A project file together with the directory it lives in.
#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub root: PathBuf,
    pub project: ProjectFile,
}

impl LoadedProject {
    /// Create a new project directory with an empty timeline.
    pub fn create(
        root: impl AsRef<Path>,
        name: impl Into<String>,
        defaults: &TimelineDefaults,
    ) -> Result<Self, ProjectError> {
        let root = root.as_ref().to_path_buf();

        for subdir in [SOURCES_DIR, EXPORTS_DIR] {
            let dir = root.join(subdir);
            std::fs::create_dir_all(&dir).map_err(|e| ProjectError::IoError {
                path: dir.clone(),
                source: e,
            })?;
        }

        let mut loaded = Self {
            root,
            project: ProjectFile::new(name, TimelineState::from_defaults(defaults)),
        };
        loaded.save()?;
        info!(root = %loaded.root.display(), id = %loaded.project.id, "Project created");
        Ok(loaded)
    }

    /// Load a project from its directory.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let root = root.as_ref().to_path_buf();
        let path = root.join(PROJECT_FILE_NAME);

        let json = std::fs::read_to_string(&path).map_err(|e| ProjectError::IoError {
            path: path.clone(),
            source: e,
        })?;
        let project: ProjectFile =
            serde_json::from_str(&json).map_err(|e| ProjectError::ParseError {
                path: path.clone(),
                source: e,
            })?;

        if major_version(&project.version) != major_version(PROJECT_SCHEMA_VERSION) {
            return Err(ProjectError::ValidationError {
                message: format!(
                    "unsupported project version {} (expected {PROJECT_SCHEMA_VERSION})",
                    project.version
                ),
            });
        }

        debug!(path = %path.display(), clips = project.state.clips.len(), "Project loaded");
        Ok(Self { root, project })
    }

    /// Write `project.json`, stamping the modification time.
    pub fn save(&mut self) -> Result<(), ProjectError> {
        std::fs::create_dir_all(&self.root).map_err(|e| ProjectError::IoError {
            path: self.root.clone(),
            source: e,
        })?;

        self.project.modified_at = Utc::now();
        let path = self.project_path();
        let json =
            serde_json::to_string_pretty(&self.project).map_err(|e| ProjectError::ParseError {
                path: path.clone(),
                source: e,
            })?;
        std::fs::write(&path, json).map_err(|e| ProjectError::IoError { path, source: e })
    }

    pub fn project_path(&self) -> PathBuf {
        self.root.join(PROJECT_FILE_NAME)
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.root.join(EXPORTS_DIR)
    }

    /// Resolve an asset locator to a local path, see [`resolve_locator`].
    pub fn local_path(&self, locator: &str) -> Option<PathBuf> {
        resolve_locator(Some(&self.root), locator)
    }

    /// Report local sources that are missing and clips with dangling
    /// references. An empty list means the project is exportable.
    pub fn validate_sources(&self) -> Vec<String> {
        let state = &self.project.state;
        let mut errors = vec![];

        for asset in &state.assets {
            if let Some(path) = self.local_path(&asset.source_locator) {
                if !path.exists() {
                    errors.push(format!(
                        "Asset {} source missing: {}",
                        asset.id, asset.source_locator
                    ));
                }
            }
        }

        for clip in &state.clips {
            if let Some(asset_id) = &clip.asset_id {
                if state.asset(asset_id).is_none() {
                    errors.push(format!("Clip {} references unknown asset {asset_id}", clip.id));
                }
            }
            if state.track(clip.track_id).is_none() {
                errors.push(format!(
                    "Clip {} references unknown track {}",
                    clip.id, clip.track_id
                ));
            }
        }

        errors
    }
}

/// Resolve a local path or `file://` locator. Relative paths, with or
/// without the scheme, are taken from `base` when given. Other URL schemes
/// return `None`.
pub fn resolve_locator(base: Option<&Path>, locator: &str) -> Option<PathBuf> {
    let raw = match locator.strip_prefix("file://") {
        Some(path) => path,
        None if locator.contains("://") => return None,
        None => locator,
    };
    let path = Path::new(raw);
    Some(match base {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    })
}

fn major_version(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

/// Errors that can occur when working with projects.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid project: {message}")]
    ValidationError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssetKind, Clip, ClipKind, MediaAsset};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("splice_test_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_project_file_roundtrips_state() {
        let mut state = TimelineState::default();
        state.clips.push(Clip::new("c1", ClipKind::Text, 3, 1.0, 2.0));
        let project = ProjectFile::new("Demo", state);

        let json = serde_json::to_string(&project).unwrap();
        let parsed: ProjectFile = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, project);
        assert_eq!(parsed.version, PROJECT_SCHEMA_VERSION);
    }

    #[test]
    fn test_create_and_load() {
        let dir = scratch_dir("create");

        let created = LoadedProject::create(&dir, "Trailer", &TimelineDefaults::default()).unwrap();
        assert!(dir.join(SOURCES_DIR).is_dir());
        assert!(dir.join(EXPORTS_DIR).is_dir());

        let loaded = LoadedProject::load(&dir).unwrap();
        assert_eq!(loaded.project.name, "Trailer");
        assert_eq!(loaded.project.id, created.project.id);
        assert_eq!(loaded.project.state.tracks.len(), 5);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_project_is_io_error() {
        let dir = scratch_dir("missing");
        let err = LoadedProject::load(&dir).unwrap_err();
        assert!(matches!(err, ProjectError::IoError { .. }));
    }

    #[test]
    fn test_load_rejects_future_major_version() {
        let dir = scratch_dir("version");
        let mut loaded = LoadedProject::create(&dir, "Old", &TimelineDefaults::default()).unwrap();
        loaded.project.version = "2.0".to_string();
        let json = serde_json::to_string(&loaded.project).unwrap();
        std::fs::write(loaded.project_path(), json).unwrap();

        let err = LoadedProject::load(&dir).unwrap_err();
        assert!(matches!(err, ProjectError::ValidationError { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_validate_sources_reports_missing_and_dangling() {
        let dir = scratch_dir("validate");
        let mut loaded = LoadedProject::create(&dir, "Check", &TimelineDefaults::default()).unwrap();
        std::fs::write(dir.join(SOURCES_DIR).join("present.mp4"), b"x").unwrap();

        let state = &mut loaded.project.state;
        state.assets = vec![
            MediaAsset::new("a1", "sources/present.mp4", AssetKind::Video, 3.0, "present"),
            MediaAsset::new("a2", "sources/absent.mp4", AssetKind::Video, 3.0, "absent"),
            MediaAsset::new("a3", "https://cdn.example/clip.mp4", AssetKind::Video, 3.0, "remote"),
        ];
        state.clips = vec![
            Clip::new("c1", ClipKind::Video, 1, 0.0, 1.0).with_asset("a1"),
            Clip::new("c2", ClipKind::Video, 1, 2.0, 1.0).with_asset("ghost"),
            Clip::new("c3", ClipKind::Text, 77, 0.0, 1.0),
        ];

        let errors = loaded.validate_sources();
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("a2 source missing")));
        assert!(errors.iter().any(|e| e.contains("unknown asset ghost")));
        assert!(errors.iter().any(|e| e.contains("unknown track 77")));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_local_path_resolution() {
        let loaded = LoadedProject {
            root: PathBuf::from("/projects/demo"),
            project: ProjectFile::new("Demo", TimelineState::default()),
        };
        assert_eq!(
            loaded.local_path("sources/a.mp4"),
            Some(PathBuf::from("/projects/demo/sources/a.mp4"))
        );
        assert_eq!(
            loaded.local_path("file:///media/b.wav"),
            Some(PathBuf::from("/media/b.wav"))
        );
        assert_eq!(loaded.local_path("https://cdn.example/c.mp4"), None);
    }

    #[test]
    fn test_relative_file_url_is_rooted_at_project() {
        let loaded = LoadedProject {
            root: PathBuf::from("/projects/demo"),
            project: ProjectFile::new("Demo", TimelineState::default()),
        };
        assert_eq!(
            loaded.local_path("file://sources/a.mp4"),
            Some(PathBuf::from("/projects/demo/sources/a.mp4"))
        );
    }

    #[test]
    fn test_resolve_locator_without_base() {
        assert_eq!(
            resolve_locator(None, "file://clips/a.mp4"),
            Some(PathBuf::from("clips/a.mp4"))
        );
        assert_eq!(
            resolve_locator(None, "/abs/b.wav"),
            Some(PathBuf::from("/abs/b.wav"))
        );
        assert_eq!(
            resolve_locator(Some(Path::new("/root")), "file:///abs/b.wav"),
            Some(PathBuf::from("/abs/b.wav"))
        );
        assert_eq!(resolve_locator(Some(Path::new("/root")), "s3://bucket/c"), None);
    }
}
