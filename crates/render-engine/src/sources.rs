//! Local asset and font resolution.

use std::path::{Path, PathBuf};

use splice_common::error::SpliceError;
use splice_project_model::{resolve_locator, MediaAsset};

use crate::export::{AssetSource, ExportError, FontSource, ResolvedAsset};

/// Resolves local paths and `file://` locators. Relative paths are taken
/// from `base_dir` (usually the project root).
#[derive(Debug, Clone, Default)]
pub struct FileAssetSource {
    base_dir: Option<PathBuf>,
}

impl FileAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relative_to(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn local_path(&self, locator: &str) -> Option<PathBuf> {
        resolve_locator(self.base_dir.as_deref(), locator)
    }
}

#[async_trait::async_trait]
impl AssetSource for FileAssetSource {
    async fn fetch(&self, asset: &MediaAsset) -> Result<ResolvedAsset, ExportError> {
        let fail = |message: String| ExportError::AssetResolution {
            asset_id: asset.id.clone(),
            message,
        };

        let path = self
            .local_path(&asset.source_locator)
            .ok_or_else(|| fail(format!("unsupported locator {}", asset.source_locator)))?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| fail(format!("{}: {e}", path.display())))?;
        if !metadata.is_file() {
            return Err(fail(format!("{} is not a file", path.display())));
        }

        Ok(ResolvedAsset {
            asset_id: asset.id.clone(),
            path,
            size_bytes: metadata.len(),
        })
    }
}

/// Common system font directories, searched in order.
const FONT_DIRS: &[&str] = &[
    "/usr/share/fonts",
    "/usr/local/share/fonts",
    "/Library/Fonts",
    "/System/Library/Fonts",
    "C:\\Windows\\Fonts",
];

const FONT_EXTENSIONS: &[&str] = &["ttf", "otf", "ttc"];

/// Directory depth searched below each font root.
const MAX_FONT_DEPTH: usize = 4;

/// Resolves fonts from a configured override file, then from the system
/// font directories.
#[derive(Debug, Clone)]
pub struct ConfiguredFontSource {
    override_file: Option<PathBuf>,
    search_dirs: Vec<PathBuf>,
}

impl Default for ConfiguredFontSource {
    fn default() -> Self {
        let mut search_dirs: Vec<PathBuf> = FONT_DIRS.iter().map(PathBuf::from).collect();
        if let Ok(home) = std::env::var("HOME") {
            search_dirs.push(PathBuf::from(&home).join(".fonts"));
            search_dirs.push(PathBuf::from(home).join(".local/share/fonts"));
        }
        Self {
            override_file: None,
            search_dirs,
        }
    }
}

impl ConfiguredFontSource {
    pub fn new(override_file: Option<PathBuf>) -> Self {
        Self {
            override_file,
            ..Self::default()
        }
    }

    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    async fn search(&self, candidates: &[String]) -> Option<PathBuf> {
        for root in &self.search_dirs {
            let mut pending = vec![(root.clone(), 0usize)];
            while let Some((dir, depth)) = pending.pop() {
                let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
                    continue;
                };
                while let Ok(Some(entry)) = entries.next_entry().await {
                    let path = entry.path();
                    let Ok(file_type) = entry.file_type().await else {
                        continue;
                    };
                    if file_type.is_dir() {
                        if depth < MAX_FONT_DEPTH {
                            pending.push((path, depth + 1));
                        }
                    } else if font_matches(&path, candidates) {
                        return Some(path);
                    }
                }
            }
        }
        None
    }
}

#[async_trait::async_trait]
impl FontSource for ConfiguredFontSource {
    async fn resolve(&self, family: &str) -> Result<PathBuf, SpliceError> {
        if let Some(path) = &self.override_file {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Ok(path.clone());
            }
            tracing::warn!(path = %path.display(), "Configured font file missing");
        }

        let candidates = font_candidates(family);
        self.search(&candidates)
            .await
            .ok_or_else(|| SpliceError::font(format!("no font file found for family {family:?}")))
    }
}

/// File stems to look for, normalized: lowercase, no spaces or dashes.
fn font_candidates(family: &str) -> Vec<String> {
    let aliases: &[&str] = match family.trim().to_ascii_lowercase().as_str() {
        "sans-serif" | "sans" => &["DejaVuSans", "LiberationSans-Regular", "Arial", "Helvetica"],
        "serif" => &["DejaVuSerif", "LiberationSerif-Regular", "Times New Roman"],
        "monospace" | "mono" => &["DejaVuSansMono", "LiberationMono-Regular", "Courier New"],
        _ => &[],
    };
    let mut candidates: Vec<String> = aliases.iter().map(|name| normalize(name)).collect();
    if aliases.is_empty() {
        let name = normalize(family);
        candidates.push(format!("{name}regular"));
        candidates.push(name);
    }
    candidates
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn font_matches(path: &Path, candidates: &[String]) -> bool {
    let has_font_ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| FONT_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)));
    if !has_font_ext {
        return false;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(normalize)
        .is_some_and(|stem| candidates.contains(&stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_project_model::AssetKind;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("splice_sources_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_file_source_resolves_relative_and_file_urls() {
        let dir = scratch("assets");
        std::fs::write(dir.join("clip.mp4"), b"12345").unwrap();
        let source = FileAssetSource::relative_to(&dir);

        let relative = MediaAsset::new("a1", "clip.mp4", AssetKind::Video, 1.0, "clip");
        let resolved = source.fetch(&relative).await.unwrap();
        assert_eq!(resolved.path, dir.join("clip.mp4"));
        assert_eq!(resolved.size_bytes, 5);

        let url = format!("file://{}", dir.join("clip.mp4").display());
        let absolute = MediaAsset::new("a2", url, AssetKind::Video, 1.0, "clip");
        assert!(source.fetch(&absolute).await.is_ok());

        let rooted = MediaAsset::new("a3", "file://clip.mp4", AssetKind::Video, 1.0, "clip");
        assert_eq!(source.fetch(&rooted).await.unwrap().path, dir.join("clip.mp4"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_file_source_rejects_missing_and_remote() {
        let source = FileAssetSource::new();
        let missing = MediaAsset::new("a1", "/nonexistent/splice.mp4", AssetKind::Video, 1.0, "x");
        let err = source.fetch(&missing).await.unwrap_err();
        assert!(matches!(err, ExportError::AssetResolution { ref asset_id, .. } if asset_id == "a1"));

        let remote = MediaAsset::new("a2", "https://cdn.example/a.mp4", AssetKind::Video, 1.0, "x");
        assert!(source.fetch(&remote).await.is_err());
    }

    #[tokio::test]
    async fn test_font_search_matches_aliases() {
        let dir = scratch("fonts");
        std::fs::create_dir_all(dir.join("truetype/dejavu")).unwrap();
        std::fs::write(dir.join("truetype/dejavu/DejaVuSans.ttf"), b"font").unwrap();
        std::fs::write(dir.join("Roboto-Regular.otf"), b"font").unwrap();

        let fonts = ConfiguredFontSource::new(None).with_search_dirs(vec![dir.clone()]);
        assert_eq!(
            fonts.resolve("sans-serif").await.unwrap(),
            dir.join("truetype/dejavu/DejaVuSans.ttf")
        );
        assert_eq!(
            fonts.resolve("Roboto").await.unwrap(),
            dir.join("Roboto-Regular.otf")
        );
        assert!(fonts.resolve("Comic Neue").await.is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_font_override_wins() {
        let dir = scratch("override");
        let file = dir.join("brand.ttf");
        std::fs::write(&file, b"font").unwrap();

        let fonts = ConfiguredFontSource::new(Some(file.clone())).with_search_dirs(vec![]);
        assert_eq!(fonts.resolve("anything").await.unwrap(), file);

        std::fs::remove_dir_all(&dir).ok();
    }
}
