use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{ClipfitError, Result};
use crate::job::{MediaFile, MediaKind};

const VIDEO_EXTENSIONS: [&str; 12] = [
    "mp4", "avi", "mov", "mkv", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "3gp", "ts",
];

/// Classify a file name by its extension.
pub fn media_kind(name: &str) -> MediaKind {
    let is_video = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false);

    if is_video {
        MediaKind::Video
    } else {
        MediaKind::Other
    }
}

/// Expand the given paths into a flat, ordered file list.
///
/// Files are kept in the order given; directories are walked
/// recursively in sorted order and contribute every regular file.
pub fn expand_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                files.push(entry.into_path());
            }
        } else if path.is_file() {
            files.push(path.to_path_buf());
        } else {
            return Err(ClipfitError::FileNotFound(path.display().to_string()));
        }
    }

    Ok(files)
}

/// Load one file from disk as a batch input.
pub async fn load_media<P: AsRef<Path>>(path: P) -> Result<MediaFile> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .ok_or_else(|| ClipfitError::FileNotFound(path.display().to_string()))?
        .to_string_lossy()
        .to_string();

    let bytes = fs::read(path).await?;
    let kind = media_kind(&name);
    debug!("Loaded {} ({} bytes, {:?})", path.display(), bytes.len(), kind);

    Ok(MediaFile::new(name, bytes, kind))
}

/// One batch input. Files on disk are only read when their job starts,
/// so a batch holds at most one input's bytes at a time.
#[derive(Debug)]
pub enum MediaInput {
    Path(PathBuf),
    Loaded(MediaFile),
}

impl MediaInput {
    /// Name reported for this input, available before it is read.
    pub fn name(&self) -> String {
        match self {
            MediaInput::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            MediaInput::Loaded(file) => file.name.clone(),
        }
    }

    pub async fn load(self) -> Result<MediaFile> {
        match self {
            MediaInput::Path(path) => load_media(&path).await,
            MediaInput::Loaded(file) => Ok(file),
        }
    }
}

impl From<PathBuf> for MediaInput {
    fn from(path: PathBuf) -> Self {
        MediaInput::Path(path)
    }
}

impl From<MediaFile> for MediaInput {
    fn from(file: MediaFile) -> Self {
        MediaInput::Loaded(file)
    }
}

/// Expand paths into pending inputs, preserving order. Nothing is read yet.
pub fn pending_media<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<MediaInput>> {
    let files = expand_paths(paths)?;
    info!("Found {} input files", files.len());
    Ok(files.into_iter().map(MediaInput::Path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_media_kind() {
        assert_eq!(media_kind("clip.mov"), MediaKind::Video);
        assert_eq!(media_kind("CLIP.MP4"), MediaKind::Video);
        assert_eq!(media_kind("notes.txt"), MediaKind::Other);
        assert_eq!(media_kind("clipnoext"), MediaKind::Other);
    }

    #[tokio::test]
    async fn test_pending_media_keeps_order_and_walks_dirs() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("b.mov").write_binary(b"bb").unwrap();
        temp.child("dir/a.mp4").write_binary(b"a").unwrap();
        temp.child("dir/z.txt").write_str("z").unwrap();

        let inputs = pending_media(&[temp.path().join("b.mov"), temp.path().join("dir")]).unwrap();

        let names: Vec<_> = inputs.iter().map(MediaInput::name).collect();
        assert_eq!(names, vec!["b.mov", "a.mp4", "z.txt"]);

        let mut media = Vec::new();
        for input in inputs {
            media.push(input.load().await.unwrap());
        }
        assert_eq!(media[0].bytes, b"bb");
        assert_eq!(media[1].kind, MediaKind::Video);
        assert_eq!(media[2].kind, MediaKind::Other);
    }

    #[tokio::test]
    async fn test_path_input_is_read_at_load_time() {
        let temp = assert_fs::TempDir::new().unwrap();
        let clip = temp.child("clip.mov");
        clip.write_binary(b"old").unwrap();

        let input = MediaInput::from(clip.path().to_path_buf());
        clip.write_binary(b"replaced").unwrap();

        let file = input.load().await.unwrap();
        assert_eq!(file.bytes, b"replaced");
        assert_eq!(file.name, "clip.mov");
    }

    #[tokio::test]
    async fn test_vanished_path_fails_at_load_time() {
        let temp = assert_fs::TempDir::new().unwrap();
        let input = MediaInput::from(temp.path().join("gone.mov"));

        assert_eq!(input.name(), "gone.mov");
        assert!(input.load().await.is_err());
    }

    #[test]
    fn test_missing_path_is_reported() {
        let err = expand_paths(&["/definitely/not/here.mov"]).unwrap_err();
        assert!(matches!(err, ClipfitError::FileNotFound(_)));
    }
}
