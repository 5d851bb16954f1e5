use crate::error::HistoryError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default upload history file name
pub const DEFAULT_HISTORY_FILE: &str = "upload_history.json";

/// One post attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub account: String,
    pub video: String,
    /// Unix seconds
    pub uploaded_at: u64,
    pub success: bool,
    #[serde(default)]
    pub sandbox: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_id: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    uploads: Vec<HistoryEntry>,
}

/// Append-only log of post attempts, stored as `{ "uploads": [...] }`
#[derive(Debug, Clone)]
pub struct UploadHistory {
    path: PathBuf,
}

impl UploadHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, oldest first. A missing file is an empty history.
    pub fn load(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(HistoryError::Io {
                    path: self.path.display().to_string(),
                    source,
                });
            }
        };

        let file: HistoryFile =
            serde_json::from_str(&content).map_err(|source| HistoryError::Parse {
                path: self.path.display().to_string(),
                source,
            })?;
        Ok(file.uploads)
    }

    /// The last `n` entries, newest first
    pub fn recent(&self, n: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut uploads = self.load()?;
        uploads.reverse();
        uploads.truncate(n);
        Ok(uploads)
    }

    pub fn append(&self, entry: HistoryEntry) -> Result<(), HistoryError> {
        let mut uploads = self.load()?;
        uploads.push(entry);

        let content = serde_json::to_string_pretty(&HistoryFile { uploads }).map_err(|source| {
            HistoryError::Parse {
                path: self.path.display().to_string(),
                source,
            }
        })?;
        std::fs::write(&self.path, content).map_err(|source| HistoryError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(video: &str, success: bool) -> HistoryEntry {
        HistoryEntry {
            account: "default".to_string(),
            video: video.to_string(),
            uploaded_at: 1,
            success,
            sandbox: true,
            publish_id: None,
        }
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = UploadHistory::new(dir.path().join(DEFAULT_HISTORY_FILE));
        assert!(history.load().unwrap().is_empty());
        assert!(history.recent(5).unwrap().is_empty());
    }

    #[test]
    fn recent_is_newest_first_and_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let history = UploadHistory::new(dir.path().join(DEFAULT_HISTORY_FILE));
        for i in 0..7 {
            history.append(entry(&format!("v{i}.mp4"), i % 2 == 0)).unwrap();
        }

        assert_eq!(history.load().unwrap().len(), 7);
        let recent = history.recent(5).unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].video, "v6.mp4");
        assert_eq!(recent[4].video, "v2.mp4");
    }

    #[test]
    fn reads_files_written_without_optional_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_HISTORY_FILE);
        std::fs::write(
            &path,
            r#"{"uploads":[{"account":"default","video":"a.mp4","uploaded_at":5,"success":false}]}"#,
        )
        .unwrap();

        let uploads = UploadHistory::new(path).load().unwrap();
        assert_eq!(uploads.len(), 1);
        assert!(!uploads[0].sandbox);
    }
}
