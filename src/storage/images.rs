//! On-disk image layout
//!
//! `<root>/<camera>/<period>s/YYYY/MM/DD/<camera>_<unix_ts>.jpg`
//!
//! Writes go to a `.part` file first and are renamed into place, so a
//! half-written snapshot never carries a final name.

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use std::path::{Path, PathBuf};
use tokio::fs;

use super::StorageError;
use crate::config::defaults::MIN_SNAPSHOT_BYTES;
use crate::types::{CameraId, ImageArtifact, IntervalSpec};

#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<camera>/<period>s`
    pub fn interval_dir(&self, camera_safe_name: &str, interval: IntervalSpec) -> PathBuf {
        self.root
            .join(camera_safe_name)
            .join(format!("{}s", interval.period_secs()))
    }

    /// Directory holding one day's images of one camera and interval.
    pub fn day_dir(&self, camera_safe_name: &str, interval: IntervalSpec, date: NaiveDate) -> PathBuf {
        self.interval_dir(camera_safe_name, interval)
            .join(date.format("%Y").to_string())
            .join(date.format("%m").to_string())
            .join(date.format("%d").to_string())
    }

    pub fn image_path(&self, camera: &CameraId, interval: IntervalSpec, unix_secs: u64) -> PathBuf {
        let safe = camera.safe_name();
        let date = local_time(unix_secs).date_naive();
        self.day_dir(&safe, interval, date)
            .join(format!("{safe}_{unix_secs}.jpg"))
    }

    /// Validate and store a fresh snapshot.
    pub async fn save(
        &self,
        camera: &CameraId,
        interval: IntervalSpec,
        unix_secs: u64,
        bytes: &[u8],
    ) -> Result<ImageArtifact, StorageError> {
        if bytes.len() < MIN_SNAPSHOT_BYTES {
            return Err(StorageError::TooSmall(bytes.len()));
        }
        let path = self.image_path(camera, interval, unix_secs);
        let tmp = prepare(&path).await?;
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| StorageError::Io(tmp.clone(), e))?;
        finish(&tmp, &path).await?;

        Ok(ImageArtifact {
            path,
            bytes: bytes.len() as u64,
        })
    }

    /// Copy a donor interval's image into `interval`'s layout.
    pub async fn copy_from(
        &self,
        source: &ImageArtifact,
        camera: &CameraId,
        interval: IntervalSpec,
        unix_secs: u64,
    ) -> Result<ImageArtifact, StorageError> {
        let path = self.image_path(camera, interval, unix_secs);
        let tmp = prepare(&path).await?;
        let bytes = fs::copy(&source.path, &tmp)
            .await
            .map_err(|e| StorageError::Io(source.path.clone(), e))?;
        finish(&tmp, &path).await?;
        Ok(ImageArtifact { path, bytes })
    }

    /// Camera directory names present under the root.
    pub async fn camera_dirs(&self) -> Result<Vec<String>, StorageError> {
        list_dirs(&self.root).await
    }

    /// Interval periods recorded for one camera directory.
    pub async fn intervals_for(&self, camera_safe_name: &str) -> Result<Vec<IntervalSpec>, StorageError> {
        let mut intervals: Vec<IntervalSpec> = list_dirs(&self.root.join(camera_safe_name))
            .await?
            .iter()
            .filter_map(|name| name.strip_suffix('s')?.parse().ok())
            .filter_map(IntervalSpec::new)
            .collect();
        intervals.sort_unstable();
        Ok(intervals)
    }
}

/// Local wall-clock time of a unix second.
pub fn local_time(unix_secs: u64) -> DateTime<Local> {
    i64::try_from(unix_secs)
        .ok()
        .and_then(|s| Local.timestamp_opt(s, 0).earliest())
        .unwrap_or_else(Local::now)
}

async fn prepare(path: &Path) -> Result<PathBuf, StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::Io(parent.to_path_buf(), e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    Ok(PathBuf::from(tmp))
}

async fn finish(tmp: &Path, path: &Path) -> Result<(), StorageError> {
    if let Err(e) = fs::rename(tmp, path).await {
        let _ = fs::remove_file(tmp).await;
        return Err(StorageError::Io(path.to_path_buf(), e));
    }
    Ok(())
}

async fn list_dirs(dir: &Path) -> Result<Vec<String>, StorageError> {
    let mut out = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(StorageError::Io(dir.to_path_buf(), e)),
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::Io(dir.to_path_buf(), e))?
    {
        let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
        if is_dir {
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    out.push(name.to_string());
                }
            }
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn iv(p: u64) -> IntervalSpec {
        IntervalSpec::new(p).unwrap()
    }

    #[test]
    fn test_path_layout() {
        let store = ImageStore::new("/data/images");
        let ts = 1_700_000_000;
        let date = local_time(ts).date_naive();
        let path = store.image_path(&CameraId::new("Front Door"), iv(60), ts);
        let expected = PathBuf::from("/data/images/Front_Door/60s")
            .join(date.format("%Y/%m/%d").to_string())
            .join("Front_Door_1700000000.jpg");
        assert_eq!(path, expected);
    }

    #[tokio::test]
    async fn test_save_rejects_tiny_images() {
        let dir = tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let err = store
            .save(&CameraId::new("A"), iv(60), 1_700_000_000, &[0u8; 10])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TooSmall(10)));
    }

    #[tokio::test]
    async fn test_save_and_copy() {
        let dir = tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let cam = CameraId::new("A");
        let saved = store
            .save(&cam, iv(60), 1_700_000_040, &vec![7u8; 4096])
            .await
            .unwrap();
        assert!(saved.path.exists());
        assert_eq!(saved.bytes, 4096);

        let copied = store
            .copy_from(&saved, &cam, iv(180), 1_700_000_040)
            .await
            .unwrap();
        assert!(copied.path.to_string_lossy().contains("/180s/"));
        assert_eq!(std::fs::read(&copied.path).unwrap().len(), 4096);

        assert_eq!(store.camera_dirs().await.unwrap(), vec!["A".to_string()]);
        assert_eq!(store.intervals_for("A").await.unwrap(), vec![iv(60), iv(180)]);
    }
}
