use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::ClusterError;

/// Abstraction over where job packages live. Production uses
/// `DiskJobPackageSource`; tests substitute an in-memory fake so the
/// reconciler's diff logic can run without touching the filesystem.
#[async_trait]
pub trait JobPackageSource: Send + Sync {
    /// Names of `.zip` archives sitting directly under the package root,
    /// without the `.zip` suffix.
    async fn list_archives(&self) -> Result<Vec<String>, ClusterError>;

    /// True if `Jobs/<name>/config/` already exists — the marker that
    /// extraction already ran for this package.
    async fn config_dir_exists(&self, name: &str) -> Result<bool, ClusterError>;

    /// Extracts `job.json` from `Jobs/<name>.zip` into
    /// `Jobs/<name>/config/job.json`, creating the directory first.
    async fn extract_config(&self, name: &str) -> Result<(), ClusterError>;

    /// Names of immediate subdirectories of the package root that carry a
    /// `config/job.json` file.
    async fn list_config_dirs(&self) -> Result<Vec<String>, ClusterError>;

    /// Reads and parses `Jobs/<name>/config/job.json`.
    async fn read_config(&self, name: &str) -> Result<serde_json::Value, ClusterError>;

    /// Overwrites `Jobs/<name>/config/job.json` with `contents`, used by
    /// the time-plan scheduler after it advances a config's record
    /// pointer.
    async fn write_config(&self, name: &str, contents: &serde_json::Value) -> Result<(), ClusterError>;
}

/// Real filesystem-backed `JobPackageSource`, rooted at `root` (the
/// Manager's `Jobs/` directory).
pub struct DiskJobPackageSource {
    root: PathBuf,
}

impl DiskJobPackageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.root.join(name).join("config").join("job.json")
    }

    fn archive_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.zip"))
    }
}

#[async_trait]
impl JobPackageSource for DiskJobPackageSource {
    async fn list_archives(&self) -> Result<Vec<String>, ClusterError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || list_archives_blocking(&root))
            .await
            .map_err(|e| ClusterError::JobPackageConfigExtract("*".to_string(), e.to_string()))?
    }

    async fn config_dir_exists(&self, name: &str) -> Result<bool, ClusterError> {
        let dir = self.root.join(name).join("config");
        Ok(tokio::fs::metadata(&dir).await.is_ok())
    }

    async fn extract_config(&self, name: &str) -> Result<(), ClusterError> {
        let archive = self.archive_path(name);
        let config_dir = self.root.join(name).join("config");
        let name = name.to_string();
        tokio::task::spawn_blocking(move || extract_config_blocking(&archive, &config_dir))
            .await
            .map_err(|e| ClusterError::JobPackageConfigExtract(name.clone(), e.to_string()))?
            .map_err(|e| ClusterError::JobPackageConfigExtract(name, e))
    }

    async fn list_config_dirs(&self) -> Result<Vec<String>, ClusterError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || list_config_dirs_blocking(&root))
            .await
            .map_err(|e| ClusterError::JobPackageConfigExtract("*".to_string(), e.to_string()))?
    }

    async fn read_config(&self, name: &str) -> Result<serde_json::Value, ClusterError> {
        let path = self.config_path(name);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ClusterError::MalformedKvValue(name.to_string(), e.to_string()))?;
        serde_json::from_str(&contents)
            .map_err(|e| ClusterError::MalformedKvValue(name.to_string(), e.to_string()))
    }

    async fn write_config(&self, name: &str, contents: &serde_json::Value) -> Result<(), ClusterError> {
        let path = self.config_path(name);
        let serialized = serde_json::to_vec_pretty(contents)
            .map_err(|e| ClusterError::MalformedKvValue(name.to_string(), e.to_string()))?;
        tokio::fs::write(&path, serialized)
            .await
            .map_err(|e| ClusterError::MalformedKvValue(name.to_string(), e.to_string()))
    }
}

fn list_archives_blocking(root: &Path) -> Result<Vec<String>, ClusterError> {
    let mut names = Vec::new();
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return Ok(names),
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("zip") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn list_config_dirs_blocking(root: &Path) -> Result<Vec<String>, ClusterError> {
    let mut names = Vec::new();
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return Ok(names),
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() && path.join("config").join("job.json").is_file() {
            if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn extract_config_blocking(archive_path: &Path, config_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(config_dir).map_err(|e| e.to_string())?;

    let file = std::fs::File::open(archive_path).map_err(|e| e.to_string())?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;
    let mut entry = archive
        .by_name("job.json")
        .map_err(|_| "archive does not contain job.json".to_string())?;

    let mut out = std::fs::File::create(config_dir.join("job.json")).map_err(|e| e.to_string())?;
    std::io::copy(&mut entry, &mut out).map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip_with_job_json(path: &Path, job_json: &str) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("job.json", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(job_json.as_bytes()).unwrap();
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn extracts_job_json_from_archive() {
        let dir = tempfile_dir();
        write_zip_with_job_json(&dir.join("demo.zip"), r#"{"name":"demo"}"#);

        let source = DiskJobPackageSource::new(&dir);
        assert!(!source.config_dir_exists("demo").await.unwrap());
        source.extract_config("demo").await.unwrap();
        assert!(source.config_dir_exists("demo").await.unwrap());

        let cfg = source.read_config("demo").await.unwrap();
        assert_eq!(cfg["name"], serde_json::json!("demo"));
    }

    #[tokio::test]
    async fn missing_job_json_in_archive_is_an_error() {
        let dir = tempfile_dir();
        let file = std::fs::File::create(dir.join("bad.zip")).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("readme.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"not a config").unwrap();
        writer.finish().unwrap();

        let source = DiskJobPackageSource::new(&dir);
        assert!(source.extract_config("bad").await.is_err());
    }

    #[tokio::test]
    async fn list_config_dirs_only_returns_dirs_with_job_json() {
        let dir = tempfile_dir();
        std::fs::create_dir_all(dir.join("has-config/config")).unwrap();
        std::fs::write(dir.join("has-config/config/job.json"), "{}").unwrap();
        std::fs::create_dir_all(dir.join("no-config")).unwrap();

        let source = DiskJobPackageSource::new(&dir);
        let names = source.list_config_dirs().await.unwrap();
        assert_eq!(names, vec!["has-config".to_string()]);
    }

    fn tempfile_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("swift-cluster-test-{}", std::process::id()));
        dir.push(uuid::Uuid::new_v4().to_string());
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
