//! File system merger implementation.

use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};

use super::error::MergeError;
use super::types::{CopiedFile, MergeStats};
use crate::config::CopyConfig;
use crate::naming::{is_partial_file, PARTIAL_SUFFIX};

/// Recursively merges directories and copies single items.
#[derive(Debug, Clone)]
pub struct DirectoryMerger {
    config: CopyConfig,
}

impl DirectoryMerger {
    /// Creates a new merger with the given configuration.
    pub fn new(config: CopyConfig) -> Self {
        Self { config }
    }

    /// Creates a merger with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(CopyConfig::default())
    }

    /// Creates `path` and any missing parents.
    ///
    /// Returns `true` when this call created the directory. An "already
    /// exists" outcome, including one caused by a concurrent worker winning
    /// the race, is success.
    pub async fn ensure_dir(&self, path: &Path) -> Result<bool, MergeError> {
        if let Ok(meta) = fs::metadata(path).await {
            if meta.is_dir() {
                return Ok(false);
            }
            return Err(MergeError::NotADirectory {
                path: path.to_path_buf(),
            });
        }

        match fs::create_dir_all(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false) {
                    Ok(false)
                } else {
                    Err(MergeError::NotADirectory {
                        path: path.to_path_buf(),
                    })
                }
            }
            Err(e) => Err(MergeError::DirectoryCreationFailed {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Hidden sibling the copy is staged in before it is renamed into place.
    fn partial_path(destination: &Path) -> PathBuf {
        let mut name = OsString::from(".");
        name.push(destination.file_name().unwrap_or_default());
        name.push(format!(".{}.{}", uuid::Uuid::new_v4().simple(), PARTIAL_SUFFIX));
        destination.with_file_name(name)
    }

    /// Copies one file to `destination`, overwriting whatever is there.
    ///
    /// Content, permissions and modification time are preserved. The bytes
    /// land in a hidden temp file first, so `destination` is either the old
    /// file or the complete new one.
    pub async fn copy_file(
        &self,
        source: &Path,
        destination: &Path,
    ) -> Result<CopiedFile, MergeError> {
        let source_meta = fs::metadata(source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MergeError::SourceNotFound {
                    path: source.to_path_buf(),
                }
            } else {
                MergeError::Io(e)
            }
        })?;

        if let Some(parent) = destination.parent() {
            self.ensure_dir(parent).await?;
        }

        let partial = Self::partial_path(destination);
        match self
            .copy_via_partial(source, &source_meta, &partial, destination)
            .await
        {
            Ok(copied) => Ok(copied),
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&partial).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(
                            "Failed to remove partial copy {}: {}",
                            partial.display(),
                            cleanup
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn copy_via_partial(
        &self,
        source: &Path,
        source_meta: &std::fs::Metadata,
        partial: &Path,
        destination: &Path,
    ) -> Result<CopiedFile, MergeError> {
        let (size_bytes, checksum) = self
            .write_copy(source, partial, destination, source_meta)
            .await?;

        if let Some(expected) = &checksum {
            let actual = self.calculate_checksum(partial).await?;
            if &actual != expected {
                return Err(MergeError::ChecksumMismatch {
                    path: destination.to_path_buf(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        fs::set_permissions(partial, source_meta.permissions())
            .await
            .map_err(|e| {
                MergeError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
            })?;

        fs::rename(partial, destination).await.map_err(|e| {
            MergeError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
        })?;

        Ok(CopiedFile {
            destination: destination.to_path_buf(),
            size_bytes,
            checksum,
        })
    }

    /// Streams `source` into `partial`, hashing on the way when enabled.
    async fn write_copy(
        &self,
        source: &Path,
        partial: &Path,
        destination: &Path,
        source_meta: &std::fs::Metadata,
    ) -> Result<(u64, Option<String>), MergeError> {
        let copy_failed =
            |e| MergeError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e);

        let source_file = File::open(source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MergeError::SourceNotFound {
                    path: source.to_path_buf(),
                }
            } else {
                MergeError::Io(e)
            }
        })?;
        let dest_file = File::create(partial).await.map_err(copy_failed)?;

        let mut reader = BufReader::with_capacity(self.config.buffer_size, source_file);
        let mut writer = BufWriter::with_capacity(self.config.buffer_size, dest_file);

        let mut hasher = if self.config.verify_checksums {
            Some(Sha256::new())
        } else {
            None
        };

        let mut total_bytes = 0u64;
        let mut buffer = vec![0u8; self.config.buffer_size];

        loop {
            let bytes_read = reader.read(&mut buffer).await.map_err(copy_failed)?;
            if bytes_read == 0 {
                break;
            }

            if let Some(ref mut h) = hasher {
                h.update(&buffer[..bytes_read]);
            }

            writer
                .write_all(&buffer[..bytes_read])
                .await
                .map_err(copy_failed)?;

            total_bytes += bytes_read as u64;
        }

        writer.flush().await.map_err(copy_failed)?;

        if let Ok(modified) = source_meta.modified() {
            let std_file = writer.into_inner().into_std().await;
            std_file.set_modified(modified).map_err(copy_failed)?;
        }

        Ok((total_bytes, hasher.map(|h| format!("{:x}", h.finalize()))))
    }

    /// Calculates the SHA-256 checksum of a file.
    async fn calculate_checksum(&self, path: &Path) -> Result<String, MergeError> {
        let checksum_failed = |e| MergeError::ChecksumCalculationFailed {
            path: path.to_path_buf(),
            source: e,
        };

        let file = File::open(path).await.map_err(checksum_failed)?;
        let mut reader = BufReader::with_capacity(self.config.buffer_size, file);
        let mut buffer = vec![0u8; self.config.buffer_size];
        let mut hasher = Sha256::new();

        loop {
            let bytes_read = reader.read(&mut buffer).await.map_err(checksum_failed)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Recursively copies the contents of `source_dir` into `dest_dir`.
    ///
    /// Subdirectories are created as needed; files overwrite same-named files
    /// (last writer wins). `source_dir` is left untouched. When `dest_dir` is
    /// nested inside `source_dir`, the branch holding it is skipped so the
    /// merge never copies into itself. Stops at the first failure.
    pub async fn merge(&self, source_dir: &Path, dest_dir: &Path) -> Result<MergeStats, MergeError> {
        let mut stats = MergeStats::default();

        if self.ensure_dir(dest_dir).await? {
            stats.directories_created += 1;
        }

        let source_canonical = fs::canonicalize(source_dir).await.map_err(|e| {
            MergeError::ReadDirFailed {
                path: source_dir.to_path_buf(),
                source: e,
            }
        })?;
        let dest_canonical = fs::canonicalize(dest_dir).await?;
        if source_canonical == dest_canonical {
            return Ok(stats);
        }
        let nested = dest_canonical.starts_with(&source_canonical);

        let mut pending = vec![(source_dir.to_path_buf(), dest_dir.to_path_buf())];
        while let Some((src, dst)) = pending.pop() {
            let read_dir_failed = |e| MergeError::ReadDirFailed {
                path: src.clone(),
                source: e,
            };
            let mut entries = fs::read_dir(&src).await.map_err(read_dir_failed)?;

            while let Some(entry) = entries.next_entry().await.map_err(read_dir_failed)? {
                let path = entry.path();
                let target = dst.join(entry.file_name());
                if is_partial_file(&path) {
                    continue;
                }

                let file_type = entry.file_type().await?;
                let is_dir = if file_type.is_symlink() {
                    match fs::metadata(&path).await {
                        Ok(meta) if meta.is_dir() => {
                            tracing::warn!("Not following directory symlink {}", path.display());
                            continue;
                        }
                        Ok(_) => false,
                        Err(e) => {
                            tracing::warn!("Skipping dangling symlink {}: {}", path.display(), e);
                            continue;
                        }
                    }
                } else {
                    file_type.is_dir()
                };

                if is_dir {
                    if nested && Self::holds(&path, &dest_canonical).await {
                        tracing::debug!(
                            "Skipping {} because it contains the merge destination",
                            path.display()
                        );
                        continue;
                    }
                    if self.ensure_dir(&target).await? {
                        stats.directories_created += 1;
                    }
                    pending.push((path, target));
                } else {
                    let copied = self.copy_file(&path, &target).await?;
                    stats.record_file(&copied);
                }
            }
        }

        Ok(stats)
    }

    /// Whether directory `path` is `dest` or one of its ancestors.
    async fn holds(path: &Path, dest: &Path) -> bool {
        match fs::canonicalize(path).await {
            Ok(canonical) => dest.starts_with(canonical),
            Err(_) => false,
        }
    }
}
