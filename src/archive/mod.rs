//! Packs the downloaded files into a single compressed archive.
//!
//! All writers here are blocking; async callers should run
//! [`create_archive`] on `tokio::task::spawn_blocking`.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bzip2::write::BzEncoder;
use flate2::Compression;
use flate2::write::GzEncoder;
use sevenz_rust2::{SevenZArchiveEntry, SevenZWriter};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use xz2::write::XzEncoder;
use zip::write::SimpleFileOptions;

/// Compression level handed to the xz encoder.
const XZ_PRESET: u32 = 6;

/// Errors raised while creating an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The requested format name is not one of [`ArchiveFormat::ALL`].
    #[error("unsupported archive format `{format}` (supported: {supported})")]
    UnsupportedFormat {
        /// The rejected name.
        format: String,
        /// Comma-separated list of accepted names.
        supported: String,
    },

    /// The directory to archive does not exist.
    #[error("source directory not found: {path}")]
    SourceMissing {
        /// The missing directory.
        path: PathBuf,
    },

    /// The destination directory cannot be written to.
    #[error("no write permission in {path}: {source}")]
    Unwritable {
        /// Directory that failed the write probe.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// File system error while reading sources or writing the archive.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The zip writer failed.
    #[error("zip error writing {path}: {source}")]
    Zip {
        /// The archive being written.
        path: PathBuf,
        /// The underlying zip error.
        #[source]
        source: zip::result::ZipError,
    },

    /// The 7z writer failed.
    #[error("7z error writing {path}: {source}")]
    SevenZ {
        /// The archive being written.
        path: PathBuf,
        /// The underlying 7z error.
        #[source]
        source: sevenz_rust2::Error,
    },
}

impl ArchiveError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveFormat {
    /// Deflate-compressed zip.
    #[default]
    Zip,
    /// Uncompressed tar.
    Tar,
    /// Gzip-compressed tar.
    TarGz,
    /// Bzip2-compressed tar.
    TarBz2,
    /// Xz-compressed tar.
    TarXz,
    /// 7-Zip (LZMA2).
    SevenZ,
}

impl ArchiveFormat {
    /// Every supported format, in display order.
    pub const ALL: [Self; 6] = [
        Self::Zip,
        Self::Tar,
        Self::TarGz,
        Self::TarBz2,
        Self::TarXz,
        Self::SevenZ,
    ];

    /// File extension (without leading dot), also the accepted config name.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::TarBz2 => "tar.bz2",
            Self::TarXz => "tar.xz",
            Self::SevenZ => "7z",
        }
    }

    fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|f| f.extension())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ArchiveFormat {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.extension() == wanted)
            .ok_or_else(|| ArchiveError::UnsupportedFormat {
                format: s.to_string(),
                supported: Self::supported_list(),
            })
    }
}

/// How the archive is named and whether an existing one is replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Output format.
    pub format: ArchiveFormat,
    /// File name without extension.
    pub base_name: String,
    /// Replace an archive that already exists.
    pub overwrite: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            format: ArchiveFormat::Zip,
            base_name: "anexos".to_string(),
            overwrite: true,
        }
    }
}

impl ArchiveOptions {
    /// Full archive path inside `dest_dir`.
    #[must_use]
    pub fn archive_path(&self, dest_dir: &Path) -> PathBuf {
        dest_dir.join(format!("{}.{}", self.base_name, self.format.extension()))
    }
}

/// A file to store and the name it gets inside the archive.
#[derive(Debug)]
struct ArchiveEntry {
    path: PathBuf,
    name: String,
}

/// Archives every regular file under `source_dir` into `dest_dir`.
///
/// Returns the archive path, or `Ok(None)` when there was nothing to archive.
/// An existing archive is returned untouched unless `options.overwrite` is set.
/// Destination writability is checked before an existing archive is removed.
///
/// # Errors
///
/// Returns [`ArchiveError`] if the source is missing, the destination is not
/// writable, or reading/writing fails. A half-written archive is removed.
#[instrument(skip(options), fields(source = %source_dir.display(), dest = %dest_dir.display(), format = %options.format))]
pub fn create_archive(
    source_dir: &Path,
    dest_dir: &Path,
    options: &ArchiveOptions,
) -> Result<Option<PathBuf>, ArchiveError> {
    if !source_dir.is_dir() {
        return Err(ArchiveError::SourceMissing {
            path: source_dir.to_path_buf(),
        });
    }

    fs::create_dir_all(dest_dir).map_err(|e| ArchiveError::io(dest_dir, e))?;
    check_writable(dest_dir)?;

    let archive_path = options.archive_path(dest_dir);
    if archive_path.exists() {
        if !options.overwrite {
            info!(path = %archive_path.display(), "archive exists and will not be overwritten");
            return Ok(Some(archive_path));
        }
        debug!(path = %archive_path.display(), "removing existing archive");
        fs::remove_file(&archive_path).map_err(|e| ArchiveError::io(&archive_path, e))?;
    }

    let mut entries = Vec::new();
    collect_entries(source_dir, source_dir, &archive_path, &mut entries)?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    if entries.is_empty() {
        warn!("no files to archive");
        return Ok(None);
    }

    info!(files = entries.len(), "creating archive");
    if let Err(e) = write_archive(&archive_path, options.format, &entries) {
        if let Err(cleanup) = fs::remove_file(&archive_path) {
            debug!(path = %archive_path.display(), error = %cleanup, "failed to remove partial archive");
        }
        return Err(e);
    }

    info!(path = %archive_path.display(), "archive created");
    Ok(Some(archive_path))
}

fn check_writable(dir: &Path) -> Result<(), ArchiveError> {
    let probe = dir.join(".annex-sync-archive-probe");
    File::create(&probe).map_err(|source| ArchiveError::Unwritable {
        path: dir.to_path_buf(),
        source,
    })?;
    if let Err(e) = fs::remove_file(&probe) {
        debug!(path = %probe.display(), error = %e, "failed to remove write check file");
    }
    Ok(())
}

fn collect_entries(
    root: &Path,
    dir: &Path,
    skip: &Path,
    entries: &mut Vec<ArchiveEntry>,
) -> Result<(), ArchiveError> {
    let read_dir = fs::read_dir(dir).map_err(|e| ArchiveError::io(dir, e))?;
    for entry in read_dir {
        let entry = entry.map_err(|e| ArchiveError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| ArchiveError::io(&path, e))?;

        if file_type.is_dir() {
            collect_entries(root, &path, skip, entries)?;
        } else if file_type.is_file() && path != skip {
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            entries.push(ArchiveEntry { path, name });
        }
    }
    Ok(())
}

fn write_archive(
    archive_path: &Path,
    format: ArchiveFormat,
    entries: &[ArchiveEntry],
) -> Result<(), ArchiveError> {
    let file = File::create(archive_path).map_err(|e| ArchiveError::io(archive_path, e))?;
    let io_err = |e: io::Error| ArchiveError::io(archive_path, e);

    match format {
        ArchiveFormat::Zip => write_zip(file, archive_path, entries)?,
        ArchiveFormat::Tar => {
            write_tar(file, entries).map_err(io_err)?.sync_all().map_err(io_err)?;
        }
        ArchiveFormat::TarGz => {
            let encoder = write_tar(GzEncoder::new(file, Compression::default()), entries)
                .map_err(io_err)?;
            encoder.finish().map_err(io_err)?.sync_all().map_err(io_err)?;
        }
        ArchiveFormat::TarBz2 => {
            let encoder =
                write_tar(BzEncoder::new(file, bzip2::Compression::default()), entries)
                    .map_err(io_err)?;
            encoder.finish().map_err(io_err)?.sync_all().map_err(io_err)?;
        }
        ArchiveFormat::TarXz => {
            let encoder = write_tar(XzEncoder::new(file, XZ_PRESET), entries).map_err(io_err)?;
            encoder.finish().map_err(io_err)?.sync_all().map_err(io_err)?;
        }
        ArchiveFormat::SevenZ => write_seven_z(file, archive_path, entries)?,
    }
    Ok(())
}

fn write_zip(file: File, archive_path: &Path, entries: &[ArchiveEntry]) -> Result<(), ArchiveError> {
    let zip_err = |source: zip::result::ZipError| ArchiveError::Zip {
        path: archive_path.to_path_buf(),
        source,
    };
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut writer = zip::ZipWriter::new(file);

    for entry in entries {
        writer
            .start_file(entry.name.as_str(), options)
            .map_err(zip_err)?;
        let mut source = File::open(&entry.path).map_err(|e| ArchiveError::io(&entry.path, e))?;
        io::copy(&mut source, &mut writer).map_err(|e| ArchiveError::io(&entry.path, e))?;
        debug!(entry = %entry.name, "added to zip");
    }

    let mut file = writer.finish().map_err(zip_err)?;
    file.flush().map_err(|e| ArchiveError::io(archive_path, e))?;
    Ok(())
}

fn write_seven_z(
    file: File,
    archive_path: &Path,
    entries: &[ArchiveEntry],
) -> Result<(), ArchiveError> {
    let seven_z_err = |source: sevenz_rust2::Error| ArchiveError::SevenZ {
        path: archive_path.to_path_buf(),
        source,
    };
    let mut writer = SevenZWriter::new(file).map_err(seven_z_err)?;

    for entry in entries {
        let source = File::open(&entry.path).map_err(|e| ArchiveError::io(&entry.path, e))?;
        writer
            .push_archive_entry(
                SevenZArchiveEntry::from_path(&entry.path, entry.name.clone()),
                Some(source),
            )
            .map_err(seven_z_err)?;
        debug!(entry = %entry.name, "added to 7z");
    }

    let file = writer
        .finish()
        .map_err(sevenz_rust2::Error::from)
        .map_err(seven_z_err)?;
    file.sync_all().map_err(|e| ArchiveError::io(archive_path, e))?;
    Ok(())
}

fn write_tar<W: Write>(writer: W, entries: &[ArchiveEntry]) -> io::Result<W> {
    let mut builder = tar::Builder::new(writer);
    for entry in entries {
        builder.append_path_with_name(&entry.path, &entry.name)?;
        debug!(entry = %entry.name, "added to tar");
    }
    builder.into_inner()
}
