//! Archive staging.
//!
//! Inputs may arrive wrapped in gzip, zip, or tar containers. Staging
//! unpacks them into a scoped temporary directory, screens member paths
//! before extraction, and resolves the dataset root inside the unpacked
//! tree. Non-archive inputs pass through untouched.
//!
//! Every failure maps to the single [`UnpackError`] kind; the pipeline
//! turns it into one `UNPACK_ERROR` issue.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tempfile::TempDir;
use tracing::debug;

use crate::error::UnpackError;

/// A possibly-unpacked input. Holds the staging directory alive for as long
/// as the dataset is being read; dropping it removes the directory.
#[derive(Debug)]
pub struct StagedInput {
    path: PathBuf,
    tempdir: Option<TempDir>,
}

impl StagedInput {
    /// Path of the dataset to open (original input when not an archive).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the input was unpacked into a staging directory.
    pub fn is_staged(&self) -> bool {
        self.tempdir.is_some()
    }

    /// Removes the staging directory now instead of at drop.
    pub fn cleanup(self) -> std::io::Result<()> {
        if let Some(dir) = self.tempdir {
            dir.close()?;
        }
        Ok(())
    }
}

/// Compression suffixes recognized as archives but not unpackable here.
/// Matching them keeps a `.csv.bz2` from being mistaken for a plain input.
const UNSUPPORTED_SUFFIXES: &[&str] = &[".tar.bz2", ".tbz2", ".bz2", ".tar.xz", ".txz", ".xz"];

/// Whether the file name looks like an archive or compressed stream.
pub fn is_archive(path: &Path) -> bool {
    let name = lower_name(path);
    name.ends_with(".zip")
        || name.ends_with(".tar")
        || name.ends_with(".tar.gz")
        || name.ends_with(".tgz")
        || name.ends_with(".gz")
        || UNSUPPORTED_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Stages `input` for reading: archives are unpacked and their dataset root
/// resolved, plain files pass through.
pub fn stage_input(input: &Path) -> Result<StagedInput, UnpackError> {
    if !input.is_file() {
        return Err(UnpackError(format!("not a file: {}", input.display())));
    }
    if !is_archive(input) {
        return Ok(StagedInput {
            path: input.to_path_buf(),
            tempdir: None,
        });
    }

    let name = lower_name(input);
    if UNSUPPORTED_SUFFIXES.iter().any(|s| name.ends_with(s)) {
        return Err(UnpackError(format!(
            "unsupported archive format: {}",
            input.display()
        )));
    }

    let tempdir = tempfile::Builder::new()
        .prefix("datavet_unpack_")
        .tempdir()
        .map_err(|e| UnpackError(format!("staging dir: {e}")))?;

    let path = if name.ends_with(".zip") {
        extract_zip(input, tempdir.path())?;
        resolve_dataset_root(tempdir.path())?
    } else if name.ends_with(".tar") || name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let file = File::open(input)?;
        if name.ends_with(".tar") {
            unpack_tar(tar::Archive::new(file), tempdir.path())?;
        } else {
            unpack_tar(tar::Archive::new(GzDecoder::new(file)), tempdir.path())?;
        }
        resolve_dataset_root(tempdir.path())?
    } else {
        // Plain gzip stream: one member, named by stripping the suffix.
        decompress_gz(input, tempdir.path())?
    };

    debug!(input = %input.display(), staged = %path.display(), "input staged");
    Ok(StagedInput {
        path,
        tempdir: Some(tempdir),
    })
}

fn lower_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Rejects member paths that would escape the staging directory.
fn screen_member(name: &Path) -> Result<(), UnpackError> {
    for component in name.components() {
        match component {
            Component::ParentDir => {
                return Err(UnpackError(format!(
                    "unsafe member path: {}",
                    name.display()
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(UnpackError(format!(
                    "absolute member path: {}",
                    name.display()
                )));
            }
            Component::Normal(_) | Component::CurDir => {}
        }
    }
    Ok(())
}

fn extract_zip(input: &Path, dst: &Path) -> Result<(), UnpackError> {
    let file = File::open(input)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| UnpackError(format!("zip: {e}")))?;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| UnpackError(format!("zip member: {e}")))?;
        let raw = PathBuf::from(entry.name());
        screen_member(&raw)?;
        let out = dst.join(&raw);
        if entry.is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut target = File::create(&out)?;
        std::io::copy(&mut entry, &mut target)?;
    }
    Ok(())
}

fn unpack_tar<R: Read>(mut archive: tar::Archive<R>, dst: &Path) -> Result<(), UnpackError> {
    for entry in archive.entries()? {
        let mut entry = entry?;
        let raw = entry.path()?.into_owned();
        screen_member(&raw)?;
        entry.unpack_in(dst)?;
    }
    Ok(())
}

fn decompress_gz(input: &Path, dst: &Path) -> Result<PathBuf, UnpackError> {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stripped = match name.len() {
        n if n > 3 && name[n - 3..].eq_ignore_ascii_case(".gz") => name[..n - 3].to_string(),
        _ => "decompressed.bin".to_string(),
    };
    let out = dst.join(stripped);
    let mut decoder = GzDecoder::new(File::open(input)?);
    let mut target = File::create(&out)?;
    std::io::copy(&mut decoder, &mut target)
        .map_err(|e| UnpackError(format!("gzip stream: {e}")))?;
    Ok(out)
}

/// Picks the dataset root inside an unpacked tree: a lone file, or the
/// `.shp` of a shapefile bundle.
fn resolve_dataset_root(dir: &Path) -> Result<PathBuf, UnpackError> {
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();

    match files.len() {
        0 => Err(UnpackError("archive contained no files".to_string())),
        1 => Ok(files.remove(0)),
        _ => shapefile_bundle_root(&files).ok_or_else(|| {
            UnpackError(format!(
                "archive holds {} files and is not a shapefile bundle",
                files.len()
            ))
        }),
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), UnpackError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Exactly one `.shp` whose `.dbf` and `.shx` sidecars sit next to it.
/// Extra members (`.prj`, `.cpg`, ...) are allowed.
fn shapefile_bundle_root(files: &[PathBuf]) -> Option<PathBuf> {
    let shp: Vec<&PathBuf> = files.iter().filter(|p| has_ext(p, "shp")).collect();
    let [shp] = shp.as_slice() else {
        return None;
    };
    let has_sidecar = |ext: &str| {
        files.iter().any(|p| {
            has_ext(p, ext)
                && p.parent() == shp.parent()
                && stem_eq_ignore_case(p, shp)
        })
    };
    if has_sidecar("dbf") && has_sidecar("shx") {
        Some((*shp).clone())
    } else {
        None
    }
}

fn has_ext(path: &Path, ext: &str) -> bool {
    path.extension()
        .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
}

fn stem_eq_ignore_case(a: &Path, b: &Path) -> bool {
    match (a.file_stem(), b.file_stem()) {
        (Some(a), Some(b)) => a.to_string_lossy().eq_ignore_ascii_case(&b.to_string_lossy()),
        _ => false,
    }
}
