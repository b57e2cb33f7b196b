//! On-disk bundles.
//!
//! A bundle is a directory holding two files:
//!
//! - `emb.bin` (or `emb.bin.zst`): bincode archive of the reference matrix
//!   `emb`, the group ids `group_ids` and the last axis `semaxis`;
//! - `param.json`: `{ "version", "n_group", "group_order" }`.
//!
//! Saving stages both files in a temporary sibling directory and renames it
//! over the target, so an existing bundle is either replaced whole or left as
//! it was when staging fails.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Level};
use zstd::{decode_all, encode_all};

use crate::config::{BundleConfig, CompressionCodec};
use crate::error::AxisError;
use crate::groups::{GroupEncoding, GroupLabel, N_GROUPS};

/// Bump whenever the archive or parameter layout changes.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

pub const ARCHIVE_FILE: &str = "emb.bin";
pub const ARCHIVE_FILE_ZSTD: &str = "emb.bin.zst";
pub const PARAM_FILE: &str = "param.json";

#[derive(Serialize)]
struct ArchiveRef<'a> {
    emb: &'a Array2<f64>,
    group_ids: &'a [u8],
    semaxis: Option<&'a Array1<f64>>,
}

#[derive(Deserialize)]
struct Archive {
    emb: Array2<f64>,
    group_ids: Vec<u8>,
    semaxis: Option<Array1<f64>>,
}

/// Scalar metadata stored next to the archive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleParams {
    pub version: u32,
    pub n_group: usize,
    pub group_order: Vec<GroupLabel>,
}

/// Everything a bundle restores.
#[derive(Clone, Debug, PartialEq)]
pub struct Bundle {
    pub embeddings: Array2<f64>,
    pub groups: GroupEncoding,
    pub axis: Option<Array1<f64>>,
}

/// Write a bundle at `path`, replacing any existing bundle there.
pub fn save_bundle(
    path: &Path,
    embeddings: &Array2<f64>,
    groups: &GroupEncoding,
    axis: Option<&Array1<f64>>,
    cfg: &BundleConfig,
) -> Result<(), AxisError> {
    let start = Instant::now();
    let span = tracing::span!(Level::INFO, "bundle.save", path = %path.display());
    let _guard = span.enter();

    match save_inner(path, embeddings, groups, axis, cfg) {
        Ok(bytes) => {
            info!(
                rows = embeddings.nrows(),
                dim = embeddings.ncols(),
                has_axis = axis.is_some(),
                codec = ?cfg.compression,
                archive_bytes = bytes,
                elapsed_micros = start.elapsed().as_micros(),
                "bundle_saved"
            );
            Ok(())
        }
        Err(err) => {
            warn!(error = %err, elapsed_micros = start.elapsed().as_micros(), "bundle_save_failure");
            Err(err)
        }
    }
}

fn save_inner(
    path: &Path,
    embeddings: &Array2<f64>,
    groups: &GroupEncoding,
    axis: Option<&Array1<f64>>,
    cfg: &BundleConfig,
) -> Result<usize, AxisError> {
    check_consistent(embeddings, groups, axis)?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| AxisError::io("save", path, e))?;

    let staging = tempfile::Builder::new()
        .prefix(".semaxis-staging-")
        .tempdir_in(&parent)
        .map_err(|e| AxisError::io("save", path, e))?;

    let archive = ArchiveRef {
        emb: embeddings,
        group_ids: &groups.ids,
        semaxis: axis,
    };
    let encoded = encode_to_vec(&archive, standard())?;
    let (file_name, bytes) = match cfg.compression {
        CompressionCodec::None => (ARCHIVE_FILE, encoded),
        CompressionCodec::Zstd => (
            ARCHIVE_FILE_ZSTD,
            encode_all(encoded.as_slice(), cfg.level).map_err(|e| AxisError::io("save", path, e))?,
        ),
    };
    write_synced(&staging.path().join(file_name), &bytes).map_err(|e| AxisError::io("save", path, e))?;

    let params = BundleParams {
        version: BUNDLE_FORMAT_VERSION,
        n_group: N_GROUPS,
        group_order: groups.order.to_vec(),
    };
    let json = serde_json::to_vec_pretty(&params).map_err(|e| AxisError::Encode(e.to_string()))?;
    write_synced(&staging.path().join(PARAM_FILE), &json)
        .map_err(|e| AxisError::io("save", path, e))?;

    if path.is_dir() {
        fs::remove_dir_all(path).map_err(|e| AxisError::io("replace", path, e))?;
    } else if path.exists() {
        fs::remove_file(path).map_err(|e| AxisError::io("replace", path, e))?;
    }
    fs::rename(staging.path(), path).map_err(|e| AxisError::io("save", path, e))?;

    Ok(bytes.len())
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(bytes)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}

/// Read and validate the bundle at `path`.
pub fn load_bundle(path: &Path) -> Result<Bundle, AxisError> {
    let start = Instant::now();
    let span = tracing::span!(Level::INFO, "bundle.load", path = %path.display());
    let _guard = span.enter();

    match load_inner(path) {
        Ok(bundle) => {
            info!(
                rows = bundle.embeddings.nrows(),
                dim = bundle.embeddings.ncols(),
                has_axis = bundle.axis.is_some(),
                elapsed_micros = start.elapsed().as_micros(),
                "bundle_loaded"
            );
            Ok(bundle)
        }
        Err(err) => {
            warn!(error = %err, elapsed_micros = start.elapsed().as_micros(), "bundle_load_failure");
            Err(err)
        }
    }
}

fn load_inner(path: &Path) -> Result<Bundle, AxisError> {
    if !path.is_dir() {
        return Err(AxisError::BundleNotFound(path.to_path_buf()));
    }
    let param_path = path.join(PARAM_FILE);
    if !param_path.is_file() {
        return Err(AxisError::BundleNotFound(path.to_path_buf()));
    }

    let plain = path.join(ARCHIVE_FILE);
    let compressed = path.join(ARCHIVE_FILE_ZSTD);
    let archive_bytes = if plain.is_file() {
        fs::read(&plain).map_err(|e| AxisError::io("load", path, e))?
    } else if compressed.is_file() {
        let raw = fs::read(&compressed).map_err(|e| AxisError::io("load", path, e))?;
        decode_all(raw.as_slice()).map_err(|e| AxisError::corrupt(path, format!("zstd: {e}")))?
    } else {
        return Err(AxisError::BundleNotFound(path.to_path_buf()));
    };

    let param_bytes = fs::read(&param_path).map_err(|e| AxisError::io("load", path, e))?;
    let params: BundleParams = serde_json::from_slice(&param_bytes)
        .map_err(|e| AxisError::corrupt(path, format!("{PARAM_FILE}: {e}")))?;
    let order = validate_params(path, params)?;

    let (archive, consumed): (Archive, usize) = decode_from_slice(&archive_bytes, standard())
        .map_err(|e| AxisError::corrupt(path, format!("archive: {e}")))?;
    if consumed != archive_bytes.len() {
        return Err(AxisError::corrupt(
            path,
            format!(
                "archive has {} trailing bytes",
                archive_bytes.len() - consumed
            ),
        ));
    }

    let Archive {
        emb,
        group_ids,
        semaxis,
    } = archive;
    if group_ids.len() != emb.nrows() {
        return Err(AxisError::corrupt(
            path,
            format!(
                "group_ids has {} entries for {} embedding rows",
                group_ids.len(),
                emb.nrows()
            ),
        ));
    }
    if group_ids.iter().any(|&id| id as usize >= N_GROUPS) {
        return Err(AxisError::corrupt(path, "group_ids must be 0 or 1"));
    }
    if let Some(axis) = &semaxis {
        if axis.len() != emb.ncols() {
            return Err(AxisError::corrupt(
                path,
                format!(
                    "semaxis has length {} for {}-dimensional embeddings",
                    axis.len(),
                    emb.ncols()
                ),
            ));
        }
    }

    let groups = GroupEncoding {
        order,
        ids: group_ids,
    };
    groups
        .require_both_groups()
        .map_err(|e| AxisError::corrupt(path, e.to_string()))?;

    Ok(Bundle {
        embeddings: emb,
        groups,
        axis: semaxis,
    })
}

/// Reject inputs that would produce a bundle `load_bundle` refuses, before
/// anything on disk is touched.
fn check_consistent(
    embeddings: &Array2<f64>,
    groups: &GroupEncoding,
    axis: Option<&Array1<f64>>,
) -> Result<(), AxisError> {
    if groups.ids.len() != embeddings.nrows() {
        return Err(AxisError::DimensionMismatch(format!(
            "{} group ids for {} embedding rows",
            groups.ids.len(),
            embeddings.nrows()
        )));
    }
    if groups.ids.iter().any(|&id| id as usize >= N_GROUPS) {
        return Err(AxisError::InvalidGroupComposition(
            "group ids must be 0 or 1".to_string(),
        ));
    }
    groups.require_both_groups()?;
    match axis {
        Some(axis) if axis.len() != embeddings.ncols() => Err(AxisError::DimensionMismatch(
            format!(
                "axis has length {} for {}-dimensional embeddings",
                axis.len(),
                embeddings.ncols()
            ),
        )),
        _ => Ok(()),
    }
}

fn validate_params(path: &Path, params: BundleParams) -> Result<[GroupLabel; 2], AxisError> {
    if params.version != BUNDLE_FORMAT_VERSION {
        return Err(AxisError::corrupt(
            path,
            format!("unsupported bundle version {}", params.version),
        ));
    }
    if params.n_group != N_GROUPS {
        return Err(AxisError::corrupt(
            path,
            format!("n_group is {}, expected {N_GROUPS}", params.n_group),
        ));
    }
    let order: [GroupLabel; 2] = params.group_order.try_into().map_err(|v: Vec<GroupLabel>| {
        AxisError::corrupt(
            path,
            format!("group_order has {} entries, expected {N_GROUPS}", v.len()),
        )
    })?;
    if order[0] == order[1] {
        return Err(AxisError::corrupt(path, "group_order repeats a label"));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    fn sample() -> (Array2<f64>, GroupEncoding, Array1<f64>) {
        let emb = array![[0.0, 0.0], [0.0, 1.0], [5.0, 5.0], [5.0, 6.0]];
        let groups = GroupEncoding::encode(&["A", "A", "B", "B"], None).unwrap();
        let axis = array![5.0, 5.0];
        (emb, groups, axis)
    }

    #[test]
    fn round_trip_plain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.sm");
        let (emb, groups, axis) = sample();
        save_bundle(&path, &emb, &groups, Some(&axis), &BundleConfig::default()).unwrap();
        assert!(path.join(ARCHIVE_FILE).is_file());
        assert!(path.join(PARAM_FILE).is_file());

        let bundle = load_bundle(&path).unwrap();
        assert_eq!(bundle.embeddings, emb);
        assert_eq!(bundle.groups, groups);
        assert_eq!(bundle.axis, Some(axis));
    }

    #[test]
    fn round_trip_zstd_without_axis() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.sm");
        let (emb, groups, _) = sample();
        let cfg = BundleConfig::default().with_compression(CompressionCodec::Zstd);
        save_bundle(&path, &emb, &groups, None, &cfg).unwrap();
        assert!(path.join(ARCHIVE_FILE_ZSTD).is_file());

        let bundle = load_bundle(&path).unwrap();
        assert_eq!(bundle.embeddings, emb);
        assert!(bundle.axis.is_none());
    }

    #[test]
    fn param_file_is_readable_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.sm");
        let (emb, groups, axis) = sample();
        save_bundle(&path, &emb, &groups, Some(&axis), &BundleConfig::default()).unwrap();
        let text = fs::read_to_string(path.join(PARAM_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["n_group"], 2);
        assert_eq!(value["group_order"], serde_json::json!(["A", "B"]));
        assert_eq!(value["version"], BUNDLE_FORMAT_VERSION);
    }

    #[test]
    fn save_replaces_existing_bundle_wholesale() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.sm");
        let (emb, groups, axis) = sample();
        save_bundle(&path, &emb, &groups, Some(&axis), &BundleConfig::default()).unwrap();
        fs::write(path.join("stray.txt"), b"left over").unwrap();

        let zstd = BundleConfig::default().with_compression(CompressionCodec::Zstd);
        save_bundle(&path, &emb, &groups, None, &zstd).unwrap();
        assert!(!path.join("stray.txt").exists());
        assert!(!path.join(ARCHIVE_FILE).exists());
        assert!(load_bundle(&path).unwrap().axis.is_none());

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".semaxis-staging-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn missing_bundle_is_not_found() {
        let dir = tempdir().unwrap();
        let err = load_bundle(&dir.path().join("absent.sm")).unwrap_err();
        assert!(matches!(err, AxisError::BundleNotFound(_)));
    }

    #[test]
    fn missing_archive_is_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.sm");
        let (emb, groups, axis) = sample();
        save_bundle(&path, &emb, &groups, Some(&axis), &BundleConfig::default()).unwrap();
        fs::remove_file(path.join(ARCHIVE_FILE)).unwrap();
        assert!(matches!(
            load_bundle(&path).unwrap_err(),
            AxisError::BundleNotFound(_)
        ));
    }

    #[test]
    fn truncated_archive_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.sm");
        let (emb, groups, axis) = sample();
        save_bundle(&path, &emb, &groups, Some(&axis), &BundleConfig::default()).unwrap();
        let bytes = fs::read(path.join(ARCHIVE_FILE)).unwrap();
        fs::write(path.join(ARCHIVE_FILE), &bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(
            load_bundle(&path).unwrap_err(),
            AxisError::BundleCorrupt { .. }
        ));
    }

    #[test]
    fn unknown_param_fields_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.sm");
        let (emb, groups, axis) = sample();
        save_bundle(&path, &emb, &groups, Some(&axis), &BundleConfig::default()).unwrap();
        fs::write(
            path.join(PARAM_FILE),
            r#"{"version":1,"n_group":2,"group_order":["A","B"],"emb":"sneaky"}"#,
        )
        .unwrap();
        assert!(matches!(
            load_bundle(&path).unwrap_err(),
            AxisError::BundleCorrupt { .. }
        ));
    }

    #[test]
    fn mismatched_group_count_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.sm");
        let (emb, groups, axis) = sample();
        save_bundle(&path, &emb, &groups, Some(&axis), &BundleConfig::default()).unwrap();
        fs::write(
            path.join(PARAM_FILE),
            r#"{"version":1,"n_group":3,"group_order":["A","B","C"]}"#,
        )
        .unwrap();
        assert!(matches!(
            load_bundle(&path).unwrap_err(),
            AxisError::BundleCorrupt { .. }
        ));
    }

    /// Overwrite the archive of the bundle at `path` with raw contents.
    fn write_archive(path: &Path, emb: &Array2<f64>, ids: &[u8]) {
        let archive = ArchiveRef {
            emb,
            group_ids: ids,
            semaxis: None,
        };
        let bytes = encode_to_vec(&archive, standard()).unwrap();
        fs::write(path.join(ARCHIVE_FILE), bytes).unwrap();
    }

    #[test]
    fn inconsistent_lengths_are_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.sm");
        let (emb, groups, axis) = sample();
        save_bundle(&path, &emb, &groups, Some(&axis), &BundleConfig::default()).unwrap();
        write_archive(&path, &emb, &[0, 0, 1]);
        assert!(matches!(
            load_bundle(&path).unwrap_err(),
            AxisError::BundleCorrupt { .. }
        ));
    }

    #[test]
    fn empty_group_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.sm");
        let (emb, groups, axis) = sample();
        save_bundle(&path, &emb, &groups, Some(&axis), &BundleConfig::default()).unwrap();
        write_archive(&path, &emb, &[0, 0, 0, 0]);
        match load_bundle(&path).unwrap_err() {
            AxisError::BundleCorrupt { reason, .. } => assert!(reason.contains("no members")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejected_save_leaves_previous_bundle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.sm");
        let (emb, groups, axis) = sample();
        save_bundle(&path, &emb, &groups, Some(&axis), &BundleConfig::default()).unwrap();

        let mut short = groups.clone();
        short.ids.pop();
        let err = save_bundle(&path, &emb, &short, None, &BundleConfig::default()).unwrap_err();
        assert!(matches!(err, AxisError::DimensionMismatch(_)));

        let one_sided = GroupEncoding {
            order: groups.order.clone(),
            ids: vec![1; 4],
        };
        let err = save_bundle(&path, &emb, &one_sided, None, &BundleConfig::default()).unwrap_err();
        assert!(matches!(err, AxisError::InvalidGroupComposition(_)));

        let bad_axis = array![1.0, 2.0, 3.0];
        assert!(save_bundle(&path, &emb, &groups, Some(&bad_axis), &BundleConfig::default()).is_err());

        let bundle = load_bundle(&path).unwrap();
        assert_eq!(bundle.embeddings, emb);
        assert_eq!(bundle.axis, Some(axis));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
