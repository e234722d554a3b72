//! Model bundle persistence
//!
//! A bundle is a single `.tar.gz` holding the graph and its metadata:
//! - metadata.json   - labels, input size, tensor layouts
//! - model.onnx      - the exported graph

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const GRAPH_ENTRY: &str = "model.onnx";

/// True when the path names a bundle rather than a bare graph.
pub fn is_bundle_path(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// Writes the graph and metadata into one `.tar.gz`, returning the path actually written.
pub fn save_model_bundle(
    output_path: &Path,
    metadata: &ModelMetadata,
    graph_bytes: &[u8],
) -> Result<PathBuf> {
    let tar_gz_path = if is_bundle_path(output_path) {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    };

    if let Some(parent) = tar_gz_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create parent directory: {:?}", parent))?;
        }
    }

    let tar_gz_file = File::create(&tar_gz_path)
        .context(format!("Failed to create tar.gz file: {:?}", tar_gz_path))?;

    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    let json_str = metadata.to_json_string()?;
    append_entry(&mut tar_builder, METADATA_ENTRY, json_str.as_bytes())?;
    append_entry(&mut tar_builder, GRAPH_ENTRY, graph_bytes)?;

    tar_builder
        .into_inner()
        .context("Failed to finalize tar archive")?
        .finish()
        .context("Failed to finalize gzip stream")?;

    Ok(tar_gz_path)
}

fn append_entry<W: std::io::Write>(
    builder: &mut Builder<W>,
    name: &str,
    bytes: &[u8],
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, bytes)
        .context(format!("Failed to add {} to tar", name))
}

fn open_archive(tar_gz_path: &Path) -> Result<Archive<GzDecoder<File>>> {
    let tar_gz_file = File::open(tar_gz_path)
        .context(format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;
    Ok(Archive::new(GzDecoder::new(tar_gz_file)))
}

/// Reads only `metadata.json` from a bundle.
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    let mut archive = open_archive(tar_gz_path)?;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;

        if path.to_str() == Some(METADATA_ENTRY) {
            let mut json_str = String::new();
            entry.read_to_string(&mut json_str)?;
            return ModelMetadata::from_json_string(&json_str);
        }
    }

    Err(anyhow::anyhow!("{} not found in tar.gz archive", METADATA_ENTRY))
}

/// Reads metadata and graph bytes in one pass over the archive.
pub fn load_model_bundle(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    let mut archive = open_archive(tar_gz_path)?;

    let mut metadata_opt: Option<ModelMetadata> = None;
    let mut graph_opt: Option<Vec<u8>> = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;

        match path.to_str() {
            Some(METADATA_ENTRY) => {
                let mut json_str = String::new();
                entry.read_to_string(&mut json_str)?;
                metadata_opt = Some(ModelMetadata::from_json_string(&json_str)?);
            }
            Some(GRAPH_ENTRY) => {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                graph_opt = Some(buffer);
            }
            _ => {}
        }
    }

    match (metadata_opt, graph_opt) {
        (Some(metadata), Some(graph)) => Ok((metadata, graph)),
        (None, _) => Err(anyhow::anyhow!("{} not found in tar.gz archive", METADATA_ENTRY)),
        (_, None) => Err(anyhow::anyhow!("{} not found in tar.gz archive", GRAPH_ENTRY)),
    }
}

/// Human-readable summary used by `batik-cli info`.
pub fn format_metadata_info(metadata: &ModelMetadata) -> String {
    let labels = metadata
        .labels
        .iter()
        .enumerate()
        .map(|(i, label)| format!("  [{}] {}", i, label))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "labels ({}):\n{}\ninput size: {}x{}\ntensor layout: {}\noutput layout: {}\nexported at: {}",
        metadata.labels.len(),
        labels,
        metadata.input_size,
        metadata.input_size,
        metadata.tensor_layout,
        metadata.output_layout,
        metadata.exported_at
    )
}
