//! Model files.
//!
//! A model file holds the bytes of [`Model::marshal`], optionally gzip
//! compressed. Loading detects compression from the gzip magic number, and
//! the model must already have a forward graph of the same topology.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use rerank_layers::model::Model;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{TrainError, TrainResult};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compression applied to model files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// Raw snapshot bytes.
    #[default]
    None,
    /// Gzip at the default level.
    Gzip,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> TrainError + '_ {
    move |source| TrainError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes `model`'s parameters to `path`, creating parent directories.
pub fn save_model<M: Model + ?Sized>(
    path: impl AsRef<Path>,
    model: &M,
    compression: Compression,
) -> TrainResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let bytes = model.marshal()?;
    let data = match compression {
        Compression::None => bytes,
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(&bytes).map_err(io_error(path))?;
            encoder.finish().map_err(io_error(path))?
        }
    };
    fs::write(path, &data).map_err(io_error(path))?;

    info!(
        path = %path.display(),
        model = model.name(),
        size = data.len(),
        ?compression,
        "Model saved"
    );
    Ok(())
}

/// Restores parameters written by [`save_model`] into `model`.
pub fn load_model<M: Model + ?Sized>(path: impl AsRef<Path>, model: &mut M) -> TrainResult<()> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(io_error(path))?;

    let bytes = if data.starts_with(&GZIP_MAGIC) {
        debug!(path = %path.display(), "Decompressing model file");
        let mut bytes = Vec::new();
        GzDecoder::new(data.as_slice())
            .read_to_end(&mut bytes)
            .map_err(io_error(path))?;
        bytes
    } else {
        data
    };
    model.unmarshal(&bytes)?;

    info!(path = %path.display(), model = model.name(), "Model loaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rerank_layers::mlp_ranker::{MlpRanker, MlpRankerConfig};
    use rerank_layers::model::{ModelInputs, ModelShape};
    use rerank_layers::LayerError;
    use tempfile::tempdir;

    fn built(seed: u64) -> MlpRanker {
        let shape = ModelShape {
            batch_size: 2,
            profile_dim: 1,
            behavior_seq_len: 2,
            behavior_dim: 2,
            item_dim: 1,
            ctx_dim: 1,
        };
        let mut model = MlpRanker::new(MlpRankerConfig::default().with_seed(seed));
        let inputs = ModelInputs::declare(model.graph_mut(), &shape);
        model.forward(inputs, &shape).unwrap();
        model
    }

    fn params(model: &MlpRanker) -> Vec<Vec<f32>> {
        model
            .learnables()
            .iter()
            .map(|id| model.graph().param_data(*id).unwrap())
            .collect()
    }

    #[test]
    fn test_roundtrip_both_compressions() {
        let dir = tempdir().unwrap();
        for compression in [Compression::None, Compression::Gzip] {
            let path = dir.path().join(format!("nested/{:?}.bin", compression));
            let source = built(1);
            save_model(&path, &source, compression).unwrap();

            let mut target = built(2);
            assert_ne!(params(&source), params(&target));
            load_model(&path, &mut target).unwrap();
            assert_eq!(params(&source), params(&target));
        }
    }

    #[test]
    fn test_gzip_file_starts_with_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin.gz");
        save_model(&path, &built(1), Compression::Gzip).unwrap();
        assert!(fs::read(&path).unwrap().starts_with(&GZIP_MAGIC));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = load_model(dir.path().join("absent.bin"), &mut built(1)).unwrap_err();
        assert!(matches!(err, TrainError::Io { .. }));
    }

    #[test]
    fn test_save_unbuilt_model_fails() {
        let dir = tempdir().unwrap();
        let model = MlpRanker::new(MlpRankerConfig::default());
        let err = save_model(dir.path().join("m.bin"), &model, Compression::None).unwrap_err();
        assert!(matches!(err, TrainError::Model(LayerError::NotBuilt)));
    }

    #[test]
    fn test_corrupt_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.bin");
        fs::write(&path, b"not a model").unwrap();
        assert!(load_model(&path, &mut built(1)).is_err());
    }
}
