use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use burn_store::{ModuleSnapshot, SafetensorsStore};

use crate::{
    error::{Error, Result},
    model::{classifier::SequenceClassifier, config::ClassifierConfig},
};

/// Write `model` to `path` as safetensors.
///
/// The tensors go to a sibling temp file that is renamed over `path` once
/// complete, so a concurrent `load` sees either the old model or the new one,
/// never a partial file. Only one trainer may write a given path at a time.
pub fn save<B: Backend>(model: &SequenceClassifier<B>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let partial = partial_path(path);
    let mut store = SafetensorsStore::from_file(partial.clone());
    if let Err(e) = model.save_into(&mut store) {
        // best effort, the error below is the one worth reporting
        let _ = std::fs::remove_file(&partial);
        return Err(Error::ModelStore {
            path: path.to_path_buf(),
            message: format!("{e:?}"),
        });
    }

    std::fs::rename(&partial, path)?;
    tracing::info!(path = %path.display(), "model saved");
    Ok(())
}

/// Build a fresh network from `config` and load the weights at `path` into it.
///
/// A missing file is `Error::ModelNotTrained`; weights that do not fit the
/// topology are `Error::ModelStore`.
pub fn load<B: Backend>(
    path: &Path,
    config: &ClassifierConfig,
    device: &B::Device,
) -> Result<SequenceClassifier<B>> {
    if !path.is_file() {
        return Err(Error::ModelNotTrained(path.to_path_buf()));
    }

    let mut model = config.init::<B>(device);
    let mut store = SafetensorsStore::from_file(path.to_path_buf());
    model
        .load_from(&mut store)
        .map_err(|e| Error::ModelStore {
            path: path.to_path_buf(),
            message: format!("{e:?}"),
        })?;

    tracing::debug!(path = %path.display(), "model loaded");
    Ok(model)
}

/// `models/depression_model.safetensors` → `models/depression_model.partial-<pid>.safetensors`
fn partial_path(path: &Path) -> PathBuf {
    path.with_extension(format!("partial-{}.safetensors", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Tensor;

    type TestBackend = NdArray;

    /// Forward passes of a saved and reloaded model agree within this tolerance.
    const ROUND_TRIP_ATOL: f32 = 1e-5;

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("model.safetensors");
        let device = Default::default();
        let config = ClassifierConfig::new();

        let model = config.init::<TestBackend>(&device);
        save(&model, &path).unwrap();
        assert!(path.is_file());

        let reloaded = load::<TestBackend>(&path, &config, &device).unwrap();

        let features = Tensor::<TestBackend, 3>::random(
            [2, 40, 40],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let before = model
            .probabilities(features.clone())
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        let after = reloaded
            .probabilities(features)
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        for (a, b) in before.iter().zip(&after) {
            assert!((a - b).abs() <= ROUND_TRIP_ATOL, "{a} vs {b}");
        }
    }

    #[test]
    fn test_save_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestBackend>(&device);

        save(&model, &path).unwrap();
        // overwrite in place
        save(&model, &path).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("model.safetensors")]);
    }

    #[test]
    fn test_load_missing_is_not_trained() {
        let device = Default::default();
        let result = load::<TestBackend>(
            Path::new("/no/such/model.safetensors"),
            &ClassifierConfig::new(),
            &device,
        );
        assert!(matches!(result, Err(Error::ModelNotTrained(_))));
    }

    #[test]
    fn test_partial_path_is_a_sibling() {
        let path = Path::new("models/depression_model.safetensors");
        let partial = partial_path(path);
        assert_eq!(partial.parent(), path.parent());
        assert_ne!(partial, path);
        assert!(partial.to_string_lossy().ends_with(".safetensors"));
    }
}
