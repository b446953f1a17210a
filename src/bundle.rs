use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::classifier::Classifier;
use crate::config::PreprocessingConfig;
use crate::error::{Result, TrainerError};
use crate::softmax::SoftmaxClassifier;

/// Modelo entrenado + preprocesado necesario para reutilizarlo en tiempo real
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle<C = SoftmaxClassifier> {
    pub classifier: C,
    pub preprocessing: PreprocessingConfig,
    pub class_names: Vec<String>,
    pub created_with: String,
}

impl<C> ModelBundle<C>
where
    C: Classifier + Serialize + DeserializeOwned,
{
    pub fn new(classifier: C, preprocessing: PreprocessingConfig) -> Result<Self> {
        let class_names = classifier.class_names().to_vec();
        if class_names.is_empty() {
            return Err(TrainerError::NotFitted);
        }
        Ok(Self {
            classifier,
            preprocessing,
            class_names,
            created_with: concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")).to_string(),
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("💾 Modelo guardado en {:?}", path);
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let bundle: Self = serde_json::from_str(&content)?;
        if bundle.class_names != bundle.classifier.class_names() {
            return Err(TrainerError::invalid(format!(
                "bundle class names {:?} do not match the classifier's {:?}",
                bundle.class_names,
                bundle.classifier.class_names()
            )));
        }
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Hyperparameters;
    use crate::types::GroupKey;

    fn trained() -> SoftmaxClassifier {
        let features = vec![vec![0.0, 1.0], vec![0.1, 0.9], vec![1.0, 0.0], vec![0.9, 0.1]];
        let labels: Vec<GroupKey> = ["fist_1", "fist_2", "open_1", "open_2"]
            .into_iter()
            .map(GroupKey::from)
            .collect();
        let mut model = SoftmaxClassifier::new();
        let params = Hyperparameters {
            epochs: 20,
            batch_size: 2,
            learning_rate: 0.05,
            ..Hyperparameters::default()
        };
        model.fit(&features, &labels, None, None, &params).unwrap();
        model
    }

    #[test]
    fn test_save_and_load_predicts_the_same() {
        let path = std::env::temp_dir().join(format!("fgr_bundle_{}.json", std::process::id()));
        let model = trained();
        let bundle = ModelBundle::new(model.clone(), PreprocessingConfig::default()).unwrap();
        bundle.save(&path).unwrap();

        let loaded: ModelBundle = ModelBundle::load(&path).unwrap();
        assert_eq!(loaded.class_names, vec!["fist", "open"]);
        assert_eq!(loaded.preprocessing, PreprocessingConfig::default());
        let probe = vec![vec![0.05, 0.95], vec![0.95, 0.05]];
        assert_eq!(
            loaded.classifier.classify(&probe).unwrap(),
            model.classify(&probe).unwrap()
        );
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_unfitted_model_rejected() {
        assert!(matches!(
            ModelBundle::new(SoftmaxClassifier::new(), PreprocessingConfig::default()),
            Err(TrainerError::NotFitted)
        ));
    }
}
