use std::fmt::Display;

use super::bert;

/// Available Models
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Model {
    /// The BERT family of models, with the specific model name contained within
    Bert(String),
}

impl Model {
    /// Get the model type
    pub fn model_type(&self) -> &str {
        match self {
            Model::Bert(_) => bert::MODEL_TYPE,
        }
    }

    /// The model used when none is requested
    pub fn default_virality() -> Self {
        Model::Bert(bert::DEFAULT_VIRALITY_MODEL.to_string())
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Model::Bert(name) = self;

        write!(f, "{}", name)
    }
}

impl TryFrom<&str> for Model {
    type Error = ModelError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if bert::ALL_MODELS.contains(&value) {
            Ok(Model::Bert(value.to_string()))
        } else {
            Err(ModelError::Unknown(value.to_string()))
        }
    }
}

/// Model Error
#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    /// No model found for the given string
    #[error("no model found for {0}")]
    Unknown(String),
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn accepts_known_models() {
        let model = Model::try_from("google/bert_uncased_L-4_H-256_A-4").unwrap();

        assert_eq!(model.model_type(), "bert");
        assert_eq!(model.to_string(), "google/bert_uncased_L-4_H-256_A-4");
    }

    #[test]
    fn rejects_unknown_models() {
        assert!(matches!(
            Model::try_from("gpt2"),
            Err(ModelError::Unknown(name)) if name == "gpt2"
        ));
    }

    #[test]
    fn defaults_to_the_smallest_bert() {
        assert_eq!(
            Model::default_virality(),
            Model::Bert("google/bert_uncased_L-2_H-128_A-2".to_string())
        );
    }
}
