use std::fmt::Display;

use crate::datasets::tweets;

/// The Dataset enum
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Dataset {
    /// Tweets labeled with their retweet counts
    Tweets,
}

impl Dataset {
    /// Every side feature column the dataset provides
    pub fn features(&self) -> Vec<String> {
        match self {
            Dataset::Tweets => tweets::FEATURES.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Class labels, indexed by class id
    pub fn labels(&self) -> Vec<String> {
        match self {
            Dataset::Tweets => tweets::Virality::labels(),
        }
    }
}

impl TryFrom<&str> for Dataset {
    type Error = DatasetError;

    /// Try to convert a string to a Dataset
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.to_lowercase() == tweets::DATASET {
            Ok(Dataset::Tweets)
        } else {
            Err(Self::Error::Unknown(value.to_string()))
        }
    }
}

impl Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Dataset::Tweets => tweets::DATASET,
        };

        write!(f, "{}", name)
    }
}

/// Dataset Error
#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    /// No dataset found for the given string
    #[error("no dataset found for {0}")]
    Unknown(String),
}
