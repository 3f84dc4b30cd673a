use std::path::PathBuf;

use hf_hub::api::tokio::{Api, ApiRepo};

/// Weights file name in a Hugging Face model repository
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Config file name in a Hugging Face model repository
pub const CONFIG_FILE: &str = "config.json";

/// Fetch one file from a model repository, or its cached copy
async fn fetch(repo: &ApiRepo, model_name: &str, file_name: &str) -> anyhow::Result<PathBuf> {
    repo.get(file_name).await.map_err(|e| {
        anyhow!(
            "Unable to download {} for {} from the Hugging Face Hub: {}",
            file_name,
            model_name,
            e
        )
    })
}

/// Download a pretrained encoder from the Hugging Face Hub, returning `(config, weights)`.
/// Files already in the local hub cache are not downloaded again.
pub async fn download_hf_model(model_name: &str) -> anyhow::Result<(PathBuf, PathBuf)> {
    let api = Api::new().map_err(|e| anyhow!("Unable to reach the Hugging Face Hub: {}", e))?;
    let repo = api.model(model_name.to_string());

    let weights = fetch(&repo, model_name, WEIGHTS_FILE).await?;
    let config = fetch(&repo, model_name, CONFIG_FILE).await?;

    log::debug!("Using {} from {}", model_name, config.display());

    Ok((config, weights))
}
