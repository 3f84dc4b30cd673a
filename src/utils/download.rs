use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::{fs, io::AsyncWriteExt};
use url::Url;

/// Download Error
#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    /// The request failed or the server answered with an error status
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The download could not be written to disk
    #[error("unable to write download: {0}")]
    Io(#[from] std::io::Error),
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");

    path.with_file_name(name)
}

/// Download a file to the given path unless it is already there. Returns `true` if a download
/// took place.
///
/// The body is streamed to a `.part` file next to the destination and renamed once complete, so
/// an interrupted transfer is never mistaken for a cached copy.
pub async fn download_once(url: &Url, path: &Path) -> Result<bool, DownloadError> {
    if fs::try_exists(path).await? {
        log::debug!("Using cached {}", path.display());

        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    log::info!("Downloading {} to {}", url, path.display());

    let response = reqwest::get(url.clone()).await?.error_for_status()?;

    let partial = partial_path(path);
    let mut file = fs::File::create(&partial).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len();
    }

    file.flush().await?;
    drop(file);

    fs::rename(&partial, path).await?;

    log::info!("Downloaded {} bytes", written);

    Ok(true)
}
