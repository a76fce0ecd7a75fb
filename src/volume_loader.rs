use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{Result, ViewerError};
use crate::npy::{self, DecodedArray};

/// Where the bytes of a `.npy` file come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    File(PathBuf),
    Url(String),
}

pub struct VolumeLoader;

impl VolumeLoader {
    pub async fn load(source: &InputSource) -> Result<DecodedArray> {
        match source {
            InputSource::File(path) => Self::load_from_file(path).await,
            InputSource::Url(url) => Self::load_from_url(url).await,
        }
    }

    /// Read a whole file into memory and decode it.
    ///
    /// # Errors
    ///
    /// [`ViewerError::Io`] if the file cannot be read, otherwise any decode error.
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<DecodedArray> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        info!("read {} bytes from {}", bytes.len(), path.display());
        npy::decode(&bytes)
    }

    /// Fetch a file over HTTP(S) and decode it. A single request is made,
    /// there are no retries or range requests.
    ///
    /// # Errors
    ///
    /// [`ViewerError::Network`] for transport failures and any non-success
    /// status, otherwise any decode error.
    pub async fn load_from_url(url: &str) -> Result<DecodedArray> {
        let response = reqwest::get(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ViewerError::Network(format!("{url} responded with {status}")));
        }
        let bytes = response.bytes().await?;
        debug!("fetched {} bytes from {url}", bytes.len());
        npy::decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npy::Elements;
    use std::fs;

    fn temp_file_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("npy_volume_{}_{name}", std::process::id()))
    }

    #[tokio::test]
    async fn loads_from_file() {
        let path = temp_file_path("loader.npy");
        let bytes = npy::encode(&[2, 3], &Elements::UInt8(vec![1, 2, 3, 4, 5, 6])).unwrap();
        fs::write(&path, bytes).unwrap();

        let array = VolumeLoader::load(&InputSource::File(path.clone())).await;
        fs::remove_file(&path).ok();

        let array = array.unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array.elements, Elements::UInt8(vec![1, 2, 3, 4, 5, 6]));
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let result = VolumeLoader::load_from_file(temp_file_path("does_not_exist.npy")).await;
        assert!(matches!(result, Err(ViewerError::Io(_))));
    }

    #[tokio::test]
    async fn corrupt_file_surfaces_decode_error() {
        let path = temp_file_path("corrupt.npy");
        fs::write(&path, b"not an npy file at all").unwrap();

        let result = VolumeLoader::load_from_file(&path).await;
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ViewerError::Format(_))));
    }

    #[tokio::test]
    async fn unreachable_url_is_a_network_error() {
        let result = VolumeLoader::load_from_url("http://127.0.0.1:1/volume.npy").await;
        assert!(matches!(result, Err(ViewerError::Network(_))));
    }
}
