use super::PersistenceError;
use std::path::PathBuf;
use tracing::{info, warn};

/// Metadata stored next to a saved wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryMetadata {
	pub sync_height: u64,
	/// RFC 3339 time of the save
	pub timestamp: Option<String>,
}

/// Repository for encoded wallet containers
#[async_trait::async_trait]
pub trait WalletRepository: Send + Sync {
	async fn save(&self, container: &[u8], sync_height: u64) -> Result<(), PersistenceError>;
	async fn load(&self) -> Result<Option<(Vec<u8>, RepositoryMetadata)>, PersistenceError>;
}

/// File-based implementation of WalletRepository
pub struct FileWalletRepository {
	data_dir: PathBuf,
	name: String,
}

impl FileWalletRepository {
	pub fn new(data_dir: PathBuf, name: impl Into<String>) -> Self {
		Self {
			data_dir,
			name: name.into(),
		}
	}

	pub fn wallet_filename(&self) -> PathBuf {
		self.data_dir.join(format!("{}.wallet", self.name))
	}

	pub fn metadata_filename(&self) -> PathBuf {
		self.data_dir.join(format!("{}.meta.json", self.name))
	}
}

#[async_trait::async_trait]
impl WalletRepository for FileWalletRepository {
	async fn save(&self, container: &[u8], sync_height: u64) -> Result<(), PersistenceError> {
		tokio::fs::create_dir_all(&self.data_dir).await?;

		let metadata = serde_json::json!({
			"sync_height": sync_height,
			"timestamp": chrono::Utc::now().to_rfc3339(),
		});
		tokio::fs::write(
			self.metadata_filename(),
			serde_json::to_string_pretty(&metadata)?,
		)
		.await?;

		let filename = self.wallet_filename();
		tokio::fs::write(&filename, container).await?;

		info!("Saved wallet to {:?} at height {}", filename, sync_height);
		Ok(())
	}

	async fn load(&self) -> Result<Option<(Vec<u8>, RepositoryMetadata)>, PersistenceError> {
		let filename = self.wallet_filename();
		if !tokio::fs::try_exists(&filename).await? {
			return Ok(None);
		}

		// metadata is advisory; a missing or unreadable file only loses the height hint
		let mut metadata = RepositoryMetadata {
			sync_height: 0,
			timestamp: None,
		};
		match tokio::fs::read_to_string(self.metadata_filename()).await {
			Ok(content) => {
				let value: serde_json::Value = serde_json::from_str(&content)?;
				if let Some(height) = value.get("sync_height").and_then(|h| h.as_u64()) {
					metadata.sync_height = height;
				}
				metadata.timestamp = value
					.get("timestamp")
					.and_then(|t| t.as_str())
					.map(str::to_string);
			}
			Err(e) => warn!("No wallet metadata at {:?}: {}", self.metadata_filename(), e),
		}

		let container = tokio::fs::read(&filename).await?;
		info!(
			"Loaded wallet from {:?} saved at height {}",
			filename, metadata.sync_height
		);
		Ok(Some((container, metadata)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_save_and_load() {
		let dir = tempfile::tempdir().unwrap();
		let repository = FileWalletRepository::new(dir.path().join("wallets"), "alice");
		assert!(repository.load().await.unwrap().is_none());

		repository.save(b"container", 42).await.unwrap();
		let (container, metadata) = repository.load().await.unwrap().unwrap();
		assert_eq!(container, b"container");
		assert_eq!(metadata.sync_height, 42);
		let timestamp = metadata.timestamp.unwrap();
		assert!(chrono::DateTime::parse_from_rfc3339(&timestamp).is_ok());
	}

	#[tokio::test]
	async fn test_missing_metadata_defaults_height() {
		let dir = tempfile::tempdir().unwrap();
		let repository = FileWalletRepository::new(dir.path().to_path_buf(), "bob");
		repository.save(b"data", 7).await.unwrap();
		tokio::fs::remove_file(repository.metadata_filename())
			.await
			.unwrap();

		let (_, metadata) = repository.load().await.unwrap().unwrap();
		assert_eq!(metadata.sync_height, 0);
		assert!(metadata.timestamp.is_none());
	}
}
