use std::path::Path;
use std::time::SystemTime;

use tokio::time::Instant;

use super::config::QuiescenceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quiescence {
    Settled,
    /// Still changing when `max_quiescence` ran out
    TimedOut,
}

async fn stat(path: &Path) -> Option<(u64, SystemTime)> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    Some((metadata.len(), metadata.modified().ok()?))
}

/// Wait until the file at `path` looks completely written.
///
/// Small files only get the settle delay. Larger ones are polled until two samples one
/// stability interval apart agree on size and mtime. A file that disappears counts as
/// settled.
pub async fn until_written(path: &Path, config: &QuiescenceConfig) -> Quiescence {
    tokio::time::sleep(config.settle_delay).await;

    let Some(mut previous) = stat(path).await else {
        return Quiescence::Settled;
    };
    if previous.0 <= config.large_file_threshold {
        return Quiescence::Settled;
    }

    let deadline = Instant::now() + config.max_quiescence;
    loop {
        tokio::time::sleep(config.stability_interval).await;
        let Some(current) = stat(path).await else {
            return Quiescence::Settled;
        };
        if current == previous {
            return Quiescence::Settled;
        }
        if Instant::now() >= deadline {
            tracing::warn!("{} still changing after {:?}", path.display(), config.max_quiescence);
            return Quiescence::TimedOut;
        }
        previous = current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config() -> QuiescenceConfig {
        QuiescenceConfig {
            settle_delay: Duration::from_millis(5),
            large_file_threshold: 1024,
            stability_interval: Duration::from_millis(50),
            max_quiescence: Duration::from_millis(400),
        }
    }

    #[tokio::test]
    async fn test_small_and_missing_files_settle() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("small"), b"tiny").unwrap();

        assert_eq!(
            until_written(&dir.path().join("small"), &config()).await,
            Quiescence::Settled
        );
        assert_eq!(
            until_written(&dir.path().join("missing"), &config()).await,
            Quiescence::Settled
        );
    }

    #[tokio::test]
    async fn test_large_stable_file_settles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("large");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();

        let started = std::time::Instant::now();
        assert_eq!(until_written(&path, &config()).await, Quiescence::Settled);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_growing_file_times_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("growing");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            for i in 0..40usize {
                std::fs::write(&writer_path, vec![1u8; 4096 + i * 16]).unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });

        assert_eq!(until_written(&path, &config()).await, Quiescence::TimedOut);
        writer.abort();
    }
}
