//! Loaders
//!
//! The source of truth a namespace falls back to on a cache miss.

use std::future::Future;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;

// == Loader Trait ==
/// Loads the bytes for a key when it is not cached.
///
/// Errors are handed to the namespace's callers unchanged.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

// == Loader Fn ==
/// Adapts an async closure into a [`Loader`].
///
/// ```ignore
/// let loader = LoaderFn::new(|key: String| async move {
///     Ok(format!("value of {key}").into_bytes())
/// });
/// ```
pub struct LoaderFn<F> {
    func: F,
}

impl<F, Fut> LoaderFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> Loader for LoaderFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
{
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        (self.func)(key.to_string()).await
    }
}

// == Directory Loader ==
/// Serves each key from the file of the same name inside a directory.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Loader for DirectoryLoader {
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        // Only a single plain file name may be looked up
        let mut components = Path::new(key).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => bail!("{key} is not a valid file name"),
        }

        let path = self.root.join(key);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("{key} not exist"))
    }
}
