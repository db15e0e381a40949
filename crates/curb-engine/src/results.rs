use std::path::{Path, PathBuf};

use anyhow::Context;
use curb_contracts::{GeneratedImage, GenerationError, GenerationErrorKind};

/// Where an action's images land.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputLayout {
    /// `dir/result{i}.jpg`, replacing whatever the previous action wrote.
    /// Higher-index files from a larger earlier action are left in place.
    #[default]
    Overwrite,
    /// `dir/<action_id>/result{i}.jpg`, so actions never collide.
    PerAction,
}

#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
    layout: OutputLayout,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>, layout: OutputLayout) -> Self {
        Self {
            dir: dir.into(),
            layout,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn layout(&self) -> OutputLayout {
        self.layout
    }

    pub fn action_dir(&self, action_id: &str) -> PathBuf {
        match self.layout {
            OutputLayout::Overwrite => self.dir.clone(),
            OutputLayout::PerAction => self.dir.join(action_id),
        }
    }

    pub fn result_path(&self, action_id: &str, index: usize) -> PathBuf {
        self.action_dir(action_id).join(format!("result{index}.jpg"))
    }

    /// Writes every image in response order and returns the paths.
    pub fn persist(
        &self,
        images: &[GeneratedImage],
        action_id: &str,
    ) -> Result<Vec<PathBuf>, GenerationError> {
        self.write_all(images, action_id)
            .map_err(|err| GenerationError::from_anyhow(GenerationErrorKind::Storage, &err))
    }

    fn write_all(&self, images: &[GeneratedImage], action_id: &str) -> anyhow::Result<Vec<PathBuf>> {
        let dir = self.action_dir(action_id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed creating output directory {}", dir.display()))?;
        let mut written = Vec::with_capacity(images.len());
        for (idx, image) in images.iter().enumerate() {
            let path = self.result_path(action_id, idx);
            image.to_file(&path)?;
            written.push(path);
        }
        tracing::info!(count = written.len(), dir = %dir.display(), "results written");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use curb_contracts::{GeneratedImage, GenerationErrorKind};

    use super::{OutputLayout, ResultStore};

    fn images(count: u8) -> Vec<GeneratedImage> {
        (0..count)
            .map(|idx| GeneratedImage::new(vec![0xFF, 0xD8, idx, 0xFF, 0xD9]))
            .collect()
    }

    #[test]
    fn overwrite_layout_replaces_previous_results_and_keeps_stale_tail() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let out = temp.path().join("sd_images");
        let store = ResultStore::new(&out, OutputLayout::Overwrite);
        assert!(!out.exists());

        store.persist(&images(4), "first")?;
        let second = images(2)
            .into_iter()
            .map(|image| GeneratedImage::new([image.to_bytes(), &b"-2"[..]].concat()))
            .collect::<Vec<_>>();
        let written = store.persist(&second, "second")?;

        assert_eq!(written, vec![out.join("result0.jpg"), out.join("result1.jpg")]);
        assert_eq!(fs::read(out.join("result0.jpg"))?, second[0].to_bytes());
        assert_eq!(fs::read(out.join("result1.jpg"))?, second[1].to_bytes());
        assert!(out.join("result3.jpg").exists());
        Ok(())
    }

    #[test]
    fn per_action_layout_uses_subdirectories() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = ResultStore::new(temp.path(), OutputLayout::PerAction);

        let first = store.persist(&images(2), "action-a")?;
        let second = store.persist(&images(1), "action-b")?;

        assert_eq!(first[1], temp.path().join("action-a").join("result1.jpg"));
        assert_eq!(second[0], temp.path().join("action-b").join("result0.jpg"));
        assert!(first.iter().chain(second.iter()).all(|path| path.exists()));
        Ok(())
    }

    #[test]
    fn unwritable_directory_is_a_storage_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let blocker = temp.path().join("not-a-dir");
        fs::write(&blocker, b"file")?;

        let store = ResultStore::new(&blocker, OutputLayout::Overwrite);
        let err = store.persist(&images(1), "a").unwrap_err();
        assert_eq!(err.kind(), GenerationErrorKind::Storage);
        Ok(())
    }
}
