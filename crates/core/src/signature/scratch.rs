//! リクエスト単位の作業ディレクトリ。
//!
//! 途中で失敗した場合は `Drop` で削除され、削除の失敗は警告ログに残る。
//! 成功時は `release` で明示的に削除し、失敗を呼び出し側へ伝える。

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub(crate) struct ScratchSpace {
    /// `release` または `Drop` で取り出される
    dir: Option<TempDir>,
    root: PathBuf,
}

impl ScratchSpace {
    /// `root` 配下（未指定ならシステムの一時ディレクトリ）に作業ディレクトリを作る。
    pub(crate) fn create(root: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("signlink-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        Ok(Self {
            root: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    pub(crate) fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub(crate) async fn write(&self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.path(name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// 作業ディレクトリを削除する。
    pub(crate) fn release(mut self) -> io::Result<()> {
        match self.dir.take() {
            Some(dir) => dir.close(),
            None => Ok(()),
        }
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                tracing::warn!(
                    path = %self.root.display(),
                    error = %e,
                    "作業ディレクトリの削除に失敗しました"
                );
            }
        }
    }
}
