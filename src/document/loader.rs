use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use ignore::WalkBuilder;
use rayon::prelude::*;

use crate::error::{MemoryBankError, Result};
use crate::tokens::TokenCounter;

use super::Document;

/// Reads the markdown files of a memory bank directory into documents.
pub struct BankLoader<'a> {
    counter: &'a dyn TokenCounter,
}

impl<'a> BankLoader<'a> {
    pub fn new(counter: &'a dyn TokenCounter) -> Self {
        Self { counter }
    }

    /// Markdown files under `root`, sorted by path. Hidden and gitignored
    /// files are skipped.
    pub fn walk(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(MemoryBankError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("memory bank directory not found: {}", root.display()),
            )));
        }

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .ignore(true)
            .build();

        let mut files: Vec<PathBuf> = walker
            .flatten()
            .map(|entry| entry.into_path())
            .filter(|path| path.is_file() && Self::is_markdown(path))
            .collect();
        files.sort();

        Ok(files)
    }

    pub fn is_markdown(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("md"))
            .unwrap_or(false)
    }

    /// Load every markdown file under `root`. Documents are keyed by bare file
    /// name; when two files share a name the first path in sorted order wins.
    pub fn load(&self, root: &Path) -> Result<Vec<Document>> {
        let files = self.walk(root)?;

        let loaded: Vec<Option<Document>> = files
            .par_iter()
            .map(|path| match self.load_file(path) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    tracing::warn!("Skipping unreadable file {}: {}", path.display(), e);
                    None
                }
            })
            .collect();

        let mut seen = HashSet::new();
        let mut documents = Vec::with_capacity(loaded.len());
        for (doc, path) in loaded.into_iter().zip(&files) {
            let Some(doc) = doc else { continue };
            if !seen.insert(doc.name.clone()) {
                tracing::warn!(
                    "Duplicate document name {} at {}, keeping the first occurrence",
                    doc.name,
                    path.display()
                );
                continue;
            }
            documents.push(doc);
        }

        tracing::info!("Loaded {} documents from {}", documents.len(), root.display());
        Ok(documents)
    }

    pub fn load_file(&self, path: &Path) -> Result<Document> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| MemoryBankError::contract(format!("not a file path: {}", path.display())))?;

        let content = fs::read_to_string(path)?;
        let mut doc = Document::new(name, content, self.counter);

        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs());
        if let Some(secs) = modified {
            doc = doc.with_last_modified(secs);
        }

        Ok(doc)
    }
}
