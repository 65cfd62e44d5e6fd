//! In-memory overlay used to dry-run a batch before anything is written.
//!
//! Each op is checked against the content the earlier ops of the same batch
//! would have produced, so an edit to a file created two ops earlier
//! validates the same way it will apply.

use crate::materializer::{Materializer, normalize};
use crate::snippet;
use infrared_core::{Error, FileOp, Result};
use std::collections::HashMap;

/// A rejected op and the error `Applying` would have hit.
#[derive(Debug)]
pub struct ValidationIssue {
    pub index: usize,
    pub path: String,
    pub error: Error,
}

pub struct Overlay<'a> {
    materializer: &'a Materializer,
    files: HashMap<String, String>,
}

impl<'a> Overlay<'a> {
    pub fn new(materializer: &'a Materializer) -> Self {
        Self {
            materializer,
            files: HashMap::new(),
        }
    }

    async fn current(&self, path: &str) -> Result<String> {
        match self.files.get(&normalize(path)) {
            Some(content) => Ok(content.clone()),
            None => self.materializer.read(path).await,
        }
    }

    /// Check one op and, if it passes, record its effect.
    pub async fn check(&mut self, op: &FileOp) -> Result<()> {
        match op {
            FileOp::Create(create) => {
                self.materializer.validate(&create.path, &create.content)?;
                self.files
                    .insert(normalize(&create.path), create.content.clone());
            }
            FileOp::Edit(edit) => {
                self.materializer.resolve(&edit.path)?;
                let current = self.current(&edit.path).await?;
                let updated = snippet::apply_to_content(
                    &edit.path,
                    &current,
                    &edit.original_snippet,
                    &edit.new_snippet,
                )?;
                self.materializer.validate(&edit.path, &updated)?;
                self.files.insert(normalize(&edit.path), updated);
            }
        }
        Ok(())
    }

    /// Check a whole batch in order, collecting every rejected op.
    pub async fn check_all(&mut self, ops: &[FileOp]) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (index, op) in ops.iter().enumerate() {
            if let Err(error) = self.check(op).await {
                issues.push(ValidationIssue {
                    index,
                    path: op.path().to_string(),
                    error,
                });
            }
        }
        issues
    }
}
