//! Blocklist files on disk.
//!
//! Layout under the list directory:
//!
//! ```text
//! <lists>/blacklist.txt          user deny list
//! <lists>/whitelist.txt          user allow list
//! <lists>/filters/<category>.txt bundled lists (default, gambling, nsfw, trackers)
//! ```
//!
//! Files are newline-delimited. Blank lines and `#` comments are dropped
//! before entries reach a matcher; a missing file is an empty list.

use guardian::{Category, Classifier, GuardianError, LoadReport, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Subdirectory holding the bundled category lists.
pub const FILTERS_DIR: &str = "filters";

#[derive(Debug, Clone)]
pub struct Blocklists {
    root: PathBuf,
}

impl Blocklists {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding `category`'s entries.
    #[must_use]
    pub fn path_for(&self, category: Category) -> PathBuf {
        if category.is_user_list() {
            self.root.join(category.file_name())
        } else {
            self.root.join(FILTERS_DIR).join(category.file_name())
        }
    }

    /// Read `category`'s entries. A missing file yields no entries.
    pub fn read(&self, category: Category) -> Result<Vec<String>> {
        let path = self.path_for(category);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(parse_entries(&text)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No list at {}, treating {} as empty", path.display(), category);
                Ok(Vec::new())
            }
            Err(source) => Err(GuardianError::BlocklistRead { path, source }),
        }
    }

    /// Create the user list for `category` if it does not exist yet.
    pub fn ensure_user_list(&self, category: Category) -> Result<PathBuf> {
        if !category.is_user_list() {
            return Err(GuardianError::Config(format!(
                "{} is a bundled list, not a user list",
                category
            )));
        }
        std::fs::create_dir_all(&self.root)?;
        let path = self.path_for(category);
        if !path.exists() {
            std::fs::File::create(&path)?;
            info!("Created empty {} at {}", category, path.display());
        }
        Ok(path)
    }

    /// Load both user lists and the enabled bundled `categories` into
    /// `classifier`, replacing whatever each held before. Categories not
    /// enabled are cleared.
    pub fn load_into(&self, classifier: &Classifier, categories: &[Category]) -> Result<LoadReport> {
        let mut total = LoadReport::default();
        for category in Category::ALL {
            if category.is_user_list() || categories.contains(&category) {
                let entries = self.read(category)?;
                let report = classifier.load(category, &entries)?;
                total.loaded += report.loaded;
                total.skipped += report.skipped;
                total.saturated += report.saturated;
            } else {
                classifier.clear(category)?;
            }
        }
        Ok(total)
    }
}

/// Split list text into entries.
#[must_use]
pub fn parse_entries(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Open `path` in `$VISUAL` or `$EDITOR` and wait for the editor to exit.
pub fn open_in_editor(path: &Path) -> Result<()> {
    let editor = std::env::var("VISUAL")
        .or_else(|_| std::env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string());
    run_editor_command(&editor, path)
}

fn run_editor_command(editor: &str, path: &Path) -> Result<()> {
    // Allow "code --wait" style values.
    let mut parts = editor.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| GuardianError::Editor("editor command is empty".to_string()))?;

    let status = Command::new(program)
        .args(parts)
        .arg(path)
        .status()
        .map_err(|e| GuardianError::Editor(format!("failed to launch {}: {}", program, e)))?;

    if !status.success() {
        return Err(GuardianError::Editor(format!(
            "{} exited with {}",
            program, status
        )));
    }
    Ok(())
}

#[cfg(windows)]
fn default_editor() -> &'static str {
    "notepad"
}

#[cfg(not(windows))]
fn default_editor() -> &'static str {
    "vi"
}
