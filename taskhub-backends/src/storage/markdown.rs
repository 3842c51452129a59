//! Local markdown storage: one file per container.
//!
//! ```text
//! <dir>/
//!   Review requests.md
//! ```
//!
//! Each file holds a `# <container>` header followed by one line per issue:
//!
//! ```text
//! - [title](url) `origin`
//! ```
//!
//! Writes are buffered per file and flushed by `commit`, each file via a
//! `.md.tmp` sibling and an atomic rename. Every field round-trips, so
//! comparison uses the full value.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard};

use regex::Regex;

use taskhub_core::{ContainerName, Issue, IssueList};
use taskhub_sync::{io_err, ContainerId, StorageAdapter, StorageError};

use crate::error::BackendError;

static ITEM_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^- \[(?P<title>.*)\]\((?P<url>[^)\s]*)\)(?:\s+`(?P<origin>[^`]*)`)?\s*$")
        .expect("ITEM_LINE is a valid regex literal")
});

/// One container file held in memory.
#[derive(Debug)]
struct Document {
    name: String,
    issues: Vec<Issue>,
    dirty: bool,
}

impl Document {
    fn render(&self) -> String {
        let mut out = format!("# {}\n\n", self.name);
        for issue in &self.issues {
            out.push_str(&render_line(issue));
            out.push('\n');
        }
        out
    }
}

pub(crate) fn render_line(issue: &Issue) -> String {
    if issue.origin.is_empty() {
        format!("- [{}]({})", issue.title, issue.url)
    } else {
        format!("- [{}]({}) `{}`", issue.title, issue.url, issue.origin)
    }
}

/// Parse every item line of a container file. Headers, blank lines and
/// free text are skipped.
pub fn parse_document(contents: &str) -> IssueList {
    contents
        .lines()
        .filter_map(|line| ITEM_LINE.captures(line.trim_end()))
        .map(|caps| {
            Issue::new(
                &caps["title"],
                &caps["url"],
                caps.name("origin").map_or("", |m| m.as_str()),
            )
        })
        .collect()
}

/// File stem for a container name. Path separators and control characters
/// become `_`; a leading dot is dropped so the file is never hidden.
pub fn sanitise_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> Result<PathBuf, BackendError> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir().ok_or(BackendError::HomeNotFound)?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

pub struct MarkdownStorage {
    dir: PathBuf,
    /// File path → buffered document.
    docs: Mutex<HashMap<PathBuf, Document>>,
}

impl MarkdownStorage {
    /// `dir` is used as given; call [`expand_home`] first for user input.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            docs: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<sanitised name>.md`, pure, no I/O.
    pub fn container_path(&self, name: &ContainerName) -> PathBuf {
        self.dir.join(format!("{}.md", sanitise_name(name.as_str())))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Document>> {
        self.docs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load `name` into the buffer if it is not there yet.
    fn document<'a>(
        docs: &'a mut HashMap<PathBuf, Document>,
        path: &Path,
        name: &str,
    ) -> Result<&'a mut Document, StorageError> {
        if !docs.contains_key(path) {
            let (issues, dirty) = if path.exists() {
                let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
                (parse_document(&contents).into_iter().collect(), false)
            } else {
                (Vec::new(), true)
            };
            docs.insert(
                path.to_path_buf(),
                Document {
                    name: name.to_string(),
                    issues,
                    dirty,
                },
            );
        }
        docs.get_mut(path)
            .ok_or_else(|| StorageError::Backend(format!("{} not buffered", path.display())))
    }
}

impl StorageAdapter for MarkdownStorage {
    /// Creates the file on first use so an empty container is visible
    /// before the first commit.
    fn ensure_container(&self, name: &ContainerName) -> Result<ContainerId, StorageError> {
        let path = self.container_path(name);
        let mut docs = self.lock();
        let doc = Self::document(&mut docs, &path, name.as_str())?;
        if !path.exists() {
            write_atomic(&path, &doc.render())?;
            doc.dirty = false;
            tracing::info!(container = %name, path = %path.display(), "created markdown list");
        }
        Ok(ContainerId(path.to_string_lossy().into_owned()))
    }

    fn list_items(&self, container: &ContainerId) -> Result<IssueList, StorageError> {
        let path = PathBuf::from(&container.0);
        let docs = self.lock();
        if let Some(doc) = docs.get(&path) {
            return Ok(doc.issues.iter().cloned().collect());
        }
        drop(docs);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(parse_document(&contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(IssueList::new()),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    fn create(&self, container: &ContainerName, issue: &Issue) -> Result<(), StorageError> {
        let path = self.container_path(container);
        let mut docs = self.lock();
        let doc = Self::document(&mut docs, &path, container.as_str())?;
        doc.issues.push(issue.clone());
        doc.dirty = true;
        Ok(())
    }

    fn delete(&self, container: &ContainerName, issue: &Issue) -> Result<(), StorageError> {
        let path = self.container_path(container);
        let mut docs = self.lock();
        let doc = Self::document(&mut docs, &path, container.as_str())?;
        let before = doc.issues.len();
        // Full-value storage: a same-titled item with another url stays.
        doc.issues.retain(|existing| existing != issue);
        if doc.issues.len() != before {
            doc.dirty = true;
        }
        Ok(())
    }

    fn compare_by_title_only(&self) -> bool {
        false
    }

    fn commit(&self, description: &str) -> Result<(), StorageError> {
        let mut docs = self.lock();
        let mut written = 0;
        for (path, doc) in docs.iter_mut().filter(|(_, doc)| doc.dirty) {
            write_atomic(path, &doc.render())?;
            doc.dirty = false;
            written += 1;
        }
        tracing::debug!(description, files = written, "markdown commit");
        Ok(())
    }
}

/// Write via a `.md.tmp` sibling and rename. On rename failure the tmp file
/// is removed and the original left untouched.
fn write_atomic(path: &Path, contents: &str) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = path.with_extension("md.tmp");
    std::fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}
