//! File-backed Queue Service.
//!
//! Each named queue is a JSON-lines file under one directory. Queues are
//! loaded lazily on first access and mirrored in memory; `enqueue` appends a
//! line, `dequeue` rewrites the file.

use std::collections::{HashMap, VecDeque};
use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;

use crate::core::{QueueError, QueueService};

/// Durable named queues stored as JSONL files.
pub struct FileQueueService {
    path: PathBuf,
    max_depth: Option<usize>,
    queues: Mutex<HashMap<String, VecDeque<Value>>>,
}

impl FileQueueService {
    /// Open (creating if needed) a queue directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let path = path.as_ref().to_path_buf();
        create_dir_all(&path).map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(Self {
            path,
            max_depth: None,
            queues: Mutex::new(HashMap::new()),
        })
    }

    /// Reject items beyond `max_depth` per queue.
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Directory holding the queue files.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_path(&self, queue: &str) -> PathBuf {
        let stem: String = queue
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.path.join(format!("{stem}.jsonl"))
    }

    fn load_from_disk(&self, queue: &str) -> Result<VecDeque<Value>, QueueError> {
        let file_path = self.file_path(queue);
        let mut items = VecDeque::new();
        if !file_path.exists() {
            return Ok(items);
        }
        let file = OpenOptions::new()
            .read(true)
            .open(&file_path)
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| QueueError::Backend(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let item: Value =
                serde_json::from_str(&line).map_err(|e| QueueError::Backend(e.to_string()))?;
            items.push_back(item);
        }
        Ok(items)
    }

    fn append_to_disk(&self, queue: &str, item: &Value) -> Result<(), QueueError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_path(queue))
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        let line = serde_json::to_string(item).map_err(|e| QueueError::Backend(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| QueueError::Backend(e.to_string()))
    }

    fn rewrite_disk(&self, queue: &str, items: &VecDeque<Value>) -> Result<(), QueueError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.file_path(queue))
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        for item in items {
            let line =
                serde_json::to_string(item).map_err(|e| QueueError::Backend(e.to_string()))?;
            writeln!(file, "{line}").map_err(|e| QueueError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    fn with_queue<T>(
        &self,
        queue: &str,
        f: impl FnOnce(&Self, &mut VecDeque<Value>) -> Result<T, QueueError>,
    ) -> Result<T, QueueError> {
        let mut queues = self.queues.lock();
        if !queues.contains_key(queue) {
            let loaded = self.load_from_disk(queue)?;
            queues.insert(queue.to_owned(), loaded);
        }
        let items = queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::Backend(format!("queue `{queue}` failed to load")))?;
        f(self, items)
    }
}

impl QueueService for FileQueueService {
    fn enqueue(&self, queue: &str, payload: Value) -> Result<(), QueueError> {
        self.with_queue(queue, |this, items| {
            if this.max_depth.is_some_and(|max| items.len() >= max) {
                return Err(QueueError::Full(queue.to_owned()));
            }
            this.append_to_disk(queue, &payload)?;
            items.push_back(payload);
            Ok(())
        })
    }

    fn dequeue(&self, queue: &str) -> Result<Option<Value>, QueueError> {
        self.with_queue(queue, |this, items| {
            let Some(item) = items.pop_front() else {
                return Ok(None);
            };
            if let Err(e) = this.rewrite_disk(queue, items) {
                items.push_front(item);
                return Err(e);
            }
            Ok(Some(item))
        })
    }

    fn size(&self, queue: &str) -> Result<usize, QueueError> {
        self.with_queue(queue, |_, items| Ok(items.len()))
    }
}
