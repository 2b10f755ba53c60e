//! JSON-lines document store
//!
//! Layout: `<root>/<collection>.jsonl`, one checksummed document per line
//! (see `checksum.rs`).
//!
//! Durability rules:
//! - `insert_many` appends all lines in one write followed by fsync
//! - `delete_many` rewrites the surviving lines to a temp file, fsyncs it,
//!   then renames it over the collection
//! - A torn or checksum-failing final line is the residue of an interrupted
//!   append and is ignored on read, then truncated before the next append
//! - A checksum failure anywhere else is `StoreError::Corrupt`

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

use super::checksum::{decode_line, encode_line};
use super::errors::{StoreError, StoreResult};
use super::matcher::Matcher;
use super::pipeline::run_pipeline;
use super::{cursor_over, with_id, Cursor, DocumentStore, FindOptions};

const EXTENSION: &str = "jsonl";

/// File-backed document store
#[derive(Debug)]
pub struct JsonlStore {
    root: PathBuf,
    /// Serializes writers; holds the collections whose tail has been verified
    writers: Mutex<HashSet<String>>,
}

impl JsonlStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: &Path) -> StoreResult<Self> {
        fs::create_dir_all(root).map_err(|e| {
            StoreError::Io(format!("Failed to create store directory {}: {}", root.display(), e))
        })?;
        Ok(Self {
            root: root.to_path_buf(),
            writers: Mutex::new(HashSet::new()),
        })
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a collection file
    pub fn collection_path(&self, collection: &str) -> StoreResult<PathBuf> {
        let valid = !collection.is_empty()
            && collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidDocument(format!(
                "invalid collection name '{}'",
                collection
            )));
        }
        Ok(self.root.join(format!("{}.{}", collection, EXTENSION)))
    }

    fn scan(&self, collection: &str) -> StoreResult<LineScanner> {
        let path = self.collection_path(collection)?;
        match File::open(&path) {
            Ok(file) => Ok(LineScanner::new(collection, Some(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LineScanner::new(collection, None)),
            Err(e) => Err(StoreError::Io(format!("Failed to open {}: {}", path.display(), e))),
        }
    }

    fn lock_writers(&self) -> StoreResult<std::sync::MutexGuard<'_, HashSet<String>>> {
        self.writers
            .lock()
            .map_err(|_| StoreError::Internal("jsonl store lock poisoned".to_string()))
    }
}

/// Truncate an invalid final line left by an interrupted append
fn repair_tail(collection: &str, path: &Path) -> StoreResult<()> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let mut scanner = LineScanner::new(collection, Some(file));
    for document in scanner.by_ref() {
        document?;
    }
    let valid_len = scanner.valid_bytes;

    let actual_len = fs::metadata(path)?.len();
    if valid_len < actual_len {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(valid_len)?;
        file.sync_all()?;
    }
    Ok(())
}

impl DocumentStore for JsonlStore {
    fn find<'a>(&'a self, collection: &str, filter: &Value, options: FindOptions) -> StoreResult<Cursor<'a>> {
        let matcher = Matcher::compile(filter)?;
        let scanner = self.scan(collection)?;
        Ok(cursor_over(scanner, matcher, options))
    }

    fn aggregate(&self, collection: &str, pipeline: &[Value]) -> StoreResult<Vec<Value>> {
        run_pipeline(self.scan(collection)?, pipeline)
    }

    fn insert_many(&self, collection: &str, documents: Vec<Value>) -> StoreResult<u64> {
        if documents.is_empty() {
            return Ok(0);
        }
        let path = self.collection_path(collection)?;

        let mut buffer = String::new();
        for document in documents.iter().cloned() {
            let document = with_id(document)?;
            buffer.push_str(&encode_line(&serde_json::to_string(&document)?));
        }

        let mut verified = self.lock_writers()?;
        if !verified.contains(collection) {
            repair_tail(collection, &path)?;
            verified.insert(collection.to_string());
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(buffer.as_bytes())?;
        file.sync_all()?;

        Ok(documents.len() as u64)
    }

    fn delete_many(&self, collection: &str, filter: &Value) -> StoreResult<u64> {
        let matcher = Matcher::compile(filter)?;
        let path = self.collection_path(collection)?;

        let mut verified = self.lock_writers()?;

        let mut kept = Vec::new();
        let mut removed = 0u64;
        for document in self.scan(collection)? {
            let document = document?;
            if matcher.matches(&document) {
                removed += 1;
            } else {
                kept.push(document);
            }
        }
        if removed == 0 {
            return Ok(0);
        }

        let temp_path = path.with_extension(format!("{}.tmp", EXTENSION));
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            for document in &kept {
                writer.write_all(encode_line(&serde_json::to_string(document)?).as_bytes())?;
            }
            writer.flush()?;
            writer
                .into_inner()
                .map_err(|e| StoreError::Io(e.to_string()))?
                .sync_all()?;
        }
        fs::rename(&temp_path, &path)?;
        verified.insert(collection.to_string());

        Ok(removed)
    }

    fn count(&self, collection: &str, filter: &Value) -> StoreResult<u64> {
        let matcher = Matcher::compile(filter)?;
        let mut total = 0u64;
        for document in self.scan(collection)? {
            if matcher.matches(&document?) {
                total += 1;
            }
        }
        Ok(total)
    }
}

/// Sequential reader over a collection file
struct LineScanner {
    collection: String,
    reader: Option<BufReader<File>>,
    line_number: usize,
    /// Length of the prefix made of complete, valid lines
    valid_bytes: u64,
}

impl LineScanner {
    fn new(collection: &str, file: Option<File>) -> Self {
        Self {
            collection: collection.to_string(),
            reader: file.map(BufReader::new),
            line_number: 0,
            valid_bytes: 0,
        }
    }

    fn at_eof(&mut self) -> bool {
        match self.reader.as_mut() {
            Some(reader) => reader.fill_buf().map(|b| b.is_empty()).unwrap_or(true),
            None => true,
        }
    }

    fn corrupt(&self, reason: String) -> StoreError {
        StoreError::Corrupt {
            collection: self.collection.clone(),
            line: self.line_number,
            reason,
        }
    }
}

impl Iterator for LineScanner {
    type Item = StoreResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let reader = self.reader.as_mut()?;
            let mut line = String::new();
            let read = match reader.read_line(&mut line) {
                Ok(0) => {
                    self.reader = None;
                    return None;
                }
                Ok(read) => read,
                Err(e) => {
                    self.reader = None;
                    return Some(Err(e.into()));
                }
            };
            self.line_number += 1;

            // Torn final line
            if !line.ends_with('\n') {
                self.reader = None;
                return None;
            }

            let body = line.trim_end_matches('\n');
            if body.is_empty() {
                self.valid_bytes += read as u64;
                continue;
            }

            let parsed = decode_line(body).and_then(|json| {
                serde_json::from_str::<Value>(json).map_err(|e| format!("invalid JSON: {}", e))
            });
            match parsed {
                Ok(document) => {
                    self.valid_bytes += read as u64;
                    return Some(Ok(document));
                }
                Err(_) if self.at_eof() => {
                    self.reader = None;
                    return None;
                }
                Err(reason) => {
                    let err = self.corrupt(reason);
                    self.reader = None;
                    return Some(Err(err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn docs(n: usize, repertoire: &str) -> Vec<Value> {
        (0..n)
            .map(|i| json!({"sequence_id": format!("s{}", i), "repertoire_id": repertoire, "load_set": i % 2}))
            .collect()
    }

    #[test]
    fn test_insert_find_count() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        assert_eq!(store.insert_many("rearrangement", docs(5, "r1")).unwrap(), 5);

        assert_eq!(store.count("rearrangement", &json!({"load_set": 0})).unwrap(), 3);
        let found: Vec<Value> = store
            .find("rearrangement", &json!({}), FindOptions::default().skip(1).limit(2))
            .unwrap()
            .collect::<StoreResult<_>>()
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0]["sequence_id"], "s1");
    }

    #[test]
    fn test_reopen_preserves_documents() {
        let dir = TempDir::new().unwrap();
        {
            let store = JsonlStore::open(dir.path()).unwrap();
            store.insert_many("rearrangement", docs(3, "r1")).unwrap();
        }
        let store = JsonlStore::open(dir.path()).unwrap();
        assert_eq!(store.count("rearrangement", &json!({})).unwrap(), 3);
    }

    #[test]
    fn test_delete_many_rewrites() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        store.insert_many("rearrangement", docs(4, "r1")).unwrap();
        store.insert_many("rearrangement", docs(2, "r2")).unwrap();

        let filter = json!({"repertoire_id": "r1", "load_set": {"$gte": 1}});
        assert_eq!(store.delete_many("rearrangement", &filter).unwrap(), 2);
        assert_eq!(store.delete_many("rearrangement", &filter).unwrap(), 0);
        assert_eq!(store.count("rearrangement", &json!({})).unwrap(), 4);
    }

    #[test]
    fn test_torn_tail_ignored_and_repaired() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        store.insert_many("rearrangement", docs(2, "r1")).unwrap();

        let path = store.collection_path("rearrangement").unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"0000abcd\t{\"sequence_id\":").unwrap();
        drop(file);

        assert_eq!(store.count("rearrangement", &json!({})).unwrap(), 2);

        let reopened = JsonlStore::open(dir.path()).unwrap();
        reopened.insert_many("rearrangement", docs(1, "r2")).unwrap();
        assert_eq!(reopened.count("rearrangement", &json!({})).unwrap(), 3);
    }

    #[test]
    fn test_mid_file_corruption_detected() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        store.insert_many("rearrangement", docs(3, "r1")).unwrap();

        let path = store.collection_path("rearrangement").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.replacen("s0", "sX", 1)).unwrap();

        let err = store.count("rearrangement", &json!({})).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { line: 1, .. }));
    }

    #[test]
    fn test_corruption_inside_skipped_range_surfaces() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        store.insert_many("rearrangement", docs(3, "r1")).unwrap();

        let path = store.collection_path("rearrangement").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.replacen("s0", "sX", 1)).unwrap();

        for skip in [0, 1, 2] {
            let results: Vec<StoreResult<Value>> = store
                .find("rearrangement", &json!({}), FindOptions::default().skip(skip))
                .unwrap()
                .collect();
            assert_eq!(results.len(), 1, "skip {}", skip);
            assert!(matches!(results[0], Err(StoreError::Corrupt { line: 1, .. })));
        }
    }

    #[test]
    fn test_missing_collection_reads_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        assert_eq!(store.count("rearrangement", &json!({})).unwrap(), 0);
        assert_eq!(store.delete_many("rearrangement", &json!({})).unwrap(), 0);
    }

    #[test]
    fn test_rejects_path_like_collection_names() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        assert!(store.collection_path("../etc").is_err());
        assert!(store.collection_path("").is_err());
    }
}
