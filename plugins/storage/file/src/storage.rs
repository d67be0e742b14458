use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use uuid::Uuid;

use feed_api::{Match, MatchStore, StoreError, StoreQuery, now_ms};

use super::config::{DiskRecord, FileStoreConfig, WriteMode};

#[derive(Default)]
struct Index {
    by_id: HashMap<Uuid, (i64, Match)>,
    /// Ids in order of first appearance in the file.
    order: Vec<Uuid>,
    loaded: bool,
}

impl Index {
    fn put(&mut self, stored_ms: i64, record: Match) {
        if self.by_id.insert(record.id, (stored_ms, record.clone())).is_none() {
            self.order.push(record.id);
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  FileMatchStore
// ════════════════════════════════════════════════════════════════

/// Match store over a single JSONL file.
///
/// The file is the source of truth; an in-memory index (loaded on `init`
/// or on first use) serves `get` and `query`. In upsert mode an update of
/// the last written record rewrites only the last line, any other update
/// rewrites the file through a temporary copy.
pub struct FileMatchStore {
    data_dir: PathBuf,
    path: PathBuf,
    write_mode: WriteMode,
    index: Mutex<Index>,
}

impl FileMatchStore {
    pub fn new(config: &FileStoreConfig) -> Self {
        let data_dir = PathBuf::from(&config.data_dir);
        Self {
            path: data_dir.join(format!("{}.jsonl", config.table)),
            data_dir,
            write_mode: config.write_mode,
            index: Mutex::new(Index::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_loaded(&self, index: &mut Index) -> Result<(), StoreError> {
        if index.loaded {
            return Ok(());
        }
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| StoreError::Io(format!("mkdir {}: {e}", self.data_dir.display())))?;

        *index = Index::default();
        if self.path.exists() {
            let f = File::open(&self.path).map_err(|e| io_err("open", &self.path, e))?;
            for (n, line) in BufReader::new(f).lines().enumerate() {
                let line = line.map_err(|e| StoreError::Io(format!("read line: {e}")))?;
                if line.trim().is_empty() {
                    continue;
                }
                let disk: DiskRecord = serde_json::from_str(&line)
                    .map_err(|e| StoreError::Format(format!("{}:{}: {e}", self.path.display(), n + 1)))?;
                index.put(disk.stored_ms, disk.record);
            }
        }
        index.loaded = true;
        tracing::debug!(path = %self.path.display(), records = index.order.len(), "file store loaded");
        Ok(())
    }

    fn do_upsert(&self, index: &mut Index, record: &Match) -> Result<(), StoreError> {
        self.ensure_loaded(index)?;

        let stored_ms = now_ms();
        let line = serialize_line(stored_ms, record)?;
        let exists = index.by_id.contains_key(&record.id);

        match (self.write_mode, exists) {
            (WriteMode::Append, _) | (WriteMode::Upsert, false) => append_line(&self.path, &line)?,
            (WriteMode::Upsert, true) => {
                if !self.replace_last_line(&record.id, &line)? {
                    self.rewrite(index, stored_ms, record)?;
                }
            }
        }
        index.put(stored_ms, record.clone());
        Ok(())
    }

    /// Overwrite the last line when it holds `id`. Returns `false` otherwise.
    fn replace_last_line(&self, id: &Uuid, line: &str) -> Result<bool, StoreError> {
        let mut f = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| io_err("open", &self.path, e))?;

        let Some((last, pos)) = read_last_line(&mut f)? else {
            return Ok(false);
        };
        if parse_id(&last).ok() != Some(*id) {
            return Ok(false);
        }

        f.seek(SeekFrom::Start(pos)).map_err(|e| StoreError::Io(format!("seek: {e}")))?;
        f.set_len(pos).map_err(|e| StoreError::Io(format!("truncate: {e}")))?;
        writeln!(f, "{line}").map_err(|e| StoreError::Io(format!("write: {e}")))?;
        Ok(true)
    }

    /// Write the index with `updated` in its slot to a temporary file and
    /// rename it over the table. The index itself is left untouched.
    fn rewrite(&self, index: &Index, stored_ms: i64, updated: &Match) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut f = File::create(&tmp).map_err(|e| io_err("create", &tmp, e))?;
            for id in &index.order {
                let line = if *id == updated.id {
                    serialize_line(stored_ms, updated)?
                } else if let Some((ms, record)) = index.by_id.get(id) {
                    serialize_line(*ms, record)?
                } else {
                    continue;
                };
                writeln!(f, "{line}").map_err(|e| StoreError::Io(format!("write: {e}")))?;
            }
            f.sync_all().map_err(|e| StoreError::Io(format!("sync: {e}")))?;
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| io_err("rename", &tmp, e))
    }
}

impl MatchStore for FileMatchStore {
    fn init(&self) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut index = self.index.lock().await;
            index.loaded = false;
            self.ensure_loaded(&mut index)
        })
    }

    fn upsert<'a>(
        &'a self,
        record: &'a Match,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut index = self.index.lock().await;
            self.do_upsert(&mut index, record)
        })
    }

    fn get(&self, id: Uuid) -> Pin<Box<dyn Future<Output = Result<Option<Match>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut index = self.index.lock().await;
            self.ensure_loaded(&mut index)?;
            Ok(index.by_id.get(&id).map(|(_, m)| m.clone()))
        })
    }

    fn query<'a>(
        &'a self,
        query: &'a StoreQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Match>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut index = self.index.lock().await;
            self.ensure_loaded(&mut index)?;
            let mut result: Vec<Match> = index
                .by_id
                .values()
                .map(|(_, m)| m)
                .filter(|m| query.matches(m))
                .cloned()
                .collect();
            result.sort_by(|a, b| a.kick_off.cmp(&b.kick_off).then(a.id.cmp(&b.id)));
            if let Some(limit) = query.limit {
                result.truncate(limit);
            }
            Ok(result)
        })
    }

    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            let _index = self.index.lock().await;
            if !self.path.exists() {
                return Ok(());
            }
            let f = OpenOptions::new()
                .append(true)
                .open(&self.path)
                .map_err(|e| io_err("open", &self.path, e))?;
            f.sync_all().map_err(|e| StoreError::Io(format!("sync: {e}")))
        })
    }
}

// ════════════════════════════════════════════════════════════════
//  Helpers
// ════════════════════════════════════════════════════════════════

fn io_err(op: &str, path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Io(format!("{op} {}: {e}", path.display()))
}

fn serialize_line(stored_ms: i64, record: &Match) -> Result<String, StoreError> {
    serde_json::to_string(&DiskRecord {
        stored_ms,
        record: record.clone(),
    })
    .map_err(|e| StoreError::Format(format!("json serialize: {e}")))
}

fn append_line(path: &Path, line: &str) -> Result<(), StoreError> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_err("open", path, e))?;
    writeln!(f, "{line}").map_err(|e| StoreError::Io(format!("write: {e}")))
}

/// Последняя непустая строка файла и позиция её начала.
fn read_last_line(f: &mut File) -> Result<Option<(String, u64)>, StoreError> {
    let len = f.seek(SeekFrom::End(0)).map_err(|e| StoreError::Io(format!("seek: {e}")))?;
    if len == 0 {
        return Ok(None);
    }

    let mut pos = len;
    let mut found_content = false;
    while pos > 0 {
        pos -= 1;
        f.seek(SeekFrom::Start(pos)).map_err(|e| StoreError::Io(format!("seek: {e}")))?;
        let mut buf = [0u8; 1];
        f.read_exact(&mut buf).map_err(|e| StoreError::Io(format!("read: {e}")))?;

        if buf[0] == b'\n' {
            if found_content {
                pos += 1;
                break;
            }
        } else {
            found_content = true;
        }
    }

    f.seek(SeekFrom::Start(pos)).map_err(|e| StoreError::Io(format!("seek: {e}")))?;
    let mut line = String::new();
    BufReader::new(&*f)
        .read_line(&mut line)
        .map_err(|e| StoreError::Io(format!("read_line: {e}")))?;

    let line = line.trim_end().to_string();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some((line, pos)))
}

/// Извлечь id матча без полной десериализации записи.
fn parse_id(line: &str) -> Result<Uuid, StoreError> {
    #[derive(serde::Deserialize)]
    struct IdOnly {
        id: Uuid,
    }
    #[derive(serde::Deserialize)]
    struct Line {
        #[serde(rename = "match")]
        record: IdOnly,
    }
    let parsed: Line =
        serde_json::from_str(line).map_err(|e| StoreError::Format(format!("parse id: {e}")))?;
    Ok(parsed.record.id)
}
