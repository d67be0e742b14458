use feed_api::Match;

// ════════════════════════════════════════════════════════════════
//  Configuration
// ════════════════════════════════════════════════════════════════

/// Режим записи.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Одна строка на id: повторная запись заменяет существующую.
    #[default]
    Upsert,
    /// Всегда дописывать в конец файла; при чтении побеждает последняя строка.
    Append,
}

fn default_table() -> String {
    "FootballMatches".into()
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct FileStoreConfig {
    pub data_dir: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default)]
    pub write_mode: WriteMode,
}

// ════════════════════════════════════════════════════════════════
//  On-disk record format
// ════════════════════════════════════════════════════════════════

/// Одна строка `{table}.jsonl`.
#[derive(serde::Serialize, serde::Deserialize)]
pub(crate) struct DiskRecord {
    pub stored_ms: i64,
    #[serde(rename = "match")]
    pub record: Match,
}
