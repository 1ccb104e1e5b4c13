//! FTS5 virtual table backing `StorageBackend::term_index_lookup`.
//!
//! The table is kept in sync with `memories` via triggers rather than
//! populated explicitly on every write, so a memory's searchable terms can
//! never drift from its stored content.

/// SQL to create the FTS5 virtual table over memory content.
///
/// `memory_id` is UNINDEXED so it's available for joins without being
/// tokenized itself. Tokenizer: porter unicode61, matching the teacher's
/// choice for stemming plus Unicode-aware tokenization.
pub const CREATE_MEMORIES_FTS_TABLE: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    memory_id UNINDEXED,
    content,
    tokenize='porter unicode61'
)
"#;

/// Triggers that keep `memories_fts` synchronized with `memories`.
pub const CREATE_MEMORIES_FTS_TRIGGERS: &str = r#"
CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(memory_id, content)
    VALUES (new.id, new.content);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
    UPDATE memories_fts SET content = new.content WHERE memory_id = new.id;
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    DELETE FROM memories_fts WHERE memory_id = old.id;
END;
"#;
