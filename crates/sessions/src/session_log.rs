use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use circle_domain::model::{EmbeddingStorageMode, SessionRecord, SessionTotals, TurnRecord};
use circle_domain::trace::TraceEvent;
use circle_domain::{Error, Result};

/// Append-only record of a session's turns, with incremental
/// checkpoint-after-turn and resume-from-checkpoint (§2 component 4, §4.6).
pub struct SessionLog {
    record: SessionRecord,
    state_dir: PathBuf,
    /// The `[turns × dim]` embedding matrix, populated only in
    /// `EmbeddingStorageMode::SeparateFile`. A turn with no embedding
    /// (failed embed, §3) contributes a zero row so row `i` still lines up
    /// with `record.turns[i]`; never serialized into the turn's own JSON.
    embeddings: Vec<Vec<f32>>,
    embedding_dim: Option<usize>,
}

fn checkpoint_path(state_dir: &Path, session_id: &str) -> PathBuf {
    state_dir.join(format!("session_{session_id}_checkpoint.json"))
}

fn final_path(state_dir: &Path, session_id: &str) -> PathBuf {
    state_dir.join(format!("session_{session_id}.json"))
}

fn embeddings_path(state_dir: &Path, session_id: &str) -> PathBuf {
    state_dir.join(format!("session_{session_id}_embeddings.bin"))
}

/// Writes `contents` to `path` atomically: write to a sibling temp file,
/// then rename over the destination. Diverges deliberately from a
/// non-atomic predecessor for crash-safety (§4.6).
fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("tmp").to_string();
    tmp_name.push_str(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

impl SessionLog {
    pub fn start(
        session_id: String,
        mode: String,
        provocation_id: Option<String>,
        provocation_text: String,
        seed: i64,
        config_path: Option<String>,
        state_dir: PathBuf,
        embedding_storage_mode: EmbeddingStorageMode,
        model_assignments: HashMap<String, String>,
        temperature_assignments: HashMap<String, f64>,
    ) -> Self {
        let embeddings_file = if embedding_storage_mode == EmbeddingStorageMode::SeparateFile {
            Some(
                embeddings_path(&state_dir, &session_id)
                    .to_string_lossy()
                    .to_string(),
            )
        } else {
            None
        };
        let record = SessionRecord {
            session_id: session_id.clone(),
            mode: mode.clone(),
            provocation_id,
            provocation_text,
            seed,
            config_path,
            start_time: Utc::now(),
            end_time: None,
            model_assignments,
            temperature_assignments,
            turns: Vec::new(),
            totals: SessionTotals::default(),
            embedding_storage_mode,
            embeddings_file,
        };
        TraceEvent::SessionStarted {
            session_id,
            mode,
            agent_count: record.model_assignments.len(),
            seed,
        }
        .emit();
        Self { record, state_dir, embeddings: Vec::new(), embedding_dim: None }
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    /// The `[turns × dim]` embedding matrix. Empty in `Inline` mode, where
    /// each turn carries its own embedding instead; populated in
    /// `SeparateFile` mode either by `log_turn`/`stash_embedding` as turns
    /// are generated, or by `resume_from` reading the `.bin` file back in.
    pub fn embeddings_matrix(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        checkpoint_path(&self.state_dir, &self.record.session_id)
    }

    pub fn final_path(&self) -> PathBuf {
        final_path(&self.state_dir, &self.record.session_id)
    }

    /// Appends a turn and writes a checkpoint. No turn is ever discarded
    /// once this returns (§3 invariant); the checkpoint precedes the next
    /// scheduler decision.
    pub fn log_turn(&mut self, mut turn: TurnRecord) -> Result<()> {
        self.record.totals.total_latency_ms += turn.latency_ms;
        self.record.totals.total_tokens +=
            (turn.prompt_tokens.unwrap_or(0) + turn.completion_tokens.unwrap_or(0)) as u64;
        let turn_number = turn.turn_number;
        self.stash_embedding(&mut turn);
        self.record.turns.push(turn);
        self.write_checkpoint()?;
        self.write_embeddings_file()?;
        TraceEvent::CheckpointWritten {
            session_id: self.record.session_id.clone(),
            turn_number,
            path: self.checkpoint_path().to_string_lossy().to_string(),
        }
        .emit();
        Ok(())
    }

    /// In `SeparateFile` mode, moves `turn.embedding` out of the turn and
    /// into the in-memory matrix (§6.4) so it never reaches the checkpoint
    /// JSON. A turn with no embedding contributes a zero row to keep the
    /// matrix's row count aligned with `record.turns`. No-op in `Inline`
    /// mode, where the embedding stays on the turn.
    fn stash_embedding(&mut self, turn: &mut TurnRecord) {
        if self.record.embedding_storage_mode != EmbeddingStorageMode::SeparateFile {
            return;
        }
        let row = turn.embedding.take().unwrap_or_default();
        if self.embedding_dim.is_none() && !row.is_empty() {
            self.embedding_dim = Some(row.len());
        }
        self.embeddings.push(row);
    }

    /// Rewrites the companion `.bin` file with the full `[turns × dim]`
    /// matrix: a little-endian `u32` dimension header followed by each
    /// row's `f32`s, rewritten in full on every checkpoint like the JSON
    /// side. No-op outside `SeparateFile` mode.
    fn write_embeddings_file(&self) -> Result<()> {
        if self.record.embedding_storage_mode != EmbeddingStorageMode::SeparateFile {
            return Ok(());
        }
        let Some(path) = self.record.embeddings_file.as_ref() else {
            return Ok(());
        };
        let dim = self.embedding_dim.unwrap_or(0);
        let mut bytes = Vec::with_capacity(4 + self.embeddings.len() * dim * 4);
        bytes.extend_from_slice(&(dim as u32).to_le_bytes());
        for row in &self.embeddings {
            for i in 0..dim {
                let v = row.get(i).copied().unwrap_or(0.0);
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        write_atomic(Path::new(path), &bytes).map_err(Error::Io)
    }

    /// Re-emits an already-loaded turn during resume without triggering a
    /// checkpoint write (§4.6 step 4).
    pub fn replay_turn(&mut self, turn: TurnRecord) {
        self.record.totals.total_latency_ms += turn.latency_ms;
        self.record.totals.total_tokens +=
            (turn.prompt_tokens.unwrap_or(0) + turn.completion_tokens.unwrap_or(0)) as u64;
        self.record.turns.push(turn);
    }

    fn write_checkpoint(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.record)?;
        write_atomic(&self.checkpoint_path(), &json).map_err(Error::Io)
    }

    /// Writes the final artifact without the `_checkpoint` suffix and
    /// stamps `end_time`.
    pub fn end_session(&mut self) -> Result<PathBuf> {
        self.record.end_time = Some(Utc::now());
        let json = serde_json::to_vec_pretty(&self.record)?;
        write_atomic(&self.final_path(), &json).map_err(Error::Io)?;
        TraceEvent::SessionEnded {
            session_id: self.record.session_id.clone(),
            turn_count: self.record.turns.len(),
            total_latency_ms: self.record.totals.total_latency_ms,
        }
        .emit();
        Ok(self.final_path())
    }

    /// Loads a checkpoint (or final artifact) and rehydrates history, per
    /// §4.6's resume contract (step 1). `record.turns` is returned
    /// separately with totals reset to zero; the caller replays them one by
    /// one via [`SessionLog::replay_turn`] (step 4) after re-running the
    /// scheduler's selection functions over the same sequence (step 2). In
    /// `SeparateFile` mode the embedding matrix is loaded back from its
    /// companion `.bin` file so future checkpoints keep writing the full
    /// history rather than just the turns generated after resume.
    pub fn resume_from(checkpoint_path: &Path, state_dir: PathBuf) -> Result<(Self, Vec<TurnRecord>)> {
        let raw = std::fs::read_to_string(checkpoint_path)?;
        let mut record: SessionRecord = serde_json::from_str(&raw)?;
        let turns = std::mem::take(&mut record.turns);
        record.totals = SessionTotals::default();

        let (embeddings, embedding_dim) = if record.embedding_storage_mode
            == EmbeddingStorageMode::SeparateFile
        {
            match record.embeddings_file.as_deref().map(Path::new).map(read_embeddings_matrix) {
                Some(Ok(loaded)) => loaded,
                Some(Err(err)) => {
                    tracing::warn!(%err, "failed to read embeddings file on resume, starting with an empty matrix");
                    (Vec::new(), None)
                }
                None => (Vec::new(), None),
            }
        } else {
            (Vec::new(), None)
        };

        Ok((Self { record, state_dir, embeddings, embedding_dim }, turns))
    }

    pub fn start_turn(&self) -> u64 {
        self.record.turns.len() as u64 + 1
    }
}

/// Reads back a `.bin` matrix written by [`SessionLog::write_embeddings_file`]:
/// a `u32` row width followed by that many `f32`s per row.
fn read_embeddings_matrix(path: &Path) -> Result<(Vec<Vec<f32>>, Option<usize>)> {
    let bytes = std::fs::read(path)?;
    if bytes.len() < 4 {
        return Ok((Vec::new(), None));
    }
    let dim = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    if dim == 0 {
        return Ok((Vec::new(), None));
    }
    let row_bytes = dim * 4;
    let mut matrix = Vec::new();
    let mut offset = 4;
    while offset + row_bytes <= bytes.len() {
        let row = (0..dim)
            .map(|i| {
                let start = offset + i * 4;
                f32::from_le_bytes(bytes[start..start + 4].try_into().unwrap())
            })
            .collect();
        matrix.push(row);
        offset += row_bytes;
    }
    Ok((matrix, Some(dim)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("circle-session-log-test-{}", uuid::Uuid::new_v4()))
    }

    fn turn(n: u64) -> TurnRecord {
        TurnRecord {
            turn_number: n,
            agent_id: "a".into(),
            agent_name: "A".into(),
            content: "hello".into(),
            model: "llama3".into(),
            temperature: 0.5,
            latency_ms: 10,
            prompt_tokens: Some(5),
            completion_tokens: Some(7),
            timestamp: Utc::now(),
            embedding: None,
        }
    }

    #[test]
    fn log_turn_writes_a_readable_checkpoint() {
        let dir = tmp_dir();
        let mut log = SessionLog::start(
            "s1".into(),
            "multi_model".into(),
            None,
            "why?".into(),
            42,
            None,
            dir.clone(),
            EmbeddingStorageMode::Inline,
            HashMap::new(),
            HashMap::new(),
        );
        log.log_turn(turn(1)).unwrap();
        let checkpoint = std::fs::read_to_string(log.checkpoint_path()).unwrap();
        let parsed: SessionRecord = serde_json::from_str(&checkpoint).unwrap();
        assert_eq!(parsed.turns.len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn resume_from_checkpoint_reproduces_history() {
        let dir = tmp_dir();
        let mut log = SessionLog::start(
            "s2".into(),
            "multi_model".into(),
            None,
            "why?".into(),
            42,
            None,
            dir.clone(),
            EmbeddingStorageMode::Inline,
            HashMap::new(),
            HashMap::new(),
        );
        log.log_turn(turn(1)).unwrap();
        log.log_turn(turn(2)).unwrap();

        let (mut resumed, loaded_turns) =
            SessionLog::resume_from(&log.checkpoint_path(), dir.clone()).unwrap();
        assert_eq!(resumed.record().turns.len(), 0);
        assert_eq!(loaded_turns.len(), 2);
        for t in loaded_turns {
            resumed.replay_turn(t);
        }
        assert_eq!(resumed.record().turns.len(), 2);
        assert_eq!(resumed.start_turn(), 3);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn separate_file_mode_strips_inline_embedding_and_writes_matrix() {
        let dir = tmp_dir();
        let mut log = SessionLog::start(
            "s4".into(),
            "multi_model".into(),
            None,
            "why?".into(),
            42,
            None,
            dir.clone(),
            EmbeddingStorageMode::SeparateFile,
            HashMap::new(),
            HashMap::new(),
        );
        let mut t = turn(1);
        t.embedding = Some(vec![1.0, 2.0, 3.0]);
        log.log_turn(t).unwrap();

        assert!(log.record().turns[0].embedding.is_none());
        let embeddings_path = log.record().embeddings_file.clone().unwrap();
        let bytes = std::fs::read(&embeddings_path).unwrap();
        assert_eq!(bytes.len(), 4 + 3 * 4);

        let (matrix, dim) = read_embeddings_matrix(Path::new(&embeddings_path)).unwrap();
        assert_eq!(dim, Some(3));
        assert_eq!(matrix, vec![vec![1.0, 2.0, 3.0]]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn separate_file_mode_resume_preserves_prior_matrix_rows() {
        let dir = tmp_dir();
        let mut log = SessionLog::start(
            "s5".into(),
            "multi_model".into(),
            None,
            "why?".into(),
            42,
            None,
            dir.clone(),
            EmbeddingStorageMode::SeparateFile,
            HashMap::new(),
            HashMap::new(),
        );
        let mut t1 = turn(1);
        t1.embedding = Some(vec![1.0, 2.0]);
        log.log_turn(t1).unwrap();

        let (mut resumed, loaded_turns) =
            SessionLog::resume_from(&log.checkpoint_path(), dir.clone()).unwrap();
        assert_eq!(resumed.embeddings, vec![vec![1.0, 2.0]]);
        for t in loaded_turns {
            resumed.replay_turn(t);
        }

        let mut t2 = turn(2);
        t2.embedding = Some(vec![3.0, 4.0]);
        resumed.log_turn(t2).unwrap();

        let embeddings_path = resumed.record().embeddings_file.clone().unwrap();
        let (matrix, _) = read_embeddings_matrix(Path::new(&embeddings_path)).unwrap();
        assert_eq!(matrix, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn end_session_stamps_end_time_and_drops_checkpoint_suffix() {
        let dir = tmp_dir();
        let mut log = SessionLog::start(
            "s3".into(),
            "multi_model".into(),
            None,
            "why?".into(),
            42,
            None,
            dir.clone(),
            EmbeddingStorageMode::Inline,
            HashMap::new(),
            HashMap::new(),
        );
        log.log_turn(turn(1)).unwrap();
        let path = log.end_session().unwrap();
        assert!(!path.to_string_lossy().contains("_checkpoint"));
        assert!(log.record().end_time.is_some());
        std::fs::remove_dir_all(&dir).ok();
    }
}
