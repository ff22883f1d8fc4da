//! Durable per-patient settings store.
//!
//! One filesystem namespace per patient id under `<root>/<patient_id>/`:
//! - `settings.json` — weights + thresholds + profile + audit trail
//! - `history.csv` — append-only audit history (side-effect sink)
//! - `history_context.json` / `image_context.json` — append-only context
//!
//! Read path is fail-open: corrupted or missing state yields a fresh
//! default profile so inference can always proceed. Write path is
//! fail-fast: the save is the operation the caller asked for, so I/O
//! errors surface. All load-merge-save sequences for one patient are
//! serialized through a lazily created per-patient lock; different
//! patients never contend.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{AuditRecord, PatientProfile, Thresholds};

const SETTINGS_FILE: &str = "settings.json";
const AUDIT_FILE: &str = "history.csv";
const AUDIT_HEADER: &str = "timestamp,author,change_summary";

const MAX_PATIENT_ID_LEN: usize = 64;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid patient id: {0}")]
    InvalidPatientId(String),
    #[error("Thresholds must satisfy low < medium < high within [0, 1]")]
    InvalidThresholds,
    #[error("Weight for '{0}' must be a positive finite number")]
    InvalidWeight(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Internal lock error")]
    LockPoisoned,
}

/// Which append-only context document to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    History,
    Image,
}

impl ContextKind {
    fn file_name(self) -> &'static str {
        match self {
            ContextKind::History => "history_context.json",
            ContextKind::Image => "image_context.json",
        }
    }
}

/// Partial threshold update; `None` keeps the stored value.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ThresholdUpdate {
    pub low: Option<f64>,
    pub medium: Option<f64>,
    pub high: Option<f64>,
}

/// On-disk shape of `settings.json`. Contexts live in their own files so
/// an append never rewrites the settings document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsDocument {
    weights: BTreeMap<String, f64>,
    thresholds: Thresholds,
    profile: BTreeMap<String, Value>,
    audit_trail: Vec<AuditRecord>,
}

/// Durable per-patient read/modify/write of personalization state.
pub struct PatientSettingsStore {
    root: PathBuf,
    /// Lazily created per-patient mutexes serializing load-merge-save.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PatientSettingsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Load persisted state, or a fresh default profile if none exists.
    ///
    /// Never fails for a syntactically valid patient id: corrupted
    /// documents are logged and replaced by defaults in-memory (the files
    /// on disk are left untouched until the next save).
    pub fn load(&self, patient_id: &str) -> Result<PatientProfile, StoreError> {
        let dir = self.patient_dir(patient_id)?;
        let mut profile = PatientProfile::with_defaults(patient_id);

        match read_json::<SettingsDocument>(&dir.join(SETTINGS_FILE)) {
            ReadOutcome::Found(doc) => {
                profile.weights = doc.weights;
                profile.thresholds = doc.thresholds;
                profile.profile = doc.profile;
                profile.audit_trail = doc.audit_trail;
            }
            ReadOutcome::Missing => {
                tracing::debug!(patient_id, "No persisted settings, using defaults");
            }
            ReadOutcome::Corrupted(detail) => {
                tracing::warn!(
                    patient_id,
                    detail,
                    "Corrupted settings document, falling back to defaults"
                );
            }
        }

        profile.history_context = self.load_context_map(&dir, patient_id, ContextKind::History);
        profile.image_context = self.load_context_map(&dir, patient_id, ContextKind::Image);

        Ok(profile)
    }

    /// Atomically replace weights/thresholds/profile and append exactly one
    /// audit record summarizing the changed sections. Context documents are
    /// owned by `append_context` and are not touched here.
    pub fn save(
        &self,
        profile: &PatientProfile,
        author: &str,
    ) -> Result<(), StoreError> {
        validate_weights(&profile.weights)?;
        if !profile.thresholds.is_valid() {
            return Err(StoreError::InvalidThresholds);
        }

        let lock = self.lock_for(&profile.patient_id)?;
        let _guard = lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        let current = self.load(&profile.patient_id)?;
        let summary = change_summary(&current, profile);
        self.save_locked(profile, author, &summary)
    }

    /// Merge a partial weight update (last-writer-wins per key) and save.
    pub fn update_weights(
        &self,
        patient_id: &str,
        partial: &BTreeMap<String, f64>,
        author: &str,
    ) -> Result<(), StoreError> {
        validate_weights(partial)?;

        let lock = self.lock_for(patient_id)?;
        let _guard = lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        let mut profile = self.load(patient_id)?;
        for (key, value) in partial {
            profile.weights.insert(key.clone(), *value);
        }
        self.save_locked(&profile, author, &format!("weights({})", partial.len()))
    }

    /// Merge a partial threshold update and save. The merged result must
    /// satisfy `low < medium < high` or the update is rejected before
    /// anything is persisted.
    pub fn update_thresholds(
        &self,
        patient_id: &str,
        partial: ThresholdUpdate,
        author: &str,
    ) -> Result<(), StoreError> {
        let lock = self.lock_for(patient_id)?;
        let _guard = lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        let mut profile = self.load(patient_id)?;
        let merged = Thresholds {
            low: partial.low.unwrap_or(profile.thresholds.low),
            medium: partial.medium.unwrap_or(profile.thresholds.medium),
            high: partial.high.unwrap_or(profile.thresholds.high),
        };
        if !merged.is_valid() {
            return Err(StoreError::InvalidThresholds);
        }
        profile.thresholds = merged;
        self.save_locked(&profile, author, "thresholds")
    }

    /// Merge partial profile facts (last-writer-wins per key) and save.
    pub fn update_profile(
        &self,
        patient_id: &str,
        partial: &BTreeMap<String, Value>,
        author: &str,
    ) -> Result<(), StoreError> {
        let lock = self.lock_for(patient_id)?;
        let _guard = lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        let mut profile = self.load(patient_id)?;
        for (key, value) in partial {
            profile.profile.insert(key.clone(), value.clone());
        }
        self.save_locked(&profile, author, &format!("profile({})", partial.len()))
    }

    /// Append a timestamp-keyed snapshot to the given context document.
    /// Prior entries are never removed or overwritten.
    pub fn append_context(
        &self,
        patient_id: &str,
        kind: ContextKind,
        snapshot: Value,
    ) -> Result<(), StoreError> {
        let dir = self.patient_dir(patient_id)?;

        let lock = self.lock_for(patient_id)?;
        let _guard = lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        let mut entries = self.load_context_map(&dir, patient_id, kind);
        let mut key = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
        // Disambiguate sub-microsecond appends rather than overwrite.
        let mut n = 1;
        while entries.contains_key(&key) {
            n += 1;
            key = format!("{}#{}", key.split('#').next().unwrap_or(&key), n);
        }
        entries.insert(key, snapshot);

        fs::create_dir_all(&dir)?;
        write_json_atomic(&dir.join(kind.file_name()), &entries)?;
        tracing::debug!(patient_id, kind = ?kind, total = entries.len(), "Context appended");
        Ok(())
    }

    // ── Internal ────────────────────────────────────────────

    /// Settings write under an already-held patient lock: atomic JSON
    /// replace plus one CSV audit line.
    fn save_locked(
        &self,
        profile: &PatientProfile,
        author: &str,
        summary: &str,
    ) -> Result<(), StoreError> {
        let dir = self.patient_dir(&profile.patient_id)?;
        fs::create_dir_all(&dir)?;

        let record = AuditRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            author: author.to_string(),
            change_summary: summary.to_string(),
        };

        let mut audit_trail = profile.audit_trail.clone();
        audit_trail.push(record.clone());

        let doc = SettingsDocument {
            weights: profile.weights.clone(),
            thresholds: profile.thresholds,
            profile: profile.profile.clone(),
            audit_trail,
        };
        write_json_atomic(&dir.join(SETTINGS_FILE), &doc)?;
        append_audit_line(&dir.join(AUDIT_FILE), &record)?;

        tracing::info!(
            patient_id = %profile.patient_id,
            author,
            summary,
            "Patient settings saved"
        );
        Ok(())
    }

    fn lock_for(&self, patient_id: &str) -> Result<Arc<Mutex<()>>, StoreError> {
        validate_patient_id(patient_id)?;
        let mut locks = self.locks.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(Arc::clone(
            locks
                .entry(patient_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        ))
    }

    fn patient_dir(&self, patient_id: &str) -> Result<PathBuf, StoreError> {
        validate_patient_id(patient_id)?;
        Ok(self.root.join(patient_id))
    }

    fn load_context_map(
        &self,
        dir: &Path,
        patient_id: &str,
        kind: ContextKind,
    ) -> BTreeMap<String, Value> {
        match read_json::<BTreeMap<String, Value>>(&dir.join(kind.file_name())) {
            ReadOutcome::Found(map) => map,
            ReadOutcome::Missing => BTreeMap::new(),
            ReadOutcome::Corrupted(detail) => {
                tracing::warn!(
                    patient_id,
                    kind = ?kind,
                    detail,
                    "Corrupted context document, treating as empty"
                );
                BTreeMap::new()
            }
        }
    }
}

/// Patient ids become directory names; keep them path-safe.
fn validate_patient_id(patient_id: &str) -> Result<(), StoreError> {
    let ok = !patient_id.is_empty()
        && patient_id.len() <= MAX_PATIENT_ID_LEN
        && patient_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidPatientId(patient_id.to_string()))
    }
}

fn validate_weights(weights: &BTreeMap<String, f64>) -> Result<(), StoreError> {
    for (key, value) in weights {
        if !value.is_finite() || *value <= 0.0 {
            return Err(StoreError::InvalidWeight(key.clone()));
        }
    }
    Ok(())
}

/// Human-readable summary of the sections a full save changes.
fn change_summary(current: &PatientProfile, incoming: &PatientProfile) -> String {
    let mut changed = Vec::new();
    if current.weights != incoming.weights {
        changed.push("weights");
    }
    if current.thresholds != incoming.thresholds {
        changed.push("thresholds");
    }
    if current.profile != incoming.profile {
        changed.push("profile");
    }
    if changed.is_empty() {
        "no changes".to_string()
    } else {
        changed.join(", ")
    }
}

enum ReadOutcome<T> {
    Found(T),
    Missing,
    Corrupted(String),
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> ReadOutcome<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ReadOutcome::Missing,
        Err(e) => return ReadOutcome::Corrupted(e.to_string()),
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => ReadOutcome::Found(value),
        Err(e) => ReadOutcome::Corrupted(e.to_string()),
    }
}

/// Temporary-then-atomic-replace so concurrent readers never observe a
/// partially written document.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let dir = path.parent().ok_or_else(|| {
        StoreError::Io(std::io::Error::other("settings path has no parent"))
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

fn append_audit_line(path: &Path, record: &AuditRecord) -> Result<(), StoreError> {
    let new_file = !path.exists();
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    if new_file {
        writeln!(file, "{AUDIT_HEADER}")?;
    }
    writeln!(
        file,
        "{},{},{}",
        csv_field(&record.timestamp),
        csv_field(&record.author),
        csv_field(&record.change_summary)
    )?;
    Ok(())
}

/// Minimal CSV quoting: wrap fields containing separators, doubling quotes.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use serde_json::json;

    use super::*;

    fn test_store() -> (tempfile::TempDir, PatientSettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PatientSettingsStore::new(dir.path().join("patients"));
        (dir, store)
    }

    #[test]
    fn first_load_yields_defaults() {
        let (_dir, store) = test_store();
        let profile = store.load("p-001").unwrap();
        assert_eq!(profile.weights.get("tabular"), Some(&0.5));
        assert!(profile.audit_trail.is_empty());
    }

    #[test]
    fn save_then_load_roundtrip_appends_one_audit_record() {
        let (_dir, store) = test_store();
        let mut profile = store.load("p-002").unwrap();
        profile.weights.insert("diabetes".into(), 1.3);
        store.save(&profile, "dr-a").unwrap();

        let loaded = store.load("p-002").unwrap();
        assert_eq!(loaded.weights.get("diabetes"), Some(&1.3));
        assert_eq!(loaded.audit_trail.len(), 1);
        assert_eq!(loaded.audit_trail[0].author, "dr-a");
        assert!(loaded.audit_trail[0].change_summary.contains("weights"));
    }

    #[test]
    fn update_weights_merges_last_writer_wins() {
        let (_dir, store) = test_store();
        store
            .update_weights("p-003", &BTreeMap::from([("image".to_string(), 0.8)]), "a")
            .unwrap();
        store
            .update_weights("p-003", &BTreeMap::from([("image".to_string(), 0.4)]), "b")
            .unwrap();

        let loaded = store.load("p-003").unwrap();
        assert_eq!(loaded.weights.get("image"), Some(&0.4));
        // Untouched defaults survive the merges
        assert_eq!(loaded.weights.get("tabular"), Some(&0.5));
        assert_eq!(loaded.audit_trail.len(), 2);
    }

    #[test]
    fn update_thresholds_rejects_bad_ordering() {
        let (_dir, store) = test_store();
        let result = store.update_thresholds(
            "p-004",
            ThresholdUpdate {
                low: Some(0.5),
                medium: None,
                high: Some(0.3),
            },
            "dr-a",
        );
        assert!(matches!(result, Err(StoreError::InvalidThresholds)));

        // Nothing was persisted
        let loaded = store.load("p-004").unwrap();
        assert_eq!(loaded.thresholds, Thresholds::default());
        assert!(loaded.audit_trail.is_empty());
    }

    #[test]
    fn update_thresholds_merges_partial() {
        let (_dir, store) = test_store();
        store
            .update_thresholds(
                "p-005",
                ThresholdUpdate {
                    medium: Some(0.55),
                    ..Default::default()
                },
                "dr-a",
            )
            .unwrap();
        let loaded = store.load("p-005").unwrap();
        assert_eq!(loaded.thresholds.low, 0.2);
        assert_eq!(loaded.thresholds.medium, 0.55);
        assert_eq!(loaded.thresholds.high, 0.75);
    }

    #[test]
    fn non_positive_weight_rejected() {
        let (_dir, store) = test_store();
        for bad in [0.0, -1.0, f64::NAN] {
            let result = store.update_weights(
                "p-006",
                &BTreeMap::from([("text".to_string(), bad)]),
                "dr-a",
            );
            assert!(matches!(result, Err(StoreError::InvalidWeight(_))));
        }
    }

    #[test]
    fn corrupted_settings_fail_open_to_defaults() {
        let (dir, store) = test_store();
        let patient_dir = dir.path().join("patients").join("p-007");
        fs::create_dir_all(&patient_dir).unwrap();
        fs::write(patient_dir.join(SETTINGS_FILE), b"{not valid json").unwrap();

        let loaded = store.load("p-007").unwrap();
        assert_eq!(loaded.weights, crate::config::default_weights());
    }

    #[test]
    fn append_context_never_drops_prior_entries() {
        let (_dir, store) = test_store();
        store
            .append_context("p-008", ContextKind::History, json!({"visit": "first"}))
            .unwrap();
        store
            .append_context("p-008", ContextKind::History, json!({"visit": "second"}))
            .unwrap();

        let loaded = store.load("p-008").unwrap();
        assert_eq!(loaded.history_context.len(), 2);
        assert!(loaded.image_context.is_empty());
    }

    #[test]
    fn image_context_is_a_separate_document() {
        let (_dir, store) = test_store();
        store
            .append_context("p-009", ContextKind::Image, json!({"lesion_score": 0.2}))
            .unwrap();
        let loaded = store.load("p-009").unwrap();
        assert_eq!(loaded.image_context.len(), 1);
        assert!(loaded.history_context.is_empty());
    }

    #[test]
    fn concurrent_disjoint_weight_updates_both_land() {
        let (_dir, store) = test_store();
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for (key, value) in [("diabetes", 1.1), ("hypertension", 1.2)] {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                store
                    .update_weights(
                        "p-010",
                        &BTreeMap::from([(key.to_string(), value)]),
                        "writer",
                    )
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let loaded = store.load("p-010").unwrap();
        assert_eq!(loaded.weights.get("diabetes"), Some(&1.1));
        assert_eq!(loaded.weights.get("hypertension"), Some(&1.2));
        assert_eq!(loaded.audit_trail.len(), 2);
    }

    #[test]
    fn invalid_patient_id_rejected() {
        let (_dir, store) = test_store();
        for bad in ["", "../escape", "a b", "id/with/slashes"] {
            assert!(matches!(
                store.load(bad),
                Err(StoreError::InvalidPatientId(_))
            ));
        }
    }

    #[test]
    fn audit_csv_gains_one_line_per_update() {
        let (dir, store) = test_store();
        store
            .update_weights("p-011", &BTreeMap::from([("image".to_string(), 0.9)]), "a")
            .unwrap();
        store
            .update_profile("p-011", &BTreeMap::from([("age".to_string(), json!(61))]), "b")
            .unwrap();

        let csv = fs::read_to_string(
            dir.path().join("patients").join("p-011").join(AUDIT_FILE),
        )
        .unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3); // header + 2 updates
        assert_eq!(lines[0], AUDIT_HEADER);
        assert!(lines[1].contains("weights(1)"));
        assert!(lines[2].contains("profile(1)"));
    }

    #[test]
    fn csv_fields_with_commas_are_quoted() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[cfg(unix)]
    #[test]
    fn save_io_error_surfaces_to_caller() {
        let (dir, store) = test_store();
        // Occupy the patient directory path with a file so create_dir_all fails.
        fs::create_dir_all(dir.path().join("patients")).unwrap();
        fs::write(dir.path().join("patients").join("p-012"), b"not a dir").unwrap();

        let profile = PatientProfile::with_defaults("p-012");
        assert!(matches!(
            store.save(&profile, "dr-a"),
            Err(StoreError::Io(_))
        ));
    }
}
