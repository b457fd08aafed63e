use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard};

use custody_crypto::{compute_root, ContentHasher, SigningKey, VerifyingKey};
use custody_store::{BlockStore, FileBlockStore, StoreError};
use custody_types::{now_millis, Block, BlockData, Digest};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::{AuditService, AuditTrail, InclusionProof};
use crate::config::LedgerConfig;
use crate::error::{AppendError, LedgerError};
use crate::index::LedgerIndex;
use crate::traits::{LedgerReader, LedgerWriter};
use crate::validation::{ChainValidator, ValidationReport};

/// Append-only, hash-chained ledger with a durable block log.
///
/// Appends are serialized by the writer mutex, which owns the store. The
/// chain and index sit behind an `RwLock` that appends only take for write
/// after the new block is durable, so readers never see a block that is not
/// on disk.
pub struct Ledger {
    config: LedgerConfig,
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    writer: Mutex<Writer>,
    state: RwLock<LedgerState>,
}

struct Writer {
    store: Box<dyn BlockStore>,
    phase: Phase,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Open,
    ShutDown,
}

#[derive(Default)]
struct LedgerState {
    chain: Vec<Block>,
    index: LedgerIndex,
    /// Store size as of the last published block.
    storage_bytes: u64,
}

/// Block count and bytes held by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSize {
    pub block_count: u64,
    pub storage_bytes: u64,
}

impl Ledger {
    pub fn new(config: LedgerConfig, store: Box<dyn BlockStore>, signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            config,
            signing_key,
            verifying_key,
            writer: Mutex::new(Writer {
                store,
                phase: Phase::Uninitialized,
            }),
            state: RwLock::new(LedgerState::default()),
        }
    }

    /// Open the file-backed ledger described by `config`, loading (or
    /// creating) the writer key. Call [`initialize`](Self::initialize) next.
    pub fn open(config: LedgerConfig) -> Result<Self, LedgerError> {
        config.validate()?;
        let store = FileBlockStore::open(&config.log_path(), config.sync_mode)?;
        let key = SigningKey::load_or_generate(&config.key_path())?;
        Ok(Self::new(config, Box::new(store), key))
    }

    /// Replay the log into memory, or write the genesis block if it is
    /// empty. Returns the number of blocks in the chain.
    ///
    /// Any unreadable line or duplicate hash fails with
    /// [`LedgerError::Initialization`]; the log is never replaced.
    pub fn initialize(&self) -> Result<usize, LedgerError> {
        let mut writer = self.lock_writer().map_err(|_| LedgerError::LockPoisoned)?;
        if writer.phase != Phase::Uninitialized {
            return Err(LedgerError::AlreadyInitialized);
        }

        let mut chain = writer.store.load().map_err(|e| match e {
            StoreError::CorruptLine { line, reason } => LedgerError::Initialization { line, reason },
            other => LedgerError::Store(other),
        })?;
        let mut index =
            LedgerIndex::rebuild(&chain).map_err(|dup| LedgerError::Initialization {
                line: dup.position + 1,
                reason: format!("duplicate block hash {}", dup.hash),
            })?;

        if chain.is_empty() {
            let genesis = self.build_block(
                None,
                BlockData::genesis(env!("CARGO_PKG_VERSION")),
                Vec::new(),
            )?;
            self.persist(&mut writer, &genesis)?;
            index.insert(genesis.hash, 0);
            info!(hash = %genesis.hash, store = %writer.store.describe(), "created genesis block");
            chain.push(genesis);
        }

        let count = chain.len();
        let storage_bytes = writer.store.storage_bytes()?;
        *self.state.write().map_err(|_| LedgerError::LockPoisoned)? = LedgerState {
            chain,
            index,
            storage_bytes,
        };
        writer.phase = Phase::Open;
        info!(blocks = count, store = %writer.store.describe(), "ledger initialized");
        Ok(count)
    }

    /// Sync the log and refuse further appends. Reads keep working.
    pub fn shutdown(&self) -> Result<(), LedgerError> {
        let mut writer = self.lock_writer().map_err(|_| LedgerError::LockPoisoned)?;
        if writer.phase == Phase::ShutDown {
            return Ok(());
        }
        writer.store.sync()?;
        writer.phase = Phase::ShutDown;
        info!(store = %writer.store.describe(), "ledger shut down");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.lock_writer()
            .map(|w| w.phase != Phase::Uninitialized)
            .unwrap_or(false)
    }

    /// Reads published state only, so it never waits on an in-flight append.
    pub fn size(&self) -> Result<LedgerSize, LedgerError> {
        let state = self.read_state()?;
        Ok(LedgerSize {
            block_count: state.chain.len() as u64,
            storage_bytes: state.storage_bytes,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Public half of the writer key; verifies every block signature.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Check hash, linkage, and index of every block in one pass.
    pub fn validate(&self) -> Result<ValidationReport, LedgerError> {
        let state = self.read_state()?;
        Ok(ChainValidator::validate(&state.chain))
    }

    /// [`validate`](Self::validate) plus a signature check on every block.
    pub fn validate_signatures(&self) -> Result<ValidationReport, LedgerError> {
        let state = self.read_state()?;
        Ok(ChainValidator::validate_with_key(
            &state.chain,
            &self.verifying_key,
        ))
    }

    pub fn audit_trail(&self, id: &str) -> Result<AuditTrail, LedgerError> {
        AuditService::new(self, self.config.merkle_window).audit_trail(id)
    }

    pub fn prove_block(&self, hash: &Digest) -> Result<InclusionProof, LedgerError> {
        AuditService::new(self, self.config.merkle_window).prove_block(hash)
    }

    fn build_block(
        &self,
        tip: Option<&Block>,
        data: BlockData,
        mut window: Vec<Digest>,
    ) -> Result<Block, AppendError> {
        let timestamp = match tip {
            Some(tip) => now_millis().max(tip.timestamp),
            None => now_millis(),
        };
        let mut block = Block {
            index: tip.map_or(0, |t| t.index + 1),
            timestamp,
            data,
            previous_hash: tip.map(|t| t.hash),
            hash: Digest::from_hash([0; 32]),
            nonce: 0,
            signature: String::new(),
            merkle_root: Digest::from_hash([0; 32]),
        };

        block.hash = ContentHasher::recompute_block_hash(&block)?;
        block.signature = self.signing_key.sign_digest(&block.hash).to_hex();
        window.push(block.hash);
        block.merkle_root = compute_root(&window).unwrap_or(block.hash);
        Ok(block)
    }

    fn persist(&self, writer: &mut Writer, block: &Block) -> Result<(), AppendError> {
        let store = &mut writer.store;
        self.config
            .retry
            .run(|| store.persist_block(block))
            .map_err(|e| match e.source {
                StoreError::Serialization(msg) => AppendError::Serialization(msg),
                source => AppendError::Persistence {
                    attempts: e.attempts,
                    source,
                },
            })
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, Writer>, AppendError> {
        self.writer.lock().map_err(|_| AppendError::LockPoisoned)
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, LedgerState>, LedgerError> {
        self.state.read().map_err(|_| LedgerError::LockPoisoned)
    }
}

impl LedgerWriter for Ledger {
    fn append(&self, data: BlockData) -> Result<Block, AppendError> {
        let mut writer = self.lock_writer()?;
        match writer.phase {
            Phase::Uninitialized => return Err(AppendError::NotInitialized),
            Phase::ShutDown => return Err(AppendError::ShutDown),
            Phase::Open => {}
        }

        // Only appends mutate the chain and they hold the writer lock, so the
        // tip cannot move between this read and the publish below.
        let (tip, window) = {
            let state = self.state.read().map_err(|_| AppendError::LockPoisoned)?;
            let tail = state
                .chain
                .len()
                .saturating_sub(self.config.merkle_window.saturating_sub(1));
            let window: Vec<Digest> = state.chain[tail..].iter().map(|b| b.hash).collect();
            (state.chain.last().cloned(), window)
        };
        let tip = tip.ok_or(AppendError::NotInitialized)?;

        let block = self.build_block(Some(&tip), data, window)?;
        self.persist(&mut writer, &block)?;
        let storage_bytes = writer.store.storage_bytes();

        let mut state = self.state.write().map_err(|_| AppendError::LockPoisoned)?;
        let position = state.chain.len();
        state.index.insert(block.hash, position);
        state.chain.push(block.clone());
        match storage_bytes {
            Ok(bytes) => state.storage_bytes = bytes,
            Err(e) => warn!(error = %e, "cannot read store size after append"),
        }
        debug!(index = block.index, hash = %block.hash, "block appended");
        Ok(block)
    }
}

impl LedgerReader for Ledger {
    fn block_count(&self) -> Result<usize, LedgerError> {
        Ok(self.read_state()?.chain.len())
    }

    fn tip(&self) -> Result<Option<Block>, LedgerError> {
        Ok(self.read_state()?.chain.last().cloned())
    }

    fn get_by_hash(&self, hash: &Digest) -> Result<Option<Block>, LedgerError> {
        let state = self.read_state()?;
        Ok(state
            .index
            .position(hash)
            .and_then(|p| state.chain.get(p))
            .cloned())
    }

    fn position_of(&self, hash: &Digest) -> Result<Option<usize>, LedgerError> {
        Ok(self.read_state()?.index.position(hash))
    }

    fn read_range(&self, offset: usize, limit: usize) -> Result<Vec<Block>, LedgerError> {
        let state = self.read_state()?;
        Ok(state.chain.iter().skip(offset).take(limit).cloned().collect())
    }

    fn read_all(&self) -> Result<Vec<Block>, LedgerError> {
        Ok(self.read_state()?.chain.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use custody_store::{MemoryBlockStore, RetryPolicy};
    use custody_types::{CustodyDefaults, RecordSubmission};
    use std::sync::Arc;

    fn fast_config() -> LedgerConfig {
        LedgerConfig {
            retry: RetryPolicy {
                initial_delay_ms: 0,
                ..RetryPolicy::default()
            },
            ..LedgerConfig::default()
        }
    }

    fn memory_ledger(store: &MemoryBlockStore) -> Ledger {
        Ledger::new(fast_config(), Box::new(store.clone()), SigningKey::generate())
    }

    fn record(session: &str, n: u64) -> BlockData {
        RecordSubmission::from_value(serde_json::json!({
            "type": "observation",
            "sessionId": session,
            "count": n,
        }))
        .unwrap()
        .into_block_data(&CustodyDefaults::default())
        .unwrap()
    }

    #[test]
    fn initialize_creates_genesis() {
        let store = MemoryBlockStore::new();
        let ledger = memory_ledger(&store);
        assert!(!ledger.is_initialized());
        assert_eq!(ledger.initialize().unwrap(), 1);

        let genesis = ledger.tip().unwrap().unwrap();
        assert_eq!(genesis.index, 0);
        assert!(genesis.previous_hash.is_none());
        assert!(genesis.is_genesis());
        assert_eq!(genesis.merkle_root, genesis.hash);
        assert_eq!(store.len(), 1);
        assert!(store.lines()[0].contains(r#""previousHash":"0""#));
    }

    #[test]
    fn initialize_twice_fails() {
        let ledger = memory_ledger(&MemoryBlockStore::new());
        ledger.initialize().unwrap();
        assert!(matches!(
            ledger.initialize(),
            Err(LedgerError::AlreadyInitialized)
        ));
    }

    #[test]
    fn append_before_initialize_is_rejected() {
        let ledger = memory_ledger(&MemoryBlockStore::new());
        assert!(matches!(
            ledger.append(record("s1", 1)),
            Err(AppendError::NotInitialized)
        ));
    }

    #[test]
    fn appends_link_and_validate() {
        let store = MemoryBlockStore::new();
        let ledger = memory_ledger(&store);
        ledger.initialize().unwrap();

        let mut prev = ledger.tip().unwrap().unwrap();
        for n in 0..12 {
            let block = ledger.append(record("s1", n)).unwrap();
            assert_eq!(block.index, prev.index + 1);
            assert_eq!(block.previous_hash, Some(prev.hash));
            assert!(block.timestamp >= prev.timestamp);
            prev = block;
        }

        assert_eq!(ledger.block_count().unwrap(), 13);
        assert_eq!(store.len(), 13);
        assert!(ledger.validate().unwrap().valid);
        assert!(ledger.validate_signatures().unwrap().valid);
    }

    #[test]
    fn merkle_root_covers_trailing_window() {
        let config = LedgerConfig {
            merkle_window: 3,
            ..fast_config()
        };
        let ledger = Ledger::new(
            config,
            Box::new(MemoryBlockStore::new()),
            SigningKey::generate(),
        );
        ledger.initialize().unwrap();
        for n in 0..5 {
            ledger.append(record("s1", n)).unwrap();
        }

        let chain = ledger.read_all().unwrap();
        let hashes: Vec<Digest> = chain.iter().map(|b| b.hash).collect();
        assert_eq!(chain[1].merkle_root, compute_root(&hashes[0..2]).unwrap());
        assert_eq!(chain[5].merkle_root, compute_root(&hashes[3..6]).unwrap());
    }

    #[test]
    fn signatures_verify_with_writer_key() {
        let ledger = memory_ledger(&MemoryBlockStore::new());
        ledger.initialize().unwrap();
        let block = ledger.append(record("s1", 1)).unwrap();
        assert!(ledger.verifying_key().verify_block(&block).is_ok());
        assert!(SigningKey::generate()
            .verifying_key()
            .verify_block(&block)
            .is_err());
    }

    #[test]
    fn lookup_by_hash_and_range() {
        let ledger = memory_ledger(&MemoryBlockStore::new());
        ledger.initialize().unwrap();
        let b1 = ledger.append(record("s1", 1)).unwrap();
        let b2 = ledger.append(record("s1", 2)).unwrap();

        assert_eq!(ledger.get_by_hash(&b1.hash).unwrap(), Some(b1.clone()));
        assert_eq!(ledger.position_of(&b2.hash).unwrap(), Some(2));
        assert!(ledger.get_by_hash(&Digest::of(b"nope")).unwrap().is_none());
        assert_eq!(ledger.read_range(1, 10).unwrap(), vec![b1, b2]);
        assert!(ledger.read_range(5, 10).unwrap().is_empty());
    }

    #[test]
    fn concurrent_appends_are_serialized() {
        let ledger = Arc::new(memory_ledger(&MemoryBlockStore::new()));
        ledger.initialize().unwrap();

        let handles: Vec<_> = (0..50)
            .map(|n| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || ledger.append(record("s1", n)).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let chain = ledger.read_all().unwrap();
        assert_eq!(chain.len(), 51);
        assert!(chain.windows(2).all(|w| w[1].index == w[0].index + 1));
        assert!(ledger.validate().unwrap().valid);
    }

    #[test]
    fn failed_persistence_leaves_chain_unchanged() {
        let store = MemoryBlockStore::new();
        let ledger = memory_ledger(&store);
        ledger.initialize().unwrap();
        ledger.append(record("s1", 1)).unwrap();

        store.fail_next_writes(5);
        let err = ledger.append(record("s1", 2)).unwrap_err();
        assert!(matches!(err, AppendError::Persistence { attempts: 3, .. }));
        assert!(err.is_retryable());
        assert_eq!(ledger.block_count().unwrap(), 2);
        assert_eq!(store.len(), 2);

        // Two injected failures remain; the retry policy absorbs them.
        let block = ledger.append(record("s1", 2)).unwrap();
        assert_eq!(block.index, 2);
        assert_eq!(store.len(), 3);
        assert!(ledger.validate().unwrap().valid);
    }

    #[test]
    fn shutdown_rejects_appends_but_keeps_reads() {
        let ledger = memory_ledger(&MemoryBlockStore::new());
        ledger.initialize().unwrap();
        ledger.append(record("s1", 1)).unwrap();
        ledger.shutdown().unwrap();
        ledger.shutdown().unwrap();

        assert!(matches!(
            ledger.append(record("s1", 2)),
            Err(AppendError::ShutDown)
        ));
        assert_eq!(ledger.block_count().unwrap(), 2);
        assert_eq!(ledger.audit_trail("s1").unwrap().blocks.len(), 1);
    }

    #[test]
    fn replay_reproduces_chain_and_index() {
        let store = MemoryBlockStore::new();
        let key = SigningKey::generate();
        let first = Ledger::new(fast_config(), Box::new(store.clone()), SigningKey::from_bytes(*key.as_bytes()));
        first.initialize().unwrap();
        for n in 0..7 {
            first.append(record(if n % 2 == 0 { "even" } else { "odd" }, n)).unwrap();
        }
        let before = first.read_all().unwrap();
        first.shutdown().unwrap();
        drop(first);

        let second = Ledger::new(fast_config(), Box::new(store), key);
        assert_eq!(second.initialize().unwrap(), 8);
        assert_eq!(second.read_all().unwrap(), before);
        for (position, block) in before.iter().enumerate() {
            assert_eq!(second.position_of(&block.hash).unwrap(), Some(position));
        }
        assert!(second.validate_signatures().unwrap().valid);

        let next = second.append(record("odd", 99)).unwrap();
        assert_eq!(next.index, 8);
        assert_eq!(next.previous_hash, Some(before[7].hash));
    }

    #[test]
    fn tampered_log_is_localised_after_restart() {
        let store = MemoryBlockStore::new();
        let ledger = memory_ledger(&store);
        ledger.initialize().unwrap();
        for n in 0..4 {
            ledger.append(record("s1", n)).unwrap();
        }
        drop(ledger);

        let mut value: serde_json::Value = serde_json::from_str(&store.lines()[2]).unwrap();
        value["data"]["sessionId"] = "forged".into();
        assert!(store.replace_line(2, value.to_string()));

        let reopened = memory_ledger(&store);
        reopened.initialize().unwrap();
        let report = reopened.validate().unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_broken_index, Some(2));
        assert_eq!(report.kind, Some(FailureKind::HashMismatch));
    }

    #[test]
    fn swapped_lines_break_linkage() {
        let store = MemoryBlockStore::new();
        let ledger = memory_ledger(&store);
        ledger.initialize().unwrap();
        for n in 0..4 {
            ledger.append(record("s1", n)).unwrap();
        }
        drop(ledger);

        let lines = store.lines();
        store.replace_line(2, lines[3].clone());
        store.replace_line(3, lines[2].clone());

        let reopened = memory_ledger(&store);
        reopened.initialize().unwrap();
        let failure = reopened.validate().unwrap().into_result().unwrap_err();
        assert_eq!(failure.index, 2);
        assert_eq!(failure.kind, FailureKind::LinkageMismatch);
    }

    #[test]
    fn corrupt_line_fails_initialization() {
        let store = MemoryBlockStore::new();
        let ledger = memory_ledger(&store);
        ledger.initialize().unwrap();
        ledger.append(record("s1", 1)).unwrap();
        drop(ledger);
        store.replace_line(1, "{\"index\":".into());

        let reopened = memory_ledger(&store);
        match reopened.initialize() {
            Err(LedgerError::Initialization { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected initialization error, got {other:?}"),
        }
        assert_eq!(store.len(), 2);
        assert!(matches!(
            reopened.append(record("s1", 2)),
            Err(AppendError::NotInitialized)
        ));
    }

    #[test]
    fn duplicate_hash_fails_initialization() {
        let store = MemoryBlockStore::new();
        let ledger = memory_ledger(&store);
        ledger.initialize().unwrap();
        drop(ledger);
        let genesis = store.lines()[0].clone();
        let copy = MemoryBlockStore::from_lines(vec![genesis.clone(), genesis]);

        let err = memory_ledger(&copy).initialize().unwrap_err();
        assert!(matches!(err, LedgerError::Initialization { line: 2, .. }));
    }

    #[test]
    fn file_ledger_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig {
            sync_mode: custody_store::SyncMode::EveryWrite,
            ..LedgerConfig::in_dir(dir.path())
        };

        let (hashes, key) = {
            let ledger = Ledger::open(config.clone()).unwrap();
            ledger.initialize().unwrap();
            for n in 0..3 {
                ledger.append(record("s1", n)).unwrap();
            }
            ledger.shutdown().unwrap();
            let hashes: Vec<Digest> = ledger.read_all().unwrap().iter().map(|b| b.hash).collect();
            (hashes, ledger.verifying_key().clone())
        };

        let ledger = Ledger::open(config).unwrap();
        assert_eq!(ledger.initialize().unwrap(), 4);
        assert_eq!(ledger.verifying_key(), &key);
        let reloaded: Vec<Digest> = ledger.read_all().unwrap().iter().map(|b| b.hash).collect();
        assert_eq!(reloaded, hashes);

        let size = ledger.size().unwrap();
        assert_eq!(size.block_count, 4);
        assert_eq!(
            size.storage_bytes,
            std::fs::metadata(dir.path().join("ledger.ndjson")).unwrap().len()
        );
        assert!(ledger.validate_signatures().unwrap().valid);
    }

    #[test]
    fn torn_file_tail_fails_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig::in_dir(dir.path());
        {
            let ledger = Ledger::open(config.clone()).unwrap();
            ledger.initialize().unwrap();
            ledger.shutdown().unwrap();
        }
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(config.log_path())
            .unwrap();
        std::io::Write::write_all(&mut f, b"{\"index\":1,").unwrap();

        let ledger = Ledger::open(config).unwrap();
        assert!(matches!(
            ledger.initialize(),
            Err(LedgerError::Initialization { line: 2, .. })
        ));
    }

    #[test]
    fn second_open_of_same_log_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig::in_dir(dir.path());
        let first = Ledger::open(config.clone()).unwrap();
        first.initialize().unwrap();

        match Ledger::open(config.clone()) {
            Err(LedgerError::Store(StoreError::Locked { .. })) => {}
            Err(other) => panic!("expected a locked log, got {other:?}"),
            Ok(_) => panic!("a second writer opened the log"),
        }
        first.append(record("s1", 1)).unwrap();
        drop(first);

        let reopened = Ledger::open(config).unwrap();
        assert_eq!(reopened.initialize().unwrap(), 2);
        assert!(reopened.validate().unwrap().valid);
    }

    #[test]
    fn size_does_not_wait_for_the_writer() {
        let store = MemoryBlockStore::new();
        let ledger = Arc::new(memory_ledger(&store));
        ledger.initialize().unwrap();
        ledger.append(record("s1", 1)).unwrap();
        let expected: u64 = store.lines().iter().map(|l| l.len() as u64 + 1).sum();

        let _writer = ledger.writer.lock().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        let reader = Arc::clone(&ledger);
        std::thread::spawn(move || {
            let _ = tx.send(reader.size().unwrap());
        });
        let size = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("size() blocked behind the writer lock");
        assert_eq!(size.block_count, 2);
        assert_eq!(size.storage_bytes, expected);
    }
}
