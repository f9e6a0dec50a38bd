//! Deposit Intent Ledger
//!
//! Tracks each swap-and-deposit as a two-phase record so that a deposit that
//! fails after its swap went through is not lost.
//!
//! Flow:
//! 1. **Pending**: the intent passed validation; no transaction sent yet.
//! 2. **Swapped**: the swap leg is mined; the wallet now holds vault currency.
//! 3. **Completed**: the deposit leg is mined.
//!
//! A failure after step 2 moves the record to **Stuck** (resumable), any
//! earlier failure to **Failed**. A Stuck record keeps the hash of a deposit
//! that was sent but not confirmed, so a resume checks it before depositing. Records are kept in memory and, when a path
//! is configured, mirrored to a JSON file after every change.

use chrono::{DateTime, Utc};
use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{FlowError, FlowResult};

/// Phase of a deposit intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum DepositPhase {
    Pending,
    Swapped {
        output_amount: U256,
        swap_tx: H256,
    },
    Completed {
        deposit_tx: H256,
        amount: U256,
    },
    Stuck {
        swapped_amount: U256,
        swap_tx: H256,
        /// Deposit sent before the failure, outcome unknown
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deposit_tx: Option<H256>,
        reason: String,
    },
    Failed {
        reason: String,
    },
}

impl DepositPhase {
    pub fn name(&self) -> &'static str {
        match self {
            DepositPhase::Pending => "pending",
            DepositPhase::Swapped { .. } => "swapped",
            DepositPhase::Completed { .. } => "completed",
            DepositPhase::Stuck { .. } => "stuck",
            DepositPhase::Failed { .. } => "failed",
        }
    }

    /// Swapped output still waiting to be deposited, if any.
    pub fn resumable_amount(&self) -> Option<(U256, H256)> {
        match self {
            DepositPhase::Swapped { output_amount, swap_tx } => Some((*output_amount, *swap_tx)),
            DepositPhase::Stuck {
                swapped_amount,
                swap_tx,
                ..
            } => Some((*swapped_amount, *swap_tx)),
            _ => None,
        }
    }

    /// Deposit transaction sent for a Stuck record but never confirmed.
    pub fn unconfirmed_deposit(&self) -> Option<H256> {
        match self {
            DepositPhase::Stuck { deposit_tx, .. } => *deposit_tx,
            _ => None,
        }
    }
}

/// A tracked deposit intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    /// UUID v4
    pub id: String,
    pub wallet: Address,
    pub chain_id: u64,
    pub vault: Address,
    pub input_token: Address,
    /// As entered by the user
    pub input_amount: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub phase: DepositPhase,
}

/// Fields needed to open a record.
#[derive(Debug, Clone)]
pub struct NewDeposit {
    pub wallet: Address,
    pub chain_id: u64,
    pub vault: Address,
    pub input_token: Address,
    pub input_amount: String,
}

/// Ledger of deposit intents. Clones share the same state.
#[derive(Clone, Default)]
pub struct IntentLedger {
    /// In-memory records keyed by id
    records: Arc<RwLock<HashMap<String, DepositRecord>>>,
    /// JSON mirror; `None` keeps the ledger in memory only
    path: Option<PathBuf>,
}

impl IntentLedger {
    /// Creates an in-memory ledger.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens a file-backed ledger, loading existing records if the file exists.
    ///
    /// # Arguments
    ///
    /// * `path` - JSON file holding the records
    ///
    /// # Returns
    ///
    /// * `Ok(IntentLedger)` - Ledger with the persisted records loaded
    /// * `Err(anyhow::Error)` - File exists but cannot be read or parsed
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut records = HashMap::new();

        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("Failed to read ledger {}: {}", path.display(), e))?;
            if !content.trim().is_empty() {
                let list: Vec<DepositRecord> = serde_json::from_str(&content)
                    .map_err(|e| anyhow::anyhow!("Failed to parse ledger {}: {}", path.display(), e))?;
                for record in list {
                    records.insert(record.id.clone(), record);
                }
            }
            info!("Loaded {} deposit intent(s) from {}", records.len(), path.display());
        }

        Ok(Self {
            records: Arc::new(RwLock::new(records)),
            path: Some(path),
        })
    }

    /// Opens a new record in the Pending phase.
    pub async fn create(&self, new: NewDeposit) -> FlowResult<DepositRecord> {
        let now = Utc::now();
        let record = DepositRecord {
            id: uuid::Uuid::new_v4().to_string(),
            wallet: new.wallet,
            chain_id: new.chain_id,
            vault: new.vault,
            input_token: new.input_token,
            input_amount: new.input_amount,
            created_at: now,
            updated_at: now,
            phase: DepositPhase::Pending,
        };

        let mut records = self.records.write().await;
        records.insert(record.id.clone(), record.clone());
        self.persist(&records).await?;
        info!("Deposit intent {} opened", record.id);
        Ok(record)
    }

    /// Moves a record to a new phase.
    pub async fn set_phase(&self, id: &str, phase: DepositPhase) -> FlowResult<DepositRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| FlowError::IntentNotFound(id.to_string()))?;
        info!("Deposit intent {}: {} -> {}", id, record.phase.name(), phase.name());
        record.phase = phase;
        record.updated_at = Utc::now();
        let updated = record.clone();
        self.persist(&records).await?;
        Ok(updated)
    }

    pub async fn get(&self, id: &str) -> Option<DepositRecord> {
        self.records.read().await.get(id).cloned()
    }

    /// All records, oldest first.
    pub async fn list(&self) -> Vec<DepositRecord> {
        let records = self.records.read().await;
        let mut list: Vec<DepositRecord> = records.values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }

    /// Records whose swap went through but whose deposit did not.
    pub async fn resumable(&self) -> Vec<DepositRecord> {
        self.list()
            .await
            .into_iter()
            .filter(|r| r.phase.resumable_amount().is_some())
            .collect()
    }

    /// Mirrors `records` to the JSON file. Callers hold the write lock, so
    /// file writes happen in the same order as the changes.
    async fn persist(&self, records: &HashMap<String, DepositRecord>) -> FlowResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut list: Vec<&DepositRecord> = records.values().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let json = serde_json::to_string_pretty(&list).map_err(|e| FlowError::Ledger(e.to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| FlowError::Ledger(e.to_string()))?;
            }
        }

        // Atomic replace
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| FlowError::Ledger(e.to_string()))?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            warn!("Failed to replace ledger {}: {}", path.display(), e);
            FlowError::Ledger(e.to_string())
        })
    }
}
