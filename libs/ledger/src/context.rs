//! Per-transaction execution context
//!
//! The host executes transactions one at a time. Within a transaction all
//! writes are buffered; `commit` applies them to the store in one step and
//! releases the single emitted event. Dropping the context without
//! committing discards every write, which is how an error aborts a
//! transaction with no partial effects.

use crate::error::LedgerError;
use crate::identity::Caller;
use crate::store::StateStore;
use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Deterministic transaction stamp supplied by the host: every timestamp
/// and synthesized key in persisted records derives from this, never from
/// the wall clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxStamp {
    pub tx_id: String,
    pub seconds: i64,
    pub nanos: u32,
}

impl TxStamp {
    pub fn new(tx_id: impl Into<String>, seconds: i64, nanos: u32) -> Self {
        Self {
            tx_id: tx_id.into(),
            seconds,
            nanos,
        }
    }
}

/// The single named event a transaction may emit
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    pub name: String,
    pub payload: serde_json::Value,
}

/// Snapshot of the pending write-set, used to roll back one unit of work
/// inside a larger transaction (batch settlement)
pub struct Checkpoint {
    pending: BTreeMap<String, Vec<u8>>,
    event: Option<EmittedEvent>,
}

/// Execution context of one transaction
pub struct TxContext<'a, S: StateStore> {
    store: &'a mut S,
    stamp: TxStamp,
    caller: Caller,
    pending: BTreeMap<String, Vec<u8>>,
    event: Option<EmittedEvent>,
}

impl<'a, S: StateStore> TxContext<'a, S> {
    pub fn new(store: &'a mut S, stamp: TxStamp, caller: Caller) -> Self {
        Self {
            store,
            stamp,
            caller,
            pending: BTreeMap::new(),
            event: None,
        }
    }

    // ── Caller and stamp ────────────────────────────────────────────────

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub fn tx_id(&self) -> &str {
        &self.stamp.tx_id
    }

    /// Transaction time as a UTC instant
    pub fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.stamp.seconds, self.stamp.nanos)
            .single()
            .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
    }

    /// Transaction time as the RFC 3339 string stored in records.
    /// Seconds precision keeps the format lexicographically sortable.
    pub fn now_rfc3339(&self) -> String {
        self.now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Transaction time shifted by whole calendar days (settlement dates)
    pub fn rfc3339_in_days(&self, days: i64) -> String {
        (self.now() + Duration::days(days)).to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    // ── State access ────────────────────────────────────────────────────

    /// Raw read with read-your-writes semantics
    pub fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        if let Some(bytes) = self.pending.get(key) {
            return Ok(Some(bytes.clone()));
        }
        self.store.get(key)
    }

    pub fn exists(&self, key: &str) -> Result<bool, LedgerError> {
        Ok(self.get_raw(key)?.is_some())
    }

    /// Read and unmarshal a record
    pub fn get_record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, LedgerError> {
        match self.get_raw(key)? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| LedgerError::Unmarshal {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    /// Marshal and buffer a record write
    pub fn put_record<T: Serialize>(&mut self, key: &str, record: &T) -> Result<(), LedgerError> {
        let bytes = serde_json::to_vec(record).map_err(|e| LedgerError::Marshal {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.pending.insert(key.to_string(), bytes);
        Ok(())
    }

    /// Range scan merging committed state with pending writes, decoding
    /// each row as `T` and skipping rows of other record shapes. The
    /// shared keyspace interleaves record kinds, so callers filter by
    /// parseability exactly as they would over the raw host iterator.
    pub fn range_records<T: DeserializeOwned>(
        &self,
        start: &str,
        end: &str,
    ) -> Result<Vec<(String, T)>, LedgerError> {
        let mut merged: BTreeMap<String, Vec<u8>> = self
            .store
            .range(start, end)?
            .into_iter()
            .collect();
        for (key, bytes) in &self.pending {
            let after_start = start.is_empty() || key.as_str() >= start;
            let before_end = end.is_empty() || key.as_str() < end;
            if after_start && before_end {
                merged.insert(key.clone(), bytes.clone());
            }
        }
        Ok(merged
            .into_iter()
            .filter_map(|(key, bytes)| {
                serde_json::from_slice::<T>(&bytes)
                    .ok()
                    .map(|record| (key, record))
            })
            .collect())
    }

    // ── Events ──────────────────────────────────────────────────────────

    /// Emit the transaction's single named event. A second emission is an
    /// error rather than a silent overwrite; code paths producing several
    /// logical events must aggregate them into one payload.
    pub fn set_event<T: Serialize>(&mut self, name: &str, payload: &T) -> Result<(), LedgerError> {
        if let Some(existing) = &self.event {
            return Err(LedgerError::EventAlreadySet {
                existing: existing.name.clone(),
                rejected: name.to_string(),
            });
        }
        let payload = serde_json::to_value(payload).map_err(|e| LedgerError::Marshal {
            key: format!("event:{name}"),
            message: e.to_string(),
        })?;
        self.event = Some(EmittedEvent {
            name: name.to_string(),
            payload,
        });
        Ok(())
    }

    /// The event staged so far, if any
    pub fn staged_event(&self) -> Option<&EmittedEvent> {
        self.event.as_ref()
    }

    // ── Checkpointing ───────────────────────────────────────────────────

    /// Snapshot the pending write-set and staged event
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pending: self.pending.clone(),
            event: self.event.clone(),
        }
    }

    /// Discard everything written since the checkpoint
    pub fn revert_to(&mut self, checkpoint: Checkpoint) {
        self.pending = checkpoint.pending;
        self.event = checkpoint.event;
    }

    // ── Commit ──────────────────────────────────────────────────────────

    /// Apply all buffered writes to the store and hand back the emitted
    /// event. Consumes the context; an uncommitted context leaves the
    /// store untouched.
    pub fn commit(self) -> Result<Option<EmittedEvent>, LedgerError> {
        for (key, bytes) in self.pending {
            self.store.put(&key, bytes)?;
        }
        Ok(self.event)
    }
}
