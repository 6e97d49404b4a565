/*
 * Responsibility
 * - レコードの保存/取得 (in-memory)
 * - 永続化バックエンドは外部コラボレータ。ここはその座席だけを占める seam で、
 *   保存するのは state machine が認可した merged `result` のみ
 */
use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;
use uuid::Uuid;

use crate::repos::error::RepoError;

pub type RecordStore = RwLock<HashMap<Uuid, Value>>;

pub fn get(store: &RecordStore, record_id: Uuid) -> Result<Option<Value>, RepoError> {
    let records = store.read().map_err(|_| RepoError::Poisoned)?;
    Ok(records.get(&record_id).cloned())
}

pub fn put(store: &RecordStore, record_id: Uuid, document: Value) -> Result<(), RepoError> {
    let mut records = store.write().map_err(|_| RepoError::Poisoned)?;
    records.insert(record_id, document);
    Ok(())
}
