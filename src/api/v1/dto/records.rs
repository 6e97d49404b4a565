/*
 * Responsibility
 * - /records 系の request/response DTO
 * - destination は閉じた State enum としてデシリアライズ (未知の状態は 422)
 */
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::model::state::State;

#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    pub document: Value,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub destination: State,
    pub document: Value,
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub id: Uuid,
    pub document: Value,
}
