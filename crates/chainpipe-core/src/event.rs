//! Chain-sync events flowing between pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::certificate::Certificate;
use crate::ledger::MultiAsset;

pub const BLOCK_EVENT_TYPE: &str = "chainsync.block";
pub const TRANSACTION_EVENT_TYPE: &str = "chainsync.transaction";
pub const ROLLBACK_EVENT_TYPE: &str = "chainsync.rollback";

/// The envelope passed through every stage's channels.
///
/// Stages never mutate an event; they either forward it or drop it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type, e.g. `"chainsync.transaction"`
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<EventContext>,
    pub payload: Payload,
}

impl Event {
    pub fn new(kind: impl Into<String>, context: Option<EventContext>, payload: Payload) -> Self {
        Self {
            kind: kind.into(),
            timestamp: Utc::now(),
            context,
            payload,
        }
    }

    pub fn block(block: BlockEvent) -> Self {
        Self::new(BLOCK_EVENT_TYPE, None, Payload::Block(block))
    }

    pub fn transaction(tx: TransactionEvent) -> Self {
        Self::new(TRANSACTION_EVENT_TYPE, None, Payload::Transaction(tx))
    }

    pub fn rollback(rollback: RollbackEvent) -> Self {
        Self::new(ROLLBACK_EVENT_TYPE, None, Payload::Rollback(rollback))
    }

    pub fn with_context(mut self, context: EventContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// Where on chain the event was observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    pub block_number: u64,
    pub slot_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_idx: Option<u32>,
}

/// The closed set of payloads a chain-sync source produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Block(BlockEvent),
    Transaction(TransactionEvent),
    Rollback(RollbackEvent),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEvent {
    /// Hex hash of the issuing pool's cold key.
    pub issuer_vkey: String,
    #[serde(default)]
    pub block_hash: String,
    #[serde(default)]
    pub block_body_size: u64,
    #[serde(default)]
    pub transaction_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEvent {
    #[serde(default)]
    pub block_hash: String,
    /// Spent output references, `txhash#index`.
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<TxOutput>,
    /// The outputs consumed by `inputs`, when the source could resolve them.
    #[serde(default)]
    pub resolved_inputs: Vec<TxOutput>,
    #[serde(default)]
    pub certificates: Vec<Certificate>,
    #[serde(default)]
    pub fee: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl TransactionEvent {
    /// Outputs followed by resolved inputs, so spends are visible as well as receipts.
    pub fn touched_outputs(&self) -> impl Iterator<Item = &TxOutput> {
        self.outputs.iter().chain(self.resolved_inputs.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Address,
    /// Lovelace
    #[serde(default)]
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<MultiAsset>,
}

impl TxOutput {
    pub fn new(address: impl Into<String>, amount: u64) -> Self {
        Self {
            address: Address::new(address),
            amount,
            assets: None,
        }
    }

    pub fn with_assets(mut self, assets: MultiAsset) -> Self {
        self.assets = Some(assets);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackEvent {
    pub block_hash: String,
    pub slot_number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touched_outputs_puts_resolved_inputs_last() {
        let tx = TransactionEvent {
            outputs: vec![TxOutput::new("addr1out", 1)],
            resolved_inputs: vec![TxOutput::new("addr1in", 2)],
            ..Default::default()
        };
        let seen: Vec<_> = tx.touched_outputs().map(|o| o.address.as_str()).collect();
        assert_eq!(seen, vec!["addr1out", "addr1in"]);
    }

    #[test]
    fn event_json_shape() {
        let event = Event::block(BlockEvent {
            issuer_vkey: "11".repeat(28),
            ..Default::default()
        })
        .with_context(EventContext {
            block_number: 10,
            slot_number: 20,
            ..Default::default()
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], BLOCK_EVENT_TYPE);
        assert_eq!(json["payload"]["kind"], "block");
        assert_eq!(json["context"]["slot_number"], 20);

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
