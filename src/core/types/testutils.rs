//! Dummy data builders for tests.
use rand::distributions::Alphanumeric;
use rand::Rng;
use time::Duration;
use time::OffsetDateTime;

use super::*;
use crate::core::entities::Block;
use crate::core::protocol::Protocol;

/// Random block hash
pub fn random_hash() -> BlockHash {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(50)
        .map(char::from)
        .collect();
    format!("B{suffix}")
}

fn dummy_timestamp() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_600_000_000).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

impl RawBlock {
    pub fn dummy() -> Self {
        Self {
            level: 1,
            hash: random_hash(),
            predecessor: random_hash(),
            timestamp: dummy_timestamp(),
            protocol: String::from("PtDummy"),
            cycle: 0,
            cycle_position: 0,
            priority: 0,
            baker: String::from("tz1baker"),
            reward: 0,
            deposit: 0,
            fees: 0,
            balance_updates: vec![],
            deactivated: vec![],
            revelation_penalties: vec![],
            operations: Operations::default(),
        }
    }

    /// Returns a child block, one minute later, with cycle info derived from `protocol`.
    pub fn child(&self, protocol: &Protocol) -> Self {
        let level = self.level + 1;
        let cycle = protocol.cycle_of(level);
        Self {
            level,
            hash: random_hash(),
            predecessor: self.hash.clone(),
            timestamp: self.timestamp + Duration::minutes(1),
            protocol: self.protocol.clone(),
            cycle,
            cycle_position: level - protocol.first_level_of(cycle),
            priority: 0,
            baker: self.baker.clone(),
            reward: 0,
            deposit: 0,
            fees: 0,
            balance_updates: vec![],
            deactivated: vec![],
            revelation_penalties: vec![],
            operations: Operations::default(),
        }
    }

    pub fn level(&self, level: Level) -> Self {
        let mut new = self.clone();
        new.level = level;
        new
    }

    pub fn cycle(&self, cycle: CycleIndex, cycle_position: i32) -> Self {
        let mut new = self.clone();
        new.cycle = cycle;
        new.cycle_position = cycle_position;
        new
    }

    pub fn timestamp(&self, timestamp: OffsetDateTime) -> Self {
        let mut new = self.clone();
        new.timestamp = timestamp;
        new
    }

    pub fn baker(&self, baker: &str, priority: i32) -> Self {
        let mut new = self.clone();
        new.baker = baker.to_owned();
        new.priority = priority;
        new
    }

    /// Set production amounts
    pub fn production(&self, reward: Mutez, deposit: Mutez, fees: Mutez) -> Self {
        let mut new = self.clone();
        new.reward = reward;
        new.deposit = deposit;
        new.fees = fees;
        new
    }

    pub fn credit(&self, address: &str, change: Mutez) -> Self {
        let mut new = self.clone();
        new.balance_updates.push(BalanceUpdate::Contract {
            address: address.to_owned(),
            change,
        });
        new
    }

    pub fn freeze(&self, baker: &str, category: FreezerCategory, change: Mutez) -> Self {
        let mut new = self.clone();
        new.balance_updates.push(BalanceUpdate::Freezer {
            baker: baker.to_owned(),
            category,
            cycle: self.cycle,
            change,
        });
        new
    }

    pub fn endorsement(&self, delegate: &str, slots: i32) -> Self {
        let mut new = self.clone();
        new.operations.endorsements.push(Endorsement {
            delegate: delegate.to_owned(),
            slots,
        });
        new
    }

    pub fn delegation(&self, sender: &str, delegate: Option<&str>) -> Self {
        let mut new = self.clone();
        new.operations.delegations.push(Delegation {
            sender: sender.to_owned(),
            delegate: delegate.map(str::to_owned),
        });
        new
    }

    pub fn deactivation(&self, baker: &str) -> Self {
        let mut new = self.clone();
        new.deactivated.push(baker.to_owned());
        new
    }

    pub fn nonce_revelation(&self, revealed_level: Level, nonce: &str) -> Self {
        let mut new = self.clone();
        new.operations.nonce_revelations.push(NonceRevelation {
            revealed_level,
            nonce: nonce.to_owned(),
        });
        new
    }

    pub fn contract_call(&self, call: ContractCall) -> Self {
        let mut new = self.clone();
        new.operations.contract_calls.push(call);
        new
    }
}

impl Block {
    pub fn dummy() -> Self {
        Self {
            level: 1,
            hash: random_hash(),
            cycle: 0,
            cycle_position: 0,
            timestamp: dummy_timestamp(),
            protocol_code: 1,
            priority: 0,
            baker_id: 1,
            validations: 0,
            reward: 0,
            deposit: 0,
            fees: 0,
            events: 0,
            operations: 0,
        }
    }
}
