use serde::Deserialize;
use serde::Deserializer;

use crate::core::types::Address;
use crate::core::types::BlockHash;
use crate::core::types::Level;
use crate::core::types::Mutez;

#[derive(Deserialize, Debug)]
pub struct HeaderInfo {
    pub level: Level,
    pub hash: BlockHash,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RawBakingRight {
    pub level: Level,
    pub delegate: Address,
    pub priority: i32,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RawEndorsingRight {
    pub level: Level,
    pub delegate: Address,
    pub slots: Vec<i32>,
}

impl RawEndorsingRight {
    pub fn slot_count(&self) -> i32 {
        self.slots.len() as i32
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Constants {
    pub preserved_cycles: i32,
    pub blocks_per_cycle: i32,
    pub blocks_per_roll_snapshot: i32,
    pub blocks_per_voting_period: i32,
    #[serde(deserialize_with = "mutez")]
    pub tokens_per_roll: Mutez,
    pub endorsers_per_block: i32,
    #[serde(deserialize_with = "mutez")]
    pub block_security_deposit: Mutez,
    #[serde(deserialize_with = "mutez")]
    pub endorsement_security_deposit: Mutez,
    #[serde(deserialize_with = "mutez_pair")]
    pub baking_reward_per_endorsement: [Mutez; 2],
    #[serde(deserialize_with = "mutez_pair")]
    pub endorsement_reward: [Mutez; 2],
    #[serde(deserialize_with = "mutez")]
    pub seed_nonce_revelation_tip: Mutez,
    pub min_proposal_quorum: i32,
    pub quorum_min: i32,
    pub quorum_max: i32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RawDelegate {
    #[serde(deserialize_with = "mutez")]
    pub balance: Mutez,
    #[serde(deserialize_with = "mutez")]
    pub staking_balance: Mutez,
    #[serde(deserialize_with = "mutez")]
    pub delegated_balance: Mutez,
    #[serde(default)]
    pub delegated_contracts: Vec<Address>,
    #[serde(default)]
    pub deactivated: bool,
}

/// Amount encoded as a JSON string, as the node does for 64-bit values.
#[derive(Debug)]
pub struct StringMutez(pub Mutez);

impl<'de> Deserialize<'de> for StringMutez {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        mutez(deserializer).map(StringMutez)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MaybeString {
    Str(String),
    Num(i64),
}

impl MaybeString {
    fn parse<E: serde::de::Error>(self) -> Result<Mutez, E> {
        match self {
            Self::Str(s) => s.parse().map_err(E::custom),
            Self::Num(n) => Ok(n),
        }
    }
}

fn mutez<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Mutez, D::Error> {
    MaybeString::deserialize(deserializer)?.parse()
}

/// Reward schedules hold one amount for priority 0 and one for other priorities.
fn mutez_pair<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[Mutez; 2], D::Error> {
    let values: Vec<MaybeString> = Vec::deserialize(deserializer)?;
    let mut amounts = values
        .into_iter()
        .map(|v| v.parse())
        .collect::<Result<Vec<Mutez>, D::Error>>()?;
    match amounts.len() {
        0 => Err(serde::de::Error::custom("empty reward schedule")),
        1 => Ok([amounts[0], amounts[0]]),
        _ => {
            amounts.truncate(2);
            Ok([amounts[0], amounts[1]])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn constants_accept_string_amounts() {
        let json = r#"{
            "preserved_cycles": 5,
            "blocks_per_cycle": 4096,
            "blocks_per_roll_snapshot": 256,
            "blocks_per_voting_period": 32768,
            "tokens_per_roll": "8000000000",
            "endorsers_per_block": 32,
            "block_security_deposit": "512000000",
            "endorsement_security_deposit": 64000000,
            "baking_reward_per_endorsement": ["1250000", "187500"],
            "endorsement_reward": ["1250000"],
            "seed_nonce_revelation_tip": "125000",
            "min_proposal_quorum": 500,
            "quorum_min": 2000,
            "quorum_max": 7000
        }"#;
        let c: Constants = serde_json::from_str(json).unwrap();
        assert_eq!(c.tokens_per_roll, 8_000_000_000);
        assert_eq!(c.endorsement_security_deposit, 64_000_000);
        assert_eq!(c.baking_reward_per_endorsement, [1_250_000, 187_500]);
        assert_eq!(c.endorsement_reward, [1_250_000, 1_250_000]);
    }

    #[test]
    fn endorsing_right_slot_count() {
        let json = r#"{"level": 12, "delegate": "tz1a", "slots": [0, 4, 17]}"#;
        let r: RawEndorsingRight = serde_json::from_str(json).unwrap();
        assert_eq!(r.slot_count(), 3);
    }
}
