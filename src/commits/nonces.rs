//! Revealed seed nonces, consumed when computing future cycle seeds.
pub(crate) mod store;

use async_trait::async_trait;

use crate::core::protocol::Protocol;
use crate::core::types::AccountID;
use crate::core::types::CycleIndex;
use crate::core::types::Level;
use crate::core::types::NonceRevelation;
use crate::core::types::RawBlock;
use crate::error::invariant;
use crate::error::Error;
use crate::framework::Commit;
use crate::framework::Context;

#[derive(Debug, Clone, PartialEq)]
pub struct Revelation {
    /// Level of the block including the revelation
    pub level: Level,
    /// Baker of the including block
    pub baker_id: AccountID,
    pub revealed_level: Level,
    pub revealed_cycle: CycleIndex,
    pub nonce: Vec<u8>,
}

pub struct NonceRevelationsCommit;

#[async_trait]
impl Commit for NonceRevelationsCommit {
    fn name(&self) -> &'static str {
        "nonces"
    }

    async fn apply(&self, ctx: &mut Context<'_, '_>, raw: &RawBlock) -> Result<(), Error> {
        if raw.operations.nonce_revelations.is_empty() {
            return Ok(());
        }
        let protocol = ctx.cache.protocol(ctx.pgtx).await?;
        let baker_id = ctx.cache.block()?.baker_id;
        for op in &raw.operations.nonce_revelations {
            let revelation = parse(op, raw.level, baker_id, &protocol)?;
            store::insert(ctx.pgtx, &revelation).await?;
        }
        Ok(())
    }

    async fn revert(&self, ctx: &mut Context<'_, '_>, raw: &RawBlock) -> Result<(), Error> {
        store::delete_at(ctx.pgtx, raw.level).await?;
        Ok(())
    }
}

fn parse(
    op: &NonceRevelation,
    level: Level,
    baker_id: AccountID,
    protocol: &Protocol,
) -> Result<Revelation, Error> {
    let nonce = base16::decode(&op.nonce).map_err(|e| {
        invariant(format!(
            "invalid nonce for level {} revealed at {level}: {e}",
            op.revealed_level
        ))
    })?;
    Ok(Revelation {
        level,
        baker_id,
        revealed_level: op.revealed_level,
        revealed_cycle: protocol.cycle_of(op.revealed_level),
        nonce,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_decodes_nonce() {
        let p = Protocol::dummy();
        let op = NonceRevelation {
            revealed_level: 12,
            nonce: String::from("00ff10"),
        };
        let r = parse(&op, 20, 3, &p).unwrap();
        assert_eq!(r.revealed_cycle, 1);
        assert_eq!(r.nonce, vec![0, 255, 16]);
        assert_eq!(r.baker_id, 3);
    }

    #[test]
    fn parse_rejects_bad_hex() {
        let p = Protocol::dummy();
        let op = NonceRevelation {
            revealed_level: 12,
            nonce: String::from("xyz"),
        };
        assert!(parse(&op, 20, 3, &p).is_err());
    }
}
