use std::sync::Arc;

use asdf_block::{BlockManager, BlockPolicy};
use asdf_error::AsdfResult;
use bytes::Bytes;

use crate::{Registry, Value};

/// Write `value` to a tree and a block area under `policy`, then read both back.
///
/// Returns the value read back and the block manager it was read from.
pub fn roundtrip(
    registry: &Registry,
    value: &Value,
    policy: BlockPolicy,
) -> AsdfResult<(Value, BlockManager)> {
    let mut blocks = BlockManager::new(policy);
    blocks.begin_write();
    let node = registry.to_tree(value, &mut blocks)?;

    let mut out = Vec::new();
    blocks.write_blocks(&mut out)?;

    let mut read = BlockManager::read_blocks(Arc::new(Bytes::from(out)), 0)?;
    let back = registry.from_tree(&node, &mut read)?;
    Ok((back, read))
}

/// Check that `value` survives [`roundtrip`], comparing objects with their converters.
#[allow(clippy::panic)]
pub fn assert_roundtrip(registry: &Registry, value: &Value, policy: BlockPolicy) {
    let (back, _) =
        roundtrip(registry, value, policy).unwrap_or_else(|err| panic!("round trip failed: {err}"));
    if let Err(err) = registry.assert_values_equal(value, &back) {
        panic!("round trip changed the value: {err}");
    }
}
