//! Buffer descriptor numbering
//!
//! Every block of a DMA program that carries a transfer needs a hardware BD
//! slot. Tile and shim DMAs number their BDs densely in program order.
//! Mem tile DMAs split the pool in two:
//! - blocks reachable from an even channel use BDs 0..24
//! - blocks reachable from an odd channel use BDs 24..48

use std::collections::HashMap;

use crate::error::{CompileError, CompileResult};
use crate::netlist::{BlockId, DmaEngine};
use crate::target::{DmaKind, TargetModel, MEMTILE_ODD_BD_BASE};

/// BD numbers assigned to the blocks of one DMA program
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BdAssignment {
    ids: HashMap<BlockId, u32>,
}

impl BdAssignment {
    pub fn get(&self, block: BlockId) -> Option<u32> {
        self.ids.get(&block).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Assignments ordered by block
    pub fn entries(&self) -> Vec<(BlockId, u32)> {
        let mut entries: Vec<_> = self.ids.iter().map(|(b, id)| (*b, *id)).collect();
        entries.sort();
        entries
    }
}

/// Assigns BD numbers under the numbering rules of each engine kind
pub struct BlockDescriptorAllocator<'a> {
    target: &'a TargetModel,
}

impl<'a> BlockDescriptorAllocator<'a> {
    pub fn new(target: &'a TargetModel) -> Self {
        Self { target }
    }

    /// Number the BD-carrying blocks of `engine`; `label` names it in errors
    pub fn assign(&self, engine: &DmaEngine, label: &str) -> CompileResult<BdAssignment> {
        match engine.kind {
            DmaKind::MemTile => self.assign_memtile(engine, label),
            DmaKind::Mem | DmaKind::Shim => self.assign_dense(engine, label),
        }
    }

    fn assign_dense(&self, engine: &DmaEngine, label: &str) -> CompileResult<BdAssignment> {
        let mut assignment = BdAssignment::default();
        let mut bd_num = 0u32;

        for (id, block) in &engine.blocks {
            if block.has_bd() {
                assignment.ids.insert(id, bd_num);
                log::debug!("{}: block {} -> BD {}", label, id, bd_num);
                bd_num += 1;
            }
        }

        let available = self.target.num_bds(engine.kind);
        if assignment.len() > available {
            return Err(CompileError::BdPoolExhausted {
                engine: label.to_string(),
                requested: assignment.len(),
                available,
            });
        }
        Ok(assignment)
    }

    fn assign_memtile(&self, engine: &DmaEngine, label: &str) -> CompileResult<BdAssignment> {
        let channels = channel_map(engine);
        let mut assignment = BdAssignment::default();
        let mut even_bd = 0u32;
        let mut odd_bd = MEMTILE_ODD_BD_BASE;

        for (id, block) in &engine.blocks {
            if !block.has_bd() {
                continue;
            }
            let Some(channel) = channels.get(&id) else {
                log::debug!("{}: block {} is not reachable from any channel, skipped", label, id);
                continue;
            };
            let bd_num = if channel & 1 == 1 {
                odd_bd += 1;
                odd_bd - 1
            } else {
                even_bd += 1;
                even_bd - 1
            };
            log::debug!("{}: block {} (channel {}) -> BD {}", label, id, channel, bd_num);
            assignment.ids.insert(id, bd_num);
        }

        let half = MEMTILE_ODD_BD_BASE as usize;
        let odd_used = (odd_bd - MEMTILE_ODD_BD_BASE) as usize;
        let total = self.target.num_bds(DmaKind::MemTile);
        if even_bd as usize > half || odd_used > total - half {
            return Err(CompileError::BdPoolExhausted {
                engine: label.to_string(),
                requested: (even_bd as usize).max(odd_used),
                available: half.min(total - half),
            });
        }
        Ok(assignment)
    }
}

/// Owning channel of every block reachable from a channel start.
///
/// A block keeps the first channel that reaches it, which also stops the walk
/// around looping BD chains.
pub fn channel_map(engine: &DmaEngine) -> HashMap<BlockId, u32> {
    let mut channels = HashMap::new();

    for start in &engine.starts {
        let mut work_list = vec![start.entry];
        while let Some(block) = work_list.pop() {
            if channels.contains_key(&block) {
                continue;
            }
            channels.insert(block, start.channel);
            if let Some(next) = engine.block(block).and_then(|b| b.next) {
                work_list.push(next);
            }
        }
    }

    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::{Block, BufferId, BufferRef, ChannelDir, TileId};
    use unnamed_entity::EntityId;

    fn bd() -> Block {
        Block::bd(BufferRef::Local(BufferId::from_idx(0)), 0, 16)
    }

    fn block(index: usize) -> BlockId {
        BlockId::from_idx(index)
    }

    #[test]
    fn test_dense_numbering_skips_blocks_without_bd() {
        let target = TargetModel::aie1(50, 9);
        let mut engine = DmaEngine::new(DmaKind::Mem, TileId::from_idx(0));
        let b0 = engine.push_block(Block::default());
        let b1 = engine.push_block(bd().then(block(2)));
        let b2 = engine.push_block(bd().then(block(3)));
        let b3 = engine.push_block(Block::end());
        engine.start(0, ChannelDir::S2MM, b1);

        let ids = BlockDescriptorAllocator::new(&target)
            .assign(&engine, "mem(1, 3)")
            .unwrap();
        assert_eq!(ids.get(b0), None);
        assert_eq!(ids.get(b1), Some(0));
        assert_eq!(ids.get(b2), Some(1));
        assert_eq!(ids.get(b3), None);
    }

    #[test]
    fn test_memtile_split_by_channel_parity() {
        let target = TargetModel::aie2(4, 6);
        let mut engine = DmaEngine::new(DmaKind::MemTile, TileId::from_idx(0));
        // Interleave the declarations of the two chains
        let odd_a = engine.push_block(bd().then(block(2)));
        let even_a = engine.push_block(bd().then(block(3)));
        let odd_b = engine.push_block(bd().then(block(0)));
        let even_b = engine.push_block(bd().then(block(1)));
        engine.start(0, ChannelDir::MM2S, even_a);
        engine.start(1, ChannelDir::S2MM, odd_a);

        let ids = BlockDescriptorAllocator::new(&target)
            .assign(&engine, "memtile_dma(1, 1)")
            .unwrap();
        assert_eq!(ids.get(even_a), Some(0));
        assert_eq!(ids.get(even_b), Some(1));
        assert_eq!(ids.get(odd_a), Some(24));
        assert_eq!(ids.get(odd_b), Some(25));
    }

    #[test]
    fn test_memtile_unreachable_block_gets_no_id() {
        let target = TargetModel::aie2(4, 6);
        let mut engine = DmaEngine::new(DmaKind::MemTile, TileId::from_idx(0));
        let live = engine.push_block(bd().then(block(0)));
        let orphan = engine.push_block(bd());
        engine.start(2, ChannelDir::MM2S, live);

        let ids = BlockDescriptorAllocator::new(&target)
            .assign(&engine, "memtile_dma(1, 1)")
            .unwrap();
        assert_eq!(ids.get(live), Some(0));
        assert_eq!(ids.get(orphan), None);
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn test_channel_map_first_channel_wins() {
        let mut engine = DmaEngine::new(DmaKind::MemTile, TileId::from_idx(0));
        let a = engine.push_block(bd().then(block(1)));
        let b = engine.push_block(bd().then(block(0)));
        engine.start(3, ChannelDir::MM2S, a);
        engine.start(0, ChannelDir::S2MM, b);

        let channels = channel_map(&engine);
        assert_eq!(channels.get(&a), Some(&3));
        assert_eq!(channels.get(&b), Some(&3));
    }

    #[test]
    fn test_ids_unique_and_in_range() {
        let target = TargetModel::aie2(4, 6);
        let mut engine = DmaEngine::new(DmaKind::MemTile, TileId::from_idx(0));
        for ch in 0..4u32 {
            let first = engine.blocks.len();
            for i in 0..5 {
                let next = if i == 4 { first } else { first + i + 1 };
                engine.push_block(bd().then(block(next)));
            }
            engine.start(ch, ChannelDir::MM2S, block(first));
        }

        let ids = BlockDescriptorAllocator::new(&target)
            .assign(&engine, "memtile_dma(1, 1)")
            .unwrap();
        let mut seen: Vec<u32> = ids.entries().into_iter().map(|(_, id)| id).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 20);
        let channels = channel_map(&engine);
        for (block, id) in ids.entries() {
            if channels[&block] % 2 == 0 {
                assert!(id < 24);
            } else {
                assert!((24..48).contains(&id));
            }
        }
    }

    #[test]
    fn test_pool_exhausted() {
        let target = TargetModel::aie1(50, 9);
        let mut engine = DmaEngine::new(DmaKind::Shim, TileId::from_idx(0));
        for _ in 0..17 {
            engine.push_block(bd());
        }
        let result = BlockDescriptorAllocator::new(&target).assign(&engine, "shim_dma(2, 0)");
        assert!(matches!(
            result,
            Err(CompileError::BdPoolExhausted { requested: 17, available: 16, .. })
        ));
    }
}
