//! Netlist analysis
//!
//! Builds the lookup tables every generator works from. The tables are
//! computed once per run and only read afterwards.

use std::collections::{HashMap, HashSet};

use crate::error::CompileResult;
use crate::netlist::*;

/// A circuit connection, identified by its switchbox and position in it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectRef {
    pub switchbox: SwitchboxId,
    pub index: usize,
}

/// One DMA channel of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileChannel {
    pub tile: TileId,
    pub direction: ChannelDir,
    pub channel: u32,
}

/// Engine and entry block a channel is started on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelBinding {
    pub dma: DmaId,
    pub entry: BlockId,
}

/// A circuit route from an MM2S channel to an S2MM channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaFlow {
    pub source: TileChannel,
    pub dest: TileChannel,
    /// First and last connection of the route
    pub first: ConnectRef,
    pub last: ConnectRef,
}

/// Read-only indices over a device netlist
pub struct NetlistAnalysis<'a> {
    device: &'a Device,
    /// (col, row) -> tile
    tiles: HashMap<(u32, u32), TileId>,
    cores: HashMap<TileId, CoreId>,
    /// tile -> DMA engine placed on it
    mems: HashMap<TileId, DmaId>,
    locks: HashMap<(TileId, u32), LockId>,
    tile_locks: HashMap<TileId, Vec<LockId>>,
    buffers: HashMap<TileId, Vec<BufferId>>,
    switchboxes: HashMap<TileId, SwitchboxId>,
    dma_buffers: HashMap<DmaId, Vec<BufferRef>>,
    dma_locks: HashMap<DmaId, Vec<LockId>>,
    buffer_users: HashMap<BufferRef, Vec<DmaId>>,
    channels: HashMap<TileChannel, ChannelBinding>,
    /// DMA-sourced connection -> the connections its routes end on
    dma_connects: HashMap<ConnectRef, Vec<ConnectRef>>,
    flows: Vec<DmaFlow>,
}

impl<'a> NetlistAnalysis<'a> {
    /// Analyze the device of a module; fails if there is no device
    pub fn from_module(module: &'a Module) -> CompileResult<Self> {
        Self::new(module.device()?)
    }

    /// Analyze a device. Its references are checked first, so every handle
    /// reachable from the analysis resolves.
    pub fn new(device: &'a Device) -> CompileResult<Self> {
        device.check_references()?;
        let mut analysis = Self {
            device,
            tiles: HashMap::new(),
            cores: HashMap::new(),
            mems: HashMap::new(),
            locks: HashMap::new(),
            tile_locks: HashMap::new(),
            buffers: HashMap::new(),
            switchboxes: HashMap::new(),
            dma_buffers: HashMap::new(),
            dma_locks: HashMap::new(),
            buffer_users: HashMap::new(),
            channels: HashMap::new(),
            dma_connects: HashMap::new(),
            flows: Vec::new(),
        };
        analysis.collect_tiles();
        analysis.collect_resources();
        analysis.collect_dma_usage();
        analysis.dma_analysis();
        Ok(analysis)
    }

    fn collect_tiles(&mut self) {
        for (id, tile) in &self.device.tiles {
            self.tiles.insert((tile.col, tile.row), id);
        }
    }

    fn collect_resources(&mut self) {
        let device = self.device;

        for (id, core) in &device.cores {
            self.cores.insert(core.tile, id);
        }
        for (id, lock) in &device.locks {
            self.locks.insert((lock.tile, lock.id), id);
            self.tile_locks.entry(lock.tile).or_default().push(id);
        }
        for (id, buffer) in &device.buffers {
            self.buffers.entry(buffer.tile).or_default().push(id);
        }
        for (id, engine) in &device.dmas {
            self.mems.insert(engine.tile, id);
        }
        for (id, switchbox) in &device.switchboxes {
            if let SwitchboxSite::Tile(tile) = switchbox.site {
                self.switchboxes.insert(tile, id);
            }
        }
    }

    /// Record which buffers and locks each DMA program touches
    fn collect_dma_usage(&mut self) {
        for (dma, engine) in &self.device.dmas {
            let mut bufs: Vec<BufferRef> = Vec::new();
            let mut locks: Vec<LockId> = Vec::new();

            for block in engine.blocks.values() {
                for payload in block.a.iter().chain(block.b.iter()) {
                    if !bufs.contains(&payload.buffer) {
                        bufs.push(payload.buffer);
                    }
                }
                for use_lock in &block.locks {
                    if !locks.contains(&use_lock.lock) {
                        locks.push(use_lock.lock);
                    }
                }
            }

            for buffer in &bufs {
                self.buffer_users.entry(*buffer).or_default().push(dma);
            }
            self.dma_buffers.insert(dma, bufs);
            self.dma_locks.insert(dma, locks);
        }
    }

    /// Bind started channels to their engines and follow every circuit
    /// route that leaves a DMA to the DMA ports it reaches
    fn dma_analysis(&mut self) {
        let device = self.device;

        for (dma, engine) in &device.dmas {
            for start in &engine.starts {
                let channel = TileChannel {
                    tile: engine.tile,
                    direction: start.direction,
                    channel: start.channel,
                };
                self.channels.insert(
                    channel,
                    ChannelBinding {
                        dma,
                        entry: start.entry,
                    },
                );
            }
        }

        for (id, switchbox) in &device.switchboxes {
            let SwitchboxSite::Tile(tile) = switchbox.site else {
                continue;
            };
            for (index, connect) in switchbox.connections.iter().enumerate() {
                if connect.source.bundle != WireBundle::Dma {
                    continue;
                }
                let first = ConnectRef { switchbox: id, index };
                let dests = self.find_dest_connects(first, WireBundle::Dma);
                for &last in &dests {
                    let Some((dest_tile, dest)) = self.connect_with_tile(last) else {
                        continue;
                    };
                    self.flows.push(DmaFlow {
                        source: TileChannel {
                            tile,
                            direction: ChannelDir::MM2S,
                            channel: connect.source.index,
                        },
                        dest: TileChannel {
                            tile: dest_tile,
                            direction: ChannelDir::S2MM,
                            channel: dest.dest.index,
                        },
                        first,
                        last,
                    });
                }
                self.dma_connects.insert(first, dests);
            }
        }
    }

    pub fn device(&self) -> &'a Device {
        self.device
    }

    pub fn tile_at(&self, col: u32, row: u32) -> Option<TileId> {
        self.tiles.get(&(col, row)).copied()
    }

    pub fn coord(&self, tile: TileId) -> CompileResult<(u32, u32)> {
        let tile = self.device.tile(tile)?;
        Ok((tile.col, tile.row))
    }

    pub fn core_of(&self, tile: TileId) -> Option<CoreId> {
        self.cores.get(&tile).copied()
    }

    pub fn dma_of(&self, tile: TileId) -> Option<DmaId> {
        self.mems.get(&tile).copied()
    }

    pub fn switchbox_of(&self, tile: TileId) -> Option<SwitchboxId> {
        self.switchboxes.get(&tile).copied()
    }

    pub fn lock_at(&self, tile: TileId, id: u32) -> Option<LockId> {
        self.locks.get(&(tile, id)).copied()
    }

    pub fn locks_of(&self, tile: TileId) -> &[LockId] {
        self.tile_locks.get(&tile).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn buffers_of(&self, tile: TileId) -> &[BufferId] {
        self.buffers.get(&tile).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Address the allocator gave a buffer
    pub fn buffer_address(&self, buffer: BufferId) -> Option<u64> {
        self.device.buffers.get(buffer).map(|b| b.address)
    }

    pub fn dma_buffers(&self, dma: DmaId) -> &[BufferRef] {
        self.dma_buffers.get(&dma).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dma_locks(&self, dma: DmaId) -> &[LockId] {
        self.dma_locks.get(&dma).map(Vec::as_slice).unwrap_or(&[])
    }

    /// DMA engines that read or write a buffer
    pub fn buffer_users(&self, buffer: BufferRef) -> &[DmaId] {
        self.buffer_users.get(&buffer).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Engine and entry block a channel was started on, if any
    pub fn channel_binding(&self, channel: TileChannel) -> Option<ChannelBinding> {
        self.channels.get(&channel).copied()
    }

    /// DMA-bound connections reached from a DMA-sourced connection
    pub fn dma_connects(&self, source: ConnectRef) -> &[ConnectRef] {
        self.dma_connects.get(&source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every DMA to DMA circuit route, in switchbox declaration order
    pub fn dma_flows(&self) -> &[DmaFlow] {
        &self.flows
    }

    fn connect(&self, connect: ConnectRef) -> Option<&'a Connect> {
        self.device
            .switchboxes
            .get(connect.switchbox)
            .and_then(|sb| sb.connections.get(connect.index))
    }

    fn connect_with_tile(&self, connect: ConnectRef) -> Option<(TileId, &'a Connect)> {
        let site = &self.device.switchboxes.get(connect.switchbox)?.site;
        let SwitchboxSite::Tile(tile) = *site else {
            return None;
        };
        Some((tile, self.connect(connect)?))
    }

    /// Connections in the neighboring switchbox fed by `current`'s outward port
    pub fn next_connects(&self, current: ConnectRef) -> Vec<ConnectRef> {
        let Some((tile, connect)) = self.connect_with_tile(current) else {
            return Vec::new();
        };
        let Ok((col, row)) = self.coord(tile) else {
            return Vec::new();
        };

        let next = match connect.dest.bundle {
            WireBundle::East => Some((col + 1, row, WireBundle::West)),
            WireBundle::West => col.checked_sub(1).map(|c| (c, row, WireBundle::East)),
            WireBundle::North => Some((col, row + 1, WireBundle::South)),
            WireBundle::South => row.checked_sub(1).map(|r| (col, r, WireBundle::North)),
            _ => None,
        };
        let Some((next_col, next_row, next_bundle)) = next else {
            return Vec::new();
        };
        let Some(next_switchbox) = self
            .tile_at(next_col, next_row)
            .and_then(|tile| self.switchbox_of(tile))
        else {
            return Vec::new();
        };
        let Some(switchbox) = self.device.switchboxes.get(next_switchbox) else {
            return Vec::new();
        };

        let entry = Port::new(next_bundle, connect.dest.index);
        switchbox
            .connections
            .iter()
            .enumerate()
            .filter(|(_, c)| c.source == entry)
            .map(|(index, _)| ConnectRef {
                switchbox: next_switchbox,
                index,
            })
            .collect()
    }

    /// Every connection on a route from `source` that ends in a `dest_bundle` port
    pub fn find_dest_connects(&self, source: ConnectRef, dest_bundle: WireBundle) -> Vec<ConnectRef> {
        let mut dests = Vec::new();
        let mut visited = HashSet::new();
        let mut work_list = vec![source];

        while let Some(visitor) = work_list.pop() {
            if !visited.insert(visitor) {
                continue;
            }
            let Some(connect) = self.connect(visitor) else {
                continue;
            };
            if connect.dest.bundle == dest_bundle {
                dests.push(visitor);
                continue;
            }
            work_list.extend(self.next_connects(visitor));
        }

        dests
    }
}
