//! Device netlist definitions
//!
//! The netlist is a frozen graph of tiles and the resources placed on them.
//! Entities live in per-kind arenas on [`Device`] and refer to each other
//! through typed index handles, so the graph has no owning back-pointers.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use unnamed_entity::{entity_id, EntityVec};

use crate::error::{CompileError, CompileResult};
use crate::target::{DmaKind, TargetModel, NUM_MSELS};

entity_id! {
    pub id TileId usize;
    pub id CoreId usize;
    pub id LockId usize;
    pub id BufferId usize;
    pub id ExternalBufferId usize;
    pub id DmaId usize;
    // Scoped to the owning engine
    pub id BlockId usize;
    pub id SwitchboxId usize;
}

/// Top-level container read from the serialized netlist
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    #[serde(default)]
    pub devices: Vec<Device>,
}

impl Module {
    pub fn new(device: Device) -> Self {
        Self {
            devices: vec![device],
        }
    }

    /// Deserialize a module and bounds-check every handle it contains
    pub fn from_json(source: &str) -> CompileResult<Self> {
        let module: Module = serde_json::from_str(source)?;
        for device in &module.devices {
            device.check_references()?;
        }
        Ok(module)
    }

    /// The device being lowered; the first one when several are present
    pub fn device(&self) -> CompileResult<&Device> {
        self.devices.first().ok_or(CompileError::MissingDevice)
    }
}

/// A placed design on one target device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub target: TargetModel,
    #[serde(default)]
    pub tiles: EntityVec<TileId, Tile>,
    #[serde(default)]
    pub cores: EntityVec<CoreId, Core>,
    #[serde(default)]
    pub locks: EntityVec<LockId, Lock>,
    #[serde(default)]
    pub buffers: EntityVec<BufferId, Buffer>,
    #[serde(default)]
    pub external_buffers: EntityVec<ExternalBufferId, ExternalBuffer>,
    #[serde(default)]
    pub dmas: EntityVec<DmaId, DmaEngine>,
    #[serde(default)]
    pub switchboxes: EntityVec<SwitchboxId, Switchbox>,
    #[serde(default)]
    pub shim_muxes: Vec<ShimMux>,
    #[serde(default)]
    pub shim_switchboxes: Vec<ShimSwitchbox>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub col: u32,
    pub row: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Core {
    pub tile: TileId,
    /// Core program image; `core_<col>_<row>.elf` when absent
    #[serde(default)]
    pub elf_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    pub tile: TileId,
    pub id: u32,
    #[serde(default)]
    pub init: Option<i32>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Element type of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    I8,
    I16,
    I32,
    I64,
    Bf16,
    F32,
}

impl ElementType {
    pub fn bit_width(self) -> u32 {
        match self {
            ElementType::I8 => 8,
            ElementType::I16 | ElementType::Bf16 => 16,
            ElementType::I32 | ElementType::F32 => 32,
            ElementType::I64 => 64,
        }
    }

    pub fn byte_width(self) -> u32 {
        self.bit_width() / 8
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ElementType::I8 => "i8",
            ElementType::I16 => "i16",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
            ElementType::Bf16 => "bf16",
            ElementType::F32 => "f32",
        };
        write!(f, "{}", name)
    }
}

/// Tile-local data memory buffer with an already assigned address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buffer {
    pub tile: TileId,
    #[serde(default)]
    pub name: Option<String>,
    pub address: u64,
    pub element_type: ElementType,
    pub count: usize,
}

/// Host memory buffer reached through a shim DMA
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalBuffer {
    #[serde(default)]
    pub name: Option<String>,
    pub element_type: ElementType,
    pub count: usize,
}

/// Buffer targeted by a BD payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferRef {
    Local(BufferId),
    External(ExternalBufferId),
}

/// One side (A or B) of a buffer descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BdPayload {
    pub buffer: BufferRef,
    /// Offset into the buffer, in elements
    #[serde(default)]
    pub offset: u32,
    /// Transfer length, in elements
    pub len: u32,
}

/// One (step, wrap) dimension of a multi-dimensional transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimTuple {
    pub step: u32,
    pub wrap: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockActionKind {
    Acquire,
    AcquireGreaterEqual,
    Release,
    #[serde(other)]
    Unrecognized,
}

/// Lock operation attached to a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseLock {
    pub lock: LockId,
    pub action: LockActionKind,
    pub value: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketTag {
    pub id: u32,
    pub packet_type: u32,
}

/// A basic block of a DMA program.
///
/// All fields are independent: a block may describe a transfer, only chain to
/// another block, or be the terminal `end` block of a chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub a: Option<BdPayload>,
    #[serde(default)]
    pub b: Option<BdPayload>,
    #[serde(default)]
    pub dims: Vec<DimTuple>,
    #[serde(default)]
    pub locks: Vec<UseLock>,
    #[serde(default)]
    pub packet: Option<PacketTag>,
    #[serde(default)]
    pub next: Option<BlockId>,
    #[serde(default)]
    pub end: bool,
}

impl Block {
    /// Block describing a single-sided transfer
    pub fn bd(buffer: BufferRef, offset: u32, len: u32) -> Self {
        Self {
            a: Some(BdPayload {
                buffer,
                offset,
                len,
            }),
            ..Self::default()
        }
    }

    /// Terminal block of a chain
    pub fn end() -> Self {
        Self {
            end: true,
            ..Self::default()
        }
    }

    pub fn with_b(mut self, buffer: BufferRef, offset: u32, len: u32) -> Self {
        self.b = Some(BdPayload {
            buffer,
            offset,
            len,
        });
        self
    }

    pub fn with_dims(mut self, dims: &[(u32, u32)]) -> Self {
        self.dims = dims
            .iter()
            .map(|&(step, wrap)| DimTuple { step, wrap })
            .collect();
        self
    }

    pub fn with_lock(mut self, lock: LockId, action: LockActionKind, value: i32) -> Self {
        self.locks.push(UseLock {
            lock,
            action,
            value,
        });
        self
    }

    pub fn with_packet(mut self, id: u32, packet_type: u32) -> Self {
        self.packet = Some(PacketTag { id, packet_type });
        self
    }

    pub fn then(mut self, next: BlockId) -> Self {
        self.next = Some(next);
        self
    }

    /// Does this block carry a buffer descriptor?
    pub fn has_bd(&self) -> bool {
        self.a.is_some() || self.b.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelDir {
    S2MM,
    MM2S,
}

impl std::fmt::Display for ChannelDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelDir::S2MM => write!(f, "S2MM"),
            ChannelDir::MM2S => write!(f, "MM2S"),
        }
    }
}

/// Starts a channel on the chain beginning at `entry`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStart {
    pub channel: u32,
    pub direction: ChannelDir,
    pub entry: BlockId,
}

/// A DMA program bound to one engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DmaEngine {
    pub kind: DmaKind,
    pub tile: TileId,
    #[serde(default)]
    pub blocks: EntityVec<BlockId, Block>,
    #[serde(default)]
    pub starts: Vec<ChannelStart>,
}

impl DmaEngine {
    pub fn new(kind: DmaKind, tile: TileId) -> Self {
        Self {
            kind,
            tile,
            blocks: EntityVec::new(),
            starts: Vec::new(),
        }
    }

    pub fn push_block(&mut self, block: Block) -> BlockId {
        self.blocks.push(block)
    }

    pub fn start(&mut self, channel: u32, direction: ChannelDir, entry: BlockId) {
        self.starts.push(ChannelStart {
            channel,
            direction,
            entry,
        });
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }
}

/// Stream switch port class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireBundle {
    Core,
    Dma,
    Fifo,
    South,
    West,
    North,
    East,
    Plio,
    Noc,
    Trace,
    Ctrl,
}

impl WireBundle {
    /// libxaie `StrmSwPortType` spelling
    pub fn xaie_name(self) -> &'static str {
        match self {
            WireBundle::Core => "CORE",
            WireBundle::Dma => "DMA",
            WireBundle::Fifo => "FIFO",
            WireBundle::South => "SOUTH",
            WireBundle::West => "WEST",
            WireBundle::North => "NORTH",
            WireBundle::East => "EAST",
            WireBundle::Plio => "PLIO",
            WireBundle::Noc => "NOC",
            WireBundle::Trace => "TRACE",
            WireBundle::Ctrl => "CTRL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
    pub bundle: WireBundle,
    pub index: u32,
}

impl Port {
    pub fn new(bundle: WireBundle, index: u32) -> Self {
        Self { bundle, index }
    }
}

/// Circuit-switched connection inside one switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connect {
    pub source: Port,
    pub dest: Port,
}

impl Connect {
    pub fn new(source: Port, dest: Port) -> Self {
        Self { source, dest }
    }
}

/// Arbiter / master-select binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AmSel {
    pub arbiter: u32,
    pub msel: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterSet {
    pub dest: Port,
    pub amsels: Vec<AmSel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketRule {
    pub mask: u32,
    pub value: u32,
    pub amsel: AmSel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRules {
    pub source: Port,
    pub rules: Vec<PacketRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterRange {
    pub start: i32,
    pub end: i32,
    pub stride: i32,
}

/// Position of a switchbox configured for a whole herd region at once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamRange {
    pub herd: String,
    pub x: IterRange,
    pub y: IterRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchboxSite {
    Tile(TileId),
    Range(ParamRange),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Switchbox {
    pub site: SwitchboxSite,
    #[serde(default)]
    pub connections: Vec<Connect>,
    #[serde(default)]
    pub master_sets: Vec<MasterSet>,
    #[serde(default)]
    pub packet_rules: Vec<PacketRules>,
}

impl Switchbox {
    pub fn new(site: SwitchboxSite) -> Self {
        Self {
            site,
            connections: Vec::new(),
            master_sets: Vec::new(),
            packet_rules: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty() && self.master_sets.is_empty() && self.packet_rules.is_empty()
    }
}

/// Shim tile multiplexer between the stream switch and the shim DMA / NoC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShimMux {
    pub tile: TileId,
    #[serde(default)]
    pub connections: Vec<Connect>,
}

/// Stream switch of a shim column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShimSwitchbox {
    pub col: u32,
    #[serde(default)]
    pub connections: Vec<Connect>,
}

impl Device {
    pub fn new(target: TargetModel) -> Self {
        Self {
            target,
            tiles: EntityVec::new(),
            cores: EntityVec::new(),
            locks: EntityVec::new(),
            buffers: EntityVec::new(),
            external_buffers: EntityVec::new(),
            dmas: EntityVec::new(),
            switchboxes: EntityVec::new(),
            shim_muxes: Vec::new(),
            shim_switchboxes: Vec::new(),
        }
    }

    pub fn add_tile(&mut self, col: u32, row: u32) -> TileId {
        self.tiles.push(Tile { col, row })
    }

    pub fn add_core(&mut self, tile: TileId, elf_file: Option<&str>) -> CoreId {
        self.cores.push(Core {
            tile,
            elf_file: elf_file.map(str::to_string),
        })
    }

    pub fn add_lock(&mut self, tile: TileId, id: u32, init: Option<i32>, name: Option<&str>) -> LockId {
        self.locks.push(Lock {
            tile,
            id,
            init,
            name: name.map(str::to_string),
        })
    }

    pub fn add_buffer(
        &mut self,
        tile: TileId,
        name: Option<&str>,
        address: u64,
        element_type: ElementType,
        count: usize,
    ) -> BufferId {
        self.buffers.push(Buffer {
            tile,
            name: name.map(str::to_string),
            address,
            element_type,
            count,
        })
    }

    pub fn add_external_buffer(
        &mut self,
        name: Option<&str>,
        element_type: ElementType,
        count: usize,
    ) -> ExternalBufferId {
        self.external_buffers.push(ExternalBuffer {
            name: name.map(str::to_string),
            element_type,
            count,
        })
    }

    pub fn add_dma(&mut self, engine: DmaEngine) -> DmaId {
        self.dmas.push(engine)
    }

    pub fn add_switchbox(&mut self, switchbox: Switchbox) -> SwitchboxId {
        self.switchboxes.push(switchbox)
    }

    pub fn tile(&self, id: TileId) -> CompileResult<&Tile> {
        self.tiles
            .get(id)
            .ok_or_else(|| CompileError::invalid_ref(format!("missing tile {}", id)))
    }

    pub fn core(&self, id: CoreId) -> CompileResult<&Core> {
        self.cores
            .get(id)
            .ok_or_else(|| CompileError::invalid_ref(format!("missing core {}", id)))
    }

    pub fn lock(&self, id: LockId) -> CompileResult<&Lock> {
        self.locks
            .get(id)
            .ok_or_else(|| CompileError::invalid_ref(format!("missing lock {}", id)))
    }

    pub fn buffer(&self, id: BufferId) -> CompileResult<&Buffer> {
        self.buffers
            .get(id)
            .ok_or_else(|| CompileError::invalid_ref(format!("missing buffer {}", id)))
    }

    pub fn external_buffer(&self, id: ExternalBufferId) -> CompileResult<&ExternalBuffer> {
        self.external_buffers
            .get(id)
            .ok_or_else(|| CompileError::invalid_ref(format!("missing external buffer {}", id)))
    }

    /// C identifier of an external buffer; unnamed buffers get `ext<index>`
    pub fn external_name(&self, id: ExternalBufferId) -> CompileResult<String> {
        Ok(self
            .external_buffer(id)?
            .name
            .clone()
            .unwrap_or_else(|| format!("ext{}", id)))
    }

    pub fn dma(&self, id: DmaId) -> CompileResult<&DmaEngine> {
        self.dmas
            .get(id)
            .ok_or_else(|| CompileError::invalid_ref(format!("missing DMA engine {}", id)))
    }

    pub fn switchbox(&self, id: SwitchboxId) -> CompileResult<&Switchbox> {
        self.switchboxes
            .get(id)
            .ok_or_else(|| CompileError::invalid_ref(format!("missing switchbox {}", id)))
    }

    /// Element type of whatever a BD payload points at
    pub fn element_type(&self, buffer: BufferRef) -> CompileResult<ElementType> {
        Ok(match buffer {
            BufferRef::Local(id) => self.buffer(id)?.element_type,
            BufferRef::External(id) => self.external_buffer(id)?.element_type,
        })
    }

    /// Human-readable identity of a DMA engine, used in diagnostics
    pub fn engine_label(&self, id: DmaId) -> CompileResult<String> {
        let engine = self.dma(id)?;
        let tile = self.tile(engine.tile)?;
        Ok(format!("{}({}, {})", engine.kind.label(), tile.col, tile.row))
    }

    /// Check that every handle in the netlist points into its arena and that
    /// every hardware field is in range
    pub fn check_references(&self) -> CompileResult<()> {
        let tile_ok = |id: TileId, what: &str| -> CompileResult<()> {
            self.tile(id)
                .map(|_| ())
                .map_err(|_| CompileError::invalid_ref(format!("{} refers to missing tile {}", what, id)))
        };

        for core in self.cores.values() {
            tile_ok(core.tile, "core")?;
        }
        for lock in self.locks.values() {
            tile_ok(lock.tile, "lock")?;
        }
        for buffer in self.buffers.values() {
            tile_ok(buffer.tile, "buffer")?;
        }
        for mux in &self.shim_muxes {
            tile_ok(mux.tile, "shim mux")?;
        }
        for (id, switchbox) in &self.switchboxes {
            if let SwitchboxSite::Tile(tile) = switchbox.site {
                tile_ok(tile, "switchbox")?;
            }
            let amsels = switchbox
                .master_sets
                .iter()
                .flat_map(|set| set.amsels.iter())
                .chain(switchbox.packet_rules.iter().flat_map(|group| group.rules.iter().map(|rule| &rule.amsel)));
            for amsel in amsels {
                if amsel.msel >= NUM_MSELS {
                    return Err(CompileError::invalid_ref(format!(
                        "switchbox {} selects master line {}, only {} exist",
                        id, amsel.msel, NUM_MSELS
                    )));
                }
            }
        }

        for (index, engine) in &self.dmas {
            tile_ok(engine.tile, "DMA engine")?;
            let block_ok = |id: BlockId| -> CompileResult<()> {
                match engine.block(id) {
                    Some(_) => Ok(()),
                    None => Err(CompileError::invalid_ref(format!(
                        "DMA engine {} refers to missing block {}",
                        index, id
                    ))),
                }
            };
            for start in &engine.starts {
                block_ok(start.entry)?;
            }
            for block in engine.blocks.values() {
                if let Some(next) = block.next {
                    block_ok(next)?;
                }
                for payload in block.a.iter().chain(block.b.iter()) {
                    self.check_buffer_ref(payload.buffer)?;
                }
                for use_lock in &block.locks {
                    if self.locks.get(use_lock.lock).is_none() {
                        return Err(CompileError::invalid_ref(format!(
                            "DMA engine {} refers to missing lock {}",
                            index, use_lock.lock
                        )));
                    }
                }
            }
        }

        self.check_external_names()
    }

    fn check_buffer_ref(&self, buffer: BufferRef) -> CompileResult<()> {
        let in_range = match buffer {
            BufferRef::Local(id) => self.buffers.get(id).is_some(),
            BufferRef::External(id) => self.external_buffers.get(id).is_some(),
        };
        if in_range {
            Ok(())
        } else {
            Err(CompileError::invalid_ref(format!("dangling buffer reference {:?}", buffer)))
        }
    }

    /// Each external buffer becomes a set of C globals named after it
    fn check_external_names(&self) -> CompileResult<()> {
        let mut seen = HashSet::new();
        for id in self.external_buffers.ids() {
            let name = self.external_name(id)?;
            if !seen.insert(name.clone()) {
                return Err(CompileError::invalid_ref(format!(
                    "external buffer {} is named `{}`, which is already taken",
                    id, name
                )));
            }
        }
        Ok(())
    }
}
