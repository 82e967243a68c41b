//! Target device model
//!
//! Geometry and per-generation constants of the AI Engine array the netlist
//! is placed on. Everything here is a pure function of the device metadata.

use serde::{Deserialize, Serialize};

/// AI Engine architecture generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AieArch {
    /// First generation (Versal AI Core)
    Aie1,
    /// AIE-ML, with mem tiles and multi-dimensional BDs
    Aie2,
}

/// Classification of a tile by its row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileKind {
    Core,
    MemTile,
    Shim,
}

/// Relative position of a tile resource seen from a mem tile DMA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighbor {
    West,
    Internal,
    East,
}

impl Neighbor {
    /// Multiplier applied to the tile address space (or lock count) when a
    /// mem tile DMA refers to this neighbor.
    pub fn offset_factor(self) -> u64 {
        match self {
            Neighbor::West => 0,
            Neighbor::Internal => 1,
            Neighbor::East => 2,
        }
    }
}

/// Which flavour of DMA engine a program runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmaKind {
    /// Core tile memory module DMA
    Mem,
    /// Mem tile DMA
    MemTile,
    /// Shim (NoC interface) DMA
    Shim,
}

impl DmaKind {
    pub fn label(self) -> &'static str {
        match self {
            DmaKind::Mem => "mem",
            DmaKind::MemTile => "memtile_dma",
            DmaKind::Shim => "shim_dma",
        }
    }
}

/// Description of the target device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetModel {
    pub arch: AieArch,
    pub columns: u32,
    pub rows: u32,
    /// Number of mem tile rows directly above the shim row
    #[serde(default)]
    pub mem_tile_rows: u32,
    /// Shim columns with a NoC interface; all shim columns when absent
    #[serde(default)]
    pub shim_noc_columns: Option<Vec<u32>>,
}

/// Hardware BD split of a mem tile: odd channels start here.
pub const MEMTILE_ODD_BD_BASE: u32 = 24;

/// Master select lines of one stream switch arbiter
pub const NUM_MSELS: u32 = 4;

impl TargetModel {
    pub fn new(arch: AieArch, columns: u32, rows: u32, mem_tile_rows: u32) -> Self {
        Self {
            arch,
            columns,
            rows,
            mem_tile_rows,
            shim_noc_columns: None,
        }
    }

    /// VC1902-like first generation array
    pub fn aie1(columns: u32, rows: u32) -> Self {
        Self::new(AieArch::Aie1, columns, rows, 0)
    }

    /// AIE-ML array with a single mem tile row
    pub fn aie2(columns: u32, rows: u32) -> Self {
        Self::new(AieArch::Aie2, columns, rows, 1)
    }

    pub fn is_shim_tile(&self, _col: u32, row: u32) -> bool {
        row == 0
    }

    pub fn is_shim_noc_tile(&self, col: u32, row: u32) -> bool {
        self.is_shim_tile(col, row)
            && self
                .shim_noc_columns
                .as_ref()
                .map_or(true, |cols| cols.contains(&col))
    }

    pub fn is_mem_tile(&self, _col: u32, row: u32) -> bool {
        row >= 1 && row < 1 + self.mem_tile_rows
    }

    pub fn tile_kind(&self, col: u32, row: u32) -> TileKind {
        if self.is_shim_tile(col, row) {
            TileKind::Shim
        } else if self.is_mem_tile(col, row) {
            TileKind::MemTile
        } else {
            TileKind::Core
        }
    }

    /// Locks available in the tile at `(col, row)`
    pub fn num_locks(&self, col: u32, row: u32) -> u32 {
        match self.arch {
            AieArch::Aie1 => 16,
            AieArch::Aie2 if self.is_mem_tile(col, row) => 64,
            AieArch::Aie2 => 16,
        }
    }

    /// Size of one mem tile's data memory address space
    pub fn mem_tile_size(&self) -> u64 {
        0x80000
    }

    pub fn is_west(&self, col: u32, row: u32, src_col: u32, src_row: u32) -> bool {
        src_row == row && src_col + 1 == col
    }

    pub fn is_internal(&self, col: u32, row: u32, src_col: u32, src_row: u32) -> bool {
        src_row == row && src_col == col
    }

    pub fn is_east(&self, col: u32, row: u32, src_col: u32, src_row: u32) -> bool {
        src_row == row && src_col == col + 1
    }

    /// Where `(src_col, src_row)` sits relative to `(col, row)`, if adjacent
    pub fn neighbor(&self, col: u32, row: u32, src_col: u32, src_row: u32) -> Option<Neighbor> {
        if self.is_west(col, row, src_col, src_row) {
            Some(Neighbor::West)
        } else if self.is_internal(col, row, src_col, src_row) {
            Some(Neighbor::Internal)
        } else if self.is_east(col, row, src_col, src_row) {
            Some(Neighbor::East)
        } else {
            None
        }
    }

    /// Only AIE-ML BDs carry step/wrap dimension descriptors
    pub fn supports_multi_dim(&self) -> bool {
        self.arch == AieArch::Aie2
    }

    /// Size of the BD pool of one DMA engine
    pub fn num_bds(&self, kind: DmaKind) -> usize {
        match kind {
            DmaKind::Mem | DmaKind::Shim => 16,
            DmaKind::MemTile => 48,
        }
    }

    /// libxaie device generation constant
    pub fn device_gen(&self) -> &'static str {
        match self.arch {
            AieArch::Aie1 => "XAIE_DEV_GEN_AIE",
            AieArch::Aie2 => "XAIE_DEV_GEN_AIEML",
        }
    }

    /// Bit position of the column index in a tile address
    pub fn col_shift(&self) -> u32 {
        match self.arch {
            AieArch::Aie1 => 23,
            AieArch::Aie2 => 25,
        }
    }

    /// Bit position of the row index in a tile address
    pub fn row_shift(&self) -> u32 {
        match self.arch {
            AieArch::Aie1 => 18,
            AieArch::Aie2 => 20,
        }
    }

    /// First row of compute tiles
    pub fn core_row_start(&self) -> u32 {
        1 + self.mem_tile_rows
    }

    pub fn core_rows(&self) -> u32 {
        self.rows.saturating_sub(1 + self.mem_tile_rows)
    }
}
