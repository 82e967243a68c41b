//! DMA program lowering
//!
//! Turns the blocks of one DMA engine into buffer descriptor setup calls,
//! followed by the channel queue pushes that start the engine.

use crate::analysis::NetlistAnalysis;
use crate::bd_alloc::{BdAssignment, BlockDescriptorAllocator};
use crate::config::CodegenConfig;
use crate::error::{CompileError, CompileResult};
use crate::netlist::*;
use crate::program::{
    external_getter_name, BdAddress, BdRef, DimDesc, DriverCall, ExternalAddrGetter, LockInit,
    LockSide, PacketInit, Stmt, TileLoc,
};
use crate::target::DmaKind;

/// Output for one engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Host address getters, only populated for NoC shim engines
    pub getters: Vec<ExternalAddrGetter>,
    pub body: Vec<Stmt>,
}

pub struct DmaConfigGenerator<'a> {
    analysis: &'a NetlistAnalysis<'a>,
    config: &'a CodegenConfig,
}

impl<'a> DmaConfigGenerator<'a> {
    pub fn new(analysis: &'a NetlistAnalysis<'a>, config: &'a CodegenConfig) -> Self {
        Self { analysis, config }
    }

    /// Number the engine's BDs, then lower it
    pub fn generate(&self, dma: DmaId) -> CompileResult<EngineConfig> {
        let device = self.analysis.device();
        let label = device.engine_label(dma)?;
        let ids = BlockDescriptorAllocator::new(&device.target).assign(device.dma(dma)?, &label)?;
        self.generate_engine(dma, &ids)
    }

    /// Lower one engine with already assigned BD numbers.
    ///
    /// Nothing is returned for an engine that fails; the error names it.
    pub fn generate_engine(&self, dma: DmaId, ids: &BdAssignment) -> CompileResult<EngineConfig> {
        let device = self.analysis.device();
        let engine = device.dma(dma)?;
        let label = device.engine_label(dma)?;
        let (col, row) = self.analysis.coord(engine.tile)?;

        if !device.target.supports_multi_dim() && engine.blocks.values().any(|b| !b.dims.is_empty()) {
            return Err(CompileError::MultiDimUnsupported { engine: label });
        }

        let mut out = EngineConfig::default();
        for (id, block) in &engine.blocks {
            if !block.has_bd() {
                continue;
            }
            let Some(bd) = ids.get(id) else {
                log::debug!("{}: block {} has no BD number, not emitted", label, id);
                continue;
            };
            self.emit_block(engine, &label, block, BdRef::new(col, row, bd), ids, &mut out)?;
        }

        let loc = TileLoc::new(col, row);
        for start in &engine.starts {
            let bd = ids.get(start.entry).ok_or_else(|| {
                CompileError::codegen(format!(
                    "{}: channel {} {} starts at block {}, which has no buffer descriptor",
                    label, start.direction, start.channel, start.entry
                ))
            })?;
            out.body.push(Stmt::Try(DriverCall::DmaChannelPushBdToQueue {
                loc,
                channel: start.channel,
                dir: start.direction,
                bd,
            }));
            out.body.push(Stmt::Try(DriverCall::DmaChannelEnable {
                loc,
                channel: start.channel,
                dir: start.direction,
            }));
        }

        Ok(out)
    }

    fn emit_block(
        &self,
        engine: &DmaEngine,
        label: &str,
        block: &Block,
        desc: BdRef,
        ids: &BdAssignment,
        out: &mut EngineConfig,
    ) -> CompileResult<()> {
        let device = self.analysis.device();
        let Some(payload) = block.a.or(block.b) else {
            return Ok(());
        };
        let elem_bytes = device.element_type(payload.buffer)?.byte_width();

        if let (Some(a), Some(b)) = (block.a, block.b) {
            if a.len != b.len {
                log::warn!(
                    "{}: BD {} A/B mode needs matching lengths ({} vs {}), using side A",
                    label,
                    desc.bd,
                    a.len,
                    b.len
                );
            }
            let b_bytes = device.element_type(b.buffer)?.byte_width();
            if elem_bytes != b_bytes {
                log::warn!(
                    "{}: BD {} A/B mode needs matching element widths ({} vs {} bytes), using side A",
                    label,
                    desc.bd,
                    elem_bytes,
                    b_bytes
                );
            }
        }

        out.body.push(Stmt::DeclareDesc(desc));
        out.body.push(Stmt::Try(DriverCall::DmaDescInit { desc }));
        self.emit_locks(engine, label, block, desc, &mut out.body)?;

        let addr = self.resolve_address(engine, label, &payload, elem_bytes, desc, &mut out.getters)?;
        if block.dims.is_empty() {
            out.body.push(Stmt::Try(DriverCall::DmaSetAddrLen {
                desc,
                addr,
                len: payload.len,
                elem_bytes,
            }));
        } else {
            // Outermost dimension is declared first but lives in the last slot
            let dims = block
                .dims
                .iter()
                .rev()
                .map(|d| DimDesc {
                    step: d.step,
                    wrap: d.wrap,
                })
                .collect();
            out.body.push(Stmt::DeclareTensor { desc, dims });
            out.body.push(Stmt::Try(DriverCall::DmaSetMultiDimAddr {
                desc,
                addr,
                len: payload.len,
                elem_bytes,
            }));
        }

        if self.via_noc(engine, desc) {
            let axi = &self.config.axi;
            out.body.push(Stmt::Try(DriverCall::DmaSetAxi {
                desc,
                smid: axi.smid,
                burst_len: axi.burst_len,
                qos: axi.qos,
                cache: axi.cache,
                secure: axi.secure,
            }));
        }

        if let Some(next) = block.next {
            let successor = engine
                .block(next)
                .ok_or_else(|| CompileError::invalid_ref(format!("{}: missing block {}", label, next)))?;
            let (next_bd, enable_next) = if successor.end {
                (0, false)
            } else {
                let id = ids.get(next).ok_or_else(|| {
                    CompileError::codegen(format!(
                        "{}: BD {} chains to block {}, which has no buffer descriptor",
                        label, desc.bd, next
                    ))
                })?;
                (id, true)
            };
            out.body.push(Stmt::Try(DriverCall::DmaSetNextBd {
                desc,
                next_bd,
                enable_next,
            }));
        }

        if let Some(tag) = block.packet {
            out.body.push(Stmt::Try(DriverCall::DmaSetPkt {
                desc,
                packet: PacketInit {
                    id: tag.id,
                    packet_type: tag.packet_type,
                },
            }));
        }

        out.body.push(Stmt::Try(DriverCall::DmaEnableBd { desc }));
        out.body.push(Stmt::Try(DriverCall::DmaWriteBd { desc }));
        Ok(())
    }

    fn emit_locks(
        &self,
        engine: &DmaEngine,
        label: &str,
        block: &Block,
        desc: BdRef,
        body: &mut Vec<Stmt>,
    ) -> CompileResult<()> {
        let mut acquire = None;
        let mut release = None;

        for use_lock in &block.locks {
            let id = self.lock_id(engine, label, use_lock.lock)?;
            match use_lock.action {
                LockActionKind::Acquire => {
                    acquire = Some(LockInit {
                        id,
                        value: use_lock.value,
                    })
                }
                LockActionKind::AcquireGreaterEqual => {
                    // The hardware encodes "at least N" as a negative value
                    let value = use_lock.value.checked_neg().ok_or_else(|| {
                        CompileError::codegen(format!(
                            "{}: BD {} acquires lock {} with value {}, which has no negation",
                            label, desc.bd, id, use_lock.value
                        ))
                    })?;
                    acquire = Some(LockInit { id, value })
                }
                LockActionKind::Release => {
                    release = Some(LockInit {
                        id,
                        value: use_lock.value,
                    })
                }
                LockActionKind::Unrecognized => {
                    return Err(CompileError::UnsupportedLockAction {
                        engine: label.to_string(),
                    })
                }
            }
        }

        if acquire.is_none() && release.is_none() {
            return Ok(());
        }
        let unused = LockInit { id: 0, value: 0 };
        body.push(Stmt::Try(DriverCall::DmaSetLock {
            desc,
            acquire: acquire.unwrap_or(unused),
            release: release.unwrap_or(unused),
        }));
        if acquire.is_none() {
            body.push(Stmt::DisableLock {
                desc,
                side: LockSide::Acquire,
            });
        }
        if release.is_none() {
            body.push(Stmt::DisableLock {
                desc,
                side: LockSide::Release,
            });
        }
        Ok(())
    }

    /// Hardware lock number as seen from the engine
    fn lock_id(&self, engine: &DmaEngine, label: &str, lock: LockId) -> CompileResult<u32> {
        let device = self.analysis.device();
        let lock = device.lock(lock)?;
        let (col, row) = self.analysis.coord(lock.tile)?;
        let factor = self.neighbor_factor(engine, label, col, row)? as u32;
        Ok(lock.id + device.target.num_locks(col, row) * factor)
    }

    /// Mem tile DMAs address west, own and east tile resources as one window
    fn neighbor_factor(&self, engine: &DmaEngine, label: &str, col: u32, row: u32) -> CompileResult<u64> {
        if engine.kind != DmaKind::MemTile {
            return Ok(0);
        }
        let (engine_col, engine_row) = self.analysis.coord(engine.tile)?;
        let factor = match self
            .analysis
            .device()
            .target
            .neighbor(engine_col, engine_row, col, row)
        {
            Some(neighbor) => neighbor.offset_factor(),
            None => {
                log::warn!(
                    "{}: tile ({}, {}) is not adjacent, no neighbor offset applied",
                    label,
                    col,
                    row
                );
                0
            }
        };
        Ok(factor)
    }

    /// Only shim DMAs on NoC columns reach host memory
    fn via_noc(&self, engine: &DmaEngine, desc: BdRef) -> bool {
        engine.kind == DmaKind::Shim && self.analysis.device().target.is_shim_noc_tile(desc.col, desc.row)
    }

    fn resolve_address(
        &self,
        engine: &DmaEngine,
        label: &str,
        payload: &BdPayload,
        elem_bytes: u32,
        desc: BdRef,
        getters: &mut Vec<ExternalAddrGetter>,
    ) -> CompileResult<BdAddress> {
        let device = self.analysis.device();
        let byte_offset = u64::from(payload.offset) * u64::from(elem_bytes);
        let via_noc = self.via_noc(engine, desc);

        match payload.buffer {
            BufferRef::External(id) if via_noc => {
                getters.push(ExternalAddrGetter {
                    col: desc.col,
                    row: desc.row,
                    bd: desc.bd,
                    buffer: device.external_name(id)?,
                    byte_offset,
                });
                Ok(BdAddress::External(external_getter_name(desc.col, desc.row, desc.bd)))
            }
            BufferRef::External(id) => Err(CompileError::codegen(format!(
                "{}: external buffer {} is only reachable through a NoC shim DMA",
                label,
                device.external_name(id)?
            ))),
            BufferRef::Local(_) if via_noc => Err(CompileError::codegen(format!(
                "{}: BD {} must target an external buffer",
                label, desc.bd
            ))),
            BufferRef::Local(id) => {
                let buffer = device.buffer(id)?;
                let (col, row) = self.analysis.coord(buffer.tile)?;
                let base = self.analysis.buffer_address(id).unwrap_or(buffer.address);
                let neighbor = self.neighbor_factor(engine, label, col, row)? * device.target.mem_tile_size();
                Ok(BdAddress::Static(base + byte_offset + neighbor))
            }
        }
    }
}
