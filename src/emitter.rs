//! Program emitter
//!
//! Drives the analysis and every generator over one device and assembles
//! their output into an [`XaieProgram`].

use crate::accessor::AccessorGenerator;
use crate::analysis::{NetlistAnalysis, TileChannel};
use crate::config::CodegenConfig;
use crate::dma::DmaConfigGenerator;
use crate::error::CompileResult;
use crate::netlist::{Module, TileId};
use crate::program::{
    ContextInit, DriverCall, ExternalBinding, Function, LockInit, ShimDmaConfig, Stmt, TileLoc,
    XaieProgram,
};
use crate::switchbox::SwitchConfigGenerator;
use crate::target::{DmaKind, TileKind};

/// Lowers a netlist module to a libxaie bring-up program
pub struct CodeGenerator {
    config: CodegenConfig,
}

impl CodeGenerator {
    pub fn new(config: CodegenConfig) -> Self {
        Self { config }
    }

    pub fn generate(&self, module: &Module) -> CompileResult<XaieProgram> {
        let analysis = NetlistAnalysis::from_module(module)?;
        let device = analysis.device();
        log::info!(
            "Lowering {:?} device: {} tiles, {} DMA engines, {} switchboxes",
            device.target.arch,
            device.tiles.len(),
            device.dmas.len(),
            device.switchboxes.len()
        );
        self.report_flows(&analysis)?;

        let program = XaieProgram {
            context: self.context(&analysis),
            configure_cores: Function::new("mlir_aie_configure_cores", self.configure_cores(&analysis)?),
            start_cores: Function::new("mlir_aie_start_cores", self.start_cores(&analysis)?),
            configure_dmas: Function::new("mlir_aie_configure_dmas", self.configure_dmas(&analysis)?),
            external_buffers: device
                .external_buffers
                .ids()
                .map(|id| Ok(ExternalBinding { name: device.external_name(id)? }))
                .collect::<CompileResult<_>>()?,
            shim_dmas: self.shim_dmas(&analysis)?,
            initialize_locks: Function::new("mlir_aie_initialize_locks", self.initialize_locks(&analysis)?),
            configure_switchboxes: Function::new(
                "mlir_aie_configure_switchboxes",
                SwitchConfigGenerator::new(&analysis).generate()?,
            ),
            accessors: AccessorGenerator::new(&analysis).generate()?,
        };

        log::info!("Generated {} driver calls", program.call_count());
        Ok(program)
    }

    /// Trace every DMA to DMA route; warn about ends no channel is started on
    fn report_flows(&self, analysis: &NetlistAnalysis) -> CompileResult<()> {
        let describe = |end: TileChannel| -> CompileResult<String> {
            let (col, row) = analysis.coord(end.tile)?;
            Ok(format!("({}, {}) {} {}", col, row, end.direction, end.channel))
        };

        for flow in analysis.dma_flows() {
            let source = describe(flow.source)?;
            let dest = describe(flow.dest)?;
            log::debug!("DMA flow {} -> {}", source, dest);
            for (end, name) in [(flow.source, &source), (flow.dest, &dest)] {
                if analysis.channel_binding(end).is_none() {
                    log::warn!("{}: routed but never started", name);
                }
            }
        }
        Ok(())
    }

    fn context(&self, analysis: &NetlistAnalysis) -> ContextInit {
        let target = &analysis.device().target;
        ContextInit {
            device_gen: target.device_gen().to_string(),
            base_addr: self.config.base_addr,
            col_shift: target.col_shift(),
            row_shift: target.row_shift(),
            rows: target.rows,
            columns: target.columns,
            mem_tile_rows: target.mem_tile_rows,
            core_row_start: target.core_row_start(),
            core_rows: target.core_rows(),
        }
    }

    /// Compute tiles in declaration order
    fn core_tiles(analysis: &NetlistAnalysis) -> Vec<(TileId, u32, u32)> {
        let device = analysis.device();
        device
            .tiles
            .iter()
            .filter(|(_, tile)| device.target.tile_kind(tile.col, tile.row) == TileKind::Core)
            .map(|(id, tile)| (id, tile.col, tile.row))
            .collect()
    }

    fn configure_cores(&self, analysis: &NetlistAnalysis) -> CompileResult<Vec<Stmt>> {
        let device = analysis.device();
        let mut body = Vec::new();

        for (tile, col, row) in Self::core_tiles(analysis) {
            let loc = TileLoc::new(col, row);
            body.push(Stmt::Try(DriverCall::CoreReset { loc }));
            body.push(Stmt::Try(DriverCall::CoreDisable { loc }));
            body.push(Stmt::LockSweep {
                loc,
                count: device.target.num_locks(col, row),
            });
            if let Some(core) = analysis.core_of(tile) {
                let file = device
                    .core(core)?
                    .elf_file
                    .clone()
                    .unwrap_or_else(|| format!("core_{}_{}.elf", col, row));
                body.push(Stmt::LoadElf { col, row, file });
            }
        }
        Ok(body)
    }

    fn start_cores(&self, analysis: &NetlistAnalysis) -> CompileResult<Vec<Stmt>> {
        let mut body = Vec::new();
        for (_, col, row) in Self::core_tiles(analysis) {
            let loc = TileLoc::new(col, row);
            body.push(Stmt::Try(DriverCall::CoreUnreset { loc }));
            body.push(Stmt::Try(DriverCall::CoreEnable { loc }));
        }
        Ok(body)
    }

    /// Tile and mem tile engines share one entry point
    fn configure_dmas(&self, analysis: &NetlistAnalysis) -> CompileResult<Vec<Stmt>> {
        let device = analysis.device();
        let generator = DmaConfigGenerator::new(analysis, &self.config);
        let mut body = Vec::new();

        for (dma, engine) in &device.dmas {
            if engine.kind == DmaKind::Shim {
                continue;
            }
            let lowered = generator.generate(dma)?;
            log::debug!(
                "{}: {} buffers, {} locks",
                device.engine_label(dma)?,
                analysis.dma_buffers(dma).len(),
                analysis.dma_locks(dma).len()
            );
            body.push(Stmt::Comment(device.engine_label(dma)?));
            body.extend(lowered.body);
        }
        Ok(body)
    }

    fn shim_dmas(&self, analysis: &NetlistAnalysis) -> CompileResult<Vec<ShimDmaConfig>> {
        let device = analysis.device();
        let generator = DmaConfigGenerator::new(analysis, &self.config);
        let mut shims = Vec::new();

        for (dma, engine) in &device.dmas {
            if engine.kind != DmaKind::Shim {
                continue;
            }
            let (col, row) = analysis.coord(engine.tile)?;
            let lowered = generator.generate(dma)?;
            shims.push(ShimDmaConfig {
                getters: lowered.getters,
                function: Function::new(format!("mlir_aie_configure_shimdma_{}{}", col, row), lowered.body),
            });
        }
        Ok(shims)
    }

    fn initialize_locks(&self, analysis: &NetlistAnalysis) -> CompileResult<Vec<Stmt>> {
        let mut body = Vec::new();
        for lock in analysis.device().locks.values() {
            let Some(value) = lock.init else {
                continue;
            };
            let (col, row) = analysis.coord(lock.tile)?;
            body.push(Stmt::Try(DriverCall::LockSetValue {
                loc: TileLoc::new(col, row),
                lock: LockInit { id: lock.id, value },
            }));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileError;
    use crate::netlist::*;
    use crate::target::TargetModel;
    use pretty_assertions::assert_eq;

    fn generate(device: Device) -> CompileResult<XaieProgram> {
        CodeGenerator::new(CodegenConfig::default()).generate(&Module::new(device))
    }

    #[test]
    fn test_context() {
        let program = generate(Device::new(TargetModel::aie2(5, 6))).unwrap();
        assert_eq!(
            program.context,
            ContextInit {
                device_gen: "XAIE_DEV_GEN_AIEML".to_string(),
                base_addr: 0x20000000000,
                col_shift: 25,
                row_shift: 20,
                rows: 6,
                columns: 5,
                mem_tile_rows: 1,
                core_row_start: 2,
                core_rows: 4,
            }
        );
    }

    #[test]
    fn test_cores() {
        let mut device = Device::new(TargetModel::aie2(4, 6));
        device.add_tile(0, 0);
        device.add_tile(1, 1);
        let t12 = device.add_tile(1, 2);
        let t13 = device.add_tile(1, 3);
        device.add_tile(2, 2);
        device.add_core(t12, None);
        device.add_core(t13, Some("kernel.elf"));

        let program = generate(device).unwrap();
        let loc = TileLoc::new(1, 2);
        assert_eq!(
            &program.configure_cores.body[..4],
            &[
                Stmt::Try(DriverCall::CoreReset { loc }),
                Stmt::Try(DriverCall::CoreDisable { loc }),
                Stmt::LockSweep { loc, count: 16 },
                Stmt::LoadElf {
                    col: 1,
                    row: 2,
                    file: "core_1_2.elf".to_string()
                },
            ]
        );
        assert!(program.configure_cores.body.contains(&Stmt::LoadElf {
            col: 1,
            row: 3,
            file: "kernel.elf".to_string()
        }));
        // (2,2) has no core: reset and lock sweep, but no image
        assert_eq!(program.configure_cores.body.len(), 4 + 4 + 3);

        let started = program.start_cores.calls();
        assert_eq!(started.len(), 6);
        assert_eq!(started[0], &DriverCall::CoreUnreset { loc });
    }

    #[test]
    fn test_initialize_locks() {
        let mut device = Device::new(TargetModel::aie1(50, 9));
        let tile = device.add_tile(3, 4);
        device.add_lock(tile, 0, None, None);
        device.add_lock(tile, 1, Some(1), None);

        let program = generate(device).unwrap();
        assert_eq!(
            program.initialize_locks.body,
            vec![Stmt::Try(DriverCall::LockSetValue {
                loc: TileLoc::new(3, 4),
                lock: LockInit { id: 1, value: 1 },
            })]
        );
    }

    #[test]
    fn test_shim_dma_gets_own_function() {
        let mut device = Device::new(TargetModel::aie1(50, 9));
        let shim = device.add_tile(6, 0);
        let core = device.add_tile(6, 2);
        let ext = device.add_external_buffer(Some("in"), ElementType::I32, 256);
        let buf = device.add_buffer(core, Some("local"), 0x1000, ElementType::I32, 256);

        let mut engine = DmaEngine::new(DmaKind::Shim, shim);
        let entry = engine.push_block(Block::bd(BufferRef::External(ext), 0, 256));
        engine.start(0, ChannelDir::MM2S, entry);
        device.add_dma(engine);

        let mut engine = DmaEngine::new(DmaKind::Mem, core);
        let entry = engine.push_block(Block::bd(BufferRef::Local(buf), 0, 256));
        engine.start(0, ChannelDir::S2MM, entry);
        device.add_dma(engine);

        let program = generate(device).unwrap();
        assert_eq!(program.external_buffers, vec![ExternalBinding { name: "in".to_string() }]);
        assert_eq!(program.shim_dmas.len(), 1);
        assert_eq!(program.shim_dmas[0].function.name, "mlir_aie_configure_shimdma_60");
        assert_eq!(program.shim_dmas[0].getters.len(), 1);
        assert_eq!(program.configure_dmas.body[0], Stmt::Comment("mem(6, 2)".to_string()));

        let text = program.to_string();
        let dmas = text.find("} // mlir_aie_configure_dmas").unwrap();
        let getter = text.find("u64 mlir_aie_external_get_addr_myBuffer_60_0(void)").unwrap();
        let shim = text.find("int mlir_aie_configure_shimdma_60(aie_libxaie_ctx_t* ctx) {").unwrap();
        let locks = text.find("int mlir_aie_initialize_locks(").unwrap();
        assert!(dmas < getter && getter < shim && shim < locks);
    }

    #[test]
    fn test_engine_error_aborts_run() {
        let mut device = Device::new(TargetModel::aie1(50, 9));
        let tile = device.add_tile(1, 3);
        let buf = device.add_buffer(tile, None, 0, ElementType::I32, 64);
        let mut engine = DmaEngine::new(DmaKind::Mem, tile);
        engine.push_block(Block::bd(BufferRef::Local(buf), 0, 64).with_dims(&[(1, 8), (8, 8)]));
        device.add_dma(engine);

        assert!(matches!(
            generate(device),
            Err(CompileError::MultiDimUnsupported { .. })
        ));
    }

    #[test]
    fn test_missing_device() {
        let result = CodeGenerator::new(CodegenConfig::default()).generate(&Module::default());
        assert!(matches!(result, Err(CompileError::MissingDevice)));
    }
}
