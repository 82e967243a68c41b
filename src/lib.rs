//! AI Engine netlist to libxaie compiler
//!
//! This library lowers a placed and routed AI Engine device netlist into the
//! libxaie C calls that bring the array up: core reset and ELF loading, DMA
//! buffer descriptors, lock initialization, stream switch routing and
//! host-side buffer/lock accessors.
//!
//! # Example
//!
//! ```rust
//! use netlist_to_xaie::{compile, CodegenConfig};
//!
//! let netlist = r#"{
//!     "devices": [{
//!         "target": { "arch": "aie1", "columns": 50, "rows": 9 },
//!         "tiles": [{ "col": 1, "row": 3 }],
//!         "cores": [{ "tile": 0 }]
//!     }]
//! }"#;
//! let program = compile(netlist, &CodegenConfig::default()).unwrap();
//! assert!(program.to_string().contains("core_1_3.elf"));
//! ```

pub mod accessor;
pub mod analysis;
pub mod bd_alloc;
pub mod config;
pub mod dma;
pub mod emitter;
pub mod error;
pub mod netlist;
pub mod program;
pub mod switchbox;
pub mod target;

pub use accessor::AccessorGenerator;
pub use analysis::NetlistAnalysis;
pub use bd_alloc::{BdAssignment, BlockDescriptorAllocator};
pub use config::{AxiConfig, CodegenConfig};
pub use dma::DmaConfigGenerator;
pub use emitter::CodeGenerator;
pub use error::{CompileError, CompileResult};
pub use netlist::{Device, Module};
pub use program::XaieProgram;
pub use switchbox::SwitchConfigGenerator;
pub use target::{AieArch, TargetModel};

/// Main compilation function: parse a JSON netlist and lower it
pub fn compile(source: &str, config: &CodegenConfig) -> CompileResult<XaieProgram> {
    let module = Module::from_json(source)?;
    compile_module(&module, config)
}

/// Lower an already built netlist
pub fn compile_module(module: &Module, config: &CodegenConfig) -> CompileResult<XaieProgram> {
    CodeGenerator::new(config.clone()).generate(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIPELINE: &str = r#"{
        "devices": [{
            "target": { "arch": "aie2", "columns": 4, "rows": 6, "mem_tile_rows": 1 },
            "tiles": [
                { "col": 1, "row": 0 },
                { "col": 1, "row": 1 },
                { "col": 1, "row": 2 }
            ],
            "cores": [{ "tile": 2, "elf_file": "pass.elf" }],
            "locks": [
                { "tile": 1, "id": 0, "init": 1, "name": "mt_free" },
                { "tile": 1, "id": 1, "init": 0 }
            ],
            "buffers": [
                { "tile": 1, "name": "staging", "address": 0, "element_type": "i32", "count": 256 },
                { "tile": 2, "name": "result", "address": 1024, "element_type": "f32", "count": 64 }
            ],
            "external_buffers": [{ "name": "host_in", "element_type": "i32", "count": 256 }],
            "dmas": [
                {
                    "kind": "mem_tile", "tile": 1,
                    "blocks": [
                        { "a": { "buffer": { "local": 0 }, "len": 256 },
                          "dims": [{ "step": 16, "wrap": 16 }, { "step": 1, "wrap": 16 }],
                          "locks": [{ "lock": 0, "action": "acquire_greater_equal", "value": 1 },
                                    { "lock": 1, "action": "release", "value": 1 }],
                          "next": 0 },
                        { "a": { "buffer": { "local": 0 }, "len": 256 },
                          "locks": [{ "lock": 1, "action": "acquire_greater_equal", "value": 1 },
                                    { "lock": 0, "action": "release", "value": 1 }],
                          "next": 1 }
                    ],
                    "starts": [
                        { "channel": 0, "direction": "S2MM", "entry": 0 },
                        { "channel": 1, "direction": "MM2S", "entry": 1 }
                    ]
                },
                {
                    "kind": "shim", "tile": 0,
                    "blocks": [
                        { "a": { "buffer": { "external": 0 }, "len": 256 }, "next": 1 },
                        { "end": true }
                    ],
                    "starts": [{ "channel": 0, "direction": "MM2S", "entry": 0 }]
                }
            ],
            "switchboxes": [
                { "site": { "tile": 1 },
                  "connections": [{ "source": { "bundle": "south", "index": 0 },
                                    "dest": { "bundle": "dma", "index": 0 } }] }
            ],
            "shim_muxes": [
                { "tile": 0,
                  "connections": [{ "source": { "bundle": "dma", "index": 0 },
                                    "dest": { "bundle": "north", "index": 3 } }] }
            ]
        }]
    }"#;

    #[test]
    fn test_compile_pipeline() {
        let program = compile(PIPELINE, &CodegenConfig::default()).unwrap();
        let text = program.to_string();

        assert!(text.contains("ctx->AieConfigPtr.AieGen = XAIE_DEV_GEN_AIEML;"));
        assert!(text.contains("(const char*)\"pass.elf\""));
        // Odd channel chain numbered from 24
        assert!(text.contains("XAie_DmaWriteBd(&(ctx->DevInst), &(dma_tile11_bd0), XAie_TileLoc(1,1),  /* bd */ 0)"));
        assert!(text.contains("XAie_DmaWriteBd(&(ctx->DevInst), &(dma_tile11_bd24), XAie_TileLoc(1,1),  /* bd */ 24)"));
        // Own-tile resources of a mem tile sit one window up
        assert!(text.contains("XAie_DmaSetLock(&(dma_tile11_bd0), XAie_LockInit(64,-1),XAie_LockInit(65,1))"));
        assert!(text.contains("dma_tile_1_1_bd_0_tensor.Dim[1].AieMlDimDesc = { /* StepSize */ 16, /* Wrap */ 16};"));
        assert!(text.contains("XAie_DmaSetMultiDimAddr(&(dma_tile11_bd0), &dma_tile_1_1_bd_0_tensor, 0x80000,  /* len */ 256 * 4)"));
        assert!(text.contains("void mlir_aie_external_set_addr_host_in(aie_libxaie_ctx_t* ctx, u64 VA) {"));
        assert!(text.contains("int mlir_aie_configure_shimdma_10(aie_libxaie_ctx_t* ctx) {"));
        assert!(text.contains("XAie_EnableShimDmaToAieStrmPort(&(ctx->DevInst), XAie_TileLoc(x,y), 3)"));
        assert!(text.contains("XAie_LockSetValue(&(ctx->DevInst), XAie_TileLoc(1,1), XAie_LockInit(0, 1))"));
        assert!(text.contains("int mlir_aie_acquire_mt_free(aie_libxaie_ctx_t* ctx, int value, int timeout) {"));
        assert!(text.contains("float mlir_aie_read_buffer_result("));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_compile_json_output() {
        let program = compile(PIPELINE, &CodegenConfig::default()).unwrap();
        let json = program.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["configure_dmas"]["name"], "mlir_aie_configure_dmas");
        assert_eq!(value["shim_dmas"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_entry_point_lookup() {
        let program = compile(PIPELINE, &CodegenConfig::default()).unwrap();
        let shim = program.function("mlir_aie_configure_shimdma_10").unwrap();
        assert!(shim
            .calls()
            .iter()
            .any(|call| matches!(call, program::DriverCall::DmaChannelEnable { .. })));
        assert!(program.function("mlir_aie_configure_cores").is_some());
        assert!(program.function("mlir_aie_configure_shimdma_20").is_none());
    }

    #[test]
    fn test_compile_rejects_wide_master_select() {
        let source = PIPELINE.replace(
            r#""dest": { "bundle": "dma", "index": 0 } }] }"#,
            r#""dest": { "bundle": "dma", "index": 0 } }],
                  "master_sets": [{ "dest": { "bundle": "north", "index": 0 },
                                    "amsels": [{ "arbiter": 0, "msel": 32 }] }] }"#,
        );
        assert_ne!(source, PIPELINE);
        assert!(matches!(
            compile(&source, &CodegenConfig::default()),
            Err(CompileError::InvalidReference { .. })
        ));
    }

    #[test]
    fn test_compile_rejects_unencodable_acquire() {
        let source = PIPELINE.replacen(
            r#""action": "acquire_greater_equal", "value": 1"#,
            r#""action": "acquire_greater_equal", "value": -2147483648"#,
            1,
        );
        assert_ne!(source, PIPELINE);
        assert!(matches!(
            compile(&source, &CodegenConfig::default()),
            Err(CompileError::CodeGenError { .. })
        ));
    }

    #[test]
    fn test_compile_rejects_bad_input() {
        assert!(matches!(
            compile("{ \"devices\": [ 42 ] }", &CodegenConfig::default()),
            Err(CompileError::InputError { .. })
        ));
    }
}
