//! Host-side accessors for named buffers and locks

use crate::analysis::NetlistAnalysis;
use crate::error::CompileResult;
use crate::netlist::{Buffer, ElementType, TileId};
use crate::program::{Accessor, WordType};

pub struct AccessorGenerator<'a> {
    analysis: &'a NetlistAnalysis<'a>,
}

impl<'a> AccessorGenerator<'a> {
    pub fn new(analysis: &'a NetlistAnalysis<'a>) -> Self {
        Self { analysis }
    }

    /// Buffer accessors tile by tile, then lock accessors
    pub fn generate(&self) -> CompileResult<Vec<Accessor>> {
        let device = self.analysis.device();
        let mut accessors = Vec::new();

        for tile in device.tiles.ids() {
            for &buffer in self.analysis.buffers_of(tile) {
                if let Some(accessor) = self.buffer_accessor(tile, device.buffer(buffer)?)? {
                    accessors.push(accessor);
                }
            }
        }

        for lock in device.locks.values() {
            let Some(name) = &lock.name else {
                continue;
            };
            let (col, row) = self.analysis.coord(lock.tile)?;
            accessors.push(Accessor::Lock {
                name: name.clone(),
                col,
                row,
                id: lock.id,
            });
        }

        Ok(accessors)
    }

    fn buffer_accessor(&self, tile: TileId, buffer: &Buffer) -> CompileResult<Option<Accessor>> {
        let Some(name) = buffer.name.as_ref() else {
            return Ok(None);
        };
        let word = match buffer.element_type {
            ElementType::I32 => WordType::Int32,
            ElementType::F32 => WordType::Float,
            other => {
                log::debug!("no accessor for buffer {}: element type {} is not a 32-bit word", name, other);
                return Ok(Some(Accessor::Unsupported {
                    name: name.clone(),
                    ty: format!("memref<{}x{}>", buffer.count, other),
                }));
            }
        };
        let (col, row) = self.analysis.coord(tile)?;
        Ok(Some(Accessor::Buffer {
            name: name.clone(),
            col,
            row,
            offset: buffer.address,
            word,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::Device;
    use crate::target::TargetModel;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_accessors() {
        let mut device = Device::new(TargetModel::aie1(50, 9));
        let t13 = device.add_tile(1, 3);
        let t23 = device.add_tile(2, 3);
        device.add_buffer(t23, Some("b"), 0x2000, ElementType::F32, 8);
        device.add_buffer(t13, Some("a"), 0x1000, ElementType::I32, 16);
        device.add_buffer(t13, None, 0x1400, ElementType::I32, 16);
        device.add_buffer(t13, Some("c"), 0x1800, ElementType::I16, 32);
        device.add_lock(t13, 4, Some(1), Some("lk"));
        device.add_lock(t13, 5, None, None);

        let analysis = NetlistAnalysis::new(&device).unwrap();
        let accessors = AccessorGenerator::new(&analysis).generate().unwrap();
        assert_eq!(
            accessors,
            vec![
                Accessor::Buffer {
                    name: "a".to_string(),
                    col: 1,
                    row: 3,
                    offset: 0x1000,
                    word: WordType::Int32,
                },
                Accessor::Unsupported {
                    name: "c".to_string(),
                    ty: "memref<32xi16>".to_string(),
                },
                Accessor::Buffer {
                    name: "b".to_string(),
                    col: 2,
                    row: 3,
                    offset: 0x2000,
                    word: WordType::Float,
                },
                Accessor::Lock {
                    name: "lk".to_string(),
                    col: 1,
                    row: 3,
                    id: 4,
                },
            ]
        );
    }

    #[test]
    fn test_rendered_accessors() {
        let mut device = Device::new(TargetModel::aie1(50, 9));
        let tile = device.add_tile(1, 3);
        device.add_buffer(tile, Some("f"), 4096, ElementType::F32, 8);
        device.add_buffer(tile, Some("h"), 0, ElementType::Bf16, 8);
        device.add_lock(tile, 7, None, Some("done"));

        let analysis = NetlistAnalysis::new(&device).unwrap();
        let text: String = AccessorGenerator::new(&analysis)
            .generate()
            .unwrap()
            .iter()
            .map(|a| a.to_string())
            .collect();
        assert!(text.contains("const int f_offset = 4096;"));
        assert!(text.contains("float mlir_aie_read_buffer_f(aie_libxaie_ctx_t* ctx, int index) {"));
        assert!(text.contains("XAie_DataMemRdWord(&(ctx->DevInst), XAie_TileLoc(1,3), f_offset + (index*4), &value);"));
        assert!(text.contains("caster c; c.i = value;"));
        assert!(text.contains("// buffer h with unsupported type memref<8xbf16>;"));
        assert!(text.contains("int mlir_aie_acquire_done(aie_libxaie_ctx_t* ctx, int value, int timeout) {\n  const int id = 7;"));
        assert!(text.contains("return XAie_LockRelease(&(ctx->DevInst), XAie_TileLoc(1,3), XAie_LockInit(id,value), timeout);"));
    }
}
