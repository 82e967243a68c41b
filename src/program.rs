//! Generated program description
//!
//! The generators never print text directly. They build [`Stmt`] and
//! [`DriverCall`] values, which the `Display` implementations here render to
//! C source against the libxaie driver API. The same structure serializes to
//! JSON for tooling.

use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use crate::netlist::{ChannelDir, Port};

/// Device instance argument passed to every driver call
pub const DEVICE_INST: &str = "&(ctx->DevInst)";

/// Parameter list of every generated entry point
pub const CTX_PARAM: &str = "aie_libxaie_ctx_t* ctx";

/// Emitted at the top of every generated file.
const FILE_HEADER: &str = r#"
// This file was generated by netlist2xaie.

#ifndef MLIR_AIE_QUIET
#define __mlir_aie_verbose(x) x
#else
#define __mlir_aie_verbose(x)
#endif

// Evaluate a driver call and return its status from the enclosing function
// if it is not XAIE_OK. Only usable in functions returning int.
#define __mlir_aie_try(x) do { \
  AieRC ret = (x); \
  if(ret != XAIE_OK) { \
    return x; \
  } \
} while(0)

static XAie_DmaDimDesc *__mlir_aie_alloc_dim_desc(size_t ndims) {
  XAie_DmaDimDesc *ret = NULL;
  ret = (XAie_DmaDimDesc *)calloc(sizeof(XAie_DmaDimDesc), ndims);
  if(NULL == ret) {
    __mlir_aie_verbose(fprintf(stderr, "Allocating DmaDimDesc failed.\n"));
  }
  return ret;
}

"#;

/// Tile location argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TileLoc {
    Fixed { col: u32, row: u32 },
    /// The `x`, `y` locals of the switchbox configuration function
    Symbolic,
}

impl TileLoc {
    pub fn new(col: u32, row: u32) -> Self {
        TileLoc::Fixed { col, row }
    }
}

impl Display for TileLoc {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TileLoc::Fixed { col, row } => write!(f, "XAie_TileLoc({},{})", col, row),
            TileLoc::Symbolic => write!(f, "XAie_TileLoc(x,y)"),
        }
    }
}

/// A buffer descriptor variable, named after its tile and BD number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BdRef {
    pub col: u32,
    pub row: u32,
    pub bd: u32,
}

impl BdRef {
    pub fn new(col: u32, row: u32, bd: u32) -> Self {
        Self { col, row, bd }
    }

    pub fn name(&self) -> String {
        format!("dma_tile{}{}_bd{}", self.col, self.row, self.bd)
    }

    pub fn tensor_name(&self) -> String {
        format!("dma_tile_{}_{}_bd_{}_tensor", self.col, self.row, self.bd)
    }

    pub fn loc(&self) -> TileLoc {
        TileLoc::new(self.col, self.row)
    }
}

impl Display for BdRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "&({})", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockInit {
    pub id: u32,
    pub value: i32,
}

impl Display for LockInit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "XAie_LockInit({},{})", self.id, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PacketInit {
    pub id: u32,
    pub packet_type: u32,
}

impl Display for PacketInit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "XAie_PacketInit({},{})", self.id, self.packet_type)
    }
}

/// Name of the generated getter returning a shim BD's host address
pub fn external_getter_name(col: u32, row: u32, bd: u32) -> String {
    format!("mlir_aie_external_get_addr_myBuffer_{}{}_{}", col, row, bd)
}

/// Start address of a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BdAddress {
    /// Tile-local address known at generation time
    Static(u64),
    /// Host address returned by the named getter at run time
    External(String),
}

impl Display for BdAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BdAddress::Static(addr) => write!(f, "0x{:X}", addr),
            BdAddress::External(getter) => write!(f, "{}()", getter),
        }
    }
}

/// One hardware (step, wrap) slot of a multi-dimensional BD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DimDesc {
    pub step: u32,
    pub wrap: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LockSide {
    Acquire,
    Release,
}

/// A libxaie driver call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DriverCall {
    DmaDescInit {
        desc: BdRef,
    },
    DmaSetLock {
        desc: BdRef,
        acquire: LockInit,
        release: LockInit,
    },
    DmaSetAddrLen {
        desc: BdRef,
        addr: BdAddress,
        len: u32,
        elem_bytes: u32,
    },
    DmaSetMultiDimAddr {
        desc: BdRef,
        addr: BdAddress,
        len: u32,
        elem_bytes: u32,
    },
    DmaSetAxi {
        desc: BdRef,
        smid: u8,
        burst_len: u8,
        qos: u8,
        cache: u8,
        secure: bool,
    },
    DmaSetNextBd {
        desc: BdRef,
        next_bd: u32,
        enable_next: bool,
    },
    DmaSetPkt {
        desc: BdRef,
        packet: PacketInit,
    },
    DmaEnableBd {
        desc: BdRef,
    },
    DmaWriteBd {
        desc: BdRef,
    },
    DmaChannelPushBdToQueue {
        loc: TileLoc,
        channel: u32,
        dir: ChannelDir,
        bd: u32,
    },
    DmaChannelEnable {
        loc: TileLoc,
        channel: u32,
        dir: ChannelDir,
    },
    StrmConnCctEnable {
        loc: TileLoc,
        source: Port,
        dest: Port,
    },
    StrmPktSwMstrPortEnable {
        loc: TileLoc,
        dest: Port,
        drop_header: bool,
        arbiter: i32,
        msel_mask: u32,
    },
    StrmPktSwSlavePortEnable {
        loc: TileLoc,
        source: Port,
    },
    StrmPktSwSlaveSlotEnable {
        loc: TileLoc,
        source: Port,
        slot: u32,
        packet: PacketInit,
        mask: u32,
        msel: u32,
        arbiter: u32,
    },
    EnableAieToShimDmaStrmPort {
        loc: TileLoc,
        port: u32,
    },
    EnableShimDmaToAieStrmPort {
        loc: TileLoc,
        port: u32,
    },
    CoreReset {
        loc: TileLoc,
    },
    CoreUnreset {
        loc: TileLoc,
    },
    CoreEnable {
        loc: TileLoc,
    },
    CoreDisable {
        loc: TileLoc,
    },
    LockSetValue {
        loc: TileLoc,
        lock: LockInit,
    },
}

fn enable_flag(on: bool) -> &'static str {
    if on {
        "XAIE_ENABLE"
    } else {
        "XAIE_DISABLE"
    }
}

impl Display for DriverCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DriverCall::DmaDescInit { desc } => {
                write!(f, "XAie_DmaDescInit({}, {}, {})", DEVICE_INST, desc, desc.loc())
            }
            DriverCall::DmaSetLock { desc, acquire, release } => {
                write!(f, "XAie_DmaSetLock({}, {},{})", desc, acquire, release)
            }
            DriverCall::DmaSetAddrLen { desc, addr, len, elem_bytes } => write!(
                f,
                "XAie_DmaSetAddrLen({}, /* addrA */ {},  /* len */ {} * {})",
                desc, addr, len, elem_bytes
            ),
            DriverCall::DmaSetMultiDimAddr { desc, addr, len, elem_bytes } => write!(
                f,
                "XAie_DmaSetMultiDimAddr({}, &{}, {},  /* len */ {} * {})",
                desc,
                desc.tensor_name(),
                addr,
                len,
                elem_bytes
            ),
            DriverCall::DmaSetAxi { desc, smid, burst_len, qos, cache, secure } => write!(
                f,
                "XAie_DmaSetAxi({}, /* smid */ {}, /* burstlen */ {}, /* QoS */ {}, /* Cache */ {}, /* Secure */ {})",
                desc,
                smid,
                burst_len,
                qos,
                cache,
                enable_flag(*secure)
            ),
            DriverCall::DmaSetNextBd { desc, next_bd, enable_next } => write!(
                f,
                "XAie_DmaSetNextBd({},  /* nextbd */ {},  /* enableNextBd */ {})",
                desc,
                next_bd,
                u8::from(*enable_next)
            ),
            DriverCall::DmaSetPkt { desc, packet } => {
                write!(f, "XAie_DmaSetPkt({}, {})", desc, packet)
            }
            DriverCall::DmaEnableBd { desc } => write!(f, "XAie_DmaEnableBd({})", desc),
            DriverCall::DmaWriteBd { desc } => write!(
                f,
                "XAie_DmaWriteBd({}, {}, {},  /* bd */ {})",
                DEVICE_INST,
                desc,
                desc.loc(),
                desc.bd
            ),
            DriverCall::DmaChannelPushBdToQueue { loc, channel, dir, bd } => write!(
                f,
                "XAie_DmaChannelPushBdToQueue({}, {}, /* ChNum */{}, /* dmaDir */ DMA_{}, /* BdNum */{})",
                DEVICE_INST, loc, channel, dir, bd
            ),
            DriverCall::DmaChannelEnable { loc, channel, dir } => write!(
                f,
                "XAie_DmaChannelEnable({}, {}, /* ChNum */ {}, /* dmaDir */ DMA_{})",
                DEVICE_INST, loc, channel, dir
            ),
            DriverCall::StrmConnCctEnable { loc, source, dest } => write!(
                f,
                "XAie_StrmConnCctEnable({}, {}, {}, {}, {}, {})",
                DEVICE_INST,
                loc,
                source.bundle.xaie_name(),
                source.index,
                dest.bundle.xaie_name(),
                dest.index
            ),
            DriverCall::StrmPktSwMstrPortEnable { loc, dest, drop_header, arbiter, msel_mask } => write!(
                f,
                "XAie_StrmPktSwMstrPortEnable({}, {}, {}, {}, /* drop_header */ {}, /* arbiter */ {}, /* MSelEn */ 0x{:X})",
                DEVICE_INST,
                loc,
                dest.bundle.xaie_name(),
                dest.index,
                if *drop_header {
                    "XAIE_SS_PKT_DROP_HEADER"
                } else {
                    "XAIE_SS_PKT_DONOT_DROP_HEADER"
                },
                arbiter,
                msel_mask
            ),
            DriverCall::StrmPktSwSlavePortEnable { loc, source } => write!(
                f,
                "XAie_StrmPktSwSlavePortEnable({}, {}, {}, {})",
                DEVICE_INST,
                loc,
                source.bundle.xaie_name(),
                source.index
            ),
            DriverCall::StrmPktSwSlaveSlotEnable { loc, source, slot, packet, mask, msel, arbiter } => write!(
                f,
                "XAie_StrmPktSwSlaveSlotEnable({}, {}, {}, {}, /* slot */ {}, /* packet */ {}, /* mask */ 0x{:X}, /* msel */ {}, /* arbiter */ {})",
                DEVICE_INST,
                loc,
                source.bundle.xaie_name(),
                source.index,
                slot,
                packet,
                mask,
                msel,
                arbiter
            ),
            DriverCall::EnableAieToShimDmaStrmPort { loc, port } => {
                write!(f, "XAie_EnableAieToShimDmaStrmPort({}, {}, {})", DEVICE_INST, loc, port)
            }
            DriverCall::EnableShimDmaToAieStrmPort { loc, port } => {
                write!(f, "XAie_EnableShimDmaToAieStrmPort({}, {}, {})", DEVICE_INST, loc, port)
            }
            DriverCall::CoreReset { loc } => write!(f, "XAie_CoreReset({}, {})", DEVICE_INST, loc),
            DriverCall::CoreUnreset { loc } => write!(f, "XAie_CoreUnreset({}, {})", DEVICE_INST, loc),
            DriverCall::CoreEnable { loc } => write!(f, "XAie_CoreEnable({}, {})", DEVICE_INST, loc),
            DriverCall::CoreDisable { loc } => write!(f, "XAie_CoreDisable({}, {})", DEVICE_INST, loc),
            DriverCall::LockSetValue { loc, lock } => write!(
                f,
                "XAie_LockSetValue({}, {}, XAie_LockInit({}, {}))",
                DEVICE_INST, loc, lock.id, lock.value
            ),
        }
    }
}

/// A statement of a generated entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Stmt {
    /// Driver call whose failure returns from the entry point
    Try(DriverCall),
    DeclareDesc(BdRef),
    /// Turn off one side of a BD's lock binding
    DisableLock { desc: BdRef, side: LockSide },
    /// Allocate and fill a dimension descriptor array, in hardware slot order
    DeclareTensor { desc: BdRef, dims: Vec<DimDesc> },
    DeclareCoords,
    SetCoords { col: u32, row: u32 },
    Loop {
        var: String,
        start: String,
        end: String,
        stride: i32,
        body: Vec<Stmt>,
    },
    /// Release every lock of a tile
    LockSweep { loc: TileLoc, count: u32 },
    LoadElf { col: u32, row: u32, file: String },
    Comment(String),
}

impl Stmt {
    /// Collect the driver calls of this statement, descending into loops
    pub fn collect_calls<'a>(&'a self, out: &mut Vec<&'a DriverCall>) {
        match self {
            Stmt::Try(call) => out.push(call),
            Stmt::Loop { body, .. } => {
                for stmt in body {
                    stmt.collect_calls(out);
                }
            }
            _ => {}
        }
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Try(call) => writeln!(f, "__mlir_aie_try({});", call),
            Stmt::DeclareDesc(desc) => writeln!(f, "XAie_DmaDesc {};", desc.name()),
            Stmt::DisableLock { desc, side } => {
                let field = match side {
                    LockSide::Acquire => "LockAcqEn",
                    LockSide::Release => "LockRelEn",
                };
                writeln!(f, "{}.LockDesc.{} = XAIE_DISABLE;", desc.name(), field)
            }
            Stmt::DeclareTensor { desc, dims } => {
                let tensor = desc.tensor_name();
                writeln!(f, "XAie_DmaTensor {} = {{}};", tensor)?;
                writeln!(f, "{}.NumDim = {};", tensor, dims.len())?;
                writeln!(f, "{}.Dim =__mlir_aie_alloc_dim_desc({});", tensor, dims.len())?;
                writeln!(f, "if(NULL == {}.Dim){{", tensor)?;
                writeln!(f, "  return 1;")?;
                writeln!(f, "}}")?;
                for (slot, dim) in dims.iter().enumerate() {
                    writeln!(
                        f,
                        "{}.Dim[{}].AieMlDimDesc = {{ /* StepSize */ {}, /* Wrap */ {}}};",
                        tensor, slot, dim.step, dim.wrap
                    )?;
                }
                Ok(())
            }
            Stmt::DeclareCoords => writeln!(f, "  int x, y;"),
            Stmt::SetCoords { col, row } => {
                writeln!(f, "x = {};", col)?;
                writeln!(f, "y = {};", row)
            }
            Stmt::Loop { var, start, end, stride, body } => {
                writeln!(f, "for ({v} = {}; {v} < {}; {v} += {}) {{", start, end, stride, v = var)?;
                for stmt in body {
                    write!(f, "{}", stmt)?;
                }
                writeln!(f, "}}")
            }
            Stmt::LockSweep { loc, count } => {
                writeln!(f, "for (int l = 0; l < {}; ++l)", count)?;
                writeln!(
                    f,
                    "  __mlir_aie_try(XAie_LockRelease({}, {}, XAie_LockInit(l, 0x0), 0));",
                    DEVICE_INST, loc
                )
            }
            Stmt::LoadElf { col, row, file } => {
                writeln!(f, "{{")?;
                writeln!(
                    f,
                    "AieRC RC = XAie_LoadElf({}, {}, (const char*)\"{}\",0);",
                    DEVICE_INST,
                    TileLoc::new(*col, *row),
                    file
                )?;
                writeln!(f, "if (RC != XAIE_OK)")?;
                writeln!(
                    f,
                    "    __mlir_aie_verbose(fprintf(stderr, \"Failed to load elf for Core[%d,%d], ret is %d\\n\", {}, {}, RC));",
                    col, row
                )?;
                writeln!(f, "assert(RC == XAIE_OK);")?;
                writeln!(f, "}}")
            }
            Stmt::Comment(text) => writeln!(f, "// {}", text),
        }
    }
}

/// A generated `int name(ctx)` entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Function {
    pub name: String,
    pub body: Vec<Stmt>,
}

impl Function {
    pub fn new(name: impl Into<String>, body: Vec<Stmt>) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    pub fn calls(&self) -> Vec<&DriverCall> {
        let mut calls = Vec::new();
        for stmt in &self.body {
            stmt.collect_calls(&mut calls);
        }
        calls
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "int {}({}) {{", self.name, CTX_PARAM)?;
        for stmt in &self.body {
            write!(f, "{}", stmt)?;
        }
        writeln!(f, "return XAIE_OK;")?;
        writeln!(f, "}} // {}", self.name)?;
        writeln!(f)
    }
}

/// Contents of `mlir_aie_init_libxaie`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextInit {
    pub device_gen: String,
    pub base_addr: u64,
    pub col_shift: u32,
    pub row_shift: u32,
    pub rows: u32,
    pub columns: u32,
    pub mem_tile_rows: u32,
    pub core_row_start: u32,
    pub core_rows: u32,
}

impl Display for ContextInit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let cfg = "  ctx->AieConfigPtr";
        writeln!(f, "aie_libxaie_ctx_t* mlir_aie_init_libxaie() {{")?;
        writeln!(f, "  aie_libxaie_ctx_t *ctx = new aie_libxaie_ctx_t;")?;
        writeln!(f, "  if (!ctx)")?;
        writeln!(f, "    return 0;")?;
        writeln!(f, "{}.AieGen = {};", cfg, self.device_gen)?;
        writeln!(f, "{}.BaseAddr = 0x{:X};", cfg, self.base_addr)?;
        writeln!(f, "{}.ColShift = {};", cfg, self.col_shift)?;
        writeln!(f, "{}.RowShift = {};", cfg, self.row_shift)?;
        writeln!(f, "{}.NumRows = {};", cfg, self.rows)?;
        writeln!(f, "{}.NumCols = {};", cfg, self.columns)?;
        writeln!(f, "{}.ShimRowNum = 0;", cfg)?;
        writeln!(f, "{}.MemTileRowStart = 1;", cfg)?;
        writeln!(f, "{}.MemTileNumRows = {};", cfg, self.mem_tile_rows)?;
        writeln!(f, "{}.AieTileRowStart = {};", cfg, self.core_row_start)?;
        writeln!(f, "{}.AieTileNumRows = {};", cfg, self.core_rows)?;
        writeln!(f, "{}.PartProp = {{0}};", cfg)?;
        writeln!(f, "  ctx->DevInst = {{0}};")?;
        writeln!(f, "  return ctx;")?;
        writeln!(f, "}}")?;
        writeln!(f)
    }
}

/// Device address slot and setter for a named external buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalBinding {
    pub name: String,
}

impl Display for ExternalBinding {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = &self.name;
        writeln!(f, "static u64 _mlir_aie_external_{};", name)?;
        writeln!(f, "static bool _mlir_aie_external_set_{} = false;", name)?;
        writeln!(f, "void mlir_aie_external_set_addr_{}({}, u64 VA) {{", name, CTX_PARAM)?;
        writeln!(f, "  u64 device_address = mlir_aie_get_device_address(ctx, (void *)VA);")?;
        writeln!(f, "    _mlir_aie_external_set_{} = true;", name)?;
        writeln!(f, "    _mlir_aie_external_{} = device_address;", name)?;
        writeln!(f, "}}")
    }
}

/// Host address getter used by one shim BD
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalAddrGetter {
    pub col: u32,
    pub row: u32,
    pub bd: u32,
    pub buffer: String,
    pub byte_offset: u64,
}

impl Display for ExternalAddrGetter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "u64 {}(void) {{", external_getter_name(self.col, self.row, self.bd))?;
        writeln!(f, "    assert(_mlir_aie_external_set_{});", self.buffer)?;
        writeln!(
            f,
            "    return _mlir_aie_external_{} + 0x{:X};",
            self.buffer, self.byte_offset
        )?;
        writeln!(f, "}}")
    }
}

/// Configuration of one shim DMA engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShimDmaConfig {
    pub getters: Vec<ExternalAddrGetter>,
    pub function: Function,
}

/// Word type of a buffer accessor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WordType {
    Int32,
    Float,
}

impl WordType {
    fn c_type(self) -> &'static str {
        match self {
            WordType::Int32 => "int32_t",
            WordType::Float => "float",
        }
    }
}

/// Host-side helper functions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Accessor {
    Buffer {
        name: String,
        col: u32,
        row: u32,
        offset: u64,
        word: WordType,
    },
    /// Buffer whose element type has no accessor; rendered as a comment
    Unsupported { name: String, ty: String },
    Lock {
        name: String,
        col: u32,
        row: u32,
        id: u32,
    },
}

impl Display for Accessor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Buffer { name, col, row, offset, word } => {
                let loc = TileLoc::new(*col, *row);
                let ty = word.c_type();
                writeln!(f, "const int {}_offset = {};", name, offset)?;
                writeln!(f, "{} mlir_aie_read_buffer_{}({}, int index) {{", ty, name, CTX_PARAM)?;
                writeln!(
                    f,
                    "u32 value; auto rc = XAie_DataMemRdWord({}, {}, {}_offset + (index*4), &value);",
                    DEVICE_INST, loc, name
                )?;
                match word {
                    WordType::Int32 => writeln!(f, "  return value;")?,
                    WordType::Float => {
                        writeln!(f, "  union caster {{ int32_t i; float f; }};")?;
                        writeln!(f, "  caster c; c.i = value;")?;
                        writeln!(f, "  return c.f;")?;
                    }
                }
                writeln!(f, "}}")?;
                writeln!(
                    f,
                    "int mlir_aie_write_buffer_{}({}, int index, {} value) {{",
                    name, CTX_PARAM, ty
                )?;
                match word {
                    WordType::Int32 => writeln!(f, "  int32_t int_value = value;")?,
                    WordType::Float => {
                        writeln!(f, "  union caster {{ int32_t i; float f; }};")?;
                        writeln!(f, "  caster c; c.f = value;")?;
                        writeln!(f, "  int32_t int_value = c.i;")?;
                    }
                }
                writeln!(
                    f,
                    "AieRC rc =    XAie_DataMemWrWord({}, {}, {}_offset + (index*4), int_value);",
                    DEVICE_INST, loc, name
                )?;
                writeln!(f, "return rc;")?;
                writeln!(f, "}}")
            }
            Accessor::Unsupported { name, ty } => {
                writeln!(f, "// buffer {} with unsupported type {};", name, ty)
            }
            Accessor::Lock { name, col, row, id } => {
                let loc = TileLoc::new(*col, *row);
                for (verb, call) in [("acquire", "XAie_LockAcquire"), ("release", "XAie_LockRelease")] {
                    writeln!(
                        f,
                        "int mlir_aie_{}_{}({}, int value, int timeout) {{",
                        verb, name, CTX_PARAM
                    )?;
                    writeln!(f, "  const int id = {};", id)?;
                    writeln!(
                        f,
                        "  return {}({}, {}, XAie_LockInit(id,value), timeout);",
                        call, DEVICE_INST, loc
                    )?;
                    writeln!(f, "}}")?;
                }
                Ok(())
            }
        }
    }
}

/// A complete generated bring-up program
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XaieProgram {
    pub context: ContextInit,
    pub configure_cores: Function,
    pub start_cores: Function,
    pub configure_dmas: Function,
    pub external_buffers: Vec<ExternalBinding>,
    pub shim_dmas: Vec<ShimDmaConfig>,
    pub initialize_locks: Function,
    pub configure_switchboxes: Function,
    pub accessors: Vec<Accessor>,
}

impl XaieProgram {
    /// Entry points in emission order
    pub fn functions(&self) -> Vec<&Function> {
        let mut functions = vec![&self.configure_cores, &self.start_cores, &self.configure_dmas];
        functions.extend(self.shim_dmas.iter().map(|shim| &shim.function));
        functions.push(&self.initialize_locks);
        functions.push(&self.configure_switchboxes);
        functions
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions().into_iter().find(|func| func.name == name)
    }

    /// Total number of driver calls across all entry points
    pub fn call_count(&self) -> usize {
        self.functions().iter().map(|func| func.calls().len()).sum()
    }

    /// Export to JSON format
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Display for XaieProgram {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", FILE_HEADER)?;
        write!(f, "{}", self.context)?;
        write!(f, "{}", self.configure_cores)?;
        write!(f, "{}", self.start_cores)?;
        write!(f, "{}", self.configure_dmas)?;
        for binding in &self.external_buffers {
            write!(f, "{}", binding)?;
        }
        for shim in &self.shim_dmas {
            for getter in &shim.getters {
                write!(f, "{}", getter)?;
            }
            write!(f, "{}", shim.function)?;
        }
        write!(f, "{}", self.initialize_locks)?;
        write!(f, "{}", self.configure_switchboxes)?;
        for accessor in &self.accessors {
            write!(f, "{}", accessor)?;
        }
        Ok(())
    }
}
