//! Example: Mem Tile Staging Pipeline
//!
//! Host data enters through a shim DMA, is staged in a mem tile with a
//! ping-pong pair of BDs, and is forwarded to a compute tile.
//!
//! Run with: cargo run --example memtile_pipeline

use netlist_to_xaie::netlist::{
    Block, BlockId, BufferRef, ChannelDir, Connect, DmaEngine, ElementType, LockActionKind, Port,
    ShimMux, Switchbox, SwitchboxSite, WireBundle,
};
use netlist_to_xaie::target::DmaKind;
use netlist_to_xaie::{compile_module, CodegenConfig, Device, Module, TargetModel};
use unnamed_entity::EntityId;

fn main() {
    println!("=== Mem Tile Staging Pipeline Example ===\n");

    let mut device = Device::new(TargetModel::aie2(4, 6));
    let shim = device.add_tile(2, 0);
    let mem_tile = device.add_tile(2, 1);
    let compute = device.add_tile(2, 2);
    device.add_core(compute, None);

    let host_in = device.add_external_buffer(Some("host_in"), ElementType::I32, 1024);
    let ping = device.add_buffer(mem_tile, Some("ping"), 0x0, ElementType::I32, 256);
    let pong = device.add_buffer(mem_tile, Some("pong"), 0x400, ElementType::I32, 256);
    let tile_in = device.add_buffer(compute, Some("tile_in"), 0x1000, ElementType::I32, 256);

    let ping_free = device.add_lock(mem_tile, 0, Some(1), Some("ping_free"));
    let ping_full = device.add_lock(mem_tile, 1, Some(0), Some("ping_full"));
    let pong_free = device.add_lock(mem_tile, 2, Some(1), None);
    let pong_full = device.add_lock(mem_tile, 3, Some(0), None);
    let in_free = device.add_lock(compute, 0, Some(1), Some("in_free"));
    let in_full = device.add_lock(compute, 1, Some(0), Some("in_full"));

    // Shim: stream 1024 words from host memory as four chunks
    let mut engine = DmaEngine::new(DmaKind::Shim, shim);
    for chunk in 0..4u32 {
        let next = if chunk == 3 { 4 } else { chunk as usize + 1 };
        engine.push_block(Block::bd(BufferRef::External(host_in), chunk * 256, 256).then(BlockId::from_idx(next)));
    }
    engine.push_block(Block::end());
    engine.start(0, ChannelDir::MM2S, BlockId::from_idx(0));
    device.add_dma(engine);

    // Mem tile: S2MM on channel 0 fills ping/pong, MM2S on channel 1 drains them
    let mut engine = DmaEngine::new(DmaKind::MemTile, mem_tile);
    let fill_ping = engine.push_block(
        Block::bd(BufferRef::Local(ping), 0, 256)
            .with_lock(ping_free, LockActionKind::AcquireGreaterEqual, 1)
            .with_lock(ping_full, LockActionKind::Release, 1)
            .then(BlockId::from_idx(1)),
    );
    engine.push_block(
        Block::bd(BufferRef::Local(pong), 0, 256)
            .with_lock(pong_free, LockActionKind::AcquireGreaterEqual, 1)
            .with_lock(pong_full, LockActionKind::Release, 1)
            .then(fill_ping),
    );
    let drain_ping = engine.push_block(
        Block::bd(BufferRef::Local(ping), 0, 256)
            .with_dims(&[(16, 16), (1, 16)])
            .with_lock(ping_full, LockActionKind::AcquireGreaterEqual, 1)
            .with_lock(ping_free, LockActionKind::Release, 1)
            .then(BlockId::from_idx(3)),
    );
    engine.push_block(
        Block::bd(BufferRef::Local(pong), 0, 256)
            .with_dims(&[(16, 16), (1, 16)])
            .with_lock(pong_full, LockActionKind::AcquireGreaterEqual, 1)
            .with_lock(pong_free, LockActionKind::Release, 1)
            .then(drain_ping),
    );
    engine.start(0, ChannelDir::S2MM, fill_ping);
    engine.start(1, ChannelDir::MM2S, drain_ping);
    device.add_dma(engine);

    // Compute tile: receive into tile_in forever
    let mut engine = DmaEngine::new(DmaKind::Mem, compute);
    let recv = engine.push_block(
        Block::bd(BufferRef::Local(tile_in), 0, 256)
            .with_lock(in_free, LockActionKind::AcquireGreaterEqual, 1)
            .with_lock(in_full, LockActionKind::Release, 1)
            .then(BlockId::from_idx(0)),
    );
    engine.start(0, ChannelDir::S2MM, recv);
    device.add_dma(engine);

    // Routing: shim DMA -> mem tile DMA 0, mem tile DMA 1 -> compute DMA 0
    device.shim_muxes.push(ShimMux {
        tile: shim,
        connections: vec![Connect::new(
            Port::new(WireBundle::Dma, 0),
            Port::new(WireBundle::North, 3),
        )],
    });
    let mut sb = Switchbox::new(SwitchboxSite::Tile(mem_tile));
    sb.connections.push(Connect::new(Port::new(WireBundle::South, 3), Port::new(WireBundle::Dma, 0)));
    sb.connections.push(Connect::new(Port::new(WireBundle::Dma, 1), Port::new(WireBundle::North, 0)));
    device.add_switchbox(sb);
    let mut sb = Switchbox::new(SwitchboxSite::Tile(compute));
    sb.connections.push(Connect::new(Port::new(WireBundle::South, 0), Port::new(WireBundle::Dma, 0)));
    device.add_switchbox(sb);

    let program = match compile_module(&Module::new(device), &CodegenConfig::default()) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Compilation failed: {}", e);
            std::process::exit(1);
        }
    };

    for function in program.functions() {
        println!("{:<40} {:>3} driver calls", function.name, function.calls().len());
    }
    println!("\n=== Generated Program ===\n");
    println!("{}", program);
}
