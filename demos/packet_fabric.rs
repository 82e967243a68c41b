//! Example: Packet-Switched Fan-Out
//!
//! One DMA stream carries packets for four cores. The source switch merges
//! the packets onto one master port; each destination switch picks its
//! packet id with a rule slot. The destination switches are described once
//! for a whole herd and expanded by a loop in the generated code.
//!
//! Run with: cargo run --example packet_fabric

use netlist_to_xaie::netlist::{
    AmSel, Block, BlockId, BufferRef, ChannelDir, DmaEngine, ElementType, IterRange, MasterSet,
    PacketRule, PacketRules, ParamRange, Port, Switchbox, SwitchboxSite, WireBundle,
};
use netlist_to_xaie::switchbox::master_mask;
use netlist_to_xaie::target::DmaKind;
use netlist_to_xaie::{compile_module, CodegenConfig, Device, Module, TargetModel};
use unnamed_entity::EntityId;

fn main() {
    println!("=== Packet-Switched Fan-Out Example ===\n");

    let mut device = Device::new(TargetModel::aie1(50, 9));
    let source = device.add_tile(7, 2);
    let buf = device.add_buffer(source, Some("weights"), 0x1000, ElementType::I32, 1024);

    // Four BDs, each tagged with the packet id of its destination
    let mut engine = DmaEngine::new(DmaKind::Mem, source);
    for id in 0..4u32 {
        let next = ((id + 1) % 4) as usize;
        engine.push_block(
            Block::bd(BufferRef::Local(buf), id * 256, 256)
                .with_packet(id, 0)
                .then(BlockId::from_idx(next)),
        );
    }
    engine.start(0, ChannelDir::MM2S, BlockId::from_idx(0));
    device.add_dma(engine);

    // Source switch: DMA 0 fans into North 0 through arbiter 0
    let amsels: Vec<AmSel> = (0..4).map(|msel| AmSel { arbiter: 0, msel }).collect();
    let (mask, arbiter) = master_mask(&amsels);
    println!("North 0 master: arbiter {}, MSelEn 0x{:X}\n", arbiter, mask);

    let mut sb = Switchbox::new(SwitchboxSite::Tile(source));
    sb.master_sets.push(MasterSet {
        dest: Port::new(WireBundle::North, 0),
        amsels: amsels.clone(),
    });
    sb.packet_rules.push(PacketRules {
        source: Port::new(WireBundle::Dma, 0),
        rules: amsels
            .iter()
            .map(|amsel| PacketRule {
                mask: 0x1F,
                value: amsel.msel,
                amsel: *amsel,
            })
            .collect(),
    });
    device.add_switchbox(sb);

    // Herd-relative destinations: every tile of herd "h" accepts packets
    // from the south and delivers them to its DMA
    let mut sb = Switchbox::new(SwitchboxSite::Range(ParamRange {
        herd: "h".to_string(),
        x: IterRange { start: 0, end: 2, stride: 1 },
        y: IterRange { start: 0, end: 2, stride: 1 },
    }));
    sb.master_sets.push(MasterSet {
        dest: Port::new(WireBundle::Dma, 0),
        amsels: vec![AmSel { arbiter: 1, msel: 0 }],
    });
    sb.packet_rules.push(PacketRules {
        source: Port::new(WireBundle::South, 0),
        rules: vec![PacketRule {
            mask: 0x1C,
            value: 0,
            amsel: AmSel { arbiter: 1, msel: 0 },
        }],
    });
    device.add_switchbox(sb);

    let program = match compile_module(&Module::new(device), &CodegenConfig::default()) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Compilation failed: {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", program.configure_dmas);
    println!("{}", program.configure_switchboxes);
}
