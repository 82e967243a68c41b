//! Stream switch lowering
//!
//! Circuit connections become direct port-to-port enables. Packet-switched
//! routes become master port enables plus slave slot rules. Switchboxes
//! placed on a herd range are wrapped in a loop over the range, with `x`/`y`
//! standing for the tile being configured.

use std::collections::HashSet;

use crate::analysis::NetlistAnalysis;
use crate::error::CompileResult;
use crate::netlist::*;
use crate::program::{DriverCall, PacketInit, Stmt, TileLoc};

/// OR of the master-select bits of `amsels`, and the arbiter they name.
///
/// The arbiter is -1 when there are no bindings. Master selects past the
/// width of the mask contribute no bit.
pub fn master_mask(amsels: &[AmSel]) -> (u32, i32) {
    let mut mask = 0u32;
    let mut arbiter = -1i32;
    for amsel in amsels {
        arbiter = amsel.arbiter as i32;
        mask |= 1u32.checked_shl(amsel.msel).unwrap_or(0);
    }
    (mask, arbiter)
}

pub struct SwitchConfigGenerator<'a> {
    analysis: &'a NetlistAnalysis<'a>,
}

impl<'a> SwitchConfigGenerator<'a> {
    pub fn new(analysis: &'a NetlistAnalysis<'a>) -> Self {
        Self { analysis }
    }

    /// Body of the switchbox configuration entry point
    pub fn generate(&self) -> CompileResult<Vec<Stmt>> {
        let device = self.analysis.device();
        let mut body = vec![Stmt::DeclareCoords];

        for switchbox in device.switchboxes.values() {
            body.extend(self.switchbox(switchbox)?);
        }
        for mux in &device.shim_muxes {
            body.extend(self.shim_mux(mux)?);
        }
        for switchbox in &device.shim_switchboxes {
            body.extend(self.shim_switchbox(switchbox));
        }
        Ok(body)
    }

    pub fn switchbox(&self, switchbox: &Switchbox) -> CompileResult<Vec<Stmt>> {
        if switchbox.is_empty() {
            return Ok(Vec::new());
        }

        let mut body = Vec::new();
        let loc = TileLoc::Symbolic;

        for connect in &switchbox.connections {
            body.push(Stmt::Try(DriverCall::StrmConnCctEnable {
                loc,
                source: connect.source,
                dest: connect.dest,
            }));
        }

        for set in &switchbox.master_sets {
            let (msel_mask, arbiter) = master_mask(&set.amsels);
            body.push(Stmt::Try(DriverCall::StrmPktSwMstrPortEnable {
                loc,
                dest: set.dest,
                drop_header: set.dest.bundle == WireBundle::Dma,
                arbiter,
                msel_mask,
            }));
        }

        let mut enabled: HashSet<Port> = HashSet::new();
        for group in &switchbox.packet_rules {
            if enabled.insert(group.source) {
                body.push(Stmt::Try(DriverCall::StrmPktSwSlavePortEnable {
                    loc,
                    source: group.source,
                }));
            }
            for (slot, rule) in group.rules.iter().enumerate() {
                body.push(Stmt::Try(DriverCall::StrmPktSwSlaveSlotEnable {
                    loc,
                    source: group.source,
                    slot: slot as u32,
                    packet: PacketInit {
                        id: rule.value,
                        packet_type: 0,
                    },
                    mask: rule.mask,
                    msel: rule.amsel.msel,
                    arbiter: rule.amsel.arbiter,
                }));
            }
        }

        let stmts = match &switchbox.site {
            SwitchboxSite::Tile(tile) => {
                let (col, row) = self.analysis.coord(*tile)?;
                let mut stmts = vec![
                    Stmt::Comment(format!("Core Stream Switch column {} row {}", col, row)),
                    Stmt::SetCoords { col, row },
                ];
                stmts.extend(body);
                stmts
            }
            SwitchboxSite::Range(range) => {
                let inner = Stmt::Loop {
                    var: "y".to_string(),
                    start: format!("{}_Y + {}", range.herd, range.y.start),
                    end: format!("{}_Y + {}", range.herd, range.y.end),
                    stride: range.y.stride,
                    body,
                };
                vec![Stmt::Loop {
                    var: "x".to_string(),
                    start: format!("{}_X + {}", range.herd, range.x.start),
                    end: format!("{}_X + {}", range.herd, range.x.end),
                    stride: range.x.stride,
                    body: vec![inner],
                }]
            }
        };
        Ok(stmts)
    }

    pub fn shim_mux(&self, mux: &ShimMux) -> CompileResult<Vec<Stmt>> {
        if mux.connections.is_empty() {
            return Ok(Vec::new());
        }
        let (col, row) = self.analysis.coord(mux.tile)?;
        let loc = TileLoc::Symbolic;
        let mut body = vec![
            Stmt::Comment(format!("ShimMux column {} row {}", col, row)),
            Stmt::Comment("ShimMux directions are relative to the tile stream switch".to_string()),
            Stmt::SetCoords { col, row },
        ];

        for connect in &mux.connections {
            if connect.source.bundle == WireBundle::North {
                body.push(Stmt::Try(DriverCall::EnableAieToShimDmaStrmPort {
                    loc,
                    port: connect.source.index,
                }));
            } else if connect.dest.bundle == WireBundle::North {
                body.push(Stmt::Try(DriverCall::EnableShimDmaToAieStrmPort {
                    loc,
                    port: connect.dest.index,
                }));
            } else {
                log::debug!(
                    "shim mux ({}, {}): connection {:?} -> {:?} does not cross the mux, skipped",
                    col,
                    row,
                    connect.source,
                    connect.dest
                );
            }
        }
        Ok(body)
    }

    pub fn shim_switchbox(&self, switchbox: &ShimSwitchbox) -> Vec<Stmt> {
        if switchbox.connections.is_empty() {
            return Vec::new();
        }
        let loc = TileLoc::new(switchbox.col, 0);
        let mut body = vec![Stmt::Comment(format!("Shim Switch column {}", switchbox.col))];
        for connect in &switchbox.connections {
            body.push(Stmt::Try(DriverCall::StrmConnCctEnable {
                loc,
                source: connect.source,
                dest: connect.dest,
            }));
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetModel;
    use pretty_assertions::assert_eq;

    fn amsel(arbiter: u32, msel: u32) -> AmSel {
        AmSel { arbiter, msel }
    }

    fn calls(body: &[Stmt]) -> Vec<&DriverCall> {
        let mut out = Vec::new();
        for stmt in body {
            stmt.collect_calls(&mut out);
        }
        out
    }

    #[test]
    fn test_master_mask() {
        assert_eq!(master_mask(&[]), (0, -1));
        assert_eq!(master_mask(&[amsel(1, 0), amsel(1, 3)]), (0b1001, 1));
        assert_eq!(
            master_mask(&[amsel(2, 1), amsel(2, 1)]),
            master_mask(&[amsel(2, 1)])
        );
        assert_eq!(master_mask(&[amsel(0, 32), amsel(0, 1)]), (0b10, 0));
    }

    #[test]
    fn test_circuit_switchbox() {
        let mut device = Device::new(TargetModel::aie1(50, 9));
        let tile = device.add_tile(2, 3);
        let mut sb = Switchbox::new(SwitchboxSite::Tile(tile));
        sb.connections.push(Connect::new(
            Port::new(WireBundle::South, 3),
            Port::new(WireBundle::Dma, 0),
        ));
        device.add_switchbox(sb);

        let analysis = NetlistAnalysis::new(&device).unwrap();
        let body = SwitchConfigGenerator::new(&analysis).generate().unwrap();
        assert_eq!(
            body,
            vec![
                Stmt::DeclareCoords,
                Stmt::Comment("Core Stream Switch column 2 row 3".to_string()),
                Stmt::SetCoords { col: 2, row: 3 },
                Stmt::Try(DriverCall::StrmConnCctEnable {
                    loc: TileLoc::Symbolic,
                    source: Port::new(WireBundle::South, 3),
                    dest: Port::new(WireBundle::Dma, 0),
                }),
            ]
        );
    }

    #[test]
    fn test_master_set_drop_header_only_for_dma() {
        let mut device = Device::new(TargetModel::aie1(50, 9));
        let tile = device.add_tile(2, 3);
        let mut sb = Switchbox::new(SwitchboxSite::Tile(tile));
        sb.master_sets.push(MasterSet {
            dest: Port::new(WireBundle::Dma, 1),
            amsels: vec![amsel(0, 0), amsel(0, 1)],
        });
        sb.master_sets.push(MasterSet {
            dest: Port::new(WireBundle::North, 2),
            amsels: vec![amsel(3, 2)],
        });
        let sb = device.add_switchbox(sb);

        let analysis = NetlistAnalysis::new(&device).unwrap();
        let body = SwitchConfigGenerator::new(&analysis).switchbox(&device.switchboxes[sb]).unwrap();
        let masters: Vec<_> = calls(&body)
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::StrmPktSwMstrPortEnable {
                    drop_header,
                    arbiter,
                    msel_mask,
                    ..
                } => Some((*drop_header, *arbiter, *msel_mask)),
                _ => None,
            })
            .collect();
        assert_eq!(masters, vec![(true, 0, 0x3), (false, 3, 0x4)]);
    }

    #[test]
    fn test_packet_rules_enable_source_once() {
        let mut device = Device::new(TargetModel::aie1(50, 9));
        let tile = device.add_tile(1, 2);
        let source = Port::new(WireBundle::West, 0);
        let mut sb = Switchbox::new(SwitchboxSite::Tile(tile));
        sb.packet_rules.push(PacketRules {
            source,
            rules: (0..3)
                .map(|v| PacketRule {
                    mask: 0x1F,
                    value: v,
                    amsel: amsel(0, v),
                })
                .collect(),
        });
        let sb = device.add_switchbox(sb);

        let analysis = NetlistAnalysis::new(&device).unwrap();
        let body = SwitchConfigGenerator::new(&analysis).switchbox(&device.switchboxes[sb]).unwrap();
        let calls = calls(&body);
        assert_eq!(calls.len(), 4);
        assert_eq!(
            calls[0],
            &DriverCall::StrmPktSwSlavePortEnable {
                loc: TileLoc::Symbolic,
                source
            }
        );
        let slots: Vec<_> = calls[1..]
            .iter()
            .map(|c| match c {
                DriverCall::StrmPktSwSlaveSlotEnable { slot, packet, msel, .. } => (*slot, packet.id, *msel),
                other => panic!("unexpected call {:?}", other),
            })
            .collect();
        assert_eq!(slots, vec![(0, 0, 0), (1, 1, 1), (2, 2, 2)]);
    }

    #[test]
    fn test_slot_numbering_restarts_per_group() {
        let mut device = Device::new(TargetModel::aie1(50, 9));
        let tile = device.add_tile(1, 2);
        let rule = PacketRule {
            mask: 0x1F,
            value: 4,
            amsel: amsel(1, 0),
        };
        let mut sb = Switchbox::new(SwitchboxSite::Tile(tile));
        for index in [0, 0, 1] {
            sb.packet_rules.push(PacketRules {
                source: Port::new(WireBundle::South, index),
                rules: vec![rule, rule],
            });
        }
        let sb = device.add_switchbox(sb);

        let analysis = NetlistAnalysis::new(&device).unwrap();
        let body = SwitchConfigGenerator::new(&analysis).switchbox(&device.switchboxes[sb]).unwrap();
        let calls = calls(&body);
        let port_enables = calls
            .iter()
            .filter(|c| matches!(c, DriverCall::StrmPktSwSlavePortEnable { .. }))
            .count();
        assert_eq!(port_enables, 2);
        let slots: Vec<u32> = calls
            .iter()
            .filter_map(|c| match c {
                DriverCall::StrmPktSwSlaveSlotEnable { slot, .. } => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_parametric_switchbox_loops() {
        let mut device = Device::new(TargetModel::aie1(50, 9));
        let range = ParamRange {
            herd: "h".to_string(),
            x: IterRange { start: 0, end: 4, stride: 1 },
            y: IterRange { start: 1, end: 3, stride: 2 },
        };
        let mut sb = Switchbox::new(SwitchboxSite::Range(range));
        sb.connections.push(Connect::new(
            Port::new(WireBundle::Dma, 0),
            Port::new(WireBundle::North, 0),
        ));
        let ranged = device.add_switchbox(sb);
        let empty = device.add_switchbox(Switchbox::new(SwitchboxSite::Range(ParamRange {
            herd: "empty".to_string(),
            x: IterRange { start: 0, end: 1, stride: 1 },
            y: IterRange { start: 0, end: 1, stride: 1 },
        })));

        let analysis = NetlistAnalysis::new(&device).unwrap();
        let generator = SwitchConfigGenerator::new(&analysis);
        assert!(generator.switchbox(&device.switchboxes[empty]).unwrap().is_empty());

        let body = generator.switchbox(&device.switchboxes[ranged]).unwrap();
        assert_eq!(body.len(), 1);
        let text = body[0].to_string();
        assert!(text.starts_with(
            "for (x = h_X + 0; x < h_X + 4; x += 1) {\nfor (y = h_Y + 1; y < h_Y + 3; y += 2) {\n"
        ));
        assert!(text.contains("XAie_StrmConnCctEnable(&(ctx->DevInst), XAie_TileLoc(x,y), DMA, 0, NORTH, 0)"));
        assert!(text.ends_with("}\n}\n"));
    }

    #[test]
    fn test_empty_literal_switchbox_emits_nothing() {
        let mut device = Device::new(TargetModel::aie1(50, 9));
        let tile = device.add_tile(1, 2);
        device.add_switchbox(Switchbox::new(SwitchboxSite::Tile(tile)));

        let analysis = NetlistAnalysis::new(&device).unwrap();
        assert_eq!(
            SwitchConfigGenerator::new(&analysis).generate().unwrap(),
            vec![Stmt::DeclareCoords]
        );
    }

    #[test]
    fn test_shim_mux_and_switchbox() {
        let mut device = Device::new(TargetModel::aie1(50, 9));
        let shim = device.add_tile(2, 0);
        device.shim_muxes.push(ShimMux {
            tile: shim,
            connections: vec![
                Connect::new(Port::new(WireBundle::North, 2), Port::new(WireBundle::Dma, 0)),
                Connect::new(Port::new(WireBundle::Dma, 1), Port::new(WireBundle::North, 3)),
            ],
        });
        device.shim_switchboxes.push(ShimSwitchbox {
            col: 2,
            connections: vec![Connect::new(
                Port::new(WireBundle::South, 3),
                Port::new(WireBundle::North, 0),
            )],
        });

        let analysis = NetlistAnalysis::new(&device).unwrap();
        let body = SwitchConfigGenerator::new(&analysis).generate().unwrap();
        assert_eq!(
            calls(&body),
            vec![
                &DriverCall::EnableAieToShimDmaStrmPort {
                    loc: TileLoc::Symbolic,
                    port: 2
                },
                &DriverCall::EnableShimDmaToAieStrmPort {
                    loc: TileLoc::Symbolic,
                    port: 3
                },
                &DriverCall::StrmConnCctEnable {
                    loc: TileLoc::new(2, 0),
                    source: Port::new(WireBundle::South, 3),
                    dest: Port::new(WireBundle::North, 0),
                },
            ]
        );
        assert!(body.contains(&Stmt::SetCoords { col: 2, row: 0 }));
    }
}
