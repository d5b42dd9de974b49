//! End-to-end scenarios driving the public API: programs assembled by hand,
//! executed by a default machine, with results checked through the heap and
//! the flow analyses.

use cilsym::emulate::{
    Instruction, Machine, MachineSettings, RunOutcome, StackSlot, TypeHint, UnknownBranchPolicy,
};
use cilsym::flow::{DominatorTree, FlowGraph};
use cilsym::types::{LayoutSettings, TypeGraph, TypeGraphArenas, ValueFactory};
use cilsym::util::Trilean;
use std::collections::HashSet;

fn machine() -> Machine {
    Machine::new(MachineSettings::default()).expect("default handler set registers cleanly")
}

#[test]
fn adds_two_known_integers() {
    let arenas = TypeGraphArenas::new();
    let graph = TypeGraph::new(&arenas);
    let core = graph.insert_core_types();
    let factory = ValueFactory::new(&graph, LayoutSettings::default());

    let machine = machine();
    let mut context = machine.new_context(&factory, core);
    context.push_frame(vec![
        Instruction::ldc_i4(7),
        Instruction::ldc_i4(3),
        Instruction::add(),
        Instruction::ret(),
    ]);

    match machine.run(&mut context).unwrap() {
        RunOutcome::Completed(Some(slot)) => {
            assert_eq!(slot.type_hint, TypeHint::Integer);
            assert!(slot.contents.is_fully_known());
            assert_eq!(slot.contents.as_slice().le_u32(), Some(10));
        }
        other => panic!("expected a completed run, got {:?}", other),
    }
}

#[test]
fn adding_an_unknown_poisons_the_sum() {
    let arenas = TypeGraphArenas::new();
    let graph = TypeGraph::new(&arenas);
    let core = graph.insert_core_types();
    let factory = ValueFactory::new(&graph, LayoutSettings::default());

    let machine = machine();
    let mut context = machine.new_context(&factory, core);
    context.push_frame(vec![Instruction::add(), Instruction::ret()]);
    context.push(StackSlot::from_i32(0xf)).unwrap();
    context.push(StackSlot::unknown_integer(4)).unwrap();

    match machine.run(&mut context).unwrap() {
        RunOutcome::Completed(Some(slot)) => {
            assert_eq!(slot.type_hint, TypeHint::Integer);
            assert!(
                slot.contents.as_slice().is_fully_unknown(),
                "no bit of the sum may be claimed known"
            );
        }
        other => panic!("expected a completed run, got {:?}", other),
    }
}

#[test]
fn allocates_an_int32_array() {
    let arenas = TypeGraphArenas::new();
    let graph = TypeGraph::new(&arenas);
    let core = graph.insert_core_types();
    let factory = ValueFactory::new(&graph, LayoutSettings::default());

    let machine = machine();
    let mut context = machine.new_context(&factory, core);
    context.push_frame(vec![
        Instruction::ldc_i4(4),
        Instruction::newarr(core.int32),
        Instruction::ret(),
    ]);

    let array = match machine.run(&mut context).unwrap() {
        RunOutcome::Completed(Some(slot)) => slot.as_address().expect("a concrete array address"),
        other => panic!("expected a completed run, got {:?}", other),
    };

    // header 8 + pointer-width length 8 + 4 * 4 bytes of elements
    assert_eq!(context.heap().raw().chunk_size(array).unwrap(), 8 + 8 + 16);
    assert_eq!(context.heap().type_of(array), Some(graph.sz_array_of(core.int32)));

    let chunk = context.heap().raw().chunk_slice(array).unwrap();
    let length = chunk.slice(factory.array_length_offset() as usize, 8);
    assert!(length.is_fully_known(), "the length field is born known");
    assert_eq!(length.le_u64(), Some(4));

    // ldlen sees the same value
    context.push_frame(vec![Instruction::ldlen(), Instruction::ret()]);
    context
        .push(StackSlot::reference(array, factory.pointer_size()))
        .unwrap();
    match machine.run(&mut context).unwrap() {
        RunOutcome::Completed(Some(slot)) => {
            assert_eq!(slot.type_hint, TypeHint::Integer);
            assert_eq!(slot.contents.as_slice().le_u64(), Some(4));
        }
        other => panic!("expected a completed run, got {:?}", other),
    }
}

#[test]
fn unboxing_points_at_the_boxed_payload() {
    let arenas = TypeGraphArenas::new();
    let graph = TypeGraph::new(&arenas);
    let core = graph.insert_core_types();
    let factory = ValueFactory::new(&graph, LayoutSettings::default());

    let machine = machine();
    let mut context = machine.new_context(&factory, core);
    context.push_frame(vec![
        Instruction::ldc_i4(42),
        Instruction::box_value(core.int32),
        Instruction::unbox(core.int32),
        Instruction::ret(),
    ]);

    let data_address = match machine.run(&mut context).unwrap() {
        RunOutcome::Completed(Some(slot)) => {
            slot.as_address().expect("a concrete managed pointer")
        }
        other => panic!("expected a completed run, got {:?}", other),
    };

    let chunks = context.heap().raw().allocated_chunks();
    assert_eq!(chunks.len(), 1, "exactly the box lives on the heap");
    assert_eq!(
        data_address,
        chunks[0].start + 8,
        "the managed pointer lands just past the object header"
    );

    let mut payload = [0u8; 4];
    context.heap().raw().read(data_address, &mut payload).unwrap();
    assert_eq!(i32::from_le_bytes(payload), 42);
}

#[test]
fn unbox_any_copies_the_payload_out() {
    let arenas = TypeGraphArenas::new();
    let graph = TypeGraph::new(&arenas);
    let core = graph.insert_core_types();
    let factory = ValueFactory::new(&graph, LayoutSettings::default());

    let machine = machine();
    let mut context = machine.new_context(&factory, core);
    context.push_frame(vec![
        Instruction::ldc_i4(42),
        Instruction::box_value(core.int32),
        Instruction::unbox_any(core.int32),
        Instruction::ret(),
    ]);

    match machine.run(&mut context).unwrap() {
        RunOutcome::Completed(Some(slot)) => {
            assert_eq!(slot.type_hint, TypeHint::Integer);
            assert_eq!(slot.contents.as_slice().le_u32(), Some(42));
            assert!(slot.contents.is_fully_known());
        }
        other => panic!("expected a completed run, got {:?}", other),
    }
}

#[test]
fn definite_overflow_throws_and_unknown_overflow_does_not() {
    let arenas = TypeGraphArenas::new();
    let graph = TypeGraph::new(&arenas);
    let core = graph.insert_core_types();
    let factory = ValueFactory::new(&graph, LayoutSettings::default());

    let machine = machine();

    let mut context = machine.new_context(&factory, core);
    context.push_frame(vec![
        Instruction::ldc_i4(i32::MAX),
        Instruction::ldc_i4(1),
        Instruction::add_ovf(),
        Instruction::ret(),
    ]);
    match machine.run(&mut context).unwrap() {
        RunOutcome::Threw(exception) => {
            assert_eq!(
                context.heap().type_of(exception),
                Some(core.exceptions.overflow)
            );
        }
        other => panic!("expected a throw, got {:?}", other),
    }

    // The same addition with an unknown operand must not throw
    let mut context = machine.new_context(&factory, core);
    context.push_frame(vec![Instruction::add_ovf(), Instruction::ret()]);
    context.push(StackSlot::unknown_integer(4)).unwrap();
    context.push(StackSlot::from_i32(1)).unwrap();
    match machine.run(&mut context).unwrap() {
        RunOutcome::Completed(Some(slot)) => {
            assert!(slot.contents.as_slice().is_fully_unknown());
        }
        other => panic!("an unknown overflow flag must not throw, got {:?}", other),
    }
}

#[test]
fn division_by_a_known_zero_throws() {
    let arenas = TypeGraphArenas::new();
    let graph = TypeGraph::new(&arenas);
    let core = graph.insert_core_types();
    let factory = ValueFactory::new(&graph, LayoutSettings::default());

    let machine = machine();
    let mut context = machine.new_context(&factory, core);
    context.push_frame(vec![
        Instruction::ldc_i4(1),
        Instruction::ldc_i4(0),
        Instruction::div(),
        Instruction::ret(),
    ]);

    match machine.run(&mut context).unwrap() {
        RunOutcome::Threw(exception) => {
            assert_eq!(
                context.heap().type_of(exception),
                Some(core.exceptions.divide_by_zero)
            );
        }
        other => panic!("expected a throw, got {:?}", other),
    }
}

#[test]
fn unknown_branch_follows_the_configured_policy() {
    let arenas = TypeGraphArenas::new();
    let graph = TypeGraph::new(&arenas);
    let core = graph.insert_core_types();
    let factory = ValueFactory::new(&graph, LayoutSettings::default());

    let program = || {
        vec![
            Instruction::brtrue(3),
            Instruction::ldc_i4(1),
            Instruction::ret(),
            Instruction::ldc_i4(2),
            Instruction::ret(),
        ]
    };

    let returned = |machine: &Machine| {
        let mut context = machine.new_context(&factory, core);
        context.push_frame(program());
        context.push(StackSlot::unknown_integer(4)).unwrap();
        match machine.run(&mut context).unwrap() {
            RunOutcome::Completed(Some(slot)) => slot.contents.as_slice().le_u32().unwrap(),
            other => panic!("expected a completed run, got {:?}", other),
        }
    };

    let fall_through = machine();
    assert_eq!(returned(&fall_through), 1, "default policy falls through");

    let take = Machine::new(MachineSettings {
        unknown_branch: UnknownBranchPolicy::Take,
        ..MachineSettings::default()
    })
    .unwrap();
    assert_eq!(returned(&take), 2);
}

#[test]
fn casts_consult_the_runtime_type() {
    let arenas = TypeGraphArenas::new();
    let graph = TypeGraph::new(&arenas);
    let core = graph.insert_core_types();
    let factory = ValueFactory::new(&graph, LayoutSettings::default());
    let ints = graph.sz_array_of(core.int32);

    let machine = machine();

    // A string upcasts to object and keeps its identity
    let mut context = machine.new_context(&factory, core);
    context.push_frame(vec![
        Instruction::ldstr("payload"),
        Instruction::dup(),
        Instruction::castclass(core.object),
        Instruction::ret(),
    ]);
    match machine.run(&mut context).unwrap() {
        RunOutcome::Completed(Some(slot)) => {
            let address = slot.as_address().unwrap();
            assert_eq!(context.heap().type_of(address), Some(core.string));
        }
        other => panic!("expected a completed run, got {:?}", other),
    }

    // isinst against an unrelated type yields null rather than throwing
    let mut context = machine.new_context(&factory, core);
    context.push_frame(vec![
        Instruction::ldstr("payload"),
        Instruction::isinst(ints),
        Instruction::ret(),
    ]);
    match machine.run(&mut context).unwrap() {
        RunOutcome::Completed(Some(slot)) => {
            assert_eq!(slot.is_null(), Trilean::True);
        }
        other => panic!("expected a completed run, got {:?}", other),
    }

    // castclass against the same unrelated type throws
    let mut context = machine.new_context(&factory, core);
    context.push_frame(vec![
        Instruction::ldstr("payload"),
        Instruction::castclass(ints),
        Instruction::ret(),
    ]);
    match machine.run(&mut context).unwrap() {
        RunOutcome::Threw(exception) => {
            assert_eq!(
                context.heap().type_of(exception),
                Some(core.exceptions.invalid_cast)
            );
        }
        other => panic!("expected a throw, got {:?}", other),
    }
}

#[test]
fn string_literals_materialize_utf16_on_the_heap() {
    let arenas = TypeGraphArenas::new();
    let graph = TypeGraph::new(&arenas);
    let core = graph.insert_core_types();
    let factory = ValueFactory::new(&graph, LayoutSettings::default());

    let machine = machine();
    let mut context = machine.new_context(&factory, core);
    context.push_frame(vec![Instruction::ldstr("hi"), Instruction::ret()]);

    let address = match machine.run(&mut context).unwrap() {
        RunOutcome::Completed(Some(slot)) => slot.as_address().unwrap(),
        other => panic!("expected a completed run, got {:?}", other),
    };

    let chunk = context.heap().raw().chunk_slice(address).unwrap();
    assert_eq!(
        chunk
            .slice(factory.string_length_offset() as usize, 4)
            .le_u32(),
        Some(2)
    );
    assert_eq!(
        chunk.slice(factory.string_data_offset() as usize, 4).bytes(),
        &[b'h', 0, b'i', 0],
    );
}

#[test]
fn conversions_narrow_widen_and_reject_references() {
    let arenas = TypeGraphArenas::new();
    let graph = TypeGraph::new(&arenas);
    let core = graph.insert_core_types();
    let factory = ValueFactory::new(&graph, LayoutSettings::default());

    let machine = machine();

    // Truncating a 64-bit value to 32 bits keeps the low half
    let mut context = machine.new_context(&factory, core);
    context.push_frame(vec![
        Instruction::ldc_i8(0x1_0000_0001),
        Instruction::conv(cilsym::emulate::OpCode::ConvI4),
        Instruction::ret(),
    ]);
    match machine.run(&mut context).unwrap() {
        RunOutcome::Completed(Some(slot)) => {
            assert_eq!(slot.contents.as_slice().le_u32(), Some(1));
        }
        other => panic!("expected a completed run, got {:?}", other),
    }

    // A known-null reference converts to a known zero native integer
    let mut context = machine.new_context(&factory, core);
    context.push_frame(vec![
        Instruction::ldnull(),
        Instruction::conv(cilsym::emulate::OpCode::ConvI),
        Instruction::ret(),
    ]);
    match machine.run(&mut context).unwrap() {
        RunOutcome::Completed(Some(slot)) => {
            assert_eq!(slot.type_hint, TypeHint::Integer);
            assert!(slot.contents.is_fully_known());
            assert_eq!(slot.contents.as_slice().le_u64(), Some(0));
        }
        other => panic!("expected a completed run, got {:?}", other),
    }

    // A live reference converts to a fully unknown native integer
    let mut context = machine.new_context(&factory, core);
    context.push_frame(vec![
        Instruction::ldstr("x"),
        Instruction::conv(cilsym::emulate::OpCode::ConvU),
        Instruction::ret(),
    ]);
    match machine.run(&mut context).unwrap() {
        RunOutcome::Completed(Some(slot)) => {
            assert!(slot.contents.as_slice().is_fully_unknown());
        }
        other => panic!("expected a completed run, got {:?}", other),
    }

    // Narrowing a reference is an invalid cast in the emulated program
    let mut context = machine.new_context(&factory, core);
    context.push_frame(vec![
        Instruction::ldstr("x"),
        Instruction::conv(cilsym::emulate::OpCode::ConvI1),
        Instruction::ret(),
    ]);
    match machine.run(&mut context).unwrap() {
        RunOutcome::Threw(exception) => {
            assert_eq!(
                context.heap().type_of(exception),
                Some(core.exceptions.invalid_cast)
            );
        }
        other => panic!("expected a throw, got {:?}", other),
    }
}

#[test]
fn pointer_prefixes_are_transparent() {
    let arenas = TypeGraphArenas::new();
    let graph = TypeGraph::new(&arenas);
    let core = graph.insert_core_types();
    let factory = ValueFactory::new(&graph, LayoutSettings::default());

    let machine = machine();
    let mut context = machine.new_context(&factory, core);
    context.push_frame(vec![
        Instruction::unaligned(4),
        Instruction::volatile(),
        Instruction::readonly(),
        Instruction::ldc_i4(5),
        Instruction::ret(),
    ]);

    match machine.run(&mut context).unwrap() {
        RunOutcome::Completed(Some(slot)) => {
            assert_eq!(slot.contents.as_slice().le_u32(), Some(5));
        }
        other => panic!("expected a completed run, got {:?}", other),
    }
}

#[test]
fn diamond_dominators_end_to_end() {
    // A -> B, A -> C, B -> D, C -> D
    let mut graph = FlowGraph::with_nodes(4);
    graph.add_edge(0, 1);
    graph.add_edge(0, 2);
    graph.add_edge(1, 3);
    graph.add_edge(2, 3);

    let tree = DominatorTree::new(&graph);
    for node in 0..4 {
        assert_eq!(tree.immediate_dominator(node), Some(0));
    }
    assert_eq!(tree.dominance_frontier(1), Some(HashSet::from([3])));
    assert_eq!(tree.dominance_frontier(2), Some(HashSet::from([3])));
    assert_eq!(tree.dominance_frontier(0), Some(HashSet::new()));
    assert_eq!(tree.dominance_frontier(3), Some(HashSet::new()));
}

#[test]
fn irreducible_loop_dominators_end_to_end() {
    // A -> B, A -> C, B -> C, C -> B
    let mut graph = FlowGraph::with_nodes(3);
    graph.add_edge(0, 1);
    graph.add_edge(0, 2);
    graph.add_edge(1, 2);
    graph.add_edge(2, 1);

    let tree = DominatorTree::new(&graph);
    assert_eq!(tree.immediate_dominator(1), Some(0));
    assert_eq!(tree.immediate_dominator(2), Some(0));

    // Plain frontiers stop at the other loop node; iterating to a fixed
    // point closes the cycle
    assert_eq!(tree.dominance_frontier(1), Some(HashSet::from([2])));
    assert_eq!(tree.dominance_frontier(2), Some(HashSet::from([1])));
    assert_eq!(tree.iterated_dominance_frontier([1]), HashSet::from([1, 2]));
    assert_eq!(tree.iterated_dominance_frontier([2]), HashSet::from([1, 2]));
}
