//! Graph compile/execute behavior: pass culling, barrier derivation,
//! transient aliasing and import handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ember_graphics_api::backend::Command;
use ember_graphics_api::{
    BufferDesc, DeviceContext, DeviceDesc, Format, ResourceState, TextureDesc,
};
use ember_graphics_renderer::core::render_graph::{
    RGPassFlags, RenderGraph, RenderGraphResourcePool,
};
use parking_lot::Mutex;

fn device() -> DeviceContext {
    DeviceContext::new(&DeviceDesc::default()).unwrap()
}

#[test]
fn unreferenced_pass_is_culled_and_never_invoked() {
    let device = device();
    let mut graph = RenderGraph::new(&device);
    let mut pool = RenderGraphResourcePool::new();

    let mut orphan = graph.create("orphan", BufferDesc::create_structured(16, 4));
    let invoked = Arc::new(AtomicBool::new(false));
    let invoked_clone = Arc::clone(&invoked);
    graph
        .add_pass("WriteOrphan", RGPassFlags::COMPUTE)
        .write(&mut orphan)
        .bind(move |_context, _resources| {
            invoked_clone.store(true, Ordering::Relaxed);
        });

    graph.execute(&mut pool).unwrap();
    assert!(!invoked.load(Ordering::Relaxed));
}

#[test]
fn never_cull_pass_always_runs() {
    let device = device();
    let mut graph = RenderGraph::new(&device);
    let mut pool = RenderGraphResourcePool::new();

    let mut orphan = graph.create("orphan", BufferDesc::create_structured(16, 4));
    let invoked = Arc::new(AtomicBool::new(false));
    let invoked_clone = Arc::clone(&invoked);
    graph
        .add_pass("WriteOrphan", RGPassFlags::COMPUTE | RGPassFlags::NEVER_CULL)
        .write(&mut orphan)
        .bind(move |_context, _resources| {
            invoked_clone.store(true, Ordering::Relaxed);
        });

    graph.execute(&mut pool).unwrap();
    assert!(invoked.load(Ordering::Relaxed));
}

#[test]
fn writer_of_read_resource_survives_culling() {
    let device = device();
    let mut graph = RenderGraph::new(&device);
    let mut pool = RenderGraphResourcePool::new();

    let mut buffer = graph.create("counters", BufferDesc::create_structured(16, 4));
    let writer_ran = Arc::new(AtomicBool::new(false));
    let reader_ran = Arc::new(AtomicBool::new(false));

    let writer_flag = Arc::clone(&writer_ran);
    graph
        .add_pass("Producer", RGPassFlags::COMPUTE)
        .write(&mut buffer)
        .bind(move |_context, _resources| {
            writer_flag.store(true, Ordering::Relaxed);
        });

    let reader_flag = Arc::clone(&reader_ran);
    graph
        .add_pass("Consumer", RGPassFlags::COMPUTE | RGPassFlags::NEVER_CULL)
        .read(buffer)
        .bind(move |_context, _resources| {
            reader_flag.store(true, Ordering::Relaxed);
        });

    graph.execute(&mut pool).unwrap();
    assert!(writer_ran.load(Ordering::Relaxed));
    assert!(reader_ran.load(Ordering::Relaxed));
}

#[test]
fn barrier_preceding_reader_matches_declared_state() {
    let device = device();
    let mut graph = RenderGraph::new(&device);
    let mut pool = RenderGraphResourcePool::new();

    let mut buffer = graph.create("list", BufferDesc::create_structured(64, 4));
    graph
        .add_pass("Produce", RGPassFlags::COMPUTE)
        .write(&mut buffer)
        .bind(|_context, _resources| {});
    graph
        .add_pass("Consume", RGPassFlags::COMPUTE | RGPassFlags::NEVER_CULL)
        .read(buffer)
        .bind(|_context, _resources| {});

    graph.execute(&mut pool).unwrap();
    let submissions = device.take_submissions();
    let commands: Vec<&Command> = submissions.iter().flat_map(|s| s.commands.iter()).collect();

    let to_uav = commands.iter().position(|c| {
        matches!(
            c,
            Command::TransitionBuffer {
                dst_state: ResourceState::UNORDERED_ACCESS,
                ..
            }
        )
    });
    let to_srv = commands.iter().position(|c| {
        matches!(
            c,
            Command::TransitionBuffer {
                src_state: ResourceState::UNORDERED_ACCESS,
                dst_state: ResourceState::SHADER_RESOURCE,
                ..
            }
        )
    });
    assert!(to_uav.is_some(), "writer state transition missing");
    assert!(to_srv.is_some(), "reader state transition missing");
    assert!(to_uav.unwrap() < to_srv.unwrap());
}

#[test]
fn back_to_back_writers_get_a_uav_barrier() {
    let device = device();
    let mut graph = RenderGraph::new(&device);
    let mut pool = RenderGraphResourcePool::new();

    let mut buffer = graph.create("counters", BufferDesc::create_structured(4, 4));
    graph
        .add_pass("WriteA", RGPassFlags::COMPUTE | RGPassFlags::NEVER_CULL)
        .write(&mut buffer)
        .bind(|_context, _resources| {});
    graph
        .add_pass("WriteB", RGPassFlags::COMPUTE | RGPassFlags::NEVER_CULL)
        .write(&mut buffer)
        .bind(|_context, _resources| {});

    graph.execute(&mut pool).unwrap();
    let submissions = device.take_submissions();
    let has_uav_barrier = submissions
        .iter()
        .flat_map(|s| s.commands.iter())
        .any(|c| matches!(c, Command::UavBarrier { resource_id: Some(_) }));
    assert!(has_uav_barrier);
}

#[test]
fn imported_resources_never_enter_the_free_list() {
    let device = device();
    let texture = device
        .create_texture(TextureDesc::create_2d(64, 64, Format::R32_UINT), "persistent")
        .unwrap();

    let mut graph = RenderGraph::new(&device);
    let mut pool = RenderGraphResourcePool::new();
    let mut imported = graph.import_texture("persistent", &texture);
    graph
        .add_pass("Touch", RGPassFlags::COMPUTE)
        .write(&mut imported)
        .bind(|_context, _resources| {});

    graph.execute(&mut pool).unwrap();
    assert_eq!(pool.available_count(), 0);
}

#[test]
fn disjoint_lifetimes_alias_one_physical_resource() {
    let device = device();
    let mut graph = RenderGraph::new(&device);
    let mut pool = RenderGraphResourcePool::new();

    let desc = TextureDesc::create_2d(128, 128, Format::R16G16B16A16_FLOAT);
    let mut first = graph.create("scratch_a", desc);
    let mut second = graph.create("scratch_b", desc);

    graph
        .add_pass("WriteA", RGPassFlags::COMPUTE)
        .write(&mut first)
        .bind(|_context, _resources| {});
    graph
        .add_pass("ReadA", RGPassFlags::COMPUTE | RGPassFlags::NEVER_CULL)
        .read(first)
        .bind(|_context, _resources| {});
    graph
        .add_pass("WriteB", RGPassFlags::COMPUTE)
        .write(&mut second)
        .bind(|_context, _resources| {});
    graph
        .add_pass("ReadB", RGPassFlags::COMPUTE | RGPassFlags::NEVER_CULL)
        .read(second)
        .bind(|_context, _resources| {});

    graph.execute(&mut pool).unwrap();
    // The second transient starts after the first one's last use, so both
    // map to the same allocation.
    assert_eq!(pool.allocation_count(), 1);
    assert_eq!(pool.available_count(), 1);
}

#[test]
fn overlapping_lifetimes_do_not_alias() {
    let device = device();
    let mut graph = RenderGraph::new(&device);
    let mut pool = RenderGraphResourcePool::new();

    let desc = TextureDesc::create_2d(128, 128, Format::R16G16B16A16_FLOAT);
    let mut first = graph.create("scratch_a", desc);
    let mut second = graph.create("scratch_b", desc);

    graph
        .add_pass("WriteBoth", RGPassFlags::COMPUTE)
        .write(&mut first)
        .write(&mut second)
        .bind(|_context, _resources| {});
    graph
        .add_pass("ReadBoth", RGPassFlags::COMPUTE | RGPassFlags::NEVER_CULL)
        .read(first)
        .read(second)
        .bind(|_context, _resources| {});

    graph.execute(&mut pool).unwrap();
    assert_eq!(pool.allocation_count(), 2);
}

#[test]
fn physical_resources_are_reused_across_frames() {
    let device = device();
    let mut pool = RenderGraphResourcePool::new();
    let desc = TextureDesc::create_2d(256, 256, Format::R11G11B10_FLOAT);

    for _frame in 0..3 {
        let mut graph = RenderGraph::new(&device);
        let mut scratch = graph.create("scratch", desc);
        graph
            .add_pass("Write", RGPassFlags::COMPUTE)
            .write(&mut scratch)
            .bind(|_context, _resources| {});
        graph
            .add_pass("Read", RGPassFlags::COMPUTE | RGPassFlags::NEVER_CULL)
            .read(scratch)
            .bind(|_context, _resources| {});
        graph.execute(&mut pool).unwrap();
        device.tick_frame();
    }

    assert_eq!(pool.allocation_count(), 1);
}

#[test]
fn submission_contexts_are_recycled_once_their_fence_completes() {
    let device = device();
    let mut pool = RenderGraphResourcePool::new();

    for _frame in 0..4 {
        let mut graph = RenderGraph::new(&device);
        let mut buffer = graph.create("counters", BufferDesc::create_structured(4, 4));
        graph
            .add_pass("Touch", RGPassFlags::COMPUTE | RGPassFlags::NEVER_CULL)
            .write(&mut buffer)
            .bind(|_context, _resources| {});
        graph.execute(&mut pool).unwrap();
        device.tick_frame();
    }

    // The submission fence completes before the next frame acquires, so one
    // context serves every execution.
    assert_eq!(pool.context_count(), 1);
}

#[test]
fn export_slot_receives_the_physical_texture() {
    let device = device();
    let mut graph = RenderGraph::new(&device);
    let mut pool = RenderGraphResourcePool::new();

    let slot = Arc::new(Mutex::new(None));
    let mut target = graph.create(
        "exported",
        TextureDesc::create_2d(32, 32, Format::R32_FLOAT),
    );
    graph.export_texture(target, &slot);
    graph
        .add_pass("Fill", RGPassFlags::COMPUTE)
        .write(&mut target)
        .bind(|_context, _resources| {});

    graph.execute(&mut pool).unwrap();
    let exported = slot.lock().clone();
    assert!(exported.is_some());
    // Exported resources stay out of the free list.
    assert_eq!(pool.available_count(), 0);
}

#[test]
fn copy_pass_moves_host_visible_bytes() {
    let device = device();
    let upload = device
        .create_buffer(BufferDesc::create_upload(16), "upload")
        .unwrap();
    upload.copy_to_host_visible_buffer(&[1u32, 2, 3, 4]);
    let readback = device
        .create_buffer(BufferDesc::create_readback(16), "readback")
        .unwrap();

    let mut graph = RenderGraph::new(&device);
    let mut pool = RenderGraphResourcePool::new();
    let src = graph.import_buffer("upload", &upload);
    let mut dst = graph.import_buffer("readback", &readback);
    graph.add_copy_pass("Copy", src, &mut dst);

    graph.execute(&mut pool).unwrap();
    assert_eq!(readback.read_host_visible_buffer::<u32>(4), vec![1, 2, 3, 4]);
}

#[test]
fn dump_lists_passes_and_accesses() {
    let device = device();
    let mut graph = RenderGraph::new(&device);

    let mut buffer = graph.create("counters", BufferDesc::create_structured(4, 4));
    graph
        .add_pass("Clear", RGPassFlags::COMPUTE)
        .write(&mut buffer)
        .bind(|_context, _resources| {});
    graph
        .add_pass("Consume", RGPassFlags::COMPUTE)
        .read(buffer)
        .bind(|_context, _resources| {});

    let dump = graph.dump();
    assert!(dump.contains("Clear"));
    assert!(dump.contains("Consume"));
    assert!(dump.contains("counters"));
}

#[test]
#[should_panic(expected = "read and write set")]
fn same_version_on_both_sides_is_refused() {
    let device = device();
    let mut graph = RenderGraph::new(&device);
    let mut pool = RenderGraphResourcePool::new();

    let mut buffer = graph.create("counters", BufferDesc::create_structured(4, 4));
    graph
        .add_pass("Produce", RGPassFlags::COMPUTE)
        .write(&mut buffer)
        .bind(|_context, _resources| {});

    // Reads version 1 and writes over the same version.
    let stale = buffer;
    graph
        .add_pass("Broken", RGPassFlags::COMPUTE | RGPassFlags::NEVER_CULL)
        .read(stale)
        .write(&mut buffer)
        .bind(|_context, _resources| {});

    let _ = graph.execute(&mut pool);
}

#[test]
#[should_panic(expected = "compute pass but declares render targets")]
fn compute_pass_with_render_targets_is_refused() {
    let device = device();
    let mut graph = RenderGraph::new(&device);
    let mut pool = RenderGraphResourcePool::new();

    let mut target = graph.create(
        "color",
        TextureDesc::create_render_target(64, 64, Format::R8G8B8A8_UNORM),
    );
    graph
        .add_pass("Broken", RGPassFlags::COMPUTE | RGPassFlags::NEVER_CULL)
        .render_target(
            &mut target,
            ember_graphics_renderer::core::render_graph::RenderTargetAccess::dont_care(),
        )
        .bind(|_context, _resources| {});

    let _ = graph.execute(&mut pool);
}

#[test]
#[should_panic(expected = "not written within this graph")]
fn indirect_args_must_be_produced_in_graph() {
    let device = device();
    let args = device
        .create_buffer(BufferDesc::create_indirect_arguments(1, 12), "args")
        .unwrap();

    let mut graph = RenderGraph::new(&device);
    let mut pool = RenderGraphResourcePool::new();
    let imported = graph.import_buffer("args", &args);
    graph
        .add_pass("Broken", RGPassFlags::COMPUTE | RGPassFlags::NEVER_CULL)
        .read_indirect_args(imported)
        .bind(|_context, _resources| {});

    let _ = graph.execute(&mut pool);
}

#[test]
#[should_panic(expected = "stale handle")]
fn a_version_has_exactly_one_writer() {
    let device = device();
    let mut graph = RenderGraph::new(&device);

    let mut buffer = graph.create("counters", BufferDesc::create_structured(4, 4));
    let mut stale = buffer;
    graph
        .add_pass("First", RGPassFlags::COMPUTE)
        .write(&mut buffer)
        .bind(|_context, _resources| {});
    // A second writer through the old handle races for the same version.
    graph
        .add_pass("Second", RGPassFlags::COMPUTE)
        .write(&mut stale)
        .bind(|_context, _resources| {});
}
