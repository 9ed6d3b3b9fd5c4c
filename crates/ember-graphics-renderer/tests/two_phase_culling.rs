//! Two-phase occlusion culling semantics, exercised through the CPU side of
//! the culling kernels: phase 1 tests against the previous frame's pyramid,
//! phase 2 retests what phase 1 queued, against the pyramid rebuilt from
//! phase 1's rendering.

use ember_graphics_renderer::gpu_renderer::{
    cull_instance, splat_sphere_depth, CullResult, DepthPyramid,
};
use ember_math::{perspective_reverse_z, BoundingSphere, Frustum, Mat4, Vec3};

const DEPTH_SIZE: u32 = 128;

struct Camera {
    frustum: Frustum,
    view_projection: Mat4,
}

fn camera() -> Camera {
    let view_projection = perspective_reverse_z(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
    Camera {
        frustum: Frustum::from_view_projection(&view_projection),
        view_projection,
    }
}

struct FrameResult {
    visible_after_phase1: Vec<usize>,
    visible_after_phase2: Vec<usize>,
    occluded_after_phase1: Vec<usize>,
    pyramid: DepthPyramid,
}

/// One frame of the two-phase algorithm over instance bounding spheres.
fn run_frame(
    camera: &Camera,
    instances: &[BoundingSphere],
    previous_pyramid: Option<&DepthPyramid>,
    occlusion_enabled: bool,
) -> FrameResult {
    let mut depth = vec![0.0f32; (DEPTH_SIZE * DEPTH_SIZE) as usize];
    let mut visible_after_phase1 = Vec::new();
    let mut occluded_after_phase1 = Vec::new();

    // Phase 1: cull against the previous frame's pyramid; draw what passed.
    let phase1_pyramid = if occlusion_enabled { previous_pyramid } else { None };
    for (index, sphere) in instances.iter().enumerate() {
        match cull_instance(&camera.frustum, &camera.view_projection, sphere, phase1_pyramid) {
            CullResult::Visible => {
                visible_after_phase1.push(index);
                splat_sphere_depth(
                    &mut depth,
                    DEPTH_SIZE,
                    DEPTH_SIZE,
                    &camera.view_projection,
                    sphere,
                );
            }
            CullResult::Occluded => occluded_after_phase1.push(index),
            CullResult::FrustumCulled => {}
        }
    }

    // The pyramid rebuilt from phase 1's depth.
    let phase1_result_pyramid = DepthPyramid::build_from_depth(&depth, DEPTH_SIZE, DEPTH_SIZE);

    // Phase 2: retest only the queued instances; what passes now is drawn
    // on top.
    let mut visible_after_phase2 = visible_after_phase1.clone();
    if occlusion_enabled {
        for &index in &occluded_after_phase1 {
            let sphere = &instances[index];
            if cull_instance(
                &camera.frustum,
                &camera.view_projection,
                sphere,
                Some(&phase1_result_pyramid),
            ) == CullResult::Visible
            {
                visible_after_phase2.push(index);
                splat_sphere_depth(
                    &mut depth,
                    DEPTH_SIZE,
                    DEPTH_SIZE,
                    &camera.view_projection,
                    sphere,
                );
            }
        }
    }

    FrameResult {
        visible_after_phase1,
        visible_after_phase2,
        occluded_after_phase1,
        pyramid: DepthPyramid::build_from_depth(&depth, DEPTH_SIZE, DEPTH_SIZE),
    }
}

/// Two identical instances on the camera ray, one fully behind the other.
fn front_and_back() -> Vec<BoundingSphere> {
    vec![
        BoundingSphere::new(Vec3::new(0.0, 0.0, 10.0), 3.0),
        BoundingSphere::new(Vec3::new(0.0, 0.0, 60.0), 3.0),
    ]
}

#[test]
fn first_frame_draws_both_then_second_frame_occludes_the_back() {
    let camera = camera();
    let instances = front_and_back();

    // Frame 0: no pyramid yet, phase 1 keeps both; phase 2 has nothing
    // queued and changes nothing.
    let frame0 = run_frame(&camera, &instances, None, true);
    assert_eq!(frame0.visible_after_phase1, vec![0, 1]);
    assert_eq!(frame0.visible_after_phase2, vec![0, 1]);
    assert!(frame0.occluded_after_phase1.is_empty());

    // Frame 1: phase 1 now sees the front instance's depth and queues the
    // back one; phase 2 confirms it stayed hidden.
    let frame1 = run_frame(&camera, &instances, Some(&frame0.pyramid), true);
    assert_eq!(frame1.visible_after_phase1, vec![0]);
    assert_eq!(frame1.occluded_after_phase1, vec![1]);
    assert_eq!(frame1.visible_after_phase2, vec![0]);
}

#[test]
fn phase_two_only_adds_visibility() {
    let camera = camera();
    // A spread of instances at varying depths, some hidden by the big
    // front occluder.
    let mut instances = vec![BoundingSphere::new(Vec3::new(0.0, 0.0, 8.0), 5.0)];
    for i in 0..12 {
        let f = i as f32;
        instances.push(BoundingSphere::new(
            Vec3::new((f - 6.0) * 2.0, (f * 0.7).sin() * 3.0, 30.0 + f * 3.0),
            1.5,
        ));
    }

    let frame0 = run_frame(&camera, &instances, None, true);
    let frame1 = run_frame(&camera, &instances, Some(&frame0.pyramid), true);

    for index in &frame1.visible_after_phase1 {
        assert!(frame1.visible_after_phase2.contains(index));
    }
    assert!(frame1.visible_after_phase2.len() >= frame1.visible_after_phase1.len());
}

#[test]
fn a_revealed_instance_is_recovered_by_phase_two() {
    let camera = camera();
    let mut instances = front_and_back();

    let frame0 = run_frame(&camera, &instances, None, true);
    let frame1 = run_frame(&camera, &instances, Some(&frame0.pyramid), true);
    assert_eq!(frame1.occluded_after_phase1, vec![1]);

    // The occluder moves away this frame; phase 1 still works from the
    // stale pyramid and queues the back instance, but the pyramid rebuilt
    // from this frame's rendering no longer hides it.
    instances[0].center.x = 50.0;
    let frame2 = run_frame(&camera, &instances, Some(&frame1.pyramid), true);
    assert!(frame2.occluded_after_phase1.contains(&1));
    assert!(frame2.visible_after_phase2.contains(&1));
}

#[test]
fn disabled_occlusion_queues_nothing_and_yields_the_same_union() {
    let camera = camera();
    let instances = front_and_back();

    let frame0 = run_frame(&camera, &instances, None, true);

    // Occlusion off: no phase-2 queue, and the phase-1 set alone equals the
    // enabled path's union.
    let frame_disabled = run_frame(&camera, &instances, Some(&frame0.pyramid), false);
    assert!(frame_disabled.occluded_after_phase1.is_empty());
    assert_eq!(frame_disabled.visible_after_phase1, vec![0, 1]);
    assert_eq!(
        frame_disabled.visible_after_phase2,
        frame_disabled.visible_after_phase1
    );

    let frame_enabled = run_frame(&camera, &instances, Some(&frame0.pyramid), true);
    let mut union_enabled = frame_enabled.visible_after_phase2.clone();
    union_enabled.sort_unstable();
    // Everything the enabled path draws across both phases, the disabled
    // path draws in phase 1.
    for index in &union_enabled {
        assert!(frame_disabled.visible_after_phase1.contains(index));
    }
}
