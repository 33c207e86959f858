//! End-to-end submission tests over the null backend.

use std::sync::Arc;

use cinnabar_graphics::backend::{NullBackend, NullStats, SurfaceTarget};
use cinnabar_graphics::frame::{
    Binding, ComputeItem, DrawItem, Frame, OcclusionQueryHandle, RenderItem, ResourceBindings,
    SortKey, VertexStream, View,
};
use cinnabar_graphics::resources::{BufferHandle, ProgramHandle, TextureImage};
use cinnabar_graphics::shader::{ShaderBlobWriter, ShaderKind, UniformType};
use cinnabar_graphics::swapchain::Attachment;
use cinnabar_graphics::types::{
    ClearFlags, ClearValues, Rect, SamplerFlags, TextureFlags, TextureFormat, VertexAttribKind,
    VertexAttribType, VertexLayout,
};
use cinnabar_graphics::{Renderer, RendererInit, MAX_OCCLUSION_QUERIES};

fn renderer() -> Renderer {
    let _ = env_logger::builder().is_test(true).try_init();
    Renderer::init(
        RendererInit::default(),
        Box::new(NullBackend::new()),
        SurfaceTarget::Headless,
    )
    .expect("null renderer must initialize")
}

fn null_stats(renderer: &Renderer) -> NullStats {
    renderer.backend_as::<NullBackend>().unwrap().stats()
}

fn position_layout() -> Arc<VertexLayout> {
    Arc::new(
        VertexLayout::builder()
            .add(VertexAttribKind::Position, 3, VertexAttribType::Float, false)
            .build(),
    )
}

/// Vertex-only program with a 64-byte constant block.
fn vertex_only_program(renderer: &mut Renderer) -> ProgramHandle {
    let blob = ShaderBlobWriter::new(ShaderKind::Vertex)
        .uniform("u_tint", UniformType::Vec4, 4, 0)
        .code(b"@vertex fn main() -> @builtin(position) vec4<f32> { return vec4(0.0); }")
        .attr(VertexAttribKind::Position)
        .const_size(64)
        .build();
    let vsh = renderer.create_shader(&blob).unwrap();
    renderer.create_program(vsh, None).unwrap()
}

fn textured_program(renderer: &mut Renderer) -> ProgramHandle {
    let vsh_blob = ShaderBlobWriter::new(ShaderKind::Vertex)
        .code(b"@vertex fn main() -> @builtin(position) vec4<f32> { return vec4(0.0); }")
        .attr(VertexAttribKind::Position)
        .const_size(16)
        .build();
    let fsh_blob = ShaderBlobWriter::new(ShaderKind::Fragment)
        .sampler("s_albedo", 0)
        .code(b"@fragment fn main() -> @location(0) vec4<f32> { return vec4(1.0); }")
        .const_size(0)
        .build();
    let vsh = renderer.create_shader(&vsh_blob).unwrap();
    let fsh = renderer.create_shader(&fsh_blob).unwrap();
    renderer.create_program(vsh, Some(fsh)).unwrap()
}

fn triangle_buffer(renderer: &mut Renderer, vertices: u32) -> BufferHandle {
    let data = vec![0u8; (vertices * 12) as usize];
    renderer
        .create_vertex_buffer(&data, position_layout())
        .unwrap()
}

fn tri_draw(program: ProgramHandle, buffer: BufferHandle, vertices: u32) -> DrawItem {
    DrawItem {
        program,
        streams: vec![VertexStream {
            buffer,
            layout: None,
            start_vertex: 0,
        }],
        num_vertices: vertices,
        ..DrawItem::default()
    }
}

fn single_view_frame() -> Frame {
    let mut frame = Frame::new();
    frame.views = vec![View {
        rect: Rect::new(0, 0, 1280, 720),
        clear: ClearValues {
            flags: ClearFlags::COLOR | ClearFlags::DEPTH,
            color: [0.1, 0.1, 0.1, 1.0],
            depth: 1.0,
            stencil: 0,
        },
        ..View::default()
    }];
    frame
}

#[test]
fn test_example_scenario_five_triangles() {
    // A vertex-only program with a 64-byte constant block; five draws with
    // identical state/program/bindings, three vertices each under
    // triangle-list topology.
    let mut renderer = renderer();
    let program = vertex_only_program(&mut renderer);
    let buffer = triangle_buffer(&mut renderer, 3);

    let mut frame = single_view_frame();
    for i in 0..5 {
        frame.push(
            SortKey::draw(0, i),
            RenderItem::Draw(tri_draw(program, buffer, 3)),
        );
    }

    let stats = renderer.submit(&mut frame).unwrap();

    assert_eq!(stats.num_draws, 5);
    assert_eq!(stats.draw_calls, 5, "every draw call is issued");
    assert_eq!(
        stats.prims_submitted[0], 5,
        "one triangle submitted per draw"
    );
    assert_eq!(stats.pipeline_binds, 1, "one pipeline bind for the run");
    assert_eq!(
        null_stats(&renderer).render_pipelines_created,
        1,
        "one pipeline compile total"
    );
    assert_eq!(renderer.pipeline_cache_len(), 1);
}

#[test]
fn test_state_diff_minimality() {
    // M draws sharing program/pipeline/bindings: exactly one pipeline bind
    // and one descriptor bind, M draw calls.
    const M: u32 = 12;
    let mut renderer = renderer();
    let program = vertex_only_program(&mut renderer);
    let buffer = triangle_buffer(&mut renderer, 30);

    let mut frame = single_view_frame();
    for i in 0..M {
        frame.push(
            SortKey::draw(0, i),
            RenderItem::Draw(tri_draw(program, buffer, 30)),
        );
    }

    let stats = renderer.submit(&mut frame).unwrap();
    assert_eq!(stats.draw_calls, M);
    assert_eq!(stats.pipeline_binds, 1);
    assert_eq!(stats.bind_state_binds, 1);
    assert_eq!(stats.bind_states_allocated, 1);
}

#[test]
fn test_pipeline_cache_survives_frames() {
    let mut renderer = renderer();
    let program = vertex_only_program(&mut renderer);
    let buffer = triangle_buffer(&mut renderer, 3);

    for _ in 0..3 {
        let mut frame = single_view_frame();
        frame.push(
            SortKey::draw(0, 0),
            RenderItem::Draw(tri_draw(program, buffer, 3)),
        );
        renderer.submit(&mut frame).unwrap();
    }
    assert_eq!(renderer.pipeline_cache_len(), 1);
    assert_eq!(null_stats(&renderer).render_pipelines_created, 1);

    // Changing a hashed field (blend state) compiles a second pipeline.
    use cinnabar_graphics::types::{BlendFactor, RenderState};
    let mut frame = single_view_frame();
    let mut draw = tri_draw(program, buffer, 3);
    draw.state = RenderState::opaque()
        .with_blend(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
    frame.push(SortKey::draw(0, 0), RenderItem::Draw(draw));
    renderer.submit(&mut frame).unwrap();
    assert_eq!(renderer.pipeline_cache_len(), 2);
}

#[test]
fn test_bind_state_dedup_breaks_on_binding_change() {
    let mut renderer = renderer();
    let program = textured_program(&mut renderer);
    let buffer = triangle_buffer(&mut renderer, 3);

    let image = TextureImage::from_pixels(4, 4, TextureFormat::Rgba8, vec![0xff; 64]);
    let tex_a = renderer
        .create_texture(&image, TextureFlags::default(), 0)
        .unwrap();
    let tex_b = renderer
        .create_texture(&image, TextureFlags::default(), 0)
        .unwrap();

    let mut bind_a = ResourceBindings::default();
    bind_a.entries[0] = Binding::Texture {
        texture: tex_a,
        sampler: SamplerFlags::default(),
    };
    let mut bind_b = ResourceBindings::default();
    bind_b.entries[0] = Binding::Texture {
        texture: tex_b,
        sampler: SamplerFlags::default(),
    };

    let mut frame = single_view_frame();
    for (i, bindings) in [&bind_a, &bind_a, &bind_b, &bind_b].iter().enumerate() {
        let mut draw = tri_draw(program, buffer, 3);
        draw.bindings = (*bindings).clone();
        frame.push(SortKey::draw(0, i as u32), RenderItem::Draw(draw));
    }

    let stats = renderer.submit(&mut frame).unwrap();
    assert_eq!(stats.draw_calls, 4);
    assert_eq!(
        stats.bind_states_allocated, 2,
        "consecutive identical bindings share one bind state"
    );
}

#[test]
fn test_scratch_usage_resets_per_slot_cycle() {
    let mut renderer = renderer();
    let program = vertex_only_program(&mut renderer);
    let buffer = triangle_buffer(&mut renderer, 3);

    let mut used = Vec::new();
    for _ in 0..6 {
        let mut frame = single_view_frame();
        frame.push(
            SortKey::draw(0, 0),
            RenderItem::Draw(tri_draw(program, buffer, 3)),
        );
        used.push(renderer.submit(&mut frame).unwrap().scratch_used);
    }

    // Same work per frame, so every slot rewinds to the same watermark
    // even after the ring wraps.
    assert!(used[0] > 0);
    assert!(used.iter().all(|&u| u == used[0]));
}

#[test]
fn test_deferred_release_waits_for_slot_retirement() {
    let mut renderer = renderer();
    let buffer = renderer.create_index_buffer(&[0u8; 6], false).unwrap();

    let backend_live = |r: &Renderer| r.backend_as::<NullBackend>().unwrap().live_resource_count();
    let before = backend_live(&renderer);

    renderer.destroy_buffer(buffer);
    assert_eq!(
        backend_live(&renderer),
        before,
        "device object must survive destroy while its frame may be in flight"
    );
    assert_eq!(renderer.pending_destruction_count(), 1);

    // Two more kicks: the release slot has not been reused yet.
    renderer.submit(&mut Frame::new()).unwrap();
    renderer.submit(&mut Frame::new()).unwrap();
    assert_eq!(backend_live(&renderer), before);

    // Third kick retires the slot; only now does the destructor fire.
    renderer.submit(&mut Frame::new()).unwrap();
    assert_eq!(backend_live(&renderer), before - 1);
    assert_eq!(renderer.pending_destruction_count(), 0);
}

#[rstest::rstest]
#[case(TextureFormat::Bc1)]
#[case(TextureFormat::Bc7)]
#[case(TextureFormat::Etc2)]
#[case(TextureFormat::Astc4x4)]
#[case(TextureFormat::R5G6B5)]
#[case(TextureFormat::Rgba4)]
#[case(TextureFormat::Rgb5A1)]
#[case(TextureFormat::D16)]
fn test_unsupported_texture_formats_never_crash(#[case] format: TextureFormat) {
    let mut renderer = renderer();
    let image = TextureImage::from_pixels(4, 4, format, vec![0; 64]);
    let result = renderer.create_texture(&image, TextureFlags::default(), 0);
    assert!(result.is_err(), "{format:?} must be rejected, not crash");

    // A supported format still goes through afterwards.
    let ok = TextureImage::from_pixels(4, 4, TextureFormat::Rgba8, vec![0; 64]);
    assert!(renderer
        .create_texture(&ok, TextureFlags::default(), 0)
        .is_ok());
}

#[test]
fn test_invalid_program_drops_draws_keeps_frame() {
    let mut renderer = renderer();
    let program = vertex_only_program(&mut renderer);
    let buffer = triangle_buffer(&mut renderer, 3);

    let mut frame = single_view_frame();
    // DrawItem::default has a dead program handle.
    let mut dead = DrawItem::default();
    dead.streams = vec![VertexStream {
        buffer,
        layout: None,
        start_vertex: 0,
    }];
    frame.push(SortKey::draw(0, 0), RenderItem::Draw(dead));
    frame.push(
        SortKey::draw(0, 1),
        RenderItem::Draw(tri_draw(program, buffer, 3)),
    );

    let stats = renderer.submit(&mut frame).unwrap();
    assert_eq!(stats.num_draws, 2);
    assert_eq!(stats.draw_calls, 1, "the valid draw still lands");
}

#[test]
fn test_shader_compile_failure_is_local() {
    let mut renderer = renderer();
    renderer
        .backend_as::<NullBackend>()
        .unwrap()
        .fail_shader_compile(true);

    let blob = ShaderBlobWriter::new(ShaderKind::Vertex)
        .code(b"broken")
        .build();
    assert!(renderer.create_shader(&blob).is_err());

    renderer
        .backend_as::<NullBackend>()
        .unwrap()
        .fail_shader_compile(false);
    let program = vertex_only_program(&mut renderer);
    let buffer = triangle_buffer(&mut renderer, 3);
    let mut frame = single_view_frame();
    frame.push(
        SortKey::draw(0, 0),
        RenderItem::Draw(tri_draw(program, buffer, 3)),
    );
    assert_eq!(renderer.submit(&mut frame).unwrap().draw_calls, 1);
}

#[test]
fn test_views_share_pass_on_same_target() {
    let mut renderer = renderer();
    let program = vertex_only_program(&mut renderer);
    let buffer = triangle_buffer(&mut renderer, 3);

    let mut frame = single_view_frame();
    frame.views.push(View {
        rect: Rect::new(0, 0, 1280, 720),
        ..View::default()
    });
    frame.push(
        SortKey::draw(0, 0),
        RenderItem::Draw(tri_draw(program, buffer, 3)),
    );
    frame.push(
        SortKey::draw(1, 0),
        RenderItem::Draw(tri_draw(program, buffer, 3)),
    );

    let stats = renderer.submit(&mut frame).unwrap();
    assert_eq!(
        stats.render_passes, 1,
        "same destination framebuffer keeps the pass open across views"
    );
    assert_eq!(stats.draw_calls, 2);
}

#[test]
fn test_offscreen_view_opens_second_pass() {
    let mut renderer = renderer();
    let program = vertex_only_program(&mut renderer);
    let buffer = triangle_buffer(&mut renderer, 3);

    let target = renderer
        .create_texture(
            &TextureImage::target(256, 256, TextureFormat::Rgba8),
            TextureFlags::default().with_render_target(),
            0,
        )
        .unwrap();
    let fb = renderer
        .create_frame_buffer(&[Attachment::new(target)])
        .unwrap();

    let mut frame = single_view_frame();
    frame.views.push(View {
        framebuffer: Some(fb),
        clear: ClearValues::all([0.0; 4], 1.0, 0),
        ..View::default()
    });
    frame.push(
        SortKey::draw(0, 0),
        RenderItem::Draw(tri_draw(program, buffer, 3)),
    );
    frame.push(
        SortKey::draw(1, 0),
        RenderItem::Draw(tri_draw(program, buffer, 3)),
    );

    let stats = renderer.submit(&mut frame).unwrap();
    assert_eq!(stats.render_passes, 2);
    // Different target formats force a second pipeline.
    assert_eq!(renderer.pipeline_cache_len(), 2);
}

#[test]
fn test_scissor_rebinds_only_on_index_change() {
    let mut renderer = renderer();
    let program = vertex_only_program(&mut renderer);
    let buffer = triangle_buffer(&mut renderer, 3);

    let mut frame = single_view_frame();
    frame.scissors = vec![Rect::new(8, 8, 64, 64)];
    for (i, scissor) in [None, None, Some(0u16), Some(0u16)].iter().enumerate() {
        let mut draw = tri_draw(program, buffer, 3);
        draw.scissor = *scissor;
        frame.push(SortKey::draw(0, i as u32), RenderItem::Draw(draw));
    }

    renderer.submit(&mut frame).unwrap();
    assert_eq!(
        null_stats(&renderer).set_scissor_calls,
        2,
        "one bind for the view scissor, one for the draw scissor"
    );
}

#[test]
fn test_zero_area_scissor_skips_draw() {
    let mut renderer = renderer();
    let program = vertex_only_program(&mut renderer);
    let buffer = triangle_buffer(&mut renderer, 3);

    let mut frame = single_view_frame();
    frame.scissors = vec![Rect::new(0, 0, 0, 0)];
    let mut clipped = tri_draw(program, buffer, 3);
    clipped.scissor = Some(0);
    frame.push(SortKey::draw(0, 0), RenderItem::Draw(clipped));
    frame.push(
        SortKey::draw(0, 1),
        RenderItem::Draw(tri_draw(program, buffer, 3)),
    );

    let stats = renderer.submit(&mut frame).unwrap();
    assert_eq!(stats.draw_calls, 1);
}

#[test]
fn test_compute_dispatch_and_pipeline_caching() {
    let mut renderer = renderer();
    let blob = ShaderBlobWriter::new(ShaderKind::Compute)
        .thread_counts(8, 8, 1)
        .code(b"@compute @workgroup_size(8, 8, 1) fn main() {}")
        .const_size(0)
        .build();
    let csh = renderer.create_shader(&blob).unwrap();
    let program = renderer.create_program(csh, None).unwrap();

    let dispatch = |program| ComputeItem {
        program,
        num_x: 4,
        num_y: 4,
        num_z: 1,
        indirect_buffer: None,
        indirect_start: 0,
        uniforms: 0..0,
        bindings: ResourceBindings::default(),
    };

    let mut frame = single_view_frame();
    for i in 0..3 {
        frame.push(
            SortKey::dispatch(0, i),
            RenderItem::Compute(dispatch(program)),
        );
    }

    let stats = renderer.submit(&mut frame).unwrap();
    assert_eq!(stats.dispatch_calls, 3);
    assert_eq!(stats.pipeline_binds, 1, "compute pipeline set once");
    let backend = null_stats(&renderer);
    assert_eq!(backend.compute_pipelines_created, 1);
    assert_eq!(backend.compute_passes, 1);
    // Compute pipelines live on the program, not in the hash cache.
    assert_eq!(renderer.pipeline_cache_len(), 0);
}

#[test]
fn test_compute_then_draw_reopens_render_pass() {
    let mut renderer = renderer();
    let program = vertex_only_program(&mut renderer);
    let buffer = triangle_buffer(&mut renderer, 3);

    let csh_blob = ShaderBlobWriter::new(ShaderKind::Compute)
        .thread_counts(1, 1, 1)
        .code(b"@compute @workgroup_size(1) fn main() {}")
        .build();
    let csh = renderer.create_shader(&csh_blob).unwrap();
    let compute_program = renderer.create_program(csh, None).unwrap();

    let mut frame = single_view_frame();
    frame.push(
        SortKey::draw(0, 0),
        RenderItem::Draw(tri_draw(program, buffer, 3)),
    );
    frame.push(
        SortKey::dispatch(0, 1),
        RenderItem::Compute(ComputeItem {
            program: compute_program,
            num_x: 1,
            num_y: 1,
            num_z: 1,
            indirect_buffer: None,
            indirect_start: 0,
            uniforms: 0..0,
            bindings: ResourceBindings::default(),
        }),
    );
    frame.push(
        SortKey::draw(0, 2),
        RenderItem::Draw(tri_draw(program, buffer, 3)),
    );

    let stats = renderer.submit(&mut frame).unwrap();
    assert_eq!(stats.draw_calls, 2);
    assert_eq!(stats.dispatch_calls, 1);
    assert_eq!(stats.render_passes, 2, "pass ends for compute and reopens");
    assert_eq!(null_stats(&renderer).compute_passes, 1);
}

#[test]
fn test_blits_flush_at_view_boundary() {
    let mut renderer = renderer();
    let program = vertex_only_program(&mut renderer);
    let buffer = triangle_buffer(&mut renderer, 3);

    let image = TextureImage::from_pixels(16, 16, TextureFormat::Rgba8, vec![0; 1024]);
    let src = renderer
        .create_texture(&image, TextureFlags::default(), 0)
        .unwrap();
    let dst = renderer
        .create_texture(&image, TextureFlags(TextureFlags::READ_BACK), 0)
        .unwrap();

    let mut frame = single_view_frame();
    frame.blits.push(cinnabar_graphics::frame::BlitItem {
        view: 0,
        src,
        src_mip: 0,
        src_x: 0,
        src_y: 0,
        src_z: 0,
        dst,
        dst_mip: 0,
        dst_x: 0,
        dst_y: 0,
        dst_z: 0,
        width: 16,
        height: 16,
        depth: 1,
    });
    frame.push(
        SortKey::draw(0, 0),
        RenderItem::Draw(tri_draw(program, buffer, 3)),
    );

    let stats = renderer.submit(&mut frame).unwrap();
    assert_eq!(stats.num_blits, 1);
    assert_eq!(stats.draw_calls, 1);
}

#[test]
fn test_occlusion_query_roundtrip() {
    let mut renderer = renderer();
    let program = vertex_only_program(&mut renderer);
    let buffer = triangle_buffer(&mut renderer, 3);

    let mut frame = single_view_frame();
    let mut queried = tri_draw(program, buffer, 3);
    queried.occlusion = Some(OcclusionQueryHandle(0));
    frame.push(SortKey::draw(0, 0), RenderItem::Draw(queried));

    renderer.submit(&mut frame).unwrap();
    assert_eq!(null_stats(&renderer).occlusion_queries_begun, 1);
    assert_eq!(frame.occlusion_results.len(), MAX_OCCLUSION_QUERIES);
    assert_eq!(frame.occlusion_results[0], 1, "null backend reports visible");

    // Next frame: a draw conditioned on the passed query lands, one
    // conditioned on a never-run query is dropped.
    let mut next = single_view_frame();
    next.occlusion_results = frame.occlusion_results.clone();
    let mut visible = tri_draw(program, buffer, 3);
    visible.condition = Some(OcclusionQueryHandle(0));
    let mut occluded = tri_draw(program, buffer, 3);
    occluded.condition = Some(OcclusionQueryHandle(7));
    next.push(SortKey::draw(0, 0), RenderItem::Draw(visible));
    next.push(SortKey::draw(0, 1), RenderItem::Draw(occluded));

    let stats = renderer.submit(&mut next).unwrap();
    assert_eq!(stats.draw_calls, 1);
}

#[test]
fn test_transient_buffers_upload_before_encoding() {
    let mut renderer = renderer();
    let program = vertex_only_program(&mut renderer);
    let vb = renderer
        .create_dynamic_vertex_buffer(1024, position_layout())
        .unwrap();

    let mut frame = single_view_frame();
    frame.transient_vb = Some(cinnabar_graphics::frame::TransientUpdate {
        buffer: vb,
        data: vec![0u8; 360],
    });
    frame.push(
        SortKey::draw(0, 0),
        RenderItem::Draw(tri_draw(program, vb, 30)),
    );

    let copies_before = null_stats(&renderer).copies;
    let stats = renderer.submit(&mut frame).unwrap();
    assert_eq!(stats.draw_calls, 1);
    assert!(null_stats(&renderer).copies > copies_before);
}

#[test]
fn test_window_table_reuses_dense_slots() {
    let mut renderer = renderer();
    assert_eq!(renderer.window_count(), 1);

    let a = renderer
        .create_window_frame_buffer(SurfaceTarget::Headless, 320, 200)
        .unwrap();
    let b = renderer
        .create_window_frame_buffer(SurfaceTarget::Headless, 320, 200)
        .unwrap();
    assert_eq!(renderer.window_count(), 3);

    renderer.destroy_frame_buffer(a);
    assert_eq!(renderer.window_count(), 2);

    let c = renderer
        .create_window_frame_buffer(SurfaceTarget::Headless, 640, 480)
        .unwrap();
    assert_eq!(renderer.window_count(), 3);
    assert_ne!(b, c);
}

#[test]
fn test_presents_follow_kicks() {
    let mut renderer = renderer();
    let program = vertex_only_program(&mut renderer);
    let buffer = triangle_buffer(&mut renderer, 3);

    // An empty frame acquires nothing and presents nothing.
    renderer.submit(&mut Frame::new()).unwrap();
    assert_eq!(null_stats(&renderer).presents, 0);

    let mut frame = single_view_frame();
    frame.push(
        SortKey::draw(0, 0),
        RenderItem::Draw(tri_draw(program, buffer, 3)),
    );
    renderer.submit(&mut frame).unwrap();
    let stats = null_stats(&renderer);
    assert_eq!(stats.presents, 1);
    assert!(stats.submits >= 2);
}

#[test]
fn test_indexed_draws_share_index_binding() {
    let mut renderer = renderer();
    let program = vertex_only_program(&mut renderer);
    let vb = triangle_buffer(&mut renderer, 4);
    // Six 16-bit indices: two triangles over four vertices.
    let indices: [u16; 6] = [0, 1, 2, 2, 1, 3];
    let index_bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
    let ib = renderer.create_index_buffer(&index_bytes, false).unwrap();

    let mut frame = single_view_frame();
    for i in 0..3 {
        let mut draw = tri_draw(program, vb, 4);
        draw.index_buffer = Some(ib);
        draw.num_indices = u32::MAX;
        frame.push(SortKey::draw(0, i), RenderItem::Draw(draw));
    }

    let stats = renderer.submit(&mut frame).unwrap();
    assert_eq!(stats.draw_calls, 3);
    assert_eq!(stats.num_indices, 18);
    assert_eq!(stats.prims_submitted[0], 6);
    assert_eq!(
        null_stats(&renderer).set_index_buffer_calls,
        1,
        "index buffer bound once for the run"
    );
}

#[test]
fn test_shutdown_drains() {
    let mut renderer = renderer();
    let buffer = renderer.create_index_buffer(&[0u8; 12], false).unwrap();
    renderer.destroy_buffer(buffer);
    renderer.shutdown();
}
