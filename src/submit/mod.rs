//! Frame submission: the state machine that turns a sorted item list into
//! encoded GPU commands.
//!
//! One [`Renderer::submit`] call walks the frame's pre-sorted items once.
//! Entering a new view flushes batched blits, re-resolves the render
//! target and clear ops; crossing between draw and compute items switches
//! pass kinds. Per draw, everything expensive is diffed against the
//! previous item: primitive info only when the topology bits changed,
//! scissor only when the scissor index changed, pipeline only when
//! program / vertex streams / pipeline-affecting state changed, bind
//! groups only when the bound-resource hash changed. The draw call itself
//! is always issued.

pub mod queue;

use std::time::{Duration, Instant};

use crate::backend::{
    ColorAttachment, DepthAttachment, GpuQuerySet, GpuTextureView, LoadOp, RenderBackend,
    RenderPassDesc, TextureViewDesc,
};
use crate::error::RenderError;
use crate::frame::{BlitItem, ComputeItem, DrawItem, Frame, RenderItem, SortKey, ViewId};
use crate::handle::HandlePool;
use crate::pipeline::{PipelineCache, TargetFormats};
use crate::renderer::Renderer;
use crate::resources::texture::Texture;
use crate::resources::{FrameBufferHandle, ProgramHandle, ResourcePool};
use crate::swapchain::FrameBuffer;
use crate::types::common::{ClearFlags, ClearValues, Rect};
use crate::types::state::{PrimInfo, RenderState, StencilState};
use crate::types::texture::TextureDimension;
use crate::uniforms::bind::alloc_bind_state;
use crate::{MAX_OCCLUSION_QUERIES, MAX_VERTEX_STREAMS};

/// Counters for one submission pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    /// Items consumed, by kind.
    pub num_draws: u32,
    pub num_compute: u32,
    pub num_blits: u32,
    /// Device calls actually issued after diffing.
    pub draw_calls: u32,
    pub dispatch_calls: u32,
    pub pipeline_binds: u32,
    pub bind_state_binds: u32,
    pub bind_states_allocated: u32,
    pub render_passes: u32,
    /// Primitive counts per topology index.
    pub prims_submitted: [u32; 5],
    pub prims_rendered: [u32; 5],
    pub instances: [u32; 5],
    pub indirect: [u32; 5],
    pub num_indices: u32,
    pub scratch_used: u32,
    pub cpu_time: Duration,
}

/// Which pass the encoder currently has open.
#[derive(Default)]
struct PassState {
    render_open: bool,
    compute_open: bool,
    /// Frame buffer bound by the open render pass.
    bound_fb: Option<Option<FrameBufferHandle>>,
}

impl PassState {
    fn end_all(&mut self, backend: &mut dyn RenderBackend) {
        if self.render_open {
            backend.end_render_pass();
            self.render_open = false;
        }
        if self.compute_open {
            backend.end_compute_pass();
            self.compute_open = false;
        }
        self.bound_fb = None;
    }
}

/// Per-stream identity used to detect vertex-stream changes.
type StreamKey = [Option<(u16, u16, u64, u32)>; MAX_VERTEX_STREAMS];

impl Renderer {
    /// Encode and submit one frame, presenting every swap chain that
    /// produced an image.
    pub fn submit(&mut self, frame: &mut Frame) -> Result<FrameStats, RenderError> {
        let time_begin = Instant::now();
        let mut stats = FrameStats::default();

        let Renderer {
            backend,
            resources,
            samplers,
            pipelines,
            registry,
            scratch,
            frame_slot,
            cmd,
            staging,
            main_target,
            windows,
            query_set,
            occlusion_used,
            ..
        } = self;
        let backend = backend.as_mut();
        let ResourcePool {
            buffers,
            textures,
            programs,
            frame_buffers,
            ..
        } = resources;

        let limits = backend.limits();
        let align = limits.min_uniform_offset_alignment;

        // Retire one frame slot, then start recording.
        cmd.finish(backend, false);
        cmd.ensure_encoder(backend);

        // Rotate into this frame's scratch slot; everything allocated from
        // it last cycle has retired with the slot.
        *frame_slot = (*frame_slot + 1) % scratch.len().max(1);
        let scratch = &mut scratch[*frame_slot];
        scratch.reset();
        let scratch_gpu = scratch.buffer().clone();

        // Transient geometry recorded alongside the frame.
        for transient in [frame.transient_ib.as_ref(), frame.transient_vb.as_ref()]
            .into_iter()
            .flatten()
        {
            if let Some(buffer) = buffers.get_mut(transient.buffer) {
                buffer.update(backend, cmd, 0, &transient.data, true)?;
            }
        }

        let mut pass = PassState::default();
        let mut current_view: Option<ViewId> = None;
        let mut view_cleared = false;
        let mut view_rect = Rect::default();
        let mut view_scissor = Rect::default();
        let mut view_transforms = crate::uniforms::ViewTransforms::default();
        let mut target_formats = main_target.formats.clone();
        let mut target_size = (main_target.width, main_target.height);

        let mut current_state = RenderState(0);
        let mut current_stencil = StencilState::NONE;
        let mut blend_factor: u32 = 0;
        let mut prim_index: u8 = 0;
        let mut prim = PrimInfo::from_index(0);
        let mut current_scissor: Option<Option<u16>> = None;
        let mut current_program: Option<ProgramHandle> = None;
        let mut current_streams: StreamKey = Default::default();
        let mut current_bind: Option<(u64, u64)> = None;
        let mut bound_bind_index: Option<usize> = None;
        let mut offsets = [0u32; 2];
        let mut num_offsets = 0u32;
        let mut offsets_dirty = true;
        let mut current_index_buffer = None;
        let mut warned_invalid_program = false;
        let mut blit_cursor = 0usize;

        for item_index in 0..frame.items.len() {
            let key = SortKey::decode(frame.items[item_index].0);
            let view_changed = current_view != Some(key.view);
            let was_compute = pass.compute_open;

            if view_changed || (!key.compute && was_compute) {
                if view_changed {
                    // Blits batched for views up to this one run at the
                    // boundary, outside any pass.
                    flush_blits(
                        backend,
                        textures,
                        frame,
                        &mut blit_cursor,
                        key.view,
                        &mut pass,
                        &mut stats,
                    );
                    current_view = Some(key.view);
                    view_cleared = false;
                }

                let view = frame.view(key.view);
                view_transforms = view.transforms;

                if !key.compute {
                    if pass.compute_open {
                        backend.end_compute_pass();
                        pass.compute_open = false;
                    }

                    // A pass restarts when the target changes, and also
                    // when this view asks for clears while the target is
                    // already open (clears only apply at pass begin).
                    let needs_clear = !view_cleared && !view.clear.flags.is_empty();
                    if !pass.render_open || pass.bound_fb != Some(view.framebuffer) || needs_clear
                    {
                        pass.end_all(backend);
                        let clear = if view_cleared {
                            ClearValues::default()
                        } else {
                            view.clear
                        };
                        let (formats, w, h) = begin_view_pass(
                            backend,
                            main_target,
                            frame_buffers,
                            textures,
                            view.framebuffer,
                            &clear,
                            query_set,
                        )?;
                        pass.render_open = true;
                        pass.bound_fb = Some(view.framebuffer);
                        view_cleared = true;
                        target_formats = formats;
                        target_size = (w, h);
                        stats.render_passes += 1;
                    }

                    view_rect = if view.rect.is_zero() {
                        Rect::new(0, 0, target_size.0 as u16, target_size.1 as u16)
                    } else {
                        view.rect
                    };
                    view_scissor = view.scissor;
                }

                // A view boundary (or compute boundary) invalidates every
                // diff tracker.
                current_state = RenderState(0);
                current_stencil = StencilState::NONE;
                blend_factor = 0;
                current_scissor = None;
                current_program = None;
                current_streams = Default::default();
                current_bind = None;
                bound_bind_index = None;
                offsets_dirty = true;
                current_index_buffer = None;
            }

            match &frame.items[item_index].1 {
                RenderItem::Compute(compute) => {
                    stats.num_compute += 1;
                    if pass.render_open {
                        backend.end_render_pass();
                        pass.render_open = false;
                        pass.bound_fb = None;
                    }
                    if !pass.compute_open {
                        backend.begin_compute_pass();
                        pass.compute_open = true;
                        current_program = None;
                        current_bind = None;
                        bound_bind_index = None;
                    }

                    encode_compute(
                        backend,
                        programs,
                        textures,
                        samplers,
                        registry,
                        scratch,
                        &scratch_gpu,
                        staging,
                        frame,
                        compute,
                        &view_transforms,
                        align,
                        &mut current_program,
                        &mut current_bind,
                        &mut bound_bind_index,
                        &mut warned_invalid_program,
                        &mut stats,
                    );
                }
                RenderItem::Draw(draw) => {
                    stats.num_draws += 1;

                    // Draws conditioned on a failed occlusion query drop out
                    // before touching any state.
                    if let Some(condition) = draw.condition {
                        let samples = frame
                            .occlusion_results
                            .get(condition.0 as usize)
                            .copied()
                            .unwrap_or(1);
                        if samples == 0 {
                            continue;
                        }
                    }
                    if draw.streams.is_empty() {
                        continue;
                    }
                    if !pass.render_open {
                        // Reopen after a compute interlude, loading the
                        // already-cleared target.
                        let view = frame.view(key.view);
                        let (formats, w, h) = begin_view_pass(
                            backend,
                            main_target,
                            frame_buffers,
                            textures,
                            view.framebuffer,
                            &ClearValues::default(),
                            query_set,
                        )?;
                        pass.render_open = true;
                        pass.bound_fb = Some(view.framebuffer);
                        target_formats = formats;
                        target_size = (w, h);
                        stats.render_passes += 1;
                    }

                    // Scissor: resolve and skip zero-area draws before any
                    // tracker is touched.
                    let view_clip = if view_scissor.is_zero() {
                        view_rect
                    } else {
                        view_scissor.intersect(&view_rect)
                    };
                    let scissor_rect = match draw.scissor {
                        None => view_clip,
                        Some(index) => frame
                            .scissors
                            .get(index as usize)
                            .map(|r| r.intersect(&view_clip))
                            .unwrap_or(view_clip),
                    };
                    if draw.scissor.is_some() && scissor_rect.is_zero() {
                        continue;
                    }

                    let changed_flags = current_state.0 ^ draw.state.0;
                    let changed_stencil = current_stencil.0 ^ draw.stencil.0;
                    current_state = draw.state;
                    current_stencil = draw.stencil;

                    if changed_flags & RenderState::PT_MASK != 0 {
                        prim_index = draw.state.topology_index();
                        if prim.topology != PrimInfo::from_index(prim_index).topology {
                            prim = PrimInfo::from_index(prim_index);
                        }
                    }

                    if current_scissor != Some(draw.scissor) {
                        current_scissor = Some(draw.scissor);
                        backend.set_scissor_rect(
                            scissor_rect.x as u32,
                            scissor_rect.y as u32,
                            scissor_rect.width as u32,
                            scissor_rect.height as u32,
                        );
                    }

                    if blend_factor != draw.rgba && !draw.state.independent_blend() {
                        let rgba = draw.rgba;
                        backend.set_blend_color([
                            ((rgba >> 24) & 0xff) as f64 / 255.0,
                            ((rgba >> 16) & 0xff) as f64 / 255.0,
                            ((rgba >> 8) & 0xff) as f64 / 255.0,
                            (rgba & 0xff) as f64 / 255.0,
                        ]);
                        blend_factor = rgba;
                    }

                    let streams_key = stream_key(draw, buffers);
                    let streams_changed = streams_key != current_streams;
                    let pipeline_dirty = current_program != Some(draw.program)
                        || streams_changed
                        || changed_flags & RenderState::PIPELINE_MASK != 0
                        || changed_stencil != 0
                        || (blend_factor != draw.rgba && draw.state.independent_blend());

                    let mut constants_dirty = !draw.uniforms.is_empty();

                    if pipeline_dirty {
                        current_streams = streams_key;
                        current_program = Some(draw.program);

                        let Some(program) = programs.get(draw.program) else {
                            warn_once(
                                &mut warned_invalid_program,
                                "draw references a dead program; skipping",
                            );
                            current_program = None;
                            continue;
                        };

                        // Resolve per-stream layouts and bind the streams.
                        let mut layouts = Vec::with_capacity(draw.streams.len());
                        let mut streams_ok = true;
                        for (slot, stream) in draw.streams.iter().enumerate() {
                            let Some(buffer) = buffers.get(stream.buffer) else {
                                streams_ok = false;
                                break;
                            };
                            let layout = stream.layout.clone().or_else(|| buffer.layout.clone());
                            let Some(layout) = layout else {
                                streams_ok = false;
                                break;
                            };
                            let offset = stream.start_vertex as u64 * layout.stride() as u64;
                            backend.set_vertex_buffer(slot as u32, &buffer.gpu, offset);
                            layouts.push(layout);
                        }
                        if !streams_ok {
                            warn_once(
                                &mut warned_invalid_program,
                                "draw references a dead vertex stream; skipping",
                            );
                            current_program = None;
                            continue;
                        }

                        if let Some(instance_buffer) =
                            draw.instance_buffer.and_then(|h| buffers.get(h))
                        {
                            backend.set_vertex_buffer(
                                draw.streams.len() as u32,
                                &instance_buffer.gpu,
                                draw.instance_offset as u64,
                            );
                        }

                        let layout_refs: Vec<&crate::types::vertex::VertexLayout> =
                            layouts.iter().map(|l| l.as_ref()).collect();
                        let pso = match pipelines.get_or_create(
                            backend,
                            program,
                            &target_formats,
                            draw.state,
                            draw.stencil,
                            draw.rgba,
                            &layout_refs,
                            draw.instance_stride,
                        ) {
                            Ok(pso) => pso,
                            Err(err) => {
                                warn_once(
                                    &mut warned_invalid_program,
                                    &format!("pipeline creation failed: {err}; dropping draws"),
                                );
                                current_program = None;
                                continue;
                            }
                        };
                        backend.set_render_pipeline(&pso.pipeline);
                        stats.pipeline_binds += 1;
                        constants_dirty = true;
                        if draw.state.independent_blend() {
                            blend_factor = draw.rgba;
                        }
                    }

                    let Some(program) = current_program.and_then(|h| programs.get(h)) else {
                        continue;
                    };

                    // Stage and upload this draw's constants.
                    let vsize = align_up(program.vs_const_size, align);
                    let fsize = align_up(program.fs_const_size, align);
                    if constants_dirty || !program.predefined.is_empty() {
                        let end = (draw.uniforms.end as usize).min(frame.uniform_ops.len());
                        let start = (draw.uniforms.start as usize).min(end);
                        staging.commit_ops(&frame.uniform_ops[start..end], registry);
                        let model = draw
                            .transform
                            .and_then(|i| frame.transforms.get(i as usize))
                            .unwrap_or(&crate::uniforms::IDENTITY);
                        staging.commit_predefined(&program.predefined, &view_transforms, model);

                        if let Some(alloc) = scratch.alloc(vsize + fsize) {
                            num_offsets = 0;
                            if vsize > 0 {
                                backend.write_buffer(
                                    &scratch_gpu,
                                    alloc.offset as u64,
                                    staging.vs_bytes(vsize),
                                );
                                offsets[num_offsets as usize] = alloc.offset;
                                num_offsets += 1;
                            }
                            if fsize > 0 {
                                backend.write_buffer(
                                    &scratch_gpu,
                                    (alloc.offset + vsize) as u64,
                                    staging.fs_bytes(fsize),
                                );
                                offsets[num_offsets as usize] = alloc.offset + vsize;
                                num_offsets += 1;
                            }
                            offsets_dirty = true;
                        } else {
                            log::error!("scratch arena exhausted; constants not updated");
                        }
                    }

                    // Bind-state dedup: identical binding table + layout
                    // hash reuses the previous draw's groups outright.
                    let bind_key = (draw.bindings.hash(), program.layout_hash);
                    if current_bind != Some(bind_key) || bound_bind_index.is_none() {
                        current_bind = Some(bind_key);
                        let state = alloc_bind_state(
                            backend,
                            program,
                            textures,
                            samplers,
                            registry,
                            &draw.bindings,
                            &scratch_gpu,
                            vsize,
                            fsize,
                        );
                        bound_bind_index = Some(scratch.push_bind_state(state));
                        stats.bind_states_allocated += 1;
                        offsets_dirty = true;
                    }

                    if offsets_dirty {
                        if let Some(bind) =
                            bound_bind_index.and_then(|index| scratch.bind_state(index))
                        {
                            debug_assert_eq!(
                                bind.num_offsets, num_offsets,
                                "bind state offset count mismatch"
                            );
                            backend.set_bind_group(
                                0,
                                &bind.uniforms,
                                &offsets[..num_offsets as usize],
                            );
                            backend.set_bind_group(1, &bind.textures, &[]);
                            backend.set_bind_group(2, &bind.samplers, &[]);
                            stats.bind_state_binds += 1;
                        }
                        offsets_dirty = false;
                    }

                    encode_draw(
                        backend,
                        buffers,
                        draw,
                        &prim,
                        prim_index,
                        &mut current_index_buffer,
                        occlusion_used,
                        &mut stats,
                    );
                }
            }
        }

        // Terminal state: close passes, flush trailing blits, kick and
        // present.
        pass.end_all(backend);
        flush_blits(
            backend,
            textures,
            frame,
            &mut blit_cursor,
            ViewId::MAX,
            &mut pass,
            &mut stats,
        );

        stats.scratch_used = scratch.used();
        cmd.kick(backend, true);

        if *occlusion_used > 0 {
            let resolved = backend.resolve_occlusion_queries(query_set, *occlusion_used);
            frame
                .occlusion_results
                .resize(MAX_OCCLUSION_QUERIES, 0);
            for (index, samples) in resolved.iter().enumerate() {
                frame.occlusion_results[index] = *samples as i32;
            }
            *occlusion_used = 0;
        }

        if let Some(chain) = main_target.swap_chain.as_mut() {
            chain.present(backend);
        }
        for window in windows.iter().skip(1).flatten() {
            if let Some(fb) = frame_buffers.get_mut(*window) {
                if let Some(chain) = fb.swap_chain.as_mut() {
                    chain.present(backend);
                }
            }
        }

        stats.cpu_time = time_begin.elapsed();
        log::trace!(
            "frame submitted: {} draws ({} calls), {} dispatches, {} pipeline binds, {} bind states",
            stats.num_draws,
            stats.draw_calls,
            stats.dispatch_calls,
            stats.pipeline_binds,
            stats.bind_states_allocated,
        );
        Ok(stats)
    }
}

fn warn_once(warned: &mut bool, message: &str) {
    if !*warned {
        log::warn!("{message}");
        *warned = true;
    }
}

#[inline]
fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Identity of a draw's vertex-stream set, for change detection.
fn stream_key(draw: &DrawItem, buffers: &HandlePool<crate::resources::Buffer>) -> StreamKey {
    let mut key: StreamKey = Default::default();
    for (slot, stream) in draw.streams.iter().take(MAX_VERTEX_STREAMS).enumerate() {
        let layout_hash = stream
            .layout
            .as_ref()
            .map(|l| l.hash())
            .or_else(|| {
                buffers
                    .get(stream.buffer)
                    .and_then(|b| b.layout.as_ref())
                    .map(|l| l.hash())
            })
            .unwrap_or(0);
        key[slot] = Some((
            stream.buffer.index() as u16,
            stream.buffer.generation(),
            layout_hash,
            stream.start_vertex,
        ));
    }
    key
}

/// Begin the render pass for a view's target, resolving clear-vs-load per
/// aspect.
fn begin_view_pass(
    backend: &mut dyn RenderBackend,
    main_target: &mut FrameBuffer,
    frame_buffers: &mut HandlePool<FrameBuffer>,
    textures: &HandlePool<Texture>,
    fb: Option<FrameBufferHandle>,
    clear: &ClearValues,
    query_set: &GpuQuerySet,
) -> Result<(TargetFormats, u32, u32), RenderError> {
    let target = match fb {
        None => &mut *main_target,
        Some(handle) => frame_buffers
            .get_mut(handle)
            .ok_or(RenderError::InvalidHandle)?,
    };

    // Collect owned views first; attachment descriptors borrow them.
    let mut colors: Vec<(GpuTextureView, Option<GpuTextureView>, bool)> = Vec::new();
    let mut depth: Option<(GpuTextureView, bool)> = None;

    if let Some(chain) = target.swap_chain.as_mut() {
        let (view, resolve) = chain.color_attachment(backend)?;
        let store = resolve.is_none();
        colors.push((view, resolve, store));
        if let Some(depth_view) = chain.depth_view() {
            depth = Some((depth_view, chain.depth_format.has_stencil()));
        }
    } else {
        for attachment in &target.colors {
            let Some(texture) = textures.get(attachment.texture) else {
                continue;
            };
            let sub_view = TextureViewDesc {
                base_mip: attachment.mip,
                mip_count: Some(1),
                base_layer: attachment.layer,
                layer_count: Some(1),
                dimension: Some(TextureDimension::D2),
            };
            let main_view = backend.create_texture_view(&texture.gpu, &sub_view);
            match &texture.msaa {
                Some(msaa) => {
                    let msaa_view =
                        backend.create_texture_view(msaa, &TextureViewDesc::default());
                    colors.push((msaa_view, Some(main_view), false));
                }
                None => colors.push((main_view, None, true)),
            }
        }
        if let Some(attachment) = &target.depth {
            if let Some(texture) = textures.get(attachment.texture) {
                let sub_view = TextureViewDesc {
                    base_mip: attachment.mip,
                    mip_count: Some(1),
                    base_layer: attachment.layer,
                    layer_count: Some(1),
                    dimension: Some(TextureDimension::D2),
                };
                let view = match &texture.msaa {
                    Some(msaa) => backend.create_texture_view(msaa, &TextureViewDesc::default()),
                    None => backend.create_texture_view(&texture.gpu, &sub_view),
                };
                depth = Some((view, texture.format.has_stencil()));
            }
        }
    }

    let color_attachments: Vec<ColorAttachment> = colors
        .iter()
        .map(|(view, resolve, store)| ColorAttachment {
            view,
            resolve: resolve.as_ref(),
            load: if clear.flags.contains(ClearFlags::COLOR) {
                LoadOp::Clear([
                    clear.color[0] as f64,
                    clear.color[1] as f64,
                    clear.color[2] as f64,
                    clear.color[3] as f64,
                ])
            } else {
                LoadOp::Load
            },
            store: *store,
        })
        .collect();

    let depth_attachment = depth.as_ref().map(|(view, has_stencil)| DepthAttachment {
        view,
        depth_load: if clear.flags.contains(ClearFlags::DEPTH) {
            LoadOp::Clear(clear.depth)
        } else {
            LoadOp::Load
        },
        depth_store: true,
        has_stencil: *has_stencil,
        stencil_load: if clear.flags.contains(ClearFlags::STENCIL) {
            LoadOp::Clear(clear.stencil)
        } else {
            LoadOp::Load
        },
        stencil_store: true,
    });

    backend.begin_render_pass(&RenderPassDesc {
        label: "view",
        colors: &color_attachments,
        depth: depth_attachment,
        occlusion_queries: Some(query_set),
    });

    Ok((target.formats.clone(), target.width, target.height))
}

/// Flush batched blits up to and including `up_to`, outside any pass.
fn flush_blits(
    backend: &mut dyn RenderBackend,
    textures: &HandlePool<Texture>,
    frame: &Frame,
    cursor: &mut usize,
    up_to: ViewId,
    pass: &mut PassState,
    stats: &mut FrameStats,
) {
    use crate::backend::{CopyExtent, TextureCopyLocation};

    while *cursor < frame.blits.len() && frame.blits[*cursor].view <= up_to {
        let blit: &BlitItem = &frame.blits[*cursor];
        *cursor += 1;

        let (Some(src), Some(dst)) = (textures.get(blit.src), textures.get(blit.dst)) else {
            continue;
        };

        pass.end_all(backend);

        // Clamp the copy window to both textures.
        let src_w = src
            .width
            .min(blit.src_x as u32 + blit.width as u32)
            .saturating_sub(blit.src_x as u32);
        let src_h = src
            .height
            .min(blit.src_y as u32 + blit.height as u32)
            .saturating_sub(blit.src_y as u32);
        let dst_w = dst
            .width
            .min(blit.dst_x as u32 + blit.width as u32)
            .saturating_sub(blit.dst_x as u32);
        let dst_h = dst
            .height
            .min(blit.dst_y as u32 + blit.height as u32)
            .saturating_sub(blit.dst_y as u32);
        let width = src_w.min(dst_w);
        let height = src_h.min(dst_h);
        if width == 0 || height == 0 {
            continue;
        }

        backend.copy_texture_to_texture(
            &TextureCopyLocation {
                texture: &src.gpu,
                mip: blit.src_mip,
                origin: [blit.src_x as u32, blit.src_y as u32, blit.src_z as u32],
            },
            &TextureCopyLocation {
                texture: &dst.gpu,
                mip: blit.dst_mip,
                origin: [blit.dst_x as u32, blit.dst_y as u32, blit.dst_z as u32],
            },
            CopyExtent {
                width,
                height,
                depth: blit.depth.max(1) as u32,
            },
        );
        stats.num_blits += 1;
    }
}

/// Encode one draw call (indexed/instanced/indirect) and its statistics.
#[allow(clippy::too_many_arguments)]
fn encode_draw(
    backend: &mut dyn RenderBackend,
    buffers: &HandlePool<crate::resources::Buffer>,
    draw: &DrawItem,
    prim: &PrimInfo,
    prim_index: u8,
    current_index_buffer: &mut Option<crate::resources::BufferHandle>,
    occlusion_used: &mut u32,
    stats: &mut FrameStats,
) {
    let prim_slot = (prim_index as usize).min(4);

    if let Some(query) = draw.occlusion {
        backend.begin_occlusion_query(query.0 as u32);
        *occlusion_used = (*occlusion_used).max(query.0 as u32 + 1).min(MAX_OCCLUSION_QUERIES as u32);
    }

    // Draw-indirect counts are surfaced in stats, but encoding falls back
    // to direct draws.
    if draw.indirect_buffer.is_some() {
        stats.indirect[prim_slot] += draw.indirect_num.max(1) as u32;
    }

    let num_instances = draw.num_instances.max(1);

    if let Some(index_handle) = draw.index_buffer {
        if let Some(index_buffer) = buffers.get(index_handle) {
            if *current_index_buffer != Some(index_handle) {
                backend.set_index_buffer(&index_buffer.gpu, index_buffer.index_format(), 0);
                *current_index_buffer = Some(index_handle);
            }

            let index_size = index_buffer.index_format().byte_size();
            let (num_indices, first_index) = if draw.num_indices == u32::MAX {
                (index_buffer.size / index_size, 0)
            } else {
                (draw.num_indices, draw.start_index)
            };
            if num_indices < prim.min {
                return;
            }

            let submitted = prim.prim_count(num_indices);
            stats.prims_submitted[prim_slot] += submitted;
            stats.prims_rendered[prim_slot] += submitted * num_instances;
            stats.instances[prim_slot] += num_instances;
            stats.num_indices += num_indices;

            backend.draw_indexed(num_indices, num_instances, first_index, 0, 0);
            stats.draw_calls += 1;
        }
    } else {
        let num_vertices = resolve_vertex_count(draw, buffers);
        if num_vertices >= prim.min {
            let submitted = prim.prim_count(num_vertices);
            stats.prims_submitted[prim_slot] += submitted;
            stats.prims_rendered[prim_slot] += submitted * num_instances;
            stats.instances[prim_slot] += num_instances;

            backend.draw(num_vertices, num_instances, 0, 0);
            stats.draw_calls += 1;
        }
    }

    if draw.occlusion.is_some() {
        backend.end_occlusion_query();
    }
}

/// Effective vertex count: an explicit count, clamped by every stream's
/// capacity when the draw asks for "all of it".
fn resolve_vertex_count(
    draw: &DrawItem,
    buffers: &HandlePool<crate::resources::Buffer>,
) -> u32 {
    let mut num_vertices = draw.num_vertices;
    for stream in &draw.streams {
        let Some(buffer) = buffers.get(stream.buffer) else {
            continue;
        };
        let stride = stream
            .layout
            .as_ref()
            .or(buffer.layout.as_ref())
            .map(|l| l.stride() as u32)
            .unwrap_or(0);
        if stride > 0 {
            num_vertices = num_vertices.min(buffer.size / stride);
        }
    }
    if num_vertices == u32::MAX {
        0
    } else {
        num_vertices
    }
}

/// Encode one compute dispatch, sharing the bind/uniform machinery with
/// the draw path.
#[allow(clippy::too_many_arguments)]
fn encode_compute(
    backend: &mut dyn RenderBackend,
    programs: &mut HandlePool<crate::resources::Program>,
    textures: &mut HandlePool<Texture>,
    samplers: &mut crate::resources::SamplerCache,
    registry: &crate::uniforms::UniformRegistry,
    scratch: &mut crate::uniforms::ScratchBuffer,
    scratch_gpu: &crate::backend::GpuBuffer,
    staging: &mut crate::uniforms::StagingUniforms,
    frame: &Frame,
    compute: &ComputeItem,
    view_transforms: &crate::uniforms::ViewTransforms,
    align: u32,
    current_program: &mut Option<ProgramHandle>,
    current_bind: &mut Option<(u64, u64)>,
    bound_bind_index: &mut Option<usize>,
    warned: &mut bool,
    stats: &mut FrameStats,
) {
    if *current_program != Some(compute.program) {
        let Some(program) = programs.get_mut(compute.program) else {
            warn_once(warned, "dispatch references a dead program; skipping");
            *current_program = None;
            return;
        };
        if !program.is_compute {
            warn_once(warned, "dispatch references a graphics program; skipping");
            *current_program = None;
            return;
        }
        let pso = match PipelineCache::compute_pipeline(backend, program) {
            Ok(pso) => pso,
            Err(err) => {
                warn_once(warned, &format!("compute pipeline failed: {err}; skipping"));
                *current_program = None;
                return;
            }
        };
        backend.set_compute_pipeline(&pso.pipeline);
        stats.pipeline_binds += 1;
        *current_program = Some(compute.program);
        *current_bind = None;
    }

    let Some(program) = current_program.and_then(|h| programs.get(h)) else {
        return;
    };

    // Compute constants ride the vertex-stage staging block.
    let vsize = align_up(program.vs_const_size, align);
    let mut offset = 0u32;
    if vsize > 0 {
        let end = (compute.uniforms.end as usize).min(frame.uniform_ops.len());
        let start = (compute.uniforms.start as usize).min(end);
        staging.commit_ops(&frame.uniform_ops[start..end], registry);
        staging.commit_predefined(&program.predefined, view_transforms, &crate::uniforms::IDENTITY);
        if let Some(alloc) = scratch.alloc(vsize) {
            backend.write_buffer(scratch_gpu, alloc.offset as u64, staging.vs_bytes(vsize));
            offset = alloc.offset;
        } else {
            log::error!("scratch arena exhausted; dispatch constants not updated");
        }
    }

    let bind_key = (compute.bindings.hash(), program.layout_hash);
    if *current_bind != Some(bind_key) || bound_bind_index.is_none() {
        *current_bind = Some(bind_key);
        let state = alloc_bind_state(
            backend,
            program,
            textures,
            samplers,
            registry,
            &compute.bindings,
            scratch_gpu,
            vsize,
            0,
        );
        *bound_bind_index = Some(scratch.push_bind_state(state));
        stats.bind_states_allocated += 1;
    }

    if let Some(bind) = bound_bind_index.and_then(|index| scratch.bind_state(index)) {
        let offsets = [offset];
        backend.set_compute_bind_group(
            0,
            &bind.uniforms,
            &offsets[..bind.num_offsets as usize],
        );
        backend.set_compute_bind_group(1, &bind.textures, &[]);
        backend.set_compute_bind_group(2, &bind.samplers, &[]);
        stats.bind_state_binds += 1;
    }

    backend.dispatch(compute.num_x.max(1), compute.num_y.max(1), compute.num_z.max(1));
    stats.dispatch_calls += 1;
}
