//! Benchmarks for the hot submission paths: state hashing and the full
//! diff-and-skip loop over the null backend.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cinnabar_graphics::backend::{NullBackend, SurfaceTarget};
use cinnabar_graphics::frame::{
    DrawItem, Frame, RenderItem, ResourceBindings, SortKey, VertexStream, View,
};
use cinnabar_graphics::shader::{ShaderBlobWriter, ShaderKind, UniformType};
use cinnabar_graphics::types::{
    ClearValues, Rect, VertexAttribKind, VertexAttribType, VertexLayout,
};
use cinnabar_graphics::{Renderer, RendererInit};

fn bench_binding_hash(c: &mut Criterion) {
    let bindings = ResourceBindings::default();
    c.bench_function("binding_table_hash", |b| {
        b.iter(|| black_box(&bindings).hash())
    });
}

fn bench_layout_hash(c: &mut Criterion) {
    c.bench_function("vertex_layout_build_and_hash", |b| {
        b.iter(|| {
            VertexLayout::builder()
                .add(VertexAttribKind::Position, 3, VertexAttribType::Float, false)
                .add(VertexAttribKind::Normal, 3, VertexAttribType::Float, false)
                .add(VertexAttribKind::TexCoord0, 2, VertexAttribType::Float, false)
                .add(VertexAttribKind::Color0, 4, VertexAttribType::Uint8, true)
                .build()
                .hash()
        })
    });
}

fn bench_submit_1000_draws(c: &mut Criterion) {
    let mut renderer = Renderer::init(
        RendererInit {
            scratch_size: 4 * 1024 * 1024,
            ..RendererInit::default()
        },
        Box::new(NullBackend::new()),
        SurfaceTarget::Headless,
    )
    .unwrap();

    let layout = Arc::new(
        VertexLayout::builder()
            .add(VertexAttribKind::Position, 3, VertexAttribType::Float, false)
            .build(),
    );
    let blob = ShaderBlobWriter::new(ShaderKind::Vertex)
        .uniform("u_tint", UniformType::Vec4, 1, 0)
        .code(b"@vertex fn main() -> @builtin(position) vec4<f32> { return vec4(0.0); }")
        .attr(VertexAttribKind::Position)
        .const_size(16)
        .build();
    let vsh = renderer.create_shader(&blob).unwrap();
    let program = renderer.create_program(vsh, None).unwrap();
    let buffer = renderer
        .create_vertex_buffer(&[0u8; 36], layout)
        .unwrap();

    c.bench_function("submit_1000_identical_draws", |b| {
        b.iter(|| {
            let mut frame = Frame::new();
            frame.views = vec![View {
                rect: Rect::new(0, 0, 1280, 720),
                clear: ClearValues::all([0.0; 4], 1.0, 0),
                ..View::default()
            }];
            for i in 0..1000 {
                frame.push(
                    SortKey::draw(0, i),
                    RenderItem::Draw(DrawItem {
                        program,
                        streams: vec![VertexStream {
                            buffer,
                            layout: None,
                            start_vertex: 0,
                        }],
                        num_vertices: 3,
                        ..DrawItem::default()
                    }),
                );
            }
            renderer.submit(&mut frame).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_binding_hash,
    bench_layout_hash,
    bench_submit_1000_draws
);
criterion_main!(benches);
