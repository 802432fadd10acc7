//! GPU post effects applied to finished frames.
//!
//! Frames are uploaded once, run through a ping-pong chain of fullscreen
//! passes and read back as RGBA8.

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use std::fmt;
use std::str::FromStr;

use super::gpu::{padded_bytes_per_row, strip_row_padding, GpuContext};

const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    Glow,
    Vignette,
    Grain,
}

impl Effect {
    pub fn name(self) -> &'static str {
        match self {
            Effect::Glow => "glow",
            Effect::Vignette => "vignette",
            Effect::Grain => "grain",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Effect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "glow" => Ok(Effect::Glow),
            "vignette" => Ok(Effect::Vignette),
            "grain" => Ok(Effect::Grain),
            other => Err(format!("unknown effect '{}'", other)),
        }
    }
}

/// Resolves effect names and presets. `none` anywhere disables everything;
/// unknown names are skipped with a warning.
pub fn expand_effects<S: AsRef<str>>(names: &[S]) -> Vec<Effect> {
    let mut effects = Vec::new();
    for name in names {
        match name.as_ref().trim() {
            "none" => return Vec::new(),
            "" => {}
            "dreamy" => effects.extend([Effect::Glow, Effect::Vignette]),
            other => match other.parse() {
                Ok(effect) => effects.push(effect),
                Err(err) => log::warn!("Skipping {}", err),
            },
        }
    }
    effects
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct EffectUniforms {
    resolution: [f32; 2],
    time: f32,
    strength: f32,
}

struct EffectPass {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
}

pub struct EffectChain {
    gpu: GpuContext,
    passes: Vec<EffectPass>,
    sampler: wgpu::Sampler,
    textures: [wgpu::Texture; 2],
    views: [wgpu::TextureView; 2],
    readback: wgpu::Buffer,
    width: u32,
    height: u32,
}

impl EffectChain {
    pub fn new(gpu: GpuContext, width: u32, height: u32, effects: &[Effect]) -> Result<Self> {
        let device = &gpu.device;
        let make_texture = |label: &str| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        };
        let textures = [make_texture("effect_ping"), make_texture("effect_pong")];
        let views = [
            textures[0].create_view(&Default::default()),
            textures[1].create_view(&Default::default()),
        ];

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("effect_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("effect_readback"),
            size: (padded_bytes_per_row(width) * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let passes = effects
            .iter()
            .map(|&effect| EffectPass::new(device, effect))
            .collect();

        Ok(Self {
            gpu,
            passes,
            sampler,
            textures,
            views,
            readback,
            width,
            height,
        })
    }

    /// Runs every pass over an RGBA8 frame and returns the result.
    pub fn apply(&self, rgba: &[u8], time: f32) -> Result<Vec<u8>> {
        if self.passes.is_empty() {
            return Ok(rgba.to_vec());
        }
        let device = &self.gpu.device;
        let queue = &self.gpu.queue;
        let extent = wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        };

        queue.write_texture(
            self.textures[0].as_image_copy(),
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * 4),
                rows_per_image: Some(self.height),
            },
            extent,
        );

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("effect_encoder"),
        });

        for (i, pass) in self.passes.iter().enumerate() {
            let (src, dst) = (i % 2, (i + 1) % 2);
            let uniforms = EffectUniforms {
                resolution: [self.width as f32, self.height as f32],
                time,
                strength: 1.0,
            };
            queue.write_buffer(&pass.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("effect_bind_group"),
                layout: &pass.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: pass.uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&self.views[src]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("effect_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.views[dst],
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(&pass.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }

        let padded = padded_bytes_per_row(self.width);
        let last = &self.textures[self.passes.len() % 2];
        encoder.copy_texture_to_buffer(
            last.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.height),
                },
            },
            extent,
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = self.readback.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        receiver.recv()??;

        let pixels = {
            let data = slice.get_mapped_range();
            strip_row_padding(&data, self.width, self.height, padded)
        };
        self.readback.unmap();
        Ok(pixels)
    }
}

impl EffectPass {
    fn new(device: &wgpu::Device, effect: Effect) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(effect.name()),
            source: wgpu::ShaderSource::Wgsl(effect_shader(effect).into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("effect_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("effect_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(effect.name()),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TEXTURE_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("effect_uniforms"),
            size: std::mem::size_of::<EffectUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            pipeline,
            bind_group_layout,
            uniform_buffer,
        }
    }
}

const SHADER_HEADER: &str = r#"
struct EffectUniforms {
    resolution: vec2<f32>,
    time: f32,
    strength: f32,
};

@group(0) @binding(0) var<uniform> fx: EffectUniforms;
@group(0) @binding(1) var frame_tex: texture_2d<f32>;
@group(0) @binding(2) var frame_sampler: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    var out: VertexOutput;
    let x = f32(i32(index) / 2) * 4.0 - 1.0;
    let y = f32(i32(index) % 2) * 4.0 - 1.0;
    out.position = vec4<f32>(x, y, 0.0, 1.0);
    out.uv = vec2<f32>((x + 1.0) * 0.5, (1.0 - y) * 0.5);
    return out;
}
"#;

/// Full WGSL source of one pass.
pub fn effect_shader(effect: Effect) -> String {
    let fragment = match effect {
        // Marks are small and saturated, so the halo samples a wide ring
        // with no brightness threshold.
        Effect::Glow => r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let texel = 1.0 / fx.resolution;
    let base = textureSample(frame_tex, frame_sampler, in.uv).rgb;

    var halo = vec3<f32>(0.0);
    var total = 0.0;
    for (var x = -5; x <= 5; x++) {
        for (var y = -5; y <= 5; y++) {
            let d2 = f32(x * x + y * y);
            let w = exp(-d2 / 12.0);
            let offset = vec2<f32>(f32(x), f32(y)) * texel * 3.0;
            halo += textureSample(frame_tex, frame_sampler, in.uv + offset).rgb * w;
            total += w;
        }
    }
    halo /= total;

    let color = base + halo * 0.6 * fx.strength;
    return vec4<f32>(min(color, vec3<f32>(1.0)), 1.0);
}
"#,
        Effect::Vignette => r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(frame_tex, frame_sampler, in.uv).rgb;
    let dist = distance(in.uv, vec2<f32>(0.5, 0.5)) * 1.4142;
    let shade = 1.0 - smoothstep(0.5, 1.25, dist) * 0.6 * fx.strength;
    return vec4<f32>(color * shade, 1.0);
}
"#,
        Effect::Grain => r#"
fn hash(p: vec2<f32>) -> f32 {
    var q = fract(vec3<f32>(p.x, p.y, p.x) * 0.1031);
    q += dot(q, vec3<f32>(q.y + 33.33, q.z + 33.33, q.x + 33.33));
    return fract((q.x + q.y) * q.z);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(frame_tex, frame_sampler, in.uv).rgb;
    let seed = in.uv * fx.resolution + vec2<f32>(fx.time * 997.0, fx.time * 613.0);
    let grain = (hash(seed) - 0.5) * 0.06 * fx.strength;
    return vec4<f32>(clamp(color + vec3<f32>(grain), vec3<f32>(0.0), vec3<f32>(1.0)), 1.0);
}
"#,
    };
    format!("{}{}", SHADER_HEADER, fragment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_expand_in_order() {
        assert_eq!(
            expand_effects(&["dreamy", "grain"]),
            vec![Effect::Glow, Effect::Vignette, Effect::Grain]
        );
    }

    #[test]
    fn none_disables_everything() {
        assert!(expand_effects(&["glow", "none", "grain"]).is_empty());
    }

    #[test]
    fn unknown_names_are_skipped() {
        assert_eq!(expand_effects(&["sparkle", " vignette "]), vec![Effect::Vignette]);
        assert!(expand_effects::<&str>(&[]).is_empty());
    }

    #[test]
    fn every_shader_has_both_entry_points() {
        for effect in [Effect::Glow, Effect::Vignette, Effect::Grain] {
            let src = effect_shader(effect);
            assert!(src.contains("fn vs_main"), "{}", effect);
            assert!(src.contains("fn fs_main"), "{}", effect);
        }
    }

    #[test]
    fn uniforms_fit_one_std140_block() {
        assert_eq!(std::mem::size_of::<EffectUniforms>(), 16);
    }
}
