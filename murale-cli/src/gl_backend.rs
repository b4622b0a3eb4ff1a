//! OpenGL implementation of the core `RenderBackend`, driven through
//! `glow`. Quads are batched one at a time through a dynamic vertex buffer;
//! effect shaders receive the engine's standard `mvp` uniform at draw time,
//! overriding whatever matrix the pass uploaded earlier.

use glow::HasContext;

use murale_core::{
    BlendMode, MuraleError, MuraleResult, Rect, RenderBackend, ScissorRect, ShaderHandle,
    TargetHandle, TexImage, TextureHandle, Tint, UniformLocation, UniformValue, WrapMode,
};

const BLIT_VERTEX: &str = r#"#version 120
attribute vec3 vertexPosition;
attribute vec2 vertexTexCoord;
varying vec2 fragTexCoord;
uniform mat4 mvp;
void main() {
    fragTexCoord = vertexTexCoord;
    gl_Position = mvp * vec4(vertexPosition, 1.0);
}
"#;

const BLIT_FRAGMENT: &str = r#"#version 120
varying vec2 fragTexCoord;
uniform sampler2D texture0;
uniform vec4 u_tint;
void main() {
    gl_FragColor = texture2D(texture0, fragTexCoord) * u_tint;
}
"#;

struct GlTexture {
    tex: glow::NativeTexture,
    width: u32,
    height: u32,
}

struct GlTarget {
    fbo: glow::NativeFramebuffer,
    texture: TextureHandle,
}

struct GlProgram {
    program: glow::NativeProgram,
    pos_attrib: Option<u32>,
    tex_attrib: Option<u32>,
    mvp: Option<glow::NativeUniformLocation>,
    locations: Vec<glow::NativeUniformLocation>,
}

pub struct GlBackend {
    gl: glow::Context,
    textures: Vec<GlTexture>,
    targets: Vec<Option<GlTarget>>,
    programs: Vec<GlProgram>,
    blit: usize,
    blit_tint: Option<glow::NativeUniformLocation>,
    blit_sampler: Option<glow::NativeUniformLocation>,
    vbo: glow::NativeBuffer,
    screen: (u32, u32),
    current_target: Option<TargetHandle>,
    active_shader: Option<ShaderHandle>,
    blend: BlendMode,
}

impl GlBackend {
    pub fn new(gl: glow::Context) -> MuraleResult<Self> {
        let vbo = unsafe { gl.create_buffer() }
            .map_err(|err| MuraleError::gpu(format!("create vertex buffer: {err}")))?;

        let mut backend = Self {
            gl,
            textures: Vec::new(),
            targets: Vec::new(),
            programs: Vec::new(),
            blit: 0,
            blit_tint: None,
            blit_sampler: None,
            vbo,
            screen: (1, 1),
            current_target: None,
            active_shader: None,
            blend: BlendMode::Alpha,
        };

        let blit = backend.compile_shader(BLIT_VERTEX, BLIT_FRAGMENT)?;
        backend.blit = blit.0 as usize;
        backend.blit_tint = unsafe {
            backend
                .gl
                .get_uniform_location(backend.programs[backend.blit].program, "u_tint")
        };
        backend.blit_sampler = unsafe {
            backend
                .gl
                .get_uniform_location(backend.programs[backend.blit].program, "texture0")
        };

        unsafe {
            backend.gl.enable(glow::BLEND);
            backend.gl.disable(glow::DEPTH_TEST);
        }
        Ok(backend)
    }

    fn dest_size(&self) -> (u32, u32) {
        match self.current_target {
            Some(target) => {
                let tex = self.targets[target.0 as usize]
                    .as_ref()
                    .expect("live target")
                    .texture;
                let t = &self.textures[tex.0 as usize];
                (t.width, t.height)
            }
            None => self.screen,
        }
    }

    /// Column-major orthographic projection. The default framebuffer uses a
    /// top-left origin; render targets use a bottom-left origin, which is
    /// what makes their textures read back flipped.
    fn ortho(&self) -> [f32; 16] {
        let (w, h) = self.dest_size();
        let (w, h) = (w.max(1) as f32, h.max(1) as f32);
        let (top, bottom) = if self.current_target.is_some() {
            (h, 0.0)
        } else {
            (0.0, h)
        };
        let (left, right) = (0.0_f32, w);
        let (near, far) = (-1.0_f32, 1.0_f32);
        [
            2.0 / (right - left),
            0.0,
            0.0,
            0.0,
            0.0,
            2.0 / (top - bottom),
            0.0,
            0.0,
            0.0,
            0.0,
            -2.0 / (far - near),
            0.0,
            -(right + left) / (right - left),
            -(top + bottom) / (top - bottom),
            -(far + near) / (far - near),
            1.0,
        ]
    }

    fn apply_blend(&self) {
        unsafe {
            match self.blend {
                BlendMode::Alpha => self
                    .gl
                    .blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA),
                BlendMode::Additive => self.gl.blend_func(glow::SRC_ALPHA, glow::ONE),
            }
        }
    }

    fn set_native_uniform(&self, location: &glow::NativeUniformLocation, value: &UniformValue) {
        let gl = &self.gl;
        unsafe {
            match value {
                UniformValue::Float(v) => gl.uniform_1_f32(Some(location), *v),
                UniformValue::Vec2(v) => gl.uniform_2_f32(Some(location), v[0], v[1]),
                UniformValue::Vec3(v) => gl.uniform_3_f32(Some(location), v[0], v[1], v[2]),
                UniformValue::Vec4(v) => {
                    gl.uniform_4_f32(Some(location), v[0], v[1], v[2], v[3])
                }
                UniformValue::IdentityMatrix => {
                    let identity = [
                        1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0,
                        0.0, 1.0,
                    ];
                    gl.uniform_matrix_4_f32_slice(Some(location), false, &identity);
                }
                UniformValue::Sampler(unit) => gl.uniform_1_i32(Some(location), *unit),
            }
        }
    }
}

impl RenderBackend for GlBackend {
    fn create_texture(&mut self, image: &TexImage, wrap: WrapMode) -> MuraleResult<TextureHandle> {
        let gl = &self.gl;
        let tex = unsafe { gl.create_texture() }
            .map_err(|err| MuraleError::gpu(format!("create texture: {err}")))?;
        let wrap_mode = match wrap {
            WrapMode::Clamp => glow::CLAMP_TO_EDGE,
            WrapMode::Repeat => glow::REPEAT,
        } as i32;
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(tex));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, wrap_mode);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, wrap_mode);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                image.width as i32,
                image.height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(Some(&image.rgba)),
            );
            gl.bind_texture(glow::TEXTURE_2D, None);
        }
        self.textures.push(GlTexture {
            tex,
            width: image.width,
            height: image.height,
        });
        Ok(TextureHandle(self.textures.len() as u32 - 1))
    }

    fn texture_size(&self, texture: TextureHandle) -> (u32, u32) {
        let t = &self.textures[texture.0 as usize];
        (t.width, t.height)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(t) = self.textures.get_mut(texture.0 as usize) {
            unsafe { self.gl.delete_texture(t.tex) };
            t.width = 0;
            t.height = 0;
        }
    }

    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        wrap: WrapMode,
    ) -> MuraleResult<TargetHandle> {
        let texture = self.create_texture(
            &TexImage {
                width,
                height,
                rgba: vec![0; (width * height * 4) as usize],
            },
            wrap,
        )?;
        let gl = &self.gl;
        let fbo = unsafe { gl.create_framebuffer() }
            .map_err(|err| MuraleError::gpu(format!("create framebuffer: {err}")))?;
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(self.textures[texture.0 as usize].tex),
                0,
            );
            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            if status != glow::FRAMEBUFFER_COMPLETE {
                return Err(MuraleError::gpu(format!(
                    "framebuffer incomplete: 0x{status:x}"
                )));
            }
        }
        self.targets.push(Some(GlTarget { fbo, texture }));
        Ok(TargetHandle(self.targets.len() as u32 - 1))
    }

    fn target_texture(&self, target: TargetHandle) -> TextureHandle {
        self.targets[target.0 as usize]
            .as_ref()
            .expect("live target")
            .texture
    }

    fn destroy_render_target(&mut self, target: TargetHandle) {
        if let Some(slot) = self.targets.get_mut(target.0 as usize) {
            if let Some(gl_target) = slot.take() {
                unsafe { self.gl.delete_framebuffer(gl_target.fbo) };
                let tex = gl_target.texture;
                self.destroy_texture(tex);
            }
        }
    }

    fn compile_shader(&mut self, vertex: &str, fragment: &str) -> MuraleResult<ShaderHandle> {
        let gl = &self.gl;
        let compile = |kind: u32, source: &str| -> MuraleResult<glow::NativeShader> {
            unsafe {
                let shader = gl
                    .create_shader(kind)
                    .map_err(|err| MuraleError::gpu(format!("create shader: {err}")))?;
                gl.shader_source(shader, source);
                gl.compile_shader(shader);
                if !gl.get_shader_compile_status(shader) {
                    let info = gl.get_shader_info_log(shader);
                    gl.delete_shader(shader);
                    return Err(MuraleError::gpu(format!("shader compile failed: {info}")));
                }
                Ok(shader)
            }
        };
        unsafe {
            let vs = compile(glow::VERTEX_SHADER, vertex)?;
            let fs = match compile(glow::FRAGMENT_SHADER, fragment) {
                Ok(fs) => fs,
                Err(err) => {
                    gl.delete_shader(vs);
                    return Err(err);
                }
            };

            let program = gl
                .create_program()
                .map_err(|err| MuraleError::gpu(format!("create program: {err}")))?;
            gl.attach_shader(program, vs);
            gl.attach_shader(program, fs);
            gl.link_program(program);
            gl.delete_shader(vs);
            gl.delete_shader(fs);
            if !gl.get_program_link_status(program) {
                let info = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(MuraleError::gpu(format!("program link failed: {info}")));
            }

            let pos_attrib = gl.get_attrib_location(program, "vertexPosition");
            let tex_attrib = gl.get_attrib_location(program, "vertexTexCoord");
            let mvp = gl.get_uniform_location(program, "mvp");

            self.programs.push(GlProgram {
                program,
                pos_attrib,
                tex_attrib,
                mvp,
                locations: Vec::new(),
            });
        }
        Ok(ShaderHandle(self.programs.len() as u32 - 1))
    }

    fn resolve_uniform(&mut self, shader: ShaderHandle, name: &str) -> Option<UniformLocation> {
        let program = self.programs.get_mut(shader.0 as usize)?;
        let location = unsafe { self.gl.get_uniform_location(program.program, name) }?;
        program.locations.push(location);
        Some(UniformLocation(program.locations.len() as i32 - 1))
    }

    fn set_uniform(
        &mut self,
        shader: ShaderHandle,
        location: UniformLocation,
        value: &UniformValue,
    ) {
        let Some(program) = self.programs.get(shader.0 as usize) else {
            return;
        };
        let Some(native) = program.locations.get(location.0 as usize).cloned() else {
            return;
        };
        self.set_native_uniform(&native, value);
    }

    fn bind_texture_slot(&mut self, slot: u32, texture: TextureHandle) {
        let Some(t) = self.textures.get(texture.0 as usize) else {
            return;
        };
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + slot);
            self.gl.bind_texture(glow::TEXTURE_2D, Some(t.tex));
            self.gl.active_texture(glow::TEXTURE0);
        }
    }

    fn begin_frame(&mut self, screen_width: u32, screen_height: u32) {
        self.screen = (screen_width.max(1), screen_height.max(1));
        self.current_target = None;
        self.active_shader = None;
        self.blend = BlendMode::Alpha;
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            self.gl
                .viewport(0, 0, self.screen.0 as i32, self.screen.1 as i32);
            self.gl.disable(glow::SCISSOR_TEST);
        }
    }

    fn end_frame(&mut self) {}

    fn clear(&mut self, rgba: Tint) {
        unsafe {
            self.gl.clear_color(rgba[0], rgba[1], rgba[2], rgba[3]);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn begin_scissor(&mut self, rect: ScissorRect) {
        // GL scissor rectangles are bottom-left anchored.
        let (_, screen_h) = self.screen;
        unsafe {
            self.gl.enable(glow::SCISSOR_TEST);
            self.gl.scissor(
                rect.x,
                screen_h as i32 - rect.y - rect.h,
                rect.w.max(0),
                rect.h.max(0),
            );
        }
    }

    fn end_scissor(&mut self) {
        unsafe { self.gl.disable(glow::SCISSOR_TEST) };
    }

    fn begin_target(&mut self, target: TargetHandle) {
        let Some(gl_target) = self.targets[target.0 as usize].as_ref() else {
            return;
        };
        let fbo = gl_target.fbo;
        self.current_target = Some(target);
        let (w, h) = self.dest_size();
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
            self.gl.viewport(0, 0, w as i32, h as i32);
        }
    }

    fn end_target(&mut self) {
        self.current_target = None;
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            self.gl
                .viewport(0, 0, self.screen.0 as i32, self.screen.1 as i32);
        }
    }

    fn begin_shader(&mut self, shader: ShaderHandle) {
        if let Some(program) = self.programs.get(shader.0 as usize) {
            unsafe { self.gl.use_program(Some(program.program)) };
            self.active_shader = Some(shader);
        }
    }

    fn end_shader(&mut self) {
        unsafe { self.gl.use_program(None) };
        self.active_shader = None;
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend = mode;
    }

    fn draw_textured(
        &mut self,
        texture: TextureHandle,
        src: Rect,
        dst: Rect,
        pivot: (f64, f64),
        rotation_deg: f64,
        tint: Tint,
    ) {
        let Some(t) = self.textures.get(texture.0 as usize) else {
            return;
        };
        if t.width == 0 || t.height == 0 || dst.w <= 0.0 || dst.h <= 0.0 {
            return;
        }

        let program_idx = self
            .active_shader
            .map(|s| s.0 as usize)
            .unwrap_or(self.blit);
        let program = &self.programs[program_idx];

        // Texture-space rectangle; negative src height flips V.
        let (tw, th) = (t.width as f64, t.height as f64);
        let u0 = (src.x / tw) as f32;
        let u1 = ((src.x + src.w) / tw) as f32;
        let (v0, v1) = if src.h < 0.0 {
            (
                ((src.y.max(0.0) + src.h.abs()) / th) as f32,
                (src.y.max(0.0) / th) as f32,
            )
        } else {
            (
                (src.y / th) as f32,
                ((src.y + src.h) / th) as f32,
            )
        };

        // Quad corners rotated around the pivot point at (dst.x, dst.y).
        let rad = rotation_deg.to_radians();
        let (sin, cos) = rad.sin_cos();
        let corner = |lx: f64, ly: f64| -> [f32; 2] {
            let ox = lx - pivot.0;
            let oy = ly - pivot.1;
            [
                (dst.x + ox * cos - oy * sin) as f32,
                (dst.y + ox * sin + oy * cos) as f32,
            ]
        };
        let p00 = corner(0.0, 0.0);
        let p10 = corner(dst.w, 0.0);
        let p11 = corner(dst.w, dst.h);
        let p01 = corner(0.0, dst.h);

        #[rustfmt::skip]
        let vertices: [f32; 30] = [
            p00[0], p00[1], 0.0, u0, v0,
            p10[0], p10[1], 0.0, u1, v0,
            p11[0], p11[1], 0.0, u1, v1,
            p00[0], p00[1], 0.0, u0, v0,
            p11[0], p11[1], 0.0, u1, v1,
            p01[0], p01[1], 0.0, u0, v1,
        ];

        self.apply_blend();

        let gl = &self.gl;
        unsafe {
            let using_blit = self.active_shader.is_none();
            if using_blit {
                gl.use_program(Some(program.program));
                if let Some(loc) = &self.blit_sampler {
                    gl.uniform_1_i32(Some(loc), 0);
                }
                if let Some(loc) = &self.blit_tint {
                    gl.uniform_4_f32(Some(loc), tint[0], tint[1], tint[2], tint[3]);
                }
                gl.active_texture(glow::TEXTURE0);
                gl.bind_texture(glow::TEXTURE_2D, Some(t.tex));
            }

            if let Some(mvp) = &program.mvp {
                gl.uniform_matrix_4_f32_slice(Some(mvp), false, &self.ortho());
            }

            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                float_bytes(&vertices),
                glow::STREAM_DRAW,
            );

            let stride = 5 * std::mem::size_of::<f32>() as i32;
            if let Some(pos) = program.pos_attrib {
                gl.enable_vertex_attrib_array(pos);
                gl.vertex_attrib_pointer_f32(pos, 3, glow::FLOAT, false, stride, 0);
            }
            if let Some(tex_coord) = program.tex_attrib {
                gl.enable_vertex_attrib_array(tex_coord);
                gl.vertex_attrib_pointer_f32(tex_coord, 2, glow::FLOAT, false, stride, 12);
            }

            gl.draw_arrays(glow::TRIANGLES, 0, 6);

            if let Some(pos) = program.pos_attrib {
                gl.disable_vertex_attrib_array(pos);
            }
            if let Some(tex_coord) = program.tex_attrib {
                gl.disable_vertex_attrib_array(tex_coord);
            }
            gl.bind_buffer(glow::ARRAY_BUFFER, None);

            if using_blit {
                gl.use_program(None);
            }
        }
    }
}

fn float_bytes(floats: &[f32; 30]) -> &[u8] {
    // Plain f32 slab; layout is guaranteed.
    unsafe {
        std::slice::from_raw_parts(floats.as_ptr().cast::<u8>(), std::mem::size_of_val(floats))
    }
}
