//! Windowed playback: winit event loop, glutin GL context, and the frame
//! clock driving the renderer at display refresh rate.

use std::ffi::CString;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context as _;
use glutin::config::ConfigTemplateBuilder;
use glutin::context::{ContextApi, ContextAttributesBuilder};
use glutin::display::GetGlDisplay;
use glutin::prelude::*;
use glutin::surface::{SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use glutin_winit::DisplayBuilder;
use raw_window_handle::HasRawWindowHandle;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};

use murale_core::{build_renderer, NullSoundPlayer, NullTextRasterizer, PlayerConfig, Vec2};

use crate::gl_backend::GlBackend;

pub fn run(config: PlayerConfig, root: PathBuf) -> anyhow::Result<()> {
    let event_loop = EventLoop::new().context("create event loop")?;
    let window_builder = winit::window::WindowBuilder::new()
        .with_title("murale")
        .with_inner_size(PhysicalSize::new(1280, 720));

    let template = ConfigTemplateBuilder::new().with_alpha_size(8).with_depth_size(0);
    let display_builder = DisplayBuilder::new().with_window_builder(Some(window_builder));

    let (window, gl_config) = display_builder
        .build(&event_loop, template, |configs| {
            configs
                .reduce(|a, b| {
                    use glutin::config::GlConfig as _;
                    if a.num_samples() > b.num_samples() {
                        a
                    } else {
                        b
                    }
                })
                .expect("at least one GL config")
        })
        .map_err(|err| anyhow::anyhow!("build GL display: {err}"))?;
    let window = window.context("no window created")?;

    let raw_window_handle = window.raw_window_handle();
    let gl_display = gl_config.display();

    // Legacy-dialect shaders want a compatibility context; take whatever
    // the driver offers.
    let context_attributes = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::OpenGl(None))
        .build(Some(raw_window_handle));
    let not_current = unsafe {
        gl_display
            .create_context(&gl_config, &context_attributes)
            .context("create GL context")?
    };

    let size = window.inner_size();
    let attrs = SurfaceAttributesBuilder::<WindowSurface>::new().build(
        raw_window_handle,
        NonZeroU32::new(size.width.max(1)).expect("non-zero width"),
        NonZeroU32::new(size.height.max(1)).expect("non-zero height"),
    );
    let gl_surface = unsafe {
        gl_display
            .create_window_surface(&gl_config, &attrs)
            .context("create window surface")?
    };
    let gl_context = not_current
        .make_current(&gl_surface)
        .context("make GL context current")?;
    gl_surface
        .set_swap_interval(&gl_context, SwapInterval::Wait(NonZeroU32::new(1).expect("one")))
        .ok();

    let gl = unsafe {
        glow::Context::from_loader_function(|s| {
            gl_display.get_proc_address(&CString::new(s).expect("proc name")) as *const _
        })
    };

    let mut backend = GlBackend::new(gl)?;
    let mut sound = NullSoundPlayer;
    let mut renderer = build_renderer(&mut backend, &config, &root, &mut sound)?;
    let mut text_raster = NullTextRasterizer;

    let start = Instant::now();
    let mut last_frame = Instant::now();
    let mut mouse = Vec2::ZERO;
    let mut debug_ui = config.debug_ui;
    let mut screen = (size.width.max(1), size.height.max(1));

    log::info!("starting frame loop");
    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(winit::event_loop::ControlFlow::Poll);
        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => elwt.exit(),
                WindowEvent::Resized(new_size) => {
                    screen = (new_size.width.max(1), new_size.height.max(1));
                    gl_surface.resize(
                        &gl_context,
                        NonZeroU32::new(screen.0).expect("non-zero width"),
                        NonZeroU32::new(screen.1).expect("non-zero height"),
                    );
                }
                WindowEvent::CursorMoved { position, .. } => {
                    mouse = Vec2::new(position.x, position.y);
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if event.state == ElementState::Pressed
                        && event.physical_key == PhysicalKey::Code(KeyCode::F8)
                    {
                        debug_ui = !debug_ui;
                        log::info!("debug overlay: {debug_ui}");
                    }
                }
                WindowEvent::RedrawRequested => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_frame).as_secs_f64();
                    last_frame = now;
                    let total_time = now.duration_since(start).as_secs_f64();

                    renderer.update_viewport(screen.0, screen.1);
                    renderer.update_mouse(mouse);
                    renderer.update(&mut backend, dt, total_time, &mut text_raster);
                    renderer.render(&mut backend, total_time, screen.0, screen.1);

                    if let Err(err) = gl_surface.swap_buffers(&gl_context) {
                        log::warn!("swap buffers failed: {err}");
                    }
                }
                _ => {}
            },
            Event::AboutToWait => {
                window.request_redraw();
            }
            _ => {}
        }
    })?;

    Ok(())
}
