//! Allocates a buffer on a DRM card, fills it through a CPU lock, and frees it.
//!
//! The card is `/dev/dri/card0` by default. Use `--probe_fb` to pick the card driving the
//! first framebuffer instead, or give the path of a card node.
use std::ptr::NonNull;

use anyhow::{anyhow, ensure, Context};
use clap::{App, Arg};
use log::info;

use grallocr::{DeviceConfig, Gralloc, PixelFormat, Usage};

fn parse_size(s: &str) -> anyhow::Result<(u32, u32)> {
    let (width, height) = s
        .split_once('x')
        .ok_or_else(|| anyhow!("invalid frame size {}", s))?;

    Ok((width.parse()?, height.parse()?))
}

fn parse_format(s: &str) -> anyhow::Result<PixelFormat> {
    Ok(match s {
        "rgba8888" => PixelFormat::Rgba8888,
        "rgbx8888" => PixelFormat::Rgbx8888,
        "bgra8888" => PixelFormat::Bgra8888,
        "rgb565" => PixelFormat::Rgb565,
        "nv12" => PixelFormat::YCbCr_420_888,
        _ => return Err(anyhow!("unsupported format {}", s)),
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = App::new("gralloc allocation test")
        .arg(
            Arg::with_name("device")
                .required(false)
                .help("Path to the DRM card node"),
        )
        .arg(
            Arg::with_name("probe_fb")
                .long("probe_fb")
                .help("Use the card driving the first framebuffer in /proc/fb"),
        )
        .arg(
            Arg::with_name("frame_size")
                .long("frame_size")
                .takes_value(true)
                .default_value("640x480")
                .help("Size of the buffer to allocate (e.g. \"640x480\")"),
        )
        .arg(
            Arg::with_name("format")
                .long("format")
                .takes_value(true)
                .default_value("rgba8888")
                .help("Pixel format (rgba8888, rgbx8888, bgra8888, rgb565 or nv12)"),
        )
        .arg(
            Arg::with_name("scanout")
                .long("scanout")
                .help("Also attach the buffer to a scanout framebuffer"),
        )
        .get_matches();

    let mut config = DeviceConfig::new();
    if let Some(path) = matches.value_of("device") {
        config = config.path(path);
    }
    if matches.is_present("probe_fb") {
        config = config.probe_fb();
    }

    let (width, height) = parse_size(matches.value_of("frame_size").unwrap_or("640x480"))?;
    ensure!(width > 0 && height > 0, "frame size cannot be empty");
    let format = parse_format(matches.value_of("format").unwrap_or("rgba8888"))?;
    let mut usage = Usage::SW_READ_OFTEN | Usage::SW_WRITE_OFTEN | Usage::HW_TEXTURE;
    if matches.is_present("scanout") {
        usage |= Usage::HW_FB;
    }

    let gralloc = Gralloc::open(config);
    gralloc
        .context()
        .ensure_ready(usage.needs_framebuffer())
        .context("failed to initialize device")?;

    let (handle, stride) = gralloc.bo_create(width, height, format as i32, usage)?;
    info!(
        "allocated {}x{} {:?} buffer {:?}, stride {} pixels",
        width, height, format, handle.memory, stride
    );
    if let Some(layout) = gralloc.resolve_planes(&handle)? {
        info!("plane pitches {:?}, offsets {:?}", layout.pitches, layout.offsets);
    }

    let region = grallocr::Rect::new(0, 0, width, height);
    let addr: NonNull<u8> = gralloc
        .bo_lock(&handle, Usage::SW_WRITE_OFTEN, region)?
        .ok_or_else(|| anyhow!("buffer was not mapped"))?;

    let len = handle.stride as usize * height as usize;
    // Safe because the buffer is locked for writing and holds at least `height` lines.
    let pixels = unsafe { std::slice::from_raw_parts_mut(addr.as_ptr(), len) };
    for (i, line) in pixels.chunks_mut(handle.stride as usize).enumerate() {
        line.fill((i % 256) as u8);
    }
    gralloc.bo_unlock(&handle);

    let addr = gralloc
        .bo_lock(&handle, Usage::SW_READ_OFTEN, region)?
        .ok_or_else(|| anyhow!("buffer was not mapped"))?;
    // Safe because the buffer is locked for reading.
    let last = unsafe { *addr.as_ptr().add(len - 1) };
    ensure!(
        last == ((height - 1) % 256) as u8,
        "read back {} from the last line",
        last
    );
    gralloc.bo_unlock(&handle);

    gralloc.bo_decref_local(&handle)?;
    println!("Buffer test passed");

    Ok(())
}
