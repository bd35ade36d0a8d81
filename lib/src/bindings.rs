#![allow(dead_code)]
#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(clippy::all)]

use nix::libc::{c_char, c_int};

pub const DRM_IOCTL_BASE: u8 = b'd';

pub const DRM_IOCTL_NR_VERSION: u8 = 0x00;
pub const DRM_IOCTL_NR_GET_MAGIC: u8 = 0x02;
pub const DRM_IOCTL_NR_GEM_CLOSE: u8 = 0x09;
pub const DRM_IOCTL_NR_GEM_FLINK: u8 = 0x0a;
pub const DRM_IOCTL_NR_GEM_OPEN: u8 = 0x0b;
pub const DRM_IOCTL_NR_AUTH_MAGIC: u8 = 0x11;
pub const DRM_IOCTL_NR_SET_MASTER: u8 = 0x1e;
pub const DRM_IOCTL_NR_DROP_MASTER: u8 = 0x1f;
pub const DRM_IOCTL_NR_PRIME_FD_TO_HANDLE: u8 = 0x2e;
pub const DRM_IOCTL_NR_MODE_GETRESOURCES: u8 = 0xa0;
pub const DRM_IOCTL_NR_MODE_RMFB: u8 = 0xaf;
pub const DRM_IOCTL_NR_MODE_CREATE_DUMB: u8 = 0xb2;
pub const DRM_IOCTL_NR_MODE_MAP_DUMB: u8 = 0xb3;
pub const DRM_IOCTL_NR_MODE_DESTROY_DUMB: u8 = 0xb4;
pub const DRM_IOCTL_NR_MODE_ADDFB2: u8 = 0xb8;

pub type drm_magic_t = u32;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct drm_version {
    pub version_major: c_int,
    pub version_minor: c_int,
    pub version_patchlevel: c_int,
    pub name_len: usize,
    pub name: *mut c_char,
    pub date_len: usize,
    pub date: *mut c_char,
    pub desc_len: usize,
    pub desc: *mut c_char,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct drm_auth {
    pub magic: drm_magic_t,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct drm_gem_close {
    pub handle: u32,
    pub pad: u32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct drm_gem_flink {
    pub handle: u32,
    pub name: u32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct drm_gem_open {
    pub name: u32,
    pub handle: u32,
    pub size: u64,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct drm_prime_handle {
    pub handle: u32,
    pub flags: u32,
    pub fd: i32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct drm_mode_card_res {
    pub fb_id_ptr: u64,
    pub crtc_id_ptr: u64,
    pub connector_id_ptr: u64,
    pub encoder_id_ptr: u64,
    pub count_fbs: u32,
    pub count_crtcs: u32,
    pub count_connectors: u32,
    pub count_encoders: u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct drm_mode_fb_cmd2 {
    pub fb_id: u32,
    pub width: u32,
    pub height: u32,
    pub pixel_format: u32,
    pub flags: u32,
    pub handles: [u32; 4],
    pub pitches: [u32; 4],
    pub offsets: [u32; 4],
    pub modifier: [u64; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct drm_mode_create_dumb {
    pub height: u32,
    pub width: u32,
    pub bpp: u32,
    pub flags: u32,
    pub handle: u32,
    pub pitch: u32,
    pub size: u64,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct drm_mode_map_dumb {
    pub handle: u32,
    pub pad: u32,
    pub offset: u64,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct drm_mode_destroy_dumb {
    pub handle: u32,
}
