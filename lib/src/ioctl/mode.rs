//! Safe wrappers for the few mode-setting ioctls the allocator needs: probing the display
//! subsystem, and attaching buffers to (or detaching them from) scanout framebuffers.
use std::os::unix::io::{AsFd, AsRawFd};

use nix::errno::Errno;
use thiserror::Error;

use crate::{bindings, DrmFourcc, PlaneLayout};

#[doc(hidden)]
mod ioctl {
    use crate::bindings::*;
    nix::ioctl_readwrite!(
        drm_ioctl_mode_getresources,
        DRM_IOCTL_BASE,
        DRM_IOCTL_NR_MODE_GETRESOURCES,
        drm_mode_card_res
    );
    nix::ioctl_readwrite!(
        drm_ioctl_mode_addfb2,
        DRM_IOCTL_BASE,
        DRM_IOCTL_NR_MODE_ADDFB2,
        drm_mode_fb_cmd2
    );
    nix::ioctl_readwrite!(drm_ioctl_mode_rmfb, DRM_IOCTL_BASE, DRM_IOCTL_NR_MODE_RMFB, u32);
}

/// Counts and limits reported by `DRM_IOCTL_MODE_GETRESOURCES`. The object ids themselves are
/// not retrieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CardResources {
    pub count_fbs: u32,
    pub count_crtcs: u32,
    pub count_connectors: u32,
    pub count_encoders: u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

impl From<bindings::drm_mode_card_res> for CardResources {
    fn from(res: bindings::drm_mode_card_res) -> Self {
        CardResources {
            count_fbs: res.count_fbs,
            count_crtcs: res.count_crtcs,
            count_connectors: res.count_connectors,
            count_encoders: res.count_encoders,
            min_width: res.min_width,
            max_width: res.max_width,
            min_height: res.min_height,
            max_height: res.max_height,
        }
    }
}

#[derive(Debug, Error)]
pub enum ModeError {
    #[error("ioctl error: {0}")]
    IoctlError(#[from] Errno),
    #[error("device has no CRTC to scan out from")]
    NoCrtc,
}

impl From<ModeError> for Errno {
    fn from(err: ModeError) -> Self {
        match err {
            ModeError::IoctlError(e) => e,
            ModeError::NoCrtc => Errno::ENODEV,
        }
    }
}

/// Safe wrapper around the `DRM_IOCTL_MODE_GETRESOURCES` ioctl. Fails with `EOPNOTSUPP` or
/// `EINVAL` on render-only devices.
pub fn get_resources(fd: &impl AsFd) -> Result<CardResources, ModeError> {
    let mut res = bindings::drm_mode_card_res::default();

    unsafe { ioctl::drm_ioctl_mode_getresources(fd.as_fd().as_raw_fd(), &mut res) }?;

    Ok(CardResources::from(res))
}

/// Safe wrapper around the `DRM_IOCTL_MODE_ADDFB2` ioctl. Returns the id of the new framebuffer.
pub fn add_fb2(
    fd: &impl AsFd,
    width: u32,
    height: u32,
    format: DrmFourcc,
    layout: &PlaneLayout,
) -> Result<u32, ModeError> {
    let mut cmd = bindings::drm_mode_fb_cmd2 {
        width,
        height,
        pixel_format: format.to_u32(),
        handles: layout.handles,
        pitches: layout.pitches,
        offsets: layout.offsets,
        ..Default::default()
    };

    unsafe { ioctl::drm_ioctl_mode_addfb2(fd.as_fd().as_raw_fd(), &mut cmd) }?;

    Ok(cmd.fb_id)
}

/// Safe wrapper around the `DRM_IOCTL_MODE_RMFB` ioctl.
pub fn rm_fb(fd: &impl AsFd, fb_id: u32) -> Result<(), ModeError> {
    let mut id = fb_id;

    unsafe { ioctl::drm_ioctl_mode_rmfb(fd.as_fd().as_raw_fd(), &mut id) }?;

    Ok(())
}
