//! Access to the DRM kernel device the buffers are allocated from.
use std::fs;
use std::os::unix::io::{AsFd, BorrowedFd, FromRawFd, OwnedFd};
use std::path::{Path, PathBuf};

use log::debug;
use nix::errno::Errno;
use thiserror::Error;

use crate::ioctl::{self, AuthError, CardResources, MasterError, ModeError, Version, VersionError};
use crate::{DrmFourcc, PlaneLayout};

/// Operations the allocator performs on the kernel device. Every method has a default
/// implementation issuing the corresponding ioctl on the device's file descriptor.
pub trait KernelDevice: AsFd + Send + Sync {
    /// Version and driver name of the kernel module behind the device.
    fn version(&self) -> Result<Version, VersionError> {
        ioctl::version(&self.as_fd())
    }

    fn get_magic(&self) -> Result<u32, AuthError> {
        ioctl::get_magic(&self.as_fd())
    }

    fn auth_magic(&self, magic: u32) -> Result<(), AuthError> {
        ioctl::auth_magic(&self.as_fd(), magic)
    }

    fn set_master(&self) -> Result<(), MasterError> {
        ioctl::set_master(&self.as_fd())
    }

    fn drop_master(&self) -> Result<(), MasterError> {
        ioctl::drop_master(&self.as_fd())
    }

    /// Checks that the device can drive a display at all.
    fn init_display(&self) -> Result<CardResources, ModeError> {
        let resources = ioctl::get_resources(&self.as_fd())?;
        if resources.count_crtcs == 0 {
            return Err(ModeError::NoCrtc);
        }

        Ok(resources)
    }

    /// Creates a scanout framebuffer over the memory described by `layout` and returns its id.
    fn add_framebuffer(
        &self,
        width: u32,
        height: u32,
        format: DrmFourcc,
        layout: &PlaneLayout,
    ) -> Result<u32, ModeError> {
        ioctl::add_fb2(&self.as_fd(), width, height, format, layout)
    }

    fn remove_framebuffer(&self, fb_id: u32) -> Result<(), ModeError> {
        ioctl::rm_fb(&self.as_fd(), fb_id)
    }
}

const DEFAULT_CARD: &str = "/dev/dri/card0";
const PROC_FB: &str = "/proc/fb";
const MAX_CARDS: usize = 16;

/// Kernel drivers behind the framebuffer emulation drivers listed in `/proc/fb`.
pub(crate) const FB_DRIVERS: &[(&str, &str)] = &[
    ("amdgpudrmfb", "amdgpu"),
    ("inteldrmfb", "i915"),
    ("nouveaufb", "nouveau"),
    ("radeondrmfb", "radeon"),
    ("svgadrmfb", "vmwgfx"),
    ("virtiodrmfb", "virtio_gpu"),
];

/// How to find the device node to open.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    path: PathBuf,
    probe_fb: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            path: PathBuf::from(DEFAULT_CARD),
            probe_fb: false,
        }
    }
}

impl DeviceConfig {
    pub fn new() -> Self {
        Default::default()
    }

    /// Opens `path` instead of the first card.
    pub fn path<P: Into<PathBuf>>(self, path: P) -> Self {
        DeviceConfig {
            path: path.into(),
            ..self
        }
    }

    /// Picks the card driving the first framebuffer listed in `/proc/fb` instead of opening a
    /// fixed path.
    pub fn probe_fb(self) -> Self {
        DeviceConfig {
            probe_fb: true,
            ..self
        }
    }
}

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("failed to open {0}: {1}")]
    Open(PathBuf, Errno),
    #[error("failed to read /proc/fb: {0}")]
    ProcFb(#[from] std::io::Error),
    #[error("no framebuffer listed in /proc/fb")]
    NoFramebuffer,
    #[error("no DRM driver known for framebuffer {0}")]
    UnknownFramebuffer(String),
    #[error("no card driven by {0}")]
    NoMatchingCard(String),
}

/// An opened DRM card node.
#[derive(Debug)]
pub struct Card {
    fd: OwnedFd,
    path: PathBuf,
}

impl Card {
    /// Opens the card node at `path`.
    pub fn open(path: &Path) -> Result<Self, OpenError> {
        use nix::fcntl::{open, OFlag};
        use nix::sys::stat::Mode;

        let fd = open(path, OFlag::O_RDWR | OFlag::O_CLOEXEC, Mode::empty())
            .map_err(|e| OpenError::Open(path.to_path_buf(), e))?;

        Ok(Card {
            // Safe because `open` just returned this descriptor and nothing else owns it.
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
            path: path.to_path_buf(),
        })
    }

    /// Opens the card selected by `config`.
    pub fn open_with_config(config: &DeviceConfig) -> Result<Self, OpenError> {
        if !config.probe_fb {
            return Card::open(&config.path);
        }

        let proc_fb = fs::read_to_string(PROC_FB)?;
        let fb_name = first_framebuffer(&proc_fb).ok_or(OpenError::NoFramebuffer)?;
        let driver = driver_for_framebuffer(fb_name)
            .ok_or_else(|| OpenError::UnknownFramebuffer(fb_name.to_string()))?;

        (0..MAX_CARDS)
            .filter_map(|i| Card::open(&PathBuf::from(format!("/dev/dri/card{}", i))).ok())
            .find(|card| match card.version() {
                Ok(version) => version.name == driver,
                Err(_) => false,
            })
            .map(|card| {
                debug!("{} drives {} at {}", driver, fb_name, card.path.display());
                card
            })
            .ok_or_else(|| OpenError::NoMatchingCard(driver.to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl KernelDevice for Card {}

/// Name of the first framebuffer in the contents of `/proc/fb`, whose lines read
/// `<index> <name>`.
fn first_framebuffer(proc_fb: &str) -> Option<&str> {
    proc_fb.lines().next()?.split_whitespace().nth(1)
}

fn driver_for_framebuffer(fb_name: &str) -> Option<&'static str> {
    FB_DRIVERS
        .iter()
        .find(|(fb, _)| *fb == fb_name)
        .map(|(_, driver)| *driver)
}
