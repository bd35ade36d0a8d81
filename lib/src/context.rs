//! Lazy, once-only initialization of the kernel device and of its backend.
//!
//! The device is opened the first time something needs it. If that fails, or if no backend
//! supports the device, the failure is remembered and every later call reports it again without
//! retrying. Display initialization is an optional second step: it is only attempted by callers
//! that need to scan out buffers, and its failure leaves the backend usable.
use std::os::unix::io::{AsFd, AsRawFd, RawFd};
use std::sync::{Arc, Mutex};

use log::{debug, error, info};
use nix::errno::Errno;

use crate::backend::{Backend, BackendTable};
use crate::device::{Card, DeviceConfig, KernelDevice};
use crate::error::{Error, Result};

/// Opens the kernel device when the context initializes.
pub type DeviceOpener = Box<dyn Fn() -> anyhow::Result<Arc<dyn KernelDevice>> + Send + Sync>;

#[derive(Debug, Clone)]
enum InitFailure {
    Unavailable,
    Unsupported(String),
}

impl From<InitFailure> for Error {
    fn from(failure: InitFailure) -> Self {
        match failure {
            InitFailure::Unavailable => Error::BackendUnavailable,
            InitFailure::Unsupported(driver) => Error::UnsupportedBackend(driver),
        }
    }
}

struct Ready {
    device: Arc<dyn KernelDevice>,
    backend: Arc<dyn Backend>,
    display_ready: bool,
}

enum State {
    Uninitialized,
    Ready(Ready),
    Failed(InitFailure),
}

/// The process-wide allocator context: the opened kernel device and the backend driving it.
pub struct DeviceContext {
    opener: DeviceOpener,
    backends: BackendTable,
    state: Mutex<State>,
}

impl DeviceContext {
    /// Creates a context that opens the card selected by `config`, with the default backend
    /// table.
    pub fn new(config: DeviceConfig) -> Self {
        DeviceContext::with_opener(
            move || {
                let card = Card::open_with_config(&config)?;
                info!("opened {}", card.path().display());
                Ok(Arc::new(card) as Arc<dyn KernelDevice>)
            },
            BackendTable::default(),
        )
    }

    /// Creates a context that obtains its device from `opener` and its backend from `backends`.
    pub fn with_opener<F>(opener: F, backends: BackendTable) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn KernelDevice>> + Send + Sync + 'static,
    {
        DeviceContext {
            opener: Box::new(opener),
            backends,
            state: Mutex::new(State::Uninitialized),
        }
    }

    fn initialize(&self) -> std::result::Result<Ready, InitFailure> {
        let device = (self.opener)().map_err(|e| {
            error!("failed to open DRM device: {:#}", e);
            InitFailure::Unavailable
        })?;

        let driver = device
            .version()
            .map_err(|e| {
                error!("invalid DRM device: {}", e);
                InitFailure::Unavailable
            })?
            .name;

        let backend = match self.backends.create(&driver, Arc::clone(&device)) {
            Some(Ok(backend)) => backend,
            Some(Err(e)) => {
                error!("failed to create backend for {}: {}", driver, e);
                return Err(InitFailure::Unavailable);
            }
            None => {
                error!("unsupported driver: {}", driver);
                return Err(InitFailure::Unsupported(driver));
            }
        };

        Ok(Ready {
            device,
            backend,
            display_ready: false,
        })
    }

    /// Makes sure the device is opened and a backend is bound to it, and if `need_display` is
    /// set, that the device can drive a display. Initialization happens at most once, even when
    /// called concurrently.
    pub fn ensure_ready(&self, need_display: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if let State::Uninitialized = *state {
            *state = match self.initialize() {
                Ok(ready) => State::Ready(ready),
                Err(failure) => State::Failed(failure),
            };
        }

        match &mut *state {
            State::Ready(ready) => {
                if need_display && !ready.display_ready {
                    let resources = ready.device.init_display().map_err(|e| {
                        error!("failed to initialize display: {}", e);
                        Error::DisplayInitFailed(e.into())
                    })?;
                    debug!("display initialized: {:?}", resources);
                    ready.display_ready = true;
                }
                Ok(())
            }
            State::Failed(failure) => Err(failure.clone().into()),
            State::Uninitialized => Err(Error::BackendUnavailable),
        }
    }

    fn with_ready<R>(&self, f: impl FnOnce(&Ready) -> R) -> Result<R> {
        self.ensure_ready(false)?;

        match &*self.state.lock().unwrap() {
            State::Ready(ready) => Ok(f(ready)),
            State::Failed(failure) => Err(failure.clone().into()),
            State::Uninitialized => Err(Error::BackendUnavailable),
        }
    }

    /// The backend bound to the device, initializing the context if needed.
    pub fn backend(&self) -> Result<Arc<dyn Backend>> {
        self.with_ready(|ready| Arc::clone(&ready.backend))
    }

    /// The opened kernel device, initializing the context if needed.
    pub fn device(&self) -> Result<Arc<dyn KernelDevice>> {
        self.with_ready(|ready| Arc::clone(&ready.device))
    }

    /// Whether display initialization already succeeded.
    pub fn display_ready(&self) -> bool {
        matches!(&*self.state.lock().unwrap(), State::Ready(ready) if ready.display_ready)
    }

    /// File descriptor of the device. It stays valid as long as the context lives.
    pub fn get_fd(&self) -> Result<RawFd> {
        self.with_ready(|ready| ready.device.as_fd().as_raw_fd())
    }

    pub fn get_auth_magic(&self) -> Result<u32> {
        self.device()?
            .get_magic()
            .map_err(|e| Error::Kernel(Errno::from(e)))
    }

    /// Authenticates the client that obtained `magic` on its own file descriptor.
    pub fn authenticate(&self, magic: u32) -> Result<()> {
        self.device()?
            .auth_magic(magic)
            .map_err(|e| Error::Kernel(Errno::from(e)))
    }

    pub fn acquire_master(&self) -> Result<()> {
        self.device()?
            .set_master()
            .map_err(|e| Error::Kernel(Errno::from(e)))
    }

    pub fn release_master(&self) -> Result<()> {
        self.device()?
            .drop_master()
            .map_err(|e| Error::Kernel(Errno::from(e)))
    }
}
