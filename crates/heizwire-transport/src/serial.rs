use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::Read;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::source::ByteSource;

/// Where the device lives and how fast it talks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device node, e.g. `/dev/ttyUSB0`.
    pub location: PathBuf,
    /// Line speed in baud.
    pub baud_rate: u32,
}

impl SerialConfig {
    pub fn new(location: impl Into<PathBuf>, baud_rate: u32) -> Self {
        Self {
            location: location.into(),
            baud_rate,
        }
    }
}

/// A serial device in raw mode, read without blocking the runtime.
///
/// The descriptor is opened `O_NONBLOCK | O_NOCTTY` and registered with the
/// tokio reactor, so a pending read is aborted simply by dropping it.
pub struct SerialDevice {
    fd: AsyncFd<File>,
    id: String,
    config: SerialConfig,
}

impl SerialDevice {
    /// Open and configure the device described by `config`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let speed = speed_for(config.baud_rate)?;
        let path = config.location.clone();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(&path)
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;

        configure_raw(&file, speed).map_err(|source| TransportError::Configure {
            path: path.clone(),
            source,
        })?;

        let fd = AsyncFd::with_interest(file, Interest::READABLE).map_err(|source| {
            TransportError::Open {
                path: path.clone(),
                source,
            }
        })?;

        debug!(?path, baud = config.baud_rate, "serial device opened");

        Ok(Self {
            fd,
            id: path.display().to_string(),
            config: config.clone(),
        })
    }

    /// Device node this handle was opened from.
    pub fn path(&self) -> &Path {
        &self.config.location
    }

    /// Configured line speed.
    pub fn baud_rate(&self) -> u32 {
        self.config.baud_rate
    }
}

impl ByteSource for SerialDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn read_into<'a>(
        &'a mut self,
        buf: &'a mut BytesMut,
    ) -> impl Future<Output = std::io::Result<usize>> + Send + 'a {
        async move {
            loop {
                let mut guard = self.fd.readable().await?;
                match guard.try_io(|inner| read_spare(inner.get_ref(), buf)) {
                    Ok(result) => return result,
                    Err(_would_block) => continue,
                }
            }
        }
    }
}

impl std::fmt::Debug for SerialDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialDevice")
            .field("path", &self.config.location)
            .field("baud_rate", &self.config.baud_rate)
            .finish()
    }
}

/// Read into the spare capacity of `buf`, leaving its length at the filled mark.
fn read_spare(mut file: &File, buf: &mut BytesMut) -> std::io::Result<usize> {
    let start = buf.len();
    if buf.capacity() == start {
        buf.reserve(1);
    }
    buf.resize(buf.capacity(), 0);

    match file.read(&mut buf[start..]) {
        Ok(n) => {
            buf.truncate(start + n);
            Ok(n)
        }
        Err(err) => {
            buf.truncate(start);
            Err(err)
        }
    }
}

fn speed_for(baud_rate: u32) -> Result<libc::speed_t> {
    let speed = match baud_rate {
        1_200 => libc::B1200,
        2_400 => libc::B2400,
        4_800 => libc::B4800,
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        other => return Err(TransportError::UnsupportedBaudRate(other)),
    };
    Ok(speed)
}

fn configure_raw(file: &File, speed: libc::speed_t) -> std::io::Result<()> {
    let fd = file.as_raw_fd();

    // SAFETY: an all-zero termios is a valid value for tcgetattr to overwrite.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };

    // SAFETY: `fd` is an open descriptor owned by `file` and `tio` is a valid
    // writable termios for the duration of the call.
    if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `tio` was initialized by tcgetattr above.
    unsafe {
        libc::cfmakeraw(&mut tio);
        if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    tio.c_cflag |= libc::CLOCAL | libc::CREAD;

    // SAFETY: same descriptor as above; `tio` is fully initialized.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_BAUD_RATE;

    #[test]
    fn maps_known_baud_rates() {
        assert_eq!(speed_for(57_600).unwrap(), libc::B57600);
        assert_eq!(speed_for(9_600).unwrap(), libc::B9600);
    }

    #[test]
    fn rejects_unknown_baud_rate() {
        assert!(matches!(
            speed_for(12_345),
            Err(TransportError::UnsupportedBaudRate(12_345))
        ));
        assert!(matches!(
            speed_for(0),
            Err(TransportError::UnsupportedBaudRate(0))
        ));
    }

    #[tokio::test]
    async fn missing_device_is_open_error() {
        let cfg = SerialConfig::new(
            format!("/tmp/heizwire-missing-{}", std::process::id()),
            DEFAULT_BAUD_RATE,
        );
        let err = SerialDevice::open(&cfg).unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
    }

    #[tokio::test]
    async fn regular_file_is_configure_error() {
        let path = std::env::temp_dir().join(format!("heizwire-not-a-tty-{}", std::process::id()));
        std::fs::write(&path, b"not a tty").unwrap();

        let err = SerialDevice::open(&SerialConfig::new(&path, DEFAULT_BAUD_RATE)).unwrap_err();
        assert!(matches!(err, TransportError::Configure { .. }));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn read_spare_keeps_existing_bytes() {
        let path = std::env::temp_dir().join(format!("heizwire-read-spare-{}", std::process::id()));
        std::fs::write(&path, b"B;22;1;%;").unwrap();
        let file = File::open(&path).unwrap();

        let mut buf = BytesMut::with_capacity(64);
        buf.extend_from_slice(b"A");
        let n = read_spare(&file, &mut buf).unwrap();

        assert_eq!(n, 9);
        assert_eq!(&buf[..], b"AB;22;1;%;");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    #[cfg(target_os = "linux")]
    async fn reads_from_pseudo_terminal() {
        use std::io::Write;
        use std::os::fd::FromRawFd;

        // SAFETY: plain libc calls on a descriptor we own; results are checked.
        let master_fd = unsafe { libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY) };
        assert!(master_fd >= 0);
        assert_eq!(unsafe { libc::grantpt(master_fd) }, 0);
        assert_eq!(unsafe { libc::unlockpt(master_fd) }, 0);

        let mut name = [0 as libc::c_char; 128];
        // SAFETY: `name` is writable for `name.len()` bytes.
        assert_eq!(
            unsafe { libc::ptsname_r(master_fd, name.as_mut_ptr(), name.len()) },
            0
        );
        // SAFETY: ptsname_r wrote a NUL-terminated string into `name`.
        let slave = unsafe { std::ffi::CStr::from_ptr(name.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        // SAFETY: `master_fd` is open and ownership moves into the File.
        let mut master = unsafe { File::from_raw_fd(master_fd) };

        let mut device = SerialDevice::open(&SerialConfig::new(&slave, DEFAULT_BAUD_RATE)).unwrap();
        assert_eq!(device.baud_rate(), DEFAULT_BAUD_RATE);
        assert_eq!(device.id(), slave);

        master.write_all(b"A;22;1;%;").unwrap();

        let mut buf = BytesMut::with_capacity(64);
        let n = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            device.read_into(&mut buf),
        )
        .await
        .expect("pty read should not time out")
        .unwrap();

        assert!(n > 0);
        assert_eq!(&buf[..], &b"A;22;1;%;"[..n]);
    }
}
