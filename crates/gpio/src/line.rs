//! An opened GPIO input line

use crate::error::{GpioError, Result};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// An exported, edge-configured line with its value file open
///
/// Only `GpioLines` creates these, after export and configuration succeeded.
#[derive(Debug)]
pub struct LineHandle {
    number: u32,
    fd: RawFd,
    value_path: PathBuf,
    /// Seek and read must not interleave between readers
    value: Mutex<File>,
}

impl LineHandle {
    pub(crate) fn open(number: u32, value_path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_SYNC.bits())
            .open(value_path)
            .map_err(|e| GpioError::io(value_path, e))?;

        Ok(Self {
            number,
            fd: file.as_raw_fd(),
            value_path: value_path.to_path_buf(),
            value: Mutex::new(file),
        })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn value_path(&self) -> &Path {
        &self.value_path
    }

    /// Current level of the line, 0 or 1
    ///
    /// Rewinds before reading: sysfs value files report the level from
    /// offset 0 on every read. A source without a file position (a pipe) is
    /// read as it comes.
    pub fn read_value(&self) -> Result<u8> {
        let mut file = self.value.lock();
        match file.seek(SeekFrom::Start(0)) {
            Ok(_) => {}
            Err(e) if e.raw_os_error() == Some(Errno::ESPIPE as i32) => {}
            Err(e) => return Err(GpioError::io(&self.value_path, e)),
        }

        let mut buf = [0u8; 8];
        let n = file
            .read(&mut buf)
            .map_err(|e| GpioError::io(&self.value_path, e))?;
        if n == 0 {
            return Err(GpioError::EmptyValue { pin: self.number });
        }

        parse_level(self.number, buf[0])
    }

    /// Run `f` with the value file's descriptor borrowed
    pub(crate) fn with_fd<R>(&self, f: impl FnOnce(BorrowedFd<'_>) -> R) -> R {
        let file = self.value.lock();
        f(file.as_fd())
    }
}

fn parse_level(pin: u32, byte: u8) -> Result<u8> {
    match byte {
        b'0' => Ok(0),
        b'1' => Ok(1),
        _ => Err(GpioError::InvalidValue { pin, byte }),
    }
}
