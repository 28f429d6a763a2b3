//! Real device access over `/dev/dvb` nodes.
//!
//! The ioctl numbers and struct layouts mirror `linux/dvb/frontend.h`
//! and `linux/dvb/dmx.h` exactly; `dtv_property` is declared packed in
//! the kernel headers, so it is packed here too.

use std::ffi::c_void;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::fd::AsRawFd;

use tracing::debug;

use crate::{
    DeviceError, Property, Result,
    backend::{DemuxFilter, DeviceBackend, Frontend, StreamSource, TunerStatus},
};

// frontend.h
nix::ioctl_read!(fe_read_status, b'o', 69, u32);
nix::ioctl_write_ptr!(fe_set_property, b'o', 82, DtvProperties);
nix::ioctl_read!(fe_get_property, b'o', 83, DtvProperties);

// dmx.h
nix::ioctl_write_ptr!(dmx_set_pes_filter, b'o', 44, DmxPesFilterParams);

const DMX_IN_FRONTEND: u32 = 0;
const DMX_OUT_TS_TAP: u32 = 2;
const DMX_PES_OTHER: u32 = 20;
const DMX_IMMEDIATE_START: u32 = 4;

#[repr(C)]
#[derive(Clone, Copy)]
struct DtvPropertyBuffer {
    data: [u8; 32],
    len: u32,
    reserved1: [u32; 3],
    reserved2: *mut c_void,
}

#[repr(C)]
#[derive(Clone, Copy)]
union DtvPropertyData {
    data: u32,
    buffer: DtvPropertyBuffer,
}

#[repr(C, packed)]
struct DtvProperty {
    cmd: u32,
    reserved: [u32; 3],
    u: DtvPropertyData,
    result: i32,
}

impl DtvProperty {
    fn new(cmd: u32, value: u32) -> Self {
        // Zeroed like the memset the kernel API expects, then the two
        // meaningful fields are filled in.
        let mut property: DtvProperty = unsafe { std::mem::zeroed() };
        property.cmd = cmd;
        property.u = DtvPropertyData { data: value };
        property
    }
}

#[repr(C)]
struct DtvProperties {
    num: u32,
    props: *mut DtvProperty,
}

#[repr(C)]
struct DmxPesFilterParams {
    pid: u16,
    input: u32,
    output: u32,
    pes_type: u32,
    flags: u32,
}

fn errno_to_io(errno: nix::errno::Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(errno as i32)
}

/// [`DeviceBackend`] over the real `/dev/dvb` device nodes.
pub struct LinuxBackend;

impl DeviceBackend for LinuxBackend {
    fn open_frontend(&self, adapter: u32, frontend: u32) -> Result<Box<dyn Frontend>> {
        let path = format!("/dev/dvb/adapter{adapter}/frontend{frontend}");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| DeviceError::io(format!("open {path}"), e))?;
        debug!(%path, "frontend opened");
        Ok(Box::new(LinuxFrontend { file, path }))
    }

    fn open_filter(&self, adapter: u32, demux: u32) -> Result<Box<dyn DemuxFilter>> {
        let path = format!("/dev/dvb/adapter{adapter}/demux{demux}");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| DeviceError::io(format!("open {path}"), e))?;
        Ok(Box::new(LinuxFilter { file, path }))
    }

    fn open_source(&self, adapter: u32, dvr: u32) -> Result<Box<dyn StreamSource>> {
        let path = format!("/dev/dvb/adapter{adapter}/dvr{dvr}");
        let file = File::open(&path).map_err(|e| DeviceError::io(format!("open {path}"), e))?;
        debug!(%path, "dvr opened");
        Ok(Box::new(LinuxSource { file, path }))
    }
}

struct LinuxFrontend {
    file: File,
    path: String,
}

impl Frontend for LinuxFrontend {
    fn api_version(&mut self) -> Result<u32> {
        let mut property = DtvProperty::new(crate::properties::DTV_API_VERSION, 0);
        let mut batch = DtvProperties {
            num: 1,
            props: &mut property,
        };
        unsafe { fe_get_property(self.file.as_raw_fd(), &mut batch) }
            .map_err(|e| DeviceError::io(format!("FE_GET_PROPERTY {}", self.path), errno_to_io(e)))?;
        let version = unsafe { property.u.data };
        debug!(path = %self.path, version = format_args!("{version:#x}"), "api version probed");
        Ok(version)
    }

    fn set_properties(&mut self, properties: &[Property]) -> Result<()> {
        let mut batch: Vec<DtvProperty> = properties
            .iter()
            .map(|p| DtvProperty::new(p.code, p.value))
            .collect();
        let sequence = DtvProperties {
            num: batch.len() as u32,
            props: batch.as_mut_ptr(),
        };
        unsafe { fe_set_property(self.file.as_raw_fd(), &sequence) }
            .map_err(|e| DeviceError::io(format!("FE_SET_PROPERTY {}", self.path), errno_to_io(e)))?;
        Ok(())
    }

    fn read_status(&mut self) -> Result<TunerStatus> {
        let mut status: u32 = 0;
        unsafe { fe_read_status(self.file.as_raw_fd(), &mut status) }
            .map_err(|e| DeviceError::io(format!("FE_READ_STATUS {}", self.path), errno_to_io(e)))?;
        Ok(TunerStatus(status))
    }
}

struct LinuxFilter {
    file: File,
    path: String,
}

impl DemuxFilter for LinuxFilter {
    fn start(&mut self, pid: u16) -> Result<()> {
        let params = DmxPesFilterParams {
            pid,
            input: DMX_IN_FRONTEND,
            output: DMX_OUT_TS_TAP,
            pes_type: DMX_PES_OTHER,
            flags: DMX_IMMEDIATE_START,
        };
        unsafe { dmx_set_pes_filter(self.file.as_raw_fd(), &params) }.map_err(|e| {
            DeviceError::io(format!("DMX_SET_PES_FILTER {}", self.path), errno_to_io(e))
        })?;
        debug!(path = %self.path, pid, "pes filter started");
        Ok(())
    }
}

struct LinuxSource {
    file: File,
    path: String,
}

impl StreamSource for LinuxSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.file
            .read(buf)
            .map_err(|e| DeviceError::io(format!("read {}", self.path), e))
    }
}
