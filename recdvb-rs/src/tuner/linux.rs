//! Linux DVB API backend (`/dev/dvb/adapterN/{frontend0,demux0,dvr0}`).

use std::fs::{File, OpenOptions};
use std::io;
use std::mem::MaybeUninit;
use std::os::fd::AsRawFd;

use log::trace;
use nix::errno::Errno;

use super::{DvbBackend, Frontend, FrontendStatus, FrontendType};

#[allow(dead_code)]
mod sys {
    use std::os::raw::{c_char, c_void};

    pub const DTV_TUNE: u32 = 1;
    pub const DTV_FREQUENCY: u32 = 3;
    pub const DTV_ISDBS_TS_ID: u32 = 42;

    /// Pseudo PID selecting the whole transport stream.
    pub const PID_FULL_TS: u16 = 0x2000;
    pub const DMX_IN_FRONTEND: u32 = 0;
    pub const DMX_OUT_TS_TAP: u32 = 2;
    pub const DMX_PES_OTHER: u32 = 20;
    pub const DMX_IMMEDIATE_START: u32 = 4;

    #[repr(C)]
    pub struct DvbFrontendInfo {
        pub name: [c_char; 128],
        pub fe_type: u32,
        pub frequency_min: u32,
        pub frequency_max: u32,
        pub frequency_stepsize: u32,
        pub frequency_tolerance: u32,
        pub symbol_rate_min: u32,
        pub symbol_rate_max: u32,
        pub symbol_rate_tolerance: u32,
        pub notifier_delay: u32,
        pub caps: u32,
    }

    #[repr(C)]
    #[derive(Clone, Copy)]
    pub struct DtvBuffer {
        pub data: [u8; 32],
        pub len: u32,
        pub reserved1: [u32; 3],
        pub reserved2: *mut c_void,
    }

    #[repr(C)]
    #[derive(Clone, Copy)]
    pub union DtvPropertyValue {
        pub data: u32,
        pub buffer: DtvBuffer,
    }

    #[repr(C, packed)]
    pub struct DtvProperty {
        pub cmd: u32,
        pub reserved: [u32; 3],
        pub u: DtvPropertyValue,
        pub result: i32,
    }

    impl DtvProperty {
        pub fn new(cmd: u32, data: u32) -> Self {
            let mut u = DtvPropertyValue {
                buffer: DtvBuffer {
                    data: [0; 32],
                    len: 0,
                    reserved1: [0; 3],
                    reserved2: std::ptr::null_mut(),
                },
            };
            u.data = data;
            Self {
                cmd,
                reserved: [0; 3],
                u,
                result: 0,
            }
        }
    }

    #[repr(C)]
    pub struct DtvProperties {
        pub num: u32,
        pub props: *mut DtvProperty,
    }

    #[repr(C)]
    pub struct DmxPesFilterParams {
        pub pid: u16,
        pub input: u32,
        pub output: u32,
        pub pes_type: u32,
        pub flags: u32,
    }

    nix::ioctl_read!(fe_get_info, b'o', 61, DvbFrontendInfo);
    nix::ioctl_read!(fe_read_status, b'o', 69, u32);
    nix::ioctl_write_ptr!(fe_set_property, b'o', 82, DtvProperties);
    nix::ioctl_write_ptr!(dmx_set_pes_filter, b'o', 44, DmxPesFilterParams);
}

/// Devices of real DVB adapters.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxDvb;

#[derive(Debug)]
pub struct LinuxFrontend(File);

/// Demux whose full-TS filter stays active until the handle is dropped.
#[derive(Debug)]
pub struct LinuxDemux(File);

impl Frontend for LinuxFrontend {
    fn frontend_type(&self) -> io::Result<FrontendType> {
        let mut info = MaybeUninit::<sys::DvbFrontendInfo>::uninit();
        unsafe { sys::fe_get_info(self.0.as_raw_fd(), info.as_mut_ptr()) }
            .map_err(|e| ioctl_error("FE_GET_INFO", e))?;
        let info = unsafe { info.assume_init() };
        Ok(FrontendType::from(info.fe_type))
    }

    fn set_channel(&self, frequency: u32, stream_id: u32) -> io::Result<()> {
        let mut props = [
            sys::DtvProperty::new(sys::DTV_FREQUENCY, frequency),
            sys::DtvProperty::new(sys::DTV_ISDBS_TS_ID, stream_id),
            sys::DtvProperty::new(sys::DTV_TUNE, 0),
        ];
        let request = sys::DtvProperties {
            num: props.len() as u32,
            props: props.as_mut_ptr(),
        };
        trace!("FE_SET_PROPERTY frequency={} ts_id={}", frequency, stream_id);
        unsafe { sys::fe_set_property(self.0.as_raw_fd(), &request) }
            .map_err(|e| ioctl_error("FE_SET_PROPERTY", e))?;
        Ok(())
    }

    fn read_status(&self) -> io::Result<FrontendStatus> {
        let mut status: u32 = 0;
        unsafe { sys::fe_read_status(self.0.as_raw_fd(), &mut status) }
            .map_err(|e| ioctl_error("FE_READ_STATUS", e))?;
        Ok(FrontendStatus(status))
    }
}

impl DvbBackend for LinuxDvb {
    type Frontend = LinuxFrontend;
    type Demux = LinuxDemux;
    type Dvr = File;

    fn open_frontend(&self, adapter: &str) -> io::Result<LinuxFrontend> {
        open_rw(&format!("{}/frontend0", adapter)).map(LinuxFrontend)
    }

    fn open_demux(&self, adapter: &str) -> io::Result<LinuxDemux> {
        let demux = open_rw(&format!("{}/demux0", adapter))?;
        let filter = sys::DmxPesFilterParams {
            pid: sys::PID_FULL_TS,
            input: sys::DMX_IN_FRONTEND,
            output: sys::DMX_OUT_TS_TAP,
            pes_type: sys::DMX_PES_OTHER,
            flags: sys::DMX_IMMEDIATE_START,
        };
        unsafe { sys::dmx_set_pes_filter(demux.as_raw_fd(), &filter) }
            .map_err(|e| ioctl_error("DMX_SET_PES_FILTER", e))?;
        Ok(LinuxDemux(demux))
    }

    fn open_dvr(&self, adapter: &str) -> io::Result<File> {
        File::open(format!("{}/dvr0", adapter))
    }
}

fn open_rw(path: &str) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

fn ioctl_error(name: &str, errno: Errno) -> io::Error {
    let kind = io::Error::from(errno).kind();
    io::Error::new(kind, format!("ioctl {}: {}", name, errno))
}
