//! Linux TAP device driver.
//!
//! Opens `/dev/net/tun`, attaches to a TAP interface
//! (`IFF_TAP | IFF_NO_PI`), and reads the interface MAC from the kernel.
//! A poll thread stands in for signal-driven I/O: it blocks in `poll(2)`
//! until the descriptor is readable, raises the device's interrupt line,
//! and then waits until the service routine has drained the descriptor —
//! the ISR reads frames until `EAGAIN` and feeds each one through the
//! Ethernet ingress filter.

use std::ffi::CString;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::ethernet;
use crate::netdev::{DeviceConfig, DeviceDriver, DeviceFlags, DeviceKind, NetDevice};
use crate::stack::StackInner;
use crate::sync;
use crate::types::{MacAddr, NetError};

/// Poll timeout, bounding how long shutdown waits for the poll thread.
const POLL_TIMEOUT_MS: libc::c_int = 500;

/// Read buffer: Ethernet header plus MTU.
const FRAME_BUF: usize = 2048;

struct TapShared {
    fd: libc::c_int,
    running: AtomicBool,
    /// Drain handshake: the ISR bumps the counter after reading the
    /// descriptor dry; the poll thread waits for the bump before polling
    /// again, so a slow drain never turns into a busy loop.
    drained: Mutex<u64>,
    drained_cond: Condvar,
}

impl Drop for TapShared {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

pub struct TapDriver {
    shared: Arc<TapShared>,
    hwaddr: MacAddr,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TapDriver {
    /// Attach to the TAP interface `name` (e.g. `"tap0"`), which must
    /// already exist or be creatable by the calling user.
    pub fn create(name: &str) -> io::Result<Self> {
        let c_name = CString::new(name).map_err(|_| io::ErrorKind::InvalidInput)?;
        if c_name.as_bytes_with_nul().len() > libc::IFNAMSIZ {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "interface name too long",
            ));
        }

        let fd = unsafe { libc::open(c"/dev/net/tun".as_ptr(), libc::O_RDWR) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut req: libc::ifreq = unsafe { std::mem::zeroed() };
        unsafe {
            std::ptr::copy_nonoverlapping(
                c_name.as_ptr(),
                req.ifr_name.as_mut_ptr(),
                c_name.as_bytes_with_nul().len(),
            );
            req.ifr_ifru.ifru_flags = (libc::IFF_TAP | libc::IFF_NO_PI) as libc::c_short;
            if libc::ioctl(fd, libc::TUNSETIFF as _, &mut req) < 0 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(err);
            }
            // Non-blocking so the ISR can read until EAGAIN.
            let flags = libc::fcntl(fd, libc::F_GETFL);
            if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(err);
            }
        }

        let hwaddr = match read_hwaddr(&req) {
            Ok(hwaddr) => hwaddr,
            Err(err) => {
                unsafe {
                    libc::close(fd);
                }
                return Err(err);
            }
        };
        log::info!("tap: attached to {} ({})", name, hwaddr);

        Ok(Self {
            shared: Arc::new(TapShared {
                fd,
                running: AtomicBool::new(false),
                drained: Mutex::new(0),
                drained_cond: Condvar::new(),
            }),
            hwaddr,
            thread: Mutex::new(None),
        })
    }
}

/// Query the interface hardware address through a throwaway socket.
fn read_hwaddr(req: &libc::ifreq) -> io::Result<MacAddr> {
    let mut req = *req;
    unsafe {
        let sock = libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0);
        if sock < 0 {
            return Err(io::Error::last_os_error());
        }
        let rc = libc::ioctl(sock, libc::SIOCGIFHWADDR as _, &mut req);
        libc::close(sock);
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        let mut mac = [0u8; 6];
        for (dst, src) in mac.iter_mut().zip(req.ifr_ifru.ifru_hwaddr.sa_data.iter()) {
            *dst = *src as u8;
        }
        Ok(MacAddr(mac))
    }
}

impl DeviceDriver for TapDriver {
    fn config(&self) -> DeviceConfig {
        DeviceConfig {
            kind: DeviceKind::Ethernet,
            mtu: ethernet::PAYLOAD_MAX,
            header_len: ethernet::HEADER_LEN,
            addr_len: ethernet::ADDR_LEN,
            flags: DeviceFlags::BROADCAST | DeviceFlags::NEED_ARP,
            hwaddr: self.hwaddr,
            broadcast: MacAddr::BROADCAST,
        }
    }

    fn open(&self, dev: &Arc<NetDevice>) -> Result<(), NetError> {
        self.shared.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let dev = Arc::clone(dev);
        let handle = std::thread::Builder::new()
            .name(format!("tapstack-{}", dev.name))
            .spawn(move || poll_loop(&shared, &dev))
            .map_err(|_| NetError::Io)?;
        *sync::lock(&self.thread) = Some(handle);
        Ok(())
    }

    fn close(&self, _dev: &Arc<NetDevice>) -> Result<(), NetError> {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = sync::lock(&self.thread).take() {
            let _ = handle.join();
        }
        Ok(())
    }

    fn transmit(
        &self,
        dev: &NetDevice,
        kind: u16,
        payload: &[u8],
        dst: &[u8],
    ) -> Result<(), NetError> {
        let mut mac = [0u8; 6];
        if dst.len() == mac.len() {
            mac.copy_from_slice(dst);
        }
        let frame = ethernet::encode(dev.hwaddr, MacAddr(mac), kind, payload);
        let written = unsafe {
            libc::write(
                self.shared.fd,
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
            )
        };
        if written != frame.len() as isize {
            log::warn!(
                "{}: short write ({} of {} bytes)",
                dev.name,
                written,
                frame.len()
            );
            return Err(NetError::Io);
        }
        Ok(())
    }

    fn isr(&self, dev: &Arc<NetDevice>, stack: &Arc<StackInner>) {
        let mut buf = [0u8; FRAME_BUF];
        loop {
            let n = unsafe {
                libc::read(
                    self.shared.fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::WouldBlock {
                    log::warn!("{}: read failed: {}", dev.name, err);
                }
                break;
            }
            if n == 0 {
                break;
            }
            ethernet::input_helper(stack, dev, &buf[..n as usize]);
        }
        // Let the poll thread arm itself again.
        let mut drained = sync::lock(&self.shared.drained);
        *drained += 1;
        self.shared.drained_cond.notify_all();
    }
}

/// Poll thread body: readable → raise IRQ → wait for the drain bump.
fn poll_loop(shared: &TapShared, dev: &Arc<NetDevice>) {
    log::debug!("{}: poll thread running", dev.name);
    while shared.running.load(Ordering::SeqCst) {
        let mut fds = libc::pollfd {
            fd: shared.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut fds, 1, POLL_TIMEOUT_MS) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            log::warn!("{}: poll failed: {}", dev.name, err);
            break;
        }
        if rc == 0 || fds.revents & libc::POLLIN == 0 {
            continue;
        }
        let seq = *sync::lock(&shared.drained);
        dev.raise_irq();
        let guard = sync::lock(&shared.drained);
        if *guard == seq {
            let (_guard, _timeout) = shared
                .drained_cond
                .wait_timeout(guard, Duration::from_millis(POLL_TIMEOUT_MS as u64))
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
    log::debug!("{}: poll thread terminated", dev.name);
}
