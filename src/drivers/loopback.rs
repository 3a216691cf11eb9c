//! In-process loopback device.
//!
//! `transmit` pushes the payload onto an internal queue and raises the
//! device's interrupt line; the service routine drains the queue back
//! into the stack's ingress path.  No link header, no ARP, no checksum
//! offload games — frames simply come back around.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::netdev::{DeviceConfig, DeviceDriver, DeviceFlags, DeviceKind, NetDevice};
use crate::stack::StackInner;
use crate::sync;
use crate::types::{MacAddr, NetError};

/// Queue bound; transmission fails with `NoBufferSpace` beyond it.
const QUEUE_LIMIT: usize = 256;

/// Loopback MTU: the largest IP datagram.
const MTU: usize = u16::MAX as usize;

pub struct LoopbackDriver {
    queue: Mutex<VecDeque<(u16, Vec<u8>)>>,
}

impl LoopbackDriver {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }
}

impl Default for LoopbackDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceDriver for LoopbackDriver {
    fn config(&self) -> DeviceConfig {
        DeviceConfig {
            kind: DeviceKind::Loopback,
            mtu: MTU,
            header_len: 0,
            addr_len: 0,
            flags: DeviceFlags::LOOPBACK,
            hwaddr: MacAddr::ZERO,
            broadcast: MacAddr::ZERO,
        }
    }

    fn transmit(
        &self,
        dev: &NetDevice,
        kind: u16,
        payload: &[u8],
        _dst: &[u8],
    ) -> Result<(), NetError> {
        let mut queue = sync::lock(&self.queue);
        if queue.len() >= QUEUE_LIMIT {
            return Err(NetError::NoBufferSpace);
        }
        queue.push_back((kind, payload.to_vec()));
        drop(queue);
        dev.raise_irq();
        Ok(())
    }

    fn isr(&self, dev: &Arc<NetDevice>, stack: &Arc<StackInner>) {
        loop {
            let item = sync::lock(&self.queue).pop_front();
            let Some((kind, data)) = item else {
                break;
            };
            dev.stats.count_rx(data.len());
            stack.input(kind, &data, dev);
        }
    }
}
