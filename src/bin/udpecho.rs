//! UDP echo server over a TAP device.
//!
//! Usage: `udpecho [TAP] [ADDR/PREFIX] [PORT]`
//! Defaults: `tap0`, `192.0.2.2/24`, port 7.
//!
//! Create the TAP interface first, e.g.:
//! `ip tuntap add mode tap user $USER name tap0 && ip link set tap0 up`

use std::sync::atomic::{AtomicBool, Ordering};

use tapstack::drivers::loopback::LoopbackDriver;
use tapstack::drivers::tap::TapDriver;
use tapstack::stack::NetStack;
use tapstack::types::{Endpoint, Ipv4Addr, NetError, Port};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_sig: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

fn netmask(prefix: u32) -> Ipv4Addr {
    Ipv4Addr::from_u32_be(if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    })
}

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let tap_name = args.next().unwrap_or_else(|| "tap0".into());
    let cidr = args.next().unwrap_or_else(|| "192.0.2.2/24".into());
    let port: u16 = args
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(7);

    let (addr, prefix) = match cidr.split_once('/') {
        Some((a, p)) => (
            a.parse::<Ipv4Addr>().expect("bad address"),
            p.parse::<u32>().expect("bad prefix"),
        ),
        None => (cidr.parse().expect("bad address"), 24),
    };

    let tap = TapDriver::create(&tap_name).expect("tap device");
    let mut builder = NetStack::builder();
    let lo = builder.device(Box::new(LoopbackDriver::new())).expect("loopback");
    builder
        .interface(lo, Ipv4Addr::LOCALHOST, Ipv4Addr([255, 0, 0, 0]))
        .expect("loopback interface");
    let dev = builder.device(Box::new(tap)).expect("tap");
    builder
        .interface(dev, addr, netmask(prefix))
        .expect("tap interface");
    let stack = builder.build().expect("stack");
    stack.run().expect("run");

    unsafe {
        libc::signal(libc::SIGINT, on_sigint as libc::sighandler_t);
    }
    // Watcher: turn SIGINT into the stack's cancellation event so the
    // blocking receive below unwinds with EINTR.
    {
        let stack = stack.clone();
        std::thread::spawn(move || loop {
            if INTERRUPTED.load(Ordering::SeqCst) {
                stack.interrupt();
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        });
    }

    let sock = stack.udp_open().expect("udp socket");
    stack
        .udp_bind(sock, Endpoint::new(Ipv4Addr::UNSPECIFIED, Port(port)))
        .expect("bind");
    println!("udp echo on {}:{}", addr, port);

    let mut buf = [0u8; 2048];
    loop {
        match stack.udp_recvfrom(sock, &mut buf) {
            Ok((len, peer)) => {
                println!("{} bytes from {}", len, peer);
                if let Err(err) = stack.udp_sendto(sock, &buf[..len], peer) {
                    eprintln!("sendto {}: {}", peer, err);
                }
            }
            Err(NetError::Interrupted) => break,
            Err(err) => {
                eprintln!("recvfrom: {}", err);
                break;
            }
        }
    }

    let _ = stack.udp_close(sock);
    stack.shutdown();
}
