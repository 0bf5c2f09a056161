//! Link probe for hosts where the operating system owns Wi-Fi association.
//!
//! The probe must not depend on the broker: a broker outage on a working
//! link is handled by the broker reconnect path, not by network association.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use grader_traits::{BoxError, Network};

use crate::error::HwError;

/// How the link is judged to be up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkProbe {
    /// Kernel operstate of an interface, e.g. `/sys/class/net/wlan0/operstate`.
    OperState(PathBuf),
    /// TCP connect to a host on the local network (gateway, NTP, DNS).
    Tcp(String),
}

impl LinkProbe {
    pub fn interface(name: &str) -> Self {
        Self::OperState(PathBuf::from(format!("/sys/class/net/{name}/operstate")))
    }

    fn check(&self, timeout: Duration) -> Result<(), HwError> {
        match self {
            Self::OperState(path) => {
                let state = std::fs::read_to_string(path)?;
                match state.trim() {
                    "up" => Ok(()),
                    other => Err(HwError::Network(format!(
                        "{} is {other}",
                        path.display()
                    ))),
                }
            }
            Self::Tcp(target) => {
                let addrs: Vec<SocketAddr> = target.to_socket_addrs()?.collect();
                let mut last = HwError::Network(format!("no address for {target}"));
                for addr in addrs {
                    match TcpStream::connect_timeout(&addr, timeout) {
                        Ok(_) => return Ok(()),
                        Err(e) => last = HwError::Io(e),
                    }
                }
                Err(last)
            }
        }
    }
}

/// Association is performed by the OS; `associate()` re-probes, and an up
/// link is re-probed at most once per `recheck` interval.
pub struct LinkProbeNetwork {
    probe: LinkProbe,
    timeout: Duration,
    recheck: Duration,
    up: bool,
    last_probe: Option<Instant>,
}

impl LinkProbeNetwork {
    pub fn new(probe: LinkProbe, timeout: Duration) -> Self {
        Self {
            probe,
            timeout,
            recheck: Duration::from_secs(10),
            up: false,
            last_probe: None,
        }
    }

    pub fn with_recheck(mut self, recheck: Duration) -> Self {
        self.recheck = recheck;
        self
    }
}

impl Network for LinkProbeNetwork {
    fn is_connected(&mut self) -> bool {
        let stale = self
            .last_probe
            .is_none_or(|at| at.elapsed() >= self.recheck);
        if self.up && stale {
            self.up = match self.probe.check(self.timeout) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "link probe failed");
                    false
                }
            };
            self.last_probe = Some(Instant::now());
        }
        self.up
    }

    fn associate(&mut self) -> Result<(), BoxError> {
        self.last_probe = Some(Instant::now());
        match self.probe.check(self.timeout) {
            Ok(()) => {
                self.up = true;
                Ok(())
            }
            Err(e) => {
                self.up = false;
                Err(Box::new(e))
            }
        }
    }
}
