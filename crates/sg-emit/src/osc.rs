use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use rosc::{OscBundle, OscMessage, OscPacket, OscTime, OscType};
use sg_core::config::OscConfig;
use sg_core::error::PipelineError;
use sg_core::record::FeatureRecord;
use sg_core::traits::FeatureEmitter;

/// OSC "immediately" time tag.
const IMMEDIATE: OscTime = OscTime {
    seconds: 0,
    fractional: 1,
};

/// Sends each record as OSC over UDP.
///
/// One message per field, in wire order:
///
/// | address            | arguments            |
/// |--------------------|----------------------|
/// | `{base}/rms`       | float                |
/// | `{base}/centroid`  | float (Hz)           |
/// | `{base}/onset`     | int, 0 or 1          |
/// | `{base}/bands`     | one float per band   |
/// | `{base}/timestamp` | double (seconds)     |
///
/// This order is the layout existing OSC patches (TouchDesigner) already
/// listen for; it differs from the JSON field order. Receivers match on
/// the address, not on arrival order.
///
/// With `bundle = true` the five messages travel in a single immediate
/// bundle. The socket is non-blocking: a full send buffer is reported as an
/// [`PipelineError::EmitterFault`] instead of stalling the caller. Without
/// a bundle that can happen mid-record, so a receiver may see only the
/// first fields of it; use `bundle = true` when records must arrive whole.
pub struct OscEmitter {
    socket: UdpSocket,
    target: SocketAddr,
    addresses: [String; 5],
    bundle: bool,
}

impl OscEmitter {
    /// Resolve `host:port` and open a local UDP socket toward it.
    ///
    /// # Errors
    /// Returns [`PipelineError::EmitterFault`] if the host does not resolve or
    /// no socket can be bound.
    ///
    /// # Example
    /// ```no_run
    /// use sg_core::config::OscConfig;
    /// use sg_emit::OscEmitter;
    /// let emitter = OscEmitter::connect(&OscConfig::default()).unwrap();
    /// println!("sending to {}", emitter.target());
    /// ```
    pub fn connect(config: &OscConfig) -> Result<Self, PipelineError> {
        let target = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| fault(format!("cannot resolve {}:{}: {e}", config.host, config.port)))?
            .next()
            .ok_or_else(|| fault(format!("{} resolves to no address", config.host)))?;

        let local: SocketAddr = if target.is_ipv6() {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).map_err(|e| fault(format!("cannot bind UDP socket: {e}")))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| fault(format!("cannot make UDP socket non-blocking: {e}")))?;

        let base = config.base_path.trim_end_matches('/');
        let addresses = ["rms", "centroid", "onset", "bands", "timestamp"].map(|f| format!("{base}/{f}"));

        log::info!(
            "OSC → {target} under {}{}",
            if base.is_empty() { "/" } else { base },
            if config.bundle { " (bundled)" } else { "" }
        );
        Ok(Self {
            socket,
            target,
            addresses,
            bundle: config.bundle,
        })
    }

    #[must_use]
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// OSC packets for `record`, in send order.
    #[must_use]
    pub fn packets(&self, record: &FeatureRecord) -> Vec<OscPacket> {
        let [rms, centroid, onset, bands, timestamp] = &self.addresses;
        let message = |addr: &String, args: Vec<OscType>| {
            OscPacket::Message(OscMessage {
                addr: addr.clone(),
                args,
            })
        };
        let messages = vec![
            message(rms, vec![OscType::Float(record.rms)]),
            message(centroid, vec![OscType::Float(record.centroid)]),
            message(onset, vec![OscType::Int(i32::from(record.onset))]),
            message(bands, record.bands.iter().copied().map(OscType::Float).collect()),
            message(timestamp, vec![OscType::Double(record.timestamp)]),
        ];
        if self.bundle {
            vec![OscPacket::Bundle(OscBundle {
                timetag: IMMEDIATE,
                content: messages,
            })]
        } else {
            messages
        }
    }
}

impl FeatureEmitter for OscEmitter {
    fn send(&mut self, record: &FeatureRecord) -> Result<(), PipelineError> {
        let datagrams = self
            .packets(record)
            .iter()
            .map(rosc::encoder::encode)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| fault(format!("OSC encoding failed: {e}")))?;

        for (sent, bytes) in datagrams.iter().enumerate() {
            match self.socket.send_to(bytes, self.target) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Err(fault(format!(
                        "UDP send buffer full, record #{} for {} cut after {sent} of {} datagrams",
                        record.block_index,
                        self.target,
                        datagrams.len()
                    )));
                }
                Err(e) => return Err(fault(format!("UDP send to {} failed: {e}", self.target))),
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "osc"
    }
}

fn fault(msg: String) -> PipelineError {
    PipelineError::EmitterFault(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn listener() -> (UdpSocket, OscConfig) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let config = OscConfig {
            host: "127.0.0.1".into(),
            port: socket.local_addr().unwrap().port(),
            base_path: "/sonic/".into(),
            bundle: false,
        };
        (socket, config)
    }

    fn record() -> FeatureRecord {
        FeatureRecord {
            rms: 0.5,
            centroid: 880.0,
            bands: vec![0.25, 1.5, 3.0],
            onset: true,
            timestamp: 1234.5,
            block_index: 7,
        }
    }

    fn receive(socket: &UdpSocket) -> OscPacket {
        let mut buf = [0u8; rosc::decoder::MTU];
        let (len, _) = socket.recv_from(&mut buf).unwrap();
        rosc::decoder::decode_udp(&buf[..len]).unwrap().1
    }

    #[test]
    fn one_message_per_field_in_order() {
        let (socket, config) = listener();
        let mut emitter = OscEmitter::connect(&config).unwrap();
        emitter.send(&record()).unwrap();

        let mut got = Vec::new();
        for _ in 0..5 {
            match receive(&socket) {
                OscPacket::Message(m) => got.push((m.addr, m.args)),
                OscPacket::Bundle(_) => panic!("unexpected bundle"),
            }
        }
        assert_eq!(
            got,
            vec![
                ("/sonic/rms".to_string(), vec![OscType::Float(0.5)]),
                ("/sonic/centroid".to_string(), vec![OscType::Float(880.0)]),
                ("/sonic/onset".to_string(), vec![OscType::Int(1)]),
                (
                    "/sonic/bands".to_string(),
                    vec![OscType::Float(0.25), OscType::Float(1.5), OscType::Float(3.0)]
                ),
                ("/sonic/timestamp".to_string(), vec![OscType::Double(1234.5)]),
            ]
        );
    }

    #[test]
    fn bundle_carries_all_five_messages() {
        let (socket, mut config) = listener();
        config.bundle = true;
        let mut emitter = OscEmitter::connect(&config).unwrap();
        emitter.send(&record()).unwrap();

        let OscPacket::Bundle(bundle) = receive(&socket) else {
            panic!("expected a bundle");
        };
        assert_eq!(bundle.timetag, IMMEDIATE);
        let addrs: Vec<String> = bundle
            .content
            .into_iter()
            .map(|p| match p {
                OscPacket::Message(m) => m.addr,
                OscPacket::Bundle(_) => panic!("nested bundle"),
            })
            .collect();
        assert_eq!(
            addrs,
            ["/sonic/rms", "/sonic/centroid", "/sonic/onset", "/sonic/bands", "/sonic/timestamp"]
        );
    }

    #[test]
    fn bundle_mode_is_one_datagram_per_record() {
        let (_socket, mut config) = listener();
        config.bundle = true;
        let bundled = OscEmitter::connect(&config).unwrap();
        assert_eq!(bundled.packets(&record()).len(), 1);

        config.bundle = false;
        let split = OscEmitter::connect(&config).unwrap();
        assert_eq!(split.packets(&record()).len(), 5);
    }

    #[test]
    fn unresolvable_host_is_an_emitter_fault() {
        let config = OscConfig {
            host: "no-such-host.invalid".into(),
            ..OscConfig::default()
        };
        assert!(matches!(
            OscEmitter::connect(&config),
            Err(PipelineError::EmitterFault(_))
        ));
    }
}
