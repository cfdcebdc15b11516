/*!
 * Radio transport seam.
 *
 * The gateway never talks to radio hardware itself. A `Radio` moves whole
 * packets to and from a device address; framing, CRC and retries live below
 * it. The transport is shared between the transmit scheduler and the
 * listener behind one async mutex, so only one of them uses it at a time.
 */
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use lorabridge_devices::packet::PacketBytes;

use crate::error::{Error, Result};

/// A packet received from a remote device
#[derive(Debug, Clone, PartialEq)]
pub struct RadioPacket {
    /// Symbol of the sending device
    pub sender: u8,
    /// Packet payload
    pub payload: Bytes,
    /// Received signal strength in dBm, if the transport reports it
    pub rssi: Option<i16>,
    /// Signal-to-noise ratio in dB, if the transport reports it
    pub snr: Option<f32>,
}

impl RadioPacket {
    /// Create a packet without signal quality information
    pub fn new(sender: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            sender,
            payload: payload.into(),
            rssi: None,
            snr: None,
        }
    }

    /// Attach signal quality information
    pub fn with_signal(mut self, rssi: i16, snr: f32) -> Self {
        self.rssi = Some(rssi);
        self.snr = Some(snr);
        self
    }
}

/// Packet-level access to the radio link
#[async_trait]
pub trait Radio: Send {
    /// Send `payload` to the device with symbol `destination`
    async fn send(&mut self, destination: u8, payload: &[u8]) -> Result<()>;

    /// Return the next received packet, or `None` if nothing is waiting
    async fn receive(&mut self) -> Result<Option<RadioPacket>>;
}

/// A radio shared between the scheduler and the listener
pub type SharedRadio = Arc<Mutex<Box<dyn Radio>>>;

/// Wrap a radio for sharing
pub fn shared<R: Radio + 'static>(radio: R) -> SharedRadio {
    Arc::new(Mutex::new(Box::new(radio)))
}

/// A packet handed to the loopback radio for sending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    /// Destination device symbol
    pub destination: u8,
    /// Packet payload
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct LoopbackState {
    inbound: VecDeque<RadioPacket>,
    sent: Vec<SentPacket>,
    failing: bool,
}

/// In-memory radio used for simulation and tests
#[derive(Debug, Clone, Default)]
pub struct LoopbackRadio {
    state: Arc<StdMutex<LoopbackState>>,
}

/// Test-side handle onto a `LoopbackRadio`
#[derive(Debug, Clone)]
pub struct LoopbackHandle {
    state: Arc<StdMutex<LoopbackState>>,
}

impl LoopbackRadio {
    /// Create a loopback radio and a handle for feeding and inspecting it
    pub fn new() -> (Self, LoopbackHandle) {
        let radio = Self::default();
        let handle = LoopbackHandle {
            state: radio.state.clone(),
        };
        (radio, handle)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LoopbackHandle {
    fn state(&self) -> std::sync::MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a packet as if a remote device had sent it
    pub fn inject(&self, packet: RadioPacket) {
        self.state().inbound.push_back(packet);
    }

    /// Packets sent so far
    pub fn sent(&self) -> Vec<SentPacket> {
        self.state().sent.clone()
    }

    /// Make every subsequent operation fail until cleared
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }
}

#[async_trait]
impl Radio for LoopbackRadio {
    async fn send(&mut self, destination: u8, payload: &[u8]) -> Result<()> {
        let mut state = self.state();
        if state.failing {
            return Err(Error::transport("loopback radio is failing"));
        }
        trace!(
            "Loopback send to {:#04x}: {}",
            destination,
            PacketBytes(payload)
        );
        state.sent.push(SentPacket {
            destination,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<RadioPacket>> {
        let mut state = self.state();
        if state.failing {
            return Err(Error::transport("loopback radio is failing"));
        }
        Ok(state.inbound.pop_front())
    }
}

/// Radio reached through a modem daemon over UDP
///
/// Outbound datagrams are `[destination, payload...]`. Inbound datagrams are
/// `[sender, rssi_lo, rssi_hi, snr, payload...]` with RSSI a little-endian
/// `i16` in dBm and SNR an `i8` in quarter dB.
#[derive(Debug)]
pub struct UdpRadio {
    socket: UdpSocket,
    modem_addr: String,
    max_packet_len: usize,
}

const UDP_HEADER_LEN: usize = 4;

impl UdpRadio {
    /// Bind to `bind_addr` and exchange packets with the daemon at `modem_addr`
    pub async fn bind(bind_addr: &str, modem_addr: &str, max_packet_len: usize) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        info!(
            "Radio transport listening on {} for modem daemon at {}",
            bind_addr, modem_addr
        );
        Ok(Self {
            socket,
            modem_addr: modem_addr.to_string(),
            max_packet_len,
        })
    }

    fn parse_datagram(datagram: &[u8]) -> Option<RadioPacket> {
        if datagram.len() < UDP_HEADER_LEN {
            return None;
        }
        let rssi = i16::from_le_bytes([datagram[1], datagram[2]]);
        let snr = f32::from(datagram[3] as i8) / 4.0;
        Some(
            RadioPacket::new(datagram[0], Bytes::copy_from_slice(&datagram[UDP_HEADER_LEN..]))
                .with_signal(rssi, snr),
        )
    }
}

#[async_trait]
impl Radio for UdpRadio {
    async fn send(&mut self, destination: u8, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_packet_len {
            return Err(Error::transport(format!(
                "{} byte packet exceeds the {} byte limit",
                payload.len(),
                self.max_packet_len
            )));
        }
        let mut datagram = Vec::with_capacity(payload.len() + 1);
        datagram.push(destination);
        datagram.extend_from_slice(payload);
        self.socket.send_to(&datagram, &self.modem_addr).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<RadioPacket>> {
        // One spare byte tells a full-size datagram from a truncated one
        let mut buf = vec![0u8; self.max_packet_len + UDP_HEADER_LEN + 1];
        loop {
            match self.socket.try_recv_from(&mut buf) {
                Ok((len, from)) if len == buf.len() => warn!(
                    "Discarding datagram from {} with a payload over the {} byte limit",
                    from, self.max_packet_len
                ),
                Ok((len, from)) => match Self::parse_datagram(&buf[..len]) {
                    Some(packet) => return Ok(Some(packet)),
                    None => debug!("Ignoring {} byte datagram from {}", len, from),
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_round_trip() {
        let (radio, handle) = LoopbackRadio::new();
        let radio = shared(radio);

        handle.inject(RadioPacket::new(0x5A, vec![b'H', 40]).with_signal(-90, 10.0));
        {
            let mut radio = radio.lock().await;
            let packet = radio.receive().await.unwrap().unwrap();
            assert_eq!(packet.sender, 0x5A);
            assert_eq!(&packet.payload[..], &[b'H', 40]);
            assert_eq!(packet.rssi, Some(-90));
            assert!(radio.receive().await.unwrap().is_none());

            radio.send(0x4A, &[0xC6, 1]).await.unwrap();
        }

        assert_eq!(
            handle.sent(),
            vec![SentPacket {
                destination: 0x4A,
                payload: vec![0xC6, 1]
            }]
        );
    }

    #[tokio::test]
    async fn test_loopback_failure() {
        let (mut radio, handle) = LoopbackRadio::new();
        handle.set_failing(true);
        assert!(matches!(
            radio.send(1, &[1]).await,
            Err(Error::Transport(_))
        ));
        assert!(radio.receive().await.is_err());
    }

    #[test]
    fn test_parse_datagram() {
        let packet = UdpRadio::parse_datagram(&[0x4A, 0xA6, 0xFF, 0xEC, b'g', 1]).unwrap();
        assert_eq!(packet.sender, 0x4A);
        assert_eq!(packet.rssi, Some(-90));
        assert_eq!(packet.snr, Some(-5.0));
        assert_eq!(&packet.payload[..], &[b'g', 1]);

        assert!(UdpRadio::parse_datagram(&[0x4A, 0xA6]).is_none());
    }

    #[tokio::test]
    async fn test_udp_exchange() {
        let modem = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let modem_addr = modem.local_addr().unwrap().to_string();
        let mut radio = UdpRadio::bind("127.0.0.1:0", &modem_addr, 50).await.unwrap();
        let radio_addr = radio.socket.local_addr().unwrap();

        radio.send(0x4A, &[0xC6, 1]).await.unwrap();
        let mut buf = [0u8; 64];
        let (len, _) = modem.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[0x4A, 0xC6, 1]);

        assert!(radio.receive().await.unwrap().is_none());

        modem
            .send_to(&[0x5A, 0xA6, 0xFF, 40, b'H', 55], radio_addr)
            .await
            .unwrap();
        let packet = loop {
            radio.socket.readable().await.unwrap();
            if let Some(packet) = radio.receive().await.unwrap() {
                break packet;
            }
        };
        assert_eq!(packet.sender, 0x5A);
        assert_eq!(packet.snr, Some(10.0));

        // A payload one byte over the limit is dropped, not truncated
        let mut oversized = vec![0x5A, 0xA6, 0xFF, 40];
        oversized.extend(std::iter::repeat(b'H').take(51));
        modem.send_to(&oversized, radio_addr).await.unwrap();
        modem
            .send_to(&[0xA9, 0xA6, 0xFF, 40, b'g', 1], radio_addr)
            .await
            .unwrap();
        let packet = loop {
            radio.socket.readable().await.unwrap();
            if let Some(packet) = radio.receive().await.unwrap() {
                break packet;
            }
        };
        assert_eq!(packet.sender, 0xA9);
        assert_eq!(&packet.payload[..], &[b'g', 1]);

        assert!(matches!(
            radio.send(0x4A, &[0u8; 51]).await,
            Err(Error::Transport(_))
        ));
    }
}
