#![expect(
    clippy::module_name_repetitions,
    reason = "Packet types name the protocol layer they belong to"
)]

//! Engine.IO v3 / socket.io v2 text packet codec.
//!
//! Every WebSocket text frame is one Engine.IO packet: a single type digit followed by an
//! optional payload. Type `4` (message) wraps a socket.io packet, itself a type digit followed
//! by an optional namespace (`/nsp,`), an optional ack id and a JSON body:
//!
//! ```text
//! 0{"sid":"abc","pingInterval":25000,"pingTimeout":60000}   open
//! 2                                                          ping
//! 3                                                          pong
//! 40                                                         socket connect
//! 42["event",{"type":"donation","message":[...]}]            socket event
//! ```
//!
//! Binary attachments (socket.io types 5 and 6) are not used by the Streamlabs socket and are
//! rejected as malformed.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use super::error::WsError;

/// Payload of the Engine.IO open packet.
#[non_exhaustive]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between client pings
    #[serde(default)]
    pub ping_interval: Option<u64>,
    /// Milliseconds the server waits for a ping before dropping the client
    #[serde(default)]
    pub ping_timeout: Option<u64>,
}

impl Handshake {
    #[must_use]
    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval.map(Duration::from_millis)
    }

    #[must_use]
    pub fn ping_timeout(&self) -> Option<Duration> {
        self.ping_timeout.map(Duration::from_millis)
    }
}

/// A socket.io packet riding inside an Engine.IO message.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub enum SocketPacket {
    Connect,
    Disconnect,
    Event {
        name: String,
        args: Vec<Value>,
        ack_id: Option<u64>,
    },
    Ack {
        ack_id: u64,
        args: Vec<Value>,
    },
    /// Connection refused by the server, with the server's explanation.
    Error(Value),
}

/// Engine.IO packet.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message {
        /// Namespace, `/` when the packet omits one.
        namespace: String,
        packet: SocketPacket,
    },
    Upgrade,
    Noop,
}

const DEFAULT_NAMESPACE: &str = "/";

impl Packet {
    /// Decodes one text frame.
    pub fn parse(frame: &str) -> Result<Self, WsError> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| WsError::MalformedPacket(frame.to_owned()))?;
        let body = chars.as_str();

        match kind {
            '0' => serde_json::from_str(body)
                .map(Packet::Open)
                .map_err(WsError::MessageParse),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping(body.to_owned())),
            '3' => Ok(Packet::Pong(body.to_owned())),
            '4' => parse_message(frame, body),
            '5' => Ok(Packet::Upgrade),
            '6' => Ok(Packet::Noop),
            _ => Err(WsError::MalformedPacket(frame.to_owned())),
        }
    }

    /// Encodes the packet as a text frame.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Packet::Open(handshake) => format!(
                "0{}",
                serde_json::json!({
                    "sid": handshake.sid,
                    "upgrades": handshake.upgrades,
                    "pingInterval": handshake.ping_interval,
                    "pingTimeout": handshake.ping_timeout,
                })
            ),
            Packet::Close => "1".to_owned(),
            Packet::Ping(data) => format!("2{data}"),
            Packet::Pong(data) => format!("3{data}"),
            Packet::Message { namespace, packet } => {
                let (kind, ack_id, body) = match packet {
                    SocketPacket::Connect => ('0', None, String::new()),
                    SocketPacket::Disconnect => ('1', None, String::new()),
                    SocketPacket::Event { name, args, ack_id } => {
                        let mut array = Vec::with_capacity(args.len() + 1);
                        array.push(Value::String(name.clone()));
                        array.extend(args.iter().cloned());
                        ('2', *ack_id, Value::Array(array).to_string())
                    }
                    SocketPacket::Ack { ack_id, args } => {
                        ('3', Some(*ack_id), Value::Array(args.clone()).to_string())
                    }
                    SocketPacket::Error(payload) => ('4', None, payload.to_string()),
                };

                let mut frame = format!("4{kind}");
                if namespace != DEFAULT_NAMESPACE {
                    frame.push_str(namespace);
                    if ack_id.is_some() || !body.is_empty() {
                        frame.push(',');
                    }
                }
                if let Some(id) = ack_id {
                    frame.push_str(&id.to_string());
                }
                frame.push_str(&body);
                frame
            }
            Packet::Upgrade => "5".to_owned(),
            Packet::Noop => "6".to_owned(),
        }
    }

    /// Whether this is a socket.io packet for the default namespace.
    #[must_use]
    pub fn is_default_namespace(&self) -> bool {
        matches!(self, Packet::Message { namespace, .. } if namespace == DEFAULT_NAMESPACE)
    }
}

fn parse_message(frame: &str, body: &str) -> Result<Packet, WsError> {
    let malformed = || WsError::MalformedPacket(frame.to_owned());

    let mut chars = body.chars();
    let kind = chars.next().ok_or_else(malformed)?;
    let mut rest = chars.as_str();

    let mut namespace = DEFAULT_NAMESPACE.to_owned();
    if rest.starts_with('/') {
        let (nsp, remainder) = rest.split_once(',').unwrap_or((rest, ""));
        nsp.clone_into(&mut namespace);
        rest = remainder;
    }

    let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let (id, json) = rest.split_at(digits);
    let ack_id = if id.is_empty() {
        None
    } else {
        Some(id.parse::<u64>().map_err(|_e| malformed())?)
    };

    let packet = match kind {
        '0' => SocketPacket::Connect,
        '1' => SocketPacket::Disconnect,
        '2' => {
            let mut args = parse_array(json)?.into_iter();
            let Some(Value::String(name)) = args.next() else {
                return Err(malformed());
            };
            SocketPacket::Event {
                name,
                args: args.collect(),
                ack_id,
            }
        }
        '3' => SocketPacket::Ack {
            ack_id: ack_id.ok_or_else(malformed)?,
            args: parse_array(json)?,
        },
        '4' => {
            let payload = if json.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(json).map_err(WsError::MessageParse)?
            };
            SocketPacket::Error(payload)
        }
        _ => return Err(malformed()),
    };

    Ok(Packet::Message { namespace, packet })
}

fn parse_array(json: &str) -> Result<Vec<Value>, WsError> {
    serde_json::from_str(json).map_err(WsError::MessageParse)
}

/// Collapses event arguments into one opaque payload: a single argument is passed as is,
/// several become an array, none becomes `null`.
#[must_use]
pub fn event_payload(mut args: Vec<Value>) -> Value {
    match args.len() {
        0 => Value::Null,
        1 => args.pop().unwrap_or(Value::Null),
        _ => Value::Array(args),
    }
}
