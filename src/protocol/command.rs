use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::{
    engine::EngineConfig,
    foundation::error::{EngineError, ProtocolError},
    protocol::opcode::{Op, Opcode},
    surface::SurfaceKind,
};

/// Opcode-specific command data.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Create an engine; `handle` names it.
    Create {
        /// Engine config; the dispatcher's default when absent.
        config: Option<EngineConfig>,
    },
    /// Create an image inside `engine`; `handle` names the image.
    CreateImage {
        /// Owning engine handle.
        engine: String,
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },
    /// Release one image's backend resources.
    ReleaseImage {
        /// Owning engine handle.
        engine: String,
        /// Release flag; images behave the same either way.
        recursive: bool,
    },
    /// Dispose one image.
    DisposeImage {
        /// Owning engine handle.
        engine: String,
    },
    /// Release an engine's resources; `handle` names the engine.
    Release {
        /// Also release every image.
        recursive: bool,
    },
    /// Dispose an engine and everything it owns.
    Dispose,
    /// Fill an image with a straight-alpha color, optionally moving it to `surface` first.
    FillImage {
        /// Owning engine handle.
        engine: String,
        /// Straight-alpha RGBA.
        color: [u8; 4],
        /// Surface kind to move the image to before filling.
        surface: Option<SurfaceKind>,
    },
    /// Read one premultiplied pixel.
    ReadPixel {
        /// Owning engine handle.
        engine: String,
        /// Column.
        x: u32,
        /// Row, counted from the top.
        y: u32,
    },
}

/// One decoded command.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    /// Namespaced operation.
    pub opcode: Opcode,
    /// Engine or image handle the command creates or targets.
    pub handle: String,
    /// Opcode-specific data.
    pub payload: Payload,
}

#[derive(serde::Deserialize)]
struct CreateFields {
    #[serde(default)]
    config: Option<EngineConfig>,
}

#[derive(serde::Deserialize)]
struct CreateImageFields {
    engine: String,
    width: u32,
    height: u32,
}

#[derive(serde::Deserialize)]
struct ReleaseImageFields {
    engine: String,
    #[serde(default)]
    recursive: bool,
}

#[derive(serde::Deserialize)]
struct EngineField {
    engine: String,
}

#[derive(serde::Deserialize)]
struct ReleaseFields {
    #[serde(default)]
    recursive: bool,
}

#[derive(serde::Deserialize)]
struct FillImageFields {
    engine: String,
    color: [u8; 4],
    #[serde(default)]
    surface: Option<SurfaceKind>,
}

#[derive(serde::Deserialize)]
struct ReadPixelFields {
    engine: String,
    x: u32,
    y: u32,
}

fn fields<T: DeserializeOwned>(opcode: Opcode, obj: &Map<String, Value>) -> Result<T, ProtocolError> {
    serde_json::from_value(Value::Object(obj.clone())).map_err(|e| ProtocolError::InvalidPayload {
        opcode: opcode.to_string(),
        reason: e.to_string(),
    })
}

impl Command {
    /// Decode a wire object. The opcode is resolved first, so an unknown opcode is reported as
    /// such even when the rest of the object is malformed.
    pub fn decode(value: &Value) -> Result<Self, ProtocolError> {
        let obj = value.as_object().ok_or_else(|| ProtocolError::InvalidPayload {
            opcode: String::new(),
            reason: "command must be a JSON object".to_string(),
        })?;
        let opcode: Opcode = match obj.get("opcode") {
            Some(Value::String(s)) => s.parse()?,
            Some(other) => return Err(ProtocolError::UnknownOpcode(other.to_string())),
            None => {
                return Err(ProtocolError::InvalidPayload {
                    opcode: String::new(),
                    reason: "missing field `opcode`".to_string(),
                });
            }
        };
        let handle = match obj.get("handle") {
            Some(Value::String(h)) if !h.is_empty() => h.clone(),
            _ => {
                return Err(ProtocolError::InvalidPayload {
                    opcode: opcode.to_string(),
                    reason: "missing or empty `handle`".to_string(),
                });
            }
        };

        let payload = match opcode.op {
            Op::Create => {
                let f: CreateFields = fields(opcode, obj)?;
                Payload::Create { config: f.config }
            }
            Op::CreateImage => {
                let f: CreateImageFields = fields(opcode, obj)?;
                Payload::CreateImage {
                    engine: f.engine,
                    width: f.width,
                    height: f.height,
                }
            }
            Op::ReleaseImage => {
                let f: ReleaseImageFields = fields(opcode, obj)?;
                Payload::ReleaseImage {
                    engine: f.engine,
                    recursive: f.recursive,
                }
            }
            Op::DisposeImage => {
                let f: EngineField = fields(opcode, obj)?;
                Payload::DisposeImage { engine: f.engine }
            }
            Op::Release => {
                let f: ReleaseFields = fields(opcode, obj)?;
                Payload::Release {
                    recursive: f.recursive,
                }
            }
            Op::Dispose => Payload::Dispose,
            Op::FillImage => {
                let f: FillImageFields = fields(opcode, obj)?;
                Payload::FillImage {
                    engine: f.engine,
                    color: f.color,
                    surface: f.surface,
                }
            }
            Op::ReadPixel => {
                let f: ReadPixelFields = fields(opcode, obj)?;
                Payload::ReadPixel {
                    engine: f.engine,
                    x: f.x,
                    y: f.y,
                }
            }
        };

        Ok(Self {
            opcode,
            handle,
            payload,
        })
    }

    /// Wire representation.
    pub fn encode(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("opcode".into(), Value::String(self.opcode.to_string()));
        obj.insert("handle".into(), Value::String(self.handle.clone()));
        let extra = match &self.payload {
            Payload::Create { config } => match config {
                Some(c) => json!({ "config": c }),
                None => json!({}),
            },
            Payload::CreateImage {
                engine,
                width,
                height,
            } => json!({ "engine": engine, "width": width, "height": height }),
            Payload::ReleaseImage { engine, recursive } => {
                json!({ "engine": engine, "recursive": recursive })
            }
            Payload::DisposeImage { engine } => json!({ "engine": engine }),
            Payload::Release { recursive } => json!({ "recursive": recursive }),
            Payload::Dispose => json!({}),
            Payload::FillImage {
                engine,
                color,
                surface,
            } => match surface {
                Some(kind) => json!({ "engine": engine, "color": color, "surface": kind }),
                None => json!({ "engine": engine, "color": color }),
            },
            Payload::ReadPixel { engine, x, y } => json!({ "engine": engine, "x": x, "y": y }),
        };
        if let Value::Object(extra) = extra {
            obj.extend(extra);
        }
        Value::Object(obj)
    }

    /// Engine this command acts on: the `engine` field for image commands, the handle itself for
    /// engine commands.
    pub fn engine_handle(&self) -> &str {
        match &self.payload {
            Payload::CreateImage { engine, .. }
            | Payload::ReleaseImage { engine, .. }
            | Payload::DisposeImage { engine }
            | Payload::FillImage { engine, .. }
            | Payload::ReadPixel { engine, .. } => engine,
            Payload::Create { .. } | Payload::Release { .. } | Payload::Dispose => &self.handle,
        }
    }
}

/// Progress of one command through the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    /// Serialized by the sender.
    Encoded,
    /// Received by the engine-owning side.
    Delivered,
    /// Executed successfully.
    Applied,
    /// Sender observed the successful reply.
    Acknowledged,
    /// Refused without side effects.
    Rejected,
}

/// Sequenced command as it crosses the boundary.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Envelope {
    /// Position on the channel, starting at 0.
    pub seq: u64,
    /// Encoded command object.
    pub command: Value,
}

/// Machine-readable rejection.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReplyError {
    /// One of [`crate::protocol::error_code`].
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

/// Answer to one [`Envelope`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Reply {
    /// Sequence number of the answered envelope.
    pub seq: u64,
    /// `Applied` or `Rejected`.
    pub state: CommandState,
    /// Opcode, when the command decoded that far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opcode: Option<String>,
    /// Result of an applied command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Reason for a rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplyError>,
}

impl Reply {
    /// Successful reply carrying `result`.
    pub fn applied(seq: u64, opcode: Opcode, result: Value) -> Self {
        Self {
            seq,
            state: CommandState::Applied,
            opcode: Some(opcode.to_string()),
            result: Some(result),
            error: None,
        }
    }

    /// Rejection carrying the code and message of `err`.
    pub fn rejected(seq: u64, opcode: Option<Opcode>, err: &EngineError) -> Self {
        Self {
            seq,
            state: CommandState::Rejected,
            opcode: opcode.map(|o| o.to_string()),
            result: None,
            error: Some(ReplyError {
                code: err.code(),
                message: err.to_string(),
            }),
        }
    }

    /// Return `true` for an applied command.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Error code of a rejection.
    pub fn error_code(&self) -> Option<i32> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// One recorded state transition.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    /// Command sequence number.
    pub seq: u64,
    /// Opcode string, if known.
    pub opcode: Option<String>,
    /// State entered.
    pub state: CommandState,
}

/// Ordered record of command state transitions.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CommandLog {
    entries: Vec<LogEntry>,
}

impl CommandLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transition.
    pub fn record(&mut self, seq: u64, opcode: Option<String>, state: CommandState) {
        self.entries.push(LogEntry { seq, opcode, state });
    }

    /// Every transition, in recording order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Latest recorded state of command `seq`.
    pub fn state_of(&self, seq: u64) -> Option<CommandState> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.seq == seq)
            .map(|e| e.state)
    }

    /// Every transition of command `seq`, oldest first.
    pub fn history(&self, seq: u64) -> Vec<CommandState> {
        self.entries
            .iter()
            .filter(|e| e.seq == seq)
            .map(|e| e.state)
            .collect()
    }

    /// Number of recorded transitions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/protocol/command.rs"]
mod tests;
