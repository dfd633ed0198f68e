//! Namespaced opcodes.
//!
//! An opcode string is `<Namespace><Op>`, e.g. `"BrowserCreateImage"`. The namespace prefix keeps
//! opcodes of different backend families unique on a shared channel.

use std::str::FromStr;

use crate::{foundation::error::ProtocolError, surface::SurfaceKind};

/// Backend family a command (and the engine it creates) belongs to.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Namespace {
    /// Browser-style host: DOM-like raster canvases.
    Browser,
    /// Headless host: platform-native offscreen surfaces.
    Node,
}

impl Namespace {
    /// Every namespace.
    pub const ALL: [Namespace; 2] = [Self::Browser, Self::Node];

    /// Opcode prefix of this namespace.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Browser => "Browser",
            Self::Node => "Node",
        }
    }

    /// 2D surface kind engines of this family draw on.
    pub fn surface_kind(self) -> SurfaceKind {
        match self {
            Self::Browser => SurfaceKind::Raster,
            Self::Node => SurfaceKind::Offscreen,
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object-lifecycle operation, independent of namespace.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Op {
    /// Create an engine.
    Create,
    /// Create an image in an engine.
    CreateImage,
    /// Release an image's backend resources.
    ReleaseImage,
    /// Dispose an image.
    DisposeImage,
    /// Release an engine's resources.
    Release,
    /// Dispose an engine.
    Dispose,
    /// Fill an image with one color.
    FillImage,
    /// Read one pixel of an image.
    ReadPixel,
}

impl Op {
    /// Every op, in wire order.
    pub const ALL: [Op; 8] = [
        Self::Create,
        Self::CreateImage,
        Self::ReleaseImage,
        Self::DisposeImage,
        Self::Release,
        Self::Dispose,
        Self::FillImage,
        Self::ReadPixel,
    ];

    /// Opcode suffix of this op.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::CreateImage => "CreateImage",
            Self::ReleaseImage => "ReleaseImage",
            Self::DisposeImage => "DisposeImage",
            Self::Release => "Release",
            Self::Dispose => "Dispose",
            Self::FillImage => "FillImage",
            Self::ReadPixel => "ReadPixel",
        }
    }

    /// Return `true` for ops that target an image inside an existing engine.
    pub fn targets_image(self) -> bool {
        matches!(
            self,
            Self::CreateImage
                | Self::ReleaseImage
                | Self::DisposeImage
                | Self::FillImage
                | Self::ReadPixel
        )
    }
}

/// A namespace-qualified operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Opcode {
    /// Backend family.
    pub namespace: Namespace,
    /// Operation.
    pub op: Op,
}

impl Opcode {
    /// Pair a namespace with an op.
    pub const fn new(namespace: Namespace, op: Op) -> Self {
        Self { namespace, op }
    }

    /// Every opcode, namespace-major.
    pub fn all() -> impl Iterator<Item = Opcode> {
        Namespace::ALL
            .into_iter()
            .flat_map(|ns| Op::ALL.into_iter().map(move |op| Opcode::new(ns, op)))
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.namespace.as_str(), self.op.as_str())
    }
}

impl FromStr for Opcode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, rest) = if let Some(rest) = s.strip_prefix("Browser") {
            (Namespace::Browser, rest)
        } else if let Some(rest) = s.strip_prefix("Node") {
            (Namespace::Node, rest)
        } else {
            return Err(ProtocolError::UnknownOpcode(s.to_string()));
        };
        let op = match rest {
            "Create" => Op::Create,
            "CreateImage" => Op::CreateImage,
            "ReleaseImage" => Op::ReleaseImage,
            "DisposeImage" => Op::DisposeImage,
            "Release" => Op::Release,
            "Dispose" => Op::Dispose,
            "FillImage" => Op::FillImage,
            "ReadPixel" => Op::ReadPixel,
            _ => return Err(ProtocolError::UnknownOpcode(s.to_string())),
        };
        Ok(Opcode::new(namespace, op))
    }
}

impl serde::Serialize for Opcode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Opcode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/protocol/opcode.rs"]
mod tests;
