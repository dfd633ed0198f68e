use crate::foundation::error::EngineResult;

/// How far a release request reaches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ReleaseFlags {
    /// Release only resources the object holds directly.
    #[default]
    ReleaseOwnOnly,
    /// Also release resources held by owned children.
    ReleaseRecursive,
}

impl ReleaseFlags {
    /// Return `true` for [`ReleaseFlags::ReleaseRecursive`].
    pub fn is_recursive(self) -> bool {
        matches!(self, Self::ReleaseRecursive)
    }

    /// Map the wire-level `recursive` flag onto a release mode.
    pub fn from_recursive(recursive: bool) -> Self {
        if recursive {
            Self::ReleaseRecursive
        } else {
            Self::ReleaseOwnOnly
        }
    }
}

/// Objects that hold backend resources they can give back without being invalidated.
///
/// Releasing is idempotent: calling it any number of times in a row is safe, and the object keeps
/// its identity and dimensions and re-acquires what it needs on next use. Releasing a disposed
/// object is an invalid-state error; disposal is terminal.
pub trait ReleaseResources {
    /// Environment needed to hand resources back (pools, platform handles).
    type Env<'a>;

    /// Give back backend resources according to `flags`.
    fn release_resources(&mut self, env: Self::Env<'_>, flags: ReleaseFlags) -> EngineResult<()>;
}
