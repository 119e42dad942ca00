use std::fmt;

/// Position of a coordinator round or a participant within the two-phase commit protocol.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Phase {
    Init,
    Wait,
    Ready,
    Abort,
    Commit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "Init",
            Phase::Wait => "Wait",
            Phase::Ready => "Ready",
            Phase::Abort => "Abort",
            Phase::Commit => "Commit",
        };
        f.write_str(name)
    }
}
