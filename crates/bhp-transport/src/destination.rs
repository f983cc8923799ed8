use std::fmt;
use std::str::FromStr;

/// Secure execution environment a command is routed to.
///
/// Each destination has its own sequence space and its own link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Destination {
    /// The VM hosting regular applets.
    Ivm,
    /// The security-domain VM.
    Svm,
}

impl Destination {
    /// Order in which destinations are searched for a session handle.
    pub const SEARCH_ORDER: [Destination; 2] = [Destination::Ivm, Destination::Svm];

    pub fn name(self) -> &'static str {
        match self {
            Self::Ivm => "ivm",
            Self::Svm => "svm",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Destination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ivm" => Ok(Self::Ivm),
            "svm" => Ok(Self::Svm),
            other => Err(format!("unknown destination '{other}' (expected ivm or svm)")),
        }
    }
}
