//! Instrument identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a tradable instrument, as assigned by the instrument catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(pub u32);

impl InstrumentId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InstrumentId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(InstrumentId)
    }
}

impl From<u32> for InstrumentId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_from_map_key() {
        assert_eq!("17".parse::<InstrumentId>().unwrap(), InstrumentId(17));
        assert_eq!(" 3 ".parse::<InstrumentId>().unwrap(), InstrumentId(3));
        assert!("ADANIENT".parse::<InstrumentId>().is_err());
        assert!("-1".parse::<InstrumentId>().is_err());
    }
}
